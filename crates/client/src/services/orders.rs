//! Order status lifecycle.

use thiserror::Error;

use dropshop_core::{OrderId, OrderStatus};

use crate::client::Client;
use crate::error::ClientError;
use crate::filter::Filter;
use crate::model::{FindManyArgs, NumericUpdate};
use crate::models::{
    Order, OrderItemWhereInput, OrderUpdateInput, OrderWhereUniqueInput,
    ProductVariantUpdateInput, ProductVariantWhereInput,
};
use crate::transaction::{TransactionClient, TransactionOptions};
use crate::value::IntoValue;

/// Errors from status changes.
#[derive(Debug, Error)]
pub enum OrderStatusError {
    #[error("order {0} not found")]
    NotFound(OrderId),

    #[error("cannot move order from {from} to {to}")]
    InvalidTransition { from: OrderStatus, to: OrderStatus },

    #[error(transparent)]
    Client(#[from] ClientError),
}

/// Move an order to `next`, enforcing the status lifecycle.
///
/// Cancelling returns every reserved variant unit to stock. The order row
/// is locked for the duration of the change.
///
/// # Errors
///
/// Returns `OrderStatusError::InvalidTransition` if the lifecycle forbids
/// the move.
pub async fn advance_order_status(
    client: &Client,
    order_id: OrderId,
    next: OrderStatus,
) -> Result<Order, OrderStatusError> {
    let order = client
        .transaction(TransactionOptions::default(), |tx| {
            Box::pin(advance_in(tx, order_id, next))
        })
        .await?;
    tracing::info!(%order_id, status = %order.status, "Order status changed");
    Ok(order)
}

async fn advance_in(
    tx: &mut TransactionClient,
    order_id: OrderId,
    next: OrderStatus,
) -> Result<Order, OrderStatusError> {
    let current: Order = tx
        .query_raw(
            "SELECT * FROM orders WHERE id = $1 FOR UPDATE",
            vec![order_id.into_value()],
        )
        .await?
        .into_iter()
        .next()
        .ok_or(OrderStatusError::NotFound(order_id))?;

    if !current.status.can_transition_to(next) {
        return Err(OrderStatusError::InvalidTransition {
            from: current.status,
            to: next,
        });
    }

    if next == OrderStatus::Cancelled {
        restock(tx, order_id).await?;
    }

    Ok(tx
        .order()
        .update(
            OrderWhereUniqueInput::Id(order_id),
            OrderUpdateInput {
                status: Some(next),
                ..OrderUpdateInput::default()
            },
        )
        .await?)
}

async fn restock(tx: &mut TransactionClient, order_id: OrderId) -> Result<(), ClientError> {
    let items = tx
        .order_item()
        .find_many(FindManyArgs::new().filter(OrderItemWhereInput {
            order_id: Some(Filter::equals(order_id)),
            ..OrderItemWhereInput::default()
        }))
        .await?;

    for item in items {
        let Some(variant_id) = item.variant_id else {
            continue;
        };
        let restocked = tx
            .product_variant()
            .update_many(
                ProductVariantWhereInput {
                    id: Some(Filter::equals(variant_id)),
                    ..ProductVariantWhereInput::default()
                },
                ProductVariantUpdateInput {
                    stock: Some(NumericUpdate::Increment(item.quantity)),
                    ..ProductVariantUpdateInput::default()
                },
            )
            .await?;
        tracing::debug!(%variant_id, quantity = item.quantity, restocked, "Restocked variant");
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invalid_transition_message() {
        let err = OrderStatusError::InvalidTransition {
            from: OrderStatus::Delivered,
            to: OrderStatus::Pending,
        };
        assert_eq!(
            err.to_string(),
            "cannot move order from DELIVERED to PENDING"
        );
    }
}
