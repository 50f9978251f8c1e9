//! Order placement.

use std::collections::HashMap;

use chrono::Utc;
use rust_decimal::Decimal;
use thiserror::Error;

use dropshop_core::{
    AddressId, MoneyError, ProductId, ProductVariantId, UserId, line_total, round_money,
};

use crate::client::Client;
use crate::error::ClientError;
use crate::filter::Filter;
use crate::model::{FindManyArgs, NumericUpdate};
use crate::models::{
    AddressWhereInput, OrderCreateInput, OrderInclude, OrderItemCreateWithoutOrderInput,
    OrderWhereUniqueInput, OrderWithRelations, ProductInclude, ProductVariantUpdateInput,
    ProductVariantWhereInput, ProductVariantWhereUniqueInput, ProductWhereInput,
};
use crate::transaction::{TransactionClient, TransactionOptions};

/// Errors from placing an order.
#[derive(Debug, Error)]
pub enum CheckoutError {
    #[error("order has no lines")]
    EmptyOrder,

    #[error("product {0} not found")]
    ProductNotFound(ProductId),

    #[error("product {0} is out of stock")]
    OutOfStock(ProductId),

    /// The product belongs to a drop that is inactive or outside its window.
    #[error("product {0} is not available: its drop is not live")]
    DropNotLive(ProductId),

    #[error("variant {variant} does not belong to product {product}")]
    VariantMismatch {
        product: ProductId,
        variant: ProductVariantId,
    },

    #[error("not enough stock for variant {0}")]
    InsufficientStock(ProductVariantId),

    #[error("shipping address {0} not found for this user")]
    AddressNotFound(AddressId),

    #[error("invalid order line: {0}")]
    InvalidLine(#[from] MoneyError),

    #[error(transparent)]
    Client(#[from] ClientError),
}

/// One requested line of an order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OrderLine {
    pub product_id: ProductId,
    pub variant_id: Option<ProductVariantId>,
    pub quantity: i32,
}

/// Input of [`place_order`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlaceOrder {
    pub user_id: UserId,
    pub shipping_address_id: Option<AddressId>,
    pub payment_intent_id: Option<String>,
    pub lines: Vec<OrderLine>,
}

/// Place an order.
///
/// In one transaction: checks every product is in stock and, when it
/// belongs to a drop, that the drop is live; reserves variant stock; prices
/// each line from the current product price; then creates the order and
/// its items. Nothing is written if any check fails.
///
/// # Errors
///
/// Returns a [`CheckoutError`] describing the first failed check.
pub async fn place_order(
    client: &Client,
    input: PlaceOrder,
) -> Result<OrderWithRelations, CheckoutError> {
    if input.lines.is_empty() {
        return Err(CheckoutError::EmptyOrder);
    }
    for line in &input.lines {
        if line.quantity <= 0 {
            return Err(MoneyError::NonPositiveQuantity(line.quantity).into());
        }
    }
    let user_id = input.user_id;
    let line_count = input.lines.len();

    let order = client
        .transaction(TransactionOptions::default(), |tx| {
            Box::pin(place_in(tx, input))
        })
        .await
        .inspect_err(|e| tracing::info!(%user_id, error = %e, "Checkout rejected"))?;

    tracing::info!(
        %user_id,
        order_number = %order.order.order_number,
        total = %order.order.total,
        lines = line_count,
        "Order placed"
    );
    Ok(order)
}

async fn place_in(
    tx: &mut TransactionClient,
    input: PlaceOrder,
) -> Result<OrderWithRelations, CheckoutError> {
    let now = Utc::now();

    if let Some(address_id) = input.shipping_address_id {
        let owned = tx
            .address()
            .count(AddressWhereInput {
                id: Some(Filter::equals(address_id)),
                user_id: Some(Filter::equals(input.user_id)),
                ..AddressWhereInput::default()
            })
            .await?;
        if owned == 0 {
            return Err(CheckoutError::AddressNotFound(address_id));
        }
    }

    let product_ids: Vec<ProductId> = input.lines.iter().map(|l| l.product_id).collect();
    let products: HashMap<ProductId, _> = tx
        .product()
        .find_many_including(
            FindManyArgs::new().filter(ProductWhereInput {
                id: Some(Filter::in_list(product_ids)),
                ..ProductWhereInput::default()
            }),
            ProductInclude {
                drop: true,
                ..ProductInclude::default()
            },
        )
        .await?
        .into_iter()
        .map(|p| (p.product.id, p))
        .collect();

    let mut items = Vec::with_capacity(input.lines.len());
    let mut total = Decimal::ZERO;
    for line in &input.lines {
        let product = products
            .get(&line.product_id)
            .ok_or(CheckoutError::ProductNotFound(line.product_id))?;
        if !product.product.in_stock {
            return Err(CheckoutError::OutOfStock(line.product_id));
        }
        if product.product.drop_id.is_some()
            && !product.drop.as_ref().is_some_and(|d| d.is_live(now))
        {
            return Err(CheckoutError::DropNotLive(line.product_id));
        }

        let mut item = OrderItemCreateWithoutOrderInput::new(
            line.product_id,
            line.quantity,
            product.product.price,
        );
        if let Some(variant_id) = line.variant_id {
            reserve_stock(tx, line.product_id, variant_id, line.quantity).await?;
            item = item.with_variant(variant_id);
        }

        total += line_total(product.product.price, line.quantity)?;
        items.push(item);
    }

    let order = tx
        .order()
        .create(OrderCreateInput {
            shipping_address_id: input.shipping_address_id,
            payment_intent_id: input.payment_intent_id,
            items,
            ..OrderCreateInput::new(input.user_id, round_money(total))
        })
        .await?;

    tx.order()
        .find_unique_including(
            OrderWhereUniqueInput::Id(order.id),
            OrderInclude {
                items: Some(FindManyArgs::default()),
                ..OrderInclude::default()
            },
        )
        .await?
        .ok_or_else(|| ClientError::NotFound { model: "Order" }.into())
}

/// Decrement stock only if enough is left.
async fn reserve_stock(
    tx: &mut TransactionClient,
    product_id: ProductId,
    variant_id: ProductVariantId,
    quantity: i32,
) -> Result<(), CheckoutError> {
    let reserved = tx
        .product_variant()
        .update_many(
            ProductVariantWhereInput {
                id: Some(Filter::equals(variant_id)),
                product_id: Some(Filter::equals(product_id)),
                stock: Some(Filter::gte(quantity)),
                ..ProductVariantWhereInput::default()
            },
            ProductVariantUpdateInput {
                stock: Some(NumericUpdate::Decrement(quantity)),
                ..ProductVariantUpdateInput::default()
            },
        )
        .await?;
    if reserved == 1 {
        return Ok(());
    }

    let variant = tx
        .product_variant()
        .find_unique(ProductVariantWhereUniqueInput::Id(variant_id))
        .await?;
    match variant {
        Some(v) if v.product_id == product_id => Err(CheckoutError::InsufficientStock(variant_id)),
        _ => Err(CheckoutError::VariantMismatch {
            product: product_id,
            variant: variant_id,
        }),
    }
}
