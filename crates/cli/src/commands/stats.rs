//! Shop statistics.

use rust_decimal::Decimal;
use serde::Serialize;
use tracing::info;

use dropshop_client::prelude::*;

use super::{CommandError, connect};

/// Row counts per table.
#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize)]
pub struct TableCounts {
    pub users: i64,
    pub addresses: i64,
    pub drops: i64,
    pub products: i64,
    pub product_variants: i64,
    pub orders: i64,
    pub order_items: i64,
}

/// Orders in one status.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StatusStats {
    pub status: OrderStatus,
    pub orders: i64,
    pub revenue: Decimal,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ShopStats {
    pub counts: TableCounts,
    pub live_drops: i64,
    pub orders_by_status: Vec<StatusStats>,
}

/// Print shop statistics.
///
/// # Errors
///
/// Returns `CommandError` if the database is unreachable.
pub async fn run(json: bool) -> Result<(), CommandError> {
    let client = connect().await?;
    let stats = collect(&client).await?;
    client.disconnect().await;

    if json {
        let rendered = serde_json::to_string_pretty(&stats)?;
        #[allow(clippy::print_stdout)]
        {
            println!("{rendered}");
        }
    } else {
        for line in render(&stats) {
            info!("{line}");
        }
    }
    Ok(())
}

/// Gather counts and per-status order totals.
///
/// # Errors
///
/// Returns `ClientError` if a query fails.
pub async fn collect(client: &Client) -> Result<ShopStats, ClientError> {
    let counts = TableCounts {
        users: client.user().count(UserWhereInput::default()).await?,
        addresses: client.address().count(AddressWhereInput::default()).await?,
        drops: client.product_drop().count(DropWhereInput::default()).await?,
        products: client.product().count(ProductWhereInput::default()).await?,
        product_variants: client
            .product_variant()
            .count(ProductVariantWhereInput::default())
            .await?,
        orders: client.order().count(OrderWhereInput::default()).await?,
        order_items: client.order_item().count(OrderItemWhereInput::default()).await?,
    };
    let live_drops = client
        .product_drop()
        .count(DropWhereInput::live_at(chrono::Utc::now()))
        .await?;

    let groups = client
        .order()
        .group_by(GroupByArgs {
            order_by: vec![GroupOrderBy::Field(OrderBy::asc(OrderField::Status))],
            select: AggregateSelection {
                count_all: true,
                sum: vec![OrderField::Total],
                ..AggregateSelection::default()
            },
            ..GroupByArgs::new(vec![OrderField::Status])
        })
        .await?;

    let orders_by_status = groups
        .into_iter()
        .filter_map(|group| {
            let Some(Value::Status(Some(status))) = group.key(OrderField::Status).cloned() else {
                return None;
            };
            Some(StatusStats {
                status,
                orders: group.aggregates.count_all.unwrap_or(0),
                revenue: group
                    .aggregates
                    .sum
                    .get(&OrderField::Total)
                    .copied()
                    .flatten()
                    .unwrap_or(Decimal::ZERO),
            })
        })
        .collect();

    Ok(ShopStats {
        counts,
        live_drops,
        orders_by_status,
    })
}

/// Human-readable report lines.
#[must_use]
pub fn render(stats: &ShopStats) -> Vec<String> {
    let c = &stats.counts;
    let mut lines = vec![
        "Shop Statistics".to_owned(),
        "===============".to_owned(),
        format!("Users: {}", c.users),
        format!("Addresses: {}", c.addresses),
        format!("Drops: {} ({} live)", c.drops, stats.live_drops),
        format!("Products: {}", c.products),
        format!("Variants: {}", c.product_variants),
        format!("Orders: {}", c.orders),
        format!("Order items: {}", c.order_items),
    ];
    if !stats.orders_by_status.is_empty() {
        lines.push("Orders by status:".to_owned());
        for s in &stats.orders_by_status {
            lines.push(format!("  {}: {} ({})", s.status, s.orders, s.revenue));
        }
    }
    lines
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn sample() -> ShopStats {
        ShopStats {
            counts: TableCounts {
                users: 2,
                drops: 3,
                orders: 4,
                ..TableCounts::default()
            },
            live_drops: 1,
            orders_by_status: vec![
                StatusStats {
                    status: OrderStatus::Pending,
                    orders: 3,
                    revenue: Decimal::new(12_000, 2),
                },
                StatusStats {
                    status: OrderStatus::Shipped,
                    orders: 1,
                    revenue: Decimal::new(4_550, 2),
                },
            ],
        }
    }

    #[test]
    fn test_render() {
        let lines = render(&sample());
        assert!(lines.contains(&"Drops: 3 (1 live)".to_owned()));
        assert!(lines.contains(&"  PENDING: 3 (120.00)".to_owned()));
        assert!(lines.contains(&"  SHIPPED: 1 (45.50)".to_owned()));
    }

    #[test]
    fn test_render_without_orders() {
        let stats = ShopStats {
            orders_by_status: Vec::new(),
            ..sample()
        };
        assert!(!render(&stats).iter().any(|l| l.starts_with("Orders by status")));
    }

    #[test]
    fn test_json_shape() {
        let json = serde_json::to_value(sample()).unwrap();
        assert_eq!(json["counts"]["users"], 2);
        assert_eq!(json["orders_by_status"][0]["status"], "PENDING");
        assert_eq!(json["orders_by_status"][1]["revenue"], "45.50");
    }
}
