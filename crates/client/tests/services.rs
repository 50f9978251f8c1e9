//! Shop services against a live database.

#![allow(clippy::unwrap_used, clippy::indexing_slicing)]

mod common;

use chrono::Utc;
use sqlx::PgPool;

use dropshop_client::prelude::*;
use dropshop_client::services::{
    CheckoutError, DropError, DropService, OrderLine, OrderStatusError, PlaceOrder,
    advance_order_status, place_order, set_default_address,
};

use common::{address, live_drop, price, product, product_with_variant, upcoming_drop, user};

async fn stock_of(client: &Client, id: ProductVariantId) -> i32 {
    client
        .product_variant()
        .find_unique_or_throw(ProductVariantWhereUniqueInput::Id(id))
        .await
        .unwrap()
        .stock
}

fn line(product: &Product, variant: Option<&ProductVariant>, quantity: i32) -> OrderLine {
    OrderLine {
        product_id: product.id,
        variant_id: variant.map(|v| v.id),
        quantity,
    }
}

// =============================================================================
// Checkout
// =============================================================================

#[sqlx::test(migrations = "./migrations")]
#[ignore = "Requires PostgreSQL (DATABASE_URL)"]
async fn test_place_order_reserves_stock_and_totals(pool: PgPool) {
    let client = common::client(pool);
    let ann = user(&client, "ann@example.com").await;
    let home = address(&client, ann.id, "Oakland").await;
    let (hoodie, hoodie_m) = product_with_variant(&client, "hoodie", 6550, 5).await;
    let sticker = product(&client, "sticker", 199).await;

    let placed = place_order(
        &client,
        PlaceOrder {
            user_id: ann.id,
            shipping_address_id: Some(home.id),
            payment_intent_id: Some("pi_123".to_owned()),
            lines: vec![line(&hoodie, Some(&hoodie_m), 2), line(&sticker, None, 3)],
        },
    )
    .await
    .unwrap();

    assert_eq!(placed.order.total, price(13697));
    assert_eq!(placed.order.status, OrderStatus::Pending);
    assert_eq!(placed.order.shipping_address_id, Some(home.id));
    let items = placed.items.unwrap();
    assert_eq!(items.len(), 2);
    assert!(items.iter().any(|i| i.variant_id == Some(hoodie_m.id) && i.price == price(6550)));
    assert_eq!(stock_of(&client, hoodie_m.id).await, 3);
}

#[sqlx::test(migrations = "./migrations")]
#[ignore = "Requires PostgreSQL (DATABASE_URL)"]
async fn test_place_order_insufficient_stock_writes_nothing(pool: PgPool) {
    let client = common::client(pool);
    let ann = user(&client, "ann@example.com").await;
    let (tee, tee_m) = product_with_variant(&client, "tee", 2500, 5).await;
    let (cap, cap_m) = product_with_variant(&client, "cap", 1500, 1).await;

    let err = place_order(
        &client,
        PlaceOrder {
            user_id: ann.id,
            shipping_address_id: None,
            payment_intent_id: None,
            lines: vec![line(&tee, Some(&tee_m), 2), line(&cap, Some(&cap_m), 2)],
        },
    )
    .await
    .unwrap_err();

    assert!(matches!(err, CheckoutError::InsufficientStock(id) if id == cap_m.id));
    assert_eq!(stock_of(&client, tee_m.id).await, 5);
    assert_eq!(client.order().count(OrderWhereInput::default()).await.unwrap(), 0);
}

#[sqlx::test(migrations = "./migrations")]
#[ignore = "Requires PostgreSQL (DATABASE_URL)"]
async fn test_place_order_rejects_foreign_variant(pool: PgPool) {
    let client = common::client(pool);
    let ann = user(&client, "ann@example.com").await;
    let (tee, _) = product_with_variant(&client, "tee", 2500, 5).await;
    let (_, cap_m) = product_with_variant(&client, "cap", 1500, 5).await;

    let err = place_order(
        &client,
        PlaceOrder {
            user_id: ann.id,
            shipping_address_id: None,
            payment_intent_id: None,
            lines: vec![line(&tee, Some(&cap_m), 1)],
        },
    )
    .await
    .unwrap_err();
    assert!(matches!(err, CheckoutError::VariantMismatch { .. }), "{err:?}");
}

#[sqlx::test(migrations = "./migrations")]
#[ignore = "Requires PostgreSQL (DATABASE_URL)"]
async fn test_place_order_requires_live_drop(pool: PgPool) {
    let client = common::client(pool);
    let ann = user(&client, "ann@example.com").await;
    let later = upcoming_drop(&client, "Later").await;
    let teaser = client
        .product()
        .create(ProductCreateInput {
            drop_id: Some(later.id),
            ..ProductCreateInput::new("Teaser", "teaser", "apparel", price(100))
        })
        .await
        .unwrap();

    let err = place_order(
        &client,
        PlaceOrder {
            user_id: ann.id,
            shipping_address_id: None,
            payment_intent_id: None,
            lines: vec![line(&teaser, None, 1)],
        },
    )
    .await
    .unwrap_err();
    assert!(matches!(err, CheckoutError::DropNotLive(id) if id == teaser.id));
}

#[sqlx::test(migrations = "./migrations")]
#[ignore = "Requires PostgreSQL (DATABASE_URL)"]
async fn test_place_order_rejects_other_users_address(pool: PgPool) {
    let client = common::client(pool);
    let ann = user(&client, "ann@example.com").await;
    let bo = user(&client, "bo@example.com").await;
    let bos_place = address(&client, bo.id, "Fresno").await;
    let sticker = product(&client, "sticker", 199).await;

    let err = place_order(
        &client,
        PlaceOrder {
            user_id: ann.id,
            shipping_address_id: Some(bos_place.id),
            payment_intent_id: None,
            lines: vec![line(&sticker, None, 1)],
        },
    )
    .await
    .unwrap_err();
    assert!(matches!(err, CheckoutError::AddressNotFound(_)));
}

#[sqlx::test(migrations = "./migrations")]
#[ignore = "Requires PostgreSQL (DATABASE_URL)"]
async fn test_place_order_validates_lines_first(pool: PgPool) {
    let client = common::client(pool);
    let ann = user(&client, "ann@example.com").await;
    let sticker = product(&client, "sticker", 199).await;

    let empty = place_order(
        &client,
        PlaceOrder {
            user_id: ann.id,
            shipping_address_id: None,
            payment_intent_id: None,
            lines: Vec::new(),
        },
    )
    .await
    .unwrap_err();
    assert!(matches!(empty, CheckoutError::EmptyOrder));

    let zero = place_order(
        &client,
        PlaceOrder {
            user_id: ann.id,
            shipping_address_id: None,
            payment_intent_id: None,
            lines: vec![line(&sticker, None, 0)],
        },
    )
    .await
    .unwrap_err();
    assert!(matches!(zero, CheckoutError::InvalidLine(_)));
}

// =============================================================================
// Order status
// =============================================================================

#[sqlx::test(migrations = "./migrations")]
#[ignore = "Requires PostgreSQL (DATABASE_URL)"]
async fn test_cancel_returns_stock(pool: PgPool) {
    let client = common::client(pool);
    let ann = user(&client, "ann@example.com").await;
    let (tee, tee_m) = product_with_variant(&client, "tee", 2500, 4).await;
    let placed = place_order(
        &client,
        PlaceOrder {
            user_id: ann.id,
            shipping_address_id: None,
            payment_intent_id: None,
            lines: vec![line(&tee, Some(&tee_m), 3)],
        },
    )
    .await
    .unwrap();
    assert_eq!(stock_of(&client, tee_m.id).await, 1);

    let cancelled = advance_order_status(&client, placed.order.id, OrderStatus::Cancelled)
        .await
        .unwrap();
    assert_eq!(cancelled.status, OrderStatus::Cancelled);
    assert_eq!(stock_of(&client, tee_m.id).await, 4);
}

#[sqlx::test(migrations = "./migrations")]
#[ignore = "Requires PostgreSQL (DATABASE_URL)"]
async fn test_status_lifecycle(pool: PgPool) {
    let client = common::client(pool);
    let ann = user(&client, "ann@example.com").await;
    let order = client
        .order()
        .create(OrderCreateInput::new(ann.id, price(1000)))
        .await
        .unwrap();

    for next in [OrderStatus::Processing, OrderStatus::Shipped, OrderStatus::Delivered] {
        let updated = advance_order_status(&client, order.id, next).await.unwrap();
        assert_eq!(updated.status, next);
    }

    let err = advance_order_status(&client, order.id, OrderStatus::Cancelled)
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        OrderStatusError::InvalidTransition {
            from: OrderStatus::Delivered,
            to: OrderStatus::Cancelled,
        }
    ));

    let missing = advance_order_status(&client, OrderId::new(9999), OrderStatus::Shipped)
        .await
        .unwrap_err();
    assert!(matches!(missing, OrderStatusError::NotFound(_)));
}

// =============================================================================
// Drops
// =============================================================================

#[sqlx::test(migrations = "./migrations")]
#[ignore = "Requires PostgreSQL (DATABASE_URL)"]
async fn test_live_drops_and_unlock(pool: PgPool) {
    let client = common::client(pool);
    let open = live_drop(&client, "Open", None).await;
    let locked = live_drop(&client, "Locked", Some("sunrise")).await;
    let later = upcoming_drop(&client, "Later").await;

    // Stored passwords are hashes.
    assert_ne!(locked.password.as_deref(), Some("sunrise"));

    let drops = DropService::new(&client);
    let live: Vec<_> = drops.live_drops(Utc::now()).await.unwrap();
    let mut ids: Vec<_> = live.iter().map(|d| d.id).collect();
    ids.sort();
    assert_eq!(ids, vec![open.id, locked.id]);

    assert_eq!(drops.unlock(open.id, "").await.unwrap().id, open.id);
    assert_eq!(drops.unlock(locked.id, "sunrise").await.unwrap().id, locked.id);
    assert!(matches!(
        drops.unlock(locked.id, "mango").await.unwrap_err(),
        DropError::InvalidPassword
    ));
    assert!(matches!(
        drops.unlock(later.id, "").await.unwrap_err(),
        DropError::NotLive(_)
    ));
    assert!(matches!(
        drops.unlock(DropId::new(9999), "").await.unwrap_err(),
        DropError::NotFound(_)
    ));
}

// =============================================================================
// Addresses
// =============================================================================

#[sqlx::test(migrations = "./migrations")]
#[ignore = "Requires PostgreSQL (DATABASE_URL)"]
async fn test_set_default_address_moves_flag(pool: PgPool) {
    let client = common::client(pool);
    let ann = user(&client, "ann@example.com").await;
    let home = address(&client, ann.id, "Oakland").await;
    let work = address(&client, ann.id, "San Francisco").await;

    set_default_address(&client, ann.id, home.id).await.unwrap();
    let updated = set_default_address(&client, ann.id, work.id).await.unwrap();
    assert!(updated.is_default);

    let defaults = client
        .address()
        .find_many(FindManyArgs::new().filter(AddressWhereInput {
            user_id: Some(Filter::equals(ann.id)),
            is_default: Some(Filter::equals(true)),
            ..AddressWhereInput::default()
        }))
        .await
        .unwrap();
    assert_eq!(defaults.len(), 1);
    assert_eq!(defaults[0].id, work.id);
}

#[sqlx::test(migrations = "./migrations")]
#[ignore = "Requires PostgreSQL (DATABASE_URL)"]
async fn test_set_default_address_of_other_user_fails(pool: PgPool) {
    let client = common::client(pool);
    let ann = user(&client, "ann@example.com").await;
    let bo = user(&client, "bo@example.com").await;
    let bos_place = address(&client, bo.id, "Fresno").await;

    let err = set_default_address(&client, ann.id, bos_place.id)
        .await
        .unwrap_err();
    assert!(err.is_not_found());
}
