//! Shared fixtures for database tests.
//!
//! Every test gets a fresh database from `#[sqlx::test]` with the crate's
//! migrations applied, so fixtures never need cleaning up.

#![allow(dead_code, clippy::unwrap_used)]

use chrono::{Duration, Utc};
use rust_decimal::Decimal;
use sqlx::PgPool;
use tracing_subscriber::EnvFilter;

use dropshop_client::prelude::*;

/// Route client logs to the test harness, filtered by `RUST_LOG`.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

pub fn client(pool: PgPool) -> Client {
    init_tracing();
    Client::from_pool(pool)
}

pub fn price(cents: i64) -> Decimal {
    Decimal::new(cents, 2)
}

pub async fn user(client: &Client, email: &str) -> User {
    let uid = format!("uid-{email}");
    client
        .user()
        .create(UserCreateInput::new(Email::parse(email).unwrap(), uid))
        .await
        .unwrap()
}

pub async fn address(client: &Client, user_id: UserId, city: &str) -> Address {
    client
        .address()
        .create(AddressCreateWithoutUserInput::new("1 Main St", city, "CA", "94110", "US").for_user(user_id))
        .await
        .unwrap()
}

pub async fn product(client: &Client, slug: &str, cents: i64) -> Product {
    client
        .product()
        .create(ProductCreateInput::new(slug.replace('-', " "), slug, "apparel", price(cents)))
        .await
        .unwrap()
}

/// A product with one variant holding `stock` units.
pub async fn product_with_variant(
    client: &Client,
    slug: &str,
    cents: i64,
    stock: i32,
) -> (Product, ProductVariant) {
    let product = product(client, slug, cents).await;
    let variant = client
        .product_variant()
        .create(
            ProductVariantCreateWithoutProductInput::new("M", "black", format!("{slug}-m-black"))
                .with_stock(stock)
                .for_product(product.id),
        )
        .await
        .unwrap();
    (product, variant)
}

/// An active drop whose window contains now.
pub async fn live_drop(client: &Client, name: &str, password: Option<&str>) -> ProductDrop {
    let now = Utc::now();
    client
        .product_drop()
        .create(DropCreateInput {
            is_active: Some(true),
            password: password.map(str::to_owned),
            ..DropCreateInput::new(name, now - Duration::hours(1), now + Duration::hours(1))
        })
        .await
        .unwrap()
}

/// An active drop that opens tomorrow.
pub async fn upcoming_drop(client: &Client, name: &str) -> ProductDrop {
    let now = Utc::now();
    client
        .product_drop()
        .create(DropCreateInput {
            is_active: Some(true),
            ..DropCreateInput::new(name, now + Duration::days(1), now + Duration::days(2))
        })
        .await
        .unwrap()
}
