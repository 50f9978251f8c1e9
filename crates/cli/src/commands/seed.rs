//! Seed the shop from a YAML file.
//!
//! Seeding is idempotent: products, variants and users are upserted by
//! slug, SKU and email, and drops are matched by name.
//!
//! ```yaml
//! drops:
//!   - name: Summer Capsule
//!     start_date: 2026-06-01T17:00:00Z
//!     end_date: 2026-06-08T17:00:00Z
//!     is_active: true
//!     password: sunrise
//! products:
//!   - name: Logo Hoodie
//!     slug: logo-hoodie
//!     category: apparel
//!     price: "65.00"
//!     drop: Summer Capsule
//!     variants:
//!       - { size: M, color: black, sku: HOOD-M-BLK, stock: 10 }
//! users:
//!   - email: ann@example.com
//!     firebase_uid: ann-uid
//! ```

use std::collections::HashSet;
use std::path::Path;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Deserialize;
use thiserror::Error;
use tracing::{error, info};

use dropshop_client::prelude::*;

use super::{CommandError, connect};

/// Errors that can occur while seeding.
#[derive(Debug, Error)]
pub enum SeedError {
    #[error("File not found: {0}")]
    NotFound(String),

    #[error("Failed to read seed file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid seed file: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("{0} validation errors found")]
    Invalid(usize),

    #[error(transparent)]
    Command(#[from] CommandError),

    #[error(transparent)]
    Client(#[from] ClientError),
}

/// Top-level seed document.
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SeedFile {
    #[serde(default)]
    pub drops: Vec<DropSeed>,
    #[serde(default)]
    pub products: Vec<ProductSeed>,
    #[serde(default)]
    pub users: Vec<UserSeed>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DropSeed {
    pub name: String,
    pub description: Option<String>,
    pub start_date: DateTime<Utc>,
    pub end_date: DateTime<Utc>,
    #[serde(default)]
    pub is_active: bool,
    /// Plain text; hashed on insert.
    pub password: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ProductSeed {
    pub name: String,
    pub slug: String,
    pub category: String,
    pub price: Decimal,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub images: Vec<String>,
    pub in_stock: Option<bool>,
    /// Name of a drop in the same file.
    pub drop: Option<String>,
    #[serde(default)]
    pub variants: Vec<VariantSeed>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct VariantSeed {
    pub size: String,
    pub color: String,
    pub sku: String,
    #[serde(default)]
    pub stock: i32,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct UserSeed {
    pub email: Email,
    pub name: Option<String>,
    pub firebase_uid: String,
    #[serde(default)]
    pub addresses: Vec<AddressSeed>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AddressSeed {
    pub street: String,
    pub city: String,
    pub state: String,
    pub postal_code: String,
    pub country: String,
    #[serde(default)]
    pub is_default: bool,
}

/// What a seed run wrote.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct SeedSummary {
    pub drops: usize,
    pub products: usize,
    pub variants: usize,
    pub users: usize,
}

impl SeedFile {
    /// Parse a seed document.
    ///
    /// # Errors
    ///
    /// Returns `SeedError::Yaml` on malformed YAML, unknown keys or invalid emails.
    pub fn parse(content: &str) -> Result<Self, SeedError> {
        Ok(serde_yaml::from_str(content)?)
    }

    /// Problems the database would reject, reported all at once.
    #[must_use]
    pub fn validate(&self) -> Vec<String> {
        let mut errors = Vec::new();

        let mut drop_names = HashSet::new();
        for drop in &self.drops {
            if !drop_names.insert(drop.name.as_str()) {
                errors.push(format!("duplicate drop name '{}'", drop.name));
            }
            if drop.end_date <= drop.start_date {
                errors.push(format!("drop '{}' must end after it starts", drop.name));
            }
        }

        let mut slugs = HashSet::new();
        let mut skus = HashSet::new();
        for product in &self.products {
            if !slugs.insert(product.slug.as_str()) {
                errors.push(format!("duplicate product slug '{}'", product.slug));
            }
            if product.price.is_sign_negative() {
                errors.push(format!("product '{}' has a negative price", product.slug));
            }
            if let Some(drop) = &product.drop {
                if !drop_names.contains(drop.as_str()) {
                    errors.push(format!("product '{}' references unknown drop '{drop}'", product.slug));
                }
            }
            for variant in &product.variants {
                if !skus.insert(variant.sku.as_str()) {
                    errors.push(format!("duplicate variant sku '{}'", variant.sku));
                }
                if variant.stock < 0 {
                    errors.push(format!("variant '{}' has negative stock", variant.sku));
                }
            }
        }

        let mut emails = HashSet::new();
        for user in &self.users {
            if !emails.insert(user.email.as_str()) {
                errors.push(format!("duplicate user email '{}'", user.email.as_str()));
            }
            if user.addresses.iter().filter(|a| a.is_default).count() > 1 {
                errors.push(format!(
                    "user '{}' has more than one default address",
                    user.email.as_str()
                ));
            }
        }

        errors
    }
}

/// Seed the database from `path`.
///
/// # Errors
///
/// Returns an error if the file cannot be read or fails validation, or a
/// database write fails.
pub async fn run(path: &Path, dry_run: bool) -> Result<(), SeedError> {
    if !path.exists() {
        return Err(SeedError::NotFound(path.display().to_string()));
    }

    info!(path = %path.display(), "Loading seed file");
    let content = tokio::fs::read_to_string(path).await?;
    let seed = SeedFile::parse(&content)?;
    info!(
        drops = seed.drops.len(),
        products = seed.products.len(),
        users = seed.users.len(),
        "Parsed seed file"
    );

    let errors = seed.validate();
    if !errors.is_empty() {
        error!("Seed file validation failed:");
        for err in &errors {
            error!("  - {err}");
        }
        return Err(SeedError::Invalid(errors.len()));
    }
    if dry_run {
        info!("Seed file is valid (dry run, nothing written)");
        return Ok(());
    }

    let client = connect().await?;
    let summary = apply(&client, seed).await?;
    client.disconnect().await;

    info!("Seeding complete!");
    info!("  Drops: {}", summary.drops);
    info!("  Products: {}", summary.products);
    info!("  Variants: {}", summary.variants);
    info!("  Users: {}", summary.users);
    Ok(())
}

/// Write a validated seed document.
///
/// # Errors
///
/// Returns `ClientError` if a write fails.
pub async fn apply(client: &Client, seed: SeedFile) -> Result<SeedSummary, ClientError> {
    let mut summary = SeedSummary::default();

    let mut drop_ids = Vec::with_capacity(seed.drops.len());
    for drop in seed.drops {
        let name = drop.name.clone();
        let id = seed_drop(client, drop).await?;
        drop_ids.push((name, id));
        summary.drops += 1;
    }

    for product in seed.products {
        let drop_id = match &product.drop {
            Some(name) => drop_ids.iter().find(|(n, _)| n == name).map(|(_, id)| *id),
            None => None,
        };
        summary.variants += product.variants.len();
        seed_product(client, product, drop_id).await?;
        summary.products += 1;
    }

    for user in seed.users {
        seed_user(client, user).await?;
        summary.users += 1;
    }

    Ok(summary)
}

async fn seed_drop(client: &Client, seed: DropSeed) -> Result<DropId, ClientError> {
    let existing = client
        .product_drop()
        .find_first(FindManyArgs::new().filter(DropWhereInput {
            name: Some(StringFilter::equals(seed.name.clone())),
            ..DropWhereInput::default()
        }))
        .await?;

    let drop = match existing {
        Some(existing) => {
            client
                .product_drop()
                .update(
                    DropWhereUniqueInput::Id(existing.id),
                    DropUpdateInput {
                        description: Some(seed.description),
                        start_date: Some(seed.start_date),
                        end_date: Some(seed.end_date),
                        is_active: Some(seed.is_active),
                        password: Some(seed.password),
                        ..DropUpdateInput::default()
                    },
                )
                .await?
        }
        None => {
            client
                .product_drop()
                .create(DropCreateInput {
                    description: seed.description,
                    is_active: Some(seed.is_active),
                    password: seed.password,
                    ..DropCreateInput::new(seed.name, seed.start_date, seed.end_date)
                })
                .await?
        }
    };
    tracing::debug!(drop_id = %drop.id, name = %drop.name, "Seeded drop");
    Ok(drop.id)
}

async fn seed_product(
    client: &Client,
    seed: ProductSeed,
    drop_id: Option<DropId>,
) -> Result<(), ClientError> {
    let product = client
        .product()
        .upsert(
            ProductWhereUniqueInput::Slug(seed.slug.clone()),
            ProductCreateInput {
                description: seed.description.clone(),
                images: seed.images.clone(),
                in_stock: seed.in_stock,
                drop_id,
                ..ProductCreateInput::new(
                    seed.name.clone(),
                    seed.slug.clone(),
                    seed.category.clone(),
                    seed.price,
                )
            },
            ProductUpdateInput {
                name: Some(seed.name),
                description: Some(seed.description),
                price: Some(NumericUpdate::Set(seed.price)),
                images: Some(ListUpdate::Set(seed.images)),
                category: Some(seed.category),
                in_stock: seed.in_stock,
                drop_id: Some(drop_id),
                ..ProductUpdateInput::default()
            },
        )
        .await?;

    for variant in seed.variants {
        client
            .product_variant()
            .upsert(
                ProductVariantWhereUniqueInput::Sku(variant.sku.clone()),
                ProductVariantCreateWithoutProductInput::new(
                    variant.size.clone(),
                    variant.color.clone(),
                    variant.sku,
                )
                .with_stock(variant.stock)
                .for_product(product.id),
                ProductVariantUpdateInput {
                    product_id: Some(product.id),
                    size: Some(variant.size),
                    color: Some(variant.color),
                    stock: Some(NumericUpdate::Set(variant.stock)),
                    ..ProductVariantUpdateInput::default()
                },
            )
            .await?;
    }
    tracing::debug!(product_id = %product.id, slug = %product.slug, "Seeded product");
    Ok(())
}

async fn seed_user(client: &Client, seed: UserSeed) -> Result<(), ClientError> {
    let addresses = seed
        .addresses
        .into_iter()
        .map(|a| AddressCreateWithoutUserInput {
            is_default: Some(a.is_default),
            ..AddressCreateWithoutUserInput::new(a.street, a.city, a.state, a.postal_code, a.country)
        })
        .collect();

    // Addresses are only created with a new user; reseeding keeps edits.
    let user = client
        .user()
        .upsert(
            UserWhereUniqueInput::Email(seed.email.clone()),
            UserCreateInput {
                name: seed.name.clone(),
                addresses,
                ..UserCreateInput::new(seed.email, seed.firebase_uid.clone())
            },
            UserUpdateInput {
                name: Some(seed.name),
                firebase_uid: Some(seed.firebase_uid),
                ..UserUpdateInput::default()
            },
        )
        .await?;
    tracing::debug!(user_id = %user.id, "Seeded user");
    Ok(())
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    const EXAMPLE: &str = include_str!("../../seed.example.yaml");

    #[test]
    fn test_example_file_is_valid() {
        let seed = SeedFile::parse(EXAMPLE).unwrap();
        assert!(!seed.drops.is_empty());
        assert!(!seed.products.is_empty());
        assert!(!seed.users.is_empty());
        assert_eq!(seed.validate(), Vec::<String>::new());
    }

    #[test]
    fn test_defaults() {
        let seed = SeedFile::parse(
            r#"
products:
  - name: Sticker
    slug: sticker
    category: accessories
    price: "1.99"
    variants:
      - { size: OS, color: white, sku: STK-OS-WHT }
"#,
        )
        .unwrap();
        let product = &seed.products[0];
        assert_eq!(product.price, Decimal::new(199, 2));
        assert_eq!(product.description, "");
        assert!(product.images.is_empty());
        assert_eq!(product.variants[0].stock, 0);
        assert!(seed.drops.is_empty());
    }

    #[test]
    fn test_unknown_keys_are_rejected() {
        let err = SeedFile::parse("products: []\ncustomers: []\n").unwrap_err();
        assert!(matches!(err, SeedError::Yaml(_)));
    }

    #[test]
    fn test_invalid_email_is_rejected() {
        let err = SeedFile::parse("users:\n  - email: not-an-email\n    firebase_uid: x\n")
            .unwrap_err();
        assert!(matches!(err, SeedError::Yaml(_)));
    }

    #[test]
    fn test_validate_reports_every_problem() {
        let seed = SeedFile::parse(
            r#"
drops:
  - name: Backwards
    start_date: 2026-06-08T00:00:00Z
    end_date: 2026-06-01T00:00:00Z
products:
  - name: A
    slug: a
    category: apparel
    price: "-1.00"
    drop: Missing
    variants:
      - { size: M, color: red, sku: DUP, stock: -2 }
  - name: A again
    slug: a
    category: apparel
    price: "1.00"
    variants:
      - { size: L, color: red, sku: DUP }
"#,
        )
        .unwrap();

        let errors = seed.validate();
        assert_eq!(errors.len(), 6, "{errors:#?}");
        assert!(errors.iter().any(|e| e.contains("must end after it starts")));
        assert!(errors.iter().any(|e| e.contains("unknown drop 'Missing'")));
        assert!(errors.iter().any(|e| e.contains("duplicate variant sku 'DUP'")));
    }
}
