//! Drop service.

use chrono::{DateTime, Utc};
use thiserror::Error;

use dropshop_core::DropId;

use crate::client::Client;
use crate::error::ClientError;
use crate::model::{FindManyArgs, OrderBy};
use crate::models::{DropField, DropWhereInput, DropWhereUniqueInput, ProductDrop};

/// Errors from drop access checks.
#[derive(Debug, Error)]
pub enum DropError {
    /// No drop with this id.
    #[error("drop {0} not found")]
    NotFound(DropId),

    /// The drop is inactive or outside its window.
    #[error("drop {0} is not live")]
    NotLive(DropId),

    /// Wrong password for a protected drop.
    #[error("invalid drop password")]
    InvalidPassword,

    #[error(transparent)]
    Client(#[from] ClientError),
}

/// Read access to drops.
pub struct DropService<'a> {
    client: &'a Client,
}

impl<'a> DropService<'a> {
    #[must_use]
    pub const fn new(client: &'a Client) -> Self {
        Self { client }
    }

    /// Drops live at `now`, earliest start first.
    ///
    /// # Errors
    ///
    /// Returns `DropError::Client` if the query fails.
    pub async fn live_drops(&self, now: DateTime<Utc>) -> Result<Vec<ProductDrop>, DropError> {
        let drops = self
            .client
            .product_drop()
            .find_many(
                FindManyArgs::new()
                    .filter(DropWhereInput::live_at(now))
                    .order_by(OrderBy::asc(DropField::StartDate)),
            )
            .await?;
        tracing::debug!(count = drops.len(), "Loaded live drops");
        Ok(drops)
    }

    /// Check a visitor's password against a live drop.
    ///
    /// # Errors
    ///
    /// Returns `DropError::NotFound`, `DropError::NotLive` or
    /// `DropError::InvalidPassword`.
    pub async fn unlock(&self, id: DropId, password: &str) -> Result<ProductDrop, DropError> {
        self.unlock_at(id, password, Utc::now()).await
    }

    /// [`unlock`](Self::unlock) evaluated at `now`.
    ///
    /// # Errors
    ///
    /// See [`unlock`](Self::unlock).
    pub async fn unlock_at(
        &self,
        id: DropId,
        password: &str,
        now: DateTime<Utc>,
    ) -> Result<ProductDrop, DropError> {
        let drop = self
            .client
            .product_drop()
            .find_unique(DropWhereUniqueInput::Id(id))
            .await?
            .ok_or(DropError::NotFound(id))?;

        if !drop.is_live(now) {
            return Err(DropError::NotLive(id));
        }
        if !drop.verify_password(password) {
            tracing::info!(drop_id = %id, "Drop unlock rejected");
            return Err(DropError::InvalidPassword);
        }

        tracing::info!(drop_id = %id, "Drop unlocked");
        Ok(drop)
    }
}
