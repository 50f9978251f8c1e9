//! Interactive transactions.

use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

use sqlx::postgres::PgRow;
use sqlx::{FromRow, Postgres, Transaction};

use dropshop_core::TransactionIsolationLevel;

use crate::delegate::{Db, Delegate, QueryLog};
use crate::error::ClientError;
use crate::models::{Address, Order, OrderItem, Product, ProductDrop, ProductVariant, User};
use crate::raw;
use crate::value::Value;

/// Boxed future returned by transaction closures.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Options of an interactive transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransactionOptions {
    /// Isolation level; the database default when `None`.
    pub isolation_level: Option<TransactionIsolationLevel>,
    /// How long to wait for a connection before giving up.
    pub max_wait: Duration,
    /// How long the transaction body may run before it is rolled back.
    pub timeout: Duration,
}

impl Default for TransactionOptions {
    fn default() -> Self {
        Self {
            isolation_level: None,
            max_wait: Duration::from_secs(2),
            timeout: Duration::from_secs(5),
        }
    }
}

impl TransactionOptions {
    #[must_use]
    pub const fn isolation_level(mut self, level: TransactionIsolationLevel) -> Self {
        self.isolation_level = Some(level);
        self
    }

    #[must_use]
    pub const fn max_wait(mut self, max_wait: Duration) -> Self {
        self.max_wait = max_wait;
        self
    }

    #[must_use]
    pub const fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

/// A client bound to one open transaction.
///
/// Dropping it without calling [`TransactionClient::commit`] rolls back.
pub struct TransactionClient {
    tx: Transaction<'static, Postgres>,
    log: QueryLog,
}

impl TransactionClient {
    pub(crate) const fn new(tx: Transaction<'static, Postgres>, log: QueryLog) -> Self {
        Self { tx, log }
    }

    fn delegate<M: crate::model::Model>(&mut self) -> Delegate<'_, M> {
        Delegate::new(Db::Conn(&mut self.tx), self.log)
    }

    pub fn user(&mut self) -> Delegate<'_, User> {
        self.delegate()
    }

    pub fn product(&mut self) -> Delegate<'_, Product> {
        self.delegate()
    }

    pub fn product_variant(&mut self) -> Delegate<'_, ProductVariant> {
        self.delegate()
    }

    pub fn product_drop(&mut self) -> Delegate<'_, ProductDrop> {
        self.delegate()
    }

    pub fn order(&mut self) -> Delegate<'_, Order> {
        self.delegate()
    }

    pub fn order_item(&mut self) -> Delegate<'_, OrderItem> {
        self.delegate()
    }

    pub fn address(&mut self) -> Delegate<'_, Address> {
        self.delegate()
    }

    /// Run a raw query inside the transaction.
    ///
    /// # Errors
    ///
    /// Returns `ClientError::Database` if the query fails.
    pub async fn query_raw<T>(&mut self, sql: &str, binds: Vec<Value>) -> Result<Vec<T>, ClientError>
    where
        T: for<'r> FromRow<'r, PgRow> + Send + Unpin,
    {
        raw::query_raw(&mut *self.tx, self.log, sql, binds).await
    }

    /// Run a raw statement inside the transaction.
    ///
    /// # Errors
    ///
    /// Returns `ClientError::Database` if the statement fails.
    pub async fn execute_raw(&mut self, sql: &str, binds: Vec<Value>) -> Result<u64, ClientError> {
        raw::execute_raw(&mut *self.tx, self.log, sql, binds).await
    }

    /// Commit the transaction.
    ///
    /// # Errors
    ///
    /// Returns `ClientError::Database` if the commit fails.
    pub async fn commit(self) -> Result<(), ClientError> {
        self.tx.commit().await?;
        tracing::info!("Transaction committed");
        Ok(())
    }

    /// Roll the transaction back.
    ///
    /// # Errors
    ///
    /// Returns `ClientError::Database` if the rollback fails.
    pub async fn rollback(self) -> Result<(), ClientError> {
        self.tx.rollback().await?;
        tracing::info!("Transaction rolled back");
        Ok(())
    }
}

/// `SET TRANSACTION ISOLATION LEVEL ...` for `level`.
pub(crate) fn isolation_statement(level: TransactionIsolationLevel) -> String {
    format!("SET TRANSACTION ISOLATION LEVEL {}", level.as_sql())
}
