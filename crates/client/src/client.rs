//! The data client.

use secrecy::ExposeSecret;
use sqlx::postgres::{PgPoolOptions, PgRow};
use sqlx::{FromRow, PgPool};

use crate::config::ClientConfig;
use crate::delegate::{Db, Delegate, QueryLog};
use crate::error::ClientError;
use crate::model::Model;
use crate::models::{Address, Order, OrderItem, Product, ProductDrop, ProductVariant, User};
use crate::raw;
use crate::transaction::{self, BoxFuture, TransactionClient, TransactionOptions};
use crate::value::Value;

/// Entry point: a connection pool plus one delegate per model.
///
/// Cloning is cheap; clones share the pool.
#[derive(Debug, Clone)]
pub struct Client {
    pool: PgPool,
    log: QueryLog,
}

impl Client {
    /// Connect a pool using `config`.
    ///
    /// # Errors
    ///
    /// Returns `ClientError::Database` if the connection cannot be established.
    pub async fn connect(config: &ClientConfig) -> Result<Self, ClientError> {
        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .min_connections(config.min_connections)
            .acquire_timeout(config.acquire_timeout)
            .connect(config.database_url.expose_secret())
            .await?;
        tracing::info!(
            max_connections = config.max_connections,
            "Connected to database"
        );
        Ok(Self {
            pool,
            log: QueryLog {
                info: config.log_queries,
            },
        })
    }

    /// Wrap an existing pool.
    #[must_use]
    pub fn from_pool(pool: PgPool) -> Self {
        Self {
            pool,
            log: QueryLog::default(),
        }
    }

    /// Log every statement at `info` instead of `debug`.
    #[must_use]
    pub const fn with_query_logging(mut self, enabled: bool) -> Self {
        self.log.info = enabled;
        self
    }

    /// The underlying pool.
    #[must_use]
    pub const fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Close every pooled connection.
    pub async fn disconnect(&self) {
        self.pool.close().await;
        tracing::info!("Disconnected from database");
    }

    /// Apply the embedded migrations.
    ///
    /// # Errors
    ///
    /// Returns `ClientError::Migration` if a migration fails.
    pub async fn migrate(&self) -> Result<(), ClientError> {
        sqlx::migrate!("./migrations").run(&self.pool).await?;
        tracing::info!("Migrations applied");
        Ok(())
    }

    fn delegate<M: Model>(&self) -> Delegate<'_, M> {
        Delegate::new(Db::Pool(&self.pool), self.log)
    }

    #[must_use]
    pub fn user(&self) -> Delegate<'_, User> {
        self.delegate()
    }

    #[must_use]
    pub fn product(&self) -> Delegate<'_, Product> {
        self.delegate()
    }

    #[must_use]
    pub fn product_variant(&self) -> Delegate<'_, ProductVariant> {
        self.delegate()
    }

    #[must_use]
    pub fn product_drop(&self) -> Delegate<'_, ProductDrop> {
        self.delegate()
    }

    #[must_use]
    pub fn order(&self) -> Delegate<'_, Order> {
        self.delegate()
    }

    #[must_use]
    pub fn order_item(&self) -> Delegate<'_, OrderItem> {
        self.delegate()
    }

    #[must_use]
    pub fn address(&self) -> Delegate<'_, Address> {
        self.delegate()
    }

    /// Run a raw query and decode each row as `T`.
    ///
    /// # Errors
    ///
    /// Returns `ClientError::Database` if the query fails.
    pub async fn query_raw<T>(&self, sql: &str, binds: Vec<Value>) -> Result<Vec<T>, ClientError>
    where
        T: for<'r> FromRow<'r, PgRow> + Send + Unpin,
    {
        let mut conn = self.pool.acquire().await?;
        raw::query_raw(&mut conn, self.log, sql, binds).await
    }

    /// Run a raw statement and return the number of affected rows.
    ///
    /// # Errors
    ///
    /// Returns `ClientError::Database` if the statement fails.
    pub async fn execute_raw(&self, sql: &str, binds: Vec<Value>) -> Result<u64, ClientError> {
        let mut conn = self.pool.acquire().await?;
        raw::execute_raw(&mut conn, self.log, sql, binds).await
    }

    /// Open a transaction.
    ///
    /// # Errors
    ///
    /// Returns `ClientError::TransactionStartTimeout` if no connection is
    /// available within `options.max_wait`.
    pub async fn begin(&self, options: TransactionOptions) -> Result<TransactionClient, ClientError> {
        let mut tx = tokio::time::timeout(options.max_wait, self.pool.begin())
            .await
            .map_err(|_| {
                tracing::warn!(max_wait = ?options.max_wait, "Timed out starting transaction");
                ClientError::TransactionStartTimeout(options.max_wait)
            })??;
        if let Some(level) = options.isolation_level {
            let statement = transaction::isolation_statement(level);
            self.log.statement("transaction", "isolation_level", &statement);
            sqlx::query(&statement).execute(&mut *tx).await?;
        }
        Ok(TransactionClient::new(tx, self.log))
    }

    /// Run `f` inside a transaction.
    ///
    /// Commits when `f` returns `Ok`, rolls back when it returns `Err` or
    /// exceeds `options.timeout`.
    ///
    /// ```ignore
    /// let order = client
    ///     .transaction(TransactionOptions::default(), |tx| {
    ///         Box::pin(async move {
    ///             let order = tx.order().create(input).await?;
    ///             Ok::<_, ClientError>(order)
    ///         })
    ///     })
    ///     .await?;
    /// ```
    ///
    /// # Errors
    ///
    /// Returns the error of `f`, or `ClientError::TransactionTimeout`
    /// (converted into `E`) when the body runs too long.
    pub async fn transaction<T, E, F>(&self, options: TransactionOptions, f: F) -> Result<T, E>
    where
        F: for<'t> FnOnce(&'t mut TransactionClient) -> BoxFuture<'t, Result<T, E>>,
        E: From<ClientError>,
    {
        let mut tx = self.begin(options).await?;
        let outcome = tokio::time::timeout(options.timeout, f(&mut tx)).await;
        match outcome {
            Ok(Ok(value)) => {
                tx.commit().await?;
                Ok(value)
            }
            Ok(Err(e)) => {
                if let Err(rollback_err) = tx.rollback().await {
                    tracing::warn!(error = %rollback_err, "Rollback failed");
                }
                Err(e)
            }
            Err(_) => {
                tracing::warn!(timeout = ?options.timeout, "Transaction timed out, rolling back");
                if let Err(rollback_err) = tx.rollback().await {
                    tracing::warn!(error = %rollback_err, "Rollback failed");
                }
                Err(ClientError::TransactionTimeout(options.timeout).into())
            }
        }
    }
}
