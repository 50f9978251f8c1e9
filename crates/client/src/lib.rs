//! Drop Shop data client.
//!
//! A typed PostgreSQL client for the shop's seven models: users, products,
//! product variants, drops, orders, order items and addresses.
//!
//! # Architecture
//!
//! - [`Client`] owns the pool and hands out one [`Delegate`] per model
//! - Delegates compile typed `where`/`create`/`update` inputs into SQL with
//!   bound parameters and decode rows into model structs
//! - [`TransactionClient`] exposes the same delegates inside a transaction
//! - [`services`] holds the shop's business rules (checkout, drops, addresses)
//!
//! # Example
//!
//! ```rust,ignore
//! use dropshop_client::prelude::*;
//!
//! let client = Client::connect(&ClientConfig::from_env()?).await?;
//! let hoodies = client
//!     .product()
//!     .find_many(
//!         FindManyArgs::new()
//!             .filter(ProductWhereInput {
//!                 name: Some(StringFilter::contains("hoodie").insensitive()),
//!                 in_stock: Some(Filter::equals(true)),
//!                 ..Default::default()
//!             })
//!             .order_by(OrderBy::desc(ProductField::Price))
//!             .take(20),
//!     )
//!     .await?;
//! ```

#![cfg_attr(not(test), forbid(unsafe_code))]

pub mod aggregate;
pub mod client;
pub mod config;
pub mod delegate;
pub mod error;
pub mod filter;
pub mod model;
pub mod models;
pub mod password;
mod query;
mod raw;
pub mod services;
pub mod transaction;
pub mod value;

pub use aggregate::{
    AggregateArgs, AggregateResult, AggregateSelection, GroupByArgs, GroupByRow, GroupOrderBy,
    Having,
};
pub use client::Client;
pub use config::{ClientConfig, ConfigError};
pub use delegate::Delegate;
pub use error::ClientError;
pub use filter::{
    AggregateFn, CompareOp, Condition, Filter, ListRelationFilter, RelationFilter, StringFilter,
    StringListFilter,
};
pub use model::{FindManyArgs, ListUpdate, Model, NumericUpdate, OrderBy, ScalarField};
pub use transaction::{BoxFuture, TransactionClient, TransactionOptions};
pub use value::Value;

/// Everything needed to build queries.
pub mod prelude {
    pub use dropshop_core::*;

    pub use crate::aggregate::*;
    pub use crate::models::*;
    pub use crate::{
        BoxFuture, Client, ClientConfig, ClientError, CompareOp, Delegate, Filter, FindManyArgs,
        ListRelationFilter, ListUpdate, Model, NumericUpdate, OrderBy, RelationFilter,
        StringFilter, StringListFilter, TransactionClient, TransactionOptions, Value,
    };
    pub use crate::filter::AggregateFn;
}
