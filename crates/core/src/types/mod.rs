//! Core types for Drop Shop.
//!
//! This module provides type-safe wrappers for common domain concepts.

pub mod email;
pub mod id;
pub mod money;
pub mod order_number;
pub mod query;
pub mod status;

pub use email::{Email, EmailError};
pub use id::*;
pub use money::{MoneyError, line_total, round_money};
pub use order_number::{OrderNumber, OrderNumberError};
pub use query::{NullsOrder, QueryMode, SortOrder, TransactionIsolationLevel};
pub use status::*;
