//! Drop Shop Core - Shared types library.
//!
//! This crate provides common types used across all Drop Shop components:
//! - `client` - Typed data client for the shop database
//! - `cli` - Command-line tools for migrations, seeding and stats
//!
//! # Architecture
//!
//! The core crate contains only types and traits - no I/O, no database access,
//! no HTTP clients. This keeps it lightweight and allows it to be used anywhere.
//!
//! # Modules
//!
//! - [`types`] - Newtype wrappers for type-safe IDs, emails, order numbers,
//!   money, statuses and query enums

#![cfg_attr(not(test), forbid(unsafe_code))]

pub mod types;

pub use types::*;
