//! Entity models.
//!
//! Each module defines, for one table:
//!
//! - the row struct (decoded with `sqlx::FromRow`)
//! - a `*Field` enum of scalar columns
//! - `*WhereInput` / `*WhereUniqueInput` filters
//! - `*CreateInput` / `*UpdateInput` write inputs
//! - `*Include` / `*WithRelations` for batched relation loading

pub mod address;
pub mod drop;
pub mod order;
pub mod order_item;
pub mod product;
pub mod product_variant;
pub mod user;

pub use address::*;
pub use drop::*;
pub use order::*;
pub use order_item::*;
pub use product::*;
pub use product_variant::*;
pub use user::*;

use crate::filter::Relation;

/// `parent.id = child.<foreign_key>` seen from the parent.
pub(crate) const fn to_many(table: &'static str, foreign_key: &'static str) -> Relation {
    Relation {
        table,
        inner_column: foreign_key,
        outer_column: "id",
    }
}

/// `child.<foreign_key> = parent.id` seen from the child.
pub(crate) const fn to_one(table: &'static str, foreign_key: &'static str) -> Relation {
    Relation {
        table,
        inner_column: "id",
        outer_column: foreign_key,
    }
}
