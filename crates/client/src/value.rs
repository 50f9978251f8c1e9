//! Dynamically typed column values.
//!
//! Filters, inserts and updates are compiled into SQL at runtime, so every
//! bound parameter passes through [`Value`]. Each variant carries its own
//! nullability so a `NULL` is still bound with the right PostgreSQL type.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Serialize;
use sqlx::postgres::PgRow;
use sqlx::{Postgres, QueryBuilder, Row};

use dropshop_core::{
    AddressId, DropId, Email, OrderId, OrderItemId, OrderNumber, OrderStatus, ProductId,
    ProductVariantId, UserId,
};

/// SQL builder with owned bind parameters.
pub type Sql = QueryBuilder<'static, Postgres>;

/// The storage type of a scalar column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FieldKind {
    Int,
    Text,
    Bool,
    Decimal,
    Timestamp,
    TextArray,
    Status,
}

impl FieldKind {
    /// Whether `_sum` and `_avg` are defined for this kind.
    #[must_use]
    pub const fn is_numeric(self) -> bool {
        matches!(self, Self::Int | Self::Decimal)
    }

    /// A typed `NULL` of this kind.
    #[must_use]
    pub const fn null(self) -> Value {
        match self {
            Self::Int => Value::Int(None),
            Self::Text => Value::Text(None),
            Self::Bool => Value::Bool(None),
            Self::Decimal => Value::Decimal(None),
            Self::Timestamp => Value::Timestamp(None),
            Self::TextArray => Value::TextArray(None),
            Self::Status => Value::Status(None),
        }
    }

    /// Read the column named `column` from `row` as a value of this kind.
    pub(crate) fn decode(self, row: &PgRow, column: &str) -> Result<Value, sqlx::Error> {
        Ok(match self {
            Self::Int => Value::Int(row.try_get(column)?),
            Self::Text => Value::Text(row.try_get(column)?),
            Self::Bool => Value::Bool(row.try_get(column)?),
            Self::Decimal => Value::Decimal(row.try_get(column)?),
            Self::Timestamp => Value::Timestamp(row.try_get(column)?),
            Self::TextArray => Value::TextArray(row.try_get(column)?),
            Self::Status => Value::Status(row.try_get(column)?),
        })
    }
}

/// A single, possibly `NULL`, column value.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(untagged)]
pub enum Value {
    Int(Option<i32>),
    BigInt(Option<i64>),
    Text(Option<String>),
    Bool(Option<bool>),
    Decimal(Option<Decimal>),
    Timestamp(Option<DateTime<Utc>>),
    TextArray(Option<Vec<String>>),
    Status(Option<OrderStatus>),
}

impl Value {
    /// Whether this is a `NULL` of any type.
    #[must_use]
    pub const fn is_null(&self) -> bool {
        matches!(
            self,
            Self::Int(None)
                | Self::BigInt(None)
                | Self::Text(None)
                | Self::Bool(None)
                | Self::Decimal(None)
                | Self::Timestamp(None)
                | Self::TextArray(None)
                | Self::Status(None)
        )
    }

    /// The integer payload, if any.
    #[must_use]
    pub const fn as_i32(&self) -> Option<i32> {
        match self {
            Self::Int(v) => *v,
            _ => None,
        }
    }

    /// Lowercase a text payload (used for case-insensitive `IN` lists).
    #[must_use]
    pub fn lowercased(self) -> Self {
        match self {
            Self::Text(Some(s)) => Self::Text(Some(s.to_lowercase())),
            other => other,
        }
    }

    /// Append this value to `sql` as a bind parameter.
    pub(crate) fn push_bind(self, sql: &mut Sql) {
        match self {
            Self::Int(v) => sql.push_bind(v),
            Self::BigInt(v) => sql.push_bind(v),
            Self::Text(v) => sql.push_bind(v),
            Self::Bool(v) => sql.push_bind(v),
            Self::Decimal(v) => sql.push_bind(v),
            Self::Timestamp(v) => sql.push_bind(v),
            Self::TextArray(v) => sql.push_bind(v),
            Self::Status(v) => sql.push_bind(v),
        };
    }
}

/// Conversion into a bindable [`Value`] with a statically known kind.
pub trait IntoValue {
    /// Column kind of this Rust type.
    const KIND: FieldKind;

    /// Convert into a value.
    fn into_value(self) -> Value;
}

impl<T: IntoValue> IntoValue for Option<T> {
    const KIND: FieldKind = T::KIND;

    fn into_value(self) -> Value {
        self.map_or(T::KIND.null(), IntoValue::into_value)
    }
}

impl IntoValue for i32 {
    const KIND: FieldKind = FieldKind::Int;

    fn into_value(self) -> Value {
        Value::Int(Some(self))
    }
}

impl IntoValue for String {
    const KIND: FieldKind = FieldKind::Text;

    fn into_value(self) -> Value {
        Value::Text(Some(self))
    }
}

impl IntoValue for &str {
    const KIND: FieldKind = FieldKind::Text;

    fn into_value(self) -> Value {
        Value::Text(Some(self.to_owned()))
    }
}

impl IntoValue for bool {
    const KIND: FieldKind = FieldKind::Bool;

    fn into_value(self) -> Value {
        Value::Bool(Some(self))
    }
}

impl IntoValue for Decimal {
    const KIND: FieldKind = FieldKind::Decimal;

    fn into_value(self) -> Value {
        Value::Decimal(Some(self))
    }
}

impl IntoValue for DateTime<Utc> {
    const KIND: FieldKind = FieldKind::Timestamp;

    fn into_value(self) -> Value {
        Value::Timestamp(Some(self))
    }
}

impl IntoValue for Vec<String> {
    const KIND: FieldKind = FieldKind::TextArray;

    fn into_value(self) -> Value {
        Value::TextArray(Some(self))
    }
}

impl IntoValue for OrderStatus {
    const KIND: FieldKind = FieldKind::Status;

    fn into_value(self) -> Value {
        Value::Status(Some(self))
    }
}

impl IntoValue for Email {
    const KIND: FieldKind = FieldKind::Text;

    fn into_value(self) -> Value {
        Value::Text(Some(self.into_inner()))
    }
}

impl IntoValue for OrderNumber {
    const KIND: FieldKind = FieldKind::Text;

    fn into_value(self) -> Value {
        Value::Text(Some(self.into_inner()))
    }
}

macro_rules! id_into_value {
    ($($id:ty),* $(,)?) => {
        $(
            impl IntoValue for $id {
                const KIND: FieldKind = FieldKind::Int;

                fn into_value(self) -> Value {
                    Value::Int(Some(self.as_i32()))
                }
            }
        )*
    };
}

id_into_value!(
    UserId,
    ProductId,
    ProductVariantId,
    DropId,
    OrderId,
    OrderItemId,
    AddressId,
);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_option_none_is_typed_null() {
        assert_eq!(None::<Decimal>.into_value(), Value::Decimal(None));
        assert_eq!(None::<UserId>.into_value(), Value::Int(None));
        assert!(None::<String>.into_value().is_null());
    }

    #[test]
    fn test_ids_become_ints() {
        assert_eq!(OrderId::new(9).into_value(), Value::Int(Some(9)));
        assert_eq!(OrderId::new(9).into_value().as_i32(), Some(9));
    }

    #[test]
    fn test_numeric_kinds() {
        assert!(FieldKind::Int.is_numeric());
        assert!(FieldKind::Decimal.is_numeric());
        assert!(!FieldKind::Text.is_numeric());
        assert!(!FieldKind::Timestamp.is_numeric());
    }

    #[test]
    fn test_push_bind_numbers_placeholders() {
        let mut sql = Sql::new("SELECT ");
        Value::Int(Some(1)).push_bind(&mut sql);
        sql.push(", ");
        Value::Text(None).push_bind(&mut sql);
        assert_eq!(sql.sql(), "SELECT $1, $2");
    }

    #[test]
    fn test_lowercased_only_touches_text() {
        assert_eq!(
            Value::Text(Some("MiXeD".into())).lowercased(),
            Value::Text(Some("mixed".into()))
        );
        assert_eq!(Value::Int(Some(1)).lowercased(), Value::Int(Some(1)));
    }
}
