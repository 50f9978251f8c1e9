//! Model traits and the argument types shared by every delegate.

use std::fmt::Debug;
use std::hash::Hash;

use sqlx::FromRow;
use sqlx::postgres::PgRow;

use dropshop_core::{NullsOrder, SortOrder};

use crate::error::ClientError;
use crate::filter::{UniqueWhere, WhereInput};
use crate::value::{FieldKind, IntoValue, Value};

/// A scalar column of a model.
pub trait ScalarField: Copy + Eq + Hash + Debug + Send + Sync + 'static {
    /// Every scalar field, in column order.
    const ALL: &'static [Self];

    /// Column name.
    fn column(self) -> &'static str;

    /// Storage type.
    fn kind(self) -> FieldKind;
}

/// A database-backed entity.
pub trait Model: for<'r> FromRow<'r, PgRow> + Clone + Debug + Send + Unpin + 'static {
    /// Model name used in errors and logs.
    const NAME: &'static str;
    /// Table name.
    const TABLE: &'static str;

    type Field: ScalarField;
    type Where: WhereInput + Default;
    type Unique: UniqueWhere;
    type Create: CreateInput;
    type Update: UpdateInput + Default;

    /// Primary key.
    fn id(&self) -> i32;

    /// Current value of a scalar field.
    fn value(&self, field: Self::Field) -> Value;
}

/// Insert data for a model.
pub trait CreateInput: Send {
    /// Split into column values and nested relation writes.
    ///
    /// Columns left out are written as `DEFAULT`.
    ///
    /// # Errors
    ///
    /// Returns `ClientError::Validation` if the input cannot be stored.
    fn into_row(self) -> Result<(Row, Vec<NestedCreate>), ClientError>;
}

/// Update data for a model.
pub trait UpdateInput: Send {
    /// Column assignments, excluding `updated_at`.
    ///
    /// # Errors
    ///
    /// Returns `ClientError::Validation` if the input cannot be stored.
    fn into_assignments(self) -> Result<Vec<Assignment>, ClientError>;
}

/// A single `INSERT` row of `(column, value)` pairs.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Row(pub(crate) Vec<(&'static str, Value)>);

impl Row {
    /// Set `column`.
    pub fn set(&mut self, column: &'static str, value: impl IntoValue) {
        self.0.push((column, value.into_value()));
    }

    /// Set `column` when a value is given, otherwise leave it to `DEFAULT`.
    pub fn set_opt<T: IntoValue>(&mut self, column: &'static str, value: Option<T>) {
        if let Some(v) = value {
            self.set(column, v);
        }
    }

    /// Column names, in insertion order.
    pub fn columns(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.0.iter().map(|(column, _)| *column)
    }

    pub(crate) fn take(&mut self, column: &str) -> Option<Value> {
        let pos = self.0.iter().position(|(c, _)| *c == column)?;
        Some(self.0.remove(pos).1)
    }
}

/// Child rows created together with their parent.
#[derive(Debug, Clone, PartialEq)]
pub struct NestedCreate {
    /// Child model name.
    pub model: &'static str,
    /// Child table.
    pub table: &'static str,
    /// Child column receiving the parent's id.
    pub foreign_key: &'static str,
    /// Child rows, without the foreign key.
    pub rows: Vec<Row>,
}

/// Right-hand side of a `SET` clause.
#[derive(Debug, Clone, PartialEq)]
pub enum SetExpr {
    Set(Value),
    Increment(Value),
    Decrement(Value),
    Multiply(Value),
    Divide(Value),
    /// Append to an array column.
    Push(Value),
}

/// A `column = expr` assignment.
pub type Assignment = (&'static str, SetExpr);

/// Update operations on a numeric field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NumericUpdate<T> {
    Set(T),
    Increment(T),
    Decrement(T),
    Multiply(T),
    Divide(T),
}

impl<T: IntoValue> NumericUpdate<T> {
    fn into_expr(self) -> SetExpr {
        match self {
            Self::Set(v) => SetExpr::Set(v.into_value()),
            Self::Increment(v) => SetExpr::Increment(v.into_value()),
            Self::Decrement(v) => SetExpr::Decrement(v.into_value()),
            Self::Multiply(v) => SetExpr::Multiply(v.into_value()),
            Self::Divide(v) => SetExpr::Divide(v.into_value()),
        }
    }
}

/// Update operations on a `TEXT[]` field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ListUpdate {
    Set(Vec<String>),
    Push(Vec<String>),
}

/// Collects the assignments of an update input.
#[derive(Debug, Default)]
pub(crate) struct Assignments(Vec<Assignment>);

impl Assignments {
    pub(crate) fn set<T: IntoValue>(&mut self, column: &'static str, value: Option<T>) {
        if let Some(v) = value {
            self.0.push((column, SetExpr::Set(v.into_value())));
        }
    }

    /// Nullable column: `Some(None)` writes `NULL`.
    pub(crate) fn set_nullable<T: IntoValue>(
        &mut self,
        column: &'static str,
        value: Option<Option<T>>,
    ) {
        if let Some(v) = value {
            self.0.push((column, SetExpr::Set(v.into_value())));
        }
    }

    pub(crate) fn numeric<T: IntoValue>(
        &mut self,
        column: &'static str,
        update: Option<NumericUpdate<T>>,
    ) {
        if let Some(u) = update {
            self.0.push((column, u.into_expr()));
        }
    }

    pub(crate) fn list(&mut self, column: &'static str, update: Option<ListUpdate>) {
        match update {
            Some(ListUpdate::Set(values)) => {
                self.0.push((column, SetExpr::Set(Value::TextArray(Some(values)))));
            }
            Some(ListUpdate::Push(values)) => {
                self.0.push((column, SetExpr::Push(Value::TextArray(Some(values)))));
            }
            None => {}
        }
    }

    pub(crate) fn finish(self) -> Vec<Assignment> {
        self.0
    }
}

// =============================================================================
// Query arguments
// =============================================================================

/// One ordering term.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OrderBy<F> {
    pub field: F,
    pub direction: SortOrder,
    /// Placement of `NULL`s; database default when `None`.
    pub nulls: Option<NullsOrder>,
}

impl<F> OrderBy<F> {
    #[must_use]
    pub const fn asc(field: F) -> Self {
        Self {
            field,
            direction: SortOrder::Asc,
            nulls: None,
        }
    }

    #[must_use]
    pub const fn desc(field: F) -> Self {
        Self {
            field,
            direction: SortOrder::Desc,
            nulls: None,
        }
    }

    #[must_use]
    pub const fn nulls(mut self, nulls: NullsOrder) -> Self {
        self.nulls = Some(nulls);
        self
    }
}

/// Arguments of `find_many` and `find_first`.
pub struct FindManyArgs<M: Model> {
    pub filter: Option<M::Where>,
    pub order_by: Vec<OrderBy<M::Field>>,
    /// Start at this record (inclusive).
    pub cursor: Option<M::Unique>,
    pub skip: Option<i64>,
    /// Negative values read backwards from the end (or from the cursor).
    pub take: Option<i64>,
    /// Keep the first record for each distinct combination of these fields.
    pub distinct: Vec<M::Field>,
}

impl<M: Model> Default for FindManyArgs<M> {
    fn default() -> Self {
        Self {
            filter: None,
            order_by: Vec::new(),
            cursor: None,
            skip: None,
            take: None,
            distinct: Vec::new(),
        }
    }
}

impl<M: Model> FindManyArgs<M> {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn filter(mut self, filter: M::Where) -> Self {
        self.filter = Some(filter);
        self
    }

    #[must_use]
    pub fn order_by(mut self, order: OrderBy<M::Field>) -> Self {
        self.order_by.push(order);
        self
    }

    #[must_use]
    pub fn cursor(mut self, cursor: M::Unique) -> Self {
        self.cursor = Some(cursor);
        self
    }

    #[must_use]
    pub const fn skip(mut self, skip: i64) -> Self {
        self.skip = Some(skip);
        self
    }

    #[must_use]
    pub const fn take(mut self, take: i64) -> Self {
        self.take = Some(take);
        self
    }

    #[must_use]
    pub fn distinct(mut self, fields: Vec<M::Field>) -> Self {
        self.distinct = fields;
        self
    }
}

impl<M: Model> Debug for FindManyArgs<M>
where
    M::Where: Debug,
    M::Unique: Debug,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FindManyArgs")
            .field("filter", &self.filter)
            .field("order_by", &self.order_by)
            .field("cursor", &self.cursor)
            .field("skip", &self.skip)
            .field("take", &self.take)
            .field("distinct", &self.distinct)
            .finish()
    }
}
