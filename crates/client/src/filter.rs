//! Filter inputs and the condition tree they compile to.
//!
//! Every `*WhereInput` is lowered into a [`Condition`], which renders itself
//! into a `WHERE` clause. Table aliases are scoped (`t0`, `t1`, ...) so
//! relation filters can nest correlated `EXISTS` subqueries to any depth.

use dropshop_core::{NullsOrder, QueryMode, SortOrder};

use crate::value::{IntoValue, Sql, Value};

// =============================================================================
// Condition tree
// =============================================================================

/// Comparison operator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompareOp {
    Eq,
    Ne,
    Lt,
    Lte,
    Gt,
    Gte,
}

impl CompareOp {
    const fn as_sql(self) -> &'static str {
        match self {
            Self::Eq => "=",
            Self::Ne => "<>",
            Self::Lt => "<",
            Self::Lte => "<=",
            Self::Gt => ">",
            Self::Gte => ">=",
        }
    }
}

/// Aggregate function usable in `having` and aggregate ordering.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AggregateFn {
    Count,
    Sum,
    Avg,
    Min,
    Max,
}

impl AggregateFn {
    /// SQL function name.
    #[must_use]
    pub const fn as_sql(self) -> &'static str {
        match self {
            Self::Count => "COUNT",
            Self::Sum => "SUM",
            Self::Avg => "AVG",
            Self::Min => "MIN",
            Self::Max => "MAX",
        }
    }

    /// Prefix of the result alias, e.g. `_sum`.
    #[must_use]
    pub const fn alias_prefix(self) -> &'static str {
        match self {
            Self::Count => "_count",
            Self::Sum => "_sum",
            Self::Avg => "_avg",
            Self::Min => "_min",
            Self::Max => "_max",
        }
    }
}

/// Left-hand side of a comparison.
#[derive(Debug, Clone, PartialEq)]
pub enum Operand {
    /// A column of the current scope.
    Column(&'static str),
    /// An aggregate over a column, or `COUNT(*)` when the column is `None`.
    Aggregate(AggregateFn, Option<&'static str>),
}

/// Table alias scope used while rendering.
#[derive(Debug, Clone, Copy)]
pub(crate) struct Scope {
    prefix: &'static str,
    depth: usize,
}

impl Scope {
    /// Outermost scope of a statement, alias `t0`.
    pub(crate) const ROOT: Self = Self {
        prefix: "t",
        depth: 0,
    };

    /// Scope of the cursor subselect, alias `c0`.
    pub(crate) const CURSOR: Self = Self {
        prefix: "c",
        depth: 0,
    };

    pub(crate) fn alias(self) -> String {
        format!("{}{}", self.prefix, self.depth)
    }

    const fn nested(self) -> Self {
        Self {
            prefix: self.prefix,
            depth: self.depth + 1,
        }
    }
}

/// A compiled boolean expression over one table.
#[derive(Debug, Clone, PartialEq)]
pub enum Condition {
    True,
    False,
    Compare {
        operand: Operand,
        op: CompareOp,
        value: Value,
        insensitive: bool,
    },
    InList {
        column: &'static str,
        values: Vec<Value>,
        negated: bool,
        insensitive: bool,
    },
    IsNull {
        column: &'static str,
        negated: bool,
    },
    /// `LIKE` with an already escaped pattern.
    Like {
        column: &'static str,
        pattern: String,
        insensitive: bool,
    },
    ArrayHas {
        column: &'static str,
        value: String,
    },
    ArrayContains {
        column: &'static str,
        values: Vec<String>,
    },
    ArrayOverlaps {
        column: &'static str,
        values: Vec<String>,
    },
    ArrayIsEmpty {
        column: &'static str,
        empty: bool,
    },
    And(Vec<Condition>),
    Or(Vec<Condition>),
    Not(Box<Condition>),
    /// `(inner) IS NOT TRUE`: holds when the inner condition is false or `NULL`.
    IsNotTrue(Box<Condition>),
    /// Correlated subquery: `EXISTS (SELECT 1 FROM table WHERE table.inner = outer.outer AND ...)`.
    Exists {
        table: &'static str,
        inner_column: &'static str,
        outer_column: &'static str,
        condition: Box<Condition>,
        negated: bool,
    },
    /// Rows at or after the row matched by `unique` in the given ordering.
    Cursor {
        table: &'static str,
        order: Vec<CursorKey>,
        unique: Box<Condition>,
    },
}

/// One ordering column of a cursor comparison.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CursorKey {
    pub column: &'static str,
    pub direction: SortOrder,
    /// Effective placement of `NULL`s, explicit or the PostgreSQL default.
    pub nulls: NullsOrder,
}

impl CursorKey {
    /// Key with PostgreSQL's default null placement for `direction`.
    #[must_use]
    pub const fn new(column: &'static str, direction: SortOrder, nulls: Option<NullsOrder>) -> Self {
        let nulls = match nulls {
            Some(nulls) => nulls,
            None => match direction {
                SortOrder::Asc => NullsOrder::Last,
                SortOrder::Desc => NullsOrder::First,
            },
        };
        Self {
            column,
            direction,
            nulls,
        }
    }
}

impl Condition {
    /// Equality against a column.
    #[must_use]
    pub fn eq(column: &'static str, value: impl IntoValue) -> Self {
        Self::Compare {
            operand: Operand::Column(column),
            op: CompareOp::Eq,
            value: value.into_value(),
            insensitive: false,
        }
    }

    /// `column IN (values)` over integer keys.
    #[must_use]
    pub fn in_ids(column: &'static str, ids: &[i32]) -> Self {
        Self::InList {
            column,
            values: ids.iter().map(|id| Value::Int(Some(*id))).collect(),
            negated: false,
            insensitive: false,
        }
    }

    /// Conjunction, collapsing trivial cases.
    #[must_use]
    pub fn all(mut conditions: Vec<Self>) -> Self {
        conditions.retain(|c| *c != Self::True);
        match conditions.len() {
            0 => Self::True,
            1 => conditions.pop().unwrap_or(Self::True),
            _ => Self::And(conditions),
        }
    }

    /// Negation.
    #[must_use]
    pub fn negate(self) -> Self {
        match self {
            Self::True => Self::False,
            Self::False => Self::True,
            Self::Not(inner) => *inner,
            other => Self::Not(Box::new(other)),
        }
    }

    /// Render into `sql` at the outermost scope.
    pub(crate) fn render(self, sql: &mut Sql) {
        self.render_in(sql, Scope::ROOT);
    }

    pub(crate) fn render_in(self, sql: &mut Sql, scope: Scope) {
        let alias = scope.alias();
        match self {
            Self::True => {
                sql.push("TRUE");
            }
            Self::False => {
                sql.push("FALSE");
            }
            Self::Compare {
                operand,
                op,
                value,
                insensitive,
            } => {
                if insensitive {
                    sql.push("LOWER(");
                    push_operand(sql, &alias, &operand);
                    sql.push(format!(") {} LOWER(", op.as_sql()));
                    value.push_bind(sql);
                    sql.push(")");
                } else {
                    push_operand(sql, &alias, &operand);
                    sql.push(format!(" {} ", op.as_sql()));
                    value.push_bind(sql);
                }
            }
            Self::InList {
                values, negated, ..
            } if values.is_empty() => {
                sql.push(if negated { "TRUE" } else { "FALSE" });
            }
            Self::InList {
                column,
                values,
                negated,
                insensitive,
            } => {
                if insensitive {
                    sql.push(format!("LOWER({alias}.{column})"));
                } else {
                    sql.push(format!("{alias}.{column}"));
                }
                sql.push(if negated { " NOT IN (" } else { " IN (" });
                let mut separated = sql.separated(", ");
                for value in values {
                    let value = if insensitive { value.lowercased() } else { value };
                    match value {
                        Value::Int(v) => separated.push_bind(v),
                        Value::BigInt(v) => separated.push_bind(v),
                        Value::Text(v) => separated.push_bind(v),
                        Value::Bool(v) => separated.push_bind(v),
                        Value::Decimal(v) => separated.push_bind(v),
                        Value::Timestamp(v) => separated.push_bind(v),
                        Value::TextArray(v) => separated.push_bind(v),
                        Value::Status(v) => separated.push_bind(v),
                    };
                }
                sql.push(")");
            }
            Self::IsNull { column, negated } => {
                sql.push(format!(
                    "{alias}.{column} IS {}NULL",
                    if negated { "NOT " } else { "" }
                ));
            }
            Self::Like {
                column,
                pattern,
                insensitive,
            } => {
                let op = if insensitive { "ILIKE" } else { "LIKE" };
                sql.push(format!("{alias}.{column} {op} "));
                sql.push_bind(pattern);
            }
            Self::ArrayHas { column, value } => {
                sql.push(format!("{alias}.{column} @> ARRAY["));
                sql.push_bind(value);
                sql.push("]::text[]");
            }
            Self::ArrayContains { column, values } => {
                sql.push(format!("{alias}.{column} @> "));
                sql.push_bind(values);
                sql.push("::text[]");
            }
            Self::ArrayOverlaps { column, values } => {
                sql.push(format!("{alias}.{column} && "));
                sql.push_bind(values);
                sql.push("::text[]");
            }
            Self::ArrayIsEmpty { column, empty } => {
                let op = if empty { "=" } else { ">" };
                sql.push(format!("COALESCE(cardinality({alias}.{column}), 0) {op} 0"));
            }
            Self::And(conditions) => render_joined(sql, conditions, " AND ", "TRUE", scope),
            Self::Or(conditions) => render_joined(sql, conditions, " OR ", "FALSE", scope),
            Self::Not(inner) => {
                sql.push("NOT (");
                inner.render_in(sql, scope);
                sql.push(")");
            }
            Self::IsNotTrue(inner) => {
                sql.push("(");
                inner.render_in(sql, scope);
                sql.push(") IS NOT TRUE");
            }
            Self::Exists {
                table,
                inner_column,
                outer_column,
                condition,
                negated,
            } => {
                let inner = scope.nested();
                let inner_alias = inner.alias();
                if negated {
                    sql.push("NOT ");
                }
                sql.push(format!(
                    "EXISTS (SELECT 1 FROM {table} AS {inner_alias} \
                     WHERE {inner_alias}.{inner_column} = {alias}.{outer_column}"
                ));
                if *condition != Self::True {
                    sql.push(" AND (");
                    condition.render_in(sql, inner);
                    sql.push(")");
                }
                sql.push(")");
            }
            Self::Cursor {
                table,
                order,
                unique,
            } => render_cursor(sql, &alias, table, &order, &unique),
        }
    }
}

fn push_operand(sql: &mut Sql, alias: &str, operand: &Operand) {
    match operand {
        Operand::Column(column) => {
            sql.push(format!("{alias}.{column}"));
        }
        Operand::Aggregate(function, None) => {
            sql.push(format!("{}(*)", function.as_sql()));
        }
        Operand::Aggregate(function, Some(column)) => {
            sql.push(format!("{}({alias}.{column})", function.as_sql()));
        }
    }
}

fn render_joined(
    sql: &mut Sql,
    conditions: Vec<Condition>,
    separator: &str,
    empty: &str,
    scope: Scope,
) {
    if conditions.is_empty() {
        sql.push(empty);
        return;
    }
    sql.push("(");
    for (i, condition) in conditions.into_iter().enumerate() {
        if i > 0 {
            sql.push(separator);
        }
        condition.render_in(sql, scope);
    }
    sql.push(")");
}

/// Lexicographic "at or after" comparison against the cursor row.
///
/// For keys `a, b, ...` renders one branch per key, where earlier keys are
/// `IS NOT DISTINCT FROM` the cursor's and the branch key sorts strictly
/// after it, plus a final all-equal branch that makes the cursor inclusive.
/// Strict comparisons place `NULL`s per each key's effective `nulls`. A
/// missing cursor row matches nothing.
fn render_cursor(
    sql: &mut Sql,
    alias: &str,
    table: &'static str,
    order: &[CursorKey],
    unique: &Condition,
) {
    let cursor_alias = Scope::CURSOR.alias();
    let cursor_value = |sql: &mut Sql, column: &str| {
        sql.push(format!(
            "(SELECT {cursor_alias}.{column} FROM {table} AS {cursor_alias} WHERE "
        ));
        unique.clone().render_in(sql, Scope::CURSOR);
        sql.push(")");
    };

    sql.push(format!("(EXISTS (SELECT 1 FROM {table} AS {cursor_alias} WHERE "));
    unique.clone().render_in(sql, Scope::CURSOR);
    sql.push(") AND (");
    for branch in 0..=order.len() {
        if branch > 0 {
            sql.push(" OR ");
        }
        sql.push("(");
        for (i, key) in order.iter().enumerate().take(branch + 1) {
            if i > 0 {
                sql.push(" AND ");
            }
            let column = key.column;
            if i < branch || branch == order.len() {
                sql.push(format!("{alias}.{column} IS NOT DISTINCT FROM "));
                cursor_value(sql, column);
                continue;
            }
            let op = match key.direction {
                SortOrder::Asc => ">",
                SortOrder::Desc => "<",
            };
            sql.push(format!("(COALESCE({alias}.{column} {op} "));
            cursor_value(sql, column);
            // Non-null values follow a null cursor only under NULLS FIRST,
            // nulls follow a non-null cursor only under NULLS LAST.
            let (row_null, cursor_null) = match key.nulls {
                NullsOrder::First => ("IS NOT NULL", "IS NULL"),
                NullsOrder::Last => ("IS NULL", "IS NOT NULL"),
            };
            sql.push(format!(", FALSE) OR ({alias}.{column} {row_null} AND "));
            cursor_value(sql, column);
            sql.push(format!(" {cursor_null}))"));
        }
        sql.push(")");
    }
    sql.push("))");
}

/// Escape `LIKE` metacharacters in user input.
#[must_use]
pub fn escape_like(input: &str) -> String {
    let mut escaped = String::with_capacity(input.len());
    for c in input.chars() {
        if matches!(c, '\\' | '%' | '_') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}

// =============================================================================
// Field filters
// =============================================================================

/// A filter on a single scalar column.
pub trait FieldFilter {
    /// Compile into a condition on `column`.
    fn into_condition(self, column: &'static str) -> Condition;
}

/// Scalar filter for numbers, booleans, timestamps, ids and enums.
#[derive(Debug, Clone, PartialEq)]
pub struct Filter<T> {
    pub equals: Option<T>,
    pub in_list: Option<Vec<T>>,
    pub not_in: Option<Vec<T>>,
    pub lt: Option<T>,
    pub lte: Option<T>,
    pub gt: Option<T>,
    pub gte: Option<T>,
    pub not: Option<Box<Filter<T>>>,
    /// `Some(true)` matches `NULL`, `Some(false)` matches non-`NULL`.
    pub is_null: Option<bool>,
}

impl<T> Default for Filter<T> {
    fn default() -> Self {
        Self {
            equals: None,
            in_list: None,
            not_in: None,
            lt: None,
            lte: None,
            gt: None,
            gte: None,
            not: None,
            is_null: None,
        }
    }
}

impl<T> Filter<T> {
    #[must_use]
    pub fn equals(value: T) -> Self {
        Self {
            equals: Some(value),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn in_list(values: Vec<T>) -> Self {
        Self {
            in_list: Some(values),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn not_in(values: Vec<T>) -> Self {
        Self {
            not_in: Some(values),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn lt(value: T) -> Self {
        Self {
            lt: Some(value),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn lte(value: T) -> Self {
        Self {
            lte: Some(value),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn gt(value: T) -> Self {
        Self {
            gt: Some(value),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn gte(value: T) -> Self {
        Self {
            gte: Some(value),
            ..Self::default()
        }
    }

    /// Inclusive range `[low, high]`.
    #[must_use]
    pub fn between(low: T, high: T) -> Self {
        Self {
            gte: Some(low),
            lte: Some(high),
            ..Self::default()
        }
    }

    /// Matches everything except `value`.
    #[must_use]
    pub fn not(value: T) -> Self {
        Self {
            not: Some(Box::new(Self::equals(value))),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn is_null(is_null: bool) -> Self {
        Self {
            is_null: Some(is_null),
            ..Self::default()
        }
    }
}

fn compare(column: &'static str, op: CompareOp, value: Value, insensitive: bool) -> Condition {
    Condition::Compare {
        operand: Operand::Column(column),
        op,
        value,
        insensitive,
    }
}

impl<T: IntoValue> FieldFilter for Filter<T> {
    fn into_condition(self, column: &'static str) -> Condition {
        let mut parts = Vec::new();
        if let Some(v) = self.equals {
            parts.push(compare(column, CompareOp::Eq, v.into_value(), false));
        }
        if let Some(values) = self.in_list {
            parts.push(Condition::InList {
                column,
                values: values.into_iter().map(IntoValue::into_value).collect(),
                negated: false,
                insensitive: false,
            });
        }
        if let Some(values) = self.not_in {
            parts.push(Condition::InList {
                column,
                values: values.into_iter().map(IntoValue::into_value).collect(),
                negated: true,
                insensitive: false,
            });
        }
        for (op, value) in [
            (CompareOp::Lt, self.lt),
            (CompareOp::Lte, self.lte),
            (CompareOp::Gt, self.gt),
            (CompareOp::Gte, self.gte),
        ] {
            if let Some(v) = value {
                parts.push(compare(column, op, v.into_value(), false));
            }
        }
        if let Some(not) = self.not {
            parts.push(not.into_condition(column).negate());
        }
        if let Some(is_null) = self.is_null {
            parts.push(Condition::IsNull {
                column,
                negated: !is_null,
            });
        }
        Condition::all(parts)
    }
}

/// Filter on a text column.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StringFilter {
    pub equals: Option<String>,
    pub in_list: Option<Vec<String>>,
    pub not_in: Option<Vec<String>>,
    pub lt: Option<String>,
    pub lte: Option<String>,
    pub gt: Option<String>,
    pub gte: Option<String>,
    pub contains: Option<String>,
    pub starts_with: Option<String>,
    pub ends_with: Option<String>,
    /// Case sensitivity; inherited by `not`.
    pub mode: QueryMode,
    pub not: Option<Box<StringFilter>>,
    pub is_null: Option<bool>,
}

impl StringFilter {
    #[must_use]
    pub fn equals(value: impl Into<String>) -> Self {
        Self {
            equals: Some(value.into()),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn in_list<S: Into<String>>(values: impl IntoIterator<Item = S>) -> Self {
        Self {
            in_list: Some(values.into_iter().map(Into::into).collect()),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn contains(value: impl Into<String>) -> Self {
        Self {
            contains: Some(value.into()),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn starts_with(value: impl Into<String>) -> Self {
        Self {
            starts_with: Some(value.into()),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn ends_with(value: impl Into<String>) -> Self {
        Self {
            ends_with: Some(value.into()),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn not(value: impl Into<String>) -> Self {
        Self {
            not: Some(Box::new(Self::equals(value))),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn is_null(is_null: bool) -> Self {
        Self {
            is_null: Some(is_null),
            ..Self::default()
        }
    }

    /// Switch to case-insensitive matching.
    #[must_use]
    pub const fn insensitive(mut self) -> Self {
        self.mode = QueryMode::Insensitive;
        self
    }

    fn into_condition_with(self, column: &'static str, mode: QueryMode) -> Condition {
        let insensitive = mode == QueryMode::Insensitive;
        let text = |s: String| Value::Text(Some(s));
        let like = |pattern: String| Condition::Like {
            column,
            pattern,
            insensitive,
        };

        let mut parts = Vec::new();
        if let Some(v) = self.equals {
            parts.push(compare(column, CompareOp::Eq, text(v), insensitive));
        }
        if let Some(values) = self.in_list {
            parts.push(Condition::InList {
                column,
                values: values.into_iter().map(text).collect(),
                negated: false,
                insensitive,
            });
        }
        if let Some(values) = self.not_in {
            parts.push(Condition::InList {
                column,
                values: values.into_iter().map(text).collect(),
                negated: true,
                insensitive,
            });
        }
        for (op, value) in [
            (CompareOp::Lt, self.lt),
            (CompareOp::Lte, self.lte),
            (CompareOp::Gt, self.gt),
            (CompareOp::Gte, self.gte),
        ] {
            if let Some(v) = value {
                parts.push(compare(column, op, text(v), insensitive));
            }
        }
        if let Some(v) = self.contains {
            parts.push(like(format!("%{}%", escape_like(&v))));
        }
        if let Some(v) = self.starts_with {
            parts.push(like(format!("{}%", escape_like(&v))));
        }
        if let Some(v) = self.ends_with {
            parts.push(like(format!("%{}", escape_like(&v))));
        }
        if let Some(not) = self.not {
            let nested_mode = if not.mode == QueryMode::Insensitive {
                QueryMode::Insensitive
            } else {
                mode
            };
            parts.push(not.into_condition_with(column, nested_mode).negate());
        }
        if let Some(is_null) = self.is_null {
            parts.push(Condition::IsNull {
                column,
                negated: !is_null,
            });
        }
        Condition::all(parts)
    }
}

impl FieldFilter for StringFilter {
    fn into_condition(self, column: &'static str) -> Condition {
        let mode = self.mode;
        self.into_condition_with(column, mode)
    }
}

/// Filter on a `TEXT[]` column.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StringListFilter {
    pub equals: Option<Vec<String>>,
    pub has: Option<String>,
    pub has_every: Option<Vec<String>>,
    pub has_some: Option<Vec<String>>,
    pub is_empty: Option<bool>,
}

impl StringListFilter {
    #[must_use]
    pub fn has(value: impl Into<String>) -> Self {
        Self {
            has: Some(value.into()),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn is_empty(is_empty: bool) -> Self {
        Self {
            is_empty: Some(is_empty),
            ..Self::default()
        }
    }
}

impl FieldFilter for StringListFilter {
    fn into_condition(self, column: &'static str) -> Condition {
        let mut parts = Vec::new();
        if let Some(values) = self.equals {
            parts.push(compare(
                column,
                CompareOp::Eq,
                Value::TextArray(Some(values)),
                false,
            ));
        }
        if let Some(value) = self.has {
            parts.push(Condition::ArrayHas { column, value });
        }
        if let Some(values) = self.has_every {
            parts.push(Condition::ArrayContains { column, values });
        }
        if let Some(values) = self.has_some {
            parts.push(if values.is_empty() {
                Condition::False
            } else {
                Condition::ArrayOverlaps { column, values }
            });
        }
        if let Some(empty) = self.is_empty {
            parts.push(Condition::ArrayIsEmpty { column, empty });
        }
        Condition::all(parts)
    }
}

// =============================================================================
// Where inputs and relation filters
// =============================================================================

/// A typed `where` input that compiles to a [`Condition`].
pub trait WhereInput: Send {
    /// Compile into a condition.
    fn into_condition(self) -> Condition;
}

/// A selector of exactly one record through a unique column.
pub trait UniqueWhere: Send {
    /// Compile into a condition.
    fn into_condition(self) -> Condition;
}

/// Join metadata for a relation filter.
#[derive(Debug, Clone, Copy)]
pub struct Relation {
    /// Related table.
    pub table: &'static str,
    /// Column of the related table joined on.
    pub inner_column: &'static str,
    /// Column of the current table joined on.
    pub outer_column: &'static str,
}

/// Filter on a to-many relation.
#[derive(Debug, Clone, PartialEq)]
pub struct ListRelationFilter<W> {
    /// At least one related record matches.
    pub some: Option<Box<W>>,
    /// Every related record matches (vacuously true without related records).
    pub every: Option<Box<W>>,
    /// No related record matches.
    pub none: Option<Box<W>>,
}

impl<W> Default for ListRelationFilter<W> {
    fn default() -> Self {
        Self {
            some: None,
            every: None,
            none: None,
        }
    }
}

impl<W> ListRelationFilter<W> {
    #[must_use]
    pub fn some(filter: W) -> Self {
        Self {
            some: Some(Box::new(filter)),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn every(filter: W) -> Self {
        Self {
            every: Some(Box::new(filter)),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn none(filter: W) -> Self {
        Self {
            none: Some(Box::new(filter)),
            ..Self::default()
        }
    }
}

impl<W: WhereInput> ListRelationFilter<W> {
    /// Compile against `relation`.
    pub fn into_condition(self, relation: Relation) -> Condition {
        let exists = |condition: Condition, negated: bool| Condition::Exists {
            table: relation.table,
            inner_column: relation.inner_column,
            outer_column: relation.outer_column,
            condition: Box::new(condition),
            negated,
        };
        let mut parts = Vec::new();
        if let Some(w) = self.some {
            parts.push(exists(w.into_condition(), false));
        }
        if let Some(w) = self.every {
            let violation = match w.into_condition() {
                Condition::True => Condition::False,
                condition => Condition::IsNotTrue(Box::new(condition)),
            };
            parts.push(exists(violation, true));
        }
        if let Some(w) = self.none {
            parts.push(exists(w.into_condition(), true));
        }
        Condition::all(parts)
    }
}

/// Filter on a to-one relation.
#[derive(Debug, Clone, PartialEq)]
pub struct RelationFilter<W> {
    /// The related record exists and matches.
    pub is: Option<Box<W>>,
    /// The related record is absent or does not match.
    pub is_not: Option<Box<W>>,
}

impl<W> Default for RelationFilter<W> {
    fn default() -> Self {
        Self {
            is: None,
            is_not: None,
        }
    }
}

impl<W> RelationFilter<W> {
    #[must_use]
    pub fn is(filter: W) -> Self {
        Self {
            is: Some(Box::new(filter)),
            is_not: None,
        }
    }

    #[must_use]
    pub fn is_not(filter: W) -> Self {
        Self {
            is: None,
            is_not: Some(Box::new(filter)),
        }
    }
}

impl<W: WhereInput> RelationFilter<W> {
    /// Compile against `relation`.
    pub fn into_condition(self, relation: Relation) -> Condition {
        let exists = |condition: Condition, negated: bool| Condition::Exists {
            table: relation.table,
            inner_column: relation.inner_column,
            outer_column: relation.outer_column,
            condition: Box::new(condition),
            negated,
        };
        let mut parts = Vec::new();
        if let Some(w) = self.is {
            parts.push(exists(w.into_condition(), false));
        }
        if let Some(w) = self.is_not {
            parts.push(exists(w.into_condition(), true));
        }
        Condition::all(parts)
    }
}

/// Collects the parts of a `where` input.
#[derive(Debug, Default)]
pub(crate) struct ConditionSet(Vec<Condition>);

impl ConditionSet {
    pub(crate) fn field(&mut self, column: &'static str, filter: Option<impl FieldFilter>) {
        if let Some(filter) = filter {
            self.0.push(filter.into_condition(column));
        }
    }

    pub(crate) fn push(&mut self, condition: Condition) {
        self.0.push(condition);
    }

    /// Append the `and` / `or` / `not` combinators of a where input.
    pub(crate) fn combinators<W: WhereInput>(
        &mut self,
        and: Vec<W>,
        or: Option<Vec<W>>,
        not: Vec<W>,
    ) {
        for w in and {
            self.0.push(w.into_condition());
        }
        if let Some(or) = or {
            self.0
                .push(Condition::Or(or.into_iter().map(W::into_condition).collect()));
        }
        for w in not {
            self.0.push(w.into_condition().negate());
        }
    }

    pub(crate) fn build(self) -> Condition {
        Condition::all(self.0)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use rust_decimal::Decimal;

    use super::*;

    fn render(condition: Condition) -> String {
        let mut sql = Sql::new("");
        condition.render(&mut sql);
        sql.sql().to_owned()
    }

    #[derive(Debug, Clone, Default)]
    struct TestWhere {
        name: Option<StringFilter>,
        or: Option<Vec<TestWhere>>,
    }

    impl WhereInput for TestWhere {
        fn into_condition(self) -> Condition {
            let mut set = ConditionSet::default();
            set.field("name", self.name);
            set.combinators(Vec::new(), self.or, Vec::new());
            set.build()
        }
    }

    #[test]
    fn test_escape_like() {
        assert_eq!(escape_like("50%_off\\"), "50\\%\\_off\\\\");
        assert_eq!(escape_like("plain"), "plain");
    }

    #[test]
    fn test_empty_filter_is_true() {
        assert_eq!(Filter::<i32>::default().into_condition("stock"), Condition::True);
        assert_eq!(render(Condition::all(vec![])), "TRUE");
    }

    #[test]
    fn test_scalar_filter_renders_conjunction() {
        let filter = Filter {
            gte: Some(Decimal::new(1000, 2)),
            lt: Some(Decimal::new(5000, 2)),
            ..Filter::default()
        };
        assert_eq!(
            render(filter.into_condition("price")),
            "(t0.price < $1 AND t0.price >= $2)"
        );
    }

    #[test]
    fn test_empty_in_list_matches_nothing() {
        assert_eq!(render(Filter::<i32>::in_list(vec![]).into_condition("id")), "FALSE");
        assert_eq!(render(Filter::<i32>::not_in(vec![]).into_condition("id")), "TRUE");
        assert_eq!(
            render(Filter::in_list(vec![1, 2]).into_condition("id")),
            "t0.id IN ($1, $2)"
        );
    }

    #[test]
    fn test_not_and_null() {
        assert_eq!(
            render(Filter::not(3).into_condition("stock")),
            "NOT (t0.stock = $1)"
        );
        assert_eq!(
            render(Filter::<i32>::is_null(true).into_condition("drop_id")),
            "t0.drop_id IS NULL"
        );
        assert_eq!(
            render(StringFilter::is_null(false).into_condition("name")),
            "t0.name IS NOT NULL"
        );
    }

    #[test]
    fn test_string_contains_is_escaped() {
        let condition = StringFilter::contains("100%").into_condition("name");
        assert_eq!(
            condition,
            Condition::Like {
                column: "name",
                pattern: "%100\\%%".to_owned(),
                insensitive: false,
            }
        );
        assert_eq!(render(condition), "t0.name LIKE $1");
    }

    #[test]
    fn test_insensitive_mode_uses_ilike_and_lower() {
        let filter = StringFilter {
            equals: Some("Hoodie".into()),
            starts_with: Some("Hoo".into()),
            ..StringFilter::default()
        }
        .insensitive();
        assert_eq!(
            render(filter.into_condition("name")),
            "(LOWER(t0.name) = LOWER($1) AND t0.name ILIKE $2)"
        );
    }

    #[test]
    fn test_not_inherits_mode() {
        let filter = StringFilter {
            not: Some(Box::new(StringFilter::equals("x"))),
            ..StringFilter::default()
        }
        .insensitive();
        assert_eq!(
            render(filter.into_condition("name")),
            "NOT (LOWER(t0.name) = LOWER($1))"
        );
    }

    #[test]
    fn test_string_list_filters() {
        let filter = StringListFilter {
            has: Some("front.jpg".into()),
            has_some: Some(vec![]),
            ..StringListFilter::default()
        };
        assert_eq!(
            render(filter.into_condition("images")),
            "(t0.images @> ARRAY[$1]::text[] AND FALSE)"
        );
        assert_eq!(
            render(StringListFilter::is_empty(true).into_condition("images")),
            "COALESCE(cardinality(t0.images), 0) = 0"
        );
    }

    #[test]
    fn test_empty_or_is_false() {
        let w = TestWhere {
            or: Some(vec![]),
            ..TestWhere::default()
        };
        assert_eq!(render(w.into_condition()), "FALSE");
    }

    #[test]
    fn test_or_of_two() {
        let w = TestWhere {
            or: Some(vec![
                TestWhere {
                    name: Some(StringFilter::equals("a")),
                    or: None,
                },
                TestWhere {
                    name: Some(StringFilter::equals("b")),
                    or: None,
                },
            ]),
            ..TestWhere::default()
        };
        assert_eq!(render(w.into_condition()), "(t0.name = $1 OR t0.name = $2)");
    }

    #[test]
    fn test_list_relation_filters_nest_aliases() {
        let relation = Relation {
            table: "orders",
            inner_column: "user_id",
            outer_column: "id",
        };
        let inner = TestWhere {
            name: Some(StringFilter::equals("x")),
            or: None,
        };
        assert_eq!(
            render(ListRelationFilter::some(inner.clone()).into_condition(relation)),
            "EXISTS (SELECT 1 FROM orders AS t1 WHERE t1.user_id = t0.id AND (t1.name = $1))"
        );
        assert_eq!(
            render(ListRelationFilter::every(inner.clone()).into_condition(relation)),
            "NOT EXISTS (SELECT 1 FROM orders AS t1 WHERE t1.user_id = t0.id AND ((t1.name = $1) IS NOT TRUE))"
        );
        assert_eq!(
            render(ListRelationFilter::none(TestWhere::default()).into_condition(relation)),
            "NOT EXISTS (SELECT 1 FROM orders AS t1 WHERE t1.user_id = t0.id)"
        );
    }

    #[test]
    fn test_cursor_is_inclusive() {
        let condition = Condition::Cursor {
            table: "products",
            order: vec![
                CursorKey::new("price", SortOrder::Desc, None),
                CursorKey::new("id", SortOrder::Asc, None),
            ],
            unique: Box::new(Condition::eq("id", 7)),
        };
        let sql = render(condition);
        assert!(sql.starts_with(
            "(EXISTS (SELECT 1 FROM products AS c0 WHERE c0.id = $1) AND \
             ((COALESCE(t0.price < (SELECT c0.price FROM products AS c0 WHERE c0.id = $2), FALSE) \
             OR (t0.price IS NOT NULL AND (SELECT c0.price FROM products AS c0 WHERE c0.id = $3) IS NULL)))"
        ));
        assert!(sql.contains(
            " OR (t0.price IS NOT DISTINCT FROM (SELECT c0.price FROM products AS c0 WHERE c0.id = $4) \
             AND (COALESCE(t0.id > "
        ));
        assert!(sql.ends_with(
            "AND t0.id IS NOT DISTINCT FROM (SELECT c0.id FROM products AS c0 WHERE c0.id = $8))))"
        ));
    }

    #[test]
    fn test_cursor_key_default_nulls() {
        assert_eq!(CursorKey::new("name", SortOrder::Asc, None).nulls, NullsOrder::Last);
        assert_eq!(CursorKey::new("name", SortOrder::Desc, None).nulls, NullsOrder::First);
        assert_eq!(
            CursorKey::new("name", SortOrder::Asc, Some(NullsOrder::First)).nulls,
            NullsOrder::First
        );
    }

    #[test]
    fn test_cursor_nulls_last_admits_null_rows() {
        let condition = Condition::Cursor {
            table: "users",
            order: vec![CursorKey::new("name", SortOrder::Asc, None)],
            unique: Box::new(Condition::eq("id", 1)),
        };
        let sql = render(condition);
        assert!(sql.contains(
            "OR (t0.name IS NULL AND (SELECT c0.name FROM users AS c0 WHERE c0.id = $3) IS NOT NULL)"
        ));
    }
}
