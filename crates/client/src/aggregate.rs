//! `aggregate` and `group_by` arguments, validation and SQL.

use std::collections::HashMap;
use std::hash::Hash;

use rust_decimal::Decimal;
use sqlx::Row as _;
use sqlx::postgres::PgRow;

use dropshop_core::SortOrder;

use crate::error::ClientError;
use crate::filter::{AggregateFn, CompareOp, Condition, Operand, WhereInput};
use crate::model::{FindManyArgs, Model, OrderBy, ScalarField};
use crate::query;
use crate::value::{Sql, Value};

/// Which aggregates to compute.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AggregateSelection<F> {
    /// `COUNT(*)`.
    pub count_all: bool,
    /// `COUNT(field)` (non-null values).
    pub count: Vec<F>,
    /// Numeric fields only.
    pub sum: Vec<F>,
    /// Numeric fields only.
    pub avg: Vec<F>,
    pub min: Vec<F>,
    pub max: Vec<F>,
}

impl<F> Default for AggregateSelection<F> {
    fn default() -> Self {
        Self {
            count_all: false,
            count: Vec::new(),
            sum: Vec::new(),
            avg: Vec::new(),
            min: Vec::new(),
            max: Vec::new(),
        }
    }
}

impl<F: ScalarField> AggregateSelection<F> {
    /// Reject `_sum`/`_avg` over non-numeric fields.
    pub(crate) fn validate(&self) -> Result<(), ClientError> {
        for (name, fields) in [("_sum", &self.sum), ("_avg", &self.avg)] {
            if let Some(field) = fields.iter().find(|f| !f.kind().is_numeric()) {
                return Err(ClientError::Validation(format!(
                    "{name} is only defined for numeric fields, not {}",
                    field.column()
                )));
            }
        }
        Ok(())
    }

    const fn is_empty(&self) -> bool {
        !self.count_all
            && self.count.is_empty()
            && self.sum.is_empty()
            && self.avg.is_empty()
            && self.min.is_empty()
            && self.max.is_empty()
    }

    fn push_columns(&self, sql: &mut Sql, alias: &str, first: &mut bool) {
        let mut column = |sql: &mut Sql, expr: String| {
            if !*first {
                sql.push(", ");
            }
            *first = false;
            sql.push(expr);
        };
        if self.count_all {
            column(sql, "COUNT(*) AS _count_all".to_owned());
        }
        for f in &self.count {
            let c = f.column();
            column(sql, format!("COUNT({alias}.{c}) AS _count_{c}"));
        }
        for f in &self.sum {
            let c = f.column();
            column(sql, format!("SUM({alias}.{c})::numeric AS _sum_{c}"));
        }
        for f in &self.avg {
            let c = f.column();
            column(sql, format!("AVG({alias}.{c})::numeric AS _avg_{c}"));
        }
        for f in &self.min {
            let c = f.column();
            column(sql, format!("MIN({alias}.{c}) AS _min_{c}"));
        }
        for f in &self.max {
            let c = f.column();
            column(sql, format!("MAX({alias}.{c}) AS _max_{c}"));
        }
    }

    pub(crate) fn decode(&self, row: &PgRow) -> Result<AggregateResult<F>, sqlx::Error> {
        let mut result = AggregateResult::default();
        if self.count_all {
            result.count_all = Some(row.try_get("_count_all")?);
        }
        for f in &self.count {
            let n: i64 = row.try_get(format!("_count_{}", f.column()).as_str())?;
            result.count.insert(*f, n);
        }
        for f in &self.sum {
            let v: Option<Decimal> = row.try_get(format!("_sum_{}", f.column()).as_str())?;
            result.sum.insert(*f, v);
        }
        for f in &self.avg {
            let v: Option<Decimal> = row.try_get(format!("_avg_{}", f.column()).as_str())?;
            result.avg.insert(*f, v);
        }
        for f in &self.min {
            let v = f.kind().decode(row, &format!("_min_{}", f.column()))?;
            result.min.insert(*f, v);
        }
        for f in &self.max {
            let v = f.kind().decode(row, &format!("_max_{}", f.column()))?;
            result.max.insert(*f, v);
        }
        Ok(result)
    }
}

/// Computed aggregates. Maps only contain the requested fields.
#[derive(Debug, Clone)]
pub struct AggregateResult<F> {
    pub count_all: Option<i64>,
    pub count: HashMap<F, i64>,
    /// `None` when no non-null values were aggregated.
    pub sum: HashMap<F, Option<Decimal>>,
    pub avg: HashMap<F, Option<Decimal>>,
    pub min: HashMap<F, Value>,
    pub max: HashMap<F, Value>,
}

impl<F: Eq + Hash> PartialEq for AggregateResult<F> {
    fn eq(&self, other: &Self) -> bool {
        self.count_all == other.count_all
            && self.count == other.count
            && self.sum == other.sum
            && self.avg == other.avg
            && self.min == other.min
            && self.max == other.max
    }
}

impl<F> Default for AggregateResult<F> {
    fn default() -> Self {
        Self {
            count_all: None,
            count: HashMap::new(),
            sum: HashMap::new(),
            avg: HashMap::new(),
            min: HashMap::new(),
            max: HashMap::new(),
        }
    }
}

/// Arguments of `aggregate`.
///
/// `filter`, `order_by`, `cursor`, `skip` and `take` select the rows that
/// are aggregated, exactly as in `find_many`.
pub struct AggregateArgs<M: Model> {
    pub rows: FindManyArgs<M>,
    pub select: AggregateSelection<M::Field>,
}

impl<M: Model> Default for AggregateArgs<M> {
    fn default() -> Self {
        Self {
            rows: FindManyArgs::default(),
            select: AggregateSelection::default(),
        }
    }
}

/// Render `aggregate`; returns the selection needed to decode the row.
pub(crate) fn aggregate_sql<M: Model>(
    args: AggregateArgs<M>,
) -> Result<(Sql, AggregateSelection<M::Field>), ClientError> {
    args.select.validate()?;
    if args.select.is_empty() {
        return Err(ClientError::Validation(
            "aggregate requires at least one aggregate".to_owned(),
        ));
    }
    if !args.rows.distinct.is_empty() {
        return Err(ClientError::Validation(
            "distinct is not supported in aggregate".to_owned(),
        ));
    }
    let plan = query::plan_find(args.rows, None)?;
    let mut sql = Sql::new("SELECT ");
    let mut first = true;
    args.select.push_columns(&mut sql, "s", &mut first);
    sql.push(" FROM (");
    query::push_select(&mut sql, M::TABLE, plan.select);
    sql.push(") AS s");
    Ok((sql, args.select))
}

// =============================================================================
// group_by
// =============================================================================

/// `having` condition of a `group_by`.
#[derive(Debug, Clone, PartialEq)]
pub enum Having<F> {
    /// Compare a grouped field; the field must be in `by`.
    Field { field: F, op: CompareOp, value: Value },
    /// Compare an aggregate; `field: None` means `COUNT(*)`.
    Aggregate {
        function: AggregateFn,
        field: Option<F>,
        op: CompareOp,
        value: Value,
    },
    And(Vec<Having<F>>),
    Or(Vec<Having<F>>),
    Not(Box<Having<F>>),
}

impl<F: ScalarField> Having<F> {
    fn validate(&self, by: &[F]) -> Result<(), ClientError> {
        match self {
            Self::Field { field, .. } => {
                if by.contains(field) {
                    Ok(())
                } else {
                    Err(ClientError::Validation(format!(
                        "having on {} requires it to be in `by`",
                        field.column()
                    )))
                }
            }
            Self::Aggregate {
                function, field, ..
            } => match (function, field) {
                (AggregateFn::Count, _) => Ok(()),
                (_, None) => Err(ClientError::Validation(format!(
                    "{} requires a field",
                    function.as_sql()
                ))),
                (AggregateFn::Sum | AggregateFn::Avg, Some(f)) if !f.kind().is_numeric() => {
                    Err(ClientError::Validation(format!(
                        "{} is only defined for numeric fields, not {}",
                        function.as_sql(),
                        f.column()
                    )))
                }
                _ => Ok(()),
            },
            Self::And(items) | Self::Or(items) => items.iter().try_for_each(|h| h.validate(by)),
            Self::Not(inner) => inner.validate(by),
        }
    }

    fn into_condition(self) -> Condition {
        match self {
            Self::Field { field, op, value } => Condition::Compare {
                operand: Operand::Column(field.column()),
                op,
                value,
                insensitive: false,
            },
            Self::Aggregate {
                function,
                field,
                op,
                value,
            } => Condition::Compare {
                operand: Operand::Aggregate(function, field.map(ScalarField::column)),
                op,
                value,
                insensitive: false,
            },
            Self::And(items) => Condition::And(items.into_iter().map(Self::into_condition).collect()),
            Self::Or(items) => Condition::Or(items.into_iter().map(Self::into_condition).collect()),
            Self::Not(inner) => inner.into_condition().negate(),
        }
    }
}

/// Ordering of `group_by` results.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GroupOrderBy<F> {
    /// A grouped field; must be in `by`.
    Field(OrderBy<F>),
    /// An aggregate; `None` field means `COUNT(*)`.
    Aggregate {
        function: AggregateFn,
        field: Option<F>,
        direction: SortOrder,
    },
}

/// Arguments of `group_by`.
pub struct GroupByArgs<M: Model> {
    /// Grouping fields; must not be empty.
    pub by: Vec<M::Field>,
    pub filter: Option<M::Where>,
    pub having: Option<Having<M::Field>>,
    pub order_by: Vec<GroupOrderBy<M::Field>>,
    pub skip: Option<i64>,
    pub take: Option<i64>,
    pub select: AggregateSelection<M::Field>,
}

impl<M: Model> GroupByArgs<M> {
    /// Group by `by` with no aggregates selected.
    #[must_use]
    pub fn new(by: Vec<M::Field>) -> Self {
        Self {
            by,
            filter: None,
            having: None,
            order_by: Vec::new(),
            skip: None,
            take: None,
            select: AggregateSelection::default(),
        }
    }

    fn validate(&self) -> Result<(), ClientError> {
        if self.by.is_empty() {
            return Err(ClientError::Validation(
                "group_by requires at least one field in `by`".to_owned(),
            ));
        }
        for order in &self.order_by {
            match order {
                GroupOrderBy::Field(o) if !self.by.contains(&o.field) => {
                    return Err(ClientError::Validation(format!(
                        "every order_by field must be in `by`, {} is not",
                        o.field.column()
                    )));
                }
                GroupOrderBy::Aggregate {
                    function: AggregateFn::Sum | AggregateFn::Avg,
                    field: Some(f),
                    ..
                } if !f.kind().is_numeric() => {
                    return Err(ClientError::Validation(format!(
                        "cannot order by an aggregate of non-numeric field {}",
                        f.column()
                    )));
                }
                _ => {}
            }
        }
        if let Some(having) = &self.having {
            having.validate(&self.by)?;
        }
        for (name, value) in [("skip", self.skip), ("take", self.take)] {
            if value.is_some_and(|v| v < 0) {
                return Err(ClientError::Validation(format!(
                    "{name} must not be negative in group_by"
                )));
            }
        }
        self.select.validate()
    }
}

/// One group: its key values plus the selected aggregates.
#[derive(Debug, Clone)]
pub struct GroupByRow<F> {
    pub keys: HashMap<F, Value>,
    pub aggregates: AggregateResult<F>,
}

impl<F: Eq + Hash> PartialEq for GroupByRow<F> {
    fn eq(&self, other: &Self) -> bool {
        self.keys == other.keys && self.aggregates == other.aggregates
    }
}

impl<F: ScalarField> GroupByRow<F> {
    /// Key value of `field`.
    #[must_use]
    pub fn key(&self, field: F) -> Option<&Value> {
        self.keys.get(&field)
    }
}

/// Rendered `group_by` and what is needed to decode its rows.
pub(crate) struct GroupByPlan<F> {
    pub sql: Sql,
    pub by: Vec<F>,
    pub select: AggregateSelection<F>,
}

impl<F: ScalarField> GroupByPlan<F> {
    pub(crate) fn decode(&self, row: &PgRow) -> Result<GroupByRow<F>, sqlx::Error> {
        let mut keys = HashMap::with_capacity(self.by.len());
        for f in &self.by {
            keys.insert(*f, f.kind().decode(row, f.column())?);
        }
        Ok(GroupByRow {
            keys,
            aggregates: self.select.decode(row)?,
        })
    }
}

pub(crate) fn group_by_sql<M: Model>(
    args: GroupByArgs<M>,
) -> Result<GroupByPlan<M::Field>, ClientError> {
    args.validate()?;
    let columns: Vec<String> = args
        .by
        .iter()
        .map(|f| format!("t0.{0} AS {0}", f.column()))
        .collect();
    let mut sql = Sql::new(format!("SELECT {}", columns.join(", ")));
    let mut first = false;
    args.select.push_columns(&mut sql, "t0", &mut first);
    sql.push(format!(" FROM {} AS t0", M::TABLE));
    query::push_where(
        &mut sql,
        args.filter.map_or(Condition::True, WhereInput::into_condition),
    );
    let group_columns: Vec<String> = args.by.iter().map(|f| format!("t0.{}", f.column())).collect();
    sql.push(format!(" GROUP BY {}", group_columns.join(", ")));
    if let Some(having) = args.having {
        sql.push(" HAVING ");
        having.into_condition().render(&mut sql);
    }

    let order: Vec<String> = if args.order_by.is_empty() {
        group_columns
    } else {
        args.order_by
            .iter()
            .map(|o| match o {
                GroupOrderBy::Field(o) => {
                    let nulls = o.nulls.map(|n| format!(" {}", n.as_sql())).unwrap_or_default();
                    format!("t0.{} {}{nulls}", o.field.column(), o.direction.as_sql())
                }
                GroupOrderBy::Aggregate {
                    function,
                    field,
                    direction,
                } => {
                    let target = field.map_or_else(|| "*".to_owned(), |f| format!("t0.{}", f.column()));
                    format!("{}({target}) {}", function.as_sql(), direction.as_sql())
                }
            })
            .collect()
    };
    sql.push(format!(" ORDER BY {}", order.join(", ")));
    query::push_limit(&mut sql, args.take, args.skip);

    Ok(GroupByPlan {
        sql,
        by: args.by,
        select: args.select,
    })
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use dropshop_core::OrderStatus;

    use super::*;
    use crate::models::order::{Order, OrderField, OrderWhereInput};
    use crate::models::product::{Product, ProductField};
    use crate::filter::Filter;

    #[test]
    fn test_sum_on_text_field_is_rejected() {
        let select = AggregateSelection {
            sum: vec![ProductField::Name],
            ..AggregateSelection::default()
        };
        assert!(matches!(select.validate(), Err(ClientError::Validation(_))));
    }

    #[test]
    fn test_aggregate_sql_wraps_selected_rows() {
        let args = AggregateArgs::<Product> {
            rows: FindManyArgs::new().take(10),
            select: AggregateSelection {
                count_all: true,
                avg: vec![ProductField::Price],
                max: vec![ProductField::CreatedAt],
                ..AggregateSelection::default()
            },
        };
        let (sql, _) = aggregate_sql(args).unwrap();
        assert_eq!(
            sql.sql(),
            "SELECT COUNT(*) AS _count_all, AVG(s.price)::numeric AS _avg_price, \
             MAX(s.created_at) AS _max_created_at FROM (SELECT t0.* FROM products AS t0 \
             ORDER BY t0.id ASC LIMIT $1) AS s"
        );
    }

    #[test]
    fn test_results_compare_by_content() {
        let a = AggregateResult {
            count_all: Some(2),
            sum: HashMap::from([(ProductField::Price, Some(Decimal::new(14_000, 2)))]),
            ..AggregateResult::default()
        };
        let mut b = a.clone();
        assert_eq!(a, b);

        b.sum.insert(ProductField::Price, None);
        assert_ne!(a, b);

        let row = GroupByRow {
            keys: HashMap::from([(ProductField::Category, Value::Text(Some("apparel".to_owned())))]),
            aggregates: a,
        };
        assert_eq!(row.clone(), row);
    }

    #[test]
    fn test_aggregate_requires_a_selection() {
        let err = aggregate_sql(AggregateArgs::<Product>::default()).err().unwrap();
        assert!(matches!(err, ClientError::Validation(_)));
    }

    #[test]
    fn test_group_by_requires_by() {
        let err = group_by_sql(GroupByArgs::<Order>::new(vec![])).err().unwrap();
        assert!(matches!(err, ClientError::Validation(_)));
    }

    #[test]
    fn test_group_by_order_must_be_in_by() {
        let mut args = GroupByArgs::<Order>::new(vec![OrderField::Status]);
        args.order_by = vec![GroupOrderBy::Field(OrderBy::asc(OrderField::Total))];
        assert!(group_by_sql(args).is_err());
    }

    #[test]
    fn test_having_field_must_be_in_by() {
        let mut args = GroupByArgs::<Order>::new(vec![OrderField::Status]);
        args.having = Some(Having::Field {
            field: OrderField::UserId,
            op: CompareOp::Eq,
            value: Value::Int(Some(1)),
        });
        assert!(group_by_sql(args).is_err());
    }

    #[test]
    fn test_group_by_sql() {
        let mut args = GroupByArgs::<Order>::new(vec![OrderField::Status]);
        args.filter = Some(OrderWhereInput {
            status: Some(Filter::not(OrderStatus::Cancelled)),
            ..OrderWhereInput::default()
        });
        args.select = AggregateSelection {
            count_all: true,
            sum: vec![OrderField::Total],
            ..AggregateSelection::default()
        };
        args.having = Some(Having::Aggregate {
            function: AggregateFn::Sum,
            field: Some(OrderField::Total),
            op: CompareOp::Gt,
            value: Value::Decimal(Some(Decimal::new(100, 0))),
        });
        args.order_by = vec![GroupOrderBy::Aggregate {
            function: AggregateFn::Count,
            field: None,
            direction: SortOrder::Desc,
        }];
        args.take = Some(3);
        let plan = group_by_sql(args).unwrap();
        assert_eq!(
            plan.sql.sql(),
            "SELECT t0.status AS status, COUNT(*) AS _count_all, \
             SUM(t0.total)::numeric AS _sum_total FROM orders AS t0 \
             WHERE NOT (t0.status = $1) GROUP BY t0.status HAVING SUM(t0.total) > $2 \
             ORDER BY COUNT(*) DESC LIMIT $3"
        );
    }
}
