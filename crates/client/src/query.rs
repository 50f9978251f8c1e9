//! SQL statement builders.
//!
//! Everything here is pure: statements are rendered into a [`Sql`] builder
//! with bound parameters and executed by the delegate.

use dropshop_core::{NullsOrder, SortOrder};

use crate::error::ClientError;
use crate::filter::{Condition, CursorKey, UniqueWhere, WhereInput};
use crate::model::{Assignment, FindManyArgs, Model, OrderBy, Row, ScalarField, SetExpr};
use crate::value::Sql;

/// Primary key column shared by every table.
pub(crate) const ID_COLUMN: &str = "id";

/// A rendered `ORDER BY` term.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct OrderTerm {
    pub column: &'static str,
    pub direction: SortOrder,
    pub nulls: Option<NullsOrder>,
}

impl OrderTerm {
    const fn reversed(self) -> Self {
        Self {
            column: self.column,
            direction: self.direction.reversed(),
            nulls: match self.nulls {
                Some(nulls) => Some(nulls.reversed()),
                None => None,
            },
        }
    }
}

/// Ordering terms with an `id` tiebreak so pagination is stable.
pub(crate) fn order_terms<F: ScalarField>(order_by: &[OrderBy<F>], reverse: bool) -> Vec<OrderTerm> {
    let mut terms: Vec<OrderTerm> = order_by
        .iter()
        .map(|o| OrderTerm {
            column: o.field.column(),
            direction: o.direction,
            nulls: o.nulls,
        })
        .collect();
    if !terms.iter().any(|t| t.column == ID_COLUMN) {
        terms.push(OrderTerm {
            column: ID_COLUMN,
            direction: SortOrder::Asc,
            nulls: None,
        });
    }
    if reverse {
        terms = terms.into_iter().map(OrderTerm::reversed).collect();
    }
    terms
}

pub(crate) fn push_where(sql: &mut Sql, condition: Condition) {
    if condition != Condition::True {
        sql.push(" WHERE ");
        condition.render(sql);
    }
}

pub(crate) fn push_order(sql: &mut Sql, alias: &str, terms: &[OrderTerm]) {
    if terms.is_empty() {
        return;
    }
    sql.push(" ORDER BY ");
    for (i, term) in terms.iter().enumerate() {
        if i > 0 {
            sql.push(", ");
        }
        sql.push(format!(
            "{alias}.{} {}",
            term.column,
            term.direction.as_sql()
        ));
        if let Some(nulls) = term.nulls {
            sql.push(format!(" {}", nulls.as_sql()));
        }
    }
}

pub(crate) fn push_limit(sql: &mut Sql, limit: Option<i64>, offset: Option<i64>) {
    if let Some(limit) = limit {
        sql.push(" LIMIT ");
        sql.push_bind(limit);
    }
    if let Some(offset) = offset.filter(|o| *o > 0) {
        sql.push(" OFFSET ");
        sql.push_bind(offset);
    }
}

/// Shape of a `SELECT t0.* FROM ...` statement.
#[derive(Debug, Default)]
pub(crate) struct Select {
    pub condition: Option<Condition>,
    pub order: Vec<OrderTerm>,
    pub limit: Option<i64>,
    pub offset: Option<i64>,
    pub for_update: bool,
}

pub(crate) fn push_select(sql: &mut Sql, table: &str, select: Select) {
    sql.push(format!("SELECT t0.* FROM {table} AS t0"));
    push_where(sql, select.condition.unwrap_or(Condition::True));
    push_order(sql, "t0", &select.order);
    push_limit(sql, select.limit, select.offset);
    if select.for_update {
        sql.push(" FOR UPDATE");
    }
}

pub(crate) fn select(table: &str, select: Select) -> Sql {
    let mut sql = Sql::new("");
    push_select(&mut sql, table, select);
    sql
}

/// `SELECT t0.* ... WHERE <unique>` for a single record.
pub(crate) fn select_unique<U: UniqueWhere>(table: &str, unique: U, for_update: bool) -> Sql {
    select(
        table,
        Select {
            condition: Some(unique.into_condition()),
            limit: Some(1),
            for_update,
            ..Select::default()
        },
    )
}

pub(crate) fn count(table: &str, condition: Condition) -> Sql {
    let mut sql = Sql::new(format!("SELECT COUNT(*) FROM {table} AS t0"));
    push_where(&mut sql, condition);
    sql
}

/// Multi-row `INSERT` over the union of the rows' columns.
///
/// Columns missing from a row are written as `DEFAULT`.
pub(crate) fn insert(table: &str, rows: Vec<Row>, skip_duplicates: bool, returning: bool) -> Sql {
    let mut columns: Vec<&'static str> = Vec::new();
    for row in &rows {
        for column in row.columns() {
            if !columns.contains(&column) {
                columns.push(column);
            }
        }
    }

    let mut sql = Sql::new(format!("INSERT INTO {table} "));
    if columns.is_empty() {
        sql.push(format!("({ID_COLUMN}) VALUES "));
        let defaults = vec!["(DEFAULT)"; rows.len().max(1)];
        sql.push(defaults.join(", "));
    } else {
        sql.push(format!("({}) VALUES ", columns.join(", ")));
        for (i, mut row) in rows.into_iter().enumerate() {
            if i > 0 {
                sql.push(", ");
            }
            sql.push("(");
            for (j, column) in columns.iter().enumerate() {
                if j > 0 {
                    sql.push(", ");
                }
                match row.take(column) {
                    Some(value) => value.push_bind(&mut sql),
                    None => {
                        sql.push("DEFAULT");
                    }
                }
            }
            sql.push(")");
        }
    }
    if skip_duplicates {
        sql.push(" ON CONFLICT DO NOTHING");
    }
    if returning {
        sql.push(" RETURNING *");
    }
    sql
}

/// `UPDATE ... RETURNING *`; always refreshes `updated_at`.
pub(crate) fn update(
    table: &str,
    assignments: Vec<Assignment>,
    condition: Condition,
    returning: bool,
) -> Sql {
    let mut sql = Sql::new(format!("UPDATE {table} AS t0 SET "));
    for (column, expr) in assignments {
        sql.push(format!("{column} = "));
        match expr {
            SetExpr::Set(value) => value.push_bind(&mut sql),
            SetExpr::Increment(value) => push_arith(&mut sql, column, "+", value),
            SetExpr::Decrement(value) => push_arith(&mut sql, column, "-", value),
            SetExpr::Multiply(value) => push_arith(&mut sql, column, "*", value),
            SetExpr::Divide(value) => push_arith(&mut sql, column, "/", value),
            SetExpr::Push(value) => {
                sql.push(format!("array_cat(t0.{column}, "));
                value.push_bind(&mut sql);
                sql.push(")");
            }
        }
        sql.push(", ");
    }
    sql.push("updated_at = NOW()");
    push_where(&mut sql, condition);
    if returning {
        sql.push(" RETURNING *");
    }
    sql
}

fn push_arith(sql: &mut Sql, column: &str, op: &str, value: crate::value::Value) {
    sql.push(format!("t0.{column} {op} "));
    value.push_bind(sql);
}

pub(crate) fn delete(table: &str, condition: Condition, returning: bool) -> Sql {
    let mut sql = Sql::new(format!("DELETE FROM {table} AS t0"));
    push_where(&mut sql, condition);
    if returning {
        sql.push(" RETURNING *");
    }
    sql
}

/// A `find_many` call lowered to SQL plus in-memory post-processing.
pub(crate) struct FindPlan<F> {
    pub select: Select,
    /// Rows come back in reversed order and must be flipped.
    pub reverse: bool,
    /// Distinct fields; when set, skip/take are applied after deduplication.
    pub distinct: Vec<F>,
    pub skip: usize,
    pub take: Option<usize>,
}

/// Lower `args` (plus an optional extra condition) into a [`FindPlan`].
pub(crate) fn plan_find<M: Model>(
    args: FindManyArgs<M>,
    extra: Option<Condition>,
) -> Result<FindPlan<M::Field>, ClientError> {
    let skip = args.skip.unwrap_or(0);
    if skip < 0 {
        return Err(ClientError::Validation(format!(
            "skip must not be negative, got {skip}"
        )));
    }
    let reverse = args.take.is_some_and(|t| t < 0);
    let take = args.take.map(i64::unsigned_abs);
    let order = order_terms(&args.order_by, reverse);

    let mut conditions = Vec::with_capacity(3);
    if let Some(filter) = args.filter {
        conditions.push(filter.into_condition());
    }
    if let Some(extra) = extra {
        conditions.push(extra);
    }
    if let Some(cursor) = args.cursor {
        conditions.push(Condition::Cursor {
            table: M::TABLE,
            order: order
                .iter()
                .map(|t| CursorKey::new(t.column, t.direction, t.nulls))
                .collect(),
            unique: Box::new(cursor.into_condition()),
        });
    }

    let to_usize = |v: u64| usize::try_from(v).unwrap_or(usize::MAX);
    let distinct = args.distinct;
    let (limit, offset) = if distinct.is_empty() {
        (take.map(|t| i64::try_from(t).unwrap_or(i64::MAX)), Some(skip))
    } else {
        (None, None)
    };
    Ok(FindPlan {
        select: Select {
            condition: Some(Condition::all(conditions)),
            order,
            limit,
            offset,
            for_update: false,
        },
        reverse,
        skip: if distinct.is_empty() {
            0
        } else {
            to_usize(skip.unsigned_abs())
        },
        take: if distinct.is_empty() {
            None
        } else {
            take.map(to_usize)
        },
        distinct,
    })
}

impl<F: ScalarField> FindPlan<F> {
    /// Apply distinct, skip, take and reversal to fetched rows.
    pub(crate) fn finish<M: Model<Field = F>>(&self, rows: Vec<M>) -> Vec<M> {
        let mut rows = if self.distinct.is_empty() {
            rows
        } else {
            let mut seen = std::collections::HashSet::new();
            rows.into_iter()
                .filter(|row| {
                    let key: Vec<_> = self.distinct.iter().map(|f| row.value(*f)).collect();
                    seen.insert(key)
                })
                .skip(self.skip)
                .take(self.take.unwrap_or(usize::MAX))
                .collect()
        };
        if self.reverse {
            rows.reverse();
        }
        rows
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use dropshop_core::ProductId;
    use rust_decimal::Decimal;

    use super::*;
    use crate::filter::{Filter, StringFilter};
    use crate::models::product::{
        Product, ProductField, ProductWhereInput, ProductWhereUniqueInput,
    };
    use crate::value::Value;

    #[test]
    fn test_select_with_everything() {
        let sql = select(
            "products",
            Select {
                condition: Some(Condition::eq("in_stock", true)),
                order: vec![OrderTerm {
                    column: "price",
                    direction: SortOrder::Desc,
                    nulls: Some(NullsOrder::Last),
                }],
                limit: Some(10),
                offset: Some(20),
                for_update: true,
            },
        );
        assert_eq!(
            sql.sql(),
            "SELECT t0.* FROM products AS t0 WHERE t0.in_stock = $1 \
             ORDER BY t0.price DESC NULLS LAST LIMIT $2 OFFSET $3 FOR UPDATE"
        );
    }

    #[test]
    fn test_order_terms_add_id_tiebreak_and_reverse() {
        let terms = order_terms(&[OrderBy::desc(ProductField::Price)], true);
        assert_eq!(terms.len(), 2);
        assert_eq!(terms[0].column, "price");
        assert_eq!(terms[0].direction, SortOrder::Asc);
        assert_eq!(terms[1].column, "id");
        assert_eq!(terms[1].direction, SortOrder::Desc);

        let terms = order_terms(&[OrderBy::asc(ProductField::Id)], false);
        assert_eq!(terms.len(), 1);
    }

    #[test]
    fn test_insert_fills_missing_columns_with_default() {
        let mut a = Row::default();
        a.set("name", "Tee");
        a.set("stock", 3);
        let mut b = Row::default();
        b.set("name", "Cap");
        b.set("color", "red");
        let sql = insert("product_variants", vec![a, b], true, false);
        assert_eq!(
            sql.sql(),
            "INSERT INTO product_variants (name, stock, color) VALUES \
             ($1, $2, DEFAULT), ($3, DEFAULT, $4) ON CONFLICT DO NOTHING"
        );
    }

    #[test]
    fn test_insert_without_columns_uses_defaults() {
        let sql = insert("drops", vec![Row::default(), Row::default()], false, true);
        assert_eq!(
            sql.sql(),
            "INSERT INTO drops (id) VALUES (DEFAULT), (DEFAULT) RETURNING *"
        );
    }

    #[test]
    fn test_update_sets_updated_at() {
        let sql = update(
            "product_variants",
            vec![
                ("stock", SetExpr::Decrement(Value::Int(Some(2)))),
                ("images", SetExpr::Push(Value::TextArray(Some(vec![])))),
            ],
            Condition::eq("id", 4),
            true,
        );
        assert_eq!(
            sql.sql(),
            "UPDATE product_variants AS t0 SET stock = t0.stock - $1, \
             images = array_cat(t0.images, $2), updated_at = NOW() \
             WHERE t0.id = $3 RETURNING *"
        );
    }

    #[test]
    fn test_delete_and_count() {
        assert_eq!(
            delete("addresses", Condition::True, false).sql(),
            "DELETE FROM addresses AS t0"
        );
        assert_eq!(
            count("orders", Condition::eq("user_id", 1)).sql(),
            "SELECT COUNT(*) FROM orders AS t0 WHERE t0.user_id = $1"
        );
    }

    #[test]
    fn test_plan_find_negative_take_reverses() {
        let args = FindManyArgs::<Product>::new()
            .order_by(OrderBy::asc(ProductField::Name))
            .take(-2);
        let plan = plan_find(args, None).unwrap();
        assert!(plan.reverse);
        assert_eq!(
            select("products", plan.select).sql(),
            "SELECT t0.* FROM products AS t0 ORDER BY t0.name DESC, t0.id DESC LIMIT $1"
        );
    }

    #[test]
    fn test_plan_find_rejects_negative_skip() {
        let args = FindManyArgs::<Product>::new().skip(-1);
        let err = plan_find(args, None).err().unwrap();
        assert!(matches!(err, ClientError::Validation(_)));
    }

    #[test]
    fn test_plan_find_with_filter_and_cursor() {
        let args = FindManyArgs::<Product>::new()
            .filter(ProductWhereInput {
                price: Some(Filter::gt(Decimal::new(2000, 2))),
                name: Some(StringFilter::contains("tee").insensitive()),
                ..ProductWhereInput::default()
            })
            .cursor(ProductWhereUniqueInput::Id(ProductId::new(5)))
            .skip(1)
            .take(10);
        let plan = plan_find(args, None).unwrap();
        let sql = select("products", plan.select);
        let sql = sql.sql();
        assert!(sql.starts_with(
            "SELECT t0.* FROM products AS t0 WHERE ((t0.name ILIKE $1 AND t0.price > $2) AND \
             (EXISTS (SELECT 1 FROM products AS c0 WHERE c0.id = $3) AND \
             ((COALESCE(t0.id > (SELECT c0.id FROM products AS c0 WHERE c0.id = $4), FALSE) OR \
             (t0.id IS NULL AND (SELECT c0.id FROM products AS c0 WHERE c0.id = $5) IS NOT NULL)) OR \
             (t0.id IS NOT DISTINCT FROM (SELECT c0.id FROM products AS c0 WHERE c0.id = $6)))))"
        ));
        assert!(sql.ends_with("ORDER BY t0.id ASC LIMIT $7 OFFSET $8"));
    }

    #[test]
    fn test_plan_find_distinct_moves_paging_in_memory() {
        let args = FindManyArgs::<Product>::new()
            .distinct(vec![ProductField::Category])
            .skip(1)
            .take(2);
        let plan = plan_find(args, None).unwrap();
        assert_eq!(plan.skip, 1);
        assert_eq!(plan.take, Some(2));
        assert!(!select("products", plan.select).sql().contains("LIMIT"));
    }
}
