//! CRUD delegates.
//!
//! A [`Delegate`] runs typed operations for one model against either the
//! pool or a connection that is already inside a transaction. Operations
//! that issue more than one statement open their own transaction (a
//! savepoint when already inside one).

use std::collections::{HashMap, HashSet};
use std::marker::PhantomData;
use std::ops::{Deref, DerefMut};

use sqlx::pool::PoolConnection;
use sqlx::postgres::PgRow;
use sqlx::{Connection, PgConnection, PgPool, Postgres};

use crate::aggregate::{self, AggregateArgs, AggregateResult, GroupByArgs, GroupByRow};
use crate::error::ClientError;
use crate::filter::{Condition, UniqueWhere, WhereInput};
use crate::model::{CreateInput, FindManyArgs, Model, NestedCreate, Row, UpdateInput};
use crate::query::{self, ID_COLUMN};
use crate::value::Sql;

/// Statement logging switch shared by a client and its delegates.
#[derive(Debug, Clone, Copy, Default)]
pub(crate) struct QueryLog {
    pub info: bool,
}

impl QueryLog {
    pub(crate) fn statement(self, model: &str, operation: &str, sql: &str) {
        if self.info {
            tracing::info!(target: "dropshop_client::query", model, operation, sql, "query");
        } else {
            tracing::debug!(target: "dropshop_client::query", model, operation, sql, "query");
        }
    }
}

/// Where statements run.
pub(crate) enum Db<'c> {
    Pool(&'c PgPool),
    Conn(&'c mut PgConnection),
}

impl Db<'_> {
    fn reborrow(&mut self) -> Db<'_> {
        match self {
            Self::Pool(pool) => Db::Pool(pool),
            Self::Conn(conn) => Db::Conn(conn),
        }
    }

    async fn acquire(&mut self) -> Result<Conn<'_>, sqlx::Error> {
        match self {
            Self::Pool(pool) => Ok(Conn::Pooled(pool.acquire().await?)),
            Self::Conn(conn) => Ok(Conn::Borrowed(conn)),
        }
    }
}

/// A connection checked out for one operation.
enum Conn<'a> {
    Pooled(PoolConnection<Postgres>),
    Borrowed(&'a mut PgConnection),
}

impl Deref for Conn<'_> {
    type Target = PgConnection;

    fn deref(&self) -> &PgConnection {
        match self {
            Self::Pooled(conn) => conn,
            Self::Borrowed(conn) => conn,
        }
    }
}

impl DerefMut for Conn<'_> {
    fn deref_mut(&mut self) -> &mut PgConnection {
        match self {
            Self::Pooled(conn) => conn,
            Self::Borrowed(conn) => conn,
        }
    }
}

// =============================================================================
// Statement execution
// =============================================================================

async fn fetch_all<M: Model>(
    conn: &mut PgConnection,
    log: QueryLog,
    operation: &str,
    mut sql: Sql,
) -> Result<Vec<M>, ClientError> {
    log.statement(M::NAME, operation, sql.sql());
    sql.build_query_as::<M>()
        .fetch_all(conn)
        .await
        .map_err(|e| ClientError::from_sqlx(M::NAME, e))
}

async fn fetch_optional<M: Model>(
    conn: &mut PgConnection,
    log: QueryLog,
    operation: &str,
    mut sql: Sql,
) -> Result<Option<M>, ClientError> {
    log.statement(M::NAME, operation, sql.sql());
    sql.build_query_as::<M>()
        .fetch_optional(conn)
        .await
        .map_err(|e| ClientError::from_sqlx(M::NAME, e))
}

async fn execute(
    conn: &mut PgConnection,
    log: QueryLog,
    model: &'static str,
    operation: &str,
    mut sql: Sql,
) -> Result<u64, ClientError> {
    log.statement(model, operation, sql.sql());
    sql.build()
        .execute(conn)
        .await
        .map(|done| done.rows_affected())
        .map_err(|e| ClientError::from_sqlx(model, e))
}

async fn fetch_rows(
    conn: &mut PgConnection,
    log: QueryLog,
    model: &'static str,
    operation: &str,
    mut sql: Sql,
) -> Result<Vec<PgRow>, ClientError> {
    log.statement(model, operation, sql.sql());
    sql.build()
        .fetch_all(conn)
        .await
        .map_err(|e| ClientError::from_sqlx(model, e))
}

/// Insert one parent row and its nested children on `conn`.
async fn insert_nested<M: Model>(
    conn: &mut PgConnection,
    log: QueryLog,
    row: Row,
    nested: Vec<NestedCreate>,
) -> Result<M, ClientError> {
    let sql = query::insert(M::TABLE, vec![row], false, true);
    let created: M = fetch_optional(&mut *conn, log, "create", sql)
        .await?
        .ok_or(ClientError::NotFound { model: M::NAME })?;
    for child in nested {
        if child.rows.is_empty() {
            continue;
        }
        let rows = child
            .rows
            .into_iter()
            .map(|mut r| {
                r.set(child.foreign_key, created.id());
                r
            })
            .collect();
        let sql = query::insert(child.table, rows, false, false);
        execute(&mut *conn, log, child.model, "create_nested", sql).await?;
    }
    Ok(created)
}

fn rows_without_nested<C: CreateInput>(data: Vec<C>) -> Result<Vec<Row>, ClientError> {
    data.into_iter()
        .map(|d| {
            let (row, nested) = d.into_row()?;
            if nested.iter().any(|n| !n.rows.is_empty()) {
                return Err(ClientError::Validation(
                    "nested creates are not supported in create_many".to_owned(),
                ));
            }
            Ok(row)
        })
        .collect()
}

// =============================================================================
// Delegate
// =============================================================================

/// Typed operations for model `M`.
pub struct Delegate<'c, M> {
    db: Db<'c>,
    log: QueryLog,
    _model: PhantomData<fn() -> M>,
}

impl<'c, M: Model> Delegate<'c, M> {
    pub(crate) fn new(db: Db<'c>, log: QueryLog) -> Self {
        Self {
            db,
            log,
            _model: PhantomData,
        }
    }

    /// A delegate for another model on the same connection.
    pub(crate) fn reborrow<N: Model>(&mut self) -> Delegate<'_, N> {
        Delegate::new(self.db.reborrow(), self.log)
    }

    /// Find a record by a unique field.
    ///
    /// # Errors
    ///
    /// Returns `ClientError::Database` if the query fails.
    pub async fn find_unique(&mut self, unique: M::Unique) -> Result<Option<M>, ClientError> {
        let log = self.log;
        let mut conn = self.db.acquire().await?;
        let sql = query::select_unique(M::TABLE, unique, false);
        fetch_optional(&mut conn, log, "find_unique", sql).await
    }

    /// Find a record by a unique field, failing when it does not exist.
    ///
    /// # Errors
    ///
    /// Returns `ClientError::NotFound` if no record matches.
    pub async fn find_unique_or_throw(&mut self, unique: M::Unique) -> Result<M, ClientError> {
        self.find_unique(unique)
            .await?
            .ok_or(ClientError::NotFound { model: M::NAME })
    }

    /// First record matching `args`.
    ///
    /// # Errors
    ///
    /// Returns `ClientError::Validation` for a negative `skip`.
    pub async fn find_first(&mut self, mut args: FindManyArgs<M>) -> Result<Option<M>, ClientError> {
        args.take = Some(if args.take.is_some_and(|t| t < 0) { -1 } else { 1 });
        Ok(self.find_many(args).await?.into_iter().next())
    }

    /// First record matching `args`, failing when there is none.
    ///
    /// # Errors
    ///
    /// Returns `ClientError::NotFound` if no record matches.
    pub async fn find_first_or_throw(&mut self, args: FindManyArgs<M>) -> Result<M, ClientError> {
        self.find_first(args)
            .await?
            .ok_or(ClientError::NotFound { model: M::NAME })
    }

    /// All records matching `args`.
    ///
    /// # Errors
    ///
    /// Returns `ClientError::Validation` for a negative `skip`.
    pub async fn find_many(&mut self, args: FindManyArgs<M>) -> Result<Vec<M>, ClientError> {
        self.find_many_with(args, None).await
    }

    pub(crate) async fn find_many_with(
        &mut self,
        args: FindManyArgs<M>,
        extra: Option<Condition>,
    ) -> Result<Vec<M>, ClientError> {
        let log = self.log;
        let mut plan = query::plan_find(args, extra)?;
        let sql = query::select(M::TABLE, std::mem::take(&mut plan.select));
        let mut conn = self.db.acquire().await?;
        let rows = fetch_all(&mut conn, log, "find_many", sql).await?;
        Ok(plan.finish(rows))
    }

    /// Insert a record, including nested children, and return it.
    ///
    /// # Errors
    ///
    /// Returns `ClientError::UniqueViolation`, `ForeignKeyViolation` or
    /// `CheckViolation` when a constraint rejects the insert.
    pub async fn create(&mut self, data: M::Create) -> Result<M, ClientError> {
        let log = self.log;
        let (row, nested) = data.into_row()?;
        let mut conn = self.db.acquire().await?;
        if nested.iter().all(|n| n.rows.is_empty()) {
            return insert_nested(&mut conn, log, row, Vec::new()).await;
        }
        let mut tx = conn.begin().await?;
        let created = insert_nested(&mut tx, log, row, nested).await?;
        tx.commit().await?;
        Ok(created)
    }

    /// Insert many records in one statement and return how many were written.
    ///
    /// With `skip_duplicates`, rows hitting a unique constraint are skipped.
    ///
    /// # Errors
    ///
    /// Returns `ClientError::Validation` if an input carries nested creates.
    pub async fn create_many(
        &mut self,
        data: Vec<M::Create>,
        skip_duplicates: bool,
    ) -> Result<u64, ClientError> {
        if data.is_empty() {
            return Ok(0);
        }
        let log = self.log;
        let rows = rows_without_nested(data)?;
        let sql = query::insert(M::TABLE, rows, skip_duplicates, false);
        let mut conn = self.db.acquire().await?;
        execute(&mut conn, log, M::NAME, "create_many", sql).await
    }

    /// Insert many records in one statement and return them.
    ///
    /// # Errors
    ///
    /// See [`Delegate::create_many`].
    pub async fn create_many_and_return(
        &mut self,
        data: Vec<M::Create>,
        skip_duplicates: bool,
    ) -> Result<Vec<M>, ClientError> {
        if data.is_empty() {
            return Ok(Vec::new());
        }
        let log = self.log;
        let rows = rows_without_nested(data)?;
        let sql = query::insert(M::TABLE, rows, skip_duplicates, true);
        let mut conn = self.db.acquire().await?;
        fetch_all(&mut conn, log, "create_many_and_return", sql).await
    }

    /// Update one record.
    ///
    /// # Errors
    ///
    /// Returns `ClientError::NotFound` if no record matches.
    pub async fn update(&mut self, unique: M::Unique, data: M::Update) -> Result<M, ClientError> {
        let log = self.log;
        let sql = query::update(
            M::TABLE,
            data.into_assignments()?,
            unique.into_condition(),
            true,
        );
        let mut conn = self.db.acquire().await?;
        fetch_optional(&mut conn, log, "update", sql)
            .await?
            .ok_or(ClientError::NotFound { model: M::NAME })
    }

    /// Update every matching record and return how many changed.
    ///
    /// # Errors
    ///
    /// Returns `ClientError::Database` if the statement fails.
    pub async fn update_many(&mut self, filter: M::Where, data: M::Update) -> Result<u64, ClientError> {
        let log = self.log;
        let sql = query::update(
            M::TABLE,
            data.into_assignments()?,
            filter.into_condition(),
            false,
        );
        let mut conn = self.db.acquire().await?;
        execute(&mut conn, log, M::NAME, "update_many", sql).await
    }

    /// Update the record if it exists, otherwise create it.
    ///
    /// The lookup locks the row, so the decision and the write are atomic.
    ///
    /// # Errors
    ///
    /// Returns constraint errors from the update or insert.
    pub async fn upsert(
        &mut self,
        unique: M::Unique,
        create: M::Create,
        update: M::Update,
    ) -> Result<M, ClientError> {
        let log = self.log;
        let mut conn = self.db.acquire().await?;
        let mut tx = conn.begin().await?;
        let lookup = query::select_unique(M::TABLE, unique, true);
        let existing: Option<M> = fetch_optional(&mut tx, log, "upsert_lookup", lookup).await?;
        let record = if let Some(existing) = existing {
            let sql = query::update(
                M::TABLE,
                update.into_assignments()?,
                Condition::eq(ID_COLUMN, existing.id()),
                true,
            );
            fetch_optional(&mut tx, log, "upsert_update", sql)
                .await?
                .ok_or(ClientError::NotFound { model: M::NAME })?
        } else {
            let (row, nested) = create.into_row()?;
            insert_nested(&mut tx, log, row, nested).await?
        };
        tx.commit().await?;
        Ok(record)
    }

    /// Delete one record and return it.
    ///
    /// # Errors
    ///
    /// Returns `ClientError::NotFound` if no record matches, or
    /// `ClientError::ForeignKeyViolation` if a restricting relation exists.
    pub async fn delete(&mut self, unique: M::Unique) -> Result<M, ClientError> {
        let log = self.log;
        let sql = query::delete(M::TABLE, unique.into_condition(), true);
        let mut conn = self.db.acquire().await?;
        fetch_optional(&mut conn, log, "delete", sql)
            .await?
            .ok_or(ClientError::NotFound { model: M::NAME })
    }

    /// Delete every matching record and return how many were removed.
    ///
    /// # Errors
    ///
    /// Returns `ClientError::ForeignKeyViolation` if a restricting relation exists.
    pub async fn delete_many(&mut self, filter: M::Where) -> Result<u64, ClientError> {
        let log = self.log;
        let sql = query::delete(M::TABLE, filter.into_condition(), false);
        let mut conn = self.db.acquire().await?;
        execute(&mut conn, log, M::NAME, "delete_many", sql).await
    }

    /// Number of matching records.
    ///
    /// # Errors
    ///
    /// Returns `ClientError::Database` if the query fails.
    pub async fn count(&mut self, filter: M::Where) -> Result<i64, ClientError> {
        let log = self.log;
        let mut sql = query::count(M::TABLE, filter.into_condition());
        let mut conn = self.db.acquire().await?;
        log.statement(M::NAME, "count", sql.sql());
        sql.build_query_scalar::<i64>()
            .fetch_one(&mut *conn)
            .await
            .map_err(|e| ClientError::from_sqlx(M::NAME, e))
    }

    /// Compute aggregates over the rows selected by `args`.
    ///
    /// # Errors
    ///
    /// Returns `ClientError::Validation` for `_sum`/`_avg` on non-numeric
    /// fields or an empty selection.
    pub async fn aggregate(
        &mut self,
        args: AggregateArgs<M>,
    ) -> Result<AggregateResult<M::Field>, ClientError> {
        let log = self.log;
        let (sql, select) = aggregate::aggregate_sql(args)?;
        let mut conn = self.db.acquire().await?;
        let rows = fetch_rows(&mut conn, log, M::NAME, "aggregate", sql).await?;
        let row = rows
            .first()
            .ok_or(ClientError::NotFound { model: M::NAME })?;
        select
            .decode(row)
            .map_err(|e| ClientError::from_sqlx(M::NAME, e))
    }

    /// Group records and compute aggregates per group.
    ///
    /// # Errors
    ///
    /// Returns `ClientError::Validation` if `by` is empty, an `order_by` or
    /// `having` field is not grouped, or `skip`/`take` is negative.
    pub async fn group_by(
        &mut self,
        args: GroupByArgs<M>,
    ) -> Result<Vec<GroupByRow<M::Field>>, ClientError> {
        let log = self.log;
        let mut plan = aggregate::group_by_sql(args)?;
        let sql = std::mem::replace(&mut plan.sql, Sql::new(""));
        let mut conn = self.db.acquire().await?;
        let rows = fetch_rows(&mut conn, log, M::NAME, "group_by", sql).await?;
        rows.iter()
            .map(|row| plan.decode(row))
            .collect::<Result<_, _>>()
            .map_err(|e| ClientError::from_sqlx(M::NAME, e))
    }

    /// Load the children of many parents in one query, grouped by parent id.
    ///
    /// `filter` and `order_by` run in SQL; `skip` and `take` apply per parent.
    pub(crate) async fn load_children(
        &mut self,
        foreign_key: &'static str,
        parent_ids: &[i32],
        args: FindManyArgs<M>,
        parent_of: fn(&M) -> Option<i32>,
    ) -> Result<HashMap<i32, Vec<M>>, ClientError> {
        if args.cursor.is_some() || !args.distinct.is_empty() {
            return Err(ClientError::Validation(
                "cursor and distinct are not supported on included relations".to_owned(),
            ));
        }
        let skip = usize::try_from(args.skip.unwrap_or(0)).map_err(|_| {
            ClientError::Validation("skip must not be negative".to_owned())
        })?;
        let take = args
            .take
            .map(usize::try_from)
            .transpose()
            .map_err(|_| {
                ClientError::Validation("take must not be negative on included relations".to_owned())
            })?;
        if parent_ids.is_empty() {
            return Ok(HashMap::new());
        }

        let children = self
            .find_many_with(
                FindManyArgs {
                    filter: args.filter,
                    order_by: args.order_by,
                    ..FindManyArgs::default()
                },
                Some(Condition::in_ids(foreign_key, parent_ids)),
            )
            .await?;

        let mut grouped: HashMap<i32, Vec<M>> = HashMap::new();
        for child in children {
            if let Some(parent) = parent_of(&child) {
                grouped.entry(parent).or_default().push(child);
            }
        }
        for bucket in grouped.values_mut() {
            bucket.drain(..skip.min(bucket.len()));
            if let Some(take) = take {
                bucket.truncate(take);
            }
        }
        Ok(grouped)
    }

    /// Load records by primary key, keyed by id.
    pub(crate) async fn load_by_ids(
        &mut self,
        ids: impl IntoIterator<Item = i32>,
    ) -> Result<HashMap<i32, M>, ClientError> {
        let ids: Vec<i32> = ids
            .into_iter()
            .collect::<HashSet<_>>()
            .into_iter()
            .collect();
        if ids.is_empty() {
            return Ok(HashMap::new());
        }
        let rows = self
            .find_many_with(
                FindManyArgs::default(),
                Some(Condition::in_ids(ID_COLUMN, &ids)),
            )
            .await?;
        Ok(rows.into_iter().map(|r| (r.id(), r)).collect())
    }
}
