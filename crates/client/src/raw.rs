//! Raw SQL with positional (`$1`, `$2`, ...) parameters.

use sqlx::postgres::{PgArguments, PgRow};
use sqlx::query::{Query, QueryAs};
use sqlx::{FromRow, PgConnection, Postgres};

use crate::delegate::QueryLog;
use crate::error::ClientError;
use crate::value::Value;

const RAW: &str = "raw";

fn bind<'q>(
    query: Query<'q, Postgres, PgArguments>,
    value: Value,
) -> Query<'q, Postgres, PgArguments> {
    match value {
        Value::Int(v) => query.bind(v),
        Value::BigInt(v) => query.bind(v),
        Value::Text(v) => query.bind(v),
        Value::Bool(v) => query.bind(v),
        Value::Decimal(v) => query.bind(v),
        Value::Timestamp(v) => query.bind(v),
        Value::TextArray(v) => query.bind(v),
        Value::Status(v) => query.bind(v),
    }
}

fn bind_as<'q, T>(
    query: QueryAs<'q, Postgres, T, PgArguments>,
    value: Value,
) -> QueryAs<'q, Postgres, T, PgArguments> {
    match value {
        Value::Int(v) => query.bind(v),
        Value::BigInt(v) => query.bind(v),
        Value::Text(v) => query.bind(v),
        Value::Bool(v) => query.bind(v),
        Value::Decimal(v) => query.bind(v),
        Value::Timestamp(v) => query.bind(v),
        Value::TextArray(v) => query.bind(v),
        Value::Status(v) => query.bind(v),
    }
}

pub(crate) async fn query_raw<T>(
    conn: &mut PgConnection,
    log: QueryLog,
    sql: &str,
    binds: Vec<Value>,
) -> Result<Vec<T>, ClientError>
where
    T: for<'r> FromRow<'r, PgRow> + Send + Unpin,
{
    log.statement(RAW, "query_raw", sql);
    binds
        .into_iter()
        .fold(sqlx::query_as::<_, T>(sql), bind_as)
        .fetch_all(conn)
        .await
        .map_err(|e| ClientError::from_sqlx(RAW, e))
}

pub(crate) async fn execute_raw(
    conn: &mut PgConnection,
    log: QueryLog,
    sql: &str,
    binds: Vec<Value>,
) -> Result<u64, ClientError> {
    log.statement(RAW, "execute_raw", sql);
    binds
        .into_iter()
        .fold(sqlx::query(sql), bind)
        .execute(conn)
        .await
        .map(|done| done.rows_affected())
        .map_err(|e| ClientError::from_sqlx(RAW, e))
}
