//! Parameter binding utilities for database queries.
//!
//! Each builder below prepares a non-persistent query: the statement is
//! prepared for this call only and never cached on the connection.

use crate::models::Value;
use sqlx::encode::IsNull;
use sqlx::error::BoxDynError;
use sqlx::mysql::MySqlArguments;
use sqlx::postgres::types::Oid;
use sqlx::postgres::{PgArgumentBuffer, PgArguments, PgTypeInfo};
use sqlx::sqlite::SqliteArguments;
use sqlx::{Encode, MySql, Postgres, Sqlite, Type};

pub(crate) type MySqlQuery<'q> = sqlx::query::Query<'q, MySql, MySqlArguments>;
pub(crate) type PgQuery<'q> = sqlx::query::Query<'q, Postgres, PgArguments>;
pub(crate) type SqliteQuery<'q> = sqlx::query::Query<'q, Sqlite, SqliteArguments<'q>>;

/// Build a MySQL query with all arguments bound.
pub(crate) fn mysql_query<'q>(sql: &'q str, args: &'q [Value]) -> MySqlQuery<'q> {
    args.iter()
        .fold(sqlx::query(sql).persistent(false), bind_mysql_param)
}

/// Build a PostgreSQL query with all arguments bound.
pub(crate) fn postgres_query<'q>(sql: &'q str, args: &'q [Value]) -> PgQuery<'q> {
    args.iter()
        .fold(sqlx::query(sql).persistent(false), bind_postgres_param)
}

/// Build a SQLite query with all arguments bound.
pub(crate) fn sqlite_query<'q>(sql: &'q str, args: &'q [Value]) -> SqliteQuery<'q> {
    args.iter()
        .fold(sqlx::query(sql).persistent(false), bind_sqlite_param)
}

/// Bind a parameter to a MySQL query.
fn bind_mysql_param<'q>(query: MySqlQuery<'q>, param: &'q Value) -> MySqlQuery<'q> {
    match param {
        Value::Null => query.bind(None::<String>),
        Value::Bool(v) => query.bind(*v),
        Value::Int(v) => query.bind(*v),
        Value::Float(v) => query.bind(*v),
        Value::Text(v) => query.bind(v.as_str()),
        Value::Bytes(v) => query.bind(v.as_slice()),
    }
}

/// A NULL parameter sent with an unspecified type (OID 0), so the server
/// infers it from context instead of rejecting TEXT against a typed column.
struct UntypedNull;

impl Type<Postgres> for UntypedNull {
    fn type_info() -> PgTypeInfo {
        PgTypeInfo::with_oid(Oid(0))
    }
}

impl Encode<'_, Postgres> for UntypedNull {
    fn encode_by_ref(&self, _buf: &mut PgArgumentBuffer) -> Result<IsNull, BoxDynError> {
        Ok(IsNull::Yes)
    }
}

/// Bind a parameter to a PostgreSQL query.
///
/// Text is bound as TEXT: the binary protocol gives the server no way to
/// coerce it, so non-text columns need an explicit cast in the SQL.
fn bind_postgres_param<'q>(query: PgQuery<'q>, param: &'q Value) -> PgQuery<'q> {
    match param {
        Value::Null => query.bind(UntypedNull),
        Value::Bool(v) => query.bind(*v),
        Value::Int(v) => query.bind(*v),
        Value::Float(v) => query.bind(*v),
        Value::Text(v) => query.bind(v.as_str()),
        Value::Bytes(v) => query.bind(v.as_slice()),
    }
}

/// Bind a parameter to a SQLite query.
fn bind_sqlite_param<'q>(query: SqliteQuery<'q>, param: &'q Value) -> SqliteQuery<'q> {
    match param {
        Value::Null => query.bind(None::<String>),
        Value::Bool(v) => query.bind(*v),
        Value::Int(v) => query.bind(*v),
        Value::Float(v) => query.bind(*v),
        Value::Text(v) => query.bind(v.as_str()),
        Value::Bytes(v) => query.bind(v.as_slice()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_postgres_null_is_untyped() {
        assert_eq!(
            <UntypedNull as Type<Postgres>>::type_info(),
            PgTypeInfo::with_oid(Oid(0))
        );

        let mut buf = PgArgumentBuffer::default();
        let is_null = UntypedNull.encode_by_ref(&mut buf).unwrap();
        assert!(is_null.is_null());
    }
}
