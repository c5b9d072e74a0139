//! Connection handles.
//!
//! A [`Connection`] is a cheap, cloneable handle to a registered pool. Every
//! call checks a connection out of the pool, runs one prepared statement and
//! returns the connection, except for row cursors and transactions which keep
//! theirs until they are finished.

use crate::db::dispatch::{Outcome, dispatch};
use crate::db::params;
use crate::db::pool::{DbPool, PoolStats};
use crate::db::rows::{Row, Rows};
use crate::db::types::DecodeRow;
use crate::error::{DbError, DbResult};
use crate::models::{DatabaseType, Descriptor, Statement};
use serde::Serialize;
use sqlx::mysql::MySqlQueryResult;
use sqlx::postgres::PgQueryResult;
use sqlx::sqlite::SqliteQueryResult;
use sqlx::{MySql, Postgres, Sqlite};
use std::sync::Arc;
use tracing::debug;

/// Outcome of a statement that modifies rows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ExecResult {
    pub rows_affected: u64,
    /// Auto-generated key of the last inserted row. PostgreSQL reports none;
    /// use `RETURNING` there instead.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_insert_id: Option<i64>,
}

impl From<MySqlQueryResult> for ExecResult {
    fn from(r: MySqlQueryResult) -> Self {
        Self {
            rows_affected: r.rows_affected(),
            last_insert_id: i64::try_from(r.last_insert_id()).ok().filter(|id| *id != 0),
        }
    }
}

impl From<PgQueryResult> for ExecResult {
    fn from(r: PgQueryResult) -> Self {
        Self {
            rows_affected: r.rows_affected(),
            last_insert_id: None,
        }
    }
}

impl From<SqliteQueryResult> for ExecResult {
    fn from(r: SqliteQueryResult) -> Self {
        Self {
            rows_affected: r.rows_affected(),
            last_insert_id: Some(r.last_insert_rowid()).filter(|id| *id != 0),
        }
    }
}

/// Handle to a named, registered pool.
#[derive(Debug, Clone)]
pub struct Connection {
    name: Arc<str>,
    pool: DbPool,
}

impl Connection {
    pub(crate) fn new(name: &str, pool: DbPool) -> Self {
        Self {
            name: Arc::from(name),
            pool,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Backend of the pool, which also selects the SQL flavor.
    pub fn db_type(&self) -> DatabaseType {
        self.pool.db_type()
    }

    /// Run a statement that does not return rows.
    pub async fn execute(&self, statement: &Statement) -> DbResult<ExecResult> {
        debug!(connection = %self.name, sql = %statement, "Executing statement");
        let (sql, args) = (statement.sql(), statement.args());
        let result = impl_db_dispatch!(&self.pool, {
            MySql(p) => params::mysql_query(sql, args).execute(p).await?.into(),
            Postgres(p) => params::postgres_query(sql, args).execute(p).await?.into(),
            SQLite(p) => params::sqlite_query(sql, args).execute(p).await?.into(),
        });
        Ok(result)
    }

    /// Run a query and return its first row, if any.
    pub async fn query_row(&self, statement: &Statement) -> DbResult<Option<Row>> {
        debug!(connection = %self.name, sql = %statement, "Querying row");
        let (sql, args) = (statement.sql(), statement.args());
        let row = impl_db_dispatch!(&self.pool, {
            MySql(p) => params::mysql_query(sql, args)
                .fetch_optional(p)
                .await?
                .map(|r| r.to_row()),
            Postgres(p) => params::postgres_query(sql, args)
                .fetch_optional(p)
                .await?
                .map(|r| r.to_row()),
            SQLite(p) => params::sqlite_query(sql, args)
                .fetch_optional(p)
                .await?
                .map(|r| r.to_row()),
        });
        Ok(row)
    }

    /// Run a query and return a cursor over its rows.
    ///
    /// The cursor holds one pooled connection until it is exhausted, closed
    /// or dropped.
    pub async fn query_rows(&self, statement: Statement) -> DbResult<Rows> {
        debug!(connection = %self.name, sql = %statement, "Querying rows");
        Rows::open(self.pool.clone(), statement).await
    }

    /// Check that the pool can reach the server.
    pub async fn ping(&self) -> DbResult<()> {
        self.pool.ping().await
    }

    pub fn stats(&self) -> PoolStats {
        self.pool.stats()
    }

    /// Start a transaction on a dedicated connection.
    pub async fn begin(&self) -> DbResult<Transaction> {
        let inner = impl_db_dispatch!(&self.pool, {
            MySql(p) => DbTransaction::MySql(p.begin().await?),
            Postgres(p) => DbTransaction::Postgres(p.begin().await?),
            SQLite(p) => DbTransaction::SQLite(p.begin().await?),
        });
        debug!(connection = %self.name, "Transaction started");
        Ok(Transaction {
            connection: Arc::clone(&self.name),
            inner,
        })
    }

    /// Run `statements` atomically: all are committed, or none are.
    pub async fn execute_in_transaction(
        &self,
        statements: &[Statement],
    ) -> DbResult<Vec<ExecResult>> {
        if statements.is_empty() {
            return Err(DbError::invalid_input(
                "Transaction batch must contain at least one statement",
            ));
        }

        let mut tx = self.begin().await?;
        let mut results = Vec::with_capacity(statements.len());
        for statement in statements {
            match tx.execute(statement).await {
                Ok(result) => results.push(result),
                Err(e) => {
                    if let Err(rollback_err) = tx.rollback().await {
                        debug!(
                            connection = %self.name,
                            error = %rollback_err,
                            "Rollback after failed statement also failed"
                        );
                    }
                    return Err(e);
                }
            }
        }
        tx.commit().await?;
        Ok(results)
    }

    /// Build and run `descriptor` on this connection.
    pub async fn dispatch(&self, descriptor: &Descriptor) -> Outcome {
        dispatch(descriptor, self).await
    }
}

/// Database-specific transaction wrapper.
enum DbTransaction {
    MySql(sqlx::Transaction<'static, MySql>),
    Postgres(sqlx::Transaction<'static, Postgres>),
    SQLite(sqlx::Transaction<'static, Sqlite>),
}

/// An open transaction.
///
/// Dropping it without [`commit`](Self::commit) rolls back.
pub struct Transaction {
    connection: Arc<str>,
    inner: DbTransaction,
}

impl Transaction {
    pub fn db_type(&self) -> DatabaseType {
        match self.inner {
            DbTransaction::MySql(_) => DatabaseType::MySQL,
            DbTransaction::Postgres(_) => DatabaseType::PostgreSQL,
            DbTransaction::SQLite(_) => DatabaseType::SQLite,
        }
    }

    /// Run a statement that does not return rows inside the transaction.
    pub async fn execute(&mut self, statement: &Statement) -> DbResult<ExecResult> {
        debug!(connection = %self.connection, sql = %statement, "Executing in transaction");
        let (sql, args) = (statement.sql(), statement.args());
        let result = match &mut self.inner {
            DbTransaction::MySql(tx) => params::mysql_query(sql, args)
                .execute(&mut **tx)
                .await?
                .into(),
            DbTransaction::Postgres(tx) => params::postgres_query(sql, args)
                .execute(&mut **tx)
                .await?
                .into(),
            DbTransaction::SQLite(tx) => params::sqlite_query(sql, args)
                .execute(&mut **tx)
                .await?
                .into(),
        };
        Ok(result)
    }

    /// Run a query inside the transaction and return its first row, if any.
    pub async fn query_row(&mut self, statement: &Statement) -> DbResult<Option<Row>> {
        let (sql, args) = (statement.sql(), statement.args());
        let row = match &mut self.inner {
            DbTransaction::MySql(tx) => params::mysql_query(sql, args)
                .fetch_optional(&mut **tx)
                .await?
                .map(|r| r.to_row()),
            DbTransaction::Postgres(tx) => params::postgres_query(sql, args)
                .fetch_optional(&mut **tx)
                .await?
                .map(|r| r.to_row()),
            DbTransaction::SQLite(tx) => params::sqlite_query(sql, args)
                .fetch_optional(&mut **tx)
                .await?
                .map(|r| r.to_row()),
        };
        Ok(row)
    }

    /// Commit the transaction.
    pub async fn commit(self) -> DbResult<()> {
        match self.inner {
            DbTransaction::MySql(tx) => tx.commit().await?,
            DbTransaction::Postgres(tx) => tx.commit().await?,
            DbTransaction::SQLite(tx) => tx.commit().await?,
        }
        debug!(connection = %self.connection, "Transaction committed");
        Ok(())
    }

    /// Rollback the transaction.
    pub async fn rollback(self) -> DbResult<()> {
        match self.inner {
            DbTransaction::MySql(tx) => tx.rollback().await?,
            DbTransaction::Postgres(tx) => tx.rollback().await?,
            DbTransaction::SQLite(tx) => tx.rollback().await?,
        }
        debug!(connection = %self.connection, "Transaction rolled back");
        Ok(())
    }
}

impl std::fmt::Debug for Transaction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Transaction")
            .field("connection", &self.connection)
            .field("db_type", &self.db_type())
            .finish_non_exhaustive()
    }
}
