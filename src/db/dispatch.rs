//! Single-shot execution of operation descriptors.
//!
//! [`dispatch`] builds the statement for a [`Descriptor`], runs it with the
//! [`Connection`] primitive matching the operation kind and wraps whatever
//! comes back in an [`Outcome`]. It never panics on bad input: validation
//! failures and driver errors both end up in [`Outcome::error`].

use crate::db::connection::{Connection, ExecResult};
use crate::db::rows::{Row, Rows};
use crate::error::{DbError, DbResult};
use crate::models::{Descriptor, Operation};
use std::mem;
use std::time::{Duration, Instant};
use tracing::debug;

/// What a dispatched operation produced.
#[derive(Debug, Default)]
pub enum Payload {
    #[default]
    None,
    /// Create, update and delete.
    Exec(ExecResult),
    /// Single-row read; `None` when nothing matched.
    Row(Option<Row>),
    /// Batch read.
    Rows(Rows),
}

/// Result of one dispatched operation.
#[derive(Debug)]
pub struct Outcome {
    kind: Option<Operation>,
    payload: Payload,
    error: Option<DbError>,
    elapsed: Duration,
}

impl Outcome {
    pub fn kind(&self) -> Option<Operation> {
        self.kind
    }

    /// Wall-clock time from dispatch entry to return.
    pub fn elapsed(&self) -> Duration {
        self.elapsed
    }

    pub fn error(&self) -> Option<&DbError> {
        self.error.as_ref()
    }

    pub fn is_ok(&self) -> bool {
        self.error.is_none()
    }

    /// Convert into a `Result`, keeping the outcome on success.
    pub fn check(mut self) -> DbResult<Self> {
        match self.error.take() {
            Some(e) => Err(e),
            None => Ok(self),
        }
    }

    pub fn payload(&self) -> &Payload {
        &self.payload
    }

    pub fn into_payload(self) -> Payload {
        self.payload
    }

    pub fn exec_result(&self) -> DbResult<&ExecResult> {
        match &self.payload {
            Payload::Exec(result) => Ok(result),
            _ => Err(DbError::result_unavailable("write result")),
        }
    }

    pub fn rows_affected(&self) -> DbResult<u64> {
        self.exec_result().map(|r| r.rows_affected)
    }

    pub fn last_insert_id(&self) -> DbResult<i64> {
        self.exec_result()?
            .last_insert_id
            .ok_or_else(|| DbError::result_unavailable("last insert id"))
    }

    /// The row of a single-row read, `None` if no row was produced.
    pub fn row(&self) -> Option<&Row> {
        match &self.payload {
            Payload::Row(row) => row.as_ref(),
            _ => None,
        }
    }

    pub fn take_row(&mut self) -> Option<Row> {
        match &mut self.payload {
            Payload::Row(row) => row.take(),
            _ => None,
        }
    }

    /// Take the cursor of a batch read; an empty cursor if none was produced.
    pub fn take_rows(&mut self) -> Rows {
        match mem::take(&mut self.payload) {
            Payload::Rows(rows) => rows,
            other => {
                self.payload = other;
                Rows::empty()
            }
        }
    }

    /// Release the cursor of a batch read, if any. No-op otherwise.
    pub fn close_rows(&mut self) {
        if let Payload::Rows(rows) = &mut self.payload {
            rows.close();
        }
    }
}

/// Build and run `descriptor` on `conn`.
pub async fn dispatch(descriptor: &Descriptor, conn: &Connection) -> Outcome {
    let start = Instant::now();
    let result = run(descriptor, conn).await;
    let elapsed = start.elapsed();

    let (payload, error) = match result {
        Ok(payload) => (payload, None),
        Err(e) => (Payload::None, Some(e)),
    };

    debug!(
        connection = %conn.name(),
        operation = ?descriptor.kind,
        table = %descriptor.table,
        elapsed_ms = elapsed.as_millis() as u64,
        ok = error.is_none(),
        "Dispatched"
    );

    Outcome {
        kind: descriptor.kind,
        payload,
        error,
        elapsed,
    }
}

async fn run(descriptor: &Descriptor, conn: &Connection) -> DbResult<Payload> {
    let statement = descriptor.build(conn.db_type())?;
    let kind = descriptor
        .kind
        .ok_or_else(|| DbError::invalid_operation("no operation kind set"))?;

    match kind {
        Operation::Create | Operation::Update | Operation::Delete => {
            conn.execute(&statement).await.map(Payload::Exec)
        }
        Operation::Read if descriptor.query.batch => {
            conn.query_rows(statement).await.map(Payload::Rows)
        }
        Operation::Read => conn.query_row(&statement).await.map(Payload::Row),
    }
}
