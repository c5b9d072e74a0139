//! Result rows and the streaming multi-row cursor.
//!
//! A [`Rows`] cursor is backed by a producer task that owns one pooled
//! connection for as long as it streams. Rows are handed over through a
//! bounded channel, so a slow consumer applies backpressure and the
//! connection stays checked out until the cursor is exhausted, closed or
//! dropped.

use crate::db::params;
use crate::db::pool::DbPool;
use crate::db::types::DecodeRow;
use crate::error::{DbError, DbResult};
use crate::models::{Statement, Value};
use futures_util::{Stream, StreamExt};
use serde::ser::{Serialize, SerializeMap, Serializer};
use std::fmt;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

/// Rows buffered between the producer task and the cursor.
const ROW_CHANNEL_CAPACITY: usize = 64;

/// One result row: column names with their decoded values.
#[derive(Debug, Clone, PartialEq)]
pub struct Row {
    columns: Vec<String>,
    values: Vec<Value>,
}

impl Row {
    pub(crate) fn new(columns: Vec<String>, values: Vec<Value>) -> Self {
        Self { columns, values }
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn values(&self) -> &[Value] {
        &self.values
    }

    /// Value of the first column called `column`.
    pub fn get(&self, column: &str) -> Option<&Value> {
        self.columns
            .iter()
            .position(|c| c == column)
            .map(|i| &self.values[i])
    }

    pub fn get_index(&self, index: usize) -> Option<&Value> {
        self.values.get(index)
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.columns.iter().map(String::as_str).zip(&self.values)
    }
}

/// Serialized as an object in column order.
impl Serialize for Row {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.values.len()))?;
        for (column, value) in self.iter() {
            map.serialize_entry(column, value)?;
        }
        map.end()
    }
}

/// Streaming cursor over the rows of a multi-row read.
pub struct Rows {
    pending: Option<Row>,
    rx: Option<mpsc::Receiver<DbResult<Row>>>,
    handle: Option<JoinHandle<()>>,
}

impl Rows {
    /// A cursor that yields nothing.
    pub fn empty() -> Self {
        Self {
            pending: None,
            rx: None,
            handle: None,
        }
    }

    /// Start streaming `statement` on its own pooled connection.
    ///
    /// Waits for the first row so that a failing statement is reported here
    /// rather than on the first call to [`next`](Self::next).
    pub(crate) async fn open(pool: DbPool, statement: Statement) -> DbResult<Self> {
        let (tx, mut rx) = mpsc::channel(ROW_CHANNEL_CAPACITY);

        let handle = tokio::spawn(async move {
            let (sql, args) = statement.into_parts();
            impl_db_dispatch!(&pool, {
                MySql(p) => forward(params::mysql_query(&sql, &args).fetch(p), &tx).await,
                Postgres(p) => forward(params::postgres_query(&sql, &args).fetch(p), &tx).await,
                SQLite(p) => forward(params::sqlite_query(&sql, &args).fetch(p), &tx).await,
            })
        });

        let mut rows = Self {
            pending: None,
            rx: None,
            handle: Some(handle),
        };
        match rx.recv().await {
            Some(Ok(row)) => {
                rows.pending = Some(row);
                rows.rx = Some(rx);
            }
            Some(Err(e)) => return Err(e),
            None => rows.handle = None,
        }
        Ok(rows)
    }

    /// Next row, `None` once the cursor is exhausted or closed.
    ///
    /// A driver error is yielded once and ends the cursor.
    pub async fn next(&mut self) -> Option<DbResult<Row>> {
        if let Some(row) = self.pending.take() {
            return Some(Ok(row));
        }
        let item = self.rx.as_mut()?.recv().await;
        match item {
            Some(Ok(row)) => Some(Ok(row)),
            Some(Err(e)) => {
                self.close();
                Some(Err(e))
            }
            None => {
                self.rx = None;
                self.handle = None;
                None
            }
        }
    }

    /// Drain the remaining rows.
    pub async fn collect_all(mut self) -> DbResult<Vec<Row>> {
        let mut rows = Vec::new();
        while let Some(row) = self.next().await {
            rows.push(row?);
        }
        Ok(rows)
    }

    /// Stop streaming and release the pooled connection.
    ///
    /// Idempotent. Buffered rows are discarded.
    pub fn close(&mut self) {
        if let Some(handle) = self.handle.take() {
            handle.abort();
        }
        if let Some(mut rx) = self.rx.take() {
            rx.close();
        }
        self.pending = None;
    }

    /// Whether the cursor can still yield rows.
    pub fn is_open(&self) -> bool {
        self.pending.is_some() || self.rx.is_some()
    }
}

impl Drop for Rows {
    fn drop(&mut self) {
        self.close();
    }
}

impl fmt::Debug for Rows {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Rows")
            .field("open", &self.is_open())
            .field("pending", &self.pending.is_some())
            .finish_non_exhaustive()
    }
}

/// Pump decoded rows into the channel until the stream ends, the first
/// error is sent, or the cursor goes away.
async fn forward<S, R>(mut stream: S, tx: &mpsc::Sender<DbResult<Row>>)
where
    S: Stream<Item = Result<R, sqlx::Error>> + Unpin,
    R: DecodeRow,
{
    while let Some(item) = stream.next().await {
        let item = item.map(|r| r.to_row()).map_err(DbError::from);
        let failed = item.is_err();
        if tx.send(item).await.is_err() || failed {
            break;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row() -> Row {
        Row::new(
            vec!["id".to_string(), "name".to_string()],
            vec![Value::Int(1), Value::from("Tony")],
        )
    }

    #[test]
    fn test_row_get() {
        let row = row();
        assert_eq!(row.get("name"), Some(&Value::from("Tony")));
        assert_eq!(row.get("missing"), None);
        assert_eq!(row.get_index(0), Some(&Value::Int(1)));
        assert_eq!(row.len(), 2);
    }

    #[test]
    fn test_row_serializes_in_column_order() {
        let json = serde_json::to_string(&row()).unwrap();
        assert_eq!(json, r#"{"id":1,"name":"Tony"}"#);
    }

    #[tokio::test]
    async fn test_empty_cursor() {
        let mut rows = Rows::empty();
        assert!(!rows.is_open());
        assert!(rows.next().await.is_none());
        rows.close();
        assert!(rows.collect_all().await.unwrap().is_empty());
    }
}
