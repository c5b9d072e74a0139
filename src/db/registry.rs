//! Registry of named connection pools.
//!
//! The registry owns every pool it opens. Lookups hand out [`Connection`]
//! handles that share the pool; once a name is unregistered its pool is
//! closed and any handle still held fails with a "pool closed" error.

use crate::config::DEFAULT_CLOSE_TIMEOUT_SECS;
use crate::db::connection::Connection;
use crate::db::pool::{DbPool, connection_suggestion};
use crate::error::{CloseFailure, DbError, DbResult};
use crate::models::PoolConfig;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

#[derive(Debug)]
struct PoolEntry {
    pool: DbPool,
    config: PoolConfig,
}

/// Named pools shared across tasks. Cloning shares the same registry.
#[derive(Debug, Clone)]
pub struct ConnectionRegistry {
    pools: Arc<RwLock<HashMap<String, PoolEntry>>>,
    close_timeout: Duration,
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self {
            pools: Arc::new(RwLock::new(HashMap::new())),
            close_timeout: Duration::from_secs(DEFAULT_CLOSE_TIMEOUT_SECS),
        }
    }

    /// Upper bound for closing one pool during unregistration.
    pub fn with_close_timeout(mut self, close_timeout: Duration) -> Self {
        self.close_timeout = close_timeout;
        self
    }

    /// Open, verify and register a batch of pools.
    ///
    /// Names and configurations are validated and checked against existing
    /// registrations before anything is opened. Registration is
    /// all-or-nothing: if any pool fails to open or answer a ping, every
    /// pool opened by this call is closed and nothing is registered.
    pub async fn register(&self, configs: HashMap<String, PoolConfig>) -> DbResult<()> {
        let mut batch: Vec<(String, PoolConfig)> = configs.into_iter().collect();
        batch.sort_by(|a, b| a.0.cmp(&b.0));

        let mut db_types = Vec::with_capacity(batch.len());
        for (name, config) in &batch {
            if name.is_empty() {
                return Err(DbError::EmptyName);
            }
            db_types.push(config.validate()?);
        }

        // Early check for existing names
        {
            let pools = self.pools.read().await;
            if let Some((name, _)) = batch.iter().find(|(name, _)| pools.contains_key(name)) {
                return Err(DbError::already_registered(name));
            }
        }

        let mut opened: Vec<(String, PoolEntry)> = Vec::with_capacity(batch.len());
        for ((name, config), db_type) in batch.into_iter().zip(db_types) {
            let pool = match DbPool::open(&name, &config, db_type) {
                Ok(pool) => pool,
                Err(e) => {
                    close_entries(opened).await;
                    return Err(e);
                }
            };

            if let Err(e) = pool.ping().await {
                pool.close().await;
                close_entries(opened).await;
                let suggestion = connection_suggestion(db_type, &e);
                return Err(DbError::unreachable(name, e.to_string(), suggestion));
            }

            debug!(connection = %name, db_type = %db_type, "Pool verified");
            opened.push((name, PoolEntry { pool, config }));
        }

        // Re-check after async work to prevent TOCTOU race.
        // On conflict the batch is closed outside the lock.
        let conflict = {
            let mut pools = self.pools.write().await;
            let conflict = opened
                .iter()
                .find(|(name, _)| pools.contains_key(name))
                .map(|(name, _)| name.clone());
            if conflict.is_none() {
                for (name, entry) in opened.drain(..) {
                    info!(
                        connection = %name,
                        db_type = %entry.pool.db_type(),
                        dsn = %entry.config.masked_dsn(),
                        "Connection registered"
                    );
                    pools.insert(name, entry);
                }
            }
            conflict
        }; // Lock released here

        if let Some(name) = conflict {
            close_entries(opened).await;
            return Err(DbError::already_registered(name));
        }
        Ok(())
    }

    /// Register a single pool.
    pub async fn register_one(&self, name: impl Into<String>, config: PoolConfig) -> DbResult<()> {
        self.register(HashMap::from([(name.into(), config)])).await
    }

    /// Get a handle to the pool registered as `name`.
    pub async fn lookup(&self, name: &str) -> DbResult<Connection> {
        if name.is_empty() {
            return Err(DbError::EmptyName);
        }
        let pools = self.pools.read().await;
        pools
            .get(name)
            .map(|entry| Connection::new(name, entry.pool.clone()))
            .ok_or_else(|| DbError::not_registered(name))
    }

    /// Get the configuration `name` was registered with.
    pub async fn config(&self, name: &str) -> DbResult<PoolConfig> {
        let pools = self.pools.read().await;
        pools
            .get(name)
            .map(|entry| entry.config.clone())
            .ok_or_else(|| DbError::not_registered(name))
    }

    /// Close and remove one pool.
    pub async fn unregister(&self, name: &str) -> DbResult<()> {
        let entry = {
            let mut pools = self.pools.write().await;
            pools
                .remove(name)
                .ok_or_else(|| DbError::not_registered(name))?
        };
        self.close_entry(name, &entry).await
    }

    /// Close and remove every pool.
    ///
    /// Every pool is attempted even if an earlier one fails to close; all
    /// failures are returned together as [`DbError::Teardown`]. Calling this
    /// on an empty registry is a no-op.
    pub async fn unregister_all(&self) -> DbResult<()> {
        let mut pools = self.pools.write().await;
        let mut drained: Vec<(String, PoolEntry)> = pools.drain().collect();
        drained.sort_by(|a, b| a.0.cmp(&b.0));

        let mut failures = Vec::new();
        for (name, entry) in drained {
            if let Err(error) = self.close_entry(&name, &entry).await {
                failures.push(CloseFailure { name, error });
            }
        }

        if failures.is_empty() {
            info!("All connections closed");
            Ok(())
        } else {
            Err(DbError::Teardown { failures })
        }
    }

    /// Registered names, sorted.
    pub async fn names(&self) -> Vec<String> {
        let pools = self.pools.read().await;
        let mut names: Vec<String> = pools.keys().cloned().collect();
        names.sort();
        names
    }

    pub async fn contains(&self, name: &str) -> bool {
        let pools = self.pools.read().await;
        pools.contains_key(name)
    }

    pub async fn len(&self) -> usize {
        let pools = self.pools.read().await;
        pools.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    async fn close_entry(&self, name: &str, entry: &PoolEntry) -> DbResult<()> {
        info!(connection = %name, "Closing connection");
        match tokio::time::timeout(self.close_timeout, entry.pool.close()).await {
            Ok(()) => Ok(()),
            Err(_) => {
                warn!(
                    connection = %name,
                    timeout_ms = self.close_timeout.as_millis() as u64,
                    in_use = entry.pool.stats().in_use(),
                    "Pool did not close in time"
                );
                Err(DbError::timeout("pool close", self.close_timeout))
            }
        }
    }
}

impl Default for ConnectionRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// Close pools that were opened but never registered.
async fn close_entries(entries: Vec<(String, PoolEntry)>) {
    for (name, entry) in entries {
        debug!(connection = %name, "Closing unregistered pool");
        entry.pool.close().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_registry_creation() {
        let registry = ConnectionRegistry::new();
        assert_eq!(registry.len().await, 0);
        assert!(registry.is_empty().await);
    }

    #[tokio::test]
    async fn test_lookup_errors() {
        let registry = ConnectionRegistry::new();
        assert!(matches!(registry.lookup("").await, Err(DbError::EmptyName)));
        assert!(matches!(
            registry.lookup("game").await,
            Err(DbError::NotRegistered { .. })
        ));
    }

    #[tokio::test]
    async fn test_register_rejects_empty_name_before_opening() {
        let registry = ConnectionRegistry::new();
        let err = registry
            .register_one("", PoolConfig::new("sqlite::memory:"))
            .await
            .unwrap_err();
        assert!(matches!(err, DbError::EmptyName));
    }

    #[tokio::test]
    async fn test_register_rejects_invalid_config() {
        let registry = ConnectionRegistry::new();
        let err = registry
            .register_one("game", PoolConfig::new(""))
            .await
            .unwrap_err();
        assert!(matches!(err, DbError::ConfigInvalid { .. }));
        assert!(registry.is_empty().await);
    }

    #[tokio::test]
    async fn test_unregister_all_empty_is_noop() {
        let registry = ConnectionRegistry::new();
        registry.unregister_all().await.unwrap();
        registry.unregister_all().await.unwrap();
    }

    #[tokio::test]
    async fn test_unregister_unknown() {
        let registry = ConnectionRegistry::new();
        assert!(matches!(
            registry.unregister("game").await,
            Err(DbError::NotRegistered { .. })
        ));
    }

    #[tokio::test]
    async fn test_memory_pool_lifecycle() {
        let registry = ConnectionRegistry::new();
        registry
            .register_one("mem", PoolConfig::new("sqlite::memory:"))
            .await
            .unwrap();
        assert_eq!(registry.names().await, vec!["mem".to_string()]);

        let conn = registry.lookup("mem").await.unwrap();
        conn.ping().await.unwrap();

        let err = registry
            .register_one("mem", PoolConfig::new("sqlite::memory:"))
            .await
            .unwrap_err();
        assert!(matches!(err, DbError::AlreadyRegistered { .. }));

        registry.unregister_all().await.unwrap();
        assert!(registry.is_empty().await);
        assert!(matches!(conn.ping().await, Err(DbError::Connection { .. })));
    }
}
