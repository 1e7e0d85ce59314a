//! Bounded SQLite connection pool
//!
//! Acquisition goes through a fair tokio semaphore with `max_connections`
//! permits, so waiters are served in FIFO order and a connection is only
//! ever opened while a permit is held. Connections are handed out as
//! `PooledConnection` guards which return themselves to the pool on drop.

use super::schema;
use crate::{Error, Result};
use rusqlite::{Connection, InterruptHandle, Transaction, TransactionBehavior};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::ops::{Deref, DerefMut};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tokio::sync::{OwnedSemaphorePermit, Semaphore};

pub const DEFAULT_MAX_CONNECTIONS: usize = 4;
pub const DEFAULT_ACQUIRE_TIMEOUT_MS: u64 = 5_000;
pub const DEFAULT_BUSY_TIMEOUT_MS: u64 = 5_000;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PoolConfig {
    pub max_connections: usize,
    pub acquire_timeout_ms: u64,
    pub busy_timeout_ms: u64,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            max_connections: DEFAULT_MAX_CONNECTIONS,
            acquire_timeout_ms: DEFAULT_ACQUIRE_TIMEOUT_MS,
            busy_timeout_ms: DEFAULT_BUSY_TIMEOUT_MS,
        }
    }
}

impl PoolConfig {
    pub fn acquire_timeout(&self) -> Duration {
        Duration::from_millis(self.acquire_timeout_ms)
    }

    pub fn busy_timeout(&self) -> Duration {
        Duration::from_millis(self.busy_timeout_ms)
    }
}

/// Point-in-time view of pool occupancy
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolStatus {
    pub max_connections: usize,
    pub idle: usize,
    pub in_use: usize,
}

struct PoolInner {
    path: PathBuf,
    config: PoolConfig,
    permits: Arc<Semaphore>,
    idle: Mutex<Vec<Connection>>,
    in_use: Mutex<HashMap<u64, InterruptHandle>>,
    next_id: AtomicU64,
    closed: AtomicBool,
}

impl PoolInner {
    fn open_connection(&self) -> Result<Connection> {
        let conn = Connection::open(&self.path)?;
        schema::configure_connection(&conn, self.config.busy_timeout())?;
        Ok(conn)
    }

    fn take_idle(&self) -> Option<Connection> {
        self.idle.lock().ok().and_then(|mut idle| idle.pop())
    }

    fn release(&self, id: u64, conn: Connection) {
        if let Ok(mut in_use) = self.in_use.lock() {
            in_use.remove(&id);
        }
        if self.closed.load(Ordering::SeqCst) {
            close_quietly(conn);
            return;
        }
        match self.idle.lock() {
            Ok(mut idle) => idle.push(conn),
            Err(_) => close_quietly(conn),
        }
    }
}

fn close_quietly(conn: Connection) {
    if let Err((_, err)) = conn.close() {
        tracing::warn!(error = %err, "failed to close sqlite connection");
    }
}

/// Shared handle to the pool; clones refer to the same pool.
#[derive(Clone)]
pub struct ConnectionPool {
    inner: Arc<PoolInner>,
}

impl ConnectionPool {
    /// Open a pool over an initialized database file.
    ///
    /// Fails with `SchemaMissing` when the schema has not been created.
    pub fn open(path: impl AsRef<Path>, config: PoolConfig) -> Result<Self> {
        if config.max_connections == 0 {
            return Err(Error::Config("pool.max_connections must be at least 1".to_string()));
        }

        let inner = PoolInner {
            path: path.as_ref().to_path_buf(),
            permits: Arc::new(Semaphore::new(config.max_connections)),
            config,
            idle: Mutex::new(Vec::new()),
            in_use: Mutex::new(HashMap::new()),
            next_id: AtomicU64::new(1),
            closed: AtomicBool::new(false),
        };

        let first = inner.open_connection()?;
        if !schema::schema_exists(&first)? {
            close_quietly(first);
            return Err(Error::SchemaMissing(inner.path.display().to_string()));
        }
        if let Ok(mut idle) = inner.idle.lock() {
            idle.push(first);
        }

        tracing::debug!(
            path = %inner.path.display(),
            max_connections = inner.config.max_connections,
            "connection pool opened"
        );
        Ok(Self { inner: Arc::new(inner) })
    }

    pub fn config(&self) -> &PoolConfig {
        &self.inner.config
    }

    pub fn is_closed(&self) -> bool {
        self.inner.closed.load(Ordering::SeqCst)
    }

    /// Wait (FIFO) for a connection, up to the configured acquire timeout.
    pub async fn acquire(&self) -> Result<PooledConnection> {
        if self.is_closed() {
            return Err(Error::PoolClosed);
        }

        let timeout = self.inner.config.acquire_timeout();
        let started = Instant::now();
        let permit = match tokio::time::timeout(timeout, self.inner.permits.clone().acquire_owned()).await {
            Ok(Ok(permit)) => permit,
            Ok(Err(_)) => return Err(Error::PoolClosed),
            Err(_) => {
                let waited_ms = started.elapsed().as_millis() as u64;
                tracing::warn!(
                    waited_ms,
                    max_connections = self.inner.config.max_connections,
                    "connection pool exhausted"
                );
                return Err(Error::PoolExhausted {
                    waited_ms,
                    max_connections: self.inner.config.max_connections,
                });
            }
        };

        let conn = match self.inner.take_idle() {
            Some(conn) => conn,
            None => self.inner.open_connection()?,
        };

        let id = self.inner.next_id.fetch_add(1, Ordering::SeqCst);
        if let Ok(mut in_use) = self.inner.in_use.lock() {
            in_use.insert(id, conn.get_interrupt_handle());
        }

        Ok(PooledConnection {
            id,
            conn: Some(conn),
            pool: Arc::clone(&self.inner),
            _permit: permit,
        })
    }

    /// Run `op` inside one `BEGIN IMMEDIATE` transaction on a blocking thread.
    ///
    /// Commits when `op` succeeds; any error rolls back and is returned. A
    /// failed rollback is logged and never replaces the error from `op`.
    pub async fn with_transaction<T, F>(&self, op: F) -> Result<T>
    where
        F: FnOnce(&Transaction<'_>) -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let mut conn = self.acquire().await?;
        tokio::task::spawn_blocking(move || -> Result<T> {
            let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
            match op(&tx) {
                Ok(value) => {
                    tx.commit()?;
                    Ok(value)
                }
                Err(err) => {
                    match tx.rollback() {
                        Ok(()) => tracing::debug!(error = %err, "transaction rolled back"),
                        Err(rollback) => tracing::warn!(error = %err, %rollback, "rollback failed"),
                    }
                    Err(err)
                }
            }
        })
        .await?
    }

    /// Run a read-only `op` on a pooled connection on a blocking thread.
    pub async fn with_connection<T, F>(&self, op: F) -> Result<T>
    where
        F: FnOnce(&Connection) -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let conn = self.acquire().await?;
        tokio::task::spawn_blocking(move || op(&conn)).await?
    }

    pub fn status(&self) -> PoolStatus {
        let idle = self.inner.idle.lock().map(|i| i.len()).unwrap_or(0);
        let in_use = self.inner.in_use.lock().map(|i| i.len()).unwrap_or(0);
        PoolStatus {
            max_connections: self.inner.config.max_connections,
            idle,
            in_use,
        }
    }

    /// Close the pool: idle connections are closed, connections still in use
    /// are interrupted and closed on release, later acquisitions fail.
    pub fn close(&self) {
        if self.inner.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        self.inner.permits.close();

        let idle: Vec<Connection> = self
            .inner
            .idle
            .lock()
            .map(|mut idle| idle.drain(..).collect())
            .unwrap_or_default();
        let closed_idle = idle.len();
        for conn in idle {
            close_quietly(conn);
        }

        if let Ok(in_use) = self.inner.in_use.lock() {
            if !in_use.is_empty() {
                tracing::warn!(count = in_use.len(), "force-closing connections still in use");
                for handle in in_use.values() {
                    handle.interrupt();
                }
            }
        }
        tracing::debug!(closed_idle, "connection pool closed");
    }
}

/// A connection checked out of the pool; returned on drop.
pub struct PooledConnection {
    id: u64,
    conn: Option<Connection>,
    pool: Arc<PoolInner>,
    _permit: OwnedSemaphorePermit,
}

impl Deref for PooledConnection {
    type Target = Connection;

    fn deref(&self) -> &Connection {
        self.conn.as_ref().expect("pooled connection is present until drop")
    }
}

impl DerefMut for PooledConnection {
    fn deref_mut(&mut self) -> &mut Connection {
        self.conn.as_mut().expect("pooled connection is present until drop")
    }
}

impl Drop for PooledConnection {
    fn drop(&mut self) {
        if let Some(conn) = self.conn.take() {
            self.pool.release(self.id, conn);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex as StdMutex;

    fn pool_with(dir: &tempfile::TempDir, max: usize, timeout_ms: u64) -> ConnectionPool {
        let path = dir.path().join("pool.db");
        schema::initialize_database(&path).unwrap();
        ConnectionPool::open(
            &path,
            PoolConfig {
                max_connections: max,
                acquire_timeout_ms: timeout_ms,
                busy_timeout_ms: 1_000,
            },
        )
        .unwrap()
    }

    #[tokio::test]
    async fn test_acquire_beyond_capacity_times_out() {
        let dir = tempfile::tempdir().unwrap();
        let pool = pool_with(&dir, 2, 100);

        let _a = pool.acquire().await.unwrap();
        let _b = pool.acquire().await.unwrap();
        let third = pool.acquire().await;

        assert!(matches!(third, Err(Error::PoolExhausted { max_connections: 2, .. })));
        assert_eq!(pool.status().in_use, 2);
    }

    #[tokio::test]
    async fn test_waiter_proceeds_after_release() {
        let dir = tempfile::tempdir().unwrap();
        let pool = pool_with(&dir, 1, 2_000);

        let held = pool.acquire().await.unwrap();
        let waiter = {
            let pool = pool.clone();
            tokio::spawn(async move { pool.acquire().await.map(|_| ()) })
        };
        tokio::time::sleep(Duration::from_millis(50)).await;
        drop(held);

        assert!(waiter.await.unwrap().is_ok());
    }

    #[tokio::test]
    async fn test_waiters_are_served_in_order() {
        let dir = tempfile::tempdir().unwrap();
        let pool = pool_with(&dir, 1, 2_000);
        let order = Arc::new(StdMutex::new(Vec::new()));

        let held = pool.acquire().await.unwrap();
        let mut handles = Vec::new();
        for label in ["first", "second", "third"] {
            let pool = pool.clone();
            let order = Arc::clone(&order);
            handles.push(tokio::spawn(async move {
                let _conn = pool.acquire().await.unwrap();
                order.lock().unwrap().push(label);
            }));
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        drop(held);
        for handle in handles {
            handle.await.unwrap();
        }

        assert_eq!(*order.lock().unwrap(), vec!["first", "second", "third"]);
    }

    #[tokio::test]
    async fn test_failed_transaction_leaves_no_rows() {
        let dir = tempfile::tempdir().unwrap();
        let pool = pool_with(&dir, 2, 500);

        let result: Result<()> = pool
            .with_transaction(|tx| {
                tx.execute(
                    "INSERT INTO projects (id, name, created_at) VALUES (1, 'demo', 'now')",
                    [],
                )?;
                Err(Error::InvalidValue("boom".to_string()))
            })
            .await;
        assert!(result.is_err());

        let count: i64 = pool
            .with_connection(|conn| Ok(conn.query_row("SELECT COUNT(*) FROM projects", [], |r| r.get(0))?))
            .await
            .unwrap();
        assert_eq!(count, 0);
        assert_eq!(pool.status().in_use, 0);
    }

    #[tokio::test]
    async fn test_rollback_failure_keeps_original_error() {
        let dir = tempfile::tempdir().unwrap();
        let pool = pool_with(&dir, 2, 500);

        // Ending the transaction early makes the pool's own rollback fail.
        let result: Result<()> = pool
            .with_transaction(|tx| {
                tx.execute_batch("ROLLBACK")?;
                Err(Error::InvalidValue("boom".to_string()))
            })
            .await;
        assert!(matches!(result, Err(Error::InvalidValue(ref message)) if message == "boom"));
        assert_eq!(pool.status().in_use, 0);
    }

    #[tokio::test]
    async fn test_successful_transaction_commits() {
        let dir = tempfile::tempdir().unwrap();
        let pool = pool_with(&dir, 2, 500);

        pool.with_transaction(|tx| {
            tx.execute(
                "INSERT INTO projects (id, name, created_at) VALUES (7, 'demo', 'now')",
                [],
            )?;
            Ok(())
        })
        .await
        .unwrap();

        let name: String = pool
            .with_connection(|conn| Ok(conn.query_row("SELECT name FROM projects WHERE id = 7", [], |r| r.get(0))?))
            .await
            .unwrap();
        assert_eq!(name, "demo");
    }

    #[tokio::test]
    async fn test_close_rejects_new_acquisitions() {
        let dir = tempfile::tempdir().unwrap();
        let pool = pool_with(&dir, 2, 500);

        let held = pool.acquire().await.unwrap();
        pool.close();
        assert!(matches!(pool.acquire().await, Err(Error::PoolClosed)));

        drop(held);
        let status = pool.status();
        assert_eq!(status.idle, 0);
        assert_eq!(status.in_use, 0);
    }

    #[test]
    fn test_missing_schema_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let result = ConnectionPool::open(dir.path().join("empty.db"), PoolConfig::default());
        assert!(matches!(result, Err(Error::SchemaMissing(_))));
    }
}
