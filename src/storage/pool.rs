//! Bounded pool of DuckDB connections.
//!
//! All connections are clones of one root connection, so they share the same
//! database. A caller holds a [`PooledConnection`] for the duration of one
//! query; dropping it returns the connection on every exit path.

use crate::error::{Error, Result};
use duckdb::Connection;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::ops::{Deref, DerefMut};
use std::path::Path;
use std::sync::Arc;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tracing::debug;

/// Path that selects an in-memory database.
pub const IN_MEMORY: &str = ":memory:";

struct PoolInner {
    root: Mutex<Connection>,
    idle: Mutex<VecDeque<Connection>>,
    permits: Arc<Semaphore>,
    size: usize,
}

/// Connection pool handle.
#[derive(Clone)]
pub struct DuckDbPool {
    inner: Arc<PoolInner>,
}

impl DuckDbPool {
    /// Opens `path` (or an in-memory database for [`IN_MEMORY`]) with at most
    /// `size` connections handed out at once.
    pub fn open(path: &str, size: usize) -> Result<Self> {
        let root = if path.is_empty() || path == IN_MEMORY {
            Connection::open_in_memory()?
        } else {
            Connection::open(Path::new(path))?
        };
        Ok(Self::from_connection(root, size))
    }

    pub fn from_connection(root: Connection, size: usize) -> Self {
        let size = size.max(1);
        debug!(size, "Creating DuckDB connection pool");
        Self {
            inner: Arc::new(PoolInner {
                root: Mutex::new(root),
                idle: Mutex::new(VecDeque::with_capacity(size)),
                permits: Arc::new(Semaphore::new(size)),
                size,
            }),
        }
    }

    /// Waits for a free slot and hands out a connection.
    pub async fn acquire(&self) -> Result<PooledConnection> {
        let permit = self
            .inner
            .permits
            .clone()
            .acquire_owned()
            .await
            .map_err(|_| Error::InvalidState("connection pool is closed".to_owned()))?;

        let conn = match self.inner.idle.lock().pop_front() {
            Some(conn) => conn,
            None => self.inner.root.lock().try_clone()?,
        };
        Ok(PooledConnection {
            pool: self.inner.clone(),
            conn: Some(conn),
            _permit: permit,
        })
    }

    pub fn size(&self) -> usize {
        self.inner.size
    }

    /// Connections currently handed out.
    pub fn in_use(&self) -> usize {
        self.inner.size - self.inner.permits.available_permits()
    }

    pub fn idle(&self) -> usize {
        self.inner.idle.lock().len()
    }
}

/// RAII wrapper returning a connection to the pool on drop.
pub struct PooledConnection {
    pool: Arc<PoolInner>,
    conn: Option<Connection>,
    // Released after the connection is back in the idle queue.
    _permit: OwnedSemaphorePermit,
}

impl Deref for PooledConnection {
    type Target = Connection;

    fn deref(&self) -> &Connection {
        match &self.conn {
            Some(conn) => conn,
            None => unreachable!("connection is only taken on drop"),
        }
    }
}

impl DerefMut for PooledConnection {
    fn deref_mut(&mut self) -> &mut Connection {
        match &mut self.conn {
            Some(conn) => conn,
            None => unreachable!("connection is only taken on drop"),
        }
    }
}

impl Drop for PooledConnection {
    fn drop(&mut self) {
        if let Some(conn) = self.conn.take() {
            self.pool.idle.lock().push_back(conn);
        }
    }
}
