//! Row store connection pool using r2d2.

use std::path::Path;
use std::time::Duration;

use duckdb::DuckdbConnectionManager;
use r2d2::{Pool, PooledConnection};

use crate::storage::StorageError;
use crate::storage::schema::init_schema;

/// Path selecting a private in-memory database.
pub const MEMORY_PATH: &str = ":memory:";

/// Maximum wait for a pooled connection.
const CONNECTION_TIMEOUT: Duration = Duration::from_secs(5);

/// A pooled connection to the row store.
pub type StoreConnection = PooledConnection<DuckdbConnectionManager>;

/// Handle to the backing row store.
///
/// Cheap to clone; every clone shares the same pool and, for in-memory
/// stores, the same database instance.
#[derive(Clone)]
pub struct Store {
    pool: Pool<DuckdbConnectionManager>,
}

impl std::fmt::Debug for Store {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Store")
            .field("connections", &self.pool.state().connections)
            .finish_non_exhaustive()
    }
}

impl Store {
    /// Open (or create) the store at `path` and initialize its schema.
    ///
    /// `":memory:"` opens an in-memory database shared by all pool connections.
    pub fn open(path: &str, size: u32) -> Result<Self, StorageError> {
        let manager = if path == MEMORY_PATH {
            DuckdbConnectionManager::memory()?
        } else {
            create_parent_dir(Path::new(path))?;
            DuckdbConnectionManager::file(path)?
        };

        let pool = Pool::builder()
            .max_size(size)
            .connection_timeout(CONNECTION_TIMEOUT)
            .test_on_check_out(false)
            .build(manager)?;

        let store = Self { pool };
        let conn = store.connection()?;
        init_schema(&conn)?;
        drop(conn);
        tracing::info!(path, pool_size = size, "Row store opened");
        Ok(store)
    }

    /// Open a fresh in-memory store.
    pub fn in_memory() -> Result<Self, StorageError> {
        Self::open(MEMORY_PATH, 2)
    }

    /// Check out a connection and ping it.
    ///
    /// Every database-using operation starts here, so a lost connection fails
    /// that one operation instead of the agent.
    pub fn connection(&self) -> Result<StoreConnection, StorageError> {
        let conn = self.pool.get()?;
        conn.execute_batch("SELECT 1")?;
        Ok(conn)
    }
}

fn create_parent_dir(path: &Path) -> Result<(), StorageError> {
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
        && !parent.exists()
    {
        std::fs::create_dir_all(parent).map_err(|e| {
            StorageError::Internal(format!(
                "Failed to create database directory '{}': {}",
                parent.display(),
                e
            ))
        })?;
    }
    Ok(())
}
