//! Store handle for Aether's state.
//!
//! A [`Store`] is passed explicitly into every operation. It owns the connection
//! pool (and with it the per-key locks), so there is no process-wide database singleton.

use crate::core::db;
use crate::core::error::AetherError;
use crate::core::pool::SqlitePool;
use std::path::PathBuf;
use std::sync::Arc;

/// Store handle representing one Aether data directory.
///
/// Cloning is cheap and clones share the same pool, which is what makes the
/// per-key locks effective across threads.
#[derive(Debug, Clone)]
pub struct Store {
    /// Absolute path to the store root directory
    pub root: PathBuf,
    pool: Arc<SqlitePool>,
}

impl Store {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            pool: Arc::new(SqlitePool::new()),
        }
    }

    /// Open a store rooted at `root` and create every subsystem table.
    pub fn open(root: impl Into<PathBuf>) -> Result<Self, AetherError> {
        let store = Self::new(root);
        db::storage_preflight(&store.root)?;
        crate::subsystems::initialize_all_dbs(&store)?;
        Ok(store)
    }

    pub fn db_path(&self) -> PathBuf {
        db::aether_db_path(&self.root)
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}
