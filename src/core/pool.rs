//! SQLite connection pool with read/write separation, per-key locking and retry logic.
//!
//! - Writes that are not tied to a ledger key are serialized through a **write mutex** per DB.
//! - Ledger mutations take a **key lock** for their (user, guild) pair, so two updates to the
//!   same record never interleave while updates to different records proceed independently.
//! - Every write runs inside an `IMMEDIATE` transaction; SQLite's own write lock covers
//!   other processes touching the same file.
//! - Read connections are created fresh per operation (WAL allows concurrent readers).
//!
//! Connections are not cached. Opening per operation keeps WAL/SHM handles short-lived.

use crate::core::db;
use crate::core::error::AetherError;
use rusqlite::{Connection, TransactionBehavior};
use rustc_hash::FxHashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

/// Maximum retry attempts for busy/locked errors.
const MAX_RETRIES: u32 = 5;
/// Base delay for exponential backoff (milliseconds).
const BASE_DELAY_MS: u64 = 50;
/// Maximum delay cap (milliseconds).
const MAX_DELAY_MS: u64 = 2_000;

/// Write connection busy_timeout in seconds.
const WRITE_BUSY_TIMEOUT_SECS: u64 = 5;
/// Read connection busy_timeout in seconds.
const READ_BUSY_TIMEOUT_SECS: u64 = 5;

type Slot = Arc<Mutex<()>>;

/// Connection pool owned by a [`crate::core::store::Store`].
#[derive(Default)]
pub struct SqlitePool {
    write_locks: Mutex<FxHashMap<PathBuf, Slot>>,
    key_locks: Mutex<FxHashMap<String, Slot>>,
}

impl std::fmt::Debug for SqlitePool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqlitePool").finish_non_exhaustive()
    }
}

impl SqlitePool {
    pub fn new() -> Self {
        Self::default()
    }

    fn slot<K>(map: &Mutex<FxHashMap<K, Slot>>, key: K) -> Result<Slot, AetherError>
    where
        K: std::hash::Hash + Eq,
    {
        let mut entries = map
            .lock()
            .map_err(|_| AetherError::LockPoisoned("SqlitePool lock table".to_string()))?;
        Ok(entries.entry(key).or_default().clone())
    }

    /// Number of ledger keys with a write in flight or waiting.
    pub fn tracked_keys(&self) -> usize {
        self.key_locks.lock().map(|m| m.len()).unwrap_or(0)
    }

    /// Run `f` inside an IMMEDIATE transaction while holding the DB-wide write mutex.
    pub fn with_write<F, R>(&self, db_path: &Path, f: F) -> Result<R, AetherError>
    where
        F: FnMut(&Connection) -> Result<R, AetherError>,
    {
        let slot = Self::slot(&self.write_locks, db_path.to_path_buf())?;
        let _guard = slot
            .lock()
            .map_err(|_| AetherError::LockPoisoned("pool write lock".to_string()))?;
        run_in_transaction(db_path, f)
    }

    /// Run `f` inside an IMMEDIATE transaction while holding the lock for `key` only.
    ///
    /// Rolls back when `f` fails, so a rejected operation leaves no partial mutation.
    pub fn with_key_tx<F, R>(&self, db_path: &Path, key: &str, f: F) -> Result<R, AetherError>
    where
        F: FnMut(&Connection) -> Result<R, AetherError>,
    {
        let slot = Self::slot(&self.key_locks, key.to_string())?;
        let result = match slot.lock() {
            Ok(_guard) => run_in_transaction(db_path, f),
            Err(_) => Err(AetherError::LockPoisoned(format!("key lock {key}"))),
        };
        self.release_key(key, &slot);
        result
    }

    /// Drop the entry for `key` once no other caller holds or waits on it.
    ///
    /// Clones are only handed out under the table lock, so a strong count of
    /// two (the table plus `slot`) means nobody else can be queued.
    fn release_key(&self, key: &str, slot: &Slot) {
        let Ok(mut entries) = self.key_locks.lock() else {
            return;
        };
        if Arc::strong_count(slot) == 2 {
            entries.remove(key);
        }
    }

    /// Execute a closure with a read connection (no mutex serialization).
    pub fn with_read<F, R>(&self, db_path: &Path, f: F) -> Result<R, AetherError>
    where
        F: FnOnce(&Connection) -> Result<R, AetherError>,
    {
        let conn = db::db_connect_with_timeout(&db_path.to_string_lossy(), READ_BUSY_TIMEOUT_SECS)?;
        f(&conn)
    }
}

fn run_in_transaction<F, R>(db_path: &Path, mut f: F) -> Result<R, AetherError>
where
    F: FnMut(&Connection) -> Result<R, AetherError>,
{
    retry_on_busy(|| {
        let mut conn =
            db::db_connect_with_timeout(&db_path.to_string_lossy(), WRITE_BUSY_TIMEOUT_SECS)?;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        let out = f(&tx)?;
        tx.commit()?;
        Ok(out)
    })
}

/// Retry a closure on `SQLITE_BUSY` / `SQLITE_LOCKED` with exponential backoff.
fn retry_on_busy<F, R>(mut f: F) -> Result<R, AetherError>
where
    F: FnMut() -> Result<R, AetherError>,
{
    let mut attempt = 0u32;
    loop {
        match f() {
            Ok(v) => return Ok(v),
            Err(e) if e.is_busy() && attempt < MAX_RETRIES => {
                attempt += 1;
                let delay_ms = (BASE_DELAY_MS * 2u64.pow(attempt - 1)).min(MAX_DELAY_MS);
                tracing::debug!(attempt, delay_ms, "sqlite busy, retrying");
                thread::sleep(Duration::from_millis(delay_ms));
            }
            Err(e) => return Err(e),
        }
    }
}
