use crate::core::error;
use crate::core::schemas;
use rusqlite::Connection;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Default busy timeout for ad-hoc connections.
pub const DEFAULT_BUSY_TIMEOUT_SECS: u64 = 5;

pub fn db_connect(db_path: &str) -> Result<Connection, error::AetherError> {
    db_connect_with_timeout(db_path, DEFAULT_BUSY_TIMEOUT_SECS)
}

pub fn db_connect_with_timeout(
    db_path: &str,
    busy_timeout_secs: u64,
) -> Result<Connection, error::AetherError> {
    let conn = Connection::open(db_path)?;
    conn.busy_timeout(Duration::from_secs(busy_timeout_secs))?;
    conn.query_row("PRAGMA journal_mode=WAL;", [], |_| Ok(()))?;
    conn.execute("PRAGMA foreign_keys=ON;", [])?;
    Ok(conn)
}

pub fn aether_db_path(root: &Path) -> PathBuf {
    root.join(schemas::AETHER_DB_NAME)
}

/// Make sure the data directory exists and is writable before any DB work.
pub fn storage_preflight(root: &Path) -> Result<(), error::AetherError> {
    fs::create_dir_all(root)?;
    let marker = root.join(".aether_write_check");
    fs::write(&marker, b"ok").map_err(|e| {
        error::AetherError::DatabaseInitializationError(format!(
            "data directory {} is not writable: {}",
            root.display(),
            e
        ))
    })?;
    fs::remove_file(&marker)?;
    Ok(())
}
