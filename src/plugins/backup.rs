//! Store snapshots.
//!
//! `VACUUM INTO` writes a consistent copy of the live database, whose sha256 is
//! kept in a registry table so copies can be verified and pruned later.
//! [`BackupScheduler`] runs the same job on a background thread.

use crate::core::broker::DbBroker;
use crate::core::error;
use crate::core::schemas;
use crate::core::store::Store;
use crate::core::time;
use chrono::NaiveDate;
use rusqlite::params;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::mpsc::{self, RecvTimeoutError};
use std::thread::{self, JoinHandle};
use std::time::Duration;

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct BackupEntry {
    pub id: String,
    pub path: String,
    pub content_hash: String,
    pub size_bytes: i64,
    pub created_at: String,
}

pub fn initialize_backup_db(store: &Store) -> Result<(), error::AetherError> {
    DbBroker::new(store).write("aether", "backup.init", |conn| {
        conn.execute(schemas::BACKUP_DB_SCHEMA, [])?;
        Ok(())
    })
}

pub fn hash_file(path: &Path) -> Result<String, error::AetherError> {
    let bytes = fs::read(path)?;
    let mut hasher = Sha256::new();
    hasher.update(&bytes);
    Ok(format!("{:x}", hasher.finalize()))
}

pub fn backup_file_name(date: NaiveDate) -> String {
    format!("backup_aether_{}.db", date.format("%Y%m%d"))
}

/// Snapshot the store into `dest_dir` and register it.
///
/// `VACUUM INTO` reads one consistent snapshot, so ledger writes may continue
/// while the copy is taken. A second backup on the same day replaces the first.
pub fn run_backup(
    store: &Store,
    dest_dir: &Path,
    date: NaiveDate,
) -> Result<BackupEntry, error::AetherError> {
    fs::create_dir_all(dest_dir)?;
    let target = dest_dir.join(backup_file_name(date));
    if target.exists() {
        fs::remove_file(&target)?;
    }

    let broker = DbBroker::new(store);
    let target_str = target.to_string_lossy().to_string();
    broker.read(|conn| {
        conn.execute("VACUUM INTO ?1", params![target_str])?;
        Ok(())
    })?;

    let entry = BackupEntry {
        id: time::new_event_id(),
        path: target_str,
        content_hash: hash_file(&target)?,
        size_bytes: i64::try_from(fs::metadata(&target)?.len()).unwrap_or(i64::MAX),
        created_at: time::now_epoch_z(),
    };

    broker.write("aether", "backup.register", |conn| {
        conn.execute("DELETE FROM backups WHERE path = ?1", params![entry.path])?;
        conn.execute(
            "INSERT INTO backups(id, path, content_hash, size_bytes, created_at) VALUES(?1, ?2, ?3, ?4, ?5)",
            params![entry.id, entry.path, entry.content_hash, entry.size_bytes, entry.created_at],
        )?;
        Ok(())
    })?;

    tracing::info!(path = %entry.path, bytes = entry.size_bytes, "database backup completed");
    Ok(entry)
}

/// Registered backups, oldest first.
pub fn list_backups(store: &Store) -> Result<Vec<BackupEntry>, error::AetherError> {
    DbBroker::new(store).read(|conn| {
        let mut stmt = conn.prepare(
            "SELECT id, path, content_hash, size_bytes, created_at FROM backups ORDER BY rowid ASC",
        )?;
        let rows = stmt.query_map([], |row| {
            Ok(BackupEntry {
                id: row.get(0)?,
                path: row.get(1)?,
                content_hash: row.get(2)?,
                size_bytes: row.get(3)?,
                created_at: row.get(4)?,
            })
        })?;
        let mut out = Vec::new();
        for r in rows {
            out.push(r?);
        }
        Ok(out)
    })
}

/// Re-hash every registered backup; returns one message per problem found.
pub fn verify_backups(store: &Store) -> Result<Vec<String>, error::AetherError> {
    let mut failures = Vec::new();
    for entry in list_backups(store)? {
        let path = PathBuf::from(&entry.path);
        if !path.exists() {
            failures.push(format!("Backup {}: File missing at {}", entry.id, entry.path));
            continue;
        }
        if hash_file(&path)? != entry.content_hash {
            failures.push(format!("Backup {}: Content hash mismatch", entry.id));
        }
    }
    Ok(failures)
}

/// Delete all but the newest `keep` backups. Returns the removed entries.
pub fn prune_backups(store: &Store, keep: usize) -> Result<Vec<BackupEntry>, error::AetherError> {
    let all = list_backups(store)?;
    let excess = all.len().saturating_sub(keep);
    let doomed: Vec<BackupEntry> = all.into_iter().take(excess).collect();
    if doomed.is_empty() {
        return Ok(doomed);
    }

    for entry in &doomed {
        let path = Path::new(&entry.path);
        if path.exists() {
            fs::remove_file(path)?;
        }
    }
    DbBroker::new(store).write("aether", "backup.prune", |conn| {
        for entry in &doomed {
            conn.execute("DELETE FROM backups WHERE id = ?1", params![entry.id])?;
        }
        Ok(())
    })?;
    Ok(doomed)
}

/// Handle to the periodic backup thread. Dropping it also ends the loop, but
/// only [`stop`](Self::stop) waits for an in-flight backup to finish.
pub struct BackupScheduler {
    stop_tx: mpsc::Sender<()>,
    handle: JoinHandle<()>,
}

impl BackupScheduler {
    /// Take a backup every `interval`, starting after the first interval elapses.
    pub fn spawn(store: Store, dest_dir: PathBuf, interval: Duration, keep: usize) -> Self {
        let (stop_tx, stop_rx) = mpsc::channel::<()>();
        let handle = thread::spawn(move || {
            loop {
                match stop_rx.recv_timeout(interval) {
                    Err(RecvTimeoutError::Timeout) => {
                        if let Err(e) = run_backup(&store, &dest_dir, time::today_local()) {
                            tracing::error!(error = %e, "backup failed");
                            continue;
                        }
                        if let Err(e) = prune_backups(&store, keep) {
                            tracing::warn!(error = %e, "backup prune failed");
                        }
                    }
                    Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
                }
            }
        });
        Self { stop_tx, handle }
    }

    pub fn stop(self) {
        let _ = self.stop_tx.send(());
        if self.handle.join().is_err() {
            tracing::error!("backup scheduler thread panicked");
        }
    }
}

pub fn schema() -> serde_json::Value {
    serde_json::json!({
        "name": "backup",
        "version": "0.1.0",
        "description": "Store snapshots with integrity hashes",
        "commands": [
            { "name": "run", "description": "Snapshot the store now" },
            { "name": "list", "description": "List registered backups" },
            { "name": "verify", "description": "Re-hash every registered backup" },
            { "name": "prune", "description": "Keep only the newest N backups" }
        ],
        "storage": ["aether.db"]
    })
}
