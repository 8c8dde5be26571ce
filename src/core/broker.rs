use crate::core::error;
use crate::core::schemas;
use crate::core::store::Store;
use crate::core::time;
use rusqlite::Connection;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// The DB Broker is the single path for state access.
///
/// Every operation is routed through the store's pool and recorded in an
/// append-only JSONL audit log next to the database.
pub struct DbBroker<'a> {
    store: &'a Store,
    audit_log_path: PathBuf,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct BrokerEvent {
    pub ts: String,
    pub event_id: String,
    pub actor: String,
    pub op: String,
    pub db_id: String,
    pub key: Option<String>,
    pub status: String,
}

impl<'a> DbBroker<'a> {
    pub fn new(store: &'a Store) -> Self {
        Self {
            store,
            audit_log_path: store.root.join(schemas::BROKER_EVENTS_NAME),
        }
    }

    /// Read-only access; reads are not written to the audit log.
    pub fn read<F, R>(&self, f: F) -> Result<R, error::AetherError>
    where
        F: FnOnce(&Connection) -> Result<R, error::AetherError>,
    {
        self.store.pool().with_read(&self.store.db_path(), f)
    }

    /// Serialized write that is not scoped to a single ledger key.
    pub fn write<F, R>(&self, actor: &str, op_name: &str, f: F) -> Result<R, error::AetherError>
    where
        F: FnMut(&Connection) -> Result<R, error::AetherError>,
    {
        let result = self.store.pool().with_write(&self.store.db_path(), f);
        self.finish(actor, op_name, None, &result);
        result
    }

    /// Write scoped to `key`; concurrent calls for the same key run one at a time.
    pub fn write_keyed<F, R>(
        &self,
        actor: &str,
        op_name: &str,
        key: &str,
        f: F,
    ) -> Result<R, error::AetherError>
    where
        F: FnMut(&Connection) -> Result<R, error::AetherError>,
    {
        let result = self.store.pool().with_key_tx(&self.store.db_path(), key, f);
        self.finish(actor, op_name, Some(key), &result);
        result
    }

    /// Record the outcome of a write that has already committed or rolled back.
    ///
    /// An audit append failure is logged and never replaces the write's own result.
    fn finish<R>(
        &self,
        actor: &str,
        op: &str,
        key: Option<&str>,
        result: &Result<R, error::AetherError>,
    ) {
        let status = match result {
            Ok(_) => "success",
            Err(e) if e.is_user_facing() => "rejected",
            Err(_) => "error",
        };
        let key_field = key.unwrap_or("-");
        if let Err(e) = result {
            if !e.is_user_facing() {
                tracing::warn!(op, key = key_field, error = %e, "brokered write failed");
            }
        }
        tracing::debug!(op, key = key_field, status, "brokered write");
        if let Err(e) = self.log_event(actor, op, key, status) {
            tracing::warn!(op, key = key_field, status, error = %e, "audit log append failed");
        }
    }

    fn log_event(
        &self,
        actor: &str,
        op: &str,
        key: Option<&str>,
        status: &str,
    ) -> Result<(), error::AetherError> {
        use std::fs::OpenOptions;
        use std::io::Write;

        let ev = BrokerEvent {
            ts: time::now_epoch_z(),
            event_id: time::new_event_id(),
            actor: actor.to_string(),
            op: op.to_string(),
            db_id: schemas::AETHER_DB_NAME.to_string(),
            key: key.map(|s| s.to_string()),
            status: status.to_string(),
        };
        let line = serde_json::to_string(&ev)
            .map_err(|e| error::AetherError::ValidationError(e.to_string()))?;

        let mut f = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.audit_log_path)?;
        writeln!(f, "{}", line)?;
        Ok(())
    }
}

/// Read the audit log back, newest last. Malformed lines are skipped.
pub fn read_audit_log(store: &Store) -> Result<Vec<BrokerEvent>, error::AetherError> {
    let path = store.root.join(schemas::BROKER_EVENTS_NAME);
    if !path.exists() {
        return Ok(Vec::new());
    }
    let content = std::fs::read_to_string(path)?;
    Ok(content
        .lines()
        .filter_map(|l| serde_json::from_str(l).ok())
        .collect())
}
