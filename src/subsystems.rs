//! Subsystem registration: every table initializer in one place.
//!
//! Adding a new subsystem: append one entry to `SUBSYSTEMS`.

use crate::core::error;
use crate::core::store::Store;
use crate::plugins::{backup, fun, guild_config, ledger, moderation};

pub(crate) struct SubsystemInit {
    pub name: &'static str,
    pub initialize_db: fn(&Store) -> Result<(), error::AetherError>,
}

/// All subsystems that own tables in `aether.db`.
/// Sequential execution avoids SQLite contention during bootstrap.
pub(crate) const SUBSYSTEMS: &[SubsystemInit] = &[
    SubsystemInit { name: "ledger", initialize_db: ledger::initialize_ledger_db },
    SubsystemInit { name: "guild_config", initialize_db: guild_config::initialize_guild_config_db },
    SubsystemInit { name: "moderation", initialize_db: moderation::initialize_moderation_db },
    SubsystemInit { name: "backup", initialize_db: backup::initialize_backup_db },
];

/// Initialize all subsystem tables sequentially.
pub(crate) fn initialize_all_dbs(store: &Store) -> Result<(), error::AetherError> {
    for sub in SUBSYSTEMS {
        (sub.initialize_db)(store).map_err(|e| {
            error::AetherError::DatabaseInitializationError(format!("{}: {}", sub.name, e))
        })?;
    }
    Ok(())
}

/// Machine-readable description of every subsystem's command surface.
pub fn schemas() -> serde_json::Value {
    serde_json::json!([
        ledger::schema(),
        guild_config::schema(),
        moderation::schema(),
        backup::schema(),
        fun::schema(),
    ])
}
