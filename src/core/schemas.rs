//! Centralized database schema definitions.
//!
//! Aether keeps all state in a single SQLite file (`aether.db`):
//! 1. user_xp: progression ledger rows, one per (user, guild).
//! 2. guild_configs: per-guild feature toggles, channel routes and prefix.
//! 3. warnings / automod_logs: append-only moderation records.
//! 4. backups: registry of store snapshots with content hashes.

pub const AETHER_DB_NAME: &str = "aether.db";
pub const BROKER_EVENTS_NAME: &str = "broker.events.jsonl";

// --- Ledger ---
pub const LEDGER_DB_SCHEMA_USER_XP: &str = "
    CREATE TABLE IF NOT EXISTS user_xp (
        user_id TEXT NOT NULL,
        guild_id TEXT NOT NULL,
        xp INTEGER NOT NULL DEFAULT 0 CHECK (xp >= 0),
        level INTEGER NOT NULL DEFAULT 1 CHECK (level >= 1),
        coins INTEGER NOT NULL DEFAULT 100 CHECK (coins >= 0),
        last_daily TEXT,
        PRIMARY KEY (user_id, guild_id)
    )
";
pub const LEDGER_DB_INDEX_GUILD_XP: &str =
    "CREATE INDEX IF NOT EXISTS idx_user_xp_guild_xp ON user_xp(guild_id, xp)";

// --- Guild config ---
pub const GUILD_CONFIG_DB_SCHEMA: &str = "
    CREATE TABLE IF NOT EXISTS guild_configs (
        guild_id TEXT PRIMARY KEY,
        logs_channel TEXT,
        welcome_channel TEXT,
        modlog_channel TEXT,
        automod_channel TEXT,
        xp_enabled INTEGER NOT NULL DEFAULT 1,
        welcome_enabled INTEGER NOT NULL DEFAULT 1,
        automod_enabled INTEGER NOT NULL DEFAULT 1,
        economy_enabled INTEGER NOT NULL DEFAULT 1,
        music_enabled INTEGER NOT NULL DEFAULT 1,
        prefix TEXT NOT NULL DEFAULT '!'
    )
";

// --- Moderation ---
pub const MODERATION_DB_SCHEMA_WARNINGS: &str = "
    CREATE TABLE IF NOT EXISTS warnings (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        user_id TEXT NOT NULL,
        guild_id TEXT NOT NULL,
        moderator_id TEXT NOT NULL,
        reason TEXT NOT NULL,
        timestamp TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP
    )
";
pub const MODERATION_DB_INDEX_WARNINGS: &str =
    "CREATE INDEX IF NOT EXISTS idx_warnings_member ON warnings(guild_id, user_id)";
pub const MODERATION_DB_SCHEMA_AUTOMOD: &str = "
    CREATE TABLE IF NOT EXISTS automod_logs (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        user_id TEXT NOT NULL,
        guild_id TEXT NOT NULL,
        action TEXT NOT NULL,
        reason TEXT NOT NULL,
        timestamp TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP
    )
";

// --- Backup ---
pub const BACKUP_DB_SCHEMA: &str = "
    CREATE TABLE IF NOT EXISTS backups (
        id TEXT PRIMARY KEY,
        path TEXT NOT NULL,
        content_hash TEXT NOT NULL,
        size_bytes INTEGER NOT NULL,
        created_at TEXT NOT NULL
    )
";
