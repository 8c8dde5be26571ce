//! Per-guild configuration: feature toggles, channel routes and the command prefix.
//!
//! Rows are created lazily with defaults the first time a guild is read.

use crate::core::broker::DbBroker;
use crate::core::error::AetherError;
use crate::core::schemas;
use crate::core::store::Store;
use rusqlite::{Connection, OptionalExtension, params};
use serde::{Deserialize, Serialize};
use std::fmt;

pub const DEFAULT_PREFIX: &str = "!";
const MAX_PREFIX_CHARS: usize = 5;

pub fn initialize_guild_config_db(store: &Store) -> Result<(), AetherError> {
    DbBroker::new(store).write("aether", "guild_config.init", |conn| {
        conn.execute(schemas::GUILD_CONFIG_DB_SCHEMA, [])?;
        Ok(())
    })
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum Feature {
    Xp,
    Welcome,
    Automod,
    Economy,
    Music,
}

impl Feature {
    pub const ALL: [Feature; 5] = [
        Feature::Xp,
        Feature::Welcome,
        Feature::Automod,
        Feature::Economy,
        Feature::Music,
    ];

    fn column(self) -> &'static str {
        match self {
            Feature::Xp => "xp_enabled",
            Feature::Welcome => "welcome_enabled",
            Feature::Automod => "automod_enabled",
            Feature::Economy => "economy_enabled",
            Feature::Music => "music_enabled",
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Feature::Xp => "XP System",
            Feature::Welcome => "Welcome Messages",
            Feature::Automod => "Auto Moderation",
            Feature::Economy => "Economy System",
            Feature::Music => "Music Commands",
        }
    }
}

impl fmt::Display for Feature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum ChannelRoute {
    Logs,
    Welcome,
    Modlog,
    Automod,
}

impl ChannelRoute {
    fn column(self) -> &'static str {
        match self {
            ChannelRoute::Logs => "logs_channel",
            ChannelRoute::Welcome => "welcome_channel",
            ChannelRoute::Modlog => "modlog_channel",
            ChannelRoute::Automod => "automod_channel",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GuildConfig {
    pub guild_id: String,
    pub logs_channel: Option<String>,
    pub welcome_channel: Option<String>,
    pub modlog_channel: Option<String>,
    pub automod_channel: Option<String>,
    pub xp_enabled: bool,
    pub welcome_enabled: bool,
    pub automod_enabled: bool,
    pub economy_enabled: bool,
    pub music_enabled: bool,
    pub prefix: String,
}

impl GuildConfig {
    pub fn is_enabled(&self, feature: Feature) -> bool {
        match feature {
            Feature::Xp => self.xp_enabled,
            Feature::Welcome => self.welcome_enabled,
            Feature::Automod => self.automod_enabled,
            Feature::Economy => self.economy_enabled,
            Feature::Music => self.music_enabled,
        }
    }

    pub fn channel(&self, route: ChannelRoute) -> Option<&str> {
        match route {
            ChannelRoute::Logs => self.logs_channel.as_deref(),
            ChannelRoute::Welcome => self.welcome_channel.as_deref(),
            ChannelRoute::Modlog => self.modlog_channel.as_deref(),
            ChannelRoute::Automod => self.automod_channel.as_deref(),
        }
    }
}

/// Capability the event boundary uses to consult per-guild settings.
///
/// The ledger never sees this; toggles are applied before it is called.
pub trait FeatureGate {
    fn guild_config(&self, guild_id: &str) -> Result<GuildConfig, AetherError>;

    fn is_enabled(&self, guild_id: &str, feature: Feature) -> Result<bool, AetherError> {
        Ok(self.guild_config(guild_id)?.is_enabled(feature))
    }
}

/// [`FeatureGate`] backed by the `guild_configs` table.
pub struct StoreFeatureGate<'a> {
    store: &'a Store,
}

impl<'a> StoreFeatureGate<'a> {
    pub fn new(store: &'a Store) -> Self {
        Self { store }
    }
}

impl FeatureGate for StoreFeatureGate<'_> {
    fn guild_config(&self, guild_id: &str) -> Result<GuildConfig, AetherError> {
        get_guild_config(self.store, guild_id)
    }
}

fn load_config(conn: &Connection, guild_id: &str) -> Result<Option<GuildConfig>, AetherError> {
    let cfg = conn
        .query_row(
            "SELECT guild_id, logs_channel, welcome_channel, modlog_channel, automod_channel,
                    xp_enabled, welcome_enabled, automod_enabled, economy_enabled, music_enabled, prefix
             FROM guild_configs WHERE guild_id = ?1",
            params![guild_id],
            |row| {
                Ok(GuildConfig {
                    guild_id: row.get(0)?,
                    logs_channel: row.get(1)?,
                    welcome_channel: row.get(2)?,
                    modlog_channel: row.get(3)?,
                    automod_channel: row.get(4)?,
                    xp_enabled: row.get(5)?,
                    welcome_enabled: row.get(6)?,
                    automod_enabled: row.get(7)?,
                    economy_enabled: row.get(8)?,
                    music_enabled: row.get(9)?,
                    prefix: row.get(10)?,
                })
            },
        )
        .optional()?;
    Ok(cfg)
}

fn ensure_row(conn: &Connection, guild_id: &str) -> Result<(), AetherError> {
    conn.execute(
        "INSERT OR IGNORE INTO guild_configs(guild_id) VALUES(?1)",
        params![guild_id],
    )?;
    Ok(())
}

fn load_existing(conn: &Connection, guild_id: &str) -> Result<GuildConfig, AetherError> {
    load_config(conn, guild_id)?
        .ok_or_else(|| AetherError::NotFound(format!("guild config for {guild_id}")))
}

/// Read the config for `guild_id`, inserting the default row on first access.
pub fn get_guild_config(store: &Store, guild_id: &str) -> Result<GuildConfig, AetherError> {
    let broker = DbBroker::new(store);
    if let Some(cfg) = broker.read(|conn| load_config(conn, guild_id))? {
        return Ok(cfg);
    }
    broker.write("aether", "guild_config.create", |conn| {
        ensure_row(conn, guild_id)?;
        load_existing(conn, guild_id)
    })
}

/// Flip `feature` and return its new state.
pub fn toggle_feature(store: &Store, guild_id: &str, feature: Feature) -> Result<bool, AetherError> {
    DbBroker::new(store).write("aether", "guild_config.toggle", |conn| {
        ensure_row(conn, guild_id)?;
        let current = load_existing(conn, guild_id)?.is_enabled(feature);
        let sql = format!("UPDATE guild_configs SET {} = ?1 WHERE guild_id = ?2", feature.column());
        conn.execute(&sql, params![!current, guild_id])?;
        Ok(!current)
    })
}

pub fn set_feature(
    store: &Store,
    guild_id: &str,
    feature: Feature,
    enabled: bool,
) -> Result<(), AetherError> {
    DbBroker::new(store).write("aether", "guild_config.set_feature", |conn| {
        ensure_row(conn, guild_id)?;
        let sql = format!("UPDATE guild_configs SET {} = ?1 WHERE guild_id = ?2", feature.column());
        conn.execute(&sql, params![enabled, guild_id])?;
        Ok(())
    })
}

/// Route `route` to `channel_id`, or clear the route with `None`.
pub fn set_channel(
    store: &Store,
    guild_id: &str,
    route: ChannelRoute,
    channel_id: Option<&str>,
) -> Result<(), AetherError> {
    if let Some(id) = channel_id {
        validate_snowflake(id)?;
    }
    DbBroker::new(store).write("aether", "guild_config.set_channel", |conn| {
        ensure_row(conn, guild_id)?;
        let sql = format!("UPDATE guild_configs SET {} = ?1 WHERE guild_id = ?2", route.column());
        conn.execute(&sql, params![channel_id, guild_id])?;
        Ok(())
    })
}

pub fn set_prefix(store: &Store, guild_id: &str, prefix: &str) -> Result<(), AetherError> {
    let count = prefix.chars().count();
    if count == 0 || count > MAX_PREFIX_CHARS || prefix.chars().any(char::is_whitespace) {
        return Err(AetherError::ValidationError(format!(
            "prefix must be 1-{MAX_PREFIX_CHARS} non-whitespace characters, got '{prefix}'"
        )));
    }
    DbBroker::new(store).write("aether", "guild_config.set_prefix", |conn| {
        ensure_row(conn, guild_id)?;
        conn.execute(
            "UPDATE guild_configs SET prefix = ?1 WHERE guild_id = ?2",
            params![prefix, guild_id],
        )?;
        Ok(())
    })
}

/// Channel ids are numeric snowflakes of at most 20 digits.
fn validate_snowflake(id: &str) -> Result<(), AetherError> {
    if id.is_empty() || id.len() > 20 || !id.bytes().all(|b| b.is_ascii_digit()) {
        return Err(AetherError::ValidationError(format!(
            "'{id}' is not a valid channel id"
        )));
    }
    Ok(())
}

pub fn schema() -> serde_json::Value {
    serde_json::json!({
        "name": "guild_config",
        "version": "0.1.0",
        "description": "Per-guild feature toggles and channel routing",
        "commands": [
            { "name": "show", "parameters": ["guild"] },
            { "name": "toggle", "parameters": ["guild", "feature"] },
            { "name": "set-channel", "parameters": ["guild", "route", "channel"] },
            { "name": "prefix", "parameters": ["guild", "prefix"] }
        ],
        "storage": ["aether.db"]
    })
}
