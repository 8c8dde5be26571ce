//! Moderation log: warnings, automod records, and the automod message scanner.

use crate::core::broker::DbBroker;
use crate::core::config::AutomodSection;
use crate::core::error::AetherError;
use crate::core::schemas;
use crate::core::store::Store;
use regex::{Regex, RegexBuilder};
use rusqlite::params;
use serde::{Deserialize, Serialize};
use std::fmt;

pub const DEFAULT_HISTORY_LIMIT: usize = 10;
pub const AUTOMOD_ACTION_DELETE: &str = "message_deleted";
pub const AUTOMOD_REASON_SPAM: &str = "spam/bad_words";

pub fn initialize_moderation_db(store: &Store) -> Result<(), AetherError> {
    DbBroker::new(store).write("aether", "moderation.init", |conn| {
        conn.execute(schemas::MODERATION_DB_SCHEMA_WARNINGS, [])?;
        conn.execute(schemas::MODERATION_DB_INDEX_WARNINGS, [])?;
        conn.execute(schemas::MODERATION_DB_SCHEMA_AUTOMOD, [])?;
        Ok(())
    })
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct Warning {
    pub id: i64,
    pub user_id: String,
    pub guild_id: String,
    pub moderator_id: String,
    pub reason: String,
    pub timestamp: String,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct AutomodEntry {
    pub id: i64,
    pub user_id: String,
    pub guild_id: String,
    pub action: String,
    pub reason: String,
    pub timestamp: String,
}

/// Record a warning and return the member's total warning count in the guild.
pub fn add_warning(
    store: &Store,
    user_id: &str,
    guild_id: &str,
    moderator_id: &str,
    reason: &str,
) -> Result<i64, AetherError> {
    let reason = if reason.trim().is_empty() {
        "No reason provided"
    } else {
        reason.trim()
    };
    DbBroker::new(store).write(moderator_id, "moderation.warn", |conn| {
        conn.execute(
            "INSERT INTO warnings(user_id, guild_id, moderator_id, reason) VALUES(?1, ?2, ?3, ?4)",
            params![user_id, guild_id, moderator_id, reason],
        )?;
        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM warnings WHERE user_id = ?1 AND guild_id = ?2",
            params![user_id, guild_id],
            |row| row.get(0),
        )?;
        Ok(count)
    })
}

pub fn warning_count(store: &Store, user_id: &str, guild_id: &str) -> Result<i64, AetherError> {
    DbBroker::new(store).read(|conn| {
        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM warnings WHERE user_id = ?1 AND guild_id = ?2",
            params![user_id, guild_id],
            |row| row.get(0),
        )?;
        Ok(count)
    })
}

/// Most recent warnings first.
pub fn list_warnings(
    store: &Store,
    user_id: &str,
    guild_id: &str,
    limit: usize,
) -> Result<Vec<Warning>, AetherError> {
    let limit = i64::try_from(limit).unwrap_or(i64::MAX);
    DbBroker::new(store).read(|conn| {
        let mut stmt = conn.prepare(
            "SELECT id, user_id, guild_id, moderator_id, reason, timestamp FROM warnings
             WHERE user_id = ?1 AND guild_id = ?2
             ORDER BY timestamp DESC, id DESC
             LIMIT ?3",
        )?;
        let rows = stmt.query_map(params![user_id, guild_id, limit], |row| {
            Ok(Warning {
                id: row.get(0)?,
                user_id: row.get(1)?,
                guild_id: row.get(2)?,
                moderator_id: row.get(3)?,
                reason: row.get(4)?,
                timestamp: row.get(5)?,
            })
        })?;
        let mut out = Vec::new();
        for r in rows {
            out.push(r?);
        }
        Ok(out)
    })
}

pub fn log_automod_action(
    store: &Store,
    user_id: &str,
    guild_id: &str,
    action: &str,
    reason: &str,
) -> Result<i64, AetherError> {
    DbBroker::new(store).write("automod", "moderation.automod_log", |conn| {
        conn.execute(
            "INSERT INTO automod_logs(user_id, guild_id, action, reason) VALUES(?1, ?2, ?3, ?4)",
            params![user_id, guild_id, action, reason],
        )?;
        Ok(conn.last_insert_rowid())
    })
}

pub fn list_automod_logs(
    store: &Store,
    guild_id: &str,
    limit: usize,
) -> Result<Vec<AutomodEntry>, AetherError> {
    let limit = i64::try_from(limit).unwrap_or(i64::MAX);
    DbBroker::new(store).read(|conn| {
        let mut stmt = conn.prepare(
            "SELECT id, user_id, guild_id, action, reason, timestamp FROM automod_logs
             WHERE guild_id = ?1
             ORDER BY id DESC
             LIMIT ?2",
        )?;
        let rows = stmt.query_map(params![guild_id, limit], |row| {
            Ok(AutomodEntry {
                id: row.get(0)?,
                user_id: row.get(1)?,
                guild_id: row.get(2)?,
                action: row.get(3)?,
                reason: row.get(4)?,
                timestamp: row.get(5)?,
            })
        })?;
        let mut out = Vec::new();
        for r in rows {
            out.push(r?);
        }
        Ok(out)
    })
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "detail", rename_all = "snake_case")]
pub enum Violation {
    ExcessiveCaps,
    RepeatedCharacters,
    MassMention,
    BlockedPhrase(String),
}

impl fmt::Display for Violation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Violation::ExcessiveCaps => f.write_str("excessive caps"),
            Violation::RepeatedCharacters => f.write_str("repeated characters"),
            Violation::MassMention => f.write_str("too many mentions"),
            Violation::BlockedPhrase(p) => write!(f, "blocked phrase '{}'", p),
        }
    }
}

/// Spam and blocked-phrase detection for inbound messages.
#[derive(Debug, Clone)]
pub struct AutomodRules {
    blocked: Option<Regex>,
    caps_ratio: f64,
    caps_min_len: usize,
    repeat_run: usize,
    max_mentions: usize,
}

impl Default for AutomodRules {
    fn default() -> Self {
        // The default phrase list always compiles; fall back to no phrase filter otherwise.
        Self::from_config(&AutomodSection::default()).unwrap_or(Self {
            blocked: None,
            caps_ratio: 0.7,
            caps_min_len: 10,
            repeat_run: 5,
            max_mentions: 5,
        })
    }
}

impl AutomodRules {
    pub fn from_config(cfg: &AutomodSection) -> Result<Self, AetherError> {
        let phrases: Vec<String> = cfg
            .blocked_phrases
            .iter()
            .map(|p| p.trim())
            .filter(|p| !p.is_empty())
            .map(regex::escape)
            .collect();
        let blocked = if phrases.is_empty() {
            None
        } else {
            Some(
                RegexBuilder::new(&phrases.join("|"))
                    .case_insensitive(true)
                    .build()
                    .map_err(|e| AetherError::ConfigError(format!("automod phrases: {e}")))?,
            )
        };
        Ok(Self {
            blocked,
            caps_ratio: cfg.caps_ratio,
            caps_min_len: cfg.caps_min_len,
            repeat_run: cfg.repeat_run,
            max_mentions: cfg.max_mentions,
        })
    }

    /// First rule `content` breaks, checked in order: caps, repeats, mentions, phrases.
    pub fn scan(&self, content: &str, mention_count: usize) -> Option<Violation> {
        let len = content.chars().count();
        if len > self.caps_min_len {
            let upper = content.chars().filter(|c| c.is_uppercase()).count();
            if upper as f64 / len as f64 > self.caps_ratio {
                return Some(Violation::ExcessiveCaps);
            }
        }
        if longest_run(content) >= self.repeat_run {
            return Some(Violation::RepeatedCharacters);
        }
        if mention_count > self.max_mentions {
            return Some(Violation::MassMention);
        }
        if let Some(re) = &self.blocked {
            if let Some(m) = re.find(content) {
                return Some(Violation::BlockedPhrase(m.as_str().to_lowercase()));
            }
        }
        None
    }
}

/// Length of the longest run of one repeated character.
fn longest_run(content: &str) -> usize {
    let mut best = 0;
    let mut run = 0;
    let mut prev: Option<char> = None;
    for c in content.chars() {
        if Some(c) == prev {
            run += 1;
        } else {
            run = 1;
            prev = Some(c);
        }
        best = best.max(run);
    }
    best
}

pub fn schema() -> serde_json::Value {
    serde_json::json!({
        "name": "moderation",
        "version": "0.1.0",
        "description": "Warnings and automod logs",
        "commands": [
            { "name": "warn", "parameters": ["user", "guild", "moderator", "reason"] },
            { "name": "warnings", "parameters": ["user", "guild"] },
            { "name": "automod-log", "parameters": ["guild"] },
            { "name": "scan", "parameters": ["content", "mentions"] }
        ],
        "storage": ["aether.db"]
    })
}
