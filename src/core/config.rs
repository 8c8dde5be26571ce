//! Process configuration loaded from `aether.toml`.
//!
//! Every section is optional; a missing file yields [`AetherConfig::default`].
//! Per-guild runtime settings are not here, they live in the `guild_configs` table.

use crate::core::error::AetherError;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

pub const DEFAULT_CONFIG_FILE: &str = "aether.toml";
pub const DATA_DIR_ENV: &str = "AETHER_DATA_DIR";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(default)]
pub struct AetherConfig {
    pub store: StoreSection,
    pub backup: BackupSection,
    pub leaderboard: LeaderboardSection,
    pub automod: AutomodSection,
    pub log: LogSection,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct StoreSection {
    pub data_dir: PathBuf,
}

impl Default for StoreSection {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from(".aether/data"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct BackupSection {
    pub dir: PathBuf,
    pub interval_hours: u64,
    /// Snapshots kept by `backup prune`; older ones are deleted.
    pub keep: usize,
}

impl Default for BackupSection {
    fn default() -> Self {
        Self {
            dir: PathBuf::from(".aether/backups"),
            interval_hours: 24,
            keep: 7,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct LeaderboardSection {
    pub limit: usize,
}

impl Default for LeaderboardSection {
    fn default() -> Self {
        Self { limit: 10 }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct AutomodSection {
    pub blocked_phrases: Vec<String>,
    pub caps_ratio: f64,
    pub caps_min_len: usize,
    pub repeat_run: usize,
    pub max_mentions: usize,
}

impl Default for AutomodSection {
    fn default() -> Self {
        Self {
            blocked_phrases: ["spam", "scam", "hack", "free nitro", "discord.gg/", "bit.ly"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
            caps_ratio: 0.7,
            caps_min_len: 10,
            repeat_run: 5,
            max_mentions: 5,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct LogSection {
    pub filter: String,
}

impl Default for LogSection {
    fn default() -> Self {
        Self {
            filter: "aether=info".to_string(),
        }
    }
}

impl AetherConfig {
    /// Load from `path`, or `./aether.toml` when `path` is `None`.
    ///
    /// An explicitly named file must exist; the implicit default may be absent.
    pub fn load(path: Option<&Path>) -> Result<Self, AetherError> {
        let (config_path, required) = match path {
            Some(p) => (p.to_path_buf(), true),
            None => (PathBuf::from(DEFAULT_CONFIG_FILE), false),
        };

        let mut config = if config_path.exists() {
            let content = fs::read_to_string(&config_path)?;
            Self::parse(&content)?
        } else if required {
            return Err(AetherError::ConfigError(format!(
                "config file not found: {}",
                config_path.display()
            )));
        } else {
            Self::default()
        };

        if let Some(base) = config_path.parent().filter(|p| !p.as_os_str().is_empty()) {
            config.resolve_relative_to(base);
        }

        if let Ok(dir) = std::env::var(DATA_DIR_ENV) {
            if !dir.trim().is_empty() {
                config.store.data_dir = PathBuf::from(dir);
            }
        }
        config.validate()?;
        Ok(config)
    }

    pub fn parse(content: &str) -> Result<Self, AetherError> {
        toml::from_str(content).map_err(|e| AetherError::ConfigError(e.to_string()))
    }

    /// Relative paths in a config file are relative to the file, not the cwd.
    fn resolve_relative_to(&mut self, base: &Path) {
        if self.store.data_dir.is_relative() {
            self.store.data_dir = base.join(&self.store.data_dir);
        }
        if self.backup.dir.is_relative() {
            self.backup.dir = base.join(&self.backup.dir);
        }
    }

    pub fn validate(&self) -> Result<(), AetherError> {
        if !(0.0..=1.0).contains(&self.automod.caps_ratio) {
            return Err(AetherError::ConfigError(format!(
                "automod.caps_ratio must be within [0, 1], got {}",
                self.automod.caps_ratio
            )));
        }
        if self.automod.repeat_run < 2 {
            return Err(AetherError::ConfigError(
                "automod.repeat_run must be at least 2".to_string(),
            ));
        }
        if self.backup.interval_hours == 0 {
            return Err(AetherError::ConfigError(
                "backup.interval_hours must be positive".to_string(),
            ));
        }
        if self.leaderboard.limit == 0 {
            return Err(AetherError::ConfigError(
                "leaderboard.limit must be positive".to_string(),
            ));
        }
        Ok(())
    }

    /// Starter file written by `aether init`.
    pub fn render_default() -> Result<String, AetherError> {
        toml::to_string_pretty(&Self::default()).map_err(|e| AetherError::ConfigError(e.to_string()))
    }
}
