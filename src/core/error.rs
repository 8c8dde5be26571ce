use chrono::NaiveDate;
use rusqlite;
use std::io;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum AetherError {
    #[error("SQLite error: {0}")]
    StorageError(#[from] rusqlite::Error),
    #[error("I/O error: {0}")]
    IoError(#[from] io::Error),
    #[error("Failed to initialize database: {0}")]
    DatabaseInitializationError(String),
    #[error("Configuration error: {0}")]
    ConfigError(String),
    #[error("Validation error: {0}")]
    ValidationError(String),
    #[error("Not found: {0}")]
    NotFound(String),
    #[error("Lock poisoned: {0}")]
    LockPoisoned(String),
    #[error("Daily reward already claimed for {date}")]
    AlreadyClaimedToday { date: NaiveDate },
    #[error("Invalid stake {stake}: minimum gamble is {minimum} coins")]
    InvalidStake { stake: i64, minimum: i64 },
    #[error("Insufficient funds: stake {stake} exceeds balance {balance}")]
    InsufficientFunds { stake: i64, balance: i64 },
}

impl AetherError {
    /// Expected outcomes a user caused and can read about; never retried.
    pub fn is_user_facing(&self) -> bool {
        matches!(
            self,
            AetherError::AlreadyClaimedToday { .. }
                | AetherError::InvalidStake { .. }
                | AetherError::InsufficientFunds { .. }
        )
    }

    /// SQLite reported the database as busy or locked.
    pub fn is_busy(&self) -> bool {
        match self {
            AetherError::StorageError(rusqlite::Error::SqliteFailure(code, _)) => matches!(
                code.code,
                rusqlite::ErrorCode::DatabaseBusy | rusqlite::ErrorCode::DatabaseLocked
            ),
            _ => false,
        }
    }

    /// Stable short code for JSON envelopes.
    pub fn code(&self) -> &'static str {
        match self {
            AetherError::StorageError(_) => "storage_error",
            AetherError::IoError(_) => "io_error",
            AetherError::DatabaseInitializationError(_) => "db_init_error",
            AetherError::ConfigError(_) => "config_error",
            AetherError::ValidationError(_) => "validation_error",
            AetherError::NotFound(_) => "not_found",
            AetherError::LockPoisoned(_) => "lock_poisoned",
            AetherError::AlreadyClaimedToday { .. } => "already_claimed_today",
            AetherError::InvalidStake { .. } => "invalid_stake",
            AetherError::InsufficientFunds { .. } => "insufficient_funds",
        }
    }
}
