//! Core modules shared by every subsystem: store handle, pooled SQLite access,
//! the mutation broker, schemas, configuration and error types.

pub mod broker;
pub mod config;
pub mod db;
pub mod error;
pub mod output;
pub mod pool;
pub mod schemas;
pub mod store;
pub mod time;
