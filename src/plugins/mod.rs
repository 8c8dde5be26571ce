//! Subsystems built on the core store: the progression ledger and its collaborators.

pub mod backup;
pub mod events;
pub mod fun;
pub mod guild_config;
pub mod ledger;
pub mod moderation;
