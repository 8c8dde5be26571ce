//! CLI struct definitions for the Aether command-line interface.
//!
//! All clap-derived types live here. Dispatch logic lives in `lib.rs`.

use crate::plugins::guild_config::{ChannelRoute, Feature};
use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[clap(
    name = "aether",
    version = env!("CARGO_PKG_VERSION"),
    about = "Aether guild bot core: leveling, economy, moderation and backups on a local SQLite store."
)]
pub(crate) struct Cli {
    /// Path to aether.toml (defaults to ./aether.toml when present).
    #[clap(long, global = true)]
    pub config: Option<PathBuf>,
    /// Output format: 'text' or 'json'.
    #[clap(long, global = true, value_enum, default_value_t = OutputFormat::Text)]
    pub format: OutputFormat,
    #[clap(subcommand)]
    pub command: Command,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, ValueEnum)]
pub(crate) enum OutputFormat {
    Text,
    Json,
}

#[derive(Subcommand, Debug)]
pub(crate) enum Command {
    /// Create the data directory, all tables, and a starter aether.toml
    Init {
        /// Overwrite an existing aether.toml.
        #[clap(long)]
        force: bool,
    },

    /// XP and leveling
    Xp(XpCli),

    /// Coins: daily rewards, gambling, balances
    Eco(EcoCli),

    /// Per-guild feature toggles and channel routing
    Config(ConfigCli),

    /// Warnings and automod records
    Mod(ModCli),

    /// Store snapshots
    Backup(BackupCli),

    /// Dice, coin flips and the magic 8-ball
    Fun(FunCli),

    /// Route one JSON event (from --json or stdin) and print the reactions
    Event {
        /// Event JSON; read from stdin when omitted.
        #[clap(long)]
        json: Option<String>,
    },

    /// Process newline-delimited JSON events from stdin until EOF
    Serve {
        /// Disable the periodic backup thread.
        #[clap(long)]
        no_backup: bool,
    },

    /// Print the subsystem command schemas as JSON
    Schema,
}

#[derive(clap::Args, Debug)]
pub(crate) struct XpCli {
    #[clap(subcommand)]
    pub command: XpCommand,
}

#[derive(Subcommand, Debug)]
pub(crate) enum XpCommand {
    /// Record one message worth of activity
    Activity {
        #[clap(long)]
        user: String,
        #[clap(long)]
        guild: String,
        /// Use this XP gain instead of a random one.
        #[clap(long)]
        gain: Option<i64>,
    },
    /// Show a member's level, XP progress and rank
    Rank {
        #[clap(long)]
        user: String,
        #[clap(long)]
        guild: String,
    },
    /// Top members of a guild by XP
    Leaderboard {
        #[clap(long)]
        guild: String,
        /// Number of entries (defaults to leaderboard.limit).
        #[clap(long)]
        limit: Option<usize>,
    },
}

#[derive(clap::Args, Debug)]
pub(crate) struct EcoCli {
    #[clap(subcommand)]
    pub command: EcoCommand,
}

#[derive(Subcommand, Debug)]
pub(crate) enum EcoCommand {
    /// Claim the daily reward
    Daily {
        #[clap(long)]
        user: String,
        #[clap(long)]
        guild: String,
        /// Claim date as YYYY-MM-DD (defaults to today, local time).
        #[clap(long)]
        date: Option<String>,
    },
    /// Gamble coins
    Gamble {
        #[clap(long)]
        user: String,
        #[clap(long)]
        guild: String,
        #[clap(long)]
        amount: i64,
        /// Use this roll (1-100) instead of a random one.
        #[clap(long)]
        roll: Option<u8>,
    },
    /// Show a member's coin balance
    Balance {
        #[clap(long)]
        user: String,
        #[clap(long)]
        guild: String,
    },
}

#[derive(clap::Args, Debug)]
pub(crate) struct ConfigCli {
    #[clap(subcommand)]
    pub command: ConfigCommand,
}

#[derive(Subcommand, Debug)]
pub(crate) enum ConfigCommand {
    /// Show a guild's configuration
    Show {
        #[clap(long)]
        guild: String,
    },
    /// Flip a feature on or off
    Toggle {
        #[clap(long)]
        guild: String,
        #[clap(long, value_enum)]
        feature: Feature,
    },
    /// Turn a feature on
    Enable {
        #[clap(long)]
        guild: String,
        #[clap(long, value_enum)]
        feature: Feature,
    },
    /// Turn a feature off
    Disable {
        #[clap(long)]
        guild: String,
        #[clap(long, value_enum)]
        feature: Feature,
    },
    /// Route a channel (omit --channel to clear the route)
    SetChannel {
        #[clap(long)]
        guild: String,
        #[clap(long, value_enum)]
        route: ChannelRoute,
        #[clap(long)]
        channel: Option<String>,
    },
    /// Set the command prefix
    Prefix {
        #[clap(long)]
        guild: String,
        #[clap(long)]
        prefix: String,
    },
}

#[derive(clap::Args, Debug)]
pub(crate) struct ModCli {
    #[clap(subcommand)]
    pub command: ModCommand,
}

#[derive(Subcommand, Debug)]
pub(crate) enum ModCommand {
    /// Warn a member
    Warn {
        #[clap(long)]
        user: String,
        #[clap(long)]
        guild: String,
        #[clap(long)]
        moderator: String,
        #[clap(long, default_value = "No reason provided")]
        reason: String,
    },
    /// A member's warning history, newest first
    Warnings {
        #[clap(long)]
        user: String,
        #[clap(long)]
        guild: String,
        #[clap(long, default_value_t = 10)]
        limit: usize,
    },
    /// Recent automod actions in a guild
    AutomodLog {
        #[clap(long)]
        guild: String,
        #[clap(long, default_value_t = 10)]
        limit: usize,
    },
    /// Check text against the automod rules without recording anything
    Scan {
        #[clap(long)]
        content: String,
        #[clap(long, default_value_t = 0)]
        mentions: usize,
    },
}

#[derive(clap::Args, Debug)]
pub(crate) struct FunCli {
    #[clap(subcommand)]
    pub command: FunCommand,
}

#[derive(Subcommand, Debug)]
pub(crate) enum FunCommand {
    /// Roll a die
    Roll {
        /// Number of sides, 2 to 100.
        #[clap(long, default_value_t = 6)]
        sides: i64,
    },
    /// Flip a coin
    Flip,
    /// Ask the magic 8-ball a question
    #[clap(name = "8ball")]
    EightBall {
        #[clap(long)]
        question: String,
    },
}

#[derive(clap::Args, Debug)]
pub(crate) struct BackupCli {
    #[clap(subcommand)]
    pub command: BackupCommand,
}

#[derive(Subcommand, Debug)]
pub(crate) enum BackupCommand {
    /// Snapshot the store now
    Run {
        /// Backup date as YYYY-MM-DD (defaults to today).
        #[clap(long)]
        date: Option<String>,
    },
    /// List registered backups
    List,
    /// Re-hash every registered backup
    Verify,
    /// Keep only the newest N backups (defaults to backup.keep)
    Prune {
        #[clap(long)]
        keep: Option<usize>,
    },
}
