//! Aether: a local-first guild bot core.
//!
//! Aether keeps the state of a chat-platform bot in one SQLite file and
//! exposes it as plain Rust operations. Transport and rendering belong to the
//! platform layer; Aether consumes typed events and produces typed results.
//!
//! # Architecture
//!
//! ## The Store
//!
//! A [`core::store::Store`] is an explicit handle passed into every operation.
//! It owns the connection pool, so there is no global database handle.
//!
//! ## The Broker
//!
//! All mutations route through [`core::broker::DbBroker`] for:
//! - Serialization (per-key locks for ledger rows, a write lock otherwise)
//! - `IMMEDIATE` transactions with busy retry
//! - Audit logging (`broker.events.jsonl`)
//!
//! ## Subsystems (Plugins)
//!
//! - `ledger`: XP, levels, coins, daily claims and gambling
//! - `guild_config`: per-guild feature toggles and channel routes
//! - `moderation`: warnings, automod logs and the automod scanner
//! - `backup`: snapshot, verify and prune store backups
//! - `events`: typed inbound events routed into the subsystems above
//! - `fun`: dice, coin flips and the magic 8-ball
//!
//! # Examples
//!
//! ```bash
//! aether init
//! aether xp activity --user 42 --guild 7
//! aether eco daily --user 42 --guild 7
//! aether eco gamble --user 42 --guild 7 --amount 50
//! aether xp leaderboard --guild 7
//! ```

pub mod core;
pub mod plugins;
pub mod subsystems;

mod cli;

use crate::cli::{
    BackupCommand, Cli, Command, ConfigCommand, EcoCommand, FunCommand, ModCommand, OutputFormat,
    XpCommand,
};
use crate::core::config::{AetherConfig, DEFAULT_CONFIG_FILE};
use crate::core::error::AetherError;
use crate::core::store::Store;
use crate::core::{output, time};
use crate::plugins::backup::{self, BackupScheduler};
use crate::plugins::events::{EventRouter, InboundEvent};
use crate::plugins::fun;
use crate::plugins::guild_config::{self, Feature, StoreFeatureGate};
use crate::plugins::moderation::{self, AutomodRules};
use crate::plugins::ledger;

use clap::Parser;
use colored::Colorize;
use serde_json::json;
use std::fs;
use std::io::{BufRead, Read, Write};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing_subscriber::EnvFilter;

/// Parse arguments from the environment and run one command.
pub fn run() -> Result<(), AetherError> {
    let cli = Cli::parse();
    init_logging(cli.config.as_deref());
    let format = cli.format;
    let result = dispatch(cli);
    if let (Err(e), OutputFormat::Json) = (&result, format) {
        let envelope = time::command_envelope(
            "error",
            "error",
            json!({ "code": e.code(), "message": e.to_string(), "user_facing": e.is_user_facing() }),
        );
        println!("{}", envelope);
    }
    result
}

/// Diagnostics go to stderr so stdout stays machine-readable.
///
/// `AETHER_LOG` wins over `RUST_LOG`, which wins over `log.filter` in aether.toml.
fn init_logging(config_path: Option<&Path>) {
    let filter = std::env::var("AETHER_LOG")
        .ok()
        .and_then(|f| EnvFilter::try_new(f).ok())
        .or_else(|| EnvFilter::try_from_default_env().ok())
        .unwrap_or_else(|| {
            let configured = AetherConfig::load(config_path)
                .map(|c| c.log.filter)
                .unwrap_or_else(|_| AetherConfig::default().log.filter);
            EnvFilter::new(configured)
        });
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init();
}

struct Ctx {
    config: AetherConfig,
    store: Store,
    format: OutputFormat,
}

impl Ctx {
    fn emit(&self, cmd: &str, payload: serde_json::Value, text: impl FnOnce() -> String) {
        emit(self.format, cmd, payload, text);
    }

    fn open(config_path: Option<&Path>, format: OutputFormat) -> Result<Self, AetherError> {
        let config = AetherConfig::load(config_path)?;
        let store = Store::open(config.store.data_dir.clone())?;
        Ok(Self {
            config,
            store,
            format,
        })
    }
}

fn emit(format: OutputFormat, cmd: &str, payload: serde_json::Value, text: impl FnOnce() -> String) {
    match format {
        OutputFormat::Json => println!("{}", time::command_envelope(cmd, "ok", payload)),
        OutputFormat::Text => println!("{}", text()),
    }
}

fn dispatch(cli: Cli) -> Result<(), AetherError> {
    let format = cli.format;
    let config_path = cli.config;
    let open = || Ctx::open(config_path.as_deref(), format);

    match cli.command {
        Command::Init { force } => run_init(config_path.clone(), force, format),
        Command::Xp(xp) => run_xp(&open()?, xp.command),
        Command::Eco(eco) => run_eco(&open()?, eco.command),
        Command::Config(cfg) => run_config(&open()?, cfg.command),
        Command::Mod(m) => run_mod(&open()?, m.command),
        Command::Backup(b) => run_backup(&open()?, b.command),
        Command::Fun(f) => run_fun(format, f.command),
        Command::Event { json } => run_event(&open()?, json),
        Command::Serve { no_backup } => run_serve(&open()?, no_backup),
        Command::Schema => {
            println!(
                "{}",
                serde_json::to_string_pretty(&subsystems::schemas())
                    .map_err(|e| AetherError::ValidationError(e.to_string()))?
            );
            Ok(())
        }
    }
}

fn run_init(config_path: Option<PathBuf>, force: bool, format: OutputFormat) -> Result<(), AetherError> {
    let path = config_path.unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_FILE));
    let wrote_config = force || !path.exists();
    if wrote_config {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }
        fs::write(&path, AetherConfig::render_default()?)?;
    }
    let ctx = Ctx::open(Some(&path), format)?;
    ctx.emit(
        "init",
        json!({
            "config": path.display().to_string(),
            "config_written": wrote_config,
            "data_dir": ctx.store.root.display().to_string(),
        }),
        || {
            format!(
                "{} store initialized at {}\n  config: {}{}",
                "✓".bright_green(),
                ctx.store.root.display(),
                path.display(),
                if wrote_config { "" } else { " (kept existing)" }
            )
        },
    );
    Ok(())
}

fn run_xp(ctx: &Ctx, cmd: XpCommand) -> Result<(), AetherError> {
    match cmd {
        XpCommand::Activity { user, guild, gain } => {
            let res = match gain {
                Some(g) => ledger::record_activity_with_gain(&ctx.store, &user, &guild, g)?,
                None => ledger::record_activity(&ctx.store, &user, &guild, &mut rand::thread_rng())?,
            };
            ctx.emit("xp.activity", json!({ "result": res }), || {
                let mut line = format!(
                    "+{} XP → {} XP, level {}",
                    res.xp_gained, res.xp, res.level
                );
                if res.leveled_up {
                    line.push_str(&format!(
                        "\n{} reached level {}! +{} coins",
                        "🎉 Level Up!".bright_yellow().bold(),
                        res.level,
                        res.coins_awarded
                    ));
                }
                line
            });
        }
        XpCommand::Rank { user, guild } => {
            let record = ledger::get_record(&ctx.store, &user, &guild)?
                .ok_or_else(|| AetherError::NotFound(format!("no XP data for user {user} in guild {guild}")))?;
            let rank = ledger::rank_of(&ctx.store, &user, &guild)?.unwrap_or(1);
            let next = record.next_threshold();
            ctx.emit(
                "xp.rank",
                json!({ "record": record, "rank": rank, "next_threshold": next }),
                || {
                    format!(
                        "Rank #{}  Level {}  Coins {}\nXP {}/{}  {}",
                        rank,
                        record.level,
                        record.coins,
                        record.xp,
                        next,
                        output::progress_bar(record.xp, next, 20)
                    )
                },
            );
        }
        XpCommand::Leaderboard { guild, limit } => {
            let limit = limit.unwrap_or(ctx.config.leaderboard.limit);
            let entries = ledger::leaderboard(&ctx.store, &guild, limit)?;
            ctx.emit("xp.leaderboard", json!({ "entries": entries }), || {
                if entries.is_empty() {
                    return "No one has earned XP yet!".to_string();
                }
                entries
                    .iter()
                    .enumerate()
                    .map(|(i, e)| {
                        let medal = match i {
                            0 => "🥇".to_string(),
                            1 => "🥈".to_string(),
                            2 => "🥉".to_string(),
                            _ => format!("#{}", i + 1),
                        };
                        format!(
                            "{} {}  Level {} • {} XP • {} 💰",
                            medal, e.user_id, e.level, e.xp, e.coins
                        )
                    })
                    .collect::<Vec<_>>()
                    .join("\n")
            });
        }
    }
    Ok(())
}

fn run_eco(ctx: &Ctx, cmd: EcoCommand) -> Result<(), AetherError> {
    match cmd {
        EcoCommand::Daily { user, guild, date } => {
            let today = match date {
                Some(raw) => time::parse_date(&raw)?,
                None => time::today_local(),
            };
            let res = ledger::claim_daily(&ctx.store, &user, &guild, today)?;
            ctx.emit("eco.daily", json!({ "result": res }), || {
                format!(
                    "{} You received {} coins! Balance: {}",
                    "💰 Daily Reward Claimed!".bright_green(),
                    res.reward,
                    res.balance
                )
            });
        }
        EcoCommand::Gamble {
            user,
            guild,
            amount,
            roll,
        } => {
            let res = match roll {
                Some(r) => ledger::settle_gamble_with_roll(&ctx.store, &user, &guild, amount, r)?,
                None => ledger::settle_gamble(&ctx.store, &user, &guild, amount, &mut rand::thread_rng())?,
            };
            ctx.emit("eco.gamble", json!({ "result": res }), || {
                let headline = match res.outcome {
                    ledger::GambleOutcome::Lose => format!("You lost {} coins!", res.stake).red(),
                    ledger::GambleOutcome::WinSmall => format!("You won {} coins!", res.delta).green(),
                    ledger::GambleOutcome::WinBig => format!("You won {} coins!", res.delta).bright_green(),
                    ledger::GambleOutcome::Jackpot => {
                        format!("JACKPOT! You won {} coins!", res.delta).bright_yellow().bold()
                    }
                };
                format!("🎲 Roll {}: {}\nNew balance: {}", res.roll, headline, res.balance)
            });
        }
        EcoCommand::Balance { user, guild } => {
            let coins = ledger::balance(&ctx.store, &user, &guild)?;
            ctx.emit("eco.balance", json!({ "user_id": user, "coins": coins }), || {
                let mut line = format!("💰 {} coins", coins);
                if coins < 100 {
                    line.push_str("\nTip: use `eco daily` to get more coins!");
                }
                line
            });
        }
    }
    Ok(())
}

fn render_feature_state(feature: Feature, enabled: bool) -> String {
    let state = if enabled {
        "✅ Enabled".green()
    } else {
        "❌ Disabled".red()
    };
    format!("{} is now {}", feature.label().bold(), state)
}

fn run_config(ctx: &Ctx, cmd: ConfigCommand) -> Result<(), AetherError> {
    match cmd {
        ConfigCommand::Show { guild } => {
            let cfg = guild_config::get_guild_config(&ctx.store, &guild)?;
            ctx.emit("config.show", json!({ "config": cfg }), || {
                let mut lines = vec![format!("Guild {} (prefix '{}')", cfg.guild_id, cfg.prefix)];
                for f in Feature::ALL {
                    let mark = if cfg.is_enabled(f) { "✅" } else { "❌" };
                    lines.push(format!("  {} {}", mark, f.label()));
                }
                for (name, ch) in [
                    ("logs", &cfg.logs_channel),
                    ("welcome", &cfg.welcome_channel),
                    ("modlog", &cfg.modlog_channel),
                    ("automod", &cfg.automod_channel),
                ] {
                    lines.push(format!("  #{}: {}", name, ch.as_deref().unwrap_or("-")));
                }
                lines.join("\n")
            });
        }
        ConfigCommand::Toggle { guild, feature } => {
            let enabled = guild_config::toggle_feature(&ctx.store, &guild, feature)?;
            ctx.emit(
                "config.toggle",
                json!({ "feature": feature, "enabled": enabled }),
                || render_feature_state(feature, enabled),
            );
        }
        ConfigCommand::Enable { guild, feature } => {
            guild_config::set_feature(&ctx.store, &guild, feature, true)?;
            ctx.emit(
                "config.enable",
                json!({ "feature": feature, "enabled": true }),
                || render_feature_state(feature, true),
            );
        }
        ConfigCommand::Disable { guild, feature } => {
            guild_config::set_feature(&ctx.store, &guild, feature, false)?;
            ctx.emit(
                "config.disable",
                json!({ "feature": feature, "enabled": false }),
                || render_feature_state(feature, false),
            );
        }
        ConfigCommand::SetChannel {
            guild,
            route,
            channel,
        } => {
            guild_config::set_channel(&ctx.store, &guild, route, channel.as_deref())?;
            ctx.emit(
                "config.set_channel",
                json!({ "route": route, "channel": channel }),
                || format!("✅ {:?} channel set to {}", route, channel.as_deref().unwrap_or("(none)")),
            );
        }
        ConfigCommand::Prefix { guild, prefix } => {
            guild_config::set_prefix(&ctx.store, &guild, &prefix)?;
            ctx.emit("config.prefix", json!({ "prefix": prefix }), || {
                format!("✅ Prefix set to '{}'", prefix)
            });
        }
    }
    Ok(())
}

fn run_mod(ctx: &Ctx, cmd: ModCommand) -> Result<(), AetherError> {
    match cmd {
        ModCommand::Warn {
            user,
            guild,
            moderator,
            reason,
        } => {
            let total = moderation::add_warning(&ctx.store, &user, &guild, &moderator, &reason)?;
            ctx.emit("mod.warn", json!({ "user_id": user, "total_warnings": total }), || {
                format!(
                    "{} {} has been warned ({})\nTotal warnings: {}",
                    "⚠️ User Warned".yellow().bold(),
                    user,
                    output::compact_line(&reason, 80),
                    total
                )
            });
        }
        ModCommand::Warnings { user, guild, limit } => {
            let warnings = moderation::list_warnings(&ctx.store, &user, &guild, limit)?;
            ctx.emit("mod.warnings", json!({ "warnings": warnings }), || {
                if warnings.is_empty() {
                    return "✅ Clean Record: no warnings found!".to_string();
                }
                let mut lines = vec![format!("Warnings for {}: {}", user, warnings.len())];
                for (i, w) in warnings.iter().enumerate() {
                    lines.push(format!(
                        "  #{} {} by {}: {}",
                        i + 1,
                        w.timestamp.get(..10).unwrap_or(w.timestamp.as_str()),
                        w.moderator_id,
                        output::compact_line(&w.reason, 80)
                    ));
                }
                lines.join("\n")
            });
        }
        ModCommand::AutomodLog { guild, limit } => {
            let entries = moderation::list_automod_logs(&ctx.store, &guild, limit)?;
            ctx.emit("mod.automod_log", json!({ "entries": entries }), || {
                entries
                    .iter()
                    .map(|e| format!("{} {} {} ({})", e.timestamp, e.user_id, e.action, e.reason))
                    .collect::<Vec<_>>()
                    .join("\n")
            });
        }
        ModCommand::Scan { content, mentions } => {
            let rules = AutomodRules::from_config(&ctx.config.automod)?;
            let violation = rules.scan(&content, mentions);
            ctx.emit("mod.scan", json!({ "violation": violation }), || match &violation {
                Some(v) => format!("{} {}", "flagged:".red(), v),
                None => "clean".green().to_string(),
            });
        }
    }
    Ok(())
}

fn run_fun(format: OutputFormat, cmd: FunCommand) -> Result<(), AetherError> {
    let mut rng = rand::thread_rng();
    match cmd {
        FunCommand::Roll { sides } => {
            let value = fun::roll_die(sides, &mut rng)?;
            emit(format, "fun.roll", json!({ "sides": sides, "value": value }), || {
                format!("🎲 You rolled a {} (1-{sides})", value.to_string().bold())
            });
        }
        FunCommand::Flip => {
            let face = fun::flip_coin(&mut rng);
            emit(format, "fun.flip", json!({ "face": face }), || {
                format!("🪙 {}", face.to_string().bold())
            });
        }
        FunCommand::EightBall { question } => {
            let answer = fun::eight_ball(&mut rng);
            emit(
                format,
                "fun.8ball",
                json!({ "question": question, "answer": answer }),
                || format!("🎱 {question}\n   {}", answer.cyan()),
            );
        }
    }
    Ok(())
}

fn run_backup(ctx: &Ctx, cmd: BackupCommand) -> Result<(), AetherError> {
    match cmd {
        BackupCommand::Run { date } => {
            let date = match date {
                Some(raw) => time::parse_date(&raw)?,
                None => time::today_local(),
            };
            let entry = backup::run_backup(&ctx.store, &ctx.config.backup.dir, date)?;
            ctx.emit("backup.run", json!({ "backup": entry }), || {
                format!("🔄 Database backup completed: {}", entry.path)
            });
        }
        BackupCommand::List => {
            let entries = backup::list_backups(&ctx.store)?;
            ctx.emit("backup.list", json!({ "backups": entries }), || {
                entries
                    .iter()
                    .map(|e| format!("{}  {}  {} bytes", e.id, e.path, e.size_bytes))
                    .collect::<Vec<_>>()
                    .join("\n")
            });
        }
        BackupCommand::Verify => {
            let failures = backup::verify_backups(&ctx.store)?;
            if !failures.is_empty() {
                return Err(AetherError::ValidationError(format!(
                    "{} backup(s) failed verification: {}",
                    failures.len(),
                    output::preview_messages(&failures, 5, 120)
                )));
            }
            ctx.emit("backup.verify", json!({ "ok": true }), || {
                "✓ all backups verified".green().to_string()
            });
        }
        BackupCommand::Prune { keep } => {
            let keep = keep.unwrap_or(ctx.config.backup.keep);
            let removed = backup::prune_backups(&ctx.store, keep)?;
            ctx.emit("backup.prune", json!({ "removed": removed }), || {
                format!("Removed {} backup(s)", removed.len())
            });
        }
    }
    Ok(())
}

fn parse_event(raw: &str) -> Result<InboundEvent, AetherError> {
    serde_json::from_str(raw).map_err(|e| AetherError::ValidationError(format!("invalid event: {e}")))
}

fn run_event(ctx: &Ctx, raw: Option<String>) -> Result<(), AetherError> {
    let raw = match raw {
        Some(r) => r,
        None => {
            let mut buf = String::new();
            std::io::stdin().read_to_string(&mut buf)?;
            buf
        }
    };
    let event = parse_event(&raw)?;
    let router = EventRouter::new(
        &ctx.store,
        StoreFeatureGate::new(&ctx.store),
        AutomodRules::from_config(&ctx.config.automod)?,
    );
    let reactions = router.handle(&event, &mut rand::thread_rng())?;
    ctx.emit("event", json!({ "reactions": reactions }), || {
        serde_json::to_string_pretty(&reactions).unwrap_or_default()
    });
    Ok(())
}

/// Line-delimited JSON loop: one event per input line, one reaction per output line.
fn run_serve(ctx: &Ctx, no_backup: bool) -> Result<(), AetherError> {
    let router = EventRouter::new(
        &ctx.store,
        StoreFeatureGate::new(&ctx.store),
        AutomodRules::from_config(&ctx.config.automod)?,
    );
    let scheduler = (!no_backup).then(|| {
        BackupScheduler::spawn(
            ctx.store.clone(),
            ctx.config.backup.dir.clone(),
            Duration::from_secs(ctx.config.backup.interval_hours * 3600),
            ctx.config.backup.keep,
        )
    });
    tracing::info!(data_dir = %ctx.store.root.display(), backups = !no_backup, "aether serving events from stdin");

    let mut rng = rand::thread_rng();
    let stdin = std::io::stdin();
    let stdout = std::io::stdout();
    let mut out = stdout.lock();
    let mut processed = 0u64;
    for line in stdin.lock().lines() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        let outcome = parse_event(&line).and_then(|ev| router.handle(&ev, &mut rng));
        match outcome {
            Ok(reactions) => {
                for r in reactions {
                    let encoded = serde_json::to_string(&r)
                        .map_err(|e| AetherError::ValidationError(e.to_string()))?;
                    writeln!(out, "{}", encoded)?;
                }
            }
            Err(e) => {
                tracing::warn!(error = %e, "event rejected");
                writeln!(out, "{}", json!({ "type": "error", "code": e.code(), "message": e.to_string() }))?;
            }
        }
        out.flush()?;
        processed += 1;
    }

    if let Some(s) = scheduler {
        s.stop();
    }
    tracing::info!(processed, "event stream closed");
    Ok(())
}
