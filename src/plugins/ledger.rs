//! Progression ledger: XP, levels, coins, daily claims and gambling.
//!
//! Policy lives in pure functions (`level_threshold`, `apply_activity`,
//! `GambleOutcome::from_roll`, ...) so it can be tested without a database.
//! Store-backed operations wrap that policy in a keyed transaction: the
//! record is read, validated and written while holding the (user, guild) lock,
//! and any rejection rolls the transaction back untouched.

use crate::core::broker::DbBroker;
use crate::core::error::AetherError;
use crate::core::schemas;
use crate::core::store::Store;
use chrono::NaiveDate;
use rand::Rng;
use rusqlite::{Connection, OptionalExtension, params};
use serde::{Deserialize, Serialize};
use std::fmt;

pub const STARTING_COINS: i64 = 100;
pub const STARTING_LEVEL: i64 = 1;
pub const XP_GAIN_MIN: i64 = 10;
pub const XP_GAIN_MAX: i64 = 25;
pub const MIN_STAKE: i64 = 10;
pub const FIRST_DAILY_REWARD: i64 = 100;
pub const ROLL_MIN: u8 = 1;
pub const ROLL_MAX: u8 = 100;

const ACTOR: &str = "ledger";

pub fn initialize_ledger_db(store: &Store) -> Result<(), AetherError> {
    DbBroker::new(store).write("aether", "ledger.init", |conn| {
        conn.execute(schemas::LEDGER_DB_SCHEMA_USER_XP, [])?;
        conn.execute(schemas::LEDGER_DB_INDEX_GUILD_XP, [])?;
        Ok(())
    })
}

fn ledger_key(user_id: &str, guild_id: &str) -> String {
    format!("ledger:{guild_id}:{user_id}")
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProgressionRecord {
    pub user_id: String,
    pub guild_id: String,
    pub xp: i64,
    pub level: i64,
    pub coins: i64,
    pub last_daily_claim: Option<NaiveDate>,
}

impl ProgressionRecord {
    pub fn new(user_id: &str, guild_id: &str) -> Self {
        Self {
            user_id: user_id.to_string(),
            guild_id: guild_id.to_string(),
            xp: 0,
            level: STARTING_LEVEL,
            coins: STARTING_COINS,
            last_daily_claim: None,
        }
    }

    /// XP needed to leave the current level.
    pub fn next_threshold(&self) -> i64 {
        level_threshold(self.level)
    }
}

/// XP at which a member leaves `level`. Saturates at `i64::MAX`.
pub fn level_threshold(level: i64) -> i64 {
    level.saturating_mul(150).saturating_add(50)
}

/// Coins paid out on reaching `level_after`, `None` on overflow.
pub fn level_up_reward(level_after: i64) -> Option<i64> {
    level_after.checked_mul(50)
}

/// Daily reward for a member who already has a record, `None` on overflow.
pub fn daily_reward(level: i64) -> Option<i64> {
    level.checked_mul(10)?.checked_add(50)
}

fn overflow(what: &str) -> AetherError {
    AetherError::ValidationError(format!("{what} would overflow"))
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActivityResult {
    pub xp: i64,
    pub level: i64,
    pub xp_gained: i64,
    pub leveled_up: bool,
    pub coins_awarded: i64,
}

/// Apply one activity event to `record`.
///
/// At most one level is gained per call, even when `gain` would carry the
/// record past two thresholds. On overflow `record` is left untouched.
pub fn apply_activity(
    record: &mut ProgressionRecord,
    gain: i64,
) -> Result<ActivityResult, AetherError> {
    let xp = record.xp.checked_add(gain).ok_or_else(|| overflow("XP total"))?;
    let leveled_up = xp >= level_threshold(record.level);
    let (level, coins_awarded) = if leveled_up {
        let level = record.level.checked_add(1).ok_or_else(|| overflow("level"))?;
        let reward = level_up_reward(level).ok_or_else(|| overflow("level-up reward"))?;
        (level, reward)
    } else {
        (record.level, 0)
    };
    let coins = record
        .coins
        .checked_add(coins_awarded)
        .ok_or_else(|| overflow("coin balance"))?;

    record.xp = xp;
    record.level = level;
    record.coins = coins;
    Ok(ActivityResult {
        xp,
        level,
        xp_gained: gain,
        leveled_up,
        coins_awarded,
    })
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GambleOutcome {
    Lose,
    WinSmall,
    WinBig,
    Jackpot,
}

impl GambleOutcome {
    /// Map a roll in `[1, 100]` onto the payout table. Ranges are inclusive.
    pub fn from_roll(roll: u8) -> Self {
        match roll {
            0..=45 => GambleOutcome::Lose,
            46..=80 => GambleOutcome::WinSmall,
            81..=95 => GambleOutcome::WinBig,
            _ => GambleOutcome::Jackpot,
        }
    }

    /// Net coin change for `stake`, `None` on overflow.
    pub fn delta(self, stake: i64) -> Option<i64> {
        match self {
            GambleOutcome::Lose => stake.checked_neg(),
            GambleOutcome::WinSmall => Some(stake / 2),
            GambleOutcome::WinBig => Some(stake),
            GambleOutcome::Jackpot => stake.checked_mul(4),
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            GambleOutcome::Lose => "lose",
            GambleOutcome::WinSmall => "win_small",
            GambleOutcome::WinBig => "win_big",
            GambleOutcome::Jackpot => "jackpot",
        }
    }
}

impl fmt::Display for GambleOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GambleResult {
    pub outcome: GambleOutcome,
    pub roll: u8,
    pub stake: i64,
    pub delta: i64,
    pub balance: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClaimResult {
    pub reward: i64,
    pub balance: i64,
    pub first_claim: bool,
    pub claimed_on: NaiveDate,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RankEntry {
    pub user_id: String,
    pub xp: i64,
    pub level: i64,
    pub coins: i64,
}

/// Check a stake against the minimum and the current balance.
pub fn validate_stake(stake: i64, balance: i64) -> Result<(), AetherError> {
    if stake < MIN_STAKE {
        return Err(AetherError::InvalidStake {
            stake,
            minimum: MIN_STAKE,
        });
    }
    if balance < stake {
        return Err(AetherError::InsufficientFunds { stake, balance });
    }
    Ok(())
}

fn load_record(
    conn: &Connection,
    user_id: &str,
    guild_id: &str,
) -> Result<Option<ProgressionRecord>, AetherError> {
    let row = conn
        .query_row(
            "SELECT xp, level, coins, last_daily FROM user_xp WHERE user_id = ?1 AND guild_id = ?2",
            params![user_id, guild_id],
            |row| {
                Ok((
                    row.get::<_, i64>(0)?,
                    row.get::<_, i64>(1)?,
                    row.get::<_, i64>(2)?,
                    row.get::<_, Option<String>>(3)?,
                ))
            },
        )
        .optional()?;

    let Some((xp, level, coins, last_daily)) = row else {
        return Ok(None);
    };
    let last_daily_claim = match last_daily {
        Some(raw) => Some(crate::core::time::parse_date(&raw)?),
        None => None,
    };
    Ok(Some(ProgressionRecord {
        user_id: user_id.to_string(),
        guild_id: guild_id.to_string(),
        xp,
        level,
        coins,
        last_daily_claim,
    }))
}

fn save_record(conn: &Connection, record: &ProgressionRecord) -> Result<(), AetherError> {
    let last_daily = record.last_daily_claim.map(|d| d.to_string());
    conn.execute(
        "INSERT INTO user_xp(user_id, guild_id, xp, level, coins, last_daily)
         VALUES(?1, ?2, ?3, ?4, ?5, ?6)
         ON CONFLICT(user_id, guild_id) DO UPDATE SET
            xp = excluded.xp,
            level = excluded.level,
            coins = excluded.coins,
            last_daily = excluded.last_daily",
        params![
            record.user_id,
            record.guild_id,
            record.xp,
            record.level,
            record.coins,
            last_daily
        ],
    )?;
    Ok(())
}

/// Record one message worth of activity with a random XP gain in `[10, 25]`.
pub fn record_activity<R: Rng + ?Sized>(
    store: &Store,
    user_id: &str,
    guild_id: &str,
    rng: &mut R,
) -> Result<ActivityResult, AetherError> {
    let gain = rng.gen_range(XP_GAIN_MIN..=XP_GAIN_MAX);
    record_activity_with_gain(store, user_id, guild_id, gain)
}

/// Record activity with a gain the caller already drew.
pub fn record_activity_with_gain(
    store: &Store,
    user_id: &str,
    guild_id: &str,
    gain: i64,
) -> Result<ActivityResult, AetherError> {
    if gain < 0 {
        return Err(AetherError::ValidationError(format!(
            "XP gain must be non-negative, got {gain}"
        )));
    }
    let key = ledger_key(user_id, guild_id);
    let result = DbBroker::new(store).write_keyed(ACTOR, "ledger.activity", &key, |conn| {
        let mut record =
            load_record(conn, user_id, guild_id)?.unwrap_or_else(|| ProgressionRecord::new(user_id, guild_id));
        let result = apply_activity(&mut record, gain)?;
        save_record(conn, &record)?;
        Ok(result)
    })?;
    if result.leveled_up {
        tracing::info!(user_id, guild_id, level = result.level, coins = result.coins_awarded, "level up");
    }
    Ok(result)
}

/// Claim the daily coin reward for `today`.
///
/// A claim dated on or before the last recorded claim is rejected, so the
/// stored claim date never moves backward.
pub fn claim_daily(
    store: &Store,
    user_id: &str,
    guild_id: &str,
    today: NaiveDate,
) -> Result<ClaimResult, AetherError> {
    let key = ledger_key(user_id, guild_id);
    DbBroker::new(store).write_keyed(ACTOR, "ledger.daily", &key, |conn| {
        match load_record(conn, user_id, guild_id)? {
            None => {
                let mut record = ProgressionRecord::new(user_id, guild_id);
                record.coins = FIRST_DAILY_REWARD;
                record.last_daily_claim = Some(today);
                save_record(conn, &record)?;
                Ok(ClaimResult {
                    reward: FIRST_DAILY_REWARD,
                    balance: record.coins,
                    first_claim: true,
                    claimed_on: today,
                })
            }
            Some(mut record) => {
                if let Some(last) = record.last_daily_claim {
                    if last >= today {
                        return Err(AetherError::AlreadyClaimedToday { date: last });
                    }
                }
                let reward = daily_reward(record.level).ok_or_else(|| overflow("daily reward"))?;
                record.coins = record
                    .coins
                    .checked_add(reward)
                    .ok_or_else(|| overflow("coin balance"))?;
                record.last_daily_claim = Some(today);
                save_record(conn, &record)?;
                Ok(ClaimResult {
                    reward,
                    balance: record.coins,
                    first_claim: false,
                    claimed_on: today,
                })
            }
        }
    })
}

/// Gamble `stake` coins on a uniform roll in `[1, 100]`.
pub fn settle_gamble<R: Rng + ?Sized>(
    store: &Store,
    user_id: &str,
    guild_id: &str,
    stake: i64,
    rng: &mut R,
) -> Result<GambleResult, AetherError> {
    let roll = rng.gen_range(ROLL_MIN..=ROLL_MAX);
    settle_gamble_with_roll(store, user_id, guild_id, stake, roll)
}

/// Settle a gamble with a roll the caller already drew.
pub fn settle_gamble_with_roll(
    store: &Store,
    user_id: &str,
    guild_id: &str,
    stake: i64,
    roll: u8,
) -> Result<GambleResult, AetherError> {
    if !(ROLL_MIN..=ROLL_MAX).contains(&roll) {
        return Err(AetherError::ValidationError(format!(
            "roll must be within [{ROLL_MIN}, {ROLL_MAX}], got {roll}"
        )));
    }
    if stake < MIN_STAKE {
        return Err(AetherError::InvalidStake {
            stake,
            minimum: MIN_STAKE,
        });
    }

    let key = ledger_key(user_id, guild_id);
    let result = DbBroker::new(store).write_keyed(ACTOR, "ledger.gamble", &key, |conn| {
        let Some(mut record) = load_record(conn, user_id, guild_id)? else {
            return Err(AetherError::InsufficientFunds { stake, balance: 0 });
        };
        validate_stake(stake, record.coins)?;

        let outcome = GambleOutcome::from_roll(roll);
        let delta = outcome.delta(stake).ok_or_else(|| overflow("gamble payout"))?;
        record.coins = record
            .coins
            .checked_add(delta)
            .ok_or_else(|| overflow("coin balance"))?
            .max(0);
        save_record(conn, &record)?;
        Ok(GambleResult {
            outcome,
            roll,
            stake,
            delta,
            balance: record.coins,
        })
    })?;
    tracing::debug!(user_id, guild_id, roll, outcome = %result.outcome, delta = result.delta, "gamble settled");
    Ok(result)
}

pub fn get_record(
    store: &Store,
    user_id: &str,
    guild_id: &str,
) -> Result<Option<ProgressionRecord>, AetherError> {
    DbBroker::new(store).read(|conn| load_record(conn, user_id, guild_id))
}

/// Coin balance, 0 for members without a record.
pub fn balance(store: &Store, user_id: &str, guild_id: &str) -> Result<i64, AetherError> {
    Ok(get_record(store, user_id, guild_id)?.map_or(0, |r| r.coins))
}

/// Every record in `guild` ordered by XP descending, ties in insertion order.
pub fn get_rank(store: &Store, guild_id: &str) -> Result<Vec<RankEntry>, AetherError> {
    query_rank(store, guild_id, None)
}

/// The first `limit` entries of [`get_rank`].
pub fn leaderboard(
    store: &Store,
    guild_id: &str,
    limit: usize,
) -> Result<Vec<RankEntry>, AetherError> {
    query_rank(store, guild_id, Some(limit))
}

fn query_rank(
    store: &Store,
    guild_id: &str,
    limit: Option<usize>,
) -> Result<Vec<RankEntry>, AetherError> {
    let limit = limit.map_or(-1, |l| i64::try_from(l).unwrap_or(i64::MAX));
    DbBroker::new(store).read(|conn| {
        let mut stmt = conn.prepare(
            "SELECT user_id, xp, level, coins FROM user_xp
             WHERE guild_id = ?1
             ORDER BY xp DESC, rowid ASC
             LIMIT ?2",
        )?;
        let rows = stmt.query_map(params![guild_id, limit], |row| {
            Ok(RankEntry {
                user_id: row.get(0)?,
                xp: row.get(1)?,
                level: row.get(2)?,
                coins: row.get(3)?,
            })
        })?;
        let mut out = Vec::new();
        for r in rows {
            out.push(r?);
        }
        Ok(out)
    })
}

/// `1 + number of members in the guild with strictly more XP`, or `None`
/// when the member has no record yet.
pub fn rank_of(store: &Store, user_id: &str, guild_id: &str) -> Result<Option<i64>, AetherError> {
    DbBroker::new(store).read(|conn| {
        let Some(record) = load_record(conn, user_id, guild_id)? else {
            return Ok(None);
        };
        let above: i64 = conn.query_row(
            "SELECT COUNT(*) FROM user_xp WHERE guild_id = ?1 AND xp > ?2",
            params![guild_id, record.xp],
            |row| row.get(0),
        )?;
        Ok(Some(above + 1))
    })
}

pub fn schema() -> serde_json::Value {
    serde_json::json!({
        "name": "ledger",
        "version": "0.1.0",
        "description": "XP, levels, coins, daily claims and gambling",
        "commands": [
            { "name": "activity", "parameters": ["user", "guild", "gain"] },
            { "name": "daily", "parameters": ["user", "guild", "date"] },
            { "name": "gamble", "parameters": ["user", "guild", "amount"] },
            { "name": "rank", "parameters": ["user", "guild"] },
            { "name": "leaderboard", "parameters": ["guild", "limit"] }
        ],
        "storage": ["aether.db"]
    })
}
