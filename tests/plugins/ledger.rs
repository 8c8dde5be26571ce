use aether::core::broker::read_audit_log;
use aether::core::db::db_connect;
use aether::core::error::AetherError;
use aether::core::store::Store;
use aether::plugins::ledger::{
    self, GambleOutcome, ProgressionRecord, STARTING_COINS, balance, claim_daily, get_rank,
    get_record, leaderboard, rank_of, record_activity, record_activity_with_gain,
    settle_gamble_with_roll,
};
use chrono::NaiveDate;
use rand::SeedableRng;
use rand::rngs::StdRng;
use tempfile::tempdir;

fn day(s: &str) -> NaiveDate {
    NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
}

fn open_store() -> (tempfile::TempDir, Store) {
    let tmp = tempdir().unwrap();
    let store = Store::open(tmp.path().join("data")).unwrap();
    (tmp, store)
}

/// Overwrite a record directly, bypassing ledger policy.
fn seed(store: &Store, user: &str, guild: &str, xp: i64, level: i64, coins: i64) {
    let conn = db_connect(&store.db_path().to_string_lossy()).unwrap();
    conn.execute(
        "INSERT INTO user_xp(user_id, guild_id, xp, level, coins) VALUES(?1, ?2, ?3, ?4, ?5)
         ON CONFLICT(user_id, guild_id) DO UPDATE SET xp = excluded.xp, level = excluded.level, coins = excluded.coins",
        rusqlite::params![user, guild, xp, level, coins],
    )
    .unwrap();
}

#[test]
fn first_activity_creates_record_without_level_up() {
    let (_tmp, store) = open_store();
    let res = record_activity_with_gain(&store, "u1", "g1", 25).unwrap();
    assert_eq!(res.xp, 25);
    assert_eq!(res.level, 1);
    assert!(!res.leveled_up);

    let rec = get_record(&store, "u1", "g1").unwrap().unwrap();
    assert_eq!(rec, ProgressionRecord {
        user_id: "u1".to_string(),
        guild_id: "g1".to_string(),
        xp: 25,
        level: 1,
        coins: STARTING_COINS,
        last_daily_claim: None,
    });
}

#[test]
fn crossing_threshold_levels_up_and_awards_coins() {
    let (_tmp, store) = open_store();
    seed(&store, "u1", "g1", 190, 1, 100);
    let res = record_activity_with_gain(&store, "u1", "g1", 25).unwrap();
    assert_eq!(res.xp, 215);
    assert_eq!(res.level, 2);
    assert!(res.leveled_up);
    assert_eq!(res.coins_awarded, 100);
    assert_eq!(balance(&store, "u1", "g1").unwrap(), 200);
}

#[test]
fn random_activity_gain_stays_in_range() {
    let (_tmp, store) = open_store();
    let mut rng = StdRng::seed_from_u64(7);
    let mut last_xp = 0;
    for _ in 0..20 {
        let res = record_activity(&store, "u1", "g1", &mut rng).unwrap();
        assert!((ledger::XP_GAIN_MIN..=ledger::XP_GAIN_MAX).contains(&res.xp_gained));
        assert_eq!(res.xp, last_xp + res.xp_gained);
        last_xp = res.xp;
    }
}

#[test]
fn negative_gain_is_rejected_without_a_record() {
    let (_tmp, store) = open_store();
    let err = record_activity_with_gain(&store, "u1", "g1", -5).unwrap_err();
    assert!(matches!(err, AetherError::ValidationError(_)));
    assert!(get_record(&store, "u1", "g1").unwrap().is_none());
}

#[test]
fn first_daily_claim_sets_balance_to_one_hundred() {
    let (_tmp, store) = open_store();
    let res = claim_daily(&store, "u1", "g1", day("2024-03-01")).unwrap();
    assert!(res.first_claim);
    assert_eq!(res.reward, 100);
    assert_eq!(res.balance, 100);

    let rec = get_record(&store, "u1", "g1").unwrap().unwrap();
    assert_eq!(rec.coins, 100);
    assert_eq!(rec.last_daily_claim, Some(day("2024-03-01")));
}

#[test]
fn daily_reward_scales_with_level() {
    let (_tmp, store) = open_store();
    claim_daily(&store, "u1", "g1", day("2024-03-01")).unwrap();
    seed(&store, "u1", "g1", 700, 3, 100);

    let res = claim_daily(&store, "u1", "g1", day("2024-03-02")).unwrap();
    assert!(!res.first_claim);
    assert_eq!(res.reward, 80);
    assert_eq!(res.balance, 180);
}

#[test]
fn second_claim_same_day_is_rejected_and_changes_nothing() {
    let (_tmp, store) = open_store();
    claim_daily(&store, "u1", "g1", day("2024-03-01")).unwrap();
    let before = get_record(&store, "u1", "g1").unwrap();

    let err = claim_daily(&store, "u1", "g1", day("2024-03-01")).unwrap_err();
    assert!(matches!(err, AetherError::AlreadyClaimedToday { date } if date == day("2024-03-01")));
    assert_eq!(get_record(&store, "u1", "g1").unwrap(), before);
}

#[test]
fn claim_dated_before_last_claim_is_rejected() {
    let (_tmp, store) = open_store();
    claim_daily(&store, "u1", "g1", day("2024-03-05")).unwrap();
    let err = claim_daily(&store, "u1", "g1", day("2024-03-04")).unwrap_err();
    assert!(matches!(err, AetherError::AlreadyClaimedToday { .. }));
}

#[test]
fn member_with_activity_but_no_claim_gets_level_reward() {
    let (_tmp, store) = open_store();
    record_activity_with_gain(&store, "u1", "g1", 10).unwrap();
    let res = claim_daily(&store, "u1", "g1", day("2024-03-01")).unwrap();
    assert!(!res.first_claim);
    assert_eq!(res.reward, 60);
    assert_eq!(res.balance, STARTING_COINS + 60);
}

#[test]
fn gamble_rolls_map_to_payouts() {
    let (_tmp, store) = open_store();
    seed(&store, "u1", "g1", 0, 1, 1_000);

    let cases = [
        (45, GambleOutcome::Lose, -50),
        (46, GambleOutcome::WinSmall, 25),
        (95, GambleOutcome::WinBig, 50),
        (100, GambleOutcome::Jackpot, 200),
    ];
    let mut expected = 1_000;
    for (roll, outcome, delta) in cases {
        let res = settle_gamble_with_roll(&store, "u1", "g1", 50, roll).unwrap();
        expected += delta;
        assert_eq!(res.outcome, outcome, "roll {roll}");
        assert_eq!(res.delta, delta, "roll {roll}");
        assert_eq!(res.balance, expected, "roll {roll}");
    }
    assert_eq!(balance(&store, "u1", "g1").unwrap(), expected);
}

#[test]
fn win_small_rounds_half_stake_down() {
    let (_tmp, store) = open_store();
    seed(&store, "u1", "g1", 0, 1, 100);
    let res = settle_gamble_with_roll(&store, "u1", "g1", 15, 60).unwrap();
    assert_eq!(res.delta, 7);
    assert_eq!(res.balance, 107);
}

#[test]
fn losing_the_whole_balance_leaves_zero() {
    let (_tmp, store) = open_store();
    seed(&store, "u1", "g1", 0, 1, 40);
    let res = settle_gamble_with_roll(&store, "u1", "g1", 40, 1).unwrap();
    assert_eq!(res.balance, 0);
}

#[test]
fn stake_below_minimum_is_rejected_before_funds() {
    let (_tmp, store) = open_store();
    let err = settle_gamble_with_roll(&store, "nobody", "g1", 5, 50).unwrap_err();
    assert!(matches!(err, AetherError::InvalidStake { stake: 5, minimum: 10 }));
}

#[test]
fn stake_above_balance_is_rejected_and_balance_kept() {
    let (_tmp, store) = open_store();
    seed(&store, "u1", "g1", 0, 1, 30);
    let err = settle_gamble_with_roll(&store, "u1", "g1", 50, 100).unwrap_err();
    assert!(matches!(err, AetherError::InsufficientFunds { stake: 50, balance: 30 }));
    assert_eq!(balance(&store, "u1", "g1").unwrap(), 30);
}

#[test]
fn gamble_without_record_reports_zero_balance() {
    let (_tmp, store) = open_store();
    let err = settle_gamble_with_roll(&store, "ghost", "g1", 10, 50).unwrap_err();
    assert!(matches!(err, AetherError::InsufficientFunds { stake: 10, balance: 0 }));
    assert!(get_record(&store, "ghost", "g1").unwrap().is_none());
}

#[test]
fn out_of_range_roll_is_a_validation_error() {
    let (_tmp, store) = open_store();
    seed(&store, "u1", "g1", 0, 1, 100);
    assert!(matches!(
        settle_gamble_with_roll(&store, "u1", "g1", 10, 0),
        Err(AetherError::ValidationError(_))
    ));
    assert!(matches!(
        settle_gamble_with_roll(&store, "u1", "g1", 10, 101),
        Err(AetherError::ValidationError(_))
    ));
}

#[test]
fn balance_defaults_to_zero() {
    let (_tmp, store) = open_store();
    assert_eq!(balance(&store, "nobody", "g1").unwrap(), 0);
}

#[test]
fn rank_orders_by_xp_with_ties_in_insertion_order() {
    let (_tmp, store) = open_store();
    record_activity_with_gain(&store, "a", "g1", 50).unwrap();
    record_activity_with_gain(&store, "b", "g1", 120).unwrap();
    record_activity_with_gain(&store, "c", "g1", 50).unwrap();
    record_activity_with_gain(&store, "other", "g2", 999).unwrap();

    let ids: Vec<String> = get_rank(&store, "g1")
        .unwrap()
        .into_iter()
        .map(|e| e.user_id)
        .collect();
    assert_eq!(ids, vec!["b", "a", "c"]);

    assert_eq!(rank_of(&store, "b", "g1").unwrap(), Some(1));
    assert_eq!(rank_of(&store, "a", "g1").unwrap(), Some(2));
    assert_eq!(rank_of(&store, "c", "g1").unwrap(), Some(2));
    assert_eq!(rank_of(&store, "other", "g1").unwrap(), None);
}

#[test]
fn leaderboard_truncates_to_limit() {
    let (_tmp, store) = open_store();
    for (i, user) in ["a", "b", "c", "d"].iter().enumerate() {
        record_activity_with_gain(&store, user, "g1", 10 * (i as i64 + 1)).unwrap();
    }
    let top = leaderboard(&store, "g1", 2).unwrap();
    assert_eq!(top.len(), 2);
    assert_eq!(top[0].user_id, "d");
    assert_eq!(top[1].user_id, "c");
    assert!(leaderboard(&store, "empty", 10).unwrap().is_empty());
}

#[test]
fn audit_log_records_success_and_rejection() {
    let (_tmp, store) = open_store();
    claim_daily(&store, "u1", "g1", day("2024-03-01")).unwrap();
    let _ = claim_daily(&store, "u1", "g1", day("2024-03-01"));

    let daily: Vec<_> = read_audit_log(&store)
        .unwrap()
        .into_iter()
        .filter(|e| e.op == "ledger.daily")
        .collect();
    assert_eq!(daily.len(), 2);
    assert_eq!(daily[0].status, "success");
    assert_eq!(daily[1].status, "rejected");
    assert_eq!(daily[0].key.as_deref(), Some("ledger:g1:u1"));
}

#[test]
fn records_are_scoped_per_guild() {
    let (_tmp, store) = open_store();
    record_activity_with_gain(&store, "u1", "g1", 20).unwrap();
    record_activity_with_gain(&store, "u1", "g2", 15).unwrap();
    assert_eq!(get_record(&store, "u1", "g1").unwrap().unwrap().xp, 20);
    assert_eq!(get_record(&store, "u1", "g2").unwrap().unwrap().xp, 15);
}

#[test]
fn xp_overflow_is_rejected_without_mutation() {
    let (_tmp, store) = open_store();
    record_activity_with_gain(&store, "u1", "g1", i64::MAX).unwrap();
    let before = get_record(&store, "u1", "g1").unwrap();

    let err = record_activity_with_gain(&store, "u1", "g1", 1).unwrap_err();
    assert!(matches!(err, AetherError::ValidationError(_)));
    assert_eq!(get_record(&store, "u1", "g1").unwrap(), before);
}

#[test]
fn coin_overflow_is_rejected_without_mutation() {
    let (_tmp, store) = open_store();
    seed(&store, "u1", "g1", 0, 1, i64::MAX);

    let err = claim_daily(&store, "u1", "g1", day("2024-03-01")).unwrap_err();
    assert!(matches!(err, AetherError::ValidationError(_)));

    let err = settle_gamble_with_roll(&store, "u1", "g1", i64::MAX / 2, 100).unwrap_err();
    assert!(matches!(err, AetherError::ValidationError(_)));

    let rec = get_record(&store, "u1", "g1").unwrap().unwrap();
    assert_eq!(rec.coins, i64::MAX);
    assert_eq!(rec.last_daily_claim, None);
}

#[test]
fn unwritable_audit_log_does_not_mask_committed_result() {
    let (_tmp, store) = open_store();
    seed(&store, "u1", "g1", 0, 1, 100);
    let log = store.root.join("broker.events.jsonl");
    let _ = std::fs::remove_file(&log);
    std::fs::create_dir(&log).unwrap();

    let res = settle_gamble_with_roll(&store, "u1", "g1", 50, 1).unwrap();
    assert_eq!(res.balance, 50);
    assert_eq!(balance(&store, "u1", "g1").unwrap(), 50);

    let err = settle_gamble_with_roll(&store, "u1", "g1", 80, 1).unwrap_err();
    assert!(matches!(err, AetherError::InsufficientFunds { stake: 80, balance: 50 }));
    assert_eq!(balance(&store, "u1", "g1").unwrap(), 50);
}
