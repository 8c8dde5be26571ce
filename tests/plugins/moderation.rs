use aether::core::config::AutomodSection;
use aether::core::store::Store;
use aether::plugins::moderation::{
    AutomodRules, Violation, add_warning, list_automod_logs, list_warnings, log_automod_action,
    warning_count,
};
use tempfile::tempdir;

fn open_store() -> (tempfile::TempDir, Store) {
    let tmp = tempdir().unwrap();
    let store = Store::open(tmp.path().join("data")).unwrap();
    (tmp, store)
}

#[test]
fn warnings_accumulate_per_member() {
    let (_tmp, store) = open_store();
    assert_eq!(add_warning(&store, "u1", "g1", "mod", "spamming").unwrap(), 1);
    assert_eq!(add_warning(&store, "u1", "g1", "mod", "again").unwrap(), 2);
    assert_eq!(add_warning(&store, "u1", "g2", "mod", "elsewhere").unwrap(), 1);
    assert_eq!(warning_count(&store, "u1", "g1").unwrap(), 2);
    assert_eq!(warning_count(&store, "u2", "g1").unwrap(), 0);
}

#[test]
fn warnings_list_newest_first_with_limit() {
    let (_tmp, store) = open_store();
    for reason in ["first", "second", "third"] {
        add_warning(&store, "u1", "g1", "mod", reason).unwrap();
    }
    let all = list_warnings(&store, "u1", "g1", 10).unwrap();
    let reasons: Vec<&str> = all.iter().map(|w| w.reason.as_str()).collect();
    assert_eq!(reasons, vec!["third", "second", "first"]);

    let top = list_warnings(&store, "u1", "g1", 2).unwrap();
    assert_eq!(top.len(), 2);
    assert_eq!(top[0].reason, "third");
}

#[test]
fn blank_reason_gets_placeholder() {
    let (_tmp, store) = open_store();
    add_warning(&store, "u1", "g1", "mod", "   ").unwrap();
    let w = &list_warnings(&store, "u1", "g1", 1).unwrap()[0];
    assert_eq!(w.reason, "No reason provided");
    assert_eq!(w.moderator_id, "mod");
}

#[test]
fn automod_log_is_guild_scoped() {
    let (_tmp, store) = open_store();
    let first = log_automod_action(&store, "u1", "g1", "message_deleted", "spam/bad_words").unwrap();
    let second = log_automod_action(&store, "u2", "g1", "message_deleted", "spam/bad_words").unwrap();
    log_automod_action(&store, "u3", "g2", "message_deleted", "spam/bad_words").unwrap();
    assert!(second > first);

    let entries = list_automod_logs(&store, "g1", 10).unwrap();
    assert_eq!(entries.len(), 2);
    assert_eq!(entries[0].user_id, "u2");
    assert_eq!(entries[1].user_id, "u1");
}

#[test]
fn scan_checks_rules_in_order() {
    let rules = AutomodRules::default();
    // Caps wins over the blocked phrase it also contains.
    assert_eq!(rules.scan("FREE NITRO FOR ALL", 0), Some(Violation::ExcessiveCaps));
    assert_eq!(rules.scan("nooooooo way", 0), Some(Violation::RepeatedCharacters));
    assert_eq!(rules.scan("hi all", 6), Some(Violation::MassMention));
    assert_eq!(rules.scan("hi all", 5), None);
    assert_eq!(
        rules.scan("join discord.gg/abc", 0),
        Some(Violation::BlockedPhrase("discord.gg/".to_string()))
    );
}

#[test]
fn phrases_are_matched_literally() {
    let cfg = AutomodSection {
        blocked_phrases: vec!["a.b".to_string(), " ".to_string()],
        ..AutomodSection::default()
    };
    let rules = AutomodRules::from_config(&cfg).unwrap();
    assert_eq!(rules.scan("axb", 0), None);
    assert_eq!(rules.scan("see a.b", 0), Some(Violation::BlockedPhrase("a.b".to_string())));
}

#[test]
fn empty_phrase_list_disables_phrase_filter() {
    let cfg = AutomodSection {
        blocked_phrases: Vec::new(),
        ..AutomodSection::default()
    };
    let rules = AutomodRules::from_config(&cfg).unwrap();
    assert_eq!(rules.scan("this is a scam", 0), None);
}

#[test]
fn violation_serializes_with_kind_tag() {
    let v = serde_json::to_value(Violation::BlockedPhrase("scam".to_string())).unwrap();
    assert_eq!(v["kind"], "blocked_phrase");
    assert_eq!(v["detail"], "scam");
    let v = serde_json::to_value(Violation::MassMention).unwrap();
    assert_eq!(v["kind"], "mass_mention");
}
