use aether::core::store::Store;
use aether::plugins::backup::{
    BackupScheduler, backup_file_name, hash_file, list_backups, prune_backups, run_backup,
    verify_backups,
};
use aether::plugins::ledger::{get_record, record_activity_with_gain};
use chrono::NaiveDate;
use std::fs;
use std::path::Path;
use std::time::Duration;
use tempfile::tempdir;

fn day(s: &str) -> NaiveDate {
    NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
}

#[test]
fn file_name_uses_compact_date() {
    assert_eq!(backup_file_name(day("2024-03-07")), "backup_aether_20240307.db");
}

#[test]
fn backup_is_a_usable_store_snapshot() {
    let tmp = tempdir().unwrap();
    let store = Store::open(tmp.path().join("data")).unwrap();
    record_activity_with_gain(&store, "u1", "g1", 42).unwrap();

    let dest = tmp.path().join("backups");
    let entry = run_backup(&store, &dest, day("2024-03-07")).unwrap();
    let path = Path::new(&entry.path);
    assert!(path.exists());
    assert_eq!(entry.content_hash, hash_file(path).unwrap());
    assert!(entry.size_bytes > 0);

    // Open the snapshot as its own store.
    let restored_root = tmp.path().join("restored");
    fs::create_dir_all(&restored_root).unwrap();
    fs::copy(path, restored_root.join("aether.db")).unwrap();
    let restored = Store::open(&restored_root).unwrap();
    assert_eq!(get_record(&restored, "u1", "g1").unwrap().unwrap().xp, 42);
}

#[test]
fn same_day_backup_replaces_previous() {
    let tmp = tempdir().unwrap();
    let store = Store::open(tmp.path().join("data")).unwrap();
    let dest = tmp.path().join("backups");

    run_backup(&store, &dest, day("2024-03-07")).unwrap();
    record_activity_with_gain(&store, "u1", "g1", 10).unwrap();
    let second = run_backup(&store, &dest, day("2024-03-07")).unwrap();

    let all = list_backups(&store).unwrap();
    assert_eq!(all.len(), 1);
    assert_eq!(all[0].id, second.id);
    assert!(verify_backups(&store).unwrap().is_empty());
}

#[test]
fn verify_reports_tampered_and_missing_files() {
    let tmp = tempdir().unwrap();
    let store = Store::open(tmp.path().join("data")).unwrap();
    let dest = tmp.path().join("backups");

    let a = run_backup(&store, &dest, day("2024-03-01")).unwrap();
    let b = run_backup(&store, &dest, day("2024-03-02")).unwrap();
    assert!(verify_backups(&store).unwrap().is_empty());

    fs::write(&a.path, b"not a database").unwrap();
    fs::remove_file(&b.path).unwrap();

    let failures = verify_backups(&store).unwrap();
    assert_eq!(failures.len(), 2);
    assert!(failures[0].contains("Content hash mismatch"), "{failures:?}");
    assert!(failures[1].contains("File missing"), "{failures:?}");
}

#[test]
fn prune_keeps_newest() {
    let tmp = tempdir().unwrap();
    let store = Store::open(tmp.path().join("data")).unwrap();
    let dest = tmp.path().join("backups");
    for d in ["2024-03-01", "2024-03-02", "2024-03-03"] {
        run_backup(&store, &dest, day(d)).unwrap();
    }

    let removed = prune_backups(&store, 2).unwrap();
    assert_eq!(removed.len(), 1);
    assert!(removed[0].path.ends_with("backup_aether_20240301.db"));
    assert!(!Path::new(&removed[0].path).exists());

    let left = list_backups(&store).unwrap();
    assert_eq!(left.len(), 2);
    assert!(left[0].path.ends_with("backup_aether_20240302.db"));
    assert!(prune_backups(&store, 5).unwrap().is_empty());
}

#[test]
fn scheduler_stops_before_first_interval() {
    let tmp = tempdir().unwrap();
    let store = Store::open(tmp.path().join("data")).unwrap();
    let dest = tmp.path().join("backups");

    let scheduler = BackupScheduler::spawn(store.clone(), dest.clone(), Duration::from_secs(3600), 3);
    scheduler.stop();
    assert!(list_backups(&store).unwrap().is_empty());
}

#[test]
fn scheduler_takes_periodic_backups() {
    let tmp = tempdir().unwrap();
    let store = Store::open(tmp.path().join("data")).unwrap();
    let dest = tmp.path().join("backups");

    let scheduler = BackupScheduler::spawn(store.clone(), dest, Duration::from_millis(50), 3);
    let mut seen = false;
    for _ in 0..100 {
        if !list_backups(&store).unwrap().is_empty() {
            seen = true;
            break;
        }
        std::thread::sleep(Duration::from_millis(20));
    }
    scheduler.stop();
    assert!(seen, "scheduler never registered a backup");
    // Every run uses today's file name, so the registry holds one entry.
    assert_eq!(list_backups(&store).unwrap().len(), 1);
}
