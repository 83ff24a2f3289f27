//! Ledger behaviour across restarts, backed by a real JSON file

use std::fs;
use std::sync::Arc;
use std::time::Duration;

use censusline_core::{Clock, FakeClock};
use censusline_ledger::{JsonFileStore, UsageLedger, UsageStore};
use chrono::{TimeZone, Utc};

const DAY: Duration = Duration::from_secs(86_400);

fn start() -> FakeClock {
    FakeClock::new(Utc.with_ymd_and_hms(2024, 9, 1, 8, 0, 0).unwrap())
}

#[test]
fn count_survives_restart() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("census_api_usage.json");
    let clock = start();

    {
        let ledger =
            UsageLedger::new(JsonFileStore::new(&path), Arc::new(clock.clone()), 500, DAY).unwrap();
        for _ in 0..7 {
            ledger.record_call().unwrap();
        }
    }

    clock.advance(Duration::from_secs(3600));
    let ledger =
        UsageLedger::new(JsonFileStore::new(&path), Arc::new(clock.clone()), 500, DAY).unwrap();
    let status = ledger.status().unwrap();
    assert_eq!(status.record.call_count, 7);
    assert_eq!(status.remaining, 493);
}

#[test]
fn exhausted_quota_blocks_new_process_until_window_ends() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("usage.json");
    let clock = start();

    let first =
        UsageLedger::new(JsonFileStore::new(&path), Arc::new(clock.clone()), 2, DAY).unwrap();
    first.record_call().unwrap();
    first.record_call().unwrap();

    let second =
        UsageLedger::new(JsonFileStore::new(&path), Arc::new(clock.clone()), 2, DAY).unwrap();
    assert!(!second.can_proceed().unwrap());

    second.wait_for_quota().unwrap();
    assert_eq!(clock.total_slept(), DAY);
    assert!(second.can_proceed().unwrap());
    assert_eq!(second.record_call().unwrap().call_count, 1);
}

#[test]
fn corrupt_file_is_not_treated_as_empty() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("usage.json");
    fs::write(&path, "garbage").unwrap();

    let ledger = UsageLedger::new(JsonFileStore::new(&path), Arc::new(start()), 10, DAY).unwrap();
    assert!(ledger.can_proceed().is_err());
    assert!(ledger.record_call().is_err());
    assert_eq!(fs::read_to_string(&path).unwrap(), "garbage");
}

#[test]
fn reset_writes_fresh_window() {
    let dir = tempfile::tempdir().unwrap();
    let store = JsonFileStore::new(dir.path().join("usage.json"));
    let clock = start();
    let ledger = UsageLedger::new(store.clone(), Arc::new(clock.clone()), 3, DAY).unwrap();
    ledger.record_call().unwrap();

    clock.advance(Duration::from_secs(60));
    ledger.reset().unwrap();

    let saved = store.load().unwrap().unwrap();
    assert_eq!(saved.call_count, 0);
    assert_eq!(saved.window_start, clock.now());
}
