//! Shared test utilities and fixtures

#![allow(dead_code)]

use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono::{DateTime, TimeZone, Utc};
use tempfile::TempDir;
use vetted_ledger::{Ledger, LedgerOptions};
use vetted_types::{AgentId, Event, NodeId, NonEmptyString};

pub fn at() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 5, 4, 9, 30, 0).unwrap()
}

pub fn init_event() -> Event {
    Event::ProofInitialized {
        conjecture: NonEmptyString::new("P").unwrap(),
        author: AgentId::new("alice").unwrap(),
    }
}

pub fn refuted(id: &str) -> Event {
    Event::NodeRefuted {
        id: NodeId::parse(id).unwrap(),
        reason: Some("counterexample".to_owned()),
        refuted_by: None,
    }
}

/// A ledger file in a fresh temp directory. Keep the `TempDir` alive for the test.
pub fn ledger_file() -> (TempDir, PathBuf) {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("ledger.db");
    (dir, path)
}

pub fn quick_options() -> LedgerOptions {
    LedgerOptions {
        busy_timeout: Duration::from_millis(50),
    }
}

pub fn open_pair(path: &Path) -> (Ledger, Ledger) {
    let first = Ledger::create(path, quick_options()).expect("create ledger");
    let second = Ledger::open(path, quick_options()).expect("open second handle");
    (first, second)
}
