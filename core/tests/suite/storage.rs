//! On-disk proofs: initialization, reopening, multiple handles, corruption.

use std::fs;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use chrono::{DateTime, TimeDelta, Utc};
use vetted_config::{PROOF_CONFIG_FILE, ProofConfig};
use vetted_core::{
    Clock, ErrorKind, LEDGER_FILE, ManualClock, NodeSpec, ProofError, ProofService,
};
use vetted_ledger::{Ledger, LedgerError, LedgerOptions};
use vetted_types::{Event, EventKind, NodeId};

use crate::common::{AUTHOR, PROVER, disk_proof, start};

#[test]
fn init_writes_ledger_and_config() {
    let (_dir, proof, _clock) = disk_proof();
    let dir = proof.dir().unwrap();
    assert!(dir.join(LEDGER_FILE).is_file());
    assert!(dir.join(PROOF_CONFIG_FILE).is_file());

    let entries = proof.events_since(0).unwrap();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].seq, 1);
    assert_eq!(entries[0].event.kind(), EventKind::ProofInitialized);
    assert_eq!(entries[0].recorded_at, start());
}

#[test]
fn init_refuses_an_existing_proof() {
    let (_dir, proof, _clock) = disk_proof();
    let dir = proof.dir().unwrap().to_path_buf();
    drop(proof);

    let err = ProofService::init_with(
        &dir,
        "Q",
        AUTHOR,
        ProofConfig::default(),
        ManualClock::new(start()),
    )
    .err()
    .unwrap();
    assert!(matches!(err, ProofError::AlreadyInitialized(_)));

    let reopened = ProofService::open_with(&dir, ManualClock::new(start())).unwrap();
    let state = reopened.load_state().unwrap();
    assert_eq!(state.conjecture().unwrap().as_str(), "P");
    assert_eq!(state.author().unwrap().as_str(), AUTHOR);
}

#[test]
fn open_never_creates() {
    let dir = tempfile::tempdir().unwrap();
    let missing = dir.path().join("nothing-here");
    let err = ProofService::open(&missing).err().unwrap();
    assert!(matches!(err, ProofError::NotInitialized(_)));
    assert!(!missing.exists());
}

#[test]
fn state_survives_reopen() {
    let (_dir, mut proof, clock) = disk_proof();
    proof.claim_node("1", PROVER, None).unwrap();
    proof.refine_node("1", PROVER, &NodeSpec::claim("Q")).unwrap();
    proof.accept_node("1.1").unwrap();
    let dir = proof.dir().unwrap().to_path_buf();
    let expected = proof.load_state().unwrap();
    drop(proof);

    let reopened = ProofService::open_with(&dir, clock).unwrap();
    assert_eq!(*reopened.load_state().unwrap(), *expected);
    assert_eq!(reopened.verify().unwrap(), *expected);
}

#[test]
fn config_is_fixed_at_init() {
    let dir = tempfile::tempdir().unwrap();
    let config = ProofConfig {
        max_depth: 4,
        warn_depth: 2,
        default_lease_secs: 42,
        busy_timeout_ms: 100,
    };
    let path = dir.path().join("proof");
    drop(
        ProofService::init_with(&path, "P", AUTHOR, config, ManualClock::new(start())).unwrap(),
    );

    let reopened = ProofService::open_with(&path, ManualClock::new(start())).unwrap();
    assert_eq!(*reopened.config(), config);
    let written = fs::read_to_string(path.join(PROOF_CONFIG_FILE)).unwrap();
    assert!(written.contains("max_depth = 4"), "{written}");
}

#[test]
fn two_handles_see_each_others_commits() {
    let (_dir, mut first, clock) = disk_proof();
    let dir = first.dir().unwrap().to_path_buf();
    let mut second = ProofService::open_with(&dir, clock.clone()).unwrap();

    first.claim_node("1", "A", None).unwrap();
    // The second handle validates against the first handle's claim.
    assert!(matches!(
        second.claim_node("1", "B", None).unwrap_err(),
        ProofError::LeaseHeld { .. }
    ));
    assert!(matches!(
        second.refine_node("1", "B", &NodeSpec::claim("Q")).unwrap_err(),
        ProofError::OwnerMismatch { .. }
    ));

    second.refine_node("1", "A", &NodeSpec::claim("Q")).unwrap();
    let created = first.refine_node("1", "A", &NodeSpec::claim("R")).unwrap();
    assert_eq!(created.id, NodeId::parse("1.2").unwrap());

    assert_eq!(*first.load_state().unwrap(), *second.load_state().unwrap());
    clock.advance(TimeDelta::hours(1));
    second.claim_node("1", "B", None).unwrap();
}

#[test]
fn events_since_tails_the_ledger() {
    let (_dir, mut proof, _clock) = disk_proof();
    proof.claim_node("1", PROVER, None).unwrap();
    proof.add_definition("ring", "an abelian group with a product").unwrap();

    let tail = proof.events_since(1).unwrap();
    let kinds: Vec<EventKind> = tail.iter().map(|entry| entry.event.kind()).collect();
    assert_eq!(kinds, [EventKind::NodeClaimed, EventKind::DefinitionAdded]);
    assert!(proof.events_since(3).unwrap().is_empty());
}

#[test]
fn invalid_ledger_event_is_reported_as_corruption() {
    let (_dir, proof, _clock) = disk_proof();
    let dir = proof.dir().unwrap().to_path_buf();

    let mut raw = Ledger::open(dir.join(LEDGER_FILE), LedgerOptions::default()).unwrap();
    raw.append(
        &Event::NodeValidated {
            id: NodeId::parse("1.4").unwrap(),
            note: None,
            accepted_by: None,
        },
        start(),
    )
    .unwrap();

    let err = proof.load_state().unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Corruption);
    let ProofError::Corrupt(replay) = &err else {
        panic!("expected corruption, got {err:?}");
    };
    assert_eq!(replay.seq, 2);
    assert!(proof.verify().unwrap_err().is_corruption());
}

#[test]
fn failed_init_leaves_nothing_behind() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("proof");
    // A directory where the WAL file belongs makes ledger setup fail.
    let obstruction = path.join(format!("{LEDGER_FILE}-wal"));
    fs::create_dir_all(&obstruction).unwrap();

    let err = ProofService::init_with(
        &path,
        "P",
        AUTHOR,
        ProofConfig::default(),
        ManualClock::new(start()),
    )
    .err()
    .unwrap();
    assert_eq!(err.kind(), ErrorKind::Storage);
    assert!(!path.join(LEDGER_FILE).exists());
    assert!(!path.join(PROOF_CONFIG_FILE).exists());

    fs::remove_dir(&obstruction).unwrap();
    let proof = ProofService::init_with(
        &path,
        "P",
        AUTHOR,
        ProofConfig::default(),
        ManualClock::new(start()),
    )
    .unwrap();
    assert!(proof.load_state().unwrap().is_initialized());
}

#[test]
fn open_refuses_a_ledger_without_a_conjecture() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("proof");
    drop(Ledger::create(path.join(LEDGER_FILE), LedgerOptions::default()).unwrap());
    ProofConfig::default().write_to_dir(&path).unwrap();

    let err = ProofService::open_with(&path, ManualClock::new(start()))
        .err()
        .unwrap();
    assert!(matches!(err, ProofError::NotInitialized(_)));
}

#[test]
fn init_completes_over_an_empty_leftover_ledger() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("proof");
    drop(Ledger::create(path.join(LEDGER_FILE), LedgerOptions::default()).unwrap());

    let err = ProofService::open_with(&path, ManualClock::new(start()))
        .err()
        .unwrap();
    assert!(matches!(err, ProofError::NotInitialized(_)));

    drop(
        ProofService::init_with(
            &path,
            "P",
            AUTHOR,
            ProofConfig::default(),
            ManualClock::new(start()),
        )
        .unwrap(),
    );
    let reopened = ProofService::open_with(&path, ManualClock::new(start())).unwrap();
    assert_eq!(reopened.events_since(0).unwrap().len(), 1);
}

/// Clock that asserts the proof ledger is write-locked whenever it is read.
struct LockedReadClock {
    rival: Mutex<Ledger>,
    reads: AtomicUsize,
}

impl Clock for LockedReadClock {
    fn now(&self) -> DateTime<Utc> {
        let mut rival = self.rival.lock().unwrap();
        let event = Event::NodeRefuted {
            id: NodeId::root(),
            reason: None,
            refuted_by: None,
        };
        assert!(matches!(rival.append(&event, start()), Err(LedgerError::Busy)));
        self.reads.fetch_add(1, Ordering::SeqCst);
        start()
    }
}

#[test]
fn operation_time_is_read_under_the_write_lock() {
    let (_dir, proof, _clock) = disk_proof();
    let dir = proof.dir().unwrap().to_path_buf();
    drop(proof);

    let rival = Ledger::open(
        dir.join(LEDGER_FILE),
        LedgerOptions {
            busy_timeout: Duration::from_millis(50),
        },
    )
    .unwrap();
    let clock = LockedReadClock {
        rival: Mutex::new(rival),
        reads: AtomicUsize::new(0),
    };
    let mut proof = ProofService::open_with(&dir, clock).unwrap();

    let lease = proof.claim_node("1", PROVER, None).unwrap();
    assert_eq!(lease.expires_at, start() + TimeDelta::seconds(300));
    assert_eq!(proof.clock().reads.load(Ordering::SeqCst), 1);
    assert_eq!(proof.events_since(1).unwrap()[0].recorded_at, start());
}
