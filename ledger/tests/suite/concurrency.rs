//! Two handles on one ledger file behave like two processes.

use chrono::TimeDelta;
use vetted_ledger::LedgerError;
use vetted_types::Event;

use crate::common::{at, init_event, ledger_file, open_pair, refuted};

#[test]
fn second_writer_is_refused_while_first_holds_the_lock() {
    let (_dir, path) = ledger_file();
    let (mut first, mut second) = open_pair(&path);
    first.append(&init_event(), at()).unwrap();

    let committed = first
        .transact(at, |reader| {
            assert_eq!(reader.last_seq()?, 1);
            let contended = second.append(&refuted("1"), at());
            assert!(matches!(contended, Err(LedgerError::Busy)));
            Ok::<_, LedgerError>((vec![refuted("1.1")], ()))
        })
        .unwrap();
    assert_eq!(committed.seqs, vec![2]);

    // Lock released: the second handle appends after the first's record.
    assert_eq!(second.append(&refuted("1"), at()).unwrap(), 3);
    let seqs: Vec<u64> = first.read_all().unwrap().iter().map(|e| e.seq).collect();
    assert_eq!(seqs, vec![1, 2, 3]);
}

#[test]
fn append_timestamp_is_taken_under_the_lock() {
    let (_dir, path) = ledger_file();
    let (mut first, mut second) = open_pair(&path);
    first.append(&init_event(), at()).unwrap();

    let stamped = at() + TimeDelta::minutes(5);
    let committed = first
        .transact(
            || {
                let contended = second.append(&refuted("1"), at());
                assert!(matches!(contended, Err(LedgerError::Busy)));
                stamped
            },
            |reader| {
                assert_eq!(reader.recorded_at(), stamped);
                Ok::<_, LedgerError>((vec![refuted("1.1")], ()))
            },
        )
        .unwrap();
    assert_eq!(committed.seqs, vec![2]);

    let entries = second.read_all().unwrap();
    assert_eq!(entries[1].recorded_at, stamped);
}

#[test]
fn readers_see_only_committed_events() {
    let (_dir, path) = ledger_file();
    let (mut first, second) = open_pair(&path);
    first.append(&init_event(), at()).unwrap();

    first
        .transact(at, |_reader| {
            assert_eq!(second.read_all()?.len(), 1);
            Ok::<_, LedgerError>((vec![refuted("1")], ()))
        })
        .unwrap();

    assert_eq!(second.read_all().unwrap().len(), 2);
}

#[test]
fn interleaved_batches_never_share_sequence_numbers() {
    let (_dir, path) = ledger_file();
    let (mut first, mut second) = open_pair(&path);

    let a = first
        .append_batch(&[init_event(), refuted("1")], at())
        .unwrap();
    let b = second
        .append_batch(&[refuted("1.1"), refuted("1.2")], at())
        .unwrap();
    let c = first.append(&refuted("1.3"), at()).unwrap();

    assert_eq!(a, vec![1, 2]);
    assert_eq!(b, vec![3, 4]);
    assert_eq!(c, 5);

    let events: Vec<Event> = second
        .read_all()
        .unwrap()
        .into_iter()
        .map(|entry| entry.event)
        .collect();
    assert_eq!(events[0], init_event());
    assert_eq!(events[4], refuted("1.3"));
}
