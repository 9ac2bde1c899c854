//! Replay cache.
//!
//! Holds the most recently materialized [`State`] together with the ledger
//! position it reflects. A load compares that position with the ledger's last
//! sequence number and folds only the entries appended since; a ledger that
//! is somehow behind the cache triggers a full replay.

use std::sync::{Arc, Mutex, PoisonError};

use tracing::{debug, error};

use vetted_ledger::{Ledger, LedgerEntry, LedgerError, LedgerReader, Seq};

use crate::error::ProofError;
use crate::state::{ReplayError, State, Violation};

/// Ordered read access to ledger entries.
pub(crate) trait EventSource {
    fn last_seq(&self) -> Result<Seq, LedgerError>;
    fn read_since(&self, after: Seq) -> Result<Vec<LedgerEntry>, LedgerError>;
}

impl EventSource for Ledger {
    fn last_seq(&self) -> Result<Seq, LedgerError> {
        Ledger::last_seq(self)
    }

    fn read_since(&self, after: Seq) -> Result<Vec<LedgerEntry>, LedgerError> {
        Ledger::read_since(self, after)
    }
}

impl EventSource for LedgerReader<'_> {
    fn last_seq(&self) -> Result<Seq, LedgerError> {
        LedgerReader::last_seq(self)
    }

    fn read_since(&self, after: Seq) -> Result<Vec<LedgerEntry>, LedgerError> {
        LedgerReader::read_since(self, after)
    }
}

#[derive(Debug, Default)]
pub(crate) struct StateCache {
    slot: Mutex<Option<Arc<State>>>,
}

impl StateCache {
    pub(crate) fn load(&self, source: &impl EventSource) -> Result<Arc<State>, ProofError> {
        let last = source.last_seq()?;
        let cached = self
            .slot
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();

        let base = match cached {
            Some(state) if state.event_count() == last => {
                debug!(seq = last, "Replay cache hit");
                return Ok(state);
            }
            Some(state) if state.event_count() < last => {
                debug!(
                    cached = state.event_count(),
                    seq = last,
                    "Replay cache behind ledger; folding new events"
                );
                state
            }
            Some(state) => {
                debug!(
                    cached = state.event_count(),
                    seq = last,
                    "Replay cache ahead of ledger; replaying from scratch"
                );
                Arc::new(State::default())
            }
            None => Arc::new(State::default()),
        };

        let mut state = Arc::unwrap_or_clone(base);
        let entries = source.read_since(state.event_count())?;
        fold_entries(&mut state, &entries)?;

        let state = Arc::new(state);
        *self.slot.lock().unwrap_or_else(PoisonError::into_inner) = Some(Arc::clone(&state));
        Ok(state)
    }
}

/// Fold ledger entries onto `state`, requiring their sequence numbers to continue it.
pub(crate) fn fold_entries(state: &mut State, entries: &[LedgerEntry]) -> Result<(), ProofError> {
    for entry in entries {
        let expected = state.event_count() + 1;
        let result = if entry.seq == expected {
            state.apply(&entry.event)
        } else {
            Err(ReplayError {
                seq: entry.seq,
                violation: Violation::SequenceGap {
                    expected,
                    found: entry.seq,
                },
            })
        };
        if let Err(err) = result {
            error!(seq = err.seq, "Ledger corruption detected during replay: {err}");
            return Err(err.into());
        }
    }
    Ok(())
}
