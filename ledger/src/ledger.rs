//! Ledger - the durable, append-only event log of a proof.
//!
//! Every state change of a proof is an [`Event`] appended here; nothing else
//! is persisted. Sequence numbers are dense and start at 1.
//!
//! # Key Invariants
//!
//! **An event is committed once `append`/`append_batch`/`transact` returns `Ok`.**
//!
//! **History is immutable.** `UPDATE` and `DELETE` on the events table are
//! rejected by triggers, so not even a buggy caller with raw SQL access can
//! rewrite a past record.
//!
//! # Concurrency
//!
//! All writes run inside `BEGIN IMMEDIATE` transactions, which take SQLite's
//! reserved lock up front. Two processes racing to append are therefore
//! serialized: the second waits up to the configured busy timeout and then
//! fails with [`LedgerError::Busy`]. [`Ledger::transact`] runs the caller's
//! read-validate step inside the same transaction, so nothing can be appended
//! between validation and append.

use std::path::Path;
use std::slice;
use std::time::Duration;

use chrono::{DateTime, Utc};
use rusqlite::{Connection, OptionalExtension, TransactionBehavior, params};
use tracing::{debug, info};

use vetted_types::Event;

use crate::error::{LedgerError, SqliteContext};
use crate::sqlite_util::{decode_timestamp, encode_timestamp, open_secure_db};

/// Position of an event in the ledger.
pub type Seq = u64;

const FORMAT_VERSION: &str = "1";

/// One committed ledger record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LedgerEntry {
    pub seq: Seq,
    pub recorded_at: DateTime<Utc>,
    pub event: Event,
}

#[derive(Debug, Clone, Copy)]
pub struct LedgerOptions {
    /// How long a writer waits for a concurrent writer before giving up.
    pub busy_timeout: Duration,
}

impl Default for LedgerOptions {
    fn default() -> Self {
        Self {
            busy_timeout: Duration::from_secs(5),
        }
    }
}

/// Output of a [`Ledger::transact`] call together with the sequence numbers it appended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Committed<T> {
    pub value: T,
    pub seqs: Vec<Seq>,
}

/// Read access to the ledger from inside a write transaction.
pub struct LedgerReader<'a> {
    conn: &'a Connection,
    recorded_at: DateTime<Utc>,
}

impl LedgerReader<'_> {
    /// Timestamp the pending append will carry, read once the writer lock was taken.
    #[must_use]
    pub fn recorded_at(&self) -> DateTime<Utc> {
        self.recorded_at
    }

    pub fn last_seq(&self) -> Result<Seq, LedgerError> {
        last_seq(self.conn)
    }

    pub fn read_since(&self, after: Seq) -> Result<Vec<LedgerEntry>, LedgerError> {
        read_entries(self.conn, after)
    }

    pub fn read_all(&self) -> Result<Vec<LedgerEntry>, LedgerError> {
        read_entries(self.conn, 0)
    }
}

pub struct Ledger {
    db: Connection,
}

impl Ledger {
    const SCHEMA: &'static str = r"
        CREATE TABLE IF NOT EXISTS events (
            seq INTEGER PRIMARY KEY,
            kind TEXT NOT NULL,
            payload TEXT NOT NULL,
            recorded_at TEXT NOT NULL
        );

        CREATE INDEX IF NOT EXISTS idx_events_kind ON events(kind);

        CREATE TRIGGER IF NOT EXISTS events_append_only_update
        BEFORE UPDATE ON events
        BEGIN
            SELECT RAISE(ABORT, 'ledger is append-only');
        END;

        CREATE TRIGGER IF NOT EXISTS events_append_only_delete
        BEFORE DELETE ON events
        BEGIN
            SELECT RAISE(ABORT, 'ledger is append-only');
        END;

        CREATE TABLE IF NOT EXISTS ledger_meta (
            key TEXT PRIMARY KEY,
            value TEXT NOT NULL
        );
    ";

    /// Create the ledger file if needed and open it.
    pub fn create(path: impl AsRef<Path>, options: LedgerOptions) -> Result<Self, LedgerError> {
        let db = open_secure_db(path.as_ref())?;
        Self::initialize(db, options)
    }

    /// Open an existing ledger. Fails with [`LedgerError::NotFound`] instead of creating one.
    pub fn open(path: impl AsRef<Path>, options: LedgerOptions) -> Result<Self, LedgerError> {
        let path = path.as_ref();
        if !path.is_file() {
            return Err(LedgerError::NotFound(path.to_path_buf()));
        }
        let db = open_secure_db(path)?;
        Self::initialize(db, options)
    }

    /// Open an in-memory ledger (for testing)
    pub fn open_in_memory() -> Result<Self, LedgerError> {
        let db = Connection::open_in_memory().ledger_context("Failed to open in-memory ledger")?;
        Self::initialize(db, LedgerOptions::default())
    }

    fn initialize(db: Connection, options: LedgerOptions) -> Result<Self, LedgerError> {
        db.busy_timeout(options.busy_timeout)
            .ledger_context("Failed to set busy timeout")?;
        db.execute_batch("PRAGMA journal_mode=WAL; PRAGMA synchronous=FULL;")
            .ledger_context("Failed to set pragmas")?;
        db.execute_batch(Self::SCHEMA)
            .ledger_context("Failed to create schema")?;
        db.execute(
            "INSERT OR IGNORE INTO ledger_meta (key, value) VALUES ('format_version', ?1)",
            params![FORMAT_VERSION],
        )
        .ledger_context("Failed to record ledger format")?;

        Ok(Self { db })
    }

    /// Append one event, returning its sequence number.
    pub fn append(&mut self, event: &Event, recorded_at: DateTime<Utc>) -> Result<Seq, LedgerError> {
        let seqs = self.append_batch(slice::from_ref(event), recorded_at)?;
        Ok(seqs[0])
    }

    /// Append several events atomically: either all are committed with
    /// consecutive sequence numbers, or none are.
    pub fn append_batch(
        &mut self,
        events: &[Event],
        recorded_at: DateTime<Utc>,
    ) -> Result<Vec<Seq>, LedgerError> {
        let committed = self.transact(|| recorded_at, |_reader| {
            Ok::<_, LedgerError>((events.to_vec(), ()))
        })?;
        Ok(committed.seqs)
    }

    /// Run a read-validate-append step under the exclusive writer lock.
    ///
    /// `now` is called once the lock is held; its value stamps the appended
    /// events and is visible to `step` through [`LedgerReader::recorded_at`].
    /// `step` sees the ledger as of lock acquisition and returns the events to
    /// append plus an arbitrary output. If `step` fails, nothing is appended.
    pub fn transact<T, E, N, F>(&mut self, now: N, step: F) -> Result<Committed<T>, E>
    where
        N: FnOnce() -> DateTime<Utc>,
        F: FnOnce(&LedgerReader<'_>) -> Result<(Vec<Event>, T), E>,
        E: From<LedgerError>,
    {
        let tx = self
            .db
            .transaction_with_behavior(TransactionBehavior::Immediate)
            .ledger_context("Failed to start ledger write transaction")?;

        let recorded_at = now();
        let (events, value) = step(&LedgerReader {
            conn: &tx,
            recorded_at,
        })?;
        if events.is_empty() {
            // Nothing to write; dropping the transaction rolls it back.
            return Ok(Committed {
                value,
                seqs: Vec::new(),
            });
        }

        let first = last_seq(&tx)? + 1;
        let seqs = insert_events(&tx, first, &events, recorded_at)?;
        tx.commit()
            .ledger_context("Failed to commit ledger write transaction")?;

        info!(
            first_seq = first,
            count = events.len(),
            kind = %events[0].kind(),
            "Ledger append committed"
        );
        Ok(Committed { value, seqs })
    }

    pub fn read_all(&self) -> Result<Vec<LedgerEntry>, LedgerError> {
        read_entries(&self.db, 0)
    }

    /// All entries with a sequence number strictly greater than `after`.
    pub fn read_since(&self, after: Seq) -> Result<Vec<LedgerEntry>, LedgerError> {
        read_entries(&self.db, after)
    }

    /// Sequence number of the newest entry, or 0 for an empty ledger.
    pub fn last_seq(&self) -> Result<Seq, LedgerError> {
        last_seq(&self.db)
    }

    pub fn len(&self) -> Result<u64, LedgerError> {
        let count: i64 = self
            .db
            .query_row("SELECT COUNT(*) FROM events", [], |row| row.get(0))
            .ledger_context("Failed to count events")?;
        Ok(count as u64)
    }

    pub fn is_empty(&self) -> Result<bool, LedgerError> {
        Ok(self.len()? == 0)
    }
}

fn last_seq(db: &Connection) -> Result<Seq, LedgerError> {
    let seq: Option<i64> = db
        .query_row("SELECT MAX(seq) FROM events", [], |row| row.get(0))
        .optional()
        .ledger_context("Failed to query last sequence")?
        .flatten();
    Ok(seq.map_or(0, |seq| seq as u64))
}

fn insert_events(
    db: &Connection,
    first: Seq,
    events: &[Event],
    recorded_at: DateTime<Utc>,
) -> Result<Vec<Seq>, LedgerError> {
    let recorded_at = encode_timestamp(recorded_at);
    let mut stmt = db
        .prepare_cached(
            "INSERT INTO events (seq, kind, payload, recorded_at) VALUES (?1, ?2, ?3, ?4)",
        )
        .ledger_context("Failed to prepare event insert")?;

    let mut seqs = Vec::with_capacity(events.len());
    for (offset, event) in events.iter().enumerate() {
        let seq = first + offset as u64;
        let payload = serde_json::to_string(event).map_err(LedgerError::Encode)?;
        stmt.execute(params![seq as i64, event.kind().as_str(), payload, &recorded_at])
            .ledger_context("Failed to insert event")?;
        seqs.push(seq);
    }
    Ok(seqs)
}

fn read_entries(db: &Connection, after: Seq) -> Result<Vec<LedgerEntry>, LedgerError> {
    let mut stmt = db
        .prepare_cached(
            "SELECT seq, payload, recorded_at FROM events
             WHERE seq > ?1
             ORDER BY seq ASC",
        )
        .ledger_context("Failed to prepare ledger read")?;

    let rows: Vec<(i64, String, String)> = stmt
        .query_map(params![after as i64], |row| {
            Ok((row.get(0)?, row.get(1)?, row.get(2)?))
        })
        .ledger_context("Failed to read ledger")?
        .collect::<Result<Vec<_>, _>>()
        .ledger_context("Failed to collect ledger rows")?;

    let entries = rows
        .into_iter()
        .map(|(seq, payload, recorded_at)| {
            let seq = seq as u64;
            let event = serde_json::from_str(&payload)
                .map_err(|source| LedgerError::Decode { seq, source })?;
            let recorded_at =
                decode_timestamp(&recorded_at).ok_or_else(|| LedgerError::Timestamp {
                    seq,
                    value: recorded_at.clone(),
                })?;
            Ok(LedgerEntry {
                seq,
                recorded_at,
                event,
            })
        })
        .collect::<Result<Vec<_>, LedgerError>>()?;

    debug!(after, count = entries.len(), "Read ledger entries");
    Ok(entries)
}
