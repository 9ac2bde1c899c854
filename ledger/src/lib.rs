//! Durable event storage for vetted proofs.
//!
//! # Architecture
//!
//! ```text
//! <proof-dir>/ledger.db   (SQLite, WAL, owner-only permissions)
//! └── events              seq | kind | payload (JSON Event) | recorded_at
//!     ├── append-only     UPDATE/DELETE rejected by triggers
//!     └── single writer   BEGIN IMMEDIATE + busy timeout
//! ```
//!
//! The ledger knows nothing about proof rules; it stores and returns events
//! in order. Validation happens above it, inside [`Ledger::transact`].

mod error;
mod ledger;
mod sqlite_util;

pub use error::LedgerError;
pub use ledger::{Committed, Ledger, LedgerEntry, LedgerOptions, LedgerReader, Seq};
