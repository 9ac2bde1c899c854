//! Proof-state engine for vetted.
//!
//! A proof is an append-only ledger of [`Event`](vetted_types::Event)s.
//! Everything else in this crate is derived from or guards that ledger:
//!
//! - [`State`] folds the ledger into the proof tree, challenges, and definitions.
//! - [`lease`] grants and checks time-bounded claims on nodes.
//! - [`gate`] decides whether a creation, acceptance, refutation, challenge,
//!   or definition may be appended.
//! - [`bulk`] runs a batch of creations or acceptances all or nothing.
//! - [`ProofService`] ties them together behind the operations callers use.

pub mod bulk;
mod cache;
mod clock;
mod error;
pub mod gate;
pub mod lease;
mod service;
mod state;

pub use bulk::Created;
pub use clock::{Clock, ManualClock, SystemClock};
pub use error::{BlockingChallenge, ErrorKind, ProofError};
pub use gate::{AcceptOptions, Acceptance, DepthWarning, NodeSpec};
pub use service::{ChallengeSpec, LEDGER_FILE, ProofService};
pub use state::{
    Challenge, ChallengeCounts, Definition, Lease, Node, ReplayError, State, Summary, Violation,
};
