use std::io;
use std::path::PathBuf;

use rusqlite::ErrorCode;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum LedgerError {
    #[error("ledger not found at {}", .0.display())]
    NotFound(PathBuf),
    #[error("ledger is locked by another writer")]
    Busy,
    #[error("failed to encode event: {0}")]
    Encode(#[source] serde_json::Error),
    #[error("event {seq} cannot be decoded: {source}")]
    Decode {
        seq: u64,
        #[source]
        source: serde_json::Error,
    },
    #[error("event {seq} has an unreadable timestamp {value:?}")]
    Timestamp { seq: u64, value: String },
    #[error("{context}: {source}")]
    Io {
        context: String,
        #[source]
        source: io::Error,
    },
    #[error("{context}: {source}")]
    Sqlite {
        context: &'static str,
        #[source]
        source: rusqlite::Error,
    },
}

impl LedgerError {
    /// True when the ledger content itself is unreadable rather than the store unavailable.
    #[must_use]
    pub fn is_corruption(&self) -> bool {
        matches!(self, Self::Decode { .. } | Self::Timestamp { .. })
    }

    pub(crate) fn io(context: impl Into<String>, source: io::Error) -> Self {
        Self::Io {
            context: context.into(),
            source,
        }
    }
}

/// Attach context to a rusqlite failure, classifying lock contention as [`LedgerError::Busy`].
pub(crate) trait SqliteContext<T> {
    fn ledger_context(self, context: &'static str) -> Result<T, LedgerError>;
}

impl<T> SqliteContext<T> for Result<T, rusqlite::Error> {
    fn ledger_context(self, context: &'static str) -> Result<T, LedgerError> {
        self.map_err(|source| match source.sqlite_error_code() {
            Some(ErrorCode::DatabaseBusy | ErrorCode::DatabaseLocked) => {
                tracing::warn!(context, "Ledger busy: another writer holds the lock");
                LedgerError::Busy
            }
            _ => LedgerError::Sqlite { context, source },
        })
    }
}
