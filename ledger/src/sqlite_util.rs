//! SQLite file setup and column encoding for the ledger.
//!
//! Files are created owner-only on Unix; elsewhere permissions are left to
//! the platform. Timestamps in the `recorded_at` column are RFC 3339 text.

use std::fs::{self, OpenOptions};
use std::path::{Path, PathBuf};

use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::Connection;

use crate::error::{LedgerError, SqliteContext};

/// Open the database at `path`, creating it and its directory owner-only first.
pub(crate) fn open_secure_db(path: &Path) -> Result<Connection, LedgerError> {
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        ensure_secure_dir(parent)?;
    }
    ensure_secure_db_files(path)?;

    Connection::open(path).ledger_context("Failed to open ledger database")
}

/// Create `path` (and parents) if missing, then restrict it to its owner.
///
/// A directory owned by someone else is left as it is.
fn ensure_secure_dir(path: &Path) -> Result<(), LedgerError> {
    fs::create_dir_all(path).map_err(|e| {
        LedgerError::io(format!("Failed to create directory: {}", path.display()), e)
    })?;
    if owned_by_us(path)? {
        restrict(path, 0o700)?;
    }
    Ok(())
}

/// Create the database file if missing and restrict it and its WAL/SHM sidecars to the owner.
fn ensure_secure_db_files(path: &Path) -> Result<(), LedgerError> {
    if !path.exists() {
        let mut options = OpenOptions::new();
        options.create(true).truncate(false).read(true).write(true);
        #[cfg(unix)]
        {
            use std::os::unix::fs::OpenOptionsExt;
            options.mode(0o600);
        }
        let _file = options.open(path).map_err(|e| {
            LedgerError::io(
                format!("Failed to create database file: {}", path.display()),
                e,
            )
        })?;
    }
    restrict(path, 0o600)?;
    for suffix in ["-wal", "-shm"] {
        let sidecar = sqlite_sidecar_path(path, suffix);
        if sidecar.is_file() {
            // Sidecars come and go with connections.
            let _ = restrict(&sidecar, 0o600);
        }
    }
    Ok(())
}

#[cfg(unix)]
fn owned_by_us(path: &Path) -> Result<bool, LedgerError> {
    use std::os::unix::fs::MetadataExt;

    let metadata = fs::metadata(path).map_err(|e| {
        LedgerError::io(format!("Failed to read metadata: {}", path.display()), e)
    })?;
    // SAFETY: getuid has no preconditions and cannot fail.
    Ok(metadata.uid() == unsafe { libc::getuid() })
}

#[cfg(not(unix))]
fn owned_by_us(_path: &Path) -> Result<bool, LedgerError> {
    Ok(true)
}

/// Set `mode` on `path` unless it is already at least that strict.
#[cfg(unix)]
fn restrict(path: &Path, mode: u32) -> Result<(), LedgerError> {
    use std::os::unix::fs::PermissionsExt;

    let fail = |e| LedgerError::io(format!("Failed to set permissions: {}", path.display()), e);
    let current = fs::metadata(path).map_err(fail)?.permissions().mode() & 0o777;
    if current & !mode != 0 {
        fs::set_permissions(path, fs::Permissions::from_mode(mode)).map_err(fail)?;
    }
    Ok(())
}

#[cfg(not(unix))]
fn restrict(_path: &Path, _mode: u32) -> Result<(), LedgerError> {
    Ok(())
}

fn sqlite_sidecar_path(path: &Path, suffix: &str) -> PathBuf {
    let mut name = path.as_os_str().to_owned();
    name.push(suffix);
    PathBuf::from(name)
}

/// Encode a timestamp as RFC 3339 with millisecond precision (`...T12:00:00.000Z`).
pub(crate) fn encode_timestamp(time: DateTime<Utc>) -> String {
    time.to_rfc3339_opts(SecondsFormat::Millis, true)
}

pub(crate) fn decode_timestamp(value: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .ok()
        .map(|time| time.with_timezone(&Utc))
}
