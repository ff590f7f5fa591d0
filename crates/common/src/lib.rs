//! Error taxonomy, configuration, and ambient file/checksum helpers shared
//! by every subsystem crate.

pub mod crc;
pub mod endian;
pub mod file;

use std::io;
use std::panic::Location;
use std::path::PathBuf;
use thiserror::Error;
use types::{ErrorCode, PageNum, TxnId};

/// Canonical error type shared across every subsystem.
///
/// Carries the spec's exhaustive `(code, source location, formatted
/// message)` triple (§7): `code` lets callers branch on the taxonomy
/// (e.g. retry only on `Busy`/`Full`), `message` is a human-readable detail,
/// and `location` is the call site that raised the error, captured via
/// `#[track_caller]`.
#[derive(Debug, Error)]
#[error("{code}: {message}")]
pub struct DbError {
    pub code: ErrorCode,
    pub message: String,
    pub location: Option<&'static Location<'static>>,
}

impl DbError {
    #[track_caller]
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            location: Some(Location::caller()),
        }
    }

    #[track_caller]
    pub fn generic(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::Generic, message)
    }

    #[track_caller]
    pub fn busy(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::Busy, message)
    }

    #[track_caller]
    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::NotFound, message)
    }

    #[track_caller]
    pub fn exists(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::Exists, message)
    }

    #[track_caller]
    pub fn corrupt(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::Corrupt, message)
    }

    #[track_caller]
    pub fn full(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::Full, message)
    }

    #[track_caller]
    pub fn io_err(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::IoErr, message)
    }

    pub fn code(&self) -> ErrorCode {
        self.code
    }
}

impl From<io::Error> for DbError {
    #[track_caller]
    fn from(e: io::Error) -> Self {
        DbError::new(ErrorCode::IoErr, e.to_string())
    }
}

/// Result alias that carries a `DbError`.
pub type DbResult<T> = Result<T, DbError>;

/// The write-path hook a B+Tree calls on every page mutation (§4.3
/// "Transaction integration"): `btree` depends on this trait rather than on
/// the `txn` crate directly, so that `txn` (which ties `pager`, `cache`, and
/// `wal` together) can depend on `btree`-adjacent crates without a cycle —
/// `txn::Transaction` is the sole implementor.
pub trait TxnHandle {
    /// The id of the active transaction.
    fn txn_id(&self) -> TxnId;

    /// Record `page` in the transaction's deduplicated dirty-page set.
    /// Returns `FULL` once the bounded set (64 entries, §3.7) is exceeded.
    fn add_dirty_page(&mut self, page: PageNum) -> DbResult<()>;
}

/// Runtime configuration for embedding the engine: `cache::Cache::open`
/// takes one of these and opens the pager and cache together (§6.2
/// `Database::open`).
///
/// Page size is deliberately not configurable: spec.md's Non-goals fix it at
/// 4096 bytes, unlike the grounding repo's executor-facing `Config` which
/// lets callers pick a page size.
///
/// # Example
/// ```
/// use common::Config;
///
/// let config = Config::builder().cache_capacity(64).build();
/// assert_eq!(config.cache_capacity, 64);
/// ```
#[derive(Clone, Debug, bon::Builder)]
pub struct Config {
    /// Path to the single host file.
    #[builder(default = PathBuf::from("./amidb.db"))]
    pub path: PathBuf,
    /// Number of pages the page cache keeps resident.
    #[builder(default = 128)]
    pub cache_capacity: usize,
    /// Open the file read-only (disables recovery and all mutation).
    #[builder(default = false)]
    pub read_only: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            path: PathBuf::from("./amidb.db"),
            cache_capacity: 128,
            read_only: false,
        }
    }
}

#[cfg(test)]
mod tests;
