//! Shared error taxonomy.
//!
//! Crate-local errors (`TailerError`, `FirewallError`, ...) wrap into these
//! where the boundary is crossed; this module only carries the categories
//! genuinely shared across crates (config loading, store access).

use thiserror::Error;

/// Unrecognized log line. Counted and discarded by the tailer; never fatal.
#[derive(Debug, Error)]
#[error("unparsable log line: {0}")]
pub struct ParseError(pub String);

/// Malformed address, out-of-range port, unknown rule category: surfaced to
/// the caller, no side effects performed.
#[derive(Debug, Error)]
#[error("validation failed: {0}")]
pub struct ValidationError(pub String);

#[derive(Debug, Error)]
pub enum CommonError {
    #[error("io error: {0}")]
    Io(#[source] std::io::Error),

    /// Unparsable YAML or unknown backend. Fatal at startup only.
    #[error("misconfiguration: {0}")]
    Misconfiguration(#[source] serde_yaml::Error),

    #[error("store error: {0}")]
    Store(#[from] StoreError),

    #[error(transparent)]
    Validation(#[from] ValidationError),
}

/// Store-layer errors. A connection failure at startup is fatal
/// (`Misconfiguration`-adjacent); a query failure mid-run is surfaced to the
/// caller and logged, never panics.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("inconsistent state: {0}")]
    StateInconsistency(String),

    #[error("record not found: {0}")]
    NotFound(String),
}
