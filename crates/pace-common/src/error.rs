//! Error types for the looppace workspace.
//!
//! Sequencing refusals (starting an already-running recorder, registering a
//! channel mid-run) are reported as boolean returns by the runtime, not as
//! errors. `PaceError` covers the genuinely fallible paths: invalid
//! parameters, I/O on the log destination, and worker thread management.

use thiserror::Error;

/// Top-level error type for pacing and recording operations.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum PaceError {
    /// Configuration loading or validation failed.
    #[error("configuration error: {0}")]
    Config(String),

    /// Requested loop frequency cannot produce a usable tick interval.
    #[error("invalid frequency: {hz} Hz (must be positive and finite)")]
    InvalidFrequency {
        /// The rejected frequency in Hertz.
        hz: f64,
    },

    /// I/O failure on the recording destination.
    #[error("I/O error: {0}")]
    Io(String),

    /// Background worker thread could not be spawned or managed.
    #[error("worker thread error: {0}")]
    Thread(String),
}

/// Convenience alias for results with [`PaceError`].
pub type PaceResult<T> = Result<T, PaceError>;
