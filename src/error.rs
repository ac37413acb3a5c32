//! Error types for tunnel-rules.

use thiserror::Error;

/// Main error type for tunnel-rules operations.
///
/// Individual command failures are not errors: they are reported as
/// [`RunStatus`](crate::execution::RunStatus) values inside a
/// [`TransactionOutcome`](crate::execution::TransactionOutcome).
#[derive(Error, Debug)]
pub enum RuleError {
    /// The background thread for a transaction could not be created.
    #[error("failed to launch transaction thread: {0}")]
    ThreadLaunch(#[source] std::io::Error),

    /// Invalid task state transition attempted.
    #[error("invalid state transition from {from:?} to {to:?}")]
    InvalidStateTransition {
        from: crate::transaction::TaskState,
        to: crate::transaction::TaskState,
    },

    /// Internal lock was poisoned.
    #[error("internal lock poisoned")]
    LockPoisoned,

    /// The transaction thread finished without publishing an outcome.
    #[error("transaction channel closed")]
    ChannelClosed,

    /// Configuration error.
    #[error("configuration error: {0}")]
    Config(String),

    /// Invalid or incomplete command line.
    #[error("{0}")]
    Usage(String),
}

/// Convenience Result type for tunnel-rules operations.
pub type Result<T> = std::result::Result<T, RuleError>;
