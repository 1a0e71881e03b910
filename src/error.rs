//! Error types for the Teaclave client.
//!
//! Every platform call surfaces its failure immediately as an [`Error`].
//! The variants follow the protocol's error taxonomy: authentication,
//! connection, function registration, task creation, invocation, the
//! transient "result not ready" condition, and terminal task failure.
//! No retry happens inside the client; callers decide using
//! [`Error::is_retryable`].

use thiserror::Error;

use crate::types::task::TaskStatus;

/// Errors that can occur while talking to the platform.
#[derive(Error, Debug)]
pub enum Error {
    /// Bad credentials, malformed token, or an unauthorized caller.
    #[error("Authentication failed: {0}")]
    Auth(String),

    /// The account being registered already exists.
    ///
    /// Only surfaced by callers that convert
    /// [`UserRegistration::AlreadyExists`](crate::types::UserRegistration)
    /// into an error themselves.
    #[error("User already exists: {0}")]
    AlreadyExists(String),

    /// Endpoint unreachable, TLS/attestation material rejected, or the
    /// session is already closed.
    #[error("Connection error: {0}")]
    Connection(String),

    /// Malformed or duplicate function, or the caller lacks privilege.
    #[error("Function registration failed: {0}")]
    Registration(String),

    /// Unknown or unauthorized function, or arguments rejected by the
    /// function's argument spec.
    #[error("Task creation failed: {0}")]
    TaskCreation(String),

    /// Unknown task, invalid task state, or unauthorized caller.
    #[error("Task invocation failed: {0}")]
    Invocation(String),

    /// The task has not reached a terminal state yet.
    #[error("Result of task {task_id} is not ready (status: {status})")]
    ResultNotReady {
        /// The task being queried
        task_id: String,
        /// The task's current, non-terminal status
        status: TaskStatus,
    },

    /// The task ran and failed, or was canceled.
    #[error("Task {task_id} failed: {reason}")]
    Task {
        /// The failed task
        task_id: String,
        /// Failure reason reported by the platform
        reason: String,
    },

    /// A poll or request exceeded its deadline.
    #[error("Operation timed out: {0}")]
    Timeout(String),

    /// The caller cancelled a pending operation.
    #[error("Operation cancelled: {0}")]
    Cancelled(String),

    /// The platform answered with a response this client cannot interpret.
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// Invalid client configuration.
    #[error("Configuration error: {0}")]
    Config(String),

    /// I/O failure while reading local configuration material.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON encoding or decoding failure.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl Error {
    /// Returns `true` when retrying the same call later may succeed.
    ///
    /// Only [`Error::ResultNotReady`] is retryable.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::ResultNotReady { .. })
    }

    /// Returns `true` when the task behind this error can never produce a
    /// result.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Task { .. })
    }
}

impl From<toml::de::Error> for Error {
    fn from(err: toml::de::Error) -> Self {
        Self::Config(format!("TOML parse error: {}", err))
    }
}

/// Result type for client operations.
pub type Result<T> = std::result::Result<T, Error>;
