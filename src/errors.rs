//! Typed error hierarchy for the board store and its clients.
//!
//! Every failure is classified into one [`ErrorKind`] so the HTTP layer,
//! the CLI and the drag controller can react to it without string matching:
//! - `NotFound` and `InvalidArgument` are caller errors and never mutate state
//! - `TransactionFailure` is the only kind worth retrying
//! - `Internal` covers lock poisoning and worker failures

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Coarse classification of a [`BoardError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    NotFound,
    InvalidArgument,
    TransactionFailure,
    Internal,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::NotFound => "not_found",
            Self::InvalidArgument => "invalid_argument",
            Self::TransactionFailure => "transaction_failure",
            Self::Internal => "internal",
        }
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Errors from the position store, the HTTP client and the drag controller.
#[derive(Debug, Error)]
pub enum BoardError {
    #[error("Board {id} not found")]
    BoardNotFound { id: i64 },

    #[error("Column {id} not found")]
    ColumnNotFound { id: i64 },

    #[error("Task {id} not found")]
    TaskNotFound { id: i64 },

    #[error("Task {task_id} is not in column {column_id}")]
    TaskNotInColumn { task_id: i64, column_id: i64 },

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Index {index} out of bounds for column {column_id} (max {max})")]
    IndexOutOfBounds {
        column_id: i64,
        index: usize,
        max: usize,
    },

    #[error("Transaction failed: {0}")]
    Transaction(#[from] rusqlite::Error),

    #[error("Commit timed out after {attempts} attempt(s)")]
    CommitTimeout { attempts: u32 },

    #[error("{message}")]
    Remote { kind: ErrorKind, message: String },

    #[error("Database lock poisoned")]
    LockPoisoned,

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl BoardError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::BoardNotFound { .. }
            | Self::ColumnNotFound { .. }
            | Self::TaskNotFound { .. }
            | Self::TaskNotInColumn { .. } => ErrorKind::NotFound,
            Self::InvalidArgument(_) | Self::IndexOutOfBounds { .. } => ErrorKind::InvalidArgument,
            Self::Transaction(_) | Self::CommitTimeout { .. } => ErrorKind::TransactionFailure,
            Self::Remote { kind, .. } => *kind,
            Self::LockPoisoned | Self::Other(_) => ErrorKind::Internal,
        }
    }

    pub fn invalid(msg: impl Into<String>) -> Self {
        Self::InvalidArgument(msg.into())
    }

    /// Whether a commit that failed with this error may be attempted again.
    pub fn is_retryable(&self) -> bool {
        self.kind() == ErrorKind::TransactionFailure
    }
}

pub type Result<T, E = BoardError> = std::result::Result<T, E>;
