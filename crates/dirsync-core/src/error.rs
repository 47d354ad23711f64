//! Error types shared by the sync engine.
//!
//! [`StoreError`] covers the persistence side. [`SyncFailure`] is the value a
//! failed provider pass produces and what ends up on the provider record.

use std::fmt;

/// Errors that can occur during storage operations.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// The requested record was not found.
    #[error("Not found: {entity}/{id}")]
    NotFound {
        /// The kind of record that was not found.
        entity: String,
        /// The ID of the record that was not found.
        id: String,
    },

    /// A uniqueness or foreign key constraint was violated.
    #[error("Constraint violation: {message}")]
    Constraint {
        /// Description of the violated constraint.
        message: String,
    },

    /// An error occurred while beginning, committing or rolling back a transaction.
    #[error("Transaction error: {message}")]
    Transaction {
        /// Description of the transaction error.
        message: String,
    },

    /// Failed to connect to the storage backend.
    #[error("Connection error: {message}")]
    Connection {
        /// Description of the connection error.
        message: String,
    },

    /// An internal storage error occurred.
    #[error("Internal error: {message}")]
    Internal {
        /// Description of the internal error.
        message: String,
    },
}

impl StoreError {
    /// Creates a new `NotFound` error.
    #[must_use]
    pub fn not_found(entity: impl Into<String>, id: impl Into<String>) -> Self {
        Self::NotFound {
            entity: entity.into(),
            id: id.into(),
        }
    }

    /// Creates a new `Constraint` error.
    #[must_use]
    pub fn constraint(message: impl Into<String>) -> Self {
        Self::Constraint {
            message: message.into(),
        }
    }

    /// Creates a new `Transaction` error.
    #[must_use]
    pub fn transaction(message: impl Into<String>) -> Self {
        Self::Transaction {
            message: message.into(),
        }
    }

    /// Creates a new `Connection` error.
    #[must_use]
    pub fn connection(message: impl Into<String>) -> Self {
        Self::Connection {
            message: message.into(),
        }
    }

    /// Creates a new `Internal` error.
    #[must_use]
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// Returns `true` if this is a not found error.
    #[must_use]
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }

    /// Returns `true` if this is a constraint violation.
    #[must_use]
    pub fn is_constraint(&self) -> bool {
        matches!(self, Self::Constraint { .. })
    }

    /// Returns the error category for logging.
    #[must_use]
    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::NotFound { .. } => ErrorCategory::NotFound,
            Self::Constraint { .. } => ErrorCategory::Conflict,
            Self::Transaction { .. } => ErrorCategory::Transaction,
            Self::Connection { .. } => ErrorCategory::Infrastructure,
            Self::Internal { .. } => ErrorCategory::Internal,
        }
    }
}

/// Categories of storage errors for logging.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCategory {
    /// Record not found.
    NotFound,
    /// Constraint conflict.
    Conflict,
    /// Transaction-related error.
    Transaction,
    /// Infrastructure/connection error.
    Infrastructure,
    /// Internal error.
    Internal,
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotFound => write!(f, "not_found"),
            Self::Conflict => write!(f, "conflict"),
            Self::Transaction => write!(f, "transaction"),
            Self::Infrastructure => write!(f, "infrastructure"),
            Self::Internal => write!(f, "internal"),
        }
    }
}

/// Whether a failure is expected to clear up on its own.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FailureKind {
    /// Network errors, 5xx, malformed bodies, aborted transactions.
    /// The next scheduled tick retries.
    Transient,
    /// 4xx, invalid credentials, missing remote objects, bad adapter config.
    /// Needs an administrator to fix something.
    Client,
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Transient => write!(f, "transient"),
            Self::Client => write!(f, "client"),
        }
    }
}

/// Why a provider pass failed.
///
/// Adapters return this from [`crate::DirectoryAdapter::gather`]; the
/// orchestrator also builds one from apply errors. `reason` is a short
/// machine-friendly tag, `message` is shown to administrators.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{reason}: {message}")]
pub struct SyncFailure {
    /// Transient or client error.
    pub kind: FailureKind,
    /// Short reason, e.g. `http_404` or `retry_later`.
    pub reason: String,
    /// Human-readable message.
    pub message: String,
}

impl SyncFailure {
    /// Creates a transient failure.
    #[must_use]
    pub fn transient(reason: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            kind: FailureKind::Transient,
            reason: reason.into(),
            message: message.into(),
        }
    }

    /// Creates a client/configuration failure.
    #[must_use]
    pub fn client(reason: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            kind: FailureKind::Client,
            reason: reason.into(),
            message: message.into(),
        }
    }

    /// Returns `true` if the next tick may succeed without intervention.
    #[must_use]
    pub fn is_transient(&self) -> bool {
        self.kind == FailureKind::Transient
    }
}

impl From<StoreError> for SyncFailure {
    fn from(err: StoreError) -> Self {
        Self::transient(format!("store_{}", err.category()), err.to_string())
    }
}
