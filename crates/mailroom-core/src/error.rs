//! Error types for the core library.

use thiserror::Error;

use crate::validation::ValidationError;

/// Errors that can occur in engine operations.
#[derive(Debug, Error)]
pub enum Error {
    /// Request content failed validation. Nothing was written.
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    /// The resource exists but belongs to another profile.
    #[error("Permission denied: {0}")]
    PermissionDenied(String),

    /// A folder, draft, message, thread or profile id did not resolve.
    #[error("Not found: {0}")]
    NotFound(String),

    /// A folder name or profile email is already taken or reserved.
    #[error("Already exists: {0}")]
    AlreadyExists(String),

    /// Attempt to rename or delete a system folder.
    #[error("Protected: {0}")]
    Protected(String),

    /// Database operation failed.
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Serialization/deserialization error.
    #[error("Serialization error: {0}")]
    Serde(#[from] serde_json::Error),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Configuration error.
    #[error("Configuration error: {0}")]
    Config(String),

    /// Storage returned something the engine cannot interpret.
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Caller-visible classification of an [`Error`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Bad input, fixable by the caller.
    Validation,
    /// Ownership check failed.
    Permission,
    /// Id did not resolve.
    NotFound,
    /// Name already exists or is reserved.
    Conflict,
    /// System resource cannot be modified.
    Protected,
    /// Storage or other server-side failure.
    Internal,
}

impl Error {
    /// Classify this error for an outer transport.
    #[must_use]
    pub const fn kind(&self) -> ErrorKind {
        match self {
            Self::Validation(_) => ErrorKind::Validation,
            Self::PermissionDenied(_) => ErrorKind::Permission,
            Self::NotFound(_) => ErrorKind::NotFound,
            Self::AlreadyExists(_) => ErrorKind::Conflict,
            Self::Protected(_) => ErrorKind::Protected,
            Self::Database(_)
            | Self::Serde(_)
            | Self::Io(_)
            | Self::Config(_)
            | Self::Internal(_) => ErrorKind::Internal,
        }
    }

    /// Returns true if this error should be reported as a generic internal error.
    #[must_use]
    pub const fn is_internal(&self) -> bool {
        matches!(self.kind(), ErrorKind::Internal)
    }

    pub(crate) fn not_found(what: &str, id: impl std::fmt::Display) -> Self {
        Self::NotFound(format!("{what} {id}"))
    }
}

/// Result type alias using our Error type.
pub type Result<T> = std::result::Result<T, Error>;
