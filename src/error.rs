//! Error types for the store, sync and collision layers.
//!
//! Each variant maps to one failure class with its own propagation rule:
//! per-name probe failures are absorbed into a batch, batch-level
//! degradation is retried, and everything else is surfaced to the caller.

/// Result type for metasync operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Boxed source error carried by [`Error::Store`].
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Errors with structured context.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum Error {
    /// Local file unreadable or corrupt, or a remote pull/push failed.
    #[error("store error in {context}: {source}")]
    Store {
        context: String,
        #[source]
        source: BoxError,
    },

    /// Malformed record or argument. Never retried.
    #[error("validation failed: {0}")]
    Validation(String),

    /// `upsert_overwrite` found nothing to overwrite.
    #[error("no record to overwrite for owner '{owner_id}': {target}")]
    NotFound { owner_id: String, target: String },

    /// A different record already holds this name.
    #[error("name '{name}' is already taken by record {existing_id}")]
    DuplicateName { name: String, existing_id: String },

    /// A single name's lookup failed inside a probe batch.
    #[error("collision lookup failed for '{name}': {reason}")]
    CollisionProbe { name: String, reason: String },

    /// More than half of a probe batch failed.
    #[error("collision probe degraded: {failed} of {total} lookups failed")]
    SystemDegraded { failed: usize, total: usize },

    /// Probe retries were exhausted.
    #[error("collision probe gave up after {attempts} attempts: {last_error}")]
    RecoveryFailed { attempts: u32, last_error: String },
}

/// Coarse classification used by callers that branch on failure class.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Store,
    Validation,
    NotFound,
    DuplicateName,
    CollisionProbe,
    SystemDegraded,
    RecoveryFailed,
}

impl Error {
    /// Create a store error with context.
    pub fn store(context: impl Into<String>, source: impl Into<BoxError>) -> Self {
        Self::Store {
            context: context.into(),
            source: source.into(),
        }
    }

    /// Create a validation error.
    pub fn validation(reason: impl Into<String>) -> Self {
        Self::Validation(reason.into())
    }

    /// Create a not-found error for an overwrite target.
    pub fn not_found(owner_id: impl Into<String>, target: impl Into<String>) -> Self {
        Self::NotFound {
            owner_id: owner_id.into(),
            target: target.into(),
        }
    }

    /// Create a per-name probe failure.
    pub fn collision_probe(name: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::CollisionProbe {
            name: name.into(),
            reason: reason.into(),
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Store { .. } => ErrorKind::Store,
            Self::Validation(_) => ErrorKind::Validation,
            Self::NotFound { .. } => ErrorKind::NotFound,
            Self::DuplicateName { .. } => ErrorKind::DuplicateName,
            Self::CollisionProbe { .. } => ErrorKind::CollisionProbe,
            Self::SystemDegraded { .. } => ErrorKind::SystemDegraded,
            Self::RecoveryFailed { .. } => ErrorKind::RecoveryFailed,
        }
    }

    /// Whether the probe retry loop should try the batch again.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::SystemDegraded { .. })
    }
}

impl From<rusqlite::Error> for Error {
    fn from(err: rusqlite::Error) -> Self {
        Self::store("sqlite", err)
    }
}
