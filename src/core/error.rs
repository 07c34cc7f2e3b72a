use super::types::Target;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum RelError {
    #[error("Validation gap: {0}")]
    ValidationGap(String),

    #[error("Resolution failure for {} target(s): {message}", .failed.len())]
    ResolutionFailure { failed: Vec<Target>, message: String },

    #[error("Stale join conflict: {0}")]
    StaleJoinConflict(String),

    #[error("Store error: {0}")]
    Store(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Invalid state: {0}")]
    InvalidState(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Lock error: {0}")]
    LockError(String),
}

impl RelError {
    /// Whether the edit session should offer the user to retry the whole save.
    pub fn is_retryable(&self) -> bool {
        matches!(self, RelError::ResolutionFailure { .. } | RelError::Store(_))
    }
}

pub type Result<T> = std::result::Result<T, RelError>;

impl<T> From<std::sync::PoisonError<T>> for RelError {
    fn from(err: std::sync::PoisonError<T>) -> Self {
        Self::LockError(err.to_string())
    }
}

impl From<serde_json::Error> for RelError {
    fn from(err: serde_json::Error) -> Self {
        Self::Config(err.to_string())
    }
}
