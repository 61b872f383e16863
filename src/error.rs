use thiserror::Error;

/// Errors surfaced by the scoring core to its callers.
///
/// Nothing in the core panics on a bad row; every store failure ends up as
/// one of these and the caller decides what to show.
#[derive(Debug, Error)]
pub enum ScoreError {
    #[error("{kind} '{id}' not found")]
    NotFound { kind: &'static str, id: String },

    #[error("store error: {0}")]
    Store(String),

    /// Only produced by backends doing optimistic concurrency.
    #[allow(dead_code)]
    #[error("conflicting update: {0}")]
    Conflict(String),
}

impl ScoreError {
    pub fn not_found(kind: &'static str, id: &str) -> Self {
        Self::NotFound {
            kind,
            id: id.to_string(),
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }
}

impl From<rusqlite::Error> for ScoreError {
    fn from(e: rusqlite::Error) -> Self {
        Self::Store(e.to_string())
    }
}

pub type ScoreResult<T> = Result<T, ScoreError>;
