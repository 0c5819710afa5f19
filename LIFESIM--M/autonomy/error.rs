use thiserror::Error;
use uuid::Uuid;

/// Errors surfaced by the autonomy engine.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum AutonomyError {
    /// Internal signal asking the scheduler to drop the current request.
    /// Suppressed at the per-request boundary.
    #[error("autonomy exit requested: {0}")]
    Exit(String),
    /// The suspension token was dropped before the request was processed,
    /// typically because the scheduler was hard-stopped.
    #[error("decision request was cancelled before completion")]
    Cancelled,
    /// The actor backing a request no longer exists.
    #[error("actor {0} is no longer available")]
    ActorUnavailable(u64),
    /// A request with this id is already waiting in the queue.
    #[error("request {0} is already queued")]
    DuplicateRequest(Uuid),
    /// The scoring mode failed.
    #[error("scoring mode `{mode}` failed: {reason}")]
    Scoring {
        /// Mode name.
        mode: String,
        /// Failure description.
        reason: String,
    },
    /// Invalid tuning values.
    #[error("invalid autonomy tuning: {0}")]
    Config(String),
    /// Catch-all for internal issues.
    #[error("internal autonomy error: {0}")]
    Internal(String),
}

impl AutonomyError {
    /// Builds a scoring failure for `mode`.
    #[must_use]
    pub fn scoring(mode: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Scoring {
            mode: mode.into(),
            reason: reason.into(),
        }
    }

    /// Whether the error is the designated cancellation signal.
    #[must_use]
    pub const fn is_exit(&self) -> bool {
        matches!(self, Self::Exit(_))
    }
}
