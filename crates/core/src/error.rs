//! Workflow error model.

use thiserror::Error;

/// Result type used across the workflow engine.
pub type WorkflowResult<T> = Result<T, WorkflowError>;

/// Workflow-level error.
///
/// Every transition validates its precondition and fails fast with one of
/// these kinds rather than coercing state. None of them is retried
/// automatically; a failed transition leaves the offer's persisted state
/// unchanged (the finalization processor's degraded-success path is the one
/// documented exception, see `FinalizationPartialFailure`).
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum WorkflowError {
    /// The requested transition is not legal from the offer's current state.
    /// Surfaced verbatim to the caller.
    #[error("invalid state transition: {0}")]
    InvalidStateTransition(String),

    /// Submission attempted before every effective request item is covered
    /// by offer item quantities. Recoverable: the user adds more items.
    #[error("offer incomplete: {0}")]
    IncompleteOffer(String),

    /// A rejection was issued without a reason. Recoverable: re-prompt.
    #[error("a rejection reason is required")]
    MissingRejectionReason,

    /// A retry for this offer is already unresolved. The caller must wait
    /// and retry manually; the engine never auto-retries.
    #[error("retry already in progress for this offer")]
    RetryAlreadyInProgress,

    /// The purchase order was created but a downstream non-critical step
    /// failed. Degraded success: the offer remains finalized.
    #[error("finalization partially failed: {0}")]
    FinalizationPartialFailure(String),

    /// A value failed validation (e.g. malformed input, zero quantity).
    #[error("validation failed: {0}")]
    Validation(String),

    /// An identifier was invalid (e.g. parse failure).
    #[error("invalid identifier: {0}")]
    InvalidId(String),

    /// A requested aggregate or item was not found.
    #[error("not found")]
    NotFound,

    /// A conflicting concurrent or duplicate operation was detected.
    #[error("conflict: {0}")]
    Conflict(String),
}

impl WorkflowError {
    pub fn invalid_transition(msg: impl Into<String>) -> Self {
        Self::InvalidStateTransition(msg.into())
    }

    pub fn incomplete(msg: impl Into<String>) -> Self {
        Self::IncompleteOffer(msg.into())
    }

    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn invalid_id(msg: impl Into<String>) -> Self {
        Self::InvalidId(msg.into())
    }

    pub fn conflict(msg: impl Into<String>) -> Self {
        Self::Conflict(msg.into())
    }

    pub fn not_found() -> Self {
        Self::NotFound
    }
}
