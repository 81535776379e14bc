//! Error types for the order ticket.

use crate::eligibility::DisableReason;
use desk_client::{ApiError, FormStoreError};
use thiserror::Error;

/// Ticket protocol errors.
#[derive(Debug, Error)]
pub enum TicketError {
    /// Submission eligibility chain blocked with the first failing gate.
    #[error("submission blocked: {0}")]
    Blocked(DisableReason),

    /// The live form no longer matches the preview snapshot; a new
    /// preview is required before confirming.
    #[error("order changed since preview; preview again before confirming")]
    SnapshotDrift,

    /// Confirm called without a preceding preview.
    #[error("no preview to confirm")]
    NoPreview,

    /// Live safety verification rejected the submission.
    #[error("safety verification blocked: {0}")]
    SafetyBlocked(String),

    #[error(transparent)]
    Api(#[from] ApiError),

    #[error(transparent)]
    FormStore(#[from] FormStoreError),
}

/// Result type alias for ticket operations.
pub type TicketResult<T> = std::result::Result<T, TicketError>;
