//! Error taxonomy for collaborator calls.
//!
//! The trading API distinguishes server-side failures (5xx), caller
//! failures (4xx), and unreachable transport. Safety policy decides what
//! each class means; the errors themselves carry no policy.

use thiserror::Error;

/// Trading API error classes.
#[derive(Debug, Clone, Error)]
pub enum ApiError {
    /// 5xx-class server error.
    #[error("server error {status}: {message}")]
    Server { status: u16, message: String },

    /// 4xx-class client error.
    #[error("client error {status}: {message}")]
    Client { status: u16, message: String },

    /// Network-unreachable or timed-out transport.
    #[error("unreachable: {0}")]
    Unreachable(String),
}

impl ApiError {
    /// Transient failures may succeed on retry; client errors will not.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Server { .. } | Self::Unreachable(_))
    }
}

/// Result type alias for trading API calls.
pub type ApiResult<T> = std::result::Result<T, ApiError>;

/// Pub/sub broker errors.
#[derive(Debug, Clone, Error)]
pub enum BrokerError {
    #[error("subscribe failed for channel {channel}: {message}")]
    SubscribeFailed { channel: String, message: String },

    #[error("unsubscribe failed for channel {channel}: {message}")]
    UnsubscribeFailed { channel: String, message: String },
}

/// Result type alias for broker calls.
pub type BrokerResult<T> = std::result::Result<T, BrokerError>;

/// Key-value store errors.
///
/// Read deadlines are enforced by the caller, so the store itself only
/// reports backend failures.
#[derive(Debug, Clone, Error)]
pub enum KvError {
    #[error("kv backend error: {0}")]
    Backend(String),
}

/// Persisted form-state store errors.
#[derive(Debug, Clone, Error)]
pub enum FormStoreError {
    #[error("form store backend error: {0}")]
    Backend(String),

    #[error("persisted form state corrupt: {0}")]
    Corrupt(String),
}
