//! Error types for the registry and coordinator.

use desk_client::{BrokerError, KvError};
use thiserror::Error;

/// Subscription registry errors.
#[derive(Debug, Error)]
pub enum RegistryError {
    /// The registry has been disposed; no further acquisitions.
    #[error("subscription registry disposed")]
    Disposed,

    /// All interest was withdrawn while the subscribe was in flight.
    #[error("subscription to '{channel}' cancelled before completion")]
    Cancelled { channel: String },

    /// A second acquirer passed a different callback for a channel the
    /// registry already owns a callback for. One callback per channel.
    #[error("conflicting callback for channel '{channel}'")]
    CallbackMismatch { channel: String },

    #[error(transparent)]
    Broker(#[from] BrokerError),
}

pub type RegistryResult<T> = std::result::Result<T, RegistryError>;

/// Coordinator errors.
#[derive(Debug, Error)]
pub enum CoordinatorError {
    #[error(transparent)]
    Registry(#[from] RegistryError),

    #[error(transparent)]
    Kv(#[from] KvError),

    #[error("config error: {0}")]
    Config(String),
}

pub type CoordinatorResult<T> = std::result::Result<T, CoordinatorError>;
