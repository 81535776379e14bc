//! Abstract collaborator contracts for the deskguard core.
//!
//! The safety core never talks to a concrete transport. It consumes:
//! - a pub/sub [`MessageBroker`] delivering decoded channel payloads,
//! - a [`KvStore`] for authoritative kill-switch/circuit-breaker snapshots,
//! - an async [`TradingApi`] with a distinguishable error taxonomy,
//! - a [`FormStore`] persisting per-tab form state and preferences.
//!
//! `mock` provides recording implementations of all four, shared by the
//! test suites of every downstream crate.

pub mod api;
pub mod broker;
pub mod channels;
pub mod error;
pub mod form;
pub mod mock;
pub mod types;

pub use api::{BoxFuture, TradingApi};
pub use broker::{ChannelCallback, KvStore, MessageBroker};
pub use error::{ApiError, ApiResult, BrokerError, BrokerResult, FormStoreError, KvError};
pub use form::{FormStore, OneClickPrefs, PersistedForm};
pub use types::{
    AccountInfo, CircuitBreakerStatus, KillSwitchStatus, ManualOrderRequest, MarketPrice,
    OpenOrder, OrderAck, OrderUpdate, Position,
};
