//! Pub/sub broker and key-value store contracts.

use crate::error::{BrokerResult, KvError};
use crate::BoxFuture;
use std::sync::Arc;

/// Callback receiving a decoded channel payload.
///
/// Exactly one callback is registered per channel; the registry enforces
/// this and treats a second distinct callback as a contract violation.
pub type ChannelCallback = Arc<dyn Fn(serde_json::Value) + Send + Sync>;

/// Pub/sub broker contract.
///
/// `subscribe` is idempotent per distinct channel on the broker side; the
/// subscription registry still guarantees at most one in-flight subscribe
/// per channel so concurrent consumers never double-subscribe.
pub trait MessageBroker: Send + Sync {
    fn subscribe(&self, channel: String, callback: ChannelCallback) -> BoxFuture<'_, BrokerResult<()>>;

    fn unsubscribe(&self, channel: String) -> BoxFuture<'_, BrokerResult<()>>;
}

/// Persistent key-value store contract.
///
/// Used for authoritative kill-switch/circuit-breaker snapshot reads with
/// a short timeout: sub-second for live verification, a few seconds at
/// startup.
pub trait KvStore: Send + Sync {
    fn get(&self, key: String) -> BoxFuture<'_, Result<Option<Vec<u8>>, KvError>>;

    fn set(&self, key: String, value: Vec<u8>) -> BoxFuture<'_, Result<(), KvError>>;
}
