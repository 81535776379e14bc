//! Dashboard coordinator.
//!
//! Owns the subscription registry, seeds safety state from key-value
//! snapshots, keeps it current from broker pushes, and fans updates out
//! to registered consumers. Also drives symbol selection for the price
//! channel and triggers full resubscription when the connection recovers
//! from a true disconnect.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::Notify;
use tracing::{debug, info, warn};

use desk_client::{
    channels, ChannelCallback, KvStore, MarketPrice, MessageBroker, OrderUpdate, Position,
};
use desk_core::safety::{classify_connection, is_truly_disconnected};
use desk_core::{SafetyState, SignalState};

use crate::config::CoordinatorConfig;
use crate::error::CoordinatorResult;
use crate::registry::SubscriptionRegistry;
use crate::tasks::SupervisedTasks;

pub type SafetyListener = Arc<dyn Fn(SafetyState) + Send + Sync>;
pub type PriceListener = Arc<dyn Fn(MarketPrice) + Send + Sync>;
pub type PositionListener = Arc<dyn Fn(Vec<Position>) + Send + Sync>;
pub type OrderUpdateListener = Arc<dyn Fn(OrderUpdate) + Send + Sync>;

/// Extract the "state" string from a channel payload or kv snapshot.
///
/// Anything missing or malformed maps to `None`, which downstream
/// classification treats as unknown (and therefore unsafe).
fn parse_state(payload: &serde_json::Value) -> Option<String> {
    payload
        .get("state")
        .and_then(serde_json::Value::as_str)
        .map(str::to_string)
}

struct Shared {
    safety: SafetyState,
    safety_listener: Option<SafetyListener>,
    price_listener: Option<PriceListener>,
    position_listener: Option<PositionListener>,
    order_listener: Option<OrderUpdateListener>,
    selected_symbol: Option<String>,
    /// One callback per price channel so re-selection reuses the same Arc.
    price_callbacks: HashMap<String, ChannelCallback>,
}

pub struct Coordinator {
    registry: Arc<SubscriptionRegistry>,
    kv: Arc<dyn KvStore>,
    config: CoordinatorConfig,
    shared: Arc<Mutex<Shared>>,
    /// Monotonic symbol-selection version; stale async completions of a
    /// superseded selection release their own interest.
    selection_version: AtomicU64,
    reconnected: Arc<Notify>,
}

impl Coordinator {
    pub fn new(
        broker: Arc<dyn MessageBroker>,
        kv: Arc<dyn KvStore>,
        config: CoordinatorConfig,
    ) -> Self {
        Self {
            registry: Arc::new(SubscriptionRegistry::new(broker)),
            kv,
            config,
            shared: Arc::new(Mutex::new(Shared {
                safety: SafetyState::default(),
                safety_listener: None,
                price_listener: None,
                position_listener: None,
                order_listener: None,
                selected_symbol: None,
                price_callbacks: HashMap::new(),
            })),
            selection_version: AtomicU64::new(0),
            reconnected: Arc::new(Notify::new()),
        }
    }

    pub fn registry(&self) -> Arc<SubscriptionRegistry> {
        self.registry.clone()
    }

    pub fn safety_state(&self) -> SafetyState {
        self.shared.lock().safety.clone()
    }

    pub fn set_safety_listener(&self, listener: SafetyListener) {
        self.shared.lock().safety_listener = Some(listener);
    }

    pub fn set_price_listener(&self, listener: PriceListener) {
        self.shared.lock().price_listener = Some(listener);
    }

    pub fn set_position_listener(&self, listener: PositionListener) {
        self.shared.lock().position_listener = Some(listener);
    }

    pub fn set_order_listener(&self, listener: OrderUpdateListener) {
        self.shared.lock().order_listener = Some(listener);
    }

    /// Seed safety state, subscribe the core channels, and spawn the
    /// retry and resubscribe loops.
    pub async fn start(&self, tasks: &SupervisedTasks) -> CoordinatorResult<()> {
        self.seed_safety_snapshots().await;

        // A failed subscribe keeps its interest registered; the retry loop
        // below converges it, so startup proceeds past failures.
        let core: [(&str, ChannelCallback); 4] = [
            (channels::CONNECTION, self.connection_callback()),
            (
                channels::KILL_SWITCH,
                self.safety_field_callback(SafetyField::KillSwitch),
            ),
            (
                channels::CIRCUIT_BREAKER,
                self.safety_field_callback(SafetyField::CircuitBreaker),
            ),
            (channels::POSITIONS, self.positions_callback()),
        ];
        for (channel, callback) in core {
            if let Err(err) = self.registry.acquire(channel, callback).await {
                warn!(%channel, error = %err, "core channel subscribe failed at startup");
            }
        }

        // Order updates are per-user-scoped; without a user id there is
        // no channel to subscribe.
        if let Some(user) = &self.config.user {
            let channel = channels::order_updates(user);
            if let Err(err) = self
                .registry
                .acquire(&channel, self.order_update_callback())
                .await
            {
                warn!(%channel, error = %err, "order-update subscribe failed at startup");
            }
        }

        let retry_interval = Duration::from_millis(self.config.retry_interval_ms);
        let registry = self.registry.clone();
        let token = tasks.cancel_token();
        tasks.spawn("subscription-retry", async move {
            loop {
                tokio::select! {
                    _ = token.cancelled() => break,
                    _ = tokio::time::sleep(retry_interval) => {
                        registry.retry_failed().await;
                    }
                }
            }
        });

        let registry = self.registry.clone();
        let reconnected = self.reconnected.clone();
        let token = tasks.cancel_token();
        tasks.spawn("resubscribe-on-reconnect", async move {
            loop {
                tokio::select! {
                    _ = token.cancelled() => break,
                    _ = reconnected.notified() => {
                        registry.resubscribe_all().await;
                    }
                }
            }
        });

        info!("coordinator started");
        Ok(())
    }

    /// Switch the price subscription to `symbol` (or none).
    ///
    /// A selection that is superseded while its subscribe is still in
    /// flight drops its own interest instead of clobbering the winner.
    pub async fn select_symbol(&self, symbol: Option<String>) -> CoordinatorResult<()> {
        let version = self.selection_version.fetch_add(1, Ordering::SeqCst) + 1;

        let (previous, callback) = {
            let mut shared = self.shared.lock();
            let previous = std::mem::replace(&mut shared.selected_symbol, symbol.clone());
            let callback = symbol.as_deref().map(|sym| {
                let channel = channels::price(sym);
                shared
                    .price_callbacks
                    .entry(channel)
                    .or_insert_with(|| self.price_callback())
                    .clone()
            });
            (previous, callback)
        };

        if let Some(prev) = previous {
            let channel = channels::price(&prev);
            self.registry.release(&channel).await?;
            let mut shared = self.shared.lock();
            if self.registry.refcount(&channel) == 0 {
                shared.price_callbacks.remove(&channel);
            }
        }

        let (Some(symbol), Some(callback)) = (symbol, callback) else {
            return Ok(());
        };
        let channel = channels::price(&symbol);
        let result = self.registry.acquire(&channel, callback).await;

        if self.selection_version.load(Ordering::SeqCst) != version {
            debug!(%symbol, "symbol selection superseded, releasing");
            let _ = self.registry.release(&channel).await;
            return Ok(());
        }
        result?;
        Ok(())
    }

    async fn seed_safety_snapshots(&self) {
        let timeout = Duration::from_millis(self.config.kv_timeout_ms);
        let kill_switch = self.fetch_snapshot(channels::KILL_SWITCH_KEY, timeout).await;
        let circuit_breaker = self
            .fetch_snapshot(channels::CIRCUIT_BREAKER_KEY, timeout)
            .await;

        self.apply_safety(move |safety| {
            safety.kill_switch = kill_switch;
            safety.circuit_breaker = circuit_breaker;
        });
    }

    /// Fetch and parse one kv snapshot; any failure yields unknown.
    async fn fetch_snapshot(&self, key: &str, timeout: Duration) -> Option<String> {
        let fetched = tokio::time::timeout(timeout, self.kv.get(key.to_string())).await;
        match fetched {
            Err(_) => {
                warn!(%key, "kv snapshot timed out");
                None
            }
            Ok(Err(err)) => {
                warn!(%key, error = %err, "kv snapshot fetch failed");
                None
            }
            Ok(Ok(None)) => None,
            Ok(Ok(Some(bytes))) => match serde_json::from_slice::<serde_json::Value>(&bytes) {
                Ok(value) => parse_state(&value),
                Err(err) => {
                    warn!(%key, error = %err, "kv snapshot is not valid JSON");
                    None
                }
            },
        }
    }

    /// Mutate safety state and notify the listener outside the lock.
    fn apply_safety(&self, mutate: impl FnOnce(&mut SafetyState)) {
        let (listener, snapshot) = {
            let mut shared = self.shared.lock();
            mutate(&mut shared.safety);
            (shared.safety_listener.clone(), shared.safety.clone())
        };
        if let Some(listener) = listener {
            listener(snapshot);
        }
    }

    fn connection_callback(&self) -> ChannelCallback {
        let shared = self.shared.clone();
        let reconnected = self.reconnected.clone();
        Arc::new(move |payload| {
            let state = parse_state(&payload);
            let recovered = {
                let mut guard = shared.lock();
                let previous = guard.safety.connection.clone();
                guard.safety.connection = state.clone();
                is_truly_disconnected(previous.as_deref())
                    && classify_connection(state.as_deref()) == SignalState::Safe
            };
            let (listener, snapshot) = {
                let guard = shared.lock();
                (guard.safety_listener.clone(), guard.safety.clone())
            };
            if let Some(listener) = listener {
                listener(snapshot);
            }
            if recovered {
                info!("connection recovered, scheduling resubscription");
                reconnected.notify_one();
            }
        })
    }

    fn safety_field_callback(&self, field: SafetyField) -> ChannelCallback {
        let shared = self.shared.clone();
        Arc::new(move |payload| {
            let state = parse_state(&payload);
            let (listener, snapshot) = {
                let mut guard = shared.lock();
                match field {
                    SafetyField::KillSwitch => guard.safety.kill_switch = state.clone(),
                    SafetyField::CircuitBreaker => guard.safety.circuit_breaker = state.clone(),
                }
                (guard.safety_listener.clone(), guard.safety.clone())
            };
            if let Some(listener) = listener {
                listener(snapshot);
            }
        })
    }

    fn positions_callback(&self) -> ChannelCallback {
        let shared = self.shared.clone();
        Arc::new(move |payload| {
            match serde_json::from_value::<Vec<Position>>(payload) {
                Ok(positions) => {
                    let listener = shared.lock().position_listener.clone();
                    if let Some(listener) = listener {
                        listener(positions);
                    }
                }
                Err(err) => warn!(error = %err, "unparseable positions payload"),
            }
        })
    }

    fn order_update_callback(&self) -> ChannelCallback {
        let shared = self.shared.clone();
        Arc::new(move |payload| {
            match serde_json::from_value::<OrderUpdate>(payload) {
                Ok(update) => {
                    let listener = shared.lock().order_listener.clone();
                    if let Some(listener) = listener {
                        listener(update);
                    }
                }
                Err(err) => warn!(error = %err, "unparseable order-update payload"),
            }
        })
    }

    fn price_callback(&self) -> ChannelCallback {
        let shared = self.shared.clone();
        Arc::new(move |payload| {
            match serde_json::from_value::<MarketPrice>(payload) {
                Ok(price) => {
                    // Drop pushes for a symbol that is no longer selected.
                    let (selected, listener) = {
                        let guard = shared.lock();
                        (guard.selected_symbol.clone(), guard.price_listener.clone())
                    };
                    if selected.as_deref() != Some(price.symbol.as_str()) {
                        debug!(symbol = %price.symbol, "price push for unselected symbol dropped");
                        return;
                    }
                    if let Some(listener) = listener {
                        listener(price);
                    }
                }
                Err(err) => warn!(error = %err, "unparseable price payload"),
            }
        })
    }

    /// Tear everything down. Call after cancelling the task set.
    pub async fn shutdown(&self) {
        self.registry.dispose().await;
    }
}

#[derive(Clone, Copy)]
enum SafetyField {
    KillSwitch,
    CircuitBreaker,
}

#[cfg(test)]
mod tests {
    use super::*;
    use desk_client::mock::{MemoryKvStore, MockBroker};
    use desk_core::Price;
    use rust_decimal_macros::dec;

    struct Harness {
        broker: Arc<MockBroker>,
        kv: Arc<MemoryKvStore>,
        coordinator: Coordinator,
        tasks: SupervisedTasks,
    }

    fn harness() -> Harness {
        let broker = Arc::new(MockBroker::new());
        let kv = Arc::new(MemoryKvStore::new());
        let coordinator = Coordinator::new(
            broker.clone(),
            kv.clone(),
            CoordinatorConfig {
                retry_interval_ms: 20,
                ..CoordinatorConfig::default()
            },
        );
        Harness {
            broker,
            kv,
            coordinator,
            tasks: SupervisedTasks::new(),
        }
    }

    #[tokio::test]
    async fn test_start_subscribes_core_channels() {
        let h = harness();
        h.coordinator.start(&h.tasks).await.unwrap();

        for channel in [
            channels::CONNECTION,
            channels::KILL_SWITCH,
            channels::CIRCUIT_BREAKER,
            channels::POSITIONS,
        ] {
            assert!(h.broker.is_subscribed(channel), "{channel} not subscribed");
        }
        h.tasks.shutdown().await;
    }

    #[tokio::test]
    async fn test_user_scoped_order_channel_feeds_listener() {
        let broker = Arc::new(MockBroker::new());
        let kv = Arc::new(MemoryKvStore::new());
        let coordinator = Coordinator::new(
            broker.clone(),
            kv,
            CoordinatorConfig {
                user: Some("trader-7".to_string()),
                ..CoordinatorConfig::default()
            },
        );
        let seen = Arc::new(Mutex::new(Vec::<OrderUpdate>::new()));
        let seen_cb = seen.clone();
        coordinator.set_order_listener(Arc::new(move |update| seen_cb.lock().push(update)));

        let tasks = SupervisedTasks::new();
        coordinator.start(&tasks).await.unwrap();
        assert!(broker.is_subscribed("orders.trader-7"));

        broker.publish(
            "orders.trader-7",
            serde_json::json!({
                "order_id": "ord-1",
                "symbol": "AAPL",
                "status": "filled",
                "filled_quantity": "100"
            }),
        );
        let seen = seen.lock();
        assert_eq!(seen.len(), 1);
        assert_eq!(seen[0].order_id, "ord-1");
        assert_eq!(seen[0].status, "filled");
        tasks.shutdown().await;
    }

    #[tokio::test]
    async fn test_no_order_channel_without_user() {
        let h = harness();
        h.coordinator.start(&h.tasks).await.unwrap();
        assert_eq!(h.broker.subscribe_count("orders.trader-7"), 0);
        h.tasks.shutdown().await;
    }

    #[tokio::test]
    async fn test_kv_snapshots_seed_safety_state() {
        let h = harness();
        h.kv
            .put(channels::KILL_SWITCH_KEY, br#"{"state":"engaged"}"#);
        h.kv
            .put(channels::CIRCUIT_BREAKER_KEY, br#"{"state":"normal"}"#);

        h.coordinator.start(&h.tasks).await.unwrap();
        let safety = h.coordinator.safety_state();
        assert_eq!(safety.kill_switch.as_deref(), Some("engaged"));
        assert_eq!(safety.circuit_breaker.as_deref(), Some("normal"));
        h.tasks.shutdown().await;
    }

    #[tokio::test]
    async fn test_garbled_snapshot_yields_unknown() {
        let h = harness();
        h.kv.put(channels::KILL_SWITCH_KEY, b"not json");

        h.coordinator.start(&h.tasks).await.unwrap();
        let safety = h.coordinator.safety_state();
        assert_eq!(safety.kill_switch, None);
        assert_eq!(safety.kill_switch_state(), SignalState::Unknown);
        h.tasks.shutdown().await;
    }

    #[tokio::test]
    async fn test_channel_pushes_update_safety_and_notify() {
        let h = harness();
        let seen = Arc::new(Mutex::new(Vec::<SafetyState>::new()));
        let seen_cb = seen.clone();
        h.coordinator
            .set_safety_listener(Arc::new(move |state| seen_cb.lock().push(state)));

        h.coordinator.start(&h.tasks).await.unwrap();
        h.broker.publish(
            channels::KILL_SWITCH,
            serde_json::json!({"state": "engaged"}),
        );

        let safety = h.coordinator.safety_state();
        assert_eq!(safety.kill_switch.as_deref(), Some("engaged"));
        assert!(seen
            .lock()
            .iter()
            .any(|s| s.kill_switch.as_deref() == Some("engaged")));

        // Malformed push downgrades to unknown rather than keeping the
        // last good value.
        h.broker
            .publish(channels::KILL_SWITCH, serde_json::json!({"unexpected": 1}));
        assert_eq!(h.coordinator.safety_state().kill_switch, None);
        h.tasks.shutdown().await;
    }

    #[tokio::test]
    async fn test_symbol_selection_swaps_price_channel() {
        let h = harness();
        h.coordinator.start(&h.tasks).await.unwrap();

        h.coordinator
            .select_symbol(Some("AAPL".to_string()))
            .await
            .unwrap();
        assert!(h.broker.is_subscribed("prices.AAPL"));

        h.coordinator
            .select_symbol(Some("MSFT".to_string()))
            .await
            .unwrap();
        assert!(!h.broker.is_subscribed("prices.AAPL"));
        assert_eq!(h.broker.unsubscribe_count("prices.AAPL"), 1);
        assert!(h.broker.is_subscribed("prices.MSFT"));

        h.coordinator.select_symbol(None).await.unwrap();
        assert!(!h.broker.is_subscribed("prices.MSFT"));
        h.tasks.shutdown().await;
    }

    #[tokio::test]
    async fn test_price_pushes_for_unselected_symbol_dropped() {
        let h = harness();
        let seen = Arc::new(Mutex::new(Vec::<MarketPrice>::new()));
        let seen_cb = seen.clone();
        h.coordinator
            .set_price_listener(Arc::new(move |price| seen_cb.lock().push(price)));

        h.coordinator.start(&h.tasks).await.unwrap();
        h.coordinator
            .select_symbol(Some("AAPL".to_string()))
            .await
            .unwrap();

        let push = |symbol: &str| {
            serde_json::json!({
                "symbol": symbol,
                "last": "101.5",
                "timestamp": "2026-08-29T14:30:00Z"
            })
        };
        h.broker.publish("prices.AAPL", push("AAPL"));
        // A late push from a previously subscribed channel.
        h.broker.publish("prices.AAPL", push("MSFT"));

        let seen = seen.lock();
        assert_eq!(seen.len(), 1);
        assert_eq!(seen[0].symbol, "AAPL");
        assert_eq!(seen[0].last, Price::new(dec!(101.5)));
        h.tasks.shutdown().await;
    }

    #[tokio::test]
    async fn test_reconnect_triggers_resubscribe() {
        let h = harness();
        h.coordinator.start(&h.tasks).await.unwrap();
        assert_eq!(h.broker.subscribe_count(channels::POSITIONS), 1);

        h.broker.publish(
            channels::CONNECTION,
            serde_json::json!({"state": "disconnected"}),
        );
        h.broker.publish(
            channels::CONNECTION,
            serde_json::json!({"state": "connected"}),
        );

        // Resubscription runs on the background task.
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(h.broker.subscribe_count(channels::POSITIONS) >= 2);
        h.tasks.shutdown().await;
    }

    #[tokio::test]
    async fn test_failed_core_channel_recovers_via_retry_loop() {
        let h = harness();
        h.broker.fail_channel(channels::POSITIONS);

        // Positions fails but startup proceeds and the other channels come up.
        h.coordinator.start(&h.tasks).await.unwrap();
        assert!(h.broker.is_subscribed(channels::CONNECTION));
        assert!(!h.broker.is_subscribed(channels::POSITIONS));

        h.broker.clear_failure(channels::POSITIONS);
        tokio::time::sleep(Duration::from_millis(80)).await;
        assert!(h.broker.is_subscribed(channels::POSITIONS));
        h.tasks.shutdown().await;
    }
}
