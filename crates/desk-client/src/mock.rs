//! Recording mock collaborators for tests.
//!
//! Shared by the test suites of every downstream crate. Each mock records
//! calls for verification and supports failure/latency injection so
//! concurrency and partial-failure paths can be exercised deterministically.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use parking_lot::Mutex;

use crate::api::{BoxFuture, TradingApi};
use crate::broker::{ChannelCallback, KvStore, MessageBroker};
use crate::error::{ApiError, ApiResult, BrokerError, BrokerResult, FormStoreError, KvError};
use crate::form::{FormStore, OneClickPrefs, PersistedForm};
use crate::types::{
    AccountInfo, CircuitBreakerStatus, KillSwitchStatus, ManualOrderRequest, MarketPrice,
    OpenOrder, OrderAck, Position,
};
use desk_core::Qty;

/// In-memory broker with per-channel call counters and failure injection.
#[derive(Default)]
pub struct MockBroker {
    callbacks: Mutex<HashMap<String, ChannelCallback>>,
    subscribe_counts: Mutex<HashMap<String, usize>>,
    unsubscribe_counts: Mutex<HashMap<String, usize>>,
    fail_channels: Mutex<HashSet<String>>,
    subscribe_delay: Mutex<Option<Duration>>,
}

impl MockBroker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every subscribe call sleep before completing. Used to hold a
    /// subscribe in flight while concurrent acquirers pile up.
    pub fn set_subscribe_delay(&self, delay: Duration) {
        *self.subscribe_delay.lock() = Some(delay);
    }

    /// Fail subscribe calls for `channel` until cleared.
    pub fn fail_channel(&self, channel: &str) {
        self.fail_channels.lock().insert(channel.to_string());
    }

    pub fn clear_failure(&self, channel: &str) {
        self.fail_channels.lock().remove(channel);
    }

    pub fn subscribe_count(&self, channel: &str) -> usize {
        self.subscribe_counts.lock().get(channel).copied().unwrap_or(0)
    }

    pub fn unsubscribe_count(&self, channel: &str) -> usize {
        self.unsubscribe_counts.lock().get(channel).copied().unwrap_or(0)
    }

    pub fn is_subscribed(&self, channel: &str) -> bool {
        self.callbacks.lock().contains_key(channel)
    }

    /// Deliver a payload to the channel's registered callback.
    ///
    /// Returns false when no callback is registered.
    pub fn publish(&self, channel: &str, payload: serde_json::Value) -> bool {
        let cb = self.callbacks.lock().get(channel).cloned();
        match cb {
            Some(cb) => {
                cb(payload);
                true
            }
            None => false,
        }
    }
}

impl MessageBroker for MockBroker {
    fn subscribe(&self, channel: String, callback: ChannelCallback) -> BoxFuture<'_, BrokerResult<()>> {
        let delay = *self.subscribe_delay.lock();
        Box::pin(async move {
            *self
                .subscribe_counts
                .lock()
                .entry(channel.clone())
                .or_insert(0) += 1;

            if let Some(delay) = delay {
                tokio::time::sleep(delay).await;
            }

            if self.fail_channels.lock().contains(&channel) {
                return Err(BrokerError::SubscribeFailed {
                    channel,
                    message: "injected failure".to_string(),
                });
            }

            self.callbacks.lock().insert(channel, callback);
            Ok(())
        })
    }

    fn unsubscribe(&self, channel: String) -> BoxFuture<'_, BrokerResult<()>> {
        Box::pin(async move {
            *self
                .unsubscribe_counts
                .lock()
                .entry(channel.clone())
                .or_insert(0) += 1;
            self.callbacks.lock().remove(&channel);
            Ok(())
        })
    }
}

/// Programmable trading API mock.
///
/// Sequenced responses model polling: `push_*_response` queues one reply
/// per call; once the queue drains the standing snapshot is served.
pub struct MockTradingApi {
    open_orders: Mutex<Vec<OpenOrder>>,
    open_orders_sequence: Mutex<VecDeque<ApiResult<Vec<OpenOrder>>>>,
    positions: Mutex<Vec<Position>>,
    positions_sequence: Mutex<VecDeque<ApiResult<Vec<Position>>>>,
    account: Mutex<ApiResult<AccountInfo>>,
    prices: Mutex<HashMap<String, MarketPrice>>,
    prices_error: Mutex<Option<ApiError>>,
    adv: Mutex<HashMap<String, Qty>>,
    kill_switch: Mutex<ApiResult<KillSwitchStatus>>,
    circuit_breaker: Mutex<ApiResult<CircuitBreakerStatus>>,
    fail_cancel_ids: Mutex<HashSet<String>>,
    cancel_delay: Mutex<Option<Duration>>,
    cancelled: Mutex<Vec<String>>,
    closed: Mutex<Vec<(String, Qty)>>,
    close_responses: Mutex<VecDeque<ApiResult<OrderAck>>>,
    submitted: Mutex<Vec<ManualOrderRequest>>,
    submit_responses: Mutex<VecDeque<ApiResult<OrderAck>>>,
    in_flight_cancels: AtomicUsize,
    max_in_flight_cancels: AtomicUsize,
}

impl Default for MockTradingApi {
    fn default() -> Self {
        Self {
            open_orders: Mutex::new(Vec::new()),
            open_orders_sequence: Mutex::new(VecDeque::new()),
            positions: Mutex::new(Vec::new()),
            positions_sequence: Mutex::new(VecDeque::new()),
            account: Mutex::new(Ok(AccountInfo {
                buying_power: rust_decimal::Decimal::ZERO,
                total_exposure: None,
            })),
            prices: Mutex::new(HashMap::new()),
            prices_error: Mutex::new(None),
            adv: Mutex::new(HashMap::new()),
            kill_switch: Mutex::new(Ok(KillSwitchStatus { engaged: false })),
            circuit_breaker: Mutex::new(Ok(CircuitBreakerStatus {
                tripped: false,
                quiet_period: false,
            })),
            fail_cancel_ids: Mutex::new(HashSet::new()),
            cancel_delay: Mutex::new(None),
            cancelled: Mutex::new(Vec::new()),
            closed: Mutex::new(Vec::new()),
            close_responses: Mutex::new(VecDeque::new()),
            submitted: Mutex::new(Vec::new()),
            submit_responses: Mutex::new(VecDeque::new()),
            in_flight_cancels: AtomicUsize::new(0),
            max_in_flight_cancels: AtomicUsize::new(0),
        }
    }
}

impl MockTradingApi {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_open_orders(&self, orders: Vec<OpenOrder>) {
        *self.open_orders.lock() = orders;
    }

    pub fn push_open_orders_response(&self, response: ApiResult<Vec<OpenOrder>>) {
        self.open_orders_sequence.lock().push_back(response);
    }

    pub fn set_positions(&self, positions: Vec<Position>) {
        *self.positions.lock() = positions;
    }

    pub fn push_positions_response(&self, response: ApiResult<Vec<Position>>) {
        self.positions_sequence.lock().push_back(response);
    }

    pub fn set_account(&self, account: ApiResult<AccountInfo>) {
        *self.account.lock() = account;
    }

    pub fn set_price(&self, price: MarketPrice) {
        self.prices.lock().insert(price.symbol.clone(), price);
    }

    pub fn set_prices_error(&self, error: Option<ApiError>) {
        *self.prices_error.lock() = error;
    }

    pub fn set_adv(&self, symbol: &str, adv: Qty) {
        self.adv.lock().insert(symbol.to_string(), adv);
    }

    pub fn set_kill_switch(&self, response: ApiResult<KillSwitchStatus>) {
        *self.kill_switch.lock() = response;
    }

    pub fn set_circuit_breaker(&self, response: ApiResult<CircuitBreakerStatus>) {
        *self.circuit_breaker.lock() = response;
    }

    pub fn fail_cancel(&self, order_id: &str) {
        self.fail_cancel_ids.lock().insert(order_id.to_string());
    }

    /// Hold every cancel call open for `delay` so fan-out can be observed.
    pub fn set_cancel_delay(&self, delay: Duration) {
        *self.cancel_delay.lock() = Some(delay);
    }

    pub fn push_close_response(&self, response: ApiResult<OrderAck>) {
        self.close_responses.lock().push_back(response);
    }

    pub fn push_submit_response(&self, response: ApiResult<OrderAck>) {
        self.submit_responses.lock().push_back(response);
    }

    pub fn cancelled(&self) -> Vec<String> {
        self.cancelled.lock().clone()
    }

    pub fn closed(&self) -> Vec<(String, Qty)> {
        self.closed.lock().clone()
    }

    pub fn submitted(&self) -> Vec<ManualOrderRequest> {
        self.submitted.lock().clone()
    }

    /// High-water mark of concurrently in-flight cancel calls.
    pub fn max_in_flight_cancels(&self) -> usize {
        self.max_in_flight_cancels.load(Ordering::SeqCst)
    }
}

impl TradingApi for MockTradingApi {
    fn fetch_open_orders(&self, symbol: Option<String>) -> BoxFuture<'_, ApiResult<Vec<OpenOrder>>> {
        Box::pin(async move {
            let next = self.open_orders_sequence.lock().pop_front();
            let orders = match next {
                Some(response) => response?,
                None => self.open_orders.lock().clone(),
            };
            Ok(match symbol {
                Some(sym) => orders.into_iter().filter(|o| o.symbol == sym).collect(),
                None => orders,
            })
        })
    }

    fn fetch_positions(&self) -> BoxFuture<'_, ApiResult<Vec<Position>>> {
        Box::pin(async move {
            match self.positions_sequence.lock().pop_front() {
                Some(response) => response,
                None => Ok(self.positions.lock().clone()),
            }
        })
    }

    fn fetch_account_info(&self) -> BoxFuture<'_, ApiResult<AccountInfo>> {
        Box::pin(async move { self.account.lock().clone() })
    }

    fn fetch_market_prices(&self, symbols: Vec<String>) -> BoxFuture<'_, ApiResult<Vec<MarketPrice>>> {
        Box::pin(async move {
            if let Some(err) = self.prices_error.lock().clone() {
                return Err(err);
            }
            let prices = self.prices.lock();
            Ok(symbols
                .iter()
                .filter_map(|s| prices.get(s).cloned())
                .collect())
        })
    }

    fn fetch_adv(&self, symbol: String) -> BoxFuture<'_, ApiResult<Qty>> {
        Box::pin(async move {
            self.adv.lock().get(&symbol).copied().ok_or(ApiError::Client {
                status: 404,
                message: format!("no ADV for {symbol}"),
            })
        })
    }

    fn cancel_order(&self, order_id: String) -> BoxFuture<'_, ApiResult<()>> {
        Box::pin(async move {
            let in_flight = self.in_flight_cancels.fetch_add(1, Ordering::SeqCst) + 1;
            self.max_in_flight_cancels
                .fetch_max(in_flight, Ordering::SeqCst);

            let delay = *self.cancel_delay.lock();
            if let Some(delay) = delay {
                tokio::time::sleep(delay).await;
            }

            self.in_flight_cancels.fetch_sub(1, Ordering::SeqCst);
            self.cancelled.lock().push(order_id.clone());

            if self.fail_cancel_ids.lock().contains(&order_id) {
                return Err(ApiError::Server {
                    status: 500,
                    message: format!("cancel {order_id} failed"),
                });
            }
            Ok(())
        })
    }

    fn close_position(&self, symbol: String, quantity: Qty) -> BoxFuture<'_, ApiResult<OrderAck>> {
        Box::pin(async move {
            self.closed.lock().push((symbol.clone(), quantity));
            match self.close_responses.lock().pop_front() {
                Some(response) => response,
                None => Ok(OrderAck {
                    order_id: format!("close-{symbol}"),
                    accepted_quantity: quantity,
                }),
            }
        })
    }

    fn submit_manual_order(&self, request: ManualOrderRequest) -> BoxFuture<'_, ApiResult<OrderAck>> {
        Box::pin(async move {
            let quantity = request.quantity;
            self.submitted.lock().push(request);
            match self.submit_responses.lock().pop_front() {
                Some(response) => response,
                None => Ok(OrderAck {
                    order_id: format!("ord-{}", uuid::Uuid::new_v4()),
                    accepted_quantity: quantity,
                }),
            }
        })
    }

    fn fetch_kill_switch_status(&self) -> BoxFuture<'_, ApiResult<KillSwitchStatus>> {
        Box::pin(async move { self.kill_switch.lock().clone() })
    }

    fn fetch_circuit_breaker_status(&self) -> BoxFuture<'_, ApiResult<CircuitBreakerStatus>> {
        Box::pin(async move { self.circuit_breaker.lock().clone() })
    }
}

/// In-memory key-value store.
#[derive(Default)]
pub struct MemoryKvStore {
    entries: Mutex<HashMap<String, Vec<u8>>>,
    fail: Mutex<Option<KvError>>,
}

impl MemoryKvStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_failure(&self, error: Option<KvError>) {
        *self.fail.lock() = error;
    }

    pub fn put(&self, key: &str, value: &[u8]) {
        self.entries.lock().insert(key.to_string(), value.to_vec());
    }
}

impl KvStore for MemoryKvStore {
    fn get(&self, key: String) -> BoxFuture<'_, Result<Option<Vec<u8>>, KvError>> {
        Box::pin(async move {
            if let Some(err) = self.fail.lock().clone() {
                return Err(err);
            }
            Ok(self.entries.lock().get(&key).cloned())
        })
    }

    fn set(&self, key: String, value: Vec<u8>) -> BoxFuture<'_, Result<(), KvError>> {
        Box::pin(async move {
            if let Some(err) = self.fail.lock().clone() {
                return Err(err);
            }
            self.entries.lock().insert(key, value);
            Ok(())
        })
    }
}

/// In-memory form-state store.
#[derive(Default)]
pub struct MemoryFormStore {
    forms: Mutex<HashMap<String, PersistedForm>>,
    prefs: Mutex<HashMap<String, OneClickPrefs>>,
}

impl MemoryFormStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn pending_form(&self, scope: &str) -> Option<PersistedForm> {
        self.forms.lock().get(scope).cloned()
    }

    pub fn preferences(&self, scope: &str) -> Option<OneClickPrefs> {
        self.prefs.lock().get(scope).cloned()
    }
}

impl FormStore for MemoryFormStore {
    fn restore_state(&self, scope: String) -> BoxFuture<'_, Result<Option<PersistedForm>, FormStoreError>> {
        Box::pin(async move { Ok(self.forms.lock().get(&scope).cloned()) })
    }

    fn save_pending_form(&self, scope: String, form: PersistedForm) -> BoxFuture<'_, Result<(), FormStoreError>> {
        Box::pin(async move {
            self.forms.lock().insert(scope, form);
            Ok(())
        })
    }

    fn clear_pending_form(&self, scope: String) -> BoxFuture<'_, Result<(), FormStoreError>> {
        Box::pin(async move {
            self.forms.lock().remove(&scope);
            Ok(())
        })
    }

    fn save_preferences(&self, scope: String, prefs: OneClickPrefs) -> BoxFuture<'_, Result<(), FormStoreError>> {
        Box::pin(async move {
            self.prefs.lock().insert(scope, prefs);
            Ok(())
        })
    }

    fn load_preferences(&self, scope: String) -> BoxFuture<'_, Result<Option<OneClickPrefs>, FormStoreError>> {
        Box::pin(async move { Ok(self.prefs.lock().get(&scope).cloned()) })
    }
}
