//! Trading API trait.
//!
//! Trait-based abstraction over the dashboard's HTTP trading client:
//! - dependency injection for testing
//! - separation of safety logic from transport
//! - every method may fail with a distinguishable [`crate::ApiError`] class

use std::pin::Pin;

use crate::error::ApiResult;
use crate::types::{
    AccountInfo, CircuitBreakerStatus, KillSwitchStatus, ManualOrderRequest, MarketPrice,
    OpenOrder, OrderAck, Position,
};
use desk_core::Qty;

/// Boxed future for dyn-compatible async trait methods.
pub type BoxFuture<'a, T> = Pin<Box<dyn std::future::Future<Output = T> + Send + 'a>>;

/// Async trading client contract.
///
/// All calls are suspension points; none blocks the event loop.
pub trait TradingApi: Send + Sync {
    /// Fetch open orders, optionally filtered to a symbol.
    fn fetch_open_orders(&self, symbol: Option<String>) -> BoxFuture<'_, ApiResult<Vec<OpenOrder>>>;

    /// Fetch all positions.
    fn fetch_positions(&self) -> BoxFuture<'_, ApiResult<Vec<Position>>>;

    /// Fetch account buying power and exposure.
    fn fetch_account_info(&self) -> BoxFuture<'_, ApiResult<AccountInfo>>;

    /// Fetch last-trade prices for the given symbols.
    fn fetch_market_prices(&self, symbols: Vec<String>) -> BoxFuture<'_, ApiResult<Vec<MarketPrice>>>;

    /// Fetch average daily volume for a symbol, in shares.
    fn fetch_adv(&self, symbol: String) -> BoxFuture<'_, ApiResult<Qty>>;

    /// Cancel a single order by id.
    fn cancel_order(&self, order_id: String) -> BoxFuture<'_, ApiResult<()>>;

    /// Close `quantity` shares of the position at `symbol` at market.
    fn close_position(&self, symbol: String, quantity: Qty) -> BoxFuture<'_, ApiResult<OrderAck>>;

    /// Submit a manual order carrying its idempotency key.
    fn submit_manual_order(&self, request: ManualOrderRequest) -> BoxFuture<'_, ApiResult<OrderAck>>;

    /// Live kill-switch verification.
    fn fetch_kill_switch_status(&self) -> BoxFuture<'_, ApiResult<KillSwitchStatus>>;

    /// Live circuit-breaker verification.
    fn fetch_circuit_breaker_status(&self) -> BoxFuture<'_, ApiResult<CircuitBreakerStatus>>;
}
