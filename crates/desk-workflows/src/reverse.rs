//! Reverse: flip a position to the opposite direction.
//!
//! Reverse ends in a risk-adding order, so every step fails closed:
//! uncancellable orders abort it, the sizing price must carry a fresh
//! parseable timestamp, fat-finger limits apply to the full round trip,
//! and safety is re-verified between the close and the opposite open.
//! The opposite leg is sized to what the exchange actually closed, never
//! to the UI's belief about the position.

use std::sync::Arc;
use std::time::Duration;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};
use uuid::Uuid;

use desk_client::{ManualOrderRequest, OrderAck, TradingApi};
use desk_core::{OrderSide, OrderType, Price, Qty, SafetyPolicy, SafetyState, TimeInForce};
use desk_safety::SafetyGate;

use crate::error::{WorkflowError, WorkflowResult};

/// Reverse workflow tuning.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReverseConfig {
    /// Poll interval while waiting for orders to clear / position to flatten (ms).
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
    /// Window to wait for cancelled orders to leave the book (ms).
    #[serde(default = "default_cancel_timeout_ms")]
    pub cancel_timeout_ms: u64,
    /// Window to wait for the position to read flat twice (ms).
    #[serde(default = "default_flatten_timeout_ms")]
    pub flatten_timeout_ms: u64,
    /// Maximum age of the sizing price (ms).
    #[serde(default = "default_price_max_age_ms")]
    pub price_max_age_ms: i64,
    /// Fat-finger cap as a fraction of average daily volume.
    #[serde(default = "default_max_adv_fraction")]
    pub max_adv_fraction: Decimal,
    /// Fat-finger cap on order notional.
    #[serde(default = "default_max_order_notional")]
    pub max_order_notional: Decimal,
}

fn default_poll_interval_ms() -> u64 {
    500
}

fn default_cancel_timeout_ms() -> u64 {
    10_000
}

fn default_flatten_timeout_ms() -> u64 {
    15_000
}

fn default_price_max_age_ms() -> i64 {
    5_000
}

fn default_max_adv_fraction() -> Decimal {
    Decimal::new(1, 2) // 1%
}

fn default_max_order_notional() -> Decimal {
    Decimal::from(1_000_000)
}

impl Default for ReverseConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: default_poll_interval_ms(),
            cancel_timeout_ms: default_cancel_timeout_ms(),
            flatten_timeout_ms: default_flatten_timeout_ms(),
            price_max_age_ms: default_price_max_age_ms(),
            max_adv_fraction: default_max_adv_fraction(),
            max_order_notional: default_max_order_notional(),
        }
    }
}

/// What a completed reverse did.
#[derive(Debug, Clone)]
pub struct ReverseReport {
    /// Ids of the open orders cancelled up front.
    pub cancelled_orders: Vec<String>,
    /// Quantity the exchange actually closed.
    pub closed_quantity: Qty,
    /// Acknowledgement of the opposite-direction order.
    pub opened: OrderAck,
}

pub struct ReverseWorkflow {
    api: Arc<dyn TradingApi>,
    gate: SafetyGate,
    config: ReverseConfig,
}

impl ReverseWorkflow {
    pub fn new(api: Arc<dyn TradingApi>, config: ReverseConfig) -> Self {
        Self {
            gate: SafetyGate::new(api.clone()),
            api,
            config,
        }
    }

    /// Cancel, flatten, and re-open in the opposite direction.
    pub async fn reverse(
        &self,
        symbol: &str,
        safety: &SafetyState,
    ) -> WorkflowResult<ReverseReport> {
        self.verify_safety(safety).await?;

        let positions = self.api.fetch_positions().await?;
        let position = positions
            .iter()
            .find(|p| p.symbol == symbol && !p.is_flat())
            .ok_or_else(|| WorkflowError::NoPosition {
                symbol: symbol.to_string(),
            })?;
        let close_quantity = position.quantity.abs();
        // Long reverses into short and vice versa, so the opposite leg
        // trades on the same side that closes the position.
        let open_side = position.closing_side();

        let orders = self.api.fetch_open_orders(Some(symbol.to_string())).await?;
        let uncancellable = orders.iter().filter(|o| !o.is_cancellable()).count();
        if uncancellable > 0 {
            warn!(%symbol, count = uncancellable, "reverse blocked by uncancellable orders");
            return Err(WorkflowError::UncancellableOrders {
                count: uncancellable,
            });
        }

        let mut cancelled_orders = Vec::with_capacity(orders.len());
        for order in &orders {
            self.api.cancel_order(order.order_id.clone()).await?;
            cancelled_orders.push(order.order_id.clone());
        }
        self.poll_orders_cleared(symbol).await?;

        let price =
            crate::pricing::fresh_price(&self.api, symbol, self.config.price_max_age_ms).await?;
        // The round trip trades twice the position size.
        let round_trip = Qty::new(close_quantity.inner() * Decimal::TWO);
        self.check_fat_finger(symbol, round_trip, price).await?;

        let close_ack = self
            .api
            .close_position(symbol.to_string(), close_quantity)
            .await?;
        let closed_quantity = close_ack.accepted_quantity;
        info!(%symbol, quantity = %closed_quantity, "reverse closed existing position");

        self.poll_double_flat(symbol).await?;

        // The opposite leg is a fresh risk-adding order: verify again,
        // against a re-fetched price. The pre-close quote can be many
        // polling intervals old by now.
        self.verify_safety(safety).await?;
        let price =
            crate::pricing::fresh_price(&self.api, symbol, self.config.price_max_age_ms).await?;
        self.check_fat_finger(symbol, closed_quantity, price).await?;

        let request = ManualOrderRequest {
            intent_id: format!("reverse-{}", Uuid::new_v4()),
            symbol: symbol.to_string(),
            side: open_side,
            quantity: closed_quantity,
            order_type: OrderType::Market,
            limit_price: None,
            stop_price: None,
            time_in_force: TimeInForce::Day,
        };
        let opened = self.api.submit_manual_order(request).await?;
        info!(
            %symbol,
            side = ?open_side,
            quantity = %closed_quantity,
            order_id = %opened.order_id,
            "reverse opened opposite position"
        );

        Ok(ReverseReport {
            cancelled_orders,
            closed_quantity,
            opened,
        })
    }

    async fn verify_safety(&self, safety: &SafetyState) -> WorkflowResult<()> {
        let verdict = self
            .gate
            .check_with_api_verification(SafetyPolicy::FailClosed, safety)
            .await;
        if verdict.allowed {
            Ok(())
        } else {
            Err(WorkflowError::SafetyBlocked(
                verdict
                    .reason
                    .unwrap_or_else(|| "safety verification failed".to_string()),
            ))
        }
    }

    async fn check_fat_finger(
        &self,
        symbol: &str,
        quantity: Qty,
        price: Price,
    ) -> WorkflowResult<()> {
        let adv = self.api.fetch_adv(symbol.to_string()).await?;
        let qty_cap = adv.inner() * self.config.max_adv_fraction;
        if quantity.inner() > qty_cap {
            return Err(WorkflowError::FatFinger(format!(
                "{quantity} shares exceeds {} ({}% of ADV {adv})",
                qty_cap,
                self.config.max_adv_fraction * Decimal::from(100),
            )));
        }
        let notional = price.notional(quantity);
        if notional > self.config.max_order_notional {
            return Err(WorkflowError::FatFinger(format!(
                "notional {notional} exceeds cap {}",
                self.config.max_order_notional
            )));
        }
        Ok(())
    }

    async fn poll_orders_cleared(&self, symbol: &str) -> WorkflowResult<()> {
        let attempts = self.poll_attempts(self.config.cancel_timeout_ms);
        let mut remaining = 0;
        for _ in 0..attempts {
            let orders = self.api.fetch_open_orders(Some(symbol.to_string())).await?;
            remaining = orders.len();
            if remaining == 0 {
                return Ok(());
            }
            tokio::time::sleep(Duration::from_millis(self.config.poll_interval_ms)).await;
        }
        Err(WorkflowError::CancelTimeout { remaining })
    }

    /// The position must read flat on two consecutive polls before the
    /// opposite leg goes out, guarding against a stale first read.
    async fn poll_double_flat(&self, symbol: &str) -> WorkflowResult<()> {
        let attempts = self.poll_attempts(self.config.flatten_timeout_ms);
        let mut consecutive_flat = 0;
        for _ in 0..attempts {
            let positions = self.api.fetch_positions().await?;
            let flat = positions
                .iter()
                .find(|p| p.symbol == symbol)
                .map(|p| p.is_flat())
                .unwrap_or(true);
            if flat {
                consecutive_flat += 1;
                if consecutive_flat >= 2 {
                    return Ok(());
                }
            } else {
                consecutive_flat = 0;
            }
            tokio::time::sleep(Duration::from_millis(self.config.poll_interval_ms)).await;
        }
        Err(WorkflowError::FlattenTimeout {
            symbol: symbol.to_string(),
        })
    }

    fn poll_attempts(&self, timeout_ms: u64) -> u64 {
        (timeout_ms / self.config.poll_interval_ms.max(1)).max(2)
    }
}
