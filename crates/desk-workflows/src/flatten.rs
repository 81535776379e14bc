//! Flatten: cancel a symbol's working orders and close its position.
//!
//! Flatten is risk-reducing, so it runs fail-open: degraded safety
//! signals and cancel failures are surfaced as warnings on the outcome
//! but never stop the close. The close quantity always comes from a
//! fresh authoritative position fetch, never from whatever the UI was
//! displaying.

use std::sync::Arc;

use tracing::{debug, info, warn};

use desk_client::{OrderAck, TradingApi};
use desk_core::{Qty, SafetyPolicy, SafetyState};
use desk_safety::SafetyGate;

use crate::error::{WorkflowError, WorkflowResult};

/// Result of a flatten request.
#[derive(Debug, Clone)]
pub struct FlattenOutcome {
    /// Acknowledgement of the closing order; `None` when already flat.
    pub ack: Option<OrderAck>,
    /// Quantity sent to close, from the authoritative position.
    pub closed_quantity: Qty,
    /// Working orders cancelled before the close.
    pub cancelled_orders: usize,
    /// Fail-open safety warnings and best-effort cancel failures.
    pub warnings: Vec<String>,
}

pub struct Flattener {
    api: Arc<dyn TradingApi>,
    gate: SafetyGate,
}

impl Flattener {
    pub fn new(api: Arc<dyn TradingApi>) -> Self {
        Self {
            gate: SafetyGate::new(api.clone()),
            api,
        }
    }

    /// Cancel `symbol`'s working orders best-effort, then close its
    /// position at market.
    pub async fn flatten(
        &self,
        symbol: &str,
        safety: &SafetyState,
    ) -> WorkflowResult<FlattenOutcome> {
        let verdict = self
            .gate
            .check_with_api_verification(SafetyPolicy::FailOpen, safety)
            .await;
        let mut warnings = verdict.warnings;
        for warning in &warnings {
            warn!(%symbol, %warning, "flattening under degraded safety signal");
        }

        let cancelled_orders = self.cancel_working_orders(symbol, &mut warnings).await;

        let positions = self.api.fetch_positions().await?;
        let Some(position) = positions.iter().find(|p| p.symbol == symbol) else {
            info!(%symbol, "flatten requested with no position, nothing to do");
            return Ok(FlattenOutcome {
                ack: None,
                closed_quantity: Qty::ZERO,
                cancelled_orders,
                warnings,
            });
        };
        if position.is_flat() {
            info!(%symbol, "position already flat, nothing to do");
            return Ok(FlattenOutcome {
                ack: None,
                closed_quantity: Qty::ZERO,
                cancelled_orders,
                warnings,
            });
        }

        let quantity = position.quantity.abs();
        let ack = self
            .api
            .close_position(symbol.to_string(), quantity)
            .await
            .map_err(WorkflowError::Api)?;
        info!(
            %symbol,
            quantity = %quantity,
            order_id = %ack.order_id,
            "flatten order submitted"
        );

        Ok(FlattenOutcome {
            ack: Some(ack),
            closed_quantity: quantity,
            cancelled_orders,
            warnings,
        })
    }

    /// Best-effort cancel of the symbol's cancellable working orders.
    ///
    /// Fetch and cancel failures downgrade to warnings: a resting order
    /// never stops the close.
    async fn cancel_working_orders(&self, symbol: &str, warnings: &mut Vec<String>) -> usize {
        let orders = match self.api.fetch_open_orders(Some(symbol.to_string())).await {
            Ok(orders) => orders,
            Err(err) => {
                warn!(%symbol, error = %err, "open-order fetch during flatten failed");
                warnings.push(format!("could not fetch open orders: {err}"));
                return 0;
            }
        };

        let mut cancelled = 0;
        for order in &orders {
            if !order.is_cancellable() {
                debug!(%symbol, order_id = %order.order_id, "skipping uncancellable order");
                continue;
            }
            match self.api.cancel_order(order.order_id.clone()).await {
                Ok(()) => cancelled += 1,
                Err(err) => {
                    warn!(
                        %symbol,
                        order_id = %order.order_id,
                        error = %err,
                        "cancel during flatten failed"
                    );
                    warnings.push(format!("cancel {} failed: {err}", order.order_id));
                }
            }
        }
        cancelled
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use desk_client::mock::MockTradingApi;
    use desk_client::{OpenOrder, Position};
    use desk_core::{OrderSide, Price};
    use rust_decimal_macros::dec;

    fn safe_state() -> SafetyState {
        SafetyState {
            connection: Some("connected".to_string()),
            kill_switch: Some("disengaged".to_string()),
            circuit_breaker: Some("normal".to_string()),
        }
    }

    fn position(symbol: &str, qty: rust_decimal::Decimal) -> Position {
        Position {
            symbol: symbol.to_string(),
            quantity: Qty::new(qty),
            avg_price: Price::new(dec!(50)),
        }
    }

    fn order(id: &str, symbol: &str) -> OpenOrder {
        OpenOrder {
            order_id: id.to_string(),
            symbol: symbol.to_string(),
            side: OrderSide::Buy,
            quantity: Qty::from_shares(10),
            limit_price: Some(Price::new(dec!(49))),
        }
    }

    #[tokio::test]
    async fn test_flatten_uses_server_quantity() {
        let api = Arc::new(MockTradingApi::new());
        // Server says 150 even if the UI believed something else.
        api.set_positions(vec![position("AAPL", dec!(150))]);

        let flattener = Flattener::new(api.clone());
        let outcome = flattener.flatten("AAPL", &safe_state()).await.unwrap();

        assert_eq!(outcome.closed_quantity, Qty::new(dec!(150)));
        assert_eq!(api.closed(), vec![("AAPL".to_string(), Qty::new(dec!(150)))]);
        assert!(outcome.warnings.is_empty());
    }

    #[tokio::test]
    async fn test_flatten_short_closes_absolute_quantity() {
        let api = Arc::new(MockTradingApi::new());
        api.set_positions(vec![position("AAPL", dec!(-75))]);

        let flattener = Flattener::new(api.clone());
        let outcome = flattener.flatten("AAPL", &safe_state()).await.unwrap();
        assert_eq!(outcome.closed_quantity, Qty::new(dec!(75)));
    }

    #[tokio::test]
    async fn test_flatten_proceeds_under_degraded_safety_with_warnings() {
        let api = Arc::new(MockTradingApi::new());
        api.set_positions(vec![position("AAPL", dec!(100))]);
        api.set_kill_switch(Ok(desk_client::KillSwitchStatus { engaged: true }));

        let flattener = Flattener::new(api.clone());
        let outcome = flattener.flatten("AAPL", &safe_state()).await.unwrap();
        assert!(outcome.ack.is_some());
        assert!(!outcome.warnings.is_empty());
        assert_eq!(api.closed().len(), 1);
    }

    #[tokio::test]
    async fn test_flatten_cancels_working_orders_before_close() {
        let api = Arc::new(MockTradingApi::new());
        api.set_positions(vec![position("AAPL", dec!(100))]);
        api.set_open_orders(vec![
            order("ord-1", "AAPL"),
            order("ord-2", "MSFT"),
            order("synthetic-7", "AAPL"),
        ]);

        let flattener = Flattener::new(api.clone());
        let outcome = flattener.flatten("AAPL", &safe_state()).await.unwrap();

        // Only the symbol's cancellable order goes; the close still runs.
        assert_eq!(api.cancelled(), vec!["ord-1".to_string()]);
        assert_eq!(outcome.cancelled_orders, 1);
        assert_eq!(outcome.closed_quantity, Qty::new(dec!(100)));
    }

    #[tokio::test]
    async fn test_flatten_cancel_failure_downgrades_to_warning() {
        let api = Arc::new(MockTradingApi::new());
        api.set_positions(vec![position("AAPL", dec!(100))]);
        api.set_open_orders(vec![order("ord-1", "AAPL")]);
        api.fail_cancel("ord-1");

        let flattener = Flattener::new(api.clone());
        let outcome = flattener.flatten("AAPL", &safe_state()).await.unwrap();

        assert_eq!(outcome.cancelled_orders, 0);
        assert!(outcome.warnings.iter().any(|w| w.contains("ord-1")));
        // The close is never stopped by a failed cancel.
        assert_eq!(api.closed().len(), 1);
    }

    #[tokio::test]
    async fn test_flatten_on_flat_position_is_noop() {
        let api = Arc::new(MockTradingApi::new());
        api.set_positions(vec![position("AAPL", dec!(0))]);

        let flattener = Flattener::new(api.clone());
        let outcome = flattener.flatten("AAPL", &safe_state()).await.unwrap();
        assert!(outcome.ack.is_none());
        assert!(api.closed().is_empty());

        // Same when the symbol has no position row at all.
        let outcome = flattener.flatten("MSFT", &safe_state()).await.unwrap();
        assert!(outcome.ack.is_none());
    }
}
