//! DTOs exchanged with the trading API.
//!
//! These mirror the API's method contracts, not its wire format.

use chrono::{DateTime, Utc};
use desk_core::{OrderSide, OrderType, Price, Qty, TimeInForce};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// An open order as reported by the trading API.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OpenOrder {
    /// Server-assigned order id. Ids with the `synthetic-` prefix denote
    /// structurally uncancellable orders (exchange-managed legs).
    pub order_id: String,
    pub symbol: String,
    pub side: OrderSide,
    pub quantity: Qty,
    pub limit_price: Option<Price>,
}

/// Prefix convention for order ids that cannot be cancelled through the API.
pub const UNCANCELLABLE_ID_PREFIX: &str = "synthetic-";

impl OpenOrder {
    /// Whether this order can be cancelled at all.
    pub fn is_cancellable(&self) -> bool {
        !self.order_id.starts_with(UNCANCELLABLE_ID_PREFIX)
    }
}

/// A position as reported by the trading API.
///
/// `quantity` is signed: positive long, negative short.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Position {
    pub symbol: String,
    pub quantity: Qty,
    pub avg_price: Price,
}

impl Position {
    pub fn is_flat(&self) -> bool {
        self.quantity.is_zero()
    }

    /// Side that would close this position.
    pub fn closing_side(&self) -> OrderSide {
        if self.quantity.inner().is_sign_positive() {
            OrderSide::Sell
        } else {
            OrderSide::Buy
        }
    }
}

/// Account summary used for buying-power checks.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AccountInfo {
    pub buying_power: Decimal,
    pub total_exposure: Option<Decimal>,
}

/// Last-trade price for a symbol.
///
/// `timestamp` is the raw value as delivered; consumers that require a
/// fresh price parse it and treat missing/unparseable stamps as stale.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MarketPrice {
    pub symbol: String,
    pub last: Price,
    pub timestamp: Option<String>,
}

impl MarketPrice {
    /// Parse the delivery timestamp, if present and well-formed.
    pub fn parsed_timestamp(&self) -> Option<DateTime<Utc>> {
        self.timestamp
            .as_deref()
            .and_then(|t| DateTime::parse_from_rfc3339(t).ok())
            .map(|t| t.with_timezone(&Utc))
    }
}

/// An order lifecycle push from the per-user order channel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderUpdate {
    pub order_id: String,
    pub symbol: String,
    /// Lifecycle state as reported, e.g. "accepted", "filled", "cancelled".
    pub status: String,
    #[serde(default)]
    pub filled_quantity: Option<Qty>,
}

/// Authoritative kill-switch status from the API.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct KillSwitchStatus {
    pub engaged: bool,
}

/// Authoritative circuit-breaker status from the API.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CircuitBreakerStatus {
    pub tripped: bool,
    /// Post-trip cool-down during which entries stay blocked.
    pub quiet_period: bool,
}

impl CircuitBreakerStatus {
    pub fn is_safe(&self) -> bool {
        !self.tripped && !self.quiet_period
    }
}

/// A manual order submission, carrying its idempotency key.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ManualOrderRequest {
    /// Submission-intent id; the server deduplicates on this.
    pub intent_id: String,
    pub symbol: String,
    pub side: OrderSide,
    pub quantity: Qty,
    pub order_type: OrderType,
    pub limit_price: Option<Price>,
    pub stop_price: Option<Price>,
    pub time_in_force: TimeInForce,
}

/// Acknowledgement of an accepted order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderAck {
    pub order_id: String,
    /// Quantity the exchange actually accepted (may be clamped).
    pub accepted_quantity: Qty,
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_uncancellable_prefix() {
        let order = OpenOrder {
            order_id: "synthetic-123".to_string(),
            symbol: "AAPL".to_string(),
            side: OrderSide::Buy,
            quantity: Qty::from_shares(10),
            limit_price: None,
        };
        assert!(!order.is_cancellable());

        let normal = OpenOrder {
            order_id: "ord-456".to_string(),
            ..order
        };
        assert!(normal.is_cancellable());
    }

    #[test]
    fn test_closing_side_follows_position_sign() {
        let long = Position {
            symbol: "AAPL".to_string(),
            quantity: Qty::new(dec!(100)),
            avg_price: Price::new(dec!(50)),
        };
        assert_eq!(long.closing_side(), OrderSide::Sell);

        let short = Position {
            quantity: Qty::new(dec!(-100)),
            ..long
        };
        assert_eq!(short.closing_side(), OrderSide::Buy);
    }

    #[test]
    fn test_market_price_timestamp_parsing() {
        let good = MarketPrice {
            symbol: "AAPL".to_string(),
            last: Price::new(dec!(101)),
            timestamp: Some("2026-08-29T14:30:00Z".to_string()),
        };
        assert!(good.parsed_timestamp().is_some());

        let bad = MarketPrice {
            timestamp: Some("not-a-time".to_string()),
            ..good.clone()
        };
        assert!(bad.parsed_timestamp().is_none());

        let missing = MarketPrice {
            timestamp: None,
            ..good
        };
        assert!(missing.parsed_timestamp().is_none());
    }
}
