//! Channel naming conventions consumed from the broker.
//!
//! Price channels are keyed per normalized symbol; the remaining channels
//! are fixed well-known names. Order updates are per-user-scoped.

/// Fixed channel carrying position updates.
pub const POSITIONS: &str = "positions";

/// Fixed channel carrying kill-switch state pushes.
pub const KILL_SWITCH: &str = "safety.kill_switch";

/// Fixed channel carrying circuit-breaker state pushes.
pub const CIRCUIT_BREAKER: &str = "safety.circuit_breaker";

/// Fixed channel carrying connection-health transitions.
pub const CONNECTION: &str = "connection.health";

/// Kv key for the authoritative kill-switch snapshot.
pub const KILL_SWITCH_KEY: &str = "safety/kill_switch";

/// Kv key for the authoritative circuit-breaker snapshot.
pub const CIRCUIT_BREAKER_KEY: &str = "safety/circuit_breaker";

/// Price channel for a symbol, normalized to uppercase.
pub fn price(symbol: &str) -> String {
    format!("prices.{}", symbol.trim().to_uppercase())
}

/// Per-user order-update channel.
pub fn order_updates(user: &str) -> String {
    format!("orders.{user}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_price_channel_normalizes_symbol() {
        assert_eq!(price(" aapl "), "prices.AAPL");
        assert_eq!(price("MSFT"), "prices.MSFT");
    }

    #[test]
    fn test_order_updates_is_user_scoped() {
        assert_eq!(order_updates("trader-7"), "orders.trader-7");
    }
}
