//! Mutable order-ticket form state.
//!
//! Mutated only by user input handlers and session-recovery restore.

use desk_client::PersistedForm;
use desk_core::{OrderSide, OrderType, Price, TimeInForce};

/// The order form as currently edited.
#[derive(Debug, Clone, PartialEq)]
pub struct TicketState {
    pub symbol: Option<String>,
    pub side: OrderSide,
    pub quantity: Option<u64>,
    pub order_type: OrderType,
    pub limit_price: Option<Price>,
    pub stop_price: Option<Price>,
    pub time_in_force: TimeInForce,
}

impl Default for TicketState {
    fn default() -> Self {
        Self {
            symbol: None,
            side: OrderSide::Buy,
            quantity: None,
            order_type: OrderType::Market,
            limit_price: None,
            stop_price: None,
            time_in_force: TimeInForce::Day,
        }
    }
}

impl TicketState {
    /// Restore from a persisted form (session recovery).
    pub fn from_persisted(form: &PersistedForm) -> Self {
        Self {
            symbol: form.symbol.clone(),
            side: form.side,
            quantity: form.quantity,
            order_type: form.order_type,
            limit_price: form.limit_price,
            stop_price: form.stop_price,
            time_in_force: form.time_in_force,
        }
    }

    /// Snapshot into the persisted representation, carrying `intent_id`.
    pub fn to_persisted(&self, intent_id: Option<String>) -> PersistedForm {
        PersistedForm {
            symbol: self.symbol.clone(),
            side: self.side,
            quantity: self.quantity,
            order_type: self.order_type,
            limit_price: self.limit_price,
            stop_price: self.stop_price,
            time_in_force: self.time_in_force,
            intent_id,
        }
    }
}
