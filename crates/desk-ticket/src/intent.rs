//! Submission intent: a durable idempotency key bound to the full set of
//! order-defining fields.
//!
//! The id is reused across reconnects only while every field of the
//! current form matches the last-stored intent's fields; any difference
//! mints a new id. This gives at-most-one outstanding order per logical
//! edit, and a freshly-edited form can never replay a stale id.

use crate::TicketState;
use desk_client::PersistedForm;
use desk_core::{OrderSide, OrderType, Price, TimeInForce};
use tracing::debug;
use uuid::Uuid;

/// The order-defining fields that determine intent equivalence.
#[derive(Debug, Clone, PartialEq)]
pub struct OrderFields {
    pub symbol: Option<String>,
    pub side: OrderSide,
    pub quantity: Option<u64>,
    pub order_type: OrderType,
    pub limit_price: Option<Price>,
    pub stop_price: Option<Price>,
    pub time_in_force: TimeInForce,
}

impl OrderFields {
    pub fn of(state: &TicketState) -> Self {
        Self {
            symbol: state.symbol.clone(),
            side: state.side,
            quantity: state.quantity,
            order_type: state.order_type,
            limit_price: state.limit_price,
            stop_price: state.stop_price,
            time_in_force: state.time_in_force,
        }
    }

    fn matches_persisted(&self, form: &PersistedForm) -> bool {
        self.symbol == form.symbol
            && self.side == form.side
            && self.quantity == form.quantity
            && self.order_type == form.order_type
            && self.limit_price == form.limit_price
            && self.stop_price == form.stop_price
            && self.time_in_force == form.time_in_force
    }
}

/// A minted or reused submission intent.
#[derive(Debug, Clone, PartialEq)]
pub struct SubmissionIntent {
    pub id: String,
    pub fields: OrderFields,
}

impl SubmissionIntent {
    /// Obtain the intent for the current form state.
    ///
    /// Reuses the persisted id only when every order-defining field
    /// matches; otherwise mints a fresh id.
    pub fn obtain(state: &TicketState, persisted: Option<&PersistedForm>) -> Self {
        let fields = OrderFields::of(state);

        if let Some(form) = persisted {
            if let Some(id) = &form.intent_id {
                if fields.matches_persisted(form) {
                    debug!(intent_id = %id, "reusing persisted submission intent");
                    return Self {
                        id: id.clone(),
                        fields,
                    };
                }
            }
        }

        let id = Uuid::new_v4().to_string();
        debug!(intent_id = %id, "minted new submission intent");
        Self { id, fields }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn state() -> TicketState {
        TicketState {
            symbol: Some("AAPL".to_string()),
            side: OrderSide::Buy,
            quantity: Some(100),
            order_type: OrderType::Limit,
            limit_price: Some(Price::new(dec!(50))),
            stop_price: None,
            time_in_force: TimeInForce::Day,
        }
    }

    #[test]
    fn test_reuses_id_when_fields_match() {
        let st = state();
        let persisted = st.to_persisted(Some("intent-1".to_string()));
        let intent = SubmissionIntent::obtain(&st, Some(&persisted));
        assert_eq!(intent.id, "intent-1");
    }

    #[test]
    fn test_mints_new_id_on_any_field_change() {
        let base = state();
        let persisted = base.to_persisted(Some("intent-1".to_string()));

        let edits: Vec<Box<dyn Fn(&mut TicketState)>> = vec![
            Box::new(|s| s.quantity = Some(200)),
            Box::new(|s| s.limit_price = Some(Price::new(dec!(51)))),
            Box::new(|s| s.side = OrderSide::Sell),
            Box::new(|s| s.order_type = OrderType::Market),
            Box::new(|s| s.time_in_force = TimeInForce::GoodTilCancelled),
            Box::new(|s| s.symbol = Some("MSFT".to_string())),
        ];

        for edit in edits {
            let mut edited = base.clone();
            edit(&mut edited);
            let intent = SubmissionIntent::obtain(&edited, Some(&persisted));
            assert_ne!(intent.id, "intent-1", "edited form must mint a new id");
        }
    }

    #[test]
    fn test_mints_when_no_persisted_intent() {
        let st = state();
        let persisted = st.to_persisted(None);
        let intent = SubmissionIntent::obtain(&st, Some(&persisted));
        assert!(!intent.id.is_empty());

        let other = SubmissionIntent::obtain(&st, None);
        assert_ne!(intent.id, other.id);
    }
}
