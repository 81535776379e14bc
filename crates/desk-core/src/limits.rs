//! Fetched risk/position limit snapshot.
//!
//! Limits are fetched from the account service, never computed here.
//! Each field is optional and independently stale-checked by the ticket.

use crate::decimal::Qty;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Risk limits as last fetched, with the current exposure reading that
/// arrived alongside them.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RiskLimits {
    /// Maximum absolute position per symbol, in shares.
    pub max_position_per_symbol: Option<Qty>,
    /// Maximum notional per single order.
    pub max_notional_per_order: Option<Decimal>,
    /// Maximum total portfolio exposure.
    pub max_total_exposure: Option<Decimal>,
    /// Current total exposure as reported by the account service.
    ///
    /// When `max_total_exposure` is configured and this is `None`, orders
    /// are blocked: missing exposure data fails closed, never skipped.
    pub current_total_exposure: Option<Decimal>,
}
