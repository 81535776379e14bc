//! Persisted form-state store contract.
//!
//! Keyed by a per-tab/session scope string. Holds the pending order form
//! (including its submission-intent id) across reconnects and the
//! one-click trading preferences with the running daily notional ledger.

use crate::error::FormStoreError;
use crate::BoxFuture;
use desk_core::{OrderSide, OrderType, Price, TimeInForce};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Snapshot of the order form as persisted per scope.
///
/// The intent id is reusable only while every order-defining field here
/// matches the live ticket; the ticket mints a new id on any difference.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PersistedForm {
    pub symbol: Option<String>,
    pub side: OrderSide,
    pub quantity: Option<u64>,
    pub order_type: OrderType,
    pub limit_price: Option<Price>,
    pub stop_price: Option<Price>,
    pub time_in_force: TimeInForce,
    /// Idempotency key of the last minted submission intent.
    pub intent_id: Option<String>,
}

/// One-click trading preferences and daily notional ledger.
///
/// Best-effort client-side tracking; the authoritative cap is enforced
/// server-side.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct OneClickPrefs {
    /// Set after the first-use confirmation gate is acknowledged.
    pub armed: bool,
    /// Notional already spent today through one-click orders.
    pub daily_notional_used: Decimal,
    /// UTC date (YYYY-MM-DD) the ledger applies to; rollover resets it.
    pub ledger_date: String,
}

/// Per-scope persisted form-state store.
pub trait FormStore: Send + Sync {
    fn restore_state(&self, scope: String) -> BoxFuture<'_, Result<Option<PersistedForm>, FormStoreError>>;

    fn save_pending_form(&self, scope: String, form: PersistedForm) -> BoxFuture<'_, Result<(), FormStoreError>>;

    fn clear_pending_form(&self, scope: String) -> BoxFuture<'_, Result<(), FormStoreError>>;

    fn save_preferences(&self, scope: String, prefs: OneClickPrefs) -> BoxFuture<'_, Result<(), FormStoreError>>;

    fn load_preferences(&self, scope: String) -> BoxFuture<'_, Result<Option<OneClickPrefs>, FormStoreError>>;
}
