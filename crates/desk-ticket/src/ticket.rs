//! The order ticket: data setters, eligibility, and idempotent two-phase
//! submission.
//!
//! Preview snapshots every order-defining field and obtains a submission
//! intent. Confirm re-validates the full eligibility chain from scratch
//! (data may have gone stale while the dialog was open), rejects on
//! snapshot drift, then performs live safety verification before
//! submitting. Success clears the persisted intent; any rejection leaves
//! it intact so a retry reuses the same id.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::{info, warn};

use desk_client::{FormStore, ManualOrderRequest, OrderAck, TradingApi};
use desk_core::{
    DataDimension, Freshness, OrderSide, OrderType, Price, Qty, RiskLimits, SafetyPolicy,
    SafetyState, StalenessThresholds, TimeInForce,
};
use desk_safety::SafetyGate;

use crate::eligibility::{should_disable_submission, DisableReason, EligibilityContext};
use crate::error::{TicketError, TicketResult};
use crate::intent::{OrderFields, SubmissionIntent};
use crate::state::TicketState;

/// Value-equality copy of the order-defining fields taken at preview time,
/// with the intent obtained for them. Used solely to detect drift before a
/// confirm executes.
#[derive(Debug, Clone, PartialEq)]
pub struct PreviewSnapshot {
    pub intent: SubmissionIntent,
}

/// The order ticket for one tab/session scope.
pub struct OrderTicket {
    scope: String,
    api: Arc<dyn TradingApi>,
    gate: SafetyGate,
    forms: Arc<dyn FormStore>,
    thresholds: StalenessThresholds,
    state: TicketState,
    freshness: Freshness,
    safety: SafetyState,
    limits: Option<RiskLimits>,
    position: Qty,
    last_price: Option<Price>,
    preview: Option<PreviewSnapshot>,
}

impl OrderTicket {
    pub fn new(
        scope: impl Into<String>,
        api: Arc<dyn TradingApi>,
        forms: Arc<dyn FormStore>,
        thresholds: StalenessThresholds,
    ) -> Self {
        Self {
            scope: scope.into(),
            gate: SafetyGate::new(api.clone()),
            api,
            forms,
            thresholds,
            state: TicketState::default(),
            freshness: Freshness::default(),
            safety: SafetyState::default(),
            limits: None,
            position: Qty::ZERO,
            last_price: None,
            preview: None,
        }
    }

    /// Session recovery: restore the persisted form for this scope.
    pub async fn restore(&mut self) -> TicketResult<()> {
        if let Some(form) = self.forms.restore_state(self.scope.clone()).await? {
            info!(scope = %self.scope, "restored pending order form");
            self.state = TicketState::from_persisted(&form);
        }
        Ok(())
    }

    pub fn state(&self) -> &TicketState {
        &self.state
    }

    // --- user input handlers ---

    pub fn set_symbol(&mut self, symbol: Option<String>) {
        self.state.symbol = symbol.map(|s| s.trim().to_uppercase());
    }

    pub fn set_side(&mut self, side: OrderSide) {
        self.state.side = side;
    }

    pub fn set_quantity(&mut self, quantity: Option<u64>) {
        self.state.quantity = quantity;
    }

    pub fn set_order_type(&mut self, order_type: OrderType) {
        self.state.order_type = order_type;
    }

    pub fn set_limit_price(&mut self, price: Option<Price>) {
        self.state.limit_price = price;
    }

    pub fn set_stop_price(&mut self, price: Option<Price>) {
        self.state.stop_price = price;
    }

    pub fn set_time_in_force(&mut self, tif: TimeInForce) {
        self.state.time_in_force = tif;
    }

    // --- consumer state setters (driven by the coordinator) ---

    pub fn set_safety_state(&mut self, safety: SafetyState) {
        self.safety = safety;
    }

    pub fn set_position(&mut self, position: Qty, at: DateTime<Utc>) {
        self.position = position;
        self.freshness.touch(DataDimension::Position, at);
    }

    pub fn set_last_price(&mut self, price: Price, at: DateTime<Utc>) {
        self.last_price = price.is_positive().then_some(price);
        self.freshness.touch(DataDimension::Price, at);
    }

    /// Record a buying-power delivery. Only the freshness stamp gates the
    /// ticket; the value itself is account-level display state.
    pub fn set_buying_power(&mut self, at: DateTime<Utc>) {
        self.freshness.touch(DataDimension::BuyingPower, at);
    }

    pub fn set_risk_limits(&mut self, limits: RiskLimits, at: DateTime<Utc>) {
        self.limits = Some(limits);
        self.freshness.touch(DataDimension::RiskLimits, at);
    }

    /// The submit-eligibility chain as of `now`.
    pub fn eligibility(&self, now: DateTime<Utc>) -> Option<DisableReason> {
        should_disable_submission(&EligibilityContext {
            state: &self.state,
            safety: &self.safety,
            freshness: &self.freshness,
            thresholds: &self.thresholds,
            limits: self.limits.as_ref(),
            position: self.position,
            last_price: self.last_price,
            now,
        })
    }

    /// Phase one: snapshot the form and obtain (or mint) the submission
    /// intent, persisting it for reuse across reconnects.
    pub async fn preview(&mut self) -> TicketResult<PreviewSnapshot> {
        if let Some(reason) = self.eligibility(Utc::now()) {
            return Err(TicketError::Blocked(reason));
        }

        let persisted = self.forms.restore_state(self.scope.clone()).await?;
        let intent = SubmissionIntent::obtain(&self.state, persisted.as_ref());
        self.forms
            .save_pending_form(
                self.scope.clone(),
                self.state.to_persisted(Some(intent.id.clone())),
            )
            .await?;

        let snapshot = PreviewSnapshot { intent };
        self.preview = Some(snapshot.clone());
        Ok(snapshot)
    }

    /// Discard the preview snapshot without submitting.
    pub fn cancel_preview(&mut self) {
        self.preview = None;
    }

    /// Phase two: re-validate everything, verify safety live, submit.
    pub async fn confirm(&mut self) -> TicketResult<OrderAck> {
        let snapshot = self.preview.clone().ok_or(TicketError::NoPreview)?;

        // Data may have gone stale while the confirm dialog was open.
        if let Some(reason) = self.eligibility(Utc::now()) {
            return Err(TicketError::Blocked(reason));
        }

        if OrderFields::of(&self.state) != snapshot.intent.fields {
            warn!(scope = %self.scope, "order form drifted since preview");
            self.preview = None;
            return Err(TicketError::SnapshotDrift);
        }

        let verified = self
            .gate
            .check_with_api_verification(SafetyPolicy::FailClosed, &self.safety)
            .await;
        if !verified.allowed {
            let reason = verified
                .reason
                .unwrap_or_else(|| "safety verification failed".to_string());
            return Err(TicketError::SafetyBlocked(reason));
        }

        let symbol = self
            .state
            .symbol
            .clone()
            .ok_or(TicketError::Blocked(DisableReason::NoSymbol))?;
        let quantity = self
            .state
            .quantity
            .ok_or(TicketError::Blocked(DisableReason::InvalidQuantity))?;

        let request = ManualOrderRequest {
            intent_id: snapshot.intent.id.clone(),
            symbol: symbol.clone(),
            side: self.state.side,
            quantity: Qty::from_shares(quantity),
            order_type: self.state.order_type,
            limit_price: self.state.limit_price,
            stop_price: self.state.stop_price,
            time_in_force: self.state.time_in_force,
        };

        let ack = self.api.submit_manual_order(request).await?;
        info!(
            scope = %self.scope,
            %symbol,
            intent_id = %snapshot.intent.id,
            order_id = %ack.order_id,
            "order submitted"
        );

        // Success consumes the intent; a later submit is a new logical order.
        self.forms.clear_pending_form(self.scope.clone()).await?;
        self.preview = None;
        Ok(ack)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use desk_client::mock::{MemoryFormStore, MockTradingApi};
    use desk_client::{ApiError, KillSwitchStatus};
    use rust_decimal_macros::dec;

    struct Harness {
        api: Arc<MockTradingApi>,
        forms: Arc<MemoryFormStore>,
        ticket: OrderTicket,
    }

    fn ready_ticket() -> Harness {
        let api = Arc::new(MockTradingApi::new());
        let forms = Arc::new(MemoryFormStore::new());
        let mut ticket = OrderTicket::new(
            "tab-1",
            api.clone(),
            forms.clone(),
            StalenessThresholds::default(),
        );

        let now = Utc::now();
        ticket.set_safety_state(SafetyState {
            connection: Some("connected".to_string()),
            kill_switch: Some("disengaged".to_string()),
            circuit_breaker: Some("normal".to_string()),
        });
        ticket.set_symbol(Some("aapl".to_string()));
        ticket.set_quantity(Some(100));
        ticket.set_order_type(OrderType::Limit);
        ticket.set_limit_price(Some(Price::new(dec!(50))));
        ticket.set_position(Qty::ZERO, now);
        ticket.set_last_price(Price::new(dec!(50)), now);
        ticket.set_buying_power(now);
        ticket.set_risk_limits(RiskLimits::default(), now);

        Harness { api, forms, ticket }
    }

    #[tokio::test]
    async fn test_preview_twice_without_edit_reuses_intent() {
        let mut h = ready_ticket();
        let first = h.ticket.preview().await.unwrap();
        let second = h.ticket.preview().await.unwrap();
        assert_eq!(first.intent.id, second.intent.id);
    }

    #[tokio::test]
    async fn test_edit_between_previews_mints_new_intent() {
        let mut h = ready_ticket();
        let first = h.ticket.preview().await.unwrap();
        h.ticket.set_quantity(Some(200));
        let second = h.ticket.preview().await.unwrap();
        assert_ne!(first.intent.id, second.intent.id);
    }

    #[tokio::test]
    async fn test_confirm_submits_and_clears_intent() {
        let mut h = ready_ticket();
        let snapshot = h.ticket.preview().await.unwrap();
        assert!(h.forms.pending_form("tab-1").is_some());

        let ack = h.ticket.confirm().await.unwrap();
        assert_eq!(ack.accepted_quantity, Qty::from_shares(100));

        let submitted = h.api.submitted();
        assert_eq!(submitted.len(), 1);
        assert_eq!(submitted[0].intent_id, snapshot.intent.id);
        assert_eq!(submitted[0].symbol, "AAPL");
        assert!(h.forms.pending_form("tab-1").is_none());
    }

    #[tokio::test]
    async fn test_confirm_without_preview_fails() {
        let mut h = ready_ticket();
        assert!(matches!(h.ticket.confirm().await, Err(TicketError::NoPreview)));
    }

    #[tokio::test]
    async fn test_confirm_rejects_on_drift() {
        let mut h = ready_ticket();
        h.ticket.preview().await.unwrap();
        h.ticket.set_quantity(Some(150));

        let result = h.ticket.confirm().await;
        assert!(matches!(result, Err(TicketError::SnapshotDrift)));
        // Persisted intent survives for the re-preview.
        assert!(h.forms.pending_form("tab-1").is_some());
        assert!(h.api.submitted().is_empty());
    }

    #[tokio::test]
    async fn test_confirm_revalidates_staleness() {
        let mut h = ready_ticket();
        h.ticket.preview().await.unwrap();

        // Price went stale while the dialog was open.
        let long_ago = Utc::now() - chrono::Duration::hours(1);
        h.ticket.set_last_price(Price::new(dec!(50)), long_ago);

        let result = h.ticket.confirm().await;
        assert!(matches!(
            result,
            Err(TicketError::Blocked(DisableReason::StaleData(DataDimension::Price)))
        ));
        assert!(h.api.submitted().is_empty());
    }

    #[tokio::test]
    async fn test_confirm_blocked_by_live_verification_keeps_intent() {
        let mut h = ready_ticket();
        let first = h.ticket.preview().await.unwrap();

        h.api.set_kill_switch(Ok(KillSwitchStatus { engaged: true }));
        let result = h.ticket.confirm().await;
        assert!(matches!(result, Err(TicketError::SafetyBlocked(_))));
        assert!(h.api.submitted().is_empty());

        // Retry after the switch clears reuses the same intent id.
        h.api.set_kill_switch(Ok(KillSwitchStatus { engaged: false }));
        let second = h.ticket.preview().await.unwrap();
        assert_eq!(first.intent.id, second.intent.id);
        h.ticket.confirm().await.unwrap();
        assert_eq!(h.api.submitted()[0].intent_id, first.intent.id);
    }

    #[tokio::test]
    async fn test_submit_failure_retries_with_same_intent() {
        let mut h = ready_ticket();
        h.api.push_submit_response(Err(ApiError::Server {
            status: 502,
            message: "bad gateway".to_string(),
        }));

        let snapshot = h.ticket.preview().await.unwrap();
        assert!(matches!(h.ticket.confirm().await, Err(TicketError::Api(_))));

        // Preview again without edits: same id, and the server sees the
        // same idempotency key on the retry.
        h.ticket.preview().await.unwrap();
        h.ticket.confirm().await.unwrap();

        let submitted = h.api.submitted();
        assert_eq!(submitted.len(), 2);
        assert_eq!(submitted[0].intent_id, snapshot.intent.id);
        assert_eq!(submitted[1].intent_id, snapshot.intent.id);
    }

    #[tokio::test]
    async fn test_restore_recovers_form() {
        let h = ready_ticket();
        let form = h.ticket.state().to_persisted(Some("intent-9".to_string()));
        h.forms
            .save_pending_form("tab-2".to_string(), form)
            .await
            .unwrap();

        let mut restored = OrderTicket::new(
            "tab-2",
            h.api.clone(),
            h.forms.clone(),
            StalenessThresholds::default(),
        );
        restored.restore().await.unwrap();
        assert_eq!(restored.state().symbol.as_deref(), Some("AAPL"));
        assert_eq!(restored.state().quantity, Some(100));
    }
}
