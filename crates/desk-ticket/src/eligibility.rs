//! Submission eligibility: an ordered chain of fail-closed gates.
//!
//! Returns the first blocking reason found, in a fixed order so the UI
//! always shows the most fundamental problem first. Every gate here fails
//! closed; the FAIL_OPEN posture exists only in the workflows, never on
//! the submit path.

use crate::validate::{check_risk_limits, validate_order_prices, LimitViolation, ValidationError};
use crate::TicketState;
use chrono::{DateTime, Utc};
use desk_core::{
    DataDimension, Freshness, Price, Qty, RiskLimits, SafetyState, SignalState,
    StalenessThresholds,
};
use std::fmt;

/// First blocking gate in the eligibility chain.
#[derive(Debug, Clone, PartialEq)]
pub enum DisableReason {
    SafetyStateNotLoaded,
    ConnectionUnavailable,
    KillSwitchEngaged,
    CircuitBreakerTripped,
    NoSymbol,
    InvalidQuantity,
    StaleData(DataDimension),
    Validation(ValidationError),
    RiskLimitsNotLoaded,
    LimitViolation(LimitViolation),
}

impl fmt::Display for DisableReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::SafetyStateNotLoaded => write!(f, "safety state not yet loaded"),
            Self::ConnectionUnavailable => write!(f, "connection unavailable"),
            Self::KillSwitchEngaged => write!(f, "kill switch engaged or unknown"),
            Self::CircuitBreakerTripped => write!(f, "circuit breaker tripped or unknown"),
            Self::NoSymbol => write!(f, "no symbol selected"),
            Self::InvalidQuantity => write!(f, "quantity missing or not a positive whole number"),
            Self::StaleData(dim) => write!(f, "{dim} data is stale"),
            Self::Validation(err) => write!(f, "{err}"),
            Self::RiskLimitsNotLoaded => write!(f, "risk limits not loaded"),
            Self::LimitViolation(v) => write!(f, "{v}"),
        }
    }
}

/// Everything the eligibility chain reads, gathered by the ticket.
pub struct EligibilityContext<'a> {
    pub state: &'a TicketState,
    pub safety: &'a SafetyState,
    pub freshness: &'a Freshness,
    pub thresholds: &'a StalenessThresholds,
    /// Fetched limits; `None` until the first successful fetch.
    pub limits: Option<&'a RiskLimits>,
    /// Signed position at the ticket's symbol.
    pub position: Qty,
    pub last_price: Option<Price>,
    pub now: DateTime<Utc>,
}

/// Evaluate the chain; `None` means the submit button may be enabled.
pub fn should_disable_submission(ctx: &EligibilityContext<'_>) -> Option<DisableReason> {
    if !ctx.safety.is_loaded() {
        return Some(DisableReason::SafetyStateNotLoaded);
    }
    if ctx.safety.connection_state() != SignalState::Safe {
        return Some(DisableReason::ConnectionUnavailable);
    }
    if ctx.safety.kill_switch_state() != SignalState::Safe {
        return Some(DisableReason::KillSwitchEngaged);
    }
    if ctx.safety.circuit_breaker_state() != SignalState::Safe {
        return Some(DisableReason::CircuitBreakerTripped);
    }

    match ctx.state.symbol.as_deref() {
        None => return Some(DisableReason::NoSymbol),
        Some(s) if s.trim().is_empty() => return Some(DisableReason::NoSymbol),
        Some(_) => {}
    }
    match ctx.state.quantity {
        None | Some(0) => return Some(DisableReason::InvalidQuantity),
        Some(_) => {}
    }

    for dim in [
        DataDimension::Position,
        DataDimension::Price,
        DataDimension::BuyingPower,
    ] {
        if ctx.freshness.is_stale(dim, ctx.thresholds, ctx.now) {
            return Some(DisableReason::StaleData(dim));
        }
    }

    if let Err(err) = validate_order_prices(
        ctx.state.order_type,
        ctx.state.side,
        ctx.state.limit_price,
        ctx.state.stop_price,
    ) {
        return Some(DisableReason::Validation(err));
    }

    let limits = match ctx.limits {
        None => return Some(DisableReason::RiskLimitsNotLoaded),
        Some(limits) => limits,
    };
    if ctx
        .freshness
        .is_stale(DataDimension::RiskLimits, ctx.thresholds, ctx.now)
    {
        return Some(DisableReason::StaleData(DataDimension::RiskLimits));
    }

    if let Err(violation) = check_risk_limits(
        ctx.state.side,
        ctx.state.quantity.unwrap_or(0),
        ctx.state.order_type,
        ctx.state.limit_price,
        ctx.state.stop_price,
        ctx.last_price,
        ctx.position,
        limits,
    ) {
        return Some(DisableReason::LimitViolation(violation));
    }

    None
}
