//! Safety vocabulary: policies, tri-state signals, and check results.
//!
//! Every safety decision in the system runs through these types. The two
//! policies encode the load-bearing distinction between risk-reducing
//! actions (cancel, flatten: never blocked by an unsafe signal) and
//! risk-increasing actions (new entry, reverse: blocked under any doubt).

use serde::{Deserialize, Serialize};
use std::fmt;

/// Safety policy attached to every check call. Never stored.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SafetyPolicy {
    /// Permit despite uncertainty: the action reduces risk.
    FailOpen,
    /// Block under any uncertainty: the action increases risk.
    FailClosed,
}

impl fmt::Display for SafetyPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::FailOpen => write!(f, "fail_open"),
            Self::FailClosed => write!(f, "fail_closed"),
        }
    }
}

/// Tri-state classification of a cached safety signal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignalState {
    Safe,
    Unsafe,
    /// Missing, malformed, or unrecognized signal value.
    Unknown,
}

/// Classify a cached connection-health value.
///
/// `degraded` still dispatches data but is not fully trusted; it counts
/// as unsafe for submission purposes. Unrecognized strings are unknown,
/// never silently safe.
pub fn classify_connection(value: Option<&str>) -> SignalState {
    match value {
        Some("connected") => SignalState::Safe,
        Some("degraded") | Some("reconnecting") | Some("disconnected") | Some("read_only") => {
            SignalState::Unsafe
        }
        Some(_) => SignalState::Unknown,
        None => SignalState::Unknown,
    }
}

/// True only for states where the broker connection is genuinely down.
///
/// Resubscription fires on a transition out of one of these, not out of
/// a merely-degraded state.
pub fn is_truly_disconnected(value: Option<&str>) -> bool {
    matches!(value, Some("disconnected") | Some("reconnecting"))
}

/// Classify a cached kill-switch value.
pub fn classify_kill_switch(value: Option<&str>) -> SignalState {
    match value {
        Some("disengaged") => SignalState::Safe,
        Some("engaged") => SignalState::Unsafe,
        Some(_) | None => SignalState::Unknown,
    }
}

/// Classify a cached circuit-breaker value.
///
/// `quiet_period` (the cool-down after a trip) is still unsafe.
pub fn classify_circuit_breaker(value: Option<&str>) -> SignalState {
    match value {
        Some("normal") => SignalState::Safe,
        Some("tripped") | Some("quiet_period") => SignalState::Unsafe,
        Some(_) | None => SignalState::Unknown,
    }
}

/// Injectable snapshot of the cached safety signals.
///
/// Owned and propagated by the Coordinator; consumers receive it through
/// registered setters and pass it into every eligibility check. Raw signal
/// strings are kept as delivered so the classifiers decide safety, not the
/// transport.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SafetyState {
    /// Cached connection-health signal, `None` until first delivery.
    pub connection: Option<String>,
    /// Cached kill-switch signal.
    pub kill_switch: Option<String>,
    /// Cached circuit-breaker signal.
    pub circuit_breaker: Option<String>,
}

impl SafetyState {
    /// True once every signal has been delivered at least once.
    pub fn is_loaded(&self) -> bool {
        self.connection.is_some() && self.kill_switch.is_some() && self.circuit_breaker.is_some()
    }

    pub fn connection_state(&self) -> SignalState {
        classify_connection(self.connection.as_deref())
    }

    pub fn kill_switch_state(&self) -> SignalState {
        classify_kill_switch(self.kill_switch.as_deref())
    }

    pub fn circuit_breaker_state(&self) -> SignalState {
        classify_circuit_breaker(self.circuit_breaker.as_deref())
    }
}

/// Immutable outcome of a safety check.
///
/// `reason` is populated only when `allowed` is false. Warnings accumulate
/// in evaluation order and are surfaced to the user alongside the action.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SafetyCheckResult {
    pub allowed: bool,
    pub reason: Option<String>,
    pub warnings: Vec<String>,
}

impl SafetyCheckResult {
    /// An allowed result with no warnings.
    pub fn allowed() -> Self {
        Self {
            allowed: true,
            reason: None,
            warnings: Vec::new(),
        }
    }

    /// An allowed result carrying accumulated warnings.
    pub fn allowed_with(warnings: Vec<String>) -> Self {
        Self {
            allowed: true,
            reason: None,
            warnings,
        }
    }

    /// A blocked result with a descriptive reason.
    pub fn blocked(reason: impl Into<String>) -> Self {
        Self {
            allowed: false,
            reason: Some(reason.into()),
            warnings: Vec::new(),
        }
    }

    /// A blocked result that also carries warnings gathered before the block.
    pub fn blocked_with(reason: impl Into<String>, warnings: Vec<String>) -> Self {
        Self {
            allowed: false,
            reason: Some(reason.into()),
            warnings,
        }
    }

    pub fn has_warnings(&self) -> bool {
        !self.warnings.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify_connection() {
        assert_eq!(classify_connection(Some("connected")), SignalState::Safe);
        assert_eq!(classify_connection(Some("disconnected")), SignalState::Unsafe);
        assert_eq!(classify_connection(Some("read_only")), SignalState::Unsafe);
        assert_eq!(classify_connection(Some("degraded")), SignalState::Unsafe);
        assert_eq!(classify_connection(Some("banana")), SignalState::Unknown);
        assert_eq!(classify_connection(None), SignalState::Unknown);
    }

    #[test]
    fn test_classify_kill_switch() {
        assert_eq!(classify_kill_switch(Some("disengaged")), SignalState::Safe);
        assert_eq!(classify_kill_switch(Some("engaged")), SignalState::Unsafe);
        assert_eq!(classify_kill_switch(Some("ENGAGED")), SignalState::Unknown);
        assert_eq!(classify_kill_switch(None), SignalState::Unknown);
    }

    #[test]
    fn test_classify_circuit_breaker() {
        assert_eq!(classify_circuit_breaker(Some("normal")), SignalState::Safe);
        assert_eq!(classify_circuit_breaker(Some("tripped")), SignalState::Unsafe);
        assert_eq!(
            classify_circuit_breaker(Some("quiet_period")),
            SignalState::Unsafe
        );
        assert_eq!(classify_circuit_breaker(Some("???")), SignalState::Unknown);
    }

    #[test]
    fn test_truly_disconnected() {
        assert!(is_truly_disconnected(Some("disconnected")));
        assert!(is_truly_disconnected(Some("reconnecting")));
        assert!(!is_truly_disconnected(Some("degraded")));
        assert!(!is_truly_disconnected(Some("connected")));
        assert!(!is_truly_disconnected(None));
    }

    #[test]
    fn test_safety_state_loaded() {
        let mut state = SafetyState::default();
        assert!(!state.is_loaded());

        state.connection = Some("connected".to_string());
        state.kill_switch = Some("disengaged".to_string());
        assert!(!state.is_loaded());

        state.circuit_breaker = Some("normal".to_string());
        assert!(state.is_loaded());
    }

    #[test]
    fn test_check_result_constructors() {
        let ok = SafetyCheckResult::allowed();
        assert!(ok.allowed);
        assert!(ok.reason.is_none());
        assert!(!ok.has_warnings());

        let blocked = SafetyCheckResult::blocked("kill switch engaged");
        assert!(!blocked.allowed);
        assert_eq!(blocked.reason.as_deref(), Some("kill switch engaged"));

        let warned = SafetyCheckResult::allowed_with(vec!["connection unknown".to_string()]);
        assert!(warned.allowed);
        assert!(warned.has_warnings());
    }
}
