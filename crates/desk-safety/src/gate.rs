//! Policy-parameterized safety checks over cached and verified signals.
//!
//! Both operations evaluate connection, then kill switch, then circuit
//! breaker, short-circuiting on the first FAIL_CLOSED block. Under
//! FAIL_OPEN nothing blocks: unsafe or unknown signals become warnings,
//! because a risk-reducing action must never be stopped by an unsafe or
//! misbehaving safety service.

use std::sync::Arc;

use desk_client::{ApiError, TradingApi};
use desk_core::{SafetyCheckResult, SafetyPolicy, SafetyState, SignalState};
use tracing::{debug, warn};

/// Outcome of evaluating one signal under a policy.
enum Verdict {
    Pass,
    /// FAIL_CLOSED block with reason.
    Block(String),
    /// FAIL_OPEN warning.
    Warn(String),
}

fn resolve(policy: SafetyPolicy, state: SignalState, unsafe_reason: &str, unknown_reason: &str) -> Verdict {
    let reason = match state {
        SignalState::Safe => return Verdict::Pass,
        SignalState::Unsafe => unsafe_reason,
        SignalState::Unknown => unknown_reason,
    };
    match policy {
        SafetyPolicy::FailClosed => Verdict::Block(reason.to_string()),
        SafetyPolicy::FailOpen => Verdict::Warn(reason.to_string()),
    }
}

/// Resolve a verification round-trip failure. Transient (5xx/unreachable)
/// and client (4xx) errors get the same two-branch treatment: a
/// misconfigured safety service must never block a risk-reducing action,
/// and must always block a risk-increasing one.
fn resolve_api_error(policy: SafetyPolicy, signal: &str, error: &ApiError) -> Verdict {
    let reason = format!("{signal} verification failed: {error}");
    match policy {
        SafetyPolicy::FailClosed => Verdict::Block(reason),
        SafetyPolicy::FailOpen => Verdict::Warn(reason),
    }
}

/// The safety gate. Stateless apart from the injected trading API used by
/// the verified path.
pub struct SafetyGate {
    api: Arc<dyn TradingApi>,
}

impl SafetyGate {
    pub fn new(api: Arc<dyn TradingApi>) -> Self {
        Self { api }
    }

    /// Cached check: cheap enough to run on every state change.
    ///
    /// `require_connected` is false for actions that may proceed without
    /// live market data (e.g. bulk cancel of resting orders); the
    /// connection signal is then not evaluated at all.
    pub fn check(
        policy: SafetyPolicy,
        state: &SafetyState,
        require_connected: bool,
    ) -> SafetyCheckResult {
        let mut warnings = Vec::new();

        if require_connected {
            let verdict = resolve(
                policy,
                state.connection_state(),
                &format!(
                    "connection unavailable ({})",
                    state.connection.as_deref().unwrap_or("unset")
                ),
                "connection state unknown",
            );
            match verdict {
                Verdict::Pass => {}
                Verdict::Block(reason) => {
                    debug!(%policy, %reason, "safety check blocked on connection");
                    return SafetyCheckResult::blocked_with(reason, warnings);
                }
                Verdict::Warn(reason) => warnings.push(reason),
            }
        }

        let verdict = resolve(
            policy,
            state.kill_switch_state(),
            "kill switch engaged",
            "kill switch state unknown",
        );
        match verdict {
            Verdict::Pass => {}
            Verdict::Block(reason) => {
                debug!(%policy, %reason, "safety check blocked on kill switch");
                return SafetyCheckResult::blocked_with(reason, warnings);
            }
            Verdict::Warn(reason) => warnings.push(reason),
        }

        let verdict = resolve(
            policy,
            state.circuit_breaker_state(),
            "circuit breaker tripped or in quiet period",
            "circuit breaker state unknown",
        );
        match verdict {
            Verdict::Pass => {}
            Verdict::Block(reason) => {
                debug!(%policy, %reason, "safety check blocked on circuit breaker");
                return SafetyCheckResult::blocked_with(reason, warnings);
            }
            Verdict::Warn(reason) => warnings.push(reason),
        }

        SafetyCheckResult::allowed_with(warnings)
    }

    /// Verified check: cached connection evaluation plus one live
    /// round-trip per safety signal. Run immediately before submitting an
    /// irreversible action.
    pub async fn check_with_api_verification(
        &self,
        policy: SafetyPolicy,
        state: &SafetyState,
    ) -> SafetyCheckResult {
        let mut warnings = Vec::new();

        let verdict = resolve(
            policy,
            state.connection_state(),
            &format!(
                "connection unavailable ({})",
                state.connection.as_deref().unwrap_or("unset")
            ),
            "connection state unknown",
        );
        match verdict {
            Verdict::Pass => {}
            Verdict::Block(reason) => return SafetyCheckResult::blocked_with(reason, warnings),
            Verdict::Warn(reason) => warnings.push(reason),
        }

        let kill_verdict = match self.api.fetch_kill_switch_status().await {
            Ok(status) if status.engaged => resolve(
                policy,
                SignalState::Unsafe,
                "kill switch engaged (verified)",
                "",
            ),
            Ok(_) => Verdict::Pass,
            Err(error) => {
                warn!(%error, "kill switch verification round-trip failed");
                resolve_api_error(policy, "kill switch", &error)
            }
        };
        match kill_verdict {
            Verdict::Pass => {}
            Verdict::Block(reason) => return SafetyCheckResult::blocked_with(reason, warnings),
            Verdict::Warn(reason) => warnings.push(reason),
        }

        let breaker_verdict = match self.api.fetch_circuit_breaker_status().await {
            Ok(status) if !status.is_safe() => resolve(
                policy,
                SignalState::Unsafe,
                "circuit breaker tripped or in quiet period (verified)",
                "",
            ),
            Ok(_) => Verdict::Pass,
            Err(error) => {
                warn!(%error, "circuit breaker verification round-trip failed");
                resolve_api_error(policy, "circuit breaker", &error)
            }
        };
        match breaker_verdict {
            Verdict::Pass => {}
            Verdict::Block(reason) => return SafetyCheckResult::blocked_with(reason, warnings),
            Verdict::Warn(reason) => warnings.push(reason),
        }

        SafetyCheckResult::allowed_with(warnings)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use desk_client::mock::MockTradingApi;
    use desk_client::{CircuitBreakerStatus, KillSwitchStatus};

    fn state(connection: &str, kill: &str, breaker: &str) -> SafetyState {
        let opt = |v: &str| {
            if v == "unset" {
                None
            } else {
                Some(v.to_string())
            }
        };
        SafetyState {
            connection: opt(connection),
            kill_switch: opt(kill),
            circuit_breaker: opt(breaker),
        }
    }

    const SAFE: [&str; 3] = ["connected", "disengaged", "normal"];
    const UNSAFE: [&str; 3] = ["disconnected", "engaged", "tripped"];
    const UNKNOWN: [&str; 3] = ["unset", "garbled", "garbled"];

    /// For every combination of {safe, unsafe, unknown} across the three
    /// signals: FAIL_CLOSED allows iff all safe; FAIL_OPEN always allows,
    /// with warnings iff any signal is non-safe.
    #[test]
    fn test_policy_matrix() {
        for conn in 0..3 {
            for kill in 0..3 {
                for breaker in 0..3 {
                    let pick = |idx: usize, sig: usize| match idx {
                        0 => SAFE[sig],
                        1 => UNSAFE[sig],
                        _ => UNKNOWN[sig],
                    };
                    let s = state(pick(conn, 0), pick(kill, 1), pick(breaker, 2));
                    let all_safe = conn == 0 && kill == 0 && breaker == 0;

                    let closed = SafetyGate::check(SafetyPolicy::FailClosed, &s, true);
                    assert_eq!(
                        closed.allowed, all_safe,
                        "FAIL_CLOSED conn={conn} kill={kill} breaker={breaker}"
                    );
                    if !all_safe {
                        assert!(closed.reason.is_some());
                    }

                    let open = SafetyGate::check(SafetyPolicy::FailOpen, &s, true);
                    assert!(open.allowed, "FAIL_OPEN must always allow");
                    assert!(open.reason.is_none());
                    assert_eq!(
                        open.has_warnings(),
                        !all_safe,
                        "FAIL_OPEN warnings iff any non-safe signal"
                    );
                }
            }
        }
    }

    #[test]
    fn test_evaluation_order_connection_first() {
        // Everything unsafe: the blocking reason must come from the
        // connection, evaluated first.
        let s = state("disconnected", "engaged", "tripped");
        let result = SafetyGate::check(SafetyPolicy::FailClosed, &s, true);
        assert!(!result.allowed);
        assert!(result.reason.unwrap().contains("connection"));
    }

    #[test]
    fn test_require_connected_false_skips_connection() {
        let s = state("disconnected", "disengaged", "normal");
        let result = SafetyGate::check(SafetyPolicy::FailClosed, &s, false);
        assert!(result.allowed);
        assert!(!result.has_warnings());
    }

    #[test]
    fn test_unrecognized_state_treated_as_unknown() {
        let s = state("connected", "maybe?", "normal");
        let closed = SafetyGate::check(SafetyPolicy::FailClosed, &s, true);
        assert!(!closed.allowed);
        assert!(closed.reason.unwrap().contains("unknown"));

        let open = SafetyGate::check(SafetyPolicy::FailOpen, &s, true);
        assert!(open.allowed);
        assert!(open.has_warnings());
    }

    fn safe_state() -> SafetyState {
        state("connected", "disengaged", "normal")
    }

    #[tokio::test]
    async fn test_verified_check_passes_when_api_safe() {
        let api = Arc::new(MockTradingApi::new());
        let gate = SafetyGate::new(api);
        let result = gate
            .check_with_api_verification(SafetyPolicy::FailClosed, &safe_state())
            .await;
        assert!(result.allowed);
        assert!(!result.has_warnings());
    }

    #[tokio::test]
    async fn test_verified_kill_switch_engaged_blocks_fail_closed() {
        let api = Arc::new(MockTradingApi::new());
        api.set_kill_switch(Ok(KillSwitchStatus { engaged: true }));
        let gate = SafetyGate::new(api);

        let result = gate
            .check_with_api_verification(SafetyPolicy::FailClosed, &safe_state())
            .await;
        assert!(!result.allowed);
        assert!(result.reason.unwrap().contains("kill switch"));
    }

    #[tokio::test]
    async fn test_verified_kill_switch_engaged_warns_fail_open() {
        let api = Arc::new(MockTradingApi::new());
        api.set_kill_switch(Ok(KillSwitchStatus { engaged: true }));
        let gate = SafetyGate::new(api);

        let result = gate
            .check_with_api_verification(SafetyPolicy::FailOpen, &safe_state())
            .await;
        assert!(result.allowed);
        assert!(result.has_warnings());
    }

    #[tokio::test]
    async fn test_verified_server_error_blocks_fail_closed_warns_fail_open() {
        for error in [
            ApiError::Server {
                status: 503,
                message: "unavailable".to_string(),
            },
            ApiError::Unreachable("connect timeout".to_string()),
            // 4xx gets the identical two-branch treatment.
            ApiError::Client {
                status: 403,
                message: "forbidden".to_string(),
            },
        ] {
            let api = Arc::new(MockTradingApi::new());
            api.set_kill_switch(Err(error.clone()));
            let gate = SafetyGate::new(api);

            let closed = gate
                .check_with_api_verification(SafetyPolicy::FailClosed, &safe_state())
                .await;
            assert!(!closed.allowed, "{error} must block FAIL_CLOSED");

            let open = gate
                .check_with_api_verification(SafetyPolicy::FailOpen, &safe_state())
                .await;
            assert!(open.allowed, "{error} must not block FAIL_OPEN");
            assert!(open.has_warnings());
        }
    }

    #[tokio::test]
    async fn test_verified_breaker_quiet_period_blocks_fail_closed() {
        let api = Arc::new(MockTradingApi::new());
        api.set_circuit_breaker(Ok(CircuitBreakerStatus {
            tripped: false,
            quiet_period: true,
        }));
        let gate = SafetyGate::new(api);

        let result = gate
            .check_with_api_verification(SafetyPolicy::FailClosed, &safe_state())
            .await;
        assert!(!result.allowed);
        assert!(result.reason.unwrap().contains("circuit breaker"));
    }
}
