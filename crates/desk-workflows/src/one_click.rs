//! One-click entry and alt-click level cancel.
//!
//! One-click fires a market order straight from the ladder with no
//! preview, so it carries its own guards: a first-use arming gate, a
//! cooldown between fires, fat-finger size caps, and a persisted daily
//! notional ledger keyed by UTC date. Every step fails closed. The alt-click counterpart pulls
//! resting orders at one price level and, being risk-reducing, fails
//! open.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};
use uuid::Uuid;

use desk_client::{FormStore, ManualOrderRequest, OneClickPrefs, OrderAck, TradingApi};
use desk_core::{OrderSide, OrderType, Price, Qty, SafetyPolicy, SafetyState, TimeInForce};
use desk_safety::SafetyGate;

use crate::error::{WorkflowError, WorkflowResult};
use crate::pricing::fresh_price;

/// One-click trading guardrails.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OneClickConfig {
    /// Minimum gap between fires (ms).
    #[serde(default = "default_cooldown_ms")]
    pub cooldown_ms: i64,
    /// Daily notional cap across all one-click orders.
    #[serde(default = "default_daily_notional_cap")]
    pub daily_notional_cap: Decimal,
    /// Maximum age of the sizing price (ms).
    #[serde(default = "default_price_max_age_ms")]
    pub price_max_age_ms: i64,
    /// Fat-finger cap as a fraction of average daily volume.
    #[serde(default = "default_max_adv_fraction")]
    pub max_adv_fraction: Decimal,
    /// Fat-finger cap on a single order's notional.
    #[serde(default = "default_max_order_notional")]
    pub max_order_notional: Decimal,
}

fn default_cooldown_ms() -> i64 {
    1_500
}

fn default_daily_notional_cap() -> Decimal {
    Decimal::from(250_000)
}

fn default_price_max_age_ms() -> i64 {
    5_000
}

fn default_max_adv_fraction() -> Decimal {
    Decimal::new(1, 2) // 1%
}

fn default_max_order_notional() -> Decimal {
    Decimal::from(1_000_000)
}

impl Default for OneClickConfig {
    fn default() -> Self {
        Self {
            cooldown_ms: default_cooldown_ms(),
            daily_notional_cap: default_daily_notional_cap(),
            price_max_age_ms: default_price_max_age_ms(),
            max_adv_fraction: default_max_adv_fraction(),
            max_order_notional: default_max_order_notional(),
        }
    }
}

/// What a one-click fire did.
#[derive(Debug, Clone)]
pub struct OneClickOutcome {
    pub ack: OrderAck,
    /// Notional of this order at the sizing price.
    pub notional: Decimal,
    /// Ledger total for today after this order.
    pub daily_notional_used: Decimal,
}

/// Tally of an alt-click level cancel.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LevelCancelReport {
    pub cancelled: usize,
    pub failed: usize,
    pub skipped: usize,
    pub warnings: Vec<String>,
}

pub struct OneClickTrader {
    api: Arc<dyn TradingApi>,
    gate: SafetyGate,
    forms: Arc<dyn FormStore>,
    scope: String,
    config: OneClickConfig,
    last_fire: Mutex<Option<DateTime<Utc>>>,
}

fn utc_date(now: DateTime<Utc>) -> String {
    now.format("%Y-%m-%d").to_string()
}

impl OneClickTrader {
    pub fn new(
        api: Arc<dyn TradingApi>,
        forms: Arc<dyn FormStore>,
        scope: impl Into<String>,
        config: OneClickConfig,
    ) -> Self {
        Self {
            gate: SafetyGate::new(api.clone()),
            api,
            forms,
            scope: scope.into(),
            config,
            last_fire: Mutex::new(None),
        }
    }

    /// First-use confirmation: until armed, every fire is rejected.
    pub async fn arm(&self) -> WorkflowResult<()> {
        let mut prefs = self.load_prefs().await?;
        prefs.armed = true;
        self.forms
            .save_preferences(self.scope.clone(), prefs)
            .await?;
        info!(scope = %self.scope, "one-click trading armed");
        Ok(())
    }

    pub async fn disarm(&self) -> WorkflowResult<()> {
        let mut prefs = self.load_prefs().await?;
        prefs.armed = false;
        self.forms
            .save_preferences(self.scope.clone(), prefs)
            .await?;
        Ok(())
    }

    /// Fire a market order from the ladder.
    pub async fn execute(
        &self,
        symbol: &str,
        side: OrderSide,
        quantity: u64,
        safety: &SafetyState,
    ) -> WorkflowResult<OneClickOutcome> {
        let prefs = self.load_prefs().await?;
        if !prefs.armed {
            return Err(WorkflowError::NotArmed);
        }

        let now = Utc::now();
        if let Some(last) = *self.last_fire.lock() {
            let elapsed_ms = (now - last).num_milliseconds();
            if elapsed_ms < self.config.cooldown_ms {
                return Err(WorkflowError::Cooldown {
                    remaining_ms: self.config.cooldown_ms - elapsed_ms,
                });
            }
        }

        let price = fresh_price(&self.api, symbol, self.config.price_max_age_ms).await?;
        let notional = price.notional(Qty::from_shares(quantity));

        let adv = self.api.fetch_adv(symbol.to_string()).await?;
        let qty_cap = adv.inner() * self.config.max_adv_fraction;
        if Decimal::from(quantity) > qty_cap {
            return Err(WorkflowError::FatFinger(format!(
                "{quantity} shares exceeds {} ({}% of ADV {adv})",
                qty_cap,
                self.config.max_adv_fraction * Decimal::from(100),
            )));
        }
        if notional > self.config.max_order_notional {
            return Err(WorkflowError::FatFinger(format!(
                "notional {notional} exceeds cap {}",
                self.config.max_order_notional
            )));
        }

        let today = utc_date(now);
        // Ledger from a previous UTC date resets to zero.
        let used = if prefs.ledger_date == today {
            prefs.daily_notional_used
        } else {
            Decimal::ZERO
        };
        if used + notional > self.config.daily_notional_cap {
            return Err(WorkflowError::DailyCapExceeded {
                used,
                attempted: notional,
                cap: self.config.daily_notional_cap,
            });
        }

        let verdict = self
            .gate
            .check_with_api_verification(SafetyPolicy::FailClosed, safety)
            .await;
        if !verdict.allowed {
            return Err(WorkflowError::SafetyBlocked(
                verdict
                    .reason
                    .unwrap_or_else(|| "safety verification failed".to_string()),
            ));
        }

        let request = ManualOrderRequest {
            intent_id: format!("oneclick-{}", Uuid::new_v4()),
            symbol: symbol.to_string(),
            side,
            quantity: Qty::from_shares(quantity),
            order_type: OrderType::Market,
            limit_price: None,
            stop_price: None,
            time_in_force: TimeInForce::Day,
        };
        let ack = self.api.submit_manual_order(request).await?;

        let daily_notional_used = used + notional;
        self.forms
            .save_preferences(
                self.scope.clone(),
                OneClickPrefs {
                    armed: true,
                    daily_notional_used,
                    ledger_date: today,
                },
            )
            .await?;
        *self.last_fire.lock() = Some(now);

        info!(
            %symbol,
            side = ?side,
            quantity,
            %notional,
            daily_used = %daily_notional_used,
            order_id = %ack.order_id,
            "one-click order submitted"
        );
        Ok(OneClickOutcome {
            ack,
            notional,
            daily_notional_used,
        })
    }

    /// Alt-click: cancel every resting order at one price level.
    pub async fn cancel_at_level(
        &self,
        symbol: &str,
        level: Price,
        safety: &SafetyState,
    ) -> WorkflowResult<LevelCancelReport> {
        let verdict = SafetyGate::check(SafetyPolicy::FailOpen, safety, false);
        for warning in &verdict.warnings {
            warn!(%symbol, %warning, "level cancel under degraded safety signal");
        }

        let orders = self.api.fetch_open_orders(Some(symbol.to_string())).await?;
        let mut report = LevelCancelReport {
            warnings: verdict.warnings,
            ..LevelCancelReport::default()
        };
        for order in orders {
            if order.limit_price != Some(level) {
                continue;
            }
            if !order.is_cancellable() {
                report.skipped += 1;
                continue;
            }
            match self.api.cancel_order(order.order_id.clone()).await {
                Ok(()) => report.cancelled += 1,
                Err(err) => {
                    warn!(order_id = %order.order_id, error = %err, "level cancel failed");
                    report.failed += 1;
                }
            }
        }
        Ok(report)
    }

    async fn load_prefs(&self) -> WorkflowResult<OneClickPrefs> {
        Ok(self
            .forms
            .load_preferences(self.scope.clone())
            .await?
            .unwrap_or_default())
    }
}
