//! Bulk cancel: pull every cancellable open order with bounded fan-out.
//!
//! Cancelling is risk-reducing, so the safety check runs fail-open and
//! skips the connection signal entirely (resting orders can be cancelled
//! without live market data). The order list is refetched at confirm
//! time; whatever snapshot the user was looking at when they clicked is
//! not trusted.

use std::sync::Arc;

use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{info, warn};

use desk_client::TradingApi;
use desk_core::{OrderSide, SafetyPolicy, SafetyState};
use desk_safety::SafetyGate;

use crate::error::WorkflowResult;

/// Tally of a bulk-cancel pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BulkCancelReport {
    pub cancelled: usize,
    pub failed: usize,
    /// Structurally uncancellable orders left untouched.
    pub skipped: usize,
}

pub struct BulkCanceller {
    api: Arc<dyn TradingApi>,
    /// Maximum concurrent in-flight cancel calls.
    concurrency: usize,
}

impl BulkCanceller {
    pub fn new(api: Arc<dyn TradingApi>, concurrency: usize) -> Self {
        Self {
            api,
            concurrency: concurrency.max(1),
        }
    }

    /// Cancel all open orders, optionally scoped to one symbol and/or side.
    ///
    /// Returns the tally plus any fail-open safety warnings.
    pub async fn cancel_all(
        &self,
        symbol: Option<String>,
        side: Option<OrderSide>,
        safety: &SafetyState,
    ) -> WorkflowResult<(BulkCancelReport, Vec<String>)> {
        let verdict = SafetyGate::check(SafetyPolicy::FailOpen, safety, false);
        for warning in &verdict.warnings {
            warn!(%warning, "bulk cancel under degraded safety signal");
        }

        let orders = self.api.fetch_open_orders(symbol).await?;
        let (cancellable, uncancellable): (Vec<_>, Vec<_>) = orders
            .into_iter()
            .filter(|o| side.map_or(true, |s| o.side == s))
            .partition(|o| o.is_cancellable());
        let skipped = uncancellable.len();

        let semaphore = Arc::new(Semaphore::new(self.concurrency));
        let mut set = JoinSet::new();
        for order in cancellable {
            let api = self.api.clone();
            let semaphore = semaphore.clone();
            set.spawn(async move {
                let Ok(_permit) = semaphore.acquire_owned().await else {
                    return false;
                };
                match api.cancel_order(order.order_id.clone()).await {
                    Ok(()) => true,
                    Err(err) => {
                        warn!(order_id = %order.order_id, error = %err, "cancel failed");
                        false
                    }
                }
            });
        }

        let mut report = BulkCancelReport {
            skipped,
            ..BulkCancelReport::default()
        };
        while let Some(joined) = set.join_next().await {
            match joined {
                Ok(true) => report.cancelled += 1,
                Ok(false) => report.failed += 1,
                Err(err) => {
                    warn!(error = %err, "cancel task join failed");
                    report.failed += 1;
                }
            }
        }

        info!(
            cancelled = report.cancelled,
            failed = report.failed,
            skipped = report.skipped,
            "bulk cancel finished"
        );
        Ok((report, verdict.warnings))
    }
}
