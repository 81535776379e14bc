//! Strictly-fresh price fetch shared by the fail-closed workflows.

use std::sync::Arc;

use chrono::Utc;

use desk_client::TradingApi;
use desk_core::Price;

use crate::error::{WorkflowError, WorkflowResult};

/// Fetch the last price for `symbol`, requiring it to be positive and to
/// carry a parseable timestamp no older than `max_age_ms`.
pub(crate) async fn fresh_price(
    api: &Arc<dyn TradingApi>,
    symbol: &str,
    max_age_ms: i64,
) -> WorkflowResult<Price> {
    let prices = api.fetch_market_prices(vec![symbol.to_string()]).await?;
    let price = prices
        .into_iter()
        .find(|p| p.symbol == symbol)
        .ok_or_else(|| WorkflowError::PriceUnavailable {
            symbol: symbol.to_string(),
        })?;
    if !price.last.is_positive() {
        return Err(WorkflowError::PriceUnavailable {
            symbol: symbol.to_string(),
        });
    }
    let stamp = price
        .parsed_timestamp()
        .ok_or_else(|| WorkflowError::StalePrice {
            symbol: symbol.to_string(),
        })?;
    if (Utc::now() - stamp).num_milliseconds() > max_age_ms {
        return Err(WorkflowError::StalePrice {
            symbol: symbol.to_string(),
        });
    }
    Ok(price.last)
}
