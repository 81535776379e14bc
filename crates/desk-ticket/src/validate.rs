//! Order-type price validation and risk-limit projection.

use desk_core::{OrderSide, OrderType, Price, Qty, RiskLimits};
use rust_decimal::Decimal;
use thiserror::Error;

/// Bad user input on the ticket. Surfaced, never auto-corrected.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ValidationError {
    #[error("{order_type} order requires a positive limit price")]
    LimitPriceRequired { order_type: OrderType },

    #[error("{order_type} order requires a positive stop price")]
    StopPriceRequired { order_type: OrderType },

    /// The stop-limit side relationship is violated. This is a distinct,
    /// explicit error: buy requires limit <= stop, sell requires
    /// limit >= stop.
    #[error("{side} stop-limit requires limit {expected} stop (limit {limit}, stop {stop})")]
    StopLimitRelationship {
        side: OrderSide,
        limit: Price,
        stop: Price,
        expected: &'static str,
    },
}

/// Validate the price fields required by the order type.
pub fn validate_order_prices(
    order_type: OrderType,
    side: OrderSide,
    limit_price: Option<Price>,
    stop_price: Option<Price>,
) -> Result<(), ValidationError> {
    match order_type {
        OrderType::Market => Ok(()),
        OrderType::Limit => match limit_price {
            Some(p) if p.is_positive() => Ok(()),
            _ => Err(ValidationError::LimitPriceRequired { order_type }),
        },
        OrderType::Stop => match stop_price {
            Some(p) if p.is_positive() => Ok(()),
            _ => Err(ValidationError::StopPriceRequired { order_type }),
        },
        OrderType::StopLimit => {
            let limit = match limit_price {
                Some(p) if p.is_positive() => p,
                _ => return Err(ValidationError::LimitPriceRequired { order_type }),
            };
            let stop = match stop_price {
                Some(p) if p.is_positive() => p,
                _ => return Err(ValidationError::StopPriceRequired { order_type }),
            };
            match side {
                OrderSide::Buy if limit > stop => Err(ValidationError::StopLimitRelationship {
                    side,
                    limit,
                    stop,
                    expected: "<=",
                }),
                OrderSide::Sell if limit < stop => Err(ValidationError::StopLimitRelationship {
                    side,
                    limit,
                    stop,
                    expected: ">=",
                }),
                _ => Ok(()),
            }
        }
    }
}

/// Effective price used for notional math.
///
/// Limit and stop-limit orders use the limit price; market orders use the
/// last trade. Plain stop orders use the side-conservative worst-case
/// bound: max of stop/last for buys, min for sells, so the notional check
/// never understates what the fill could cost.
pub fn effective_price(
    order_type: OrderType,
    side: OrderSide,
    limit_price: Option<Price>,
    stop_price: Option<Price>,
    last_price: Option<Price>,
) -> Option<Price> {
    match order_type {
        OrderType::Market => last_price,
        OrderType::Limit | OrderType::StopLimit => limit_price.or(last_price),
        OrderType::Stop => match (stop_price, last_price) {
            (Some(stop), Some(last)) => Some(match side {
                OrderSide::Buy => stop.max(last),
                OrderSide::Sell => stop.min(last),
            }),
            (Some(stop), None) => Some(stop),
            (None, last) => last,
        },
    }
}

/// A risk-limit violation or the missing data that forces a block.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum LimitViolation {
    #[error("projected position {projected} exceeds per-symbol limit {max}")]
    PositionLimitExceeded { projected: Qty, max: Qty },

    #[error("order notional {notional} exceeds per-order limit {max}")]
    NotionalLimitExceeded { notional: Decimal, max: Decimal },

    #[error("projected total exposure {projected} exceeds limit {max}")]
    ExposureLimitExceeded { projected: Decimal, max: Decimal },

    /// A total-exposure limit is configured but no current exposure
    /// reading is available. Blocks rather than skipping the check.
    #[error("total exposure limit configured but current exposure unavailable")]
    ExposureUnavailable,

    /// A notional or exposure limit is configured but no price is
    /// available to compute the order notional.
    #[error("no price available to compute order notional")]
    EffectivePriceUnavailable,
}

/// Check the proposed order against fetched risk limits.
///
/// `current_position` is the signed position at the order's symbol.
pub fn check_risk_limits(
    side: OrderSide,
    quantity: u64,
    order_type: OrderType,
    limit_price: Option<Price>,
    stop_price: Option<Price>,
    last_price: Option<Price>,
    current_position: Qty,
    limits: &RiskLimits,
) -> Result<(), LimitViolation> {
    let qty = Qty::from_shares(quantity);
    let signed_qty = Qty::new(qty.inner() * Decimal::from(side.sign()));
    let projected_position = current_position + signed_qty;

    if let Some(max) = limits.max_position_per_symbol {
        if projected_position.abs() > max {
            return Err(LimitViolation::PositionLimitExceeded {
                projected: projected_position,
                max,
            });
        }
    }

    let needs_notional = limits.max_notional_per_order.is_some() || limits.max_total_exposure.is_some();
    if !needs_notional {
        return Ok(());
    }

    let effective = effective_price(order_type, side, limit_price, stop_price, last_price)
        .ok_or(LimitViolation::EffectivePriceUnavailable)?;
    let order_notional = effective.notional(qty);

    if let Some(max) = limits.max_notional_per_order {
        if order_notional > max {
            return Err(LimitViolation::NotionalLimitExceeded {
                notional: order_notional,
                max,
            });
        }
    }

    if let Some(max) = limits.max_total_exposure {
        let current_total = limits
            .current_total_exposure
            .ok_or(LimitViolation::ExposureUnavailable)?;
        let valuation = last_price.unwrap_or(effective);
        let existing_symbol_notional = valuation.notional(current_position.abs());
        let proposed_symbol_notional = effective.notional(projected_position.abs());
        let projected = current_total - existing_symbol_notional + proposed_symbol_notional;
        if projected > max {
            return Err(LimitViolation::ExposureLimitExceeded { projected, max });
        }
    }

    Ok(())
}
