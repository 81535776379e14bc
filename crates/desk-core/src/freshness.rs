//! Per-dimension data freshness tracking.
//!
//! Four independent data sources feed the order ticket: position, price,
//! buying power, and risk limits. Each carries its own last-update stamp
//! and staleness threshold. A dimension with no stamp at all is always
//! stale; an age exactly at the threshold is still fresh.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// The independently stale-checked data dimensions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DataDimension {
    Position,
    Price,
    BuyingPower,
    RiskLimits,
}

impl fmt::Display for DataDimension {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Position => write!(f, "position"),
            Self::Price => write!(f, "price"),
            Self::BuyingPower => write!(f, "buying power"),
            Self::RiskLimits => write!(f, "risk limits"),
        }
    }
}

/// Maximum data age per dimension, in milliseconds.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StalenessThresholds {
    #[serde(default = "default_position_max_age_ms")]
    pub position_max_age_ms: i64,
    #[serde(default = "default_price_max_age_ms")]
    pub price_max_age_ms: i64,
    #[serde(default = "default_buying_power_max_age_ms")]
    pub buying_power_max_age_ms: i64,
    #[serde(default = "default_limits_max_age_ms")]
    pub limits_max_age_ms: i64,
}

fn default_position_max_age_ms() -> i64 {
    10_000
}

fn default_price_max_age_ms() -> i64 {
    5_000
}

fn default_buying_power_max_age_ms() -> i64 {
    30_000
}

fn default_limits_max_age_ms() -> i64 {
    60_000
}

impl Default for StalenessThresholds {
    fn default() -> Self {
        Self {
            position_max_age_ms: default_position_max_age_ms(),
            price_max_age_ms: default_price_max_age_ms(),
            buying_power_max_age_ms: default_buying_power_max_age_ms(),
            limits_max_age_ms: default_limits_max_age_ms(),
        }
    }
}

impl StalenessThresholds {
    /// Threshold for a dimension in milliseconds.
    pub fn max_age_ms(&self, dim: DataDimension) -> i64 {
        match dim {
            DataDimension::Position => self.position_max_age_ms,
            DataDimension::Price => self.price_max_age_ms,
            DataDimension::BuyingPower => self.buying_power_max_age_ms,
            DataDimension::RiskLimits => self.limits_max_age_ms,
        }
    }
}

/// Last-update stamps for each dimension. All default to unset (= stale).
#[derive(Debug, Clone, Copy, Default)]
pub struct Freshness {
    pub position: Option<DateTime<Utc>>,
    pub price: Option<DateTime<Utc>>,
    pub buying_power: Option<DateTime<Utc>>,
    pub risk_limits: Option<DateTime<Utc>>,
}

impl Freshness {
    fn stamp(&self, dim: DataDimension) -> Option<DateTime<Utc>> {
        match dim {
            DataDimension::Position => self.position,
            DataDimension::Price => self.price,
            DataDimension::BuyingPower => self.buying_power,
            DataDimension::RiskLimits => self.risk_limits,
        }
    }

    /// Record an update for a dimension.
    pub fn touch(&mut self, dim: DataDimension, at: DateTime<Utc>) {
        match dim {
            DataDimension::Position => self.position = Some(at),
            DataDimension::Price => self.price = Some(at),
            DataDimension::BuyingPower => self.buying_power = Some(at),
            DataDimension::RiskLimits => self.risk_limits = Some(at),
        }
    }

    /// Whether a dimension is stale at `now`.
    ///
    /// Age strictly greater than the threshold is stale; exactly at the
    /// threshold is not. A missing stamp is always stale.
    pub fn is_stale(&self, dim: DataDimension, thresholds: &StalenessThresholds, now: DateTime<Utc>) -> bool {
        match self.stamp(dim) {
            None => true,
            Some(t) => now - t > Duration::milliseconds(thresholds.max_age_ms(dim)),
        }
    }

    /// First stale dimension in ticket evaluation order, if any.
    pub fn first_stale(
        &self,
        thresholds: &StalenessThresholds,
        now: DateTime<Utc>,
    ) -> Option<DataDimension> {
        [
            DataDimension::Position,
            DataDimension::Price,
            DataDimension::BuyingPower,
            DataDimension::RiskLimits,
        ]
        .into_iter()
        .find(|dim| self.is_stale(*dim, thresholds, now))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn at(ms: i64) -> DateTime<Utc> {
        DateTime::<Utc>::from_timestamp_millis(1_700_000_000_000 + ms).unwrap()
    }

    #[test]
    fn test_unset_stamp_is_stale() {
        let fresh = Freshness::default();
        let thresholds = StalenessThresholds::default();
        assert!(fresh.is_stale(DataDimension::Position, &thresholds, at(0)));
        assert!(fresh.is_stale(DataDimension::Price, &thresholds, at(0)));
        assert!(fresh.is_stale(DataDimension::BuyingPower, &thresholds, at(0)));
        assert!(fresh.is_stale(DataDimension::RiskLimits, &thresholds, at(0)));
    }

    #[test]
    fn test_exact_threshold_is_not_stale() {
        let thresholds = StalenessThresholds::default();
        for dim in [
            DataDimension::Position,
            DataDimension::Price,
            DataDimension::BuyingPower,
            DataDimension::RiskLimits,
        ] {
            let mut fresh = Freshness::default();
            fresh.touch(dim, at(0));
            let limit = thresholds.max_age_ms(dim);
            assert!(
                !fresh.is_stale(dim, &thresholds, at(limit)),
                "{dim} at exact threshold should be fresh"
            );
            assert!(
                fresh.is_stale(dim, &thresholds, at(limit + 1)),
                "{dim} one unit past threshold should be stale"
            );
        }
    }

    #[test]
    fn test_first_stale_order() {
        let thresholds = StalenessThresholds::default();
        let mut fresh = Freshness::default();
        fresh.touch(DataDimension::Position, at(0));
        // Price missing -> price is the first stale dimension.
        assert_eq!(
            fresh.first_stale(&thresholds, at(100)),
            Some(DataDimension::Price)
        );

        fresh.touch(DataDimension::Price, at(100));
        fresh.touch(DataDimension::BuyingPower, at(100));
        fresh.touch(DataDimension::RiskLimits, at(100));
        assert_eq!(fresh.first_stale(&thresholds, at(200)), None);
    }
}
