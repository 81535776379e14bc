//! Core domain types for the deskguard order-entry safety core.
//!
//! This crate provides the fundamental types shared across the system:
//! - `Price`, `Qty`: precision-safe numeric types
//! - `OrderSide`, `OrderType`, `TimeInForce`: trading enums
//! - `SafetyPolicy`, `SafetyCheckResult`, `SafetyState`: safety gate vocabulary
//! - `Freshness`, `StalenessThresholds`: per-dimension data-age tracking
//! - `RiskLimits`: fetched risk/position limit snapshot

pub mod decimal;
pub mod error;
pub mod freshness;
pub mod limits;
pub mod order;
pub mod safety;

pub use decimal::{Price, Qty};
pub use error::{CoreError, Result};
pub use freshness::{DataDimension, Freshness, StalenessThresholds};
pub use limits::RiskLimits;
pub use order::{OrderSide, OrderType, TimeInForce};
pub use safety::{SafetyCheckResult, SafetyPolicy, SafetyState, SignalState};
