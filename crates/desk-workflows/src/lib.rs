//! Compensating-action workflows.
//!
//! Risk-reducing actions (flatten, bulk cancel, cancel-at-level) run
//! fail-open: degraded safety signals become warnings, never aborts.
//! Risk-adding actions (reverse, one-click entry) run fail-closed at
//! every step.

pub mod bulk_cancel;
pub mod error;
pub mod flatten;
pub mod one_click;
mod pricing;
pub mod reverse;

pub use bulk_cancel::{BulkCancelReport, BulkCanceller};
pub use error::{WorkflowError, WorkflowResult};
pub use flatten::{FlattenOutcome, Flattener};
pub use one_click::{LevelCancelReport, OneClickConfig, OneClickOutcome, OneClickTrader};
pub use reverse::{ReverseConfig, ReverseReport, ReverseWorkflow};
