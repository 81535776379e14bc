//! Channel subscription registry and dashboard coordinator.
//!
//! The registry refcounts broker channel subscriptions, coalesces
//! concurrent subscribes, retries failures, and converges orphans. The
//! coordinator wires broker channels and key-value snapshots into the
//! consumer-facing safety and market-data state.

pub mod config;
pub mod coordinator;
pub mod error;
pub mod registry;
pub mod tasks;

pub use config::{AppConfig, CoordinatorConfig};
pub use coordinator::{
    Coordinator, OrderUpdateListener, PositionListener, PriceListener, SafetyListener,
};
pub use error::{CoordinatorError, CoordinatorResult, RegistryError, RegistryResult};
pub use registry::SubscriptionRegistry;
pub use tasks::SupervisedTasks;
