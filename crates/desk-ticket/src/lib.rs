//! Order Ticket Protocol.
//!
//! Staleness gating over four independent data freshness dimensions,
//! order-type price validation, risk-limit projection, and two-phase
//! preview/confirm submission with snapshot-based idempotency and a
//! persisted submission intent.

pub mod eligibility;
pub mod error;
pub mod intent;
pub mod state;
pub mod ticket;
pub mod validate;

pub use eligibility::{should_disable_submission, DisableReason, EligibilityContext};
pub use error::{TicketError, TicketResult};
pub use intent::{OrderFields, SubmissionIntent};
pub use state::TicketState;
pub use ticket::{OrderTicket, PreviewSnapshot};
pub use validate::{check_risk_limits, effective_price, validate_order_prices, LimitViolation, ValidationError};
