//! Two-tier pre-trade safety gate.
//!
//! The cheap cached check gives instant UI feedback on every keystroke;
//! the verified check performs one live round-trip per signal immediately
//! before an irreversible action, closing the race window between
//! "looked safe" and "is safe now".

pub mod gate;

pub use gate::SafetyGate;
