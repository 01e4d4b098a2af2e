//! Session lifecycle: the controller state machine and its stats.

pub mod controller;
pub mod stats;

pub use controller::{SessionController, SessionEvent, SessionState, TerminationReason};
pub use stats::SessionStats;
