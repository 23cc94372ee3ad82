//! rtd-reconcile
//!
//! Drives runtime domains toward their desired state. One [`Reconciler::tick`]
//! runs six independent steps against the shared store; replicas coordinate
//! only through the store's atomic claim and phase-gated updates.

pub mod clock;
pub mod reconciler;
pub mod report;
pub mod wiring;

pub use clock::{Clock, SystemClock};
pub use reconciler::{Reconciler, ReconcilerSettings};
pub use report::{Step, StepOutcome, StepReport, TickReport};
pub use wiring::reconciler_from_config;
