mod engine;
mod reconcile;

pub use engine::MonitorEngine;
pub use reconcile::{ReconcileState, Reconciler, SuspectReason};
