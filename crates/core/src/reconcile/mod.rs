//! Reconciliation loop and its background worker

pub mod service;
pub mod worker;

pub use service::{CycleReport, ReconcileService};
pub use worker::ReconcileWorker;
