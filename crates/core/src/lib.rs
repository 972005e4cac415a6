//! # Tally Core
//!
//! Pure business logic layer - no infrastructure dependencies.
//!
//! This crate contains:
//! - The account gateway port (trait)
//! - The lifecycle decision and its verifiers
//! - The reconciliation service and worker
//!
//! ## Architecture Principles
//! - Only depends on `tally-domain`
//! - No HTTP or platform code
//! - All external dependencies via traits
//! - Pure, testable business logic

pub mod lifecycle;
pub mod ports;
pub mod reconcile;

pub use lifecycle::{decide, AccountState, Action, ReconcileOutcome};
pub use ports::AccountGateway;
pub use reconcile::{CycleReport, ReconcileService, ReconcileWorker};
