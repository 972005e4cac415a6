//! Tally worker process
//!
//! Wires configuration, resilience policies, the HTTP gateway and the
//! reconciliation service together, and waits for a shutdown request.

pub mod context;
pub mod shutdown;

pub use context::WorkerContext;
pub use shutdown::{run_for_from_env, wait_for_shutdown, ShutdownReason};
