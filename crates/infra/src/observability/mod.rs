//! Observability infrastructure
//!
//! Structured logging setup for the worker process. Spans and events are
//! emitted with `tracing` throughout the workspace; this module only installs
//! the subscriber.

pub mod logging;

pub use logging::{init, init_logging, LogFormat};
