//! Domain types and models

pub mod account;
pub mod outcome;

pub use account::Account;
pub use outcome::{CallOutcome, FailureDetail};
