//! Shared test helpers for `tally-core` integration tests.
//!
//! These helpers provide an in-memory account server so that reconciliation
//! tests can focus on behaviour instead of boilerplate.

#![allow(dead_code)]

pub mod gateway;

pub use gateway::{Call, InMemoryGateway};
