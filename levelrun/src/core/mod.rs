//! Deterministic, pure logic shared by the level workflow.
//!
//! Core modules must be free of I/O side effects. They operate on in-memory
//! data and return deterministic outputs suitable for tests.

pub mod classify;
pub mod containment;
pub mod response;
pub mod transitions;
pub mod types;
