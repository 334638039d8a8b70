//! Deterministic, pure logic shared by the agent core.
//!
//! Core modules must be free of I/O side effects. They operate on in-memory
//! data structures and return deterministic outputs suitable for tests.

pub mod parse;
pub mod policy;
pub mod safety;
pub mod schema;
pub mod state;
pub mod types;
