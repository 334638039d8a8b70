//! Side-effecting gateways and persistence used by the control loop.

pub mod catalog;
pub mod config;
pub mod database;
pub mod generator;
pub mod prompt;
pub mod transcript;
