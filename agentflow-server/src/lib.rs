//! Agentflow server application
//!
//! This crate wires the workflow engine, its SQLite persistence and the
//! built-in catalog behind an axum JSON API.

pub mod api;
pub mod catalog;
pub mod config;
pub mod copilot;
pub mod error;
pub mod server;

#[cfg(test)]
mod config_tests;

pub use error::{Error, Result};

/// Re-export the engine and storage crates for convenience
pub use agentflow_core as core;
pub use agentflow_storage as storage;
