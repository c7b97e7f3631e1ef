//! Persistence layer for Agentflow
//!
//! This crate provides the SQLite-backed execution store used by the
//! orchestrator and the repository of user-authored workflow definitions.

pub mod error;
pub mod manager;
pub mod migrations;
pub mod repositories;

pub use error::{Error, Result};
pub use manager::{DatabaseConfig, DatabaseStats, StorageManager};
pub use repositories::{SavedWorkflow, SavedWorkflowRepository, SqliteExecutionStore};

/// Re-export core types for convenience
pub use agentflow_core as core;
