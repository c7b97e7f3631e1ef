//! Core domain models and workflow engine for Agentflow
//!
//! This crate contains the agent contract, the agent and template registries,
//! the batch-scheduling workflow engine with its routing and retry helpers,
//! the inter-agent message bus and the persistence port used to record
//! executions.

pub mod agent;
pub mod bus;
pub mod config;
pub mod engine;
pub mod error;
pub mod execution;
pub mod message;
pub mod orchestrator;
pub mod registry;
pub mod retry;
pub mod router;
pub mod scheduler;
pub mod store;
pub mod template;

use std::collections::HashMap;

pub use agent::{Agent, AgentContext, AgentMetadata, FnAgent, StaticAgent};
pub use bus::MessageBus;
pub use config::{BusConfig, EngineConfig};
pub use engine::WorkflowEngine;
pub use error::{Error, Result};
pub use execution::{ExecutionSummary, StepRuntime, StepStatus, WorkflowExecution, WorkflowStatus};
pub use message::{AgentMessage, MessageType};
pub use orchestrator::{Orchestrator, SubmitRequest};
pub use registry::AgentRegistry;
pub use store::{ExecutionFilter, ExecutionMetrics, ExecutionStore, InMemoryExecutionStore};
pub use template::{TemplateRegistry, TemplateSummary, WorkflowStep, WorkflowTemplate};

/// Shared variable space of an execution, and the input/output shape of agents
pub type Variables = HashMap<String, serde_json::Value>;
