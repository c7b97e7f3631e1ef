//! Agent capability contract and metadata
//!
//! Every capability provider registered with the orchestrator implements the
//! [`Agent`] trait. The engine never looks inside an agent: it reads the
//! agent's [`AgentMetadata`], asks it to validate the mapped input and then
//! awaits `execute`.
//!
//! # Examples
//!
//! Declaring an agent backed by an async closure:
//!
//! ```rust
//! use agentflow_core::agent::*;
//! use agentflow_core::Variables;
//! use serde_json::json;
//!
//! let metadata = AgentMetadata::builder()
//!     .agent_id("calculate_vat")
//!     .agent_type("finance")
//!     .capability("vat")
//!     .dependency("ocr_extract")
//!     .reliability(0.98)
//!     .build()
//!     .unwrap();
//!
//! let agent = FnAgent::new(metadata, |input: Variables, _ctx| async move {
//!     let amount = input.get("amount").and_then(|v| v.as_f64()).unwrap_or(0.0);
//!     let mut out = Variables::new();
//!     out.insert("vat".to_string(), json!(amount * 0.2));
//!     Ok(out)
//! })
//! .with_required_inputs(["amount"]);
//! ```

use crate::bus::MessageBus;
use crate::{Error, Result, Variables};
use async_trait::async_trait;
use futures::future::BoxFuture;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::future::Future;
use std::sync::Arc;
use uuid::Uuid;

/// Descriptive and policy metadata of a registered agent
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AgentMetadata {
    pub agent_id: String,
    /// Capability type, e.g. `extraction` or `finance`
    pub agent_type: String,
    pub name: String,
    pub description: String,
    pub version: String,
    pub capabilities: BTreeSet<String>,
    /// Agents expected to have run earlier in the same workflow
    pub dependencies: Vec<String>,
    pub reliability: f64,
    pub cost_per_call: f64,
    pub avg_latency_ms: u64,
    pub region: Option<String>,
    pub tags: Vec<String>,
    pub fallback_agent_id: Option<String>,
    pub max_retries: u32,
    pub timeout_seconds: Option<u64>,
}

impl AgentMetadata {
    /// Create a builder for constructing metadata
    pub fn builder() -> AgentMetadataBuilder {
        AgentMetadataBuilder::new()
    }

    pub fn has_capability(&self, capability: &str) -> bool {
        self.capabilities.contains(capability)
    }

    /// Scheduling preference: reliable, cheap agents first
    pub fn priority_score(&self) -> f64 {
        self.reliability / (1.0 + self.cost_per_call.max(0.0))
    }
}

/// Builder for [`AgentMetadata`] with validation
#[derive(Debug, Clone, Default)]
pub struct AgentMetadataBuilder {
    agent_id: Option<String>,
    agent_type: Option<String>,
    name: Option<String>,
    description: String,
    version: Option<String>,
    capabilities: BTreeSet<String>,
    dependencies: Vec<String>,
    reliability: Option<f64>,
    cost_per_call: f64,
    avg_latency_ms: u64,
    region: Option<String>,
    tags: Vec<String>,
    fallback_agent_id: Option<String>,
    max_retries: u32,
    timeout_seconds: Option<u64>,
}

impl AgentMetadataBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn agent_id<S: Into<String>>(mut self, agent_id: S) -> Self {
        self.agent_id = Some(agent_id.into());
        self
    }

    pub fn agent_type<S: Into<String>>(mut self, agent_type: S) -> Self {
        self.agent_type = Some(agent_type.into());
        self
    }

    pub fn name<S: Into<String>>(mut self, name: S) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn description<S: Into<String>>(mut self, description: S) -> Self {
        self.description = description.into();
        self
    }

    pub fn version<S: Into<String>>(mut self, version: S) -> Self {
        self.version = Some(version.into());
        self
    }

    pub fn capability<S: Into<String>>(mut self, capability: S) -> Self {
        self.capabilities.insert(capability.into());
        self
    }

    pub fn dependency<S: Into<String>>(mut self, agent_id: S) -> Self {
        self.dependencies.push(agent_id.into());
        self
    }

    pub fn reliability(mut self, reliability: f64) -> Self {
        self.reliability = Some(reliability);
        self
    }

    pub fn cost_per_call(mut self, cost: f64) -> Self {
        self.cost_per_call = cost;
        self
    }

    pub fn avg_latency_ms(mut self, latency_ms: u64) -> Self {
        self.avg_latency_ms = latency_ms;
        self
    }

    pub fn region<S: Into<String>>(mut self, region: S) -> Self {
        self.region = Some(region.into());
        self
    }

    pub fn tag<S: Into<String>>(mut self, tag: S) -> Self {
        self.tags.push(tag.into());
        self
    }

    pub fn fallback_agent_id<S: Into<String>>(mut self, agent_id: S) -> Self {
        self.fallback_agent_id = Some(agent_id.into());
        self
    }

    pub fn max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    pub fn timeout_seconds(mut self, timeout_seconds: u64) -> Self {
        self.timeout_seconds = Some(timeout_seconds);
        self
    }

    /// Build the metadata, validating identity and reliability bounds
    pub fn build(self) -> Result<AgentMetadata> {
        let agent_id = self
            .agent_id
            .filter(|id| !id.trim().is_empty())
            .ok_or_else(|| Error::validation("Agent id is required"))?;

        let reliability = self.reliability.unwrap_or(1.0);
        if !(0.0..=1.0).contains(&reliability) {
            return Err(Error::validation(format!(
                "Agent '{}' reliability must be within [0, 1], got {}",
                agent_id, reliability
            )));
        }
        if self.cost_per_call < 0.0 {
            return Err(Error::validation(format!(
                "Agent '{}' cost per call cannot be negative",
                agent_id
            )));
        }
        if self.fallback_agent_id.as_deref() == Some(agent_id.as_str()) {
            return Err(Error::validation(format!(
                "Agent '{}' cannot be its own fallback",
                agent_id
            )));
        }

        Ok(AgentMetadata {
            name: self.name.unwrap_or_else(|| agent_id.clone()),
            agent_type: self.agent_type.unwrap_or_else(|| "generic".to_string()),
            description: self.description,
            version: self.version.unwrap_or_else(|| "1.0.0".to_string()),
            capabilities: self.capabilities,
            dependencies: self.dependencies,
            reliability,
            cost_per_call: self.cost_per_call,
            avg_latency_ms: self.avg_latency_ms,
            region: self.region,
            tags: self.tags,
            fallback_agent_id: self.fallback_agent_id,
            max_retries: self.max_retries,
            timeout_seconds: self.timeout_seconds,
            agent_id,
        })
    }
}

/// Per-invocation context handed to an agent
#[derive(Debug, Clone)]
pub struct AgentContext {
    pub execution_id: Uuid,
    pub template_id: String,
    pub step_id: String,
    /// Snapshot of the execution variables at dispatch time
    pub variables: Variables,
    pub bus: Option<Arc<MessageBus>>,
}

impl AgentContext {
    pub fn new<S1: Into<String>, S2: Into<String>>(
        execution_id: Uuid,
        template_id: S1,
        step_id: S2,
    ) -> Self {
        Self {
            execution_id,
            template_id: template_id.into(),
            step_id: step_id.into(),
            variables: Variables::new(),
            bus: None,
        }
    }
}

/// Uniform contract of every capability provider
#[async_trait]
pub trait Agent: Send + Sync {
    fn describe(&self) -> &AgentMetadata;

    /// Reject malformed input before the agent runs
    fn validate(&self, _input: &Variables) -> bool {
        true
    }

    async fn execute(&self, input: Variables, context: &AgentContext) -> Result<Variables>;

    fn agent_id(&self) -> &str {
        &self.describe().agent_id
    }
}

type AgentFn = dyn Fn(Variables, AgentContext) -> BoxFuture<'static, Result<Variables>> + Send + Sync;

/// Agent backed by an async closure
pub struct FnAgent {
    metadata: AgentMetadata,
    required_inputs: Vec<String>,
    handler: Arc<AgentFn>,
}

impl FnAgent {
    pub fn new<F, Fut>(metadata: AgentMetadata, handler: F) -> Self
    where
        F: Fn(Variables, AgentContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Variables>> + Send + 'static,
    {
        Self {
            metadata,
            required_inputs: Vec::new(),
            handler: Arc::new(
                move |input: Variables, ctx: AgentContext| -> BoxFuture<'static, Result<Variables>> {
                    Box::pin(handler(input, ctx))
                },
            ),
        }
    }

    /// Input keys that must be present for `validate` to pass
    pub fn with_required_inputs<I, S>(mut self, keys: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.required_inputs = keys.into_iter().map(Into::into).collect();
        self
    }
}

#[async_trait]
impl Agent for FnAgent {
    fn describe(&self) -> &AgentMetadata {
        &self.metadata
    }

    fn validate(&self, input: &Variables) -> bool {
        self.required_inputs.iter().all(|key| input.contains_key(key))
    }

    async fn execute(&self, input: Variables, context: &AgentContext) -> Result<Variables> {
        (self.handler)(input, context.clone()).await
    }
}

/// Agent returning a fixed output, optionally echoing selected input keys
#[derive(Debug, Clone)]
pub struct StaticAgent {
    metadata: AgentMetadata,
    output: Variables,
    passthrough: Vec<String>,
}

impl StaticAgent {
    pub fn new(metadata: AgentMetadata, output: Variables) -> Self {
        Self {
            metadata,
            output,
            passthrough: Vec::new(),
        }
    }

    pub fn with_passthrough<I, S>(mut self, keys: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.passthrough = keys.into_iter().map(Into::into).collect();
        self
    }
}

#[async_trait]
impl Agent for StaticAgent {
    fn describe(&self) -> &AgentMetadata {
        &self.metadata
    }

    async fn execute(&self, input: Variables, _context: &AgentContext) -> Result<Variables> {
        let mut output = self.output.clone();
        for key in &self.passthrough {
            if let Some(value) = input.get(key) {
                output.insert(key.clone(), value.clone());
            }
        }
        Ok(output)
    }
}
