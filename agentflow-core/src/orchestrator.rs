//! Orchestrator facade
//!
//! Owns the registries, the engine, the message bus and the execution store
//! of one deployment. Construct it once at startup and share it behind an
//! `Arc`; there is no global instance.

use crate::agent::{Agent, AgentMetadata};
use crate::bus::MessageBus;
use crate::config::{BusConfig, EngineConfig};
use crate::engine::WorkflowEngine;
use crate::execution::{ExecutionSummary, WorkflowExecution, WorkflowStatus};
use crate::registry::AgentRegistry;
use crate::store::{ExecutionFilter, ExecutionMetrics, ExecutionStore, InMemoryExecutionStore};
use crate::template::{TemplateRegistry, TemplateSummary, WorkflowTemplate};
use crate::{Error, Result, Variables};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{error, info};
use uuid::Uuid;

/// A request to run a registered template
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct SubmitRequest {
    pub template_id: String,
    #[serde(default)]
    pub initial_variables: Variables,
    #[serde(default)]
    pub execution_name: Option<String>,
    #[serde(default)]
    pub tenant_id: Option<String>,
    #[serde(default)]
    pub user_id: Option<String>,
}

impl SubmitRequest {
    pub fn new<S: Into<String>>(template_id: S) -> Self {
        Self {
            template_id: template_id.into(),
            ..Default::default()
        }
    }

    pub fn variable<S: Into<String>>(mut self, key: S, value: serde_json::Value) -> Self {
        self.initial_variables.insert(key.into(), value);
        self
    }

    pub fn tenant<S: Into<String>>(mut self, tenant_id: S) -> Self {
        self.tenant_id = Some(tenant_id.into());
        self
    }
}

pub struct Orchestrator {
    agents: Arc<AgentRegistry>,
    templates: Arc<TemplateRegistry>,
    engine: Arc<WorkflowEngine>,
    bus: Arc<MessageBus>,
    store: Arc<dyn ExecutionStore>,
}

impl Orchestrator {
    pub fn new(
        engine_config: EngineConfig,
        bus_config: BusConfig,
        store: Arc<dyn ExecutionStore>,
    ) -> Self {
        let agents = Arc::new(AgentRegistry::new());
        let bus = Arc::new(MessageBus::new(bus_config));
        let engine = WorkflowEngine::new(Arc::clone(&agents), engine_config)
            .with_bus(Arc::clone(&bus));

        Self {
            agents,
            templates: Arc::new(TemplateRegistry::new()),
            engine: Arc::new(engine),
            bus,
            store,
        }
    }

    /// Default configuration backed by a volatile store
    pub fn in_memory() -> Self {
        Self::new(
            EngineConfig::default(),
            BusConfig::default(),
            Arc::new(InMemoryExecutionStore::new()),
        )
    }

    pub fn register_agent(&self, agent: Arc<dyn Agent>) {
        self.agents.register(agent);
    }

    pub fn register_template(&self, template: WorkflowTemplate) -> Result<()> {
        self.templates.register(template)
    }

    pub fn template(&self, template_id: &str) -> Option<Arc<WorkflowTemplate>> {
        self.templates.get(template_id)
    }

    pub fn agents(&self) -> &Arc<AgentRegistry> {
        &self.agents
    }

    pub fn templates(&self) -> &Arc<TemplateRegistry> {
        &self.templates
    }

    pub fn bus(&self) -> &Arc<MessageBus> {
        &self.bus
    }

    pub fn store(&self) -> &Arc<dyn ExecutionStore> {
        &self.store
    }

    /// Start a workflow in the background and return its pending record
    pub async fn submit(&self, request: SubmitRequest) -> Result<ExecutionSummary> {
        let (template, execution) = self.prepare(request)?;
        self.store.save_execution(&execution).await?;
        self.engine.track(&execution).await;

        let summary = execution.summary();
        info!(
            execution_id = %summary.execution_id,
            template_id = %summary.template_id,
            "Workflow submitted"
        );

        let engine = Arc::clone(&self.engine);
        let store = Arc::clone(&self.store);
        tokio::spawn(async move {
            let finished = engine.run(&template, execution).await;
            persist(engine.as_ref(), store.as_ref(), &finished).await;
        });

        Ok(summary)
    }

    /// Run a workflow and wait for its terminal state
    pub async fn execute(&self, request: SubmitRequest) -> Result<WorkflowExecution> {
        let (template, execution) = self.prepare(request)?;
        self.engine.track(&execution).await;
        let finished = self.engine.run(&template, execution).await;
        persist(&self.engine, self.store.as_ref(), &finished).await;
        Ok(finished)
    }

    /// Last known state, live progress first
    pub async fn status(&self, execution_id: Uuid) -> Result<WorkflowExecution> {
        if let Some(live) = self.engine.snapshot(execution_id).await {
            return Ok(live);
        }
        self.store
            .get_execution(execution_id)
            .await?
            .ok_or_else(|| Error::execution_not_found(execution_id.to_string()))
    }

    /// Final variables of a completed execution
    pub async fn result(&self, execution_id: Uuid) -> Result<Variables> {
        let execution = self.status(execution_id).await?;
        if execution.status != WorkflowStatus::Completed {
            return Err(Error::NotCompleted {
                execution_id: execution_id.to_string(),
                status: execution.status.to_string(),
            });
        }
        Ok(execution.variables)
    }

    pub async fn cancel(&self, execution_id: Uuid) -> Result<WorkflowExecution> {
        match self.engine.cancel(execution_id).await {
            Ok(cancelled) => {
                self.store.save_execution(&cancelled).await?;
                Ok(cancelled)
            }
            Err(Error::ExecutionNotFound { .. }) => {
                let stored = self
                    .store
                    .get_execution(execution_id)
                    .await?
                    .ok_or_else(|| Error::execution_not_found(execution_id.to_string()))?;
                Err(Error::state_transition(format!(
                    "execution {} is already {}",
                    execution_id, stored.status
                )))
            }
            Err(e) => Err(e),
        }
    }

    pub async fn list_executions(&self, filter: &ExecutionFilter) -> Result<Vec<ExecutionSummary>> {
        self.store.list_executions(filter).await
    }

    pub fn list_agents(&self, agent_type: Option<&str>) -> Vec<AgentMetadata> {
        self.agents.list(agent_type)
    }

    pub fn find_agents_by_capability(&self, capability: &str) -> Vec<AgentMetadata> {
        self.agents.find_by_capability(capability)
    }

    pub fn list_templates(&self) -> Vec<TemplateSummary> {
        self.templates.list()
    }

    pub async fn metrics(&self, tenant_id: Option<&str>, hours_back: u32) -> Result<ExecutionMetrics> {
        self.store.metrics(tenant_id, hours_back).await
    }

    fn prepare(&self, request: SubmitRequest) -> Result<(Arc<WorkflowTemplate>, WorkflowExecution)> {
        let template = self
            .templates
            .get(&request.template_id)
            .ok_or_else(|| Error::template_not_found(&request.template_id))?;

        let mut execution = self
            .engine
            .prepare(&template, request.initial_variables)?
            .with_tenant(request.tenant_id, request.user_id);
        if let Some(name) = request.execution_name {
            execution = execution.with_name(name);
        }
        Ok((template, execution))
    }
}

impl std::fmt::Debug for Orchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Orchestrator")
            .field("agents", &self.agents)
            .field("templates", &self.templates)
            .finish_non_exhaustive()
    }
}

/// Save a terminal execution and drop it from the live table
async fn persist(engine: &WorkflowEngine, store: &dyn ExecutionStore, execution: &WorkflowExecution) {
    match store.save_execution(execution).await {
        Ok(()) => {
            engine.release(execution.execution_id).await;
        }
        Err(e) => {
            // the live record stays available for status polling
            error!(
                execution_id = %execution.execution_id,
                error = %e,
                "Failed to persist workflow execution"
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent::{FnAgent, StaticAgent};
    use crate::template::WorkflowStep;
    use assert_matches::assert_matches;
    use serde_json::json;
    use std::time::Duration;

    fn orchestrator() -> Orchestrator {
        let orchestrator = Orchestrator::in_memory();
        let meta = AgentMetadata::builder()
            .agent_id("greeter")
            .agent_type("text")
            .capability("greeting")
            .build()
            .unwrap();
        orchestrator.register_agent(Arc::new(FnAgent::new(meta, |input: Variables, _ctx| async move {
            let name = input.get("name").and_then(|v| v.as_str()).unwrap_or("world").to_string();
            let mut out = Variables::new();
            out.insert("greeting".to_string(), json!(format!("hello {}", name)));
            Ok(out)
        })));
        orchestrator
            .register_template(
                WorkflowTemplate::new("greet", "Greet").with_step(
                    WorkflowStep::new("greet", "greeter")
                        .input("name", "name")
                        .output("greeting", "greeting"),
                ),
            )
            .unwrap();
        orchestrator
    }

    #[tokio::test]
    async fn test_execute_persists_and_releases() {
        let orchestrator = orchestrator();
        let execution = orchestrator
            .execute(SubmitRequest::new("greet").variable("name", json!("ada")).tenant("acme"))
            .await
            .unwrap();

        assert_eq!(execution.status, WorkflowStatus::Completed);
        let result = orchestrator.result(execution.execution_id).await.unwrap();
        assert_eq!(result["greeting"], json!("hello ada"));

        let listed = orchestrator
            .list_executions(&ExecutionFilter::default())
            .await
            .unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].tenant_id.as_deref(), Some("acme"));
        assert!(orchestrator.engine.snapshot(execution.execution_id).await.is_none());
    }

    #[tokio::test]
    async fn test_submit_returns_pending_and_completes() {
        let orchestrator = orchestrator();
        let summary = orchestrator
            .submit(SubmitRequest::new("greet"))
            .await
            .unwrap();
        assert_eq!(summary.status, WorkflowStatus::Pending);

        let mut status = orchestrator.status(summary.execution_id).await.unwrap();
        for _ in 0..100 {
            if status.is_terminal() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
            status = orchestrator.status(summary.execution_id).await.unwrap();
        }
        assert_eq!(status.status, WorkflowStatus::Completed);
        assert_eq!(status.variables["greeting"], json!("hello world"));
    }

    #[tokio::test]
    async fn test_unknown_template_and_execution() {
        let orchestrator = orchestrator();
        assert_matches!(
            orchestrator.submit(SubmitRequest::new("missing")).await,
            Err(Error::TemplateNotFound { .. })
        );
        assert_matches!(
            orchestrator.status(Uuid::new_v4()).await,
            Err(Error::ExecutionNotFound { .. })
        );
        assert_matches!(
            orchestrator.cancel(Uuid::new_v4()).await,
            Err(Error::ExecutionNotFound { .. })
        );
    }

    #[tokio::test]
    async fn test_result_of_failed_execution_is_rejected() {
        let orchestrator = orchestrator();
        let meta = AgentMetadata::builder().agent_id("broken").build().unwrap();
        orchestrator.register_agent(Arc::new(FnAgent::new(meta, |_input: Variables, _ctx| async {
            Err(Error::agent_execution("broken", "no data"))
        })));
        orchestrator
            .register_template(
                WorkflowTemplate::new("fails", "Fails").with_step(WorkflowStep::new("x", "broken")),
            )
            .unwrap();

        let execution = orchestrator
            .execute(SubmitRequest::new("fails"))
            .await
            .unwrap();
        assert_eq!(execution.status, WorkflowStatus::Failed);
        assert_matches!(
            orchestrator.result(execution.execution_id).await,
            Err(Error::NotCompleted { .. })
        );
        assert_matches!(
            orchestrator.cancel(execution.execution_id).await,
            Err(Error::StateTransition { .. })
        );
    }

    #[tokio::test]
    async fn test_cancelled_record_is_persisted_over_late_failure() {
        let orchestrator = orchestrator();
        let meta = AgentMetadata::builder().agent_id("slow_fail").build().unwrap();
        orchestrator.register_agent(Arc::new(FnAgent::new(meta, |_input: Variables, _ctx| async {
            tokio::time::sleep(Duration::from_millis(100)).await;
            Err(Error::agent_execution("slow_fail", "boom"))
        })));
        orchestrator
            .register_template(
                WorkflowTemplate::new("slow", "Slow").with_step(WorkflowStep::new("a", "slow_fail")),
            )
            .unwrap();

        let summary = orchestrator.submit(SubmitRequest::new("slow")).await.unwrap();
        tokio::time::sleep(Duration::from_millis(30)).await;
        let cancelled = orchestrator.cancel(summary.execution_id).await.unwrap();
        assert_eq!(cancelled.status, WorkflowStatus::Cancelled);

        tokio::time::sleep(Duration::from_millis(300)).await;
        assert!(orchestrator.engine.snapshot(summary.execution_id).await.is_none());
        let stored = orchestrator.status(summary.execution_id).await.unwrap();
        assert_eq!(stored.status, WorkflowStatus::Cancelled);
        assert_eq!(stored.error.as_deref(), Some("cancelled"));
    }

    #[tokio::test]
    async fn test_metrics_accept_widest_window() {
        let orchestrator = orchestrator();
        orchestrator.execute(SubmitRequest::new("greet")).await.unwrap();
        let metrics = orchestrator.metrics(None, u32::MAX).await.unwrap();
        assert_eq!(metrics.total_executions, 1);
    }

    #[tokio::test]
    async fn test_agent_and_template_listing() {
        let orchestrator = orchestrator();
        let meta = AgentMetadata::builder()
            .agent_id("archiver")
            .agent_type("storage")
            .build()
            .unwrap();
        orchestrator.register_agent(Arc::new(StaticAgent::new(meta, Variables::new())));

        assert_eq!(orchestrator.list_agents(None).len(), 2);
        assert_eq!(orchestrator.list_agents(Some("text")).len(), 1);
        assert_eq!(orchestrator.find_agents_by_capability("greeting").len(), 1);
        assert_eq!(orchestrator.list_templates()[0].template_id, "greet");

        let metrics = orchestrator.metrics(None, 24).await.unwrap();
        assert_eq!(metrics.total_executions, 0);
    }
}
