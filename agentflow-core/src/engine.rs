//! Workflow engine
//!
//! Runs a template as a sequence of batches. Each round collects the pending
//! steps whose dependencies have completed, routes them to an agent, runs
//! them concurrently and joins the results before the next round starts.
//! The first failed step (in template order) fails the execution and every
//! step not yet dispatched is skipped. Applied variable writes are kept.
//!
//! The engine publishes a snapshot of every running execution to a live
//! table so callers can poll progress and request cancellation. A cancel
//! request is observed between batches; steps already in flight finish.

use crate::agent::{Agent, AgentContext};
use crate::bus::MessageBus;
use crate::config::EngineConfig;
use crate::execution::{StepStatus, WorkflowExecution, WorkflowStatus};
use crate::registry::AgentRegistry;
use crate::retry::RetryStrategy;
use crate::router;
use crate::scheduler;
use crate::template::{WorkflowStep, WorkflowTemplate, STEP_OUTPUT_PREFIX};
use crate::{Error, Result, Variables};
use futures::future::join_all;
use futures::StreamExt;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

/// A step ready to be sent to its agent
struct Dispatch {
    step_id: String,
    agent_id: String,
    agent: Option<Arc<dyn Agent>>,
    input: Variables,
    context: AgentContext,
}

struct StepOutcome {
    step_id: String,
    result: Result<Variables>,
    attempts: u32,
}

pub struct WorkflowEngine {
    agents: Arc<AgentRegistry>,
    bus: Option<Arc<MessageBus>>,
    config: EngineConfig,
    live: RwLock<HashMap<Uuid, WorkflowExecution>>,
}

impl WorkflowEngine {
    pub fn new(agents: Arc<AgentRegistry>, config: EngineConfig) -> Self {
        Self {
            agents,
            bus: None,
            config,
            live: RwLock::new(HashMap::new()),
        }
    }

    /// Hand agents a bus handle through their context
    pub fn with_bus(mut self, bus: Arc<MessageBus>) -> Self {
        self.bus = Some(bus);
        self
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn agents(&self) -> &Arc<AgentRegistry> {
        &self.agents
    }

    /// Validate `template` against the registry and instantiate a pending execution
    ///
    /// Nothing runs and nothing is published to the live table.
    pub fn prepare(
        &self,
        template: &WorkflowTemplate,
        initial_variables: Variables,
    ) -> Result<WorkflowExecution> {
        template.validate_structure()?;

        let violations = self
            .agents
            .validate_dependencies_detailed(&self.agents.routable_agent_ids(template));
        if !violations.is_empty() {
            let message = violations
                .iter()
                .map(ToString::to_string)
                .collect::<Vec<_>>()
                .join("; ");
            warn!(template_id = %template.template_id, %message, "Agent dependency validation failed");
            return Err(Error::dependency_validation(message));
        }

        Ok(WorkflowExecution::new(template, initial_variables))
    }

    /// Prepare and run `template` to a terminal state
    pub async fn execute(
        &self,
        template: &WorkflowTemplate,
        initial_variables: Variables,
    ) -> Result<WorkflowExecution> {
        let execution = self.prepare(template, initial_variables)?;
        Ok(self.run(template, execution).await)
    }

    /// Make a pending execution visible to status polling and cancellation
    pub async fn track(&self, execution: &WorkflowExecution) {
        self.live
            .write()
            .await
            .insert(execution.execution_id, execution.clone());
    }

    /// Run a prepared execution until it reaches a terminal state
    pub async fn run(
        &self,
        template: &WorkflowTemplate,
        mut execution: WorkflowExecution,
    ) -> WorkflowExecution {
        let execution_id = execution.execution_id;

        if let Some(cancelled) = self.cancelled_snapshot(execution_id).await {
            info!(execution_id = %execution_id, "Execution cancelled before start");
            return cancelled;
        }

        if let Err(e) = execution.start() {
            error!(execution_id = %execution_id, error = %e, "Cannot start execution");
            return execution;
        }
        info!(
            execution_id = %execution_id,
            template_id = %template.template_id,
            steps = template.steps.len(),
            "Workflow execution started"
        );
        self.publish(&execution).await;

        let mut batch = 0usize;
        loop {
            if self.cancellation_requested(execution_id).await {
                if let Err(e) = execution.cancel() {
                    warn!(execution_id = %execution_id, error = %e, "Cancellation not applied");
                }
                info!(execution_id = %execution_id, batch, "Execution cancelled between batches");
                break;
            }

            let pending = execution.pending_steps();
            if pending.is_empty() {
                if let Err(e) = execution.complete() {
                    error!(execution_id = %execution_id, error = %e, "Cannot complete execution");
                }
                break;
            }

            let ready = ready_steps(template, &execution);
            if ready.is_empty() {
                let stalled = Error::Stalled {
                    pending_steps: pending,
                };
                error!(execution_id = %execution_id, error = %stalled, "Workflow stalled");
                if let Err(e) = execution.fail(stalled.to_string()) {
                    error!(execution_id = %execution_id, error = %e, "Cannot fail execution");
                }
                break;
            }

            debug!(
                execution_id = %execution_id,
                batch,
                steps = ?ready.iter().map(|s| s.step_id.as_str()).collect::<Vec<_>>(),
                "Dispatching batch"
            );

            let ordered = scheduler::prioritize(&ready, &self.agents);
            let dispatches = self.start_batch(template, &mut execution, &ordered);
            self.publish(&execution).await;

            let outcomes = self.dispatch(dispatches).await;
            if let Some((step_id, failure)) = self.apply_outcomes(&mut execution, &ready, outcomes) {
                let message = format!("Step '{}' failed: {}", step_id, failure);
                if let Err(e) = execution.fail(message) {
                    error!(execution_id = %execution_id, error = %e, "Cannot fail execution");
                }
                self.publish(&execution).await;
                break;
            }

            self.publish(&execution).await;
            batch += 1;
        }

        let execution = self.finalize(execution).await;
        info!(
            execution_id = %execution_id,
            status = %execution.status,
            batches = batch + 1,
            duration_ms = execution.duration_ms().unwrap_or_default(),
            "Workflow execution finished"
        );
        execution
    }

    /// Current snapshot of a tracked execution
    pub async fn snapshot(&self, execution_id: Uuid) -> Option<WorkflowExecution> {
        self.live.read().await.get(&execution_id).cloned()
    }

    pub async fn live_executions(&self) -> Vec<WorkflowExecution> {
        self.live.read().await.values().cloned().collect()
    }

    /// Request cancellation of a tracked execution
    ///
    /// The live record turns `Cancelled` at once; the running task stops
    /// before its next batch.
    pub async fn cancel(&self, execution_id: Uuid) -> Result<WorkflowExecution> {
        let mut live = self.live.write().await;
        let execution = live
            .get_mut(&execution_id)
            .ok_or_else(|| Error::execution_not_found(execution_id.to_string()))?;
        execution.cancel()?;
        info!(execution_id = %execution_id, "Cancellation requested");
        Ok(execution.clone())
    }

    /// Drop a terminal execution from the live table
    pub async fn release(&self, execution_id: Uuid) -> Option<WorkflowExecution> {
        let mut live = self.live.write().await;
        if live.get(&execution_id).is_some_and(|e| e.is_terminal()) {
            live.remove(&execution_id)
        } else {
            None
        }
    }

    fn start_batch(
        &self,
        template: &WorkflowTemplate,
        execution: &mut WorkflowExecution,
        ordered: &[&WorkflowStep],
    ) -> Vec<Dispatch> {
        let mut dispatches = Vec::with_capacity(ordered.len());
        for step in ordered {
            let agent_id = router::route(step, &execution.variables, &self.agents);
            let input = resolve_input(step, execution);

            let mut context =
                AgentContext::new(execution.execution_id, &template.template_id, &step.step_id);
            context.variables = execution.variables.clone();
            context.bus = self.bus.clone();

            if let Some(runtime) = execution.step_mut(&step.step_id) {
                if let Err(e) = runtime.start(&agent_id) {
                    error!(step_id = %step.step_id, error = %e, "Cannot start step");
                    continue;
                }
            }

            dispatches.push(Dispatch {
                step_id: step.step_id.clone(),
                agent: self.agents.get(&agent_id),
                agent_id,
                input,
                context,
            });
        }
        dispatches
    }

    async fn dispatch(&self, dispatches: Vec<Dispatch>) -> Vec<StepOutcome> {
        let calls = dispatches.into_iter().map(|d| self.invoke(d));
        match self.config.max_concurrent_steps {
            Some(limit) => {
                futures::stream::iter(calls)
                    .buffer_unordered(limit.max(1))
                    .collect::<Vec<_>>()
                    .await
            }
            None => join_all(calls).await,
        }
    }

    /// Validate input and call the agent under its timeout and retry policy
    async fn invoke(&self, dispatch: Dispatch) -> StepOutcome {
        let Dispatch {
            step_id,
            agent_id,
            agent,
            input,
            context,
        } = dispatch;

        let Some(agent) = agent else {
            return StepOutcome {
                step_id,
                result: Err(Error::agent_not_found(agent_id)),
                attempts: 0,
            };
        };

        if !agent.validate(&input) {
            warn!(step_id = %step_id, agent_id = %agent_id, "Agent rejected step input");
            return StepOutcome {
                result: Err(Error::InputValidation {
                    agent_id,
                    step_id: step_id.clone(),
                }),
                step_id,
                attempts: 0,
            };
        }

        let metadata = agent.describe();
        let timeout = metadata
            .timeout_seconds
            .or(self.config.default_step_timeout_seconds);
        let strategy = if self.config.retry_failed_steps {
            RetryStrategy::new(metadata.max_retries, self.config.backoff_factor)
        } else {
            RetryStrategy::none()
        };

        debug!(
            execution_id = %context.execution_id,
            step_id = %step_id,
            agent_id = %agent_id,
            "Invoking agent"
        );

        let (result, attempts) = strategy
            .execute(|| call_agent(agent.as_ref(), input.clone(), &context, timeout))
            .await;

        if let Err(e) = &result {
            warn!(
                execution_id = %context.execution_id,
                step_id = %step_id,
                agent_id = %agent_id,
                attempts,
                error = %e,
                "Step failed"
            );
        }

        StepOutcome {
            step_id,
            result,
            attempts,
        }
    }

    /// Fan-in: record outcomes in template order, returning the first failure
    fn apply_outcomes(
        &self,
        execution: &mut WorkflowExecution,
        batch: &[&WorkflowStep],
        outcomes: Vec<StepOutcome>,
    ) -> Option<(String, Error)> {
        let mut by_step: HashMap<String, StepOutcome> = outcomes
            .into_iter()
            .map(|o| (o.step_id.clone(), o))
            .collect();
        let mut first_failure = None;

        for step in batch {
            let Some(outcome) = by_step.remove(&step.step_id) else {
                continue;
            };
            match outcome.result {
                Ok(output) => {
                    for (output_key, variable) in &step.output_mapping {
                        match output.get(output_key) {
                            Some(value) => {
                                execution.variables.insert(variable.clone(), value.clone());
                            }
                            None => debug!(
                                step_id = %step.step_id,
                                output_key = %output_key,
                                "Mapped output key missing from agent result"
                            ),
                        }
                    }
                    if let Some(runtime) = execution.step_mut(&step.step_id) {
                        if let Err(e) = runtime.complete(output, outcome.attempts) {
                            error!(step_id = %step.step_id, error = %e, "Cannot complete step");
                        }
                    }
                }
                Err(failure) => {
                    if let Some(runtime) = execution.step_mut(&step.step_id) {
                        if let Err(e) = runtime.fail(failure.to_string(), outcome.attempts) {
                            error!(step_id = %step.step_id, error = %e, "Cannot fail step");
                        }
                    }
                    if first_failure.is_none() {
                        first_failure = Some((step.step_id.clone(), failure));
                    }
                }
            }
        }

        first_failure
    }

    async fn cancellation_requested(&self, execution_id: Uuid) -> bool {
        self.live
            .read()
            .await
            .get(&execution_id)
            .is_some_and(|e| e.status == WorkflowStatus::Cancelled)
    }

    async fn cancelled_snapshot(&self, execution_id: Uuid) -> Option<WorkflowExecution> {
        self.live
            .read()
            .await
            .get(&execution_id)
            .filter(|e| e.status == WorkflowStatus::Cancelled)
            .cloned()
    }

    /// Publish progress unless the live record was cancelled meanwhile
    async fn publish(&self, execution: &WorkflowExecution) {
        let mut live = self.live.write().await;
        match live.get(&execution.execution_id) {
            Some(current) if current.status == WorkflowStatus::Cancelled => {}
            _ => {
                live.insert(execution.execution_id, execution.clone());
            }
        }
    }

    /// Publish the terminal record and return the one that stands
    ///
    /// A cancellation that landed while the last batch was in flight wins
    /// over the task's own outcome.
    async fn finalize(&self, execution: WorkflowExecution) -> WorkflowExecution {
        let mut live = self.live.write().await;
        if let Some(current) = live.get(&execution.execution_id) {
            if current.status == WorkflowStatus::Cancelled
                && execution.status != WorkflowStatus::Cancelled
            {
                debug!(
                    execution_id = %execution.execution_id,
                    discarded = %execution.status,
                    "Execution cancelled during its final batch"
                );
                return current.clone();
            }
        }
        live.insert(execution.execution_id, execution.clone());
        execution
    }
}

impl std::fmt::Debug for WorkflowEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkflowEngine")
            .field("agents", &self.agents)
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

async fn call_agent(
    agent: &dyn Agent,
    input: Variables,
    context: &AgentContext,
    timeout: Option<u64>,
) -> Result<Variables> {
    match timeout {
        Some(seconds) => tokio::time::timeout(
            Duration::from_secs(seconds),
            agent.execute(input, context),
        )
        .await
        .map_err(|_| Error::timeout(format!("agent:{}", agent.agent_id()), seconds))?,
        None => agent.execute(input, context).await,
    }
}

/// Pending steps whose dependencies have all completed, in template order
fn ready_steps<'a>(
    template: &'a WorkflowTemplate,
    execution: &WorkflowExecution,
) -> Vec<&'a WorkflowStep> {
    template
        .steps
        .iter()
        .filter(|step| execution.step_status(&step.step_id) == Some(StepStatus::Pending))
        .filter(|step| {
            step.dependencies
                .iter()
                .all(|dep| execution.step_status(dep) == Some(StepStatus::Completed))
        })
        .collect()
}

/// Build an agent input from the step's input mapping
///
/// Sources are workflow variables or `step:<step_id>:<output_key>` paths into
/// a completed step's raw result. Sources that do not resolve are omitted.
pub fn resolve_input(step: &WorkflowStep, execution: &WorkflowExecution) -> Variables {
    let mut input = Variables::new();
    for (source, input_key) in &step.input_mapping {
        let value = match source.strip_prefix(STEP_OUTPUT_PREFIX) {
            Some(path) => path.split_once(':').and_then(|(step_id, output_key)| {
                execution
                    .step(step_id)
                    .and_then(|s| s.result.as_ref())
                    .and_then(|result| result.get(output_key))
            }),
            None => execution.variables.get(source),
        };
        if let Some(value) = value {
            input.insert(input_key.clone(), value.clone());
        }
    }
    input
}
