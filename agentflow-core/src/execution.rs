//! Workflow execution records and their state machines
//!
//! An execution moves `Pending -> Running -> {Completed | Failed | Cancelled}`
//! (a pending execution may also be cancelled or failed directly). A step
//! moves `Pending -> Running -> {Completed | Failed}` or `Pending -> Skipped`.
//! Terminal states are final; any other move is rejected with
//! [`Error::StateTransition`].

use crate::template::WorkflowTemplate;
use crate::{Error, Result, Variables};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use uuid::Uuid;

/// Lifecycle state of a workflow execution
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum WorkflowStatus {
    Pending,
    Running,
    Completed,
    Failed,
    Cancelled,
}

impl WorkflowStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            WorkflowStatus::Pending => "pending",
            WorkflowStatus::Running => "running",
            WorkflowStatus::Completed => "completed",
            WorkflowStatus::Failed => "failed",
            WorkflowStatus::Cancelled => "cancelled",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            WorkflowStatus::Completed | WorkflowStatus::Failed | WorkflowStatus::Cancelled
        )
    }

    pub fn can_transition_to(&self, next: WorkflowStatus) -> bool {
        use WorkflowStatus::*;
        matches!(
            (self, next),
            (Pending, Running)
                | (Pending, Failed)
                | (Pending, Cancelled)
                | (Running, Completed)
                | (Running, Failed)
                | (Running, Cancelled)
        )
    }
}

impl std::fmt::Display for WorkflowStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for WorkflowStatus {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "pending" => Ok(WorkflowStatus::Pending),
            "running" => Ok(WorkflowStatus::Running),
            "completed" => Ok(WorkflowStatus::Completed),
            "failed" => Ok(WorkflowStatus::Failed),
            "cancelled" => Ok(WorkflowStatus::Cancelled),
            other => Err(Error::validation(format!(
                "Unknown workflow status '{}'",
                other
            ))),
        }
    }
}

/// Lifecycle state of a single step
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum StepStatus {
    Pending,
    Running,
    Completed,
    Failed,
    Skipped,
}

impl StepStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            StepStatus::Pending => "pending",
            StepStatus::Running => "running",
            StepStatus::Completed => "completed",
            StepStatus::Failed => "failed",
            StepStatus::Skipped => "skipped",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            StepStatus::Completed | StepStatus::Failed | StepStatus::Skipped
        )
    }

    pub fn can_transition_to(&self, next: StepStatus) -> bool {
        use StepStatus::*;
        matches!(
            (self, next),
            (Pending, Running)
                | (Pending, Skipped)
                | (Running, Completed)
                | (Running, Failed)
        )
    }
}

impl std::fmt::Display for StepStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Runtime state of one template step within an execution
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StepRuntime {
    pub step_id: String,
    /// Agent declared by the template
    pub agent_id: String,
    /// Agent actually invoked after routing
    pub effective_agent_id: Option<String>,
    pub status: StepStatus,
    /// Raw agent output
    pub result: Option<Variables>,
    pub error: Option<String>,
    pub attempts: u32,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl StepRuntime {
    pub fn new<S1: Into<String>, S2: Into<String>>(step_id: S1, agent_id: S2) -> Self {
        Self {
            step_id: step_id.into(),
            agent_id: agent_id.into(),
            effective_agent_id: None,
            status: StepStatus::Pending,
            result: None,
            error: None,
            attempts: 0,
            started_at: None,
            completed_at: None,
        }
    }

    fn transition(&mut self, next: StepStatus) -> Result<()> {
        if !self.status.can_transition_to(next) {
            return Err(Error::state_transition(format!(
                "step '{}' cannot move from {} to {}",
                self.step_id, self.status, next
            )));
        }
        self.status = next;
        Ok(())
    }

    pub fn start<S: Into<String>>(&mut self, effective_agent_id: S) -> Result<()> {
        self.transition(StepStatus::Running)?;
        self.effective_agent_id = Some(effective_agent_id.into());
        self.started_at = Some(Utc::now());
        Ok(())
    }

    pub fn complete(&mut self, result: Variables, attempts: u32) -> Result<()> {
        self.transition(StepStatus::Completed)?;
        self.result = Some(result);
        self.attempts = attempts;
        self.completed_at = Some(Utc::now());
        Ok(())
    }

    pub fn fail<S: Into<String>>(&mut self, error: S, attempts: u32) -> Result<()> {
        self.transition(StepStatus::Failed)?;
        self.error = Some(error.into());
        self.attempts = attempts;
        self.completed_at = Some(Utc::now());
        Ok(())
    }

    pub fn skip(&mut self) -> Result<()> {
        self.transition(StepStatus::Skipped)
    }

    pub fn duration_ms(&self) -> Option<i64> {
        Some((self.completed_at? - self.started_at?).num_milliseconds())
    }
}

/// One run of a workflow template
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct WorkflowExecution {
    pub execution_id: Uuid,
    pub template_id: String,
    pub name: String,
    pub tenant_id: Option<String>,
    pub user_id: Option<String>,
    pub status: WorkflowStatus,
    pub steps: Vec<StepRuntime>,
    pub initial_variables: Variables,
    pub variables: Variables,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub error: Option<String>,
}

impl WorkflowExecution {
    /// Instantiate a pending execution of `template`
    pub fn new(template: &WorkflowTemplate, initial_variables: Variables) -> Self {
        Self {
            execution_id: Uuid::new_v4(),
            template_id: template.template_id.clone(),
            name: template.name.clone(),
            tenant_id: None,
            user_id: None,
            status: WorkflowStatus::Pending,
            steps: template
                .steps
                .iter()
                .map(|s| StepRuntime::new(&s.step_id, &s.agent_id))
                .collect(),
            variables: initial_variables.clone(),
            initial_variables,
            created_at: Utc::now(),
            started_at: None,
            completed_at: None,
            error: None,
        }
    }

    pub fn with_name<S: Into<String>>(mut self, name: S) -> Self {
        self.name = name.into();
        self
    }

    pub fn with_tenant(mut self, tenant_id: Option<String>, user_id: Option<String>) -> Self {
        self.tenant_id = tenant_id;
        self.user_id = user_id;
        self
    }

    fn transition(&mut self, next: WorkflowStatus) -> Result<()> {
        if !self.status.can_transition_to(next) {
            return Err(Error::state_transition(format!(
                "execution {} cannot move from {} to {}",
                self.execution_id, self.status, next
            )));
        }
        self.status = next;
        if next.is_terminal() {
            self.completed_at = Some(Utc::now());
        }
        Ok(())
    }

    pub fn start(&mut self) -> Result<()> {
        self.transition(WorkflowStatus::Running)?;
        self.started_at = Some(Utc::now());
        Ok(())
    }

    pub fn complete(&mut self) -> Result<()> {
        self.transition(WorkflowStatus::Completed)
    }

    /// Fail the execution and skip every step still pending
    pub fn fail<S: Into<String>>(&mut self, error: S) -> Result<()> {
        self.transition(WorkflowStatus::Failed)?;
        self.error = Some(error.into());
        self.skip_pending();
        Ok(())
    }

    /// Cancel the execution and skip every step still pending
    pub fn cancel(&mut self) -> Result<()> {
        self.transition(WorkflowStatus::Cancelled)?;
        self.error = Some("cancelled".to_string());
        self.skip_pending();
        Ok(())
    }

    /// Mark all pending steps skipped, returning their ids
    pub fn skip_pending(&mut self) -> Vec<String> {
        self.steps
            .iter_mut()
            .filter(|s| s.status == StepStatus::Pending)
            .filter_map(|s| s.skip().ok().map(|_| s.step_id.clone()))
            .collect()
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    pub fn step(&self, step_id: &str) -> Option<&StepRuntime> {
        self.steps.iter().find(|s| s.step_id == step_id)
    }

    pub fn step_mut(&mut self, step_id: &str) -> Option<&mut StepRuntime> {
        self.steps.iter_mut().find(|s| s.step_id == step_id)
    }

    pub fn step_status(&self, step_id: &str) -> Option<StepStatus> {
        self.step(step_id).map(|s| s.status)
    }

    pub fn pending_steps(&self) -> Vec<String> {
        self.steps
            .iter()
            .filter(|s| s.status == StepStatus::Pending)
            .map(|s| s.step_id.clone())
            .collect()
    }

    pub fn duration_ms(&self) -> Option<i64> {
        Some((self.completed_at? - self.started_at.unwrap_or(self.created_at)).num_milliseconds())
    }

    pub fn summary(&self) -> ExecutionSummary {
        ExecutionSummary {
            execution_id: self.execution_id,
            template_id: self.template_id.clone(),
            name: self.name.clone(),
            tenant_id: self.tenant_id.clone(),
            status: self.status,
            created_at: self.created_at,
            started_at: self.started_at,
            completed_at: self.completed_at,
            duration_ms: self.duration_ms(),
            error: self.error.clone(),
        }
    }
}

/// Listing view of an execution
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ExecutionSummary {
    pub execution_id: Uuid,
    pub template_id: String,
    pub name: String,
    pub tenant_id: Option<String>,
    pub status: WorkflowStatus,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub duration_ms: Option<i64>,
    pub error: Option<String>,
}
