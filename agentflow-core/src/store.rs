//! Execution persistence port
//!
//! The engine hands finished (and freshly submitted) executions to an
//! [`ExecutionStore`]. [`InMemoryExecutionStore`] backs tests and
//! single-process deployments; the storage crate provides a SQLite adapter.

use crate::execution::{ExecutionSummary, WorkflowExecution, WorkflowStatus};
use crate::Result;
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use tokio::sync::RwLock;
use uuid::Uuid;

/// Criteria for listing executions
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ExecutionFilter {
    pub template_id: Option<String>,
    pub status: Option<WorkflowStatus>,
    pub tenant_id: Option<String>,
    pub limit: Option<usize>,
}

impl ExecutionFilter {
    pub fn matches(&self, execution: &WorkflowExecution) -> bool {
        self.template_id
            .as_ref()
            .map_or(true, |t| &execution.template_id == t)
            && self.status.map_or(true, |s| execution.status == s)
            && self
                .tenant_id
                .as_ref()
                .map_or(true, |t| execution.tenant_id.as_ref() == Some(t))
    }
}

/// Aggregated counters for one template
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct TemplateMetrics {
    pub template_id: String,
    pub total_executions: u64,
    pub completed: u64,
    pub failed: u64,
    pub success_rate: f64,
    pub average_duration_ms: f64,
}

/// Aggregated execution counters over a time window
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ExecutionMetrics {
    pub total_executions: u64,
    pub completed: u64,
    pub failed: u64,
    pub cancelled: u64,
    pub running: u64,
    /// completed / (completed + failed + cancelled)
    pub success_rate: f64,
    /// Mean duration of finished executions
    pub average_duration_ms: f64,
    pub by_template: Vec<TemplateMetrics>,
}

#[derive(Default)]
struct Tally {
    total: u64,
    completed: u64,
    failed: u64,
    cancelled: u64,
    running: u64,
    duration_sum: i64,
    duration_count: u64,
}

impl Tally {
    fn add(&mut self, execution: &WorkflowExecution) {
        self.total += 1;
        match execution.status {
            WorkflowStatus::Completed => self.completed += 1,
            WorkflowStatus::Failed => self.failed += 1,
            WorkflowStatus::Cancelled => self.cancelled += 1,
            WorkflowStatus::Running | WorkflowStatus::Pending => self.running += 1,
        }
        if let Some(duration) = execution.duration_ms() {
            self.duration_sum += duration;
            self.duration_count += 1;
        }
    }

    fn success_rate(&self) -> f64 {
        let finished = self.completed + self.failed + self.cancelled;
        if finished == 0 {
            0.0
        } else {
            self.completed as f64 / finished as f64
        }
    }

    fn average_duration_ms(&self) -> f64 {
        if self.duration_count == 0 {
            0.0
        } else {
            self.duration_sum as f64 / self.duration_count as f64
        }
    }
}

impl ExecutionMetrics {
    /// Earliest creation time inside a `hours_back` window
    ///
    /// Windows reaching past the representable range start at the Unix epoch.
    pub fn window_start(hours_back: u32) -> DateTime<Utc> {
        Utc::now()
            .checked_sub_signed(Duration::hours(i64::from(hours_back)))
            .unwrap_or(DateTime::UNIX_EPOCH)
    }

    pub fn from_executions<'a, I>(executions: I) -> Self
    where
        I: IntoIterator<Item = &'a WorkflowExecution>,
    {
        let mut overall = Tally::default();
        let mut per_template: BTreeMap<String, Tally> = BTreeMap::new();

        for execution in executions {
            overall.add(execution);
            per_template
                .entry(execution.template_id.clone())
                .or_default()
                .add(execution);
        }

        Self {
            total_executions: overall.total,
            completed: overall.completed,
            failed: overall.failed,
            cancelled: overall.cancelled,
            running: overall.running,
            success_rate: overall.success_rate(),
            average_duration_ms: overall.average_duration_ms(),
            by_template: per_template
                .into_iter()
                .map(|(template_id, tally)| TemplateMetrics {
                    template_id,
                    total_executions: tally.total,
                    completed: tally.completed,
                    failed: tally.failed,
                    success_rate: tally.success_rate(),
                    average_duration_ms: tally.average_duration_ms(),
                })
                .collect(),
        }
    }
}

/// Persistence boundary for execution records
#[async_trait]
pub trait ExecutionStore: Send + Sync {
    /// Insert or replace the record with the same execution id
    async fn save_execution(&self, execution: &WorkflowExecution) -> Result<()>;

    async fn get_execution(&self, execution_id: Uuid) -> Result<Option<WorkflowExecution>>;

    /// Matching executions, newest first
    async fn list_executions(&self, filter: &ExecutionFilter) -> Result<Vec<ExecutionSummary>>;

    /// Metrics over executions created within the last `hours_back` hours
    async fn metrics(&self, tenant_id: Option<&str>, hours_back: u32) -> Result<ExecutionMetrics>;
}

/// Volatile store keeping every record in memory
#[derive(Debug, Default)]
pub struct InMemoryExecutionStore {
    executions: RwLock<HashMap<Uuid, WorkflowExecution>>,
}

impl InMemoryExecutionStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.executions.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.executions.read().await.is_empty()
    }
}

#[async_trait]
impl ExecutionStore for InMemoryExecutionStore {
    async fn save_execution(&self, execution: &WorkflowExecution) -> Result<()> {
        self.executions
            .write()
            .await
            .insert(execution.execution_id, execution.clone());
        Ok(())
    }

    async fn get_execution(&self, execution_id: Uuid) -> Result<Option<WorkflowExecution>> {
        Ok(self.executions.read().await.get(&execution_id).cloned())
    }

    async fn list_executions(&self, filter: &ExecutionFilter) -> Result<Vec<ExecutionSummary>> {
        let executions = self.executions.read().await;
        let mut matching: Vec<&WorkflowExecution> =
            executions.values().filter(|e| filter.matches(e)).collect();
        matching.sort_by(|a, b| b.created_at.cmp(&a.created_at));

        Ok(matching
            .into_iter()
            .take(filter.limit.unwrap_or(usize::MAX))
            .map(WorkflowExecution::summary)
            .collect())
    }

    async fn metrics(&self, tenant_id: Option<&str>, hours_back: u32) -> Result<ExecutionMetrics> {
        let since = ExecutionMetrics::window_start(hours_back);
        let executions = self.executions.read().await;
        Ok(ExecutionMetrics::from_executions(executions.values().filter(
            |e| {
                e.created_at >= since
                    && tenant_id.map_or(true, |t| e.tenant_id.as_deref() == Some(t))
            },
        )))
    }
}
