//! Execution repository implementation

use super::{format_timestamp, parse_optional_timestamp, parse_timestamp, parse_uuid};
use crate::{Error, Result};
use agentflow_core::execution::{ExecutionSummary, StepRuntime, WorkflowExecution, WorkflowStatus};
use agentflow_core::store::{ExecutionFilter, ExecutionMetrics, ExecutionStore};
use agentflow_core::Variables;
use async_trait::async_trait;
use sqlx::sqlite::SqliteRow;
use sqlx::{Pool, QueryBuilder, Row, Sqlite};
use std::str::FromStr;
use tracing::debug;
use uuid::Uuid;

const TABLE: &str = "executions";

const COLUMNS: &str = "id, tenant_id, user_id, template_id, name, status, initial_variables, \
    final_variables, steps_data, duration_ms, error, created_at, started_at, completed_at";

/// SQLite-backed execution store
#[derive(Debug, Clone)]
pub struct SqliteExecutionStore {
    pool: Pool<Sqlite>,
}

impl SqliteExecutionStore {
    pub fn new(pool: Pool<Sqlite>) -> Self {
        Self { pool }
    }

    /// Insert or replace an execution record
    pub async fn save(&self, execution: &WorkflowExecution) -> Result<()> {
        debug!(
            execution_id = %execution.execution_id,
            status = %execution.status,
            "Saving workflow execution"
        );

        let initial_variables = serde_json::to_string(&execution.initial_variables)?;
        let final_variables = serde_json::to_string(&execution.variables)?;
        let steps_data = serde_json::to_string(&execution.steps)?;

        sqlx::query(
            r#"
            INSERT INTO executions (id, tenant_id, user_id, template_id, name, status,
                initial_variables, final_variables, steps_data, duration_ms, error,
                created_at, started_at, completed_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14)
            ON CONFLICT(id) DO UPDATE SET
                status = excluded.status,
                name = excluded.name,
                final_variables = excluded.final_variables,
                steps_data = excluded.steps_data,
                duration_ms = excluded.duration_ms,
                error = excluded.error,
                started_at = excluded.started_at,
                completed_at = excluded.completed_at
            "#,
        )
        .bind(execution.execution_id.to_string())
        .bind(&execution.tenant_id)
        .bind(&execution.user_id)
        .bind(&execution.template_id)
        .bind(&execution.name)
        .bind(execution.status.as_str())
        .bind(initial_variables)
        .bind(final_variables)
        .bind(steps_data)
        .bind(execution.duration_ms())
        .bind(&execution.error)
        .bind(format_timestamp(&execution.created_at))
        .bind(execution.started_at.as_ref().map(format_timestamp))
        .bind(execution.completed_at.as_ref().map(format_timestamp))
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    pub async fn find_by_id(&self, execution_id: Uuid) -> Result<Option<WorkflowExecution>> {
        let row = sqlx::query(&format!("SELECT {} FROM executions WHERE id = ?1", COLUMNS))
            .bind(execution_id.to_string())
            .fetch_optional(&self.pool)
            .await?;

        row.as_ref().map(execution_from_row).transpose()
    }

    /// Matching executions, newest first
    pub async fn list(&self, filter: &ExecutionFilter) -> Result<Vec<ExecutionSummary>> {
        let mut query = QueryBuilder::<Sqlite>::new(format!(
            "SELECT {} FROM executions WHERE 1 = 1",
            COLUMNS
        ));
        if let Some(template_id) = &filter.template_id {
            query.push(" AND template_id = ").push_bind(template_id.clone());
        }
        if let Some(status) = filter.status {
            query.push(" AND status = ").push_bind(status.as_str());
        }
        if let Some(tenant_id) = &filter.tenant_id {
            query.push(" AND tenant_id = ").push_bind(tenant_id.clone());
        }
        query.push(" ORDER BY created_at DESC");
        if let Some(limit) = filter.limit {
            query
                .push(" LIMIT ")
                .push_bind(i64::try_from(limit).unwrap_or(i64::MAX));
        }

        let rows = query.build().fetch_all(&self.pool).await?;
        rows.iter()
            .map(|row| execution_from_row(row).map(|e| e.summary()))
            .collect()
    }

    /// Aggregate executions created within the last `hours_back` hours
    pub async fn metrics(&self, tenant_id: Option<&str>, hours_back: u32) -> Result<ExecutionMetrics> {
        let since = format_timestamp(&ExecutionMetrics::window_start(hours_back));

        let mut query = QueryBuilder::<Sqlite>::new(format!(
            "SELECT {} FROM executions WHERE created_at >= ",
            COLUMNS
        ));
        query.push_bind(since);
        if let Some(tenant_id) = tenant_id {
            query.push(" AND tenant_id = ").push_bind(tenant_id.to_string());
        }

        let rows = query.build().fetch_all(&self.pool).await?;
        let executions = rows
            .iter()
            .map(execution_from_row)
            .collect::<Result<Vec<_>>>()?;
        Ok(ExecutionMetrics::from_executions(&executions))
    }

    pub async fn delete(&self, execution_id: Uuid) -> Result<bool> {
        let result = sqlx::query("DELETE FROM executions WHERE id = ?1")
            .bind(execution_id.to_string())
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    pub async fn count(&self) -> Result<i64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM executions")
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }
}

#[async_trait]
impl ExecutionStore for SqliteExecutionStore {
    async fn save_execution(&self, execution: &WorkflowExecution) -> agentflow_core::Result<()> {
        Ok(self.save(execution).await?)
    }

    async fn get_execution(
        &self,
        execution_id: Uuid,
    ) -> agentflow_core::Result<Option<WorkflowExecution>> {
        Ok(self.find_by_id(execution_id).await?)
    }

    async fn list_executions(
        &self,
        filter: &ExecutionFilter,
    ) -> agentflow_core::Result<Vec<ExecutionSummary>> {
        Ok(self.list(filter).await?)
    }

    async fn metrics(
        &self,
        tenant_id: Option<&str>,
        hours_back: u32,
    ) -> agentflow_core::Result<ExecutionMetrics> {
        Ok(SqliteExecutionStore::metrics(self, tenant_id, hours_back).await?)
    }
}

fn execution_from_row(row: &SqliteRow) -> Result<WorkflowExecution> {
    let id: String = row.try_get("id")?;
    let status: String = row.try_get("status")?;
    let initial_variables: String = row.try_get("initial_variables")?;
    let final_variables: String = row.try_get("final_variables")?;
    let steps_data: String = row.try_get("steps_data")?;
    let created_at: String = row.try_get("created_at")?;

    let status = WorkflowStatus::from_str(&status)
        .map_err(|e| Error::corrupt(TABLE, e.to_string()))?;
    let initial_variables: Variables = serde_json::from_str(&initial_variables)?;
    let variables: Variables = serde_json::from_str(&final_variables)?;
    let steps: Vec<StepRuntime> = serde_json::from_str(&steps_data)?;

    Ok(WorkflowExecution {
        execution_id: parse_uuid(TABLE, &id)?,
        template_id: row.try_get("template_id")?,
        name: row.try_get("name")?,
        tenant_id: row.try_get("tenant_id")?,
        user_id: row.try_get("user_id")?,
        status,
        steps,
        initial_variables,
        variables,
        created_at: parse_timestamp(TABLE, &created_at)?,
        started_at: parse_optional_timestamp(TABLE, row.try_get("started_at")?)?,
        completed_at: parse_optional_timestamp(TABLE, row.try_get("completed_at")?)?,
        error: row.try_get("error")?,
    })
}
