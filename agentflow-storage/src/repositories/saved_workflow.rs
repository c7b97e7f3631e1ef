//! Saved workflow repository implementation
//!
//! Users can author their own templates. They are stored as serialized
//! [`WorkflowTemplate`]s together with tenant ownership and usage counters,
//! and re-registered with the orchestrator on startup.

use super::{format_timestamp, parse_optional_timestamp, parse_timestamp, parse_uuid};
use crate::{Error, Result};
use agentflow_core::template::WorkflowTemplate;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::sqlite::SqliteRow;
use sqlx::{Pool, Row, Sqlite};
use tracing::{debug, info};
use uuid::Uuid;

const TABLE: &str = "saved_workflows";

/// A user-authored workflow definition
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SavedWorkflow {
    pub id: Uuid,
    pub tenant_id: Option<String>,
    pub name: String,
    pub description: String,
    pub template: WorkflowTemplate,
    pub tags: Vec<String>,
    pub usage_count: i64,
    pub last_used_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl SavedWorkflow {
    /// Wrap a template after validating it
    pub fn new(template: WorkflowTemplate, tenant_id: Option<String>) -> Result<Self> {
        template.validate()?;
        let now = Utc::now();
        Ok(Self {
            id: Uuid::new_v4(),
            tenant_id,
            name: template.name.clone(),
            description: template.description.clone(),
            tags: template.tags.clone(),
            template,
            usage_count: 0,
            last_used_at: None,
            created_at: now,
            updated_at: now,
        })
    }
}

/// Repository for saved workflow definitions
#[derive(Debug, Clone)]
pub struct SavedWorkflowRepository {
    pool: Pool<Sqlite>,
}

impl SavedWorkflowRepository {
    pub fn new(pool: Pool<Sqlite>) -> Self {
        Self { pool }
    }

    pub async fn create(&self, workflow: &SavedWorkflow) -> Result<()> {
        debug!(id = %workflow.id, name = %workflow.name, "Creating saved workflow");

        sqlx::query(
            r#"
            INSERT INTO saved_workflows (id, tenant_id, name, description, template, tags,
                usage_count, last_used_at, created_at, updated_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
            "#,
        )
        .bind(workflow.id.to_string())
        .bind(&workflow.tenant_id)
        .bind(&workflow.name)
        .bind(&workflow.description)
        .bind(serde_json::to_string(&workflow.template)?)
        .bind(serde_json::to_string(&workflow.tags)?)
        .bind(workflow.usage_count)
        .bind(workflow.last_used_at.as_ref().map(format_timestamp))
        .bind(format_timestamp(&workflow.created_at))
        .bind(format_timestamp(&workflow.updated_at))
        .execute(&self.pool)
        .await?;

        info!(id = %workflow.id, template_id = %workflow.template.template_id, "Saved workflow created");
        Ok(())
    }

    pub async fn find_by_id(&self, id: Uuid) -> Result<Option<SavedWorkflow>> {
        let row = sqlx::query("SELECT * FROM saved_workflows WHERE id = ?1")
            .bind(id.to_string())
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(saved_workflow_from_row).transpose()
    }

    /// Saved workflows, most used first; all tenants when `tenant_id` is `None`
    pub async fn list(&self, tenant_id: Option<&str>) -> Result<Vec<SavedWorkflow>> {
        let rows = match tenant_id {
            Some(tenant_id) => {
                sqlx::query(
                    "SELECT * FROM saved_workflows WHERE tenant_id = ?1 \
                     ORDER BY usage_count DESC, name ASC",
                )
                .bind(tenant_id)
                .fetch_all(&self.pool)
                .await?
            }
            None => {
                sqlx::query("SELECT * FROM saved_workflows ORDER BY usage_count DESC, name ASC")
                    .fetch_all(&self.pool)
                    .await?
            }
        };
        rows.iter().map(saved_workflow_from_row).collect()
    }

    /// Bump the usage counter after the workflow was executed
    pub async fn record_usage(&self, id: Uuid) -> Result<()> {
        let now = format_timestamp(&Utc::now());
        let result = sqlx::query(
            "UPDATE saved_workflows SET usage_count = usage_count + 1, last_used_at = ?1, \
             updated_at = ?1 WHERE id = ?2",
        )
        .bind(now)
        .bind(id.to_string())
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(Error::not_found("saved workflow", id.to_string()));
        }
        Ok(())
    }

    pub async fn delete(&self, id: Uuid) -> Result<bool> {
        let result = sqlx::query("DELETE FROM saved_workflows WHERE id = ?1")
            .bind(id.to_string())
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    pub async fn count(&self) -> Result<i64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM saved_workflows")
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }
}

fn saved_workflow_from_row(row: &SqliteRow) -> Result<SavedWorkflow> {
    let id: String = row.try_get("id")?;
    let template: String = row.try_get("template")?;
    let tags: String = row.try_get("tags")?;
    let created_at: String = row.try_get("created_at")?;
    let updated_at: String = row.try_get("updated_at")?;

    Ok(SavedWorkflow {
        id: parse_uuid(TABLE, &id)?,
        tenant_id: row.try_get("tenant_id")?,
        name: row.try_get("name")?,
        description: row.try_get("description")?,
        template: serde_json::from_str(&template)?,
        tags: serde_json::from_str(&tags)?,
        usage_count: row.try_get("usage_count")?,
        last_used_at: parse_optional_timestamp(TABLE, row.try_get("last_used_at")?)?,
        created_at: parse_timestamp(TABLE, &created_at)?,
        updated_at: parse_timestamp(TABLE, &updated_at)?,
    })
}
