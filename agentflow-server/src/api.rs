//! JSON API handlers

use crate::copilot::CopilotCommand;
use crate::server::AppState;
use crate::{Error, Result};
use agentflow_core::{
    AgentMetadata, ExecutionFilter, ExecutionSummary, StepRuntime, SubmitRequest, WorkflowExecution,
    WorkflowStatus, WorkflowTemplate,
};
use agentflow_storage::SavedWorkflow;
use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::{info, warn};
use uuid::Uuid;

const DEFAULT_LIST_LIMIT: usize = 100;
const MAX_LIST_LIMIT: usize = 1000;
const DEFAULT_METRICS_HOURS: u32 = 24;

fn parse_execution_id(raw: &str) -> Result<Uuid> {
    Uuid::parse_str(raw).map_err(|_| Error::BadRequest(format!("invalid execution id '{}'", raw)))
}

fn list_limit(limit: Option<usize>) -> usize {
    limit.unwrap_or(DEFAULT_LIST_LIMIT).min(MAX_LIST_LIMIT)
}

/// Health check endpoint
pub async fn health(State(state): State<AppState>) -> Result<Json<Value>> {
    state.storage.health_check().await?;

    Ok(Json(json!({
        "status": "healthy",
        "agents": state.orchestrator.agents().len(),
        "templates": state.orchestrator.templates().len(),
        "timestamp": Utc::now(),
    })))
}

/// Body of `POST /workflows/execute`
#[derive(Debug, Deserialize)]
pub struct ExecuteRequest {
    #[serde(flatten)]
    pub submit: SubmitRequest,
    /// Return as soon as the execution is accepted instead of awaiting its terminal state
    #[serde(default)]
    pub background: bool,
}

#[derive(Debug, Serialize)]
pub struct ExecuteResponse {
    pub execution_id: Uuid,
    pub template_id: String,
    pub status: WorkflowStatus,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub error: Option<String>,
}

impl From<ExecutionSummary> for ExecuteResponse {
    fn from(summary: ExecutionSummary) -> Self {
        Self {
            execution_id: summary.execution_id,
            template_id: summary.template_id,
            status: summary.status,
            created_at: summary.created_at,
            started_at: summary.started_at,
            completed_at: summary.completed_at,
            error: summary.error,
        }
    }
}

async fn run_request(
    state: &AppState,
    request: SubmitRequest,
    background: bool,
) -> Result<ExecutionSummary> {
    let template_id = request.template_id.clone();
    let summary = if background {
        state.orchestrator.submit(request).await?
    } else {
        state.orchestrator.execute(request).await?.summary()
    };

    let saved_id = state.saved.read().await.get(&template_id).copied();
    if let Some(saved_id) = saved_id {
        if let Err(e) = state.saved_workflows().record_usage(saved_id).await {
            warn!(saved_workflow_id = %saved_id, error = %e, "Failed to record saved workflow usage");
        }
    }
    Ok(summary)
}

pub async fn execute_workflow(
    State(state): State<AppState>,
    Json(request): Json<ExecuteRequest>,
) -> Result<Json<ExecuteResponse>> {
    let summary = run_request(&state, request.submit, request.background).await?;
    Ok(Json(summary.into()))
}

#[derive(Debug, Serialize)]
pub struct StatusResponse {
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
    pub steps: Vec<StepRuntime>,
}

impl From<WorkflowExecution> for StatusResponse {
    fn from(execution: WorkflowExecution) -> Self {
        Self {
            duration_ms: execution.duration_ms(),
            execution_id: execution.execution_id,
            template_id: execution.template_id,
            name: execution.name,
            tenant_id: execution.tenant_id,
            status: execution.status,
            created_at: execution.created_at,
            started_at: execution.started_at,
            completed_at: execution.completed_at,
            error: execution.error,
            steps: execution.steps,
        }
    }
}

pub async fn workflow_status(
    State(state): State<AppState>,
    Path(execution_id): Path<String>,
) -> Result<Json<StatusResponse>> {
    let execution_id = parse_execution_id(&execution_id)?;
    let execution = state.orchestrator.status(execution_id).await?;
    Ok(Json(execution.into()))
}

pub async fn workflow_result(
    State(state): State<AppState>,
    Path(execution_id): Path<String>,
) -> Result<Json<Value>> {
    let execution_id = parse_execution_id(&execution_id)?;
    let variables = state.orchestrator.result(execution_id).await?;

    Ok(Json(json!({
        "execution_id": execution_id,
        "status": WorkflowStatus::Completed,
        "variables": variables,
    })))
}

pub async fn cancel_workflow(
    State(state): State<AppState>,
    Path(execution_id): Path<String>,
) -> Result<Json<StatusResponse>> {
    let execution_id = parse_execution_id(&execution_id)?;
    let execution = state.orchestrator.cancel(execution_id).await?;
    info!(execution_id = %execution_id, "Execution cancelled via API");
    Ok(Json(execution.into()))
}

#[derive(Debug, Deserialize)]
pub struct AgentQuery {
    #[serde(rename = "type")]
    pub agent_type: Option<String>,
    pub capability: Option<String>,
}

pub async fn list_agents(
    State(state): State<AppState>,
    Query(query): Query<AgentQuery>,
) -> Json<Value> {
    let agents: Vec<AgentMetadata> = match &query.capability {
        Some(capability) => state
            .orchestrator
            .find_agents_by_capability(capability)
            .into_iter()
            .filter(|agent| {
                query
                    .agent_type
                    .as_deref()
                    .map_or(true, |agent_type| agent.agent_type == agent_type)
            })
            .collect(),
        None => state.orchestrator.list_agents(query.agent_type.as_deref()),
    };

    Json(json!({
        "total": agents.len(),
        "agents": agents,
    }))
}

pub async fn list_templates(State(state): State<AppState>) -> Json<Value> {
    let templates = state.orchestrator.list_templates();
    Json(json!({
        "total": templates.len(),
        "templates": templates,
    }))
}

#[derive(Debug, Deserialize)]
pub struct ExecutionQuery {
    pub template_id: Option<String>,
    pub status: Option<String>,
    pub tenant_id: Option<String>,
    pub limit: Option<usize>,
}

pub async fn list_executions(
    State(state): State<AppState>,
    Query(query): Query<ExecutionQuery>,
) -> Result<Json<Value>> {
    let status = query
        .status
        .as_deref()
        .map(str::parse::<WorkflowStatus>)
        .transpose()?;

    let filter = ExecutionFilter {
        template_id: query.template_id,
        status,
        tenant_id: query.tenant_id,
        limit: Some(list_limit(query.limit)),
    };
    let executions = state.orchestrator.list_executions(&filter).await?;

    Ok(Json(json!({
        "total": executions.len(),
        "executions": executions,
    })))
}

/// Body of `POST /copilot/execute`
#[derive(Debug, Deserialize)]
pub struct CopilotRequest {
    #[serde(flatten)]
    pub command: CopilotCommand,
    #[serde(default)]
    pub tenant_id: Option<String>,
    #[serde(default)]
    pub user_id: Option<String>,
}

pub async fn copilot_execute(
    State(state): State<AppState>,
    Json(request): Json<CopilotRequest>,
) -> Result<Json<Value>> {
    let parsed = state
        .copilot
        .parse(&request.command.command, &request.command.context)?;
    info!(
        template_id = %parsed.template_id,
        keyword = %parsed.keyword,
        "Copilot command mapped to workflow"
    );

    let submit = SubmitRequest {
        template_id: parsed.template_id.clone(),
        initial_variables: parsed.variables.clone(),
        execution_name: Some(request.command.command.clone()),
        tenant_id: request.tenant_id,
        user_id: request.user_id,
    };
    let summary = run_request(&state, submit, false).await?;

    Ok(Json(json!({
        "template_id": parsed.template_id,
        "keyword": parsed.keyword,
        "variables": parsed.variables,
        "execution": ExecuteResponse::from(summary),
    })))
}

#[derive(Debug, Deserialize)]
pub struct MetricsQuery {
    pub tenant_id: Option<String>,
    pub hours_back: Option<u32>,
}

pub async fn metrics(
    State(state): State<AppState>,
    Query(query): Query<MetricsQuery>,
) -> Result<Json<Value>> {
    let hours_back = query.hours_back.unwrap_or(DEFAULT_METRICS_HOURS);
    let metrics = state
        .orchestrator
        .metrics(query.tenant_id.as_deref(), hours_back)
        .await?;

    Ok(Json(json!({
        "tenant_id": query.tenant_id,
        "hours_back": hours_back,
        "metrics": metrics,
    })))
}

#[derive(Debug, Deserialize)]
pub struct MessageQuery {
    pub agent_id: Option<String>,
    pub limit: Option<usize>,
}

pub async fn list_messages(
    State(state): State<AppState>,
    Query(query): Query<MessageQuery>,
) -> Json<Value> {
    let messages = state
        .orchestrator
        .bus()
        .history(query.agent_id.as_deref(), Some(list_limit(query.limit)));

    Json(json!({
        "total": messages.len(),
        "pending": state.orchestrator.bus().pending_count(),
        "messages": messages,
    }))
}

/// Body of `POST /saved-workflows`
#[derive(Debug, Deserialize)]
pub struct SaveWorkflowRequest {
    pub template: WorkflowTemplate,
    #[serde(default)]
    pub tenant_id: Option<String>,
}

pub async fn create_saved_workflow(
    State(state): State<AppState>,
    Json(request): Json<SaveWorkflowRequest>,
) -> Result<(StatusCode, Json<SavedWorkflow>)> {
    let template_id = request.template.template_id.clone();
    if state.orchestrator.template(&template_id).is_some() {
        return Err(Error::BadRequest(format!(
            "template '{}' is already registered",
            template_id
        )));
    }

    let agents = state.orchestrator.agents();
    let routable = agents.routable_agent_ids(&request.template);
    let missing = agents.validate_dependencies_detailed(&routable);
    if !missing.is_empty() {
        let details: Vec<String> = missing.iter().map(ToString::to_string).collect();
        return Err(Error::BadRequest(format!(
            "template '{}' cannot run: {}",
            template_id,
            details.join("; ")
        )));
    }

    let saved = SavedWorkflow::new(request.template, request.tenant_id)?;
    state.saved_workflows().create(&saved).await?;
    state.orchestrator.register_template(saved.template.clone())?;
    state.saved.write().await.insert(template_id.clone(), saved.id);

    info!(saved_workflow_id = %saved.id, template_id = %template_id, "Saved workflow registered");
    Ok((StatusCode::CREATED, Json(saved)))
}

#[derive(Debug, Deserialize)]
pub struct SavedWorkflowQuery {
    pub tenant_id: Option<String>,
}

pub async fn list_saved_workflows(
    State(state): State<AppState>,
    Query(query): Query<SavedWorkflowQuery>,
) -> Result<Json<Value>> {
    let workflows = state
        .saved_workflows()
        .list(query.tenant_id.as_deref())
        .await?;

    Ok(Json(json!({
        "total": workflows.len(),
        "saved_workflows": workflows,
    })))
}
