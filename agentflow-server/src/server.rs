//! HTTP server wiring

use crate::{api, catalog, config::Config, copilot::CommandParser, Error, Result};
use agentflow_core::Orchestrator;
use agentflow_storage::{SavedWorkflowRepository, StorageManager};
use axum::{
    routing::{get, post},
    Router,
};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::signal;
use tokio::sync::RwLock;
use tower::ServiceBuilder;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::{error, info, warn};
use uuid::Uuid;

/// Shared state of every request handler
#[derive(Clone)]
pub struct AppState {
    pub orchestrator: Arc<Orchestrator>,
    pub storage: StorageManager,
    pub copilot: Arc<CommandParser>,
    /// Template id of each saved workflow mapped to its record id
    pub saved: Arc<RwLock<HashMap<String, Uuid>>>,
}

impl AppState {
    /// Wire an orchestrator onto `storage` and install the built-in catalog
    pub async fn new(config: &Config, storage: StorageManager) -> Result<Self> {
        let orchestrator = Orchestrator::new(
            config.engine.clone(),
            config.bus.clone(),
            storage.executions(),
        );
        catalog::install(&orchestrator)?;

        let state = Self {
            orchestrator: Arc::new(orchestrator),
            copilot: Arc::new(CommandParser::new(catalog::copilot_rules())?),
            saved: Arc::new(RwLock::new(HashMap::new())),
            storage,
        };
        state.restore_saved_workflows().await?;
        Ok(state)
    }

    pub fn saved_workflows(&self) -> Arc<SavedWorkflowRepository> {
        self.storage.saved_workflows()
    }

    /// Re-register user-authored templates persisted by earlier runs
    async fn restore_saved_workflows(&self) -> Result<()> {
        let workflows = self.saved_workflows().list(None).await?;
        let mut saved = self.saved.write().await;

        for workflow in workflows {
            let template_id = workflow.template.template_id.clone();
            if let Err(e) = self.orchestrator.register_template(workflow.template) {
                warn!(
                    saved_workflow_id = %workflow.id,
                    template_id = %template_id,
                    error = %e,
                    "Skipping invalid saved workflow"
                );
                continue;
            }
            saved.insert(template_id, workflow.id);
        }

        info!(count = saved.len(), "Saved workflows restored");
        Ok(())
    }
}

/// Build the application router
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(api::health))
        .route("/workflows/execute", post(api::execute_workflow))
        .route("/workflows/:execution_id/status", get(api::workflow_status))
        .route("/workflows/:execution_id/result", get(api::workflow_result))
        .route("/workflows/:execution_id/cancel", post(api::cancel_workflow))
        .route("/agents", get(api::list_agents))
        .route("/templates", get(api::list_templates))
        .route("/executions", get(api::list_executions))
        .route("/copilot/execute", post(api::copilot_execute))
        .route("/metrics", get(api::metrics))
        .route("/messages", get(api::list_messages))
        .route(
            "/saved-workflows",
            get(api::list_saved_workflows).post(api::create_saved_workflow),
        )
        .with_state(state)
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(CorsLayer::permissive()),
        )
}

/// Main server
pub struct Server {
    config: Config,
    state: AppState,
}

impl Server {
    /// Create a new server instance
    pub async fn new(config: Config) -> Result<Self> {
        info!(
            host = %config.server.host,
            port = config.server.port,
            "Initializing Agentflow server"
        );

        let storage = StorageManager::new(&config.database).await?;
        let state = AppState::new(&config, storage).await?;

        Ok(Self { config, state })
    }

    pub fn state(&self) -> &AppState {
        &self.state
    }

    pub fn router(&self) -> Router {
        build_router(self.state.clone())
    }

    /// Serve until Ctrl+C or SIGTERM
    pub async fn run(self) -> Result<()> {
        let addr = self.config.server_addr()?;
        let listener = tokio::net::TcpListener::bind(addr).await?;
        info!("Agentflow API listening on http://{}", addr);

        axum::serve(listener, self.router())
            .with_graceful_shutdown(wait_for_shutdown())
            .await
            .map_err(Error::Io)?;

        self.state.storage.pool().close().await;
        info!("Server shutdown complete");
        Ok(())
    }
}

/// Wait for shutdown signal
async fn wait_for_shutdown() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!("Shutdown signal received");
}
