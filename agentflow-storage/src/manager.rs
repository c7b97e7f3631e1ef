//! Storage manager for coordinating database operations

use crate::migrations;
use crate::repositories::{SavedWorkflowRepository, SqliteExecutionStore};
use crate::Result;
use serde::{Deserialize, Serialize};
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions};
use sqlx::{Pool, Sqlite};
use std::str::FromStr;
use std::sync::Arc;
use tracing::info;

/// Database configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: Option<u32>,
    pub migrate_on_startup: bool,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: "sqlite:agentflow.db".to_string(),
            max_connections: Some(10),
            migrate_on_startup: true,
        }
    }
}

impl DatabaseConfig {
    pub fn in_memory() -> Self {
        Self {
            url: "sqlite::memory:".to_string(),
            // every pooled connection would otherwise see its own empty database
            max_connections: Some(1),
            migrate_on_startup: true,
        }
    }

    fn is_in_memory(&self) -> bool {
        self.url.contains(":memory:")
    }
}

/// Owns the connection pool and the repositories built on it
#[derive(Debug, Clone)]
pub struct StorageManager {
    pool: Pool<Sqlite>,
    executions: Arc<SqliteExecutionStore>,
    saved_workflows: Arc<SavedWorkflowRepository>,
}

impl StorageManager {
    /// Connect, creating the database file when missing, and migrate if configured
    pub async fn new(config: &DatabaseConfig) -> Result<Self> {
        info!("Connecting to database: {}", config.url);

        let mut options = SqliteConnectOptions::from_str(&config.url)?.create_if_missing(true);
        if !config.is_in_memory() {
            options = options.journal_mode(SqliteJournalMode::Wal);
        }
        let max_connections = if config.is_in_memory() {
            1
        } else {
            config.max_connections.unwrap_or(10).max(1)
        };

        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections)
            .connect_with(options)
            .await?;

        info!("Database connection established");

        let manager = Self {
            executions: Arc::new(SqliteExecutionStore::new(pool.clone())),
            saved_workflows: Arc::new(SavedWorkflowRepository::new(pool.clone())),
            pool,
        };

        if config.migrate_on_startup {
            manager.migrate().await?;
        }
        Ok(manager)
    }

    /// Run database migrations
    pub async fn migrate(&self) -> Result<()> {
        migrations::run_migrations(&self.pool).await
    }

    pub fn pool(&self) -> &Pool<Sqlite> {
        &self.pool
    }

    /// Execution store implementing the core persistence port
    pub fn executions(&self) -> Arc<SqliteExecutionStore> {
        self.executions.clone()
    }

    pub fn saved_workflows(&self) -> Arc<SavedWorkflowRepository> {
        self.saved_workflows.clone()
    }

    /// Check database health
    pub async fn health_check(&self) -> Result<()> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }

    pub async fn stats(&self) -> Result<DatabaseStats> {
        Ok(DatabaseStats {
            executions_count: self.executions.count().await?,
            saved_workflows_count: self.saved_workflows.count().await?,
        })
    }
}

/// Database statistics
#[derive(Debug, Clone, Serialize)]
pub struct DatabaseStats {
    pub executions_count: i64,
    pub saved_workflows_count: i64,
}
