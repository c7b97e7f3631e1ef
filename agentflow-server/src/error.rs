//! Error types for the server application

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

/// Server application error type
#[derive(Error, Debug)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Config file error: {0}")]
    ConfigFile(#[from] config::ConfigError),

    #[error("Storage error: {0}")]
    Storage(#[from] agentflow_storage::Error),

    #[error("Core domain error: {0}")]
    Core(#[from] agentflow_core::Error),

    #[error("Pattern error: {0}")]
    Pattern(#[from] regex::Error),

    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Internal error: {0}")]
    Internal(#[from] anyhow::Error),
}

/// Convenience result type for server operations
pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// HTTP status this error is reported with
    pub fn status_code(&self) -> StatusCode {
        match self {
            Error::BadRequest(_) => StatusCode::BAD_REQUEST,
            Error::NotFound(_) => StatusCode::NOT_FOUND,
            Error::Core(err) => core_status(err),
            Error::Storage(agentflow_storage::Error::Core(err)) => core_status(err),
            Error::Storage(err) if err.is_not_found() => StatusCode::NOT_FOUND,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

/// Unknown executions are 404; an unknown template in a request body is the caller's mistake
fn core_status(err: &agentflow_core::Error) -> StatusCode {
    match err {
        agentflow_core::Error::ExecutionNotFound { .. } => StatusCode::NOT_FOUND,
        err if err.is_client_error() => StatusCode::BAD_REQUEST,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let error_message = if status.is_server_error() {
            tracing::error!(error = %self, "Request failed");
            "Internal server error".to_string()
        } else {
            match self {
                Error::BadRequest(msg) | Error::NotFound(msg) => msg,
                Error::Core(err) => err.to_string(),
                Error::Storage(agentflow_storage::Error::Core(err)) => err.to_string(),
                other => other.to_string(),
            }
        };

        let body = Json(json!({
            "error": error_message,
        }));

        (status, body).into_response()
    }
}
