//! Error types for the core domain

use thiserror::Error;

/// Core error type for registry, engine and messaging operations
#[derive(Error, Debug, Clone, PartialEq)]
pub enum Error {
    #[error("Validation error: {message}")]
    Validation { message: String },

    #[error("Workflow template not found: {template_id}")]
    TemplateNotFound { template_id: String },

    #[error("Agent not found: {agent_id}")]
    AgentNotFound { agent_id: String },

    #[error("Workflow execution not found: {execution_id}")]
    ExecutionNotFound { execution_id: String },

    #[error("Dependency validation failed: {message}")]
    DependencyValidation { message: String },

    #[error("Invalid workflow template '{template_id}': {message}")]
    InvalidTemplate {
        template_id: String,
        message: String,
    },

    #[error("Dependency cycle detected among steps: {}", unresolved.join(", "))]
    CycleDetected { unresolved: Vec<String> },

    #[error("Workflow stalled with unsatisfiable steps: {}", pending_steps.join(", "))]
    Stalled { pending_steps: Vec<String> },

    #[error("Agent '{agent_id}' failed: {message}")]
    AgentExecution { agent_id: String, message: String },

    #[error("Input rejected by agent '{agent_id}' for step '{step_id}'")]
    InputValidation { agent_id: String, step_id: String },

    #[error("Operation timeout: {operation} exceeded {timeout_seconds}s")]
    Timeout {
        operation: String,
        timeout_seconds: u64,
    },

    #[error("State transition error: {message}")]
    StateTransition { message: String },

    #[error("Workflow execution {execution_id} is not completed (status: {status})")]
    NotCompleted {
        execution_id: String,
        status: String,
    },

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Configuration error: {message}")]
    Configuration { message: String },

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::Serialization(err.to_string())
    }
}

impl From<anyhow::Error> for Error {
    fn from(err: anyhow::Error) -> Self {
        Error::Internal(err.to_string())
    }
}

impl Error {
    /// Create a validation error with a formatted message
    pub fn validation<S: Into<String>>(message: S) -> Self {
        Self::Validation {
            message: message.into(),
        }
    }

    pub fn template_not_found<S: Into<String>>(template_id: S) -> Self {
        Self::TemplateNotFound {
            template_id: template_id.into(),
        }
    }

    pub fn agent_not_found<S: Into<String>>(agent_id: S) -> Self {
        Self::AgentNotFound {
            agent_id: agent_id.into(),
        }
    }

    pub fn execution_not_found<S: Into<String>>(execution_id: S) -> Self {
        Self::ExecutionNotFound {
            execution_id: execution_id.into(),
        }
    }

    /// Create a dependency validation error
    pub fn dependency_validation<S: Into<String>>(message: S) -> Self {
        Self::DependencyValidation {
            message: message.into(),
        }
    }

    /// Create an invalid template error
    pub fn invalid_template<S1: Into<String>, S2: Into<String>>(
        template_id: S1,
        message: S2,
    ) -> Self {
        Self::InvalidTemplate {
            template_id: template_id.into(),
            message: message.into(),
        }
    }

    /// Create an agent execution error
    pub fn agent_execution<S1: Into<String>, S2: Into<String>>(agent_id: S1, message: S2) -> Self {
        Self::AgentExecution {
            agent_id: agent_id.into(),
            message: message.into(),
        }
    }

    /// Create a timeout error
    pub fn timeout<S: Into<String>>(operation: S, timeout_seconds: u64) -> Self {
        Self::Timeout {
            operation: operation.into(),
            timeout_seconds,
        }
    }

    /// Create a state transition error
    pub fn state_transition<S: Into<String>>(message: S) -> Self {
        Self::StateTransition {
            message: message.into(),
        }
    }

    /// Create a configuration error
    pub fn configuration<S: Into<String>>(message: S) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }

    /// Check if this error is a validation error
    pub fn is_validation(&self) -> bool {
        matches!(self, Error::Validation { .. })
    }

    /// Check if this error refers to an unknown template, agent or execution
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            Error::TemplateNotFound { .. }
                | Error::AgentNotFound { .. }
                | Error::ExecutionNotFound { .. }
        )
    }

    /// Check if this error is a timeout error
    pub fn is_timeout(&self) -> bool {
        matches!(self, Error::Timeout { .. })
    }

    /// Check if this error was caused by the caller's request rather than the system
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            Error::Validation { .. }
                | Error::TemplateNotFound { .. }
                | Error::AgentNotFound { .. }
                | Error::DependencyValidation { .. }
                | Error::InvalidTemplate { .. }
                | Error::CycleDetected { .. }
                | Error::StateTransition { .. }
                | Error::NotCompleted { .. }
        )
    }

    /// Check if this error is worth retrying
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Error::Timeout { .. } | Error::AgentExecution { .. } | Error::Storage(_)
        )
    }

    /// Get the error category for logging and metrics
    pub fn category(&self) -> &'static str {
        match self {
            Error::Validation { .. } => "validation",
            Error::TemplateNotFound { .. } => "template_not_found",
            Error::AgentNotFound { .. } => "agent_not_found",
            Error::ExecutionNotFound { .. } => "execution_not_found",
            Error::DependencyValidation { .. } => "dependency_validation",
            Error::InvalidTemplate { .. } => "invalid_template",
            Error::CycleDetected { .. } => "cycle_detected",
            Error::Stalled { .. } => "stalled",
            Error::AgentExecution { .. } => "agent_execution",
            Error::InputValidation { .. } => "input_validation",
            Error::Timeout { .. } => "timeout",
            Error::StateTransition { .. } => "state_transition",
            Error::NotCompleted { .. } => "not_completed",
            Error::Serialization(_) => "serialization",
            Error::Configuration { .. } => "configuration",
            Error::Storage(_) => "storage",
            Error::Internal(_) => "internal",
        }
    }
}

/// Convenience result type for core operations
pub type Result<T> = std::result::Result<T, Error>;
