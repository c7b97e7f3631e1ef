//! Error types for storage operations

use thiserror::Error;

/// Storage layer error type
#[derive(Error, Debug)]
pub enum Error {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Core domain error: {0}")]
    Core(#[from] agentflow_core::Error),

    #[error("Not found: {entity} with id {id}")]
    NotFound { entity: String, id: String },

    #[error("Corrupt record in {table}: {message}")]
    CorruptRecord { table: String, message: String },

    #[error("Internal error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl Error {
    pub fn not_found<S1: Into<String>, S2: Into<String>>(entity: S1, id: S2) -> Self {
        Self::NotFound {
            entity: entity.into(),
            id: id.into(),
        }
    }

    pub fn corrupt<S1: Into<String>, S2: Into<String>>(table: S1, message: S2) -> Self {
        Self::CorruptRecord {
            table: table.into(),
            message: message.into(),
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Error::NotFound { .. })
    }
}

/// Storage failures cross the persistence port as core storage errors
impl From<Error> for agentflow_core::Error {
    fn from(err: Error) -> Self {
        match err {
            Error::Core(core) => core,
            other => agentflow_core::Error::Storage(other.to_string()),
        }
    }
}

/// Convenience result type for storage operations
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_storage_error_maps_into_core() {
        let err: agentflow_core::Error = Error::not_found("execution", "42").into();
        assert_eq!(err.category(), "storage");
        assert!(err.to_string().contains("execution with id 42"));

        let core = agentflow_core::Error::validation("bad template");
        let err: agentflow_core::Error = Error::Core(core.clone()).into();
        assert_eq!(err, core);
    }
}
