//! Repository implementations for persisted entities

pub mod execution;
pub mod saved_workflow;

pub use execution::SqliteExecutionStore;
pub use saved_workflow::{SavedWorkflow, SavedWorkflowRepository};

use crate::{Error, Result};
use chrono::{DateTime, SecondsFormat, Utc};
use uuid::Uuid;

/// Fixed-width RFC 3339 so that text ordering matches time ordering
pub(crate) fn format_timestamp(ts: &DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Micros, true)
}

pub(crate) fn parse_timestamp(table: &str, value: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .map(|ts| ts.with_timezone(&Utc))
        .map_err(|e| Error::corrupt(table, format!("invalid timestamp '{}': {}", value, e)))
}

pub(crate) fn parse_optional_timestamp(
    table: &str,
    value: Option<String>,
) -> Result<Option<DateTime<Utc>>> {
    value.map(|v| parse_timestamp(table, &v)).transpose()
}

pub(crate) fn parse_uuid(table: &str, value: &str) -> Result<Uuid> {
    Uuid::parse_str(value)
        .map_err(|e| Error::corrupt(table, format!("invalid id '{}': {}", value, e)))
}
