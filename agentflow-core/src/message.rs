//! Inter-agent message model
//!
//! Messages are the unit of exchange on the [`MessageBus`](crate::bus::MessageBus).
//! A message without a recipient is a broadcast. Requests and responses are
//! paired through a correlation id.
//!
//! # Examples
//!
//! ```rust
//! use agentflow_core::message::*;
//! use serde_json::json;
//!
//! let request = AgentMessage::new(
//!     "finance_analysis",
//!     Some("calculate_vat".to_string()),
//!     MessageType::Request,
//!     json!({"amount": 100.0}),
//! );
//! let response = request.reply("calculate_vat", json!({"vat": 20.0}));
//!
//! assert_eq!(response.correlation_id, request.correlation_id);
//! assert_eq!(response.to_agent_id.as_deref(), Some("finance_analysis"));
//! ```

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

/// Kind of a bus message
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum MessageType {
    Request,
    Response,
    Notification,
    Broadcast,
}

impl std::fmt::Display for MessageType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            MessageType::Request => "request",
            MessageType::Response => "response",
            MessageType::Notification => "notification",
            MessageType::Broadcast => "broadcast",
        };
        f.write_str(name)
    }
}

/// A message exchanged between agents
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AgentMessage {
    pub message_id: Uuid,
    pub from_agent_id: String,
    /// `None` for broadcasts
    pub to_agent_id: Option<String>,
    pub message_type: MessageType,
    pub payload: Value,
    pub timestamp: DateTime<Utc>,
    pub correlation_id: Option<Uuid>,
}

impl AgentMessage {
    pub fn new<S: Into<String>>(
        from_agent_id: S,
        to_agent_id: Option<String>,
        message_type: MessageType,
        payload: Value,
    ) -> Self {
        Self {
            message_id: Uuid::new_v4(),
            from_agent_id: from_agent_id.into(),
            to_agent_id,
            message_type,
            payload,
            timestamp: Utc::now(),
            correlation_id: None,
        }
    }

    pub fn with_correlation_id(mut self, correlation_id: Uuid) -> Self {
        self.correlation_id = Some(correlation_id);
        self
    }

    pub fn is_broadcast(&self) -> bool {
        self.to_agent_id.is_none()
    }

    pub fn is_addressed_to(&self, agent_id: &str) -> bool {
        self.to_agent_id.as_deref() == Some(agent_id)
    }

    /// Build the `Response` to this message, addressed back to its sender
    ///
    /// The response carries this message's correlation id, or its message id
    /// when the request was sent without one.
    pub fn reply<S: Into<String>>(&self, from_agent_id: S, payload: Value) -> Self {
        Self::new(
            from_agent_id,
            Some(self.from_agent_id.clone()),
            MessageType::Response,
            payload,
        )
        .with_correlation_id(self.correlation_id.unwrap_or(self.message_id))
    }

    pub fn age_seconds(&self) -> i64 {
        (Utc::now() - self.timestamp).num_seconds()
    }
}
