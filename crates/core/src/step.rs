//! Execution steps: out-of-band progress events emitted by long-running agent calls.
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;

/// Metadata key carrying the id of the message a step belongs to.
pub const MESSAGE_ID_KEY: &str = "messageId";

#[derive(Debug, Clone, Copy, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum StepType {
    Thinking,
    FunctionCall,
    DatabaseOperation,
    Processing,
    /// Terminal marker for a message's step stream.
    Result,
}

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct ExecutionStep {
    #[serde(rename = "type")]
    pub step_type: StepType,
    #[serde(default)]
    pub content: String,
    #[serde(default = "Utc::now")]
    pub timestamp: DateTime<Utc>,
    #[serde(default)]
    pub metadata: HashMap<String, Value>,
}

impl ExecutionStep {
    pub fn new(step_type: StepType, content: &str) -> Self {
        Self {
            step_type,
            content: content.to_string(),
            timestamp: Utc::now(),
            metadata: HashMap::new(),
        }
    }

    pub fn for_message(mut self, message_id: &str) -> Self {
        self.metadata
            .insert(MESSAGE_ID_KEY.to_string(), Value::String(message_id.to_string()));
        self
    }

    /// The correlation key, if the backend stamped one. Empty ids count as absent.
    pub fn message_id(&self) -> Option<&str> {
        self.metadata
            .get(MESSAGE_ID_KEY)
            .and_then(Value::as_str)
            .filter(|id| !id.is_empty())
    }

    pub fn is_terminal(&self) -> bool {
        self.step_type == StepType::Result
    }
}
