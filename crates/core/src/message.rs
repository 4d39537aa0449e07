//! Conversation messages. The collection itself belongs to the conversation
//! view; the engine only reaches individual messages through
//! [`crate::correlator::MessageSink`].
use crate::error::DispatchError;
use crate::response::{AiResponse, ResponseType};
use crate::step::ExecutionStep;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct Message {
    pub id: String,
    pub role: Role,
    pub content: String,
    pub content_type: ResponseType,
    pub timestamp: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model_ref: Option<String>,
    pub is_loading: bool,
    pub is_streaming: bool,
    #[serde(default)]
    pub steps: Vec<ExecutionStep>,
}

impl Message {
    pub fn user(id: &str, content: &str) -> Self {
        Self {
            id: id.to_string(),
            role: Role::User,
            content: content.to_string(),
            content_type: ResponseType::Text,
            timestamp: Utc::now(),
            model_ref: None,
            is_loading: false,
            is_streaming: false,
            steps: Vec::new(),
        }
    }

    /// Empty assistant message shown while a dispatch is in flight.
    pub fn pending_assistant(id: &str, model_id: &str, streaming: bool) -> Self {
        Self {
            id: id.to_string(),
            role: Role::Assistant,
            content: String::new(),
            content_type: ResponseType::Text,
            timestamp: Utc::now(),
            model_ref: Some(model_id.to_string()),
            is_loading: true,
            is_streaming: streaming,
            steps: Vec::new(),
        }
    }

    /// Pending assistant message with a fresh id, suitable as a correlation id.
    pub fn new_pending_assistant(model_id: &str, streaming: bool) -> Self {
        Self::pending_assistant(&Uuid::new_v4().to_string(), model_id, streaming)
    }

    /// Merges the final response. Steps already delivered over the channel are
    /// kept; steps carried in the response are appended only if none arrived.
    pub fn apply_response(&mut self, response: &AiResponse) {
        self.content = response.content.clone();
        self.content_type = response.response_type;
        self.is_loading = false;
        if self.steps.is_empty()
            && let Some(steps) = &response.execution_steps
        {
            self.steps.extend(steps.iter().cloned());
        }
    }

    pub fn mark_failed(&mut self, err: &DispatchError) {
        self.content = err.user_message();
        self.content_type = ResponseType::Text;
        self.is_loading = false;
        self.is_streaming = false;
    }
}
