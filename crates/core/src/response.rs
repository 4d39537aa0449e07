//! Canonical response shape every call path is mapped into.
use crate::model::ModelCategory;
use crate::step::ExecutionStep;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;

#[derive(Debug, Clone, Copy, Deserialize, Serialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum ResponseType {
    #[default]
    Text,
    Image,
    Audio,
    Embedding,
}

impl From<ModelCategory> for ResponseType {
    fn from(category: ModelCategory) -> Self {
        match category {
            ModelCategory::Image => ResponseType::Image,
            ModelCategory::Audio => ResponseType::Audio,
            ModelCategory::Embedding => ResponseType::Embedding,
            _ => ResponseType::Text,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Default)]
pub struct AiResponse {
    pub content: String,
    #[serde(rename = "type")]
    pub response_type: ResponseType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub execution_steps: Option<Vec<ExecutionStep>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<HashMap<String, Value>>,
}

impl AiResponse {
    pub fn text(content: &str) -> Self {
        Self {
            content: content.to_string(),
            ..Default::default()
        }
    }

    /// Maps a provider reply into the canonical shape. Content is looked up in
    /// the places providers are known to put it, first match wins.
    pub fn from_reply(reply: Value, response_type: ResponseType) -> Self {
        let content = extract_content(&reply).unwrap_or_default();

        let execution_steps = ["execution_steps", "executionSteps"]
            .iter()
            .find_map(|key| reply.get(*key))
            .and_then(|steps| serde_json::from_value::<Vec<ExecutionStep>>(steps.clone()).ok());

        let metadata = reply
            .get("metadata")
            .and_then(Value::as_object)
            .map(|m| m.iter().map(|(k, v)| (k.clone(), v.clone())).collect());

        Self {
            content,
            response_type,
            execution_steps,
            metadata,
        }
    }
}

fn extract_content(reply: &Value) -> Option<String> {
    if let Some(text) = reply.as_str() {
        return Some(text.to_string());
    }

    let candidates = [
        reply.get("content"),
        reply.get("response"),
        reply.get("result"),
        reply.pointer("/message/content"),
        reply.pointer("/choices/0/message/content"),
        reply.pointer("/data/0/url"),
        reply.get("text"),
    ];
    candidates
        .into_iter()
        .flatten()
        .find_map(|v| v.as_str().map(str::to_string))
        .or_else(|| {
            reply
                .pointer("/data/0/embedding")
                .or_else(|| reply.get("embedding"))
                .map(Value::to_string)
        })
}
