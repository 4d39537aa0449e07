use serde::{Deserialize, Serialize};
use std::fmt;

/// Supported AI provider integrations (serialized as lowercase strings).
#[derive(Debug, Clone, Copy, Deserialize, Serialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "lowercase")]
pub enum Provider {
    Openai,
    Anthropic,
    Gemini,
    Ollama,
    Grok,
    Local,
}

impl Provider {
    pub const ALL: [Provider; 6] = [
        Provider::Openai,
        Provider::Anthropic,
        Provider::Gemini,
        Provider::Ollama,
        Provider::Grok,
        Provider::Local,
    ];

    pub fn as_str(&self) -> &'static str {
        match &self {
            Provider::Openai => "openai",
            Provider::Anthropic => "anthropic",
            Provider::Gemini => "gemini",
            Provider::Ollama => "ollama",
            Provider::Grok => "grok",
            Provider::Local => "local",
        }
    }
}

impl From<Provider> for String {
    fn from(val: Provider) -> Self {
        val.as_str().into()
    }
}

impl fmt::Display for Provider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What a model does, which decides both the calling convention and the track.
#[derive(Debug, Clone, Copy, Deserialize, Serialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum ModelCategory {
    Chat,
    Agent,
    Image,
    Audio,
    Function,
    Rag,
    Embedding,
}

/// One of the two independently configured integration paths for a provider.
#[derive(Debug, Clone, Copy, Deserialize, Serialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum Track {
    Agent,
    Chat,
}

impl Track {
    pub const ALL: [Track; 2] = [Track::Agent, Track::Chat];

    pub fn as_str(&self) -> &'static str {
        match &self {
            Track::Agent => "agent",
            Track::Chat => "chat",
        }
    }
}

impl fmt::Display for Track {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Immutable model descriptor. Catalog refreshes replace these wholesale.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct Model {
    pub id: String,
    pub provider: Provider,
    pub category: ModelCategory,
    #[serde(default, alias = "streaming")]
    pub supports_streaming: bool,
    #[serde(default = "default_color", alias = "color")]
    pub display_color: String,
}

pub(crate) fn default_color() -> String {
    "#6b7280".to_string()
}

impl Model {
    pub fn new(id: &str, provider: Provider, category: ModelCategory) -> Self {
        Self {
            id: id.to_string(),
            provider,
            category,
            supports_streaming: false,
            display_color: default_color(),
        }
    }

    pub fn with_streaming(mut self, supports_streaming: bool) -> Self {
        self.supports_streaming = supports_streaming;
        self
    }

    pub fn with_color(mut self, color: &str) -> Self {
        self.display_color = color.to_string();
        self
    }

    /// The track a dispatch for this model goes through: `agent` iff the
    /// category is agent.
    pub fn track(&self) -> Track {
        match self.category {
            ModelCategory::Agent => Track::Agent,
            _ => Track::Chat,
        }
    }
}
