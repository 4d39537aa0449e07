//! HTTP backend for both tracks: the agent service and the direct-chat
//! service, with OpenAI-compatible streaming where a provider supports it.
use crate::openai::OpenAiStreamer;
use anyhow::{Context, Result, anyhow};
use async_trait::async_trait;
use brainwire_core::completion::{AiBackend, AiRequest};
use brainwire_core::config::Config;
use brainwire_core::model::{ModelCategory, Provider};
use futures::stream::BoxStream;
use reqwest::{Client, Response};
use serde_json::{Value, json};
use std::collections::HashMap;
use tracing::{debug, instrument, warn};
use url::Url;

/// Chat-track endpoint for a model category.
pub fn category_endpoint(category: ModelCategory) -> &'static str {
    match category {
        ModelCategory::Image => "image",
        ModelCategory::Audio => "transcribe",
        ModelCategory::Embedding => "embed",
        ModelCategory::Chat
        | ModelCategory::Agent
        | ModelCategory::Function
        | ModelCategory::Rag => "chat",
    }
}

pub struct GatewayBackend {
    client: Client,
    agent_url: Url,
    chat_url: Url,
    streamers: HashMap<Provider, OpenAiStreamer>,
}

impl GatewayBackend {
    pub fn new(client: Client, agent_url: &str, chat_url: &str) -> Result<Self> {
        Ok(Self {
            client,
            agent_url: Url::parse(agent_url)
                .with_context(|| format!("Invalid agent_url: {agent_url}"))?,
            chat_url: Url::parse(chat_url)
                .with_context(|| format!("Invalid chat_url: {chat_url}"))?,
            streamers: HashMap::new(),
        })
    }

    /// Gateway URLs from configuration, plus a streamer for every provider
    /// that has a `base_url`. A provider whose key cannot be resolved is
    /// skipped with a warning rather than failing the whole backend.
    pub fn from_config(client: Client, config: &Config) -> Result<Self> {
        let mut backend = Self::new(client, &config.gateway.agent_url, &config.gateway.chat_url)?;
        for (provider, settings) in &config.providers {
            if settings.base_url.is_none() {
                continue;
            }
            match OpenAiStreamer::new(settings) {
                Ok(streamer) => backend = backend.with_streamer(*provider, streamer),
                Err(err) => warn!(%provider, error = %err, "Streaming disabled for provider"),
            }
        }
        Ok(backend)
    }

    pub fn with_streamer(mut self, provider: Provider, streamer: OpenAiStreamer) -> Self {
        self.streamers.insert(provider, streamer);
        self
    }

    fn url(base: &Url, path: &str) -> String {
        format!("{}/{}", base.as_str().trim_end_matches('/'), path)
    }

    async fn post(&self, url: String, body: Value, provider: Provider) -> Result<Value> {
        debug!(%url, "Sending provider request");
        let response = self
            .client
            .post(&url)
            .json(&body)
            .send()
            .await
            .with_context(|| format!("Failed to send request to {provider}"))?;
        read_json(response, provider).await
    }
}

async fn read_json(response: Response, provider: Provider) -> Result<Value> {
    if !response.status().is_success() {
        let status = response.status();
        let text = response
            .text()
            .await
            .unwrap_or_else(|_| "Unknown error".to_string());
        return Err(anyhow!(
            "{} request failed with status {}: {}",
            provider,
            status,
            text
        ));
    }

    let text = response
        .text()
        .await
        .with_context(|| format!("Failed to read response from {provider}"))?;
    // Some providers answer with bare text
    Ok(serde_json::from_str(&text).unwrap_or(Value::String(text)))
}

#[async_trait]
impl AiBackend for GatewayBackend {
    #[instrument(skip(self, request), fields(model = %request.model.id))]
    async fn complete(&self, request: &AiRequest) -> Result<Value> {
        let provider = request.model.provider;
        let url = Self::url(
            &self.chat_url,
            &format!(
                "api/ai/{}/{}",
                provider,
                category_endpoint(request.model.category)
            ),
        );
        let body = json!({
            "model": request.model.id,
            "input": request.input,
            "messageId": request.correlation_id,
        });
        self.post(url, body, provider).await
    }

    async fn stream(&self, request: &AiRequest) -> Result<BoxStream<'static, Result<String>>> {
        let provider = request.model.provider;
        let streamer = self
            .streamers
            .get(&provider)
            .ok_or_else(|| anyhow!("Streaming is not configured for provider {provider}"))?;
        streamer.stream(request).await
    }

    fn can_stream(&self, provider: Provider) -> bool {
        self.streamers.contains_key(&provider)
    }

    #[instrument(skip(self, request), fields(model = %request.model.id))]
    async fn run_agent(&self, request: &AiRequest) -> Result<Value> {
        let provider = request.model.provider;
        let url = Self::url(&self.agent_url, &format!("api/agents/{provider}/run"));
        let body = json!({
            "prompt": request.input,
            "model_id": request.model.id,
            "message_id": request.correlation_id,
        });
        self.post(url, body, provider).await
    }
}
