//! HTTP configuration probes for the agent and chat tracks.
use crate::discovery::server_root;
use anyhow::{Context, Result};
use async_trait::async_trait;
use brainwire_core::config::Config;
use brainwire_core::model::{Provider, Track};
use brainwire_core::probe::{ProbeResponse, ProbeRule, ProviderProbe};
use reqwest::Client;
use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, instrument, warn};
use url::Url;

/// GETs one status endpoint and reads the reply with a [`ProbeRule`].
pub struct HttpProbe {
    provider: Provider,
    track: Track,
    url: String,
    rule: ProbeRule,
    client: Client,
}

impl HttpProbe {
    pub fn new(client: Client, provider: Provider, track: Track, url: String, rule: ProbeRule) -> Self {
        Self {
            provider,
            track,
            url,
            rule,
            client,
        }
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

#[async_trait]
impl ProviderProbe for HttpProbe {
    fn provider(&self) -> Provider {
        self.provider
    }

    fn track(&self) -> Track {
        self.track
    }

    #[instrument(skip(self), fields(provider = %self.provider, track = %self.track))]
    async fn probe(&self) -> Result<bool> {
        let response = self
            .client
            .get(&self.url)
            .send()
            .await
            .with_context(|| format!("Failed to reach {}", self.url))?;
        let status = response.status().as_u16();
        let text = response.text().await.unwrap_or_default();
        let body = serde_json::from_str(&text).unwrap_or(Value::Null);

        let configured = self.rule.interpret(&ProbeResponse { status, body });
        debug!(status, configured, "Probe answered");
        Ok(configured)
    }
}

fn join(base: &str, path: &str) -> String {
    format!("{}/{}", base.trim_end_matches('/'), path)
}

/// One probe per `(provider, track)` the gateways expose.
///
/// Cloud providers report their own flags (`configured` on the agent
/// service, `isConfigured` on the chat service). Ollama is asked directly
/// for its model listing when a base URL is configured, and the local
/// runtime only has a health endpoint.
pub fn default_probes(client: &Client, config: &Config) -> Vec<Arc<dyn ProviderProbe>> {
    let agent_url = &config.gateway.agent_url;
    let chat_url = &config.gateway.chat_url;
    let mut probes: Vec<Arc<dyn ProviderProbe>> = Vec::new();

    for provider in Provider::ALL {
        probes.push(Arc::new(HttpProbe::new(
            client.clone(),
            provider,
            Track::Agent,
            join(agent_url, &format!("api/agents/{provider}/status")),
            ProbeRule::field("configured"),
        )));

        let chat = match provider {
            Provider::Local => Some(HttpProbe::new(
                client.clone(),
                provider,
                Track::Chat,
                join(chat_url, "api/ai/local/health"),
                ProbeRule::Status,
            )),
            Provider::Ollama => ollama_probe(client, config),
            _ => None,
        };
        probes.push(Arc::new(chat.unwrap_or_else(|| {
            HttpProbe::new(
                client.clone(),
                provider,
                Track::Chat,
                join(chat_url, &format!("api/ai/{provider}/status")),
                ProbeRule::field("isConfigured"),
            )
        })));
    }
    probes
}

fn ollama_probe(client: &Client, config: &Config) -> Option<HttpProbe> {
    let base_url = config.provider(Provider::Ollama)?.base_url.as_deref()?;
    match Url::parse(base_url) {
        Ok(url) => Some(HttpProbe::new(
            client.clone(),
            Provider::Ollama,
            Track::Chat,
            join(&server_root(&url), "api/tags"),
            ProbeRule::lists_entries("models"),
        )),
        Err(err) => {
            warn!(base_url, error = %err, "Invalid Ollama base_url, using gateway probe");
            None
        }
    }
}
