use anyhow::{Context, Result, anyhow};
use async_trait::async_trait;
use brainwire_core::catalog::ModelSource;
use brainwire_core::model::{Model, ModelCategory, Provider};
use reqwest::Client;
use serde::Deserialize;
use tracing::{debug, instrument};
use url::Url;

#[derive(Debug, Deserialize)]
struct TagsResponse {
    #[serde(default)]
    models: Vec<TagEntry>,
}

#[derive(Debug, Deserialize)]
struct TagEntry {
    name: String,
}

/// Server root of an Ollama base URL, without the OpenAI-compatible `/v1`.
pub fn server_root(base_url: &Url) -> String {
    let root = base_url.as_str().trim_end_matches('/');
    root.strip_suffix("/v1").unwrap_or(root).to_string()
}

/// Lists the models installed on a local Ollama server.
pub struct OllamaDiscovery {
    client: Client,
    base_url: Url,
}

impl OllamaDiscovery {
    pub fn new(client: Client, base_url: &str) -> Result<Self> {
        let base_url =
            Url::parse(base_url).with_context(|| format!("Invalid base_url: {base_url}"))?;
        Ok(Self { client, base_url })
    }
}

#[async_trait]
impl ModelSource for OllamaDiscovery {
    fn name(&self) -> String {
        "ollama".to_string()
    }

    #[instrument(skip(self), fields(url = %self.base_url))]
    async fn discover(&self) -> Result<Vec<Model>> {
        let url = format!("{}/api/tags", server_root(&self.base_url));
        let response = self
            .client
            .get(&url)
            .send()
            .await
            .context("Failed to reach Ollama")?;

        if !response.status().is_success() {
            return Err(anyhow!(
                "Ollama model listing failed with status {}",
                response.status()
            ));
        }

        let tags: TagsResponse = response
            .json()
            .await
            .context("Failed to parse Ollama model listing")?;

        // "llama3:8b" and "llama3:latest" are the same model to the user
        let mut models: Vec<Model> = Vec::new();
        for entry in tags.models {
            let base = entry.name.split(':').next().unwrap_or_default();
            if base.is_empty() || models.iter().any(|m| m.id == base) {
                continue;
            }
            models.push(Model::new(base, Provider::Ollama, ModelCategory::Chat).with_streaming(true));
        }
        debug!(count = models.len(), "Discovered Ollama models");
        Ok(models)
    }
}
