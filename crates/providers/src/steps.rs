use crate::sse;
use anyhow::{Context, Result, anyhow};
use async_trait::async_trait;
use brainwire_core::channel::StepTransport;
use brainwire_core::step::ExecutionStep;
use futures::StreamExt;
use futures::stream::BoxStream;
use reqwest::Client;
use reqwest::header::ACCEPT;
use tracing::info;

/// Execution steps pushed by the backend as server-sent events, one JSON
/// step per event.
pub struct SseStepTransport {
    client: Client,
    url: String,
}

impl SseStepTransport {
    pub fn new(client: Client, url: &str) -> Self {
        Self {
            client,
            url: url.to_string(),
        }
    }
}

#[async_trait]
impl StepTransport for SseStepTransport {
    async fn connect(&self) -> Result<BoxStream<'static, Result<ExecutionStep>>> {
        let response = self
            .client
            .get(&self.url)
            .header(ACCEPT, "text/event-stream")
            .send()
            .await
            .with_context(|| format!("Failed to connect to step stream at {}", self.url))?;

        if !response.status().is_success() {
            return Err(anyhow!(
                "Step stream refused with status {}",
                response.status()
            ));
        }
        info!(url = %self.url, "Connected to step stream");

        let steps = sse::data_events(response).map(|event| {
            let data = event?;
            serde_json::from_str::<ExecutionStep>(&data)
                .with_context(|| format!("Malformed step: {data}"))
        });
        Ok(steps.boxed())
    }
}
