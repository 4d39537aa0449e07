//! The dispatcher resolves a model, checks its track is configured and
//! routes the call through exactly one calling convention.
use crate::cache::ConfigurationCache;
use crate::catalog::ModelCatalog;
use crate::completion::{AiBackend, AiRequest, CancellationToken, StreamStats};
use crate::error::DispatchError;
use crate::model::{Model, ModelCategory};
use crate::response::{AiResponse, ResponseType};
use futures::StreamExt;
use serde_json::json;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, instrument, warn};

/// Invoked once per streamed chunk with the cumulative content so far.
pub type StreamCallback = Box<dyn FnMut(&str, &StreamStats) + Send>;

#[derive(Default)]
pub struct DispatchOptions {
    pub on_stream_update: Option<StreamCallback>,
    pub cancel_token: Option<CancellationToken>,
    pub correlation_id: Option<String>,
}

impl DispatchOptions {
    /// Options for a dispatch whose steps should be stamped with `message_id`.
    pub fn for_message(message_id: &str) -> Self {
        Self {
            correlation_id: Some(message_id.to_string()),
            ..Default::default()
        }
    }

    pub fn with_stream_callback(
        mut self,
        callback: impl FnMut(&str, &StreamStats) + Send + 'static,
    ) -> Self {
        self.on_stream_update = Some(Box::new(callback));
        self
    }

    pub fn with_cancel_token(mut self, token: CancellationToken) -> Self {
        self.cancel_token = Some(token);
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallPlan {
    Simple,
    Streaming,
    Agent,
}

/// Picks the calling convention. Agent models never stream from the
/// dispatcher's point of view; their progress arrives over the step channel.
pub fn resolve_plan(model: &Model, wants_stream_updates: bool) -> CallPlan {
    if model.category == ModelCategory::Agent {
        CallPlan::Agent
    } else if model.supports_streaming && wants_stream_updates {
        CallPlan::Streaming
    } else {
        CallPlan::Simple
    }
}

pub struct Dispatcher {
    catalog: Arc<ModelCatalog>,
    cache: Arc<ConfigurationCache>,
    backend: Arc<dyn AiBackend>,
}

impl Dispatcher {
    pub fn new(
        catalog: Arc<ModelCatalog>,
        cache: Arc<ConfigurationCache>,
        backend: Arc<dyn AiBackend>,
    ) -> Self {
        Self {
            catalog,
            cache,
            backend,
        }
    }

    #[instrument(skip(self, input, options), fields(input_len = input.len()))]
    pub async fn dispatch(
        &self,
        input: &str,
        model_id: &str,
        options: DispatchOptions,
    ) -> Result<AiResponse, DispatchError> {
        let model = self
            .catalog
            .find(model_id)
            .ok_or_else(|| DispatchError::ModelNotFound(model_id.to_string()))?;

        let track = model.track();
        if !self.cache.current().is_configured(model.provider, track) {
            return Err(DispatchError::ProviderNotConfigured {
                provider: model.provider,
                track,
            });
        }

        let DispatchOptions {
            on_stream_update,
            cancel_token,
            correlation_id,
        } = options;
        let wants_stream_updates = on_stream_update.is_some();
        let can_stream = self.backend.can_stream(model.provider);
        if wants_stream_updates && model.supports_streaming && !can_stream {
            debug!(provider = %model.provider, "No streaming route, using a plain call");
        }
        let plan = resolve_plan(&model, wants_stream_updates && can_stream);
        debug!(provider = %model.provider, %track, ?plan, "Dispatching");

        let request = AiRequest {
            model,
            input: input.to_string(),
            correlation_id,
        };
        let start = Instant::now();
        let call = async {
            match plan {
                CallPlan::Agent => self.call_agent(&request).await,
                CallPlan::Streaming => match on_stream_update {
                    Some(callback) => self.call_streaming(&request, callback).await,
                    None => self.call_simple(&request).await,
                },
                CallPlan::Simple => self.call_simple(&request).await,
            }
        };

        // Dropping `call` on cancel also drops the stream callback.
        let result = match cancel_token {
            Some(token) => tokio::select! {
                biased;
                _ = token.cancelled() => Err(DispatchError::Cancelled),
                result = call => result,
            },
            None => call.await,
        };

        match &result {
            Ok(_) => info!(
                model = %request.model.id,
                elapsed_ms = start.elapsed().as_millis() as u64,
                "Dispatch completed"
            ),
            Err(err) => warn!(model = %request.model.id, error = %err, "Dispatch failed"),
        }
        result
    }

    async fn call_simple(&self, request: &AiRequest) -> Result<AiResponse, DispatchError> {
        let reply = self.backend.complete(request).await?;
        Ok(AiResponse::from_reply(
            reply,
            ResponseType::from(request.model.category),
        ))
    }

    async fn call_agent(&self, request: &AiRequest) -> Result<AiResponse, DispatchError> {
        let reply = self.backend.run_agent(request).await?;
        Ok(AiResponse::from_reply(reply, ResponseType::Text))
    }

    async fn call_streaming(
        &self,
        request: &AiRequest,
        mut on_update: StreamCallback,
    ) -> Result<AiResponse, DispatchError> {
        let start = Instant::now();
        let mut stream = self.backend.stream(request).await?;

        let mut content = String::new();
        let mut stats = StreamStats::default();
        while let Some(chunk) = stream.next().await {
            let chunk = chunk?;
            if chunk.is_empty() {
                continue;
            }
            content.push_str(&chunk);
            // Each non-empty delta counts as one token.
            stats = StreamStats::new(stats.token_count + 1, start.elapsed().as_secs_f32());
            on_update(&content, &stats);
        }

        let metadata = HashMap::from([
            ("token_count".to_string(), json!(stats.token_count)),
            ("tokens_per_second".to_string(), json!(stats.tokens_per_second)),
            ("elapsed_seconds".to_string(), json!(stats.elapsed_seconds)),
        ]);
        Ok(AiResponse {
            content,
            response_type: ResponseType::Text,
            execution_steps: None,
            metadata: Some(metadata),
        })
    }
}
