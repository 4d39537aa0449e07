use crate::model::{Model, Provider};
use anyhow::Result;
use async_trait::async_trait;
use futures::stream::BoxStream;
use serde_json::Value;
use std::sync::{
    Arc,
    atomic::{AtomicBool, Ordering},
};
use tokio::sync::Notify;

#[derive(Debug, Default)]
struct TokenState {
    cancelled: AtomicBool,
    notify: Notify,
}

#[derive(Debug, Clone, Default)]
pub struct CancellationToken {
    state: Arc<TokenState>,
}

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.state.cancelled.store(true, Ordering::SeqCst);
        self.state.notify.notify_waiters();
    }

    pub fn is_cancelled(&self) -> bool {
        self.state.cancelled.load(Ordering::SeqCst)
    }

    /// Resolves once `cancel` has been called on this token or any clone of it.
    pub async fn cancelled(&self) {
        loop {
            // Registered on creation, so a cancel between the check and the await is not lost.
            let notified = self.state.notify.notified();
            if self.is_cancelled() {
                return;
            }
            notified.await;
        }
    }
}

/// One outbound call, as handed to a provider backend.
#[derive(Debug, Clone)]
pub struct AiRequest {
    pub model: Model,
    pub input: String,
    /// Threaded to the backend so it can stamp `metadata.messageId` on every step.
    pub correlation_id: Option<String>,
}

/// Throughput figures reported with every streamed chunk.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StreamStats {
    pub token_count: u32,
    pub tokens_per_second: f32,
    pub elapsed_seconds: f32,
}

impl StreamStats {
    pub fn new(token_count: u32, elapsed_seconds: f32) -> Self {
        let tokens_per_second = if elapsed_seconds > 0.0 {
            token_count as f32 / elapsed_seconds
        } else {
            0.0
        };
        Self {
            token_count,
            tokens_per_second,
            elapsed_seconds,
        }
    }
}

/// The provider-facing side of the dispatcher. Replies are raw JSON since
/// response shapes differ per provider; the dispatcher normalizes them.
#[async_trait]
pub trait AiBackend: Send + Sync {
    /// Plain request/response call on the chat track. The endpoint follows the
    /// model category (chat, image generation, transcription, embeddings).
    async fn complete(&self, request: &AiRequest) -> Result<Value>;

    /// Token-streaming chat call. Items are content deltas in send order.
    async fn stream(&self, request: &AiRequest) -> Result<BoxStream<'static, Result<String>>>;

    /// Whether `stream` has a route for this provider. When it does not, the
    /// dispatcher answers streaming-capable models with a plain call.
    fn can_stream(&self, _provider: Provider) -> bool {
        true
    }

    /// Multi-step agent run. Resolves once the run has completed.
    async fn run_agent(&self, request: &AiRequest) -> Result<Value>;
}
