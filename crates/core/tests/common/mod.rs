//! Fakes for driving the engine through its public API.
#![allow(dead_code)]

use anyhow::{Result, anyhow};
use async_trait::async_trait;
use brainwire_core::channel::StepTransport;
use brainwire_core::completion::{AiBackend, AiRequest};
use brainwire_core::correlator::MessageSink;
use brainwire_core::message::Message;
use brainwire_core::model::{Provider, Track};
use brainwire_core::probe::ProviderProbe;
use brainwire_core::step::{ExecutionStep, StepType};
use futures::StreamExt;
use futures::stream::{self, BoxStream};
use serde_json::{Value, json};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::mpsc::{self, UnboundedSender};
use tokio_stream::wrappers::UnboundedReceiverStream;

/// The message list a conversation view would own.
#[derive(Default)]
pub struct ConversationView {
    messages: Mutex<Vec<Message>>,
}

impl ConversationView {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn push(&self, message: Message) {
        self.messages.lock().unwrap().push(message);
    }

    pub fn update(&self, id: &str, f: impl FnOnce(&mut Message)) {
        if let Some(message) = self.messages.lock().unwrap().iter_mut().find(|m| m.id == id) {
            f(message);
        }
    }

    pub fn get(&self, id: &str) -> Message {
        self.messages
            .lock()
            .unwrap()
            .iter()
            .find(|m| m.id == id)
            .cloned()
            .unwrap()
    }

    pub fn len(&self) -> usize {
        self.messages.lock().unwrap().len()
    }
}

impl MessageSink for ConversationView {
    fn append_step(&self, message_id: &str, step: ExecutionStep) {
        self.update(message_id, |m| m.steps.push(step));
    }

    fn finish_streaming(&self, message_id: &str) {
        self.update(message_id, |m| m.is_streaming = false);
    }
}

/// Step backend the test (or the fake agent) can push into.
#[derive(Default)]
pub struct StepHub {
    sender: Mutex<Option<UnboundedSender<ExecutionStep>>>,
}

impl StepHub {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn emit(&self, step: ExecutionStep) {
        if let Some(sender) = self.sender.lock().unwrap().as_ref() {
            let _ = sender.send(step);
        }
    }
}

#[async_trait]
impl StepTransport for StepHub {
    async fn connect(&self) -> Result<BoxStream<'static, Result<ExecutionStep>>> {
        let (tx, rx) = mpsc::unbounded_channel();
        *self.sender.lock().unwrap() = Some(tx);
        Ok(UnboundedReceiverStream::new(rx).map(Ok).boxed())
    }
}

pub struct FixedProbe {
    pub provider: Provider,
    pub track: Track,
    pub configured: bool,
}

impl FixedProbe {
    pub fn arc(provider: Provider, track: Track, configured: bool) -> Arc<dyn ProviderProbe> {
        Arc::new(Self {
            provider,
            track,
            configured,
        })
    }
}

#[async_trait]
impl ProviderProbe for FixedProbe {
    fn provider(&self) -> Provider {
        self.provider
    }

    fn track(&self) -> Track {
        self.track
    }

    async fn probe(&self) -> Result<bool> {
        Ok(self.configured)
    }
}

/// A backend whose agent runs emit steps over the hub before completing.
pub struct FakeProviders {
    hub: Arc<StepHub>,
    pub calls: AtomicUsize,
    pub fail_with: Option<String>,
}

impl FakeProviders {
    pub fn new(hub: Arc<StepHub>) -> Arc<Self> {
        Arc::new(Self {
            hub,
            calls: AtomicUsize::new(0),
            fail_with: None,
        })
    }

    pub fn failing(hub: Arc<StepHub>, message: &str) -> Arc<Self> {
        Arc::new(Self {
            hub,
            calls: AtomicUsize::new(0),
            fail_with: Some(message.to_string()),
        })
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    fn record(&self) -> Result<()> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        match &self.fail_with {
            Some(message) => Err(anyhow!(message.clone())),
            None => Ok(()),
        }
    }
}

#[async_trait]
impl AiBackend for FakeProviders {
    async fn complete(&self, request: &AiRequest) -> Result<Value> {
        self.record()?;
        let answer = if request.input == "2+2?" { "4" } else { "ok" };
        Ok(json!({"choices": [{"message": {"role": "assistant", "content": answer}}]}))
    }

    async fn stream(&self, _request: &AiRequest) -> Result<BoxStream<'static, Result<String>>> {
        self.record()?;
        let chunks = vec![Ok("He".to_string()), Ok("llo".to_string())];
        Ok(stream::iter(chunks).boxed())
    }

    async fn run_agent(&self, request: &AiRequest) -> Result<Value> {
        self.record()?;
        let message_id = request.correlation_id.clone().unwrap_or_default();
        let steps = [
            (StepType::Thinking, "Planning search"),
            (StepType::DatabaseOperation, "Querying notes"),
            (StepType::Result, "Found 2 notes"),
        ];
        for (step_type, content) in steps {
            self.hub
                .emit(ExecutionStep::new(step_type, content).for_message(&message_id));
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        Ok(json!({"result": "You have 2 notes about Rust"}))
    }
}
