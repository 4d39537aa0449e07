//! Test doubles for the engine's outbound seams.
//!
//! Every fake records how often it was called so tests can assert on the
//! number of network round trips.

use crate::catalog::ModelSource;
use crate::channel::StepTransport;
use crate::completion::{AiBackend, AiRequest};
use crate::correlator::MessageSink;
use crate::message::Message;
use crate::model::{Model, Provider, Track};
use crate::probe::ProviderProbe;
use crate::step::ExecutionStep;
use anyhow::{Result, anyhow};
use async_trait::async_trait;
use futures::StreamExt;
use futures::stream::{self, BoxStream};
use serde_json::{Value, json};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::mpsc::{self, UnboundedSender};
use tokio_stream::wrappers::UnboundedReceiverStream;

#[derive(Debug, Clone, Copy)]
pub enum ProbeBehavior {
    Answer(bool),
    Fail,
    Panic,
}

/// A probe with a fixed answer that counts its invocations.
pub struct CountingProbe {
    provider: Provider,
    track: Track,
    behavior: ProbeBehavior,
    delay: Duration,
    calls: AtomicUsize,
}

impl CountingProbe {
    pub fn new(provider: Provider, track: Track, behavior: ProbeBehavior) -> Arc<Self> {
        Arc::new(Self {
            provider,
            track,
            behavior,
            delay: Duration::ZERO,
            calls: AtomicUsize::new(0),
        })
    }

    pub fn slow(provider: Provider, track: Track, answer: bool, delay_ms: u64) -> Arc<Self> {
        Arc::new(Self {
            provider,
            track,
            behavior: ProbeBehavior::Answer(answer),
            delay: Duration::from_millis(delay_ms),
            calls: AtomicUsize::new(0),
        })
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ProviderProbe for CountingProbe {
    fn provider(&self) -> Provider {
        self.provider
    }

    fn track(&self) -> Track {
        self.track
    }

    async fn probe(&self) -> Result<bool> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        match self.behavior {
            ProbeBehavior::Answer(answer) => Ok(answer),
            ProbeBehavior::Fail => Err(anyhow!("connection refused")),
            ProbeBehavior::Panic => panic!("probe adapter bug"),
        }
    }
}

/// A model source that always returns the same models.
pub struct StaticSource {
    models: Vec<Model>,
}

impl StaticSource {
    pub fn new(models: Vec<Model>) -> Arc<Self> {
        Arc::new(Self { models })
    }
}

#[async_trait]
impl ModelSource for StaticSource {
    fn name(&self) -> String {
        "static".to_string()
    }

    async fn discover(&self) -> Result<Vec<Model>> {
        Ok(self.models.clone())
    }
}

/// Stands in for the conversation view.
#[derive(Default)]
pub struct RecordingSink {
    messages: Mutex<Vec<Message>>,
    appended: AtomicUsize,
}

impl RecordingSink {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn insert(&self, message: Message) {
        self.messages.lock().unwrap().push(message);
    }

    pub fn get(&self, id: &str) -> Option<Message> {
        self.messages
            .lock()
            .unwrap()
            .iter()
            .find(|m| m.id == id)
            .cloned()
    }

    pub fn appended(&self) -> usize {
        self.appended.load(Ordering::SeqCst)
    }
}

impl MessageSink for RecordingSink {
    fn append_step(&self, message_id: &str, step: ExecutionStep) {
        self.appended.fetch_add(1, Ordering::SeqCst);
        if let Some(message) = self
            .messages
            .lock()
            .unwrap()
            .iter_mut()
            .find(|m| m.id == message_id)
        {
            message.steps.push(step);
        }
    }

    fn finish_streaming(&self, message_id: &str) {
        if let Some(message) = self
            .messages
            .lock()
            .unwrap()
            .iter_mut()
            .find(|m| m.id == message_id)
        {
            message.is_streaming = false;
        }
    }
}

/// A transport whose steps are pushed by the test.
#[derive(Default)]
pub struct PushTransport {
    sender: Mutex<Option<UnboundedSender<ExecutionStep>>>,
    connections: AtomicUsize,
}

impl PushTransport {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn push(&self, step: ExecutionStep) {
        if let Some(sender) = self.sender.lock().unwrap().as_ref() {
            let _ = sender.send(step);
        }
    }

    pub fn disconnect(&self) {
        self.sender.lock().unwrap().take();
    }

    pub fn connections(&self) -> usize {
        self.connections.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl StepTransport for PushTransport {
    async fn connect(&self) -> Result<BoxStream<'static, Result<ExecutionStep>>> {
        self.connections.fetch_add(1, Ordering::SeqCst);
        let (tx, rx) = mpsc::unbounded_channel();
        *self.sender.lock().unwrap() = Some(tx);
        Ok(UnboundedReceiverStream::new(rx).map(Ok).boxed())
    }
}

/// A transport that takes a while to connect and tracks how many of its
/// streams are alive at once.
#[derive(Default)]
pub struct SlowTransport {
    delay: Duration,
    connections: AtomicUsize,
    open: Arc<AtomicUsize>,
    max_open: Arc<AtomicUsize>,
}

struct OpenStream {
    open: Arc<AtomicUsize>,
}

impl Drop for OpenStream {
    fn drop(&mut self) {
        self.open.fetch_sub(1, Ordering::SeqCst);
    }
}

impl SlowTransport {
    pub fn new(delay: Duration) -> Arc<Self> {
        Arc::new(Self {
            delay,
            ..Default::default()
        })
    }

    pub fn connections(&self) -> usize {
        self.connections.load(Ordering::SeqCst)
    }

    pub fn open(&self) -> usize {
        self.open.load(Ordering::SeqCst)
    }

    pub fn max_open(&self) -> usize {
        self.max_open.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl StepTransport for SlowTransport {
    async fn connect(&self) -> Result<BoxStream<'static, Result<ExecutionStep>>> {
        tokio::time::sleep(self.delay).await;
        self.connections.fetch_add(1, Ordering::SeqCst);
        let now_open = self.open.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_open.fetch_max(now_open, Ordering::SeqCst);

        let guard = OpenStream {
            open: self.open.clone(),
        };
        // Stays open until dropped.
        let steps = stream::unfold(guard, |guard| async move {
            let _guard = guard;
            futures::future::pending::<Option<(Result<ExecutionStep>, OpenStream)>>().await
        });
        Ok(steps.boxed())
    }
}

/// A provider backend with canned replies.
pub struct ScriptedBackend {
    chat_reply: Mutex<Value>,
    agent_reply: Mutex<Value>,
    chunks: Mutex<Vec<String>>,
    failure: Mutex<Option<String>>,
    delay: Mutex<Duration>,
    streaming: Mutex<bool>,
    chat_calls: AtomicUsize,
    stream_calls: AtomicUsize,
    agent_calls: AtomicUsize,
    last_correlation_id: Mutex<Option<String>>,
}

impl ScriptedBackend {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            chat_reply: Mutex::new(json!({"content": "ok"})),
            agent_reply: Mutex::new(json!({"result": "ok"})),
            chunks: Mutex::new(Vec::new()),
            failure: Mutex::new(None),
            delay: Mutex::new(Duration::ZERO),
            streaming: Mutex::new(true),
            chat_calls: AtomicUsize::new(0),
            stream_calls: AtomicUsize::new(0),
            agent_calls: AtomicUsize::new(0),
            last_correlation_id: Mutex::new(None),
        })
    }

    pub fn with_chat_reply(self: Arc<Self>, reply: Value) -> Arc<Self> {
        *self.chat_reply.lock().unwrap() = reply;
        self
    }

    pub fn with_agent_reply(self: Arc<Self>, reply: Value) -> Arc<Self> {
        *self.agent_reply.lock().unwrap() = reply;
        self
    }

    pub fn with_chunks(self: Arc<Self>, chunks: &[&str]) -> Arc<Self> {
        *self.chunks.lock().unwrap() = chunks.iter().map(|c| c.to_string()).collect();
        self
    }

    pub fn with_delay(self: Arc<Self>, delay: Duration) -> Arc<Self> {
        *self.delay.lock().unwrap() = delay;
        self
    }

    pub fn without_streaming(self: Arc<Self>) -> Arc<Self> {
        *self.streaming.lock().unwrap() = false;
        self
    }

    pub fn failing(self: Arc<Self>, message: &str) -> Arc<Self> {
        *self.failure.lock().unwrap() = Some(message.to_string());
        self
    }

    pub fn chat_calls(&self) -> usize {
        self.chat_calls.load(Ordering::SeqCst)
    }

    pub fn stream_calls(&self) -> usize {
        self.stream_calls.load(Ordering::SeqCst)
    }

    pub fn agent_calls(&self) -> usize {
        self.agent_calls.load(Ordering::SeqCst)
    }

    pub fn total_calls(&self) -> usize {
        self.chat_calls() + self.stream_calls() + self.agent_calls()
    }

    pub fn last_correlation_id(&self) -> Option<String> {
        self.last_correlation_id.lock().unwrap().clone()
    }

    async fn prepare(&self, request: &AiRequest) -> Result<()> {
        *self.last_correlation_id.lock().unwrap() = request.correlation_id.clone();
        let delay = *self.delay.lock().unwrap();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        match self.failure.lock().unwrap().clone() {
            Some(message) => Err(anyhow!(message)),
            None => Ok(()),
        }
    }
}

#[async_trait]
impl AiBackend for ScriptedBackend {
    async fn complete(&self, request: &AiRequest) -> Result<Value> {
        self.chat_calls.fetch_add(1, Ordering::SeqCst);
        self.prepare(request).await?;
        Ok(self.chat_reply.lock().unwrap().clone())
    }

    async fn stream(&self, request: &AiRequest) -> Result<BoxStream<'static, Result<String>>> {
        self.stream_calls.fetch_add(1, Ordering::SeqCst);
        self.prepare(request).await?;
        let chunks: Vec<Result<String>> =
            self.chunks.lock().unwrap().iter().cloned().map(Ok).collect();
        Ok(stream::iter(chunks).boxed())
    }

    fn can_stream(&self, _provider: Provider) -> bool {
        *self.streaming.lock().unwrap()
    }

    async fn run_agent(&self, request: &AiRequest) -> Result<Value> {
        self.agent_calls.fetch_add(1, Ordering::SeqCst);
        self.prepare(request).await?;
        Ok(self.agent_reply.lock().unwrap().clone())
    }
}
