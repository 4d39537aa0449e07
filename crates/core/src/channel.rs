//! The real-time step channel: one long-lived connection that pushes
//! execution steps independently of any outstanding request.
use crate::step::ExecutionStep;
use anyhow::Result;
use async_trait::async_trait;
use futures::StreamExt;
use futures::stream::BoxStream;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::task::JoinHandle;
use tracing::{debug, info, instrument, warn};

pub type StepHandler = Arc<dyn Fn(&ExecutionStep) + Send + Sync>;

/// Connection to the step backend. Reconnection policy belongs to the
/// implementation; the channel only sees a stream that may end at any time.
#[async_trait]
pub trait StepTransport: Send + Sync {
    async fn connect(&self) -> Result<BoxStream<'static, Result<ExecutionStep>>>;
}

type HandlerList = Arc<Mutex<Vec<(u64, StepHandler)>>>;

/// Handle returned by [`StepChannel::on_step`].
#[must_use = "dropping a Subscription keeps the handler registered; call unsubscribe() to remove it"]
pub struct Subscription {
    id: u64,
    handlers: HandlerList,
}

impl Subscription {
    pub fn unsubscribe(self) {
        lock(&self.handlers).retain(|(id, _)| *id != self.id);
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Holds at most one active connection. `start` always stops the previous
/// connection first.
pub struct StepChannel {
    transport: Arc<dyn StepTransport>,
    handlers: HandlerList,
    next_id: AtomicU64,
    connection: Mutex<Option<JoinHandle<()>>>,
    // Bumped by every start and stop; a connect that returns under a newer
    // generation is discarded.
    generation: AtomicU64,
    lifecycle: tokio::sync::Mutex<()>,
}

impl StepChannel {
    pub fn new(transport: Arc<dyn StepTransport>) -> Self {
        Self {
            transport,
            handlers: Arc::new(Mutex::new(Vec::new())),
            next_id: AtomicU64::new(1),
            connection: Mutex::new(None),
            generation: AtomicU64::new(0),
            lifecycle: tokio::sync::Mutex::new(()),
        }
    }

    pub fn on_step(&self, handler: StepHandler) -> Subscription {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        lock(&self.handlers).push((id, handler));
        Subscription {
            id,
            handlers: self.handlers.clone(),
        }
    }

    pub fn subscriber_count(&self) -> usize {
        lock(&self.handlers).len()
    }

    /// Connects and starts delivering steps to subscribers, in arrival order.
    /// Concurrent starts run one after another, and a `stop` that lands
    /// while connecting discards the new connection.
    #[instrument(skip(self))]
    pub async fn start(&self) -> Result<()> {
        let _lifecycle = self.lifecycle.lock().await;

        let previous = lock(&self.connection).take();
        if let Some(previous) = previous {
            previous.abort();
            // Wait for the old reader to drop its stream before reconnecting.
            let _ = previous.await;
            debug!("Previous step connection closed");
        }
        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;

        let mut stream = self.transport.connect().await?;

        let mut connection = lock(&self.connection);
        if self.generation.load(Ordering::SeqCst) != generation {
            info!("Step channel stopped while connecting, dropping connection");
            return Ok(());
        }

        let handlers = self.handlers.clone();
        let task = tokio::spawn(async move {
            while let Some(item) = stream.next().await {
                match item {
                    Ok(step) => {
                        // Snapshot so handlers may (un)subscribe without deadlocking.
                        let current: Vec<StepHandler> =
                            lock(&handlers).iter().map(|(_, h)| h.clone()).collect();
                        for handler in current {
                            handler(&step);
                        }
                    }
                    Err(err) => warn!(error = %err, "Dropping malformed step event"),
                }
            }
            info!("Step channel connection closed");
        });
        *connection = Some(task);
        info!("Step channel started");
        Ok(())
    }

    pub fn stop(&self) {
        self.generation.fetch_add(1, Ordering::SeqCst);
        if let Some(task) = lock(&self.connection).take() {
            task.abort();
            debug!("Step channel stopped");
        }
    }

    pub fn is_running(&self) -> bool {
        lock(&self.connection)
            .as_ref()
            .is_some_and(|task| !task.is_finished())
    }
}

impl Drop for StepChannel {
    fn drop(&mut self) {
        self.stop();
    }
}
