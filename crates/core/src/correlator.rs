//! Maps inbound execution steps to the message they belong to.
use crate::channel::StepHandler;
use crate::step::ExecutionStep;
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::{debug, warn};

/// Callback contract into the conversation view, which owns the messages.
pub trait MessageSink: Send + Sync {
    /// Appends to the message's step sequence.
    fn append_step(&self, message_id: &str, step: ExecutionStep);

    /// Clears the message's `is_streaming` flag.
    fn finish_streaming(&self, message_id: &str);
}

/// Where a step ended up.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Attribution {
    /// The step carried `metadata.messageId`.
    Explicit(String),
    /// No id on the step; attached to the most recently created assistant
    /// message. Racy when two agent dispatches overlap.
    LatestMessage(String),
    Discarded,
}

pub struct StepCorrelator {
    sink: Arc<dyn MessageSink>,
    latest_assistant: Mutex<Option<String>>,
    latest_message_fallback: bool,
}

impl StepCorrelator {
    pub fn new(sink: Arc<dyn MessageSink>) -> Self {
        Self {
            sink,
            latest_assistant: Mutex::new(None),
            latest_message_fallback: true,
        }
    }

    /// With the fallback off, steps without an id are discarded instead of
    /// going to the latest assistant message.
    pub fn with_latest_message_fallback(mut self, enabled: bool) -> Self {
        self.latest_message_fallback = enabled;
        self
    }

    fn latest(&self) -> MutexGuard<'_, Option<String>> {
        self.latest_assistant
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Must be called whenever a new assistant message is created.
    pub fn note_assistant_message(&self, message_id: &str) {
        *self.latest() = Some(message_id.to_string());
    }

    pub fn attach(&self, step: ExecutionStep) -> Attribution {
        let attribution = match step.message_id() {
            Some(id) => Attribution::Explicit(id.to_string()),
            None if self.latest_message_fallback => match self.latest().clone() {
                Some(id) => Attribution::LatestMessage(id),
                None => Attribution::Discarded,
            },
            None => Attribution::Discarded,
        };

        let message_id = match &attribution {
            Attribution::Explicit(id) | Attribution::LatestMessage(id) => id.clone(),
            Attribution::Discarded => {
                warn!(step_type = ?step.step_type, "Discarding step with no message to attach to");
                return attribution;
            }
        };

        debug!(message_id = %message_id, step_type = ?step.step_type, ?attribution, "Attaching step");
        let terminal = step.is_terminal();
        self.sink.append_step(&message_id, step);
        if terminal {
            self.sink.finish_streaming(&message_id);
        }
        attribution
    }

    /// A channel handler feeding this correlator.
    pub fn handler(self: &Arc<Self>) -> StepHandler {
        let correlator = self.clone();
        Arc::new(move |step: &ExecutionStep| {
            correlator.attach(step.clone());
        })
    }
}
