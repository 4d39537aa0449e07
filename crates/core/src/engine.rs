//! The supervising component: owns the catalog, the configuration cache, the
//! single step channel, the correlator and the dispatcher.
use crate::cache::{ConfigurationCache, DEFAULT_PROBE_TIMEOUT};
use crate::catalog::{ModelCatalog, ModelSource};
use crate::channel::{StepChannel, StepHandler, StepTransport, Subscription};
use crate::completion::AiBackend;
use crate::config::Config;
use crate::correlator::{MessageSink, StepCorrelator};
use crate::dispatch::{DispatchOptions, Dispatcher};
use crate::error::DispatchError;
use crate::model::Model;
use crate::probe::{ConfigurationMatrix, ProviderProbe};
use crate::response::AiResponse;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tracing::{info, instrument, warn};

pub struct EngineBuilder {
    models: Vec<Model>,
    sources: Vec<Arc<dyn ModelSource>>,
    probes: Vec<Arc<dyn ProviderProbe>>,
    probe_timeout: Duration,
    latest_message_fallback: bool,
}

impl Default for EngineBuilder {
    fn default() -> Self {
        Self {
            models: Vec::new(),
            sources: Vec::new(),
            probes: Vec::new(),
            probe_timeout: DEFAULT_PROBE_TIMEOUT,
            latest_message_fallback: true,
        }
    }
}

impl EngineBuilder {
    /// Static catalog, probe timeout and correlation mode from configuration.
    pub fn from_config(config: &Config) -> Self {
        Self {
            models: config.models.clone(),
            probe_timeout: Duration::from_secs(config.probe.timeout_secs),
            latest_message_fallback: config.correlation.latest_message_fallback,
            ..Default::default()
        }
    }

    pub fn models(mut self, models: Vec<Model>) -> Self {
        self.models = models;
        self
    }

    pub fn model_source(mut self, source: Arc<dyn ModelSource>) -> Self {
        self.sources.push(source);
        self
    }

    pub fn probe(mut self, probe: Arc<dyn ProviderProbe>) -> Self {
        self.probes.push(probe);
        self
    }

    pub fn probes(mut self, probes: Vec<Arc<dyn ProviderProbe>>) -> Self {
        self.probes.extend(probes);
        self
    }

    pub fn probe_timeout(mut self, timeout: Duration) -> Self {
        self.probe_timeout = timeout;
        self
    }

    pub fn latest_message_fallback(mut self, enabled: bool) -> Self {
        self.latest_message_fallback = enabled;
        self
    }

    pub fn build(
        self,
        backend: Arc<dyn AiBackend>,
        transport: Arc<dyn StepTransport>,
        sink: Arc<dyn MessageSink>,
    ) -> Engine {
        let catalog = Arc::new(
            self.sources
                .into_iter()
                .fold(ModelCatalog::new(self.models), |catalog, source| {
                    catalog.with_source(source)
                }),
        );
        let cache = Arc::new(
            ConfigurationCache::new(self.probes)
                .with_catalog(catalog.clone())
                .with_probe_timeout(self.probe_timeout),
        );
        let correlator = Arc::new(
            StepCorrelator::new(sink).with_latest_message_fallback(self.latest_message_fallback),
        );

        Engine {
            dispatcher: Dispatcher::new(catalog.clone(), cache.clone(), backend),
            channel: StepChannel::new(transport),
            catalog,
            cache,
            correlator,
            correlator_subscription: Mutex::new(None),
        }
    }
}

pub struct Engine {
    catalog: Arc<ModelCatalog>,
    cache: Arc<ConfigurationCache>,
    channel: StepChannel,
    correlator: Arc<StepCorrelator>,
    dispatcher: Dispatcher,
    correlator_subscription: Mutex<Option<Subscription>>,
}

impl Engine {
    pub fn builder() -> EngineBuilder {
        EngineBuilder::default()
    }

    /// (Re)starts the step channel and runs a probe round. The channel is
    /// stopped before it is started again, so there is never more than one
    /// connection. A channel that cannot connect is logged, not fatal:
    /// dispatch still works, only live step updates are missing.
    #[instrument(skip(self))]
    pub async fn initialize(&self) -> ConfigurationMatrix {
        self.channel.stop();
        {
            let mut subscription = self
                .correlator_subscription
                .lock()
                .unwrap_or_else(|poisoned| poisoned.into_inner());
            if let Some(previous) = subscription.take() {
                previous.unsubscribe();
            }
            *subscription = Some(self.channel.on_step(self.correlator.handler()));
        }

        if let Err(err) = self.channel.start().await {
            warn!(error = %err, "Step channel failed to connect");
        }

        let matrix = self.cache.check_all(false).await;
        info!(
            models = self.catalog.list_models().len(),
            "Engine initialized"
        );
        matrix
    }

    pub async fn dispatch(
        &self,
        input: &str,
        model_id: &str,
        options: DispatchOptions,
    ) -> Result<AiResponse, DispatchError> {
        self.dispatcher.dispatch(input, model_id, options).await
    }

    pub async fn refresh_configuration(&self, force_refresh: bool) -> ConfigurationMatrix {
        self.cache.check_all(force_refresh).await
    }

    pub fn configuration(&self) -> ConfigurationMatrix {
        self.cache.current()
    }

    pub async fn refresh_models(&self) -> Arc<Vec<Model>> {
        self.catalog.refresh_models().await
    }

    pub fn list_models(&self) -> Arc<Vec<Model>> {
        self.catalog.list_models()
    }

    pub fn subscribe_steps(&self, handler: StepHandler) -> Subscription {
        self.channel.on_step(handler)
    }

    /// Points the correlator's fallback at a newly created assistant message.
    pub fn note_assistant_message(&self, message_id: &str) {
        self.correlator.note_assistant_message(message_id);
    }

    pub fn is_channel_running(&self) -> bool {
        self.channel.is_running()
    }

    pub fn shutdown(&self) {
        self.channel.stop();
    }
}
