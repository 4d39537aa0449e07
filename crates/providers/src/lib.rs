use anyhow::Result;
use brainwire_core::config::Config;
use brainwire_core::correlator::MessageSink;
use brainwire_core::engine::{Engine, EngineBuilder};
use brainwire_core::model::Provider;
use reqwest::Client;
use std::sync::Arc;
use tracing::warn;

pub mod discovery;
pub mod gateway;
pub mod openai;
pub mod probe;
pub mod sse;
pub mod steps;

pub use discovery::OllamaDiscovery;
pub use gateway::GatewayBackend;
pub use probe::{HttpProbe, default_probes};
pub use steps::SseStepTransport;

/// Engine wired to the HTTP gateways, probes, step stream and (when an
/// `ollama` base URL is configured) local model discovery.
pub fn build_engine(config: &Config, sink: Arc<dyn MessageSink>) -> Result<Engine> {
    let client = Client::new();
    let backend = GatewayBackend::from_config(client.clone(), config)?;
    let transport = SseStepTransport::new(client.clone(), &config.channel.url);

    let mut builder =
        EngineBuilder::from_config(config).probes(default_probes(&client, config));
    if let Some(base_url) = config
        .provider(Provider::Ollama)
        .and_then(|settings| settings.base_url.as_deref())
    {
        match OllamaDiscovery::new(client.clone(), base_url) {
            Ok(source) => builder = builder.model_source(Arc::new(source)),
            Err(err) => warn!(error = %err, "Ollama discovery disabled"),
        }
    }

    Ok(builder.build(Arc::new(backend), Arc::new(transport), sink))
}
