use std::{
    collections::HashMap,
    fs::{self, File},
    io::Write,
    path::PathBuf,
};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::instrument;

use crate::model::{Model, ModelCategory, Provider};

const APP_DIR: &str = "brainwire";
const CONFIG_FILE: &str = "brainwire.yml";
const DEFAULT_CONFIG: &str = include_str!("../data/config.yml");

// `$XDG_*` wins over the platform directory so Linux-style overrides work everywhere.
fn app_dir(xdg_var: &str, platform_dir: Option<PathBuf>) -> PathBuf {
    std::env::var_os(xdg_var)
        .map(PathBuf::from)
        .or(platform_dir)
        .unwrap_or_else(|| PathBuf::from("."))
        .join(APP_DIR)
}

/// Directory holding `brainwire.yml`.
pub fn config_dir() -> PathBuf {
    app_dir("XDG_CONFIG_HOME", dirs::config_dir())
}

/// Directory for logs, created on first use.
pub fn data_dir() -> std::io::Result<PathBuf> {
    let path = app_dir("XDG_DATA_HOME", dirs::data_local_dir());
    fs::create_dir_all(&path)?;
    Ok(path)
}

#[derive(Error, Debug)]
pub enum BrainwireConfigError {
    #[error("File system error: {0}")]
    IO(#[from] std::io::Error),
    #[error("YAML parsing error: {0}")]
    YAMLError(#[from] serde_yaml::Error),
    #[error("Configuration error: {0}")]
    Config(String),
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct GatewayConfig {
    /// Backend serving the agent track.
    pub agent_url: String,
    /// Backend serving the direct-chat track.
    pub chat_url: String,
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct ChannelConfig {
    pub url: String,
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct ProbeConfig {
    pub timeout_secs: u64,
}

impl Default for ProbeConfig {
    fn default() -> Self {
        Self { timeout_secs: 5 }
    }
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct CorrelationConfig {
    /// Attach steps without a message id to the latest assistant message.
    pub latest_message_fallback: bool,
}

impl Default for CorrelationConfig {
    fn default() -> Self {
        Self {
            latest_message_fallback: true,
        }
    }
}

#[derive(Debug, Deserialize, Serialize, Clone, Default, PartialEq)]
pub struct ProviderSettings {
    #[serde(default)]
    pub base_url: Option<String>,
    #[serde(default)]
    pub api_key: Option<String>,
}

impl ProviderSettings {
    /// The API key, with `env:NAME` values read from the environment.
    pub fn resolve_api_key(&self) -> Result<Option<String>, BrainwireConfigError> {
        match &self.api_key {
            Some(key) if key.starts_with("env:") => {
                let env_key = key[4..].trim();
                std::env::var(env_key).map(Some).map_err(|_| {
                    BrainwireConfigError::Config(format!(
                        "Environment variable {env_key} not found"
                    ))
                })
            }
            other => Ok(other.clone()),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    pub gateway: GatewayConfig,
    pub channel: ChannelConfig,
    pub probe: ProbeConfig,
    pub correlation: CorrelationConfig,
    pub providers: HashMap<Provider, ProviderSettings>,
    pub models: Vec<Model>,
}

impl Config {
    pub fn provider(&self, provider: Provider) -> Option<&ProviderSettings> {
        self.providers.get(&provider)
    }
}

#[derive(Deserialize, Debug)]
struct RawModel {
    #[serde(default)]
    id: Option<String>,
    provider: Provider,
    category: ModelCategory,
    #[serde(default)]
    streaming: bool,
    #[serde(default)]
    color: Option<String>,
}

#[derive(Deserialize, Debug)]
struct RawConfig {
    gateway: GatewayConfig,
    channel: ChannelConfig,
    #[serde(default)]
    probe: ProbeConfig,
    #[serde(default)]
    correlation: CorrelationConfig,
    #[serde(default)]
    providers: HashMap<Provider, ProviderSettings>,
    // Mapping keeps file order, which is the order models are listed in
    #[serde(default)]
    models: serde_yaml::Mapping,
}

impl RawConfig {
    #[instrument]
    fn to_config(&self) -> Result<Config, BrainwireConfigError> {
        if self.models.is_empty() {
            return Err(BrainwireConfigError::Config(
                "At least one model must be configured".to_string(),
            ));
        }

        let mut models = Vec::with_capacity(self.models.len());
        for (key, value) in &self.models {
            let key = key.as_str().ok_or_else(|| {
                BrainwireConfigError::Config(format!("Model ids must be strings, got {key:?}"))
            })?;
            let raw: RawModel = serde_yaml::from_value(value.clone())?;
            // Use the map key unless an explicit id is set
            let id = raw.id.as_deref().unwrap_or(key);
            let mut model = Model::new(id, raw.provider, raw.category).with_streaming(raw.streaming);
            if let Some(color) = &raw.color {
                model = model.with_color(color);
            }
            models.push(model);
        }

        Ok(Config {
            gateway: self.gateway.clone(),
            channel: self.channel.clone(),
            probe: self.probe.clone(),
            correlation: self.correlation.clone(),
            providers: self.providers.clone(),
            models,
        })
    }
}

#[instrument(skip(config_path))]
pub fn create_or_get_config_file(
    config_path: Option<PathBuf>,
) -> Result<(bool, PathBuf), BrainwireConfigError> {
    let actual_path = config_path.unwrap_or_else(|| config_dir().join(CONFIG_FILE));

    let parent_dir = actual_path.parent().ok_or_else(|| {
        BrainwireConfigError::IO(std::io::Error::new(
            std::io::ErrorKind::InvalidInput,
            "Config path has no parent directory",
        ))
    })?;

    if !parent_dir.exists() {
        fs::create_dir_all(parent_dir)?;
    }

    if actual_path.exists() {
        Ok((true, actual_path))
    } else {
        File::create(&actual_path)?.write_all(DEFAULT_CONFIG.as_bytes())?;
        Ok((false, actual_path))
    }
}

#[instrument(skip(config_path))]
pub fn get_config(config_path: Option<PathBuf>) -> Result<Config, BrainwireConfigError> {
    let (_, config_file) = create_or_get_config_file(config_path)?;
    let content = fs::read_to_string(&config_file)?;
    let raw: RawConfig = serde_yaml::from_str(&content)?;
    raw.to_config()
}
