//! Provider configuration probes and the matrix they produce.
use crate::model::{Provider, Track};
use anyhow::Result;
use async_trait::async_trait;
use serde_json::Value;
use std::collections::HashMap;

/// Last known configuration state, one boolean per provider per track.
/// Anything not present reads as `false`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ConfigurationMatrix {
    pub agent_track: HashMap<Provider, bool>,
    pub chat_track: HashMap<Provider, bool>,
}

impl ConfigurationMatrix {
    pub fn is_configured(&self, provider: Provider, track: Track) -> bool {
        let map = match track {
            Track::Agent => &self.agent_track,
            Track::Chat => &self.chat_track,
        };
        map.get(&provider).copied().unwrap_or(false)
    }

    pub fn set(&mut self, provider: Provider, track: Track, configured: bool) {
        let map = match track {
            Track::Agent => &mut self.agent_track,
            Track::Chat => &mut self.chat_track,
        };
        map.insert(provider, configured);
    }

    /// Providers configured on at least one track.
    pub fn configured_providers(&self) -> Vec<Provider> {
        Provider::ALL
            .into_iter()
            .filter(|p| self.is_configured(*p, Track::Agent) || self.is_configured(*p, Track::Chat))
            .collect()
    }
}

/// Raw reply of a probe request.
#[derive(Debug, Clone, PartialEq)]
pub struct ProbeResponse {
    pub status: u16,
    pub body: Value,
}

/// How a probe reply is read. Each adapter names the field it trusts.
#[derive(Debug, Clone, PartialEq)]
pub enum ProbeRule {
    /// The named field must be boolean `true`.
    Field(String),
    /// Any 2xx status is taken as a weak positive.
    Status,
    /// The named field must be a non-empty array, e.g. a model listing.
    ListsEntries(String),
}

impl ProbeRule {
    pub fn field(name: &str) -> Self {
        ProbeRule::Field(name.to_string())
    }

    pub fn lists_entries(name: &str) -> Self {
        ProbeRule::ListsEntries(name.to_string())
    }

    pub fn interpret(&self, response: &ProbeResponse) -> bool {
        let success = (200..300).contains(&response.status);
        match self {
            ProbeRule::Status => success,
            ProbeRule::Field(name) => {
                success && lookup(&response.body, name).and_then(Value::as_bool) == Some(true)
            }
            ProbeRule::ListsEntries(name) => {
                success
                    && lookup(&response.body, name)
                        .and_then(Value::as_array)
                        .is_some_and(|entries| !entries.is_empty())
            }
        }
    }
}

// Dotted paths ("data.configured") reach into nested objects.
fn lookup<'a>(body: &'a Value, name: &str) -> Option<&'a Value> {
    name.split('.').try_fold(body, |value, key| value.get(key))
}

/// One configuration check for one `(provider, track)` pair.
#[async_trait]
pub trait ProviderProbe: Send + Sync {
    fn provider(&self) -> Provider;

    fn track(&self) -> Track;

    /// `Ok(true)` only when the pair is usable. Errors are downgraded to
    /// `false` by the caller.
    async fn probe(&self) -> Result<bool>;
}
