//! Model catalog: a static list from configuration with dynamically
//! discovered models merged on top.
use crate::model::Model;
use anyhow::Result;
use async_trait::async_trait;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};
use tracing::{debug, instrument, warn};

/// A place models can be discovered at runtime, e.g. a local model server.
#[async_trait]
pub trait ModelSource: Send + Sync {
    fn name(&self) -> String;

    async fn discover(&self) -> Result<Vec<Model>>;
}

struct Published {
    models: Arc<Vec<Model>>,
    generation: u64,
}

pub struct ModelCatalog {
    fallback: Arc<Vec<Model>>,
    current: RwLock<Published>,
    last_refresh: AtomicU64,
    sources: Vec<Arc<dyn ModelSource>>,
}

impl ModelCatalog {
    pub fn new(static_models: Vec<Model>) -> Self {
        let fallback = Arc::new(static_models);
        Self {
            current: RwLock::new(Published {
                models: fallback.clone(),
                generation: 0,
            }),
            fallback,
            last_refresh: AtomicU64::new(0),
            sources: Vec::new(),
        }
    }

    pub fn with_source(mut self, source: Arc<dyn ModelSource>) -> Self {
        self.sources.push(source);
        self
    }

    fn read(&self) -> RwLockReadGuard<'_, Published> {
        self.current
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, Published> {
        self.current
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// The current catalog snapshot. Never blocks on the network.
    pub fn list_models(&self) -> Arc<Vec<Model>> {
        self.read().models.clone()
    }

    pub fn find(&self, model_id: &str) -> Option<Model> {
        self.list_models().iter().find(|m| m.id == model_id).cloned()
    }

    /// Rebuilds the catalog from the static list plus every source. If any
    /// source fails, or the result would be empty, the previous catalog stays.
    /// Of two overlapping refreshes, the one started last wins.
    #[instrument(skip(self))]
    pub async fn refresh_models(&self) -> Arc<Vec<Model>> {
        let generation = self.last_refresh.fetch_add(1, Ordering::SeqCst) + 1;
        let mut discovered = Vec::new();
        for source in &self.sources {
            match source.discover().await {
                Ok(models) => {
                    debug!(source = %source.name(), count = models.len(), "Discovered models");
                    discovered.extend(models);
                }
                Err(err) => {
                    warn!(source = %source.name(), error = %err, "Model discovery failed, keeping previous catalog");
                    return self.list_models();
                }
            }
        }

        let merged = merge_models(&self.fallback, discovered);
        if merged.is_empty() {
            warn!("Refresh produced an empty catalog, keeping previous catalog");
            return self.list_models();
        }

        let mut current = self.write();
        if generation < current.generation {
            debug!(generation, "Discarding result of a superseded model refresh");
            return current.models.clone();
        }
        *current = Published {
            models: Arc::new(merged),
            generation,
        };
        current.models.clone()
    }
}

/// Discovered models replace static entries with the same id; new ids are
/// appended in discovery order.
fn merge_models(static_models: &[Model], discovered: Vec<Model>) -> Vec<Model> {
    let mut merged = static_models.to_vec();
    for model in discovered {
        match merged.iter_mut().find(|m| m.id == model.id) {
            Some(existing) => *existing = model,
            None => merged.push(model),
        }
    }
    merged
}
