//! Configuration cache with a single-flight refresh over all provider probes.
use crate::catalog::ModelCatalog;
use crate::error::DispatchError;
use crate::model::{Provider, Track};
use crate::probe::{ConfigurationMatrix, ProviderProbe};
use futures::future::join_all;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tracing::{debug, info, instrument, warn};

pub const DEFAULT_PROBE_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, Default)]
struct CacheState {
    matrix: ConfigurationMatrix,
    active_rounds: usize,
    last_round: u64,
    published_round: u64,
}

pub struct ConfigurationCache {
    probes: Vec<Arc<dyn ProviderProbe>>,
    state: Mutex<CacheState>,
    catalog: Option<Arc<ModelCatalog>>,
    probe_timeout: Duration,
}

// Keeps the in-flight count right even if a round is dropped midway.
struct RoundGuard<'a> {
    cache: &'a ConfigurationCache,
}

impl Drop for RoundGuard<'_> {
    fn drop(&mut self) {
        let mut state = self.cache.lock();
        state.active_rounds = state.active_rounds.saturating_sub(1);
    }
}

impl ConfigurationCache {
    pub fn new(probes: Vec<Arc<dyn ProviderProbe>>) -> Self {
        Self {
            probes,
            state: Mutex::new(CacheState::default()),
            catalog: None,
            probe_timeout: DEFAULT_PROBE_TIMEOUT,
        }
    }

    /// Catalog refreshed after every completed probe round.
    pub fn with_catalog(mut self, catalog: Arc<ModelCatalog>) -> Self {
        self.catalog = Some(catalog);
        self
    }

    pub fn with_probe_timeout(mut self, timeout: Duration) -> Self {
        self.probe_timeout = timeout;
        self
    }

    fn lock(&self) -> MutexGuard<'_, CacheState> {
        self.state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Last published matrix, without probing.
    pub fn current(&self) -> ConfigurationMatrix {
        self.lock().matrix.clone()
    }

    pub fn is_refreshing(&self) -> bool {
        self.lock().active_rounds > 0
    }

    /// Probes every `(provider, track)` pair in parallel and publishes the
    /// result. While a round is in flight, non-forced callers get the
    /// previous matrix back and no probe is issued. Never fails: a probe
    /// that errors, panics or times out reads as `false`.
    #[instrument(skip(self))]
    pub async fn check_all(&self, force_refresh: bool) -> ConfigurationMatrix {
        let round = {
            let mut state = self.lock();
            if state.active_rounds > 0 && !force_refresh {
                debug!("Probe round already in flight, returning cached matrix");
                return state.matrix.clone();
            }
            state.active_rounds += 1;
            state.last_round += 1;
            state.last_round
        };

        let matrix = {
            let _guard = RoundGuard { cache: self };
            self.run_round().await
        };

        let published = {
            let mut state = self.lock();
            if round > state.published_round {
                state.matrix = matrix;
                state.published_round = round;
            } else {
                debug!(round, "Discarding result of a superseded probe round");
            }
            state.matrix.clone()
        };
        info!(
            configured = ?published.configured_providers(),
            "Provider configuration refreshed"
        );

        if let Some(catalog) = &self.catalog {
            catalog.refresh_models().await;
        }
        published
    }

    async fn run_round(&self) -> ConfigurationMatrix {
        let checks = self.probes.iter().map(|probe| {
            let probe = probe.clone();
            let timeout = self.probe_timeout;
            async move {
                let (provider, track) = (probe.provider(), probe.track());
                // Own task per probe, so a panicking adapter only loses its own pair.
                let handle = tokio::spawn(async move { tokio::time::timeout(timeout, probe.probe()).await });
                let configured = match handle.await {
                    Ok(Ok(Ok(configured))) => configured,
                    Ok(Ok(Err(err))) => probe_failed(provider, track, err.to_string()),
                    Ok(Err(_)) => probe_failed(provider, track, "timed out".to_string()),
                    Err(err) => probe_failed(provider, track, err.to_string()),
                };
                (provider, track, configured)
            }
        });

        let mut matrix = ConfigurationMatrix::default();
        for provider in Provider::ALL {
            for track in Track::ALL {
                matrix.set(provider, track, false);
            }
        }
        for (provider, track, configured) in join_all(checks).await {
            debug!(%provider, %track, configured, "Probe finished");
            matrix.set(provider, track, configured);
        }
        matrix
    }
}

fn probe_failed(provider: Provider, track: Track, reason: String) -> bool {
    let err = DispatchError::ProbeFailed {
        provider,
        track,
        reason,
    };
    warn!(error = %err, "Probe failed, marking pair unconfigured");
    false
}
