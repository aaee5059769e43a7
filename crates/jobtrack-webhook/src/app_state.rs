//! Shared application state for the jobtrack webhook.

use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use jobtrack_core::error::Result;
use jobtrack_core::PodRecord;

use crate::config::WebhookConfig;
use crate::engine::{CounterEngine, EngineConfig};
use crate::obs::WebhookMetrics;
use crate::store::{InMemoryRecordStore, RecordStore};

#[derive(Clone)]
pub struct AppState {
    inner: Arc<AppStateInner>,
}

struct AppStateInner {
    engine: CounterEngine,
    metrics: WebhookMetrics,
    shutdown: CancellationToken,
}

impl AppState {
    /// Build state around an arbitrary store.
    pub fn new(cfg: &WebhookConfig, store: Arc<dyn RecordStore>) -> Result<Self> {
        let engine_cfg = EngineConfig::from_config(cfg)?;
        Ok(Self::from_engine(CounterEngine::new(engine_cfg, store)))
    }

    /// Build state around an in-memory store seeded from `store.pods`.
    pub fn in_memory(cfg: &WebhookConfig) -> Result<(Self, Arc<InMemoryRecordStore>)> {
        let store = Arc::new(InMemoryRecordStore::new());
        for seed in &cfg.store.pods {
            let ns = seed
                .namespace
                .clone()
                .unwrap_or_else(|| cfg.target.namespace.clone());
            let mut pod = PodRecord::new(ns, seed.name.clone());
            pod.labels = seed.labels.clone();
            store.insert(pod);
        }
        if !store.is_empty() {
            tracing::info!(pods = store.len(), "seeded in-memory record store");
        }
        let state = Self::new(cfg, store.clone())?;
        Ok((state, store))
    }

    pub fn from_engine(engine: CounterEngine) -> Self {
        Self {
            inner: Arc::new(AppStateInner {
                engine,
                metrics: WebhookMetrics::default(),
                shutdown: CancellationToken::new(),
            }),
        }
    }

    pub fn engine(&self) -> &CounterEngine {
        &self.inner.engine
    }

    pub fn metrics(&self) -> &WebhookMetrics {
        &self.inner.metrics
    }

    /// Cancelled when the process starts shutting down.
    pub fn shutdown_token(&self) -> &CancellationToken {
        &self.inner.shutdown
    }

    pub fn is_draining(&self) -> bool {
        self.inner.metrics.is_draining()
    }

    /// Flip readiness and stop in-flight retry loops.
    pub fn begin_shutdown(&self) {
        self.inner.metrics.set_draining();
        self.inner.shutdown.cancel();
    }
}
