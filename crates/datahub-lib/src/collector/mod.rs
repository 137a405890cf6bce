//! Concurrent multi-source collection
//!
//! This module provides the fan-out orchestrator and the data access objects
//! built on it. A DAO turns one caller request into one worker per target
//! entity; each worker queries its sub-sources in a fixed order and streams
//! records to a single consumer that folds them into a merge map.
//!
//! Callers with very large target sets should batch them; one task is
//! spawned per target unconditionally.

mod cluster_status;
mod fanout;
mod influxql;
mod metrics;
mod predictions;
mod recommendations;
mod scores;

#[cfg(test)]
mod tests;

pub use cluster_status::ClusterStatusDao;
pub use fanout::{Collector, Emitter};
pub use metrics::MetricsDao;
pub use predictions::PredictionDao;
pub use recommendations::RecommendationDao;
pub use scores::ScoreDao;

use crate::observability::StructuredLogger;
use crate::source::{MetricsBackend, TimeSeriesStore};
use anyhow::{Context, Result};
use serde::Deserialize;
use std::sync::Arc;

/// Collector settings
#[derive(Debug, Clone, Deserialize)]
pub struct CollectorConfig {
    /// Cancel sibling workers as soon as one fails
    #[serde(default = "default_cancel_on_error")]
    pub cancel_on_error: bool,
}

fn default_cancel_on_error() -> bool {
    true
}

impl Default for CollectorConfig {
    fn default() -> Self {
        Self {
            cancel_on_error: default_cancel_on_error(),
        }
    }
}

/// The DAOs sharing one pair of upstream clients
#[derive(Clone)]
pub struct Daos {
    pub metrics: MetricsDao,
    pub predictions: PredictionDao,
    pub recommendations: RecommendationDao,
    pub cluster_status: ClusterStatusDao,
    pub scores: ScoreDao,
}

/// Builder wiring upstream clients, collector settings and logging into [`Daos`]
pub struct DaosBuilder {
    backend: Option<Arc<dyn MetricsBackend>>,
    store: Option<Arc<dyn TimeSeriesStore>>,
    config: CollectorConfig,
    logger: StructuredLogger,
}

impl DaosBuilder {
    pub fn new() -> Self {
        Self {
            backend: None,
            store: None,
            config: CollectorConfig::default(),
            logger: StructuredLogger::new("datahub"),
        }
    }

    pub fn backend(mut self, backend: Arc<dyn MetricsBackend>) -> Self {
        self.backend = Some(backend);
        self
    }

    pub fn store(mut self, store: Arc<dyn TimeSeriesStore>) -> Self {
        self.store = Some(store);
        self
    }

    pub fn config(mut self, config: CollectorConfig) -> Self {
        self.config = config;
        self
    }

    pub fn logger(mut self, logger: StructuredLogger) -> Self {
        self.logger = logger;
        self
    }

    pub fn build(self) -> Result<Daos> {
        let backend = self.backend.context("Metrics backend is required")?;
        let store = self.store.context("Time-series store is required")?;
        let collector = Collector::new(self.config.cancel_on_error);

        Ok(Daos {
            metrics: MetricsDao::new(backend, collector, self.logger.child("metrics")),
            predictions: PredictionDao::new(
                Arc::clone(&store),
                collector,
                self.logger.child("predictions"),
            ),
            recommendations: RecommendationDao::new(
                Arc::clone(&store),
                self.logger.child("recommendations"),
            ),
            cluster_status: ClusterStatusDao::new(
                Arc::clone(&store),
                self.logger.child("cluster_status"),
            ),
            scores: ScoreDao::new(store, self.logger.child("scores")),
        })
    }
}

impl Default for DaosBuilder {
    fn default() -> Self {
        Self::new()
    }
}
