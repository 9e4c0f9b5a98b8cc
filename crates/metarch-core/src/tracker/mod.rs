//! Performance tracking
//!
//! Folds dispatch outcomes into worker statistics. The tracker holds no state
//! of its own; every update goes through [`WorkerRegistry::update_stats`],
//! which serializes writes per worker.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::{Error, Result};
use crate::registry::WorkerRegistry;
use crate::routing::{Outcome, PerformanceStats};

/// Tracker settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrackerConfig {
    /// EWMA weight given to a new quality sample
    pub quality_weight: f64,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self { quality_weight: 0.2 }
    }
}

impl TrackerConfig {
    pub fn validate(&self) -> Result<()> {
        if !(self.quality_weight > 0.0 && self.quality_weight <= 1.0) {
            return Err(Error::ConfigError(format!(
                "tracker.quality_weight must be within (0, 1], got {}",
                self.quality_weight
            )));
        }
        Ok(())
    }
}

#[derive(Debug)]
pub struct PerformanceTracker {
    registry: Arc<WorkerRegistry>,
    config: TrackerConfig,
}

impl PerformanceTracker {
    pub fn new(registry: Arc<WorkerRegistry>) -> Self {
        Self::with_config(registry, TrackerConfig::default())
    }

    pub fn with_config(registry: Arc<WorkerRegistry>, config: TrackerConfig) -> Self {
        Self { registry, config }
    }

    pub fn config(&self) -> &TrackerConfig {
        &self.config
    }

    /// Record one dispatch outcome
    ///
    /// The only rejection is `UnknownWorker`, logged here and returned so the
    /// caller can decide whether it matters.
    pub async fn record(&self, worker_id: &str, outcome: &Outcome) -> Result<PerformanceStats> {
        match self
            .registry
            .update_stats(worker_id, outcome, self.config.quality_weight)
            .await
        {
            Ok(stats) => {
                debug!(
                    worker_id,
                    succeeded = outcome.succeeded,
                    cancelled = outcome.cancelled,
                    latency_ms = outcome.latency.as_millis() as u64,
                    invocations = stats.invocation_count,
                    success_rate = stats.success_rate(),
                    "Recorded outcome"
                );
                Ok(stats)
            }
            Err(e @ Error::UnknownWorker(_)) => {
                warn!(worker_id, "Outcome recorded for unknown worker");
                Err(e)
            }
            Err(e) => Err(e),
        }
    }
}
