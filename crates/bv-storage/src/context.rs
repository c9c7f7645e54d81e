//! Collaborators shared by every component of one feature storage.

use std::fmt;
use std::sync::Arc;

use bv_common::{FeatureName, Result};
use bv_config::StorageConfig;

use crate::clock::{Clock, SystemClock};
use crate::codec::{BatchCodec, TlvCodec};
use crate::metrics::{JsonlMetricsSink, MetricsSink, NoOpMetrics, TracingMetrics};

/// Explicitly passed context: time source, metrics and codec.
#[derive(Clone)]
pub struct StorageContext {
    pub clock: Arc<dyn Clock>,
    pub metrics: Arc<dyn MetricsSink>,
    pub codec: Arc<dyn BatchCodec>,
}

impl Default for StorageContext {
    fn default() -> Self {
        StorageContext {
            clock: Arc::new(SystemClock),
            metrics: Arc::new(NoOpMetrics),
            codec: Arc::new(TlvCodec::new()),
        }
    }
}

impl StorageContext {
    pub fn new() -> Self {
        StorageContext::default()
    }

    /// Context for `feature` as described by `config`.
    ///
    /// Deletions go to a JSONL log when `event_log_dir` is set, to the
    /// telemetry log target otherwise.
    pub fn from_config(config: &StorageConfig, feature: &FeatureName) -> Result<Self> {
        Self::from_config_with_clock(config, feature, Arc::new(SystemClock))
    }

    /// Same as [`StorageContext::from_config`], with the deletion log and
    /// batch naming both driven by `clock`.
    pub fn from_config_with_clock(
        config: &StorageConfig,
        feature: &FeatureName,
        clock: Arc<dyn Clock>,
    ) -> Result<Self> {
        let metrics: Arc<dyn MetricsSink> = match &config.event_log_dir {
            Some(dir) => Arc::new(JsonlMetricsSink::open(dir, feature, clock.clone())?),
            None => Arc::new(TracingMetrics::new(feature)),
        };
        Ok(StorageContext {
            clock,
            metrics,
            ..Default::default()
        })
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn with_metrics(mut self, metrics: Arc<dyn MetricsSink>) -> Self {
        self.metrics = metrics;
        self
    }

    pub fn with_codec(mut self, codec: Arc<dyn BatchCodec>) -> Self {
        self.codec = codec;
        self
    }

    pub fn now_millis(&self) -> u64 {
        self.clock.now_millis()
    }
}

impl fmt::Debug for StorageContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StorageContext")
            .field("clock", &self.clock)
            .field("codec", &self.codec)
            .finish_non_exhaustive()
    }
}
