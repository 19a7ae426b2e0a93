//! Shared parallel processing configuration types.

use serde::{Deserialize, Serialize};

use super::ConfigValidator;
use crate::core::errors::{VisionError, VisionResult};

/// Default number of pipeline invocations a batch runs at once.
pub const DEFAULT_BATCH_CONCURRENCY: usize = 4;

/// Configuration for batch processing.
///
/// A batch owns a dedicated rayon pool sized to `concurrency`, so at most that
/// many single-image pipelines are in flight at any moment regardless of how
/// many cores the host has.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchPolicy {
    /// Maximum number of pipelines running concurrently.
    /// Default: 4
    #[serde(default = "BatchPolicy::default_concurrency")]
    pub concurrency: usize,

    /// Batches with at most this many items run sequentially on the caller's thread.
    /// Default: 1
    #[serde(default = "BatchPolicy::default_sequential_threshold")]
    pub sequential_threshold: usize,
}

impl BatchPolicy {
    /// Create a new BatchPolicy with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the concurrency limit.
    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency;
        self
    }

    /// Set the sequential threshold.
    pub fn with_sequential_threshold(mut self, threshold: usize) -> Self {
        self.sequential_threshold = threshold;
        self
    }

    /// Builds the bounded worker pool for one batch.
    pub fn build_pool(&self) -> Result<rayon::ThreadPool, rayon::ThreadPoolBuildError> {
        rayon::ThreadPoolBuilder::new()
            .num_threads(self.concurrency)
            .thread_name(|i| format!("vision-batch-{i}"))
            .build()
    }

    fn default_concurrency() -> usize {
        DEFAULT_BATCH_CONCURRENCY
    }

    fn default_sequential_threshold() -> usize {
        1
    }
}

impl Default for BatchPolicy {
    fn default() -> Self {
        Self {
            concurrency: Self::default_concurrency(),
            sequential_threshold: Self::default_sequential_threshold(),
        }
    }
}

impl ConfigValidator for BatchPolicy {
    fn validate(&self) -> VisionResult<()> {
        if self.concurrency == 0 {
            return Err(VisionError::invalid_field("concurrency", "a value >= 1", "0"));
        }
        Ok(())
    }
}
