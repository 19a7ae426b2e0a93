//! Bounded-concurrency batch processing of raw frames.
//!
//! Every item is validated before any work starts; the first invalid item
//! fails the whole batch. Valid batches run on a dedicated rayon pool sized
//! by [`BatchPolicy::concurrency`], and per-item failures come back inline so
//! one bad frame does not discard the rest.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Instant;

use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::api::pipeline::{PixelDataRequest, PixelDataResult};
use crate::core::config::{BatchPolicy, ConfigValidator};
use crate::core::errors::{ErrorCode, ProcessingStage, VisionError, VisionResult};

/// Shared flag that stops a batch from starting further items.
///
/// Items already running finish normally; items not yet started are reported
/// as `CANCELLED`.
#[derive(Debug, Clone, Default)]
pub struct CancellationToken(Arc<AtomicBool>);

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Outcome of one batch item, in input order.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum BatchItem {
    Success {
        index: usize,
        result: PixelDataResult,
    },
    Error {
        index: usize,
        code: ErrorCode,
        message: String,
    },
}

impl BatchItem {
    fn from_result(index: usize, result: VisionResult<PixelDataResult>) -> Self {
        match result {
            Ok(result) => BatchItem::Success { index, result },
            Err(err) => BatchItem::Error {
                index,
                code: err.code(),
                message: err.report(),
            },
        }
    }

    pub fn index(&self) -> usize {
        match self {
            BatchItem::Success { index, .. } | BatchItem::Error { index, .. } => *index,
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, BatchItem::Success { .. })
    }
}

/// Results of a batch with summary counters.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchResult {
    pub results: Vec<BatchItem>,
    pub succeeded: usize,
    pub failed: usize,
    pub cancelled: usize,
    pub processing_time_ms: f64,
}

fn run_item(
    index: usize,
    request: &PixelDataRequest,
    cancel: Option<&CancellationToken>,
) -> BatchItem {
    if cancel.is_some_and(CancellationToken::is_cancelled) {
        return BatchItem::from_result(index, Err(VisionError::Cancelled));
    }
    let result = request.plan().and_then(|(frame, plan)| plan.run(&frame));
    if let Err(err) = &result {
        warn!(index, code = %err.code(), "batch item failed: {}", err.report());
    }
    BatchItem::from_result(index, result)
}

/// Runs the pipeline over many frames with bounded concurrency.
///
/// # Errors
///
/// Fails before processing anything when the policy is invalid or any item
/// does not validate; the error keeps the item's code and names its index.
pub fn batch_get_pixel_data(
    items: &[PixelDataRequest],
    policy: &BatchPolicy,
    cancel: Option<&CancellationToken>,
) -> VisionResult<BatchResult> {
    policy.validate()?;
    for (index, item) in items.iter().enumerate() {
        item.validate().map_err(|e| {
            VisionError::in_stage(ProcessingStage::BatchProcessing, format!("item {index}"), e)
        })?;
    }

    let start = Instant::now();
    let results: Vec<BatchItem> = if items.len() <= policy.sequential_threshold {
        items
            .iter()
            .enumerate()
            .map(|(index, item)| run_item(index, item, cancel))
            .collect()
    } else {
        let pool = policy.build_pool().map_err(|e| VisionError::ConfigError {
            message: format!("failed to build batch pool: {e}"),
        })?;
        pool.install(|| {
            items
                .par_iter()
                .enumerate()
                .map(|(index, item)| run_item(index, item, cancel))
                .collect()
        })
    };

    let cancelled = results
        .iter()
        .filter(|r| matches!(r, BatchItem::Error { code: ErrorCode::Cancelled, .. }))
        .count();
    let succeeded = results.iter().filter(|r| r.is_success()).count();
    let failed = results.len() - succeeded - cancelled;
    let processing_time_ms = start.elapsed().as_secs_f64() * 1000.0;

    info!(
        total = items.len(),
        succeeded,
        failed,
        cancelled,
        concurrency = policy.concurrency,
        "batch completed in {:.2}ms",
        processing_time_ms
    );

    Ok(BatchResult {
        results,
        succeeded,
        failed,
        cancelled,
        processing_time_ms,
    })
}
