//! Greedy non-maximum suppression.

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::core::config::ConfigValidator;
use crate::core::errors::{VisionError, VisionResult};
use crate::core::validation::validate_range;
use crate::processors::geometry::{BoxCoords, area_xyxy, intersection_xyxy, to_xyxy};
use crate::processors::types::BoxFormat;

pub const DEFAULT_IOU_THRESHOLD: f32 = 0.45;
pub const DEFAULT_SCORE_THRESHOLD: f32 = 0.25;
pub const DEFAULT_MAX_DETECTIONS: usize = 100;

/// One model detection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Detection {
    #[serde(rename = "box")]
    pub bbox: BoxCoords,
    pub score: f32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub class_index: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
}

impl Detection {
    pub fn new(bbox: BoxCoords, score: f32) -> Self {
        Self {
            bbox,
            score,
            class_index: None,
            label: None,
        }
    }

    pub fn with_class(mut self, class_index: u32) -> Self {
        self.class_index = Some(class_index);
        self
    }
}

/// Resolved NMS parameters.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NmsConfig {
    /// A detection is suppressed when its IoU with a kept one exceeds this.
    pub iou_threshold: f32,
    /// Detections scoring below this are dropped before suppression.
    pub score_threshold: f32,
    pub max_detections: usize,
    pub format: BoxFormat,
    /// Only let detections of the same class suppress each other.
    pub class_aware: bool,
}

impl Default for NmsConfig {
    fn default() -> Self {
        Self {
            iou_threshold: DEFAULT_IOU_THRESHOLD,
            score_threshold: DEFAULT_SCORE_THRESHOLD,
            max_detections: DEFAULT_MAX_DETECTIONS,
            format: BoxFormat::default(),
            class_aware: false,
        }
    }
}

impl ConfigValidator for NmsConfig {
    fn validate(&self) -> VisionResult<()> {
        validate_range(self.iou_threshold, 0.0, 1.0, "iouThreshold")?;
        if !self.score_threshold.is_finite() {
            return Err(VisionError::invalid_field(
                "scoreThreshold",
                "a finite number",
                self.score_threshold.to_string(),
            ));
        }
        if self.max_detections == 0 {
            return Err(VisionError::invalid_field("maxDetections", "a value > 0", "0"));
        }
        Ok(())
    }
}

/// Detections kept by NMS.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NmsResult {
    /// Positions of the kept detections in the input slice, best first.
    pub indices: Vec<usize>,
    /// The kept detections, in the same order as `indices`.
    pub detections: Vec<Detection>,
    /// Detections that passed the score threshold but were not kept.
    ///
    /// This includes candidates dropped because `max_detections` was reached,
    /// not only IoU overlaps, so `indices.len() + suppressed_count` always
    /// equals the number of detections at or above the score threshold.
    pub suppressed_count: usize,
}

/// Runs greedy NMS.
///
/// Detections with `score >= score_threshold` are sorted by descending score
/// (ties keep input order) and kept one by one unless their IoU with an
/// already kept detection exceeds `iou_threshold`. Selection stops at
/// `max_detections`; everything that passed the threshold but was not kept
/// counts as suppressed.
pub fn non_max_suppression(detections: &[Detection], config: &NmsConfig) -> VisionResult<NmsResult> {
    config.validate()?;
    if let Some(i) = detections.iter().position(|d| !d.score.is_finite()) {
        return Err(VisionError::invalid_input(format!(
            "detections[{i}].score is not finite"
        )));
    }

    let corners: Vec<BoxCoords> = detections
        .iter()
        .map(|d| to_xyxy(d.bbox, config.format))
        .collect();
    let areas: Vec<f32> = corners.iter().map(area_xyxy).collect();

    let mut order: Vec<usize> = (0..detections.len())
        .filter(|&i| detections[i].score >= config.score_threshold)
        .collect();
    let passing = order.len();
    // `sort_by` is stable, so equal scores keep input order.
    order.sort_by(|&a, &b| detections[b].score.total_cmp(&detections[a].score));

    let mut kept: Vec<usize> = Vec::new();
    for &candidate in &order {
        if kept.len() >= config.max_detections {
            break;
        }
        let overlaps = kept.iter().any(|&k| {
            if config.class_aware && detections[k].class_index != detections[candidate].class_index {
                return false;
            }
            let inter = intersection_xyxy(&corners[k], &corners[candidate]);
            if inter <= 0.0 {
                return false;
            }
            let union = areas[k] + areas[candidate] - inter;
            union > 0.0 && inter / union > config.iou_threshold
        });
        if !overlaps {
            kept.push(candidate);
        }
    }

    debug!(
        input = detections.len(),
        passing,
        kept = kept.len(),
        "non-max suppression"
    );

    Ok(NmsResult {
        detections: kept.iter().map(|&i| detections[i].clone()).collect(),
        suppressed_count: passing - kept.len(),
        indices: kept,
    })
}
