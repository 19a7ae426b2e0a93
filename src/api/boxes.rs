//! Bounding-box post-processing operations.
//!
//! Boxes arrive as loose numeric arrays; each is checked for exactly four
//! values before any geometry runs, and the error names the offending index.

use serde::{Deserialize, Serialize};

use crate::core::config::ConfigValidator;
use crate::core::errors::VisionResult;
use crate::processors::geometry::{self, BoxCoords, ClipResult, IouResult, box_from_slice};
use crate::processors::letterbox::reverse_letterbox_boxes;
use crate::processors::nms::{self, Detection, NmsConfig, NmsResult};
use crate::processors::types::BoxFormat;

/// Boxes in a known format.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BoxesResponse {
    pub boxes: Vec<BoxCoords>,
    pub format: BoxFormat,
}

pub fn convert_box_format(
    boxes: &[Vec<f32>],
    from: BoxFormat,
    to: BoxFormat,
) -> VisionResult<BoxesResponse> {
    let boxes = geometry::boxes_from_slices(boxes)?;
    Ok(BoxesResponse {
        boxes: geometry::convert_boxes(&boxes, from, to),
        format: to,
    })
}

/// Sparse options for [`scale_boxes`].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScaleBoxesOptions {
    pub from_width: f32,
    pub from_height: f32,
    pub to_width: f32,
    pub to_height: f32,
    #[serde(default)]
    pub format: Option<BoxFormat>,
    /// Clamp to the target image; defaults to `false`.
    #[serde(default)]
    pub clip: Option<bool>,
}

pub fn scale_boxes(boxes: &[Vec<f32>], options: &ScaleBoxesOptions) -> VisionResult<BoxesResponse> {
    let boxes = geometry::boxes_from_slices(boxes)?;
    let format = options.format.unwrap_or_default();
    let scaled = geometry::scale_boxes(
        &boxes,
        (options.from_width, options.from_height),
        (options.to_width, options.to_height),
        format,
        options.clip.unwrap_or(false),
    )?;
    Ok(BoxesResponse {
        boxes: scaled,
        format,
    })
}

/// Sparse options for [`clip_boxes`].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClipBoxesOptions {
    pub width: f32,
    pub height: f32,
    #[serde(default)]
    pub format: Option<BoxFormat>,
    /// Drop boxes left without area; defaults to `true`.
    #[serde(default)]
    pub remove_invalid: Option<bool>,
}

/// Clipped boxes with their format and the number dropped.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClipBoxesResponse {
    pub boxes: Vec<BoxCoords>,
    pub format: BoxFormat,
    pub removed_count: usize,
}

pub fn clip_boxes(boxes: &[Vec<f32>], options: &ClipBoxesOptions) -> VisionResult<ClipBoxesResponse> {
    let boxes = geometry::boxes_from_slices(boxes)?;
    let format = options.format.unwrap_or_default();
    let ClipResult {
        boxes,
        removed_count,
    } = geometry::clip_boxes(
        &boxes,
        options.width,
        options.height,
        format,
        options.remove_invalid.unwrap_or(true),
    )?;
    Ok(ClipBoxesResponse {
        boxes,
        format,
        removed_count,
    })
}

pub fn calculate_iou(box_a: &[f32], box_b: &[f32], format: BoxFormat) -> VisionResult<IouResult> {
    let a = box_from_slice(0, box_a)?;
    let b = box_from_slice(1, box_b)?;
    Ok(geometry::calculate_iou(a, b, format))
}

/// A detection whose box has not been validated yet.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DetectionInput {
    #[serde(rename = "box")]
    pub bbox: Vec<f32>,
    pub score: f32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub class_index: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
}

impl DetectionInput {
    pub fn new(bbox: Vec<f32>, score: f32) -> Self {
        Self {
            bbox,
            score,
            class_index: None,
            label: None,
        }
    }
}

/// Sparse NMS options.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NmsOptions {
    #[serde(default)]
    pub iou_threshold: Option<f32>,
    #[serde(default)]
    pub score_threshold: Option<f32>,
    #[serde(default)]
    pub max_detections: Option<usize>,
    #[serde(default)]
    pub format: Option<BoxFormat>,
    #[serde(default)]
    pub class_aware: Option<bool>,
}

impl NmsOptions {
    pub fn resolve(&self) -> VisionResult<NmsConfig> {
        let defaults = NmsConfig::default();
        NmsConfig {
            iou_threshold: self.iou_threshold.unwrap_or(defaults.iou_threshold),
            score_threshold: self.score_threshold.unwrap_or(defaults.score_threshold),
            max_detections: self.max_detections.unwrap_or(defaults.max_detections),
            format: self.format.unwrap_or(defaults.format),
            class_aware: self.class_aware.unwrap_or(defaults.class_aware),
        }
        .validated()
    }
}

pub fn non_max_suppression(
    detections: &[DetectionInput],
    options: &NmsOptions,
) -> VisionResult<NmsResult> {
    let config = options.resolve()?;
    let detections = detections
        .iter()
        .enumerate()
        .map(|(index, d)| {
            Ok(Detection {
                bbox: box_from_slice(index, &d.bbox)?,
                score: d.score,
                class_index: d.class_index,
                label: d.label.clone(),
            })
        })
        .collect::<VisionResult<Vec<_>>>()?;
    nms::non_max_suppression(&detections, &config)
}

/// Options for mapping letterboxed boxes back to the source image.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReverseLetterboxOptions {
    pub scale: f32,
    #[serde(default)]
    pub pad_x: f32,
    #[serde(default)]
    pub pad_y: f32,
    #[serde(default)]
    pub format: Option<BoxFormat>,
    /// Defaults to `false`.
    #[serde(default)]
    pub clip: Option<bool>,
    /// Source size; when known, clipping clamps to it instead of only to zero.
    #[serde(default)]
    pub original_width: Option<u32>,
    #[serde(default)]
    pub original_height: Option<u32>,
}

pub fn reverse_letterbox(
    boxes: &[Vec<f32>],
    options: &ReverseLetterboxOptions,
) -> VisionResult<BoxesResponse> {
    let boxes = geometry::boxes_from_slices(boxes)?;
    let format = options.format.unwrap_or_default();
    let clip_to = options
        .original_width
        .zip(options.original_height)
        .map(|(w, h)| (w as f32, h as f32));
    let restored = reverse_letterbox_boxes(
        &boxes,
        format,
        options.scale,
        (options.pad_x, options.pad_y),
        clip_to,
        options.clip.unwrap_or(false),
    )?;
    Ok(BoxesResponse {
        boxes: restored,
        format,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::ErrorCode;

    #[test]
    fn test_invalid_box_index() {
        let boxes = vec![vec![0.0, 0.0, 1.0, 1.0], vec![0.0, 1.0, 2.0]];
        let err = convert_box_format(&boxes, BoxFormat::Xyxy, BoxFormat::Xywh).unwrap_err();
        assert_eq!(err.code(), ErrorCode::InvalidBox);
        assert!(err.to_string().contains("index 1"));
    }

    #[test]
    fn test_convert_reports_target_format() {
        let r = convert_box_format(
            &[vec![100.0, 100.0, 200.0, 200.0]],
            BoxFormat::Xyxy,
            BoxFormat::Xywh,
        )
        .unwrap();
        assert_eq!(r.boxes, vec![[100.0, 100.0, 100.0, 100.0]]);
        assert_eq!(r.format, BoxFormat::Xywh);
    }

    #[test]
    fn test_clip_defaults_remove_empty() {
        let options = ClipBoxesOptions {
            width: 10.0,
            height: 10.0,
            ..Default::default()
        };
        let r = clip_boxes(&[vec![-5.0, -5.0, 5.0, 5.0], vec![20.0, 20.0, 30.0, 30.0]], &options)
            .unwrap();
        assert_eq!(r.boxes, vec![[0.0, 0.0, 5.0, 5.0]]);
        assert_eq!(r.removed_count, 1);
    }

    #[test]
    fn test_scale_boxes_zero_source() {
        let options = ScaleBoxesOptions {
            from_width: 0.0,
            from_height: 10.0,
            to_width: 10.0,
            to_height: 10.0,
            ..Default::default()
        };
        let err = scale_boxes(&[vec![0.0; 4]], &options).unwrap_err();
        assert_eq!(err.code(), ErrorCode::InvalidDimensions);
    }

    #[test]
    fn test_nms_options_defaults_and_validation() {
        let config = NmsOptions::default().resolve().unwrap();
        assert_eq!(config.iou_threshold, 0.45);
        assert_eq!(config.max_detections, 100);
        let bad = NmsOptions {
            iou_threshold: Some(-0.1),
            ..Default::default()
        };
        assert!(bad.resolve().is_err());
    }

    #[test]
    fn test_nms_rejects_short_box() {
        let dets = vec![
            DetectionInput::new(vec![0.0, 0.0, 1.0, 1.0], 0.9),
            DetectionInput::new(vec![0.0], 0.8),
        ];
        let err = non_max_suppression(&dets, &NmsOptions::default()).unwrap_err();
        assert_eq!(err.code(), ErrorCode::InvalidBox);
    }

    #[test]
    fn test_reverse_letterbox_clip() {
        let options = ReverseLetterboxOptions {
            scale: 0.5,
            pad_y: 10.0,
            clip: Some(true),
            original_width: Some(100),
            original_height: Some(100),
            ..Default::default()
        };
        let r = reverse_letterbox(&[vec![0.0, 0.0, 60.0, 70.0]], &options).unwrap();
        assert_eq!(r.boxes, vec![[0.0, 0.0, 100.0, 100.0]]);

        let unclipped = ReverseLetterboxOptions {
            clip: None,
            ..options
        };
        let r = reverse_letterbox(&[vec![0.0, 0.0, 60.0, 70.0]], &unclipped).unwrap();
        assert_eq!(r.boxes, vec![[0.0, -20.0, 120.0, 120.0]]);
    }

    #[test]
    fn test_calculate_iou_identity() {
        let r = calculate_iou(&[0.0, 0.0, 10.0, 10.0], &[0.0, 0.0, 10.0, 10.0], BoxFormat::Xyxy)
            .unwrap();
        assert_eq!(r.iou, 1.0);
        assert!(calculate_iou(&[0.0; 3], &[0.0; 4], BoxFormat::Xyxy).is_err());
    }
}
