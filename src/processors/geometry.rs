//! Bounding-box geometry.
//!
//! Boxes are plain `[f32; 4]` values; their encoding ([`BoxFormat`]) travels
//! alongside them. Every operation routes through the corner (`xyxy`) form,
//! so each format only needs a conversion to and from it.

use serde::{Deserialize, Serialize};

use crate::core::errors::{VisionError, VisionResult};
use crate::core::validation::validate_finite;
use crate::processors::types::BoxFormat;

/// A bounding box in the encoding named by an accompanying [`BoxFormat`].
pub type BoxCoords = [f32; 4];

/// Converts a box to corner form.
#[inline]
pub fn to_xyxy(b: BoxCoords, format: BoxFormat) -> BoxCoords {
    match format {
        BoxFormat::Xyxy => b,
        BoxFormat::Xywh => [b[0], b[1], b[0] + b[2], b[1] + b[3]],
        BoxFormat::Cxcywh => {
            let (hw, hh) = (b[2] / 2.0, b[3] / 2.0);
            [b[0] - hw, b[1] - hh, b[0] + hw, b[1] + hh]
        }
    }
}

/// Converts a corner-form box to `format`.
#[inline]
pub fn from_xyxy(b: BoxCoords, format: BoxFormat) -> BoxCoords {
    match format {
        BoxFormat::Xyxy => b,
        BoxFormat::Xywh => [b[0], b[1], b[2] - b[0], b[3] - b[1]],
        BoxFormat::Cxcywh => {
            let (w, h) = (b[2] - b[0], b[3] - b[1]);
            [b[0] + w / 2.0, b[1] + h / 2.0, w, h]
        }
    }
}

/// Converts a box between any two formats.
///
/// # Arguments
///
/// * `b` - The box coordinates in `from` encoding.
/// * `from` - The current encoding.
/// * `to` - The requested encoding.
///
/// # Returns
///
/// The same box in `to` encoding. Converting to the same format is the identity.
pub fn convert_box(b: BoxCoords, from: BoxFormat, to: BoxFormat) -> BoxCoords {
    if from == to {
        return b;
    }
    match (from, to) {
        // Direct form avoids the detour through corners and its rounding.
        (BoxFormat::Xywh, BoxFormat::Cxcywh) => [b[0] + b[2] / 2.0, b[1] + b[3] / 2.0, b[2], b[3]],
        (BoxFormat::Cxcywh, BoxFormat::Xywh) => [b[0] - b[2] / 2.0, b[1] - b[3] / 2.0, b[2], b[3]],
        _ => from_xyxy(to_xyxy(b, from), to),
    }
}

/// Converts a list of boxes between formats.
pub fn convert_boxes(boxes: &[BoxCoords], from: BoxFormat, to: BoxFormat) -> Vec<BoxCoords> {
    boxes.iter().map(|&b| convert_box(b, from, to)).collect()
}

/// Checks that a raw coordinate list is a 4-tuple of finite numbers.
///
/// `index` is the position of the box in its request and is reported in the error.
pub fn box_from_slice(index: usize, values: &[f32]) -> VisionResult<BoxCoords> {
    let b: BoxCoords = values.try_into().map_err(|_| VisionError::InvalidBox {
        index,
        len: values.len(),
    })?;
    validate_finite(&b, &format!("boxes[{index}]"))?;
    Ok(b)
}

/// Validates a list of raw coordinate lists, failing on the first bad one.
pub fn boxes_from_slices<V: AsRef<[f32]>>(values: &[V]) -> VisionResult<Vec<BoxCoords>> {
    values
        .iter()
        .enumerate()
        .map(|(i, v)| box_from_slice(i, v.as_ref()))
        .collect()
}

/// Width and height of a corner-form box (may be negative for inverted boxes).
#[inline]
fn extent(b: &BoxCoords) -> (f32, f32) {
    (b[2] - b[0], b[3] - b[1])
}

/// Area of a corner-form box; inverted or empty boxes have zero area.
#[inline]
pub fn area_xyxy(b: &BoxCoords) -> f32 {
    let (w, h) = extent(b);
    w.max(0.0) * h.max(0.0)
}

/// Intersection area of two corner-form boxes.
#[inline]
pub fn intersection_xyxy(a: &BoxCoords, b: &BoxCoords) -> f32 {
    let inter_w = a[2].min(b[2]) - a[0].max(b[0]);
    let inter_h = a[3].min(b[3]) - a[1].max(b[1]);
    if inter_w <= 0.0 || inter_h <= 0.0 {
        return 0.0;
    }
    inter_w * inter_h
}

/// IoU of two corner-form boxes; `0.0` for disjoint or degenerate pairs.
#[inline]
pub fn iou_xyxy(a: &BoxCoords, b: &BoxCoords) -> f32 {
    let inter = intersection_xyxy(a, b);
    if inter <= 0.0 {
        return 0.0;
    }
    let union = area_xyxy(a) + area_xyxy(b) - inter;
    if union <= 0.0 {
        return 0.0;
    }
    inter / union
}

/// Intersection-over-union together with its parts.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct IouResult {
    /// `intersection / union`, in `[0, 1]`.
    pub iou: f32,
    /// Overlapping area.
    pub intersection: f32,
    /// Combined area.
    pub union: f32,
}

/// Computes the Intersection over Union (IoU) between two boxes.
///
/// # Arguments
///
/// * `a` - The first box.
/// * `b` - The second box.
/// * `format` - Encoding shared by both boxes.
///
/// # Returns
///
/// The IoU together with the intersection and union areas. Non-overlapping
/// or degenerate boxes yield an IoU of `0.0`; the result is never negative.
pub fn calculate_iou(a: BoxCoords, b: BoxCoords, format: BoxFormat) -> IouResult {
    let (a, b) = (to_xyxy(a, format), to_xyxy(b, format));
    let intersection = intersection_xyxy(&a, &b);
    let union = area_xyxy(&a) + area_xyxy(&b) - intersection;
    let iou = if intersection > 0.0 && union > 0.0 {
        intersection / union
    } else {
        0.0
    };
    IouResult {
        iou,
        intersection,
        union: union.max(0.0),
    }
}

fn validate_extent(width: f32, height: f32, what: &str) -> VisionResult<()> {
    if !(width.is_finite() && height.is_finite() && width > 0.0 && height > 0.0) {
        return Err(VisionError::invalid_dimensions(format!(
            "{what} must be > 0, got {width}x{height}"
        )));
    }
    Ok(())
}

/// Rescales boxes from one image size to another.
///
/// Fields 0 and 2 are horizontal in every format and scale by
/// `to_width / from_width`; fields 1 and 3 scale by `to_height / from_height`.
/// With `clip` the result is clamped to the target image (no box is dropped).
pub fn scale_boxes(
    boxes: &[BoxCoords],
    from: (f32, f32),
    to: (f32, f32),
    format: BoxFormat,
    clip: bool,
) -> VisionResult<Vec<BoxCoords>> {
    validate_extent(from.0, from.1, "source size")?;
    validate_extent(to.0, to.1, "target size")?;
    let (sx, sy) = (to.0 / from.0, to.1 / from.1);
    Ok(boxes
        .iter()
        .map(|b| {
            let scaled = [b[0] * sx, b[1] * sy, b[2] * sx, b[3] * sy];
            if clip {
                clip_box(scaled, to.0, to.1, format)
            } else {
                scaled
            }
        })
        .collect())
}

/// Clamps one box to `[0, width] x [0, height]`, preserving its format.
pub fn clip_box(b: BoxCoords, width: f32, height: f32, format: BoxFormat) -> BoxCoords {
    let c = to_xyxy(b, format);
    from_xyxy(
        [
            c[0].clamp(0.0, width),
            c[1].clamp(0.0, height),
            c[2].clamp(0.0, width),
            c[3].clamp(0.0, height),
        ],
        format,
    )
}

/// Boxes remaining after clipping.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClipResult {
    /// Clipped boxes, in input order.
    pub boxes: Vec<BoxCoords>,
    /// Number of boxes dropped for having no area after clipping.
    pub removed_count: usize,
}

/// Clips boxes to an image, optionally dropping those left without area.
pub fn clip_boxes(
    boxes: &[BoxCoords],
    width: f32,
    height: f32,
    format: BoxFormat,
    remove_empty: bool,
) -> VisionResult<ClipResult> {
    validate_extent(width, height, "clip size")?;
    let mut kept = Vec::with_capacity(boxes.len());
    let mut removed_count = 0;
    for &b in boxes {
        let clipped = clip_box(b, width, height, format);
        let (w, h) = extent(&to_xyxy(clipped, format));
        if remove_empty && (w <= 0.0 || h <= 0.0) {
            removed_count += 1;
            continue;
        }
        kept.push(clipped);
    }
    Ok(ClipResult {
        boxes: kept,
        removed_count,
    })
}
