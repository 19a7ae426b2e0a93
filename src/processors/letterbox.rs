//! The invertible record of a letterbox resize.
//!
//! [`compute_letterbox`] decides scale and padding for a source/target pair;
//! the resulting [`LetterboxTransform`] maps boxes into the letterboxed frame
//! and back. Position fields move by `scale` and the padding of their axis;
//! size fields (width/height in `xywh`/`cxcywh`) only scale.

use serde::{Deserialize, Serialize};

use crate::core::errors::VisionResult;
use crate::core::validation::{validate_image_dimensions, validate_positive};
use crate::processors::geometry::{BoxCoords, from_xyxy, to_xyxy};
use crate::processors::types::BoxFormat;

/// Scale and padding applied by a letterbox resize.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LetterboxTransform {
    /// Uniform scale from source to letterboxed pixels.
    pub scale: f32,
    /// Padding on the left edge, in letterboxed pixels.
    pub pad_x: u32,
    /// Padding on the top edge, in letterboxed pixels.
    pub pad_y: u32,
    /// Source image width.
    pub original_width: u32,
    /// Source image height.
    pub original_height: u32,
}

/// Size of the scaled content inside the letterbox canvas.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScaledSize {
    pub width: u32,
    pub height: u32,
}

/// `max(1, round(extent * scale))`, capped at `limit`.
#[inline]
pub(crate) fn scaled_extent(extent: u32, scale: f64, limit: u32) -> u32 {
    ((extent as f64 * scale).round() as u32).clamp(1, limit.max(1))
}

/// Computes the letterbox geometry for fitting `from` into `to`.
///
/// `scale = min(to_w / from_w, to_h / from_h)`, capped at 1.0 unless
/// `scale_up`. Leftover space is split with `floor(total / 2)` on the leading
/// edge when `center`, otherwise it all goes to the trailing edges.
pub fn compute_letterbox(
    from: (u32, u32),
    to: (u32, u32),
    scale_up: bool,
    center: bool,
) -> VisionResult<(LetterboxTransform, ScaledSize)> {
    validate_image_dimensions(from.0, from.1, "letterbox source")?;
    validate_image_dimensions(to.0, to.1, "letterbox target")?;

    let mut scale = (to.0 as f64 / from.0 as f64).min(to.1 as f64 / from.1 as f64);
    if !scale_up {
        scale = scale.min(1.0);
    }
    let size = ScaledSize {
        width: scaled_extent(from.0, scale, to.0),
        height: scaled_extent(from.1, scale, to.1),
    };
    let (pad_x, pad_y) = if center {
        ((to.0 - size.width) / 2, (to.1 - size.height) / 2)
    } else {
        (0, 0)
    };

    Ok((
        LetterboxTransform {
            scale: scale as f32,
            pad_x,
            pad_y,
            original_width: from.0,
            original_height: from.1,
        },
        size,
    ))
}

#[inline]
fn is_size_field(format: BoxFormat, field: usize) -> bool {
    format != BoxFormat::Xyxy && field >= 2
}

/// Maps letterboxed boxes back to source coordinates.
///
/// Positions become `(v - pad) / scale` and sizes `v / scale`. With
/// `clip_to = Some((w, h))` the result is clamped to the source image; with
/// `None` it is only clamped to be non-negative.
pub fn reverse_letterbox_boxes(
    boxes: &[BoxCoords],
    format: BoxFormat,
    scale: f32,
    pad: (f32, f32),
    clip_to: Option<(f32, f32)>,
    clip: bool,
) -> VisionResult<Vec<BoxCoords>> {
    validate_positive(scale, "letterbox scale")?;
    Ok(boxes
        .iter()
        .map(|b| {
            let mut out = [0.0f32; 4];
            for (i, v) in out.iter_mut().enumerate() {
                let pad = if i % 2 == 0 { pad.0 } else { pad.1 };
                *v = if is_size_field(format, i) {
                    b[i] / scale
                } else {
                    (b[i] - pad) / scale
                };
            }
            if clip {
                let (max_x, max_y) = clip_to.unwrap_or((f32::INFINITY, f32::INFINITY));
                let c = to_xyxy(out, format);
                out = from_xyxy(
                    [
                        c[0].clamp(0.0, max_x),
                        c[1].clamp(0.0, max_y),
                        c[2].clamp(0.0, max_x),
                        c[3].clamp(0.0, max_y),
                    ],
                    format,
                );
            }
            out
        })
        .collect())
}

impl LetterboxTransform {
    /// Padding as floats, `(pad_x, pad_y)`.
    pub fn pad(&self) -> (f32, f32) {
        (self.pad_x as f32, self.pad_y as f32)
    }

    /// Maps source-image boxes into the letterboxed frame.
    pub fn forward(&self, boxes: &[BoxCoords], format: BoxFormat) -> Vec<BoxCoords> {
        let (px, py) = self.pad();
        boxes
            .iter()
            .map(|b| {
                let mut out = [0.0f32; 4];
                for (i, v) in out.iter_mut().enumerate() {
                    let pad = if i % 2 == 0 { px } else { py };
                    *v = if is_size_field(format, i) {
                        b[i] * self.scale
                    } else {
                        b[i] * self.scale + pad
                    };
                }
                out
            })
            .collect()
    }

    /// Maps letterboxed boxes back to the source image, optionally clipping to it.
    pub fn inverse(
        &self,
        boxes: &[BoxCoords],
        format: BoxFormat,
        clip: bool,
    ) -> VisionResult<Vec<BoxCoords>> {
        reverse_letterbox_boxes(
            boxes,
            format,
            self.scale,
            self.pad(),
            Some((self.original_width as f32, self.original_height as f32)),
            clip,
        )
    }
}
