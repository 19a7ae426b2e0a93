//! Fitting images into a model's input size.
//!
//! Four strategies are supported:
//! - `stretch` scales each axis independently to the exact target.
//! - `cover` scales uniformly to fill the target and crops the overflow.
//! - `contain` scales uniformly to fit and pads the remainder.
//! - `letterbox` is `contain` with a gray fill, the `scale_up` cap and an
//!   invertible [`LetterboxTransform`].

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::core::config::ConfigValidator;
use crate::core::errors::VisionResult;
use crate::core::validation::validate_image_dimensions;
use crate::processors::buffer::PixelBuffer;
use crate::processors::extract::{Region, crop_region};
use crate::processors::layout::convert_layout;
use crate::processors::letterbox::{LetterboxTransform, compute_letterbox, scaled_extent};
use crate::processors::pixel_format::resize_with;
use crate::processors::types::{CropMode, DataLayout, Interpolation, ResizeStrategy};

/// Default fill for `contain`.
pub const DEFAULT_PAD_COLOR: [u8; 3] = [0, 0, 0];
/// Default fill for `letterbox`.
pub const DEFAULT_LETTERBOX_COLOR: [u8; 3] = [114, 114, 114];

/// Fully resolved resize parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResizeSpec {
    pub width: u32,
    pub height: u32,
    pub strategy: ResizeStrategy,
    pub pad_color: [u8; 3],
    pub letterbox_color: [u8; 3],
    /// Letterbox only: allow scales above 1.0.
    pub scale_up: bool,
    /// Split padding across both edges instead of putting it all at the end.
    pub center: bool,
    /// Anchor for `cover` crops.
    pub crop_mode: CropMode,
    pub interpolation: Interpolation,
}

impl ResizeSpec {
    /// A `stretch` spec with every other field at its default.
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            strategy: ResizeStrategy::default(),
            pad_color: DEFAULT_PAD_COLOR,
            letterbox_color: DEFAULT_LETTERBOX_COLOR,
            scale_up: true,
            center: true,
            crop_mode: CropMode::default(),
            interpolation: Interpolation::default(),
        }
    }

    pub fn with_strategy(mut self, strategy: ResizeStrategy) -> Self {
        self.strategy = strategy;
        self
    }

    pub fn with_scale_up(mut self, scale_up: bool) -> Self {
        self.scale_up = scale_up;
        self
    }

    pub fn with_center(mut self, center: bool) -> Self {
        self.center = center;
        self
    }

    pub fn with_crop_mode(mut self, crop_mode: CropMode) -> Self {
        self.crop_mode = crop_mode;
        self
    }

    pub fn with_interpolation(mut self, interpolation: Interpolation) -> Self {
        self.interpolation = interpolation;
        self
    }
}

impl ConfigValidator for ResizeSpec {
    fn validate(&self) -> VisionResult<()> {
        validate_image_dimensions(self.width, self.height, "resize target")
    }
}

/// A resized buffer and, for `letterbox`, the transform that produced it.
#[derive(Debug, Clone, PartialEq)]
pub struct ResizeOutcome {
    pub buffer: PixelBuffer<u8>,
    pub transform: Option<LetterboxTransform>,
}

/// Resizes a buffer according to `spec`.
pub fn resize(buffer: &PixelBuffer<u8>, spec: &ResizeSpec) -> VisionResult<ResizeOutcome> {
    spec.validate()?;
    buffer.validate()?;
    let (to_w, to_h) = (spec.width, spec.height);

    let outcome = match spec.strategy {
        ResizeStrategy::Stretch => ResizeOutcome {
            buffer: resize_with(buffer, to_w, to_h, spec.interpolation)?,
            transform: None,
        },
        ResizeStrategy::Cover => {
            let scale = (to_w as f64 / buffer.width as f64).max(to_h as f64 / buffer.height as f64);
            let scaled_w = scaled_extent(buffer.width, scale, u32::MAX).max(to_w);
            let scaled_h = scaled_extent(buffer.height, scale, u32::MAX).max(to_h);
            let scaled = resize_with(buffer, scaled_w, scaled_h, spec.interpolation)?;
            let region = Region::new(
                spec.crop_mode.axis_offset(scaled_w, to_w, true),
                spec.crop_mode.axis_offset(scaled_h, to_h, false),
                to_w,
                to_h,
            );
            ResizeOutcome {
                buffer: crop_region(&scaled, region)?,
                transform: None,
            }
        }
        ResizeStrategy::Contain => {
            let (transform, size) =
                compute_letterbox((buffer.width, buffer.height), (to_w, to_h), true, spec.center)?;
            let content = resize_with(buffer, size.width, size.height, spec.interpolation)?;
            ResizeOutcome {
                buffer: pad_to(&content, to_w, to_h, transform.pad_x, transform.pad_y, &spec.pad_color),
                transform: None,
            }
        }
        ResizeStrategy::Letterbox => {
            let (buffer, transform) = letterbox(
                buffer,
                to_w,
                to_h,
                &spec.letterbox_color,
                spec.scale_up,
                spec.center,
                spec.interpolation,
            )?;
            ResizeOutcome {
                buffer,
                transform: Some(transform),
            }
        }
    };

    debug!(
        strategy = %spec.strategy,
        from_width = buffer.width,
        from_height = buffer.height,
        to_width = to_w,
        to_height = to_h,
        "resized buffer"
    );
    Ok(outcome)
}

/// Letterboxes a buffer into `width x height`, returning the inverse record.
pub fn letterbox(
    buffer: &PixelBuffer<u8>,
    width: u32,
    height: u32,
    fill: &[u8],
    scale_up: bool,
    center: bool,
    interpolation: Interpolation,
) -> VisionResult<(PixelBuffer<u8>, LetterboxTransform)> {
    buffer.validate()?;
    let (transform, size) =
        compute_letterbox((buffer.width, buffer.height), (width, height), scale_up, center)?;
    let content = resize_with(buffer, size.width, size.height, interpolation)?;
    let padded = pad_to(&content, width, height, transform.pad_x, transform.pad_y, fill);
    Ok((padded, transform))
}

/// Places `content` on a `width x height` canvas of `fill` at `(left, top)`.
///
/// `fill` is cycled over the channels, so a grayscale buffer takes its first
/// entry. The canvas keeps the content's layout. Content reaching past the
/// canvas edge is cut off.
pub fn pad_to(
    content: &PixelBuffer<u8>,
    width: u32,
    height: u32,
    left: u32,
    top: u32,
    fill: &[u8],
) -> PixelBuffer<u8> {
    let mut canvas = PixelBuffer::filled(width, height, content.color_format, fill);
    let src = content.to_hwc();
    let channels = src.channels;
    let copy_w = content.width.min(width.saturating_sub(left)) as usize;
    let copy_h = content.height.min(height.saturating_sub(top));
    for y in 0..copy_h {
        let src_start = src.index_of(0, y, 0);
        let dst_start = canvas.index_of(left, top + y, 0);
        canvas.data[dst_start..dst_start + copy_w * channels]
            .copy_from_slice(&src.data[src_start..src_start + copy_w * channels]);
    }
    if content.layout == DataLayout::Hwc {
        canvas
    } else {
        convert_layout(&canvas, content.layout)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::processors::types::ColorFormat;

    fn gradient(width: u32, height: u32) -> PixelBuffer<u8> {
        let data = (0..width * height).map(|i| (i % 256) as u8).collect();
        PixelBuffer::from_parts(width, height, ColorFormat::Grayscale, DataLayout::Hwc, data)
    }

    #[test]
    fn test_stretch_exact_size() {
        let out = resize(&gradient(8, 4), &ResizeSpec::new(3, 5)).unwrap();
        assert_eq!((out.buffer.width, out.buffer.height), (3, 5));
        assert!(out.transform.is_none());
    }

    #[test]
    fn test_cover_crops_center() {
        // 4x2 -> 2x2: scale 1, crop columns 1..3.
        let spec = ResizeSpec::new(2, 2).with_strategy(ResizeStrategy::Cover);
        let out = resize(&gradient(4, 2), &spec).unwrap();
        assert_eq!(out.buffer.data, vec![1, 2, 5, 6]);

        let spec = spec.with_crop_mode(CropMode::TopRight);
        let out = resize(&gradient(4, 2), &spec).unwrap();
        assert_eq!(out.buffer.data, vec![2, 3, 6, 7]);
    }

    #[test]
    fn test_contain_pads_with_black() {
        let img = PixelBuffer::filled(4, 2, ColorFormat::Rgb, &[200]);
        let spec = ResizeSpec::new(4, 4).with_strategy(ResizeStrategy::Contain);
        let out = resize(&img, &spec).unwrap();
        assert_eq!((out.buffer.width, out.buffer.height), (4, 4));
        assert!(out.transform.is_none());
        // Row 0 is padding, rows 1..3 hold the content.
        assert_eq!(out.buffer.at(0, 0, 0), 0);
        assert_eq!(out.buffer.at(0, 1, 0), 200);
        assert_eq!(out.buffer.at(3, 2, 2), 200);
        assert_eq!(out.buffer.at(3, 3, 1), 0);
    }

    #[test]
    fn test_letterbox_emits_transform_and_gray_fill() {
        let img = PixelBuffer::filled(1920, 1080, ColorFormat::Rgb, &[10]);
        let spec = ResizeSpec::new(640, 640)
            .with_strategy(ResizeStrategy::Letterbox)
            .with_scale_up(false);
        let out = resize(&img, &spec).unwrap();
        let t = out.transform.unwrap();
        assert_eq!((t.pad_x, t.pad_y), (0, 140));
        assert_eq!(out.buffer.at(320, 139, 0), 114);
        assert_eq!(out.buffer.at(320, 140, 0), 10);
        assert_eq!(out.buffer.at(320, 499, 0), 10);
        assert_eq!(out.buffer.at(320, 500, 0), 114);
    }

    #[test]
    fn test_letterbox_uncentered_pads_trailing() {
        let img = PixelBuffer::filled(4, 2, ColorFormat::Grayscale, &[9]);
        let (out, t) = letterbox(&img, 4, 4, &[114], true, false, Interpolation::Nearest).unwrap();
        assert_eq!(t.pad_y, 0);
        assert_eq!(out.data, vec![9, 9, 9, 9, 9, 9, 9, 9, 114, 114, 114, 114, 114, 114, 114, 114]);
    }

    #[test]
    fn test_pad_to_keeps_chw_layout() {
        let img = convert_layout(&PixelBuffer::filled(1, 1, ColorFormat::Rgb, &[1, 2, 3]), DataLayout::Chw);
        let padded = pad_to(&img, 2, 1, 1, 0, &[0]);
        assert_eq!(padded.layout, DataLayout::Chw);
        assert_eq!(padded.data, vec![0, 1, 0, 2, 0, 3]);
    }


    #[test]
    fn test_invalid_target() {
        assert!(resize(&gradient(2, 2), &ResizeSpec::new(0, 2)).is_err());
    }
}
