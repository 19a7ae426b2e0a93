//! Buffer-level operations: decoding, resizing, normalization and crops.

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::core::config::ConfigValidator;
use crate::core::errors::{VisionError, VisionResult};
use crate::core::validation::validate_positive_dimension;
use crate::processors::buffer::{PixelBuffer, RawFrame};
use crate::processors::extract::{self, Region};
use crate::processors::letterbox::LetterboxTransform;
use crate::processors::normalization::{NormalizationSpec, Normalizer};
use crate::processors::pixel_format;
use crate::processors::resize::{self, DEFAULT_LETTERBOX_COLOR, DEFAULT_PAD_COLOR, ResizeSpec};
use crate::processors::types::{
    CropMode, DataLayout, Interpolation, PixelFormat, ResizeStrategy, Rotation,
};

/// Raw frame description as sent by the camera collaborator.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FrameOptions {
    pub width: i64,
    pub height: i64,
    /// Pixel format name; unknown names fail with `UNSUPPORTED_FORMAT`.
    pub format: String,
    /// Row stride of the first plane; defaults to a tightly packed row.
    #[serde(default)]
    pub bytes_per_row: Option<usize>,
    /// Clockwise rotation in degrees.
    #[serde(default)]
    pub rotation: Option<Rotation>,
    /// Camera orientation index `0..=3`, an alternative to `rotation`.
    #[serde(default)]
    pub orientation: Option<u8>,
}

impl FrameOptions {
    pub fn new(width: i64, height: i64, format: impl Into<String>) -> Self {
        Self {
            width,
            height,
            format: format.into(),
            ..Default::default()
        }
    }

    pub fn with_bytes_per_row(mut self, bytes_per_row: usize) -> Self {
        self.bytes_per_row = Some(bytes_per_row);
        self
    }

    pub fn with_rotation(mut self, rotation: Rotation) -> Self {
        self.rotation = Some(rotation);
        self
    }

    /// Resolved rotation; an explicit `rotation` wins over `orientation`.
    pub fn resolved_rotation(&self) -> VisionResult<Rotation> {
        match (self.rotation, self.orientation) {
            (Some(rotation), _) => Ok(rotation),
            (None, Some(orientation)) => Rotation::from_orientation(orientation),
            (None, None) => Ok(Rotation::Deg0),
        }
    }

    /// Binds the options to `data`, resolving every default.
    pub fn bind<'a>(&self, data: &'a [u8]) -> VisionResult<RawFrame<'a>> {
        let width = validate_positive_dimension(self.width, "width")?;
        let height = validate_positive_dimension(self.height, "height")?;
        let format: PixelFormat = self.format.parse()?;
        let mut frame =
            RawFrame::new(data, width, height, format).with_rotation(self.resolved_rotation()?);
        if let Some(bytes_per_row) = self.bytes_per_row {
            frame = frame.with_bytes_per_row(bytes_per_row);
        }
        Ok(frame)
    }
}

/// Decodes a raw frame into an RGB (or gray) HWC buffer, rotation applied.
pub fn convert_pixels(data: &[u8], options: &FrameOptions) -> VisionResult<PixelBuffer<u8>> {
    let frame = options.bind(data)?;
    pixel_format::convert_frame(&frame)
}

/// Sparse resize options.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResizeOptions {
    pub width: i64,
    pub height: i64,
    #[serde(default)]
    pub strategy: Option<ResizeStrategy>,
    #[serde(default)]
    pub pad_color: Option<[u8; 3]>,
    #[serde(default)]
    pub letterbox_color: Option<[u8; 3]>,
    #[serde(default)]
    pub scale_up: Option<bool>,
    #[serde(default)]
    pub center: Option<bool>,
    #[serde(default)]
    pub crop_mode: Option<CropMode>,
    #[serde(default)]
    pub interpolation: Option<Interpolation>,
}

impl ResizeOptions {
    pub fn new(width: i64, height: i64) -> Self {
        Self {
            width,
            height,
            ..Default::default()
        }
    }

    pub fn with_strategy(mut self, strategy: ResizeStrategy) -> Self {
        self.strategy = Some(strategy);
        self
    }

    /// Fills in defaults and validates the result.
    pub fn resolve(&self) -> VisionResult<ResizeSpec> {
        let width = validate_positive_dimension(self.width, "width")?;
        let height = validate_positive_dimension(self.height, "height")?;
        ResizeSpec {
            width,
            height,
            strategy: self.strategy.unwrap_or_default(),
            pad_color: self.pad_color.unwrap_or(DEFAULT_PAD_COLOR),
            letterbox_color: self.letterbox_color.unwrap_or(DEFAULT_LETTERBOX_COLOR),
            scale_up: self.scale_up.unwrap_or(true),
            center: self.center.unwrap_or(true),
            crop_mode: self.crop_mode.unwrap_or_default(),
            interpolation: self.interpolation.unwrap_or_default(),
        }
        .validated()
    }
}

/// Output of [`resize`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResizeResponse {
    pub buffer: PixelBuffer<u8>,
    /// Present for the `letterbox` strategy.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub transform: Option<LetterboxTransform>,
}

pub fn resize(buffer: &PixelBuffer<u8>, options: &ResizeOptions) -> VisionResult<ResizeResponse> {
    let spec = options.resolve()?;
    let outcome = resize::resize(buffer, &spec)?;
    Ok(ResizeResponse {
        buffer: outcome.buffer,
        transform: outcome.transform,
    })
}

/// Normalizes an 8-bit buffer into floats.
pub fn normalize(
    buffer: &PixelBuffer<u8>,
    options: &NormalizationSpec,
) -> VisionResult<PixelBuffer<f32>> {
    buffer.validate()?;
    let normalizer = Normalizer::from_spec(options, buffer.channels)?;
    normalizer.apply(buffer)
}

/// Sparse letterbox options.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LetterboxOptions {
    pub target_width: i64,
    pub target_height: i64,
    /// Defaults to `[114, 114, 114]`.
    #[serde(default)]
    pub fill_color: Option<[u8; 3]>,
    /// Defaults to `true`.
    #[serde(default)]
    pub scale_up: Option<bool>,
    /// Defaults to `true`.
    #[serde(default)]
    pub center: Option<bool>,
    #[serde(default)]
    pub interpolation: Option<Interpolation>,
}

impl LetterboxOptions {
    pub fn new(target_width: i64, target_height: i64) -> Self {
        Self {
            target_width,
            target_height,
            ..Default::default()
        }
    }

    pub fn with_scale_up(mut self, scale_up: bool) -> Self {
        self.scale_up = Some(scale_up);
        self
    }
}

/// Letterboxed buffer plus the transform needed to undo it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LetterboxResponse {
    pub buffer: PixelBuffer<u8>,
    #[serde(flatten)]
    pub transform: LetterboxTransform,
}

pub fn letterbox(
    buffer: &PixelBuffer<u8>,
    options: &LetterboxOptions,
) -> VisionResult<LetterboxResponse> {
    let width = validate_positive_dimension(options.target_width, "targetWidth")?;
    let height = validate_positive_dimension(options.target_height, "targetHeight")?;
    let fill = options.fill_color.unwrap_or(DEFAULT_LETTERBOX_COLOR);
    let (buffer, transform) = resize::letterbox(
        buffer,
        width,
        height,
        &fill,
        options.scale_up.unwrap_or(true),
        options.center.unwrap_or(true),
        options.interpolation.unwrap_or_default(),
    )?;
    debug!(
        scale = transform.scale,
        pad_x = transform.pad_x,
        pad_y = transform.pad_y,
        "letterboxed buffer"
    );
    Ok(LetterboxResponse { buffer, transform })
}

pub fn to_grayscale(buffer: &PixelBuffer<u8>) -> VisionResult<PixelBuffer<u8>> {
    buffer.validate()?;
    Ok(pixel_format::to_grayscale(buffer))
}

/// Geometry of a flat tensor passed alongside its data.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TensorGeometry {
    pub width: i64,
    pub height: i64,
    pub channels: usize,
    #[serde(default)]
    pub layout: Option<DataLayout>,
}

impl TensorGeometry {
    pub fn new(width: i64, height: i64, channels: usize) -> Self {
        Self {
            width,
            height,
            channels,
            layout: None,
        }
    }

    pub fn with_layout(mut self, layout: DataLayout) -> Self {
        self.layout = Some(layout);
        self
    }

    fn resolve(&self) -> VisionResult<(u32, u32, DataLayout)> {
        Ok((
            validate_positive_dimension(self.width, "width")?,
            validate_positive_dimension(self.height, "height")?,
            self.layout.unwrap_or_default(),
        ))
    }
}

/// Extracts one channel plane from a flat tensor.
pub fn extract_channel<T: Copy>(
    data: &[T],
    geometry: &TensorGeometry,
    channel: usize,
) -> VisionResult<Vec<T>> {
    let (width, height, layout) = geometry.resolve()?;
    extract::extract_channel(data, width, height, geometry.channels, channel, layout)
}

/// Copies a rectangular patch out of a flat tensor, keeping its layout.
pub fn extract_patch<T: Copy>(
    data: &[T],
    geometry: &TensorGeometry,
    region: Region,
) -> VisionResult<Vec<T>> {
    let (width, height, layout) = geometry.resolve()?;
    extract::extract_patch(data, width, height, geometry.channels, region, layout)
}

fn crop_size(width: i64, height: i64) -> VisionResult<(u32, u32)> {
    Ok((
        validate_positive_dimension(width, "width")?,
        validate_positive_dimension(height, "height")?,
    ))
}

/// Corner and centre crops of `width x height`.
pub fn five_crop(
    buffer: &PixelBuffer<u8>,
    width: i64,
    height: i64,
) -> VisionResult<Vec<PixelBuffer<u8>>> {
    buffer.validate()?;
    let (w, h) = crop_size(width, height)?;
    extract::five_crop(buffer, w, h)
}

/// [`five_crop`] plus the horizontal mirror of each crop.
pub fn ten_crop(
    buffer: &PixelBuffer<u8>,
    width: i64,
    height: i64,
) -> VisionResult<Vec<PixelBuffer<u8>>> {
    buffer.validate()?;
    let (w, h) = crop_size(width, height)?;
    extract::ten_crop(buffer, w, h)
}

/// Undoes normalization, producing an 8-bit HWC image.
pub fn tensor_to_image(
    tensor: &PixelBuffer<f32>,
    normalization: &NormalizationSpec,
) -> VisionResult<PixelBuffer<u8>> {
    tensor.validate()?;
    let normalizer = Normalizer::from_spec(normalization, tensor.channels)?;
    extract::tensor_to_image(tensor, &normalizer)
}

/// Rejects a region that does not fit a `width x height` source.
pub(crate) fn check_roi(region: &Region, width: u32, height: u32) -> VisionResult<()> {
    if region.width == 0 || region.height == 0 || !region.fits(width, height) {
        return Err(VisionError::invalid_roi(format!(
            "region ({}, {}, {}x{}) is outside the {width}x{height} source",
            region.x, region.y, region.width, region.height
        )));
    }
    Ok(())
}
