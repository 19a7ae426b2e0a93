//! Pixel buffers flowing between pipeline stages.
//!
//! A [`PixelBuffer`] is produced by the decode step and then consumed and
//! replaced by each stage; stages borrow their input and return a new owned
//! buffer, so intermediate results stay valid for inspection and testing.

use serde::{Deserialize, Serialize};

use crate::core::errors::{VisionError, VisionResult};
use crate::core::validation::{validate_data_length, validate_image_dimensions};
use crate::processors::types::{ColorFormat, DataLayout, PixelFormat, Rotation};

/// A single image stored as a flat sequence in HWC or CHW order.
///
/// Invariant: `data.len() == width * height * channels` and
/// `channels == color_format.channels()`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PixelBuffer<T = u8> {
    /// Image width in pixels.
    pub width: u32,
    /// Image height in pixels.
    pub height: u32,
    /// Number of channels per pixel.
    pub channels: usize,
    /// Colour interpretation of the channels.
    pub color_format: ColorFormat,
    /// Axis order of `data` (HWC or CHW).
    pub layout: DataLayout,
    /// Flat element storage.
    pub data: Vec<T>,
}

impl<T: Copy> PixelBuffer<T> {
    /// Creates a buffer, validating dimensions, layout and data length.
    pub fn new(
        width: u32,
        height: u32,
        color_format: ColorFormat,
        layout: DataLayout,
        data: Vec<T>,
    ) -> VisionResult<Self> {
        validate_image_dimensions(width, height, "pixel buffer")?;
        if layout.is_batched() {
            return Err(VisionError::invalid_input(format!(
                "a pixel buffer holds a single image, got batched layout {layout}"
            )));
        }
        let channels = color_format.channels();
        validate_data_length(data.len(), width, height, channels)?;
        Ok(Self::from_parts(width, height, color_format, layout, data))
    }

    /// Assembles a buffer whose invariants the caller already guarantees.
    pub(crate) fn from_parts(
        width: u32,
        height: u32,
        color_format: ColorFormat,
        layout: DataLayout,
        data: Vec<T>,
    ) -> Self {
        debug_assert_eq!(
            data.len(),
            width as usize * height as usize * color_format.channels()
        );
        Self {
            width,
            height,
            channels: color_format.channels(),
            color_format,
            layout,
            data,
        }
    }

    /// Checks the invariants of a buffer that arrived through deserialization.
    pub fn validate(&self) -> VisionResult<()> {
        validate_image_dimensions(self.width, self.height, "pixel buffer")?;
        if self.layout.is_batched() {
            return Err(VisionError::invalid_input(format!(
                "a pixel buffer holds a single image, got batched layout {}",
                self.layout
            )));
        }
        if self.channels != self.color_format.channels() {
            return Err(VisionError::invalid_dimensions(format!(
                "{} buffers have {} channels, got {}",
                self.color_format,
                self.color_format.channels(),
                self.channels
            )));
        }
        validate_data_length(self.data.len(), self.width, self.height, self.channels)
    }

    /// Tensor shape of this buffer in its own layout.
    pub fn shape(&self) -> Vec<usize> {
        let (h, w, c) = (self.height as usize, self.width as usize, self.channels);
        if self.layout.is_channel_last() {
            vec![h, w, c]
        } else {
            vec![c, h, w]
        }
    }

    /// Number of pixels.
    pub fn pixel_count(&self) -> usize {
        self.width as usize * self.height as usize
    }

    /// Flat index of channel `c` of pixel `(x, y)`.
    #[inline]
    pub fn index_of(&self, x: u32, y: u32, c: usize) -> usize {
        let (x, y, w) = (x as usize, y as usize, self.width as usize);
        if self.layout.is_channel_last() {
            (y * w + x) * self.channels + c
        } else {
            c * self.pixel_count() + y * w + x
        }
    }

    /// Value of channel `c` of pixel `(x, y)`.
    #[inline]
    pub fn at(&self, x: u32, y: u32, c: usize) -> T {
        self.data[self.index_of(x, y, c)]
    }

    /// Returns an HWC copy, or a clone when already HWC.
    pub fn to_hwc(&self) -> Self {
        crate::processors::layout::convert_layout(self, DataLayout::Hwc)
    }
}

impl PixelBuffer<u8> {
    /// Creates a buffer of the given size filled with a constant colour.
    ///
    /// `fill` is cycled over the channels, so a single value paints every channel.
    pub fn filled(width: u32, height: u32, color_format: ColorFormat, fill: &[u8]) -> Self {
        let channels = color_format.channels();
        let pixel: Vec<u8> = (0..channels)
            .map(|c| fill.get(c % fill.len().max(1)).copied().unwrap_or(0))
            .collect();
        let data = pixel
            .iter()
            .copied()
            .cycle()
            .take(width as usize * height as usize * channels)
            .collect();
        Self::from_parts(width, height, color_format, DataLayout::Hwc, data)
    }
}

/// A raw, format-tagged frame handed over by the camera or decoder.
#[derive(Debug, Clone, Copy)]
pub struct RawFrame<'a> {
    /// Frame bytes, including any row padding.
    pub data: &'a [u8],
    /// Width in pixels.
    pub width: u32,
    /// Height in pixels.
    pub height: u32,
    /// Stride of the first plane in bytes; may exceed `width * bytes_per_pixel`.
    pub bytes_per_row: usize,
    /// Pixel layout of `data`.
    pub format: PixelFormat,
    /// Sensor orientation to undo while converting.
    pub rotation: Rotation,
}

impl<'a> RawFrame<'a> {
    /// Creates a tightly packed, upright frame.
    pub fn new(data: &'a [u8], width: u32, height: u32, format: PixelFormat) -> Self {
        Self {
            data,
            width,
            height,
            bytes_per_row: format.min_bytes_per_row(width),
            format,
            rotation: Rotation::Deg0,
        }
    }

    /// Sets the row stride in bytes.
    pub fn with_bytes_per_row(mut self, bytes_per_row: usize) -> Self {
        self.bytes_per_row = bytes_per_row;
        self
    }

    /// Sets the rotation applied during conversion.
    pub fn with_rotation(mut self, rotation: Rotation) -> Self {
        self.rotation = rotation;
        self
    }
}
