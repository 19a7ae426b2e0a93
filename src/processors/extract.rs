//! Channel and patch extraction, multi-crops, and tensor-to-image conversion.

use serde::{Deserialize, Serialize};

use crate::core::errors::{VisionError, VisionResult};
use crate::core::validation::{validate_data_length, validate_image_dimensions};
use crate::processors::buffer::PixelBuffer;
use crate::processors::layout::convert_layout;
use crate::processors::normalization::Normalizer;
use crate::processors::types::DataLayout;

/// A rectangular region in pixel coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Region {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

impl Region {
    pub fn new(x: u32, y: u32, width: u32, height: u32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    /// Whether the region lies fully inside a `width x height` image.
    pub fn fits(&self, width: u32, height: u32) -> bool {
        self.x as u64 + self.width as u64 <= width as u64
            && self.y as u64 + self.height as u64 <= height as u64
    }
}

/// Geometry of a flat image tensor with an arbitrary channel count.
#[derive(Debug, Clone, Copy)]
struct Dims {
    width: usize,
    height: usize,
    channels: usize,
    channel_last: bool,
}

impl Dims {
    fn new<T>(
        data: &[T],
        width: u32,
        height: u32,
        channels: usize,
        layout: DataLayout,
    ) -> VisionResult<Self> {
        validate_image_dimensions(width, height, "image tensor")?;
        if channels == 0 {
            return Err(VisionError::invalid_dimensions("channels must be > 0"));
        }
        if layout.is_batched() {
            return Err(VisionError::invalid_input(format!(
                "expected a single-image layout, got {layout}"
            )));
        }
        validate_data_length(data.len(), width, height, channels)?;
        Ok(Self {
            width: width as usize,
            height: height as usize,
            channels,
            channel_last: layout.is_channel_last(),
        })
    }

    #[inline]
    fn index(&self, x: usize, y: usize, c: usize) -> usize {
        if self.channel_last {
            (y * self.width + x) * self.channels + c
        } else {
            c * self.width * self.height + y * self.width + x
        }
    }
}

/// Extracts one channel plane (`width * height` values, row-major).
///
/// # Errors
///
/// `ChannelOutOfRange` when `index >= channels`; `InvalidDimensions` when the
/// data length does not match the geometry.
pub fn extract_channel<T: Copy>(
    data: &[T],
    width: u32,
    height: u32,
    channels: usize,
    index: usize,
    layout: DataLayout,
) -> VisionResult<Vec<T>> {
    let dims = Dims::new(data, width, height, channels, layout)?;
    if index >= channels {
        return Err(VisionError::ChannelOutOfRange { index, channels });
    }
    if !dims.channel_last {
        let plane = dims.width * dims.height;
        return Ok(data[index * plane..(index + 1) * plane].to_vec());
    }
    Ok(data.iter().skip(index).step_by(channels).copied().collect())
}

/// Copies a rectangular patch, keeping the input layout.
///
/// # Errors
///
/// `InvalidRoi` for an empty region; `PatchOutOfBounds` when the region
/// extends past the image.
pub fn extract_patch<T: Copy>(
    data: &[T],
    width: u32,
    height: u32,
    channels: usize,
    region: Region,
    layout: DataLayout,
) -> VisionResult<Vec<T>> {
    let dims = Dims::new(data, width, height, channels, layout)?;
    if region.width == 0 || region.height == 0 {
        return Err(VisionError::invalid_roi(format!(
            "patch must have a positive size, got {}x{}",
            region.width, region.height
        )));
    }
    if !region.fits(width, height) {
        return Err(VisionError::PatchOutOfBounds {
            x: region.x,
            y: region.y,
            width: region.width,
            height: region.height,
            image_width: width,
            image_height: height,
        });
    }

    let (x0, y0) = (region.x as usize, region.y as usize);
    let (pw, ph) = (region.width as usize, region.height as usize);
    let mut out = Vec::with_capacity(pw * ph * channels);
    if dims.channel_last {
        for y in y0..y0 + ph {
            let start = dims.index(x0, y, 0);
            out.extend_from_slice(&data[start..start + pw * channels]);
        }
    } else {
        for c in 0..channels {
            for y in y0..y0 + ph {
                let start = dims.index(x0, y, c);
                out.extend_from_slice(&data[start..start + pw]);
            }
        }
    }
    Ok(out)
}

/// Crops a pixel buffer to `region`.
pub fn crop_region<T: Copy>(buffer: &PixelBuffer<T>, region: Region) -> VisionResult<PixelBuffer<T>> {
    let data = extract_patch(
        &buffer.data,
        buffer.width,
        buffer.height,
        buffer.channels,
        region,
        buffer.layout,
    )?;
    Ok(PixelBuffer::from_parts(
        region.width,
        region.height,
        buffer.color_format,
        buffer.layout,
        data,
    ))
}

/// Mirrors a buffer left to right.
pub fn flip_horizontal<T: Copy>(buffer: &PixelBuffer<T>) -> PixelBuffer<T> {
    let (w, h) = (buffer.width, buffer.height);
    let mut data = Vec::with_capacity(buffer.data.len());
    for y in 0..h {
        for x in (0..w).rev() {
            data.extend((0..buffer.channels).map(|c| buffer.at(x, y, c)));
        }
    }
    let flipped = PixelBuffer::from_parts(w, h, buffer.color_format, DataLayout::Hwc, data);
    convert_layout(&flipped, buffer.layout)
}

/// Four corner crops and a centre crop, in the order top-left, top-right,
/// bottom-left, bottom-right, center.
pub fn five_crop<T: Copy>(
    buffer: &PixelBuffer<T>,
    width: u32,
    height: u32,
) -> VisionResult<Vec<PixelBuffer<T>>> {
    validate_image_dimensions(width, height, "crop size")?;
    if width > buffer.width || height > buffer.height {
        return Err(VisionError::invalid_dimensions(format!(
            "crop {width}x{height} is larger than the image {}x{}",
            buffer.width, buffer.height
        )));
    }
    let (right, bottom) = (buffer.width - width, buffer.height - height);
    [
        (0, 0),
        (right, 0),
        (0, bottom),
        (right, bottom),
        (right / 2, bottom / 2),
    ]
    .into_iter()
    .map(|(x, y)| crop_region(buffer, Region::new(x, y, width, height)))
    .collect()
}

/// [`five_crop`] followed by the horizontal mirror of each of the five crops.
pub fn ten_crop<T: Copy>(
    buffer: &PixelBuffer<T>,
    width: u32,
    height: u32,
) -> VisionResult<Vec<PixelBuffer<T>>> {
    let mut crops = five_crop(buffer, width, height)?;
    let mirrored: Vec<_> = crops.iter().map(flip_horizontal).collect();
    crops.extend(mirrored);
    Ok(crops)
}

/// Turns a normalized float tensor back into an 8-bit HWC image.
pub fn tensor_to_image(
    tensor: &PixelBuffer<f32>,
    normalizer: &Normalizer,
) -> VisionResult<PixelBuffer<u8>> {
    tensor.validate()?;
    Ok(normalizer.invert(tensor)?.to_hwc())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::ErrorCode;
    use crate::processors::normalization::NormalizationSpec;
    use crate::processors::types::ColorFormat;

    /// 3x2 gray image with values 0..6.
    fn gray_3x2() -> PixelBuffer<u8> {
        PixelBuffer::from_parts(3, 2, ColorFormat::Grayscale, DataLayout::Hwc, (0..6).collect())
    }

    #[test]
    fn test_extract_channel_both_layouts() {
        let hwc = [1, 2, 3, 4, 5, 6];
        assert_eq!(
            extract_channel(&hwc, 2, 1, 3, 1, DataLayout::Hwc).unwrap(),
            vec![2, 5]
        );
        let chw = [1, 4, 2, 5, 3, 6];
        assert_eq!(
            extract_channel(&chw, 2, 1, 3, 2, DataLayout::Chw).unwrap(),
            vec![3, 6]
        );
        let err = extract_channel(&hwc, 2, 1, 3, 3, DataLayout::Hwc).unwrap_err();
        assert_eq!(err.code(), ErrorCode::ChannelOutOfRange);
    }

    #[test]
    fn test_extract_patch_bounds() {
        let data: Vec<u8> = (0..6).collect();
        let patch = extract_patch(&data, 3, 2, 1, Region::new(1, 0, 2, 2), DataLayout::Hwc).unwrap();
        assert_eq!(patch, vec![1, 2, 4, 5]);

        let err = extract_patch(&data, 3, 2, 1, Region::new(2, 0, 2, 1), DataLayout::Hwc).unwrap_err();
        assert_eq!(err.code(), ErrorCode::PatchOutOfBounds);
        let err = extract_patch(&data, 3, 2, 1, Region::new(0, 0, 0, 1), DataLayout::Hwc).unwrap_err();
        assert_eq!(err.code(), ErrorCode::InvalidRoi);
    }

    #[test]
    fn test_extract_patch_chw() {
        // 2x2, 2 channels, planar.
        let chw = [0, 1, 2, 3, 10, 11, 12, 13];
        let patch = extract_patch(&chw, 2, 2, 2, Region::new(1, 0, 1, 2), DataLayout::Chw).unwrap();
        assert_eq!(patch, vec![1, 3, 11, 13]);
    }

    #[test]
    fn test_five_crop_positions() {
        let crops = five_crop(&gray_3x2(), 1, 1).unwrap();
        let values: Vec<u8> = crops.iter().map(|c| c.data[0]).collect();
        assert_eq!(values, vec![0, 2, 3, 5, 1]);
        assert!(five_crop(&gray_3x2(), 4, 1).is_err());
    }

    #[test]
    fn test_ten_crop_mirrors() {
        let crops = ten_crop(&gray_3x2(), 2, 1).unwrap();
        assert_eq!(crops.len(), 10);
        assert_eq!(crops[0].data, vec![0, 1]);
        assert_eq!(crops[5].data, vec![1, 0]);
    }

    #[test]
    fn test_flip_horizontal() {
        let flipped = flip_horizontal(&gray_3x2());
        assert_eq!(flipped.data, vec![2, 1, 0, 5, 4, 3]);
    }

    #[test]
    fn test_tensor_to_image_inverts_chw() {
        let img = PixelBuffer::from_parts(
            2,
            1,
            ColorFormat::Rgb,
            DataLayout::Hwc,
            vec![0u8, 64, 128, 192, 255, 7],
        );
        let normalizer = Normalizer::from_spec(&NormalizationSpec::default(), 3).unwrap();
        let tensor = normalizer
            .apply(&convert_layout(&img, DataLayout::Chw))
            .unwrap();
        assert_eq!(tensor_to_image(&tensor, &normalizer).unwrap(), img);
    }
}
