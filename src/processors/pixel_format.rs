//! Raw frame decoding and pixel-level transforms.
//!
//! Camera frames arrive as planar or semi-planar YUV, packed YUYV, or packed
//! 8-bit RGB variants, with a row stride that may exceed the visible width.
//! [`convert_frame`] turns any of them into a tightly packed HWC RGB buffer and
//! applies the sensor rotation. The remaining functions here are the small,
//! format-agnostic pixel transforms the pipeline needs afterwards.

use image::{GrayImage, RgbImage, imageops, imageops::FilterType};
use rayon::prelude::*;
use tracing::debug;

use crate::core::errors::{VisionError, VisionResult};
use crate::core::validation::validate_image_dimensions;
use crate::processors::buffer::{PixelBuffer, RawFrame};
use crate::processors::layout::convert_layout;
use crate::processors::types::{ColorFormat, DataLayout, Interpolation, PixelFormat, Rotation};

#[inline(always)]
fn clamp_u8(value: i32) -> u8 {
    value.clamp(0, 255) as u8
}

/// BT.601 integer approximation. `u` and `v` are raw samples (biased by 128).
///
/// Integer division truncates toward zero.
#[inline(always)]
pub fn yuv_to_rgb(y: u8, u: u8, v: u8) -> [u8; 3] {
    let y = y as i32;
    let u = u as i32 - 128;
    let v = v as i32 - 128;
    [
        clamp_u8(y + (351 * v) / 256),
        clamp_u8(y - (86 * u + 179 * v) / 256),
        clamp_u8(y + (444 * u) / 256),
    ]
}

/// Checked `a * b` for buffer geometry.
fn mul(a: usize, b: usize) -> VisionResult<usize> {
    a.checked_mul(b)
        .ok_or_else(|| VisionError::invalid_dimensions(format!("frame size overflow ({a} * {b})")))
}

/// Fills an HWC buffer of `N` channels row by row, in parallel.
fn fill_rows<const N: usize, F>(width: usize, height: usize, sample: F) -> Vec<u8>
where
    F: Fn(usize, usize) -> [u8; N] + Sync,
{
    let mut out = vec![0u8; width * height * N];
    out.par_chunks_mut(width * N)
        .enumerate()
        .for_each(|(y, row)| {
            for (x, dst) in row.chunks_exact_mut(N).enumerate() {
                dst.copy_from_slice(&sample(x, y));
            }
        });
    out
}

/// Bytes a frame needs for its declared geometry.
///
/// # Errors
///
/// `InvalidDimensions` for zero width/height or a stride narrower than a row.
pub fn required_frame_len(frame: &RawFrame<'_>) -> VisionResult<usize> {
    validate_image_dimensions(frame.width, frame.height, "raw frame")?;

    let h = frame.height as usize;
    let stride = frame.bytes_per_row;
    let min_row = frame.format.min_bytes_per_row(frame.width);
    if stride < min_row {
        return Err(VisionError::invalid_dimensions(format!(
            "bytesPerRow {stride} is smaller than a {} row of width {} ({min_row} bytes)",
            frame.format, frame.width
        )));
    }

    let y_size = mul(stride, h)?;
    let chroma = match frame.format {
        PixelFormat::Yuv420 => mul(mul(stride.div_ceil(2), h.div_ceil(2))?, 2)?,
        PixelFormat::Nv12 | PixelFormat::Nv21 => mul(stride, h.div_ceil(2))?,
        _ => 0,
    };
    y_size
        .checked_add(chroma)
        .ok_or_else(|| VisionError::invalid_dimensions("frame size overflow"))
}

/// Checks a frame's geometry against its byte length without decoding it.
pub fn validate_frame(frame: &RawFrame<'_>) -> VisionResult<()> {
    let required = required_frame_len(frame)?;
    if frame.data.len() < required {
        return Err(VisionError::BufferTooSmall {
            expected: required,
            actual: frame.data.len(),
        });
    }
    Ok(())
}

/// Decodes a raw frame into a tightly packed RGB (or grayscale) HWC buffer.
///
/// `gray` frames decode to a one-channel buffer; every other format decodes to
/// RGB. The frame's rotation is applied last.
///
/// # Errors
///
/// * `InvalidDimensions` for zero width/height or a stride narrower than a row.
/// * `BufferTooSmall` when `data` is shorter than the declared geometry needs.
pub fn convert_frame(frame: &RawFrame<'_>) -> VisionResult<PixelBuffer<u8>> {
    validate_frame(frame)?;

    let (w, h) = (frame.width as usize, frame.height as usize);
    let stride = frame.bytes_per_row;
    let data = frame.data;
    let y_size = stride * h;

    let decoded = match frame.format {
        PixelFormat::Yuv420 => {
            let chroma_stride = stride.div_ceil(2);
            let chroma_size = chroma_stride * h.div_ceil(2);
            let (u_plane, v_plane) = (&data[y_size..], &data[y_size + chroma_size..]);
            let rgb = fill_rows::<3, _>(w, h, |x, y| {
                let c = (y / 2) * chroma_stride + x / 2;
                yuv_to_rgb(data[y * stride + x], u_plane[c], v_plane[c])
            });
            PixelBuffer::from_parts(frame.width, frame.height, ColorFormat::Rgb, DataLayout::Hwc, rgb)
        }
        PixelFormat::Nv12 | PixelFormat::Nv21 => {
            let uv_plane = &data[y_size..];
            let swap = frame.format == PixelFormat::Nv21;
            let rgb = fill_rows::<3, _>(w, h, |x, y| {
                let c = (y / 2) * stride + (x / 2) * 2;
                let (a, b) = (uv_plane[c], uv_plane[c + 1]);
                let (u, v) = if swap { (b, a) } else { (a, b) };
                yuv_to_rgb(data[y * stride + x], u, v)
            });
            PixelBuffer::from_parts(frame.width, frame.height, ColorFormat::Rgb, DataLayout::Hwc, rgb)
        }
        PixelFormat::Yuv422 => {
            let rgb = fill_rows::<3, _>(w, h, |x, y| {
                let base = y * stride + (x / 2) * 4;
                yuv_to_rgb(data[base + (x % 2) * 2], data[base + 1], data[base + 3])
            });
            PixelBuffer::from_parts(frame.width, frame.height, ColorFormat::Rgb, DataLayout::Hwc, rgb)
        }
        PixelFormat::Bgra | PixelFormat::Rgba | PixelFormat::Rgb | PixelFormat::Bgr => {
            let bpp = frame.format.luma_bytes_per_pixel();
            let order: [usize; 3] = match frame.format {
                PixelFormat::Bgra | PixelFormat::Bgr => [2, 1, 0],
                _ => [0, 1, 2],
            };
            let rgb = fill_rows::<3, _>(w, h, |x, y| {
                let p = y * stride + x * bpp;
                [data[p + order[0]], data[p + order[1]], data[p + order[2]]]
            });
            PixelBuffer::from_parts(frame.width, frame.height, ColorFormat::Rgb, DataLayout::Hwc, rgb)
        }
        PixelFormat::Gray => {
            let gray = fill_rows::<1, _>(w, h, |x, y| [data[y * stride + x]]);
            PixelBuffer::from_parts(
                frame.width,
                frame.height,
                ColorFormat::Grayscale,
                DataLayout::Hwc,
                gray,
            )
        }
    };

    debug!(
        format = %frame.format,
        width = frame.width,
        height = frame.height,
        stride,
        rotation = frame.rotation.degrees(),
        "decoded raw frame"
    );

    Ok(rotate(&decoded, frame.rotation))
}

/// Rotates a buffer clockwise by a multiple of 90 degrees.
///
/// 90 and 270 degree rotations swap width and height. The output keeps the
/// input's layout.
pub fn rotate<T: Copy>(buffer: &PixelBuffer<T>, rotation: Rotation) -> PixelBuffer<T> {
    if rotation == Rotation::Deg0 {
        return buffer.clone();
    }
    let (w, h) = (buffer.width, buffer.height);
    let (out_w, out_h) = if rotation.swaps_dimensions() { (h, w) } else { (w, h) };

    let mut data = Vec::with_capacity(buffer.data.len());
    for oy in 0..out_h {
        for ox in 0..out_w {
            let (sx, sy) = match rotation {
                Rotation::Deg90 => (oy, h - 1 - ox),
                Rotation::Deg180 => (w - 1 - ox, h - 1 - oy),
                Rotation::Deg270 => (w - 1 - oy, ox),
                Rotation::Deg0 => (ox, oy),
            };
            data.extend((0..buffer.channels).map(|c| buffer.at(sx, sy, c)));
        }
    }

    let rotated = PixelBuffer::from_parts(out_w, out_h, buffer.color_format, DataLayout::Hwc, data);
    convert_layout(&rotated, buffer.layout)
}

/// Nearest-neighbour resize: `src = min(floor(dst * from / to), from - 1)`.
///
/// This is a fast sampler for downscaling camera frames, not a general
/// resampler; use [`Interpolation::Bilinear`] when quality matters.
pub fn resize_nearest<T: Copy>(
    buffer: &PixelBuffer<T>,
    width: u32,
    height: u32,
) -> VisionResult<PixelBuffer<T>> {
    validate_image_dimensions(width, height, "resize target")?;
    if (width, height) == (buffer.width, buffer.height) {
        return Ok(buffer.clone());
    }

    let src_x: Vec<u32> = (0..width)
        .map(|x| nearest_source(x, buffer.width, width))
        .collect();
    let src_y: Vec<u32> = (0..height)
        .map(|y| nearest_source(y, buffer.height, height))
        .collect();

    let mut data = Vec::with_capacity(width as usize * height as usize * buffer.channels);
    for &sy in &src_y {
        for &sx in &src_x {
            data.extend((0..buffer.channels).map(|c| buffer.at(sx, sy, c)));
        }
    }

    let resized = PixelBuffer::from_parts(width, height, buffer.color_format, DataLayout::Hwc, data);
    Ok(convert_layout(&resized, buffer.layout))
}

#[inline]
fn nearest_source(dst: u32, from: u32, to: u32) -> u32 {
    ((dst as u64 * from as u64 / to as u64) as u32).min(from - 1)
}

/// Triangle-filtered resize through `image::imageops`.
pub fn resize_bilinear(
    buffer: &PixelBuffer<u8>,
    width: u32,
    height: u32,
) -> VisionResult<PixelBuffer<u8>> {
    validate_image_dimensions(width, height, "resize target")?;
    let hwc = buffer.to_hwc();
    let too_short = || VisionError::invalid_dimensions("buffer does not match its dimensions");

    // Channel order is irrelevant to the filter, so BGR data goes through RgbImage as is.
    let data = match hwc.color_format {
        ColorFormat::Grayscale => {
            let img = GrayImage::from_raw(hwc.width, hwc.height, hwc.data).ok_or_else(too_short)?;
            imageops::resize(&img, width, height, FilterType::Triangle).into_raw()
        }
        ColorFormat::Rgb | ColorFormat::Bgr => {
            let img = RgbImage::from_raw(hwc.width, hwc.height, hwc.data).ok_or_else(too_short)?;
            imageops::resize(&img, width, height, FilterType::Triangle).into_raw()
        }
    };

    let resized = PixelBuffer::from_parts(width, height, buffer.color_format, DataLayout::Hwc, data);
    Ok(convert_layout(&resized, buffer.layout))
}

/// Resizes with the requested kernel.
pub fn resize_with(
    buffer: &PixelBuffer<u8>,
    width: u32,
    height: u32,
    interpolation: Interpolation,
) -> VisionResult<PixelBuffer<u8>> {
    match interpolation {
        Interpolation::Nearest => resize_nearest(buffer, width, height),
        Interpolation::Bilinear => resize_bilinear(buffer, width, height),
    }
}

/// Reduces an RGB or BGR buffer to one luma channel (`0.299R + 0.587G + 0.114B`).
///
/// Grayscale input is returned unchanged.
pub fn to_grayscale(buffer: &PixelBuffer<u8>) -> PixelBuffer<u8> {
    let (r, b) = match buffer.color_format {
        ColorFormat::Grayscale => return buffer.clone(),
        ColorFormat::Rgb => (0, 2),
        ColorFormat::Bgr => (2, 0),
    };
    let hwc = buffer.to_hwc();
    let data = hwc
        .data
        .chunks_exact(3)
        .map(|p| {
            let luma = 0.299 * p[r] as f32 + 0.587 * p[1] as f32 + 0.114 * p[b] as f32;
            luma.round().clamp(0.0, 255.0) as u8
        })
        .collect();
    PixelBuffer::from_parts(
        buffer.width,
        buffer.height,
        ColorFormat::Grayscale,
        buffer.layout,
        data,
    )
}

/// Converts between RGB, BGR and grayscale.
///
/// Grayscale expands to three equal channels; colour reduces through
/// [`to_grayscale`]; RGB and BGR swap the first and last channel.
pub fn convert_color(buffer: &PixelBuffer<u8>, target: ColorFormat) -> PixelBuffer<u8> {
    match (buffer.color_format, target) {
        (from, to) if from == to => buffer.clone(),
        (_, ColorFormat::Grayscale) => to_grayscale(buffer),
        (ColorFormat::Grayscale, to) => {
            let hwc = buffer.to_hwc();
            let data = hwc.data.iter().flat_map(|&g| [g, g, g]).collect();
            let expanded = PixelBuffer::from_parts(buffer.width, buffer.height, to, DataLayout::Hwc, data);
            convert_layout(&expanded, buffer.layout)
        }
        (_, to) => {
            let hwc = buffer.to_hwc();
            let data = hwc
                .data
                .chunks_exact(3)
                .flat_map(|p| [p[2], p[1], p[0]])
                .collect();
            let swapped = PixelBuffer::from_parts(buffer.width, buffer.height, to, DataLayout::Hwc, data);
            convert_layout(&swapped, buffer.layout)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::ErrorCode;

    fn rgb_2x2() -> PixelBuffer<u8> {
        // a b
        // c d
        PixelBuffer::from_parts(
            2,
            2,
            ColorFormat::Rgb,
            DataLayout::Hwc,
            vec![1, 1, 1, 2, 2, 2, 3, 3, 3, 4, 4, 4],
        )
    }

    fn firsts(buffer: &PixelBuffer<u8>) -> Vec<u8> {
        buffer.data.chunks(buffer.channels).map(|p| p[0]).collect()
    }

    #[test]
    fn test_yuv_to_rgb_neutral_chroma() {
        assert_eq!(yuv_to_rgb(100, 128, 128), [100, 100, 100]);
        assert_eq!(yuv_to_rgb(0, 128, 128), [0, 0, 0]);
    }

    #[test]
    fn test_yuv_to_rgb_formula() {
        // v = 100, u = -100
        let y = 120;
        let expected = [
            clamp_u8(y + (351 * 100) / 256),
            clamp_u8(y - (86 * -100 + 179 * 100) / 256),
            clamp_u8(y + (444 * -100) / 256),
        ];
        assert_eq!(yuv_to_rgb(120, 28, 228), expected);
        assert_eq!(expected, [255, 84, 0]);
    }

    #[test]
    fn test_convert_nv12_vs_nv21() {
        // 2x2 frame, one chroma sample pair.
        let data = [50, 50, 50, 50, 28, 228];
        let nv12 = convert_frame(&RawFrame::new(&data, 2, 2, PixelFormat::Nv12)).unwrap();
        let nv21 = convert_frame(&RawFrame::new(&data, 2, 2, PixelFormat::Nv21)).unwrap();
        assert_eq!(&nv12.data[..3], &yuv_to_rgb(50, 28, 228));
        assert_eq!(&nv21.data[..3], &yuv_to_rgb(50, 228, 28));
        assert_eq!(nv12.shape(), vec![2, 2, 3]);
    }

    #[test]
    fn test_convert_yuv420_planar_with_stride() {
        // width 2, stride 4: Y rows padded with 0xFF.
        let mut data = vec![10, 20, 255, 255, 30, 40, 255, 255];
        data.extend([128, 128]); // U plane (stride 2, 1 row)
        data.extend([128, 128]); // V plane
        let frame = RawFrame::new(&data, 2, 2, PixelFormat::Yuv420).with_bytes_per_row(4);
        let rgb = convert_frame(&frame).unwrap();
        assert_eq!(firsts(&rgb), vec![10, 20, 30, 40]);
    }

    #[test]
    fn test_odd_width_semi_planar_needs_full_chroma_pair() {
        for format in [PixelFormat::Nv12, PixelFormat::Nv21] {
            // 3x2: the last column shares the second chroma pair.
            let mut tight = vec![16u8; 6];
            tight.extend([128; 3]);
            let frame = RawFrame::new(&tight, 3, 2, format).with_bytes_per_row(3);
            assert_eq!(validate_frame(&frame).unwrap_err().code(), ErrorCode::InvalidDimensions);
            assert_eq!(convert_frame(&frame).unwrap_err().code(), ErrorCode::InvalidDimensions);

            // Default stride rounds up to 4, so the same bytes are now short.
            let frame = RawFrame::new(&tight, 3, 2, format);
            assert_eq!(frame.bytes_per_row, 4);
            assert_eq!(required_frame_len(&frame).unwrap(), 12);
            assert_eq!(convert_frame(&frame).unwrap_err().code(), ErrorCode::BufferTooSmall);

            let mut data = vec![16, 17, 18, 0, 19, 20, 21, 0];
            data.extend([28, 228, 228, 28]);
            let rgb = convert_frame(&RawFrame::new(&data, 3, 2, format)).unwrap();
            assert_eq!(rgb.shape(), vec![2, 3, 3]);
            let (u, v) = if format == PixelFormat::Nv12 { (228, 28) } else { (28, 228) };
            assert_eq!(&rgb.data[rgb.data.len() - 3..], &yuv_to_rgb(21, u, v));
        }
    }

    #[test]
    fn test_convert_yuyv() {
        let data = [10, 128, 20, 128];
        let rgb = convert_frame(&RawFrame::new(&data, 2, 1, PixelFormat::Yuv422)).unwrap();
        assert_eq!(rgb.data, vec![10, 10, 10, 20, 20, 20]);
    }

    #[test]
    fn test_convert_bgra_drops_alpha() {
        let data = [3, 2, 1, 255, 6, 5, 4, 255];
        let rgb = convert_frame(&RawFrame::new(&data, 2, 1, PixelFormat::Bgra)).unwrap();
        assert_eq!(rgb.data, vec![1, 2, 3, 4, 5, 6]);
    }

    #[test]
    fn test_convert_rgb_honors_stride() {
        let data = [1, 2, 3, 0, 0, 4, 5, 6, 0, 0];
        let frame = RawFrame::new(&data, 1, 2, PixelFormat::Rgb).with_bytes_per_row(5);
        let rgb = convert_frame(&frame).unwrap();
        assert_eq!(rgb.data, vec![1, 2, 3, 4, 5, 6]);
    }

    #[test]
    fn test_convert_rejects_short_buffers() {
        let data = [0u8; 5];
        let err = convert_frame(&RawFrame::new(&data, 2, 2, PixelFormat::Nv12)).unwrap_err();
        assert_eq!(err.code(), ErrorCode::BufferTooSmall);

        let frame = RawFrame::new(&data, 2, 1, PixelFormat::Rgb).with_bytes_per_row(2);
        assert_eq!(
            convert_frame(&frame).unwrap_err().code(),
            ErrorCode::InvalidDimensions
        );
    }

    #[test]
    fn test_convert_applies_rotation() {
        let data = [1, 1, 1, 2, 2, 2];
        let frame = RawFrame::new(&data, 2, 1, PixelFormat::Rgb).with_rotation(Rotation::Deg90);
        let rgb = convert_frame(&frame).unwrap();
        assert_eq!((rgb.width, rgb.height), (1, 2));
        assert_eq!(firsts(&rgb), vec![1, 2]);
    }

    #[test]
    fn test_rotations() {
        let buf = rgb_2x2();
        assert_eq!(firsts(&rotate(&buf, Rotation::Deg90)), vec![3, 1, 4, 2]);
        assert_eq!(firsts(&rotate(&buf, Rotation::Deg180)), vec![4, 3, 2, 1]);
        assert_eq!(firsts(&rotate(&buf, Rotation::Deg270)), vec![2, 4, 1, 3]);
        assert_eq!(rotate(&buf, Rotation::Deg0), buf);
    }

    #[test]
    fn test_rotate_non_square_maps_corners() {
        // 3x1 row [a b c] rotated 90 clockwise becomes a 1x3 column [a b c].
        let buf = PixelBuffer::from_parts(3, 1, ColorFormat::Grayscale, DataLayout::Hwc, vec![1, 2, 3]);
        let cw = rotate(&buf, Rotation::Deg90);
        assert_eq!((cw.width, cw.height), (1, 3));
        assert_eq!(cw.data, vec![1, 2, 3]);
        let ccw = rotate(&buf, Rotation::Deg270);
        assert_eq!(ccw.data, vec![3, 2, 1]);
    }

    #[test]
    fn test_rotate_preserves_chw_layout() {
        let chw = convert_layout(&rgb_2x2(), DataLayout::Chw);
        let rotated = rotate(&chw, Rotation::Deg180);
        assert_eq!(rotated.layout, DataLayout::Chw);
        assert_eq!(rotated.to_hwc(), rotate(&rgb_2x2(), Rotation::Deg180));
    }

    #[test]
    fn test_resize_nearest_indices() {
        let buf = PixelBuffer::from_parts(4, 1, ColorFormat::Grayscale, DataLayout::Hwc, vec![0, 1, 2, 3]);
        let down = resize_nearest(&buf, 2, 1).unwrap();
        assert_eq!(down.data, vec![0, 2]);
        let up = resize_nearest(&buf, 8, 1).unwrap();
        assert_eq!(up.data, vec![0, 0, 1, 1, 2, 2, 3, 3]);
        assert!(resize_nearest(&buf, 0, 1).is_err());
    }

    #[test]
    fn test_resize_bilinear_constant_image() {
        let buf = PixelBuffer::filled(4, 4, ColorFormat::Rgb, &[100, 150, 200]);
        let out = resize_bilinear(&buf, 2, 3).unwrap();
        assert_eq!((out.width, out.height), (2, 3));
        assert!(out.data.chunks(3).all(|p| p == [100, 150, 200]));
    }

    #[test]
    fn test_grayscale_weights() {
        let buf = PixelBuffer::from_parts(1, 1, ColorFormat::Rgb, DataLayout::Hwc, vec![255, 0, 0]);
        assert_eq!(to_grayscale(&buf).data, vec![76]);
        let bgr = PixelBuffer::from_parts(1, 1, ColorFormat::Bgr, DataLayout::Hwc, vec![0, 0, 255]);
        assert_eq!(to_grayscale(&bgr).data, vec![76]);
        let white = PixelBuffer::filled(1, 1, ColorFormat::Rgb, &[255]);
        assert_eq!(to_grayscale(&white).data, vec![255]);
    }

    #[test]
    fn test_convert_color_swaps_and_expands() {
        let buf = PixelBuffer::from_parts(1, 1, ColorFormat::Rgb, DataLayout::Hwc, vec![1, 2, 3]);
        let bgr = convert_color(&buf, ColorFormat::Bgr);
        assert_eq!(bgr.data, vec![3, 2, 1]);
        assert_eq!(bgr.color_format, ColorFormat::Bgr);

        let gray = PixelBuffer::from_parts(1, 1, ColorFormat::Grayscale, DataLayout::Hwc, vec![9]);
        assert_eq!(convert_color(&gray, ColorFormat::Rgb).data, vec![9, 9, 9]);
    }
}
