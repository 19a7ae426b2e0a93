//! Types used in image processing operations
//!
//! This module defines the closed sets of formats and modes the processors
//! dispatch on. Every enum is matched exhaustively in exactly one place per
//! component, so adding a variant is a compile error until it is handled.
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::core::errors::VisionError;

/// Implements `as_str`, `Display` and `FromStr` for a fieldless enum.
///
/// `FromStr` is case-insensitive and accepts the listed aliases; failures map
/// to the error produced by `$err`.
macro_rules! string_enum {
    ($ty:ident, $err:expr, { $($variant:ident => $name:literal $(| $alias:literal)*),+ $(,)? }) => {
        impl $ty {
            /// Canonical lowercase name, identical to the serde representation.
            pub fn as_str(&self) -> &'static str {
                match self {
                    $($ty::$variant => $name,)+
                }
            }
        }

        impl std::fmt::Display for $ty {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl FromStr for $ty {
            type Err = VisionError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s.to_ascii_lowercase().as_str() {
                    $($name $(| $alias)* => Ok($ty::$variant),)+
                    other => Err($err(other.to_string())),
                }
            }
        }
    };
}

/// Raw pixel layouts handed over by the camera/decode collaborator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PixelFormat {
    /// Planar 4:2:0, Y plane followed by U and V planes (I420).
    Yuv420,
    /// Packed 4:2:2, `Y0 U Y1 V` per pixel pair (YUYV).
    Yuv422,
    /// Semi-planar 4:2:0, Y plane followed by interleaved U/V.
    Nv12,
    /// Semi-planar 4:2:0, Y plane followed by interleaved V/U.
    Nv21,
    /// Packed 8-bit BGRA.
    Bgra,
    /// Packed 8-bit RGBA.
    Rgba,
    /// Packed 8-bit RGB.
    Rgb,
    /// Packed 8-bit BGR.
    Bgr,
    /// Single 8-bit luma channel.
    Gray,
}

string_enum!(PixelFormat, VisionError::UnsupportedFormat, {
    Yuv420 => "yuv420" | "i420" | "yuv420p",
    Yuv422 => "yuv422" | "yuyv",
    Nv12 => "nv12",
    Nv21 => "nv21",
    Bgra => "bgra",
    Rgba => "rgba",
    Rgb => "rgb",
    Bgr => "bgr",
    Gray => "gray" | "grey" | "mono8",
});

impl PixelFormat {
    /// Bytes per pixel of the first (or only) plane.
    pub fn luma_bytes_per_pixel(&self) -> usize {
        match self {
            PixelFormat::Yuv420 | PixelFormat::Nv12 | PixelFormat::Nv21 | PixelFormat::Gray => 1,
            PixelFormat::Yuv422 => 2,
            PixelFormat::Rgb | PixelFormat::Bgr => 3,
            PixelFormat::Bgra | PixelFormat::Rgba => 4,
        }
    }

    /// Narrowest valid stride for a frame `width` pixels wide.
    ///
    /// Interleaved chroma rows (NV12/NV21) and YUYV macropixels cover two
    /// pixels, so odd widths round up to a whole pair.
    pub fn min_bytes_per_row(&self, width: u32) -> usize {
        let w = width as usize;
        match self {
            PixelFormat::Nv12 | PixelFormat::Nv21 => w.div_ceil(2).saturating_mul(2),
            PixelFormat::Yuv422 => w.div_ceil(2).saturating_mul(4),
            other => w.saturating_mul(other.luma_bytes_per_pixel()),
        }
    }
}

/// Colour interpretation of a decoded buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ColorFormat {
    /// Red, Green, Blue order (default for most image libraries like image-rs)
    #[default]
    Rgb,
    /// Blue, Green, Red order (used by OpenCV-trained models)
    Bgr,
    /// Single luma channel.
    #[serde(alias = "gray")]
    Grayscale,
}

string_enum!(ColorFormat, VisionError::UnsupportedColorScheme, {
    Rgb => "rgb",
    Bgr => "bgr",
    Grayscale => "grayscale" | "gray" | "grey",
});

impl ColorFormat {
    /// Number of channels a buffer in this format carries.
    pub fn channels(&self) -> usize {
        match self {
            ColorFormat::Rgb | ColorFormat::Bgr => 3,
            ColorFormat::Grayscale => 1,
        }
    }
}

/// Specifies the order of axes in an image tensor
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DataLayout {
    /// Height, Width, Channel order (common in TensorFlow)
    #[default]
    Hwc,
    /// Channel, Height, Width order (common in PyTorch)
    Chw,
    /// Batched HWC.
    Nhwc,
    /// Batched CHW.
    Nchw,
}

string_enum!(DataLayout, |v| VisionError::InvalidFormat { kind: "data layout", value: v }, {
    Hwc => "hwc",
    Chw => "chw",
    Nhwc => "nhwc",
    Nchw => "nchw",
});

impl DataLayout {
    /// Whether the channel axis is the innermost one.
    pub fn is_channel_last(&self) -> bool {
        matches!(self, DataLayout::Hwc | DataLayout::Nhwc)
    }

    /// Whether the layout carries a leading batch axis.
    pub fn is_batched(&self) -> bool {
        matches!(self, DataLayout::Nhwc | DataLayout::Nchw)
    }

    /// The per-image counterpart of this layout.
    pub fn single(&self) -> DataLayout {
        if self.is_channel_last() {
            DataLayout::Hwc
        } else {
            DataLayout::Chw
        }
    }

    /// The batched counterpart of this layout.
    pub fn batched(&self) -> DataLayout {
        if self.is_channel_last() {
            DataLayout::Nhwc
        } else {
            DataLayout::Nchw
        }
    }
}

/// Rotation in 90-degree clockwise steps.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(try_from = "i32", into = "i32")]
pub enum Rotation {
    #[default]
    Deg0,
    Deg90,
    Deg180,
    Deg270,
}

impl Rotation {
    /// Parses a rotation given in degrees (negative and >= 360 values wrap).
    pub fn from_degrees(degrees: i32) -> Result<Self, VisionError> {
        match degrees.rem_euclid(360) {
            0 => Ok(Rotation::Deg0),
            90 => Ok(Rotation::Deg90),
            180 => Ok(Rotation::Deg180),
            270 => Ok(Rotation::Deg270),
            _ => Err(VisionError::InvalidFormat {
                kind: "rotation",
                value: degrees.to_string(),
            }),
        }
    }

    /// Parses the camera orientation index `0..=3` (quarter turns clockwise).
    pub fn from_orientation(orientation: u8) -> Result<Self, VisionError> {
        match orientation {
            0 => Ok(Rotation::Deg0),
            1 => Ok(Rotation::Deg90),
            2 => Ok(Rotation::Deg180),
            3 => Ok(Rotation::Deg270),
            other => Err(VisionError::InvalidFormat {
                kind: "orientation",
                value: other.to_string(),
            }),
        }
    }

    /// Rotation in degrees.
    pub fn degrees(&self) -> i32 {
        match self {
            Rotation::Deg0 => 0,
            Rotation::Deg90 => 90,
            Rotation::Deg180 => 180,
            Rotation::Deg270 => 270,
        }
    }

    /// Whether the rotation swaps width and height.
    pub fn swaps_dimensions(&self) -> bool {
        matches!(self, Rotation::Deg90 | Rotation::Deg270)
    }
}

impl TryFrom<i32> for Rotation {
    type Error = VisionError;

    fn try_from(value: i32) -> Result<Self, Self::Error> {
        Self::from_degrees(value)
    }
}

impl From<Rotation> for i32 {
    fn from(value: Rotation) -> Self {
        value.degrees()
    }
}

/// Policy used to fit a source image into a target size.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResizeStrategy {
    /// Uniform scale to fill the target, cropping the overflow.
    Cover,
    /// Uniform scale to fit inside the target, padding the remainder.
    Contain,
    /// Independent scale per axis.
    #[default]
    Stretch,
    /// Contain with a gray fill and an invertible transform record.
    Letterbox,
}

string_enum!(ResizeStrategy, |v| VisionError::InvalidFormat { kind: "resize strategy", value: v }, {
    Cover => "cover",
    Contain => "contain",
    Stretch => "stretch",
    Letterbox => "letterbox",
});

/// Specifies where to crop an image when the aspect ratios don't match
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum CropMode {
    /// Crop from the center of the image
    #[default]
    Center,
    /// Keep the top-left corner of the image
    TopLeft,
    /// Keep the top-right corner of the image
    TopRight,
    /// Keep the bottom-left corner of the image
    BottomLeft,
    /// Keep the bottom-right corner of the image
    BottomRight,
}

string_enum!(CropMode, |v| VisionError::InvalidFormat { kind: "crop mode", value: v }, {
    Center => "center" | "c",
    TopLeft => "topleft" | "tl",
    TopRight => "topright" | "tr",
    BottomLeft => "bottomleft" | "bl",
    BottomRight => "bottomright" | "br",
});

impl CropMode {
    /// Offset of a `crop`-sized window inside `total` along one axis.
    ///
    /// `horizontal` selects the x axis; corner modes anchor to the matching end.
    pub(crate) fn axis_offset(&self, total: u32, crop: u32, horizontal: bool) -> u32 {
        let overflow = total.saturating_sub(crop);
        let anchor_start = match (self, horizontal) {
            (CropMode::Center, _) => return overflow / 2,
            (CropMode::TopLeft, _) => true,
            (CropMode::TopRight, true) | (CropMode::BottomLeft, false) => false,
            (CropMode::TopRight, false) | (CropMode::BottomLeft, true) => true,
            (CropMode::BottomRight, _) => false,
        };
        if anchor_start { 0 } else { overflow }
    }
}

/// Resampling kernel for resize operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Interpolation {
    /// Nearest-neighbor sampling (`floor(x * from / to)`).
    #[default]
    Nearest,
    /// Bilinear (triangle) filtering via `image::imageops`.
    Bilinear,
}

string_enum!(Interpolation, |v| VisionError::InvalidFormat { kind: "interpolation", value: v }, {
    Nearest => "nearest",
    Bilinear => "bilinear" | "linear",
});

/// Coordinate encoding of a 4-value bounding box.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BoxFormat {
    /// `[x1, y1, x2, y2]`
    #[default]
    Xyxy,
    /// `[x, y, width, height]`
    Xywh,
    /// `[center_x, center_y, width, height]`
    Cxcywh,
}

string_enum!(BoxFormat, |v| VisionError::InvalidFormat { kind: "box format", value: v }, {
    Xyxy => "xyxy",
    Xywh => "xywh",
    Cxcywh => "cxcywh",
});

/// Fixed-point element type of a quantized tensor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QuantDtype {
    Int8,
    #[default]
    Uint8,
    Int16,
}

string_enum!(QuantDtype, |v| VisionError::InvalidFormat { kind: "quantization dtype", value: v }, {
    Int8 => "int8",
    Uint8 => "uint8",
    Int16 => "int16",
});

impl QuantDtype {
    /// Smallest representable value.
    pub fn qmin(&self) -> i32 {
        match self {
            QuantDtype::Int8 => i8::MIN as i32,
            QuantDtype::Uint8 => u8::MIN as i32,
            QuantDtype::Int16 => i16::MIN as i32,
        }
    }

    /// Largest representable value.
    pub fn qmax(&self) -> i32 {
        match self {
            QuantDtype::Int8 => i8::MAX as i32,
            QuantDtype::Uint8 => u8::MAX as i32,
            QuantDtype::Int16 => i16::MAX as i32,
        }
    }
}

/// Granularity of quantization parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum QuantMode {
    /// One scale/zero-point pair for the whole tensor.
    #[default]
    #[serde(alias = "per_tensor", alias = "perTensor")]
    PerTensor,
    /// One scale/zero-point pair per channel.
    #[serde(alias = "per_channel", alias = "perChannel")]
    PerChannel,
}

string_enum!(QuantMode, |v| VisionError::InvalidFormat { kind: "quantization mode", value: v }, {
    PerTensor => "per-tensor" | "per_tensor" | "pertensor",
    PerChannel => "per-channel" | "per_channel" | "perchannel",
});

/// Named normalization presets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NormalizationPreset {
    /// ImageNet mean/std on `[0, 1]` inputs.
    Imagenet,
    /// Maps `[0, 255]` to `[-1, 1]`.
    Tensorflow,
    /// Maps `[0, 255]` to `[0, 1]`.
    #[default]
    Scale,
    /// Leaves values in `[0, 255]`.
    Raw,
    /// Caller-supplied mean/std.
    Custom,
}

string_enum!(NormalizationPreset, |v| VisionError::InvalidFormat { kind: "normalization preset", value: v }, {
    Imagenet => "imagenet",
    Tensorflow => "tensorflow",
    Scale => "scale",
    Raw => "raw",
    Custom => "custom",
});
