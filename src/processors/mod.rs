//! Numeric processors of the preprocessing and post-processing pipeline.
//!
//! This module contains:
//! - Raw frame decoding, rotation and colour conversion
//! - Resize strategies, letterboxing and its inverse
//! - Normalization and quantization
//! - Tensor layout transforms and batch assembly
//! - Bounding-box geometry and non-maximum suppression
//! - Channel/patch extraction and multi-crops

pub mod buffer;
pub mod extract;
pub mod geometry;
pub mod layout;
pub mod letterbox;
pub mod nms;
pub mod normalization;
pub mod pixel_format;
pub mod quantization;
pub mod resize;
pub mod types;

pub use buffer::{PixelBuffer, RawFrame};
pub use extract::{
    Region, crop_region, extract_channel, extract_patch, five_crop, flip_horizontal, ten_crop,
    tensor_to_image,
};
pub use geometry::{
    BoxCoords, ClipResult, IouResult, box_from_slice, boxes_from_slices, calculate_iou,
    clip_boxes, convert_box, convert_boxes, scale_boxes,
};
pub use layout::{BatchTensor, Tensor, assemble_batch, concatenate_to_batch, convert_layout, permute};
pub use letterbox::{LetterboxTransform, compute_letterbox, reverse_letterbox_boxes};
pub use nms::{Detection, NmsConfig, NmsResult, non_max_suppression};
pub use normalization::{NormalizationSpec, Normalizer};
pub use pixel_format::{
    convert_color, convert_frame, required_frame_len, resize_bilinear, resize_nearest,
    resize_with, rotate, to_grayscale, validate_frame, yuv_to_rgb,
};
pub use quantization::{
    QuantParam, QuantizationParams, QuantizationSpec, QuantizedData, calculate_quantization_params,
    dequantize, quantize,
};
pub use resize::{ResizeOutcome, ResizeSpec, letterbox, pad_to, resize};
pub use types::{
    BoxFormat, ColorFormat, CropMode, DataLayout, Interpolation, NormalizationPreset, PixelFormat,
    QuantDtype, QuantMode, ResizeStrategy, Rotation,
};
