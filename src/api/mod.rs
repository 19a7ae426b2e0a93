//! Public operations.
//!
//! Each operation takes a sparse options struct (mirroring the JSON a caller
//! sends, camelCase field names, optional fields), resolves defaults into the
//! fully populated processor configuration, validates it, and only then
//! computes. Failures are [`VisionError`](crate::core::VisionError)s whose
//! [`code`](crate::core::VisionError::code) is stable across releases.

pub mod batch;
pub mod boxes;
pub mod image;
pub mod pipeline;
pub mod tensor;

use serde::Serialize;

use crate::core::errors::{ErrorCode, VisionError};

pub use batch::{BatchItem, BatchResult, CancellationToken, batch_get_pixel_data};
pub use boxes::{
    BoxesResponse, ClipBoxesOptions, ClipBoxesResponse, DetectionInput, NmsOptions,
    ReverseLetterboxOptions, ScaleBoxesOptions, calculate_iou, clip_boxes, convert_box_format,
    non_max_suppression, reverse_letterbox, scale_boxes,
};
pub use image::{
    FrameOptions, LetterboxOptions, LetterboxResponse, ResizeOptions, ResizeResponse,
    TensorGeometry, convert_pixels, extract_channel, extract_patch, five_crop, letterbox,
    normalize, resize, ten_crop, tensor_to_image, to_grayscale,
};
pub use pipeline::{
    PixelDataOptions, PixelDataPlan, PixelDataRequest, PixelDataResult, TensorData,
    get_pixel_data,
};
pub use tensor::{
    AssembleBatchOptions, DequantizeResponse, QuantizationParamsOptions, QuantizeOptions,
    QuantizeResponse, assemble_batch, calculate_quantization_params, concatenate_to_batch,
    dequantize, permute, quantize,
};

/// Serializable form of an error for callers across a process boundary.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ErrorResponse {
    pub code: ErrorCode,
    pub message: String,
}

impl From<&VisionError> for ErrorResponse {
    fn from(err: &VisionError) -> Self {
        Self {
            code: err.code(),
            message: err.report(),
        }
    }
}
