//! Core error types for the preprocessing pipeline.
//!
//! This module defines the error enum shared by every processor, together with
//! the stable machine-readable codes that callers on the far side of a process
//! or language boundary match on.

use serde::Serialize;
use thiserror::Error;

/// Stage of the pipeline an error originated in.
///
/// Used as context for [`VisionError::Processing`] so a failure inside a batch
/// can be traced back to the step that produced it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessingStage {
    /// Raw frame decoding and pixel-format conversion.
    PixelConversion,
    /// Rotation by a multiple of 90 degrees.
    Rotation,
    /// Region-of-interest cropping.
    Crop,
    /// Resizing, padding and letterboxing.
    Resize,
    /// Mean/std normalization.
    Normalization,
    /// Tensor axis permutation and batch assembly.
    Layout,
    /// Quantization and dequantization.
    Quantization,
    /// Bounding-box post-processing.
    PostProcessing,
    /// Batch coordination.
    BatchProcessing,
}

impl std::fmt::Display for ProcessingStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ProcessingStage::PixelConversion => write!(f, "pixel conversion"),
            ProcessingStage::Rotation => write!(f, "rotation"),
            ProcessingStage::Crop => write!(f, "crop"),
            ProcessingStage::Resize => write!(f, "resize"),
            ProcessingStage::Normalization => write!(f, "normalization"),
            ProcessingStage::Layout => write!(f, "layout"),
            ProcessingStage::Quantization => write!(f, "quantization"),
            ProcessingStage::PostProcessing => write!(f, "post-processing"),
            ProcessingStage::BatchProcessing => write!(f, "batch processing"),
        }
    }
}

/// Stable, machine-readable error codes.
///
/// The string form (see [`ErrorCode::as_str`]) is part of the public contract
/// and must not change between releases.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    InvalidDimensions,
    InvalidRoi,
    InvalidNormalization,
    InvalidQuantization,
    MissingQuantizationParams,
    InvalidBox,
    InvalidFormat,
    InvalidPermutation,
    DimensionMismatch,
    ChannelOutOfRange,
    PatchOutOfBounds,
    UnsupportedFormat,
    UnsupportedColorScheme,
    BufferTooSmall,
    InvalidInput,
    ConfigError,
    TensorShape,
    Cancelled,
    Processing,
}

impl ErrorCode {
    /// Returns the wire representation of the code.
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCode::InvalidDimensions => "INVALID_DIMENSIONS",
            ErrorCode::InvalidRoi => "INVALID_ROI",
            ErrorCode::InvalidNormalization => "INVALID_NORMALIZATION",
            ErrorCode::InvalidQuantization => "INVALID_QUANTIZATION",
            ErrorCode::MissingQuantizationParams => "MISSING_QUANTIZATION_PARAMS",
            ErrorCode::InvalidBox => "INVALID_BOX",
            ErrorCode::InvalidFormat => "INVALID_FORMAT",
            ErrorCode::InvalidPermutation => "INVALID_PERMUTATION",
            ErrorCode::DimensionMismatch => "DIMENSION_MISMATCH",
            ErrorCode::ChannelOutOfRange => "CHANNEL_OUT_OF_RANGE",
            ErrorCode::PatchOutOfBounds => "PATCH_OUT_OF_BOUNDS",
            ErrorCode::UnsupportedFormat => "UNSUPPORTED_FORMAT",
            ErrorCode::UnsupportedColorScheme => "UNSUPPORTED_COLOR_SCHEME",
            ErrorCode::BufferTooSmall => "BUFFER_TOO_SMALL",
            ErrorCode::InvalidInput => "INVALID_INPUT",
            ErrorCode::ConfigError => "CONFIG_ERROR",
            ErrorCode::TensorShape => "TENSOR_SHAPE",
            ErrorCode::Cancelled => "CANCELLED",
            ErrorCode::Processing => "PROCESSING",
        }
    }
}

impl std::fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Errors produced by the preprocessing and post-processing operations.
///
/// Validation variants are raised before any numeric work starts. Bounds
/// variants come from extraction helpers. Unsupported-input variants name the
/// format or scheme that was not recognised.
#[derive(Error, Debug)]
pub enum VisionError {
    /// Width, height or channel count is zero or otherwise unusable.
    #[error("invalid dimensions: {message}")]
    InvalidDimensions {
        /// A message describing the offending dimensions.
        message: String,
    },

    /// The region of interest lies outside the source or has no area.
    #[error("invalid roi: {message}")]
    InvalidRoi {
        /// A message describing the region.
        message: String,
    },

    /// Normalization parameters are missing or inconsistent.
    #[error("invalid normalization: {message}")]
    InvalidNormalization {
        /// A message describing the problem.
        message: String,
    },

    /// Quantization options are inconsistent (wrong per-channel length, bad scale).
    #[error("invalid quantization: {message}")]
    InvalidQuantization {
        /// A message describing the problem.
        message: String,
    },

    /// `scale` or `zeroPoint` was not supplied to a quantize/dequantize call.
    #[error("missing quantization params: {missing} not provided")]
    MissingQuantizationParams {
        /// Name of the missing parameter.
        missing: &'static str,
    },

    /// A bounding box does not have exactly four coordinates.
    #[error("invalid box at index {index}: expected 4 values, got {len}")]
    InvalidBox {
        /// Position of the box in the input array.
        index: usize,
        /// Number of values the box had.
        len: usize,
    },

    /// A format enum string was not recognised.
    #[error("invalid {kind} '{value}'")]
    InvalidFormat {
        /// Which enum was being parsed (e.g. "box format").
        kind: &'static str,
        /// The value that failed to parse.
        value: String,
    },

    /// A permutation order is not a permutation of the tensor's axes.
    #[error("invalid permutation {order:?} for shape {shape:?}")]
    InvalidPermutation {
        /// The requested order.
        order: Vec<usize>,
        /// The tensor shape.
        shape: Vec<usize>,
    },

    /// Items of a batch do not share the same per-image dimensions.
    #[error("dimension mismatch at index {index}: expected {expected:?}, got {actual:?}")]
    DimensionMismatch {
        /// Index of the first offending item.
        index: usize,
        /// Dimensions of the first item.
        expected: Vec<usize>,
        /// Dimensions of the offending item.
        actual: Vec<usize>,
    },

    /// A channel index does not exist in the buffer.
    #[error("channel index {index} out of range for {channels} channels")]
    ChannelOutOfRange {
        /// Requested channel.
        index: usize,
        /// Channel count of the buffer.
        channels: usize,
    },

    /// A patch extends beyond the image bounds.
    #[error(
        "patch ({x}, {y}, {width}x{height}) exceeds image bounds {image_width}x{image_height}"
    )]
    PatchOutOfBounds {
        x: u32,
        y: u32,
        width: u32,
        height: u32,
        image_width: u32,
        image_height: u32,
    },

    /// The pixel format is not one the converter understands.
    #[error("unsupported pixel format '{0}'")]
    UnsupportedFormat(String),

    /// The colour scheme is not one the operation understands.
    #[error("unsupported color scheme '{0}'")]
    UnsupportedColorScheme(String),

    /// A raw buffer is shorter than its declared geometry requires.
    #[error("buffer too small: expected at least {expected} bytes, got {actual} bytes")]
    BufferTooSmall {
        /// The expected minimum buffer size.
        expected: usize,
        /// The actual buffer size.
        actual: usize,
    },

    /// Generic malformed input.
    #[error("invalid input: {message}")]
    InvalidInput {
        /// A message describing the invalid input.
        message: String,
    },

    /// Error indicating a configuration problem.
    #[error("configuration: {message}")]
    ConfigError {
        /// A message describing the configuration error.
        message: String,
    },

    /// Error from basic tensor operations.
    #[error("tensor shape")]
    Tensor(#[from] ndarray::ShapeError),

    /// The item was skipped because its batch was cancelled before it started.
    #[error("cancelled before processing started")]
    Cancelled,

    /// A failure inside a pipeline stage, wrapping the underlying error.
    #[error("{kind} failed: {context}")]
    Processing {
        /// The stage of processing where the error occurred.
        kind: ProcessingStage,
        /// Additional context about the error.
        context: String,
        /// The underlying error that caused this error.
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },
}

/// Convenience alias used across the crate.
pub type VisionResult<T> = Result<T, VisionError>;

impl VisionError {
    /// Returns the stable machine-readable code for this error.
    ///
    /// [`VisionError::Processing`] reports the code of the wrapped error when it
    /// is itself a `VisionError`.
    pub fn code(&self) -> ErrorCode {
        match self {
            VisionError::InvalidDimensions { .. } => ErrorCode::InvalidDimensions,
            VisionError::InvalidRoi { .. } => ErrorCode::InvalidRoi,
            VisionError::InvalidNormalization { .. } => ErrorCode::InvalidNormalization,
            VisionError::InvalidQuantization { .. } => ErrorCode::InvalidQuantization,
            VisionError::MissingQuantizationParams { .. } => ErrorCode::MissingQuantizationParams,
            VisionError::InvalidBox { .. } => ErrorCode::InvalidBox,
            VisionError::InvalidFormat { .. } => ErrorCode::InvalidFormat,
            VisionError::InvalidPermutation { .. } => ErrorCode::InvalidPermutation,
            VisionError::DimensionMismatch { .. } => ErrorCode::DimensionMismatch,
            VisionError::ChannelOutOfRange { .. } => ErrorCode::ChannelOutOfRange,
            VisionError::PatchOutOfBounds { .. } => ErrorCode::PatchOutOfBounds,
            VisionError::UnsupportedFormat(_) => ErrorCode::UnsupportedFormat,
            VisionError::UnsupportedColorScheme(_) => ErrorCode::UnsupportedColorScheme,
            VisionError::BufferTooSmall { .. } => ErrorCode::BufferTooSmall,
            VisionError::InvalidInput { .. } => ErrorCode::InvalidInput,
            VisionError::ConfigError { .. } => ErrorCode::ConfigError,
            VisionError::Tensor(_) => ErrorCode::TensorShape,
            VisionError::Cancelled => ErrorCode::Cancelled,
            VisionError::Processing { source, .. } => source
                .downcast_ref::<VisionError>()
                .map(VisionError::code)
                .unwrap_or(ErrorCode::Processing),
        }
    }

    /// Formats the error together with its chain of sources.
    pub fn report(&self) -> String {
        let mut message = self.to_string();
        let mut source = std::error::Error::source(self);
        while let Some(err) = source {
            message.push_str(": ");
            message.push_str(&err.to_string());
            source = err.source();
        }
        message
    }

    /// Creates an [`VisionError::InvalidDimensions`] error.
    pub fn invalid_dimensions(message: impl Into<String>) -> Self {
        Self::InvalidDimensions {
            message: message.into(),
        }
    }

    /// Creates an [`VisionError::InvalidRoi`] error.
    pub fn invalid_roi(message: impl Into<String>) -> Self {
        Self::InvalidRoi {
            message: message.into(),
        }
    }

    /// Creates an [`VisionError::InvalidNormalization`] error.
    pub fn invalid_normalization(message: impl Into<String>) -> Self {
        Self::InvalidNormalization {
            message: message.into(),
        }
    }

    /// Creates an [`VisionError::InvalidQuantization`] error.
    pub fn invalid_quantization(message: impl Into<String>) -> Self {
        Self::InvalidQuantization {
            message: message.into(),
        }
    }

    /// Creates an [`VisionError::InvalidInput`] error.
    pub fn invalid_input(message: impl Into<String>) -> Self {
        Self::InvalidInput {
            message: message.into(),
        }
    }

    /// Creates a configuration error for invalid field values.
    ///
    /// # Arguments
    ///
    /// * `field` - The name of the field with an invalid value
    /// * `expected` - Description of what was expected
    /// * `actual` - Description of what was actually provided
    pub fn invalid_field(
        field: impl Into<String>,
        expected: impl Into<String>,
        actual: impl Into<String>,
    ) -> Self {
        Self::ConfigError {
            message: format!(
                "invalid value for field '{}': expected {}, got {}",
                field.into(),
                expected.into(),
                actual.into()
            ),
        }
    }

    /// Wraps an error raised while a pipeline stage was running.
    pub fn in_stage(
        kind: ProcessingStage,
        context: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self::Processing {
            kind,
            context: context.into(),
            source: Box::new(source),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_codes_are_stable_strings() {
        assert_eq!(
            VisionError::invalid_dimensions("0x0").code().as_str(),
            "INVALID_DIMENSIONS"
        );
        assert_eq!(
            VisionError::MissingQuantizationParams { missing: "scale" }
                .code()
                .as_str(),
            "MISSING_QUANTIZATION_PARAMS"
        );
        assert_eq!(
            VisionError::UnsupportedFormat("p010".into()).code(),
            ErrorCode::UnsupportedFormat
        );
    }

    #[test]
    fn test_processing_error_reports_inner_code() {
        let inner = VisionError::BufferTooSmall {
            expected: 12,
            actual: 4,
        };
        let wrapped = VisionError::in_stage(ProcessingStage::PixelConversion, "nv12", inner);
        assert_eq!(wrapped.code(), ErrorCode::BufferTooSmall);
        assert_eq!(wrapped.to_string(), "pixel conversion failed: nv12");
        assert_eq!(
            wrapped.report(),
            "pixel conversion failed: nv12: buffer too small: expected at least 12 bytes, got 4 bytes"
        );
    }

    #[test]
    fn test_message_includes_index() {
        let err = VisionError::InvalidBox { index: 3, len: 5 };
        assert!(err.to_string().contains("index 3"));
    }
}
