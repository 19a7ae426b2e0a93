//! The single-image pipeline behind `get_pixel_data`.
//!
//! A request is resolved into a [`PixelDataPlan`] first; every option is
//! checked there, so a plan that resolves can only fail on the pixels
//! themselves. The plan then runs convert, rotate, crop, resize, colour,
//! normalize, layout and an optional quantize step, in that order.

use std::time::Instant;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::api::image::{FrameOptions, ResizeOptions, check_roi};
use crate::api::tensor::QuantizeOptions;
use crate::core::errors::{ProcessingStage, VisionError, VisionResult};
use crate::processors::buffer::RawFrame;
use crate::processors::extract::{Region, crop_region};
use crate::processors::layout::convert_layout;
use crate::processors::letterbox::LetterboxTransform;
use crate::processors::normalization::{NormalizationSpec, Normalizer};
use crate::processors::pixel_format::{convert_color, convert_frame, validate_frame};
use crate::processors::quantization::{QuantizationSpec, QuantizedData, quantize};
use crate::processors::resize::{ResizeSpec, resize};
use crate::processors::types::{ColorFormat, DataLayout};

/// Sparse pipeline options. Every step is optional except decoding.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PixelDataOptions {
    /// Region of the rotated frame to keep.
    #[serde(default)]
    pub roi: Option<Region>,
    #[serde(default)]
    pub resize: Option<ResizeOptions>,
    /// Defaults to `rgb`.
    #[serde(default)]
    pub color_format: Option<ColorFormat>,
    /// Defaults to the `scale` preset.
    #[serde(default)]
    pub normalization: Option<NormalizationSpec>,
    /// Defaults to `hwc`; batched layouts add a leading axis of 1.
    #[serde(default)]
    pub data_layout: Option<DataLayout>,
    #[serde(default)]
    pub quantization: Option<QuantizeOptions>,
}

/// One frame plus the options to run on it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PixelDataRequest {
    pub data: Vec<u8>,
    #[serde(flatten)]
    pub frame: FrameOptions,
    #[serde(default)]
    pub options: PixelDataOptions,
}

impl PixelDataRequest {
    pub fn new(data: Vec<u8>, frame: FrameOptions) -> Self {
        Self {
            data,
            frame,
            options: PixelDataOptions::default(),
        }
    }

    pub fn with_options(mut self, options: PixelDataOptions) -> Self {
        self.options = options;
        self
    }

    /// Binds the frame and resolves every option without touching pixels.
    pub fn plan(&self) -> VisionResult<(RawFrame<'_>, PixelDataPlan)> {
        let frame = self.frame.bind(&self.data)?;
        validate_frame(&frame)?;
        let plan = PixelDataPlan::resolve(&frame, &self.options)?;
        Ok((frame, plan))
    }

    /// Checks the request without running it.
    pub fn validate(&self) -> VisionResult<()> {
        self.plan().map(|_| ())
    }
}

/// Fully resolved pipeline steps.
#[derive(Debug, Clone, PartialEq)]
pub struct PixelDataPlan {
    pub roi: Option<Region>,
    pub resize: Option<ResizeSpec>,
    pub color_format: ColorFormat,
    pub normalizer: Normalizer,
    pub data_layout: DataLayout,
    pub quantization: Option<QuantizationSpec>,
}

impl PixelDataPlan {
    /// Resolves `options` against the geometry of `frame`.
    pub fn resolve(frame: &RawFrame<'_>, options: &PixelDataOptions) -> VisionResult<Self> {
        let (width, height) = if frame.rotation.swaps_dimensions() {
            (frame.height, frame.width)
        } else {
            (frame.width, frame.height)
        };
        if let Some(region) = &options.roi {
            check_roi(region, width, height)?;
        }
        let resize = options.resize.as_ref().map(ResizeOptions::resolve).transpose()?;
        let color_format = options.color_format.unwrap_or_default();
        let normalizer = Normalizer::from_spec(
            &options.normalization.clone().unwrap_or_default(),
            color_format.channels(),
        )?;
        let data_layout = options.data_layout.unwrap_or_default();
        let quantization = options
            .quantization
            .as_ref()
            .map(|q| {
                QuantizeOptions {
                    data_layout: q.data_layout.or(Some(data_layout)),
                    ..q.clone()
                }
                .resolve()
            })
            .transpose()?;
        Ok(Self {
            roi: options.roi,
            resize,
            color_format,
            normalizer,
            data_layout,
            quantization,
        })
    }

    /// Runs the plan on a frame that passed [`validate_frame`].
    pub fn run(&self, frame: &RawFrame<'_>) -> VisionResult<PixelDataResult> {
        let start = Instant::now();

        let mut buffer = convert_frame(frame).map_err(|e| {
            VisionError::in_stage(ProcessingStage::PixelConversion, frame.format.to_string(), e)
        })?;
        if let Some(region) = self.roi {
            buffer = crop_region(&buffer, region)
                .map_err(|e| VisionError::in_stage(ProcessingStage::Crop, "roi", e))?;
        }
        let mut letterbox = None;
        if let Some(spec) = &self.resize {
            let outcome = resize(&buffer, spec).map_err(|e| {
                VisionError::in_stage(ProcessingStage::Resize, spec.strategy.to_string(), e)
            })?;
            buffer = outcome.buffer;
            letterbox = outcome.transform;
        }
        let buffer = convert_color(&buffer, self.color_format);
        let normalized = self
            .normalizer
            .apply(&buffer)
            .map_err(|e| VisionError::in_stage(ProcessingStage::Normalization, "apply", e))?;
        let tensor = convert_layout(&normalized, self.data_layout);

        let (width, height, channels) = (tensor.width, tensor.height, tensor.channels);
        let mut shape = tensor.shape();
        if self.data_layout.is_batched() {
            shape.insert(0, 1);
        }

        let data = match &self.quantization {
            Some(spec) => TensorData::Quantized(
                quantize(&tensor.data, spec)
                    .map_err(|e| VisionError::in_stage(ProcessingStage::Quantization, "quantize", e))?,
            ),
            None => TensorData::Float(tensor.data),
        };

        let processing_time_ms = start.elapsed().as_secs_f64() * 1000.0;
        debug!(
            width,
            height,
            channels,
            layout = %self.data_layout,
            quantized = self.quantization.is_some(),
            processing_time_ms,
            "pixel data ready"
        );

        Ok(PixelDataResult {
            data,
            shape,
            width,
            height,
            channels,
            color_format: self.color_format,
            data_layout: self.data_layout,
            letterbox,
            processing_time_ms,
        })
    }
}

/// Tensor values, float or quantized.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum TensorData {
    Float(Vec<f32>),
    Quantized(QuantizedData),
}

impl TensorData {
    pub fn len(&self) -> usize {
        match self {
            TensorData::Float(values) => values.len(),
            TensorData::Quantized(values) => values.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Output of the single-image pipeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PixelDataResult {
    pub data: TensorData,
    pub shape: Vec<usize>,
    pub width: u32,
    pub height: u32,
    pub channels: usize,
    pub color_format: ColorFormat,
    pub data_layout: DataLayout,
    /// Present when the resize step letterboxed.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub letterbox: Option<LetterboxTransform>,
    pub processing_time_ms: f64,
}

/// Turns one raw frame into a model-ready tensor.
pub fn get_pixel_data(request: &PixelDataRequest) -> VisionResult<PixelDataResult> {
    let (frame, plan) = request.plan()?;
    plan.run(&frame)
}
