//! Tensor-level operations: quantization, permutation and batching.

use serde::{Deserialize, Serialize};

use crate::core::config::ConfigValidator;
use crate::core::errors::{VisionError, VisionResult};
use crate::processors::buffer::PixelBuffer;
use crate::processors::layout::{self, BatchTensor, Tensor};
use crate::processors::quantization::{
    self, QuantParam, QuantizationParams, QuantizationSpec, QuantizedData,
};
use crate::processors::types::{DataLayout, QuantDtype, QuantMode};

/// Sparse quantize/dequantize options.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QuantizeOptions {
    #[serde(default)]
    pub dtype: Option<QuantDtype>,
    /// Inferred from the shape of `scale` when absent.
    #[serde(default)]
    pub mode: Option<QuantMode>,
    #[serde(default)]
    pub scale: Option<QuantParam<f32>>,
    #[serde(default)]
    pub zero_point: Option<QuantParam<i32>>,
    #[serde(default)]
    pub data_layout: Option<DataLayout>,
    /// Defaults to the number of per-channel scales.
    #[serde(default)]
    pub channels: Option<usize>,
    #[serde(default)]
    pub batch_size: Option<usize>,
}

impl QuantizeOptions {
    pub fn per_tensor(dtype: QuantDtype, scale: f32, zero_point: i32) -> Self {
        Self {
            dtype: Some(dtype),
            scale: Some(QuantParam::Scalar(scale)),
            zero_point: Some(QuantParam::Scalar(zero_point)),
            ..Default::default()
        }
    }

    /// Fills in defaults and validates the result.
    ///
    /// # Errors
    ///
    /// `MissingQuantizationParams` when `scale` or `zeroPoint` is absent, then
    /// anything [`QuantizationSpec::validate`] reports.
    pub fn resolve(&self) -> VisionResult<QuantizationSpec> {
        let scale = self
            .scale
            .clone()
            .ok_or(VisionError::MissingQuantizationParams { missing: "scale" })?;
        let zero_point = self
            .zero_point
            .clone()
            .ok_or(VisionError::MissingQuantizationParams {
                missing: "zeroPoint",
            })?;
        let mode = self.mode.unwrap_or(match scale {
            QuantParam::Scalar(_) => QuantMode::PerTensor,
            QuantParam::PerChannel(_) => QuantMode::PerChannel,
        });
        let channels = self.channels.or(match &scale {
            QuantParam::PerChannel(values) => Some(values.len()),
            QuantParam::Scalar(_) => None,
        });
        QuantizationSpec {
            dtype: self.dtype.unwrap_or_default(),
            mode,
            scale,
            zero_point,
            data_layout: self.data_layout.unwrap_or_default(),
            channels,
            batch_size: self.batch_size.unwrap_or(1),
        }
        .validated()
    }
}

/// Quantized data together with the parameters that produced it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QuantizeResponse {
    pub data: QuantizedData,
    pub dtype: QuantDtype,
    pub mode: QuantMode,
    pub scale: QuantParam<f32>,
    pub zero_point: QuantParam<i32>,
}

pub fn quantize(data: &[f32], options: &QuantizeOptions) -> VisionResult<QuantizeResponse> {
    let spec = options.resolve()?;
    let quantized = quantization::quantize(data, &spec)?;
    Ok(QuantizeResponse {
        data: quantized,
        dtype: spec.dtype,
        mode: spec.mode,
        scale: spec.scale,
        zero_point: spec.zero_point,
    })
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DequantizeResponse {
    pub data: Vec<f32>,
}

/// Dequantizes integer values, rejecting any outside the dtype's range.
pub fn dequantize(data: &[i64], options: &QuantizeOptions) -> VisionResult<DequantizeResponse> {
    let spec = options.resolve()?;
    let quantized = QuantizedData::from_values(spec.dtype, data)?;
    Ok(DequantizeResponse {
        data: quantization::dequantize(&quantized, &spec)?,
    })
}

/// Sparse options for deriving parameters from data.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QuantizationParamsOptions {
    #[serde(default)]
    pub dtype: Option<QuantDtype>,
    #[serde(default)]
    pub mode: Option<QuantMode>,
    #[serde(default)]
    pub channels: Option<usize>,
    #[serde(default)]
    pub data_layout: Option<DataLayout>,
    #[serde(default)]
    pub batch_size: Option<usize>,
    /// Force `zeroPoint = 0`; defaults to `false`.
    #[serde(default)]
    pub symmetric: Option<bool>,
}

pub fn calculate_quantization_params(
    data: &[f32],
    options: &QuantizationParamsOptions,
) -> VisionResult<QuantizationParams> {
    quantization::calculate_quantization_params(
        data,
        options.dtype.unwrap_or_default(),
        options.mode.unwrap_or_default(),
        options.channels,
        options.data_layout.unwrap_or_default(),
        options.batch_size.unwrap_or(1),
        options.symmetric.unwrap_or(false),
    )
}

/// Reorders the axes of a flat tensor.
pub fn permute(data: &[f32], shape: &[usize], order: &[usize]) -> VisionResult<Tensor<f32>> {
    layout::permute(data, shape, order)
}

/// Sparse batch assembly options.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AssembleBatchOptions {
    /// `nhwc` or `nchw` (single-image names map to their batched form).
    /// Defaults to `nhwc`.
    #[serde(default)]
    pub layout: Option<DataLayout>,
    #[serde(default)]
    pub pad_to_size: Option<usize>,
}

pub fn assemble_batch(
    buffers: &[PixelBuffer<f32>],
    options: &AssembleBatchOptions,
) -> VisionResult<BatchTensor<f32>> {
    let layout = options.layout.unwrap_or(DataLayout::Nhwc).batched();
    layout::assemble_batch(buffers, layout, options.pad_to_size)
}

pub fn concatenate_to_batch(tensors: &[Tensor<f32>]) -> VisionResult<BatchTensor<f32>> {
    layout::concatenate_to_batch(tensors)
}
