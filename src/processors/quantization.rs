//! Fixed-point quantization of float tensors.
//!
//! `q = round(x / scale + zero_point)` clamped to the dtype range, and
//! `x = (q - zero_point) * scale` on the way back. Rounding is half away from
//! zero (`f32::round`), so `0.5` steps always move away from the zero point
//! of the real axis.
//!
//! Parameters are either one pair for the whole tensor or one pair per
//! channel. In per-channel mode the channel of element `i` depends on the
//! layout: channel-last layouts use `i % C`, planar layouts use
//! `(i / plane) % C` where `plane = len / (C * batch_size)`.

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::core::config::ConfigValidator;
use crate::core::errors::{VisionError, VisionResult};
use crate::core::validation::validate_finite;
use crate::processors::types::{DataLayout, QuantDtype, QuantMode};

/// A scalar or per-channel quantization parameter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum QuantParam<T> {
    Scalar(T),
    PerChannel(Vec<T>),
}

impl<T: Copy> QuantParam<T> {
    /// Value for `channel`; scalars apply to every channel.
    #[inline]
    pub fn get(&self, channel: usize) -> T {
        match self {
            QuantParam::Scalar(v) => *v,
            QuantParam::PerChannel(vs) => vs[channel],
        }
    }

    fn values(&self) -> &[T] {
        match self {
            QuantParam::Scalar(v) => std::slice::from_ref(v),
            QuantParam::PerChannel(vs) => vs,
        }
    }
}

/// Quantized values in their storage type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum QuantizedData {
    Int8(Vec<i8>),
    Uint8(Vec<u8>),
    Int16(Vec<i16>),
}

impl QuantizedData {
    /// Storage type of the values.
    pub fn dtype(&self) -> QuantDtype {
        match self {
            QuantizedData::Int8(_) => QuantDtype::Int8,
            QuantizedData::Uint8(_) => QuantDtype::Uint8,
            QuantizedData::Int16(_) => QuantDtype::Int16,
        }
    }

    pub fn len(&self) -> usize {
        match self {
            QuantizedData::Int8(v) => v.len(),
            QuantizedData::Uint8(v) => v.len(),
            QuantizedData::Int16(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Values widened to `i32`.
    pub fn to_i32(&self) -> Vec<i32> {
        match self {
            QuantizedData::Int8(v) => v.iter().map(|&q| q as i32).collect(),
            QuantizedData::Uint8(v) => v.iter().map(|&q| q as i32).collect(),
            QuantizedData::Int16(v) => v.iter().map(|&q| q as i32).collect(),
        }
    }

    /// Narrows integer values to `dtype`, rejecting any that do not fit.
    pub fn from_values(dtype: QuantDtype, values: &[i64]) -> VisionResult<Self> {
        let (qmin, qmax) = (dtype.qmin() as i64, dtype.qmax() as i64);
        if let Some((i, v)) = values
            .iter()
            .enumerate()
            .find(|(_, v)| !(qmin..=qmax).contains(*v))
        {
            return Err(VisionError::invalid_quantization(format!(
                "data[{i}] = {v} is outside the {dtype} range [{qmin}, {qmax}]"
            )));
        }
        Ok(match dtype {
            QuantDtype::Int8 => QuantizedData::Int8(values.iter().map(|&v| v as i8).collect()),
            QuantDtype::Uint8 => QuantizedData::Uint8(values.iter().map(|&v| v as u8).collect()),
            QuantDtype::Int16 => QuantizedData::Int16(values.iter().map(|&v| v as i16).collect()),
        })
    }
}

/// Fully resolved quantization parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QuantizationSpec {
    pub dtype: QuantDtype,
    pub mode: QuantMode,
    pub scale: QuantParam<f32>,
    pub zero_point: QuantParam<i32>,
    /// Layout of the data; decides the channel of each element in per-channel mode.
    pub data_layout: DataLayout,
    /// Channel count; required in per-channel mode.
    pub channels: Option<usize>,
    /// Number of images in planar batched data.
    pub batch_size: usize,
}

impl QuantizationSpec {
    /// Per-tensor parameters.
    pub fn per_tensor(dtype: QuantDtype, scale: f32, zero_point: i32) -> Self {
        Self {
            dtype,
            mode: QuantMode::PerTensor,
            scale: QuantParam::Scalar(scale),
            zero_point: QuantParam::Scalar(zero_point),
            data_layout: DataLayout::Hwc,
            channels: None,
            batch_size: 1,
        }
    }

    /// Per-channel parameters for data in `data_layout`.
    pub fn per_channel(
        dtype: QuantDtype,
        scale: Vec<f32>,
        zero_point: Vec<i32>,
        data_layout: DataLayout,
    ) -> Self {
        Self {
            dtype,
            mode: QuantMode::PerChannel,
            channels: Some(scale.len()),
            scale: QuantParam::PerChannel(scale),
            zero_point: QuantParam::PerChannel(zero_point),
            data_layout,
            batch_size: 1,
        }
    }

    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size;
        self
    }

    /// Channel lookup for a tensor of `len` elements.
    fn channel_indexer(&self, len: usize) -> VisionResult<ChannelIndexer> {
        match self.mode {
            QuantMode::PerTensor => Ok(ChannelIndexer::Single),
            QuantMode::PerChannel => {
                let channels = self.channels.unwrap_or(0);
                ChannelIndexer::new(len, channels, self.data_layout, self.batch_size)
            }
        }
    }
}

impl ConfigValidator for QuantizationSpec {
    fn validate(&self) -> VisionResult<()> {
        let (qmin, qmax) = (self.dtype.qmin(), self.dtype.qmax());
        match self.mode {
            QuantMode::PerTensor => {
                if !matches!(self.scale, QuantParam::Scalar(_))
                    || !matches!(self.zero_point, QuantParam::Scalar(_))
                {
                    return Err(VisionError::invalid_quantization(
                        "per-tensor mode expects scalar scale and zeroPoint",
                    ));
                }
            }
            QuantMode::PerChannel => {
                let channels = self.channels.filter(|&c| c > 0).ok_or_else(|| {
                    VisionError::invalid_quantization("per-channel mode requires channels > 0")
                })?;
                for (name, len) in [
                    ("scale", per_channel_len(&self.scale)),
                    ("zeroPoint", per_channel_len(&self.zero_point)),
                ] {
                    if len != Some(channels) {
                        return Err(VisionError::invalid_quantization(format!(
                            "per-channel {name} must have {channels} entries, got {}",
                            len.map_or_else(|| "a scalar".to_string(), |l| l.to_string())
                        )));
                    }
                }
            }
        }
        if self.batch_size == 0 {
            return Err(VisionError::invalid_quantization("batchSize must be > 0"));
        }
        if let Some(s) = self.scale.values().iter().find(|s| !s.is_finite() || **s <= 0.0) {
            return Err(VisionError::invalid_quantization(format!(
                "scale must be a positive finite number, got {s}"
            )));
        }
        if let Some(z) = self.zero_point.values().iter().find(|z| !(qmin..=qmax).contains(*z)) {
            return Err(VisionError::invalid_quantization(format!(
                "zeroPoint {z} is outside the {} range [{qmin}, {qmax}]",
                self.dtype
            )));
        }
        Ok(())
    }
}

fn per_channel_len<T>(param: &QuantParam<T>) -> Option<usize> {
    match param {
        QuantParam::Scalar(_) => None,
        QuantParam::PerChannel(v) => Some(v.len()),
    }
}

/// Maps a flat element index to its channel.
#[derive(Debug, Clone, Copy)]
enum ChannelIndexer {
    Single,
    Interleaved { channels: usize },
    Planar { channels: usize, plane: usize },
}

impl ChannelIndexer {
    fn new(len: usize, channels: usize, layout: DataLayout, batch_size: usize) -> VisionResult<Self> {
        if channels == 0 || batch_size == 0 {
            return Err(VisionError::invalid_quantization(
                "channels and batchSize must be > 0",
            ));
        }
        let group = channels * batch_size;
        if len % group != 0 {
            return Err(VisionError::invalid_quantization(format!(
                "data length {len} is not divisible by channels * batchSize = {group}"
            )));
        }
        if layout.is_channel_last() {
            Ok(ChannelIndexer::Interleaved { channels })
        } else {
            Ok(ChannelIndexer::Planar {
                channels,
                plane: (len / group).max(1),
            })
        }
    }

    #[inline]
    fn channel(&self, i: usize) -> usize {
        match *self {
            ChannelIndexer::Single => 0,
            ChannelIndexer::Interleaved { channels } => i % channels,
            ChannelIndexer::Planar { channels, plane } => (i / plane) % channels,
        }
    }
}

/// Quantizes `data` with the given parameters.
///
/// # Errors
///
/// `InvalidQuantization` for inconsistent parameters; `InvalidInput` for
/// non-finite data.
pub fn quantize(data: &[f32], spec: &QuantizationSpec) -> VisionResult<QuantizedData> {
    spec.validate()?;
    validate_finite(data, "data")?;
    let indexer = spec.channel_indexer(data.len())?;
    let (qmin, qmax) = (spec.dtype.qmin() as f32, spec.dtype.qmax() as f32);

    let values: Vec<i64> = data
        .iter()
        .enumerate()
        .map(|(i, &x)| {
            let c = indexer.channel(i);
            let q = (x / spec.scale.get(c) + spec.zero_point.get(c) as f32).round();
            q.clamp(qmin, qmax) as i64
        })
        .collect();

    debug!(
        dtype = %spec.dtype,
        mode = %spec.mode,
        len = data.len(),
        "quantized tensor"
    );
    QuantizedData::from_values(spec.dtype, &values)
}

/// Maps quantized values back to floats.
pub fn dequantize(data: &QuantizedData, spec: &QuantizationSpec) -> VisionResult<Vec<f32>> {
    spec.validate()?;
    if data.dtype() != spec.dtype {
        return Err(VisionError::invalid_quantization(format!(
            "data is {} but parameters are for {}",
            data.dtype(),
            spec.dtype
        )));
    }
    let indexer = spec.channel_indexer(data.len())?;
    Ok(data
        .to_i32()
        .into_iter()
        .enumerate()
        .map(|(i, q)| {
            let c = indexer.channel(i);
            (q - spec.zero_point.get(c)) as f32 * spec.scale.get(c)
        })
        .collect())
}

/// Parameters derived from observed data.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QuantizationParams {
    pub scale: QuantParam<f32>,
    pub zero_point: QuantParam<i32>,
    pub min: QuantParam<f32>,
    pub max: QuantParam<f32>,
}

/// Solves scale and zero point for one observed range.
///
/// Asymmetric: `scale = (max - min) / (qmax - qmin)`,
/// `zero_point = round(qmin - min / scale)` clamped to the dtype range.
/// Symmetric: `zero_point = 0`, `scale = max(|min|, |max|) / qmax`.
/// A zero range yields `scale = 1.0`.
pub fn solve_params(min: f32, max: f32, dtype: QuantDtype, symmetric: bool) -> (f32, i32) {
    let (qmin, qmax) = (dtype.qmin(), dtype.qmax());
    if symmetric {
        let bound = min.abs().max(max.abs());
        let scale = if bound > 0.0 { bound / qmax as f32 } else { 1.0 };
        return (scale, 0);
    }
    let range = max - min;
    let scale = if range > 0.0 {
        range / (qmax - qmin) as f32
    } else {
        1.0
    };
    let zero_point = (qmin as f32 - min / scale).round().clamp(qmin as f32, qmax as f32) as i32;
    (scale, zero_point)
}

/// Derives quantization parameters from the observed range of `data`.
pub fn calculate_quantization_params(
    data: &[f32],
    dtype: QuantDtype,
    mode: QuantMode,
    channels: Option<usize>,
    data_layout: DataLayout,
    batch_size: usize,
    symmetric: bool,
) -> VisionResult<QuantizationParams> {
    if data.is_empty() {
        return Err(VisionError::invalid_input("cannot derive parameters from empty data"));
    }
    validate_finite(data, "data")?;

    let (indexer, groups) = match mode {
        QuantMode::PerTensor => (ChannelIndexer::Single, 1),
        QuantMode::PerChannel => {
            let channels = channels.ok_or_else(|| {
                VisionError::invalid_quantization("per-channel mode requires channels")
            })?;
            (
                ChannelIndexer::new(data.len(), channels, data_layout, batch_size)?,
                channels,
            )
        }
    };

    let mut mins = vec![f32::INFINITY; groups];
    let mut maxs = vec![f32::NEG_INFINITY; groups];
    for (i, &x) in data.iter().enumerate() {
        let c = indexer.channel(i);
        mins[c] = mins[c].min(x);
        maxs[c] = maxs[c].max(x);
    }

    let (scales, zero_points): (Vec<f32>, Vec<i32>) = mins
        .iter()
        .zip(&maxs)
        .map(|(&lo, &hi)| {
            if hi - lo <= 0.0 {
                warn!(min = lo, max = hi, "zero quantization range, using scale 1.0");
            }
            solve_params(lo, hi, dtype, symmetric)
        })
        .unzip();

    Ok(match mode {
        QuantMode::PerTensor => QuantizationParams {
            scale: QuantParam::Scalar(scales[0]),
            zero_point: QuantParam::Scalar(zero_points[0]),
            min: QuantParam::Scalar(mins[0]),
            max: QuantParam::Scalar(maxs[0]),
        },
        QuantMode::PerChannel => QuantizationParams {
            scale: QuantParam::PerChannel(scales),
            zero_point: QuantParam::PerChannel(zero_points),
            min: QuantParam::PerChannel(mins),
            max: QuantParam::PerChannel(maxs),
        },
    })
}
