//! Mean/std normalization of pixel buffers.
//!
//! A [`Normalizer`] folds `scale`, `mean` and `std` into one affine transform
//! per channel, `out = raw * alpha[c] + beta[c]` with `alpha = scale / std` and
//! `beta = -mean / std`, which is the same as `(raw * scale - mean) / std`.

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::core::errors::{VisionError, VisionResult};
use crate::processors::buffer::PixelBuffer;
use crate::processors::types::NormalizationPreset;

/// ImageNet channel means (RGB, on `[0, 1]` inputs).
pub const IMAGENET_MEAN: [f32; 3] = [0.485, 0.456, 0.406];
/// ImageNet channel standard deviations.
pub const IMAGENET_STD: [f32; 3] = [0.229, 0.224, 0.225];
/// Mean/std pair mapping `[0, 1]` to `[-1, 1]`.
pub const TENSORFLOW_MEAN_STD: [f32; 3] = [0.5, 0.5, 0.5];
/// Default raw-value divisor.
pub const DEFAULT_SCALE: f32 = 1.0 / 255.0;

/// Sparse normalization options as they arrive from a request.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NormalizationSpec {
    /// Named preset; defaults to `scale`.
    #[serde(default)]
    pub preset: Option<NormalizationPreset>,
    /// Per-channel means, required for `custom`.
    #[serde(default)]
    pub mean: Option<Vec<f32>>,
    /// Per-channel standard deviations, required for `custom`.
    #[serde(default)]
    pub std: Option<Vec<f32>>,
    /// Multiplier applied to raw values before mean/std (default `1/255`).
    #[serde(default)]
    pub scale: Option<f32>,
}

/// Per-channel affine normalizer.
#[derive(Debug, Clone, PartialEq)]
pub struct Normalizer {
    /// Preset the normalizer was built from.
    pub preset: NormalizationPreset,
    /// Scaling factors for each channel (alpha = scale / std)
    pub alpha: Vec<f32>,
    /// Offset values for each channel (beta = -mean / std)
    pub beta: Vec<f32>,
}

impl Normalizer {
    /// Resolves a spec for a buffer with `channels` channels.
    ///
    /// Presets carry three-channel statistics; a one-channel buffer uses the
    /// first entry. `custom` statistics must match `channels` exactly.
    ///
    /// # Errors
    ///
    /// `InvalidNormalization` when `custom` lacks mean or std, their lengths
    /// differ from `channels`, any std is not strictly positive, or `scale`
    /// is not a positive finite number.
    pub fn from_spec(spec: &NormalizationSpec, channels: usize) -> VisionResult<Self> {
        let preset = spec.preset.unwrap_or_default();
        let scale = spec.scale.unwrap_or(DEFAULT_SCALE);
        if !scale.is_finite() || scale <= 0.0 {
            return Err(VisionError::invalid_normalization(format!(
                "scale must be a positive finite number, got {scale}"
            )));
        }

        let (mean, std): (Vec<f32>, Vec<f32>) = match preset {
            NormalizationPreset::Imagenet => (
                preset_stats(&IMAGENET_MEAN, channels),
                preset_stats(&IMAGENET_STD, channels),
            ),
            NormalizationPreset::Tensorflow => (
                preset_stats(&TENSORFLOW_MEAN_STD, channels),
                preset_stats(&TENSORFLOW_MEAN_STD, channels),
            ),
            NormalizationPreset::Scale => (vec![0.0; channels], vec![1.0; channels]),
            NormalizationPreset::Raw => {
                return Ok(Self {
                    preset,
                    alpha: vec![1.0; channels],
                    beta: vec![0.0; channels],
                });
            }
            NormalizationPreset::Custom => {
                let mean = spec.mean.clone().ok_or_else(|| {
                    VisionError::invalid_normalization("custom preset requires mean")
                })?;
                let std = spec.std.clone().ok_or_else(|| {
                    VisionError::invalid_normalization("custom preset requires std")
                })?;
                if mean.len() != channels || std.len() != channels {
                    return Err(VisionError::invalid_normalization(format!(
                        "mean/std must have {channels} entries (got mean={}, std={})",
                        mean.len(),
                        std.len()
                    )));
                }
                (mean, std)
            }
        };

        Self::with_stats(preset, scale, &mean, &std)
    }

    /// Builds a normalizer from explicit statistics.
    pub fn with_stats(
        preset: NormalizationPreset,
        scale: f32,
        mean: &[f32],
        std: &[f32],
    ) -> VisionResult<Self> {
        if mean.len() != std.len() {
            return Err(VisionError::invalid_normalization(format!(
                "mean and std lengths differ ({} vs {})",
                mean.len(),
                std.len()
            )));
        }
        for (i, &s) in std.iter().enumerate() {
            if !s.is_finite() || s <= 0.0 {
                return Err(VisionError::invalid_normalization(format!(
                    "standard deviation at index {i} must be greater than 0, got {s}"
                )));
            }
        }
        if let Some((i, m)) = mean.iter().enumerate().find(|(_, m)| !m.is_finite()) {
            return Err(VisionError::invalid_normalization(format!(
                "mean at index {i} is not finite: {m}"
            )));
        }

        let alpha = std.iter().map(|s| scale / s).collect();
        let beta = mean.iter().zip(std).map(|(m, s)| -m / s).collect();
        Ok(Self { preset, alpha, beta })
    }

    /// Number of channels this normalizer was resolved for.
    pub fn channels(&self) -> usize {
        self.alpha.len()
    }

    fn check_channels(&self, channels: usize) -> VisionResult<()> {
        if channels != self.channels() {
            return Err(VisionError::invalid_normalization(format!(
                "normalizer has {} channels, buffer has {channels}",
                self.channels()
            )));
        }
        Ok(())
    }

    /// Normalizes a buffer, keeping its layout.
    ///
    /// The channel of element `i` is `i % C` for HWC and `i / (H * W)` for CHW.
    pub fn apply<T: Copy + Into<f32>>(&self, buffer: &PixelBuffer<T>) -> VisionResult<PixelBuffer<f32>> {
        self.check_channels(buffer.channels)?;
        let channel_of = channel_indexer(buffer);
        let data = buffer
            .data
            .iter()
            .enumerate()
            .map(|(i, &v)| {
                let c = channel_of(i);
                let raw: f32 = v.into();
                raw * self.alpha[c] + self.beta[c]
            })
            .collect();

        debug!(
            preset = %self.preset,
            width = buffer.width,
            height = buffer.height,
            channels = buffer.channels,
            "normalized buffer"
        );

        Ok(PixelBuffer::from_parts(
            buffer.width,
            buffer.height,
            buffer.color_format,
            buffer.layout,
            data,
        ))
    }

    /// Inverts [`Normalizer::apply`], rounding and clamping back to 8 bits.
    pub fn invert(&self, buffer: &PixelBuffer<f32>) -> VisionResult<PixelBuffer<u8>> {
        self.check_channels(buffer.channels)?;
        let channel_of = channel_indexer(buffer);
        let data = buffer
            .data
            .iter()
            .enumerate()
            .map(|(i, &v)| {
                let c = channel_of(i);
                ((v - self.beta[c]) / self.alpha[c]).round().clamp(0.0, 255.0) as u8
            })
            .collect();
        Ok(PixelBuffer::from_parts(
            buffer.width,
            buffer.height,
            buffer.color_format,
            buffer.layout,
            data,
        ))
    }
}

fn preset_stats(stats: &[f32; 3], channels: usize) -> Vec<f32> {
    if channels == 3 {
        stats.to_vec()
    } else {
        vec![stats[0]; channels]
    }
}

/// Maps a flat element index to its channel for the buffer's layout.
fn channel_indexer<T: Copy>(buffer: &PixelBuffer<T>) -> impl Fn(usize) -> usize {
    let channels = buffer.channels;
    let plane = buffer.pixel_count();
    let channel_last = buffer.layout.is_channel_last();
    move |i| {
        if channel_last { i % channels } else { i / plane }
    }
}
