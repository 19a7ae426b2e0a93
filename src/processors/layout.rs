//! Tensor layout transforms.
//!
//! Axis permutation for arbitrary rank tensors, HWC/CHW conversion for single
//! images, and assembly of single images into NHWC/NCHW batches.

use itertools::Itertools;
use ndarray::{ArrayViewD, IxDyn};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::core::errors::{VisionError, VisionResult};
use crate::processors::buffer::PixelBuffer;
use crate::processors::types::DataLayout;

/// A flat tensor with its shape.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Tensor<T = f32> {
    /// Row-major element storage.
    pub data: Vec<T>,
    /// Extent of each axis.
    pub shape: Vec<usize>,
}

impl<T> Tensor<T> {
    /// Checks that `data` holds exactly `product(shape)` elements.
    pub fn validate(&self) -> VisionResult<()> {
        let expected: usize = self.shape.iter().product();
        if expected != self.data.len() {
            return Err(VisionError::invalid_dimensions(format!(
                "shape {:?} needs {expected} elements, got {}",
                self.shape,
                self.data.len()
            )));
        }
        Ok(())
    }
}

/// A batched tensor together with its (possibly padded) batch size.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchTensor<T = f32> {
    /// Row-major element storage.
    pub data: Vec<T>,
    /// Extent of each axis; `shape[0]` is the batch axis.
    pub shape: Vec<usize>,
    /// Number of entries along the batch axis, including zero padding.
    pub batch_size: usize,
}

/// Checks that `order` is a permutation of `0..shape.len()`.
fn validate_permutation(shape: &[usize], order: &[usize]) -> VisionResult<()> {
    let invalid = || VisionError::InvalidPermutation {
        order: order.to_vec(),
        shape: shape.to_vec(),
    };
    if order.len() != shape.len() {
        return Err(invalid());
    }
    let mut seen = vec![false; order.len()];
    for &axis in order {
        if axis >= order.len() || seen[axis] {
            return Err(invalid());
        }
        seen[axis] = true;
    }
    Ok(())
}

/// Permutes the axes of a row-major tensor.
///
/// Output axis `i` is input axis `order[i]`, the same convention as
/// `numpy.transpose` and `torch.permute`.
///
/// # Errors
///
/// * `InvalidPermutation` when `order` is not a permutation of the axes.
/// * `InvalidDimensions` when `data.len()` does not match the shape.
pub fn permute<T: Clone>(
    data: &[T],
    shape: &[usize],
    order: &[usize],
) -> VisionResult<Tensor<T>> {
    validate_permutation(shape, order)?;
    let expected: usize = shape.iter().product();
    if expected != data.len() {
        return Err(VisionError::invalid_dimensions(format!(
            "shape {shape:?} needs {expected} elements, got {}",
            data.len()
        )));
    }

    let view = ArrayViewD::from_shape(IxDyn(shape), data)?;
    let permuted = view.permuted_axes(IxDyn(order));
    let new_shape = permuted.shape().to_vec();
    // Iteration is in logical (row-major) order of the permuted view.
    let new_data: Vec<T> = permuted.iter().cloned().collect();

    Ok(Tensor {
        data: new_data,
        shape: new_shape,
    })
}

/// Converts a single image between HWC and CHW.
///
/// Batched targets are mapped to their per-image counterpart.
pub fn convert_layout<T: Copy>(buffer: &PixelBuffer<T>, target: DataLayout) -> PixelBuffer<T> {
    let target = target.single();
    if buffer.layout == target {
        return buffer.clone();
    }

    let plane = buffer.pixel_count();
    let channels = buffer.channels;
    let data: Vec<T> = if target == DataLayout::Chw {
        (0..channels)
            .flat_map(|c| (0..plane).map(move |p| buffer.data[p * channels + c]))
            .collect()
    } else {
        (0..plane)
            .flat_map(|p| (0..channels).map(move |c| buffer.data[c * plane + p]))
            .collect()
    };

    PixelBuffer::from_parts(buffer.width, buffer.height, buffer.color_format, target, data)
}

/// Stacks single images into an NHWC or NCHW batch.
///
/// Each image is converted to the per-image layout of `layout` first. When
/// `pad_to_size` exceeds the number of images, zero-filled images are appended
/// until the batch axis reaches it.
///
/// # Errors
///
/// * `InvalidInput` when `buffers` is empty.
/// * `DimensionMismatch` naming the first image whose size differs from the first one.
pub fn assemble_batch<T: Copy + Default>(
    buffers: &[PixelBuffer<T>],
    layout: DataLayout,
    pad_to_size: Option<usize>,
) -> VisionResult<BatchTensor<T>> {
    let first = buffers
        .first()
        .ok_or_else(|| VisionError::invalid_input("cannot assemble an empty batch"))?;
    let dims = |b: &PixelBuffer<T>| vec![b.height as usize, b.width as usize, b.channels];
    let expected = dims(first);
    for (index, buffer) in buffers.iter().enumerate() {
        buffer
            .validate()
            .map_err(|e| VisionError::invalid_input(format!("batch item {index}: {e}")))?;
        let actual = dims(buffer);
        if actual != expected {
            return Err(VisionError::DimensionMismatch {
                index,
                expected,
                actual,
            });
        }
    }

    let per_image = first.data.len();
    let batch_size = pad_to_size.unwrap_or(0).max(buffers.len());
    let mut data = Vec::with_capacity(per_image * batch_size);
    for buffer in buffers {
        data.extend(convert_layout(buffer, layout).data);
    }
    data.resize(per_image * batch_size, T::default());

    let (h, w, c) = (expected[0], expected[1], expected[2]);
    let shape = if layout.is_channel_last() {
        vec![batch_size, h, w, c]
    } else {
        vec![batch_size, c, h, w]
    };

    debug!(
        images = buffers.len(),
        padded = batch_size - buffers.len(),
        ?shape,
        "assembled batch"
    );

    Ok(BatchTensor {
        data,
        shape,
        batch_size,
    })
}

/// Concatenates already-processed tensors along a new batch axis.
///
/// A leading unit axis (shape `[1, ...]`) is treated as an existing batch axis
/// and merged, so four `[1, 3, 224, 224]` tensors become `[4, 3, 224, 224]`.
///
/// # Errors
///
/// * `InvalidInput` when `tensors` is empty.
/// * `InvalidDimensions` when a tensor's data does not match its shape.
/// * `DimensionMismatch` naming the first tensor with a different shape.
pub fn concatenate_to_batch<T: Clone>(tensors: &[Tensor<T>]) -> VisionResult<BatchTensor<T>> {
    let first = tensors
        .first()
        .ok_or_else(|| VisionError::invalid_input("cannot concatenate an empty list"))?;
    for (index, tensor) in tensors.iter().enumerate() {
        tensor
            .validate()
            .map_err(|e| VisionError::invalid_input(format!("tensor {index}: {e}")))?;
        if tensor.shape != first.shape {
            return Err(VisionError::DimensionMismatch {
                index,
                expected: first.shape.clone(),
                actual: tensor.shape.clone(),
            });
        }
    }

    let item_shape: &[usize] = match first.shape.split_first() {
        Some((1, rest)) if !rest.is_empty() => rest,
        _ => &first.shape,
    };
    let shape = std::iter::once(tensors.len())
        .chain(item_shape.iter().copied())
        .collect_vec();
    let data = tensors.iter().flat_map(|t| t.data.iter().cloned()).collect();

    Ok(BatchTensor {
        data,
        shape,
        batch_size: tensors.len(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::ErrorCode;
    use crate::processors::types::ColorFormat;

    #[test]
    fn test_permute_2d_transpose() {
        let out = permute(&[1, 2, 3, 4, 5, 6], &[2, 3], &[1, 0]).unwrap();
        assert_eq!(out.shape, vec![3, 2]);
        assert_eq!(out.data, vec![1, 4, 2, 5, 3, 6]);
    }

    #[test]
    fn test_permute_hwc_to_chw() {
        // 1x2 image, 3 channels: pixels (1,2,3) and (4,5,6)
        let out = permute(&[1, 2, 3, 4, 5, 6], &[1, 2, 3], &[2, 0, 1]).unwrap();
        assert_eq!(out.shape, vec![3, 1, 2]);
        assert_eq!(out.data, vec![1, 4, 2, 5, 3, 6]);
    }

    #[test]
    fn test_permute_identity() {
        let out = permute(&[1.0f32, 2.0], &[2], &[0]).unwrap();
        assert_eq!(out.data, vec![1.0, 2.0]);
    }

    #[test]
    fn test_permute_rejects_bad_orders() {
        let data = [0u8; 6];
        let orders: [&[usize]; 4] = [&[0, 0], &[0, 2], &[0], &[1, 0, 2]];
        for order in orders {
            let err = permute(&data, &[2, 3], order).unwrap_err();
            assert_eq!(err.code(), ErrorCode::InvalidPermutation);
        }
        let err = permute(&data, &[2, 2], &[1, 0]).unwrap_err();
        assert_eq!(err.code(), ErrorCode::InvalidDimensions);
    }

    #[test]
    fn test_convert_layout_round_trip() {
        let hwc = PixelBuffer::from_parts(
            2,
            1,
            ColorFormat::Rgb,
            DataLayout::Hwc,
            vec![1u8, 2, 3, 4, 5, 6],
        );
        let chw = convert_layout(&hwc, DataLayout::Nchw);
        assert_eq!(chw.layout, DataLayout::Chw);
        assert_eq!(chw.data, vec![1, 4, 2, 5, 3, 6]);
        assert_eq!(convert_layout(&chw, DataLayout::Hwc), hwc);
    }

    #[test]
    fn test_assemble_batch_nchw_with_padding() {
        let a = PixelBuffer::from_parts(1, 1, ColorFormat::Rgb, DataLayout::Hwc, vec![1.0f32, 2.0, 3.0]);
        let b = PixelBuffer::from_parts(1, 1, ColorFormat::Rgb, DataLayout::Hwc, vec![4.0f32, 5.0, 6.0]);
        let batch = assemble_batch(&[a, b], DataLayout::Nchw, Some(3)).unwrap();
        assert_eq!(batch.shape, vec![3, 3, 1, 1]);
        assert_eq!(batch.batch_size, 3);
        assert_eq!(
            batch.data,
            vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0, 0.0, 0.0, 0.0]
        );
    }

    #[test]
    fn test_assemble_batch_dimension_mismatch_names_index() {
        let a = PixelBuffer::filled(2, 2, ColorFormat::Rgb, &[0]);
        let b = PixelBuffer::filled(2, 2, ColorFormat::Rgb, &[0]);
        let c = PixelBuffer::filled(3, 2, ColorFormat::Rgb, &[0]);
        let err = assemble_batch(&[a, b, c], DataLayout::Nhwc, None).unwrap_err();
        match err {
            VisionError::DimensionMismatch { index, .. } => assert_eq!(index, 2),
            other => panic!("unexpected error {other:?}"),
        }
    }

    #[test]
    fn test_assemble_batch_empty() {
        let err = assemble_batch::<u8>(&[], DataLayout::Nhwc, None).unwrap_err();
        assert_eq!(err.code(), ErrorCode::InvalidInput);
    }

    #[test]
    fn test_concatenate_merges_unit_batch_axis() {
        let t = Tensor {
            data: vec![0.0f32; 6],
            shape: vec![1, 3, 1, 2],
        };
        let batch = concatenate_to_batch(&[t.clone(), t]).unwrap();
        assert_eq!(batch.shape, vec![2, 3, 1, 2]);
        assert_eq!(batch.data.len(), 12);
    }

    #[test]
    fn test_concatenate_adds_axis_and_checks_shapes() {
        let a = Tensor {
            data: vec![1, 2, 3],
            shape: vec![3],
        };
        let batch = concatenate_to_batch(&[a.clone(), a.clone()]).unwrap();
        assert_eq!(batch.shape, vec![2, 3]);

        let b = Tensor {
            data: vec![1, 2],
            shape: vec![2],
        };
        let err = concatenate_to_batch(&[a, b]).unwrap_err();
        assert_eq!(err.code(), ErrorCode::DimensionMismatch);
    }
}
