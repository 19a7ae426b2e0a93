//! # vision-utils
//!
//! Turns raw camera and image buffers into normalized tensors for on-device
//! inference, and maps model outputs back into source-image coordinates.
//!
//! The crate is organised in layers:
//! - [`core`]: errors with stable codes, configuration, validation helpers
//! - [`processors`]: the numeric transforms (YUV decoding, resize and
//!   letterbox, normalization, quantization, layout, box geometry, NMS)
//! - [`api`]: one function per public operation, taking sparse options
//! - [`utils`]: logging setup
//!
//! ```
//! use vision_utils::api::{FrameOptions, PixelDataRequest, get_pixel_data};
//!
//! let request = PixelDataRequest::new(vec![128; 16], FrameOptions::new(4, 4, "gray"));
//! let result = get_pixel_data(&request)?;
//! assert_eq!(result.shape, vec![4, 4, 3]);
//! # Ok::<(), vision_utils::core::VisionError>(())
//! ```

pub mod api;
pub mod core;
pub mod processors;
pub mod utils;

pub use crate::core::{ErrorCode, VisionError, VisionResult};
pub use crate::processors::{BoxFormat, DataLayout, PixelBuffer, PixelFormat, RawFrame};
