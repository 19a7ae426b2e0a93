//! The core module of the preprocessing pipeline.
//!
//! This module contains the pieces every processor depends on:
//! - Error handling with stable error codes
//! - Configuration and batch policy
//! - Input validation helpers

pub mod config;
pub mod errors;
pub mod validation;

pub use config::{BatchPolicy, ConfigValidator, DEFAULT_BATCH_CONCURRENCY};
pub use errors::{ErrorCode, ProcessingStage, VisionError, VisionResult};
pub use validation::{
    validate_data_length, validate_finite, validate_image_dimensions, validate_positive,
    validate_positive_dimension, validate_range,
};
