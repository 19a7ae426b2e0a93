//! Error handling for the preprocessing pipeline.

mod types;

pub use types::{ErrorCode, ProcessingStage, VisionError, VisionResult};
