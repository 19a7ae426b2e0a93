//! Configuration management for the preprocessing pipeline.
//!
//! Option structs throughout the crate are sparse (`Option` fields) at the
//! request boundary and get resolved into fully populated values before use.
//! The [`ConfigValidator`] trait is the second half of that step.

pub mod parallel;

pub use parallel::{BatchPolicy, DEFAULT_BATCH_CONCURRENCY};

use crate::core::errors::VisionResult;

/// Validation applied to a fully resolved configuration value.
pub trait ConfigValidator {
    /// Checks internal consistency, returning the first problem found.
    fn validate(&self) -> VisionResult<()>;

    /// Validates and hands the value back, for builder-style call chains.
    fn validated(self) -> VisionResult<Self>
    where
        Self: Sized,
    {
        self.validate()?;
        Ok(self)
    }
}
