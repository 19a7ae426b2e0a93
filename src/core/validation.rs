//! Validation helpers shared by the processors.
//!
//! Every public operation validates its inputs before doing numeric work; these
//! helpers keep the error messages consistent across call sites.

use crate::core::errors::{VisionError, VisionResult};

/// Ensures `width` and `height` are both non-zero.
pub fn validate_image_dimensions(width: u32, height: u32, context: &str) -> VisionResult<()> {
    if width == 0 || height == 0 {
        return Err(VisionError::invalid_dimensions(format!(
            "{context}: width and height must be > 0, got {width}x{height}"
        )));
    }
    Ok(())
}

/// Ensures a signed dimension coming from a request is strictly positive.
pub fn validate_positive_dimension(value: i64, name: &str) -> VisionResult<u32> {
    if value <= 0 || value > u32::MAX as i64 {
        return Err(VisionError::invalid_dimensions(format!(
            "{name} must be > 0, got {value}"
        )));
    }
    Ok(value as u32)
}

/// Ensures a buffer holds exactly `width * height * channels` values.
pub fn validate_data_length(
    len: usize,
    width: u32,
    height: u32,
    channels: usize,
) -> VisionResult<()> {
    let expected = (width as usize)
        .checked_mul(height as usize)
        .and_then(|pixels| pixels.checked_mul(channels))
        .ok_or_else(|| {
            VisionError::invalid_dimensions(format!(
                "{width}x{height}x{channels} overflows the addressable buffer size"
            ))
        })?;
    if len != expected {
        return Err(VisionError::invalid_dimensions(format!(
            "data length {len} does not match {width}x{height}x{channels} = {expected}"
        )));
    }
    Ok(())
}

/// Ensures a value is finite and strictly positive.
pub fn validate_positive(value: f32, name: &str) -> VisionResult<()> {
    if !value.is_finite() || value <= 0.0 {
        return Err(VisionError::invalid_input(format!(
            "{name} must be a positive finite number, got {value}"
        )));
    }
    Ok(())
}

/// Ensures a value lies inside `[min, max]`.
pub fn validate_range(value: f32, min: f32, max: f32, name: &str) -> VisionResult<()> {
    if !(min..=max).contains(&value) {
        return Err(VisionError::invalid_field(
            name,
            format!("a value in [{min}, {max}]"),
            value.to_string(),
        ));
    }
    Ok(())
}

/// Ensures every value of a slice is finite.
pub fn validate_finite(values: &[f32], name: &str) -> VisionResult<()> {
    if let Some((i, v)) = values.iter().enumerate().find(|(_, v)| !v.is_finite()) {
        return Err(VisionError::invalid_input(format!(
            "{name}[{i}] is not finite: {v}"
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::errors::ErrorCode;

    #[test]
    fn test_validate_image_dimensions() {
        assert!(validate_image_dimensions(1, 1, "test").is_ok());
        let err = validate_image_dimensions(0, 4, "test").unwrap_err();
        assert_eq!(err.code(), ErrorCode::InvalidDimensions);
    }

    #[test]
    fn test_validate_positive_dimension() {
        assert_eq!(validate_positive_dimension(640, "width").unwrap(), 640);
        assert!(validate_positive_dimension(0, "width").is_err());
        assert!(validate_positive_dimension(-3, "height").is_err());
    }

    #[test]
    fn test_validate_data_length() {
        assert!(validate_data_length(12, 2, 2, 3).is_ok());
        assert!(validate_data_length(11, 2, 2, 3).is_err());
        let err = validate_data_length(0, u32::MAX, u32::MAX, usize::MAX).unwrap_err();
        assert_eq!(err.code(), ErrorCode::InvalidDimensions);
    }

    #[test]
    fn test_validate_positive_and_range() {
        assert!(validate_positive(0.5, "scale").is_ok());
        assert!(validate_positive(0.0, "scale").is_err());
        assert!(validate_positive(f32::NAN, "scale").is_err());
        assert!(validate_range(0.5, 0.0, 1.0, "iou").is_ok());
        assert!(validate_range(1.5, 0.0, 1.0, "iou").is_err());
    }

    #[test]
    fn test_validate_finite() {
        assert!(validate_finite(&[0.0, 1.0], "data").is_ok());
        let err = validate_finite(&[0.0, f32::INFINITY], "data").unwrap_err();
        assert!(err.to_string().contains("data[1]"));
    }
}
