//! Numeric validation utilities
//!
//! Range checks for removal options and engine settings.

use crate::error::{RemovalError, Result};
use std::ops::RangeInclusive;

/// Validator for numeric option values
pub struct NumericValidator;

impl NumericValidator {
    /// Validate a finite float against an inclusive range
    pub fn validate_in_range(name: &str, value: f32, range: &RangeInclusive<f32>) -> Result<f32> {
        if !value.is_finite() {
            return Err(RemovalError::validation(format!(
                "{} must be finite, got {}",
                name, value
            )));
        }

        if !range.contains(&value) {
            return Err(RemovalError::config_value_error(
                name,
                value,
                &format!("{:.1}-{:.1}", range.start(), range.end()),
            ));
        }

        Ok(value)
    }

    /// Validate quality setting (0-100)
    pub fn validate_quality(value: u8) -> Result<u8> {
        if value > 100 {
            return Err(RemovalError::validation(format!(
                "Quality must be between 0 and 100, got {}",
                value
            )));
        }
        Ok(value)
    }

    /// Validate that a value is positive
    pub fn validate_positive<T>(value: T, name: &str) -> Result<T>
    where
        T: PartialOrd + std::fmt::Display + Copy + Default,
    {
        if value <= T::default() {
            return Err(RemovalError::validation(format!(
                "{} must be positive, got {}",
                name, value
            )));
        }
        Ok(value)
    }
}
