//! Error types for the calibration pipeline.
//!
//! Per-straw conditions (`InsufficientData`, `FitDivergence`, `SingularFit`,
//! `OutOfRange`) are caught by the orchestrator and recorded on the straw.
//! Only `Configuration` aborts a run.

use std::fmt;

#[derive(Debug, Clone, PartialEq)]
pub enum CalibrationError {
    /// Too few hits or too few matched peaks to attempt a fit
    InsufficientData(String),

    /// Gaussian refinement did not converge
    FitDivergence(String),

    /// Least-squares system is rank deficient
    SingularFit(String),

    /// Corrected position left `[0, resolution)` at a range-checked pixel
    OutOfRange { pixel: usize, value: f64 },

    /// Invalid global configuration, fatal for the whole run
    Configuration(String),
}

impl fmt::Display for CalibrationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CalibrationError::InsufficientData(msg) => write!(f, "insufficient data: {msg}"),
            CalibrationError::FitDivergence(msg) => write!(f, "gaussian fit diverged: {msg}"),
            CalibrationError::SingularFit(msg) => write!(f, "singular polynomial fit: {msg}"),
            CalibrationError::OutOfRange { pixel, value } => {
                write!(f, "pixel {pixel} maps to {value:.3}, outside valid range")
            }
            CalibrationError::Configuration(msg) => write!(f, "invalid configuration: {msg}"),
        }
    }
}

impl std::error::Error for CalibrationError {}

pub type CalibrationResult<T> = Result<T, CalibrationError>;

/// Class of a per-straw failure, used when summarizing a run.
#[derive(Debug, Clone, Copy, Hash, Eq, PartialEq, PartialOrd, Ord)]
pub enum ErrorCategory {
    InsufficientData,
    SingularFit,
    OutOfRange,
}

impl ErrorCategory {
    pub fn display_name(&self) -> &'static str {
        match self {
            Self::InsufficientData => "Insufficient data",
            Self::SingularFit => "Singular fit",
            Self::OutOfRange => "Out of range",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_messages() {
        let e = CalibrationError::OutOfRange {
            pixel: 491,
            value: 665.25,
        };
        assert_eq!(e.to_string(), "pixel 491 maps to 665.250, outside valid range");

        let e = CalibrationError::Configuration("resolution must be positive".to_string());
        assert!(e.to_string().starts_with("invalid configuration"));
    }

    #[test]
    fn test_categories_sort_in_pipeline_order() {
        assert!(ErrorCategory::InsufficientData < ErrorCategory::SingularFit);
        assert!(ErrorCategory::SingularFit < ErrorCategory::OutOfRange);
        assert_eq!(ErrorCategory::OutOfRange.display_name(), "Out of range");
    }
}
