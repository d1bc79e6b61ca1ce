use crate::error::CalibrationError;
use crate::polynomial::evaluate;

/// First range-checked pixel whose calibrated position left `[0, resolution)`
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RangeViolation {
    pub pixel: usize,
    pub value: f64,
}

impl From<RangeViolation> for CalibrationError {
    fn from(v: RangeViolation) -> Self {
        CalibrationError::OutOfRange {
            pixel: v.pixel,
            value: v.value,
        }
    }
}

/// Check that the calibration keeps every pixel in `[margin, resolution - margin)`
/// inside `[0, resolution)`.
pub fn check_range(
    coefficients: &[f64],
    resolution: usize,
    margin: usize,
) -> Result<(), RangeViolation> {
    let upper = resolution as f64;
    for pixel in margin..resolution.saturating_sub(margin) {
        let value = evaluate(coefficients, pixel as f64);
        if !(value >= 0.0 && value < upper) {
            return Err(RangeViolation { pixel, value });
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_identity_in_range() {
        assert!(check_range(&[0.0, 1.0, 0.0, 0.0, 0.0], 512, 20).is_ok());
    }

    #[test]
    fn test_quartic_divergence_near_edge() {
        // Nearly identity over the peak region, but the x^4 term takes over past ~400
        let coeffs = [0.0, 1.0, 0.0, 0.0, 3e-9];
        assert!(evaluate(&coeffs, 256.0) < 270.0);

        match check_range(&coeffs, 512, 20) {
            Err(RangeViolation { pixel, value }) => {
                assert!(pixel > 400 && pixel < 492, "pixel {}", pixel);
                assert!(value >= 512.0);
            }
            other => panic!("expected OutOfRange, got {:?}", other),
        }
    }

    #[test]
    fn test_negative_output_rejected() {
        let coeffs = [-5.0, 1.0, 0.0, 0.0, 0.0];
        match check_range(&coeffs, 512, 3) {
            Err(RangeViolation { pixel, .. }) => assert_eq!(pixel, 3),
            other => panic!("expected OutOfRange, got {:?}", other),
        }
        // The margin hides the offending pixels
        assert!(check_range(&coeffs, 512, 5).is_ok());
    }

    #[test]
    fn test_margin_excludes_edges() {
        // Shifted up by 15: pixels >= 497 would leave the range
        let coeffs = [15.0, 1.0, 0.0, 0.0, 0.0];
        assert!(check_range(&coeffs, 512, 20).is_ok());
        assert!(check_range(&coeffs, 512, 10).is_err());
    }

    #[test]
    fn test_violation_converts_to_error() {
        let err = CalibrationError::from(RangeViolation {
            pixel: 491,
            value: 665.25,
        });
        assert_eq!(
            err,
            CalibrationError::OutOfRange {
                pixel: 491,
                value: 665.25
            }
        );
    }

    #[test]
    fn test_nan_rejected() {
        assert!(check_range(&[f64::NAN], 64, 2).is_err());
    }
}
