//! Degree-4 calibration polynomial.
//!
//! Coefficients are stored in ascending power order, `[c0, c1, c2, c3, c4]`,
//! for `y = c0 + c1*x + c2*x^2 + c3*x^3 + c4*x^4`. Fitting, evaluation and
//! range checking all use this order.

use nalgebra::{DMatrix, DVector};
use tracing::debug;

use crate::error::{CalibrationError, CalibrationResult};

pub const POLYNOMIAL_DEGREE: usize = 4;
pub const N_COEFFICIENTS: usize = POLYNOMIAL_DEGREE + 1;

/// Smallest accepted ratio between the smallest and largest singular value
const RANK_TOLERANCE: f64 = 1e-10;

/// Result of a polynomial fit
#[derive(Debug, Clone, PartialEq)]
pub struct PolynomialFit {
    pub coefficients: Vec<f64>,
    /// Root mean square residual over the fitted points
    pub rms_residual: f64,
}

/// Evaluate ascending-order coefficients at `x` (Horner).
pub fn evaluate(coefficients: &[f64], x: f64) -> f64 {
    coefficients.iter().rev().fold(0.0, |acc, &c| acc * x + c)
}

/// Apply calibration coefficients to every position.
pub fn apply_calibration_params(positions: &[f64], coefficients: &[f64]) -> Vec<f64> {
    positions.iter().map(|&x| evaluate(coefficients, x)).collect()
}

/// Least-squares fit of `y ~ c0 + c1 x + ... + c4 x^4`.
///
/// The Vandermonde matrix is built in `t = x / s` with `s = max |x|` and solved by
/// SVD; coefficients are rescaled by `s^k` afterwards.
pub fn fit_polynomial(x: &[f64], y: &[f64], straw: usize) -> CalibrationResult<PolynomialFit> {
    if x.len() != y.len() {
        return Err(CalibrationError::InsufficientData(format!(
            "straw {}: {} measured positions but {} simulated",
            straw,
            x.len(),
            y.len()
        )));
    }
    if x.len() < N_COEFFICIENTS {
        return Err(CalibrationError::InsufficientData(format!(
            "straw {}: {} matched peaks, need at least {}",
            straw,
            x.len(),
            N_COEFFICIENTS
        )));
    }

    let scale = x.iter().fold(0.0_f64, |m, v| m.max(v.abs()));
    if !(scale > 0.0) || !scale.is_finite() {
        return Err(CalibrationError::SingularFit(format!(
            "straw {}: degenerate peak positions",
            straw
        )));
    }

    let n = x.len();
    let a = DMatrix::<f64>::from_fn(n, N_COEFFICIENTS, |i, k| (x[i] / scale).powi(k as i32));
    let b = DVector::<f64>::from_column_slice(y);

    let svd = a.svd(true, true);
    let max_sv = svd.singular_values.max();
    let min_sv = svd.singular_values.min();
    if !(max_sv > 0.0) || min_sv / max_sv < RANK_TOLERANCE {
        return Err(CalibrationError::SingularFit(format!(
            "straw {}: condition ratio {:.3e}",
            straw,
            min_sv / max_sv
        )));
    }

    let scaled = svd
        .solve(&b, RANK_TOLERANCE * max_sv)
        .map_err(|e| CalibrationError::SingularFit(format!("straw {}: {}", straw, e)))?;

    let coefficients: Vec<f64> = scaled
        .iter()
        .enumerate()
        .map(|(k, a)| a / scale.powi(k as i32))
        .collect();
    if coefficients.iter().any(|c| !c.is_finite()) {
        return Err(CalibrationError::SingularFit(format!(
            "straw {}: non-finite coefficients",
            straw
        )));
    }

    let sse: f64 = x
        .iter()
        .zip(y)
        .map(|(&xi, &yi)| (yi - evaluate(&coefficients, xi)).powi(2))
        .sum();
    let rms_residual = (sse / n as f64).sqrt();

    debug!(
        "straw {}: polynomial fit over {} peaks, rms residual {:.4}",
        straw, n, rms_residual
    );

    Ok(PolynomialFit {
        coefficients,
        rms_residual,
    })
}
