//! Multi-Gaussian peak refinement
//! Fits a sum of Gaussian components to histogram counts with Levenberg-Marquardt
//! and reports the fitted component means as refined peak positions.
use nalgebra::{DMatrix, DVector};
use tracing::debug;

use crate::config::RefinementParams;
use crate::error::{CalibrationError, CalibrationResult};
use crate::histogram::Histogram;
use crate::peak_finder::PeakCandidate;

/// Trait for 1-D profile models
pub trait ProfileFunction: Send + Sync {
    fn n_params(&self) -> usize;

    /// Evaluate the model at `x`
    fn value(&self, x: f64, params: &[f64]) -> f64;

    /// Partial derivatives of the model with respect to each parameter
    fn gradient(&self, x: f64, params: &[f64], grad: &mut [f64]);
}

/// Sum of Gaussian components
/// parameters: [A0, mean0, sigma0, A1, mean1, sigma1, ...]
pub struct GaussianSum {
    pub components: usize,
}

impl ProfileFunction for GaussianSum {
    fn n_params(&self) -> usize {
        self.components * 3
    }

    fn value(&self, x: f64, params: &[f64]) -> f64 {
        params
            .chunks_exact(3)
            .map(|c| {
                let (a, mean, sigma) = (c[0], c[1], c[2]);
                let d = x - mean;
                a * (-d * d / (2.0 * sigma * sigma)).exp()
            })
            .sum()
    }

    fn gradient(&self, x: f64, params: &[f64], grad: &mut [f64]) {
        for (c, g) in params.chunks_exact(3).zip(grad.chunks_exact_mut(3)) {
            let (a, mean, sigma) = (c[0], c[1], c[2]);
            let d = x - mean;
            let s2 = sigma * sigma;
            let e = (-d * d / (2.0 * s2)).exp();

            // d/dA
            g[0] = e;
            // d/dmean
            g[1] = a * e * d / s2;
            // d/dsigma
            g[2] = a * e * d * d / (s2 * sigma);
        }
    }
}

/// Outcome of a converged fit
#[derive(Debug, Clone)]
pub struct FitOutcome {
    pub params: Vec<f64>,
    pub sse: f64,
    pub iterations: usize,
}

/// Levenberg-Marquardt least-squares optimizer with box constraints
pub struct LevenbergMarquardt {
    max_iterations: usize,
    tolerance: f64,
    lambda: f64,
    lambda_factor: f64,
}

impl Default for LevenbergMarquardt {
    fn default() -> Self {
        Self {
            max_iterations: 200,
            tolerance: 1e-9,
            lambda: 1e-3,
            lambda_factor: 10.0,
        }
    }
}

impl LevenbergMarquardt {
    pub fn new(max_iterations: usize, tolerance: f64) -> Self {
        Self {
            max_iterations,
            tolerance,
            ..Default::default()
        }
    }

    /// Fit a profile model to `(xs, ys)`.
    ///
    /// Converges when an accepted step changes the sum of squared residuals by
    /// less than `tolerance` relative, or when no damped step can improve it.
    /// Running out of iterations is a divergence.
    pub fn fit(
        &self,
        model: &dyn ProfileFunction,
        xs: &[f64],
        ys: &[f64],
        initial_params: &[f64],
        lower_bounds: &[f64],
        upper_bounds: &[f64],
    ) -> CalibrationResult<FitOutcome> {
        let n_params = model.n_params();
        let n_points = xs.len();

        if n_points < n_params {
            return Err(CalibrationError::FitDivergence(format!(
                "{} points cannot constrain {} parameters",
                n_points, n_params
            )));
        }

        let clamp = |p: &mut [f64]| {
            for i in 0..n_params {
                p[i] = p[i].max(lower_bounds[i]).min(upper_bounds[i]);
            }
        };

        let sse = |p: &[f64]| -> f64 {
            xs.iter()
                .zip(ys)
                .map(|(&x, &y)| {
                    let r = y - model.value(x, p);
                    r * r
                })
                .sum()
        };

        let mut params = initial_params.to_vec();
        clamp(&mut params[..]);
        let mut current_sse = sse(&params[..]);
        if !current_sse.is_finite() {
            return Err(CalibrationError::FitDivergence(
                "initial parameters give a non-finite residual".to_string(),
            ));
        }

        let mut lambda = self.lambda;
        let mut jacobian = DMatrix::<f64>::zeros(n_points, n_params);
        let mut residuals = DVector::<f64>::zeros(n_points);
        let mut gradient = vec![0.0; n_params];

        for iter in 0..self.max_iterations {
            if current_sse <= f64::EPSILON {
                return Ok(FitOutcome {
                    params,
                    sse: current_sse,
                    iterations: iter,
                });
            }

            for (i, (&x, &y)) in xs.iter().zip(ys).enumerate() {
                residuals[i] = y - model.value(x, &params);
                model.gradient(x, &params, &mut gradient);
                for (j, &g) in gradient.iter().enumerate() {
                    jacobian[(i, j)] = g;
                }
            }

            let jt = jacobian.transpose();
            let jtj = &jt * &jacobian;
            let jtr = &jt * &residuals;

            loop {
                // Marquardt damping scaled by the curvature of each parameter
                let mut h = jtj.clone();
                for i in 0..n_params {
                    h[(i, i)] += lambda * jtj[(i, i)].max(1e-12);
                }

                if let Some(delta) = h.lu().solve(&jtr) {
                    let mut new_params: Vec<f64> =
                        params.iter().zip(delta.iter()).map(|(p, d)| p + d).collect();
                    clamp(&mut new_params[..]);

                    if new_params.iter().any(|p| !p.is_finite()) {
                        return Err(CalibrationError::FitDivergence(
                            "parameters became non-finite".to_string(),
                        ));
                    }

                    let new_sse = sse(&new_params[..]);
                    if new_sse < current_sse {
                        let relative = (current_sse - new_sse) / current_sse;
                        params = new_params;
                        current_sse = new_sse;
                        lambda /= self.lambda_factor;

                        if relative < self.tolerance {
                            return Ok(FitOutcome {
                                params,
                                sse: current_sse,
                                iterations: iter + 1,
                            });
                        }
                        break;
                    }
                }

                lambda *= self.lambda_factor;
                if lambda > 1e10 {
                    // No damped step improves the fit: local minimum
                    return Ok(FitOutcome {
                        params,
                        sse: current_sse,
                        iterations: iter + 1,
                    });
                }
            }
        }

        Err(CalibrationError::FitDivergence(format!(
            "no convergence after {} iterations",
            self.max_iterations
        )))
    }
}

/// Refines peak candidates by a joint multi-Gaussian fit
pub struct GaussianRefiner {
    params: RefinementParams,
    resolution: usize,
}

impl GaussianRefiner {
    pub fn new(params: RefinementParams, resolution: usize) -> Self {
        Self { params, resolution }
    }

    /// Refined positions in the same order as `candidates`.
    pub fn refine(
        &self,
        histogram: &Histogram,
        candidates: &[PeakCandidate],
    ) -> CalibrationResult<Vec<f64>> {
        if candidates.is_empty() {
            return Ok(Vec::new());
        }

        let half_width = self.params.window_half_width as f64;

        // Bins within the window of any candidate
        let (xs, ys): (Vec<f64>, Vec<f64>) = histogram
            .counts
            .iter()
            .enumerate()
            .map(|(i, &c)| (i as f64, c))
            .filter(|(x, _)| {
                candidates
                    .iter()
                    .any(|p| (x - p.position).abs() <= half_width)
            })
            .unzip();

        let initial_width = (self.params.initial_width_fraction * self.resolution as f64)
            .clamp(0.3, half_width);

        let mut initial = Vec::with_capacity(candidates.len() * 3);
        let mut lower = Vec::with_capacity(candidates.len() * 3);
        let mut upper = Vec::with_capacity(candidates.len() * 3);
        for p in candidates {
            let height = p.height.max(1.0);
            initial.extend([height, p.position, initial_width]);
            lower.extend([0.0, p.position - half_width, 0.3]);
            upper.extend([4.0 * height, p.position + half_width, half_width]);
        }

        let model = GaussianSum {
            components: candidates.len(),
        };
        let optimizer =
            LevenbergMarquardt::new(self.params.max_iterations, self.params.tolerance);
        let outcome = optimizer.fit(&model, &xs, &ys, &initial, &lower, &upper)?;

        debug!(
            "Gaussian refinement of {} peaks converged in {} iterations (sse {:.3})",
            candidates.len(),
            outcome.iterations,
            outcome.sse
        );

        Ok(outcome.params.chunks_exact(3).map(|c| c[1]).collect())
    }
}
