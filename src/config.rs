use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::error::{CalibrationError, CalibrationResult};

/// How peak positions are obtained from a histogram
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PeakMode {
    /// Smoothed local-maximum search only
    Simple,
    /// Local-maximum search refined by a joint multi-Gaussian fit
    Gaussian,
}

impl std::str::FromStr for PeakMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "simple" | "none" => Ok(PeakMode::Simple),
            "gaussian" | "gauss" => Ok(PeakMode::Gaussian),
            _ => Err(format!("Unknown peak mode: {}", s)),
        }
    }
}

/// Peak search parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct PeakSearchParams {
    /// Smoothing kernel width and minimum peak separation, in bins
    pub sigma: f64,
    /// Minimum peak height as a fraction of the highest smoothed bin
    pub threshold: f64,
}

impl Default for PeakSearchParams {
    fn default() -> Self {
        Self {
            sigma: 2.0,
            threshold: 0.05,
        }
    }
}

/// Multi-Gaussian refinement parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct RefinementParams {
    /// Initial component width as a fraction of the straw resolution
    pub initial_width_fraction: f64,
    /// Bins on either side of a candidate included in the fit window
    pub window_half_width: usize,
    pub max_iterations: usize,
    /// Relative change in the sum of squared residuals treated as converged
    pub tolerance: f64,
}

impl Default for RefinementParams {
    fn default() -> Self {
        Self {
            initial_width_fraction: 0.005, // 2.56 bins at 512
            window_half_width: 12,
            max_iterations: 200,
            tolerance: 1e-9,
        }
    }
}

/// Run configuration. Fixed for the duration of a calibration run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct CalibrationConfig {
    /// Number of pixels per straw
    pub straw_resolution: usize,
    pub n_straws: usize,
    /// Edge pixels excluded from range checking on each side
    pub range_checking: usize,
    pub minimum_measured_hits_count: usize,
    /// Emit per-straw diagnostic artifacts; never affects results
    pub plotting_graphs: bool,
    pub peak_mode: PeakMode,
    pub peak_search: PeakSearchParams,
    pub refinement: RefinementParams,
    /// Reject straws whose measured and simulated peak counts differ by more than this
    pub max_peak_count_difference: Option<usize>,
    /// Worker threads; `None` uses the global rayon pool
    pub threads: Option<usize>,
}

impl Default for CalibrationConfig {
    fn default() -> Self {
        Self {
            straw_resolution: 512,
            n_straws: 896,
            range_checking: 20,
            minimum_measured_hits_count: 100,
            plotting_graphs: true,
            peak_mode: PeakMode::Gaussian,
            peak_search: PeakSearchParams::default(),
            refinement: RefinementParams::default(),
            max_peak_count_difference: None,
            threads: None,
        }
    }
}

impl CalibrationConfig {
    /// Load a configuration file; missing fields take their defaults.
    pub fn from_file(path: &Path) -> anyhow::Result<Self> {
        use anyhow::Context;

        let text = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        serde_json::from_str(&text)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))
    }

    pub fn validate(&self) -> CalibrationResult<()> {
        if self.straw_resolution == 0 {
            return Err(CalibrationError::Configuration(
                "straw resolution must be positive".to_string(),
            ));
        }
        if self.range_checking >= self.straw_resolution.div_ceil(2) {
            return Err(CalibrationError::Configuration(format!(
                "range checking margin {} must be less than half the resolution {}",
                self.range_checking, self.straw_resolution
            )));
        }
        let sigma = self.peak_search.sigma;
        if !(sigma > 0.0 && sigma < self.straw_resolution as f64) {
            return Err(CalibrationError::Configuration(format!(
                "peak search sigma must be in (0, {}), got {}",
                self.straw_resolution, sigma
            )));
        }
        if !(self.peak_search.threshold > 0.0 && self.peak_search.threshold <= 1.0) {
            return Err(CalibrationError::Configuration(format!(
                "peak search threshold must be in (0, 1], got {}",
                self.peak_search.threshold
            )));
        }
        if !(self.refinement.initial_width_fraction > 0.0) || self.refinement.window_half_width == 0
        {
            return Err(CalibrationError::Configuration(
                "refinement window and initial width must be positive".to_string(),
            ));
        }
        if self.refinement.max_iterations == 0 {
            return Err(CalibrationError::Configuration(
                "refinement needs at least one iteration".to_string(),
            ));
        }
        let tolerance = self.refinement.tolerance;
        if !(tolerance > 0.0 && tolerance.is_finite()) {
            return Err(CalibrationError::Configuration(format!(
                "refinement tolerance must be positive and finite, got {}",
                tolerance
            )));
        }
        if self.threads == Some(0) {
            return Err(CalibrationError::Configuration(
                "thread count must be positive".to_string(),
            ));
        }
        Ok(())
    }

    /// Check that the input event lists match the configured straw count.
    pub fn validate_inputs(&self, measured: usize, simulated: usize) -> CalibrationResult<()> {
        if measured != simulated {
            return Err(CalibrationError::Configuration(format!(
                "measured events cover {} straws but simulated events cover {}",
                measured, simulated
            )));
        }
        if measured != self.n_straws {
            return Err(CalibrationError::Configuration(format!(
                "expected events for {} straws, got {}",
                self.n_straws, measured
            )));
        }
        Ok(())
    }
}
