//! Per-straw calibration pipeline and the parallel run over all straws.
//!
//! For every straw: histogram both hit lists, find and refine peaks, pair them by
//! rank, fit the degree-4 polynomial and range-check it. Straws are independent,
//! so the run maps one rayon task per straw index and collects the records in
//! straw order.

use rayon::prelude::*;
use tracing::{debug, info, warn};

use crate::config::{CalibrationConfig, PeakMode};
use crate::diagnostics::{DiagnosticSink, HistogramKind, StrawDiagnostic};
use crate::error::{CalibrationError, CalibrationResult};
use crate::gaussian_fitting::GaussianRefiner;
use crate::histogram::Histogram;
use crate::models::{Straw, StrawFailure, StrawTable};
use crate::peak_finder::PeakFinder;
use crate::peak_matching::match_peaks;
use crate::polynomial::{fit_polynomial, PolynomialFit};
use crate::range_check::check_range;

pub use crate::polynomial::apply_calibration_params;

/// Peak positions found in one histogram
#[derive(Debug, Clone, PartialEq)]
pub struct HistogramPeaks {
    pub positions: Vec<f64>,
    /// Gaussian refinement diverged and the raw candidates were kept
    pub refinement_fallback: bool,
}

/// Runs the pipeline for single straws
pub struct StrawCalibrator<'a> {
    config: &'a CalibrationConfig,
    finder: PeakFinder,
    refiner: GaussianRefiner,
    sink: &'a dyn DiagnosticSink,
}

impl<'a> StrawCalibrator<'a> {
    pub fn new(config: &'a CalibrationConfig, sink: &'a dyn DiagnosticSink) -> Self {
        Self {
            config,
            finder: PeakFinder::new(config.peak_search.clone()),
            refiner: GaussianRefiner::new(config.refinement.clone(), config.straw_resolution),
            sink,
        }
    }

    /// Peak positions for one histogram, refined when configured.
    ///
    /// A diverging Gaussian fit falls back to the unrefined candidates.
    pub fn straw_peaks(&self, straw: usize, kind: HistogramKind, hits: &[i32]) -> HistogramPeaks {
        let histogram = Histogram::from_hits(hits, self.config.straw_resolution);
        if histogram.dropped > 0 {
            debug!(
                "straw {} {}: {} hits outside [0, {})",
                straw,
                kind.as_str(),
                histogram.dropped,
                self.config.straw_resolution
            );
        }

        let candidates = self.finder.find(&histogram);
        let raw: Vec<f64> = candidates.iter().map(|c| c.position).collect();

        let mut refinement_fallback = false;
        let positions = match self.config.peak_mode {
            PeakMode::Simple => raw,
            PeakMode::Gaussian => match self.refiner.refine(&histogram, &candidates) {
                Ok(refined) => refined,
                Err(e) => {
                    warn!(
                        "straw {} {}: {}; using unrefined peak positions",
                        straw,
                        kind.as_str(),
                        e
                    );
                    refinement_fallback = true;
                    raw
                }
            },
        };

        if self.config.plotting_graphs {
            let diagnostic = StrawDiagnostic {
                straw,
                kind,
                histogram: &histogram,
                candidates: &candidates,
                refined: &positions,
            };
            if let Err(e) = self.sink.record(&diagnostic) {
                warn!("straw {}: failed to write diagnostics: {:#}", straw, e);
            }
        }

        HistogramPeaks {
            positions,
            refinement_fallback,
        }
    }

    /// Calibrate one straw. Per-straw failures are recorded on the returned record.
    pub fn calibrate_straw(&self, straw: usize, measured: &[i32], simulated: &[i32]) -> Straw {
        let hits = measured.len();
        let minimum = self.config.minimum_measured_hits_count;
        if hits < minimum {
            debug!("straw {}: {} measured hits, below minimum {}", straw, hits, minimum);
            return Straw::failed(StrawFailure::TooFewHits { hits, minimum }, hits);
        }

        let measured_peaks = self.straw_peaks(straw, HistogramKind::Measured, measured);
        let simulated_peaks = self.straw_peaks(straw, HistogramKind::Simulated, simulated);
        let matched = match_peaks(&measured_peaks.positions, &simulated_peaks.positions);

        let mut record = Straw {
            measured_hits_count: hits,
            refinement_fallbacks: [&measured_peaks, &simulated_peaks]
                .iter()
                .filter(|p| p.refinement_fallback)
                .count(),
            ..Default::default()
        };

        if let Some(max_difference) = self.config.max_peak_count_difference {
            if matched.count_difference() > max_difference {
                debug!(
                    "straw {}: {} measured vs {} simulated peaks",
                    straw, matched.measured_found, matched.simulated_found
                );
                record.measured_peaks = matched.measured;
                record.simulated_peaks = matched.simulated;
                record.failure = Some(StrawFailure::PeakCountMismatch {
                    measured: matched.measured_found,
                    simulated: matched.simulated_found,
                });
                return record;
            }
        }

        let fit = fit_polynomial(&matched.measured, &matched.simulated, straw);
        let found = (matched.measured_found, matched.simulated_found);
        record.measured_peaks = matched.measured;
        record.simulated_peaks = matched.simulated;
        self.finish_record(straw, record, found, fit)
    }

    /// Complete a record from the polynomial fit of its matched peaks.
    ///
    /// `found` holds the measured and simulated peak counts before matching.
    fn finish_record(
        &self,
        straw: usize,
        mut record: Straw,
        found: (usize, usize),
        fit: CalibrationResult<PolynomialFit>,
    ) -> Straw {
        let fit = match fit {
            Ok(fit) => fit,
            Err(CalibrationError::InsufficientData(msg)) => {
                debug!("{}", msg);
                record.failure = Some(StrawFailure::TooFewPeaks {
                    measured: found.0,
                    simulated: found.1,
                });
                return record;
            }
            // fit_polynomial fails otherwise only on rank-deficient systems
            Err(e) => {
                debug!("{}", e);
                record.failure = Some(StrawFailure::SingularFit);
                return record;
            }
        };

        match check_range(
            &fit.coefficients,
            self.config.straw_resolution,
            self.config.range_checking,
        ) {
            Ok(()) => record.good_straw = true,
            Err(violation) => {
                debug!("straw {}: {}", straw, CalibrationError::from(violation));
                record.failure = Some(StrawFailure::OutOfRange {
                    pixel: violation.pixel,
                    value: finite_or_max(violation.value),
                });
            }
        }

        // Kept for straws that failed range checking, for diagnosis
        record.calibration_parameters = fit.coefficients;
        record
    }
}

/// Non-finite values do not survive JSON, so clamp them to the largest float
fn finite_or_max(value: f64) -> f64 {
    if value.is_finite() {
        value
    } else if value < 0.0 {
        f64::MIN
    } else {
        f64::MAX
    }
}

/// Calibrate every straw.
///
/// `measured[i]` and `simulated[i]` hold the hit positions of straw `i`. Fails
/// only on configuration errors; the result always has one record per straw.
pub fn calibrate(
    measured: &[Vec<i32>],
    simulated: &[Vec<i32>],
    config: &CalibrationConfig,
    sink: &dyn DiagnosticSink,
) -> CalibrationResult<StrawTable> {
    config.validate()?;
    config.validate_inputs(measured.len(), simulated.len())?;

    info!(
        "Calibrating {} straws at resolution {} ({:?} peaks)",
        config.n_straws, config.straw_resolution, config.peak_mode
    );

    let calibrator = StrawCalibrator::new(config, sink);
    let run = || -> Vec<Straw> {
        (0..config.n_straws)
            .into_par_iter()
            .map(|i| calibrator.calibrate_straw(i, &measured[i], &simulated[i]))
            .collect()
    };

    let straws = match config.threads {
        Some(threads) => {
            let pool = rayon::ThreadPoolBuilder::new()
                .num_threads(threads)
                .thread_name(|i| format!("calib-worker-{i}"))
                .build()
                .map_err(|e| {
                    CalibrationError::Configuration(format!("failed to build thread pool: {e}"))
                })?;
            pool.install(run)
        }
        None => run(),
    };

    let table = StrawTable::new(straws);
    info!(
        "Calibration finished: {}/{} good straws",
        table.good_count(),
        table.len()
    );
    for (category, count) in table.failure_counts() {
        info!("  {}: {}", category.display_name(), count);
    }
    let fallbacks = table.refinement_fallback_count();
    if fallbacks > 0 {
        info!("  Gaussian refinement fell back to raw peaks on {} straws", fallbacks);
    }

    Ok(table)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::diagnostics::NullSink;

    fn cluster(center: i32, sigma: f64, hits: usize) -> Vec<i32> {
        let mut out = Vec::new();
        let norm = hits as f64 / (sigma * (2.0 * std::f64::consts::PI).sqrt());
        let reach = (5.0 * sigma).ceil() as i32;
        for x in center - reach..=center + reach {
            let d = (x - center) as f64;
            let count = (norm * (-d * d / (2.0 * sigma * sigma)).exp()).round() as usize;
            out.extend(std::iter::repeat(x).take(count));
        }
        out
    }

    fn clusters(centers: &[i32]) -> Vec<i32> {
        centers.iter().flat_map(|&c| cluster(c, 2.0, 200)).collect()
    }

    fn test_config(n_straws: usize) -> CalibrationConfig {
        CalibrationConfig {
            n_straws,
            plotting_graphs: false,
            ..Default::default()
        }
    }

    #[test]
    fn test_good_straw() {
        let config = test_config(1);
        let calibrator = StrawCalibrator::new(&config, &NullSink);
        let measured = clusters(&[50, 130, 210, 290, 370, 450]);
        let simulated = clusters(&[52, 132, 212, 292, 372, 452]);

        let straw = calibrator.calibrate_straw(0, &measured, &simulated);
        assert!(straw.good_straw, "failure: {:?}", straw.failure);
        assert_eq!(straw.calibration_parameters.len(), 5);
        assert_eq!(straw.measured_peaks.len(), 6);
        assert_eq!(straw.measured_hits_count, measured.len());
        assert!((straw.calibration_parameters[1] - 1.0).abs() < 1e-3);
        assert!(straw.failure.is_none());
    }

    #[test]
    fn test_too_few_hits_skips_peak_search() {
        let config = test_config(1);
        let calibrator = StrawCalibrator::new(&config, &NullSink);
        let measured = vec![256; 50];
        let simulated = clusters(&[52, 132, 212, 292, 372, 452]);

        let straw = calibrator.calibrate_straw(0, &measured, &simulated);
        assert!(!straw.good_straw);
        assert!(straw.calibration_parameters.is_empty());
        assert!(straw.measured_peaks.is_empty());
        assert!(straw.simulated_peaks.is_empty());
        assert_eq!(straw.measured_hits_count, 50);
        assert_eq!(
            straw.failure,
            Some(StrawFailure::TooFewHits {
                hits: 50,
                minimum: 100
            })
        );
    }

    #[test]
    fn test_simple_mode_uses_candidates() {
        let config = CalibrationConfig {
            peak_mode: PeakMode::Simple,
            ..test_config(1)
        };
        let calibrator = StrawCalibrator::new(&config, &NullSink);
        let peaks = calibrator
            .straw_peaks(0, HistogramKind::Measured, &clusters(&[100, 300]))
            .positions;
        assert_eq!(peaks.len(), 2);
        assert!((peaks[0] - 100.0).abs() < 0.5);
        assert!((peaks[1] - 300.0).abs() < 0.5);
    }

    #[test]
    fn test_refinement_divergence_falls_back_to_candidates() {
        // One LM iteration cannot converge from the default initial width
        let mut diverging = test_config(1);
        diverging.refinement.max_iterations = 1;
        let simple = CalibrationConfig {
            peak_mode: PeakMode::Simple,
            ..test_config(1)
        };
        let measured = clusters(&[50, 130, 210, 290, 370, 450]);
        let simulated = clusters(&[52, 132, 212, 292, 372, 452]);

        let calibrator = StrawCalibrator::new(&diverging, &NullSink);
        let raw = StrawCalibrator::new(&simple, &NullSink).straw_peaks(
            0,
            HistogramKind::Measured,
            &measured,
        );
        let peaks = calibrator.straw_peaks(0, HistogramKind::Measured, &measured);
        assert!(peaks.refinement_fallback);
        assert!(!raw.refinement_fallback);
        assert_eq!(peaks.positions, raw.positions);

        let straw = calibrator.calibrate_straw(0, &measured, &simulated);
        assert!(straw.good_straw, "failure: {:?}", straw.failure);
        assert_eq!(straw.refinement_fallbacks, 2);
        assert_eq!(straw.measured_peaks, raw.positions);
    }

    #[test]
    fn test_converged_refinement_records_no_fallback() {
        let config = test_config(1);
        let calibrator = StrawCalibrator::new(&config, &NullSink);
        let straw = calibrator.calibrate_straw(
            0,
            &clusters(&[50, 130, 210, 290, 370, 450]),
            &clusters(&[52, 132, 212, 292, 372, 452]),
        );
        assert_eq!(straw.refinement_fallbacks, 0);
    }

    fn matched_record() -> Straw {
        Straw {
            measured_peaks: vec![50.0, 130.0, 210.0, 290.0, 370.0],
            simulated_peaks: vec![52.0, 132.0, 212.0, 292.0, 372.0],
            measured_hits_count: 1000,
            ..Default::default()
        }
    }

    #[test]
    fn test_singular_fit_recorded() {
        let config = test_config(1);
        let calibrator = StrawCalibrator::new(&config, &NullSink);
        let fit = Err(CalibrationError::SingularFit("condition ratio 0".to_string()));

        let straw = calibrator.finish_record(0, matched_record(), (5, 5), fit);
        assert!(!straw.good_straw);
        assert!(straw.calibration_parameters.is_empty());
        assert_eq!(straw.failure, Some(StrawFailure::SingularFit));
        assert_eq!(straw.measured_peaks.len(), 5);
    }

    #[test]
    fn test_insufficient_peaks_recorded() {
        let config = test_config(1);
        let calibrator = StrawCalibrator::new(&config, &NullSink);
        let fit = Err(CalibrationError::InsufficientData("3 matched peaks".to_string()));

        let straw = calibrator.finish_record(0, Straw::default(), (3, 4), fit);
        assert!(!straw.good_straw);
        assert!(straw.calibration_parameters.is_empty());
        assert_eq!(
            straw.failure,
            Some(StrawFailure::TooFewPeaks {
                measured: 3,
                simulated: 4
            })
        );
    }

    #[test]
    fn test_out_of_range_fit_keeps_coefficients() {
        let config = test_config(1);
        let calibrator = StrawCalibrator::new(&config, &NullSink);
        let coefficients = vec![0.0, 1.0, 0.0, 0.0, 3e-9];
        let fit = Ok(PolynomialFit {
            coefficients: coefficients.clone(),
            rms_residual: 0.0,
        });

        let straw = calibrator.finish_record(0, matched_record(), (5, 5), fit);
        assert!(!straw.good_straw);
        assert_eq!(straw.calibration_parameters, coefficients);
        assert!(matches!(
            straw.failure,
            Some(StrawFailure::OutOfRange { pixel, value }) if pixel > 400 && value >= 512.0
        ));
    }

    #[test]
    fn test_peak_count_mismatch_policy() {
        let config = CalibrationConfig {
            max_peak_count_difference: Some(0),
            ..test_config(1)
        };
        let calibrator = StrawCalibrator::new(&config, &NullSink);
        let measured = clusters(&[50, 130, 210, 290, 370, 450]);
        let simulated = clusters(&[52, 132, 212, 292, 372]);

        let straw = calibrator.calibrate_straw(0, &measured, &simulated);
        assert!(!straw.good_straw);
        assert_eq!(straw.measured_peaks.len(), 5);
        assert_eq!(straw.simulated_peaks.len(), 5);
        assert_eq!(
            straw.failure,
            Some(StrawFailure::PeakCountMismatch {
                measured: 6,
                simulated: 5
            })
        );
    }

    #[test]
    fn test_truncation_by_default() {
        let config = test_config(1);
        let calibrator = StrawCalibrator::new(&config, &NullSink);
        let measured = clusters(&[50, 130, 210, 290, 370, 450]);
        let simulated = clusters(&[52, 132, 212, 292, 372]);

        let straw = calibrator.calibrate_straw(0, &measured, &simulated);
        assert_eq!(straw.measured_peaks.len(), straw.simulated_peaks.len());
        assert_eq!(straw.measured_peaks.len(), 5);
    }

    #[test]
    fn test_mismatched_inputs_rejected() {
        let config = test_config(2);
        let result = calibrate(&[vec![], vec![]], &[vec![]], &config, &NullSink);
        assert!(matches!(result, Err(CalibrationError::Configuration(_))));
    }

    #[test]
    fn test_dedicated_thread_pool() {
        let config = CalibrationConfig {
            threads: Some(2),
            ..test_config(3)
        };
        let measured = vec![clusters(&[50, 130, 210, 290, 370, 450]); 3];
        let simulated = vec![clusters(&[52, 132, 212, 292, 372, 452]); 3];
        let table = calibrate(&measured, &simulated, &config, &NullSink).unwrap();
        assert_eq!(table.len(), 3);
        assert_eq!(table.good_count(), 3);
    }

    #[test]
    fn test_finite_or_max() {
        assert_eq!(finite_or_max(3.5), 3.5);
        assert_eq!(finite_or_max(f64::INFINITY), f64::MAX);
        assert_eq!(finite_or_max(f64::NEG_INFINITY), f64::MIN);
        assert_eq!(finite_or_max(f64::NAN), f64::MAX);
    }
}
