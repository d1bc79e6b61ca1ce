//! Peak search on straw histograms
//!
//! Smooths the histogram with a Gaussian kernel, keeps local maxima above a
//! fraction of the global maximum, and removes maxima closer than the minimum
//! separation to a higher one.
use crate::config::PeakSearchParams;
use crate::histogram::Histogram;

/// A peak candidate found in a histogram
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PeakCandidate {
    /// Position in pixel coordinates (sub-bin after parabolic interpolation)
    pub position: f64,
    /// Raw count of the peak bin
    pub height: f64,
}

pub struct PeakFinder {
    params: PeakSearchParams,
}

impl PeakFinder {
    pub fn new(params: PeakSearchParams) -> Self {
        Self { params }
    }

    /// Find peaks in a histogram, sorted by position.
    pub fn find(&self, histogram: &Histogram) -> Vec<PeakCandidate> {
        let n = histogram.resolution();
        if n < 3 {
            return Vec::new();
        }

        let smoothed = gaussian_smooth(&histogram.counts, self.params.sigma);
        let global_max = smoothed.iter().copied().fold(0.0, f64::max);
        if global_max <= 0.0 {
            return Vec::new();
        }

        let min_height = self.params.threshold * global_max;
        let radius = self.params.sigma.ceil() as usize;

        // (smoothed height, candidate)
        let mut maxima: Vec<(f64, PeakCandidate)> = Vec::new();
        for i in 1..n - 1 {
            let s = smoothed[i];
            if !(s > smoothed[i - 1] && s >= smoothed[i + 1]) || s < min_height {
                continue;
            }

            let lo = i.saturating_sub(radius);
            let hi = (i + radius).min(n - 1);
            if smoothed[lo..=hi].iter().any(|&v| v > s) {
                continue;
            }

            let offset = parabolic_offset(smoothed[i - 1], s, smoothed[i + 1]);
            maxima.push((
                s,
                PeakCandidate {
                    position: i as f64 + offset,
                    height: histogram.counts[i],
                },
            ));
        }

        // Highest first so that weaker maxima inside the separation are dropped
        maxima.sort_by(|a, b| b.0.total_cmp(&a.0));
        let mut peaks: Vec<PeakCandidate> = Vec::with_capacity(maxima.len());
        for (_, candidate) in maxima {
            if peaks
                .iter()
                .all(|p| (p.position - candidate.position).abs() >= self.params.sigma)
            {
                peaks.push(candidate);
            }
        }

        peaks.sort_by(|a, b| a.position.total_cmp(&b.position));
        peaks
    }
}

/// Gaussian smoothing, truncated at 3 sigma and renormalized at the edges.
pub fn gaussian_smooth(values: &[f64], sigma: f64) -> Vec<f64> {
    if values.is_empty() || sigma <= 0.0 {
        return values.to_vec();
    }

    let radius = (3.0 * sigma).ceil() as isize;
    let two_sigma2 = 2.0 * sigma * sigma;
    let weights: Vec<f64> = (-radius..=radius)
        .map(|dx| (-(dx * dx) as f64 / two_sigma2).exp())
        .collect();

    let n = values.len() as isize;
    (0..n)
        .map(|i| {
            let mut acc = 0.0;
            let mut norm = 0.0;
            for (k, &w) in weights.iter().enumerate() {
                let j = i + k as isize - radius;
                if j >= 0 && j < n {
                    acc += w * values[j as usize];
                    norm += w;
                }
            }
            if norm > 0.0 {
                acc / norm
            } else {
                0.0
            }
        })
        .collect()
}

/// Vertex offset of the parabola through three equally spaced samples
fn parabolic_offset(left: f64, center: f64, right: f64) -> f64 {
    let denom = left - 2.0 * center + right;
    if denom.abs() < f64::EPSILON {
        return 0.0;
    }
    (0.5 * (left - right) / denom).clamp(-0.5, 0.5)
}
