//! Synthetic straw events for trying out the calibration without detector data
//!
//! Each straw receives Gaussian clusters of hits at evenly spaced positions. The
//! measured events are the simulated ones pushed through a per-straw distortion,
//! so a successful calibration recovers its inverse.
use rand::prelude::*;
use rand::rngs::StdRng;

#[derive(Debug, Clone)]
pub struct SyntheticParams {
    pub n_straws: usize,
    pub resolution: usize,
    pub peaks_per_straw: usize,
    pub hits_per_peak: usize,
    /// Cluster width in pixels
    pub cluster_sigma: f64,
    /// Maximum linear gain error applied to measured positions
    pub max_gain_error: f64,
    /// Maximum offset in pixels applied to measured positions
    pub max_offset: f64,
    pub seed: u64,
}

impl Default for SyntheticParams {
    fn default() -> Self {
        Self {
            n_straws: 896,
            resolution: 512,
            peaks_per_straw: 7,
            hits_per_peak: 200,
            cluster_sigma: 2.0,
            max_gain_error: 0.03,
            max_offset: 4.0,
            seed: 42,
        }
    }
}

/// Measured and simulated hit lists, one entry per straw
pub struct SyntheticEvents {
    pub measured: Vec<Vec<i32>>,
    pub simulated: Vec<Vec<i32>>,
}

/// Evenly spaced cluster centers avoiding the outer tenth of the straw
pub fn peak_centers(resolution: usize, count: usize) -> Vec<f64> {
    if count == 0 {
        return Vec::new();
    }
    let lo = resolution as f64 * 0.1;
    let hi = resolution as f64 * 0.9;
    if count == 1 {
        return vec![(lo + hi) / 2.0];
    }
    let step = (hi - lo) / (count - 1) as f64;
    (0..count).map(|i| lo + step * i as f64).collect()
}

pub fn generate(params: &SyntheticParams) -> SyntheticEvents {
    let mut rng = StdRng::seed_from_u64(params.seed);
    let centers = peak_centers(params.resolution, params.peaks_per_straw);

    let mut measured = Vec::with_capacity(params.n_straws);
    let mut simulated = Vec::with_capacity(params.n_straws);

    for _ in 0..params.n_straws {
        let gain = 1.0 + rng.gen_range(-params.max_gain_error..=params.max_gain_error);
        let offset = rng.gen_range(-params.max_offset..=params.max_offset);
        let mid = params.resolution as f64 / 2.0;

        let mut sim_hits = Vec::with_capacity(centers.len() * params.hits_per_peak);
        let mut meas_hits = Vec::with_capacity(centers.len() * params.hits_per_peak);
        for &center in &centers {
            for _ in 0..params.hits_per_peak {
                let position = center + params.cluster_sigma * standard_normal(&mut rng);
                sim_hits.push(position.round() as i32);
                let distorted = mid + (position - mid) * gain + offset;
                meas_hits.push(distorted.round() as i32);
            }
        }

        simulated.push(sim_hits);
        measured.push(meas_hits);
    }

    SyntheticEvents {
        measured,
        simulated,
    }
}

/// Box-Muller transform
fn standard_normal(rng: &mut StdRng) -> f64 {
    let u1: f64 = rng.gen_range(f64::EPSILON..1.0);
    let u2: f64 = rng.gen();
    (-2.0 * u1.ln()).sqrt() * (2.0 * std::f64::consts::PI * u2).cos()
}
