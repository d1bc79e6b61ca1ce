use anyhow::Result;
use std::path::Path;
use tracing::info;

use crate::storage::save_events;
use crate::synthetic::{generate, SyntheticParams};

pub fn generate_synthetic(
    measured_path: &str,
    simulated_path: &str,
    n_straws: usize,
    resolution: usize,
    peaks: usize,
    hits_per_peak: usize,
    seed: u64,
) -> Result<()> {
    let params = SyntheticParams {
        n_straws,
        resolution,
        peaks_per_straw: peaks,
        hits_per_peak,
        seed,
        ..Default::default()
    };
    info!(
        "Generating {} straws with {} peaks of {} hits (seed {})",
        n_straws, peaks, hits_per_peak, seed
    );

    let events = generate(&params);
    save_events(Path::new(measured_path), &events.measured)?;
    save_events(Path::new(simulated_path), &events.simulated)?;

    println!(
        "Wrote measured events to {} and simulated events to {}",
        measured_path, simulated_path
    );
    Ok(())
}
