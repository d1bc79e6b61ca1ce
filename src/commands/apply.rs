use anyhow::{bail, Result};
use std::path::Path;
use tracing::{info, warn};

use crate::calibration::apply_calibration_params;
use crate::models::StrawTable;
use crate::storage::{load_events, load_straw_info, save_corrected_events};

/// Correct each straw's positions with its calibration.
///
/// Straws without usable coefficients keep their raw positions.
pub fn correct_events(table: &StrawTable, events: &[Vec<i32>], include_bad: bool) -> Vec<Vec<f64>> {
    events
        .iter()
        .enumerate()
        .map(|(i, hits)| {
            let positions: Vec<f64> = hits.iter().map(|&h| h as f64).collect();
            match table.get(i) {
                Some(straw)
                    if straw.calibration_parameters.len() == 5
                        && (straw.good_straw || include_bad) =>
                {
                    apply_calibration_params(&positions, &straw.calibration_parameters)
                }
                _ => positions,
            }
        })
        .collect()
}

pub fn apply_calibration(
    straw_info: &str,
    events_path: &str,
    output: &str,
    include_bad: bool,
) -> Result<()> {
    let table = load_straw_info(Path::new(straw_info))?;
    let events = load_events(Path::new(events_path))?;

    if events.len() != table.len() {
        bail!(
            "Events cover {} straws but calibration data covers {}",
            events.len(),
            table.len()
        );
    }

    let uncorrected = table
        .iter()
        .filter(|(_, s)| !(s.good_straw || (include_bad && s.calibration_parameters.len() == 5)))
        .count();
    if uncorrected > 0 {
        warn!("{} straws have no usable calibration; positions left unchanged", uncorrected);
    }

    let corrected = correct_events(&table, &events, include_bad);
    save_corrected_events(Path::new(output), &corrected)?;
    info!("Corrected events for {} straws", corrected.len());
    println!("Corrected events written to {}", output);

    Ok(())
}
