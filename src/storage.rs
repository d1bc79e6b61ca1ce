//! JSON persistence for events and calibration results.

use anyhow::{Context, Result};
use std::collections::BTreeMap;
use std::fs::File;
use std::io::{BufReader, BufWriter, Write};
use std::path::Path;

use crate::models::StrawTable;

fn write_json<T: serde::Serialize + ?Sized>(path: &Path, value: &T) -> Result<()> {
    let file = File::create(path)
        .with_context(|| format!("Failed to create file: {}", path.display()))?;
    let mut writer = BufWriter::new(file);
    serde_json::to_writer_pretty(&mut writer, value)
        .with_context(|| format!("Failed to write JSON to {}", path.display()))?;
    writer.flush()?;
    Ok(())
}

fn read_json<T: serde::de::DeserializeOwned>(path: &Path) -> Result<T> {
    let file =
        File::open(path).with_context(|| format!("Failed to open file: {}", path.display()))?;
    serde_json::from_reader(BufReader::new(file))
        .with_context(|| format!("Failed to parse JSON from {}", path.display()))
}

/// Save the full per-straw calibration records.
pub fn save_straw_info(path: &Path, table: &StrawTable) -> Result<()> {
    write_json(path, table)
}

/// Load records written by [`save_straw_info`].
pub fn load_straw_info(path: &Path) -> Result<StrawTable> {
    read_json(path)
}

/// Save only the coefficients of good straws, keyed by straw index.
pub fn save_calibration_parameters(path: &Path, table: &StrawTable) -> Result<()> {
    let parameters: BTreeMap<usize, &[f64]> = table
        .iter()
        .filter(|(_, straw)| straw.good_straw)
        .map(|(i, straw)| (i, straw.calibration_parameters.as_slice()))
        .collect();
    write_json(path, &parameters)
}

pub fn load_calibration_parameters(path: &Path) -> Result<BTreeMap<usize, Vec<f64>>> {
    read_json(path)
}

/// Load per-straw hit positions: a JSON array with one array of integers per straw.
pub fn load_events(path: &Path) -> Result<Vec<Vec<i32>>> {
    read_json(path)
}

pub fn save_events(path: &Path, events: &[Vec<i32>]) -> Result<()> {
    write_json(path, events)
}

/// Save calibrated positions, one array per straw.
pub fn save_corrected_events(path: &Path, events: &[Vec<f64>]) -> Result<()> {
    write_json(path, events)
}
