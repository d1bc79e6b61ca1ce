use anyhow::Result;
use std::path::Path;
use std::time::Instant;
use tracing::info;

use crate::calibration::calibrate;
use crate::cli::ConfigOverrides;
use crate::config::CalibrationConfig;
use crate::diagnostics::{CsvHistogramSink, DiagnosticSink, NullSink};
use crate::storage::{load_events, save_calibration_parameters, save_straw_info};

#[allow(clippy::too_many_arguments)]
pub fn run_calibration(
    measured_path: &str,
    simulated_path: &str,
    output: &str,
    parameters: Option<&str>,
    config_path: Option<&str>,
    overrides: &ConfigOverrides,
    plot_dir: Option<&str>,
) -> Result<()> {
    let mut config = match config_path {
        Some(path) => CalibrationConfig::from_file(Path::new(path))?,
        None => CalibrationConfig::default(),
    };
    overrides.apply_to(&mut config);

    let measured = load_events(Path::new(measured_path))?;
    let simulated = load_events(Path::new(simulated_path))?;
    info!(
        "Loaded {} measured and {} simulated straws",
        measured.len(),
        simulated.len()
    );

    // Diagnostics only when both enabled and given somewhere to go
    let sink: Box<dyn DiagnosticSink> = match plot_dir {
        Some(dir) if config.plotting_graphs => Box::new(CsvHistogramSink::new(dir)?),
        _ => Box::new(NullSink),
    };

    let start = Instant::now();
    let table = calibrate(&measured, &simulated, &config, sink.as_ref())?;
    info!("Calibration took {:.2}s", start.elapsed().as_secs_f64());

    save_straw_info(Path::new(output), &table)?;
    println!(
        "Calibrated {} straws: {} good. Results written to {}",
        table.len(),
        table.good_count(),
        output
    );

    if let Some(path) = parameters {
        save_calibration_parameters(Path::new(path), &table)?;
        println!("Calibration parameters written to {}", path);
    }

    Ok(())
}
