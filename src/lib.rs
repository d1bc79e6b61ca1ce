pub mod calibration;
pub mod cli;
pub mod commands;
pub mod config;
pub mod diagnostics;
pub mod error;
pub mod gaussian_fitting;
pub mod histogram;
pub mod models;
pub mod peak_finder;
pub mod peak_matching;
pub mod polynomial;
pub mod range_check;
pub mod storage;
pub mod synthetic;
pub mod utils;

// Re-export commonly used items
pub use calibration::{apply_calibration_params, calibrate, StrawCalibrator};
pub use config::{CalibrationConfig, PeakMode};
pub use error::{CalibrationError, CalibrationResult};
pub use models::{Straw, StrawFailure, StrawTable};
