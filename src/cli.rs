use clap::{Parser, Subcommand};

use crate::config::{CalibrationConfig, PeakMode};

#[derive(Parser)]
#[command(name = "straw-calib")]
#[command(about = "Per-straw position calibration for neutron detector straw arrays", long_about = None)]
pub struct Cli {
    /// Enable debug logging (RUST_LOG overrides)
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Calculate calibration parameters from measured and simulated events
    Calibrate {
        /// JSON file with measured hit positions, one array per straw
        measured: String,

        /// JSON file with simulated hit positions, one array per straw
        simulated: String,

        /// Output file for the per-straw calibration records
        #[arg(short, long, default_value = "straw_calibration.json")]
        output: String,

        /// Also write the coefficients of good straws to this file
        #[arg(long)]
        parameters: Option<String>,

        /// JSON configuration file; command line options take precedence
        #[arg(short, long)]
        config: Option<String>,

        #[command(flatten)]
        overrides: ConfigOverrides,

        /// Directory for per-straw histogram CSV files
        #[arg(long)]
        plot_dir: Option<String>,
    },

    /// Apply calibration parameters to event positions
    Apply {
        /// Calibration records written by `calibrate`
        straw_info: String,

        /// JSON file with hit positions to correct, one array per straw
        events: String,

        /// Output file for corrected positions
        #[arg(short, long, default_value = "corrected_events.json")]
        output: String,

        /// Also correct straws that are not marked good
        #[arg(long)]
        include_bad: bool,
    },

    /// Summarize calibration records
    Summary {
        /// Calibration records written by `calibrate`
        straw_info: String,

        /// Output format (table, json)
        #[arg(short, long, default_value = "table")]
        format: String,

        /// Only list straws that are not good
        #[arg(long)]
        failed_only: bool,
    },

    /// Generate synthetic measured and simulated event files
    Synth {
        /// Output file for measured events
        measured: String,

        /// Output file for simulated events
        simulated: String,

        #[arg(long, default_value = "896")]
        n_straws: usize,

        #[arg(long, default_value = "512")]
        resolution: usize,

        /// Clusters per straw
        #[arg(long, default_value = "7")]
        peaks: usize,

        #[arg(long, default_value = "200")]
        hits_per_peak: usize,

        #[arg(long, default_value = "42")]
        seed: u64,
    },
}

#[derive(Parser, Debug, Clone, Default)]
pub struct ConfigOverrides {
    /// Number of pixels per straw
    #[arg(long)]
    pub resolution: Option<usize>,

    /// Number of straws
    #[arg(long)]
    pub n_straws: Option<usize>,

    /// Edge pixels excluded from range checking
    #[arg(long)]
    pub range_checking: Option<usize>,

    /// Minimum measured hits for a straw to be calibrated
    #[arg(long)]
    pub min_hits: Option<usize>,

    /// Peak mode (simple, gaussian)
    #[arg(long)]
    pub peak_mode: Option<PeakMode>,

    /// Peak search sigma in bins
    #[arg(long)]
    pub sigma: Option<f64>,

    /// Peak search threshold as a fraction of the highest peak
    #[arg(long)]
    pub threshold: Option<f64>,

    /// Reject straws whose peak counts differ by more than this
    #[arg(long)]
    pub max_peak_difference: Option<usize>,

    /// Worker threads (default: all cores)
    #[arg(long)]
    pub threads: Option<usize>,

    /// Do not write diagnostic histograms
    #[arg(long)]
    pub no_plots: bool,
}

impl ConfigOverrides {
    pub fn apply_to(&self, config: &mut CalibrationConfig) {
        if let Some(resolution) = self.resolution {
            config.straw_resolution = resolution;
        }
        if let Some(n_straws) = self.n_straws {
            config.n_straws = n_straws;
        }
        if let Some(range_checking) = self.range_checking {
            config.range_checking = range_checking;
        }
        if let Some(min_hits) = self.min_hits {
            config.minimum_measured_hits_count = min_hits;
        }
        if let Some(peak_mode) = self.peak_mode {
            config.peak_mode = peak_mode;
        }
        if let Some(sigma) = self.sigma {
            config.peak_search.sigma = sigma;
        }
        if let Some(threshold) = self.threshold {
            config.peak_search.threshold = threshold;
        }
        if self.max_peak_difference.is_some() {
            config.max_peak_count_difference = self.max_peak_difference;
        }
        if self.threads.is_some() {
            config.threads = self.threads;
        }
        if self.no_plots {
            config.plotting_graphs = false;
        }
    }
}
