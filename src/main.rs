use clap::Parser;
use tracing_subscriber::EnvFilter;

use straw_calib::cli::{Cli, Commands};
use straw_calib::commands::{apply_calibration, generate_synthetic, run_calibration, summarize};

fn init_tracing(verbose: bool) {
    let default_level = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    match cli.command {
        Commands::Calibrate {
            measured,
            simulated,
            output,
            parameters,
            config,
            overrides,
            plot_dir,
        } => {
            run_calibration(
                &measured,
                &simulated,
                &output,
                parameters.as_deref(),
                config.as_deref(),
                &overrides,
                plot_dir.as_deref(),
            )?;
        }
        Commands::Apply {
            straw_info,
            events,
            output,
            include_bad,
        } => {
            apply_calibration(&straw_info, &events, &output, include_bad)?;
        }
        Commands::Summary {
            straw_info,
            format,
            failed_only,
        } => {
            summarize(&straw_info, &format, failed_only)?;
        }
        Commands::Synth {
            measured,
            simulated,
            n_straws,
            resolution,
            peaks,
            hits_per_peak,
            seed,
        } => {
            generate_synthetic(
                &measured,
                &simulated,
                n_straws,
                resolution,
                peaks,
                hits_per_peak,
                seed,
            )?;
        }
    }

    Ok(())
}
