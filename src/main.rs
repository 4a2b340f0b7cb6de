//! bandmerge CLI
//!
//! Merges rotated RF spectrum capture chunks into per-band waterfall
//! datasets and serves quick queries over the sealed artifacts.

use anyhow::Result;
use bandmerge::commands::{
    execute_bands, execute_merge, execute_peaks, execute_summary, execute_tile, validate_args,
    MergeArgs,
};
use bandmerge::pipeline::CancelToken;
use bandmerge::query::{Curve, PeakParams};
use bandmerge::utils::config::{
    DEFAULT_SUMMARY_MAX_PTS, DEFAULT_TILE_MAXT, DEFAULT_TILE_MAXW, GRID_REL_TOLERANCE,
};
use clap::{Parser, Subcommand};
use env_logger::Env;
use std::path::PathBuf;

/// bandmerge - merge RF capture chunks into indexed waterfall bands
#[derive(Parser, Debug)]
#[command(name = "bandmerge")]
#[command(version, about, long_about = None)]
struct Cli {
    /// Subcommand to execute
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

/// Available commands
#[derive(Subcommand, Debug)]
enum Commands {
    /// Merge capture chunks into per-band artifacts
    Merge {
        /// Files and/or directories containing capture chunks
        #[arg(required = true)]
        inputs: Vec<PathBuf>,

        /// Output directory for band artifacts
        #[arg(short, long, default_value = "data")]
        data_dir: PathBuf,

        /// Relative grid-drift tolerance
        #[arg(long, default_value_t = GRID_REL_TOLERANCE)]
        tolerance: f64,

        /// List discovered bands without building artifacts
        #[arg(long)]
        list_bands: bool,
    },

    /// List sealed bands in a data directory
    Bands {
        /// Data directory with band artifacts
        #[arg(short, long, default_value = "data")]
        data_dir: PathBuf,
    },

    /// Print a summary window as JSON
    Summary {
        #[arg(short, long, default_value = "data")]
        data_dir: PathBuf,

        /// Band index
        #[arg(short, long)]
        band: usize,

        /// Window start, hertz
        #[arg(long)]
        f0: Option<f64>,

        /// Window end, hertz
        #[arg(long)]
        f1: Option<f64>,

        /// Maximum points per output curve
        #[arg(long, default_value_t = DEFAULT_SUMMARY_MAX_PTS)]
        max_pts: usize,
    },

    /// Extract a waterfall tile as PNG
    Tile {
        #[arg(short, long, default_value = "data")]
        data_dir: PathBuf,

        /// Band index
        #[arg(short, long)]
        band: usize,

        /// Frequency window start, hertz
        #[arg(long)]
        f0: Option<f64>,

        /// Frequency window end, hertz
        #[arg(long)]
        f1: Option<f64>,

        /// Time window start, seconds from the band's first trace
        #[arg(long)]
        t0: Option<f64>,

        /// Time window end, seconds from the band's first trace
        #[arg(long)]
        t1: Option<f64>,

        /// Maximum tile width, cells
        #[arg(long, default_value_t = DEFAULT_TILE_MAXW)]
        maxw: usize,

        /// Maximum tile height, cells
        #[arg(long, default_value_t = DEFAULT_TILE_MAXT)]
        maxt: usize,

        /// Output PNG path
        #[arg(short, long, default_value = "tile.png")]
        output: PathBuf,
    },

    /// Detect peaks on a summary curve
    Peaks {
        #[arg(short, long, default_value = "data")]
        data_dir: PathBuf,

        /// Band index
        #[arg(short, long)]
        band: usize,

        /// Summary curve: max, avg, or min
        #[arg(short, long, default_value = "max")]
        curve: String,

        /// Minimum peak height, dB
        #[arg(long)]
        height: Option<f64>,

        /// Minimum topographic prominence, dB
        #[arg(long)]
        prominence: Option<f64>,

        /// Minimum distance between peaks, bins
        #[arg(long)]
        distance: Option<usize>,

        /// Window start, hertz
        #[arg(long)]
        f0: Option<f64>,

        /// Window end, hertz
        #[arg(long)]
        f1: Option<f64>,
    },
}

fn main() -> Result<()> {
    // Parse CLI arguments
    let cli = Cli::parse();

    // Setup logging
    let log_level = if cli.verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(Env::default().default_filter_or(log_level)).init();

    // Execute command
    match cli.command {
        Commands::Merge {
            inputs,
            data_dir,
            tolerance,
            list_bands,
        } => {
            let args = MergeArgs {
                inputs,
                data_dir,
                tolerance,
                list_only: list_bands,
            };

            // Validate args first
            validate_args(&args)?;

            // Execute merge; build failures carry their own exit codes
            match execute_merge(&args, &CancelToken::new()) {
                Ok(report) => {
                    for band in &report.bands {
                        println!(
                            "✓ Band {}: {} | {} x {} | levels {:?}",
                            band.index, band.key, band.n_traces, band.n_freqs, band.levels
                        );
                    }
                    if report.decode_skips > 0 {
                        println!("  {} record(s) skipped", report.decode_skips);
                    }
                }
                Err(e) => {
                    eprintln!("merge failed: {e}");
                    std::process::exit(e.exit_code());
                }
            }
        }

        Commands::Bands { data_dir } => {
            execute_bands(&data_dir)?;
        }

        Commands::Summary {
            data_dir,
            band,
            f0,
            f1,
            max_pts,
        } => {
            execute_summary(&data_dir, band, f0, f1, max_pts)?;
        }

        Commands::Tile {
            data_dir,
            band,
            f0,
            f1,
            t0,
            t1,
            maxw,
            maxt,
            output,
        } => {
            execute_tile(&data_dir, band, f0, f1, t0, t1, maxw, maxt, &output)?;
        }

        Commands::Peaks {
            data_dir,
            band,
            curve,
            height,
            prominence,
            distance,
            f0,
            f1,
        } => {
            let curve: Curve = curve.parse().map_err(anyhow::Error::msg)?;
            let params = PeakParams {
                height,
                prominence,
                distance,
                f0,
                f1,
            };
            execute_peaks(&data_dir, band, curve, params)?;
        }
    }

    Ok(())
}
