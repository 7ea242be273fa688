//! Command-line entry point: match a probe file onto a link file and write
//! the reports.

use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use probe_matcher::{run_pipeline, MatchConfig, PipelinePaths, RmseDenominator};

#[derive(Parser, Debug)]
#[command(name = "probe-match", about = "Map-match GPS probe traces onto road links")]
struct Flags {
    /// Link records (comma-separated, no header)
    #[arg(long)]
    links: PathBuf,

    /// Probe records (comma-separated, no header)
    #[arg(long)]
    probes: PathBuf,

    /// Directory for MatchedPoints.csv, MatchedPointsSlope.csv and summary.json
    #[arg(long, default_value = ".")]
    output: PathBuf,

    /// SQLite snapshot cache (requires the persistence feature)
    #[arg(long)]
    snapshot_db: Option<PathBuf>,

    /// Geohash length of the fine index
    #[arg(long, default_value_t = 8)]
    fine_precision: usize,

    /// Geohash length of the coarse index
    #[arg(long, default_value_t = 7)]
    coarse_precision: usize,

    /// Minimum fine bucket size before falling back to the coarse index
    #[arg(long, default_value_t = 5)]
    min_fine_candidates: usize,

    /// Worker threads (defaults to the available parallelism)
    #[arg(long)]
    workers: Option<usize>,

    /// RMSE denominator: "compared" or "all"
    #[arg(long, default_value = "compared")]
    rmse_denominator: RmseDenominator,

    /// chrono format of probe timestamps
    #[arg(long, default_value = "%m/%d/%Y %I:%M:%S %p")]
    timestamp_format: String,
}

fn main() -> ExitCode {
    env_logger::init();
    let flags = Flags::parse();

    let paths = PipelinePaths {
        link_file: flags.links,
        probe_file: flags.probes,
        output_dir: flags.output,
        snapshot_db: flags.snapshot_db,
    };
    let config = MatchConfig {
        fine_precision: flags.fine_precision,
        coarse_precision: flags.coarse_precision,
        min_fine_candidates: flags.min_fine_candidates,
        worker_threads: flags.workers,
        rmse_denominator: flags.rmse_denominator,
        timestamp_format: flags.timestamp_format,
    };

    match run_pipeline(&paths, &config) {
        Ok(summary) => {
            println!(
                "Matched {} of {} trips ({} unmatchable, {} failed)",
                summary.engine.matched_count,
                summary.engine.trip_count,
                summary.engine.unmatchable_count,
                summary.engine.failed_count
            );
            match summary.accuracy.rmse {
                Some(rmse) => println!(
                    "Slope RMSE: {:.4} ({} denominator)",
                    rmse,
                    summary.accuracy.denominator.as_str()
                ),
                None => println!("Slope RMSE: n/a"),
            }
            ExitCode::SUCCESS
        }
        Err(e) => {
            log::error!("[Engine] Run failed: {}", e);
            eprintln!("probe-match: {}", e);
            ExitCode::FAILURE
        }
    }
}
