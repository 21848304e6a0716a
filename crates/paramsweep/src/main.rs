use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use paramsweep::{CsvWriter, SweepFile, SweepMode, init_logging, run};

#[derive(Parser, Debug)]
#[command(name = "paramsweep")]
#[command(about = "Run a parameter sweep over the demo tank model")]
struct Args {
    /// Path to the YAML sweep file
    definition: PathBuf,

    /// Number of in-process workers (overrides the sweep file)
    #[arg(short, long)]
    workers: Option<usize>,

    /// Sampling seed (overrides the sweep file)
    #[arg(short, long)]
    seed: Option<u64>,

    /// CSV file for the global results
    #[arg(short, long, default_value = "sweep_results.csv")]
    output: PathBuf,

    /// Resample until this many samples solve
    #[arg(short, long)]
    recursive: Option<usize>,

    /// Directory for per-worker CSV files
    #[arg(long)]
    debug_dir: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long, default_value = "info")]
    log_level: String,
}

fn main() -> color_eyre::Result<()> {
    color_eyre::install()?;

    let args = Args::parse();
    init_logging(&args.log_level)?;

    let mut file = SweepFile::load(&args.definition)?;
    if let Some(workers) = args.workers {
        file.options.number_of_workers = workers;
    }
    if args.seed.is_some() {
        file.options.seed = args.seed;
    }

    let mode = match args.recursive {
        Some(target) => SweepMode::Recursive(target),
        None => SweepMode::Single,
    };
    let writer = Arc::new(CsvWriter::new(Some(args.output.clone()), args.debug_dir));
    let result = run(&file, mode, writer)?;

    tracing::info!(
        rows = result.global.nrows(),
        successes = result.global_results.num_successful(),
        output = %args.output.display(),
        "Sweep finished"
    );
    Ok(())
}
