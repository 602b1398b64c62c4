use std::fs;
use std::path::PathBuf;

use anyhow::Context;
use clap::Parser;

use hbvcal::calibrate::{CalibrationSession, Dataset};
use hbvcal::catchment::CatchmentParameters;
use hbvcal::dataset::load_forcing_csv;

/// Calibrate an HBV rainfall-runoff model against observed discharge.
#[derive(Parser, Debug)]
#[command(version, about)]
struct Args {
    /// Training forcing series (CSV)
    training: PathBuf,

    /// Validation forcing series (CSV)
    validation: PathBuf,

    /// Catchment description (TOML)
    catchment: PathBuf,

    /// Directory for results and simulated series
    #[arg(short, long, default_value = "./output")]
    output: PathBuf,

    /// Number of independent search runs
    #[arg(long, default_value_t = 1)]
    runs: usize,

    /// Iteration cap per run
    #[arg(long, default_value_t = 1500)]
    max_iterations: usize,

    /// RNG seed; omit for a random one
    #[arg(long)]
    seed: Option<u64>,

    /// Log search progress every N iterations
    #[arg(long, default_value_t = 50)]
    feedback_interval: usize,
}

fn main() -> anyhow::Result<()> {
    env_logger::init();
    let args = Args::parse();

    let catchment = CatchmentParameters::from_toml_file(&args.catchment)
        .with_context(|| format!("reading catchment file {}", args.catchment.display()))?;
    let training = load_forcing_csv(&args.training)
        .with_context(|| format!("reading training series {}", args.training.display()))?;
    let validation = load_forcing_csv(&args.validation)
        .with_context(|| format!("reading validation series {}", args.validation.display()))?;

    let seed = args.seed.unwrap_or_else(rand::random);
    log::info!(
        "calibrating with {} runs, {} iterations each, seed {seed}",
        args.runs,
        args.max_iterations
    );

    let mut session = CalibrationSession::new(catchment, training, validation);
    session
        .calibrate(args.runs, args.max_iterations, seed, args.feedback_interval)
        .context("calibration failed")?;

    let results = session.results_text()?;
    println!("{results}");

    fs::create_dir_all(&args.output)
        .with_context(|| format!("creating output directory {}", args.output.display()))?;
    session.write_results(&args.output.join("results.txt"))?;
    session.write_simulation_csv(&args.output.join("trainingset-output.csv"), Dataset::Training)?;
    session.write_simulation_csv(
        &args.output.join("validationset-output.csv"),
        Dataset::Validation,
    )?;

    Ok(())
}
