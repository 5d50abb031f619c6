//! Top-level application orchestration.
//!
//! `src/main.rs` is intentionally tiny; this module is the "real main" that:
//! - loads `.env` and installs the log subscriber
//! - parses CLI arguments
//! - runs calibration through the pipeline
//! - prints reports/plots
//! - writes optional exports

use std::fs::File;
use std::io;

use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::prelude::*;

use crate::cli::{CalibrateArgs, Command, EvaluateArgs, PlotArgs, SynthArgs};
use crate::data::{SynthConfig, generate_specimens, specimens_to_csv};
use crate::domain::{CalibrationResult, MaterialParameters, PlotOptions, RunConfig};
use crate::error::AppError;
use crate::io::{LocusFile, load_run_config, load_specimens_csv, read_locus_json, write_locus_json, write_results_csv};
use crate::models::evaluate_point;
use crate::plot::{AsciiVisualizer, NullVisualizer, Visualizer, ascii};
use crate::report::{format_run_summary, format_specimen_table};

pub mod pipeline;

/// Environment variable holding the log filter (falls back to `RUST_LOG`).
pub const LOG_ENV: &str = "KHPS2_LOG";

/// Entry point for the `khps2` binary.
pub fn run() -> Result<(), AppError> {
    dotenvy::dotenv().ok();
    let cli = crate::cli::Cli::parse();
    init_tracing(cli.verbose);

    match cli.command {
        Command::Calibrate(args) => handle_calibrate(args),
        Command::Evaluate(args) => handle_evaluate(args),
        Command::Plot(args) => handle_plot(args),
        Command::Synth(args) => handle_synth(args),
    }
}

fn init_tracing(verbose: u8) {
    let default_level = match verbose {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_env(LOG_ENV)
        .or_else(|_| EnvFilter::try_from_default_env())
        .unwrap_or_else(|_| EnvFilter::new(default_level));

    // A second init (e.g. from tests) is harmless.
    let _ = tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer().with_writer(io::stderr))
        .with(filter)
        .try_init();
}

fn handle_calibrate(args: CalibrateArgs) -> Result<(), AppError> {
    let mut config = load_run_config(&args.config)?;

    if let Some(path) = &args.specimens {
        let ingest = load_specimens_csv(path)?;
        info!(
            path = %path.display(),
            rows_read = ingest.rows_read,
            rows_used = ingest.specimens.len(),
            "specimens loaded from CSV"
        );
        config.specimens = ingest.specimens;
    }
    if let Some(eps) = args.epsilon {
        config.denominator_epsilon = eps;
    }
    if let Some(width) = args.width {
        config.plotting_options.width = width;
    }
    if let Some(height) = args.height {
        config.plotting_options.height = height;
    }

    let visualizer: &dyn Visualizer = if args.no_plot { &NullVisualizer } else { &AsciiVisualizer };

    // Report text goes before the plot.
    let run = pipeline::run_analysis(&config, &ReportFirst { inner: visualizer, config: &config })?;

    if let Some(path) = &args.export {
        write_results_csv(path, &run.result.points, &run.result.errors)?;
        info!(path = %path.display(), "wrote results CSV");
    }
    if let Some(path) = &args.export_locus {
        let locus = LocusFile::from_result(&run.result, &config);
        write_locus_json(path, &locus)?;
        info!(path = %path.display(), "wrote locus JSON");
    }

    Ok(())
}

/// Prints the run summary and specimen table, then delegates to the plot renderer.
struct ReportFirst<'a> {
    inner: &'a dyn Visualizer,
    config: &'a RunConfig,
}

impl Visualizer for ReportFirst<'_> {
    fn render(&self, result: &CalibrationResult, options: &PlotOptions) -> Result<(), AppError> {
        println!("{}", format_run_summary(result, self.config));
        println!("{}", format_specimen_table(&result.points, &result.errors));
        self.inner.render(result, options)
    }
}

fn handle_evaluate(args: EvaluateArgs) -> Result<(), AppError> {
    let params = MaterialParameters::from_slice(&args.params)?;
    if !(args.epsilon.is_finite() && args.epsilon > 0.0) {
        return Err(AppError::invalid_input("Denominator epsilon must be finite and > 0."));
    }
    let (cut_off, ef) = evaluate_point(&params, args.triaxiality, args.invariant, args.epsilon);

    println!("G                  : {params}");
    println!("triaxiality        : {}", args.triaxiality);
    println!("invariant          : {}", args.invariant);
    println!("cut-off triaxiality: {cut_off:.6}");
    if ef.is_nan() {
        println!("fracture strain    : undefined (on the cut-off plane)");
    } else {
        println!("fracture strain    : {ef:.6}");
    }
    if args.triaxiality < cut_off {
        println!("note: stress state lies behind the cut-off plane");
    }
    Ok(())
}

fn handle_plot(args: PlotArgs) -> Result<(), AppError> {
    let locus = read_locus_json(&args.locus)?;
    let result = locus.to_result()?;

    let mut options = locus.plot.clone();
    if let Some(width) = args.width {
        options.width = width;
    }
    if let Some(height) = args.height {
        options.height = height;
    }
    println!("{}", ascii::render_locus_map(&result, &options));
    println!("{}", ascii::render_profiles(&result, &options));
    Ok(())
}

fn handle_synth(args: SynthArgs) -> Result<(), AppError> {
    let params = MaterialParameters::from_slice(&args.params)?;
    let config = SynthConfig {
        count: args.count,
        noise: args.noise,
        seed: args.seed,
        ..SynthConfig::default()
    };
    let specimens = generate_specimens(&params, &config)?;

    match &args.output {
        Some(path) => {
            let file = File::create(path)
                .map_err(|e| AppError::io(format!("Failed to create specimen CSV '{}': {e}", path.display())))?;
            specimens_to_csv(&specimens, file)?;
            info!(path = %path.display(), count = specimens.len(), "wrote synthetic specimens");
        }
        None => specimens_to_csv(&specimens, io::stdout().lock())?,
    }
    Ok(())
}
