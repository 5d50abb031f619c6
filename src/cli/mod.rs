//! Command-line parsing for the KHPS2 locus calibrator.
//!
//! Argument parsing and command dispatch stay separate from the locus and
//! solver code.

use std::path::PathBuf;

use clap::{ArgAction, Parser, Subcommand};

/// Top-level CLI.
#[derive(Debug, Parser)]
#[command(name = "khps2", version, about = "KHPS2 ductile fracture locus calibration")]
pub struct Cli {
    /// Increase log verbosity (-v debug, -vv trace). `KHPS2_LOG` / `RUST_LOG` take precedence.
    #[arg(short, long, global = true, action = ArgAction::Count)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Command,
}

/// CLI subcommands.
#[derive(Debug, Subcommand)]
pub enum Command {
    /// Calibrate G1..G6 from a run config, print diagnostics, and optionally plot/export.
    Calibrate(CalibrateArgs),
    /// Evaluate the locus at a single stress state.
    Evaluate(EvaluateArgs),
    /// Plot a previously exported locus JSON.
    Plot(PlotArgs),
    /// Generate a synthetic specimen CSV from known parameters.
    Synth(SynthArgs),
}

#[derive(Debug, Parser, Clone)]
pub struct CalibrateArgs {
    /// Run config JSON (specimens, initial_g, bounds, options).
    #[arg(short, long, value_name = "JSON")]
    pub config: PathBuf,

    /// Replace the config's specimens with the rows of this CSV.
    #[arg(long, value_name = "CSV")]
    pub specimens: Option<PathBuf>,

    /// Override the denominator epsilon.
    #[arg(long)]
    pub epsilon: Option<f64>,

    /// Export per-specimen results to CSV.
    #[arg(long, value_name = "CSV")]
    pub export: Option<PathBuf>,

    /// Export the calibrated locus (parameters, status, curves) to JSON.
    #[arg(long = "export-locus", value_name = "JSON")]
    pub export_locus: Option<PathBuf>,

    /// Disable the terminal plot.
    #[arg(long)]
    pub no_plot: bool,

    /// Plot width (columns); defaults to the config's plotting options.
    #[arg(long)]
    pub width: Option<usize>,

    /// Plot height (rows); defaults to the config's plotting options.
    #[arg(long)]
    pub height: Option<usize>,
}

#[derive(Debug, Parser, Clone)]
pub struct EvaluateArgs {
    /// Parameters G1..G6, comma separated.
    #[arg(long, value_delimiter = ',', required = true, allow_hyphen_values = true)]
    pub params: Vec<f64>,

    /// Stress triaxiality.
    #[arg(long, allow_negative_numbers = true)]
    pub triaxiality: f64,

    /// Normalized third invariant.
    #[arg(long, allow_negative_numbers = true)]
    pub invariant: f64,

    /// Denominator epsilon.
    #[arg(long, default_value_t = crate::domain::DEFAULT_DENOMINATOR_EPSILON)]
    pub epsilon: f64,
}

/// Options for plotting a saved locus.
#[derive(Debug, Parser, Clone)]
pub struct PlotArgs {
    /// Locus JSON file produced by `khps2 calibrate --export-locus`.
    #[arg(long, value_name = "JSON")]
    pub locus: PathBuf,

    /// Plot width (columns); defaults to the width stored with the locus.
    #[arg(long)]
    pub width: Option<usize>,

    /// Plot height (rows); defaults to the height stored with the locus.
    #[arg(long)]
    pub height: Option<usize>,
}

#[derive(Debug, Parser, Clone)]
pub struct SynthArgs {
    /// Parameters G1..G6, comma separated.
    #[arg(long, value_delimiter = ',', required = true, allow_hyphen_values = true)]
    pub params: Vec<f64>,

    /// Number of specimens to generate.
    #[arg(short = 'n', long, default_value_t = 12)]
    pub count: usize,

    /// Log-normal noise level on the fracture strain.
    #[arg(long, default_value_t = 0.05)]
    pub noise: f64,

    /// Random seed.
    #[arg(long, default_value_t = 42)]
    pub seed: u64,

    /// Output CSV (stdout if omitted).
    #[arg(short, long, value_name = "CSV")]
    pub output: Option<PathBuf>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn parses_negative_parameter_list() {
        let cli = Cli::try_parse_from([
            "khps2",
            "evaluate",
            "--params",
            "-0.1,0.2,-0.3,1,0.5,0.7",
            "--triaxiality",
            "0.33",
            "--invariant",
            "-1",
        ])
        .unwrap();
        match cli.command {
            Command::Evaluate(args) => {
                assert_eq!(args.params, vec![-0.1, 0.2, -0.3, 1.0, 0.5, 0.7]);
                assert_eq!(args.invariant, -1.0);
                assert_eq!(args.epsilon, 1e-6);
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn calibrate_flags() {
        let cli = Cli::try_parse_from(["khps2", "-v", "calibrate", "--config", "run.json", "--no-plot"]).unwrap();
        assert_eq!(cli.verbose, 1);
        let Command::Calibrate(args) = cli.command else {
            panic!("expected calibrate");
        };
        assert!(args.no_plot);
        assert_eq!(args.config, PathBuf::from("run.json"));
        assert!(args.export.is_none());
    }

    #[test]
    fn plot_size_defaults_to_the_saved_options() {
        let cli = Cli::try_parse_from(["khps2", "plot", "--locus", "locus.json", "--width", "60"]).unwrap();
        let Command::Plot(args) = cli.command else {
            panic!("expected plot");
        };
        assert_eq!(args.width, Some(60));
        assert_eq!(args.height, None);
    }
}
