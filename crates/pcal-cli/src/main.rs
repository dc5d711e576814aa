//! # pcal CLI entry point
//!
//! Parses command-line arguments, sets up logging and dispatches to the
//! subcommand handlers.

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use pcal_cli::audit::{run_audit, AuditArgs};
use pcal_cli::calibrate::{run_calibrate, CalibrateArgs};
use pcal_cli::fit::{run_fit, FitArgs};
use pcal_cli::inspect::{run_list, run_show, ShowArgs};
use pcal_cli::route::{run_route, RouteArgs};
use pcal_cli::Workspace;

/// Pattern calibration engine.
///
/// Fits statistical manifolds to rule-defined patterns, calibrates distance
/// thresholds to the rules' abundance, and audits how well the two agree.
#[derive(Parser, Debug)]
#[command(name = "pcal", version, about, long_about = None)]
struct Cli {
    /// Enable verbose output. Repeat for more verbosity (-v, -vv, -vvv).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Path to a YAML configuration file.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Registry directory (overrides the configuration).
    #[arg(long, global = true)]
    registry: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Fit the pattern manifolds from a manifest and a record source.
    Fit(FitArgs),

    /// Calibrate the distance threshold to the rule's base abundance.
    Calibrate(CalibrateArgs),

    /// Compare rule and manifold classifications.
    Audit(AuditArgs),

    /// Route records to sub-patterns and count the results.
    Route(RouteArgs),

    /// Print a stored pattern.
    Show(ShowArgs),

    /// List stored patterns.
    List,
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let filter = match cli.verbose {
        0 => EnvFilter::new("warn"),
        1 => EnvFilter::new("info"),
        2 => EnvFilter::new("debug"),
        _ => EnvFilter::new("trace"),
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    tracing::debug!("pcal v{} starting", env!("CARGO_PKG_VERSION"));

    let result = Workspace::open(cli.config.as_deref(), cli.registry.as_deref()).and_then(|ws| {
        match &cli.command {
            Commands::Fit(args) => run_fit(args, &ws),
            Commands::Calibrate(args) => run_calibrate(args, &ws),
            Commands::Audit(args) => run_audit(args, &ws),
            Commands::Route(args) => run_route(args, &ws),
            Commands::Show(args) => run_show(args, &ws),
            Commands::List => run_list(&ws),
        }
    });

    match result {
        Ok(code) => ExitCode::from(code),
        Err(e) => {
            eprintln!("error: {e:#}");
            ExitCode::from(1)
        }
    }
}
