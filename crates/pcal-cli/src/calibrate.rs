//! # Calibrate Subcommand
//!
//! Builds the distance profile of a fitted pattern over a record source and
//! bisects the threshold whose recognition rate matches the rule's base
//! abundance (or an explicit `--target`). Non-convergence is reported but is
//! not a failure.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Args;

use pcal_calibration::{Calibrator, DistanceProfile};
use pcal_core::{CalibrationConfig, SearchRange};
use pcal_registry::PatternStore;

use crate::Workspace;

/// Arguments for the `pcal calibrate` subcommand.
#[derive(Args, Debug)]
pub struct CalibrateArgs {
    /// Pattern identifier.
    #[arg(long)]
    pub pattern: String,

    /// Record source (JSON Lines).
    #[arg(long)]
    pub data: PathBuf,

    /// Accepted |rate − target| in percentage points.
    #[arg(long)]
    pub tolerance: Option<f64>,

    /// Search interval as `lo,hi`.
    #[arg(long, value_name = "LO,HI")]
    pub range: Option<SearchRange>,

    /// Target recognition rate in percent; defaults to the base abundance.
    #[arg(long)]
    pub target: Option<f64>,

    /// Maximum bisection steps.
    #[arg(long)]
    pub max_iterations: Option<u32>,

    /// Print every bisection step.
    #[arg(long)]
    pub steps: bool,
}

impl CalibrateArgs {
    /// Configured defaults with this invocation's overrides applied.
    pub fn effective_config(&self, base: &CalibrationConfig) -> CalibrationConfig {
        let mut config = base.clone();
        if let Some(t) = self.tolerance {
            config.tolerance_pct = t;
        }
        if let Some(r) = self.range {
            config.search_range = r;
        }
        if let Some(n) = self.max_iterations {
            config.max_iterations = n;
        }
        config
    }
}

/// Execute the calibrate subcommand.
pub fn run_calibrate(args: &CalibrateArgs, ws: &Workspace) -> Result<u8> {
    let config = args.effective_config(&ws.config.calibration);
    let calibrator = Calibrator::new(config).context("invalid calibration settings")?;

    let mut pattern = ws.registry.load(&args.pattern)?;
    let source = crate::open_data(&args.data)?;

    let profile = {
        let subject = pattern.subject()?;
        DistanceProfile::build(&source, &subject, &ws.config.scan, &ws.cancel)
            .with_context(|| format!("calibration scan of {} aborted", args.pattern))?
    };
    let base = profile.base_abundance();
    let calibration = match args.target {
        Some(target) => calibrator.calibrate(&profile, target)?,
        None => calibrator.calibrate_to_base(&profile)?,
    };

    let config = calibrator.config();
    pattern.apply_calibration(&calibration, base, config.tolerance_pct, config.search_range);
    ws.registry.save(&mut pattern)?;

    let stats = profile.stats();
    println!(
        "calibrate {}: processed {}, skipped {}, matched {}",
        pattern.id,
        stats.processed,
        stats.skipped,
        profile.rule_matches()
    );
    println!("  base abundance: {base:.4}%");
    if args.steps {
        for s in &calibration.steps {
            println!(
                "  step {:>3}: [{:.6}, {:.6}] mid {:.6} rate {:.4}%",
                s.iteration, s.lo, s.hi, s.mid, s.rate
            );
        }
    }
    println!(
        "  threshold {:.6} ({}): rate {:.4}% target {:.4}% delta {:+.4} after {} iterations",
        calibration.threshold,
        calibration.metric,
        calibration.achieved_rate,
        calibration.target_rate,
        calibration.delta,
        calibration.iterations
    );
    if !calibration.converged {
        println!(
            "  warning: did not converge within ±{} points; best threshold saved",
            config.tolerance_pct
        );
    }
    println!("  saved revision {}", pattern.revision);
    Ok(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn overrides_replace_configured_defaults() {
        let args = CalibrateArgs {
            pattern: "p".into(),
            data: PathBuf::from("d.jsonl"),
            tolerance: Some(1.0),
            range: Some(SearchRange { lo: 0.0, hi: 5.0 }),
            target: None,
            max_iterations: None,
            steps: false,
        };
        let base = CalibrationConfig::default();
        let c = args.effective_config(&base);
        assert_eq!(c.tolerance_pct, 1.0);
        assert_eq!(c.search_range, SearchRange { lo: 0.0, hi: 5.0 });
        assert_eq!(c.max_iterations, base.max_iterations);
        assert_eq!(c.precision_floor, base.precision_floor);
    }
}
