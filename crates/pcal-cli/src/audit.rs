//! # Audit Subcommand
//!
//! Classifies every record with both the rule and the manifold threshold
//! and reports how far the two sets agree.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::Args;

use pcal_calibration::{AuditReport, OverlapAnalyzer};
use pcal_registry::PatternStore;

use crate::Workspace;

/// Arguments for the `pcal audit` subcommand.
#[derive(Args, Debug)]
pub struct AuditArgs {
    /// Pattern identifier.
    #[arg(long)]
    pub pattern: String,

    /// Record source (JSON Lines).
    #[arg(long)]
    pub data: PathBuf,

    /// Distance threshold; defaults to the calibrated one.
    #[arg(long)]
    pub threshold: Option<f64>,

    /// Write the full report as pretty JSON.
    #[arg(long, short)]
    pub out: Option<PathBuf>,
}

/// Execute the audit subcommand.
pub fn run_audit(args: &AuditArgs, ws: &Workspace) -> Result<u8> {
    let pattern = ws.registry.load(&args.pattern)?;
    let threshold = match args.threshold {
        Some(t) => t,
        None => pattern.require_threshold()?.optimal_threshold,
    };
    let source = crate::open_data(&args.data)?;

    let analyzer = OverlapAnalyzer::new(
        ws.config.scan.clone(),
        ws.config.audit.clone(),
        ws.cancel.clone(),
    );
    let report = analyzer
        .audit(&source, &pattern.subject()?, threshold)
        .with_context(|| format!("audit of {} aborted", args.pattern))?;

    print_summary(&report);
    if let Some(out) = &args.out {
        write_report(&report, out)?;
        println!("  report written to {}", out.display());
    }
    Ok(0)
}

fn print_summary(r: &AuditReport) {
    println!(
        "audit {}: processed {}, skipped {}, matched {} (logic) / {} (manifold)",
        r.pattern_id, r.total, r.skipped, r.logic_count, r.physics_count
    );
    println!("  threshold {:.6} ({})", r.threshold, r.metric);
    println!(
        "  intersection {}, union {}, IoU {:.4}",
        r.intersection_count, r.union_count, r.iou
    );
    match r.manifold_excess_factor {
        Some(f) => println!("  manifold excess factor {f:.4}"),
        None => println!("  manifold excess factor n/a (rule matched nothing)"),
    }
    println!(
        "  logic rate {:.4}%, manifold rate {:.4}%, deviation {:+.4} points",
        r.logic_rate, r.physics_rate, r.deviation
    );
    println!("  disagreements {} ({} listed)", r.diff_count, r.diffs.len());
}

/// Write `report` as pretty JSON, creating parent directories.
pub fn write_report(report: &AuditReport, out: &Path) -> Result<()> {
    if let Some(parent) = out.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("failed to create {}", parent.display()))?;
    }
    let json = serde_json::to_string_pretty(report)?;
    std::fs::write(out, json + "\n")
        .with_context(|| format!("failed to write report: {}", out.display()))?;
    Ok(())
}
