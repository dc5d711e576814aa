//! # Fit Subcommand
//!
//! Loads a manifest, fits the pattern's manifold and every sub-pattern
//! manifold in one pass over the record source, and saves the result.
//! Any previous calibration is discarded.

use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use clap::Args;

use pcal_registry::{Manifest, PatternStore};
use pcal_tensor::ManifoldFitter;

use crate::Workspace;

/// Arguments for the `pcal fit` subcommand.
#[derive(Args, Debug)]
pub struct FitArgs {
    /// Pattern identifier; must match the manifest's `id`.
    #[arg(long)]
    pub pattern: String,

    /// Manifest file (YAML or JSON).
    #[arg(long)]
    pub manifest: PathBuf,

    /// Record source (JSON Lines).
    #[arg(long)]
    pub data: PathBuf,
}

/// Execute the fit subcommand.
pub fn run_fit(args: &FitArgs, ws: &Workspace) -> Result<u8> {
    let loaded = Manifest::load(&args.manifest)
        .with_context(|| format!("failed to load manifest: {}", args.manifest.display()))?;
    if loaded.manifest.id != args.pattern {
        bail!(
            "manifest {} defines pattern \"{}\", not \"{}\"",
            args.manifest.display(),
            loaded.manifest.id,
            args.pattern
        );
    }
    let mut pattern = loaded.into_pattern();
    let source = crate::open_data(&args.data)?;

    let fitter = ManifoldFitter::new(ws.config.scan.clone(), ws.cancel.clone());
    let results = fitter
        .fit_targets(&source, &pattern.fit_targets())
        .with_context(|| format!("fit of {} aborted", args.pattern))?;
    pattern
        .apply_fit(results.into_iter())
        .with_context(|| format!("cannot fit pattern {}", args.pattern))?;

    ws.registry.save(&mut pattern)?;

    let manifold = pattern.require_manifold()?;
    if let Some(stats) = pattern.fit_stats {
        println!(
            "fit {}: processed {}, skipped {}, matched {}",
            pattern.id, stats.total, stats.skipped, stats.matched
        );
    }
    println!(
        "  manifold: mean {}, samples {}, metric {}",
        manifold.mean_vector(),
        manifold.sample_count(),
        manifold.metric()
    );
    for sub in &pattern.sub_patterns {
        match (&sub.manifold, &sub.fit_stats) {
            (Some(m), Some(s)) => println!(
                "  sub-pattern {}: matched {}, metric {}",
                sub.id,
                s.matched,
                m.metric()
            ),
            _ => println!("  sub-pattern {}: no samples, uses parent manifold", sub.id),
        }
    }
    println!("  saved revision {}", pattern.revision);
    Ok(0)
}
