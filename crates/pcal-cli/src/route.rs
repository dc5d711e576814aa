//! # Route Subcommand
//!
//! Runs every record through the pattern's router and prints how many
//! landed on each sub-pattern.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Args;

use pcal_registry::{PatternStore, Router};

use crate::Workspace;

/// Arguments for the `pcal route` subcommand.
#[derive(Args, Debug)]
pub struct RouteArgs {
    /// Pattern identifier.
    #[arg(long)]
    pub pattern: String,

    /// Record source (JSON Lines).
    #[arg(long)]
    pub data: PathBuf,
}

/// Execute the route subcommand.
pub fn run_route(args: &RouteArgs, ws: &Workspace) -> Result<u8> {
    let pattern = ws.registry.load(&args.pattern)?;
    let router = Router::new(&pattern)?;
    let source = crate::open_data(&args.data)?;

    let summary = router
        .route_batch(&source, &ws.config.scan, &ws.cancel)
        .with_context(|| format!("routing of {} aborted", args.pattern))?;

    let matched: u64 = summary.matched.values().sum();
    println!(
        "route {}: processed {}, skipped {}, matched {}",
        pattern.id, summary.total, summary.skipped, matched
    );
    for sub in &pattern.sub_patterns {
        println!(
            "  {}: {}",
            sub.id,
            summary.matched.get(&sub.id).copied().unwrap_or(0)
        );
    }
    println!("  unmatched: {}", summary.unmatched);
    Ok(0)
}
