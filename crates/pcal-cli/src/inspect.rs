//! # Show and List Subcommands
//!
//! Read-only views of the registry.

use anyhow::Result;
use clap::Args;

use pcal_registry::PatternStore;

use crate::Workspace;

/// Arguments for the `pcal show` subcommand.
#[derive(Args, Debug)]
pub struct ShowArgs {
    /// Pattern identifier.
    #[arg(long)]
    pub pattern: String,
}

/// Print a stored pattern document as pretty JSON.
pub fn run_show(args: &ShowArgs, ws: &Workspace) -> Result<u8> {
    let entry = ws.registry.load_entry(&args.pattern)?;
    println!("{}", serde_json::to_string_pretty(&entry)?);
    Ok(0)
}

/// Print one line per stored pattern.
pub fn run_list(ws: &Workspace) -> Result<u8> {
    let ids = ws.registry.list()?;
    if ids.is_empty() {
        println!("registry {} is empty", ws.registry.dir().display());
        return Ok(0);
    }
    for id in ids {
        let p = ws.registry.load(&id)?;
        let state = match (&p.manifold, &p.threshold) {
            (None, _) => "unfitted".to_string(),
            (Some(m), None) => format!("fitted ({})", m.metric()),
            (Some(_), Some(t)) => format!(
                "calibrated at {:.6} ({}{})",
                t.optimal_threshold,
                t.metric,
                if t.converged { "" } else { ", not converged" }
            ),
        };
        println!("{id}\trev {}\t{state}", p.revision);
    }
    Ok(0)
}
