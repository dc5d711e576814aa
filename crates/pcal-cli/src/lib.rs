//! # pcal-cli: Pattern Calibration Command-Line Interface
//!
//! ## Subcommands
//!
//! - `fit`: fit a pattern's manifolds from a manifest and a record source
//! - `calibrate`: bisect the distance threshold to the rule's abundance
//! - `audit`: compare rule and manifold classifications record by record
//! - `route`: classify a record source through the pattern's router
//! - `show` / `list`: inspect the registry
//!
//! ## Crate Policy
//!
//! - Argument parsing lives in each subcommand module next to its handler.
//! - Handlers delegate to the library crates and only format results.
//! - Handlers return an exit code; any error is reported once by `main`.
//!
//! ## Usage
//!
//! ```bash
//! pcal fit --pattern officer --manifest patterns/officer.yaml --data charts.jsonl
//! pcal calibrate --pattern officer --data charts.jsonl --tolerance 0.5
//! pcal audit --pattern officer --data charts.jsonl --out audit.json
//! ```

pub mod audit;
pub mod calibrate;
pub mod fit;
pub mod inspect;
pub mod route;

use std::path::Path;

use anyhow::{Context, Result};

use pcal_core::{CancellationToken, PcalConfig, RecordSource};
use pcal_registry::FileRegistry;

/// Everything a handler needs besides its own arguments.
#[derive(Debug)]
pub struct Workspace {
    /// Effective configuration.
    pub config: PcalConfig,
    /// Pattern registry.
    pub registry: FileRegistry,
    /// Shared cancellation flag for long scans.
    pub cancel: CancellationToken,
}

impl Workspace {
    /// Load configuration (defaults when `config` is `None`), apply the
    /// registry override and open the registry.
    pub fn open(config: Option<&Path>, registry_dir: Option<&Path>) -> Result<Self> {
        let mut config = match config {
            Some(path) => PcalConfig::load(path)
                .with_context(|| format!("failed to load config: {}", path.display()))?,
            None => PcalConfig::default(),
        };
        if let Some(dir) = registry_dir {
            config.registry.dir = dir.to_path_buf();
        }
        let registry = FileRegistry::open(&config.registry).with_context(|| {
            format!("failed to open registry: {}", config.registry.dir.display())
        })?;
        tracing::debug!(registry = %registry.dir().display(), "workspace ready");

        Ok(Self {
            config,
            registry,
            cancel: CancellationToken::new(),
        })
    }
}

/// Open a JSON Lines record source.
pub fn open_data(path: &Path) -> Result<RecordSource> {
    RecordSource::open(path).with_context(|| format!("cannot read data: {}", path.display()))
}
