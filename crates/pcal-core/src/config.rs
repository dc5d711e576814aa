//! # Configuration
//!
//! Explicit configuration structs passed through every public entry point.
//! There are no process-wide defaults: calibration runs are reproducible and
//! safe to run side by side with different settings.
//!
//! A [`PcalConfig`] can be loaded from YAML. Every field has a default, so a
//! config file only needs the values it overrides, and the CLI overrides the
//! calibration fields again per invocation.

use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::PcalError;

// ---------------------------------------------------------------------------
// SearchRange
// ---------------------------------------------------------------------------

/// Closed interval searched by the threshold calibrator.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SearchRange {
    /// Lower bound.
    pub lo: f64,
    /// Upper bound.
    pub hi: f64,
}

impl SearchRange {
    /// Construct and validate a range.
    pub fn new(lo: f64, hi: f64) -> Result<Self, PcalError> {
        let range = Self { lo, hi };
        range.validate()?;
        Ok(range)
    }

    /// Both bounds finite, non-negative and `lo <= hi`.
    pub fn validate(&self) -> Result<(), PcalError> {
        if !self.lo.is_finite() || !self.hi.is_finite() {
            return Err(PcalError::InvalidCalibration(format!(
                "search range bounds must be finite, got {self}"
            )));
        }
        if self.lo < 0.0 {
            return Err(PcalError::InvalidCalibration(format!(
                "search range lower bound must be non-negative, got {self}"
            )));
        }
        if self.lo > self.hi {
            return Err(PcalError::InvalidCalibration(format!(
                "search range lower bound exceeds upper bound: {self}"
            )));
        }
        Ok(())
    }
}

impl Default for SearchRange {
    fn default() -> Self {
        Self { lo: 0.0, hi: 10.0 }
    }
}

impl fmt::Display for SearchRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}, {}]", self.lo, self.hi)
    }
}

impl FromStr for SearchRange {
    type Err = PcalError;

    /// Parse `lo,hi`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (lo, hi) = s.split_once(',').ok_or_else(|| {
            PcalError::InvalidCalibration(format!("search range must be `lo,hi`, got \"{s}\""))
        })?;
        let parse = |v: &str| {
            v.trim().parse::<f64>().map_err(|_| {
                PcalError::InvalidCalibration(format!("search range bound \"{v}\" is not a number"))
            })
        };
        Self::new(parse(lo)?, parse(hi)?)
    }
}

// ---------------------------------------------------------------------------
// CalibrationConfig
// ---------------------------------------------------------------------------

/// Threshold calibration parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CalibrationConfig {
    /// Accepted `|rate - target|` in percentage points.
    pub tolerance_pct: f64,
    /// Interval searched for the threshold.
    pub search_range: SearchRange,
    /// Maximum bisection steps.
    pub max_iterations: u32,
    /// Stop once `hi - lo` falls below this width.
    pub precision_floor: f64,
}

impl Default for CalibrationConfig {
    fn default() -> Self {
        Self {
            tolerance_pct: 0.5,
            search_range: SearchRange::default(),
            max_iterations: 60,
            precision_floor: 1e-9,
        }
    }
}

impl CalibrationConfig {
    /// Reject inconsistent parameters before any scan starts.
    pub fn validate(&self) -> Result<(), PcalError> {
        self.search_range.validate()?;
        if !self.tolerance_pct.is_finite() || self.tolerance_pct < 0.0 {
            return Err(PcalError::InvalidCalibration(format!(
                "tolerance must be a non-negative percentage, got {}",
                self.tolerance_pct
            )));
        }
        if self.max_iterations == 0 {
            return Err(PcalError::InvalidCalibration(
                "max_iterations must be at least 1".into(),
            ));
        }
        if !self.precision_floor.is_finite() || self.precision_floor < 0.0 {
            return Err(PcalError::InvalidCalibration(format!(
                "precision floor must be non-negative, got {}",
                self.precision_floor
            )));
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// ScanConfig / AuditConfig / RegistryConfig
// ---------------------------------------------------------------------------

/// Record-source scanning parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScanConfig {
    /// Lines per parallel partition.
    pub chunk_size: usize,
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self { chunk_size: 8192 }
    }
}

/// Overlap audit parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AuditConfig {
    /// Maximum per-sample diffs kept in a report.
    pub max_diffs: usize,
}

impl Default for AuditConfig {
    fn default() -> Self {
        Self { max_diffs: 200 }
    }
}

/// File registry parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RegistryConfig {
    /// Directory holding one JSON file per pattern.
    pub dir: PathBuf,
    /// Lock files older than this many seconds may be broken by a new writer.
    /// `0` disables breaking stale locks.
    pub stale_lock_secs: u64,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            dir: PathBuf::from("registry"),
            stale_lock_secs: 600,
        }
    }
}

// ---------------------------------------------------------------------------
// PcalConfig
// ---------------------------------------------------------------------------

/// Top-level configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PcalConfig {
    /// Registry location and locking.
    pub registry: RegistryConfig,
    /// Calibration defaults.
    pub calibration: CalibrationConfig,
    /// Scan partitioning.
    pub scan: ScanConfig,
    /// Audit report limits.
    pub audit: AuditConfig,
}

impl PcalConfig {
    /// Load from a YAML file.
    pub fn load(path: &Path) -> Result<Self, PcalError> {
        let text = std::fs::read_to_string(path)?;
        Self::from_yaml(&text)
    }

    /// Parse from YAML text and validate.
    pub fn from_yaml(text: &str) -> Result<Self, PcalError> {
        let config: PcalConfig = serde_yaml::from_str(text)?;
        config.calibration.validate()?;
        Ok(config)
    }
}
