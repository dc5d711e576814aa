//! # Error Hierarchy
//!
//! Structured error types for the whole calibration engine, built with
//! `thiserror`. No `Box<dyn Error>`, no `.unwrap()` outside tests.
//!
//! The taxonomy separates three families so callers can react differently:
//!
//! - **Recoverable parse errors** ([`PcalError::MalformedRecord`]) are skipped
//!   and counted by the record source; they never abort a scan.
//! - **Configuration errors** (missing manifest, missing pattern, invalid rule,
//!   invalid router) are fatal for the invoking command and name the resource.
//! - **Data errors** ([`PcalError::InsufficientSamples`]) mean the manifest is
//!   fine but the population cannot support a fit.
//!
//! Degraded numeric paths (singular covariance) and calibration
//! non-convergence are *results*, not errors, and do not appear here.

use std::path::PathBuf;

use thiserror::Error;

/// Top-level error type for the calibration engine.
#[derive(Error, Debug)]
pub enum PcalError {
    /// A record line could not be parsed or lacked a usable count mapping.
    #[error("malformed record at line {line}: {reason}")]
    MalformedRecord {
        /// 1-based line number in the record source.
        line: u64,
        /// Why the record was rejected.
        reason: String,
    },

    /// The record source file does not exist.
    #[error("record source not found: {}", path.display())]
    DataNotFound {
        /// The path that was requested.
        path: PathBuf,
    },

    /// The pattern manifest file does not exist.
    #[error("manifest not found: {}", path.display())]
    ManifestNotFound {
        /// The path that was requested.
        path: PathBuf,
    },

    /// The manifest exists but is structurally invalid.
    #[error("invalid manifest: {0}")]
    InvalidManifest(String),

    /// The registry has no entry for the requested pattern.
    #[error("pattern not found in registry: {id}")]
    PatternNotFound {
        /// The pattern identifier that was requested.
        id: String,
    },

    /// The registry entry exists but has not been through the required stage.
    #[error("pattern {id} is not ready: {reason}")]
    PatternNotReady {
        /// The pattern identifier.
        id: String,
        /// What is missing (e.g. "no fitted manifold").
        reason: String,
    },

    /// Another writer holds the registry lock for this pattern.
    #[error("registry entry {id} is locked by another writer ({})", lock_path.display())]
    RegistryLocked {
        /// The pattern identifier.
        id: String,
        /// The lock file that is held.
        lock_path: PathBuf,
    },

    /// The boolean rule matched zero records, so no manifold can be computed.
    #[error("insufficient samples for pattern {pattern_id}: rule matched 0 of {total} records")]
    InsufficientSamples {
        /// The pattern being fitted.
        pattern_id: String,
        /// Number of well-formed records scanned.
        total: u64,
    },

    /// A boolean rule document could not be interpreted.
    #[error("invalid rule: {0}")]
    InvalidRule(String),

    /// Calibration parameters are inconsistent (e.g. `lo > hi`).
    #[error("invalid calibration parameters: {0}")]
    InvalidCalibration(String),

    /// The routing table violates its invariants.
    #[error("invalid router: {0}")]
    InvalidRouter(String),

    /// An unknown ten-god category name was supplied.
    #[error("unknown ten-god category: \"{0}\"")]
    UnknownCategory(String),

    /// An unknown tensor axis name was supplied.
    #[error("unknown tensor axis: \"{0}\" (expected one of E, O, M, S, R)")]
    UnknownAxis(String),

    /// A long-running scan was cancelled cooperatively.
    #[error("scan cancelled")]
    Cancelled,

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// YAML deserialization error.
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),
}
