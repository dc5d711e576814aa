#![deny(missing_docs)]

//! # pcal-core: Foundational Types for the Pattern Calibration Engine
//!
//! Every other crate in the workspace depends on this one. It has no internal
//! crate dependencies.
//!
//! ## Design Principles
//!
//! 1. **Single category and axis enums.** [`TenGod`] (10 variants) and
//!    [`Axis`] (5 variants) are defined once; fixed-size arrays are indexed
//!    only through their `index()` methods.
//!
//! 2. **Records are immutable.** A [`Record`] is parsed once per scan and
//!    normalized so rules and the projector read the same counts.
//!
//! 3. **Streaming, not buffering.** [`RecordSource::par_fold`] reads the
//!    population in chunks and folds each chunk in parallel.
//!
//! 4. **[`PcalError`] hierarchy.** Structured errors with `thiserror`; the
//!    taxonomy distinguishes recoverable parse errors, configuration errors,
//!    and data errors.

pub mod category;
pub mod config;
pub mod error;
pub mod path;
pub mod record;
pub mod source;
pub mod tensor;

// Re-export primary types at crate root for ergonomic imports.
pub use category::TenGod;
pub use config::{
    AuditConfig, CalibrationConfig, PcalConfig, RegistryConfig, ScanConfig, SearchRange,
};
pub use error::PcalError;
pub use path::FieldPath;
pub use record::Record;
pub use source::{CancellationToken, RecordSource, ScanStats};
pub use tensor::{Axis, CountVector, Tensor, AXES};
