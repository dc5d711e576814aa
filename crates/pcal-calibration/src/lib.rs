//! # pcal-calibration: Threshold Calibration and Overlap Audit
//!
//! Reconciles the two definitions of a pattern. The boolean rule fixes a
//! *base abundance* (its hit rate over the population); the calibrator
//! picks the manifold distance threshold whose hit rate matches it, and the
//! audit measures how far the two classifiers still disagree record by
//! record.
//!
//! Both stages read a pattern through a borrowed [`Subject`], so this crate
//! does not depend on how patterns are stored.

pub mod audit;
pub mod calibrator;
pub mod profile;
pub mod subject;

pub use audit::{AuditReport, DiffKind, OverlapAnalyzer, SampleDiff};
pub use calibrator::{BisectionStep, Calibration, Calibrator};
pub use profile::{percent, DistanceProfile};
pub use subject::Subject;
