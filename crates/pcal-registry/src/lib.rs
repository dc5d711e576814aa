//! # pcal-registry: Patterns, Manifests, Storage and Routing
//!
//! - [`manifest`]: authored pattern definitions (YAML/JSON) and validation.
//! - [`pattern`]: the [`Pattern`] aggregate joining definition and fitted
//!   state.
//! - [`store`]: the [`PatternStore`] repository trait with the file-backed
//!   and in-memory implementations.
//! - [`router`]: the priority-ordered [`Router`] dispatching records to
//!   sub-patterns.

pub mod manifest;
pub mod pattern;
pub mod router;
pub mod store;

pub use manifest::{hex_digest, LoadedManifest, Manifest, SubPatternManifest};
pub use pattern::{is_valid_id, CalibratedThreshold, Pattern, SubPattern, METHOD_BISECTION};
pub use router::{
    DistanceCheck, GateComparator, GateRule, ManifoldRef, RouteState, RouteSummary, RouteTrace,
    Router, RoutingStrategy, StrategyOutcome, TraceStep,
};
pub use store::{
    FileRegistry, MemoryRegistry, PatternStore, RegistryEntry, RegistryMeta, REGISTRY_FORMAT,
};
