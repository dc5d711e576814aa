//! The pieces of a pattern that calibration and auditing read.

use pcal_rules::Rule;
use pcal_tensor::{Manifold, WeightMatrix};

/// Borrowed view of a fitted pattern: its rule, projection and manifold.
#[derive(Debug, Clone, Copy)]
pub struct Subject<'a> {
    /// Pattern identifier.
    pub id: &'a str,
    /// Boolean rule (the "logic" classifier).
    pub rule: &'a Rule,
    /// Projection weights.
    pub weights: &'a WeightMatrix,
    /// Fitted manifold (the "physics" classifier).
    pub manifold: &'a Manifold,
}
