//! # pcal-tensor: Tensor Space, Manifolds and Distance
//!
//! The statistical half of a pattern definition.
//!
//! ## Mathematical Model
//!
//! A record's ten-god counts `c ∈ ℕ¹⁰` are projected through a 10×5 weight
//! matrix `W`:
//!
//! ```text
//! T = Wᵀ · c        T = (E, O, M, S, R)
//! ```
//!
//! A manifold summarizes the tensors of a rule-matched population as a mean
//! `μ` and an unbiased covariance `Σ`. Membership is judged by distance to
//! `μ`: Mahalanobis when `Σ` is usable, otherwise one of the fallbacks in
//! [`DistanceMetric`], chosen once per manifold.

pub mod distance;
pub mod fitting;
pub mod manifold;
pub mod projection;
pub mod weights;

// Re-export primary types.
pub use distance::{distance, Distance, DistanceMetric, EIGEN_CUTOFF};
pub use fitting::{FitOutcome, FitStats, FitTarget, ManifoldFitter, MomentAccumulator};
pub use manifold::{Manifold, Matrix5};
pub use projection::{project, project_record};
pub use weights::{WeightMatrix, WeightRow};
