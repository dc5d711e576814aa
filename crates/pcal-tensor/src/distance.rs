//! # Distance Evaluator
//!
//! Distance from a tensor to a manifold's center, measured with the metric
//! the manifold selected when it was built:
//!
//! | Metric | When | Formula |
//! |---|---|---|
//! | `mahalanobis` | Σ positive-definite and well conditioned | `sqrt((x−μ)ᵀ Σ⁻¹ (x−μ))` |
//! | `mahalanobis_pseudoinverse` | Σ singular or ill conditioned | same, with Σ⁺ |
//! | `euclidean` | no usable eigenvalue, or non-finite Σ | `‖x−μ‖` |

use std::fmt;

use nalgebra::{SymmetricEigen, Vector5};
use serde::{Deserialize, Serialize};

use pcal_core::Tensor;

use crate::manifold::{Manifold, Matrix5};

/// Relative eigenvalue floor: eigenvalues below `EIGEN_CUTOFF × λ_max`
/// count as zero.
pub const EIGEN_CUTOFF: f64 = 1e-10;

/// Which formula a distance was computed with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DistanceMetric {
    /// Full-rank Mahalanobis distance.
    Mahalanobis,
    /// Mahalanobis distance through the Moore–Penrose pseudo-inverse.
    MahalanobisPseudoinverse,
    /// Plain Euclidean distance to the mean.
    Euclidean,
}

impl DistanceMetric {
    /// Snake-case name.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Mahalanobis => "mahalanobis",
            Self::MahalanobisPseudoinverse => "mahalanobis_pseudoinverse",
            Self::Euclidean => "euclidean",
        }
    }
}

impl fmt::Display for DistanceMetric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A distance value tagged with the metric that produced it.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Distance {
    /// Non-negative distance.
    pub value: f64,
    /// Formula used.
    pub metric: DistanceMetric,
}

/// Choose the metric for a covariance matrix and the inverse it needs.
///
/// Mahalanobis requires a successful Cholesky factorization *and* a smallest
/// eigenvalue of at least `EIGEN_CUTOFF × λ_max`. Below that the
/// pseudo-inverse drops every eigen-direction under the cutoff.
pub fn select_metric(covariance: &Matrix5) -> (DistanceMetric, Option<Matrix5>) {
    if !is_finite(covariance) {
        return (DistanceMetric::Euclidean, None);
    }

    let eigen = SymmetricEigen::new(*covariance);
    let max = eigen.eigenvalues.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    let min = eigen.eigenvalues.iter().copied().fold(f64::INFINITY, f64::min);
    if !max.is_finite() || max <= 0.0 {
        tracing::debug!("covariance has no usable eigenvalue, using euclidean distance");
        return (DistanceMetric::Euclidean, None);
    }
    let cutoff = EIGEN_CUTOFF * max;

    if min >= cutoff {
        if let Some(inverse) = covariance.cholesky().map(|c| c.inverse()) {
            if is_finite(&inverse) {
                return (DistanceMetric::Mahalanobis, Some(inverse));
            }
        }
    }

    let rank = eigen.eigenvalues.iter().filter(|&&l| l > cutoff).count();
    match covariance.pseudo_inverse(cutoff) {
        Ok(pinv) if is_finite(&pinv) => {
            tracing::debug!(rank, "covariance is singular, using pseudo-inverse");
            (DistanceMetric::MahalanobisPseudoinverse, Some(pinv))
        }
        _ => {
            tracing::debug!("pseudo-inverse failed, using euclidean distance");
            (DistanceMetric::Euclidean, None)
        }
    }
}

/// Distance from `x` to the center of `manifold`.
pub fn distance(x: &Tensor, manifold: &Manifold) -> Distance {
    let diff = Vector5::from((*x - *manifold.mean_vector()).0);
    let euclid = || Distance {
        value: diff.norm(),
        metric: DistanceMetric::Euclidean,
    };

    match (manifold.metric(), manifold.inverse()) {
        (DistanceMetric::Euclidean, _) | (_, None) => euclid(),
        (metric, Some(inverse)) => {
            // Rounding can push a PSD form slightly below zero.
            let d2 = diff.dot(&(inverse * diff)).max(0.0);
            let value = d2.sqrt();
            if value.is_finite() {
                Distance { value, metric }
            } else {
                euclid()
            }
        }
    }
}

fn is_finite(m: &Matrix5) -> bool {
    m.iter().all(|v| v.is_finite())
}


#[cfg(test)]
mod proptests {
    use super::*;
    use proptest::prelude::*;

    fn spd() -> impl Strategy<Value = Matrix5> {
        prop::array::uniform25(-3.0f64..3.0).prop_map(|a| {
            // AᵀA + I is symmetric positive-definite.
            let a = Matrix5::from_row_slice(&a);
            a.transpose() * a + Matrix5::identity()
        })
    }

    proptest! {
        /// The mean is at distance zero under every metric.
        #[test]
        fn center_is_at_distance_zero(
            mean in prop::array::uniform5(-10.0f64..10.0),
            cov in spd(),
        ) {
            let m = Manifold::from_moments(Tensor(mean), cov, 5);
            prop_assert_eq!(distance(&Tensor(mean), &m).value, 0.0);
        }

        /// Distances are non-negative and finite.
        #[test]
        fn distance_is_non_negative(
            mean in prop::array::uniform5(-10.0f64..10.0),
            x in prop::array::uniform5(-10.0f64..10.0),
            cov in spd(),
        ) {
            let m = Manifold::from_moments(Tensor(mean), cov, 5);
            let d = distance(&Tensor(x), &m);
            prop_assert!(d.value >= 0.0 && d.value.is_finite());
        }
    }
}
