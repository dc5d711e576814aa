//! # Statistical Manifold
//!
//! The statistical half of a pattern definition: the mean and covariance of
//! the rule-matched population in tensor space.
//!
//! The distance metric and the inverse it needs are decided once, when the
//! manifold is built. On deserialization the selection is re-run from the
//! stored covariance, so a persisted manifold always measures distance the
//! same way it did when it was fitted.

use serde::{Deserialize, Serialize};

use pcal_core::Tensor;

use crate::distance::{self, Distance, DistanceMetric};

/// Dense 5×5 matrix over the tensor axes.
pub type Matrix5 = nalgebra::Matrix5<f64>;

/// Mean vector, covariance and sample count of a fitted population.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(from = "StoredManifold")]
pub struct Manifold {
    mean_vector: Tensor,
    #[serde(serialize_with = "rows::serialize")]
    covariance_matrix: Matrix5,
    sample_count: u64,
    metric: DistanceMetric,
    #[serde(skip)]
    inverse: Option<Matrix5>,
}

/// On-disk shape. `metric` is informational and re-derived on load.
#[derive(Deserialize)]
struct StoredManifold {
    mean_vector: Tensor,
    #[serde(deserialize_with = "rows::deserialize")]
    covariance_matrix: Matrix5,
    sample_count: u64,
    #[serde(default, rename = "metric")]
    _metric: Option<DistanceMetric>,
}

impl From<StoredManifold> for Manifold {
    fn from(s: StoredManifold) -> Self {
        Manifold::from_moments(s.mean_vector, s.covariance_matrix, s.sample_count)
    }
}

impl Manifold {
    /// Build from moments, selecting the distance metric.
    pub fn from_moments(mean_vector: Tensor, covariance_matrix: Matrix5, sample_count: u64) -> Self {
        let (metric, inverse) = distance::select_metric(&covariance_matrix);
        Self {
            mean_vector,
            covariance_matrix,
            sample_count,
            metric,
            inverse,
        }
    }

    /// Center of the population.
    pub fn mean_vector(&self) -> &Tensor {
        &self.mean_vector
    }

    /// Unbiased sample covariance.
    pub fn covariance_matrix(&self) -> &Matrix5 {
        &self.covariance_matrix
    }

    /// Records the manifold was fitted from.
    pub fn sample_count(&self) -> u64 {
        self.sample_count
    }

    /// Metric selected for this manifold.
    pub fn metric(&self) -> DistanceMetric {
        self.metric
    }

    /// Inverse (or pseudo-inverse) used by the Mahalanobis metrics.
    pub fn inverse(&self) -> Option<&Matrix5> {
        self.inverse.as_ref()
    }

    /// Distance from `x` to the mean.
    pub fn distance(&self, x: &Tensor) -> Distance {
        distance::distance(x, self)
    }
}

/// Covariance persisted as nested rows, `[[f64; 5]; 5]`.
mod rows {
    use pcal_core::AXES;
    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    use super::Matrix5;

    pub fn serialize<S: Serializer>(m: &Matrix5, serializer: S) -> Result<S::Ok, S::Error> {
        let rows: [[f64; AXES]; AXES] = std::array::from_fn(|i| std::array::from_fn(|j| m[(i, j)]));
        rows.serialize(serializer)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Matrix5, D::Error> {
        let rows = <[[f64; AXES]; AXES]>::deserialize(deserializer)?;
        Ok(Matrix5::from_fn(|i, j| rows[i][j]))
    }
}
