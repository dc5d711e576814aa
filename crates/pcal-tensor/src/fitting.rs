//! # Manifold Fitter
//!
//! Fits a [`Manifold`] from the records a rule selects, in one streamed
//! parallel pass over the record source.
//!
//! Each partition keeps `(count, Σx, Σxxᵀ)` in a [`MomentAccumulator`];
//! partitions merge by plain addition, which is associative and commutative,
//! so the result does not depend on chunking or thread scheduling.
//!
//! Several targets (a pattern and its sub-patterns) can be fitted in the same
//! pass with [`ManifoldFitter::fit_targets`].

use pcal_core::{CancellationToken, PcalError, Record, RecordSource, ScanConfig, Tensor, AXES};
use pcal_rules::Rule;
use nalgebra::Vector5;
use serde::{Deserialize, Serialize};

use crate::manifold::{Manifold, Matrix5};
use crate::projection::project_record;
use crate::weights::WeightMatrix;

// ---------------------------------------------------------------------------
// MomentAccumulator
// ---------------------------------------------------------------------------

/// First and second raw moments of a set of tensors.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MomentAccumulator {
    count: u64,
    sum: Vector5<f64>,
    outer: Matrix5,
}

impl Default for MomentAccumulator {
    fn default() -> Self {
        Self {
            count: 0,
            sum: Vector5::zeros(),
            outer: Matrix5::zeros(),
        }
    }
}

impl MomentAccumulator {
    /// Add one observation.
    pub fn push(&mut self, x: &Tensor) {
        let v = Vector5::from(x.0);
        self.count += 1;
        self.sum += v;
        self.outer += v * v.transpose();
    }

    /// Combine two partial accumulators.
    pub fn merge(mut self, other: &MomentAccumulator) -> Self {
        self.count += other.count;
        self.sum += other.sum;
        self.outer += other.outer;
        self
    }

    /// Observations seen.
    pub fn count(&self) -> u64 {
        self.count
    }

    /// Arithmetic mean; `None` when empty.
    pub fn mean(&self) -> Option<Tensor> {
        if self.count == 0 {
            return None;
        }
        let n = self.count as f64;
        Some(Tensor((self.sum / n).into()))
    }

    /// Unbiased (n−1) sample covariance. Zero matrix for fewer than two
    /// observations.
    pub fn covariance(&self) -> Matrix5 {
        if self.count < 2 {
            return Matrix5::zeros();
        }
        let n = self.count as f64;
        let mut cov = (self.outer - self.sum * self.sum.transpose() / n) / (n - 1.0);
        // Cancellation can leave a tiny negative variance.
        for i in 0..AXES {
            if cov[(i, i)] < 0.0 {
                cov[(i, i)] = 0.0;
            }
        }
        cov
    }

    /// Build the manifold; `None` when empty.
    pub fn to_manifold(&self) -> Option<Manifold> {
        let mean = self.mean()?;
        Some(Manifold::from_moments(mean, self.covariance(), self.count))
    }
}

// ---------------------------------------------------------------------------
// FitOutcome / FitTarget
// ---------------------------------------------------------------------------

/// Counts reported by a fit, persisted alongside the pattern.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct FitStats {
    /// Records the rule matched.
    pub matched: u64,
    /// Well-formed records scanned.
    pub total: u64,
    /// Malformed lines skipped.
    pub skipped: u64,
}

/// Result of fitting one target.
#[derive(Debug, Clone, PartialEq)]
pub struct FitOutcome {
    /// The fitted manifold.
    pub manifold: Manifold,
    /// Scan counts.
    pub stats: FitStats,
}

/// One thing to fit: the records `rule` selects, projected with `weights`.
#[derive(Debug, Clone)]
pub struct FitTarget {
    /// Pattern or sub-pattern identifier, used in errors and logs.
    pub id: String,
    /// Selection rule.
    pub rule: Rule,
    /// Projection weights.
    pub weights: WeightMatrix,
}

// ---------------------------------------------------------------------------
// ManifoldFitter
// ---------------------------------------------------------------------------

/// Streams a record source and fits manifolds for one or more targets.
#[derive(Debug, Clone, Default)]
pub struct ManifoldFitter {
    scan: ScanConfig,
    cancel: CancellationToken,
}

impl ManifoldFitter {
    /// Create a fitter with explicit scan settings and cancellation token.
    pub fn new(scan: ScanConfig, cancel: CancellationToken) -> Self {
        Self { scan, cancel }
    }

    /// Fit a single target.
    ///
    /// Fails with [`PcalError::InsufficientSamples`] if the rule matches no
    /// record.
    pub fn fit(&self, source: &RecordSource, target: &FitTarget) -> Result<FitOutcome, PcalError> {
        let mut results = self.fit_targets(source, std::slice::from_ref(target))?;
        results.pop().unwrap_or_else(|| {
            Err(PcalError::InsufficientSamples {
                pattern_id: target.id.clone(),
                total: 0,
            })
        })
    }

    /// Fit every target in one pass.
    ///
    /// The outer `Result` carries scan failures (I/O, cancellation); each
    /// inner one is that target's own outcome, so a sub-pattern with no
    /// samples does not abort its siblings.
    pub fn fit_targets(
        &self,
        source: &RecordSource,
        targets: &[FitTarget],
    ) -> Result<Vec<Result<FitOutcome, PcalError>>, PcalError> {
        let empty = || vec![MomentAccumulator::default(); targets.len()];

        let (accs, stats) = source.par_fold(
            &self.scan,
            &self.cancel,
            empty,
            |mut accs: Vec<MomentAccumulator>, record: &Record| {
                for (acc, target) in accs.iter_mut().zip(targets) {
                    if target.rule.evaluate(record) {
                        acc.push(&project_record(record, &target.weights));
                    }
                }
                accs
            },
            |a: Vec<MomentAccumulator>, b: Vec<MomentAccumulator>| {
                a.iter().zip(&b).map(|(x, y)| x.merge(y)).collect()
            },
        )?;

        Ok(targets
            .iter()
            .zip(accs)
            .map(|(target, acc)| {
                let fit_stats = FitStats {
                    matched: acc.count(),
                    total: stats.processed,
                    skipped: stats.skipped,
                };
                let manifold = acc.to_manifold().ok_or_else(|| PcalError::InsufficientSamples {
                    pattern_id: target.id.clone(),
                    total: stats.processed,
                })?;
                tracing::info!(
                    id = %target.id,
                    matched = fit_stats.matched,
                    total = fit_stats.total,
                    skipped = fit_stats.skipped,
                    metric = %manifold.metric(),
                    "manifold fitted"
                );
                Ok(FitOutcome {
                    manifold,
                    stats: fit_stats,
                })
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::distance::DistanceMetric;
    use pcal_core::{Axis, TenGod};
    use pcal_rules::parse_rule;
    use serde_json::json;

    fn scenario() -> RecordSource {
        RecordSource::from_lines([
            r#"{"id":"r1","ten_gods":{"zheng_guan":2}}"#,
            r#"{"id":"r2","ten_gods":{"zheng_guan":0}}"#,
            r#"{"id":"r3","ten_gods":{"zheng_guan":1}}"#,
            r#"{"id":"r4","ten_gods":{"zheng_guan":5}}"#,
        ])
    }

    fn target(rule: serde_json::Value) -> FitTarget {
        FitTarget {
            id: "p".into(),
            rule: parse_rule(&rule).unwrap(),
            weights: WeightMatrix::zeros().with_row(TenGod::ZhengGuan, [1.0, 0.0, 0.0, 0.0, 0.0]),
        }
    }

    #[test]
    fn fits_rule_matched_population() {
        let out = ManifoldFitter::default()
            .fit(&scenario(), &target(json!({">": [{"var": "ten_gods.zheng_guan"}, 1]})))
            .unwrap();
        assert_eq!(out.stats, FitStats { matched: 2, total: 4, skipped: 0 });
        assert_eq!(out.manifold.mean_vector().get(Axis::E), 3.5);
        assert!((out.manifold.covariance_matrix()[(0, 0)] - 4.5).abs() < 1e-12);
        assert_eq!(out.manifold.metric(), DistanceMetric::MahalanobisPseudoinverse);
    }

    #[test]
    fn single_sample_has_zero_covariance() {
        let out = ManifoldFitter::default()
            .fit(&scenario(), &target(json!({"==": [{"var": "id"}, "r4"]})))
            .unwrap();
        assert_eq!(out.manifold.sample_count(), 1);
        assert_eq!(out.manifold.covariance_matrix(), &Matrix5::zeros());
        assert_eq!(out.manifold.metric(), DistanceMetric::Euclidean);
    }

    #[test]
    fn no_match_is_insufficient_samples() {
        let err = ManifoldFitter::default()
            .fit(&scenario(), &target(json!({">": [{"var": "ten_gods.zheng_guan"}, 99]})))
            .unwrap_err();
        assert!(matches!(err, PcalError::InsufficientSamples { total: 4, .. }));
    }

    #[test]
    fn fit_targets_isolates_failures() {
        let ok = target(json!(true));
        let none = target(json!(false));
        let results = ManifoldFitter::default()
            .fit_targets(&scenario(), &[ok, none])
            .unwrap();
        assert_eq!(results[0].as_ref().unwrap().stats.matched, 4);
        assert!(results[1].is_err());
    }

    #[test]
    fn chunking_does_not_change_the_fit() {
        let t = target(json!(true));
        let a = ManifoldFitter::new(ScanConfig { chunk_size: 1 }, CancellationToken::new())
            .fit(&scenario(), &t)
            .unwrap();
        let b = ManifoldFitter::default().fit(&scenario(), &t).unwrap();
        assert_eq!(a.manifold.mean_vector(), b.manifold.mean_vector());
        assert_eq!(a.manifold.sample_count(), b.manifold.sample_count());
    }
}
