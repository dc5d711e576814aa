//! # Distance Profile
//!
//! The distance of every well-formed record to a manifold, gathered in one
//! streamed parallel pass, together with the rule's hit count from the same
//! pass.
//!
//! Recognition rates are computed over the **entire** population, not just
//! the rule-matched subset. Skipped (malformed) lines are excluded from the
//! denominator.

use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use pcal_core::{CancellationToken, PcalError, Record, RecordSource, ScanConfig, ScanStats};
use pcal_tensor::{project_record, DistanceMetric};

use crate::subject::Subject;

/// Partial result of one partition.
#[derive(Debug, Default)]
struct Partial {
    distances: Vec<f64>,
    rule_matches: u64,
}

/// Distances of a whole population to one manifold.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DistanceProfile {
    distances: Vec<f64>,
    rule_matches: u64,
    metric: DistanceMetric,
    stats: ScanStats,
}

impl DistanceProfile {
    /// Scan `source` once, measuring every record against `subject`.
    pub fn build(
        source: &RecordSource,
        subject: &Subject<'_>,
        scan: &ScanConfig,
        cancel: &CancellationToken,
    ) -> Result<Self, PcalError> {
        let (partial, stats) = source.par_fold(
            scan,
            cancel,
            Partial::default,
            |mut p: Partial, record: &Record| {
                let x = project_record(record, subject.weights);
                p.distances.push(subject.manifold.distance(&x).value);
                if subject.rule.evaluate(record) {
                    p.rule_matches += 1;
                }
                p
            },
            |mut a: Partial, b: Partial| {
                a.distances.extend(b.distances);
                a.rule_matches += b.rule_matches;
                a
            },
        )?;

        let profile = Self::from_parts(
            partial.distances,
            partial.rule_matches,
            subject.manifold.metric(),
            stats,
        );
        tracing::info!(
            pattern = subject.id,
            total = profile.total(),
            skipped = stats.skipped,
            base_abundance = profile.base_abundance(),
            metric = %profile.metric,
            "distance profile built"
        );
        Ok(profile)
    }

    /// Assemble a profile from precomputed distances.
    pub fn from_parts(
        mut distances: Vec<f64>,
        rule_matches: u64,
        metric: DistanceMetric,
        stats: ScanStats,
    ) -> Self {
        // Order is irrelevant to every rate; sorting makes profiles comparable.
        distances.par_sort_unstable_by(|a, b| a.total_cmp(b));
        Self {
            distances,
            rule_matches,
            metric,
            stats,
        }
    }

    /// Records measured.
    pub fn total(&self) -> u64 {
        self.distances.len() as u64
    }

    /// Records the rule matched.
    pub fn rule_matches(&self) -> u64 {
        self.rule_matches
    }

    /// Metric every distance was measured with.
    pub fn metric(&self) -> DistanceMetric {
        self.metric
    }

    /// Scan counts from the pass that built this profile.
    pub fn stats(&self) -> ScanStats {
        self.stats
    }

    /// Sorted distances.
    pub fn distances(&self) -> &[f64] {
        &self.distances
    }

    /// Percentage of records the rule matched. `0` for an empty population.
    pub fn base_abundance(&self) -> f64 {
        percent(self.rule_matches, self.total())
    }

    /// Records strictly closer than `threshold`.
    pub fn count_within(&self, threshold: f64) -> u64 {
        self.distances.par_iter().filter(|d| **d < threshold).count() as u64
    }

    /// Percentage of records strictly closer than `threshold`.
    pub fn recognition_rate(&self, threshold: f64) -> f64 {
        percent(self.count_within(threshold), self.total())
    }
}

/// `part / whole × 100`, `0` when `whole` is zero.
pub fn percent(part: u64, whole: u64) -> f64 {
    if whole == 0 {
        0.0
    } else {
        part as f64 / whole as f64 * 100.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn profile(distances: &[f64], matches: u64) -> DistanceProfile {
        DistanceProfile::from_parts(
            distances.to_vec(),
            matches,
            DistanceMetric::Euclidean,
            ScanStats::default(),
        )
    }

    #[test]
    fn recognition_is_strictly_less_than() {
        let p = profile(&[1.0, 2.0, 3.0, 4.0], 2);
        assert_eq!(p.recognition_rate(2.0), 25.0);
        assert_eq!(p.recognition_rate(2.0001), 50.0);
        assert_eq!(p.recognition_rate(0.0), 0.0);
        assert_eq!(p.recognition_rate(10.0), 100.0);
        assert_eq!(p.base_abundance(), 50.0);
    }

    #[test]
    fn empty_population_has_zero_rates() {
        let p = profile(&[], 0);
        assert_eq!(p.recognition_rate(5.0), 0.0);
        assert_eq!(p.base_abundance(), 0.0);
    }

    #[test]
    fn distances_are_sorted() {
        let p = profile(&[3.0, 1.0, 2.0], 0);
        assert_eq!(p.distances(), &[1.0, 2.0, 3.0]);
    }
}

#[cfg(test)]
mod proptests {
    use super::*;
    use proptest::prelude::*;

    proptest! {
        /// Raising the threshold never lowers the recognition rate.
        #[test]
        fn recognition_is_monotonic(
            ds in prop::collection::vec(0.0f64..100.0, 0..200),
            a in 0.0f64..120.0,
            b in 0.0f64..120.0,
        ) {
            let p = DistanceProfile::from_parts(ds, 0, DistanceMetric::Euclidean, ScanStats::default());
            let (lo, hi) = if a <= b { (a, b) } else { (b, a) };
            prop_assert!(p.recognition_rate(lo) <= p.recognition_rate(hi));
        }
    }
}
