//! # Overlap Audit
//!
//! Compares the two classifiers of a pattern over a whole population:
//!
//! - **logic**: the boolean rule matches the record;
//! - **physics**: the record's distance to the manifold is below the
//!   threshold.
//!
//! One parallel pass computes both verdicts per record and reports the set
//! sizes, their IoU, the manifold excess factor and a capped, line-ordered
//! list of records on which the classifiers disagree.

use std::fmt;

use serde::{Deserialize, Serialize};

use pcal_core::{AuditConfig, CancellationToken, PcalError, Record, RecordSource, ScanConfig};
use pcal_tensor::{project_record, DistanceMetric};

use crate::profile::percent;
use crate::subject::Subject;

// ---------------------------------------------------------------------------
// Report types
// ---------------------------------------------------------------------------

/// Which classifier alone accepted a record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DiffKind {
    /// The rule matched; the distance check did not.
    LogicOnly,
    /// The distance check matched; the rule did not.
    PhysicsOnly,
}

impl fmt::Display for DiffKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::LogicOnly => "logic_only",
            Self::PhysicsOnly => "physics_only",
        })
    }
}

/// One record on which the classifiers disagree.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SampleDiff {
    /// Record identifier.
    pub id: String,
    /// 1-based line in the source.
    pub line: u64,
    /// Which side accepted it.
    pub kind: DiffKind,
    /// Distance to the manifold.
    pub distance: f64,
}

/// Set-level agreement between rule and manifold membership.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditReport {
    /// Audited pattern.
    pub pattern_id: String,
    /// Distance threshold used for the physics verdict.
    pub threshold: f64,
    /// Distance metric of the manifold.
    pub metric: DistanceMetric,
    /// Well-formed records audited.
    pub total: u64,
    /// Malformed lines skipped.
    pub skipped: u64,
    /// Records the rule matched.
    pub logic_count: u64,
    /// Records within the threshold.
    pub physics_count: u64,
    /// Records matched by both.
    pub intersection_count: u64,
    /// Records matched by either.
    pub union_count: u64,
    /// `intersection / union`; `0` when the union is empty.
    pub iou: f64,
    /// `physics / logic`; absent when the rule matched nothing.
    pub manifold_excess_factor: Option<f64>,
    /// Logic hit rate, in percent.
    pub logic_rate: f64,
    /// Physics hit rate, in percent.
    pub physics_rate: f64,
    /// `physics_rate − logic_rate`, in percentage points.
    pub deviation: f64,
    /// Number of disagreeing records, including those beyond the cap.
    pub diff_count: u64,
    /// Disagreeing records with the lowest line numbers, in line order.
    pub diffs: Vec<SampleDiff>,
}

impl AuditReport {
    /// Whether both classifiers select exactly the same records.
    pub fn is_exact_agreement(&self) -> bool {
        self.diff_count == 0
    }
}

// ---------------------------------------------------------------------------
// Tally
// ---------------------------------------------------------------------------

/// Per-partition counts. Merging is associative; the diff list keeps the
/// `cap` lowest lines, which is the same regardless of partitioning.
#[derive(Debug, Default)]
struct Tally {
    logic: u64,
    physics: u64,
    both: u64,
    diff_count: u64,
    diffs: Vec<SampleDiff>,
}

impl Tally {
    fn merge(mut self, other: Tally, cap: usize) -> Tally {
        self.logic += other.logic;
        self.physics += other.physics;
        self.both += other.both;
        self.diff_count += other.diff_count;
        self.diffs.extend(other.diffs);
        self.diffs.sort_by(|a, b| a.line.cmp(&b.line).then_with(|| a.id.cmp(&b.id)));
        self.diffs.truncate(cap);
        self
    }

    fn push_diff(&mut self, diff: SampleDiff, cap: usize) {
        self.diff_count += 1;
        if cap == 0 {
            return;
        }
        if self.diffs.len() < cap {
            self.diffs.push(diff);
            return;
        }
        // Keep the lowest lines: replace the current maximum if this is lower.
        let max = self
            .diffs
            .iter()
            .enumerate()
            .max_by_key(|(_, d)| d.line)
            .map(|(i, d)| (i, d.line));
        if let Some((idx, line)) = max {
            if diff.line < line {
                self.diffs[idx] = diff;
            }
        }
    }
}

// ---------------------------------------------------------------------------
// OverlapAnalyzer
// ---------------------------------------------------------------------------

/// Runs overlap audits.
#[derive(Debug, Clone, Default)]
pub struct OverlapAnalyzer {
    scan: ScanConfig,
    audit: AuditConfig,
    cancel: CancellationToken,
}

impl OverlapAnalyzer {
    /// Create an analyzer with explicit settings.
    pub fn new(scan: ScanConfig, audit: AuditConfig, cancel: CancellationToken) -> Self {
        Self {
            scan,
            audit,
            cancel,
        }
    }

    /// Audit `subject` over `source` at `threshold`.
    pub fn audit(
        &self,
        source: &RecordSource,
        subject: &Subject<'_>,
        threshold: f64,
    ) -> Result<AuditReport, PcalError> {
        if !threshold.is_finite() || threshold < 0.0 {
            return Err(PcalError::InvalidCalibration(format!(
                "audit threshold must be a non-negative number, got {threshold}"
            )));
        }
        let cap = self.audit.max_diffs;

        let (tally, stats) = source.par_fold(
            &self.scan,
            &self.cancel,
            Tally::default,
            |mut t: Tally, record: &Record| {
                let logic = subject.rule.evaluate(record);
                let distance = subject
                    .manifold
                    .distance(&project_record(record, subject.weights))
                    .value;
                let physics = distance < threshold;

                match (logic, physics) {
                    (true, true) => {
                        t.logic += 1;
                        t.physics += 1;
                        t.both += 1;
                    }
                    (true, false) => {
                        t.logic += 1;
                        t.push_diff(diff(record, DiffKind::LogicOnly, distance), cap);
                    }
                    (false, true) => {
                        t.physics += 1;
                        t.push_diff(diff(record, DiffKind::PhysicsOnly, distance), cap);
                    }
                    (false, false) => {}
                }
                t
            },
            |a: Tally, b: Tally| a.merge(b, cap),
        )?;

        // A final merge with the identity sorts and caps the diff list.
        let tally = tally.merge(Tally::default(), cap);
        let total = stats.processed;
        let union = tally.logic + tally.physics - tally.both;
        let logic_rate = percent(tally.logic, total);
        let physics_rate = percent(tally.physics, total);

        let report = AuditReport {
            pattern_id: subject.id.to_string(),
            threshold,
            metric: subject.manifold.metric(),
            total,
            skipped: stats.skipped,
            logic_count: tally.logic,
            physics_count: tally.physics,
            intersection_count: tally.both,
            union_count: union,
            iou: if union == 0 {
                0.0
            } else {
                tally.both as f64 / union as f64
            },
            manifold_excess_factor: (tally.logic > 0)
                .then(|| tally.physics as f64 / tally.logic as f64),
            logic_rate,
            physics_rate,
            deviation: physics_rate - logic_rate,
            diff_count: tally.diff_count,
            diffs: tally.diffs,
        };

        tracing::info!(
            pattern = subject.id,
            total = report.total,
            logic = report.logic_count,
            physics = report.physics_count,
            iou = report.iou,
            "audit complete"
        );
        Ok(report)
    }
}

fn diff(record: &Record, kind: DiffKind, distance: f64) -> SampleDiff {
    SampleDiff {
        id: record.id().to_string(),
        line: record.line(),
        kind,
        distance,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pcal_core::TenGod;
    use pcal_rules::{parse_rule, Rule};
    use pcal_tensor::{FitTarget, Manifold, ManifoldFitter, WeightMatrix};
    use serde_json::json;

    struct Fixture {
        rule: Rule,
        weights: WeightMatrix,
        manifold: Manifold,
        source: RecordSource,
    }

    impl Fixture {
        fn scenario() -> Self {
            let source = RecordSource::from_lines([
                r#"{"id":"r1","ten_gods":{"zheng_guan":2}}"#,
                r#"{"id":"r2","ten_gods":{"zheng_guan":0}}"#,
                r#"{"id":"r3","ten_gods":{"zheng_guan":1}}"#,
                r#"{"id":"r4","ten_gods":{"zheng_guan":5}}"#,
                "not json",
            ]);
            let rule = parse_rule(&json!({">": [{"var": "ten_gods.zheng_guan"}, 1]})).unwrap();
            let weights =
                WeightMatrix::zeros().with_row(TenGod::ZhengGuan, [1.0, 0.0, 0.0, 0.0, 0.0]);
            let target = FitTarget {
                id: "p".into(),
                rule: rule.clone(),
                weights,
            };
            let manifold = ManifoldFitter::default().fit(&source, &target).unwrap().manifold;
            Self {
                rule,
                weights,
                manifold,
                source,
            }
        }

        fn subject(&self) -> Subject<'_> {
            Subject {
                id: "p",
                rule: &self.rule,
                weights: &self.weights,
                manifold: &self.manifold,
            }
        }
    }

    #[test]
    fn calibrated_threshold_agrees_exactly() {
        let f = Fixture::scenario();
        let r = OverlapAnalyzer::default()
            .audit(&f.source, &f.subject(), 0.9375)
            .unwrap();
        assert_eq!(r.total, 4);
        assert_eq!(r.skipped, 1);
        assert_eq!((r.logic_count, r.physics_count), (2, 2));
        assert_eq!(r.intersection_count, 2);
        assert_eq!(r.union_count, 2);
        assert_eq!(r.iou, 1.0);
        assert_eq!(r.manifold_excess_factor, Some(1.0));
        assert_eq!(r.deviation, 0.0);
        assert!(r.is_exact_agreement());
    }

    #[test]
    fn loose_threshold_over_generalizes() {
        let f = Fixture::scenario();
        let r = OverlapAnalyzer::default()
            .audit(&f.source, &f.subject(), 1.25)
            .unwrap();
        assert_eq!(r.physics_count, 3);
        assert_eq!(r.union_count, 3);
        assert!((r.iou - 2.0 / 3.0).abs() < 1e-12);
        assert_eq!(r.manifold_excess_factor, Some(1.5));
        assert_eq!(r.deviation, 25.0);
        assert_eq!(r.diffs.len(), 1);
        assert_eq!(r.diffs[0].id, "r3");
        assert_eq!(r.diffs[0].kind, DiffKind::PhysicsOnly);
    }

    #[test]
    fn zero_threshold_is_disjoint() {
        let f = Fixture::scenario();
        let r = OverlapAnalyzer::default()
            .audit(&f.source, &f.subject(), 0.0)
            .unwrap();
        assert_eq!(r.physics_count, 0);
        assert_eq!(r.iou, 0.0);
        assert_eq!(r.manifold_excess_factor, Some(0.0));
        let lines: Vec<u64> = r.diffs.iter().map(|d| d.line).collect();
        assert_eq!(lines, vec![1, 4]);
        assert!(r.diffs.iter().all(|d| d.kind == DiffKind::LogicOnly));
    }

    #[test]
    fn diffs_are_capped_but_counted() {
        let f = Fixture::scenario();
        let analyzer = OverlapAnalyzer::new(
            ScanConfig { chunk_size: 1 },
            AuditConfig { max_diffs: 1 },
            CancellationToken::new(),
        );
        let r = analyzer.audit(&f.source, &f.subject(), 0.0).unwrap();
        assert_eq!(r.diff_count, 2);
        assert_eq!(r.diffs.len(), 1);
        assert_eq!(r.diffs[0].line, 1);
    }

    #[test]
    fn rule_matching_nothing_has_no_excess_factor() {
        let f = Fixture::scenario();
        let never = Rule::Const(false);
        let subject = Subject {
            rule: &never,
            ..f.subject()
        };
        let r = OverlapAnalyzer::default()
            .audit(&f.source, &subject, 10.0)
            .unwrap();
        assert_eq!(r.logic_count, 0);
        assert_eq!(r.manifold_excess_factor, None);
        assert_eq!(r.iou, 0.0);
    }

    #[test]
    fn rejects_negative_threshold() {
        let f = Fixture::scenario();
        assert!(OverlapAnalyzer::default()
            .audit(&f.source, &f.subject(), -1.0)
            .is_err());
    }
}
