//! # Matching Router
//!
//! Dispatches a record to the first sub-pattern whose routing strategy it
//! fully passes.
//!
//! ## Evaluation
//!
//! Strategies are tried in ascending `priority`. For each one:
//!
//! 1. Every gate `tensor[axis] cmp value` must hold (tensor projected with
//!    the parent's weights). A failing gate moves on to the next strategy.
//! 2. If the strategy has a distance check, the record's distance to the
//!    referenced manifold must be strictly below the check's threshold. A
//!    failing check also moves on; there is no laxer fallback within the
//!    same strategy.
//! 3. Otherwise the gates alone are sufficient.
//!
//! The first strategy that passes wins. If none does, the record is
//! unmatched, which is an outcome and not an error.
//!
//! ## State machine
//!
//! ```text
//! Pending ──▶ Evaluating(0) ──▶ Evaluating(1) ──▶ … ──▶ Unmatched
//!                  │                  │
//!                  └────────┬─────────┘
//!                           ▼
//!                     Matched(id)
//! ```

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use serde::{Deserialize, Serialize};

use pcal_core::{
    Axis, CancellationToken, PcalError, Record, RecordSource, ScanConfig, ScanStats, Tensor,
};
use pcal_tensor::{project_record, Manifold, WeightMatrix};

use crate::pattern::Pattern;

// ---------------------------------------------------------------------------
// Authored types
// ---------------------------------------------------------------------------

/// Gate comparison.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum GateComparator {
    /// `>`
    #[serde(rename = ">")]
    Gt,
    /// `<`
    #[serde(rename = "<")]
    Lt,
    /// `>=`
    #[serde(rename = ">=", alias = "≥")]
    Ge,
    /// `<=`
    #[serde(rename = "<=", alias = "≤")]
    Le,
}

impl GateComparator {
    /// Apply to `lhs cmp rhs`.
    pub fn holds(self, lhs: f64, rhs: f64) -> bool {
        match self {
            Self::Gt => lhs > rhs,
            Self::Lt => lhs < rhs,
            Self::Ge => lhs >= rhs,
            Self::Le => lhs <= rhs,
        }
    }

    /// Symbol.
    pub fn symbol(self) -> &'static str {
        match self {
            Self::Gt => ">",
            Self::Lt => "<",
            Self::Ge => ">=",
            Self::Le => "<=",
        }
    }
}

impl fmt::Display for GateComparator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.symbol())
    }
}

/// `tensor[axis] comparator value`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GateRule {
    /// Axis read from the record's tensor.
    pub axis: Axis,
    /// Comparison.
    #[serde(alias = "op")]
    pub comparator: GateComparator,
    /// Right-hand side.
    pub value: f64,
}

impl GateRule {
    /// Whether `tensor` passes this gate.
    pub fn passes(&self, tensor: &Tensor) -> bool {
        self.comparator.holds(tensor.get(self.axis), self.value)
    }
}

impl fmt::Display for GateRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {} {}", self.axis, self.comparator, self.value)
    }
}

/// Which manifold a distance check measures against.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum ManifoldRef {
    /// The pattern's own manifold.
    #[default]
    Parent,
    /// A sub-pattern's manifold (the parent's if it has none).
    SubPattern(String),
}

impl From<String> for ManifoldRef {
    fn from(s: String) -> Self {
        if s == "parent" {
            Self::Parent
        } else {
            Self::SubPattern(s)
        }
    }
}

impl From<ManifoldRef> for String {
    fn from(r: ManifoldRef) -> Self {
        match r {
            ManifoldRef::Parent => "parent".to_string(),
            ManifoldRef::SubPattern(s) => s,
        }
    }
}

/// Distance requirement of a strategy.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DistanceCheck {
    /// Manifold to measure against.
    #[serde(default)]
    pub manifold: ManifoldRef,
    /// Exclusive upper bound on the distance. When absent, the pattern's
    /// calibrated threshold is used; only allowed for the parent manifold.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub threshold: Option<f64>,
}

/// One row of the routing table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoutingStrategy {
    /// Evaluation order, lower first. Unique within a pattern.
    pub priority: i64,
    /// Sub-pattern selected when this strategy passes.
    pub target: String,
    /// Conjunctive gates on the parent tensor.
    #[serde(default)]
    pub gate_rules: Vec<GateRule>,
    /// Optional distance requirement.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub distance_check: Option<DistanceCheck>,
}

// ---------------------------------------------------------------------------
// Outcomes
// ---------------------------------------------------------------------------

/// Router state for one record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", content = "value", rename_all = "snake_case")]
pub enum RouteState {
    /// Not yet evaluated.
    Pending,
    /// Evaluating the strategy at this position in priority order.
    Evaluating(usize),
    /// A strategy passed; the sub-pattern it targets.
    Matched(String),
    /// No strategy passed.
    Unmatched,
}

impl RouteState {
    /// Whether this is `Matched` or `Unmatched`.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Matched(_) | Self::Unmatched)
    }

    /// The matched sub-pattern, if any.
    pub fn matched(&self) -> Option<&str> {
        match self {
            Self::Matched(id) => Some(id),
            _ => None,
        }
    }
}

/// Why a strategy did or did not pass.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum StrategyOutcome {
    /// The first failing gate.
    GateFailed {
        /// Gate position within the strategy.
        gate: usize,
        /// Axis of the failing gate.
        axis: Axis,
        /// Tensor component that failed.
        observed: f64,
    },
    /// All gates passed but the distance was not below the threshold.
    DistanceFailed {
        /// Distance measured.
        distance: f64,
        /// Threshold required.
        threshold: f64,
    },
    /// The strategy passed.
    Passed,
}

/// One evaluated strategy.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TraceStep {
    /// Strategy priority.
    pub priority: i64,
    /// Strategy target.
    pub target: String,
    /// Result.
    #[serde(flatten)]
    pub outcome: StrategyOutcome,
}

/// Terminal state plus every strategy evaluated to reach it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RouteTrace {
    /// `Matched` or `Unmatched`.
    pub state: RouteState,
    /// Strategies in evaluation order; stops at the winner.
    pub steps: Vec<TraceStep>,
}

/// Classification counts for a whole record source.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RouteSummary {
    /// Well-formed records routed.
    pub total: u64,
    /// Malformed lines skipped.
    pub skipped: u64,
    /// Records no strategy accepted.
    pub unmatched: u64,
    /// Records per matched sub-pattern.
    pub matched: BTreeMap<String, u64>,
}

// ---------------------------------------------------------------------------
// Router
// ---------------------------------------------------------------------------

/// A strategy with its distance check resolved against the pattern.
#[derive(Debug)]
struct Compiled<'a> {
    strategy: &'a RoutingStrategy,
    check: Option<ResolvedCheck<'a>>,
}

#[derive(Debug)]
struct ResolvedCheck<'a> {
    manifold: &'a Manifold,
    weights: &'a WeightMatrix,
    threshold: f64,
}

/// Validated, priority-ordered routing table borrowed from a [`Pattern`].
#[derive(Debug)]
pub struct Router<'a> {
    weights: &'a WeightMatrix,
    strategies: Vec<Compiled<'a>>,
}

impl<'a> Router<'a> {
    /// Validate and compile a pattern's routing table.
    ///
    /// Fails with [`PcalError::InvalidRouter`] on duplicate priorities,
    /// unknown targets, unknown manifold references or invalid thresholds,
    /// and with [`PcalError::PatternNotReady`] when a distance check needs a
    /// manifold or calibrated threshold the pattern does not have yet.
    pub fn new(pattern: &'a Pattern) -> Result<Self, PcalError> {
        validate_table(pattern)?;

        let mut strategies = Vec::with_capacity(pattern.router.len());
        for strategy in &pattern.router {
            let check = match &strategy.distance_check {
                None => None,
                Some(dc) => Some(resolve_check(pattern, strategy, dc)?),
            };
            strategies.push(Compiled { strategy, check });
        }
        strategies.sort_by_key(|c| c.strategy.priority);

        Ok(Self {
            weights: &pattern.weight_matrix,
            strategies,
        })
    }

    /// Number of strategies.
    pub fn len(&self) -> usize {
        self.strategies.len()
    }

    /// Whether the table is empty.
    pub fn is_empty(&self) -> bool {
        self.strategies.is_empty()
    }

    /// Sub-pattern the record is routed to, if any.
    pub fn route(&self, record: &Record) -> Option<&'a str> {
        let tensor = project_record(record, self.weights);
        self.strategies
            .iter()
            .find(|c| matches!(self.evaluate(c, record, &tensor), StrategyOutcome::Passed))
            .map(|c| c.strategy.target.as_str())
    }

    /// Route and report every strategy evaluated.
    pub fn route_traced(&self, record: &Record) -> RouteTrace {
        let tensor = project_record(record, self.weights);
        let mut state = RouteState::Pending;
        let mut steps = Vec::new();

        for (k, compiled) in self.strategies.iter().enumerate() {
            state = RouteState::Evaluating(k);
            tracing::trace!(record = record.id(), ?state, priority = compiled.strategy.priority);

            let outcome = self.evaluate(compiled, record, &tensor);
            let passed = matches!(outcome, StrategyOutcome::Passed);
            steps.push(TraceStep {
                priority: compiled.strategy.priority,
                target: compiled.strategy.target.clone(),
                outcome,
            });
            if passed {
                state = RouteState::Matched(compiled.strategy.target.clone());
                break;
            }
        }
        if !state.is_terminal() {
            state = RouteState::Unmatched;
        }

        RouteTrace { state, steps }
    }

    /// Route every record of `source` and count the results.
    pub fn route_batch(
        &self,
        source: &RecordSource,
        scan: &ScanConfig,
        cancel: &CancellationToken,
    ) -> Result<RouteSummary, PcalError> {
        let (summary, stats): (RouteSummary, ScanStats) = source.par_fold(
            scan,
            cancel,
            RouteSummary::default,
            |mut s: RouteSummary, record: &Record| {
                match self.route(record) {
                    Some(id) => *s.matched.entry(id.to_string()).or_insert(0) += 1,
                    None => s.unmatched += 1,
                }
                s
            },
            |mut a: RouteSummary, b: RouteSummary| {
                a.unmatched += b.unmatched;
                for (id, n) in b.matched {
                    *a.matched.entry(id).or_insert(0) += n;
                }
                a
            },
        )?;

        Ok(RouteSummary {
            total: stats.processed,
            skipped: stats.skipped,
            ..summary
        })
    }

    fn evaluate(&self, compiled: &Compiled<'_>, record: &Record, tensor: &Tensor) -> StrategyOutcome {
        for (gate, rule) in compiled.strategy.gate_rules.iter().enumerate() {
            if !rule.passes(tensor) {
                return StrategyOutcome::GateFailed {
                    gate,
                    axis: rule.axis,
                    observed: tensor.get(rule.axis),
                };
            }
        }

        if let Some(check) = &compiled.check {
            let x = if std::ptr::eq(check.weights, self.weights) {
                *tensor
            } else {
                project_record(record, check.weights)
            };
            let distance = check.manifold.distance(&x).value;
            if !(distance < check.threshold) {
                return StrategyOutcome::DistanceFailed {
                    distance,
                    threshold: check.threshold,
                };
            }
        }
        StrategyOutcome::Passed
    }
}

/// Structural checks that need no fitted state.
pub fn validate_table(pattern: &Pattern) -> Result<(), PcalError> {
    let sub_ids: BTreeSet<&str> = pattern.sub_patterns.iter().map(|s| s.id.as_str()).collect();
    let mut priorities = BTreeSet::new();

    for s in &pattern.router {
        if !priorities.insert(s.priority) {
            return Err(PcalError::InvalidRouter(format!(
                "pattern {}: duplicate strategy priority {}",
                pattern.id, s.priority
            )));
        }
        if !sub_ids.contains(s.target.as_str()) {
            return Err(PcalError::InvalidRouter(format!(
                "pattern {}: strategy {} targets unknown sub-pattern \"{}\"",
                pattern.id, s.priority, s.target
            )));
        }
        if let Some(gate) = s.gate_rules.iter().find(|g| !g.value.is_finite()) {
            return Err(PcalError::InvalidRouter(format!(
                "pattern {}: strategy {} gate \"{gate}\" has a non-finite value",
                pattern.id, s.priority
            )));
        }
        if let Some(dc) = &s.distance_check {
            if let ManifoldRef::SubPattern(id) = &dc.manifold {
                if !sub_ids.contains(id.as_str()) {
                    return Err(PcalError::InvalidRouter(format!(
                        "pattern {}: strategy {} distance check references unknown sub-pattern \"{id}\"",
                        pattern.id, s.priority
                    )));
                }
                // The calibrated threshold is in the parent manifold's units.
                if dc.threshold.is_none() {
                    return Err(PcalError::InvalidRouter(format!(
                        "pattern {}: strategy {} sub-pattern distance check requires an explicit threshold",
                        pattern.id, s.priority
                    )));
                }
            }
            if let Some(t) = dc.threshold {
                if !t.is_finite() || t < 0.0 {
                    return Err(PcalError::InvalidRouter(format!(
                        "pattern {}: strategy {} distance threshold must be non-negative, got {t}",
                        pattern.id, s.priority
                    )));
                }
            }
        }
    }
    Ok(())
}

fn resolve_check<'a>(
    pattern: &'a Pattern,
    strategy: &RoutingStrategy,
    dc: &DistanceCheck,
) -> Result<ResolvedCheck<'a>, PcalError> {
    let parent = pattern.require_manifold()?;
    let (manifold, weights) = match &dc.manifold {
        ManifoldRef::Parent => (parent, &pattern.weight_matrix),
        ManifoldRef::SubPattern(id) => {
            let sub = pattern.sub_pattern(id).ok_or_else(|| {
                PcalError::InvalidRouter(format!("unknown sub-pattern \"{id}\""))
            })?;
            (
                sub.manifold.as_ref().unwrap_or(parent),
                sub.weight_override.as_ref().unwrap_or(&pattern.weight_matrix),
            )
        }
    };
    let threshold = match (dc.threshold, &dc.manifold) {
        (Some(t), _) => t,
        (None, ManifoldRef::SubPattern(id)) => {
            return Err(PcalError::InvalidRouter(format!(
                "sub-pattern \"{id}\" distance check requires an explicit threshold"
            )));
        }
        (None, ManifoldRef::Parent) => {
            tracing::debug!(
                pattern = %pattern.id,
                priority = strategy.priority,
                "distance check uses the calibrated threshold"
            );
            pattern.require_threshold()?.optimal_threshold
        }
    };
    Ok(ResolvedCheck {
        manifold,
        weights,
        threshold,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pattern::{CalibratedThreshold, SubPattern};
    use pcal_core::{CountVector, SearchRange, TenGod};
    use pcal_rules::Rule;
    use pcal_tensor::{DistanceMetric, Matrix5};

    fn sub(id: &str) -> SubPattern {
        SubPattern {
            id: id.into(),
            name: id.to_uppercase(),
            rule: None,
            weight_override: None,
            manifold: None,
            fit_stats: None,
            risk: None,
            priority: None,
        }
    }

    fn strategy(priority: i64, target: &str, gates: Vec<GateRule>, check: Option<f64>) -> RoutingStrategy {
        RoutingStrategy {
            priority,
            target: target.into(),
            gate_rules: gates,
            distance_check: check.map(|t| DistanceCheck {
                manifold: ManifoldRef::Parent,
                threshold: Some(t),
            }),
        }
    }

    fn gate(axis: Axis, comparator: GateComparator, value: f64) -> GateRule {
        GateRule {
            axis,
            comparator,
            value,
        }
    }

    /// E = zheng_guan count, S = qi_sha count; manifold centered at E=3 with
    /// identity covariance.
    fn pattern(router: Vec<RoutingStrategy>) -> Pattern {
        let weights = WeightMatrix::zeros()
            .with_row(TenGod::ZhengGuan, [1.0, 0.0, 0.0, 0.0, 0.0])
            .with_row(TenGod::QiSha, [0.0, 0.0, 0.0, 1.0, 0.0]);
        Pattern {
            id: "p".into(),
            name: "P".into(),
            version: "1".into(),
            weight_matrix: weights,
            rule: Rule::Const(true),
            manifold: Some(Manifold::from_moments(
                Tensor([3.0, 0.0, 0.0, 0.0, 0.0]),
                Matrix5::identity(),
                10,
            )),
            fit_stats: None,
            base_abundance: None,
            threshold: None,
            sub_patterns: vec![sub("strong"), sub("stressed"), sub("fallback")],
            router,
            revision: 0,
            manifest_digest: None,
        }
    }

    fn record(zheng_guan: u32, qi_sha: u32) -> Record {
        Record::from_counts(
            "r",
            CountVector::from_pairs([(TenGod::ZhengGuan, zheng_guan), (TenGod::QiSha, qi_sha)]),
            serde_json::Map::new(),
        )
    }

    fn table() -> Vec<RoutingStrategy> {
        vec![
            strategy(30, "fallback", vec![], None),
            strategy(10, "strong", vec![gate(Axis::E, GateComparator::Ge, 2.0)], Some(1.5)),
            strategy(20, "stressed", vec![gate(Axis::S, GateComparator::Gt, 1.0)], None),
        ]
    }

    #[test]
    fn first_passing_strategy_in_priority_order_wins() {
        let p = pattern(table());
        let router = Router::new(&p).unwrap();
        assert_eq!(router.route(&record(3, 0)), Some("strong"));
        assert_eq!(router.route(&record(3, 1)), Some("strong"));
        assert_eq!(router.route(&record(0, 2)), Some("stressed"));
        assert_eq!(router.route(&record(0, 0)), Some("fallback"));
    }

    #[test]
    fn distance_failure_moves_to_next_strategy() {
        let p = pattern(table());
        let router = Router::new(&p).unwrap();
        // Gates pass (E = 3 >= 2) but the distance 2 is not below 1.5.
        let trace = router.route_traced(&record(3, 2));
        assert_eq!(trace.state, RouteState::Matched("stressed".into()));
        assert_eq!(
            trace.steps[0].outcome,
            StrategyOutcome::DistanceFailed {
                distance: 2.0,
                threshold: 1.5
            }
        );
        assert_eq!(trace.steps[1].outcome, StrategyOutcome::Passed);
        assert_eq!(trace.steps.len(), 2);
    }

    #[test]
    fn unmatched_is_an_outcome() {
        let p = pattern(vec![strategy(1, "strong", vec![gate(Axis::E, GateComparator::Gt, 5.0)], None)]);
        let router = Router::new(&p).unwrap();
        assert_eq!(router.route(&record(1, 0)), None);
        let trace = router.route_traced(&record(1, 0));
        assert_eq!(trace.state, RouteState::Unmatched);
        assert!(matches!(
            trace.steps[0].outcome,
            StrategyOutcome::GateFailed { gate: 0, axis: Axis::E, .. }
        ));
    }

    #[test]
    fn empty_table_never_matches() {
        let p = pattern(vec![]);
        let router = Router::new(&p).unwrap();
        assert!(router.is_empty());
        assert_eq!(router.route_traced(&record(3, 3)).state, RouteState::Unmatched);
    }

    #[test]
    fn rejects_invalid_tables() {
        let dup = pattern(vec![
            strategy(1, "strong", vec![], None),
            strategy(1, "stressed", vec![], None),
        ]);
        assert!(matches!(Router::new(&dup), Err(PcalError::InvalidRouter(_))));

        let unknown = pattern(vec![strategy(1, "ghost", vec![], None)]);
        assert!(matches!(Router::new(&unknown), Err(PcalError::InvalidRouter(_))));

        let mut bad_ref = pattern(vec![strategy(1, "strong", vec![], Some(1.0))]);
        bad_ref.router[0].distance_check = Some(DistanceCheck {
            manifold: ManifoldRef::SubPattern("ghost".into()),
            threshold: Some(1.0),
        });
        assert!(matches!(Router::new(&bad_ref), Err(PcalError::InvalidRouter(_))));
    }

    #[test]
    fn calibrated_threshold_required_when_check_has_none() {
        let mut p = pattern(vec![strategy(1, "strong", vec![], Some(1.0))]);
        p.router[0].distance_check = Some(DistanceCheck {
            manifold: ManifoldRef::Parent,
            threshold: None,
        });
        assert!(matches!(Router::new(&p), Err(PcalError::PatternNotReady { .. })));
    }

    #[test]
    fn sub_pattern_check_needs_its_own_threshold() {
        // Tight sub-manifold: distances are in units the parent cutoff knows nothing about.
        let mut p = pattern(vec![]);
        p.sub_patterns[0].manifold = Some(Manifold::from_moments(
            Tensor([4.0, 0.0, 0.0, 0.0, 0.0]),
            Matrix5::identity() * 1e-4,
            4,
        ));
        p.threshold = Some(CalibratedThreshold {
            optimal_threshold: 1.5,
            achieved_rate: 50.0,
            target_rate: 50.0,
            delta: 0.0,
            converged: true,
            iterations: 3,
            method: crate::pattern::METHOD_BISECTION.into(),
            metric: DistanceMetric::Mahalanobis,
            tolerance_pct: 0.5,
            search_range: SearchRange { lo: 0.0, hi: 5.0 },
            calibrated_at: chrono::Utc::now(),
        });
        p.router = vec![RoutingStrategy {
            priority: 1,
            target: "strong".into(),
            gate_rules: vec![],
            distance_check: Some(DistanceCheck {
                manifold: ManifoldRef::SubPattern("strong".into()),
                threshold: None,
            }),
        }];
        let err = Router::new(&p).unwrap_err();
        assert!(matches!(&err, PcalError::InvalidRouter(m) if m.contains("explicit threshold")));
        assert!(validate_table(&p).is_err());

        // Parent-referencing checks may still defer to the calibrated threshold.
        p.router[0].distance_check = Some(DistanceCheck {
            manifold: ManifoldRef::Parent,
            threshold: None,
        });
        let router = Router::new(&p).unwrap();
        assert_eq!(router.route(&record(4, 0)), Some("strong"));
    }

    #[test]
    fn sub_pattern_check_uses_override_weights_and_manifold() {
        let mut p = pattern(vec![]);
        // Sub-pattern measures along O, counting zheng_guan there.
        let override_w = WeightMatrix::zeros().with_row(TenGod::ZhengGuan, [0.0, 1.0, 0.0, 0.0, 0.0]);
        p.sub_patterns[0].weight_override = Some(override_w);
        p.sub_patterns[0].manifold = Some(Manifold::from_moments(
            Tensor([0.0, 5.0, 0.0, 0.0, 0.0]),
            Matrix5::identity(),
            4,
        ));
        p.router = vec![RoutingStrategy {
            priority: 1,
            target: "strong".into(),
            gate_rules: vec![],
            distance_check: Some(DistanceCheck {
                manifold: ManifoldRef::SubPattern("strong".into()),
                threshold: Some(0.5),
            }),
        }];
        let router = Router::new(&p).unwrap();
        assert_eq!(router.route(&record(5, 0)), Some("strong"));
        assert_eq!(router.route(&record(3, 0)), None);
    }

    #[test]
    fn route_batch_counts_per_target() {
        let p = pattern(table());
        let router = Router::new(&p).unwrap();
        let source = RecordSource::from_lines([
            r#"{"ten_gods":{"zheng_guan":3}}"#,
            r#"{"ten_gods":{"qi_sha":2}}"#,
            r#"{"ten_gods":{"qi_sha":3}}"#,
            r#"{"ten_gods":{}}"#,
            "{",
        ]);
        let s = router
            .route_batch(&source, &ScanConfig { chunk_size: 2 }, &CancellationToken::new())
            .unwrap();
        assert_eq!(s.total, 4);
        assert_eq!(s.skipped, 1);
        assert_eq!(s.unmatched, 0);
        assert_eq!(s.matched.get("strong"), Some(&1));
        assert_eq!(s.matched.get("stressed"), Some(&2));
        assert_eq!(s.matched.get("fallback"), Some(&1));
    }

    #[test]
    fn manifold_ref_serde() {
        let dc: DistanceCheck = serde_json::from_str(r#"{"manifold":"parent","threshold":2}"#).unwrap();
        assert_eq!(dc.manifold, ManifoldRef::Parent);
        let dc: DistanceCheck = serde_json::from_str(r#"{"manifold":"strong"}"#).unwrap();
        assert_eq!(dc.manifold, ManifoldRef::SubPattern("strong".into()));
        assert_eq!(serde_json::to_value(&dc).unwrap()["manifold"], "strong");
    }

    #[test]
    fn gate_comparator_symbols() {
        let g: GateRule = serde_json::from_str(r#"{"axis":"S","op":">=","value":1}"#).unwrap();
        assert_eq!(g.comparator, GateComparator::Ge);
        assert_eq!(g.to_string(), "S >= 1");
    }
}
