//! # Patterns
//!
//! A [`Pattern`] joins the authored definition (weights, rule, sub-patterns,
//! routing table) with the state the pipeline produces for it (manifolds,
//! fit counts, calibrated threshold). Re-running the pipeline replaces the
//! produced state; the identity never changes.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use pcal_calibration::{Calibration, Subject};
use pcal_core::{PcalError, SearchRange};
use pcal_rules::Rule;
use pcal_tensor::{DistanceMetric, FitOutcome, FitStats, FitTarget, Manifold, WeightMatrix};

use crate::router::RoutingStrategy;

/// Calibration method tag stored with every threshold.
pub const METHOD_BISECTION: &str = "bisection";

// ---------------------------------------------------------------------------
// CalibratedThreshold
// ---------------------------------------------------------------------------

/// A distance cutoff produced by the calibrator, with its provenance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CalibratedThreshold {
    /// Selected distance threshold.
    pub optimal_threshold: f64,
    /// Recognition rate at the threshold, in percent.
    pub achieved_rate: f64,
    /// Target abundance, in percent.
    pub target_rate: f64,
    /// `achieved_rate − target_rate`, in percentage points.
    pub delta: f64,
    /// Whether the tolerance was met.
    pub converged: bool,
    /// Bisection evaluations performed.
    pub iterations: u32,
    /// Search method.
    pub method: String,
    /// Metric the distances were measured with.
    pub metric: DistanceMetric,
    /// Tolerance used, in percentage points.
    pub tolerance_pct: f64,
    /// Range searched.
    pub search_range: SearchRange,
    /// When calibration ran.
    pub calibrated_at: DateTime<Utc>,
}

impl CalibratedThreshold {
    /// Wrap a calibrator result.
    pub fn from_calibration(c: &Calibration, tolerance_pct: f64, search_range: SearchRange) -> Self {
        Self {
            optimal_threshold: c.threshold,
            achieved_rate: c.achieved_rate,
            target_rate: c.target_rate,
            delta: c.delta,
            converged: c.converged,
            iterations: c.iterations,
            method: METHOD_BISECTION.to_string(),
            metric: c.metric,
            tolerance_pct,
            search_range,
            calibrated_at: Utc::now(),
        }
    }
}

// ---------------------------------------------------------------------------
// SubPattern
// ---------------------------------------------------------------------------

/// A refinement of a pattern, reached through the router.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubPattern {
    /// Identifier, unique within the parent.
    pub id: String,
    /// Display name.
    pub name: String,
    /// Extra selection rule, conjoined with the parent's when fitting.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rule: Option<Rule>,
    /// Projection override; the parent's weights apply when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub weight_override: Option<WeightMatrix>,
    /// Own manifold; the parent's applies when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub manifold: Option<Manifold>,
    /// Counts from the last fit of this sub-pattern.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fit_stats: Option<FitStats>,
    /// Free-form risk label.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub risk: Option<String>,
    /// Free-form priority metadata (routing order lives in the router).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub priority: Option<i64>,
}

// ---------------------------------------------------------------------------
// Pattern
// ---------------------------------------------------------------------------

/// A named pattern and everything the pipeline has learned about it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Pattern {
    /// Unique identifier; also the registry file stem.
    pub id: String,
    /// Display name.
    pub name: String,
    /// Authored version string.
    pub version: String,
    /// Projection weights.
    pub weight_matrix: WeightMatrix,
    /// Boolean definition.
    pub rule: Rule,
    /// Fitted manifold.
    #[serde(default)]
    pub manifold: Option<Manifold>,
    /// Counts from the last fit.
    #[serde(default)]
    pub fit_stats: Option<FitStats>,
    /// Rule hit rate over the last calibration population, in percent.
    #[serde(default)]
    pub base_abundance: Option<f64>,
    /// Calibrated distance threshold.
    #[serde(default)]
    pub threshold: Option<CalibratedThreshold>,
    /// Refinements.
    #[serde(default)]
    pub sub_patterns: Vec<SubPattern>,
    /// Routing table, in authored order.
    #[serde(default)]
    pub router: Vec<RoutingStrategy>,
    /// Incremented by every registry save.
    #[serde(default)]
    pub revision: u64,
    /// SHA-256 (hex) of the manifest the definition came from.
    #[serde(default)]
    pub manifest_digest: Option<String>,
}

impl Pattern {
    /// Look up a sub-pattern.
    pub fn sub_pattern(&self, id: &str) -> Option<&SubPattern> {
        self.sub_patterns.iter().find(|s| s.id == id)
    }

    /// The fitted manifold, or [`PcalError::PatternNotReady`].
    pub fn require_manifold(&self) -> Result<&Manifold, PcalError> {
        self.manifold.as_ref().ok_or_else(|| PcalError::PatternNotReady {
            id: self.id.clone(),
            reason: "no fitted manifold; run `pcal fit` first".into(),
        })
    }

    /// The calibrated threshold, or [`PcalError::PatternNotReady`].
    pub fn require_threshold(&self) -> Result<&CalibratedThreshold, PcalError> {
        self.threshold.as_ref().ok_or_else(|| PcalError::PatternNotReady {
            id: self.id.clone(),
            reason: "no calibrated threshold; run `pcal calibrate` or pass --threshold".into(),
        })
    }

    /// Borrowed view for calibration and auditing.
    pub fn subject(&self) -> Result<Subject<'_>, PcalError> {
        Ok(Subject {
            id: &self.id,
            rule: &self.rule,
            weights: &self.weight_matrix,
            manifold: self.require_manifold()?,
        })
    }

    /// Fit targets: the pattern itself first, then every sub-pattern, each
    /// selecting `parent_rule AND sub_rule` with its effective weights.
    pub fn fit_targets(&self) -> Vec<FitTarget> {
        let mut targets = vec![FitTarget {
            id: self.id.clone(),
            rule: self.rule.clone(),
            weights: self.weight_matrix,
        }];
        targets.extend(self.sub_patterns.iter().map(|s| FitTarget {
            id: format!("{}/{}", self.id, s.id),
            rule: match &s.rule {
                Some(r) => self.rule.clone().and(r.clone()),
                None => self.rule.clone(),
            },
            weights: s.weight_override.unwrap_or(self.weight_matrix),
        }));
        targets
    }

    /// Store fit results in the order produced by [`Pattern::fit_targets`].
    ///
    /// The parent's outcome must be `Ok`; a sub-pattern that failed keeps no
    /// manifold of its own and falls back to the parent's. Any previous
    /// calibration is discarded since it no longer matches the manifold.
    pub fn apply_fit(
        &mut self,
        mut outcomes: impl Iterator<Item = Result<FitOutcome, PcalError>>,
    ) -> Result<(), PcalError> {
        let parent = outcomes.next().ok_or_else(|| PcalError::InsufficientSamples {
            pattern_id: self.id.clone(),
            total: 0,
        })??;
        self.manifold = Some(parent.manifold);
        self.fit_stats = Some(parent.stats);
        self.threshold = None;
        self.base_abundance = None;

        for (sub, outcome) in self.sub_patterns.iter_mut().zip(outcomes) {
            match outcome {
                Ok(fit) => {
                    sub.manifold = Some(fit.manifold);
                    sub.fit_stats = Some(fit.stats);
                }
                Err(e) => {
                    tracing::warn!(
                        pattern = %self.id,
                        sub_pattern = %sub.id,
                        error = %e,
                        "sub-pattern not fitted; it will use the parent manifold"
                    );
                    sub.manifold = None;
                    sub.fit_stats = None;
                }
            }
        }
        Ok(())
    }

    /// Store a calibration result.
    pub fn apply_calibration(
        &mut self,
        calibration: &Calibration,
        base_abundance: f64,
        tolerance_pct: f64,
        search_range: SearchRange,
    ) {
        self.base_abundance = Some(base_abundance);
        self.threshold = Some(CalibratedThreshold::from_calibration(
            calibration,
            tolerance_pct,
            search_range,
        ));
    }
}

/// Whether `id` is usable as a registry file stem: ASCII letters, digits,
/// `_`, `-` and `.`, not starting with `.`.
pub fn is_valid_id(id: &str) -> bool {
    !id.is_empty()
        && !id.starts_with('.')
        && id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.'))
}
