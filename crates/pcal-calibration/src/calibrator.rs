//! # Threshold Calibrator
//!
//! Finds a distance threshold whose recognition rate over the whole
//! population tracks a target abundance (normally the rule's own hit rate).
//!
//! ## Algorithm
//!
//! Bisection on `[lo, hi]`:
//!
//! ```text
//! mid  = (lo + hi) / 2
//! rate = #(distance < mid) / total × 100
//! |rate − target| ≤ tolerance  → converged, return mid
//! rate < target                → lo = mid
//! otherwise                    → hi = mid
//! ```
//!
//! The search stops after `max_iterations` evaluations or once `hi − lo`
//! drops below `precision_floor`. Without convergence the best `mid` seen
//! (smallest `|rate − target|`, earliest on ties) is returned with
//! `converged = false`. That is a result, not an error.

use serde::{Deserialize, Serialize};

use pcal_core::{CalibrationConfig, PcalError};
use pcal_tensor::DistanceMetric;

use crate::profile::DistanceProfile;

/// One bisection evaluation.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BisectionStep {
    /// 1-based iteration number.
    pub iteration: u32,
    /// Lower bound before this step.
    pub lo: f64,
    /// Upper bound before this step.
    pub hi: f64,
    /// Threshold evaluated.
    pub mid: f64,
    /// Recognition rate at `mid`, in percent.
    pub rate: f64,
}

/// Outcome of a calibration run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Calibration {
    /// Selected distance threshold.
    pub threshold: f64,
    /// Recognition rate at `threshold`, in percent.
    pub achieved_rate: f64,
    /// Target abundance, in percent.
    pub target_rate: f64,
    /// `achieved_rate − target_rate`, in percentage points.
    pub delta: f64,
    /// Whether `|delta|` is within tolerance.
    pub converged: bool,
    /// Bisection evaluations performed.
    pub iterations: u32,
    /// Distance metric of the calibrated manifold.
    pub metric: DistanceMetric,
    /// Every evaluation, in order.
    pub steps: Vec<BisectionStep>,
}

/// Bisection calibrator with validated parameters.
#[derive(Debug, Clone)]
pub struct Calibrator {
    config: CalibrationConfig,
}

impl Calibrator {
    /// Validate `config` and build a calibrator.
    pub fn new(config: CalibrationConfig) -> Result<Self, PcalError> {
        config.validate()?;
        Ok(Self { config })
    }

    /// Parameters in use.
    pub fn config(&self) -> &CalibrationConfig {
        &self.config
    }

    /// Calibrate against the profile's own base abundance.
    pub fn calibrate_to_base(&self, profile: &DistanceProfile) -> Result<Calibration, PcalError> {
        self.calibrate(profile, profile.base_abundance())
    }

    /// Bisect for a threshold whose recognition rate is within tolerance of
    /// `target` percent.
    pub fn calibrate(&self, profile: &DistanceProfile, target: f64) -> Result<Calibration, PcalError> {
        if !target.is_finite() || !(0.0..=100.0).contains(&target) {
            return Err(PcalError::InvalidCalibration(format!(
                "target abundance must be within [0, 100], got {target}"
            )));
        }

        let cfg = &self.config;
        let (mut lo, mut hi) = (cfg.search_range.lo, cfg.search_range.hi);
        let mut steps = Vec::new();
        let mut best: Option<BisectionStep> = None;
        let mut converged = false;

        loop {
            let mid = (lo + hi) / 2.0;
            let rate = profile.recognition_rate(mid);
            let step = BisectionStep {
                iteration: steps.len() as u32 + 1,
                lo,
                hi,
                mid,
                rate,
            };
            tracing::debug!(
                iteration = step.iteration,
                lo,
                hi,
                mid,
                rate,
                target,
                "bisection step"
            );
            steps.push(step);

            let delta = (rate - target).abs();
            if best.map_or(true, |b| delta < (b.rate - target).abs()) {
                best = Some(step);
            }
            if delta <= cfg.tolerance_pct {
                converged = true;
                break;
            }

            if rate < target {
                lo = mid;
            } else {
                hi = mid;
            }
            if steps.len() as u32 >= cfg.max_iterations || hi - lo < cfg.precision_floor {
                break;
            }
        }

        // `steps` is never empty, so `best` is always set here.
        let best = best.ok_or_else(|| {
            PcalError::InvalidCalibration("bisection performed no evaluation".into())
        })?;
        let calibration = Calibration {
            threshold: best.mid,
            achieved_rate: best.rate,
            target_rate: target,
            delta: best.rate - target,
            converged,
            iterations: steps.len() as u32,
            metric: profile.metric(),
            steps,
        };

        if calibration.converged {
            tracing::info!(
                threshold = calibration.threshold,
                achieved = calibration.achieved_rate,
                target,
                iterations = calibration.iterations,
                "calibration converged"
            );
        } else {
            tracing::warn!(
                threshold = calibration.threshold,
                achieved = calibration.achieved_rate,
                target,
                iterations = calibration.iterations,
                "calibration did not converge; returning best threshold seen"
            );
        }
        Ok(calibration)
    }
}


#[cfg(test)]
mod proptests {
    use super::*;
    use pcal_core::{ScanStats, SearchRange};
    use proptest::prelude::*;

    proptest! {
        /// When some threshold in range hits the target exactly, bisection
        /// finds one within the iteration budget.
        #[test]
        fn converges_when_target_is_reachable(
            raw in prop::collection::btree_set(1u32..1000, 1..100),
            k_seed in any::<prop::sample::Index>(),
        ) {
            let distances: Vec<f64> = raw.iter().map(|v| f64::from(*v) * 0.1).collect();
            let n = distances.len();
            let k = k_seed.index(n + 1);
            let target = k as f64 / n as f64 * 100.0;
            let profile = DistanceProfile::from_parts(
                distances,
                0,
                DistanceMetric::Mahalanobis,
                ScanStats::default(),
            );
            let cal = Calibrator::new(CalibrationConfig {
                tolerance_pct: 1e-9,
                search_range: SearchRange { lo: 0.0, hi: 110.0 },
                max_iterations: 60,
                precision_floor: 1e-9,
            })
            .unwrap();
            let c = cal.calibrate(&profile, target).unwrap();
            prop_assert!(c.converged);
            prop_assert!(c.delta.abs() <= 1e-9);
            prop_assert_eq!(profile.recognition_rate(c.threshold), c.achieved_rate);
        }
    }
}
