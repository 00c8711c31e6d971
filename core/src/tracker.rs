//! Tracking loop: RSSI readings to a filtered position.
//!
//! Each cycle the [Tracker] predicts the filter forward, turns the fresh readings
//! into a multilateration fix and, when the fix is usable, feeds it to the filter
//! as a planar position measurement. The filter is created lazily from the first
//! accepted fix unless one is supplied up front.

use std::fmt::{self, Display};

use chrono::{DateTime, Utc};
use log::{debug, info, warn};
use nalgebra::{DMatrix, DVector};

use crate::anchors::AnchorRegistry;
use crate::config::{InitialCovariance, TrackerConfig};
use crate::error::{Result, TrackingError};
use crate::kalman::{KalmanFilter, KalmanFilter2D};
use crate::kinematics::{ConstantVelocity2D, KinematicModel};
use crate::linalg::symmetrize;
use crate::measurements::PositionMeasurement;
use crate::multilateration::{MultilaterationSolver, PositionFix, RangeObservation};
use crate::range::RangeModel;

/// What a single [Tracker::step] did.
#[derive(Clone, Debug, PartialEq)]
pub enum StepOutcome {
    /// Not enough fresh anchors; the filter only predicted
    Predicted { fresh_anchors: usize },
    /// Not enough fresh anchors and no filter yet
    Waiting { fresh_anchors: usize },
    /// First accepted fix created the filter
    Initialized(PositionFix),
    /// Fix was applied as a measurement
    Corrected(PositionFix),
    /// Fix was computed but discarded
    RejectedFix(PositionFix),
}

impl Display for StepOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StepOutcome::Predicted { fresh_anchors } => {
                write!(f, "predicted ({} fresh anchors)", fresh_anchors)
            }
            StepOutcome::Waiting { fresh_anchors } => {
                write!(f, "waiting ({} fresh anchors)", fresh_anchors)
            }
            StepOutcome::Initialized(fix) => write!(f, "initialized from {}", fix),
            StepOutcome::Corrected(fix) => write!(f, "corrected with {}", fix),
            StepOutcome::RejectedFix(fix) => write!(f, "rejected {}", fix),
        }
    }
}

#[derive(Clone, Debug)]
pub struct Tracker {
    config: TrackerConfig,
    range_model: RangeModel,
    solver: MultilaterationSolver,
    filter: Option<KalmanFilter2D>,
}

impl Tracker {
    /// Tracker that starts its filter from the first accepted fix.
    ///
    /// # Errors
    /// `InvalidArgument` when the configuration does not validate.
    pub fn new(config: TrackerConfig) -> Result<Self> {
        config.validate()?;
        Ok(Tracker {
            range_model: config.range_model()?,
            solver: MultilaterationSolver::new(config.min_anchors)?,
            config,
            filter: None,
        })
    }

    /// Tracker with an already initialized filter.
    pub fn with_filter(config: TrackerConfig, filter: KalmanFilter2D) -> Result<Self> {
        let mut tracker = Tracker::new(config)?;
        tracker.filter = Some(filter);
        Ok(tracker)
    }

    pub fn config(&self) -> &TrackerConfig {
        &self.config
    }
    pub fn range_model(&self) -> &RangeModel {
        &self.range_model
    }
    /// Current filter, `None` until the first accepted fix.
    pub fn filter(&self) -> Option<&KalmanFilter2D> {
        self.filter.as_ref()
    }

    /// Run one cycle with `observations` after `dt` seconds.
    ///
    /// Fixes from rank-deficient geometry are discarded: the unresolved direction
    /// would otherwise enter the filter as an exact measurement.
    ///
    /// # Errors
    /// Non-positive or non-finite `dt` is an [TrackingError::InvalidArgument] whether or
    /// not a filter exists yet. Solver errors other than a shortage of anchors are
    /// propagated; the shortage is reported as an outcome instead.
    pub fn step(&mut self, dt: f64, observations: &[RangeObservation]) -> Result<StepOutcome> {
        if !dt.is_finite() || dt <= 0.0 {
            return Err(TrackingError::invalid(format!(
                "dt must be finite and strictly positive, got {}",
                dt
            )));
        }
        if let Some(filter) = self.filter.as_mut() {
            filter.predict(dt)?;
        }
        let fresh_anchors = observations.len();
        if fresh_anchors < self.solver.min_anchors() {
            debug!(
                "{} fresh anchors, {} required for a fix",
                fresh_anchors,
                self.solver.min_anchors()
            );
            return Ok(match self.filter {
                Some(_) => StepOutcome::Predicted { fresh_anchors },
                None => StepOutcome::Waiting { fresh_anchors },
            });
        }

        let fix = self.solver.solve(observations)?;
        if !fix.is_finite() {
            warn!("discarding non-finite fix: {}", fix);
            return Ok(StepOutcome::RejectedFix(fix));
        }
        if fix.is_degenerate() {
            warn!(
                "discarding fix from degenerate anchor geometry (rank {}): {}",
                fix.geometry_rank, fix
            );
            return Ok(StepOutcome::RejectedFix(fix));
        }
        if let Some(limit) = self.config.max_fix_uncertainty {
            if fix.uncertainty() > limit {
                warn!(
                    "discarding fix with uncertainty {:.3} above limit {:.3}",
                    fix.uncertainty(),
                    limit
                );
                return Ok(StepOutcome::RejectedFix(fix));
            }
        }

        match self.filter.as_mut() {
            Some(filter) => {
                let measurement =
                    PositionMeasurement::from_fix(&fix, self.config.fix_covariance_scale);
                filter.update_with(&measurement)?;
                Ok(StepOutcome::Corrected(fix))
            }
            None => {
                let filter = self.initial_filter(&fix)?;
                info!(
                    "tracker initialized at ({:.3}, {:.3}) from {} anchors",
                    fix.position[0], fix.position[1], fix.anchors_used
                );
                self.filter = Some(filter);
                Ok(StepOutcome::Initialized(fix))
            }
        }
    }

    /// Run one cycle using the fresh readings held by `registry` at `now`.
    pub fn step_with_registry(
        &mut self,
        dt: f64,
        registry: &AnchorRegistry,
        now: DateTime<Utc>,
    ) -> Result<StepOutcome> {
        let observations = registry.observation_set(
            now,
            self.config.freshness_window(),
            &self.range_model,
            self.config.sigma_rssi,
        );
        self.step(dt, &observations)
    }

    fn initial_filter(&self, fix: &PositionFix) -> Result<KalmanFilter2D> {
        let n = ConstantVelocity2D::STATE_DIM;
        let mut mean = DVector::zeros(n);
        mean[ConstantVelocity2D::POS_X] = fix.position[0];
        mean[ConstantVelocity2D::POS_Y] = fix.position[1];
        let filter =
            KalmanFilter::from_parts(ConstantVelocity2D, mean, self.config.acceleration_variance)?;
        match self.config.initial_covariance {
            InitialCovariance::Identity => Ok(filter),
            InitialCovariance::FromFix => {
                let mut covariance = DMatrix::<f64>::identity(n, n);
                let block = fix.covariance * self.config.fix_covariance_scale;
                let idx = [ConstantVelocity2D::POS_X, ConstantVelocity2D::POS_Y];
                for (i, &row) in idx.iter().enumerate() {
                    for (j, &col) in idx.iter().enumerate() {
                        covariance[(row, col)] = block[(i, j)];
                    }
                }
                filter.with_covariance(symmetrize(&covariance))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_approx_eq::assert_approx_eq;
    use chrono::TimeDelta;
    use nalgebra::Vector2;

    fn routers() -> [(&'static str, Vector2<f64>); 3] {
        [
            ("r1", Vector2::new(5.0, 5.0)),
            ("r2", Vector2::new(10.0, 35.0)),
            ("r3", Vector2::new(45.0, 10.0)),
        ]
    }

    fn observations(truth: Vector2<f64>, variance: f64) -> Vec<RangeObservation> {
        routers()
            .iter()
            .map(|(id, p)| RangeObservation::new(*id, *p, (truth - p).norm(), variance))
            .collect()
    }

    #[test]
    fn waits_then_initializes() {
        let mut tracker = Tracker::new(TrackerConfig::default()).unwrap();
        let outcome = tracker
            .step(0.1, &observations(Vector2::new(20.0, 15.0), 1.0)[..2])
            .unwrap();
        assert_eq!(outcome, StepOutcome::Waiting { fresh_anchors: 2 });
        assert!(tracker.filter().is_none());

        let outcome = tracker
            .step(0.1, &observations(Vector2::new(20.0, 15.0), 1.0))
            .unwrap();
        assert!(matches!(outcome, StepOutcome::Initialized(_)));
        let filter = tracker.filter().unwrap();
        assert_approx_eq!(filter.pos_x(), 20.0, 1e-6);
        assert_approx_eq!(filter.pos_y(), 15.0, 1e-6);
        assert_eq!(filter.vel_x(), 0.0);
        assert_eq!(filter.vel_y(), 0.0);
    }

    #[test]
    fn from_fix_covariance_seeds_position_block() {
        let mut tracker = Tracker::new(TrackerConfig::default()).unwrap();
        let outcome = tracker
            .step(0.1, &observations(Vector2::new(20.0, 15.0), 1.0))
            .unwrap();
        let fix = match outcome {
            StepOutcome::Initialized(fix) => fix,
            other => panic!("unexpected outcome {:?}", other),
        };
        let p = tracker.filter().unwrap().covariance();
        assert_approx_eq!(p[(0, 0)], fix.covariance[(0, 0)], 1e-12);
        assert_approx_eq!(p[(0, 1)], fix.covariance[(0, 1)], 1e-12);
        assert_approx_eq!(p[(1, 1)], fix.covariance[(1, 1)], 1e-12);
        assert_eq!(p[(2, 2)], 1.0);
        assert_eq!(p[(3, 3)], 1.0);
        assert_eq!(p[(0, 2)], 0.0);
    }

    #[test]
    fn identity_policy() {
        let config = TrackerConfig {
            initial_covariance: InitialCovariance::Identity,
            ..TrackerConfig::default()
        };
        let mut tracker = Tracker::new(config).unwrap();
        tracker
            .step(0.1, &observations(Vector2::new(20.0, 15.0), 1.0))
            .unwrap();
        let p = tracker.filter().unwrap().covariance();
        assert_eq!(*p, DMatrix::<f64>::identity(4, 4));
    }

    #[test]
    fn predicts_when_anchors_missing() {
        let filter = KalmanFilter2D::new(1.0, 2.0, 1.0, 0.0, 1.2).unwrap();
        let mut tracker = Tracker::with_filter(TrackerConfig::default(), filter).unwrap();
        let outcome = tracker.step(0.5, &[]).unwrap();
        assert_eq!(outcome, StepOutcome::Predicted { fresh_anchors: 0 });
        assert_approx_eq!(tracker.filter().unwrap().pos_x(), 1.5, 1e-12);
    }

    #[test]
    fn corrects_toward_fix() {
        let filter = KalmanFilter2D::new(18.0, 13.0, 0.0, 0.0, 1.2).unwrap();
        let mut tracker = Tracker::with_filter(TrackerConfig::default(), filter).unwrap();
        let outcome = tracker
            .step(0.1, &observations(Vector2::new(20.0, 15.0), 0.5))
            .unwrap();
        assert!(matches!(outcome, StepOutcome::Corrected(_)));
        let filter = tracker.filter().unwrap();
        assert!((filter.position() - Vector2::new(20.0, 15.0)).norm() < 0.01);
        assert!(filter.vel_x() > 0.0);
    }

    #[test]
    fn rejects_uncertain_fix() {
        let config = TrackerConfig {
            max_fix_uncertainty: Some(1e-6),
            ..TrackerConfig::default()
        };
        let filter = KalmanFilter2D::new(18.0, 13.0, 0.0, 0.0, 1.2).unwrap();
        let mut tracker = Tracker::with_filter(config, filter).unwrap();
        let outcome = tracker
            .step(0.1, &observations(Vector2::new(20.0, 15.0), 4.0))
            .unwrap();
        assert!(matches!(outcome, StepOutcome::RejectedFix(_)));
        assert_approx_eq!(tracker.filter().unwrap().pos_x(), 18.0, 1e-12);
    }

    #[test]
    fn rejects_invalid_config_and_dt() {
        let config = TrackerConfig {
            min_anchors: 1,
            ..TrackerConfig::default()
        };
        assert!(matches!(
            Tracker::new(config),
            Err(TrackingError::InvalidArgument(_))
        ));
        let filter = KalmanFilter2D::new(0.0, 0.0, 0.0, 0.0, 1.2).unwrap();
        let mut tracker = Tracker::with_filter(TrackerConfig::default(), filter).unwrap();
        assert!(tracker.step(0.0, &[]).is_err());
    }

    #[test]
    fn rejects_dt_before_initialization() {
        let mut tracker = Tracker::new(TrackerConfig::default()).unwrap();
        let truth = Vector2::new(20.0, 15.0);
        for dt in [0.0, -0.1, f64::NAN] {
            assert!(matches!(
                tracker.step(dt, &[]),
                Err(TrackingError::InvalidArgument(_))
            ));
            assert!(matches!(
                tracker.step(dt, &observations(truth, 1.0)),
                Err(TrackingError::InvalidArgument(_))
            ));
        }
        assert!(tracker.filter().is_none());
    }

    #[test]
    fn colinear_fix_leaves_filter_untouched() {
        let truth = Vector2::new(10.0, 8.0);
        let colinear: Vec<RangeObservation> = [
            ("r1", Vector2::new(0.0, 0.0)),
            ("r2", Vector2::new(10.0, 0.0)),
            ("r3", Vector2::new(20.0, 0.0)),
        ]
        .iter()
        .map(|(id, p)| RangeObservation::new(*id, *p, (truth - p).norm(), 0.01))
        .collect();

        let filter = KalmanFilter2D::new(truth[0], truth[1], 0.0, 0.0, 1.2).unwrap();
        let mut predicted = filter.clone();
        predicted.predict(0.1).unwrap();
        let mut tracker = Tracker::with_filter(TrackerConfig::default(), filter).unwrap();

        let outcome = tracker.step(0.1, &colinear).unwrap();
        match outcome {
            StepOutcome::RejectedFix(fix) => assert!(fix.is_degenerate()),
            other => panic!("expected a rejected fix, got {}", other),
        }
        let filter = tracker.filter().unwrap();
        assert_approx_eq!(filter.pos_x(), truth[0], 1e-12);
        assert_approx_eq!(filter.pos_y(), truth[1], 1e-12);
        assert_eq!(filter.mean(), predicted.mean());
        assert_eq!(filter.covariance(), predicted.covariance());
        let var_y = filter.covariance()[(ConstantVelocity2D::POS_Y, ConstantVelocity2D::POS_Y)];
        assert!(var_y >= 1.0);
    }

    #[test]
    fn colinear_fix_does_not_initialize() {
        let mut tracker = Tracker::new(TrackerConfig::default()).unwrap();
        let colinear = [
            RangeObservation::new("r1", Vector2::new(0.0, 0.0), 5.2, 1.0),
            RangeObservation::new("r2", Vector2::new(10.0, 0.0), 7.1, 1.0),
            RangeObservation::new("r3", Vector2::new(20.0, 0.0), 15.3, 1.0),
        ];
        let outcome = tracker.step(0.1, &colinear).unwrap();
        assert!(matches!(outcome, StepOutcome::RejectedFix(_)));
        assert!(tracker.filter().is_none());
    }

    #[test]
    fn step_with_registry_uses_fresh_readings() {
        let t0 = DateTime::from_timestamp(0, 0).unwrap();
        let mut tracker = Tracker::new(TrackerConfig::default()).unwrap();
        let model = *tracker.range_model();
        let mut registry = AnchorRegistry::new();
        let truth = Vector2::new(20.0, 15.0);
        for (id, p) in routers() {
            registry.register(id, p);
            registry.record_rssi(id, model.rssi_at((truth - p).norm()), t0);
        }
        let outcome = tracker.step_with_registry(0.1, &registry, t0).unwrap();
        assert!(matches!(outcome, StepOutcome::Initialized(_)));
        assert_approx_eq!(tracker.filter().unwrap().pos_x(), 20.0, 1e-6);

        let later = t0 + TimeDelta::seconds(10);
        let outcome = tracker.step_with_registry(0.1, &registry, later).unwrap();
        assert_eq!(outcome, StepOutcome::Predicted { fresh_anchors: 0 });
    }
}
