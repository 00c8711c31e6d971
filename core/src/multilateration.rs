//! Linearized multilateration with Jacobian covariance propagation.
//!
//! Given $k \ge 3$ anchors $a_i$ with range estimates $d_i$, the squared-range
//! equations $\lVert p - a_i \rVert^2 = d_i^2$ share the quadratic term
//! $\lVert p \rVert^2$. Differencing every equation against a reference anchor
//! $a_r$ (the last one supplied) removes it and leaves the linear system
//!
//! $$
//! -2 (a_i - a_r)^T p = d_i^2 - d_r^2 + \lVert a_r \rVert^2 - \lVert a_i \rVert^2,
//! \quad i \ne r
//! $$
//!
//! solved for $\hat{p}$ in the least-squares sense.
//!
//! The linear solve carries no usable uncertainty, so the covariance is obtained
//! from the sensitivity of the squared-range equations at $\hat{p}$:
//!
//! $$
//! \begin{aligned}
//! J_i &= 2 (\hat{p} - a_i)^T \\\\
//! J^{+} &= (J^T J)^{+} J^T \\\\
//! \Sigma_{\hat{p}} &= J^{+} R \, J^{+T}
//! \end{aligned}
//! $$
//!
//! with $R$ the diagonal matrix of per-anchor distance variances. Both inversions
//! use the pseudo-inverse: colinear or coincident anchors produce a wide (possibly
//! degenerate) covariance, never an error. [PositionFix::geometry_rank] and
//! [PositionFix::uncertainty] expose that quality to the caller.

use std::fmt::{self, Display};

use log::debug;
use nalgebra::{DMatrix, DVector, Matrix2, Vector2};

use crate::error::{Result, TrackingError};
use crate::linalg::{least_squares, pseudo_inverse_with_rank, symmetrize};

/// Anchors needed for a planar fix
pub const MIN_ANCHORS_2D: usize = 3;

/// One anchor's contribution to a fix.
#[derive(Clone, Debug, PartialEq)]
pub struct RangeObservation {
    pub anchor_id: String,
    /// Known anchor position
    pub position: Vector2<f64>,
    /// Estimated distance to the anchor
    pub distance: f64,
    /// Variance of `distance`
    pub distance_variance: f64,
}

impl RangeObservation {
    pub fn new(
        anchor_id: impl Into<String>,
        position: Vector2<f64>,
        distance: f64,
        distance_variance: f64,
    ) -> Self {
        RangeObservation {
            anchor_id: anchor_id.into(),
            position,
            distance,
            distance_variance,
        }
    }
}

/// Position estimate with its linearized covariance.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct PositionFix {
    pub position: Vector2<f64>,
    pub covariance: Matrix2<f64>,
    /// Number of anchors the fix was computed from
    pub anchors_used: usize,
    /// Numerical rank of $J^T J$; below 2 means the geometry cannot resolve both axes
    pub geometry_rank: usize,
}

impl PositionFix {
    /// True when position and covariance are all finite.
    pub fn is_finite(&self) -> bool {
        self.position.iter().all(|v| v.is_finite()) && self.covariance.iter().all(|v| v.is_finite())
    }
    /// Trace of the covariance, a scalar measure of the fix' spread.
    ///
    /// Infinite when the geometry leaves a direction unresolved: the pseudo-inverse
    /// assigns that direction zero variance, which is not a bound on the error.
    pub fn uncertainty(&self) -> f64 {
        if self.geometry_rank < 2 {
            return f64::INFINITY;
        }
        self.covariance.trace()
    }
    /// Rank-deficient geometry or non-finite output.
    pub fn is_degenerate(&self) -> bool {
        self.geometry_rank < 2 || !self.is_finite()
    }
}

impl Display for PositionFix {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "PositionFix(x: {:.3}, y: {:.3}, var_x: {:.3e}, var_y: {:.3e}, anchors: {})",
            self.position[0],
            self.position[1],
            self.covariance[(0, 0)],
            self.covariance[(1, 1)],
            self.anchors_used
        )
    }
}

/// Multilateration solver with a configurable anchor minimum.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct MultilaterationSolver {
    min_anchors: usize,
}

impl Default for MultilaterationSolver {
    fn default() -> Self {
        MultilaterationSolver {
            min_anchors: MIN_ANCHORS_2D,
        }
    }
}

impl MultilaterationSolver {
    /// # Errors
    /// `InvalidArgument` when `min_anchors` is below what a planar solve needs.
    pub fn new(min_anchors: usize) -> Result<Self> {
        if min_anchors < MIN_ANCHORS_2D {
            return Err(TrackingError::invalid(format!(
                "a planar fix needs at least {} anchors, got a minimum of {}",
                MIN_ANCHORS_2D, min_anchors
            )));
        }
        Ok(MultilaterationSolver { min_anchors })
    }

    pub fn min_anchors(&self) -> usize {
        self.min_anchors
    }

    /// Solve for a position fix from `observations`.
    ///
    /// The last observation is the reference anchor.
    ///
    /// # Errors
    /// `InsufficientAnchors` when fewer than the minimum are supplied (checked before
    /// any computation), `InvalidArgument` for a negative or NaN distance variance.
    pub fn solve(&self, observations: &[RangeObservation]) -> Result<PositionFix> {
        let k = observations.len();
        if k < self.min_anchors {
            return Err(TrackingError::InsufficientAnchors {
                required: self.min_anchors,
                available: k,
            });
        }
        if let Some(bad) = observations
            .iter()
            .find(|o| o.distance_variance.is_nan() || o.distance_variance < 0.0)
        {
            return Err(TrackingError::invalid(format!(
                "distance variance for anchor '{}' must be non-negative, got {}",
                bad.anchor_id, bad.distance_variance
            )));
        }

        let reference = &observations[k - 1];
        let others = &observations[..k - 1];

        let mut a = DMatrix::<f64>::zeros(k - 1, 2);
        let mut b = DVector::<f64>::zeros(k - 1);
        for (i, obs) in others.iter().enumerate() {
            let row = -2.0 * (obs.position - reference.position);
            a[(i, 0)] = row[0];
            a[(i, 1)] = row[1];
            b[i] = obs.distance.powi(2) - reference.distance.powi(2)
                + reference.position.norm_squared()
                - obs.position.norm_squared();
        }
        let solution = least_squares(&a, &b);
        let position = Vector2::new(solution[0], solution[1]);

        let mut jacobian = DMatrix::<f64>::zeros(k, 2);
        for (i, obs) in observations.iter().enumerate() {
            let row = 2.0 * (position - obs.position);
            jacobian[(i, 0)] = row[0];
            jacobian[(i, 1)] = row[1];
        }
        let r = DMatrix::from_diagonal(&DVector::from_iterator(
            k,
            observations.iter().map(|o| o.distance_variance),
        ));
        let (normal_inv, geometry_rank) =
            pseudo_inverse_with_rank(&(jacobian.transpose() * &jacobian));
        let j_plus = normal_inv * jacobian.transpose();
        let cov = symmetrize(&(&j_plus * r * j_plus.transpose()));
        let covariance = Matrix2::new(cov[(0, 0)], cov[(0, 1)], cov[(1, 0)], cov[(1, 1)]);

        let fix = PositionFix {
            position,
            covariance,
            anchors_used: k,
            geometry_rank,
        };
        if fix.is_degenerate() {
            debug!("degenerate anchor geometry (rank {}): {}", geometry_rank, fix);
        } else {
            debug!("multilateration: {}", fix);
        }
        Ok(fix)
    }
}

/// Solve with the default three-anchor minimum.
pub fn multilaterate(observations: &[RangeObservation]) -> Result<PositionFix> {
    MultilaterationSolver::default().solve(observations)
}
