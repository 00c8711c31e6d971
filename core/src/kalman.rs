//! Linear Kalman filter over constant-velocity kinematics
//!
//! The filter maintains a Gaussian belief (mean $x$, covariance $P$) over the state
//! laid out by a [KinematicModel]. The model supplies the transition $F(dt)$, the
//! process-noise mapping $G(dt)$ and the observation matrix $H$; the filter owns
//! the mean, the covariance and the scalar acceleration variance $\sigma_a^2$.
//!
//! ## Predict
//!
//! $$
//! \begin{aligned}
//! x &\leftarrow F x \\\\
//! P &\leftarrow F P F^T + G (\sigma_a^2 I_q) G^T
//! \end{aligned}
//! $$
//!
//! ## Update
//!
//! $$
//! \begin{aligned}
//! y &= z - H x \\\\
//! S &= H P H^T + R \\\\
//! K &= P H^T S^{+} \\\\
//! x &\leftarrow x + K y \\\\
//! P &\leftarrow (I - K H) P
//! \end{aligned}
//! $$
//!
//! $S^{+}$ is the Moore-Penrose pseudo-inverse, so a singular innovation covariance
//! (e.g. a zero-variance measurement) never aborts the update. The covariance is
//! symmetrized after every step.

use crate::error::{Result, TrackingError};
use crate::kinematics::{ConstantVelocity1D, ConstantVelocity2D, KinematicModel};
use crate::linalg::{is_finite, is_symmetric, pseudo_inverse_with_rank, symmetrize};
use crate::measurements::MeasurementModel;

use std::fmt::{self, Debug, Display};

use log::debug;
use nalgebra::{DMatrix, DVector, Matrix2, Vector2};

/// Absolute tolerance for accepting a measurement covariance as symmetric
const SYMMETRY_TOLERANCE: f64 = 1e-9;

/// Linear Kalman filter generic over the kinematic layout.
#[derive(Clone)]
pub struct KalmanFilter<M: KinematicModel> {
    model: M,
    mean_state: DVector<f64>,
    covariance: DMatrix<f64>,
    acceleration_variance: f64,
}

/// Filter over `[x, v_x]`
pub type KalmanFilter1D = KalmanFilter<ConstantVelocity1D>;
/// Filter over `[x, y, v_x, v_y]`
pub type KalmanFilter2D = KalmanFilter<ConstantVelocity2D>;

impl<M: KinematicModel> Debug for KalmanFilter<M> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KF")
            .field("model", &self.model)
            .field("mean_state", &self.mean_state)
            .field("covariance", &self.covariance)
            .field("acceleration_variance", &self.acceleration_variance)
            .finish()
    }
}

impl<M: KinematicModel> Display for KalmanFilter<M> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KalmanFilter")
            .field("model", &self.model.name())
            .field("mean_state", &self.mean_state.as_slice())
            .field("variances", &self.covariance.diagonal().as_slice())
            .field("acceleration_variance", &self.acceleration_variance)
            .finish()
    }
}

impl<M: KinematicModel> KalmanFilter<M> {
    /// Create a filter from an explicit mean with an identity covariance.
    ///
    /// # Arguments
    /// * `model` - kinematic layout
    /// * `mean_state` - initial mean, length `M::STATE_DIM`
    /// * `acceleration_variance` - variance of the white-noise acceleration, `>= 0`
    ///
    /// # Errors
    /// `DimensionMismatch` for a wrongly sized mean, `InvalidArgument` for a negative
    /// or non-finite acceleration variance.
    pub fn from_parts(
        model: M,
        mean_state: DVector<f64>,
        acceleration_variance: f64,
    ) -> Result<Self> {
        if mean_state.len() != M::STATE_DIM {
            return Err(TrackingError::shape(
                "initial mean",
                (M::STATE_DIM, 1),
                (mean_state.len(), 1),
            ));
        }
        if !acceleration_variance.is_finite() || acceleration_variance < 0.0 {
            return Err(TrackingError::invalid(format!(
                "acceleration variance must be finite and non-negative, got {}",
                acceleration_variance
            )));
        }
        Ok(KalmanFilter {
            model,
            mean_state,
            covariance: DMatrix::identity(M::STATE_DIM, M::STATE_DIM),
            acceleration_variance,
        })
    }

    /// Replace the initial covariance (e.g. with one derived from a multilateration fix).
    ///
    /// The covariance must be `n×n` and symmetric.
    pub fn with_covariance(mut self, covariance: DMatrix<f64>) -> Result<Self> {
        let n = M::STATE_DIM;
        if covariance.shape() != (n, n) {
            return Err(TrackingError::shape(
                "initial covariance",
                (n, n),
                covariance.shape(),
            ));
        }
        if !is_symmetric(&covariance, SYMMETRY_TOLERANCE) {
            return Err(TrackingError::invalid("initial covariance must be symmetric"));
        }
        self.covariance = symmetrize(&covariance);
        Ok(self)
    }

    /// Propagate the belief forward by `dt` seconds.
    ///
    /// # Errors
    /// `InvalidArgument` unless `dt` is finite and strictly positive.
    pub fn predict(&mut self, dt: f64) -> Result<()> {
        if !dt.is_finite() || dt <= 0.0 {
            return Err(TrackingError::invalid(format!(
                "dt must be finite and strictly positive, got {}",
                dt
            )));
        }
        let f = self.model.transition(dt);
        let g = self.model.process_noise_map(dt);
        let q = DMatrix::<f64>::identity(M::NOISE_DIM, M::NOISE_DIM) * self.acceleration_variance;

        self.mean_state = &f * &self.mean_state;
        let p_bar = &f * &self.covariance * f.transpose() + &g * q * g.transpose();
        self.covariance = symmetrize(&p_bar);
        Ok(())
    }

    /// Correct the belief with measurement `z` of covariance `r`.
    ///
    /// # Arguments
    /// * `z` - measurement, length `M::MEASUREMENT_DIM`
    /// * `r` - measurement covariance, `m×m`, symmetric
    ///
    /// # Errors
    /// `DimensionMismatch` when `z` or `r` do not match the measurement dimension,
    /// `InvalidArgument` when `r` is not symmetric.
    pub fn update(&mut self, z: &DVector<f64>, r: &DMatrix<f64>) -> Result<()> {
        let m = M::MEASUREMENT_DIM;
        if z.len() != m {
            return Err(TrackingError::shape("measurement", (m, 1), (z.len(), 1)));
        }
        if r.shape() != (m, m) {
            return Err(TrackingError::shape("measurement covariance", (m, m), r.shape()));
        }
        if !is_symmetric(r, SYMMETRY_TOLERANCE) {
            return Err(TrackingError::invalid("measurement covariance must be symmetric"));
        }
        let h = self.model.observation_matrix();
        let identity = DMatrix::<f64>::identity(M::STATE_DIM, M::STATE_DIM);

        let innovation = z - &h * &self.mean_state;
        let s = &h * &self.covariance * h.transpose() + r;
        let (s_inv, rank) = pseudo_inverse_with_rank(&symmetrize(&s));
        if rank < m {
            debug!(
                "innovation covariance is rank deficient ({}/{}), using pseudo-inverse",
                rank, m
            );
        }
        let k = &self.covariance * h.transpose() * s_inv;

        self.mean_state += &k * innovation;
        let p = (identity - &k * &h) * &self.covariance;
        self.covariance = symmetrize(&p);
        if !is_finite(&self.covariance) {
            debug!("covariance became non-finite after update");
        }
        Ok(())
    }

    /// Correct the belief with any [MeasurementModel].
    pub fn update_with<Meas: MeasurementModel + ?Sized>(&mut self, measurement: &Meas) -> Result<()> {
        if measurement.get_dimension() != M::MEASUREMENT_DIM {
            return Err(TrackingError::shape(
                "measurement",
                (M::MEASUREMENT_DIM, 1),
                (measurement.get_dimension(), 1),
            ));
        }
        self.update(&measurement.get_vector(), &measurement.get_noise())
    }

    /// Current mean. Read-only view.
    pub fn mean(&self) -> &DVector<f64> {
        &self.mean_state
    }
    /// Current covariance. Read-only view.
    pub fn covariance(&self) -> &DMatrix<f64> {
        &self.covariance
    }
    pub fn acceleration_variance(&self) -> f64 {
        self.acceleration_variance
    }
    pub fn model(&self) -> &M {
        &self.model
    }
}

impl KalmanFilter1D {
    /// 1D filter at position `initial_x` moving at `initial_v`.
    pub fn new(initial_x: f64, initial_v: f64, acceleration_variance: f64) -> Result<Self> {
        let mut mean = DVector::zeros(ConstantVelocity1D::STATE_DIM);
        mean[ConstantVelocity1D::POS_X] = initial_x;
        mean[ConstantVelocity1D::VEL_X] = initial_v;
        KalmanFilter::from_parts(ConstantVelocity1D, mean, acceleration_variance)
    }
    pub fn pos_x(&self) -> f64 {
        self.mean_state[ConstantVelocity1D::POS_X]
    }
    pub fn vel_x(&self) -> f64 {
        self.mean_state[ConstantVelocity1D::VEL_X]
    }
}

impl KalmanFilter2D {
    /// 2D filter at `(initial_x, initial_y)` moving at `(initial_v_x, initial_v_y)`.
    pub fn new(
        initial_x: f64,
        initial_y: f64,
        initial_v_x: f64,
        initial_v_y: f64,
        acceleration_variance: f64,
    ) -> Result<Self> {
        let mut mean = DVector::zeros(ConstantVelocity2D::STATE_DIM);
        mean[ConstantVelocity2D::POS_X] = initial_x;
        mean[ConstantVelocity2D::POS_Y] = initial_y;
        mean[ConstantVelocity2D::VEL_X] = initial_v_x;
        mean[ConstantVelocity2D::VEL_Y] = initial_v_y;
        KalmanFilter::from_parts(ConstantVelocity2D, mean, acceleration_variance)
    }
    pub fn pos_x(&self) -> f64 {
        self.mean_state[ConstantVelocity2D::POS_X]
    }
    pub fn pos_y(&self) -> f64 {
        self.mean_state[ConstantVelocity2D::POS_Y]
    }
    pub fn vel_x(&self) -> f64 {
        self.mean_state[ConstantVelocity2D::VEL_X]
    }
    pub fn vel_y(&self) -> f64 {
        self.mean_state[ConstantVelocity2D::VEL_Y]
    }
    pub fn position(&self) -> Vector2<f64> {
        Vector2::new(self.pos_x(), self.pos_y())
    }
    pub fn velocity(&self) -> Vector2<f64> {
        Vector2::new(self.vel_x(), self.vel_y())
    }
    /// Marginal covariance of the position block.
    pub fn position_covariance(&self) -> Matrix2<f64> {
        let (x, y) = (ConstantVelocity2D::POS_X, ConstantVelocity2D::POS_Y);
        Matrix2::new(
            self.covariance[(x, x)],
            self.covariance[(x, y)],
            self.covariance[(y, x)],
            self.covariance[(y, y)],
        )
    }
}
