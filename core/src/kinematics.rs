//! Constant-velocity kinematic models for the linear Kalman filter.
//!
//! A kinematic model fixes the layout of the state vector and supplies the three
//! matrices the filter needs at every step:
//!
//! - $F(dt)$, the state transition: identity plus a $dt$ coupling from each
//!   velocity index into its position index.
//! - $G(dt)$, the process-noise mapping for a white-noise acceleration acting
//!   independently on each axis: $\frac{1}{2} dt^2$ on the position row and $dt$
//!   on the velocity row, in that axis' noise column.
//! - $H$, the observation matrix selecting the position components.
//!
//! The set of models is closed: [ConstantVelocity1D] and [ConstantVelocity2D].
//! The filter is generic over [KinematicModel], so the variant is chosen once at
//! construction time.

use std::fmt::Debug;

use nalgebra::DMatrix;

/// Shared interface of the constant-velocity models.
pub trait KinematicModel: Clone + Debug {
    /// Length of the state vector
    const STATE_DIM: usize;
    /// Length of a position measurement
    const MEASUREMENT_DIM: usize;
    /// Number of independent acceleration noise inputs (one per spatial axis)
    const NOISE_DIM: usize;

    /// Short human-readable name
    fn name(&self) -> &'static str;
    /// State transition matrix $F(dt)$ (n×n)
    fn transition(&self, dt: f64) -> DMatrix<f64>;
    /// Process-noise mapping $G(dt)$ (n×q)
    fn process_noise_map(&self, dt: f64) -> DMatrix<f64>;
    /// Observation matrix $H$ (m×n)
    fn observation_matrix(&self) -> DMatrix<f64>;
}

/// Position and velocity along a single axis.
///
/// State layout: `[x, v_x]`.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ConstantVelocity1D;

impl ConstantVelocity1D {
    pub const POS_X: usize = 0;
    pub const VEL_X: usize = 1;
}

impl KinematicModel for ConstantVelocity1D {
    const STATE_DIM: usize = 2;
    const MEASUREMENT_DIM: usize = 1;
    const NOISE_DIM: usize = 1;

    fn name(&self) -> &'static str {
        "constant-velocity-1d"
    }
    fn transition(&self, dt: f64) -> DMatrix<f64> {
        let mut f = DMatrix::<f64>::identity(Self::STATE_DIM, Self::STATE_DIM);
        f[(Self::POS_X, Self::VEL_X)] = dt;
        f
    }
    fn process_noise_map(&self, dt: f64) -> DMatrix<f64> {
        let mut g = DMatrix::<f64>::zeros(Self::STATE_DIM, Self::NOISE_DIM);
        g[(Self::POS_X, 0)] = 0.5 * dt * dt;
        g[(Self::VEL_X, 0)] = dt;
        g
    }
    fn observation_matrix(&self) -> DMatrix<f64> {
        let mut h = DMatrix::<f64>::zeros(Self::MEASUREMENT_DIM, Self::STATE_DIM);
        h[(0, Self::POS_X)] = 1.0;
        h
    }
}

/// Position and velocity in the plane.
///
/// State layout: `[x, y, v_x, v_y]`.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ConstantVelocity2D;

impl ConstantVelocity2D {
    pub const POS_X: usize = 0;
    pub const POS_Y: usize = 1;
    pub const VEL_X: usize = 2;
    pub const VEL_Y: usize = 3;
}

impl KinematicModel for ConstantVelocity2D {
    const STATE_DIM: usize = 4;
    const MEASUREMENT_DIM: usize = 2;
    const NOISE_DIM: usize = 2;

    fn name(&self) -> &'static str {
        "constant-velocity-2d"
    }
    fn transition(&self, dt: f64) -> DMatrix<f64> {
        let mut f = DMatrix::<f64>::identity(Self::STATE_DIM, Self::STATE_DIM);
        f[(Self::POS_X, Self::VEL_X)] = dt;
        f[(Self::POS_Y, Self::VEL_Y)] = dt;
        f
    }
    fn process_noise_map(&self, dt: f64) -> DMatrix<f64> {
        let mut g = DMatrix::<f64>::zeros(Self::STATE_DIM, Self::NOISE_DIM);
        // column 0 drives the x axis, column 1 the y axis
        g[(Self::POS_X, 0)] = 0.5 * dt * dt;
        g[(Self::VEL_X, 0)] = dt;
        g[(Self::POS_Y, 1)] = 0.5 * dt * dt;
        g[(Self::VEL_Y, 1)] = dt;
        g
    }
    fn observation_matrix(&self) -> DMatrix<f64> {
        let mut h = DMatrix::<f64>::zeros(Self::MEASUREMENT_DIM, Self::STATE_DIM);
        h[(0, Self::POS_X)] = 1.0;
        h[(1, Self::POS_Y)] = 1.0;
        h
    }
}
