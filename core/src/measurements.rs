//! Measurement models consumed by the filter update step.
//!
//! A measurement supplies its value vector `z` and its noise covariance `R`. The
//! filter checks both against the kinematic model's measurement dimension, so a
//! planar fix cannot be fed to the 1D filter by accident.

use std::fmt::{self, Debug, Display};

use nalgebra::{DMatrix, DVector, Matrix2, Vector2};

use crate::multilateration::PositionFix;

/// Generic measurement model trait for all types of measurements
pub trait MeasurementModel {
    /// Get the dimension of the measurement vector
    fn get_dimension(&self) -> usize;
    /// Get the measurement in a vector format
    fn get_vector(&self) -> DVector<f64>;
    /// Get the measurement noise characteristics in a matrix format
    fn get_noise(&self) -> DMatrix<f64>;
}

/// Direct position observation with its covariance.
///
/// Either a scalar position with a variance (1D) or a planar position with a
/// 2×2 covariance, typically the output of multilateration.
#[derive(Clone, Debug, PartialEq)]
pub struct PositionMeasurement {
    pub position: DVector<f64>,
    pub covariance: DMatrix<f64>,
}

impl PositionMeasurement {
    /// Scalar position with variance `variance`.
    pub fn scalar(position: f64, variance: f64) -> Self {
        PositionMeasurement {
            position: DVector::from_element(1, position),
            covariance: DMatrix::from_element(1, 1, variance),
        }
    }
    /// Planar position with a full 2×2 covariance.
    pub fn planar(position: Vector2<f64>, covariance: Matrix2<f64>) -> Self {
        PositionMeasurement {
            position: DVector::from_column_slice(position.as_slice()),
            covariance: DMatrix::from_column_slice(2, 2, covariance.as_slice()),
        }
    }
    /// Planar measurement from a multilateration fix, with its covariance
    /// multiplied by `scale`.
    pub fn from_fix(fix: &PositionFix, scale: f64) -> Self {
        PositionMeasurement::planar(fix.position, fix.covariance * scale)
    }
}

impl Display for PositionMeasurement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "PositionMeasurement(position: {:?}, variances: {:?})",
            self.position.as_slice(),
            self.covariance.diagonal().as_slice()
        )
    }
}

impl MeasurementModel for PositionMeasurement {
    fn get_dimension(&self) -> usize {
        self.position.len()
    }
    fn get_vector(&self) -> DVector<f64> {
        self.position.clone()
    }
    fn get_noise(&self) -> DMatrix<f64> {
        self.covariance.clone()
    }
}

impl MeasurementModel for PositionFix {
    fn get_dimension(&self) -> usize {
        2
    }
    fn get_vector(&self) -> DVector<f64> {
        DVector::from_column_slice(self.position.as_slice())
    }
    fn get_noise(&self) -> DMatrix<f64> {
        DMatrix::from_column_slice(2, 2, self.covariance.as_slice())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scalar_measurement() {
        let m = PositionMeasurement::scalar(0.1, 0.01);
        assert_eq!(m.get_dimension(), 1);
        assert_eq!(m.get_vector()[0], 0.1);
        assert_eq!(m.get_noise()[(0, 0)], 0.01);
    }

    #[test]
    fn planar_measurement_keeps_layout() {
        let cov = Matrix2::new(4.0, 2.0, 2.0, 5.0);
        let m = PositionMeasurement::planar(Vector2::new(1.0, 2.0), cov);
        assert_eq!(m.get_dimension(), 2);
        assert_eq!(m.get_vector().as_slice(), &[1.0, 2.0]);
        let r = m.get_noise();
        assert_eq!(r[(0, 0)], 4.0);
        assert_eq!(r[(0, 1)], 2.0);
        assert_eq!(r[(1, 0)], 2.0);
        assert_eq!(r[(1, 1)], 5.0);
    }

    #[test]
    fn from_fix_scales_covariance() {
        let fix = PositionFix {
            position: Vector2::new(3.0, 4.0),
            covariance: Matrix2::new(0.5, 0.1, 0.1, 0.25),
            anchors_used: 3,
            geometry_rank: 2,
        };
        let m = PositionMeasurement::from_fix(&fix, 10.0);
        assert_eq!(m.get_vector().as_slice(), &[3.0, 4.0]);
        assert!((m.get_noise()[(0, 0)] - 5.0).abs() < 1e-12);
        assert!((m.get_noise()[(1, 0)] - 1.0).abs() < 1e-12);
        assert_eq!(fix.get_noise()[(1, 1)], 0.25);
    }

    #[test]
    fn display() {
        let m = PositionMeasurement::scalar(1.5, 0.2);
        let s = format!("{}", m);
        assert!(s.contains("PositionMeasurement"));
        assert!(s.contains("1.5"));
    }
}
