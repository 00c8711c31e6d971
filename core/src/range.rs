//! Log-distance path-loss model converting RSSI readings to ranges.
//!
//! $$
//! d = 10^{\frac{RSSI_0 - RSSI}{10 n}}
//! $$
//!
//! where $RSSI_0$ is the signal strength at one distance unit and $n$ the
//! path-loss exponent (2 in free space, roughly 2 to 4 indoors). A Gaussian error
//! of $\sigma_{RSSI}$ dBm on the reading maps to a distance error of
//!
//! $$
//! \sigma_d = \frac{\ln 10}{10 n} \, d \, \sigma_{RSSI}
//! $$
//!
//! which is the first-order sensitivity of $d$ to the reading.

use std::f64::consts::LN_10;

use serde::{Deserialize, Serialize};

use crate::error::{Result, TrackingError};

/// Default signal strength at one metre (dBm)
pub const DEFAULT_REFERENCE_RSSI: f64 = -40.0;
/// Default indoor path-loss exponent
pub const DEFAULT_PATH_LOSS_EXPONENT: f64 = 3.0;

/// Stateless RSSI-to-distance conversion.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct RangeModel {
    /// Signal strength at one distance unit, dBm
    pub reference_rssi: f64,
    /// Environment-dependent decay rate
    pub path_loss_exponent: f64,
}

impl Default for RangeModel {
    fn default() -> Self {
        RangeModel {
            reference_rssi: DEFAULT_REFERENCE_RSSI,
            path_loss_exponent: DEFAULT_PATH_LOSS_EXPONENT,
        }
    }
}

impl RangeModel {
    /// # Errors
    /// `InvalidArgument` when the reference is not finite or the exponent is not
    /// finite and strictly positive.
    pub fn new(reference_rssi: f64, path_loss_exponent: f64) -> Result<Self> {
        if !reference_rssi.is_finite() {
            return Err(TrackingError::invalid("reference RSSI must be finite"));
        }
        if !path_loss_exponent.is_finite() || path_loss_exponent <= 0.0 {
            return Err(TrackingError::invalid(format!(
                "path-loss exponent must be strictly positive, got {}",
                path_loss_exponent
            )));
        }
        Ok(RangeModel {
            reference_rssi,
            path_loss_exponent,
        })
    }

    /// Estimated distance for a reading of `rssi` dBm.
    pub fn distance(&self, rssi: f64) -> f64 {
        10f64.powf((self.reference_rssi - rssi) / (10.0 * self.path_loss_exponent))
    }

    /// Expected reading at `distance`; the inverse of [RangeModel::distance].
    pub fn rssi_at(&self, distance: f64) -> f64 {
        self.reference_rssi - 10.0 * self.path_loss_exponent * distance.log10()
    }

    /// Standard deviation of the distance given `sigma_rssi` dBm of noise on the reading.
    pub fn distance_noise(&self, distance: f64, sigma_rssi: f64) -> f64 {
        (LN_10 / (10.0 * self.path_loss_exponent)) * distance * sigma_rssi
    }

    /// Variance of the distance; the square of [RangeModel::distance_noise].
    pub fn distance_variance(&self, distance: f64, sigma_rssi: f64) -> f64 {
        self.distance_noise(distance, sigma_rssi).powi(2)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_approx_eq::assert_approx_eq;

    #[test]
    fn reference_reading_is_unit_distance() {
        let model = RangeModel::new(-40.0, 3.0).unwrap();
        assert_approx_eq!(model.distance(-40.0), 1.0, 1e-12);
    }

    #[test]
    fn ten_n_db_is_one_decade() {
        let model = RangeModel::new(-40.0, 2.5).unwrap();
        assert_approx_eq!(model.distance(-65.0), 10.0, 1e-9);
        assert_approx_eq!(model.distance(-90.0), 100.0, 1e-9);
    }

    #[test]
    fn rssi_at_inverts_distance() {
        let model = RangeModel::default();
        for d in [0.5, 1.0, 7.3, 42.0] {
            assert_approx_eq!(model.distance(model.rssi_at(d)), d, 1e-9);
        }
    }

    #[test]
    fn distance_noise_scales_with_distance() {
        let model = RangeModel::new(-40.0, 3.0).unwrap();
        let sigma = model.distance_noise(10.0, 10.0);
        assert_approx_eq!(sigma, LN_10 / 30.0 * 10.0 * 10.0, 1e-12);
        assert_approx_eq!(model.distance_variance(10.0, 10.0), sigma * sigma, 1e-9);
        assert_approx_eq!(model.distance_noise(20.0, 10.0), 2.0 * sigma, 1e-12);
        assert_eq!(model.distance_noise(10.0, 0.0), 0.0);
    }

    #[test]
    fn rejects_bad_parameters() {
        assert!(RangeModel::new(-40.0, 0.0).is_err());
        assert!(RangeModel::new(-40.0, -2.0).is_err());
        assert!(RangeModel::new(f64::NAN, 2.0).is_err());
    }
}
