//! WiFi signal-strength tracking toolbox
//!
//! This crate estimates the position and velocity of a device from the signal strength (RSSI) it
//! receives from fixed access points with known positions. The pipeline has three stages:
//!
//! 1. A log-distance path-loss model ([range]) turns each RSSI reading into a distance and a distance
//!    variance.
//! 2. A linearized multilateration solver ([multilateration]) turns three or more distances into a
//!    planar position fix with a covariance derived from the anchor geometry.
//! 3. A linear Kalman filter over constant-velocity kinematics ([kalman], [kinematics]) fuses the
//!    stream of fixes into a smoothed position and velocity estimate.
//!
//! The [tracker] module wires the stages together around an [anchors::AnchorRegistry] that holds the
//! latest reading from each access point. Capturing the readings themselves (monitor-mode packet
//! sniffing, parsing scan output) and plotting are left to the caller.
//!
//! This crate is primarily built off of two additional dependencies:
//! - [`nalgebra`](https://crates.io/crates/nalgebra): Provides the linear algebra tools for the filters.
//! - [`rand`](https://crates.io/crates/rand) and [`rand_distr`](https://crates.io/crates/rand_distr): Provides random number generation for the simulations.
//!
//! All other functionality is auxiliary (configuration and result I/O, logging).
//!
//! ## Crate overview
//!
//! - [anchors]: Anchor registry shared between a scanner and the tracking loop.
//! - [config]: Tracker configuration and its JSON/YAML/TOML files.
//! - [error]: The crate's error type.
//! - [kalman]: Linear Kalman filter generic over the kinematic layout.
//! - [kinematics]: Constant-velocity motion models in one and two dimensions.
//! - [linalg]: Pseudo-inverse and least-squares helpers.
//! - [measurements]: Measurement models consumed by the filter update.
//! - [multilateration]: Position fixes from ranges to known anchors.
//! - [range]: RSSI to distance conversion.
//! - [sim]: Simulation scenarios and CSV results.
//! - [tracker]: The end-to-end tracking loop.
//!
//! ## State definitions
//!
//! The 1D filter tracks $x = [p_x, v_x]$ and the 2D filter tracks
//!
//! $$
//! x = [p_x, p_y, v_x, v_y]
//! $$
//!
//! in the same (arbitrary, typically metres) units as the anchor positions. Velocities change only
//! through white-noise acceleration, whose variance is the filter's single tuning parameter.
pub mod anchors;
pub mod config;
pub mod error;
pub mod kalman;
pub mod kinematics;
pub mod linalg;
pub mod measurements;
pub mod multilateration;
pub mod range;
pub mod sim;
pub mod tracker;

pub use anchors::{Anchor, AnchorRegistry, SharedRegistry};
pub use config::{InitialCovariance, TrackerConfig};
pub use error::{Result, TrackingError};
pub use kalman::{KalmanFilter, KalmanFilter1D, KalmanFilter2D};
pub use multilateration::{MultilaterationSolver, PositionFix, RangeObservation, multilaterate};
pub use range::RangeModel;
pub use tracker::{StepOutcome, Tracker};
