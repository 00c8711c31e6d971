//! Simulation scenarios and tracking results.
//!
//! Three scenarios drive the filter against a known ground truth:
//!
//! - [simulate_1d]: a point on a line coasting at 0.5 m/s and braking after step 500,
//!   observed through noisy position measurements.
//! - [simulate_2d]: a point in the plane that speeds up, turns around and slows down,
//!   observed through noisy position measurements with correlated noise.
//! - [simulate_wifi_2d]: the same planar trajectory observed only through noisy
//!   ranges to three access points, passing through the full registry,
//!   multilateration and tracker pipeline.
//!
//! Each scenario returns a [TrackingResult] that can be written to and read back
//! from CSV.
use std::error::Error;
use std::fs::File;
use std::io;
use std::path::Path;

use chrono::{DateTime, TimeDelta, Utc};
use log::{debug, info};
use nalgebra::{DMatrix, DVector, Vector2};
use rand::Rng;
use rand_distr::{Distribution, Normal};

use crate::anchors::AnchorRegistry;
use crate::config::TrackerConfig;
use crate::error::{Result, TrackingError};
use crate::kalman::{KalmanFilter1D, KalmanFilter2D};
use crate::tracker::Tracker;

/// Acceleration variance of the simulated filters
const SIM_ACCELERATION_VARIANCE: f64 = 1.2;
/// Measurement variance of the 1D scenario
const MEASUREMENT_VARIANCE_1D: f64 = 0.1;
/// Measurement covariance of the 2D scenario, row-major
const MEASUREMENT_COVARIANCE_2D: [f64; 4] = [0.1, 0.01, 0.01, 0.1];
/// Standard deviation of the simulated range error, metres
const RANGE_NOISE_STD: f64 = 1.0;
/// Noisy ranges are clamped to at least this, the path-loss model needs d > 0
const MIN_RANGE: f64 = 0.1;
/// Access points of the WiFi scenario
pub const SIM_ROUTERS: [(&str, [f64; 2]); 3] = [
    ("wifi-1", [5.0, 5.0]),
    ("wifi-2", [10.0, 35.0]),
    ("wifi-3", [45.0, 10.0]),
];

const BASE_COLUMNS: [&str; 12] = [
    "step", "time_s", "true_x", "true_y", "true_vx", "true_vy", "est_x", "est_y", "est_vx",
    "est_vy", "var_x", "var_y",
];
const RANGE_PREFIX: &str = "range_";

/// Timing of a simulation run.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct SimulationParams {
    /// Step length, seconds
    pub dt: f64,
    pub steps: usize,
    /// A measurement is taken on every step that is a non-zero multiple of this
    pub measure_every: usize,
}

impl Default for SimulationParams {
    fn default() -> Self {
        SimulationParams {
            dt: 0.1,
            steps: 1000,
            measure_every: 10,
        }
    }
}

impl SimulationParams {
    fn validate(&self) -> Result<()> {
        if !self.dt.is_finite() || self.dt <= 0.0 {
            return Err(TrackingError::invalid(format!(
                "simulation dt must be finite and strictly positive, got {}",
                self.dt
            )));
        }
        if self.measure_every == 0 {
            return Err(TrackingError::invalid("measure_every must be at least 1"));
        }
        Ok(())
    }

    fn is_measurement_step(&self, step: usize) -> bool {
        step != 0 && step % self.measure_every == 0
    }
}

/// One simulation step: ground truth against the filter estimate.
///
/// The 1D scenario leaves every `y` component at zero.
#[derive(Clone, Debug, PartialEq)]
pub struct TrackingRecord {
    pub step: usize,
    pub time_s: f64,
    pub true_x: f64,
    pub true_y: f64,
    pub true_vx: f64,
    pub true_vy: f64,
    pub est_x: f64,
    pub est_y: f64,
    pub est_vx: f64,
    pub est_vy: f64,
    /// Position variances from the filter covariance diagonal
    pub var_x: f64,
    pub var_y: f64,
    /// Latest simulated range to each anchor, in the order of [TrackingResult::anchor_ids]
    pub ranges: Vec<Option<f64>>,
}

impl TrackingRecord {
    /// Euclidean distance between the estimated and true positions.
    pub fn position_error(&self) -> f64 {
        (self.est_x - self.true_x).hypot(self.est_y - self.true_y)
    }
}

/// Output of a simulation run.
#[derive(Clone, Debug, PartialEq)]
pub struct TrackingResult {
    pub name: String,
    /// Anchors whose ranges are logged with every record
    pub anchor_ids: Vec<String>,
    pub records: Vec<TrackingRecord>,
}

impl TrackingResult {
    pub fn new(name: &str, anchor_ids: Vec<String>) -> Self {
        TrackingResult {
            name: name.to_string(),
            anchor_ids,
            records: Vec::new(),
        }
    }

    /// Root-mean-square position error over all records, `None` when empty.
    pub fn rms_position_error(&self) -> Option<f64> {
        if self.records.is_empty() {
            return None;
        }
        let sum: f64 = self
            .records
            .iter()
            .map(|r| r.position_error().powi(2))
            .sum();
        Some((sum / self.records.len() as f64).sqrt())
    }

    /// Writes the records to a CSV file, one `range_<id>` column per anchor.
    ///
    /// Missing ranges are written as empty fields.
    ///
    /// # Arguments
    /// * `path` - destination file
    pub fn to_csv<P: AsRef<Path>>(&self, path: P) -> io::Result<()> {
        let mut writer = csv::Writer::from_path(path)?;
        let mut header: Vec<String> = BASE_COLUMNS.iter().map(|c| c.to_string()).collect();
        header.extend(self.anchor_ids.iter().map(|id| format!("{}{}", RANGE_PREFIX, id)));
        writer.write_record(&header)?;

        for r in &self.records {
            let mut row = vec![
                r.step.to_string(),
                r.time_s.to_string(),
                r.true_x.to_string(),
                r.true_y.to_string(),
                r.true_vx.to_string(),
                r.true_vy.to_string(),
                r.est_x.to_string(),
                r.est_y.to_string(),
                r.est_vx.to_string(),
                r.est_vy.to_string(),
                r.var_x.to_string(),
                r.var_y.to_string(),
            ];
            row.extend(
                r.ranges
                    .iter()
                    .map(|d| d.map(|d| d.to_string()).unwrap_or_default()),
            );
            writer.write_record(&row)?;
        }
        writer.flush()?;
        Ok(())
    }

    /// Reads records written by [TrackingResult::to_csv].
    ///
    /// # Arguments
    /// * `path` - CSV file
    /// * `name` - name given to the loaded result
    pub fn from_csv<P: AsRef<Path>>(path: P, name: &str) -> std::result::Result<Self, Box<dyn Error>> {
        let file = File::open(path)?;
        let mut rdr = csv::ReaderBuilder::new().has_headers(true).from_reader(file);

        let headers = rdr.headers()?.clone();
        if headers.len() < BASE_COLUMNS.len() {
            return Err("CSV header doesn't have enough fields".into());
        }
        let anchor_ids = headers
            .iter()
            .skip(BASE_COLUMNS.len())
            .map(|h| h.strip_prefix(RANGE_PREFIX).unwrap_or(h).to_string())
            .collect();
        let mut result = TrackingResult::new(name, anchor_ids);

        for record in rdr.records() {
            let record = record?;
            if record.len() != headers.len() {
                return Err("CSV record doesn't match the header".into());
            }
            let field = |i: usize| record[i].parse::<f64>();
            let ranges = record
                .iter()
                .skip(BASE_COLUMNS.len())
                .map(|s| {
                    if s.is_empty() {
                        Ok(None)
                    } else {
                        s.parse::<f64>().map(Some)
                    }
                })
                .collect::<std::result::Result<Vec<_>, _>>()?;
            result.records.push(TrackingRecord {
                step: record[0].parse::<usize>()?,
                time_s: field(1)?,
                true_x: field(2)?,
                true_y: field(3)?,
                true_vx: field(4)?,
                true_vy: field(5)?,
                est_x: field(6)?,
                est_y: field(7)?,
                est_vx: field(8)?,
                est_vy: field(9)?,
                var_x: field(10)?,
                var_y: field(11)?,
                ranges,
            });
        }
        Ok(result)
    }
}

/// Planar ground truth shared by the 2D scenarios.
///
/// Speeds up in x between steps 250 and 500, reverses y at step 500 and brakes in
/// x afterwards.
#[derive(Clone, Copy, Debug)]
struct PlanarTruth {
    position: Vector2<f64>,
    velocity: Vector2<f64>,
}

impl PlanarTruth {
    fn advance(&mut self, step: usize, dt: f64) {
        if 250 < step && step < 500 {
            self.velocity[0] *= 1.005;
        } else if step == 500 {
            self.velocity[1] *= -1.0;
        } else if step > 500 {
            self.velocity[0] *= 0.98;
        }
        self.position += self.velocity * dt;
    }
}

fn normal(std_dev: f64) -> Result<Normal<f64>> {
    Normal::new(0.0, std_dev).map_err(|e| TrackingError::invalid(e.to_string()))
}

fn planar_record(
    step: usize,
    dt: f64,
    truth: &PlanarTruth,
    filter: &KalmanFilter2D,
    ranges: Vec<Option<f64>>,
) -> TrackingRecord {
    let p = filter.position_covariance();
    TrackingRecord {
        step,
        time_s: (step + 1) as f64 * dt,
        true_x: truth.position[0],
        true_y: truth.position[1],
        true_vx: truth.velocity[0],
        true_vy: truth.velocity[1],
        est_x: filter.pos_x(),
        est_y: filter.pos_y(),
        est_vx: filter.vel_x(),
        est_vy: filter.vel_y(),
        var_x: p[(0, 0)],
        var_y: p[(1, 1)],
        ranges,
    }
}

/// Track a point on a line from noisy position measurements.
///
/// # Arguments
/// * `params` - timing of the run
/// * `rng` - source of measurement noise
///
/// # Returns
/// One record per step, taken after the step's predict and update.
pub fn simulate_1d<R: Rng + ?Sized>(params: &SimulationParams, rng: &mut R) -> Result<TrackingResult> {
    params.validate()?;
    let noise = normal(MEASUREMENT_VARIANCE_1D.sqrt())?;
    let mut filter = KalmanFilter1D::new(0.2, 0.3, SIM_ACCELERATION_VARIANCE)?;
    let r = DMatrix::from_element(1, 1, MEASUREMENT_VARIANCE_1D);

    let mut real_x = 0.0;
    let mut real_v = 0.5;
    let mut result = TrackingResult::new("kalman-1d", Vec::new());
    for step in 0..params.steps {
        if step > 500 {
            real_v *= 0.98;
        }
        real_x += params.dt * real_v;

        filter.predict(params.dt)?;
        if params.is_measurement_step(step) {
            let z = DVector::from_element(1, real_x + noise.sample(rng));
            filter.update(&z, &r)?;
        }
        result.records.push(TrackingRecord {
            step,
            time_s: (step + 1) as f64 * params.dt,
            true_x: real_x,
            true_y: 0.0,
            true_vx: real_v,
            true_vy: 0.0,
            est_x: filter.pos_x(),
            est_y: 0.0,
            est_vx: filter.vel_x(),
            est_vy: 0.0,
            var_x: filter.covariance()[(0, 0)],
            var_y: 0.0,
            ranges: Vec::new(),
        });
    }
    info!(
        "{}: {} steps, RMS position error {:.3}",
        result.name,
        result.records.len(),
        result.rms_position_error().unwrap_or(f64::NAN)
    );
    Ok(result)
}

/// Track a point in the plane from noisy position measurements with correlated noise.
///
/// # Arguments
/// * `params` - timing of the run
/// * `rng` - source of measurement noise
pub fn simulate_2d<R: Rng + ?Sized>(params: &SimulationParams, rng: &mut R) -> Result<TrackingResult> {
    params.validate()?;
    let r = DMatrix::from_row_slice(2, 2, &MEASUREMENT_COVARIANCE_2D);
    let noise_x = normal(r[(0, 0)].sqrt())?;
    let noise_y = normal(r[(1, 1)].sqrt())?;
    let mut filter = KalmanFilter2D::new(0.2, 0.2, 0.0, 0.1, SIM_ACCELERATION_VARIANCE)?;

    let mut truth = PlanarTruth {
        position: Vector2::new(0.0, 0.0),
        velocity: Vector2::new(0.5, 0.5),
    };
    let mut result = TrackingResult::new("kalman-2d", Vec::new());
    for step in 0..params.steps {
        truth.advance(step, params.dt);
        filter.predict(params.dt)?;
        if params.is_measurement_step(step) {
            let z = DVector::from_vec(vec![
                truth.position[0] + noise_x.sample(rng),
                truth.position[1] + noise_y.sample(rng),
            ]);
            filter.update(&z, &r)?;
        }
        result
            .records
            .push(planar_record(step, params.dt, &truth, &filter, Vec::new()));
    }
    info!(
        "{}: {} steps, RMS position error {:.3}",
        result.name,
        result.records.len(),
        result.rms_position_error().unwrap_or(f64::NAN)
    );
    Ok(result)
}

/// Track a device from simulated WiFi signal strength.
///
/// On every measurement step the true range to each access point in
/// [SIM_ROUTERS] is corrupted with unit Gaussian noise, converted to the reading
/// the configured path-loss model would produce and recorded in an
/// [AnchorRegistry]. The tracker then builds its observations from the registry,
/// multilaterates and corrects the filter. Other steps only predict.
///
/// # Arguments
/// * `config` - tracker configuration (path-loss model, noise, fix handling)
/// * `params` - timing of the run
/// * `rng` - source of range noise
pub fn simulate_wifi_2d<R: Rng + ?Sized>(
    config: &TrackerConfig,
    params: &SimulationParams,
    rng: &mut R,
) -> Result<TrackingResult> {
    params.validate()?;
    let noise = normal(RANGE_NOISE_STD)?;
    let filter = KalmanFilter2D::new(0.2, 10.2, 0.0, 0.1, config.acceleration_variance)?;
    let mut tracker = Tracker::with_filter(config.clone(), filter)?;
    let range_model = *tracker.range_model();

    let mut registry = AnchorRegistry::new();
    for (id, [x, y]) in SIM_ROUTERS {
        registry.register(id, Vector2::new(x, y));
    }
    let epoch: DateTime<Utc> = DateTime::from_timestamp(0, 0)
        .ok_or_else(|| TrackingError::invalid("simulation epoch out of range"))?;

    let mut truth = PlanarTruth {
        position: Vector2::new(0.0, 10.0),
        velocity: Vector2::new(0.5, 0.5),
    };
    let anchor_ids: Vec<String> = SIM_ROUTERS.iter().map(|(id, _)| id.to_string()).collect();
    let mut ranges: Vec<Option<f64>> = vec![None; SIM_ROUTERS.len()];
    let mut result = TrackingResult::new("wifi-2d", anchor_ids);
    for step in 0..params.steps {
        truth.advance(step, params.dt);
        if params.is_measurement_step(step) {
            let now = epoch
                + TimeDelta::milliseconds(((step + 1) as f64 * params.dt * 1000.0).round() as i64);
            for (i, (id, [x, y])) in SIM_ROUTERS.iter().enumerate() {
                let true_range = (truth.position - Vector2::new(*x, *y)).norm();
                let noisy = (true_range + noise.sample(rng)).max(MIN_RANGE);
                registry.record_rssi(id, range_model.rssi_at(noisy), now);
                ranges[i] = Some(noisy);
            }
            let outcome = tracker.step_with_registry(params.dt, &registry, now)?;
            debug!("step {}: {}", step, outcome);
        } else {
            tracker.step(params.dt, &[])?;
        }
        let filter = tracker
            .filter()
            .ok_or_else(|| TrackingError::invalid("tracker lost its filter"))?;
        result
            .records
            .push(planar_record(step, params.dt, &truth, filter, ranges.clone()));
    }
    info!(
        "{}: {} steps, RMS position error {:.3}",
        result.name,
        result.records.len(),
        result.rms_position_error().unwrap_or(f64::NAN)
    );
    Ok(result)
}
