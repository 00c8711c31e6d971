//! Tracker configuration.
//!
//! Every tuning constant of the pipeline lives in [TrackerConfig]. Missing fields
//! fall back to their defaults, so a configuration file only needs the values it
//! changes. Files are read and written as JSON, YAML or TOML depending on the
//! extension.
use std::fs::File;
use std::io::{self, Read, Write};
use std::path::Path;

use chrono::TimeDelta;
use serde::{Deserialize, Serialize};

use crate::error::{Result, TrackingError};
use crate::multilateration::MIN_ANCHORS_2D;
use crate::range::{DEFAULT_PATH_LOSS_EXPONENT, DEFAULT_REFERENCE_RSSI, RangeModel};

/// How the covariance is seeded when the filter starts from its first fix.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InitialCovariance {
    /// Identity over the whole state
    Identity,
    /// Position block from the fix covariance, identity over velocity
    #[default]
    FromFix,
}

fn default_acceleration_variance() -> f64 {
    1.2
}
fn default_reference_rssi() -> f64 {
    DEFAULT_REFERENCE_RSSI
}
fn default_path_loss_exponent() -> f64 {
    DEFAULT_PATH_LOSS_EXPONENT
}
fn default_sigma_rssi() -> f64 {
    10.0
}
fn default_min_anchors() -> usize {
    MIN_ANCHORS_2D
}
fn default_freshness_window_s() -> f64 {
    5.0
}
fn default_fix_covariance_scale() -> f64 {
    1.0
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TrackerConfig {
    /// Variance of the white-noise acceleration driving the motion model
    #[serde(default = "default_acceleration_variance")]
    pub acceleration_variance: f64,
    /// Signal strength at one metre, dBm
    #[serde(default = "default_reference_rssi")]
    pub reference_rssi: f64,
    #[serde(default = "default_path_loss_exponent")]
    pub path_loss_exponent: f64,
    /// Standard deviation of an RSSI reading, dBm
    #[serde(default = "default_sigma_rssi")]
    pub sigma_rssi: f64,
    /// Fresh anchors required before a fix is attempted
    #[serde(default = "default_min_anchors")]
    pub min_anchors: usize,
    /// Maximum age of a reading still used for a fix, seconds
    #[serde(default = "default_freshness_window_s")]
    pub freshness_window_s: f64,
    #[serde(default)]
    pub initial_covariance: InitialCovariance,
    /// Fixes whose covariance trace exceeds this are discarded
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_fix_uncertainty: Option<f64>,
    /// Multiplier applied to the fix covariance before it is used as `R`
    #[serde(default = "default_fix_covariance_scale")]
    pub fix_covariance_scale: f64,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        TrackerConfig {
            acceleration_variance: default_acceleration_variance(),
            reference_rssi: default_reference_rssi(),
            path_loss_exponent: default_path_loss_exponent(),
            sigma_rssi: default_sigma_rssi(),
            min_anchors: default_min_anchors(),
            freshness_window_s: default_freshness_window_s(),
            initial_covariance: InitialCovariance::default(),
            max_fix_uncertainty: None,
            fix_covariance_scale: default_fix_covariance_scale(),
        }
    }
}

impl TrackerConfig {
    /// Check every field is usable.
    ///
    /// # Errors
    /// `InvalidArgument` naming the first offending field.
    pub fn validate(&self) -> Result<()> {
        fn non_negative(name: &str, value: f64) -> Result<()> {
            if value.is_finite() && value >= 0.0 {
                Ok(())
            } else {
                Err(TrackingError::invalid(format!(
                    "{} must be finite and non-negative, got {}",
                    name, value
                )))
            }
        }
        fn positive(name: &str, value: f64) -> Result<()> {
            if value.is_finite() && value > 0.0 {
                Ok(())
            } else {
                Err(TrackingError::invalid(format!(
                    "{} must be finite and strictly positive, got {}",
                    name, value
                )))
            }
        }
        non_negative("acceleration_variance", self.acceleration_variance)?;
        RangeModel::new(self.reference_rssi, self.path_loss_exponent)?;
        non_negative("sigma_rssi", self.sigma_rssi)?;
        if self.min_anchors < MIN_ANCHORS_2D {
            return Err(TrackingError::invalid(format!(
                "min_anchors must be at least {}, got {}",
                MIN_ANCHORS_2D, self.min_anchors
            )));
        }
        positive("freshness_window_s", self.freshness_window_s)?;
        if let Some(limit) = self.max_fix_uncertainty {
            positive("max_fix_uncertainty", limit)?;
        }
        positive("fix_covariance_scale", self.fix_covariance_scale)
    }

    /// Path-loss model described by this configuration.
    pub fn range_model(&self) -> Result<RangeModel> {
        RangeModel::new(self.reference_rssi, self.path_loss_exponent)
    }

    /// Freshness window as a duration, saturating for absurdly large values.
    pub fn freshness_window(&self) -> TimeDelta {
        TimeDelta::try_milliseconds((self.freshness_window_s * 1000.0).round() as i64)
            .unwrap_or(TimeDelta::MAX)
    }

    /// Write the configuration to a JSON file (pretty-printed).
    pub fn to_json<P: AsRef<Path>>(&self, path: P) -> io::Result<()> {
        let file = File::create(path)?;
        serde_json::to_writer_pretty(file, self).map_err(io::Error::other)
    }

    /// Read the configuration from a JSON file.
    pub fn from_json<P: AsRef<Path>>(path: P) -> io::Result<Self> {
        let file = File::open(path)?;
        serde_json::from_reader(file).map_err(io::Error::other)
    }
    /// Write the configuration as YAML.
    pub fn to_yaml<P: AsRef<Path>>(&self, path: P) -> io::Result<()> {
        let mut file = File::create(path)?;
        let s = serde_yaml::to_string(self).map_err(io::Error::other)?;
        file.write_all(s.as_bytes())
    }
    /// Read the configuration from YAML.
    pub fn from_yaml<P: AsRef<Path>>(path: P) -> io::Result<Self> {
        let file = File::open(path)?;
        serde_yaml::from_reader(file).map_err(io::Error::other)
    }
    /// Write the configuration as TOML.
    pub fn to_toml<P: AsRef<Path>>(&self, path: P) -> io::Result<()> {
        let mut file = File::create(path)?;
        let s = toml::to_string(self).map_err(io::Error::other)?;
        file.write_all(s.as_bytes())
    }
    /// Read the configuration from TOML.
    pub fn from_toml<P: AsRef<Path>>(path: P) -> io::Result<Self> {
        let mut s = String::new();
        let mut file = File::open(path)?;
        file.read_to_string(&mut s)?;
        toml::from_str(&s).map_err(io::Error::other)
    }
    /// Write in the format named by the extension (.json/.yaml/.yml/.toml)
    pub fn to_file<P: AsRef<Path>>(&self, path: P) -> io::Result<()> {
        let p = path.as_ref();
        match extension(p).as_deref() {
            Some("json") => self.to_json(p),
            Some("yaml") | Some("yml") => self.to_yaml(p),
            Some("toml") => self.to_toml(p),
            _ => Err(unsupported()),
        }
    }
    /// Read in the format named by the extension (.json/.yaml/.yml/.toml)
    pub fn from_file<P: AsRef<Path>>(path: P) -> io::Result<Self> {
        let p = path.as_ref();
        match extension(p).as_deref() {
            Some("json") => Self::from_json(p),
            Some("yaml") | Some("yml") => Self::from_yaml(p),
            Some("toml") => Self::from_toml(p),
            _ => Err(unsupported()),
        }
    }
}

fn extension(path: &Path) -> Option<String> {
    path.extension()
        .and_then(|s| s.to_str())
        .map(|s| s.to_lowercase())
}

fn unsupported() -> io::Error {
    io::Error::new(io::ErrorKind::InvalidInput, "unsupported file extension")
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::NamedTempFile;

    fn sample_cfg() -> TrackerConfig {
        TrackerConfig {
            acceleration_variance: 0.5,
            path_loss_exponent: 2.2,
            min_anchors: 4,
            initial_covariance: InitialCovariance::Identity,
            max_fix_uncertainty: Some(50.0),
            fix_covariance_scale: 2.0,
            ..TrackerConfig::default()
        }
    }

    #[test]
    fn defaults() {
        let cfg = TrackerConfig::default();
        assert_eq!(cfg.acceleration_variance, 1.2);
        assert_eq!(cfg.reference_rssi, -40.0);
        assert_eq!(cfg.path_loss_exponent, 3.0);
        assert_eq!(cfg.sigma_rssi, 10.0);
        assert_eq!(cfg.min_anchors, 3);
        assert_eq!(cfg.freshness_window(), TimeDelta::seconds(5));
        assert_eq!(cfg.initial_covariance, InitialCovariance::FromFix);
        assert!(cfg.max_fix_uncertainty.is_none());
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn validate_rejects_bad_fields() {
        let bad = [
            TrackerConfig {
                acceleration_variance: -1.0,
                ..TrackerConfig::default()
            },
            TrackerConfig {
                path_loss_exponent: 0.0,
                ..TrackerConfig::default()
            },
            TrackerConfig {
                min_anchors: 2,
                ..TrackerConfig::default()
            },
            TrackerConfig {
                freshness_window_s: 0.0,
                ..TrackerConfig::default()
            },
            TrackerConfig {
                max_fix_uncertainty: Some(f64::NAN),
                ..TrackerConfig::default()
            },
            TrackerConfig {
                fix_covariance_scale: -2.0,
                ..TrackerConfig::default()
            },
        ];
        for cfg in bad.iter() {
            assert!(matches!(
                cfg.validate(),
                Err(TrackingError::InvalidArgument(_))
            ));
        }
    }

    #[test]
    fn partial_file_uses_defaults() {
        let f = NamedTempFile::new().unwrap();
        let path = f.path().with_extension("json");
        std::fs::write(&path, r#"{ "path_loss_exponent": 2.0, "initial_covariance": "identity" }"#)
            .unwrap();
        let loaded = TrackerConfig::from_file(&path).unwrap();
        assert_eq!(loaded.path_loss_exponent, 2.0);
        assert_eq!(loaded.initial_covariance, InitialCovariance::Identity);
        assert_eq!(loaded.acceleration_variance, 1.2);
        assert_eq!(loaded.min_anchors, 3);
    }

    #[test]
    fn json_roundtrip() {
        let cfg = sample_cfg();
        let f = NamedTempFile::new().unwrap();
        let path = f.path().with_extension("json");
        cfg.to_json(&path).unwrap();
        let loaded = TrackerConfig::from_json(&path).unwrap();
        assert_eq!(cfg, loaded);
    }

    #[test]
    fn yaml_roundtrip() {
        let cfg = sample_cfg();
        let f = NamedTempFile::new().unwrap();
        let path = f.path().with_extension("yml");
        cfg.to_file(&path).unwrap();
        let loaded = TrackerConfig::from_file(&path).unwrap();
        assert_eq!(cfg, loaded);
    }

    #[test]
    fn toml_roundtrip_without_limit() {
        let cfg = TrackerConfig::default();
        let f = NamedTempFile::new().unwrap();
        let path = f.path().with_extension("toml");
        cfg.to_file(&path).unwrap();
        let loaded = TrackerConfig::from_toml(&path).unwrap();
        assert_eq!(cfg, loaded);
    }

    #[test]
    fn unsupported_extension_error() {
        let cfg = sample_cfg();
        let f = NamedTempFile::new().unwrap();
        let path = f.path().with_extension("txt");
        let result = cfg.to_file(&path);
        assert_eq!(result.unwrap_err().kind(), std::io::ErrorKind::InvalidInput);
        let result = TrackerConfig::from_file(&path);
        assert_eq!(result.unwrap_err().kind(), std::io::ErrorKind::InvalidInput);
    }
}
