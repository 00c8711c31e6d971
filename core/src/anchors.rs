//! Anchor registry and observation snapshots.
//!
//! Anchors (WiFi access points) have a fixed, known position and carry the most
//! recent signal-strength reading heard from them. A scanning thread writes
//! readings into the registry while the tracking loop reads it, so the shared form
//! is [SharedRegistry] (`Arc<Mutex<_>>`) and the loop works on an owned
//! [snapshot] taken once per cycle. Anchor identity and position never change after
//! registration; only the reading and its timestamp are refreshed.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

use chrono::{DateTime, TimeDelta, Utc};
use log::{debug, trace};
use nalgebra::Vector2;

use crate::multilateration::RangeObservation;
use crate::range::RangeModel;

/// Fixed reference transmitter with its latest reading.
#[derive(Clone, Debug, PartialEq)]
pub struct Anchor {
    /// Identifier, typically the access point's MAC address
    pub id: String,
    /// Known position
    pub position: Vector2<f64>,
    /// Latest signal strength, dBm
    pub last_rssi: Option<f64>,
    /// When `last_rssi` was heard
    pub last_updated: Option<DateTime<Utc>>,
}

impl Anchor {
    pub fn new(id: impl Into<String>, position: Vector2<f64>) -> Self {
        Anchor {
            id: id.into(),
            position,
            last_rssi: None,
            last_updated: None,
        }
    }

    /// True when a reading exists and is no older than `window` at `now`.
    pub fn is_fresh(&self, now: DateTime<Utc>, window: TimeDelta) -> bool {
        match (self.last_rssi, self.last_updated) {
            (Some(rssi), Some(at)) => {
                rssi.is_finite() && now.signed_duration_since(at) <= window
            }
            _ => false,
        }
    }
}

/// Owned registry of anchors keyed by identifier.
#[derive(Clone, Debug, Default)]
pub struct AnchorRegistry {
    anchors: HashMap<String, Anchor>,
}

/// Registry shared between a scanning thread and the tracking loop.
pub type SharedRegistry = Arc<Mutex<AnchorRegistry>>;

impl AnchorRegistry {
    pub fn new() -> Self {
        AnchorRegistry::default()
    }

    /// Register an anchor at a known position. Re-registering an id replaces it.
    pub fn register(&mut self, id: impl Into<String>, position: Vector2<f64>) {
        let anchor = Anchor::new(id, position);
        debug!(
            "registered anchor {} at ({:.2}, {:.2})",
            anchor.id, position[0], position[1]
        );
        self.anchors.insert(anchor.id.clone(), anchor);
    }

    /// Record a reading for a known anchor. Readings from unregistered
    /// transmitters are ignored and return `false`.
    pub fn record_rssi(&mut self, id: &str, rssi: f64, at: DateTime<Utc>) -> bool {
        match self.anchors.get_mut(id) {
            Some(anchor) => {
                anchor.last_rssi = Some(rssi);
                anchor.last_updated = Some(at);
                trace!("[{}]: RSSI: {} dBm", id, rssi);
                true
            }
            None => false,
        }
    }

    pub fn get(&self, id: &str) -> Option<&Anchor> {
        self.anchors.get(id)
    }

    pub fn len(&self) -> usize {
        self.anchors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.anchors.is_empty()
    }

    /// All anchors sorted by identifier.
    pub fn anchors(&self) -> Vec<&Anchor> {
        let mut anchors: Vec<&Anchor> = self.anchors.values().collect();
        anchors.sort_by(|a, b| a.id.cmp(&b.id));
        anchors
    }

    /// Anchors with a reading inside the freshness window, sorted by identifier.
    pub fn fresh(&self, now: DateTime<Utc>, window: TimeDelta) -> Vec<&Anchor> {
        self.anchors()
            .into_iter()
            .filter(|a| a.is_fresh(now, window))
            .collect()
    }

    /// Build the observation set for one correction step.
    ///
    /// Each fresh anchor's reading is converted to a distance with `range_model`
    /// and given the variance implied by `sigma_rssi` dBm of reading noise.
    /// Ordering is by identifier, so the reference anchor (the last one) is stable
    /// across cycles.
    pub fn observation_set(
        &self,
        now: DateTime<Utc>,
        window: TimeDelta,
        range_model: &RangeModel,
        sigma_rssi: f64,
    ) -> Vec<RangeObservation> {
        self.fresh(now, window)
            .into_iter()
            .filter_map(|anchor| {
                let rssi = anchor.last_rssi?;
                let distance = range_model.distance(rssi);
                Some(RangeObservation::new(
                    anchor.id.clone(),
                    anchor.position,
                    distance,
                    range_model.distance_variance(distance, sigma_rssi),
                ))
            })
            .collect()
    }
}

/// Create an empty shared registry.
pub fn shared_registry() -> SharedRegistry {
    Arc::new(Mutex::new(AnchorRegistry::new()))
}

/// Consistent copy of a shared registry for one tracking cycle.
///
/// A writer that panicked mid-update cannot leave an anchor half-written (each
/// reading is two plain field stores), so a poisoned lock is still read.
pub fn snapshot(shared: &SharedRegistry) -> AnchorRegistry {
    shared
        .lock()
        .unwrap_or_else(PoisonError::into_inner)
        .clone()
}
