use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::geo::GeoFix;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum TrackerStatus {
    Idle,
    Active,
    Paused,
    Stopped,
}

impl Default for TrackerStatus {
    fn default() -> Self {
        TrackerStatus::Idle
    }
}

/// Live view of a walking session. Mutable while the session is active,
/// frozen when `stop()` stamps `end_time`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionSnapshot {
    pub id: String,
    pub start_time: DateTime<Utc>,
    pub end_time: Option<DateTime<Utc>>,
    pub elapsed_seconds: u64,
    pub cumulative_distance_m: f64,
    pub current_speed_kmh: f64,
    pub average_speed_kmh: f64,
    pub max_speed_kmh: f64,
    pub estimated_steps: u64,
    pub estimated_calories: u64,
    pub fix_history: Vec<GeoFix>,
    pub elevation_gain_m: f64,
    pub elevation_loss_m: f64,
}

impl SessionSnapshot {
    pub fn begin(id: String, start_time: DateTime<Utc>) -> Self {
        Self {
            id,
            start_time,
            end_time: None,
            elapsed_seconds: 0,
            cumulative_distance_m: 0.0,
            current_speed_kmh: 0.0,
            average_speed_kmh: 0.0,
            max_speed_kmh: 0.0,
            estimated_steps: 0,
            estimated_calories: 0,
            fix_history: Vec::new(),
            elevation_gain_m: 0.0,
            elevation_loss_m: 0.0,
        }
    }

    /// Wall-clock elapsed time, not a tick count, so drift in the snapshot
    /// ticker never skews the recorded duration.
    pub fn elapsed_at(&self, now: DateTime<Utc>) -> u64 {
        (now - self.start_time).num_seconds().max(0) as u64
    }
}
