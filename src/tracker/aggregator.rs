//! Pairwise fix aggregation: distance, speed history, step and calorie
//! estimates. Pure state machine, driven by the session controller.

use std::collections::VecDeque;

use crate::geo::{haversine_distance_m, speed_kmh, GeoFix};

/// Displacements at or below this are GPS jitter and contribute nothing.
const NOISE_FLOOR_M: f64 = 1.0;
/// Rolling speed history bound; oldest samples are evicted first.
const SPEED_WINDOW: usize = 100;
const STEP_LENGTH_M: f64 = 0.7;
const CALORIES_PER_KM: f64 = 50.0;

/// Derived metrics recomputed on every snapshot tick.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MotionTotals {
    pub cumulative_distance_m: f64,
    pub current_speed_kmh: f64,
    pub average_speed_kmh: f64,
    pub max_speed_kmh: f64,
    pub estimated_steps: u64,
    pub estimated_calories: u64,
    pub elevation_gain_m: f64,
    pub elevation_loss_m: f64,
}

#[derive(Debug, Default)]
pub struct MotionAggregator {
    last_fix: Option<GeoFix>,
    cumulative_distance_m: f64,
    speeds: VecDeque<f64>,
    fix_history: Vec<GeoFix>,
}

impl MotionAggregator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn reset(&mut self) {
        *self = Self::default();
    }

    /// Feed the next fix. An interval only contributes to cumulative distance
    /// and the speed history when its displacement clears the noise floor;
    /// sub-threshold jitter is discarded entirely. Every fix is appended to
    /// the route history regardless.
    pub fn ingest(&mut self, fix: GeoFix) {
        if let Some(prev) = &self.last_fix {
            let distance = haversine_distance_m(prev, &fix);
            if distance > NOISE_FLOOR_M {
                let elapsed_ms = (fix.timestamp - prev.timestamp).num_milliseconds();
                self.cumulative_distance_m += distance;
                self.speeds.push_back(speed_kmh(distance, elapsed_ms));
                while self.speeds.len() > SPEED_WINDOW {
                    self.speeds.pop_front();
                }
            }
        }
        self.last_fix = Some(fix.clone());
        self.fix_history.push(fix);
    }

    pub fn totals(&self) -> MotionTotals {
        let average_speed_kmh = if self.speeds.is_empty() {
            0.0
        } else {
            self.speeds.iter().sum::<f64>() / self.speeds.len() as f64
        };
        let max_speed_kmh = self.speeds.iter().copied().fold(0.0, f64::max);

        MotionTotals {
            cumulative_distance_m: self.cumulative_distance_m,
            current_speed_kmh: self.speeds.back().copied().unwrap_or(0.0),
            average_speed_kmh,
            max_speed_kmh,
            estimated_steps: (self.cumulative_distance_m / STEP_LENGTH_M).floor() as u64,
            estimated_calories: ((self.cumulative_distance_m / 1000.0) * CALORIES_PER_KM).floor()
                as u64,
            // Elevation tracking is an extension point; fixed at zero until
            // altitude smoothing lands.
            elevation_gain_m: 0.0,
            elevation_loss_m: 0.0,
        }
    }

    pub fn fix_history(&self) -> &[GeoFix] {
        &self.fix_history
    }

    pub fn speed_sample_count(&self) -> usize {
        self.speeds.len()
    }
}
