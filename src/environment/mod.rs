//! Ambient context for a finished walk: time of day, season, weather and
//! location type, resolved once per session stop.

pub mod weather;

pub use weather::{WeatherClient, WeatherData};

use chrono::{DateTime, Datelike, Local, Timelike};
use log::warn;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum TimeOfDay {
    Morning,
    Afternoon,
    Evening,
    Night,
}

impl TimeOfDay {
    pub fn as_str(&self) -> &'static str {
        match self {
            TimeOfDay::Morning => "morning",
            TimeOfDay::Afternoon => "afternoon",
            TimeOfDay::Evening => "evening",
            TimeOfDay::Night => "night",
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum Season {
    Spring,
    Summer,
    Autumn,
    Winter,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum LocationType {
    Park,
    Urban,
    Residential,
    Station,
    Commercial,
    Nature,
}

pub fn time_of_day_for_hour(hour: u32) -> TimeOfDay {
    match hour {
        5..=11 => TimeOfDay::Morning,
        12..=16 => TimeOfDay::Afternoon,
        17..=20 => TimeOfDay::Evening,
        _ => TimeOfDay::Night,
    }
}

pub fn season_for_month(month: u32) -> Season {
    match month {
        3..=5 => Season::Spring,
        6..=8 => Season::Summer,
        9..=11 => Season::Autumn,
        _ => Season::Winter,
    }
}

/// Immutable snapshot of the surroundings, computed once when a walk stops.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct EnvironmentContext {
    pub time_of_day: TimeOfDay,
    pub weather: WeatherData,
    pub location_type: LocationType,
    pub season: Season,
}

pub struct EnvironmentProvider {
    weather: WeatherClient,
}

impl EnvironmentProvider {
    pub fn new(weather: WeatherClient) -> Self {
        Self { weather }
    }

    /// Resolve the context for a coordinate. Never fails: a weather lookup
    /// error degrades to the fixed default so a session stop is never
    /// blocked on the network.
    pub async fn resolve(&self, location: Option<(f64, f64)>) -> EnvironmentContext {
        let weather = match location {
            Some((lat, lon)) => match self.weather.current(lat, lon).await {
                Ok(data) => data,
                Err(err) => {
                    warn!("weather lookup failed, using defaults: {err}");
                    WeatherData::default_clear()
                }
            },
            None => WeatherData::default_clear(),
        };

        Self::context_at(Local::now(), weather)
    }

    fn context_at(now: DateTime<Local>, weather: WeatherData) -> EnvironmentContext {
        EnvironmentContext {
            time_of_day: time_of_day_for_hour(now.hour()),
            weather,
            // Reverse geocoding is not wired up yet; walks resolve to a park
            // until a place-type lookup lands.
            location_type: LocationType::Park,
            season: season_for_month(now.month()),
        }
    }
}
