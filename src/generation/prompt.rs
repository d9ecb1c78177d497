//! Prompt synthesis: a pure mapping from walk metrics and ambient context
//! to the natural-language request sent to the generation service.

use serde::{Deserialize, Serialize};

use crate::environment::{EnvironmentContext, LocationType, TimeOfDay};

pub const DEFAULT_MOOD: &str = "uplifting";

/// Scalar inputs the synthesizer needs from a finished walk.
#[derive(Debug, Clone, Copy)]
pub struct WalkShape {
    pub average_speed_kmh: f64,
    pub duration_seconds: u64,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum Style {
    Acoustic,
    Electronic,
    Pop,
    Classical,
    Ambient,
}

impl Style {
    pub fn as_str(&self) -> &'static str {
        match self {
            Style::Acoustic => "Acoustic",
            Style::Electronic => "Electronic",
            Style::Pop => "Pop",
            Style::Classical => "Classical",
            Style::Ambient => "Ambient",
        }
    }
}

/// Target tempo follows walking cadence: average speed in km/h times 20.
pub fn target_bpm(average_speed_kmh: f64) -> u32 {
    (average_speed_kmh.max(0.0) * 20.0).round() as u32
}

pub fn build_prompt(walk: &WalkShape, env: &EnvironmentContext) -> String {
    let mut prompt = String::from("Create ");

    if walk.average_speed_kmh < 3.0 {
        prompt.push_str("relaxed, peaceful ");
    } else if walk.average_speed_kmh > 5.0 {
        prompt.push_str("energetic, upbeat ");
    } else {
        prompt.push_str("steady, moderate ");
    }

    prompt.push_str(match env.time_of_day {
        TimeOfDay::Morning => "bright morning ",
        TimeOfDay::Afternoon => "warm afternoon ",
        TimeOfDay::Evening => "golden sunset ",
        TimeOfDay::Night => "calm nighttime ",
    });

    prompt.push_str(match env.location_type {
        LocationType::Park => "nature-inspired with bird sounds, ",
        LocationType::Urban => "city-vibe with urban rhythm, ",
        LocationType::Residential => "peaceful neighborhood, ",
        LocationType::Station => "commuter-friendly, ",
        LocationType::Commercial => "shopping district energy, ",
        LocationType::Nature => "wilderness adventure, ",
    });

    let bpm = target_bpm(walk.average_speed_kmh);
    prompt.push_str(&format!(
        "music at {bpm} BPM for walking, inspiring and motivational"
    ));

    match env.weather.condition.as_str() {
        "rain" => prompt.push_str(", with gentle rain ambience"),
        "clear" => prompt.push_str(", bright and cheerful"),
        "clouds" => prompt.push_str(", mellow and contemplative"),
        _ => {}
    }

    if walk.duration_seconds > 1800 {
        prompt.push_str(", epic and adventurous");
    } else if walk.duration_seconds < 600 {
        prompt.push_str(", short and energizing");
    }

    prompt
}

/// Style resolution, first match wins: nature/park, then urban/commercial
/// (split by night), then morning, then rain, else acoustic.
pub fn resolve_style(env: &EnvironmentContext) -> Style {
    if matches!(env.location_type, LocationType::Nature | LocationType::Park) {
        return Style::Acoustic;
    }
    if matches!(
        env.location_type,
        LocationType::Urban | LocationType::Commercial
    ) {
        return if env.time_of_day == TimeOfDay::Night {
            Style::Electronic
        } else {
            Style::Pop
        };
    }
    if env.time_of_day == TimeOfDay::Morning {
        return Style::Classical;
    }
    if env.weather.condition == "rain" {
        return Style::Ambient;
    }
    Style::Acoustic
}

pub fn derive_tags(env: &EnvironmentContext) -> Vec<String> {
    vec![
        "walking".to_string(),
        "generated".to_string(),
        env.time_of_day.as_str().to_string(),
    ]
}
