use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::ServiceError;

const DEFAULT_BASE_URL: &str = "https://api.openweathermap.org/data/2.5";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct WeatherData {
    pub condition: String,
    pub temperature_c: f64,
    pub humidity: u32,
    pub wind_speed_kmh: f64,
    pub description: String,
}

impl WeatherData {
    /// Fallback substituted whenever the weather service cannot be reached.
    pub fn default_clear() -> Self {
        Self {
            condition: "clear".into(),
            temperature_c: 22.0,
            humidity: 60,
            wind_speed_kmh: 5.0,
            description: "clear sky".into(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct WeatherResponse {
    weather: Vec<WeatherEntry>,
    main: MainEntry,
    wind: WindEntry,
}

#[derive(Debug, Deserialize)]
struct WeatherEntry {
    main: String,
    description: String,
}

#[derive(Debug, Deserialize)]
struct MainEntry {
    temp: f64,
    humidity: u32,
}

#[derive(Debug, Deserialize)]
struct WindEntry {
    /// Meters per second in the metric response.
    speed: f64,
}

pub struct WeatherClient {
    http: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
}

impl WeatherClient {
    pub fn new(api_key: Option<String>) -> Result<Self, ServiceError> {
        Self::with_base_url(DEFAULT_BASE_URL, api_key)
    }

    pub fn with_base_url(
        base_url: impl Into<String>,
        api_key: Option<String>,
    ) -> Result<Self, ServiceError> {
        let http = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|err| ServiceError::Config(err.to_string()))?;

        Ok(Self {
            http,
            base_url: base_url.into(),
            api_key,
        })
    }

    pub async fn current(&self, lat: f64, lon: f64) -> Result<WeatherData, ServiceError> {
        let key = self
            .api_key
            .as_deref()
            .ok_or_else(|| ServiceError::Config("weather API key not configured".into()))?;

        let url = format!(
            "{}/weather?lat={lat}&lon={lon}&appid={key}&units=metric",
            self.base_url
        );

        let response = self
            .http
            .get(&url)
            .send()
            .await
            .map_err(|err| ServiceError::Config(format!("weather request failed: {err}")))?;

        if !response.status().is_success() {
            return Err(ServiceError::Generic(format!(
                "weather API returned {}",
                response.status()
            )));
        }

        let body: WeatherResponse = response
            .json()
            .await
            .map_err(|err| ServiceError::Generic(format!("unexpected weather payload: {err}")))?;

        let entry = body
            .weather
            .first()
            .ok_or_else(|| ServiceError::Generic("weather payload missing conditions".into()))?;

        Ok(WeatherData {
            condition: entry.main.to_lowercase(),
            temperature_c: body.main.temp.round(),
            humidity: body.main.humidity,
            wind_speed_kmh: (body.wind.speed * 3.6).round(),
            description: entry.description.clone(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn missing_api_key_is_a_config_error() {
        let client = WeatherClient::new(None).expect("client builds");
        let err = client.current(35.0, 139.0).await.unwrap_err();
        assert!(err.is_config());
    }

    #[test]
    fn response_shape_parses() {
        let raw = r#"{
            "weather": [{"main": "Rain", "description": "light rain", "icon": "10d"}],
            "main": {"temp": 18.4, "humidity": 82},
            "wind": {"speed": 2.5},
            "name": "Tokyo"
        }"#;
        let parsed: WeatherResponse = serde_json::from_str(raw).expect("parses");
        assert_eq!(parsed.weather[0].main, "Rain");
        assert_eq!(parsed.main.humidity, 82);
    }
}
