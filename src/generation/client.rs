//! HTTP client for the external music-generation service, plus the
//! canonicalization of its status vocabulary.

use std::future::Future;
use std::time::Duration;

use log::warn;
use serde::{Deserialize, Serialize};

use crate::error::ServiceError;
use crate::generation::job::JobStatus;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Serialize)]
struct GenerateRequest<'a> {
    prompt: &'a str,
    make_instrumental: bool,
    /// Always false: completion is discovered by the reconciliation sweep.
    wait_audio: bool,
}

/// One track as the service reports it, from both the generate and the
/// status endpoints. Unknown fields are ignored.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TrackResponse {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub status: String,
    pub audio_url: Option<String>,
    pub image_url: Option<String>,
}

/// Quota information from the service's limit endpoint.
#[derive(Debug, Clone, Deserialize)]
pub struct CreditsInfo {
    #[serde(default)]
    pub credits_left: i64,
    #[serde(default)]
    pub monthly_limit: i64,
    #[serde(default)]
    pub monthly_usage: i64,
}

/// Maps the service's status vocabulary onto the canonical three-way
/// status. Unrecognized strings stay Generating so a job is never silently
/// dropped.
pub fn canonical_status(raw: &str) -> JobStatus {
    match raw.to_ascii_lowercase().as_str() {
        "streaming" | "complete" | "completed" => JobStatus::Completed,
        "pending" | "processing" | "generating" => JobStatus::Generating,
        "error" | "failed" => JobStatus::Failed,
        _ => JobStatus::Generating,
    }
}

/// Capability of the external music-generation service. The lifecycle
/// manager is generic over this so tests can drive it with a scripted
/// service instead of the network.
pub trait MusicService: Send + Sync {
    fn generate(
        &self,
        prompt: &str,
        instrumental: bool,
    ) -> impl Future<Output = Result<Vec<TrackResponse>, ServiceError>> + Send;

    fn status(
        &self,
        job_ids: &[String],
    ) -> impl Future<Output = Result<Vec<TrackResponse>, ServiceError>> + Send;
}

pub struct GenerationClient {
    http: reqwest::Client,
    base_url: String,
}

impl GenerationClient {
    pub fn new(base_url: impl Into<String>) -> Result<Self, ServiceError> {
        let http = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|err| ServiceError::Config(err.to_string()))?;

        Ok(Self {
            http,
            base_url: base_url.into(),
        })
    }

    /// Quota probe, surfaced to the UI so credit exhaustion can be shown
    /// before a submission fails.
    pub async fn get_credits(&self) -> Result<CreditsInfo, ServiceError> {
        let url = format!("{}/api/get_limit", self.base_url);
        let response = self
            .http
            .get(&url)
            .send()
            .await
            .map_err(connection_error)?;

        if !response.status().is_success() {
            return Err(ServiceError::Generic(format!(
                "quota endpoint returned {}",
                response.status()
            )));
        }

        response
            .json()
            .await
            .map_err(|err| ServiceError::Generic(format!("unexpected quota payload: {err}")))
    }
}

impl MusicService for GenerationClient {
    async fn generate(
        &self,
        prompt: &str,
        instrumental: bool,
    ) -> Result<Vec<TrackResponse>, ServiceError> {
        let request = GenerateRequest {
            prompt,
            make_instrumental: instrumental,
            wait_audio: false,
        };

        let response = self
            .http
            .post(format!("{}/api/generate", self.base_url))
            .json(&request)
            .send()
            .await
            .map_err(connection_error)?;

        let status = response.status();
        if status == reqwest::StatusCode::SERVICE_UNAVAILABLE {
            return Err(ServiceError::Config(
                "generation service is not available".into(),
            ));
        }
        if status == reqwest::StatusCode::PAYMENT_REQUIRED {
            return Err(ServiceError::CreditsExhausted);
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            if body.to_ascii_lowercase().contains("credit") {
                return Err(ServiceError::CreditsExhausted);
            }
            return Err(ServiceError::Generic(format!(
                "generation API error: {status} - {body}"
            )));
        }

        let value: serde_json::Value = response
            .json()
            .await
            .map_err(|err| ServiceError::Generic(format!("unexpected generation payload: {err}")))?;
        parse_track_list(value)
    }

    async fn status(&self, job_ids: &[String]) -> Result<Vec<TrackResponse>, ServiceError> {
        let url = format!("{}/api/get?ids={}", self.base_url, job_ids.join(","));
        let response = self
            .http
            .get(&url)
            .send()
            .await
            .map_err(connection_error)?;

        // A failed status probe is not fatal to the sweep; report no
        // results and let the jobs stay outstanding.
        if !response.status().is_success() {
            warn!("status endpoint returned {}", response.status());
            return Ok(Vec::new());
        }

        let value: serde_json::Value = response
            .json()
            .await
            .map_err(|err| ServiceError::Generic(format!("unexpected status payload: {err}")))?;
        parse_track_list(value)
    }
}

fn connection_error(err: reqwest::Error) -> ServiceError {
    if err.is_connect() || err.is_timeout() {
        ServiceError::Config(format!("cannot reach generation service: {err}"))
    } else {
        ServiceError::Generic(err.to_string())
    }
}

/// The service replies with either an array of tracks or a single object.
fn parse_track_list(value: serde_json::Value) -> Result<Vec<TrackResponse>, ServiceError> {
    let result = if value.is_array() {
        serde_json::from_value::<Vec<TrackResponse>>(value)
    } else {
        serde_json::from_value::<TrackResponse>(value).map(|track| vec![track])
    };
    result.map_err(|err| ServiceError::Generic(format!("unexpected generation payload: {err}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn canonical_table_matches_the_service_vocabulary() {
        for raw in ["streaming", "complete", "completed", "COMPLETE"] {
            assert_eq!(canonical_status(raw), JobStatus::Completed);
        }
        for raw in ["pending", "processing", "generating"] {
            assert_eq!(canonical_status(raw), JobStatus::Generating);
        }
        for raw in ["error", "failed"] {
            assert_eq!(canonical_status(raw), JobStatus::Failed);
        }
    }

    #[test]
    fn unknown_status_stays_generating() {
        assert_eq!(canonical_status("queued_v2"), JobStatus::Generating);
        assert_eq!(canonical_status(""), JobStatus::Generating);
    }

    #[test]
    fn track_list_accepts_array_or_single_object() {
        let array = serde_json::json!([
            {"id": "a", "title": "One", "status": "streaming", "audio_url": "u"},
            {"id": "b", "status": "pending"}
        ]);
        let tracks = parse_track_list(array).unwrap();
        assert_eq!(tracks.len(), 2);
        assert_eq!(tracks[0].audio_url.as_deref(), Some("u"));

        let single = serde_json::json!({"id": "c", "status": "complete"});
        let tracks = parse_track_list(single).unwrap();
        assert_eq!(tracks.len(), 1);
        assert_eq!(tracks[0].id, "c");
    }

    #[test]
    fn malformed_payload_is_a_generic_error() {
        let err = parse_track_list(serde_json::json!(42)).unwrap_err();
        assert!(!err.is_config());
        assert!(!err.is_credits());
    }

    #[test]
    fn credits_payload_defaults_missing_fields() {
        let info: CreditsInfo = serde_json::from_str(r#"{"credits_left": 12}"#).unwrap();
        assert_eq!(info.credits_left, 12);
        assert_eq!(info.monthly_limit, 0);
    }
}
