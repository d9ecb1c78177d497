//! Track records: one generation job per finished walk.

use anyhow::{anyhow, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum JobStatus {
    Pending,
    Generating,
    Completed,
    Failed,
}

impl JobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Pending => "Pending",
            JobStatus::Generating => "Generating",
            JobStatus::Completed => "Completed",
            JobStatus::Failed => "Failed",
        }
    }

    pub fn from_str(value: &str) -> Result<Self> {
        match value {
            "Pending" => Ok(JobStatus::Pending),
            "Generating" => Ok(JobStatus::Generating),
            "Completed" => Ok(JobStatus::Completed),
            "Failed" => Ok(JobStatus::Failed),
            _ => Err(anyhow!("unknown job status '{value}'")),
        }
    }

    /// Completed and Failed records are immutable.
    pub fn is_terminal(&self) -> bool {
        matches!(self, JobStatus::Completed | JobStatus::Failed)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Track {
    pub id: String,
    pub session_id: Option<String>,
    pub title: String,
    pub prompt: String,
    /// Id assigned by the external generation service, recorded at
    /// submission and used by the reconciliation sweep.
    pub job_id: Option<String>,
    pub status: JobStatus,
    pub audio_url: Option<String>,
    pub image_url: Option<String>,
    pub genre: String,
    pub mood: String,
    pub bpm: u32,
    pub tags: Vec<String>,
    pub favorite: bool,
    pub created_at: DateTime<Utc>,
}

/// Partial update applied on a job transition. `None` leaves a field alone.
#[derive(Debug, Clone, Default)]
pub struct TrackUpdate {
    pub status: Option<JobStatus>,
    pub job_id: Option<String>,
    pub title: Option<String>,
    pub audio_url: Option<String>,
    pub image_url: Option<String>,
}

impl Track {
    /// Copy-on-write update: builds the replacement record so readers only
    /// ever observe a whole before or whole after value.
    pub fn apply(&self, update: &TrackUpdate) -> Track {
        let mut next = self.clone();
        if let Some(status) = update.status {
            next.status = status;
        }
        if let Some(job_id) = &update.job_id {
            next.job_id = Some(job_id.clone());
        }
        if let Some(title) = &update.title {
            next.title = title.clone();
        }
        if let Some(audio_url) = &update.audio_url {
            next.audio_url = Some(audio_url.clone());
        }
        if let Some(image_url) = &update.image_url {
            next.image_url = Some(image_url.clone());
        }
        next
    }
}
