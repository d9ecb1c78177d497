//! Generation lifecycle: submission, the periodic reconciliation sweep and
//! the authoritative in-memory track list the UI reads from.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use chrono::Utc;
use log::{error, info, warn};
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::db::Database;
use crate::error::ServiceError;
use crate::generation::client::{canonical_status, MusicService, TrackResponse};
use crate::generation::job::{JobStatus, Track, TrackUpdate};
use crate::generation::prompt::{Style, DEFAULT_MOOD};

const RECONCILE_INTERVAL: Duration = Duration::from_secs(30);

/// Everything `submit` needs besides the service itself; assembled by the
/// caller from the finished walk and its environment.
#[derive(Debug, Clone)]
pub struct SubmitRequest {
    pub prompt: String,
    pub title: String,
    pub style: Style,
    pub bpm: u32,
    pub tags: Vec<String>,
    pub instrumental: bool,
    pub session_id: Option<String>,
}

/// Owns the track list. Single logical writer; UI reads get clones and
/// every update replaces a whole record, so a concurrent read never sees a
/// partially-updated job.
pub struct GenerationManager<S: MusicService> {
    service: Arc<S>,
    db: Database,
    tracks: Arc<Mutex<Vec<Track>>>,
    last_error: Arc<Mutex<Option<String>>>,
}

impl<S: MusicService> GenerationManager<S> {
    pub fn new(service: Arc<S>, db: Database) -> Self {
        Self {
            service,
            db,
            tracks: Arc::new(Mutex::new(Vec::new())),
            last_error: Arc::new(Mutex::new(None)),
        }
    }

    /// Reload Generating rows persisted by an earlier run so the sweep can
    /// resume polling them.
    pub async fn load_outstanding(&self) -> Result<usize> {
        let outstanding = self.db.get_incomplete_tracks().await?;
        let count = outstanding.len();
        if count > 0 {
            let mut tracks = self.tracks.lock().await;
            tracks.extend(outstanding);
        }
        Ok(count)
    }

    /// Library view: newest first.
    pub async fn tracks(&self) -> Vec<Track> {
        self.tracks.lock().await.clone()
    }

    /// User-visible message from the most recent failed submission.
    pub async fn last_error(&self) -> Option<String> {
        self.last_error.lock().await.clone()
    }

    pub async fn clear_error(&self) {
        *self.last_error.lock().await = None;
    }

    pub async fn toggle_favorite(&self, track_id: &str) -> Option<bool> {
        let favorite = {
            let mut tracks = self.tracks.lock().await;
            let record = tracks.iter_mut().find(|t| t.id == track_id)?;
            let mut next = record.clone();
            next.favorite = !next.favorite;
            let favorite = next.favorite;
            *record = next;
            favorite
        };

        if let Err(err) = self.db.set_favorite(track_id, favorite).await {
            error!("failed to persist favorite for {track_id}: {err:#}");
        }
        Some(favorite)
    }

    /// Submit a prompt to the generation service. Service failures never
    /// escape as errors: they resolve to a Failed track plus a user-visible
    /// message via `last_error()`.
    pub async fn submit(&self, request: SubmitRequest) -> Track {
        self.clear_error().await;

        let track = Track {
            id: format!("track-{}", Uuid::new_v4()),
            session_id: request.session_id,
            title: request.title,
            prompt: request.prompt.clone(),
            job_id: None,
            status: JobStatus::Pending,
            audio_url: None,
            image_url: None,
            genre: request.style.as_str().to_lowercase(),
            mood: DEFAULT_MOOD.to_string(),
            bpm: request.bpm,
            tags: request.tags,
            favorite: false,
            created_at: Utc::now(),
        };
        let track_id = track.id.clone();

        {
            let mut tracks = self.tracks.lock().await;
            tracks.insert(0, track.clone());
        }
        if let Err(err) = self.db.insert_track(&track).await {
            error!("failed to persist new track {track_id}: {err:#}");
        }

        // Pending -> Generating at the moment of submission.
        self.apply_update(
            &track_id,
            TrackUpdate {
                status: Some(JobStatus::Generating),
                ..Default::default()
            },
        )
        .await;

        match self.service.generate(&request.prompt, request.instrumental).await {
            Ok(responses) => self.record_submission(&track_id, responses).await,
            Err(err) => {
                warn!("generation submission failed for {track_id}: {err}");
                self.fail_with_message(&track_id, err).await
            }
        }
    }

    async fn record_submission(&self, track_id: &str, responses: Vec<TrackResponse>) -> Track {
        let Some(first) = responses.into_iter().next() else {
            warn!("generation service returned no tracks for {track_id}");
            return self.mark_failed(track_id).await;
        };

        if first.id.is_empty() {
            warn!("generation service response missing a job id for {track_id}");
            return self.mark_failed(track_id).await;
        }

        let mut update = TrackUpdate {
            job_id: Some(first.id),
            ..Default::default()
        };
        if !first.title.is_empty() {
            update.title = Some(first.title);
        }
        // An immediate audio URL means the job finished synchronously; the
        // record goes straight to Completed, never transiently Generating.
        if let Some(audio_url) = first.audio_url {
            update.status = Some(JobStatus::Completed);
            update.audio_url = Some(audio_url);
            update.image_url = first.image_url;
        }

        self.apply_update(track_id, update)
            .await
            .expect("submitted track exists")
    }

    async fn fail_with_message(&self, track_id: &str, err: ServiceError) -> Track {
        *self.last_error.lock().await = Some(err.user_message());
        self.mark_failed(track_id).await
    }

    async fn mark_failed(&self, track_id: &str) -> Track {
        self.apply_update(
            track_id,
            TrackUpdate {
                status: Some(JobStatus::Failed),
                ..Default::default()
            },
        )
        .await
        .expect("submitted track exists")
    }

    /// One reconciliation sweep over every Generating track with a job id.
    /// Each job is queried independently; one failure never aborts the
    /// sweep for the rest.
    pub async fn reconcile(&self) {
        let candidates: Vec<(String, String)> = {
            let tracks = self.tracks.lock().await;
            tracks
                .iter()
                .filter(|t| t.status == JobStatus::Generating)
                .filter_map(|t| {
                    t.job_id
                        .as_deref()
                        .filter(|job_id| !job_id.is_empty())
                        .map(|job_id| (t.id.clone(), job_id.to_string()))
                })
                .collect()
        };

        if candidates.is_empty() {
            return;
        }
        info!("reconciling {} outstanding generation job(s)", candidates.len());

        for (track_id, job_id) in candidates {
            let responses = match self.service.status(std::slice::from_ref(&job_id)).await {
                Ok(responses) => responses,
                Err(err) => {
                    warn!("status check failed for track {track_id}: {err}");
                    continue;
                }
            };

            let Some(remote) = responses
                .iter()
                .find(|r| r.id == job_id)
                .or_else(|| responses.first())
                .cloned()
            else {
                continue;
            };

            match canonical_status(&remote.status) {
                JobStatus::Completed if remote.audio_url.is_some() => {
                    let mut update = TrackUpdate {
                        status: Some(JobStatus::Completed),
                        audio_url: remote.audio_url,
                        image_url: remote.image_url,
                        ..Default::default()
                    };
                    if !remote.title.is_empty() {
                        update.title = Some(remote.title);
                    }
                    if self.apply_update(&track_id, update).await.is_some() {
                        info!("track {track_id} completed");
                    }
                }
                JobStatus::Failed => {
                    if self.apply_update(
                        &track_id,
                        TrackUpdate {
                            status: Some(JobStatus::Failed),
                            ..Default::default()
                        },
                    )
                    .await
                    .is_some()
                    {
                        warn!("track {track_id} failed at the generation service");
                    }
                }
                // Still generating, or completed without audio yet; poll
                // again on the next sweep.
                _ => {}
            }
        }
    }

    /// Repeating sweep on a 30-second interval, cancelled only at
    /// application shutdown. `reconcile()` stays public so tests drive the
    /// tick directly.
    pub fn spawn_reconciler(self: Arc<Self>, cancel: CancellationToken) -> JoinHandle<()>
    where
        S: 'static,
    {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(RECONCILE_INTERVAL);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    _ = ticker.tick() => self.reconcile().await,
                    _ = cancel.cancelled() => {
                        info!("reconciler shutting down");
                        break;
                    }
                }
            }
        })
    }

    /// Replace-on-write update. Terminal records are immutable: an update
    /// arriving after a record moved on (stale in-flight result) is
    /// discarded here, which is the check-before-apply step. The applied
    /// transition is mirrored to persistence best-effort.
    async fn apply_update(&self, track_id: &str, update: TrackUpdate) -> Option<Track> {
        let applied = {
            let mut tracks = self.tracks.lock().await;
            let record = tracks.iter_mut().find(|t| t.id == track_id)?;
            if record.status.is_terminal() {
                return None;
            }
            let next = record.apply(&update);
            *record = next.clone();
            next
        };

        if let Err(err) = self.db.update_track(track_id, &update).await {
            error!("failed to persist update for track {track_id}: {err:#}");
        }
        Some(applied)
    }
}
