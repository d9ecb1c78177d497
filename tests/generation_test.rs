//! Generation lifecycle driven by a scripted service: submissions,
//! the reconciliation sweep and crash recovery through the database.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use uuid::Uuid;

use soundwalk::db::Database;
use soundwalk::error::ServiceError;
use soundwalk::generation::{
    GenerationManager, JobStatus, MusicService, Style, SubmitRequest, TrackResponse,
};

type ServiceResult = Result<Vec<TrackResponse>, ServiceError>;

/// Scripted stand-in for the generation service. Submissions pop queued
/// responses; status checks look up a per-job script.
#[derive(Default)]
struct ScriptedService {
    submissions: Mutex<Vec<ServiceResult>>,
    statuses: Mutex<HashMap<String, ServiceResult>>,
}

impl ScriptedService {
    fn on_submit(&self, result: ServiceResult) {
        self.submissions.lock().unwrap().push(result);
    }

    fn on_status(&self, job_id: &str, result: ServiceResult) {
        self.statuses.lock().unwrap().insert(job_id.into(), result);
    }
}

impl MusicService for ScriptedService {
    async fn generate(&self, _prompt: &str, _instrumental: bool) -> ServiceResult {
        let mut queue = self.submissions.lock().unwrap();
        assert!(!queue.is_empty(), "unexpected generate call");
        queue.remove(0)
    }

    async fn status(&self, job_ids: &[String]) -> ServiceResult {
        let statuses = self.statuses.lock().unwrap();
        match job_ids.first().and_then(|id| statuses.get(id)) {
            Some(result) => result.clone(),
            None => Ok(Vec::new()),
        }
    }
}

fn temp_db() -> Database {
    let dir = std::env::temp_dir().join(format!("soundwalk-test-{}", Uuid::new_v4()));
    Database::new(dir.join("tracks.sqlite3")).expect("database builds")
}

fn manager(service: Arc<ScriptedService>) -> GenerationManager<ScriptedService> {
    GenerationManager::new(service, temp_db())
}

fn request() -> SubmitRequest {
    SubmitRequest {
        prompt: "Create steady, moderate warm afternoon nature-inspired with bird sounds, \
                 music at 80 BPM for walking, inspiring and motivational"
            .into(),
        title: "Walking Track".into(),
        style: Style::Acoustic,
        bpm: 80,
        tags: vec!["walking".into(), "generated".into(), "afternoon".into()],
        instrumental: false,
        session_id: Some("walk-1".into()),
    }
}

fn queued_response(job_id: &str) -> TrackResponse {
    TrackResponse {
        id: job_id.into(),
        title: "Forest Stroll".into(),
        status: "pending".into(),
        ..Default::default()
    }
}

fn completed_response(job_id: &str) -> TrackResponse {
    TrackResponse {
        id: job_id.into(),
        title: "Forest Stroll".into(),
        status: "complete".into(),
        audio_url: Some("https://cdn.example/song.mp3".into()),
        image_url: Some("https://cdn.example/cover.png".into()),
    }
}

#[tokio::test]
async fn accepted_submission_ends_up_generating() {
    let service = Arc::new(ScriptedService::default());
    service.on_submit(Ok(vec![queued_response("job-1")]));
    let manager = manager(service);

    let track = manager.submit(request()).await;
    assert_eq!(track.status, JobStatus::Generating);
    assert_eq!(track.job_id.as_deref(), Some("job-1"));
    assert_eq!(track.title, "Forest Stroll");
    assert_eq!(track.genre, "acoustic");
    assert_eq!(track.mood, "uplifting");
    assert!(manager.last_error().await.is_none());
}

#[tokio::test]
async fn synchronous_audio_goes_straight_to_completed() {
    let service = Arc::new(ScriptedService::default());
    service.on_submit(Ok(vec![completed_response("job-1")]));
    let manager = manager(service);

    let track = manager.submit(request()).await;
    assert_eq!(track.status, JobStatus::Completed);
    assert_eq!(track.audio_url.as_deref(), Some("https://cdn.example/song.mp3"));
    assert_eq!(track.image_url.as_deref(), Some("https://cdn.example/cover.png"));
}

#[tokio::test]
async fn service_failure_fails_the_track_with_a_message() {
    let service = Arc::new(ScriptedService::default());
    service.on_submit(Err(ServiceError::CreditsExhausted));
    let manager = manager(service);

    let track = manager.submit(request()).await;
    assert_eq!(track.status, JobStatus::Failed);
    assert!(track.job_id.is_none());

    let message = manager.last_error().await.expect("message surfaced");
    assert!(message.contains("credits"));

    manager.clear_error().await;
    assert!(manager.last_error().await.is_none());
}

#[tokio::test]
async fn empty_or_id_less_responses_fail_without_retry() {
    let service = Arc::new(ScriptedService::default());
    service.on_submit(Ok(Vec::new()));
    service.on_submit(Ok(vec![TrackResponse::default()]));
    let manager = manager(service);

    let no_tracks = manager.submit(request()).await;
    assert_eq!(no_tracks.status, JobStatus::Failed);

    let no_id = manager.submit(request()).await;
    assert_eq!(no_id.status, JobStatus::Failed);

    // Neither record has a job id, so the sweep has nothing to poll.
    manager.reconcile().await;
    let tracks = manager.tracks().await;
    assert!(tracks.iter().all(|t| t.status == JobStatus::Failed));
}

#[tokio::test]
async fn reconcile_completes_finished_jobs() {
    let service = Arc::new(ScriptedService::default());
    service.on_submit(Ok(vec![queued_response("job-1")]));
    let manager = manager(service.clone());

    let track = manager.submit(request()).await;
    assert_eq!(track.status, JobStatus::Generating);

    service.on_status("job-1", Ok(vec![completed_response("job-1")]));
    manager.reconcile().await;

    let tracks = manager.tracks().await;
    assert_eq!(tracks[0].status, JobStatus::Completed);
    assert_eq!(tracks[0].audio_url.as_deref(), Some("https://cdn.example/song.mp3"));
}

#[tokio::test]
async fn one_failing_status_check_never_aborts_the_sweep() {
    let service = Arc::new(ScriptedService::default());
    service.on_submit(Ok(vec![queued_response("job-1")]));
    service.on_submit(Ok(vec![queued_response("job-2")]));
    let manager = manager(service.clone());

    manager.submit(request()).await;
    manager.submit(request()).await;

    service.on_status("job-1", Err(ServiceError::Generic("boom".into())));
    service.on_status("job-2", Ok(vec![completed_response("job-2")]));
    manager.reconcile().await;

    let tracks = manager.tracks().await;
    let by_job = |id: &str| {
        tracks
            .iter()
            .find(|t| t.job_id.as_deref() == Some(id))
            .expect("track exists")
    };
    // The failing probe leaves its job outstanding for the next sweep.
    assert_eq!(by_job("job-1").status, JobStatus::Generating);
    assert_eq!(by_job("job-2").status, JobStatus::Completed);
}

#[tokio::test]
async fn unrecognized_status_keeps_the_job_outstanding() {
    let service = Arc::new(ScriptedService::default());
    service.on_submit(Ok(vec![queued_response("job-1")]));
    let manager = manager(service.clone());
    manager.submit(request()).await;

    service.on_status(
        "job-1",
        Ok(vec![TrackResponse {
            id: "job-1".into(),
            status: "queued_v2".into(),
            ..Default::default()
        }]),
    );
    manager.reconcile().await;
    assert_eq!(manager.tracks().await[0].status, JobStatus::Generating);

    // Completed without an audio URL is also not final yet.
    service.on_status(
        "job-1",
        Ok(vec![TrackResponse {
            id: "job-1".into(),
            status: "complete".into(),
            ..Default::default()
        }]),
    );
    manager.reconcile().await;
    assert_eq!(manager.tracks().await[0].status, JobStatus::Generating);
}

#[tokio::test]
async fn terminal_records_never_change_again() {
    let service = Arc::new(ScriptedService::default());
    service.on_submit(Ok(vec![queued_response("job-1")]));
    let manager = manager(service.clone());
    manager.submit(request()).await;

    service.on_status(
        "job-1",
        Ok(vec![TrackResponse {
            id: "job-1".into(),
            status: "error".into(),
            ..Default::default()
        }]),
    );
    manager.reconcile().await;
    assert_eq!(manager.tracks().await[0].status, JobStatus::Failed);

    // A late success for the same job is discarded.
    service.on_status("job-1", Ok(vec![completed_response("job-1")]));
    manager.reconcile().await;
    let track = &manager.tracks().await[0];
    assert_eq!(track.status, JobStatus::Failed);
    assert!(track.audio_url.is_none());
}

#[tokio::test]
async fn favorites_toggle_and_unknown_ids_are_rejected() {
    let service = Arc::new(ScriptedService::default());
    service.on_submit(Ok(vec![queued_response("job-1")]));
    let manager = manager(service);

    let track = manager.submit(request()).await;
    assert_eq!(manager.toggle_favorite(&track.id).await, Some(true));
    assert_eq!(manager.toggle_favorite(&track.id).await, Some(false));
    assert_eq!(manager.toggle_favorite("track-missing").await, None);
}

#[tokio::test]
async fn submissions_are_listed_newest_first() {
    let service = Arc::new(ScriptedService::default());
    service.on_submit(Ok(vec![queued_response("job-1")]));
    service.on_submit(Ok(vec![queued_response("job-2")]));
    let manager = manager(service);

    manager.submit(request()).await;
    let second = manager.submit(request()).await;

    let tracks = manager.tracks().await;
    assert_eq!(tracks.len(), 2);
    assert_eq!(tracks[0].id, second.id);
}

#[tokio::test]
async fn outstanding_jobs_survive_a_restart() {
    let service = Arc::new(ScriptedService::default());
    service.on_submit(Ok(vec![queued_response("job-1")]));
    let db = temp_db();

    let track_id = {
        let manager = GenerationManager::new(service.clone(), db.clone());
        manager.submit(request()).await.id
    };

    // A fresh manager over the same database picks the job back up.
    let manager = GenerationManager::new(service.clone(), db);
    assert_eq!(manager.load_outstanding().await.expect("load succeeds"), 1);
    assert_eq!(manager.tracks().await[0].id, track_id);

    service.on_status("job-1", Ok(vec![completed_response("job-1")]));
    manager.reconcile().await;
    assert_eq!(manager.tracks().await[0].status, JobStatus::Completed);
}
