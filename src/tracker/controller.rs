use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use chrono::Utc;
use log::{error, info, warn};
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::db::Database;
use crate::error::SensorError;
use crate::tracker::aggregator::MotionAggregator;
use crate::tracker::sampler::{FixSource, LocationSampler, SamplerEvent, SamplerOptions};
use crate::tracker::state::{SessionSnapshot, TrackerStatus};

const SNAPSHOT_TICK: Duration = Duration::from_secs(1);

struct WalkState {
    status: TrackerStatus,
    snapshot: Option<SessionSnapshot>,
    aggregator: MotionAggregator,
    sensor_error: Option<SensorError>,
}

impl WalkState {
    fn new() -> Self {
        Self {
            status: TrackerStatus::Idle,
            snapshot: None,
            aggregator: MotionAggregator::new(),
            sensor_error: None,
        }
    }

    /// Recompute the live snapshot from the aggregator. Cheap scalar copies
    /// plus the route history, mirrored so UI reads always see a complete
    /// record.
    fn refresh(&mut self) {
        let now = Utc::now();
        let totals = self.aggregator.totals();
        if let Some(snapshot) = self.snapshot.as_mut() {
            snapshot.elapsed_seconds = snapshot.elapsed_at(now);
            snapshot.cumulative_distance_m = totals.cumulative_distance_m;
            snapshot.current_speed_kmh = totals.current_speed_kmh;
            snapshot.average_speed_kmh = totals.average_speed_kmh;
            snapshot.max_speed_kmh = totals.max_speed_kmh;
            snapshot.estimated_steps = totals.estimated_steps;
            snapshot.estimated_calories = totals.estimated_calories;
            snapshot.elevation_gain_m = totals.elevation_gain_m;
            snapshot.elevation_loss_m = totals.elevation_loss_m;
            snapshot.fix_history = self.aggregator.fix_history().to_vec();
        }
    }
}

/// Orchestrates the sampler and aggregator through the
/// `Idle -> Active -> {Paused <-> Active} -> Stopped` state machine.
#[derive(Clone)]
pub struct SessionController {
    state: Arc<Mutex<WalkState>>,
    sampler: Arc<Mutex<LocationSampler>>,
    walk_loop: Arc<Mutex<Option<(CancellationToken, JoinHandle<()>)>>>,
    db: Database,
}

impl SessionController {
    pub fn new(source: Arc<dyn FixSource>, options: SamplerOptions, db: Database) -> Self {
        Self {
            state: Arc::new(Mutex::new(WalkState::new())),
            sampler: Arc::new(Mutex::new(LocationSampler::new(source, options))),
            walk_loop: Arc::new(Mutex::new(None)),
            db,
        }
    }

    pub async fn status(&self) -> TrackerStatus {
        self.state.lock().await.status
    }

    /// Current live snapshot, refreshed on read so callers between ticks
    /// still see up-to-date totals.
    pub async fn snapshot(&self) -> Option<SessionSnapshot> {
        let mut state = self.state.lock().await;
        if state.status == TrackerStatus::Active {
            state.refresh();
        }
        state.snapshot.clone()
    }

    /// Last error surfaced by the location stream, if any. Sampling halts on
    /// sensor errors; recovery is a manual `stop()`/`start()` cycle.
    pub async fn last_sensor_error(&self) -> Option<SensorError> {
        self.state.lock().await.sensor_error.clone()
    }

    /// Idle/Stopped -> Active. Resets all accumulated state and begins
    /// sampling plus the 1-second snapshot tick.
    pub async fn start(&self) -> Result<SessionSnapshot> {
        {
            let state = self.state.lock().await;
            if matches!(state.status, TrackerStatus::Active | TrackerStatus::Paused) {
                return Err(anyhow!("walk already in progress"));
            }
        }

        let id = format!("walk-{}", Uuid::new_v4());
        let started_at = Utc::now();

        let rx = self
            .sampler
            .lock()
            .await
            .start()
            .context("failed to start location sampling")?;

        let snapshot = {
            let mut state = self.state.lock().await;
            state.aggregator.reset();
            state.sensor_error = None;
            state.snapshot = Some(SessionSnapshot::begin(id.clone(), started_at));
            state.status = TrackerStatus::Active;
            state.snapshot.clone().expect("snapshot just set")
        };

        self.spawn_walk_loop(rx).await;
        info!("walk {id} started");
        Ok(snapshot)
    }

    /// Active -> Paused. Halts sampling and the tick; totals are retained.
    pub async fn pause(&self) -> Result<()> {
        {
            let mut state = self.state.lock().await;
            if state.status != TrackerStatus::Active {
                return Err(anyhow!("no active walk to pause"));
            }
            state.refresh();
            state.status = TrackerStatus::Paused;
        }

        self.sampler.lock().await.stop();
        self.cancel_walk_loop().await;
        info!("walk paused");
        Ok(())
    }

    /// Paused -> Active. Restarts sampling and the tick without resetting
    /// accumulated totals.
    pub async fn resume(&self) -> Result<()> {
        {
            let state = self.state.lock().await;
            if state.status != TrackerStatus::Paused {
                return Err(anyhow!("no paused walk to resume"));
            }
        }

        let rx = self
            .sampler
            .lock()
            .await
            .start()
            .context("failed to resume location sampling")?;

        {
            let mut state = self.state.lock().await;
            state.status = TrackerStatus::Active;
        }

        self.spawn_walk_loop(rx).await;
        info!("walk resumed");
        Ok(())
    }

    /// Any active state -> Stopped. Returns the finalized snapshot, or
    /// `None` when no walk was ever started (not an error).
    pub async fn stop(&self) -> Result<Option<SessionSnapshot>> {
        let final_snapshot = {
            let mut state = self.state.lock().await;
            if !matches!(state.status, TrackerStatus::Active | TrackerStatus::Paused) {
                return Ok(None);
            }

            let stopped_at = Utc::now();
            state.refresh();
            state.status = TrackerStatus::Stopped;

            let snapshot = state.snapshot.as_mut().expect("active walk has a snapshot");
            snapshot.end_time = Some(stopped_at);
            snapshot.elapsed_seconds = snapshot.elapsed_at(stopped_at);
            snapshot.clone()
        };

        self.sampler.lock().await.stop();
        self.cancel_walk_loop().await;

        // Persistence is best-effort; the in-memory record is authoritative.
        if let Err(err) = self.db.insert_session(&final_snapshot).await {
            error!("failed to persist walk {}: {err:#}", final_snapshot.id);
        }

        info!(
            "walk {} stopped after {}s and {:.0}m",
            final_snapshot.id, final_snapshot.elapsed_seconds, final_snapshot.cumulative_distance_m
        );
        Ok(Some(final_snapshot))
    }

    async fn spawn_walk_loop(&self, rx: mpsc::Receiver<SamplerEvent>) {
        let mut guard = self.walk_loop.lock().await;
        if let Some((cancel, handle)) = guard.take() {
            cancel.cancel();
            handle.abort();
        }

        let cancel = CancellationToken::new();
        let handle = tokio::spawn(walk_loop(self.state.clone(), rx, cancel.clone()));
        *guard = Some((cancel, handle));
    }

    async fn cancel_walk_loop(&self) {
        if let Some((cancel, handle)) = self.walk_loop.lock().await.take() {
            cancel.cancel();
            if let Err(err) = handle.await {
                error!("walk loop task failed to join: {err}");
            }
        }
    }
}

async fn walk_loop(
    state: Arc<Mutex<WalkState>>,
    mut rx: mpsc::Receiver<SamplerEvent>,
    cancel: CancellationToken,
) {
    let mut ticker = tokio::time::interval(SNAPSHOT_TICK);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let mut stream_open = true;

    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            event = rx.recv(), if stream_open => match event {
                Some(SamplerEvent::Fix(fix)) => {
                    let mut guard = state.lock().await;
                    if guard.status == TrackerStatus::Active {
                        guard.aggregator.ingest(fix);
                    }
                }
                Some(SamplerEvent::Error(err)) => {
                    warn!("location stream error, sampling halted: {err}");
                    let mut guard = state.lock().await;
                    guard.sensor_error = Some(err);
                    stream_open = false;
                }
                None => {
                    stream_open = false;
                }
            },
            _ = ticker.tick() => {
                let mut guard = state.lock().await;
                if guard.status != TrackerStatus::Active {
                    continue;
                }
                guard.refresh();
            }
        }
    }
}
