//! Walking sessions that end in music. The tracker turns a stream of
//! location fixes into live session metrics; when a walk stops, the
//! generation side synthesizes a prompt from those metrics plus the
//! ambient environment and submits it to an external music service,
//! tracking each job until it completes or fails.

pub mod db;
pub mod environment;
pub mod error;
pub mod generation;
pub mod geo;
pub mod settings;
pub mod tracker;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::Local;
use log::{info, warn};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::db::Database;
use crate::environment::{EnvironmentProvider, WeatherClient};
use crate::generation::client::GenerationClient;
use crate::generation::manager::{GenerationManager, SubmitRequest};
use crate::generation::prompt::{self, WalkShape};
use crate::settings::SettingsStore;
use crate::tracker::controller::SessionController;
use crate::tracker::sampler::{FixSource, SamplerOptions};
use crate::tracker::state::SessionSnapshot;

pub use crate::generation::job::Track;
pub use crate::settings::AppSettings;

const DEFAULT_GENERATION_URL: &str = "http://localhost:3000";
const DB_FILE: &str = "soundwalk.sqlite3";
const SETTINGS_FILE: &str = "settings.json";

pub fn init_logging() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
}

pub struct CoreConfig {
    pub data_dir: PathBuf,
    pub generation_base_url: Option<String>,
    pub weather_api_key: Option<String>,
}

/// Root object wiring the tracker, persistence, environment lookups and the
/// generation lifecycle together. A host embeds one of these and drives it
/// from its UI layer.
pub struct Core {
    settings: SettingsStore,
    tracker: SessionController,
    generation: Arc<GenerationManager<GenerationClient>>,
    environment: EnvironmentProvider,
    db: Database,
    shutdown: CancellationToken,
    reconciler: tokio::sync::Mutex<Option<JoinHandle<()>>>,
}

impl Core {
    pub async fn new(config: CoreConfig, fix_source: Arc<dyn FixSource>) -> Result<Self> {
        std::fs::create_dir_all(&config.data_dir).with_context(|| {
            format!("failed to create data directory {}", config.data_dir.display())
        })?;

        let db = Database::new(config.data_dir.join(DB_FILE))?;
        let settings = SettingsStore::new(config.data_dir.join(SETTINGS_FILE))?;

        let sampler_options = SamplerOptions {
            high_accuracy: settings.current().high_accuracy,
            ..SamplerOptions::default()
        };
        let tracker = SessionController::new(fix_source, sampler_options, db.clone());

        let base_url = config
            .generation_base_url
            .unwrap_or_else(|| DEFAULT_GENERATION_URL.to_string());
        let client = GenerationClient::new(base_url)
            .context("failed to build generation service client")?;
        let generation = Arc::new(GenerationManager::new(Arc::new(client), db.clone()));

        match generation.load_outstanding().await {
            Ok(0) => {}
            Ok(count) => info!("resuming {count} outstanding generation job(s)"),
            Err(err) => warn!("failed to load outstanding jobs: {err:#}"),
        }

        let weather = WeatherClient::new(config.weather_api_key)
            .context("failed to build weather client")?;
        let environment = EnvironmentProvider::new(weather);

        let shutdown = CancellationToken::new();
        let reconciler = generation.clone().spawn_reconciler(shutdown.clone());

        Ok(Self {
            settings,
            tracker,
            generation,
            environment,
            db,
            shutdown,
            reconciler: tokio::sync::Mutex::new(Some(reconciler)),
        })
    }

    pub fn tracker(&self) -> &SessionController {
        &self.tracker
    }

    pub fn generation(&self) -> &GenerationManager<GenerationClient> {
        &self.generation
    }

    pub fn environment(&self) -> &EnvironmentProvider {
        &self.environment
    }

    pub fn settings(&self) -> &SettingsStore {
        &self.settings
    }

    pub fn database(&self) -> &Database {
        &self.db
    }

    /// Stop the current walk and, when auto-generation is on, turn it into a
    /// music request. Returns the finalized session (or `None` when no walk
    /// was running) together with the submitted track, if any.
    pub async fn finish_walk(&self) -> Result<(Option<SessionSnapshot>, Option<Track>)> {
        let Some(snapshot) = self.tracker.stop().await? else {
            return Ok((None, None));
        };

        if !self.settings.current().auto_generate {
            return Ok((Some(snapshot), None));
        }

        let location = snapshot
            .fix_history
            .last()
            .map(|fix| (fix.latitude, fix.longitude));
        let env = self.environment.resolve(location).await;

        let walk = WalkShape {
            average_speed_kmh: snapshot.average_speed_kmh,
            duration_seconds: snapshot.elapsed_seconds,
        };
        let style = prompt::resolve_style(&env);

        let request = SubmitRequest {
            prompt: prompt::build_prompt(&walk, &env),
            title: format!("Walking Track {}", Local::now().format("%Y-%m-%d")),
            style,
            bpm: prompt::target_bpm(walk.average_speed_kmh),
            tags: prompt::derive_tags(&env),
            instrumental: self.settings.current().instrumental,
            session_id: Some(snapshot.id.clone()),
        };

        let track = self.generation.submit(request).await;
        Ok((Some(snapshot), Some(track)))
    }

    /// Cancel background work and wait for it to wind down. Idempotent; the
    /// database worker shuts down when the last `Database` handle drops.
    pub async fn shutdown(&self) {
        self.shutdown.cancel();
        if let Some(handle) = self.reconciler.lock().await.take() {
            if let Err(err) = handle.await {
                warn!("reconciler task failed to join: {err}");
            }
        }
        info!("core shut down");
    }
}
