//! SQLite persistence behind a dedicated worker thread. All access goes
//! through `execute`, which ships a closure to the thread owning the
//! connection and awaits the result over a oneshot channel.

use std::{
    path::{Path, PathBuf},
    sync::{mpsc, Arc, Mutex},
    thread::{self, JoinHandle},
};

use anyhow::{anyhow, Context, Result};
use chrono::{DateTime, Utc};
use log::{error, info};
use rusqlite::{params, Connection, Row};
use tokio::sync::oneshot;

mod migrations;

use migrations::run_migrations;

use crate::generation::job::{JobStatus, Track, TrackUpdate};
use crate::tracker::state::SessionSnapshot;

type DbTask = Box<dyn FnOnce(&mut Connection) + Send + 'static>;

enum DbCommand {
    Execute(DbTask),
    Shutdown,
}

struct DatabaseInner {
    sender: mpsc::Sender<DbCommand>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl Drop for DatabaseInner {
    fn drop(&mut self) {
        let mut guard = match self.worker.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };

        if let Some(handle) = guard.take() {
            if let Err(err) = self.sender.send(DbCommand::Shutdown) {
                error!("Failed to send shutdown to DB thread: {err}");
            }
            if let Err(join_err) = handle.join() {
                error!("Failed to join DB thread: {join_err:?}");
            }
        }
    }
}

fn parse_datetime(value: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|err| anyhow!("invalid datetime '{value}': {err}"))
}

fn row_to_track(row: &Row<'_>) -> Result<Track> {
    let tags_json: String = row.get(11)?;
    let tags: Vec<String> = serde_json::from_str(&tags_json)
        .with_context(|| format!("invalid tags payload '{tags_json}'"))?;

    Ok(Track {
        id: row.get(0)?,
        session_id: row.get(1)?,
        title: row.get(2)?,
        prompt: row.get(3)?,
        job_id: row.get(4)?,
        status: JobStatus::from_str(&row.get::<_, String>(5)?)?,
        audio_url: row.get(6)?,
        image_url: row.get(7)?,
        genre: row.get(8)?,
        mood: row.get(9)?,
        bpm: row.get::<_, i64>(10)?.max(0) as u32,
        tags,
        favorite: row.get::<_, i64>(12)? != 0,
        created_at: parse_datetime(&row.get::<_, String>(13)?)?,
    })
}

const TRACK_COLUMNS: &str = "id, session_id, title, prompt, job_id, status, audio_url, image_url, \
                             genre, mood, bpm, tags, favorite, created_at";

#[derive(Clone)]
pub struct Database {
    inner: Arc<DatabaseInner>,
    db_path: Arc<PathBuf>,
}

impl Database {
    pub fn new(db_path: PathBuf) -> Result<Self> {
        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent).with_context(|| {
                format!("failed to create database directory {}", parent.display())
            })?;
        }

        let (command_tx, command_rx) = mpsc::channel::<DbCommand>();
        let (ready_tx, ready_rx) = mpsc::channel();
        let path_for_thread = db_path.clone();

        let worker = thread::Builder::new()
            .name("soundwalk-db".into())
            .spawn(move || {
                let mut conn = match Connection::open(&path_for_thread) {
                    Ok(connection) => connection,
                    Err(err) => {
                        let _ = ready_tx.send(Err(anyhow::Error::new(err)
                            .context("failed to open SQLite database")));
                        return;
                    }
                };

                if let Err(err) = conn.pragma_update(None, "journal_mode", "WAL") {
                    error!("Failed to enable WAL mode: {err}");
                }
                if let Err(err) = conn.pragma_update(None, "foreign_keys", "ON") {
                    error!("Failed to enable foreign keys: {err}");
                }

                let init_result =
                    run_migrations(&mut conn).context("failed to run database migrations");
                if ready_tx.send(init_result).is_err() {
                    error!("DB initialization receiver dropped before ready signal");
                    return;
                }

                while let Ok(command) = command_rx.recv() {
                    match command {
                        DbCommand::Execute(task) => {
                            task(&mut conn);
                        }
                        DbCommand::Shutdown => break,
                    }
                }

                info!("Database thread shutting down");
            })
            .with_context(|| "failed to spawn database worker thread")?;

        ready_rx
            .recv()
            .context("database worker exited before signaling readiness")??;

        info!("Database initialized at {}", db_path.as_path().display());

        Ok(Self {
            inner: Arc::new(DatabaseInner {
                sender: command_tx,
                worker: Mutex::new(Some(worker)),
            }),
            db_path: Arc::new(db_path),
        })
    }

    pub fn path(&self) -> &Path {
        self.db_path.as_path()
    }

    pub async fn execute<F, T>(&self, task: F) -> Result<T>
    where
        F: FnOnce(&mut Connection) -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let sender = self.inner.sender.clone();
        let (reply_tx, reply_rx) = oneshot::channel();

        let command = DbCommand::Execute(Box::new(move |conn| {
            let result = task(conn);
            if reply_tx.send(result).is_err() {
                error!("DB caller dropped before receiving result");
            }
        }));

        sender
            .send(command)
            .map_err(|err| anyhow!("failed to send command to DB thread: {err}"))?;

        reply_rx
            .await
            .map_err(|_| anyhow!("database thread terminated unexpectedly"))?
    }

    /// Persist a finalized walk. Only the scalar summary is stored; the fix
    /// history stays in memory with the snapshot.
    pub async fn insert_session(&self, snapshot: &SessionSnapshot) -> Result<()> {
        let record = snapshot.clone();
        self.execute(move |conn| {
            conn.execute(
                "INSERT INTO walk_sessions (id, started_at, stopped_at, elapsed_seconds, \
                 distance_m, average_speed_kmh, max_speed_kmh, steps, calories, fix_count, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
                params![
                    record.id,
                    record.start_time.to_rfc3339(),
                    record.end_time.as_ref().map(|dt| dt.to_rfc3339()),
                    record.elapsed_seconds as i64,
                    record.cumulative_distance_m,
                    record.average_speed_kmh,
                    record.max_speed_kmh,
                    record.estimated_steps as i64,
                    record.estimated_calories as i64,
                    record.fix_history.len() as i64,
                    Utc::now().to_rfc3339(),
                ],
            )
            .with_context(|| "failed to insert walk session")?;
            Ok(())
        })
        .await
    }

    pub async fn insert_track(&self, track: &Track) -> Result<()> {
        let record = track.clone();
        self.execute(move |conn| {
            let tags_json = serde_json::to_string(&record.tags)?;
            conn.execute(
                &format!(
                    "INSERT INTO tracks ({TRACK_COLUMNS})
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14)"
                ),
                params![
                    record.id,
                    record.session_id,
                    record.title,
                    record.prompt,
                    record.job_id,
                    record.status.as_str(),
                    record.audio_url,
                    record.image_url,
                    record.genre,
                    record.mood,
                    record.bpm as i64,
                    tags_json,
                    record.favorite as i64,
                    record.created_at.to_rfc3339(),
                ],
            )
            .with_context(|| "failed to insert track")?;
            Ok(())
        })
        .await
    }

    /// Partial update: only the fields present in `update` are written.
    pub async fn update_track(&self, track_id: &str, update: &TrackUpdate) -> Result<()> {
        let track_id = track_id.to_string();
        let update = update.clone();
        self.execute(move |conn| {
            let mut assignments = Vec::new();
            let mut values: Vec<Box<dyn rusqlite::ToSql>> = Vec::new();

            if let Some(status) = update.status {
                assignments.push(format!("status = ?{}", values.len() + 1));
                values.push(Box::new(status.as_str().to_string()));
            }
            if let Some(job_id) = update.job_id {
                assignments.push(format!("job_id = ?{}", values.len() + 1));
                values.push(Box::new(job_id));
            }
            if let Some(title) = update.title {
                assignments.push(format!("title = ?{}", values.len() + 1));
                values.push(Box::new(title));
            }
            if let Some(audio_url) = update.audio_url {
                assignments.push(format!("audio_url = ?{}", values.len() + 1));
                values.push(Box::new(audio_url));
            }
            if let Some(image_url) = update.image_url {
                assignments.push(format!("image_url = ?{}", values.len() + 1));
                values.push(Box::new(image_url));
            }

            if assignments.is_empty() {
                return Ok(());
            }

            let sql = format!(
                "UPDATE tracks SET {} WHERE id = ?{}",
                assignments.join(", "),
                values.len() + 1
            );
            values.push(Box::new(track_id));

            let param_refs: Vec<&dyn rusqlite::ToSql> =
                values.iter().map(|value| value.as_ref()).collect();
            conn.execute(&sql, &param_refs[..])
                .with_context(|| "failed to update track")?;
            Ok(())
        })
        .await
    }

    pub async fn set_favorite(&self, track_id: &str, favorite: bool) -> Result<()> {
        let track_id = track_id.to_string();
        self.execute(move |conn| {
            conn.execute(
                "UPDATE tracks SET favorite = ?1 WHERE id = ?2",
                params![favorite as i64, track_id],
            )
            .with_context(|| "failed to update favorite flag")?;
            Ok(())
        })
        .await
    }

    pub async fn list_tracks(&self) -> Result<Vec<Track>> {
        self.execute(|conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {TRACK_COLUMNS} FROM tracks ORDER BY created_at DESC"
            ))?;

            let mut rows = stmt.query([])?;
            let mut tracks = Vec::new();
            while let Some(row) = rows.next()? {
                tracks.push(row_to_track(row)?);
            }
            Ok(tracks)
        })
        .await
    }

    /// Generating rows left over from an earlier run; the reconciler picks
    /// them back up at startup.
    pub async fn get_incomplete_tracks(&self) -> Result<Vec<Track>> {
        self.execute(|conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {TRACK_COLUMNS} FROM tracks
                 WHERE status = 'Generating' AND job_id IS NOT NULL
                 ORDER BY created_at DESC"
            ))?;

            let mut rows = stmt.query([])?;
            let mut tracks = Vec::new();
            while let Some(row) = rows.next()? {
                tracks.push(row_to_track(row)?);
            }
            Ok(tracks)
        })
        .await
    }
}
