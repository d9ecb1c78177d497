use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::{fs, path::PathBuf, sync::RwLock};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AppSettings {
    /// Submit a generation request automatically when a walk finishes.
    pub auto_generate: bool,
    pub instrumental: bool,
    pub music_duration_secs: u32,
    pub high_accuracy: bool,
}

impl Default for AppSettings {
    fn default() -> Self {
        Self {
            auto_generate: true,
            instrumental: false,
            music_duration_secs: 60,
            high_accuracy: true,
        }
    }
}

pub struct SettingsStore {
    path: PathBuf,
    data: RwLock<AppSettings>,
}

impl SettingsStore {
    pub fn new(path: PathBuf) -> Result<Self> {
        let data = if path.exists() {
            let contents = fs::read_to_string(&path)
                .with_context(|| format!("Failed to read settings from {}", path.display()))?;
            serde_json::from_str(&contents).unwrap_or_default()
        } else {
            AppSettings::default()
        };

        Ok(Self {
            path,
            data: RwLock::new(data),
        })
    }

    pub fn current(&self) -> AppSettings {
        self.data.read().unwrap().clone()
    }

    pub fn update(&self, settings: AppSettings) -> Result<()> {
        {
            let mut guard = self.data.write().unwrap();
            *guard = settings;
            self.persist(&guard)?;
        }
        Ok(())
    }

    fn persist(&self, data: &AppSettings) -> Result<()> {
        let serialized = serde_json::to_string_pretty(data)?;
        fs::write(&self.path, serialized)
            .with_context(|| format!("Failed to write settings to {}", self.path.display()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    #[test]
    fn defaults_apply_when_no_file_exists() {
        let path = std::env::temp_dir().join(format!("soundwalk-settings-{}.json", Uuid::new_v4()));
        let store = SettingsStore::new(path).expect("store builds");
        let settings = store.current();
        assert!(settings.auto_generate);
        assert!(!settings.instrumental);
        assert_eq!(settings.music_duration_secs, 60);
    }

    #[test]
    fn updates_round_trip_through_disk() {
        let path = std::env::temp_dir().join(format!("soundwalk-settings-{}.json", Uuid::new_v4()));
        let store = SettingsStore::new(path.clone()).expect("store builds");

        let mut settings = store.current();
        settings.instrumental = true;
        settings.music_duration_secs = 120;
        store.update(settings).expect("update persists");

        let reloaded = SettingsStore::new(path.clone()).expect("store reloads");
        assert!(reloaded.current().instrumental);
        assert_eq!(reloaded.current().music_duration_secs, 120);

        let _ = fs::remove_file(path);
    }
}
