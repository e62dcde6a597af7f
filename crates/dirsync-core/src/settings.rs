use crate::error::SyncError;
use crate::paths::SyncPaths;
use serde::{Deserialize, Serialize};

pub const DEFAULT_MAX_CONCURRENCY: usize = 20;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AppSettings {
    pub version: u32,
    #[serde(default = "default_old_suffix", rename = "old_suffix")]
    pub old_suffix: String,
    #[serde(default = "default_save_logs", rename = "save_logs")]
    pub save_logs: bool,
    #[serde(default = "default_max_concurrency", rename = "max_concurrency")]
    pub max_concurrency: usize,
}

fn default_old_suffix() -> String {
    String::from("old")
}

fn default_save_logs() -> bool {
    true
}

fn default_max_concurrency() -> usize {
    DEFAULT_MAX_CONCURRENCY
}

impl Default for AppSettings {
    fn default() -> Self {
        Self {
            version: 1,
            old_suffix: default_old_suffix(),
            save_logs: default_save_logs(),
            max_concurrency: default_max_concurrency(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct SettingsStore {
    paths: SyncPaths,
}

impl SettingsStore {
    pub fn new(paths: SyncPaths) -> Self {
        Self { paths }
    }

    pub fn load_settings(&self) -> AppSettings {
        let Ok(data) = std::fs::read(&self.paths.settings_path) else {
            return AppSettings::default();
        };

        serde_json::from_slice(&data).unwrap_or_default()
    }

    pub fn save_settings(&self, settings: &AppSettings) -> Result<(), SyncError> {
        self.paths
            .ensure_runtime_dir()
            .map_err(|e| SyncError::io(&self.paths.runtime_directory, e))?;
        let mut payload = serde_json::to_vec_pretty(settings)?;
        payload.push(b'\n');
        std::fs::write(&self.paths.settings_path, payload)
            .map_err(|e| SyncError::io(&self.paths.settings_path, e))
    }

    pub fn paths(&self) -> &SyncPaths {
        &self.paths
    }
}
