use directories::ProjectDirs;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone)]
pub struct SyncPaths {
    pub runtime_directory: PathBuf,
    pub records_path: PathBuf,
    pub variables_path: PathBuf,
    pub settings_path: PathBuf,
    pub log_directory: PathBuf,
}

impl SyncPaths {
    pub fn detect() -> Self {
        if let Ok(override_dir) = std::env::var("DIRSYNC_RUNTIME_DIR") {
            if !override_dir.trim().is_empty() {
                return Self::from_runtime(PathBuf::from(override_dir));
            }
        }

        if let Some(project_dirs) = ProjectDirs::from("dev", "dirsync", "DirSync") {
            return Self::from_runtime(project_dirs.data_dir().to_path_buf());
        }

        if let Some(home) = home_dir() {
            return Self::from_runtime(home.join(".dirsync"));
        }

        Self::from_runtime(PathBuf::from(".dirsync"))
    }

    pub fn from_runtime(runtime_directory: PathBuf) -> Self {
        let records_path = runtime_directory.join("sync.json");
        let variables_path = runtime_directory.join("vars.json");
        let settings_path = runtime_directory.join("settings.json");
        let log_directory = runtime_directory.join("logs");
        Self {
            runtime_directory,
            records_path,
            variables_path,
            settings_path,
            log_directory,
        }
    }

    pub fn ensure_runtime_dir(&self) -> Result<(), std::io::Error> {
        std::fs::create_dir_all(&self.runtime_directory)
    }
}

pub fn home_dir() -> Option<PathBuf> {
    std::env::var_os("HOME")
        .map(PathBuf::from)
        .or_else(|| directories::BaseDirs::new().map(|d| d.home_dir().to_path_buf()))
}

/// Canonicalizes when the path exists, otherwise returns it unchanged.
pub fn standardized(path: &Path) -> PathBuf {
    std::fs::canonicalize(path).unwrap_or_else(|_| path.to_path_buf())
}
