use crate::copy::{CopyExecutor, CopyJob};
use crate::error::SyncError;
use crate::paths::standardized;
use crate::template::PathTemplate;
use crate::variables::VariableStore;
use crate::watch::{WatchBackend, WatchEvent, WatchGuard, WatchHandler, WatchKind, WatchMode};
use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use uuid::Uuid;

fn default_color() -> String {
    String::from("#ffffff")
}

/// Persisted/boundary shape of a sync record. `from`/`to` carry the raw
/// (unresolved) path templates. Unknown keys are rejected at the
/// boundary.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct SyncRecordDto {
    #[serde(default)]
    pub id: Option<String>,
    pub from: String,
    pub to: String,
    pub auto_sync: bool,
    #[serde(default)]
    pub last_sync: Option<String>,
    #[serde(default)]
    pub description: String,
    #[serde(default = "default_color")]
    pub color: String,
}

/// A user-declared sync rule: a templated source mirrored to a
/// templated destination, with an optional continuous watcher. The
/// watcher handle lives exactly as long as the loaded record.
pub struct SyncRecord {
    id: String,
    from: PathTemplate,
    to: PathTemplate,
    auto_sync: bool,
    description: String,
    color: String,
    last_sync: Arc<Mutex<DateTime<Utc>>>,
    watcher: Option<Box<dyn WatchGuard>>,
}

impl SyncRecord {
    pub fn from_dto(dto: SyncRecordDto, store: &VariableStore) -> Self {
        let id = dto
            .id
            .filter(|id| !id.trim().is_empty())
            .unwrap_or_else(|| Uuid::new_v4().to_string());
        let last_sync = dto
            .last_sync
            .as_deref()
            .and_then(|raw| DateTime::parse_from_rfc3339(raw).ok())
            .map(|parsed| parsed.with_timezone(&Utc))
            .unwrap_or(DateTime::UNIX_EPOCH);
        Self {
            id,
            from: PathTemplate::new(dto.from, store),
            to: PathTemplate::new(dto.to, store),
            auto_sync: dto.auto_sync,
            description: dto.description,
            color: dto.color,
            last_sync: Arc::new(Mutex::new(last_sync)),
            watcher: None,
        }
    }

    pub fn to_dto(&self) -> SyncRecordDto {
        SyncRecordDto {
            id: Some(self.id.clone()),
            from: self.from.raw().to_owned(),
            to: self.to.raw().to_owned(),
            auto_sync: self.auto_sync,
            last_sync: Some(
                self.last_sync()
                    .to_rfc3339_opts(SecondsFormat::Millis, true),
            ),
            description: self.description.clone(),
            color: self.color.clone(),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn from_template(&self) -> &PathTemplate {
        &self.from
    }

    pub fn to_template(&self) -> &PathTemplate {
        &self.to
    }

    pub fn auto_sync(&self) -> bool {
        self.auto_sync
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    pub fn color(&self) -> &str {
        &self.color
    }

    pub fn last_sync(&self) -> DateTime<Utc> {
        *self.last_sync.lock().expect("last sync poisoned")
    }

    pub fn has_watcher(&self) -> bool {
        self.watcher.is_some()
    }

    /// Display helper: the concrete folder the record currently watches.
    pub fn resolved_source_folder(&self) -> String {
        self.from.resolve()
    }

    pub fn swap_templates(&mut self) {
        std::mem::swap(&mut self.from, &mut self.to);
    }

    /// Opens a one-shot watcher over the resolved source; existing files
    /// and changes observed until quiescence are mirrored, then the
    /// watcher closes itself. Deletions are forwarded as-is (the copy
    /// fails and is reported through the sink).
    pub fn sync_once(
        &self,
        backend: &dyn WatchBackend,
        executor: &CopyExecutor,
    ) -> Result<(), SyncError> {
        let root = PathBuf::from(self.from.resolve());
        let handler = self.copy_handler(root.clone(), executor.clone(), false);
        let _detached = backend.watch(&root, WatchMode::Once, handler)?;
        Ok(())
    }

    /// Idempotent continuous-watch toggle. Enabling while a watcher is
    /// already open or disabling while off is a no-op. Deletions are
    /// never propagated in continuous mode.
    pub fn set_auto_sync(
        &mut self,
        enabled: bool,
        backend: &dyn WatchBackend,
        executor: &CopyExecutor,
    ) -> Result<(), SyncError> {
        if enabled {
            self.auto_sync = true;
            if self.watcher.is_some() {
                return Ok(());
            }
            let root = PathBuf::from(self.from.resolve());
            let handler = self.copy_handler(root.clone(), executor.clone(), true);
            let guard = backend.watch(&root, WatchMode::Continuous, handler)?;
            self.watcher = Some(guard);
        } else {
            self.auto_sync = false;
            if let Some(mut guard) = self.watcher.take() {
                guard.close();
            }
        }
        Ok(())
    }

    pub fn stop_watcher(&mut self) {
        if let Some(mut guard) = self.watcher.take() {
            guard.close();
        }
    }

    fn copy_handler(
        &self,
        root: PathBuf,
        executor: CopyExecutor,
        skip_removed: bool,
    ) -> WatchHandler {
        let to = self.to.clone();
        let last_sync = Arc::clone(&self.last_sync);
        Arc::new(move |event: WatchEvent| {
            if skip_removed && event.kind == WatchKind::Removed {
                return;
            }
            if event.path.is_dir() {
                return;
            }
            *last_sync.lock().expect("last sync poisoned") = Utc::now();
            // Backends may report canonicalized paths (symlinked roots,
            // macOS /private); normalize both sides so nesting survives.
            let event_path = standardized(&event.path);
            let watched_root = standardized(&root);
            let relative = match event_path.strip_prefix(&watched_root) {
                Ok(relative) if !relative.as_os_str().is_empty() => relative.to_path_buf(),
                _ => PathBuf::from(event.path.file_name().unwrap_or_default()),
            };
            let destination = Path::new(&to.resolve()).join(&relative);
            let mut job = CopyJob::new(event.path.clone(), destination);
            job.size_hint = std::fs::metadata(&event.path).ok().map(|meta| meta.len());
            executor.submit(job);
        })
    }
}
