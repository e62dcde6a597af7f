use crate::error::SyncError;
use notify::{EventKind, RecursiveMode, Watcher};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{mpsc, Arc};
use std::thread;
use std::time::Duration;
use walkdir::WalkDir;

pub const DEFAULT_QUIESCENCE: Duration = Duration::from_millis(500);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WatchKind {
    Created,
    Modified,
    Removed,
}

#[derive(Debug, Clone)]
pub struct WatchEvent {
    pub path: PathBuf,
    pub kind: WatchKind,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WatchMode {
    /// Enumerates existing files as `Created` events, then forwards live
    /// events until none arrive within the quiescence window, then
    /// self-closes.
    Once,
    /// Ignores the initial snapshot and delivers subsequent changes
    /// until the guard is closed.
    Continuous,
}

pub type WatchHandler = Arc<dyn Fn(WatchEvent) + Send + Sync>;

/// Injected filesystem-observation capability: observe a root, deliver
/// change events with kind and path, support one-shot and continuous
/// modes, support graceful close.
pub trait WatchBackend: Send + Sync {
    fn watch(
        &self,
        root: &Path,
        mode: WatchMode,
        handler: WatchHandler,
    ) -> Result<Box<dyn WatchGuard>, SyncError>;
}

/// Handle to a running watch. Closing a continuous watch stops event
/// delivery; a one-shot watch detaches on drop and runs to quiescence
/// unless closed first.
pub trait WatchGuard: Send {
    fn close(&mut self);
}

/// `notify`-backed implementation of the watch capability.
pub struct NotifyBackend {
    quiescence: Duration,
}

impl Default for NotifyBackend {
    fn default() -> Self {
        Self {
            quiescence: DEFAULT_QUIESCENCE,
        }
    }
}

impl NotifyBackend {
    pub fn new(quiescence: Duration) -> Self {
        Self { quiescence }
    }
}

impl WatchBackend for NotifyBackend {
    fn watch(
        &self,
        root: &Path,
        mode: WatchMode,
        handler: WatchHandler,
    ) -> Result<Box<dyn WatchGuard>, SyncError> {
        match mode {
            WatchMode::Continuous => {
                let callback_handler = Arc::clone(&handler);
                let mut watcher =
                    notify::recommended_watcher(move |result: notify::Result<notify::Event>| {
                        if let Ok(event) = result {
                            for mapped in map_event(&event) {
                                callback_handler(mapped);
                            }
                        }
                    })
                    .map_err(|e| SyncError::watch(root, e.to_string()))?;
                watcher
                    .watch(root, RecursiveMode::Recursive)
                    .map_err(|e| SyncError::watch(root, e.to_string()))?;
                Ok(Box::new(ContinuousGuard {
                    watcher: Some(watcher),
                    root: root.to_path_buf(),
                }))
            }
            WatchMode::Once => {
                let (tx, rx) = mpsc::channel();
                let mut watcher = notify::recommended_watcher(
                    move |result: notify::Result<notify::Event>| {
                        let _ = tx.send(result);
                    },
                )
                .map_err(|e| SyncError::watch(root, e.to_string()))?;
                watcher
                    .watch(root, RecursiveMode::Recursive)
                    .map_err(|e| SyncError::watch(root, e.to_string()))?;

                let stop = Arc::new(AtomicBool::new(false));
                let thread_stop = Arc::clone(&stop);
                let root = root.to_path_buf();
                let quiescence = self.quiescence;
                thread::spawn(move || {
                    // Watcher stays alive until this thread settles.
                    let _watcher = watcher;
                    for entry in WalkDir::new(&root).into_iter().filter_map(Result::ok) {
                        if thread_stop.load(Ordering::Relaxed) {
                            return;
                        }
                        if entry.file_type().is_file() {
                            handler(WatchEvent {
                                path: entry.into_path(),
                                kind: WatchKind::Created,
                            });
                        }
                    }
                    loop {
                        if thread_stop.load(Ordering::Relaxed) {
                            return;
                        }
                        match rx.recv_timeout(quiescence) {
                            Ok(Ok(event)) => {
                                for mapped in map_event(&event) {
                                    handler(mapped);
                                }
                            }
                            Ok(Err(_)) => {}
                            Err(_) => return,
                        }
                    }
                });
                Ok(Box::new(OnceGuard { stop }))
            }
        }
    }
}

struct ContinuousGuard {
    watcher: Option<notify::RecommendedWatcher>,
    root: PathBuf,
}

impl WatchGuard for ContinuousGuard {
    fn close(&mut self) {
        if let Some(mut watcher) = self.watcher.take() {
            let _ = watcher.unwatch(&self.root);
        }
    }
}

impl Drop for ContinuousGuard {
    fn drop(&mut self) {
        self.close();
    }
}

struct OnceGuard {
    stop: Arc<AtomicBool>,
}

impl WatchGuard for OnceGuard {
    fn close(&mut self) {
        self.stop.store(true, Ordering::Relaxed);
    }
}

fn map_event(event: &notify::Event) -> Vec<WatchEvent> {
    let kind = match event.kind {
        EventKind::Create(_) => WatchKind::Created,
        EventKind::Modify(_) => WatchKind::Modified,
        EventKind::Remove(_) => WatchKind::Removed,
        EventKind::Any | EventKind::Other => WatchKind::Modified,
        _ => return Vec::new(),
    };
    event
        .paths
        .iter()
        .cloned()
        .map(|path| WatchEvent { path, kind })
        .collect()
}
