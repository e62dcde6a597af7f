pub mod app;
pub mod copy;
pub mod error;
pub mod log;
pub mod paths;
pub mod queue;
pub mod record;
pub mod registry;
pub mod settings;
pub mod template;
pub mod variables;
pub mod watch;

pub use app::SyncApp;
pub use copy::{humanize_size, CopyExecutor, CopyJob};
pub use error::SyncError;
pub use log::{LogBook, LogEntry, LogId, LogLevel, LogSink};
pub use paths::SyncPaths;
pub use queue::TaskQueue;
pub use record::{SyncRecord, SyncRecordDto};
pub use registry::SyncRegistry;
pub use settings::{AppSettings, SettingsStore, DEFAULT_MAX_CONCURRENCY};
pub use template::PathTemplate;
pub use variables::{Variable, VariableStore};
pub use watch::{
    NotifyBackend, WatchBackend, WatchEvent, WatchGuard, WatchHandler, WatchKind, WatchMode,
};
