use crate::copy::CopyExecutor;
use crate::error::SyncError;
use crate::log::{LogBook, LogSink};
use crate::paths::SyncPaths;
use crate::registry::SyncRegistry;
use crate::settings::{AppSettings, SettingsStore};
use crate::variables::VariableStore;
use crate::watch::{NotifyBackend, WatchBackend};
use std::sync::Arc;

/// Explicitly constructed application context: wires the store, the
/// executor, and the registry together and owns one instance of each
/// per process.
pub struct SyncApp {
    paths: SyncPaths,
    settings_store: SettingsStore,
    pub settings: AppSettings,
    pub variables: VariableStore,
    pub executor: CopyExecutor,
    pub registry: SyncRegistry,
    pub log: LogBook,
}

impl SyncApp {
    pub fn open(paths: SyncPaths) -> Result<Self, SyncError> {
        Self::open_with_backend(paths, Arc::new(NotifyBackend::default()))
    }

    pub fn open_with_backend(
        paths: SyncPaths,
        backend: Arc<dyn WatchBackend>,
    ) -> Result<Self, SyncError> {
        paths
            .ensure_runtime_dir()
            .map_err(|e| SyncError::io(&paths.runtime_directory, e))?;

        let settings_store = SettingsStore::new(paths.clone());
        let settings = settings_store.load_settings();

        let log = if settings.save_logs {
            LogBook::with_file(&paths.log_directory)
        } else {
            LogBook::new()
        };
        let sink: Arc<dyn LogSink> = Arc::new(log.clone());

        let variables = VariableStore::new(&paths.variables_path);
        variables.ensure_file()?;
        variables.load()?;

        let executor = CopyExecutor::new(
            settings.max_concurrency,
            settings.old_suffix.clone(),
            vec![paths.runtime_directory.clone()],
            Arc::clone(&sink),
        );

        let mut registry = SyncRegistry::new(
            &paths.records_path,
            variables.clone(),
            executor.clone(),
            backend,
            sink,
        );
        registry.ensure_file()?;
        registry.load()?;

        Ok(Self {
            paths,
            settings_store,
            settings,
            variables,
            executor,
            registry,
            log,
        })
    }

    pub fn paths(&self) -> &SyncPaths {
        &self.paths
    }

    /// Applies to the next scheduling decision; in-flight copies finish
    /// under the old limit.
    pub fn set_max_concurrency(&mut self, max_concurrency: usize) -> Result<(), SyncError> {
        self.settings.max_concurrency = max_concurrency;
        self.settings_store.save_settings(&self.settings)?;
        self.executor.set_max_concurrency(max_concurrency);
        Ok(())
    }

    pub fn save_settings(&self) -> Result<(), SyncError> {
        self.settings_store.save_settings(&self.settings)
    }
}
