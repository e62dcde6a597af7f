use crate::copy::CopyExecutor;
use crate::error::SyncError;
use crate::log::{LogLevel, LogSink};
use crate::record::{SyncRecord, SyncRecordDto};
use crate::variables::VariableStore;
use crate::watch::WatchBackend;
use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::Arc;

/// Owns the ordered list of sync records, their persistence, and the
/// structural operations over them. Record order is significant and
/// survives save/load cycles. Every mutating operation persists the
/// full list.
pub struct SyncRegistry {
    records: Vec<SyncRecord>,
    records_path: PathBuf,
    variables: VariableStore,
    executor: CopyExecutor,
    backend: Arc<dyn WatchBackend>,
    sink: Arc<dyn LogSink>,
}

impl SyncRegistry {
    pub fn new(
        records_path: impl Into<PathBuf>,
        variables: VariableStore,
        executor: CopyExecutor,
        backend: Arc<dyn WatchBackend>,
        sink: Arc<dyn LogSink>,
    ) -> Self {
        Self {
            records: Vec::new(),
            records_path: records_path.into(),
            variables,
            executor,
            backend,
            sink,
        }
    }

    pub fn records(&self) -> &[SyncRecord] {
        &self.records
    }

    pub fn record(&self, id: &str) -> Option<&SyncRecord> {
        self.records.iter().find(|record| record.id() == id)
    }

    /// Writes an empty list if no records file exists yet.
    pub fn ensure_file(&self) -> Result<(), SyncError> {
        if self.records_path.exists() {
            return Ok(());
        }
        self.save()
    }

    /// Fails fast on a missing or unparsable file without touching the
    /// in-memory list. A successful load replaces the records and opens
    /// watchers for auto-sync records; an unwatchable root is reported
    /// through the sink and skipped rather than failing the load.
    pub fn load(&mut self) -> Result<(), SyncError> {
        let data = std::fs::read(&self.records_path).map_err(|e| SyncError::RecordsLoadFailed {
            path: self.records_path.clone(),
            reason: e.to_string(),
        })?;
        let dtos: Vec<SyncRecordDto> =
            serde_json::from_slice(&data).map_err(|e| SyncError::RecordsLoadFailed {
                path: self.records_path.clone(),
                reason: e.to_string(),
            })?;

        for record in &mut self.records {
            record.stop_watcher();
        }
        self.records = dtos
            .into_iter()
            .map(|dto| SyncRecord::from_dto(dto, &self.variables))
            .collect();

        for record in &mut self.records {
            if record.auto_sync() {
                if let Err(error) =
                    record.set_auto_sync(true, self.backend.as_ref(), &self.executor)
                {
                    self.sink.append(
                        &format!("Auto-sync not started for {}: {error}", record.id()),
                        LogLevel::Warning,
                    );
                }
            }
        }
        Ok(())
    }

    pub fn save(&self) -> Result<(), SyncError> {
        if let Some(parent) = self.records_path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| SyncError::io(parent, e))?;
        }
        let dtos: Vec<SyncRecordDto> = self.records.iter().map(SyncRecord::to_dto).collect();
        let mut payload = serde_json::to_vec_pretty(&dtos)?;
        payload.push(b'\n');
        std::fs::write(&self.records_path, payload)
            .map_err(|e| SyncError::io(&self.records_path, e))
    }

    /// Creates a record from the DTO and appends it, returning the new
    /// record's id. A caller-supplied id is kept, but one that already
    /// names a record is rejected: lookups resolve ids by first match,
    /// so a second record under the same id would be unreachable.
    pub fn add(&mut self, dto: SyncRecordDto) -> Result<String, SyncError> {
        if let Some(id) = dto.id.as_deref().filter(|id| !id.trim().is_empty()) {
            if self.record(id).is_some() {
                return Err(SyncError::DuplicateRecord(id.to_owned()));
            }
        }
        let mut record = SyncRecord::from_dto(dto, &self.variables);
        let id = record.id().to_owned();
        if record.auto_sync() {
            if let Err(error) = record.set_auto_sync(true, self.backend.as_ref(), &self.executor) {
                self.sink.append(
                    &format!("Auto-sync not started for {id}: {error}"),
                    LogLevel::Warning,
                );
            }
        }
        self.records.push(record);
        self.save()?;
        Ok(id)
    }

    /// Creates a new record with a fresh id from a template DTO.
    pub fn duplicate(&mut self, mut dto: SyncRecordDto) -> Result<String, SyncError> {
        dto.id = None;
        self.add(dto)
    }

    /// Replaces the record with the given id in place, keeping its list
    /// position. The old watcher is closed; a new one opens if the
    /// replacement has auto-sync enabled.
    pub fn replace_by_id(&mut self, id: &str, mut dto: SyncRecordDto) -> Result<(), SyncError> {
        let index = self.index_of(id)?;
        dto.id = Some(id.to_owned());
        let mut record = SyncRecord::from_dto(dto, &self.variables);
        if record.auto_sync() {
            if let Err(error) = record.set_auto_sync(true, self.backend.as_ref(), &self.executor) {
                self.sink.append(
                    &format!("Auto-sync not started for {id}: {error}"),
                    LogLevel::Warning,
                );
            }
        }
        self.records[index].stop_watcher();
        self.records[index] = record;
        self.save()
    }

    pub fn delete_by_id(&mut self, id: &str) -> Result<(), SyncError> {
        let index = self.index_of(id)?;
        let mut record = self.records.remove(index);
        record.stop_watcher();
        self.save()
    }

    /// Exchanges the source and destination templates; id and lastSync
    /// are untouched. An open auto-sync watcher keeps observing the old
    /// root until toggled.
    pub fn swap_direction(&mut self, id: &str) -> Result<(), SyncError> {
        let index = self.index_of(id)?;
        self.records[index].swap_templates();
        self.save()
    }

    /// No-op when the record is already first.
    pub fn move_up(&mut self, id: &str) -> Result<(), SyncError> {
        let index = self.index_of(id)?;
        if index > 0 {
            self.records.swap(index, index - 1);
        }
        self.save()
    }

    /// No-op when the record is already last.
    pub fn move_down(&mut self, id: &str) -> Result<(), SyncError> {
        let index = self.index_of(id)?;
        if index + 1 < self.records.len() {
            self.records.swap(index, index + 1);
        }
        self.save()
    }

    pub fn sync_once(&self, id: &str) -> Result<(), SyncError> {
        let record = self
            .record(id)
            .ok_or_else(|| SyncError::RecordNotFound(id.to_owned()))?;
        record.sync_once(self.backend.as_ref(), &self.executor)
    }

    pub fn set_auto_sync(&mut self, id: &str, enabled: bool) -> Result<(), SyncError> {
        let index = self.index_of(id)?;
        let backend = Arc::clone(&self.backend);
        let executor = self.executor.clone();
        self.records[index].set_auto_sync(enabled, backend.as_ref(), &executor)?;
        self.save()
    }

    pub fn resolved_source_folder(&self, id: &str) -> Result<String, SyncError> {
        self.record(id)
            .map(SyncRecord::resolved_source_folder)
            .ok_or_else(|| SyncError::RecordNotFound(id.to_owned()))
    }

    /// Drops variables no longer referenced by any live template.
    pub fn prune_unused_variables(&self) {
        let mut live: HashSet<String> = HashSet::new();
        for record in &self.records {
            live.extend(record.from_template().variable_names());
            live.extend(record.to_template().variable_names());
        }
        self.variables.prune(&live);
    }

    fn index_of(&self, id: &str) -> Result<usize, SyncError> {
        self.records
            .iter()
            .position(|record| record.id() == id)
            .ok_or_else(|| SyncError::RecordNotFound(id.to_owned()))
    }
}
