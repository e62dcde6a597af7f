use dirsync_core::{
    CopyExecutor, LogBook, LogSink, SyncError, SyncRecordDto, SyncRegistry, VariableStore,
    WatchBackend, WatchEvent, WatchGuard, WatchHandler, WatchKind, WatchMode,
};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tempfile::TempDir;

#[derive(Default)]
struct MockBackend {
    opened: AtomicUsize,
    closed: Arc<AtomicUsize>,
}

impl MockBackend {
    fn opened(&self) -> usize {
        self.opened.load(Ordering::SeqCst)
    }

    fn closed(&self) -> usize {
        self.closed.load(Ordering::SeqCst)
    }
}

impl WatchBackend for MockBackend {
    fn watch(
        &self,
        _root: &Path,
        _mode: WatchMode,
        _handler: WatchHandler,
    ) -> Result<Box<dyn WatchGuard>, SyncError> {
        self.opened.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(MockGuard {
            closed: Arc::clone(&self.closed),
            done: false,
        }))
    }
}

struct MockGuard {
    closed: Arc<AtomicUsize>,
    done: bool,
}

impl WatchGuard for MockGuard {
    fn close(&mut self) {
        if !self.done {
            self.done = true;
            self.closed.fetch_add(1, Ordering::SeqCst);
        }
    }
}

impl Drop for MockGuard {
    fn drop(&mut self) {
        self.close();
    }
}

/// Hands the installed watch handler back to the test so events can be
/// delivered directly.
#[derive(Default)]
struct RelayBackend {
    handler: Mutex<Option<WatchHandler>>,
}

impl WatchBackend for RelayBackend {
    fn watch(
        &self,
        _root: &Path,
        _mode: WatchMode,
        handler: WatchHandler,
    ) -> Result<Box<dyn WatchGuard>, SyncError> {
        *self.handler.lock().expect("handler slot") = Some(handler);
        Ok(Box::new(RelayGuard))
    }
}

struct RelayGuard;

impl WatchGuard for RelayGuard {
    fn close(&mut self) {}
}

fn registry_in_temp(temp: &TempDir, backend: Arc<dyn WatchBackend>) -> SyncRegistry {
    let records_path = temp.path().join("sync.json");
    let variables = VariableStore::in_memory();
    let book = LogBook::new();
    let sink: Arc<dyn LogSink> = Arc::new(book);
    let executor = CopyExecutor::new(2, "old", Vec::new(), Arc::clone(&sink));
    SyncRegistry::new(records_path, variables, executor, backend, sink)
}

fn dto(from: &str, to: &str) -> SyncRecordDto {
    SyncRecordDto {
        id: None,
        from: String::from(from),
        to: String::from(to),
        auto_sync: false,
        last_sync: None,
        description: String::new(),
        color: String::from("#336699"),
    }
}

fn records_path(registry_temp: &TempDir) -> PathBuf {
    registry_temp.path().join("sync.json")
}

#[test]
fn record_order_round_trips_through_save_and_load() {
    let temp = TempDir::new().expect("tempdir");
    let backend = Arc::new(MockBackend::default());
    let mut registry = registry_in_temp(&temp, backend.clone());

    let first = registry.add(dto("/src/a", "/dst/a")).expect("add a");
    let second = registry.add(dto("[root]/b", "/dst/b")).expect("add b");
    let third = registry.add(dto("/src/c", "/dst/c")).expect("add c");
    let saved: Vec<SyncRecordDto> = registry
        .records()
        .iter()
        .map(|record| record.to_dto())
        .collect();

    let mut reloaded = registry_in_temp(&temp, backend);
    reloaded.load().expect("load");
    let loaded: Vec<SyncRecordDto> = reloaded
        .records()
        .iter()
        .map(|record| record.to_dto())
        .collect();

    assert_eq!(saved, loaded);
    assert_eq!(
        loaded
            .iter()
            .map(|item| item.id.clone().expect("id"))
            .collect::<Vec<_>>(),
        vec![first, second, third]
    );
    assert_eq!(loaded[1].from, "[root]/b");
}

#[test]
fn move_up_on_first_and_move_down_on_last_are_noops() {
    let temp = TempDir::new().expect("tempdir");
    let mut registry = registry_in_temp(&temp, Arc::new(MockBackend::default()));

    let first = registry.add(dto("/a", "/a2")).expect("add");
    let last = registry.add(dto("/b", "/b2")).expect("add");

    registry.move_up(&first).expect("move up");
    registry.move_down(&last).expect("move down");

    let ids: Vec<&str> = registry.records().iter().map(|r| r.id()).collect();
    assert_eq!(ids, vec![first.as_str(), last.as_str()]);
}

#[test]
fn move_operations_reorder_neighbours() {
    let temp = TempDir::new().expect("tempdir");
    let mut registry = registry_in_temp(&temp, Arc::new(MockBackend::default()));

    let a = registry.add(dto("/a", "/a2")).expect("add");
    let b = registry.add(dto("/b", "/b2")).expect("add");
    let c = registry.add(dto("/c", "/c2")).expect("add");

    registry.move_up(&c).expect("move up");
    let ids: Vec<&str> = registry.records().iter().map(|r| r.id()).collect();
    assert_eq!(ids, vec![a.as_str(), c.as_str(), b.as_str()]);

    registry.move_down(&a).expect("move down");
    let ids: Vec<&str> = registry.records().iter().map(|r| r.id()).collect();
    assert_eq!(ids, vec![c.as_str(), a.as_str(), b.as_str()]);
}

#[test]
fn swap_direction_exchanges_templates_without_touching_identity() {
    let temp = TempDir::new().expect("tempdir");
    let mut registry = registry_in_temp(&temp, Arc::new(MockBackend::default()));

    let id = registry.add(dto("[x]/src", "/dst")).expect("add");
    let before = registry.record(&id).expect("record").to_dto();

    registry.swap_direction(&id).expect("swap");
    let after = registry.record(&id).expect("record").to_dto();

    assert_eq!(after.from, "/dst");
    assert_eq!(after.to, "[x]/src");
    assert_eq!(after.id, before.id);
    assert_eq!(after.last_sync, before.last_sync);
}

#[test]
fn delete_by_unknown_id_reports_not_found_and_leaves_list_unchanged() {
    let temp = TempDir::new().expect("tempdir");
    let mut registry = registry_in_temp(&temp, Arc::new(MockBackend::default()));

    registry.add(dto("/a", "/a2")).expect("add");
    let error = registry.delete_by_id("missing").expect_err("must fail");
    assert!(matches!(error, SyncError::RecordNotFound(_)));
    assert_eq!(registry.records().len(), 1);
}

#[test]
fn replace_by_unknown_id_reports_not_found() {
    let temp = TempDir::new().expect("tempdir");
    let mut registry = registry_in_temp(&temp, Arc::new(MockBackend::default()));

    let error = registry
        .replace_by_id("missing", dto("/a", "/b"))
        .expect_err("must fail");
    assert!(matches!(error, SyncError::RecordNotFound(_)));
}

#[test]
fn replace_keeps_position_and_id() {
    let temp = TempDir::new().expect("tempdir");
    let mut registry = registry_in_temp(&temp, Arc::new(MockBackend::default()));

    let a = registry.add(dto("/a", "/a2")).expect("add");
    let b = registry.add(dto("/b", "/b2")).expect("add");

    registry
        .replace_by_id(&a, dto("/changed", "/changed2"))
        .expect("replace");

    let ids: Vec<&str> = registry.records().iter().map(|r| r.id()).collect();
    assert_eq!(ids, vec![a.as_str(), b.as_str()]);
    assert_eq!(registry.record(&a).expect("record").to_dto().from, "/changed");
}

#[test]
fn duplicate_creates_a_fresh_id_from_the_template_dto() {
    let temp = TempDir::new().expect("tempdir");
    let mut registry = registry_in_temp(&temp, Arc::new(MockBackend::default()));

    let original = registry.add(dto("/a", "/a2")).expect("add");
    let source = registry.record(&original).expect("record").to_dto();
    let copy = registry.duplicate(source.clone()).expect("duplicate");

    assert_ne!(original, copy);
    let duplicated = registry.record(&copy).expect("record").to_dto();
    assert_eq!(duplicated.from, source.from);
    assert_eq!(duplicated.to, source.to);
}

#[test]
fn add_rejects_an_id_that_already_names_a_record() {
    let temp = TempDir::new().expect("tempdir");
    let mut registry = registry_in_temp(&temp, Arc::new(MockBackend::default()));

    let id = registry.add(dto("/a", "/a2")).expect("add");
    let round_tripped = registry.record(&id).expect("record").to_dto();

    let error = registry
        .add(round_tripped)
        .expect_err("clashing id must fail");
    assert!(matches!(error, SyncError::DuplicateRecord(_)));
    assert_eq!(registry.records().len(), 1);

    // The surviving record stays reachable by its id.
    registry.delete_by_id(&id).expect("delete");
    assert!(registry.records().is_empty());
}

#[cfg(unix)]
#[test]
fn canonicalized_event_paths_keep_their_relative_structure() {
    let temp = TempDir::new().expect("tempdir");
    let real_root = temp.path().join("real-root");
    std::fs::create_dir_all(real_root.join("nested")).expect("source tree");
    std::fs::write(real_root.join("nested").join("b.txt"), b"beta").expect("write b");
    let link = temp.path().join("link");
    std::os::unix::fs::symlink(&real_root, &link).expect("symlink root");
    let mirror = temp.path().join("mirror");

    let backend = Arc::new(RelayBackend::default());
    let mut registry = registry_in_temp(&temp, backend.clone());
    let id = registry
        .add(dto(
            link.to_str().expect("utf-8 path"),
            mirror.to_str().expect("utf-8 path"),
        ))
        .expect("add");
    registry.set_auto_sync(&id, true).expect("enable");

    let handler = backend
        .handler
        .lock()
        .expect("handler slot")
        .clone()
        .expect("watcher installed");
    // Watchers report resolved paths when the configured root is a
    // symlink; deliver the event under the canonical root.
    let canonical = std::fs::canonicalize(&real_root).expect("canonical root");
    handler(WatchEvent {
        path: canonical.join("nested").join("b.txt"),
        kind: WatchKind::Created,
    });

    let mirrored = mirror.join("nested").join("b.txt");
    let deadline = Instant::now() + Duration::from_secs(5);
    while !mirrored.exists() && Instant::now() < deadline {
        std::thread::sleep(Duration::from_millis(25));
    }
    assert_eq!(std::fs::read(&mirrored).expect("mirrored file"), b"beta");
    assert!(!mirror.join("b.txt").exists());
}

#[test]
fn toggling_auto_sync_keeps_watcher_handles_balanced() {
    let temp = TempDir::new().expect("tempdir");
    let backend = Arc::new(MockBackend::default());
    let mut registry = registry_in_temp(&temp, backend.clone());

    let id = registry.add(dto("/watched", "/mirror")).expect("add");

    registry.set_auto_sync(&id, true).expect("on");
    registry.set_auto_sync(&id, true).expect("on again is a no-op");
    assert_eq!(backend.opened(), 1);

    registry.set_auto_sync(&id, false).expect("off");
    registry.set_auto_sync(&id, false).expect("off again is a no-op");
    assert_eq!(backend.closed(), backend.opened());

    registry.set_auto_sync(&id, true).expect("on");
    assert_eq!(backend.opened(), 2);
    assert!(registry.record(&id).expect("record").has_watcher());

    registry.delete_by_id(&id).expect("delete closes the watcher");
    assert_eq!(backend.closed(), backend.opened());
}

#[test]
fn load_fails_fast_on_corrupt_file_without_partial_population() {
    let temp = TempDir::new().expect("tempdir");
    let mut registry = registry_in_temp(&temp, Arc::new(MockBackend::default()));
    registry.add(dto("/a", "/a2")).expect("add");

    std::fs::write(records_path(&temp), b"[{ truncated").expect("corrupt file");
    let error = registry.load().expect_err("must fail");
    assert!(matches!(error, SyncError::RecordsLoadFailed { .. }));
    assert_eq!(registry.records().len(), 1);
}

#[test]
fn load_fails_fast_on_missing_file() {
    let temp = TempDir::new().expect("tempdir");
    let mut registry = registry_in_temp(&temp, Arc::new(MockBackend::default()));
    let error = registry.load().expect_err("must fail");
    assert!(matches!(error, SyncError::RecordsLoadFailed { .. }));
}

#[test]
fn dto_rejects_unknown_keys() {
    let payload = r#"{
        "id": "1",
        "from": "/a",
        "to": "/b",
        "autoSync": false,
        "surprise": true
    }"#;
    assert!(serde_json::from_str::<SyncRecordDto>(payload).is_err());
}

#[test]
fn prune_unused_variables_keeps_referenced_names_only() {
    let temp = TempDir::new().expect("tempdir");
    let records_path = temp.path().join("sync.json");
    let variables = VariableStore::in_memory();
    let book = LogBook::new();
    let sink: Arc<dyn LogSink> = Arc::new(book);
    let executor = CopyExecutor::new(2, "old", Vec::new(), Arc::clone(&sink));
    let mut registry = SyncRegistry::new(
        records_path,
        variables.clone(),
        executor,
        Arc::new(MockBackend::default()),
        sink,
    );

    registry.add(dto("[used]/src", "/dst")).expect("add");
    variables.set("orphan", "stale");

    registry.prune_unused_variables();
    assert_eq!(variables.get("used"), Some(String::new()));
    assert_eq!(variables.get("orphan"), None);
}
