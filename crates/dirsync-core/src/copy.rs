use crate::error::SyncError;
use crate::log::{LogId, LogLevel, LogSink};
use crate::paths::standardized;
use crate::queue::TaskQueue;
use std::fs::File;
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::{Duration, Instant};

const COPY_CHUNK_SIZE: usize = 64 * 1024;
const PROGRESS_INTERVAL: Duration = Duration::from_millis(200);

/// A resolved copy job. `prevent_rename` marks a busy-retry so a job is
/// renamed aside at most once.
#[derive(Debug, Clone)]
pub struct CopyJob {
    pub source: PathBuf,
    pub destination: PathBuf,
    pub size_hint: Option<u64>,
    pub prevent_rename: bool,
}

impl CopyJob {
    pub fn new(source: impl Into<PathBuf>, destination: impl Into<PathBuf>) -> Self {
        Self {
            source: source.into(),
            destination: destination.into(),
            size_hint: None,
            prevent_rename: false,
        }
    }
}

struct ExecutorInner {
    queue: TaskQueue<CopyJob>,
    sink: Arc<dyn LogSink>,
    protected_roots: Vec<PathBuf>,
    old_suffix: String,
    rename_counter: AtomicU64,
}

/// Runs copy jobs through a bounded queue, reporting progress to the
/// log sink and recovering once per job from a busy destination by
/// renaming the stale file aside.
pub struct CopyExecutor {
    inner: Arc<ExecutorInner>,
}

impl Clone for CopyExecutor {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl CopyExecutor {
    pub fn new(
        max_concurrency: usize,
        old_suffix: impl Into<String>,
        protected_roots: Vec<PathBuf>,
        sink: Arc<dyn LogSink>,
    ) -> Self {
        let protected_roots = protected_roots
            .iter()
            .map(|root| standardized(root))
            .collect();
        let inner = Arc::new_cyclic(|weak: &Weak<ExecutorInner>| {
            let weak = weak.clone();
            let queue = TaskQueue::new(max_concurrency, move |job| {
                if let Some(executor) = weak.upgrade() {
                    run_job(&executor, job);
                }
            });
            ExecutorInner {
                queue,
                sink,
                protected_roots,
                old_suffix: old_suffix.into(),
                rename_counter: AtomicU64::new(1),
            }
        });
        Self { inner }
    }

    pub fn submit(&self, job: CopyJob) {
        self.inner.queue.submit(job);
    }

    pub fn set_max_concurrency(&self, max_concurrency: usize) {
        self.inner.queue.set_max_concurrency(max_concurrency);
    }

    pub fn is_idle(&self) -> bool {
        self.inner.queue.is_idle()
    }
}

fn run_job(inner: &ExecutorInner, job: CopyJob) {
    let source = standardized(&job.source);
    if let Some(prefix) = inner
        .protected_roots
        .iter()
        .find(|root| source.starts_with(root))
    {
        let error = SyncError::ProtectedPath {
            path: job.source.clone(),
            prefix: prefix.clone(),
        };
        inner.sink.append(&error.to_string(), LogLevel::Error);
        return;
    }

    let size = job
        .size_hint
        .or_else(|| std::fs::metadata(&job.source).ok().map(|meta| meta.len()))
        .unwrap_or(0);
    let log_id = inner.sink.append(
        &progress_message(&job.source, &job.destination, 0, size, false),
        LogLevel::Info,
    );

    let mut last_emit = Instant::now();
    let result = copy_with_progress(&job.source, &job.destination, |written| {
        if last_emit.elapsed() >= PROGRESS_INTERVAL {
            last_emit = Instant::now();
            inner.sink.replace(
                &log_id,
                &progress_message(&job.source, &job.destination, written, size, false),
            );
        }
    });

    match result {
        Ok(written) => {
            let total = if size > 0 { size } else { written };
            inner.sink.replace(
                &log_id,
                &progress_message(&job.source, &job.destination, total, total, true),
            );
        }
        Err(error) => handle_failure(inner, job, log_id, error),
    }
}

fn handle_failure(inner: &ExecutorInner, job: CopyJob, log_id: LogId, error: std::io::Error) {
    if !is_busy_error(&error) || job.prevent_rename {
        inner.sink.replace(&log_id, &format!("Error: {error}"));
        return;
    }

    inner.sink.append(
        &format!(
            "File is busy: {}, attempting to rename",
            job.destination.display()
        ),
        LogLevel::Error,
    );
    let counter = inner.rename_counter.fetch_add(1, Ordering::SeqCst);
    let renamed = renamed_aside(&job.destination, &inner.old_suffix, counter);
    match std::fs::rename(&job.destination, &renamed) {
        Ok(()) => {
            inner
                .sink
                .append(&format!("Renamed to {}", renamed.display()), LogLevel::Info);
            inner.queue.submit(CopyJob {
                prevent_rename: true,
                ..job
            });
        }
        Err(rename_error) => {
            inner.sink.append(
                &format!("Failed to rename: {rename_error}"),
                LogLevel::Error,
            );
        }
    }
}

/// EBUSY on Unix; sharing and lock violations on Windows. The raw codes
/// overlap across platforms (32 is EPIPE on Linux), so each set only
/// applies on its own target.
fn is_busy_error(error: &std::io::Error) -> bool {
    if error.kind() == std::io::ErrorKind::ResourceBusy {
        return true;
    }
    #[cfg(windows)]
    {
        matches!(error.raw_os_error(), Some(32) | Some(33))
    }
    #[cfg(not(windows))]
    {
        error.raw_os_error() == Some(16)
    }
}

fn renamed_aside(destination: &Path, suffix: &str, counter: u64) -> PathBuf {
    let mut renamed = destination.as_os_str().to_os_string();
    renamed.push(suffix);
    renamed.push(counter.to_string());
    PathBuf::from(renamed)
}

fn copy_with_progress(
    source: &Path,
    destination: &Path,
    mut on_progress: impl FnMut(u64),
) -> std::io::Result<u64> {
    if let Some(parent) = destination.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let mut reader = File::open(source)?;
    let mut writer = File::create(destination)?;
    let mut buffer = vec![0u8; COPY_CHUNK_SIZE];
    let mut written = 0u64;
    loop {
        let read = reader.read(&mut buffer)?;
        if read == 0 {
            break;
        }
        writer.write_all(&buffer[..read])?;
        written += read as u64;
        on_progress(written);
    }
    writer.flush()?;
    Ok(written)
}

fn progress_message(source: &Path, destination: &Path, written: u64, size: u64, done: bool) -> String {
    let header = format!("Copying {} to {}", source.display(), destination.display());
    let mut percent = if size > 0 {
        ((written as f64 / size as f64) * 100.0).round() as u64
    } else {
        0
    };
    if done {
        percent = 100;
    }
    let progress = format!(
        "({}/{}) {percent}%",
        humanize_size(written),
        humanize_size(size)
    );
    let bar = if written != 0 || done {
        let bar_length = 120usize.saturating_sub(progress.len()).max(10);
        let bar_fill = ((bar_length as f64 * percent as f64) / 100.0).round() as usize;
        let bar_fill = bar_fill.min(bar_length);
        format!("[{}{}]", "#".repeat(bar_fill), "-".repeat(bar_length - bar_fill))
    } else {
        String::new()
    };
    format!("\n{header}\n{progress} {bar}")
}

pub fn humanize_size(size: u64) -> String {
    const THRESHOLD: f64 = 1000.0;
    if (size as f64) < THRESHOLD {
        return format!("{size} B");
    }
    let units = ["kB", "MB", "GB", "TB", "PB", "EB", "ZB", "YB"];
    let mut value = size as f64;
    let mut unit = 0;
    value /= THRESHOLD;
    // Compare at display precision so 999,999 B reads 1.00MB, not
    // 1000.00kB.
    while (value * 100.0).round() / 100.0 >= THRESHOLD && unit < units.len() - 1 {
        value /= THRESHOLD;
        unit += 1;
    }
    format!("{value:.2}{}", units[unit])
}
