use chrono::{DateTime, SecondsFormat, Utc};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use uuid::Uuid;

pub type LogId = String;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogLevel {
    Info,
    Warning,
    Error,
}

impl LogLevel {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Info => "INFO",
            Self::Warning => "WARNING",
            Self::Error => "ERROR",
        }
    }
}

/// Narrow progress/log capability consumed by the copy executor and the
/// watchers. `append` creates an entry and returns its id; `replace`
/// rewrites the message of an existing entry in place.
pub trait LogSink: Send + Sync {
    fn append(&self, message: &str, level: LogLevel) -> LogId;
    fn replace(&self, id: &LogId, message: &str);
}

#[derive(Debug, Clone)]
pub struct LogEntry {
    pub id: LogId,
    pub message: String,
    pub date: DateTime<Utc>,
    pub level: LogLevel,
}

impl LogEntry {
    pub fn serialize(&self) -> String {
        format!(
            "{} [{}] {}",
            self.date.to_rfc3339_opts(SecondsFormat::Millis, true),
            self.level.as_str(),
            self.message
        )
    }
}

struct LogBookInner {
    entries: Vec<LogEntry>,
    file_path: Option<PathBuf>,
}

/// In-memory log table with optional append-only file, one file per
/// process start.
pub struct LogBook {
    inner: Arc<Mutex<LogBookInner>>,
}

impl Clone for LogBook {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl Default for LogBook {
    fn default() -> Self {
        Self::new()
    }
}

impl LogBook {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Mutex::new(LogBookInner {
                entries: Vec::new(),
                file_path: None,
            })),
        }
    }

    /// Enables appending serialized entries to a fresh file under
    /// `directory`, named from the current timestamp.
    pub fn with_file(directory: &Path) -> Self {
        let stamp: String = Utc::now()
            .to_rfc3339_opts(SecondsFormat::Millis, true)
            .chars()
            .map(|c| match c {
                ':' | '-' | '.' | 'T' => '-',
                other => other,
            })
            .collect();
        let file_path = directory.join(format!("{stamp}.log"));
        Self {
            inner: Arc::new(Mutex::new(LogBookInner {
                entries: Vec::new(),
                file_path: Some(file_path),
            })),
        }
    }

    pub fn tail(&self, count: usize) -> Vec<LogEntry> {
        let inner = self.inner.lock().expect("log book poisoned");
        let skip = inner.entries.len().saturating_sub(count);
        inner.entries[skip..].to_vec()
    }

    pub fn entries(&self) -> Vec<LogEntry> {
        self.inner.lock().expect("log book poisoned").entries.clone()
    }

    fn append_to_file(path: &Path, entry: &LogEntry) {
        let result = (|| -> std::io::Result<()> {
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent)?;
            }
            let mut file = std::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)?;
            writeln!(file, "{}", entry.serialize())
        })();
        if let Err(error) = result {
            tracing::warn!("failed to append log entry to {}: {error}", path.display());
        }
    }
}

impl LogSink for LogBook {
    fn append(&self, message: &str, level: LogLevel) -> LogId {
        let entry = LogEntry {
            id: Uuid::new_v4().to_string(),
            message: message.to_owned(),
            date: Utc::now(),
            level,
        };
        let id = entry.id.clone();
        let mut inner = self.inner.lock().expect("log book poisoned");
        if let Some(path) = inner.file_path.clone() {
            Self::append_to_file(&path, &entry);
        }
        inner.entries.push(entry);
        id
    }

    fn replace(&self, id: &LogId, message: &str) {
        let mut inner = self.inner.lock().expect("log book poisoned");
        if let Some(entry) = inner.entries.iter_mut().find(|entry| entry.id == *id) {
            entry.message = message.to_owned();
        }
    }
}
