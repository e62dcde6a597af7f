use crate::error::SyncError;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Variable {
    pub name: String,
    pub value: String,
}

struct StoreInner {
    variables: Vec<Variable>,
    file_path: Option<PathBuf>,
}

/// Process-wide named key/value table consumed by path templates.
/// Mutations persist fire-and-forget; a failed write is logged and the
/// in-memory mutation stands.
pub struct VariableStore {
    inner: Arc<Mutex<StoreInner>>,
}

impl Clone for VariableStore {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl VariableStore {
    pub fn new(file_path: impl Into<PathBuf>) -> Self {
        Self {
            inner: Arc::new(Mutex::new(StoreInner {
                variables: Vec::new(),
                file_path: Some(file_path.into()),
            })),
        }
    }

    pub fn in_memory() -> Self {
        Self {
            inner: Arc::new(Mutex::new(StoreInner {
                variables: Vec::new(),
                file_path: None,
            })),
        }
    }

    /// Writes an empty table if no file exists yet.
    pub fn ensure_file(&self) -> Result<(), SyncError> {
        let inner = self.inner.lock().expect("variable store poisoned");
        let Some(path) = inner.file_path.clone() else {
            return Ok(());
        };
        if path.exists() {
            return Ok(());
        }
        write_table(&path, &inner.variables)
    }

    /// Fails fast on a missing or unparsable file, leaving the current
    /// in-memory table untouched.
    pub fn load(&self) -> Result<(), SyncError> {
        let mut inner = self.inner.lock().expect("variable store poisoned");
        let Some(path) = inner.file_path.clone() else {
            return Ok(());
        };
        let data = std::fs::read(&path).map_err(|e| SyncError::VariablesLoadFailed {
            path: path.clone(),
            reason: e.to_string(),
        })?;
        let variables: Vec<Variable> =
            serde_json::from_slice(&data).map_err(|e| SyncError::VariablesLoadFailed {
                path: path.clone(),
                reason: e.to_string(),
            })?;
        inner.variables = variables;
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<String> {
        self.inner
            .lock()
            .expect("variable store poisoned")
            .variables
            .iter()
            .find(|variable| variable.name == name)
            .map(|variable| variable.value.clone())
    }

    pub fn set(&self, name: &str, value: &str) {
        let mut inner = self.inner.lock().expect("variable store poisoned");
        if let Some(variable) = inner
            .variables
            .iter_mut()
            .find(|variable| variable.name == name)
        {
            variable.value = value.to_owned();
        } else {
            inner.variables.push(Variable {
                name: name.to_owned(),
                value: value.to_owned(),
            });
        }
        persist(&inner);
    }

    /// Seeds a name referenced by a template; existing entries keep
    /// their value.
    pub fn register_if_absent(&self, name: &str, initial: &str) {
        let mut inner = self.inner.lock().expect("variable store poisoned");
        if inner.variables.iter().any(|variable| variable.name == name) {
            return;
        }
        inner.variables.push(Variable {
            name: name.to_owned(),
            value: initial.to_owned(),
        });
        persist(&inner);
    }

    /// Drops every entry whose name is not in `live_names`.
    pub fn prune(&self, live_names: &HashSet<String>) {
        let mut inner = self.inner.lock().expect("variable store poisoned");
        inner
            .variables
            .retain(|variable| live_names.contains(&variable.name));
        persist(&inner);
    }

    pub fn snapshot(&self) -> Vec<Variable> {
        self.inner
            .lock()
            .expect("variable store poisoned")
            .variables
            .clone()
    }
}

fn persist(inner: &StoreInner) {
    let Some(path) = &inner.file_path else {
        return;
    };
    if let Err(error) = write_table(path, &inner.variables) {
        tracing::warn!("failed to persist variables to {}: {error}", path.display());
    }
}

fn write_table(path: &PathBuf, variables: &[Variable]) -> Result<(), SyncError> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).map_err(|e| SyncError::io(parent, e))?;
    }
    let mut payload = serde_json::to_vec_pretty(variables)?;
    payload.push(b'\n');
    std::fs::write(path, payload).map_err(|e| SyncError::io(path, e))
}
