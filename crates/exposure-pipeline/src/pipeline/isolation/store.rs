use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use super::domain::IsolationReasons;

/// Persistence seam for the isolation reasons. Implementations only store
/// and load; all interpretation stays in the state machine.
pub trait IsolationStateStore: Send + Sync {
    fn load(&self) -> Result<Option<IsolationReasons>, IsolationStoreError>;
    fn save(&self, reasons: &IsolationReasons) -> Result<(), IsolationStoreError>;
}

#[derive(Debug, thiserror::Error)]
pub enum IsolationStoreError {
    #[error("isolation state unavailable: {0}")]
    Unavailable(String),
    #[error("isolation state corrupt: {0}")]
    Corrupt(String),
}

/// Volatile implementation for tests and the simulation command.
#[derive(Default)]
pub struct MemoryIsolationStore {
    reasons: Mutex<Option<IsolationReasons>>,
}

impl MemoryIsolationStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl IsolationStateStore for MemoryIsolationStore {
    fn load(&self) -> Result<Option<IsolationReasons>, IsolationStoreError> {
        Ok(self.reasons.lock().expect("isolation mutex poisoned").clone())
    }

    fn save(&self, reasons: &IsolationReasons) -> Result<(), IsolationStoreError> {
        *self.reasons.lock().expect("isolation mutex poisoned") = Some(reasons.clone());
        Ok(())
    }
}

/// Durable implementation: `dir/isolation.json`, temp-file-then-rename.
pub struct FileIsolationStore {
    path: PathBuf,
}

impl FileIsolationStore {
    pub fn open(dir: &Path) -> Result<Self, IsolationStoreError> {
        fs::create_dir_all(dir).map_err(|err| {
            IsolationStoreError::Unavailable(format!("create {}: {err}", dir.display()))
        })?;
        Ok(Self {
            path: dir.join("isolation.json"),
        })
    }
}

impl IsolationStateStore for FileIsolationStore {
    fn load(&self) -> Result<Option<IsolationReasons>, IsolationStoreError> {
        if !self.path.exists() {
            return Ok(None);
        }
        let raw = fs::read_to_string(&self.path).map_err(|err| {
            IsolationStoreError::Unavailable(format!("read {}: {err}", self.path.display()))
        })?;
        serde_json::from_str(&raw)
            .map(Some)
            .map_err(|err| IsolationStoreError::Corrupt(format!("{}: {err}", self.path.display())))
    }

    fn save(&self, reasons: &IsolationReasons) -> Result<(), IsolationStoreError> {
        let raw = serde_json::to_vec_pretty(reasons).map_err(|err| {
            IsolationStoreError::Corrupt(format!("serialize isolation state: {err}"))
        })?;
        let tmp = self.path.with_extension("json.tmp");
        fs::write(&tmp, raw).map_err(|err| {
            IsolationStoreError::Unavailable(format!("write {}: {err}", tmp.display()))
        })?;
        fs::rename(&tmp, &self.path).map_err(|err| {
            IsolationStoreError::Unavailable(format!("rename into {}: {err}", self.path.display()))
        })
    }
}
