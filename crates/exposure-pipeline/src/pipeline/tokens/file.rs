use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::domain::{ExposureToken, TokenId, TokenStatus};
use super::store::{IngestOutcome, StoreError, TokenStore};
use super::table::TokenTable;

const SNAPSHOT_VERSION: u32 = 1;

#[derive(Debug, Serialize, Deserialize)]
struct Snapshot {
    version: u32,
    tokens: Vec<ExposureToken>,
}

/// Durable token store: a JSON snapshot rewritten via temp-file-then-rename
/// after every mutation. Leases never reach disk, so tokens mid-evaluation
/// at process death come back claimable.
#[derive(Debug)]
pub struct FileTokenStore {
    path: PathBuf,
    table: Mutex<TokenTable>,
}

impl FileTokenStore {
    /// Open (or create) the snapshot at `dir/tokens.json`.
    pub fn open(dir: &Path) -> Result<Self, StoreError> {
        fs::create_dir_all(dir)
            .map_err(|err| StoreError::Unavailable(format!("create {}: {err}", dir.display())))?;
        let path = dir.join("tokens.json");

        let table = if path.exists() {
            let raw = fs::read_to_string(&path)
                .map_err(|err| StoreError::Unavailable(format!("read {}: {err}", path.display())))?;
            let snapshot: Snapshot = serde_json::from_str(&raw)
                .map_err(|err| StoreError::Corrupt(format!("{}: {err}", path.display())))?;
            if snapshot.version != SNAPSHOT_VERSION {
                return Err(StoreError::Corrupt(format!(
                    "{}: unsupported snapshot version {}",
                    path.display(),
                    snapshot.version
                )));
            }
            TokenTable::from_tokens(snapshot.tokens)
        } else {
            TokenTable::default()
        };

        Ok(Self {
            path,
            table: Mutex::new(table),
        })
    }

    fn persist(&self, table: &TokenTable) -> Result<(), StoreError> {
        let snapshot = Snapshot {
            version: SNAPSHOT_VERSION,
            tokens: table.tokens(),
        };
        let raw = serde_json::to_vec_pretty(&snapshot)
            .map_err(|err| StoreError::Corrupt(format!("serialize snapshot: {err}")))?;
        let tmp = self.path.with_extension("json.tmp");
        fs::write(&tmp, raw)
            .map_err(|err| StoreError::Unavailable(format!("write {}: {err}", tmp.display())))?;
        fs::rename(&tmp, &self.path).map_err(|err| {
            StoreError::Unavailable(format!("rename into {}: {err}", self.path.display()))
        })
    }
}

impl TokenStore for FileTokenStore {
    fn ingest(
        &self,
        id: TokenId,
        received_at: DateTime<Utc>,
        reingest_failed: bool,
    ) -> Result<IngestOutcome, StoreError> {
        let mut table = self.table.lock().expect("token table mutex poisoned");
        let outcome = table.ingest(id, received_at, reingest_failed);
        if !matches!(outcome, IngestOutcome::DuplicateSuppressed(_)) {
            self.persist(&table)?;
        }
        Ok(outcome)
    }

    fn claim(&self, id: &TokenId) -> Result<Option<ExposureToken>, StoreError> {
        let mut table = self.table.lock().expect("token table mutex poisoned");
        let claimed = table.claim(id);
        if claimed.is_some() {
            self.persist(&table)?;
        }
        Ok(claimed)
    }

    fn record_attempt(&self, id: &TokenId) -> Result<u32, StoreError> {
        let mut table = self.table.lock().expect("token table mutex poisoned");
        let attempts = table.record_attempt(id)?;
        self.persist(&table)?;
        Ok(attempts)
    }

    fn complete(&self, id: &TokenId) -> Result<(), StoreError> {
        let mut table = self.table.lock().expect("token table mutex poisoned");
        table.finish(id, TokenStatus::Completed)?;
        self.persist(&table)
    }

    fn fail(&self, id: &TokenId) -> Result<(), StoreError> {
        let mut table = self.table.lock().expect("token table mutex poisoned");
        table.finish(id, TokenStatus::Failed)?;
        self.persist(&table)
    }

    fn release(&self, id: &TokenId) -> Result<(), StoreError> {
        // Lease state is memory-only; nothing to persist.
        let mut table = self.table.lock().expect("token table mutex poisoned");
        table.release(id)
    }

    fn requeue_failed(&self) -> Result<Vec<TokenId>, StoreError> {
        let mut table = self.table.lock().expect("token table mutex poisoned");
        let requeued = table.requeue_failed();
        if !requeued.is_empty() {
            self.persist(&table)?;
        }
        Ok(requeued)
    }

    fn pending_backlog(&self) -> Result<Vec<TokenId>, StoreError> {
        let table = self.table.lock().expect("token table mutex poisoned");
        Ok(table.pending_backlog())
    }

    fn get(&self, id: &TokenId) -> Result<Option<ExposureToken>, StoreError> {
        let table = self.table.lock().expect("token table mutex poisoned");
        Ok(table.get(id))
    }

    fn snapshot(&self) -> Result<Vec<ExposureToken>, StoreError> {
        let table = self.table.lock().expect("token table mutex poisoned");
        Ok(table.snapshot())
    }
}
