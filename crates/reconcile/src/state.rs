//! Persisted state - one record per live physical resource.
//!
//! The state store is the engine's memory between runs: the planner diffs
//! declared inputs against the stored content hashes, and records whose
//! node id is absent from the current declaration set become orphans,
//! scheduled for deletion.
//!
//! Commits are atomic (temp file plus rename); a lock file serializes
//! concurrent runs against the same store, and a run-scoped [`LockSet`]
//! serializes writers per node id.

use crate::error::{Error, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{BTreeMap, HashSet};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

/// Persisted record of a previously applied resource.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StateRecord {
    /// Logical id of the declared node
    pub node_id: String,
    /// Provider resource kind
    pub type_token: String,
    /// Content hash of the last applied inputs
    pub input_hash: String,
    /// One hash per input property, used to attribute changes when
    /// classifying update-in-place vs replacement
    #[serde(default)]
    pub property_hashes: BTreeMap<String, String>,
    /// Provider-assigned identifier
    pub physical_id: String,
    /// Outputs published by the last applied operation
    #[serde(default)]
    pub outputs: BTreeMap<String, Value>,
    /// Logical ids this node depended on when applied; orders orphan
    /// deletes (dependents before their producers)
    #[serde(default)]
    pub dependencies: Vec<String>,
    pub updated_at: DateTime<Utc>,
}

/// Storage backend for state records.
///
/// Implementations must be safe to share across the executor's workers;
/// per-record write exclusivity is enforced by the run's [`LockSet`].
pub trait StateStore: Send + Sync {
    /// Load every record in the store.
    fn load(&self) -> Result<Vec<StateRecord>>;

    /// Look up a single record by node id.
    fn get(&self, node_id: &str) -> Result<Option<StateRecord>>;

    /// Persist a record. Either the full record lands or none of it.
    fn commit(&self, record: StateRecord) -> Result<()>;

    /// Remove a record after its physical resource was deleted.
    fn remove(&self, node_id: &str) -> Result<()>;

    /// Records whose node id is absent from the current declaration set.
    fn orphans(&self, declared: &HashSet<String>) -> Result<Vec<StateRecord>> {
        Ok(self
            .load()?
            .into_iter()
            .filter(|r| !declared.contains(&r.node_id))
            .collect())
    }
}

// ============================================================================
// File-backed store
// ============================================================================

#[derive(Debug, Default, Serialize, Deserialize)]
struct StateFile {
    version: u32,
    #[serde(default)]
    resources: BTreeMap<String, StateRecord>,
}

const STATE_FORMAT_VERSION: u32 = 1;

/// JSON file-backed state store.
///
/// Reads and writes are serialized within the process; writes go through a
/// temp file and an atomic rename so a crash never leaves a half-written
/// store behind.
#[derive(Debug)]
pub struct FileStateStore {
    path: PathBuf,
    io: Mutex<()>,
    run_lock: Option<RunLock>,
}

impl FileStateStore {
    /// Open a store for read-only use (no run lock taken).
    pub fn open(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            io: Mutex::new(()),
            run_lock: None,
        }
    }

    /// Open a store and take the run lock, serializing concurrent runs.
    ///
    /// Fails with a state conflict if another run holds the lock.
    pub fn open_locked(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let run_lock = RunLock::acquire(&path)?;
        Ok(Self {
            path,
            io: Mutex::new(()),
            run_lock: Some(run_lock),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn is_locked(&self) -> bool {
        self.run_lock.is_some()
    }

    fn read_file(&self) -> Result<StateFile> {
        if !self.path.exists() {
            log::debug!("state file {} does not exist, starting empty", self.path.display());
            return Ok(StateFile {
                version: STATE_FORMAT_VERSION,
                resources: BTreeMap::new(),
            });
        }
        let content = fs::read_to_string(&self.path)?;
        let file: StateFile = serde_json::from_str(&content).map_err(|e| Error::Store {
            message: format!("failed to parse {}: {e}", self.path.display()),
        })?;
        Ok(file)
    }

    fn write_file(&self, file: &StateFile) -> Result<()> {
        if let Some(parent) = self.path.parent()
            && !parent.as_os_str().is_empty()
        {
            fs::create_dir_all(parent)?;
        }
        let content = serde_json::to_string_pretty(file)?;
        let tmp = self.path.with_extension("json.tmp");
        fs::write(&tmp, content)?;
        fs::rename(&tmp, &self.path)?;
        log::debug!("committed state to {}", self.path.display());
        Ok(())
    }
}

impl StateStore for FileStateStore {
    fn load(&self) -> Result<Vec<StateRecord>> {
        let _guard = self.io.lock().unwrap_or_else(|p| p.into_inner());
        Ok(self.read_file()?.resources.into_values().collect())
    }

    fn get(&self, node_id: &str) -> Result<Option<StateRecord>> {
        let _guard = self.io.lock().unwrap_or_else(|p| p.into_inner());
        Ok(self.read_file()?.resources.remove(node_id))
    }

    fn commit(&self, record: StateRecord) -> Result<()> {
        let _guard = self.io.lock().unwrap_or_else(|p| p.into_inner());
        let mut file = self.read_file()?;
        file.version = STATE_FORMAT_VERSION;
        file.resources.insert(record.node_id.clone(), record);
        self.write_file(&file)
    }

    fn remove(&self, node_id: &str) -> Result<()> {
        let _guard = self.io.lock().unwrap_or_else(|p| p.into_inner());
        let mut file = self.read_file()?;
        file.resources.remove(node_id);
        self.write_file(&file)
    }
}

/// Lock file guarding a state store against concurrent runs.
///
/// Removed on drop; a stale lock after a crash must be removed manually
/// (the file records the owning pid to make that diagnosable).
#[derive(Debug)]
struct RunLock {
    path: PathBuf,
}

impl RunLock {
    fn acquire(state_path: &Path) -> Result<Self> {
        let path = state_path.with_extension("json.lock");
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            fs::create_dir_all(parent)?;
        }
        match fs::OpenOptions::new().write(true).create_new(true).open(&path) {
            Ok(mut file) => {
                use std::io::Write;
                let _ = writeln!(file, "{}", std::process::id());
                Ok(Self { path })
            }
            Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {
                Err(Error::StateConflict {
                    message: format!(
                        "another run holds the state lock at {}",
                        path.display()
                    ),
                })
            }
            Err(e) => Err(Error::Io(e)),
        }
    }
}

impl Drop for RunLock {
    fn drop(&mut self) {
        let _ = fs::remove_file(&self.path);
    }
}

// ============================================================================
// In-memory store
// ============================================================================

/// In-memory state store for tests and ephemeral runs.
#[derive(Debug, Default)]
pub struct MemoryStateStore {
    records: Mutex<BTreeMap<String, StateRecord>>,
}

impl MemoryStateStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl StateStore for MemoryStateStore {
    fn load(&self) -> Result<Vec<StateRecord>> {
        let records = self.records.lock().unwrap_or_else(|p| p.into_inner());
        Ok(records.values().cloned().collect())
    }

    fn get(&self, node_id: &str) -> Result<Option<StateRecord>> {
        let records = self.records.lock().unwrap_or_else(|p| p.into_inner());
        Ok(records.get(node_id).cloned())
    }

    fn commit(&self, record: StateRecord) -> Result<()> {
        let mut records = self.records.lock().unwrap_or_else(|p| p.into_inner());
        records.insert(record.node_id.clone(), record);
        Ok(())
    }

    fn remove(&self, node_id: &str) -> Result<()> {
        let mut records = self.records.lock().unwrap_or_else(|p| p.into_inner());
        records.remove(node_id);
        Ok(())
    }
}

// ============================================================================
// Per-node locks
// ============================================================================

/// Run-scoped lock set keyed by node id - one writer per physical resource.
#[derive(Debug, Clone, Default)]
pub struct LockSet {
    held: Arc<Mutex<HashSet<String>>>,
}

impl LockSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Acquire the lock for a node id.
    ///
    /// Contention is a state conflict: the later caller aborts its
    /// operation instead of racing the holder.
    pub fn acquire(&self, node_id: &str) -> Result<NodeLock> {
        let mut held = self.held.lock().unwrap_or_else(|p| p.into_inner());
        if !held.insert(node_id.to_string()) {
            return Err(Error::StateConflict {
                message: format!("record '{node_id}' is locked by another operation"),
            });
        }
        Ok(NodeLock {
            held: Arc::clone(&self.held),
            node_id: node_id.to_string(),
        })
    }
}

/// Guard for a single node's record; released on drop.
#[derive(Debug)]
pub struct NodeLock {
    held: Arc<Mutex<HashSet<String>>>,
    node_id: String,
}

impl Drop for NodeLock {
    fn drop(&mut self) {
        let mut held = self.held.lock().unwrap_or_else(|p| p.into_inner());
        held.remove(&self.node_id);
    }
}
