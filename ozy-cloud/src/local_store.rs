//! Per-user records kept on the local device.
//!
//! Holds the last file selection and the last identity for each user so a
//! returning user lands back on their document without picking it again.

use crate::error::{CloudError, CloudResult};
use crate::types::{FileSelection, Identity};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tracing::debug;

/// Storage for per-user identity and file-selection records.
pub trait LocalStore: Send + Sync {
    fn load_identity(&self, user_id: &str) -> CloudResult<Option<Identity>>;
    fn save_identity(&self, identity: &Identity) -> CloudResult<()>;
    fn load_file_selection(&self, user_id: &str) -> CloudResult<Option<FileSelection>>;
    fn save_file_selection(&self, user_id: &str, selection: &FileSelection) -> CloudResult<()>;

    /// Removes one user's identity and file selection, or every record when
    /// `user_id` is `None`.
    fn clear(&self, user_id: Option<&str>) -> CloudResult<()>;
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
struct UserRecord {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    identity: Option<Identity>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    file: Option<FileSelection>,
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct Records {
    users: BTreeMap<String, UserRecord>,
}

impl Records {
    fn clear(&mut self, user_id: Option<&str>) {
        match user_id {
            Some(id) => {
                self.users.remove(id);
            }
            None => self.users.clear(),
        }
    }
}

fn poisoned<T>(_: T) -> CloudError {
    CloudError::Storage("local store lock poisoned".to_string())
}

// ── In-memory ──

/// Process-local store, used by tests and hosts without a disk.
#[derive(Debug, Default)]
pub struct MemoryStore {
    records: Mutex<Records>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl LocalStore for MemoryStore {
    fn load_identity(&self, user_id: &str) -> CloudResult<Option<Identity>> {
        let records = self.records.lock().map_err(poisoned)?;
        Ok(records.users.get(user_id).and_then(|r| r.identity.clone()))
    }

    fn save_identity(&self, identity: &Identity) -> CloudResult<()> {
        let mut records = self.records.lock().map_err(poisoned)?;
        records
            .users
            .entry(identity.user_id.clone())
            .or_default()
            .identity = Some(identity.clone());
        Ok(())
    }

    fn load_file_selection(&self, user_id: &str) -> CloudResult<Option<FileSelection>> {
        let records = self.records.lock().map_err(poisoned)?;
        Ok(records.users.get(user_id).and_then(|r| r.file.clone()))
    }

    fn save_file_selection(&self, user_id: &str, selection: &FileSelection) -> CloudResult<()> {
        let mut records = self.records.lock().map_err(poisoned)?;
        records.users.entry(user_id.to_string()).or_default().file = Some(selection.clone());
        Ok(())
    }

    fn clear(&self, user_id: Option<&str>) -> CloudResult<()> {
        self.records.lock().map_err(poisoned)?.clear(user_id);
        Ok(())
    }
}

// ── JSON file ──

/// Stores every record in one JSON file.
///
/// Each write goes to a sibling temp file which is then renamed over the
/// target, so a crash never leaves a half-written file behind.
#[derive(Debug)]
pub struct JsonFileStore {
    path: PathBuf,
    records: Mutex<Records>,
}

impl JsonFileStore {
    /// Opens the store at `path`, starting empty if the file does not exist.
    pub fn open(path: impl Into<PathBuf>) -> CloudResult<Self> {
        let path = path.into();
        let records = match std::fs::read_to_string(&path) {
            Ok(raw) => serde_json::from_str(&raw)?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Records::default(),
            Err(e) => {
                return Err(CloudError::Storage(format!(
                    "reading {}: {e}",
                    path.display()
                )));
            }
        };
        debug!("opened local store at {}", path.display());
        Ok(Self {
            path,
            records: Mutex::new(records),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn persist(&self, records: &Records) -> CloudResult<()> {
        let json = serde_json::to_vec_pretty(records)?;
        let tmp = self.path.with_extension("tmp");
        std::fs::write(&tmp, json)
            .map_err(|e| CloudError::Storage(format!("writing {}: {e}", tmp.display())))?;
        std::fs::rename(&tmp, &self.path)
            .map_err(|e| CloudError::Storage(format!("replacing {}: {e}", self.path.display())))
    }

    fn update(&self, f: impl FnOnce(&mut Records)) -> CloudResult<()> {
        let mut records = self.records.lock().map_err(poisoned)?;
        f(&mut records);
        self.persist(&records)
    }
}

impl LocalStore for JsonFileStore {
    fn load_identity(&self, user_id: &str) -> CloudResult<Option<Identity>> {
        let records = self.records.lock().map_err(poisoned)?;
        Ok(records.users.get(user_id).and_then(|r| r.identity.clone()))
    }

    fn save_identity(&self, identity: &Identity) -> CloudResult<()> {
        self.update(|records| {
            records
                .users
                .entry(identity.user_id.clone())
                .or_default()
                .identity = Some(identity.clone());
        })
    }

    fn load_file_selection(&self, user_id: &str) -> CloudResult<Option<FileSelection>> {
        let records = self.records.lock().map_err(poisoned)?;
        Ok(records.users.get(user_id).and_then(|r| r.file.clone()))
    }

    fn save_file_selection(&self, user_id: &str, selection: &FileSelection) -> CloudResult<()> {
        self.update(|records| {
            records.users.entry(user_id.to_string()).or_default().file = Some(selection.clone());
        })
    }

    fn clear(&self, user_id: Option<&str>) -> CloudResult<()> {
        self.update(|records| records.clear(user_id))
    }
}
