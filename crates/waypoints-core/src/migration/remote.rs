//! The migration target: an account-scoped remote store.
//!
//! The pipeline reads the remote items exactly once per attempt and then
//! issues bulk writes. Any transport (and its asynchrony) lives behind the
//! [`RemoteStore`] implementation.

use crate::error::ErrorCode;
use crate::model::{AchievementRecord, DailyBaselineRecord, Item};
use serde::{Deserialize, Serialize};
use std::cell::RefCell;
use std::collections::{BTreeMap, HashSet};
use std::path::{Path, PathBuf};

#[derive(Debug, thiserror::Error)]
pub enum RemoteError {
    #[error("remote store unavailable: {0}")]
    Unavailable(String),

    #[error("failed to access remote file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("remote file {path} is not valid: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

impl RemoteError {
    #[must_use]
    pub const fn code(&self) -> ErrorCode {
        match self {
            Self::Unavailable(_) | Self::Io { .. } => ErrorCode::RemoteUnavailable,
            Self::Parse { .. } => ErrorCode::StorageBackend,
        }
    }
}

/// List/upsert primitives offered by the remote system.
pub trait RemoteStore {
    /// Every item stored for `account_id`, deleted rows included.
    ///
    /// # Errors
    ///
    /// Returns [`RemoteError`] when the remote cannot be read.
    fn list_items(&self, account_id: &str) -> Result<Vec<Item>, RemoteError>;

    /// Insert or replace items by id. Returns the number written.
    ///
    /// # Errors
    ///
    /// Returns [`RemoteError`] when the write fails.
    fn bulk_upsert(&self, account_id: &str, items: &[Item]) -> Result<usize, RemoteError>;

    /// Remove items by id. Returns the number removed.
    ///
    /// # Errors
    ///
    /// Returns [`RemoteError`] when the write fails.
    fn delete_items(&self, account_id: &str, ids: &[String]) -> Result<usize, RemoteError>;

    /// Append ledger and baseline history. Achievements upsert by id;
    /// baselines keep the remote row when the (owner, date) pair exists.
    ///
    /// # Errors
    ///
    /// Returns [`RemoteError`] when the write fails.
    fn upsert_history(
        &self,
        account_id: &str,
        achievements: &[AchievementRecord],
        baselines: &[DailyBaselineRecord],
    ) -> Result<(), RemoteError>;
}

/// One account's remote data.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RemoteAccount {
    pub items: Vec<Item>,
    pub achievements: Vec<AchievementRecord>,
    pub daily_baselines: Vec<DailyBaselineRecord>,
}

impl RemoteAccount {
    fn upsert_items(&mut self, items: &[Item]) -> usize {
        for item in items {
            if let Some(existing) = self.items.iter_mut().find(|i| i.id == item.id) {
                *existing = item.clone();
            } else {
                self.items.push(item.clone());
            }
        }
        items.len()
    }

    fn delete_items(&mut self, ids: &[String]) -> usize {
        let doomed: HashSet<&str> = ids.iter().map(String::as_str).collect();
        let before = self.items.len();
        self.items.retain(|i| !doomed.contains(i.id.as_str()));
        before - self.items.len()
    }

    fn upsert_history(
        &mut self,
        achievements: &[AchievementRecord],
        baselines: &[DailyBaselineRecord],
    ) {
        for record in achievements {
            if let Some(existing) = self.achievements.iter_mut().find(|a| a.id == record.id) {
                *existing = record.clone();
            } else {
                self.achievements.push(record.clone());
            }
        }
        for record in baselines {
            let taken = self
                .daily_baselines
                .iter()
                .any(|b| b.owner_id == record.owner_id && b.date == record.date);
            if !taken {
                self.daily_baselines.push(record.clone());
            }
        }
    }
}

/// In-process remote for tests and embedding.
#[derive(Debug, Default)]
pub struct MemoryRemote {
    accounts: RefCell<BTreeMap<String, RemoteAccount>>,
    unavailable: RefCell<Option<String>>,
}

impl MemoryRemote {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed an account with existing items.
    #[must_use]
    pub fn with_items(self, account_id: &str, items: Vec<Item>) -> Self {
        self.accounts
            .borrow_mut()
            .entry(account_id.to_string())
            .or_default()
            .items = items;
        self
    }

    /// Make every subsequent call fail until cleared with `None`.
    pub fn set_unavailable(&self, reason: Option<&str>) {
        *self.unavailable.borrow_mut() = reason.map(str::to_string);
    }

    #[must_use]
    pub fn account(&self, account_id: &str) -> RemoteAccount {
        self.accounts
            .borrow()
            .get(account_id)
            .cloned()
            .unwrap_or_default()
    }

    fn check(&self) -> Result<(), RemoteError> {
        match self.unavailable.borrow().as_deref() {
            Some(reason) => Err(RemoteError::Unavailable(reason.to_string())),
            None => Ok(()),
        }
    }
}

impl RemoteStore for MemoryRemote {
    fn list_items(&self, account_id: &str) -> Result<Vec<Item>, RemoteError> {
        self.check()?;
        Ok(self.account(account_id).items)
    }

    fn bulk_upsert(&self, account_id: &str, items: &[Item]) -> Result<usize, RemoteError> {
        self.check()?;
        Ok(self
            .accounts
            .borrow_mut()
            .entry(account_id.to_string())
            .or_default()
            .upsert_items(items))
    }

    fn delete_items(&self, account_id: &str, ids: &[String]) -> Result<usize, RemoteError> {
        self.check()?;
        Ok(self
            .accounts
            .borrow_mut()
            .get_mut(account_id)
            .map_or(0, |a| a.delete_items(ids)))
    }

    fn upsert_history(
        &self,
        account_id: &str,
        achievements: &[AchievementRecord],
        baselines: &[DailyBaselineRecord],
    ) -> Result<(), RemoteError> {
        self.check()?;
        self.accounts
            .borrow_mut()
            .entry(account_id.to_string())
            .or_default()
            .upsert_history(achievements, baselines);
        Ok(())
    }
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct RemoteFile {
    #[serde(default)]
    accounts: BTreeMap<String, RemoteAccount>,
}

/// A JSON file standing in for the remote system. A missing file is empty.
#[derive(Debug, Clone)]
pub struct JsonFileRemote {
    path: PathBuf,
}

impl JsonFileRemote {
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn read(&self) -> Result<RemoteFile, RemoteError> {
        match std::fs::read_to_string(&self.path) {
            Ok(raw) if raw.trim().is_empty() => Ok(RemoteFile::default()),
            Ok(raw) => serde_json::from_str(&raw).map_err(|source| RemoteError::Parse {
                path: self.path.clone(),
                source,
            }),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(RemoteFile::default()),
            Err(source) => Err(RemoteError::Io {
                path: self.path.clone(),
                source,
            }),
        }
    }

    fn write(&self, file: &RemoteFile) -> Result<(), RemoteError> {
        let io = |source: std::io::Error| RemoteError::Io {
            path: self.path.clone(),
            source,
        };
        let raw = serde_json::to_string_pretty(file).map_err(|source| RemoteError::Parse {
            path: self.path.clone(),
            source,
        })?;
        if let Some(parent) = self.path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent).map_err(io)?;
        }
        let tmp = self.path.with_extension("json.tmp");
        std::fs::write(&tmp, raw).map_err(io)?;
        std::fs::rename(&tmp, &self.path).map_err(io)
    }

    fn modify<T>(
        &self,
        account_id: &str,
        f: impl FnOnce(&mut RemoteAccount) -> T,
    ) -> Result<T, RemoteError> {
        let mut file = self.read()?;
        let out = f(file.accounts.entry(account_id.to_string()).or_default());
        self.write(&file)?;
        Ok(out)
    }
}

impl RemoteStore for JsonFileRemote {
    fn list_items(&self, account_id: &str) -> Result<Vec<Item>, RemoteError> {
        Ok(self
            .read()?
            .accounts
            .remove(account_id)
            .map(|a| a.items)
            .unwrap_or_default())
    }

    fn bulk_upsert(&self, account_id: &str, items: &[Item]) -> Result<usize, RemoteError> {
        self.modify(account_id, |a| a.upsert_items(items))
    }

    fn delete_items(&self, account_id: &str, ids: &[String]) -> Result<usize, RemoteError> {
        if ids.is_empty() {
            return Ok(0);
        }
        self.modify(account_id, |a| a.delete_items(ids))
    }

    fn upsert_history(
        &self,
        account_id: &str,
        achievements: &[AchievementRecord],
        baselines: &[DailyBaselineRecord],
    ) -> Result<(), RemoteError> {
        self.modify(account_id, |a| a.upsert_history(achievements, baselines))
    }
}
