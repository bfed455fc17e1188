//! Persisted migration status: the single-flight guard.
//!
//! ```text
//! pending -> in_progress -> completed   (terminal)
//!                        \-> failed -> (reset) -> pending
//! ```
//!
//! Records live in the migration-status bucket, one per account, so the guard
//! holds across process restarts.

use super::MigrationError;
use crate::clock::Clock;
use crate::store::{Bucket, Store, load_list, save_list};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use tracing::info;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MigrationState {
    Pending,
    InProgress,
    Completed,
    Failed,
}

impl MigrationState {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::InProgress => "in_progress",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }
}

impl fmt::Display for MigrationState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Counts and notes attached to a finished attempt.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct MigrationResult {
    pub items_migrated: usize,
    pub achievements_migrated: usize,
    pub baselines_migrated: usize,
    pub conflicts: usize,
    pub kept_local: usize,
    pub kept_remote: usize,
    pub duplicated: usize,
    pub remote_deleted: usize,
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MigrationStatusRecord {
    pub account_id: String,
    pub state: MigrationState,
    pub attempts: u32,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
    pub error: Option<String>,
    pub result: Option<MigrationResult>,
}

/// State machine over the migration-status bucket.
pub struct MigrationStatusTracker<S: Store> {
    store: S,
    clock: Arc<dyn Clock>,
}

impl<S: Store> fmt::Debug for MigrationStatusTracker<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MigrationStatusTracker").finish_non_exhaustive()
    }
}

impl<S: Store> MigrationStatusTracker<S> {
    pub fn new(store: S, clock: Arc<dyn Clock>) -> Self {
        Self { store, clock }
    }

    fn load(&self) -> Result<Vec<MigrationStatusRecord>, MigrationError> {
        Ok(load_list(&self.store, Bucket::MigrationStatus)?)
    }

    fn save(&self, rows: &[MigrationStatusRecord]) -> Result<(), MigrationError> {
        Ok(save_list(&self.store, Bucket::MigrationStatus, rows)?)
    }

    /// Current record for `account_id`.
    ///
    /// # Errors
    ///
    /// Propagates store read failures.
    pub fn get(&self, account_id: &str) -> Result<Option<MigrationStatusRecord>, MigrationError> {
        Ok(self.load()?.into_iter().find(|r| r.account_id == account_id))
    }

    /// Every tracked account.
    ///
    /// # Errors
    ///
    /// Propagates store read failures.
    pub fn list(&self) -> Result<Vec<MigrationStatusRecord>, MigrationError> {
        self.load()
    }

    /// `true` once a migration for `account_id` has completed. Never reverts.
    ///
    /// # Errors
    ///
    /// Propagates store read failures.
    pub fn is_completed(&self, account_id: &str) -> Result<bool, MigrationError> {
        Ok(self
            .get(account_id)?
            .is_some_and(|r| r.state == MigrationState::Completed))
    }

    /// Create (or reuse) a `pending` record.
    ///
    /// # Errors
    ///
    /// [`MigrationError::InProgress`] while another attempt runs,
    /// [`MigrationError::AlreadyCompleted`] after success, and
    /// [`MigrationError::InvalidTransition`] for a failed record that was not
    /// reset.
    pub fn initialize(&self, account_id: &str) -> Result<MigrationStatusRecord, MigrationError> {
        let mut rows = self.load()?;
        if let Some(existing) = rows.iter().find(|r| r.account_id == account_id) {
            return match existing.state {
                MigrationState::Pending => Ok(existing.clone()),
                MigrationState::InProgress => Err(MigrationError::InProgress(account_id.to_string())),
                MigrationState::Completed => {
                    Err(MigrationError::AlreadyCompleted(account_id.to_string()))
                }
                MigrationState::Failed => Err(MigrationError::InvalidTransition {
                    account_id: account_id.to_string(),
                    from: MigrationState::Failed,
                    to: MigrationState::Pending,
                }),
            };
        }

        let record = MigrationStatusRecord {
            account_id: account_id.to_string(),
            state: MigrationState::Pending,
            attempts: 0,
            created_at: self.clock.now(),
            started_at: None,
            finished_at: None,
            error: None,
            result: None,
        };
        rows.push(record.clone());
        self.save(&rows)?;
        info!(account_id, "initialized migration");
        Ok(record)
    }

    fn transition(
        &self,
        account_id: &str,
        from: MigrationState,
        to: MigrationState,
        apply: impl FnOnce(&mut MigrationStatusRecord, DateTime<Utc>),
    ) -> Result<MigrationStatusRecord, MigrationError> {
        let mut rows = self.load()?;
        let Some(record) = rows.iter_mut().find(|r| r.account_id == account_id) else {
            return Err(MigrationError::NotInitialized(account_id.to_string()));
        };
        if record.state != from {
            return Err(MigrationError::InvalidTransition {
                account_id: account_id.to_string(),
                from: record.state,
                to,
            });
        }
        record.state = to;
        apply(record, self.clock.now());
        let updated = record.clone();
        self.save(&rows)?;
        info!(account_id, from = %from, to = %to, "migration state changed");
        Ok(updated)
    }

    /// `pending -> in_progress`, stamping the start time.
    ///
    /// # Errors
    ///
    /// Returns [`MigrationError::InvalidTransition`] from any other state.
    pub fn start(&self, account_id: &str) -> Result<MigrationStatusRecord, MigrationError> {
        self.transition(
            account_id,
            MigrationState::Pending,
            MigrationState::InProgress,
            |r, now| {
                r.started_at = Some(now);
                r.finished_at = None;
                r.attempts += 1;
            },
        )
    }

    /// `in_progress -> completed` with the final result.
    ///
    /// # Errors
    ///
    /// Returns [`MigrationError::InvalidTransition`] from any other state.
    pub fn complete(
        &self,
        account_id: &str,
        result: MigrationResult,
    ) -> Result<MigrationStatusRecord, MigrationError> {
        self.transition(
            account_id,
            MigrationState::InProgress,
            MigrationState::Completed,
            |r, now| {
                r.finished_at = Some(now);
                r.error = None;
                r.result = Some(result);
            },
        )
    }

    /// `in_progress -> failed`, recording the error.
    ///
    /// # Errors
    ///
    /// Returns [`MigrationError::InvalidTransition`] from any other state.
    pub fn fail(
        &self,
        account_id: &str,
        error: &str,
    ) -> Result<MigrationStatusRecord, MigrationError> {
        self.transition(
            account_id,
            MigrationState::InProgress,
            MigrationState::Failed,
            |r, now| {
                r.finished_at = Some(now);
                r.error = Some(error.to_string());
            },
        )
    }

    /// `failed -> pending` so the migration can be retried.
    ///
    /// # Errors
    ///
    /// Returns [`MigrationError::InvalidTransition`] from any other state;
    /// completed migrations cannot be reset.
    pub fn reset(&self, account_id: &str) -> Result<MigrationStatusRecord, MigrationError> {
        self.transition(
            account_id,
            MigrationState::Failed,
            MigrationState::Pending,
            |r, _| {
                r.started_at = None;
                r.finished_at = None;
            },
        )
    }
}
