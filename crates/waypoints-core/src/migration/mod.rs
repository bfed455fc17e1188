//! One-shot migration of local data into a remote account.
//!
//! Stages, in order: [`snapshot`] (export and validate), [`remap`] (claim
//! rows for the account), [`conflict`] (detect), [`resolve`] (apply one
//! strategy), then bulk writes through a [`remote::RemoteStore`]. The
//! [`status`] record makes the whole thing single-flight per account and
//! survives restarts. [`pipeline`] drives the sequence.

pub mod conflict;
pub mod pipeline;
pub mod remap;
pub mod remote;
pub mod resolve;
pub mod snapshot;
pub mod status;

pub use conflict::{ConflictReason, ConflictRecord, ConflictReport, detect_conflicts, normalize_text};
pub use pipeline::{MigrationOutcome, MigrationPipeline};
pub use remap::{Remapped, remap_owner, verify_preserved};
pub use remote::{JsonFileRemote, MemoryRemote, RemoteAccount, RemoteError, RemoteStore};
pub use resolve::{ResolutionPlan, ResolutionStrategy, resolve};
pub use snapshot::{
    MigrationSnapshot, SNAPSHOT_FORMAT_VERSION, SnapshotCounts, SnapshotIssue, SnapshotReport,
    export_snapshot, validate_snapshot,
};
pub use status::{MigrationResult, MigrationState, MigrationStatusRecord, MigrationStatusTracker};

use crate::error::ErrorCode;
use crate::store::StoreError;

/// A migration-time invariant was violated. Aborts the pipeline.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConsistencyError {
    #[error("snapshot failed validation: {}", join_issues(.0))]
    Snapshot(Vec<SnapshotIssue>),

    #[error("{collection}: {before} rows before remap but {after} after")]
    CountDrift {
        collection: &'static str,
        before: usize,
        after: usize,
    },

    #[error("{collection}[{index}]: id changed from {before} to {after} during remap")]
    IdDrift {
        collection: &'static str,
        index: usize,
        before: String,
        after: String,
    },

    #[error("{collection} {id}: {field} changed during remap")]
    TimestampDrift {
        collection: &'static str,
        id: String,
        field: &'static str,
    },

    #[error("{collection} {id}: not claimed by the target account during remap")]
    Unclaimed {
        collection: &'static str,
        id: String,
    },
}

fn join_issues(issues: &[SnapshotIssue]) -> String {
    issues
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

impl ConsistencyError {
    #[must_use]
    pub const fn code(&self) -> ErrorCode {
        match self {
            Self::Snapshot(_) => ErrorCode::SnapshotInvalid,
            Self::CountDrift { .. }
            | Self::IdDrift { .. }
            | Self::TimestampDrift { .. }
            | Self::Unclaimed { .. } => {
                ErrorCode::ConsistencyViolation
            }
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum MigrationError {
    #[error("a migration for account {0} is already in progress")]
    InProgress(String),

    #[error("account {0} has already been migrated")]
    AlreadyCompleted(String),

    #[error("no migration has been initialized for account {0}")]
    NotInitialized(String),

    #[error("migration for account {account_id} cannot move from {from} to {to}")]
    InvalidTransition {
        account_id: String,
        from: MigrationState,
        to: MigrationState,
    },

    #[error(transparent)]
    Consistency(#[from] ConsistencyError),

    #[error(transparent)]
    Remote(#[from] RemoteError),

    #[error(transparent)]
    Store(#[from] StoreError),
}

impl MigrationError {
    #[must_use]
    pub const fn code(&self) -> ErrorCode {
        match self {
            Self::InProgress(_) => ErrorCode::MigrationInProgress,
            Self::AlreadyCompleted(_) => ErrorCode::MigrationAlreadyCompleted,
            Self::NotInitialized(_) | Self::InvalidTransition { .. } => {
                ErrorCode::InvalidMigrationTransition
            }
            Self::Consistency(err) => err.code(),
            Self::Remote(err) => err.code(),
            Self::Store(err) => err.code(),
        }
    }
}
