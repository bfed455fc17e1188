use super::conflict::{ConflictRecord, detect_conflicts};
use super::remap::remap_owner;
use super::remote::RemoteStore;
use super::resolve::{ResolutionStrategy, resolve};
use super::snapshot::{export_snapshot, validate_snapshot};
use super::status::{MigrationResult, MigrationState, MigrationStatusRecord, MigrationStatusTracker};
use super::{ConsistencyError, MigrationError};
use crate::clock::Clock;
use crate::id::IdGenerator;
use crate::store::Store;
use serde::Serialize;
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{info, warn};

/// What a migration attempt did.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MigrationOutcome {
    pub account_id: String,
    pub strategy: ResolutionStrategy,
    pub state: MigrationState,
    pub result: MigrationResult,
    /// Conflicts left for out-of-band review (`manual_review` only).
    pub unresolved: Vec<ConflictRecord>,
    /// Local rows owned by another account and left behind.
    pub skipped: Vec<String>,
}

/// Drives initialize -> start -> export -> remap -> detect -> resolve ->
/// upsert -> delete replaced rows -> complete, marking the attempt failed on
/// any error.
///
/// The local store is only read (plus its status bucket); nothing local is
/// rewritten.
pub struct MigrationPipeline<S: Store, R: RemoteStore> {
    store: S,
    remote: R,
    clock: Arc<dyn Clock>,
    ids: Arc<dyn IdGenerator>,
}

impl<S: Store, R: RemoteStore> std::fmt::Debug for MigrationPipeline<S, R> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MigrationPipeline").finish_non_exhaustive()
    }
}

impl<S: Store, R: RemoteStore> MigrationPipeline<S, R> {
    pub fn new(store: S, remote: R, clock: Arc<dyn Clock>, ids: Arc<dyn IdGenerator>) -> Self {
        Self {
            store,
            remote,
            clock,
            ids,
        }
    }

    /// Status tracker over the same store.
    pub fn status(&self) -> MigrationStatusTracker<&S> {
        MigrationStatusTracker::new(&self.store, Arc::clone(&self.clock))
    }

    pub const fn remote(&self) -> &R {
        &self.remote
    }

    /// Move a failed attempt back to pending.
    ///
    /// # Errors
    ///
    /// Returns [`MigrationError::InvalidTransition`] unless the attempt failed.
    pub fn reset(&self, account_id: &str) -> Result<MigrationStatusRecord, MigrationError> {
        self.status().reset(account_id)
    }

    /// Run one attempt for `account_id`.
    ///
    /// A `manual_review` run with conflicts writes nothing, leaves the attempt
    /// `failed` so it can be reset and rerun, and returns the conflicts in
    /// [`MigrationOutcome::unresolved`].
    ///
    /// # Errors
    ///
    /// State-machine violations fail before anything runs. Consistency,
    /// remote, and store failures mark the attempt failed and are returned.
    pub fn run(
        &self,
        account_id: &str,
        strategy: ResolutionStrategy,
    ) -> Result<MigrationOutcome, MigrationError> {
        let status = self.status();
        status.initialize(account_id)?;
        status.start(account_id)?;
        info!(account_id, %strategy, "migration started");

        match self.execute(account_id, strategy) {
            Ok(mut outcome) if outcome.unresolved.is_empty() => {
                status.complete(account_id, outcome.result.clone())?;
                outcome.state = MigrationState::Completed;
                info!(
                    account_id,
                    items = outcome.result.items_migrated,
                    conflicts = outcome.result.conflicts,
                    "migration completed"
                );
                Ok(outcome)
            }
            Ok(mut outcome) => {
                let reason = format!(
                    "awaiting manual review: {} conflict(s)",
                    outcome.unresolved.len()
                );
                status.fail(account_id, &reason)?;
                outcome.result.errors.push(reason);
                outcome.state = MigrationState::Failed;
                warn!(account_id, conflicts = outcome.unresolved.len(), "migration needs manual review");
                Ok(outcome)
            }
            Err(err) => {
                warn!(account_id, error = %err, "migration failed");
                if let Err(status_err) = status.fail(account_id, &err.to_string()) {
                    warn!(account_id, error = %status_err, "could not record migration failure");
                }
                Err(err)
            }
        }
    }

    fn execute(
        &self,
        account_id: &str,
        strategy: ResolutionStrategy,
    ) -> Result<MigrationOutcome, MigrationError> {
        let snapshot = export_snapshot(&self.store, self.clock.as_ref())?;
        let report = validate_snapshot(&snapshot);
        if !report.is_valid() {
            return Err(ConsistencyError::Snapshot(report.errors).into());
        }

        let remapped = remap_owner(&snapshot, account_id)?;
        let remote_items = self.remote.list_items(account_id)?;
        let conflicts = detect_conflicts(&remapped.snapshot.items, &remote_items);
        let plan = resolve(&conflicts, strategy, &remote_items, self.ids.as_ref());

        let mut result = MigrationResult {
            conflicts: conflicts.conflicts.len(),
            kept_local: plan.kept_local,
            kept_remote: plan.kept_remote,
            duplicated: plan.duplicated,
            warnings: report.warnings,
            ..MigrationResult::default()
        };
        result.warnings.extend(plan.warnings.iter().cloned());
        if !remapped.skipped.is_empty() {
            result.warnings.push(format!(
                "{} item(s) owned by another account were not migrated",
                remapped.skipped.len()
            ));
        }

        let mut outcome = MigrationOutcome {
            account_id: account_id.to_string(),
            strategy,
            state: MigrationState::InProgress,
            result,
            unresolved: plan.unresolved.clone(),
            skipped: remapped.skipped.clone(),
        };
        if !plan.unresolved.is_empty() {
            return Ok(outcome);
        }

        let mut achievements = remapped.snapshot.achievements;
        for record in &mut achievements {
            if let Some(fresh) = plan.id_rewrites.get(&record.item_id) {
                record.item_id.clone_from(fresh);
            }
        }
        let baselines = remapped.snapshot.daily_baselines;

        // Replaced remote rows are removed only once their replacements are
        // written, so a failed write leaves the remote as it was.
        outcome.result.items_migrated = self.remote.bulk_upsert(account_id, &plan.upserts)?;
        self.remote
            .upsert_history(account_id, &achievements, &baselines)?;
        outcome.result.achievements_migrated = achievements.len();
        outcome.result.baselines_migrated = baselines.len();

        let written: HashSet<&str> = plan.upserts.iter().map(|i| i.id.as_str()).collect();
        let deletes: Vec<String> = plan
            .remote_deletes
            .iter()
            .filter(|id| !written.contains(id.as_str()))
            .cloned()
            .collect();
        outcome.result.remote_deleted = self.remote.delete_items(account_id, &deletes)?;
        Ok(outcome)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::model::{AchievementRecord, DailyBaselineRecord};
    use std::cell::Cell;
    use crate::id::SequentialIds;
    use crate::migration::remote::{MemoryRemote, RemoteError};
    use crate::model::{Item, ItemKind};
    use crate::store::{Bucket, MemoryStore, save_list};
    use chrono::Utc;

    fn local_item(id: &str, text: &str) -> Item {
        let now = Utc::now();
        Item {
            id: id.into(),
            owner_id: None,
            text: text.into(),
            kind: ItemKind::Step,
            parent_id: None,
            position: 0,
            completed: false,
            completed_at: None,
            points: 5,
            deleted_at: None,
            created_at: now,
            updated_at: now,
        }
    }

    fn pipeline<R: RemoteStore>(store: &MemoryStore, remote: R) -> MigrationPipeline<&MemoryStore, R> {
        MigrationPipeline::new(
            store,
            remote,
            Arc::new(ManualClock::from_millis(1_700_000_000_000)),
            Arc::new(SequentialIds::new("mig")),
        )
    }

    /// Remote whose item upserts fail while `drop_upserts` is set.
    struct DroppingRemote {
        inner: MemoryRemote,
        drop_upserts: Cell<bool>,
    }

    impl RemoteStore for DroppingRemote {
        fn list_items(&self, account_id: &str) -> Result<Vec<Item>, RemoteError> {
            self.inner.list_items(account_id)
        }

        fn bulk_upsert(&self, account_id: &str, items: &[Item]) -> Result<usize, RemoteError> {
            if self.drop_upserts.get() {
                return Err(RemoteError::Unavailable("upsert dropped".into()));
            }
            self.inner.bulk_upsert(account_id, items)
        }

        fn delete_items(&self, account_id: &str, ids: &[String]) -> Result<usize, RemoteError> {
            self.inner.delete_items(account_id, ids)
        }

        fn upsert_history(
            &self,
            account_id: &str,
            achievements: &[AchievementRecord],
            baselines: &[DailyBaselineRecord],
        ) -> Result<(), RemoteError> {
            self.inner.upsert_history(account_id, achievements, baselines)
        }
    }

    #[test]
    fn clean_migration_claims_rows_and_completes() {
        let store = MemoryStore::new();
        save_list(&store, Bucket::Items, &[local_item("a", "A"), local_item("b", "B")]).expect("seed");
        let p = pipeline(&store, MemoryRemote::new());

        let outcome = p.run("acct", ResolutionStrategy::KeepNewest).expect("run");
        assert_eq!(outcome.state, MigrationState::Completed);
        assert_eq!(outcome.result.items_migrated, 2);
        let remote = p.remote().account("acct");
        assert!(remote.items.iter().all(|i| i.owner_id.as_deref() == Some("acct")));
        assert!(p.status().is_completed("acct").expect("read"));

        assert!(matches!(
            p.run("acct", ResolutionStrategy::KeepNewest),
            Err(MigrationError::AlreadyCompleted(_))
        ));
    }

    #[test]
    fn remote_failure_marks_attempt_failed_and_reset_allows_retry() {
        let store = MemoryStore::new();
        save_list(&store, Bucket::Items, &[local_item("a", "A")]).expect("seed");
        let p = pipeline(&store, MemoryRemote::new());
        p.remote().set_unavailable(Some("offline"));

        let err = p.run("acct", ResolutionStrategy::KeepLocal).expect_err("offline");
        assert!(matches!(err, MigrationError::Remote(_)));
        let record = p.status().get("acct").expect("read").expect("record");
        assert_eq!(record.state, MigrationState::Failed);

        p.remote().set_unavailable(None);
        p.reset("acct").expect("reset");
        let outcome = p.run("acct", ResolutionStrategy::KeepLocal).expect("retry");
        assert_eq!(outcome.state, MigrationState::Completed);
    }

    #[test]
    fn manual_review_surfaces_conflicts_without_writing() {
        let store = MemoryStore::new();
        save_list(&store, Bucket::Items, &[local_item("a", "Design")]).expect("seed");
        let mut remote_row = local_item("r", "design");
        remote_row.owner_id = Some("acct".into());
        let p = pipeline(&store, MemoryRemote::new().with_items("acct", vec![remote_row]));

        let outcome = p.run("acct", ResolutionStrategy::ManualReview).expect("run");
        assert_eq!(outcome.state, MigrationState::Failed);
        assert_eq!(outcome.unresolved.len(), 1);
        assert_eq!(p.remote().account("acct").items.len(), 1);
        assert!(!p.status().is_completed("acct").expect("read"));
    }

    #[test]
    fn inconsistent_snapshot_aborts() {
        let store = MemoryStore::new();
        save_list(&store, Bucket::Items, &[local_item("a", "A"), local_item("a", "A again")])
            .expect("seed");
        let p = pipeline(&store, MemoryRemote::new());
        let err = p.run("acct", ResolutionStrategy::KeepLocal).expect_err("duplicate ids");
        assert!(matches!(err, MigrationError::Consistency(ConsistencyError::Snapshot(_))));
        assert!(p.remote().account("acct").items.is_empty());
    }

    #[test]
    fn failed_upsert_keeps_the_replaced_remote_row() {
        let store = MemoryStore::new();
        save_list(&store, Bucket::Items, &[local_item("a", "Design")]).expect("seed");
        let mut remote_row = local_item("r", "design");
        remote_row.owner_id = Some("acct".into());
        let remote = DroppingRemote {
            inner: MemoryRemote::new().with_items("acct", vec![remote_row]),
            drop_upserts: Cell::new(true),
        };
        let p = pipeline(&store, remote);

        let err = p.run("acct", ResolutionStrategy::KeepLocal).expect_err("upsert fails");
        assert!(matches!(err, MigrationError::Remote(RemoteError::Unavailable(_))));
        let items = p.remote().inner.account("acct").items;
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].id, "r");

        p.remote().drop_upserts.set(false);
        p.reset("acct").expect("reset");
        let outcome = p.run("acct", ResolutionStrategy::KeepLocal).expect("retry");
        assert_eq!(outcome.result.remote_deleted, 1);
        let items = p.remote().inner.account("acct").items;
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].id, "a");
    }
}
