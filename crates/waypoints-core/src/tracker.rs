//! One handle over every component sharing a store, clock, and owner.
//!
//! Completion goes through here so that flipping `completed` and writing the
//! ledger always happen together.

use crate::autolink::AutoLinker;
use crate::baseline::DailyBaselineTracker;
use crate::clock::Clock;
use crate::id::IdGenerator;
use crate::ledger::AchievementLedger;
use crate::migration::{MigrationPipeline, RemoteStore};
use crate::model::{AchievementRecord, DaySummary, Item, PointTable};
use crate::repo::{ItemRepository, RepoError};
use crate::store::{Bucket, Store, StoreError};
use crate::validate::{ItemPatch, NewItem};
use chrono::NaiveDate;
use serde::Serialize;
use std::rc::Rc;
use std::sync::Arc;
use tracing::warn;

/// Effect of a completion toggle on one item.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Completion {
    pub item: Item,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub recorded: Option<AchievementRecord>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub revoked: Option<AchievementRecord>,
}

/// Effect of an edit, possibly spread across a linked group.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct EditOutcome {
    pub items: Vec<Item>,
    pub completions: Vec<Completion>,
}

pub struct Tracker<S: Store> {
    store: Rc<S>,
    clock: Arc<dyn Clock>,
    ids: Arc<dyn IdGenerator>,
    owner_id: Option<String>,
    items: ItemRepository<Rc<S>>,
    ledger: AchievementLedger<Rc<S>>,
    baselines: DailyBaselineTracker<Rc<S>>,
}

impl<S: Store> std::fmt::Debug for Tracker<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Tracker")
            .field("owner_id", &self.owner_id)
            .field("items", &self.items)
            .finish_non_exhaustive()
    }
}

impl<S: Store> Tracker<S> {
    pub fn new(store: S, clock: Arc<dyn Clock>, ids: Arc<dyn IdGenerator>) -> Self {
        let store = Rc::new(store);
        Self {
            items: ItemRepository::new(Rc::clone(&store), Arc::clone(&clock), Arc::clone(&ids)),
            ledger: AchievementLedger::new(Rc::clone(&store), Arc::clone(&clock), Arc::clone(&ids)),
            baselines: DailyBaselineTracker::new(
                Rc::clone(&store),
                Arc::clone(&clock),
                Arc::clone(&ids),
            ),
            store,
            clock,
            ids,
            owner_id: None,
        }
    }

    /// Scope new items and ledger queries to `owner_id` (`None` = local).
    #[must_use]
    pub fn for_owner(mut self, owner_id: Option<String>) -> Self {
        self.owner_id = owner_id;
        self
    }

    /// Override per-kind defaults and the daily baseline grant.
    #[must_use]
    pub fn with_points(mut self, table: PointTable, daily_baseline: u32) -> Self {
        self.items = self.items.with_points(table);
        self.baselines = self.baselines.with_default_points(daily_baseline);
        self
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn owner_id(&self) -> Option<&str> {
        self.owner_id.as_deref()
    }

    pub const fn items(&self) -> &ItemRepository<Rc<S>> {
        &self.items
    }

    pub const fn ledger(&self) -> &AchievementLedger<Rc<S>> {
        &self.ledger
    }

    pub const fn baselines(&self) -> &DailyBaselineTracker<Rc<S>> {
        &self.baselines
    }

    pub const fn links(&self) -> AutoLinker<'_, Rc<S>> {
        AutoLinker::new(&self.items)
    }

    /// Migration pipeline over this store and `remote`.
    pub fn migration<R: RemoteStore>(&self, remote: R) -> MigrationPipeline<Rc<S>, R> {
        MigrationPipeline::new(
            Rc::clone(&self.store),
            remote,
            Arc::clone(&self.clock),
            Arc::clone(&self.ids),
        )
    }

    /// Today's UTC calendar date by this tracker's clock.
    pub fn today(&self) -> NaiveDate {
        self.clock.now().date_naive()
    }

    /// Create an item owned by this tracker's owner unless `input` names one.
    ///
    /// # Errors
    ///
    /// Returns validation or store failures.
    pub fn create(&self, input: &NewItem) -> Result<Item, RepoError> {
        if input.owner_id.is_some() || self.owner_id.is_none() {
            return self.items.create(input);
        }
        let mut owned = input.clone();
        owned.owner_id.clone_from(&self.owner_id);
        self.items.create(&owned)
    }

    /// Run `f`; when it fails, put the items and achievements documents back
    /// as they were before it started.
    fn all_or_nothing<T>(&self, f: impl FnOnce() -> Result<T, RepoError>) -> Result<T, RepoError> {
        const BUCKETS: [Bucket; 2] = [Bucket::Items, Bucket::Achievements];
        let mut saved = Vec::with_capacity(BUCKETS.len());
        for bucket in BUCKETS {
            saved.push((bucket, self.store.get(bucket)?));
        }

        let result = f();
        if result.is_err() {
            for (bucket, raw) in &saved {
                let restored = match raw {
                    Some(raw) => self.store.set(*bucket, raw),
                    None => self.store.remove(*bucket),
                };
                if let Err(err) = restored {
                    warn!(
                        key = bucket.key(),
                        error = %err,
                        "could not roll back after a failed write"
                    );
                }
            }
        }
        result
    }

    /// Mark an active item completed and record an achievement worth its
    /// current points. Already-completed items are returned unchanged.
    ///
    /// # Errors
    ///
    /// Returns store failures, in which case neither the item nor the ledger
    /// changed. Failing to create the day's baseline only logs a warning.
    pub fn complete(&self, id: &str) -> Result<Option<Completion>, RepoError> {
        let Some(current) = self.items.get_by_id(id, false)? else {
            return Ok(None);
        };
        if current.completed {
            return Ok(Some(Completion {
                item: current,
                recorded: None,
                revoked: None,
            }));
        }

        let completion = self.all_or_nothing(|| {
            let Some(item) = self.items.update(id, &ItemPatch::completed(true))? else {
                return Ok(None);
            };
            let recorded = self.ledger.record_completion(
                item.owner_id.as_deref(),
                &item.id,
                i64::from(item.points),
            )?;
            Ok(Some(Completion {
                item,
                recorded: Some(recorded),
                revoked: None,
            }))
        })?;

        if let Some(Completion {
            item,
            recorded: Some(recorded),
            ..
        }) = &completion
            && let Err(err) = self
                .baselines
                .ensure_daily_baseline(item.owner_id.as_deref(), recorded.achieved_on())
        {
            warn!(id, error = %err, "completion recorded but the day's baseline was not created");
        }
        Ok(completion)
    }

    /// Mark a completed item incomplete and revoke its latest achievement.
    ///
    /// # Errors
    ///
    /// Returns store failures, in which case neither the item nor the ledger
    /// changed.
    pub fn uncomplete(&self, id: &str) -> Result<Option<Completion>, RepoError> {
        let Some(current) = self.items.get_by_id(id, false)? else {
            return Ok(None);
        };
        if !current.completed {
            return Ok(Some(Completion {
                item: current,
                recorded: None,
                revoked: None,
            }));
        }

        self.all_or_nothing(|| {
            let Some(item) = self.items.update(id, &ItemPatch::completed(false))? else {
                return Ok(None);
            };
            let revoked = self.ledger.revoke_latest_for_item(id)?;
            Ok(Some(Completion {
                item,
                recorded: None,
                revoked,
            }))
        })
    }

    /// Apply `patch` to `id`, or to its whole linked group when `sync_all`.
    ///
    /// Plain fields go through [`AutoLinker::propagate_update`]. A
    /// `completed` change then goes through [`Self::complete`] /
    /// [`Self::uncomplete`] for every target so the ledger stays in step.
    ///
    /// # Errors
    ///
    /// Returns validation failures before anything is written. On a store
    /// failure every target is left as it was before the call.
    pub fn edit(
        &self,
        id: &str,
        patch: &ItemPatch,
        sync_all: bool,
    ) -> Result<EditOutcome, RepoError> {
        let Some(item) = self.items.get_by_id(id, false)? else {
            return Ok(EditOutcome::default());
        };
        crate::validate::validate_patch(patch)?;

        let links = self.links();
        let targets = links.targets(&item, sync_all)?;
        let fields = ItemPatch {
            completed: None,
            ..patch.clone()
        };

        self.all_or_nothing(|| {
            let mut outcome = EditOutcome::default();
            if !fields.is_empty() {
                outcome.items = links.propagate_update(id, &fields, sync_all)?.items;
            }

            if let Some(completed) = patch.completed {
                for target in &targets {
                    let change = if completed {
                        self.complete(target)?
                    } else {
                        self.uncomplete(target)?
                    };
                    if let Some(change) = change {
                        match outcome.items.iter_mut().find(|i| i.id == change.item.id) {
                            Some(slot) => *slot = change.item.clone(),
                            None => outcome.items.push(change.item.clone()),
                        }
                        outcome.completions.push(change);
                    }
                }
            }
            Ok(outcome)
        })
    }

    /// Ensure today's baseline exists and return today's totals.
    ///
    /// # Errors
    ///
    /// Returns store failures.
    pub fn today_total(&self) -> Result<DaySummary, RepoError> {
        let today = self.today();
        self.baselines
            .ensure_daily_baseline(self.owner_id.as_deref(), today)?;
        Ok(self
            .baselines
            .day_total(&self.ledger, self.owner_id.as_deref(), today)?)
    }

    /// Per-day totals for this tracker's owner.
    ///
    /// # Errors
    ///
    /// Propagates store read failures.
    pub fn history(&self, start: NaiveDate, end: NaiveDate) -> Result<Vec<DaySummary>, StoreError> {
        self.baselines
            .history(&self.ledger, self.owner_id.as_deref(), start, end)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::id::SequentialIds;
    use crate::model::ItemKind;
    use crate::store::MemoryStore;

    fn tracker() -> Tracker<MemoryStore> {
        Tracker::new(
            MemoryStore::new(),
            Arc::new(ManualClock::from_millis(1_760_000_000_000)),
            Arc::new(SequentialIds::new("t")),
        )
    }

    #[test]
    fn complete_then_uncomplete_round_trips_the_ledger() {
        let t = tracker();
        let item = t
            .create(&NewItem::new("Write report", ItemKind::Waypoint))
            .expect("create");

        let done = t.complete(&item.id).expect("complete").expect("exists");
        let recorded = done.recorded.expect("achievement recorded");
        assert_eq!(recorded.points_earned, 25);
        assert!(done.item.completed_at.is_some());
        assert_eq!(t.today_total().expect("total").total, 35);

        let again = t.complete(&item.id).expect("complete").expect("exists");
        assert!(again.recorded.is_none(), "no second receipt for an already-completed item");

        let undone = t.uncomplete(&item.id).expect("uncomplete").expect("exists");
        assert_eq!(undone.revoked.map(|r| r.id), Some(recorded.id));
        assert!(undone.item.completed_at.is_none());
        assert_eq!(t.today_total().expect("total").total, 10);
    }

    #[test]
    fn rejected_write_leaves_item_incomplete_and_ledger_empty() {
        let t = tracker();
        let item = t.create(&NewItem::new("Fragile", ItemKind::Step)).expect("create");
        t.store().fail_next_write();
        let err = t.complete(&item.id).expect_err("first write fails");
        assert!(matches!(err, RepoError::Store(ref e) if e.is_capacity()));
        let reread = t.items().get_by_id(&item.id, false).expect("read").expect("exists");
        assert!(!reread.completed);
        assert!(t.ledger().all().expect("read").is_empty());
    }

    #[test]
    fn edit_with_sync_completes_every_linked_instance() {
        let t = tracker();
        let a = t.create(&NewItem::new("Review", ItemKind::Step)).expect("create");
        let b = t.create(&NewItem::new("review", ItemKind::Step)).expect("create");
        let outcome = t
            .edit(
                &a.id,
                &ItemPatch {
                    completed: Some(true),
                    points: Some(7),
                    ..ItemPatch::default()
                },
                true,
            )
            .expect("edit");
        assert_eq!(outcome.completions.len(), 2);
        assert!(outcome.items.iter().all(|i| i.completed && i.points == 7));
        assert_eq!(t.ledger().list_for_item(&b.id).expect("list")[0].points_earned, 7);
    }

    #[test]
    fn baseline_write_failure_keeps_the_completion() {
        let t = tracker();
        let item = t.create(&NewItem::new("Stretch", ItemKind::Step)).expect("create");
        // item write, achievement write, then the baseline
        t.store().fail_write_after(2);
        let done = t.complete(&item.id).expect("complete").expect("exists");
        assert!(done.recorded.is_some());
        assert!(t.items().get_by_id(&item.id, false).expect("read").expect("exists").completed);
        assert_eq!(t.ledger().all().expect("read").len(), 1);
    }

    #[test]
    fn linked_edit_applies_fully_or_not_at_all() {
        let mut failures = 0;
        for allowed in 0..8 {
            let t = tracker();
            let a = t.create(&NewItem::new("Review", ItemKind::Step)).expect("create");
            let b = t.create(&NewItem::new("review", ItemKind::Step)).expect("create");
            let before = a.points;
            t.store().fail_write_after(allowed);

            let result = t.edit(
                &a.id,
                &ItemPatch {
                    completed: Some(true),
                    points: Some(7),
                    ..ItemPatch::default()
                },
                true,
            );

            let rows: Vec<Item> = [&a.id, &b.id]
                .iter()
                .map(|id| t.items().get_by_id(id, false).expect("read").expect("exists"))
                .collect();
            let ledger = t.ledger().all().expect("read");
            if result.is_err() {
                failures += 1;
                assert!(
                    rows.iter().all(|i| !i.completed && i.points == before),
                    "after {allowed} writes"
                );
                assert!(ledger.is_empty(), "after {allowed} writes");
            } else {
                assert!(
                    rows.iter().all(|i| i.completed && i.points == 7),
                    "after {allowed} writes"
                );
                assert_eq!(ledger.len(), 2);
            }
        }
        assert!(failures > 0);
    }

    #[test]
    fn owner_scopes_new_items() {
        let t = tracker().for_owner(Some("acct".into()));
        let item = t.create(&NewItem::new("Mine", ItemKind::Step)).expect("create");
        assert_eq!(item.owner_id.as_deref(), Some("acct"));
    }
}
