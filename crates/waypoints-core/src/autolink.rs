//! Auto-link engine: emergent "same logical item" groups derived from text.
//!
//! A group is every *active* item whose text is equal under case-insensitive
//! comparison. Groups are never persisted. The repository keeps a
//! [`TextIndex`] (lowercase text -> entries ordered by creation) in sync with
//! every mutation, and this module reads through it.
//!
//! The oldest member (minimum `createdAt`, ties broken by insertion order in
//! the store) is canonical. Canonical status is recomputed from the live
//! active set on every call.
//!
//! Propagation is always opt-in: [`AutoLinker::delete_group`] and
//! [`AutoLinker::propagate_update`] touch a single item unless the caller
//! explicitly asks for the whole group. Completion is not propagated here;
//! it goes through [`crate::tracker::Tracker`] so every flip writes the
//! ledger.

use crate::model::Item;
use crate::repo::{ItemRepository, RepoError};
use crate::store::{Store, StoreError};
use crate::validate::{Constraint, ItemPatch, ValidationError, ValidationErrors};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::HashMap;
use tracing::info;

/// Group key for a piece of item text.
#[must_use]
pub fn group_key(text: &str) -> String {
    text.to_lowercase()
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct IndexEntry {
    id: String,
    created_at: DateTime<Utc>,
    seq: usize,
}

impl IndexEntry {
    fn order_key(&self) -> (DateTime<Utc>, usize) {
        (self.created_at, self.seq)
    }
}

/// Lowercase text -> active item ids, oldest first.
///
/// `seq` is the row's position in the persisted items array, which is the
/// tie-breaker for equal `createdAt` values.
#[derive(Debug, Clone, Default)]
pub struct TextIndex {
    groups: HashMap<String, Vec<IndexEntry>>,
}

impl TextIndex {
    /// Index every active row of `items`.
    #[must_use]
    pub fn build(items: &[Item]) -> Self {
        let mut index = Self::default();
        for (seq, item) in items.iter().enumerate() {
            if item.is_active() {
                index.insert(&item.text, &item.id, item.created_at, seq);
            }
        }
        index
    }

    pub fn insert(&mut self, text: &str, id: &str, created_at: DateTime<Utc>, seq: usize) {
        let entries = self.groups.entry(group_key(text)).or_default();
        if entries.iter().any(|e| e.id == id) {
            return;
        }
        let entry = IndexEntry {
            id: id.to_string(),
            created_at,
            seq,
        };
        let at = entries.partition_point(|e| e.order_key() <= entry.order_key());
        entries.insert(at, entry);
    }

    /// Drop `id` from the group for `text`. Returns whether it was present.
    pub fn remove(&mut self, text: &str, id: &str) -> bool {
        let key = group_key(text);
        let Some(entries) = self.groups.get_mut(&key) else {
            return false;
        };
        let before = entries.len();
        entries.retain(|e| e.id != id);
        let removed = entries.len() != before;
        if entries.is_empty() {
            self.groups.remove(&key);
        }
        removed
    }

    /// Ids in the group for `text`, oldest first.
    #[must_use]
    pub fn group(&self, text: &str) -> Vec<&str> {
        self.groups
            .get(&group_key(text))
            .map(|entries| entries.iter().map(|e| e.id.as_str()).collect())
            .unwrap_or_default()
    }

    /// Number of indexed (active) items.
    #[must_use]
    pub fn len(&self) -> usize {
        self.groups.values().map(Vec::len).sum()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.groups.is_empty()
    }

    /// Groups with more than one member.
    #[must_use]
    pub fn linked_group_count(&self) -> usize {
        self.groups.values().filter(|g| g.len() > 1).count()
    }
}

/// The canonical member of an oldest-first group.
#[must_use]
pub fn resolve_canonical(group: &[Item]) -> Option<&Item> {
    group.first()
}

/// A non-canonical sibling as shown in a breadcrumb.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LinkedInstance {
    pub id: String,
    pub parent_id: Option<String>,
    pub parent_text: Option<String>,
}

/// An item decorated for display.
///
/// Items without duplicates carry neither field; absence means nothing to show.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EnrichedItem {
    #[serde(flatten)]
    pub item: Item,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub linked_instances: Option<Vec<LinkedInstance>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub is_canonical: Option<bool>,
}

impl EnrichedItem {
    #[must_use]
    pub const fn is_linked(&self) -> bool {
        self.linked_instances.is_some()
    }
}

/// Result of a group delete.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct GroupDeletion {
    pub count: usize,
    pub ids: Vec<String>,
}

/// Result of a group update.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct GroupUpdate {
    pub count: usize,
    pub items: Vec<Item>,
}

/// Read/write view over the repository's text groups.
#[derive(Debug)]
pub struct AutoLinker<'r, S: Store> {
    repo: &'r ItemRepository<S>,
}

impl<'r, S: Store> AutoLinker<'r, S> {
    #[must_use]
    pub const fn new(repo: &'r ItemRepository<S>) -> Self {
        Self { repo }
    }

    /// Active items sharing `text` case-insensitively, oldest first.
    ///
    /// # Errors
    ///
    /// Propagates store read failures.
    pub fn find_group(&self, text: &str) -> Result<Vec<Item>, StoreError> {
        self.repo.get_by_text(text)
    }

    /// Canonical member for the group containing `text`.
    ///
    /// # Errors
    ///
    /// Propagates store read failures.
    pub fn canonical_for(&self, text: &str) -> Result<Option<Item>, StoreError> {
        Ok(self.find_group(text)?.into_iter().next())
    }

    /// Attach link metadata to each item.
    ///
    /// Soft-deleted inputs and items whose group has a single member are
    /// returned without link fields.
    ///
    /// # Errors
    ///
    /// Propagates store read failures.
    pub fn enrich(&self, items: &[Item]) -> Result<Vec<EnrichedItem>, StoreError> {
        let mut groups: HashMap<String, Vec<Item>> = HashMap::new();
        let mut parent_texts: HashMap<String, Option<String>> = HashMap::new();
        let mut out = Vec::with_capacity(items.len());

        for item in items {
            let key = group_key(&item.text);
            if !groups.contains_key(&key) {
                let group = self.repo.get_by_text(&item.text)?;
                groups.insert(key.clone(), group);
            }
            let group = groups.get(&key).map_or(&[][..], Vec::as_slice);

            let in_group = item.is_active() && group.iter().any(|g| g.id == item.id);
            if !in_group || group.len() < 2 {
                out.push(EnrichedItem {
                    item: item.clone(),
                    linked_instances: None,
                    is_canonical: None,
                });
                continue;
            }

            let mut linked = Vec::with_capacity(group.len() - 1);
            for sibling in group.iter().filter(|g| g.id != item.id) {
                let parent_text = match sibling.parent_id.as_deref() {
                    None => None,
                    Some(pid) => {
                        if let Some(cached) = parent_texts.get(pid) {
                            cached.clone()
                        } else {
                            let text = self.repo.get_by_id(pid, true)?.map(|p| p.text);
                            parent_texts.insert(pid.to_string(), text.clone());
                            text
                        }
                    }
                };
                linked.push(LinkedInstance {
                    id: sibling.id.clone(),
                    parent_id: sibling.parent_id.clone(),
                    parent_text,
                });
            }

            let is_canonical = resolve_canonical(group).is_some_and(|c| c.id == item.id);
            out.push(EnrichedItem {
                item: item.clone(),
                linked_instances: Some(linked),
                is_canonical: Some(is_canonical),
            });
        }

        Ok(out)
    }

    /// Ids an operation on `item` should touch: just `item`, or its whole
    /// active group when `whole_group`.
    ///
    /// # Errors
    ///
    /// Propagates store read failures.
    pub fn targets(&self, item: &Item, whole_group: bool) -> Result<Vec<String>, StoreError> {
        if !whole_group {
            return Ok(vec![item.id.clone()]);
        }
        Ok(self
            .repo
            .get_by_text(&item.text)?
            .into_iter()
            .map(|i| i.id)
            .collect())
    }

    /// Soft-delete `item_id`, or its whole active group when `delete_all`.
    ///
    /// Returns a zero-count result when `item_id` is not an active item.
    ///
    /// # Errors
    ///
    /// Propagates store failures; a failed write deletes nothing.
    pub fn delete_group(&self, item_id: &str, delete_all: bool) -> Result<GroupDeletion, RepoError> {
        let Some(item) = self.repo.get_by_id(item_id, false)? else {
            return Ok(GroupDeletion::default());
        };

        let targets = self.targets(&item, delete_all)?;
        let deleted = self.repo.soft_delete_many(&targets)?;
        let ids: Vec<String> = deleted.into_iter().map(|i| i.id).collect();
        info!(item_id, delete_all, count = ids.len(), "deleted linked group");
        Ok(GroupDeletion {
            count: ids.len(),
            ids,
        })
    }

    /// Apply `patch` to `item_id`, or to every member of its group when
    /// `sync_all`.
    ///
    /// Group membership is resolved from the text *before* the patch.
    ///
    /// # Errors
    ///
    /// Returns validation failures before anything is written. A patch that
    /// sets `completed` is rejected with [`Constraint::NotAllowed`]; use
    /// [`crate::tracker::Tracker::edit`] for that.
    pub fn propagate_update(
        &self,
        item_id: &str,
        patch: &ItemPatch,
        sync_all: bool,
    ) -> Result<GroupUpdate, RepoError> {
        if patch.completed.is_some() {
            return Err(ValidationErrors::single(ValidationError::new(
                "completed",
                Constraint::NotAllowed,
                "completion must go through the tracker so the ledger is written",
            ))
            .into());
        }
        let Some(item) = self.repo.get_by_id(item_id, false)? else {
            return Ok(GroupUpdate::default());
        };

        let targets = self.targets(&item, sync_all)?;
        let items = self.repo.update_many(&targets, patch)?;
        if sync_all {
            info!(item_id, count = items.len(), "propagated update to linked group");
        }
        Ok(GroupUpdate {
            count: items.len(),
            items,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::id::SequentialIds;
    use crate::model::ItemKind;
    use crate::store::MemoryStore;
    use crate::validate::NewItem;
    use chrono::Duration;
    use std::sync::Arc;

    fn setup() -> (ItemRepository<MemoryStore>, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::from_millis(1_700_000_000_000));
        let repo = ItemRepository::new(
            MemoryStore::new(),
            clock.clone(),
            Arc::new(SequentialIds::new("it")),
        );
        (repo, clock)
    }

    fn add(repo: &ItemRepository<MemoryStore>, clock: &ManualClock, text: &str) -> Item {
        clock.advance(Duration::milliseconds(1));
        repo.create(&NewItem::new(text, ItemKind::Step))
            .expect("create")
    }


    #[test]
    fn group_lookup_stays_fast_at_a_thousand_items() {
        let (repo, clock) = setup();
        let template = add(&repo, &clock, "seed");
        let rows: Vec<Item> = (0..1_000)
            .map(|n| Item {
                id: format!("bulk-{n}"),
                text: format!("Task {}", n % 250),
                ..template.clone()
            })
            .collect();
        let raw = serde_json::to_string(&rows).expect("encode");
        repo.store().set(crate::store::Bucket::Items, &raw).expect("seed");

        let links = AutoLinker::new(&repo);
        assert_eq!(links.find_group("task 7").expect("warm").len(), 4);

        let lookups = 100;
        let started = std::time::Instant::now();
        for n in 0..lookups {
            let group = links.find_group(&format!("TASK {n}")).expect("lookup");
            assert_eq!(group.len(), 4);
        }
        let per_lookup = started.elapsed() / lookups;
        assert!(per_lookup.as_millis() < 50, "find_group took {per_lookup:?}");
    }
    #[test]
    fn index_orders_by_created_then_insertion() {
        let t = Utc::now();
        let mut index = TextIndex::default();
        index.insert("Design", "b", t, 1);
        index.insert("design", "a", t, 0);
        index.insert("DESIGN", "c", t - Duration::seconds(1), 2);
        assert_eq!(index.group("dEsIgN"), vec!["c", "a", "b"]);
        assert!(index.remove("Design", "a"));
        assert!(!index.remove("Design", "a"));
        assert_eq!(index.len(), 2);
        assert_eq!(index.linked_group_count(), 1);
    }

    #[test]
    fn unique_items_get_no_enrichment() {
        let (repo, clock) = setup();
        let solo = add(&repo, &clock, "Solo");
        let enriched = AutoLinker::new(&repo).enrich(&[solo]).expect("enrich");
        assert!(enriched[0].linked_instances.is_none());
        assert!(enriched[0].is_canonical.is_none());

        let json = serde_json::to_value(&enriched[0]).expect("serialize");
        assert!(json.get("linkedInstances").is_none());
        assert!(json.get("isCanonical").is_none());
        assert_eq!(json["text"], "Solo");
    }

    #[test]
    fn canonical_moves_when_oldest_is_deleted_and_back_on_restore() {
        let (repo, clock) = setup();
        let first = add(&repo, &clock, "Review");
        let second = add(&repo, &clock, "review");
        let linker = AutoLinker::new(&repo);

        assert_eq!(linker.canonical_for("REVIEW").expect("read").map(|i| i.id), Some(first.id.clone()));
        repo.soft_delete(&first.id).expect("delete");
        assert_eq!(linker.canonical_for("review").expect("read").map(|i| i.id), Some(second.id.clone()));
        repo.restore(&first.id).expect("restore");
        assert_eq!(linker.canonical_for("review").expect("read").map(|i| i.id), Some(first.id));
    }

    #[test]
    fn delete_group_single_and_all() {
        let (repo, clock) = setup();
        let a = add(&repo, &clock, "Plan");
        let _b = add(&repo, &clock, "PLAN");
        let _c = add(&repo, &clock, "plan");
        let other = add(&repo, &clock, "Planning");
        let linker = AutoLinker::new(&repo);

        let one = linker.delete_group(&a.id, false).expect("delete one");
        assert_eq!(one.count, 1);
        assert_eq!(linker.find_group("plan").expect("read").len(), 2);

        let group_member = linker.find_group("plan").expect("read")[0].id.clone();
        let all = linker.delete_group(&group_member, true).expect("delete all");
        assert_eq!(all.count, 2);
        assert!(linker.find_group("plan").expect("read").is_empty());
        assert!(repo.get_by_id(&other.id, false).expect("read").is_some());

        let noop = linker.delete_group(&a.id, true).expect("deleted item");
        assert_eq!(noop, GroupDeletion::default());
    }

    #[test]
    fn propagate_update_is_opt_in() {
        let (repo, clock) = setup();
        let a = add(&repo, &clock, "Write tests");
        let b = add(&repo, &clock, "write tests");
        let linker = AutoLinker::new(&repo);

        let single = linker
            .propagate_update(&a.id, &ItemPatch::points(40), false)
            .expect("update one");
        assert_eq!(single.count, 1);
        assert_eq!(repo.get_by_id(&b.id, false).expect("read").map(|i| i.points), Some(5));

        let all = linker
            .propagate_update(&b.id, &ItemPatch::text("Write more tests"), true)
            .expect("update all");
        assert_eq!(all.count, 2);
        assert_eq!(linker.find_group("write more tests").expect("read").len(), 2);
        assert!(linker.find_group("write tests").expect("read").is_empty());
    }

    #[test]
    fn missing_item_update_is_zero_count() {
        let (repo, _clock) = setup();
        let result = AutoLinker::new(&repo)
            .propagate_update("nope", &ItemPatch::points(1), true)
            .expect("noop");
        assert_eq!(result.count, 0);
    }

    #[test]
    fn propagate_update_refuses_completion() {
        let (repo, clock) = setup();
        let a = add(&repo, &clock, "Review");
        add(&repo, &clock, "review");
        let ledger = crate::ledger::AchievementLedger::new(
            repo.store(),
            clock.clone(),
            Arc::new(SequentialIds::new("ach")),
        );

        let err = AutoLinker::new(&repo)
            .propagate_update(&a.id, &ItemPatch::completed(true), true)
            .expect_err("completion is not a plain field");
        let fields = err.validation().expect("validation error");
        assert!(fields.has_field("completed"));

        assert!(repo.get_all_active().expect("read").iter().all(|i| !i.completed));
        assert!(ledger.all().expect("read").is_empty());
    }
}
