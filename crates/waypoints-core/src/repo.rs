//! Item repository: CRUD, hierarchy queries and soft delete over the items
//! bucket.
//!
//! The bucket is cached in memory together with a [`TextIndex`]. The cache is
//! keyed by a fingerprint of the raw document so a write from another process
//! (last-write-wins) is picked up on the next call. Mutations update the index
//! incrementally; a failed write drops the cache so the next read reloads what
//! the medium actually holds.
//!
//! Soft deletion never cascades. [`ItemRepository::purge`] is the only path
//! that removes descendants, and it never touches the achievement ledger.

use crate::autolink::TextIndex;
use crate::clock::Clock;
use crate::error::ErrorCode;
use crate::id::IdGenerator;
use crate::model::{Item, PointTable};
use crate::store::{Bucket, Store, StoreError, parse_or_empty};
use crate::validate::{
    Constraint, ItemPatch, NewItem, ValidPatch, ValidationError, ValidationErrors,
    check_non_negative, validate_new_item, validate_patch,
};
use std::cell::RefCell;
use std::collections::hash_map::DefaultHasher;
use std::collections::{HashMap, HashSet};
use std::hash::{Hash, Hasher};
use std::sync::Arc;
use tracing::{debug, info};

/// Errors from repository mutations. Not-found is `Ok(None)`, never an error.
#[derive(Debug, thiserror::Error)]
pub enum RepoError {
    #[error(transparent)]
    Validation(#[from] ValidationErrors),

    #[error(transparent)]
    Store(#[from] StoreError),
}

impl RepoError {
    #[must_use]
    pub fn code(&self) -> ErrorCode {
        match self {
            Self::Validation(errs) => errs.code(),
            Self::Store(err) => err.code(),
        }
    }

    #[must_use]
    pub const fn validation(&self) -> Option<&ValidationErrors> {
        match self {
            Self::Validation(errs) => Some(errs),
            Self::Store(_) => None,
        }
    }
}

#[derive(Debug, Default)]
struct ItemCache {
    fingerprint: Option<u64>,
    items: Vec<Item>,
    slots: HashMap<String, usize>,
    index: TextIndex,
}

impl ItemCache {
    fn load(fingerprint: u64, items: Vec<Item>) -> Self {
        let slots = items
            .iter()
            .enumerate()
            .map(|(i, item)| (item.id.clone(), i))
            .collect();
        let index = TextIndex::build(&items);
        Self {
            fingerprint: Some(fingerprint),
            items,
            slots,
            index,
        }
    }

    fn slot(&self, id: &str) -> Option<usize> {
        self.slots.get(id).copied()
    }

    fn get(&self, id: &str) -> Option<&Item> {
        self.slot(id).and_then(|i| self.items.get(i))
    }

    fn active(&self, id: &str) -> Option<&Item> {
        self.get(id).filter(|item| item.is_active())
    }

    fn next_position(&self, parent_id: Option<&str>, skip: Option<&str>) -> u32 {
        self.items
            .iter()
            .filter(|i| i.parent_id.as_deref() == parent_id && Some(i.id.as_str()) != skip)
            .map(|i| i.position.saturating_add(1))
            .max()
            .unwrap_or(0)
    }

    fn push(&mut self, item: Item) {
        let seq = self.items.len();
        self.index
            .insert(&item.text, &item.id, item.created_at, seq);
        self.slots.insert(item.id.clone(), seq);
        self.items.push(item);
    }
}

fn fingerprint(raw: Option<&str>) -> u64 {
    let mut hasher = DefaultHasher::new();
    raw.hash(&mut hasher);
    hasher.finish()
}

fn sort_by_position(items: &mut [Item]) {
    items.sort_by_key(|i| i.position);
}

/// Repository over the items bucket of a [`Store`].
pub struct ItemRepository<S: Store> {
    store: S,
    clock: Arc<dyn Clock>,
    ids: Arc<dyn IdGenerator>,
    points: PointTable,
    cache: RefCell<ItemCache>,
}

impl<S: Store> std::fmt::Debug for ItemRepository<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ItemRepository")
            .field("points", &self.points)
            .field("cached_items", &self.cache.borrow().items.len())
            .finish_non_exhaustive()
    }
}

impl<S: Store> ItemRepository<S> {
    pub fn new(store: S, clock: Arc<dyn Clock>, ids: Arc<dyn IdGenerator>) -> Self {
        Self {
            store,
            clock,
            ids,
            points: PointTable::default(),
            cache: RefCell::new(ItemCache::default()),
        }
    }

    /// Override the per-kind default point values used by [`Self::create`].
    #[must_use]
    pub fn with_points(mut self, points: PointTable) -> Self {
        self.points = points;
        self
    }

    pub const fn store(&self) -> &S {
        &self.store
    }

    fn refresh(&self) -> Result<(), StoreError> {
        let raw = self.store.get(Bucket::Items)?;
        let fp = fingerprint(raw.as_deref());
        if self.cache.borrow().fingerprint == Some(fp) {
            return Ok(());
        }
        let items: Vec<Item> = raw
            .as_deref()
            .and_then(|r| parse_or_empty(Bucket::Items, r))
            .unwrap_or_default();
        debug!(items = items.len(), "rebuilt item cache and text index");
        *self.cache.borrow_mut() = ItemCache::load(fp, items);
        Ok(())
    }

    fn read<T>(&self, f: impl FnOnce(&ItemCache) -> T) -> Result<T, StoreError> {
        self.refresh()?;
        Ok(f(&self.cache.borrow()))
    }

    /// Run `f` against the cache and persist when it returns `Ok(Some(_))`.
    ///
    /// `f` must not mutate the cache on the `Ok(None)` and `Err` paths.
    fn mutate<T>(
        &self,
        f: impl FnOnce(&mut ItemCache) -> Result<Option<T>, RepoError>,
    ) -> Result<Option<T>, RepoError> {
        self.refresh()?;
        let mut cache = self.cache.borrow_mut();
        let Some(out) = f(&mut cache)? else {
            return Ok(None);
        };
        if let Err(err) = self.persist(&mut cache) {
            *cache = ItemCache::default();
            return Err(err.into());
        }
        Ok(Some(out))
    }

    fn persist(&self, cache: &mut ItemCache) -> Result<(), StoreError> {
        let raw = serde_json::to_string(&cache.items).map_err(|source| StoreError::Serialize {
            key: Bucket::Items.key(),
            source,
        })?;
        self.store.set(Bucket::Items, &raw)?;
        cache.fingerprint = Some(fingerprint(Some(&raw)));
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Writes
    // -----------------------------------------------------------------------

    /// Validate and append a new item.
    ///
    /// Omitted `position` becomes the next free sibling slot; omitted
    /// `points` come from the kind's default.
    ///
    /// # Errors
    ///
    /// Returns [`RepoError::Validation`] for malformed input or an unknown or
    /// deleted parent, and [`RepoError::Store`] when the write fails.
    pub fn create(&self, input: &NewItem) -> Result<Item, RepoError> {
        let valid = validate_new_item(input)?;
        let created = self.mutate(|cache| {
            if let Some(parent) = valid.parent_id.as_deref()
                && cache.active(parent).is_none()
            {
                return Err(ValidationErrors::single(ValidationError::new(
                    "parentId",
                    Constraint::InvalidReference,
                    format!("parent '{parent}' does not exist or is deleted"),
                ))
                .into());
            }

            let now = self.clock.now();
            let position = valid
                .position
                .unwrap_or_else(|| cache.next_position(valid.parent_id.as_deref(), None));
            let item = Item {
                id: self.ids.next_id(),
                owner_id: valid.owner_id.clone(),
                text: valid.text.clone(),
                kind: valid.kind,
                parent_id: valid.parent_id.clone(),
                position,
                completed: false,
                completed_at: None,
                points: valid.points.unwrap_or_else(|| self.points.for_kind(valid.kind)),
                deleted_at: None,
                created_at: now,
                updated_at: now,
            };
            cache.push(item.clone());
            Ok(Some(item))
        })?;
        // mutate only yields None when the closure does.
        created.ok_or_else(|| StoreError::Backend("item create produced no row".into()).into())
    }

    /// Partially update one active item.
    ///
    /// # Errors
    ///
    /// Returns validation or store failures. A missing or deleted id is `Ok(None)`.
    pub fn update(&self, id: &str, patch: &ItemPatch) -> Result<Option<Item>, RepoError> {
        let mut updated = self.update_many(&[id.to_string()], patch)?;
        Ok(updated.pop())
    }

    /// Apply the same patch to every active id in `ids` with a single write.
    ///
    /// Missing and deleted ids are skipped.
    ///
    /// # Errors
    ///
    /// Returns validation or store failures; nothing is written on failure.
    pub fn update_many(&self, ids: &[String], patch: &ItemPatch) -> Result<Vec<Item>, RepoError> {
        let valid = validate_patch(patch)?;
        let updated = self.mutate(|cache| {
            let now = self.clock.now();
            let mut out = Vec::new();
            let mut seen = HashSet::new();
            for id in ids {
                if !seen.insert(id.as_str()) {
                    continue;
                }
                let Some(slot) = cache.slot(id).filter(|&s| cache.items[s].is_active()) else {
                    continue;
                };
                let item = &mut cache.items[slot];
                if let Some(text) = valid.text.as_ref()
                    && *text != item.text
                {
                    cache.index.remove(&item.text, &item.id);
                    cache
                        .index
                        .insert(text, &item.id, item.created_at, slot);
                }
                apply_patch(item, &valid, now);
                out.push(item.clone());
            }
            Ok((!out.is_empty()).then_some(out))
        })?;
        Ok(updated.unwrap_or_default())
    }

    /// Mark one active item deleted. Children and every other row are untouched.
    ///
    /// # Errors
    ///
    /// Returns store failures. A missing or already-deleted id is `Ok(None)`.
    pub fn soft_delete(&self, id: &str) -> Result<Option<Item>, RepoError> {
        let mut deleted = self.soft_delete_many(&[id.to_string()])?;
        Ok(deleted.pop())
    }

    /// Soft-delete every active id in `ids` with a single write.
    ///
    /// # Errors
    ///
    /// Returns store failures; nothing is deleted on failure.
    pub fn soft_delete_many(&self, ids: &[String]) -> Result<Vec<Item>, RepoError> {
        let deleted = self.mutate(|cache| {
            let now = self.clock.now();
            let mut out = Vec::new();
            for id in ids {
                let Some(slot) = cache.slot(id).filter(|&s| cache.items[s].is_active()) else {
                    continue;
                };
                let item = &mut cache.items[slot];
                item.deleted_at = Some(now);
                item.updated_at = now;
                cache.index.remove(&item.text, &item.id);
                out.push(item.clone());
            }
            Ok((!out.is_empty()).then_some(out))
        })?;
        let deleted = deleted.unwrap_or_default();
        if !deleted.is_empty() {
            info!(count = deleted.len(), "soft-deleted items");
        }
        Ok(deleted)
    }

    /// Clear `deletedAt` on a soft-deleted item.
    ///
    /// # Errors
    ///
    /// Returns store failures. A missing or active id is `Ok(None)`.
    pub fn restore(&self, id: &str) -> Result<Option<Item>, RepoError> {
        let restored = self.mutate(|cache| {
            let Some(slot) = cache.slot(id).filter(|&s| !cache.items[s].is_active()) else {
                return Ok(None);
            };
            let now = self.clock.now();
            let item = &mut cache.items[slot];
            item.deleted_at = None;
            item.updated_at = now;
            cache
                .index
                .insert(&item.text, &item.id, item.created_at, slot);
            Ok(Some(item.clone()))
        })?;
        if restored.is_some() {
            info!(id, "restored item");
        }
        Ok(restored)
    }

    /// Reparent and/or reorder an active item.
    ///
    /// `new_parent = None` makes the item a root. Omitted `position` appends
    /// after the new siblings.
    ///
    /// # Errors
    ///
    /// Returns [`Constraint::SelfReference`] when the move would make the item
    /// its own ancestor and [`Constraint::InvalidReference`] for an unknown or
    /// deleted parent.
    pub fn move_item(
        &self,
        id: &str,
        new_parent: Option<&str>,
        position: Option<i64>,
    ) -> Result<Option<Item>, RepoError> {
        let position = position
            .map(|p| check_non_negative("position", p))
            .transpose()
            .map_err(ValidationErrors::single)?;

        self.mutate(|cache| {
            let Some(slot) = cache.slot(id).filter(|&s| cache.items[s].is_active()) else {
                return Ok(None);
            };

            if let Some(parent) = new_parent {
                if cache.active(parent).is_none() {
                    return Err(ValidationErrors::single(ValidationError::new(
                        "parentId",
                        Constraint::InvalidReference,
                        format!("parent '{parent}' does not exist or is deleted"),
                    ))
                    .into());
                }
                if is_ancestor_or_self(cache, id, parent) {
                    return Err(ValidationErrors::single(ValidationError::new(
                        "parentId",
                        Constraint::SelfReference,
                        format!("'{parent}' is '{id}' or one of its descendants"),
                    ))
                    .into());
                }
            }

            let position = position.unwrap_or_else(|| cache.next_position(new_parent, Some(id)));
            let now = self.clock.now();
            let item = &mut cache.items[slot];
            item.parent_id = new_parent.map(str::to_string);
            item.position = position;
            item.updated_at = now;
            Ok(Some(item.clone()))
        })
    }

    /// Hard-delete `id` and all of its descendants, active or not.
    ///
    /// Achievement rows referencing purged items are left in the ledger.
    /// Returns the ids removed; empty when `id` does not exist.
    ///
    /// # Errors
    ///
    /// Returns store failures; nothing is removed on failure.
    pub fn purge(&self, id: &str) -> Result<Vec<String>, RepoError> {
        let removed = self.mutate(|cache| {
            if cache.get(id).is_none() {
                return Ok(None);
            }
            let doomed = subtree_ids(cache, id);
            let mut kept = std::mem::take(&mut cache.items);
            kept.retain(|item| !doomed.contains(&item.id));
            let fp = cache.fingerprint.unwrap_or_default();
            *cache = ItemCache::load(fp, kept);
            let mut ids: Vec<String> = doomed.into_iter().collect();
            ids.sort();
            Ok(Some(ids))
        })?;
        let removed = removed.unwrap_or_default();
        if !removed.is_empty() {
            info!(id, count = removed.len(), "purged item subtree");
        }
        Ok(removed)
    }

    // -----------------------------------------------------------------------
    // Reads
    // -----------------------------------------------------------------------

    /// Fetch one item. Deleted rows are returned only when asked for.
    ///
    /// # Errors
    ///
    /// Propagates store read failures.
    pub fn get_by_id(&self, id: &str, include_deleted: bool) -> Result<Option<Item>, StoreError> {
        self.read(|cache| {
            cache
                .get(id)
                .filter(|item| include_deleted || item.is_active())
                .cloned()
        })
    }

    /// Children of `parent_id` ordered by `position`.
    ///
    /// # Errors
    ///
    /// Propagates store read failures.
    pub fn get_children(
        &self,
        parent_id: &str,
        include_deleted: bool,
    ) -> Result<Vec<Item>, StoreError> {
        self.read(|cache| {
            let mut children: Vec<Item> = cache
                .items
                .iter()
                .filter(|i| i.parent_id.as_deref() == Some(parent_id))
                .filter(|i| include_deleted || i.is_active())
                .cloned()
                .collect();
            sort_by_position(&mut children);
            children
        })
    }

    /// Active root items ordered by `position`.
    ///
    /// # Errors
    ///
    /// Propagates store read failures.
    pub fn get_roots(&self) -> Result<Vec<Item>, StoreError> {
        self.read(|cache| {
            let mut roots: Vec<Item> = cache
                .items
                .iter()
                .filter(|i| i.is_root() && i.is_active())
                .cloned()
                .collect();
            sort_by_position(&mut roots);
            roots
        })
    }

    /// Active items whose text equals `text` case-insensitively, oldest first.
    ///
    /// # Errors
    ///
    /// Propagates store read failures.
    pub fn get_by_text(&self, text: &str) -> Result<Vec<Item>, StoreError> {
        self.read(|cache| {
            cache
                .index
                .group(text)
                .into_iter()
                .filter_map(|id| cache.get(id).cloned())
                .collect()
        })
    }

    /// Every active item in store order.
    ///
    /// # Errors
    ///
    /// Propagates store read failures.
    pub fn get_all_active(&self) -> Result<Vec<Item>, StoreError> {
        self.read(|cache| cache.items.iter().filter(|i| i.is_active()).cloned().collect())
    }

    /// Every row, deleted included, in store order.
    ///
    /// # Errors
    ///
    /// Propagates store read failures.
    pub fn get_all(&self) -> Result<Vec<Item>, StoreError> {
        self.read(|cache| cache.items.clone())
    }

    /// Soft-deleted rows, most recently deleted first.
    ///
    /// # Errors
    ///
    /// Propagates store read failures.
    pub fn list_deleted(&self) -> Result<Vec<Item>, StoreError> {
        self.read(|cache| {
            let mut deleted: Vec<Item> = cache
                .items
                .iter()
                .filter(|i| !i.is_active())
                .cloned()
                .collect();
            deleted.sort_by(|a, b| b.deleted_at.cmp(&a.deleted_at));
            deleted
        })
    }

    /// Next free sibling position under `parent_id` (`None` = roots).
    ///
    /// # Errors
    ///
    /// Propagates store read failures.
    pub fn next_position(&self, parent_id: Option<&str>) -> Result<u32, StoreError> {
        self.read(|cache| cache.next_position(parent_id, None))
    }

    /// Number of text groups with more than one active member.
    ///
    /// # Errors
    ///
    /// Propagates store read failures.
    pub fn linked_group_count(&self) -> Result<usize, StoreError> {
        self.read(|cache| cache.index.linked_group_count())
    }
}

fn apply_patch(item: &mut Item, patch: &ValidPatch, now: chrono::DateTime<chrono::Utc>) {
    if let Some(text) = patch.text.as_ref() {
        item.text.clone_from(text);
    }
    if let Some(kind) = patch.kind {
        item.kind = kind;
    }
    if let Some(position) = patch.position {
        item.position = position;
    }
    if let Some(points) = patch.points {
        item.points = points;
    }
    if let Some(completed) = patch.completed {
        item.set_completed(completed, now);
    }
    item.updated_at = now;
}

/// Whether `candidate` is `id` itself or sits beneath it.
fn is_ancestor_or_self(cache: &ItemCache, id: &str, candidate: &str) -> bool {
    let mut current = Some(candidate);
    let mut hops = 0;
    while let Some(cur) = current {
        if cur == id {
            return true;
        }
        hops += 1;
        if hops > cache.items.len() {
            return false;
        }
        current = cache.get(cur).and_then(|i| i.parent_id.as_deref());
    }
    false
}

fn subtree_ids(cache: &ItemCache, root: &str) -> HashSet<String> {
    let mut children: HashMap<&str, Vec<&str>> = HashMap::new();
    for item in &cache.items {
        if let Some(parent) = item.parent_id.as_deref() {
            children.entry(parent).or_default().push(item.id.as_str());
        }
    }

    let mut doomed = HashSet::new();
    let mut stack = vec![root];
    while let Some(id) = stack.pop() {
        if !doomed.insert(id.to_string()) {
            continue;
        }
        if let Some(kids) = children.get(id) {
            stack.extend(kids.iter().copied());
        }
    }
    doomed
}
