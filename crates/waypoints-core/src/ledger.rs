//! Achievement ledger: one immutable receipt per completion event.
//!
//! `points_earned` is captured by value. Nothing here reads the live item, so
//! editing or deleting an item never changes historical totals. Revoking a
//! completion hard-deletes the receipt and leaves the item alone.

use crate::clock::Clock;
use crate::id::IdGenerator;
use crate::model::AchievementRecord;
use crate::repo::RepoError;
use crate::store::{Bucket, Store, StoreError, load_list, save_list};
use crate::validate::{NewAchievement, validate_achievement};
use chrono::NaiveDate;
use std::sync::Arc;
use tracing::info;

/// Append/remove access to the achievements bucket.
pub struct AchievementLedger<S: Store> {
    store: S,
    clock: Arc<dyn Clock>,
    ids: Arc<dyn IdGenerator>,
}

impl<S: Store> std::fmt::Debug for AchievementLedger<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AchievementLedger").finish_non_exhaustive()
    }
}

fn owned_by(record: &AchievementRecord, owner_id: Option<&str>) -> bool {
    record.owner_id.as_deref() == owner_id
}

impl<S: Store> AchievementLedger<S> {
    pub fn new(store: S, clock: Arc<dyn Clock>, ids: Arc<dyn IdGenerator>) -> Self {
        Self { store, clock, ids }
    }

    fn load(&self) -> Result<Vec<AchievementRecord>, StoreError> {
        load_list(&self.store, Bucket::Achievements)
    }

    /// Write a receipt for `item_id` worth `points_earned`, achieved now.
    ///
    /// # Errors
    ///
    /// Returns validation failures for a blank item id or negative points,
    /// and store failures when the write is rejected.
    pub fn record_completion(
        &self,
        owner_id: Option<&str>,
        item_id: &str,
        points_earned: i64,
    ) -> Result<AchievementRecord, RepoError> {
        let valid = validate_achievement(&NewAchievement {
            owner_id: owner_id.map(str::to_string),
            item_id: item_id.to_string(),
            points_earned,
        })?;

        let now = self.clock.now();
        let record = AchievementRecord {
            id: self.ids.next_id(),
            owner_id: valid.owner_id,
            item_id: valid.item_id,
            points_earned: valid.points_earned,
            achieved_at: now,
            created_at: now,
        };

        let mut rows = self.load()?;
        rows.push(record.clone());
        save_list(&self.store, Bucket::Achievements, &rows)?;
        info!(
            item_id = %record.item_id,
            points = record.points_earned,
            "recorded achievement"
        );
        Ok(record)
    }

    /// Remove one receipt by id. Returns the removed row, or `None` if unknown.
    ///
    /// # Errors
    ///
    /// Propagates store failures.
    pub fn revoke_completion(
        &self,
        achievement_id: &str,
    ) -> Result<Option<AchievementRecord>, StoreError> {
        let mut rows = self.load()?;
        let Some(at) = rows.iter().position(|r| r.id == achievement_id) else {
            return Ok(None);
        };
        let removed = rows.remove(at);
        save_list(&self.store, Bucket::Achievements, &rows)?;
        info!(achievement_id, item_id = %removed.item_id, "revoked achievement");
        Ok(Some(removed))
    }

    /// Remove the most recent receipt for `item_id`, if any.
    ///
    /// # Errors
    ///
    /// Propagates store failures.
    pub fn revoke_latest_for_item(
        &self,
        item_id: &str,
    ) -> Result<Option<AchievementRecord>, StoreError> {
        let latest = self
            .list_for_item(item_id)?
            .into_iter()
            .next_back()
            .map(|r| r.id);
        match latest {
            Some(id) => self.revoke_completion(&id),
            None => Ok(None),
        }
    }

    /// Receipts for `owner_id`, oldest first.
    ///
    /// # Errors
    ///
    /// Propagates store read failures.
    pub fn list_for_owner(
        &self,
        owner_id: Option<&str>,
    ) -> Result<Vec<AchievementRecord>, StoreError> {
        let mut rows: Vec<_> = self
            .load()?
            .into_iter()
            .filter(|r| owned_by(r, owner_id))
            .collect();
        rows.sort_by_key(|r| r.achieved_at);
        Ok(rows)
    }

    /// Receipts for `item_id`, oldest first. Survives item deletion.
    ///
    /// # Errors
    ///
    /// Propagates store read failures.
    pub fn list_for_item(&self, item_id: &str) -> Result<Vec<AchievementRecord>, StoreError> {
        let mut rows: Vec<_> = self
            .load()?
            .into_iter()
            .filter(|r| r.item_id == item_id)
            .collect();
        rows.sort_by_key(|r| r.achieved_at);
        Ok(rows)
    }

    /// Receipts for `owner_id` achieved on a UTC day in `[start, end]`.
    ///
    /// # Errors
    ///
    /// Propagates store read failures.
    pub fn list_in_range(
        &self,
        start: NaiveDate,
        end: NaiveDate,
        owner_id: Option<&str>,
    ) -> Result<Vec<AchievementRecord>, StoreError> {
        Ok(self
            .list_for_owner(owner_id)?
            .into_iter()
            .filter(|r| (start..=end).contains(&r.achieved_on()))
            .collect())
    }

    /// Sum of `points_earned` for `owner_id` over `[start, end]`, inclusive.
    ///
    /// # Errors
    ///
    /// Propagates store read failures.
    pub fn sum_in_range(
        &self,
        start: NaiveDate,
        end: NaiveDate,
        owner_id: Option<&str>,
    ) -> Result<u64, StoreError> {
        Ok(self
            .list_in_range(start, end, owner_id)?
            .iter()
            .map(|r| u64::from(r.points_earned))
            .sum())
    }

    /// Every receipt regardless of owner, in store order.
    ///
    /// # Errors
    ///
    /// Propagates store read failures.
    pub fn all(&self) -> Result<Vec<AchievementRecord>, StoreError> {
        self.load()
    }
}
