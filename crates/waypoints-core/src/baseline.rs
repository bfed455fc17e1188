//! Daily baseline tracker.
//!
//! At most one [`DailyBaselineRecord`] exists per (owner, date). The store has
//! no uniqueness constraint, so [`DailyBaselineTracker::ensure_daily_baseline`]
//! looks before it writes and returns the existing row when there is one.

use crate::clock::Clock;
use crate::id::IdGenerator;
use crate::ledger::AchievementLedger;
use crate::model::{DEFAULT_BASELINE_POINTS, DailyBaselineRecord, DaySummary};
use crate::repo::RepoError;
use crate::store::{Bucket, Store, StoreError, load_list, save_list};
use crate::validate::{NewBaseline, validate_baseline};
use chrono::{Days, NaiveDate};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::debug;

pub struct DailyBaselineTracker<S: Store> {
    store: S,
    clock: Arc<dyn Clock>,
    ids: Arc<dyn IdGenerator>,
    default_points: u32,
}

impl<S: Store> std::fmt::Debug for DailyBaselineTracker<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DailyBaselineTracker")
            .field("default_points", &self.default_points)
            .finish_non_exhaustive()
    }
}

impl<S: Store> DailyBaselineTracker<S> {
    pub fn new(store: S, clock: Arc<dyn Clock>, ids: Arc<dyn IdGenerator>) -> Self {
        Self {
            store,
            clock,
            ids,
            default_points: DEFAULT_BASELINE_POINTS,
        }
    }

    /// Points granted to days created by [`Self::ensure_daily_baseline`].
    #[must_use]
    pub fn with_default_points(mut self, points: u32) -> Self {
        self.default_points = points;
        self
    }

    fn load(&self) -> Result<Vec<DailyBaselineRecord>, StoreError> {
        load_list(&self.store, Bucket::DailyBaselines)
    }

    /// Return the record for (owner, date), creating it with the default
    /// points if it does not exist yet.
    ///
    /// # Errors
    ///
    /// Propagates store failures.
    pub fn ensure_daily_baseline(
        &self,
        owner_id: Option<&str>,
        date: NaiveDate,
    ) -> Result<DailyBaselineRecord, RepoError> {
        self.ensure(&NewBaseline {
            owner_id: owner_id.map(str::to_string),
            date: date.format("%Y-%m-%d").to_string(),
            baseline_points: i64::from(self.default_points),
        })
    }

    /// Validated form of [`Self::ensure_daily_baseline`] taking raw input.
    ///
    /// An existing row wins: `baseline_points` only applies on first creation.
    ///
    /// # Errors
    ///
    /// Returns validation failures for a malformed date or negative points.
    pub fn ensure(&self, input: &NewBaseline) -> Result<DailyBaselineRecord, RepoError> {
        let valid = validate_baseline(input)?;
        let mut rows = self.load()?;
        if let Some(existing) = rows
            .iter()
            .find(|r| r.owner_id == valid.owner_id && r.date == valid.date)
        {
            return Ok(existing.clone());
        }

        let record = DailyBaselineRecord {
            id: self.ids.next_id(),
            owner_id: valid.owner_id,
            date: valid.date,
            baseline_points: valid.baseline_points,
            created_at: self.clock.now(),
        };
        rows.push(record.clone());
        save_list(&self.store, Bucket::DailyBaselines, &rows)?;
        debug!(date = %record.date, "created daily baseline");
        Ok(record)
    }

    /// The record for (owner, date), if one was created.
    ///
    /// # Errors
    ///
    /// Propagates store read failures.
    pub fn get(
        &self,
        owner_id: Option<&str>,
        date: NaiveDate,
    ) -> Result<Option<DailyBaselineRecord>, StoreError> {
        Ok(self
            .load()?
            .into_iter()
            .find(|r| r.owner_id.as_deref() == owner_id && r.date == date))
    }

    /// Baseline plus achievement points for one day.
    ///
    /// A day without a record contributes the default baseline.
    ///
    /// # Errors
    ///
    /// Propagates store read failures.
    pub fn day_total<L: Store>(
        &self,
        ledger: &AchievementLedger<L>,
        owner_id: Option<&str>,
        date: NaiveDate,
    ) -> Result<DaySummary, StoreError> {
        Ok(self
            .history(ledger, owner_id, date, date)?
            .into_iter()
            .next()
            .unwrap_or_else(|| summary(date, self.default_points, 0, 0)))
    }

    /// One summary per calendar day in `[start, end]`, oldest first.
    ///
    /// # Errors
    ///
    /// Propagates store read failures.
    pub fn history<L: Store>(
        &self,
        ledger: &AchievementLedger<L>,
        owner_id: Option<&str>,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<DaySummary>, StoreError> {
        if end < start {
            return Ok(Vec::new());
        }

        let baselines: HashMap<NaiveDate, u32> = self
            .load()?
            .into_iter()
            .filter(|r| r.owner_id.as_deref() == owner_id)
            .map(|r| (r.date, r.baseline_points))
            .collect();

        let mut earned: HashMap<NaiveDate, (u64, usize)> = HashMap::new();
        for record in ledger.list_in_range(start, end, owner_id)? {
            let entry = earned.entry(record.achieved_on()).or_default();
            entry.0 += u64::from(record.points_earned);
            entry.1 += 1;
        }

        let mut days = Vec::new();
        let mut date = start;
        while date <= end {
            let baseline = baselines.get(&date).copied().unwrap_or(self.default_points);
            let (points, count) = earned.get(&date).copied().unwrap_or_default();
            days.push(summary(date, baseline, points, count));
            let Some(next) = date.checked_add_days(Days::new(1)) else {
                break;
            };
            date = next;
        }
        Ok(days)
    }

    /// Every baseline row regardless of owner, in store order.
    ///
    /// # Errors
    ///
    /// Propagates store read failures.
    pub fn all(&self) -> Result<Vec<DailyBaselineRecord>, StoreError> {
        self.load()
    }
}

fn summary(date: NaiveDate, baseline: u32, achievement_points: u64, achievements: usize) -> DaySummary {
    DaySummary {
        date,
        baseline_points: baseline,
        achievement_points,
        achievements,
        total: u64::from(baseline) + achievement_points,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::id::SequentialIds;
    use crate::store::MemoryStore;
    use chrono::{TimeZone, Utc};
    use std::rc::Rc;

    fn date(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 7, d).expect("valid date")
    }

    fn setup() -> (
        DailyBaselineTracker<Rc<MemoryStore>>,
        AchievementLedger<Rc<MemoryStore>>,
        Rc<MemoryStore>,
    ) {
        let store = Rc::new(MemoryStore::new());
        let start = Utc
            .with_ymd_and_hms(2026, 7, 2, 9, 0, 0)
            .single()
            .expect("valid instant");
        let clock = Arc::new(ManualClock::new(start));
        let ids = Arc::new(SequentialIds::new("row"));
        let tracker = DailyBaselineTracker::new(Rc::clone(&store), clock.clone(), ids.clone());
        let ledger = AchievementLedger::new(Rc::clone(&store), clock, ids);
        (tracker, ledger, store)
    }

    #[test]
    fn ensure_is_idempotent_per_owner_and_date() {
        let (tracker, _, _) = setup();
        let first = tracker.ensure_daily_baseline(None, date(2)).expect("ensure");
        let again = tracker.ensure_daily_baseline(None, date(2)).expect("ensure");
        assert_eq!(first.id, again.id);
        assert_eq!(first.baseline_points, DEFAULT_BASELINE_POINTS);
        assert_eq!(tracker.all().expect("read").len(), 1);

        let other_owner = tracker
            .ensure_daily_baseline(Some("acct"), date(2))
            .expect("ensure");
        assert_ne!(other_owner.id, first.id);
        assert_eq!(tracker.all().expect("read").len(), 2);
    }

    #[test]
    fn explicit_points_only_apply_on_creation() {
        let (tracker, _, _) = setup();
        let created = tracker
            .ensure(&NewBaseline {
                owner_id: None,
                date: "2026-07-03".into(),
                baseline_points: 20,
            })
            .expect("ensure");
        let existing = tracker
            .ensure(&NewBaseline {
                owner_id: None,
                date: "2026-07-03".into(),
                baseline_points: 50,
            })
            .expect("ensure");
        assert_eq!(existing, created);
        assert_eq!(existing.baseline_points, 20);
    }

    #[test]
    fn day_total_adds_achievements_on_that_day() {
        let (tracker, ledger, _) = setup();
        tracker.ensure_daily_baseline(None, date(2)).expect("ensure");
        ledger.record_completion(None, "a", 25).expect("record");
        ledger.record_completion(None, "b", 5).expect("record");

        let today = tracker.day_total(&ledger, None, date(2)).expect("total");
        assert_eq!(today.total, 40);
        assert_eq!(today.achievements, 2);

        let untracked = tracker.day_total(&ledger, None, date(9)).expect("total");
        assert_eq!(untracked.total, u64::from(DEFAULT_BASELINE_POINTS));
    }

    #[test]
    fn history_covers_every_day_in_range() {
        let (tracker, ledger, _) = setup();
        ledger.record_completion(None, "a", 5).expect("record");
        let days = tracker.history(&ledger, None, date(1), date(3)).expect("history");
        let totals: Vec<u64> = days.iter().map(|d| d.total).collect();
        assert_eq!(totals, vec![10, 15, 10]);
        assert!(tracker.history(&ledger, None, date(3), date(1)).expect("history").is_empty());
    }

    #[test]
    fn malformed_date_is_rejected() {
        let (tracker, _, store) = setup();
        let err = tracker
            .ensure(&NewBaseline {
                owner_id: None,
                date: "07/02/2026".into(),
                baseline_points: 10,
            })
            .expect_err("bad date");
        assert!(err.validation().is_some_and(|e| e.has_field("date")));
        assert!(store.raw(Bucket::DailyBaselines).is_none());
    }
}
