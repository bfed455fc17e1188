//! Remap stage: claim local rows for the authenticated account.
//!
//! Only `ownerId` may change. Every id and timestamp must come out exactly as
//! it went in; [`verify_preserved`] enforces that and any drift aborts the
//! migration.

use super::ConsistencyError;
use super::snapshot::MigrationSnapshot;
use crate::model::{AchievementRecord, DailyBaselineRecord, Item};
use chrono::{DateTime, Utc};

/// Result of remapping a snapshot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Remapped {
    pub snapshot: MigrationSnapshot,
    /// Rows whose owner changed from local to the account.
    pub claimed: usize,
    /// Rows owned by a different account, dropped from the migration.
    pub skipped: Vec<String>,
}

fn claim(owner: &mut Option<String>, account_id: &str) -> Claim {
    match owner.as_deref() {
        None | Some("") => {
            *owner = Some(account_id.to_string());
            Claim::Claimed
        }
        Some(existing) if existing == account_id => Claim::AlreadyOwned,
        Some(_) => Claim::Foreign,
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Claim {
    Claimed,
    AlreadyOwned,
    Foreign,
}

/// Rewrite local owner ids to `account_id` and verify nothing else moved.
///
/// Rows already owned by another account are left out and reported in
/// [`Remapped::skipped`].
///
/// # Errors
///
/// Returns [`ConsistencyError`] if any id or timestamp drifted.
pub fn remap_owner(
    snapshot: &MigrationSnapshot,
    account_id: &str,
) -> Result<Remapped, ConsistencyError> {
    let mut claimed = 0;
    let mut claim_row = |owner: &Option<String>| {
        let mut owner = owner.clone();
        if claim(&mut owner, account_id) == Claim::Claimed {
            claimed += 1;
        }
        owner
    };

    let mut remapped = snapshot.clone();
    remapped.items = snapshot
        .items
        .iter()
        .filter(|i| !is_foreign(i.owner_id.as_deref(), account_id))
        .map(|i| Item {
            owner_id: claim_row(&i.owner_id),
            ..i.clone()
        })
        .collect();
    remapped.achievements = snapshot
        .achievements
        .iter()
        .filter(|a| !is_foreign(a.owner_id.as_deref(), account_id))
        .map(|a| AchievementRecord {
            owner_id: claim_row(&a.owner_id),
            ..a.clone()
        })
        .collect();
    remapped.daily_baselines = snapshot
        .daily_baselines
        .iter()
        .filter(|b| !is_foreign(b.owner_id.as_deref(), account_id))
        .map(|b| DailyBaselineRecord {
            owner_id: claim_row(&b.owner_id),
            ..b.clone()
        })
        .collect();
    remapped.counts = remapped.actual_counts();

    let skipped = snapshot
        .items
        .iter()
        .filter(|i| is_foreign(i.owner_id.as_deref(), account_id))
        .map(|i| i.id.clone())
        .collect();

    verify_preserved(snapshot, &remapped, account_id)?;
    Ok(Remapped {
        snapshot: remapped,
        claimed,
        skipped,
    })
}

fn is_foreign(owner: Option<&str>, account_id: &str) -> bool {
    matches!(owner, Some(o) if !o.is_empty() && o != account_id)
}

fn check_len(collection: &'static str, before: usize, after: usize) -> Result<(), ConsistencyError> {
    if before == after {
        Ok(())
    } else {
        Err(ConsistencyError::CountDrift {
            collection,
            before,
            after,
        })
    }
}

fn check_id(collection: &'static str, index: usize, before: &str, after: &str) -> Result<(), ConsistencyError> {
    if before == after {
        Ok(())
    } else {
        Err(ConsistencyError::IdDrift {
            collection,
            index,
            before: before.to_string(),
            after: after.to_string(),
        })
    }
}

fn check_time(
    collection: &'static str,
    id: &str,
    field: &'static str,
    before: Option<DateTime<Utc>>,
    after: Option<DateTime<Utc>>,
) -> Result<(), ConsistencyError> {
    if before == after {
        Ok(())
    } else {
        Err(ConsistencyError::TimestampDrift {
            collection,
            id: id.to_string(),
            field,
        })
    }
}

fn check_owner(
    collection: &'static str,
    id: &str,
    owner: Option<&str>,
    account_id: &str,
) -> Result<(), ConsistencyError> {
    if owner == Some(account_id) {
        Ok(())
    } else {
        Err(ConsistencyError::Unclaimed {
            collection,
            id: id.to_string(),
        })
    }
}

/// Compare the exported `source` with its remapped form.
///
/// Rows of `source` owned by another account are expected to be gone. Every
/// other row must keep its position, ids and timestamps, and now belong to
/// `account_id`.
///
/// # Errors
///
/// Returns the first drift found.
pub fn verify_preserved(
    source: &MigrationSnapshot,
    after: &MigrationSnapshot,
    account_id: &str,
) -> Result<(), ConsistencyError> {
    let kept = |owner: &Option<String>| !is_foreign(owner.as_deref(), account_id);

    let items: Vec<&Item> = source.items.iter().filter(|i| kept(&i.owner_id)).collect();
    check_len("items", items.len(), after.items.len())?;
    for (index, (b, a)) in items.into_iter().zip(&after.items).enumerate() {
        check_id("items", index, &b.id, &a.id)?;
        check_time("items", &b.id, "createdAt", Some(b.created_at), Some(a.created_at))?;
        check_time("items", &b.id, "updatedAt", Some(b.updated_at), Some(a.updated_at))?;
        check_time("items", &b.id, "completedAt", b.completed_at, a.completed_at)?;
        check_time("items", &b.id, "deletedAt", b.deleted_at, a.deleted_at)?;
        check_owner("items", &a.id, a.owner_id.as_deref(), account_id)?;
    }

    let achievements: Vec<&AchievementRecord> = source
        .achievements
        .iter()
        .filter(|r| kept(&r.owner_id))
        .collect();
    check_len("achievements", achievements.len(), after.achievements.len())?;
    for (index, (b, a)) in achievements.into_iter().zip(&after.achievements).enumerate() {
        check_id("achievements", index, &b.id, &a.id)?;
        check_id("achievements", index, &b.item_id, &a.item_id)?;
        check_time("achievements", &b.id, "achievedAt", Some(b.achieved_at), Some(a.achieved_at))?;
        check_time("achievements", &b.id, "createdAt", Some(b.created_at), Some(a.created_at))?;
        check_owner("achievements", &a.id, a.owner_id.as_deref(), account_id)?;
    }

    let baselines: Vec<&DailyBaselineRecord> = source
        .daily_baselines
        .iter()
        .filter(|r| kept(&r.owner_id))
        .collect();
    check_len("dailyBaselines", baselines.len(), after.daily_baselines.len())?;
    for (index, (b, a)) in baselines.into_iter().zip(&after.daily_baselines).enumerate() {
        check_id("dailyBaselines", index, &b.id, &a.id)?;
        check_time("dailyBaselines", &b.id, "createdAt", Some(b.created_at), Some(a.created_at))?;
        check_owner("dailyBaselines", &a.id, a.owner_id.as_deref(), account_id)?;
    }

    Ok(())
}
