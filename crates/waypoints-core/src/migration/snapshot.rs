//! Export stage: a full, self-describing copy of the local buckets.

use crate::clock::Clock;
use crate::model::{AchievementRecord, DailyBaselineRecord, Item, UserProfile};
use crate::store::{Bucket, Store, StoreError, load_list, load_value};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;

/// Snapshot layout written by this build.
pub const SNAPSHOT_FORMAT_VERSION: u32 = 1;

/// Declared row counts, checked against the arrays on validation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SnapshotCounts {
    pub items: usize,
    pub achievements: usize,
    pub daily_baselines: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MigrationSnapshot {
    pub format_version: u32,
    pub exported_at: DateTime<Utc>,
    pub counts: SnapshotCounts,
    pub items: Vec<Item>,
    pub achievements: Vec<AchievementRecord>,
    pub daily_baselines: Vec<DailyBaselineRecord>,
    #[serde(default)]
    pub profile: Option<UserProfile>,
}

impl MigrationSnapshot {
    /// Build a snapshot whose declared counts match its arrays.
    #[must_use]
    pub fn new(
        exported_at: DateTime<Utc>,
        items: Vec<Item>,
        achievements: Vec<AchievementRecord>,
        daily_baselines: Vec<DailyBaselineRecord>,
        profile: Option<UserProfile>,
    ) -> Self {
        Self {
            format_version: SNAPSHOT_FORMAT_VERSION,
            exported_at,
            counts: SnapshotCounts {
                items: items.len(),
                achievements: achievements.len(),
                daily_baselines: daily_baselines.len(),
            },
            items,
            achievements,
            daily_baselines,
            profile,
        }
    }

    #[must_use]
    pub const fn actual_counts(&self) -> SnapshotCounts {
        SnapshotCounts {
            items: self.items.len(),
            achievements: self.achievements.len(),
            daily_baselines: self.daily_baselines.len(),
        }
    }
}

/// Read every bucket into a snapshot. Soft-deleted items are included.
///
/// # Errors
///
/// Propagates backend read failures.
pub fn export_snapshot(
    store: &(impl Store + ?Sized),
    clock: &dyn Clock,
) -> Result<MigrationSnapshot, StoreError> {
    let items: Vec<Item> = load_list(store, Bucket::Items)?;
    let achievements: Vec<AchievementRecord> = load_list(store, Bucket::Achievements)?;
    let baselines: Vec<DailyBaselineRecord> = load_list(store, Bucket::DailyBaselines)?;
    let profile: Option<UserProfile> = load_value(store, Bucket::UserProfile)?;
    tracing::debug!(
        items = items.len(),
        achievements = achievements.len(),
        baselines = baselines.len(),
        "exported local snapshot"
    );
    Ok(MigrationSnapshot::new(
        clock.now(),
        items,
        achievements,
        baselines,
        profile,
    ))
}

/// A snapshot defect that blocks migration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SnapshotIssue {
    UnsupportedVersion {
        found: u32,
        expected: u32,
    },
    CountMismatch {
        collection: &'static str,
        declared: usize,
        actual: usize,
    },
    DuplicateId {
        collection: &'static str,
        id: String,
    },
}

impl fmt::Display for SnapshotIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::UnsupportedVersion { found, expected } => {
                write!(f, "snapshot format {found} is not supported (expected {expected})")
            }
            Self::CountMismatch {
                collection,
                declared,
                actual,
            } => write!(
                f,
                "{collection}: declared {declared} rows but found {actual}"
            ),
            Self::DuplicateId { collection, id } => write!(f, "{collection}: duplicate id {id}"),
        }
    }
}

/// Outcome of [`validate_snapshot`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SnapshotReport {
    pub errors: Vec<SnapshotIssue>,
    pub warnings: Vec<String>,
}

impl SnapshotReport {
    #[must_use]
    pub const fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }
}

fn check_count(
    errors: &mut Vec<SnapshotIssue>,
    collection: &'static str,
    declared: usize,
    actual: usize,
) {
    if declared != actual {
        errors.push(SnapshotIssue::CountMismatch {
            collection,
            declared,
            actual,
        });
    }
}

fn check_unique<'a>(
    errors: &mut Vec<SnapshotIssue>,
    collection: &'static str,
    ids: impl Iterator<Item = &'a str>,
) {
    let mut seen = HashSet::new();
    for id in ids {
        if !seen.insert(id) {
            errors.push(SnapshotIssue::DuplicateId {
                collection,
                id: id.to_string(),
            });
        }
    }
}

/// Check internal consistency before anything leaves the machine.
///
/// Dangling parent or item references are warnings: purge and soft delete
/// legitimately produce them.
#[must_use]
pub fn validate_snapshot(snapshot: &MigrationSnapshot) -> SnapshotReport {
    let mut report = SnapshotReport::default();

    if snapshot.format_version != SNAPSHOT_FORMAT_VERSION {
        report.errors.push(SnapshotIssue::UnsupportedVersion {
            found: snapshot.format_version,
            expected: SNAPSHOT_FORMAT_VERSION,
        });
    }

    let declared = snapshot.counts;
    let actual = snapshot.actual_counts();
    check_count(&mut report.errors, "items", declared.items, actual.items);
    check_count(
        &mut report.errors,
        "achievements",
        declared.achievements,
        actual.achievements,
    );
    check_count(
        &mut report.errors,
        "dailyBaselines",
        declared.daily_baselines,
        actual.daily_baselines,
    );

    check_unique(
        &mut report.errors,
        "items",
        snapshot.items.iter().map(|i| i.id.as_str()),
    );
    check_unique(
        &mut report.errors,
        "achievements",
        snapshot.achievements.iter().map(|a| a.id.as_str()),
    );

    let item_ids: HashSet<&str> = snapshot.items.iter().map(|i| i.id.as_str()).collect();
    for item in &snapshot.items {
        if let Some(parent) = item.parent_id.as_deref()
            && !item_ids.contains(parent)
        {
            report
                .warnings
                .push(format!("item {} references missing parent {parent}", item.id));
        }
    }
    let orphaned = snapshot
        .achievements
        .iter()
        .filter(|a| !item_ids.contains(a.item_id.as_str()))
        .count();
    if orphaned > 0 {
        report.warnings.push(format!(
            "{orphaned} achievement(s) reference purged items; history is kept"
        ));
    }

    report
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::model::ItemKind;
    use crate::store::{MemoryStore, save_list};

    fn item(id: &str, parent: Option<&str>) -> Item {
        let now = Utc::now();
        Item {
            id: id.into(),
            owner_id: None,
            text: id.to_uppercase(),
            kind: ItemKind::Step,
            parent_id: parent.map(str::to_string),
            position: 0,
            completed: false,
            completed_at: None,
            points: 5,
            deleted_at: None,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn exported_snapshot_validates_cleanly() {
        let store = MemoryStore::new();
        save_list(&store, Bucket::Items, &[item("a", None), item("b", Some("a"))]).expect("seed");
        let snapshot = export_snapshot(&store, &ManualClock::from_millis(0)).expect("export");
        assert_eq!(snapshot.counts.items, 2);
        let report = validate_snapshot(&snapshot);
        assert!(report.is_valid(), "{:?}", report.errors);
        assert!(report.warnings.is_empty());
    }

    #[test]
    fn truncated_array_reports_count_mismatch() {
        let snapshot = MigrationSnapshot::new(
            Utc::now(),
            vec![item("a", None), item("b", None), item("c", None)],
            Vec::new(),
            Vec::new(),
            None,
        );
        let mut json = serde_json::to_value(&snapshot).expect("serialize");
        json["items"]
            .as_array_mut()
            .expect("items array")
            .truncate(1);
        let truncated: MigrationSnapshot = serde_json::from_value(json).expect("deserialize");

        let report = validate_snapshot(&truncated);
        assert_eq!(
            report.errors,
            vec![SnapshotIssue::CountMismatch {
                collection: "items",
                declared: 3,
                actual: 1
            }]
        );
    }

    #[test]
    fn duplicate_ids_and_versions_are_errors() {
        let mut snapshot = MigrationSnapshot::new(
            Utc::now(),
            vec![item("a", None), item("a", None)],
            Vec::new(),
            Vec::new(),
            None,
        );
        snapshot.format_version = 99;
        let report = validate_snapshot(&snapshot);
        assert_eq!(report.errors.len(), 2);
        assert!(matches!(report.errors[0], SnapshotIssue::UnsupportedVersion { found: 99, .. }));
    }

    #[test]
    fn dangling_parent_is_only_a_warning() {
        let snapshot =
            MigrationSnapshot::new(Utc::now(), vec![item("b", Some("gone"))], Vec::new(), Vec::new(), None);
        let report = validate_snapshot(&snapshot);
        assert!(report.is_valid());
        assert_eq!(report.warnings.len(), 1);
    }
}
