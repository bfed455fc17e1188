//! Conflict detection between the local snapshot and the remote account.
//!
//! Two rules, checked in order, each local item landing in exactly one
//! bucket:
//!
//! 1. `id_match`: the remote account already has a row with the same id.
//! 2. `text_match`: an *active* local item whose normalized text equals the
//!    text of a remote canonical instance (oldest active remote item with
//!    that text).
//!
//! Conflicts are data, not errors.

use crate::model::Item;
use serde::Serialize;
use std::collections::HashMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ConflictReason {
    IdMatch,
    TextMatch,
}

impl ConflictReason {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::IdMatch => "id_match",
            Self::TextMatch => "text_match",
        }
    }
}

impl std::fmt::Display for ConflictReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConflictRecord {
    pub reason: ConflictReason,
    pub local: Item,
    pub remote: Item,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ConflictReport {
    pub clean: Vec<Item>,
    pub conflicts: Vec<ConflictRecord>,
}

impl ConflictReport {
    #[must_use]
    pub fn count(&self, reason: ConflictReason) -> usize {
        self.conflicts.iter().filter(|c| c.reason == reason).count()
    }
}

/// Trim, collapse internal whitespace runs to one space, lowercase.
#[must_use]
pub fn normalize_text(text: &str) -> String {
    text.split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

/// Classify every local item as clean or conflicting.
#[must_use]
pub fn detect_conflicts(local: &[Item], remote: &[Item]) -> ConflictReport {
    let by_id: HashMap<&str, &Item> = remote.iter().map(|r| (r.id.as_str(), r)).collect();

    // Oldest active remote item per normalized text; ties keep remote order.
    let mut canonical: HashMap<String, &Item> = HashMap::new();
    for candidate in remote.iter().filter(|r| r.is_active()) {
        canonical
            .entry(normalize_text(&candidate.text))
            .and_modify(|current| {
                if candidate.created_at < current.created_at {
                    *current = candidate;
                }
            })
            .or_insert(candidate);
    }

    let mut report = ConflictReport::default();
    for item in local {
        if let Some(remote_row) = by_id.get(item.id.as_str()) {
            report.conflicts.push(ConflictRecord {
                reason: ConflictReason::IdMatch,
                local: item.clone(),
                remote: (*remote_row).clone(),
            });
            continue;
        }

        if item.is_active()
            && let Some(remote_row) = canonical.get(&normalize_text(&item.text))
        {
            report.conflicts.push(ConflictRecord {
                reason: ConflictReason::TextMatch,
                local: item.clone(),
                remote: (*remote_row).clone(),
            });
            continue;
        }

        report.clean.push(item.clone());
    }

    tracing::debug!(
        clean = report.clean.len(),
        id_matches = report.count(ConflictReason::IdMatch),
        text_matches = report.count(ConflictReason::TextMatch),
        "detected migration conflicts"
    );
    report
}
