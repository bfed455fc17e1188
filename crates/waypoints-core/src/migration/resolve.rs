//! Conflict resolution: one strategy applied to the whole batch.

use super::conflict::{ConflictReason, ConflictRecord, ConflictReport};
use crate::id::IdGenerator;
use crate::model::{Item, ParseEnumError};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResolutionStrategy {
    /// Local rows overwrite the remote ones.
    KeepLocal,
    /// Remote rows win; conflicting local rows are discarded.
    KeepCloud,
    /// Keep both sides. An id collision gives the local row a fresh id.
    KeepBoth,
    /// Later `updatedAt` wins; ties go to the remote row.
    #[default]
    KeepNewest,
    /// Resolve nothing and hand every conflict back to the caller.
    ManualReview,
}

impl ResolutionStrategy {
    pub const ALL: [Self; 5] = [
        Self::KeepLocal,
        Self::KeepCloud,
        Self::KeepBoth,
        Self::KeepNewest,
        Self::ManualReview,
    ];

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::KeepLocal => "keep_local",
            Self::KeepCloud => "keep_cloud",
            Self::KeepBoth => "keep_both",
            Self::KeepNewest => "keep_newest",
            Self::ManualReview => "manual_review",
        }
    }
}

impl fmt::Display for ResolutionStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ResolutionStrategy {
    type Err = ParseEnumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_ascii_lowercase().replace('-', "_");
        Self::ALL
            .into_iter()
            .find(|strategy| strategy.as_str() == wanted)
            .ok_or_else(|| ParseEnumError {
                expected: "resolution strategy",
                got: s.to_string(),
            })
    }
}

/// What to write to the remote account.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ResolutionPlan {
    pub upserts: Vec<Item>,
    pub remote_deletes: Vec<String>,
    /// Local item id -> fresh id, for `keep_both` id collisions.
    pub id_rewrites: HashMap<String, String>,
    pub kept_local: usize,
    pub kept_remote: usize,
    pub duplicated: usize,
    pub unresolved: Vec<ConflictRecord>,
    pub warnings: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Winner {
    Local,
    Remote,
    Both,
}

fn winner(strategy: ResolutionStrategy, conflict: &ConflictRecord) -> Winner {
    match strategy {
        ResolutionStrategy::KeepLocal => Winner::Local,
        ResolutionStrategy::KeepCloud | ResolutionStrategy::ManualReview => Winner::Remote,
        ResolutionStrategy::KeepBoth => Winner::Both,
        ResolutionStrategy::KeepNewest => {
            if conflict.local.updated_at > conflict.remote.updated_at {
                Winner::Local
            } else {
                Winner::Remote
            }
        }
    }
}

/// Turn a conflict report into a write plan.
///
/// `remote` is the account's full item list, used to reattach remote children
/// when a remote canonical row is replaced by a local one.
#[must_use]
pub fn resolve(
    report: &ConflictReport,
    strategy: ResolutionStrategy,
    remote: &[Item],
    ids: &dyn IdGenerator,
) -> ResolutionPlan {
    let mut plan = ResolutionPlan::default();

    if strategy == ResolutionStrategy::ManualReview && !report.conflicts.is_empty() {
        plan.unresolved.clone_from(&report.conflicts);
        return plan;
    }

    let mut local_rows: Vec<Item> = report.clean.clone();
    // Local id -> remote id that now stands for it.
    let mut parent_rewrites: HashMap<String, String> = HashMap::new();
    // Remote id -> local id replacing it.
    let mut replaced_remote: HashMap<String, String> = HashMap::new();

    for conflict in &report.conflicts {
        let local = &conflict.local;
        let remote_row = &conflict.remote;
        match (winner(strategy, conflict), conflict.reason) {
            (Winner::Local, ConflictReason::IdMatch) => {
                local_rows.push(local.clone());
                plan.kept_local += 1;
            }
            (Winner::Local, ConflictReason::TextMatch) => {
                local_rows.push(local.clone());
                if !plan.remote_deletes.contains(&remote_row.id) {
                    plan.remote_deletes.push(remote_row.id.clone());
                }
                replaced_remote.insert(remote_row.id.clone(), local.id.clone());
                plan.kept_local += 1;
            }
            (Winner::Remote, ConflictReason::IdMatch) => {
                plan.kept_remote += 1;
            }
            (Winner::Remote, ConflictReason::TextMatch) => {
                parent_rewrites.insert(local.id.clone(), remote_row.id.clone());
                plan.kept_remote += 1;
            }
            (Winner::Both, ConflictReason::IdMatch) => {
                let fresh = ids.next_id();
                let mut copy = local.clone();
                copy.id.clone_from(&fresh);
                plan.id_rewrites.insert(local.id.clone(), fresh);
                local_rows.push(copy);
                plan.duplicated += 1;
            }
            (Winner::Both, ConflictReason::TextMatch) => {
                plan.warnings.push(format!(
                    "kept local item {} alongside remote {} with the same text; they will auto-link",
                    local.id, remote_row.id
                ));
                local_rows.push(local.clone());
                plan.duplicated += 1;
            }
        }
    }

    for row in &mut local_rows {
        let rewritten = row.parent_id.as_ref().and_then(|parent| {
            plan.id_rewrites
                .get(parent)
                .or_else(|| parent_rewrites.get(parent))
                .cloned()
        });
        if let Some(parent) = rewritten {
            row.parent_id = Some(parent);
        }
    }

    let deleted: HashSet<&str> = plan.remote_deletes.iter().map(String::as_str).collect();
    let mut reattached = Vec::new();
    for child in remote {
        let Some(parent) = child.parent_id.as_deref() else {
            continue;
        };
        if deleted.contains(child.id.as_str()) {
            continue;
        }
        if let Some(new_parent) = replaced_remote.get(parent) {
            let mut moved = child.clone();
            moved.parent_id = Some(new_parent.clone());
            reattached.push(moved);
        }
    }
    if !reattached.is_empty() {
        plan.warnings.push(format!(
            "reattached {} remote child item(s) to replacing local items",
            reattached.len()
        ));
    }

    plan.upserts = local_rows;
    plan.upserts.extend(reattached);
    plan
}
