use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

/// Immutable receipt written when an item flips to completed.
///
/// `points_earned` is captured by value at creation and never recomputed
/// from the live item, so later edits to the item cannot rewrite history.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AchievementRecord {
    pub id: String,
    pub owner_id: Option<String>,
    pub item_id: String,
    pub points_earned: u32,
    pub achieved_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

impl AchievementRecord {
    /// Calendar day (UTC) the achievement counts toward.
    #[must_use]
    pub fn achieved_on(&self) -> NaiveDate {
        self.achieved_at.date_naive()
    }
}
