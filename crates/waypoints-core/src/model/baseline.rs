use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

/// Points granted for a calendar day regardless of completed work.
pub const DEFAULT_BASELINE_POINTS: u32 = 10;

/// One row per (owner, calendar date).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DailyBaselineRecord {
    pub id: String,
    pub owner_id: Option<String>,
    pub date: NaiveDate,
    pub baseline_points: u32,
    pub created_at: DateTime<Utc>,
}

/// Point totals for a single calendar day.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DaySummary {
    pub date: NaiveDate,
    pub baseline_points: u32,
    pub achievement_points: u64,
    pub achievements: usize,
    pub total: u64,
}
