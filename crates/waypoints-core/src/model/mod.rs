//! Persisted entity types.

pub mod achievement;
pub mod baseline;
pub mod item;
pub mod profile;

pub use achievement::AchievementRecord;
pub use baseline::{DEFAULT_BASELINE_POINTS, DailyBaselineRecord, DaySummary};
pub use item::{Item, ItemKind, ParseEnumError, PointTable};
pub use profile::{Preferences, Theme, UserProfile};
