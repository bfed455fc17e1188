//! The user-profile bucket: display identity plus typed, versioned preferences.
//!
//! Preferences were historically a free-form JSON blob. They are now a closed
//! struct with a schema version; payloads with unknown keys, a wrong shape, or
//! a version this build does not understand are rejected and replaced by
//! defaults rather than passed through untyped.

use chrono::{DateTime, Utc, Weekday};
use serde::{Deserialize, Serialize};

/// Schema version written by this build.
pub const PREFERENCES_VERSION: u32 = 1;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Theme {
    #[default]
    System,
    Light,
    Dark,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct Preferences {
    #[serde(default = "default_version")]
    pub version: u32,
    #[serde(default)]
    pub theme: Theme,
    #[serde(default = "default_true")]
    pub show_completed: bool,
    /// Ask before a delete that could apply to every linked instance.
    #[serde(default = "default_true")]
    pub confirm_linked_delete: bool,
    #[serde(default = "default_true")]
    pub confirm_linked_update: bool,
    #[serde(default = "default_week_start")]
    pub week_starts_on: Weekday,
}

impl Default for Preferences {
    fn default() -> Self {
        Self {
            version: PREFERENCES_VERSION,
            theme: Theme::default(),
            show_completed: true,
            confirm_linked_delete: true,
            confirm_linked_update: true,
            week_starts_on: default_week_start(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct UserProfile {
    /// Remote account id once authenticated, `None` for a local-only profile.
    pub id: Option<String>,
    #[serde(default)]
    pub display_name: Option<String>,
    #[serde(default)]
    pub preferences: Preferences,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl UserProfile {
    #[must_use]
    pub fn local(now: DateTime<Utc>) -> Self {
        Self {
            id: None,
            display_name: None,
            preferences: Preferences::default(),
            created_at: now,
            updated_at: now,
        }
    }
}

const fn default_version() -> u32 {
    PREFERENCES_VERSION
}

const fn default_true() -> bool {
    true
}

const fn default_week_start() -> Weekday {
    Weekday::Mon
}
