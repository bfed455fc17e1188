//! Load and save the user-profile bucket.
//!
//! The identity fields and the preferences object are read separately: a
//! preferences payload that is malformed, carries unknown keys, or has a
//! schema version this build does not know is replaced with defaults, while
//! the rest of the profile is kept.

use crate::clock::Clock;
use crate::model::profile::PREFERENCES_VERSION;
use crate::model::{Preferences, UserProfile};
use crate::store::{Bucket, Store, StoreError, load_value, save_value};
use chrono::{DateTime, Utc};
use serde::Deserialize;
use tracing::warn;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct StoredProfile {
    id: Option<String>,
    #[serde(default)]
    display_name: Option<String>,
    #[serde(default)]
    preferences: Option<serde_json::Value>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

fn typed_preferences(raw: Option<serde_json::Value>) -> Preferences {
    let Some(raw) = raw else {
        return Preferences::default();
    };
    match serde_json::from_value::<Preferences>(raw) {
        Ok(prefs) if prefs.version == PREFERENCES_VERSION => prefs,
        Ok(prefs) => {
            warn!(
                found = prefs.version,
                expected = PREFERENCES_VERSION,
                "unsupported preferences version; using defaults"
            );
            Preferences::default()
        }
        Err(err) => {
            warn!(error = %err, "rejecting malformed preferences; using defaults");
            Preferences::default()
        }
    }
}

/// Read the stored profile, or a fresh local profile when none exists.
///
/// # Errors
///
/// Propagates backend read failures.
pub fn load_profile(store: &(impl Store + ?Sized), clock: &dyn Clock) -> Result<UserProfile, StoreError> {
    let stored: Option<StoredProfile> = load_value(store, Bucket::UserProfile)?;
    Ok(stored.map_or_else(
        || UserProfile::local(clock.now()),
        |p| UserProfile {
            id: p.id,
            display_name: p.display_name,
            preferences: typed_preferences(p.preferences),
            created_at: p.created_at,
            updated_at: p.updated_at,
        },
    ))
}

/// Persist `profile`, stamping `updated_at`.
///
/// # Errors
///
/// Returns [`StoreError::CapacityExceeded`] when the write does not fit.
pub fn save_profile(
    store: &(impl Store + ?Sized),
    clock: &dyn Clock,
    profile: &mut UserProfile,
) -> Result<(), StoreError> {
    profile.updated_at = clock.now();
    save_value(store, Bucket::UserProfile, profile)
}
