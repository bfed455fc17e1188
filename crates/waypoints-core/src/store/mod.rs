//! Key-indexed JSON persistence.
//!
//! The medium is a plain key/value byte store holding one JSON document per
//! [`Bucket`]. Reads treat a missing key as empty, and a document that fails
//! to parse (corruption) is also treated as empty with a warning, never as a
//! crash. Writes that exceed the medium's capacity surface as
//! [`StoreError::CapacityExceeded`] and are never retried.

pub mod memory;
pub mod sqlite;

pub use memory::MemoryStore;
pub use sqlite::SqliteStore;

use crate::error::ErrorCode;
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::rc::Rc;
use tracing::warn;

/// The logical buckets persisted by the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Bucket {
    Items,
    Achievements,
    DailyBaselines,
    UserProfile,
    MigrationStatus,
}

impl Bucket {
    pub const ALL: [Self; 5] = [
        Self::Items,
        Self::Achievements,
        Self::DailyBaselines,
        Self::UserProfile,
        Self::MigrationStatus,
    ];

    /// Stable storage key. Changing these orphans existing data.
    #[must_use]
    pub const fn key(self) -> &'static str {
        match self {
            Self::Items => "waypoints.items",
            Self::Achievements => "waypoints.achievements",
            Self::DailyBaselines => "waypoints.daily_baselines",
            Self::UserProfile => "waypoints.user_profile",
            Self::MigrationStatus => "waypoints.migration_status",
        }
    }
}

/// Storage errors.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// The write would push the medium past its capacity.
    #[error("storage full: writing {attempted_bytes} bytes to {key} exceeds capacity of {capacity_bytes} bytes")]
    CapacityExceeded {
        key: &'static str,
        attempted_bytes: u64,
        capacity_bytes: u64,
    },

    /// Backend failure unrelated to capacity.
    #[error("storage backend error: {0}")]
    Backend(String),

    /// A value could not be serialized for writing.
    #[error("failed to serialize {key}: {source}")]
    Serialize {
        key: &'static str,
        #[source]
        source: serde_json::Error,
    },
}

impl StoreError {
    #[must_use]
    pub const fn code(&self) -> ErrorCode {
        match self {
            Self::CapacityExceeded { .. } => ErrorCode::CapacityExceeded,
            Self::Backend(_) => ErrorCode::StorageBackend,
            Self::Serialize { .. } => ErrorCode::InternalUnexpected,
        }
    }

    #[must_use]
    pub const fn is_capacity(&self) -> bool {
        matches!(self, Self::CapacityExceeded { .. })
    }
}

/// A synchronous key/value medium with one document per bucket.
///
/// Implementations use interior mutability: the core is single-threaded and
/// the medium itself serializes access per call.
pub trait Store {
    /// Raw document for `bucket`, or `None` when the key was never written.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Backend`] when the medium cannot be read.
    fn get(&self, bucket: Bucket) -> Result<Option<String>, StoreError>;

    /// Replace the document for `bucket`.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::CapacityExceeded`] when the medium is full.
    fn set(&self, bucket: Bucket, value: &str) -> Result<(), StoreError>;

    /// Drop the document for `bucket`.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Backend`] on medium failure.
    fn remove(&self, bucket: Bucket) -> Result<(), StoreError>;

    /// Total bytes currently held across all buckets.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Backend`] on medium failure.
    fn usage_bytes(&self) -> Result<u64, StoreError>;
}

impl<T: Store + ?Sized> Store for &T {
    fn get(&self, bucket: Bucket) -> Result<Option<String>, StoreError> {
        (**self).get(bucket)
    }

    fn set(&self, bucket: Bucket, value: &str) -> Result<(), StoreError> {
        (**self).set(bucket, value)
    }

    fn remove(&self, bucket: Bucket) -> Result<(), StoreError> {
        (**self).remove(bucket)
    }

    fn usage_bytes(&self) -> Result<u64, StoreError> {
        (**self).usage_bytes()
    }
}

impl<T: Store + ?Sized> Store for Rc<T> {
    fn get(&self, bucket: Bucket) -> Result<Option<String>, StoreError> {
        (**self).get(bucket)
    }

    fn set(&self, bucket: Bucket, value: &str) -> Result<(), StoreError> {
        (**self).set(bucket, value)
    }

    fn remove(&self, bucket: Bucket) -> Result<(), StoreError> {
        (**self).remove(bucket)
    }

    fn usage_bytes(&self) -> Result<u64, StoreError> {
        (**self).usage_bytes()
    }
}

/// Parse a bucket document, treating corruption as absence.
pub(crate) fn parse_or_empty<T: DeserializeOwned>(bucket: Bucket, raw: &str) -> Option<T> {
    match serde_json::from_str::<T>(raw) {
        Ok(value) => Some(value),
        Err(err) => {
            warn!(key = bucket.key(), error = %err, "ignoring unreadable bucket; treating as empty");
            None
        }
    }
}

/// Load a JSON array bucket. Missing or corrupt documents yield an empty list.
///
/// # Errors
///
/// Propagates backend read failures.
pub fn load_list<T: DeserializeOwned>(
    store: &(impl Store + ?Sized),
    bucket: Bucket,
) -> Result<Vec<T>, StoreError> {
    Ok(store
        .get(bucket)?
        .and_then(|raw| parse_or_empty::<Vec<T>>(bucket, &raw))
        .unwrap_or_default())
}

/// Persist a JSON array bucket.
///
/// # Errors
///
/// Returns [`StoreError::CapacityExceeded`] when the write does not fit.
pub fn save_list<T: Serialize>(
    store: &(impl Store + ?Sized),
    bucket: Bucket,
    values: &[T],
) -> Result<(), StoreError> {
    save_value(store, bucket, values)
}

/// Load a single JSON object bucket. Missing or corrupt documents yield `None`.
///
/// # Errors
///
/// Propagates backend read failures.
pub fn load_value<T: DeserializeOwned>(
    store: &(impl Store + ?Sized),
    bucket: Bucket,
) -> Result<Option<T>, StoreError> {
    Ok(store
        .get(bucket)?
        .and_then(|raw| parse_or_empty::<T>(bucket, &raw)))
}

/// Persist a single JSON value.
///
/// # Errors
///
/// Returns [`StoreError::CapacityExceeded`] when the write does not fit.
pub fn save_value<T: Serialize + ?Sized>(
    store: &(impl Store + ?Sized),
    bucket: Bucket,
    value: &T,
) -> Result<(), StoreError> {
    let raw = serde_json::to_string(value).map_err(|source| StoreError::Serialize {
        key: bucket.key(),
        source,
    })?;
    store.set(bucket, &raw)
}
