use super::{Bucket, Store, StoreError};
use std::cell::{Cell, RefCell};
use std::collections::HashMap;

/// In-process store with optional capacity, mirroring a browser storage quota.
///
/// Usage is counted as key bytes plus value bytes per bucket.
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: RefCell<HashMap<Bucket, String>>,
    capacity_bytes: Option<u64>,
    writes_until_failure: Cell<Option<usize>>,
}

impl MemoryStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// A store that rejects writes pushing total usage past `capacity_bytes`.
    #[must_use]
    pub fn with_capacity(capacity_bytes: u64) -> Self {
        Self {
            capacity_bytes: Some(capacity_bytes),
            ..Self::default()
        }
    }

    /// Make the next `set` fail with [`StoreError::CapacityExceeded`]
    /// regardless of actual usage.
    pub fn fail_next_write(&self) {
        self.fail_write_after(0);
    }

    /// Let `writes` more `set` calls through, then fail the one after.
    pub fn fail_write_after(&self, writes: usize) {
        self.writes_until_failure.set(Some(writes));
    }

    /// Snapshot of the raw documents, for assertions.
    #[must_use]
    pub fn raw(&self, bucket: Bucket) -> Option<String> {
        self.entries.borrow().get(&bucket).cloned()
    }

    fn usage_excluding(&self, bucket: Bucket) -> u64 {
        self.entries
            .borrow()
            .iter()
            .filter(|(b, _)| **b != bucket)
            .map(|(b, v)| entry_bytes(*b, v))
            .sum()
    }
}

fn entry_bytes(bucket: Bucket, value: &str) -> u64 {
    (bucket.key().len() + value.len()) as u64
}

impl Store for MemoryStore {
    fn get(&self, bucket: Bucket) -> Result<Option<String>, StoreError> {
        Ok(self.entries.borrow().get(&bucket).cloned())
    }

    fn set(&self, bucket: Bucket, value: &str) -> Result<(), StoreError> {
        let attempted = entry_bytes(bucket, value);
        let remaining = self.writes_until_failure.get();
        self.writes_until_failure.set(remaining.and_then(|n| n.checked_sub(1)));
        if remaining == Some(0) {
            return Err(StoreError::CapacityExceeded {
                key: bucket.key(),
                attempted_bytes: attempted,
                capacity_bytes: self.capacity_bytes.unwrap_or(0),
            });
        }

        if let Some(capacity) = self.capacity_bytes
            && self.usage_excluding(bucket) + attempted > capacity
        {
            return Err(StoreError::CapacityExceeded {
                key: bucket.key(),
                attempted_bytes: attempted,
                capacity_bytes: capacity,
            });
        }

        self.entries.borrow_mut().insert(bucket, value.to_string());
        Ok(())
    }

    fn remove(&self, bucket: Bucket) -> Result<(), StoreError> {
        self.entries.borrow_mut().remove(&bucket);
        Ok(())
    }

    fn usage_bytes(&self) -> Result<u64, StoreError> {
        Ok(self
            .entries
            .borrow()
            .iter()
            .map(|(b, v)| entry_bytes(*b, v))
            .sum())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn overwrite_counts_only_new_value() {
        let capacity = entry_bytes(Bucket::Items, "0123456789");
        let store = MemoryStore::with_capacity(capacity);
        store.set(Bucket::Items, "0123456789").expect("fits exactly");
        store.set(Bucket::Items, "abcdefghij").expect("same size overwrite fits");
        assert!(store.set(Bucket::Items, "abcdefghijk").is_err());
        assert_eq!(store.raw(Bucket::Items).as_deref(), Some("abcdefghij"));
    }

    #[test]
    fn failed_write_leaves_previous_value() {
        let store = MemoryStore::new();
        store.set(Bucket::Items, "[]").expect("write");
        store.fail_next_write();
        let err = store.set(Bucket::Items, "[1]").expect_err("forced failure");
        assert!(err.is_capacity());
        assert_eq!(store.raw(Bucket::Items).as_deref(), Some("[]"));
        store.set(Bucket::Items, "[1]").expect("only one write fails");
    }

    #[test]
    fn failure_can_be_deferred() {
        let store = MemoryStore::new();
        store.fail_write_after(2);
        store.set(Bucket::Items, "[]").expect("first");
        store.set(Bucket::Achievements, "[]").expect("second");
        assert!(store.set(Bucket::Items, "[1]").is_err());
        assert_eq!(store.raw(Bucket::Items).as_deref(), Some("[]"));
        store.set(Bucket::Items, "[1]").expect("disarmed after failing");
    }

    #[test]
    fn usage_sums_all_buckets() {
        let store = MemoryStore::new();
        store.set(Bucket::Items, "[]").expect("write");
        store.set(Bucket::UserProfile, "{}").expect("write");
        let expected = entry_bytes(Bucket::Items, "[]") + entry_bytes(Bucket::UserProfile, "{}");
        assert_eq!(store.usage_bytes().expect("usage"), expected);
        store.remove(Bucket::Items).expect("remove");
        assert_eq!(
            store.usage_bytes().expect("usage"),
            entry_bytes(Bucket::UserProfile, "{}")
        );
    }
}
