//! In-memory tag-value cache.
//!
//! Holds the last value pushed by the server for every tag. Only the session
//! task writes to it; readers take a shared lock and copy out what they need.
//! The cache is URL-agnostic, so entries from a previous upstream survive a
//! URL switch until overwritten.
//!
//! Entries are unique per wire key (`path/name`). Two structured keys that
//! render to the same wire key, such as `(a, b/c)` and `(a/b, c)`, share one
//! slot and the later write wins.

use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use crate::constants::WILDCARD_TAG;
use crate::protocol::{TagEntry, TagKey, TagValue};

/// One cache slot: the structured key of the latest write and its value.
#[derive(Debug, Clone)]
struct CachedTag {
    key: TagKey,
    value: TagValue,
}

type Slots = HashMap<String, CachedTag>;

/// Shared handle to the tag cache. Cloning is cheap and shares the storage.
#[derive(Debug, Clone, Default)]
pub struct TagCache {
    slots: Arc<RwLock<Slots>>,
}

impl TagCache {
    /// Create an empty cache.
    pub fn new() -> Self {
        Self::default()
    }

    // Writers only insert or clear whole entries; a poisoned lock still
    // guards a consistent map.
    fn read(&self) -> RwLockReadGuard<'_, Slots> {
        self.slots.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, Slots> {
        self.slots.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// Store `value` for `key`, replacing whatever was there.
    pub fn upsert(&self, key: TagKey, value: TagValue) {
        insert(&mut self.write(), key, value);
    }

    /// Apply a batch of updates in order under a single lock.
    pub fn upsert_all(&self, updates: impl IntoIterator<Item = (TagKey, TagValue)>) {
        let mut slots = self.write();
        for (key, value) in updates {
            insert(&mut slots, key, value);
        }
    }

    /// Value stored under `key`'s wire form.
    pub fn get(&self, key: &TagKey) -> Option<TagValue> {
        self.read()
            .get(&key.wire_name())
            .map(|slot| slot.value.clone())
    }

    /// Every cached entry. Order is not significant; names are unique.
    pub fn get_all(&self) -> Vec<TagEntry> {
        self.read()
            .iter()
            .map(|(wire, slot)| TagEntry {
                name: wire.clone(),
                value: slot.value.clone(),
            })
            .collect()
    }

    /// Look up each requested wire-form key.
    ///
    /// Every requested key appears in the result; unknown keys carry
    /// [`TagValue::Null`]. An empty request, or one containing `#`, returns
    /// the full snapshot instead.
    pub fn get_many<S: AsRef<str>>(&self, keys: &[S]) -> Vec<TagEntry> {
        if keys.is_empty() || keys.iter().any(|k| k.as_ref() == WILDCARD_TAG) {
            return self.get_all();
        }

        let slots = self.read();
        keys.iter()
            .map(|wire| {
                let wire = wire.as_ref();
                TagEntry {
                    name: wire.to_string(),
                    value: slots
                        .get(wire)
                        .map(|slot| slot.value.clone())
                        .unwrap_or_default(),
                }
            })
            .collect()
    }

    /// Number of cached tags.
    pub fn len(&self) -> usize {
        self.read().len()
    }

    /// Whether nothing has been cached yet.
    pub fn is_empty(&self) -> bool {
        self.read().is_empty()
    }

    /// Drop every cached value.
    pub fn clear(&self) {
        self.write().clear();
    }
}

fn insert(slots: &mut Slots, key: TagKey, value: TagValue) {
    let wire = key.wire_name();
    if let Some(previous) = slots.get(&wire) {
        if previous.key != key {
            log::debug!(
                "[Cache] {:?}/{:?} replaces {:?}/{:?} under wire key {}",
                key.path,
                key.name,
                previous.key.path,
                previous.key.name,
                wire
            );
        }
    }
    slots.insert(wire, CachedTag { key, value });
}
