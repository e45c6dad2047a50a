//! Checkout tracking set
//!
//! Every checked-out connection and the cursor of its current result are
//! recorded with the time they were handed out. The reaper drains entries older
//! than the staleness threshold; returning a connection removes it together
//! with its cursors.

use std::collections::HashMap;
use std::sync::{Arc, Weak};
use std::time::Duration;

use parking_lot::Mutex;
use tokio::time::Instant;

use crate::connection::Slot;
use crate::result::CursorHandle;

/// A resource the reaper can reclaim
pub(crate) enum TrackedResource {
    /// A checked-out connection, valid only while `lease` is current
    Connection { slot: Arc<Slot>, lease: u64 },
    /// A cursor; the handle may already be gone if its result was dropped
    Cursor(Weak<CursorHandle>),
}

impl TrackedResource {
    fn key(&self) -> Option<ResourceKey> {
        match self {
            TrackedResource::Connection { slot, .. } => Some(ResourceKey::Connection(slot.id())),
            TrackedResource::Cursor(handle) => handle
                .upgrade()
                .map(|handle| ResourceKey::Cursor(handle.id())),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub(crate) enum ResourceKey {
    Connection(u64),
    Cursor(u64),
}

struct TrackedEntry {
    resource: TrackedResource,
    /// Slot the resource belongs to
    owner: u64,
    checked_out_at: Instant,
}

#[derive(Default)]
pub(crate) struct ResourceTracker {
    entries: Mutex<HashMap<ResourceKey, TrackedEntry>>,
}

impl ResourceTracker {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Record `resource`, owned by slot `owner`, as handed out now
    pub(crate) fn track(&self, owner: u64, resource: TrackedResource) {
        let Some(key) = resource.key() else {
            return;
        };
        let entry = TrackedEntry {
            resource,
            owner,
            checked_out_at: Instant::now(),
        };
        self.entries.lock().insert(key, entry);
    }

    /// Refresh the timestamp of a tracked resource. Returns false if it is
    /// no longer tracked.
    pub(crate) fn touch(&self, key: ResourceKey) -> bool {
        match self.entries.lock().get_mut(&key) {
            Some(entry) => {
                entry.checked_out_at = Instant::now();
                true
            }
            None => false,
        }
    }

    pub(crate) fn untrack(&self, key: ResourceKey) -> bool {
        self.entries.lock().remove(&key).is_some()
    }

    /// Remove a connection and every cursor obtained from it
    pub(crate) fn untrack_connection(&self, slot_id: u64) -> usize {
        let mut entries = self.entries.lock();
        let before = entries.len();
        entries.retain(|_, entry| entry.owner != slot_id);
        before - entries.len()
    }

    /// Remove and return every resource checked out longer than `threshold`.
    ///
    /// Cursors whose results were already dropped are discarded silently.
    pub(crate) fn drain_stale(&self, threshold: Duration) -> Vec<TrackedResource> {
        let now = Instant::now();
        let mut entries = self.entries.lock();
        let stale: Vec<ResourceKey> = entries
            .iter()
            .filter(|(_, entry)| now.saturating_duration_since(entry.checked_out_at) > threshold)
            .map(|(key, _)| *key)
            .collect();

        stale
            .into_iter()
            .filter_map(|key| entries.remove(&key))
            .map(|entry| entry.resource)
            .filter(|resource| match resource {
                TrackedResource::Cursor(handle) => handle.strong_count() > 0,
                TrackedResource::Connection { .. } => true,
            })
            .collect()
    }

    pub(crate) fn len(&self) -> usize {
        self.entries.lock().len()
    }
}
