//! In-memory login-attempt store.
//!
//! One `Mutex` per identity: updates to the same identity are serialized,
//! different identities never contend beyond the short map lookup. A slot
//! removed from the map is marked retired so a writer that fetched it just
//! before removal retries against the live map instead of writing into a
//! detached record.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, RwLock};

use shepherd_auth::{LoginAttemptRecord, LoginAttemptStore};

/// Records kept before idle ones start being evicted.
pub const DEFAULT_MAX_RECORDS: usize = 100_000;

#[derive(Debug)]
struct Slot {
    record: LoginAttemptRecord,
    retired: bool,
}

type SlotRef = Arc<Mutex<Slot>>;

fn lock(slot: &SlotRef) -> MutexGuard<'_, Slot> {
    slot.lock().unwrap_or_else(|p| p.into_inner())
}

#[derive(Debug)]
pub struct InMemoryLoginAttemptStore {
    records: RwLock<HashMap<String, SlotRef>>,
    max_records: usize,
}

impl Default for InMemoryLoginAttemptStore {
    fn default() -> Self {
        Self::with_max_records(DEFAULT_MAX_RECORDS)
    }
}

impl InMemoryLoginAttemptStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_max_records(max_records: usize) -> Self {
        Self {
            records: RwLock::new(HashMap::new()),
            max_records: max_records.max(1),
        }
    }

    pub fn len(&self) -> usize {
        self.records.read().map(|m| m.len()).unwrap_or_else(|p| p.into_inner().len())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn slot(&self, identity_key: &str) -> Option<SlotRef> {
        let map = self.records.read().unwrap_or_else(|p| p.into_inner());
        map.get(identity_key).cloned()
    }

    fn slot_or_create(&self, identity_key: &str) -> SlotRef {
        if let Some(slot) = self.slot(identity_key) {
            return slot;
        }
        let mut map = self.records.write().unwrap_or_else(|p| p.into_inner());
        if !map.contains_key(identity_key) && map.len() >= self.max_records {
            evict_idle(&mut map, self.max_records);
        }
        map.entry(identity_key.to_string())
            .or_insert_with(|| {
                Arc::new(Mutex::new(Slot {
                    record: LoginAttemptRecord::new(identity_key),
                    retired: false,
                }))
            })
            .clone()
    }
}

/// Drop the least recently attempted idle-ish records (nothing in flight, no
/// lock) until the map is at 90% of `max`.
fn evict_idle(map: &mut HashMap<String, SlotRef>, max: usize) {
    let target = max - max / 10;
    let mut candidates: Vec<(String, Option<chrono::DateTime<chrono::Utc>>)> = map
        .iter()
        .filter_map(|(key, slot)| {
            let slot = lock(slot);
            let evictable = slot.record.in_flight == 0 && slot.record.locked_until.is_none();
            evictable.then(|| (key.clone(), slot.record.last_attempt_at))
        })
        .collect();
    candidates.sort_by_key(|(_, at)| *at);

    let excess = map.len().saturating_sub(target);
    for (key, _) in candidates.into_iter().take(excess) {
        if let Some(slot) = map.remove(&key) {
            lock(&slot).retired = true;
        }
    }
    if map.len() >= max {
        tracing::warn!(records = map.len(), "login-attempt store is full of locked or in-flight identities");
    }
}

impl LoginAttemptStore for InMemoryLoginAttemptStore {
    fn get(&self, identity_key: &str) -> Option<LoginAttemptRecord> {
        let slot = self.slot(identity_key)?;
        let slot = lock(&slot);
        Some(slot.record.clone())
    }

    fn get_or_create(&self, identity_key: &str) -> LoginAttemptRecord {
        self.update(identity_key, &mut |_| {})
    }

    fn update(
        &self,
        identity_key: &str,
        f: &mut dyn FnMut(&mut LoginAttemptRecord),
    ) -> LoginAttemptRecord {
        loop {
            let slot = self.slot_or_create(identity_key);
            let mut slot = lock(&slot);
            if slot.retired {
                continue;
            }
            f(&mut slot.record);
            return slot.record.clone();
        }
    }

    fn reset(&self, identity_key: &str) {
        let mut map = self.records.write().unwrap_or_else(|p| p.into_inner());
        let Some(slot) = map.get(identity_key).cloned() else {
            return;
        };
        let mut slot = lock(&slot);
        slot.record.failed_count = 0;
        slot.record.locked_until = None;
        if slot.record.in_flight == 0 {
            slot.retired = true;
            map.remove(identity_key);
        }
    }

    fn remove_if(&self, identity_key: &str, idle: &mut dyn FnMut(&LoginAttemptRecord) -> bool) -> bool {
        let mut map = self.records.write().unwrap_or_else(|p| p.into_inner());
        let Some(slot) = map.get(identity_key).cloned() else {
            return false;
        };
        let mut slot = lock(&slot);
        if !idle(&slot.record) {
            return false;
        }
        slot.retired = true;
        map.remove(identity_key);
        true
    }

    fn prune(&self, keep: &mut dyn FnMut(&LoginAttemptRecord) -> bool) -> usize {
        let mut map = self.records.write().unwrap_or_else(|p| p.into_inner());
        let before = map.len();
        map.retain(|_, slot| {
            let mut slot = lock(slot);
            if keep(&slot.record) {
                return true;
            }
            slot.retired = true;
            false
        });
        before - map.len()
    }
}
