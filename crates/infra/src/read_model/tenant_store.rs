use std::collections::HashMap;
use std::hash::Hash;
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

use shepherd_core::{ChurchId, TenantScoped};

/// Keyed storage for church-owned records.
///
/// `scope = Some(church)` is the row predicate; `None` reads across churches
/// and is only reached through an unscoped session or an association lookup.
pub trait TenantStore<K, V>: Send + Sync {
    fn get(&self, scope: Option<ChurchId>, key: &K) -> Option<V>;
    fn list(&self, scope: Option<ChurchId>) -> Vec<V>;
    fn upsert(&self, key: K, value: V);
    /// Remove every record of one church.
    fn clear_church(&self, church_id: ChurchId);
}

impl<K, V, S> TenantStore<K, V> for Arc<S>
where
    S: TenantStore<K, V> + ?Sized,
{
    fn get(&self, scope: Option<ChurchId>, key: &K) -> Option<V> {
        (**self).get(scope, key)
    }

    fn list(&self, scope: Option<ChurchId>) -> Vec<V> {
        (**self).list(scope)
    }

    fn upsert(&self, key: K, value: V) {
        (**self).upsert(key, value)
    }

    fn clear_church(&self, church_id: ChurchId) {
        (**self).clear_church(church_id)
    }
}

/// In-memory store for tests/dev.
#[derive(Debug)]
pub struct InMemoryTenantStore<K, V> {
    inner: RwLock<HashMap<K, V>>,
}

impl<K, V> InMemoryTenantStore<K, V> {
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(HashMap::new()),
        }
    }
}

impl<K, V> InMemoryTenantStore<K, V> {
    // A panicking writer leaves the map itself intact; keep serving it.
    fn read(&self) -> RwLockReadGuard<'_, HashMap<K, V>> {
        self.inner.read().unwrap_or_else(|p| p.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, HashMap<K, V>> {
        self.inner.write().unwrap_or_else(|p| p.into_inner())
    }
}

impl<K, V> Default for InMemoryTenantStore<K, V> {
    fn default() -> Self {
        Self::new()
    }
}

fn in_scope<V: TenantScoped>(scope: Option<ChurchId>, value: &V) -> bool {
    scope.is_none_or(|church| value.church_id() == church)
}

impl<K, V> TenantStore<K, V> for InMemoryTenantStore<K, V>
where
    K: Clone + Eq + Hash + Ord + Send + Sync + 'static,
    V: TenantScoped + Clone + Send + Sync + 'static,
{
    fn get(&self, scope: Option<ChurchId>, key: &K) -> Option<V> {
        let map = self.read();
        map.get(key).filter(|v| in_scope(scope, *v)).cloned()
    }

    fn list(&self, scope: Option<ChurchId>) -> Vec<V> {
        let map = self.read();

        let mut rows: Vec<(&K, &V)> = map.iter().filter(|(_, v)| in_scope(scope, *v)).collect();
        rows.sort_by(|a, b| a.0.cmp(b.0));
        rows.into_iter().map(|(_, v)| v.clone()).collect()
    }

    fn upsert(&self, key: K, value: V) {
        self.write().insert(key, value);
    }

    fn clear_church(&self, church_id: ChurchId) {
        self.write().retain(|_, v| v.church_id() != church_id);
    }
}

#[cfg(test)]
mod tests {
    use shepherd_core::MemberId;

    use super::*;
    use crate::records::Member;

    fn member(id: i64, church: i64) -> Member {
        Member {
            id: MemberId::new(id),
            church_id: ChurchId::new(church),
            first_name: "Ada".into(),
            last_name: "Okafor".into(),
            household_id: None,
        }
    }

    #[test]
    fn writes_survive_a_poisoned_lock() {
        let store: Arc<InMemoryTenantStore<MemberId, Member>> = Arc::new(InMemoryTenantStore::new());
        store.upsert(MemberId::new(1), member(1, 7));

        let poisoner = store.clone();
        let _ = std::thread::spawn(move || {
            let _guard = poisoner.inner.write().unwrap();
            panic!("writer died holding the lock");
        })
        .join();
        assert!(store.inner.is_poisoned());

        store.upsert(MemberId::new(2), member(2, 7));
        assert_eq!(store.list(Some(ChurchId::new(7))).len(), 2);
        assert!(store.get(Some(ChurchId::new(7)), &MemberId::new(2)).is_some());
    }

    #[test]
    fn scope_filters_reads() {
        let store: InMemoryTenantStore<MemberId, Member> = InMemoryTenantStore::new();
        store.upsert(MemberId::new(1), member(1, 7));
        store.upsert(MemberId::new(2), member(2, 9));
        assert!(store.get(Some(ChurchId::new(7)), &MemberId::new(2)).is_none());
        assert_eq!(store.list(None).len(), 2);
    }
}
