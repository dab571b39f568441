use shepherd_core::{ChurchId, TenantScoped};

use super::TenantStore;
use crate::tenant_filter::{TenantGateError, TenantPredicateSession};

/// Row visibility of a [`TenantSession`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum SessionScope {
    /// Not activated by the gate: sees nothing, writes nothing.
    #[default]
    Unbound,
    Scoped(ChurchId),
    /// Superadmin: every church.
    Bypassed,
}

/// Request-bound data-access session over in-memory stores.
///
/// Every read and write through the session honours the scope set by the
/// tenant filter gate. The scope goes away with the session.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TenantSession {
    scope: SessionScope,
}

impl TenantSession {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn scope(&self) -> SessionScope {
        self.scope
    }

    pub fn predicate(&self) -> Option<ChurchId> {
        match self.scope {
            SessionScope::Scoped(church_id) => Some(church_id),
            _ => None,
        }
    }

    pub fn get<K, V, S>(&self, store: &S, key: &K) -> Option<V>
    where
        S: TenantStore<K, V> + ?Sized,
    {
        match self.scope {
            SessionScope::Unbound => None,
            SessionScope::Scoped(church_id) => store.get(Some(church_id), key),
            SessionScope::Bypassed => store.get(None, key),
        }
    }

    pub fn list<K, V, S>(&self, store: &S) -> Vec<V>
    where
        S: TenantStore<K, V> + ?Sized,
    {
        match self.scope {
            SessionScope::Unbound => Vec::new(),
            SessionScope::Scoped(church_id) => store.list(Some(church_id)),
            SessionScope::Bypassed => store.list(None),
        }
    }

    /// Writes outside the scoped church are rejected.
    pub fn insert<K, V, S>(&self, store: &S, key: K, value: V) -> Result<(), TenantGateError>
    where
        V: TenantScoped,
        S: TenantStore<K, V> + ?Sized,
    {
        match self.scope {
            SessionScope::Unbound => return Err(TenantGateError::UnscopedRequest),
            SessionScope::Scoped(scoped) => {
                let attempted = value.church_id();
                if attempted != scoped {
                    return Err(TenantGateError::CrossTenantWrite { scoped, attempted });
                }
            }
            SessionScope::Bypassed => {}
        }
        store.upsert(key, value);
        Ok(())
    }
}

#[async_trait::async_trait]
impl TenantPredicateSession for TenantSession {
    async fn enable_tenant_predicate(&mut self, church_id: ChurchId) -> Result<(), TenantGateError> {
        match self.scope {
            SessionScope::Unbound => {
                self.scope = SessionScope::Scoped(church_id);
                Ok(())
            }
            SessionScope::Scoped(existing) if existing == church_id => Ok(()),
            SessionScope::Scoped(existing) => Err(TenantGateError::Session(format!(
                "session already scoped to church {existing}"
            ))),
            SessionScope::Bypassed => Err(TenantGateError::Session(
                "session already bypasses the church predicate".into(),
            )),
        }
    }

    async fn enable_bypass(&mut self) -> Result<(), TenantGateError> {
        match self.scope {
            SessionScope::Scoped(existing) => Err(TenantGateError::Session(format!(
                "session already scoped to church {existing}"
            ))),
            _ => {
                self.scope = SessionScope::Bypassed;
                Ok(())
            }
        }
    }
}
