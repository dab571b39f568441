use std::sync::Arc;
use std::sync::atomic::{AtomicI64, Ordering};

use chrono::{DateTime, Duration, Utc};

use shepherd_auth::{Hs256TokenCodec, LockoutGuard, Role, RolePermissionMap};
use shepherd_core::{ChurchId, HouseholdId, MemberId, UserId};
use shepherd_infra::{
    Household, InMemoryAddressThrottle, InMemoryDirectory, InMemoryLoginAttemptStore, InMemorySecurityAudit, InMemoryTenantStore, Member,
    TenantStore,
};

use crate::config::AppConfig;
use crate::middleware::AuthState;

/// Shared state behind every route.
pub struct AppServices {
    pub tokens: Arc<Hs256TokenCodec>,
    pub token_ttl: Duration,
    pub directory: Arc<InMemoryDirectory>,
    pub lockout: LockoutGuard<Arc<InMemoryLoginAttemptStore>>,
    pub address_throttle: Arc<InMemoryAddressThrottle>,
    pub trust_proxy_headers: bool,
    pub audit: Arc<InMemorySecurityAudit>,
    pub permissions: Arc<RolePermissionMap>,
    pub members: Arc<InMemoryTenantStore<MemberId, Member>>,
    pub households: Arc<InMemoryTenantStore<HouseholdId, Household>>,
    next_member_id: AtomicI64,
}

impl AppServices {
    pub fn new(config: &AppConfig) -> Self {
        Self {
            tokens: Arc::new(Hs256TokenCodec::new(config.jwt_secret.as_bytes())),
            token_ttl: config.access_token_ttl,
            directory: Arc::new(InMemoryDirectory::new()),
            lockout: LockoutGuard::new(Arc::new(InMemoryLoginAttemptStore::new()), config.lockout),
            address_throttle: Arc::new(InMemoryAddressThrottle::new(config.address_throttle)),
            trust_proxy_headers: config.trust_proxy_headers,
            audit: Arc::new(InMemorySecurityAudit::new()),
            permissions: Arc::new(RolePermissionMap::standard().clone()),
            members: Arc::new(InMemoryTenantStore::new()),
            households: Arc::new(InMemoryTenantStore::new()),
            next_member_id: AtomicI64::new(1000),
        }
    }

    /// Replace the role grants (custom roles, tests).
    pub fn with_permissions(mut self, permissions: RolePermissionMap) -> Self {
        self.permissions = Arc::new(permissions);
        self
    }

    pub fn auth_state(&self) -> AuthState {
        AuthState {
            tokens: self.tokens.clone(),
            directory: self.directory.clone(),
            audit: self.audit.clone(),
        }
    }

    /// Drop expired login-attempt records, address windows and audit entries.
    pub fn prune_security_state(&self, now: DateTime<Utc>) {
        let attempts = self.lockout.prune(now);
        let addresses = self.address_throttle.prune(now);
        let audit = self.audit.prune(now);
        tracing::debug!(attempts, addresses, audit, "pruned security state");
    }

    pub fn next_member_id(&self) -> MemberId {
        MemberId::new(self.next_member_id.fetch_add(1, Ordering::Relaxed))
    }

    pub fn add_member(&self, member: Member) {
        self.members.upsert(member.id, member);
    }

    pub fn add_household(&self, household: Household) {
        self.households.upsert(household.id, household);
    }

    /// Two churches with a few accounts and records, for local runs.
    pub fn seed_demo_data(&self) {
        let grace = ChurchId::new(1);
        let hope = ChurchId::new(2);

        self.directory
            .add_user(UserId::new(1), None, Role::SUPERADMIN, "ops@shepherd.dev", "platform-pass");
        self.directory
            .add_user(UserId::new(10), Some(grace), Role::ADMIN, "admin@grace.org", "grace-admin");
        self.directory
            .add_user(UserId::new(11), Some(grace), Role::MEMBER, "member@grace.org", "grace-member");
        self.directory
            .add_user(UserId::new(20), Some(hope), Role::ADMIN, "admin@hope.org", "hope-admin");

        self.add_household(Household { id: HouseholdId::new(10), church_id: grace, name: "Okafor".into() });
        self.add_household(Household { id: HouseholdId::new(20), church_id: hope, name: "Lindqvist".into() });

        for (id, church, first, last, household) in [
            (1, grace, "Ada", "Okafor", Some(10)),
            (2, grace, "Chidi", "Okafor", Some(10)),
            (3, hope, "Greta", "Lindqvist", Some(20)),
            (4, hope, "Nils", "Berg", None),
        ] {
            self.add_member(Member {
                id: MemberId::new(id),
                church_id: church,
                first_name: first.into(),
                last_name: last.into(),
                household_id: household.map(HouseholdId::new),
            });
        }
    }
}
