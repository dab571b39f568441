//! Infrastructure layer: tenant filter gate, church-scoped storage, identity
//! login-attempt and address throttle stores, security audit log.

pub mod address_throttle;
pub mod audit;
pub mod directory;
pub mod login_attempts;
pub mod read_model;
pub mod records;
pub mod tenant_filter;

pub use address_throttle::{AddressPermit, AddressThrottlePolicy, InMemoryAddressThrottle};
pub use audit::InMemorySecurityAudit;
pub use directory::InMemoryDirectory;
pub use login_attempts::InMemoryLoginAttemptStore;
pub use read_model::{InMemoryTenantStore, PgTenantSession, SessionScope, TenantSession, TenantStore};
pub use records::{Household, Member};
pub use tenant_filter::{GateState, RouteAccess, TenantGateError, TenantPredicateSession, activate};
