//! Church-scoped record storage and request sessions.

pub mod postgres;
pub mod session;
pub mod tenant_store;

pub use postgres::PgTenantSession;
pub use session::{SessionScope, TenantSession};
pub use tenant_store::{InMemoryTenantStore, TenantStore};
