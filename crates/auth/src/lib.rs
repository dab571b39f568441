//! `shepherd-auth`: tenant-isolation and permission-authorization core.
//!
//! This crate is intentionally decoupled from HTTP and storage: request
//! metadata arrives as plain header strings, persistence arrives through the
//! `LoginAttemptStore` / `IdentityDirectory` / `SecurityAuditSink` traits, and
//! time is always passed in explicitly.

pub mod audit;
pub mod authorize;
pub mod claims;
pub mod directory;
pub mod error;
pub mod lockout;
pub mod permissions;
pub mod requirement;
pub mod roles;
pub mod tenant;
pub mod token;

pub use audit::SecurityAuditSink;
pub use authorize::{Decision, InsufficientPermission, check_permission, evaluate};
pub use claims::{IdentityClaims, TokenValidationError, validate_claims};
pub use directory::{DirectoryUser, IdentityDirectory};
pub use error::AccessError;
pub use lockout::{
    AccountLocked, LockoutGuard, LockoutPolicy, LockoutStatus, LoginAttemptRecord,
    LoginAttemptStore, RateLimited,
};
pub use permissions::{Permission, PermissionCategory, UnknownPermission};
pub use requirement::{LogicalOperation, PermissionRequirement};
pub use roles::{Role, RolePermissionMap, is_superadmin};
pub use tenant::{
    CallerIdentity, NoTenantContext, TenantContext, TenantViolation, TenantViolationRecord,
    is_unrestricted, verify_ownership,
};
pub use token::{
    ACCESS_TOKEN_COOKIE, AuthenticationFailed, Hs256TokenCodec, TokenDecoder, cookie_header_names_token,
    extract_token,
};
