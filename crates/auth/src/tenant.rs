use serde::Serialize;
use thiserror::Error;

use shepherd_core::{ChurchId, UserId};

use crate::{Role, is_superadmin};

/// Tenant binding for one request.
///
/// Built once at request entry and never mutated afterwards.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize)]
pub struct TenantContext {
    pub church_id: Option<ChurchId>,
    pub is_superadmin: bool,
}

impl TenantContext {
    pub const fn for_church(church_id: ChurchId) -> Self {
        Self {
            church_id: Some(church_id),
            is_superadmin: false,
        }
    }

    pub const fn superadmin() -> Self {
        Self {
            church_id: None,
            is_superadmin: true,
        }
    }

    /// Unauthenticated request. Nothing is scoped and nothing bypasses.
    pub const fn public() -> Self {
        Self {
            church_id: None,
            is_superadmin: false,
        }
    }

    /// Context for an authenticated caller. Superadmins keep their church (if
    /// any) for display purposes but are never scoped by it.
    pub fn for_caller(church_id: Option<ChurchId>, role: &Role) -> Self {
        Self {
            church_id,
            is_superadmin: is_superadmin(role),
        }
    }
}

/// True when the context is exempt from tenant scoping.
pub fn is_unrestricted(ctx: &TenantContext) -> bool {
    ctx.is_superadmin
}

/// Who is making the request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CallerIdentity {
    pub user_id: UserId,
    pub role: Role,
}

/// Tenant context was read before it was bound. Always a wiring defect.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
#[error("tenant context read before it was bound")]
pub struct NoTenantContext;

/// Security-audit view of a cross-tenant access attempt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TenantViolationRecord {
    pub user_id: UserId,
    pub attempted_church_id: Option<ChurchId>,
    pub actual_church_id: ChurchId,
    pub resource_type: String,
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error(
    "user {} attempted to access {} of church {} from church {:?}",
    .record.user_id,
    .record.resource_type,
    .record.actual_church_id,
    .record.attempted_church_id
)]
pub struct TenantViolation {
    pub record: TenantViolationRecord,
}

/// Check a loaded resource belongs to the caller's church.
///
/// Runs even when the query path was already scoped; resources reached through
/// associations never went through the scoped query.
pub fn verify_ownership(
    resource_church_id: ChurchId,
    ctx: &TenantContext,
    user_id: UserId,
    resource_type: &str,
) -> Result<(), TenantViolation> {
    if is_unrestricted(ctx) {
        return Ok(());
    }
    if ctx.church_id == Some(resource_church_id) {
        return Ok(());
    }

    let record = TenantViolationRecord {
        user_id,
        attempted_church_id: ctx.church_id,
        actual_church_id: resource_church_id,
        resource_type: resource_type.to_string(),
    };

    tracing::error!(
        target: "security",
        user_id = %record.user_id,
        attempted_church_id = ?record.attempted_church_id,
        actual_church_id = %record.actual_church_id,
        resource_type = %record.resource_type,
        "tenant violation"
    );

    Err(TenantViolation { record })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn same_church_passes() {
        let ctx = TenantContext::for_church(ChurchId::new(7));
        assert!(verify_ownership(ChurchId::new(7), &ctx, UserId::new(1), "Member").is_ok());
    }

    #[test]
    fn other_church_is_a_violation() {
        let ctx = TenantContext::for_church(ChurchId::new(9));
        let err = verify_ownership(ChurchId::new(7), &ctx, UserId::new(4), "Member").unwrap_err();
        assert_eq!(
            err.record,
            TenantViolationRecord {
                user_id: UserId::new(4),
                attempted_church_id: Some(ChurchId::new(9)),
                actual_church_id: ChurchId::new(7),
                resource_type: "Member".into(),
            }
        );
    }

    #[test]
    fn superadmin_always_passes() {
        let ctx = TenantContext::for_caller(Some(ChurchId::new(9)), &Role::SUPERADMIN);
        assert!(is_unrestricted(&ctx));
        assert!(verify_ownership(ChurchId::new(7), &ctx, UserId::new(1), "Household").is_ok());
    }

    #[test]
    fn missing_church_fails_closed() {
        let err = verify_ownership(ChurchId::new(7), &TenantContext::public(), UserId::new(1), "Member")
            .unwrap_err();
        assert_eq!(err.record.attempted_church_id, None);
    }

    #[test]
    fn for_caller_only_bypasses_for_superadmin() {
        assert!(!TenantContext::for_caller(Some(ChurchId::new(3)), &Role::ADMIN).is_superadmin);
        assert!(TenantContext::for_caller(None, &Role::SUPERADMIN).is_superadmin);
    }
}
