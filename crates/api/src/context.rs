//! Per-request tenant scope.
//!
//! The scope is carried by a tokio task-local: it exists only while the
//! request future is being polled inside [`scope`], and is gone as soon as that
//! future completes, fails, panics or is dropped. Nothing is stored in a
//! process-wide map, so a worker that picks up the next request starts clean.

use std::future::Future;
use std::sync::Arc;

use chrono::Utc;

use shepherd_auth::{
    AccessError, AuthenticationFailed, CallerIdentity, NoTenantContext, PermissionRequirement,
    RolePermissionMap, SecurityAuditSink, TenantContext,
};
use shepherd_core::ChurchId;

/// Everything bound for one request.
#[derive(Clone)]
pub struct RequestScope {
    pub tenant: TenantContext,
    /// `None` on public routes.
    pub caller: Option<CallerIdentity>,
    pub audit: Option<Arc<dyn SecurityAuditSink>>,
}

impl RequestScope {
    pub fn authenticated(tenant: TenantContext, caller: CallerIdentity) -> Self {
        Self {
            tenant,
            caller: Some(caller),
            audit: None,
        }
    }

    pub fn public() -> Self {
        Self {
            tenant: TenantContext::public(),
            caller: None,
            audit: None,
        }
    }

    pub fn with_audit(mut self, audit: Arc<dyn SecurityAuditSink>) -> Self {
        self.audit = Some(audit);
        self
    }
}

tokio::task_local! {
    static REQUEST_SCOPE: RequestScope;
}

/// Bind `scope` for the duration of `fut`.
///
/// Binding inside an already-bound request is refused.
pub async fn scope<F>(scope: RequestScope, fut: F) -> Result<F::Output, AccessError>
where
    F: Future,
{
    if REQUEST_SCOPE.try_with(|_| ()).is_ok() {
        tracing::error!("attempted to rebind tenant context inside a bound request");
        return Err(AccessError::ContextAlreadyBound);
    }
    Ok(REQUEST_SCOPE.scope(scope, fut).await)
}

pub fn require_context() -> Result<TenantContext, AccessError> {
    REQUEST_SCOPE
        .try_with(|s| s.tenant)
        .map_err(|_| {
            tracing::error!("tenant context read before it was bound");
            AccessError::from(NoTenantContext)
        })
}

pub fn require_caller() -> Result<CallerIdentity, AccessError> {
    let caller = REQUEST_SCOPE
        .try_with(|s| s.caller.clone())
        .map_err(|_| AccessError::from(NoTenantContext))?;
    caller.ok_or(AccessError::Authentication(AuthenticationFailed::Missing))
}

/// Evaluate `requirement` for the bound caller.
pub fn check_permission(
    requirement: &PermissionRequirement,
    map: &RolePermissionMap,
) -> Result<(), AccessError> {
    let caller = require_caller()?;
    shepherd_auth::check_permission(&caller.role, requirement, map)?;
    Ok(())
}

/// Check a loaded resource against the bound tenant; violations are audited.
pub fn verify_ownership(resource_church_id: ChurchId, resource_type: &str) -> Result<(), AccessError> {
    let ctx = require_context()?;
    let caller = require_caller()?;

    shepherd_auth::verify_ownership(resource_church_id, &ctx, caller.user_id, resource_type).map_err(|violation| {
        let audit = REQUEST_SCOPE.try_with(|s| s.audit.clone()).ok().flatten();
        if let Some(audit) = audit {
            audit.record(&violation.record, Utc::now());
        }
        AccessError::from(violation)
    })
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use shepherd_auth::{Permission, Role};
    use shepherd_core::UserId;

    use super::*;

    fn caller_scope(church: i64, role: Role) -> RequestScope {
        RequestScope::authenticated(
            TenantContext::for_caller(Some(ChurchId::new(church)), &role),
            CallerIdentity { user_id: UserId::new(church * 10), role },
        )
    }

    #[tokio::test]
    async fn unbound_reads_fail_loudly() {
        assert!(matches!(require_context(), Err(AccessError::NoTenantContext(_))));
        assert!(matches!(require_caller(), Err(AccessError::NoTenantContext(_))));
    }

    #[tokio::test]
    async fn bound_context_is_visible_then_gone() {
        let seen = scope(caller_scope(7, Role::ADMIN), async { require_context().unwrap() })
            .await
            .unwrap();
        assert_eq!(seen.church_id, Some(ChurchId::new(7)));
        assert!(require_context().is_err());
    }

    #[tokio::test]
    async fn nested_binding_is_refused() {
        let inner = scope(caller_scope(7, Role::ADMIN), async {
            scope(caller_scope(9, Role::ADMIN), async {}).await
        })
        .await
        .unwrap();
        assert_eq!(inner, Err(AccessError::ContextAlreadyBound));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn concurrent_requests_never_see_each_other() {
        let handles: Vec<_> = (1..=50)
            .map(|church| {
                tokio::spawn(scope(caller_scope(church, Role::ADMIN), async move {
                    for _ in 0..5 {
                        tokio::time::sleep(Duration::from_millis(1)).await;
                        let ctx = require_context().unwrap();
                        assert_eq!(ctx.church_id, Some(ChurchId::new(church)));
                    }
                }))
            })
            .collect();

        for handle in handles {
            handle.await.unwrap().unwrap();
        }
    }

    #[tokio::test]
    async fn cancelled_request_leaves_nothing_behind() {
        let fut = scope(caller_scope(7, Role::ADMIN), std::future::pending::<()>());
        let _ = tokio::time::timeout(Duration::from_millis(5), fut).await;
        assert!(require_context().is_err());
    }

    #[tokio::test]
    async fn public_scope_has_no_caller() {
        let err = scope(RequestScope::public(), async {
            check_permission(
                &PermissionRequirement::any_of([Permission::EventViewPublic]),
                RolePermissionMap::standard(),
            )
        })
        .await
        .unwrap()
        .unwrap_err();
        assert_eq!(err, AccessError::Authentication(AuthenticationFailed::Missing));
    }

    #[tokio::test]
    async fn ownership_uses_bound_context() {
        let result = scope(caller_scope(9, Role::ADMIN), async {
            verify_ownership(ChurchId::new(7), "Member")
        })
        .await
        .unwrap();
        match result {
            Err(AccessError::TenantViolation(v)) => {
                assert_eq!(v.record.attempted_church_id, Some(ChurchId::new(9)));
                assert_eq!(v.record.actual_church_id, ChurchId::new(7));
            }
            other => panic!("expected violation, got {other:?}"),
        }
    }
}
