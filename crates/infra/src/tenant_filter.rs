//! Tenant filter gate.
//!
//! Runs once per request, after the tenant context is bound and before any
//! handler touches data. For a scoped caller it turns on the church predicate
//! of the request's data-access session; the predicate lives exactly as long as
//! that session.

use thiserror::Error;

use shepherd_auth::{AccessError, TenantContext, is_unrestricted};
use shepherd_core::ChurchId;

/// Data-access session that can restrict every query to one church.
///
/// A session that was never activated must see no rows at all.
#[async_trait::async_trait]
pub trait TenantPredicateSession: Send {
    async fn enable_tenant_predicate(&mut self, church_id: ChurchId) -> Result<(), TenantGateError>;

    /// Explicitly lift the church predicate for a superadmin.
    async fn enable_bypass(&mut self) -> Result<(), TenantGateError>;
}

/// Whether a route may run without a church scope.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum RouteAccess {
    Protected,
    Public,
}

/// What the gate did for this request.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum GateState {
    /// Superadmin: no predicate.
    Bypassed,
    /// Predicate enabled for this church.
    Scoped(ChurchId),
    /// Public route without a church: nothing to scope.
    Inert,
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TenantGateError {
    /// Protected route with neither a church nor a bypass. Wiring fault.
    #[error("protected request reached the data layer without a church scope")]
    UnscopedRequest,

    /// Session refused the predicate.
    #[error("tenant predicate could not be enabled: {0}")]
    Session(String),

    /// Write attempted for a church other than the session's.
    #[error("write for church {attempted} rejected by session scoped to church {scoped}")]
    CrossTenantWrite { scoped: ChurchId, attempted: ChurchId },
}

impl From<TenantGateError> for AccessError {
    fn from(err: TenantGateError) -> Self {
        match err {
            TenantGateError::UnscopedRequest => AccessError::UnscopedRequest,
            other => AccessError::Internal(other.to_string()),
        }
    }
}

/// Activate tenant scoping on `session` according to `ctx`.
pub async fn activate<S>(
    ctx: &TenantContext,
    session: &mut S,
    access: RouteAccess,
) -> Result<GateState, TenantGateError>
where
    S: TenantPredicateSession + ?Sized,
{
    if is_unrestricted(ctx) {
        session.enable_bypass().await?;
        tracing::debug!("tenant filter bypassed for superadmin");
        return Ok(GateState::Bypassed);
    }

    match (ctx.church_id, access) {
        (Some(church_id), _) => {
            session.enable_tenant_predicate(church_id).await?;
            tracing::debug!(church_id = %church_id, "tenant filter enabled");
            Ok(GateState::Scoped(church_id))
        }
        (None, RouteAccess::Public) => Ok(GateState::Inert),
        (None, RouteAccess::Protected) => {
            tracing::error!(target: "security", "protected request has no church scope");
            Err(TenantGateError::UnscopedRequest)
        }
    }
}

#[cfg(test)]
mod tests {
    use shepherd_auth::Role;

    use super::*;

    #[derive(Default)]
    struct RecordingSession {
        enabled: Vec<ChurchId>,
        bypassed: bool,
        refuse: bool,
    }

    #[async_trait::async_trait]
    impl TenantPredicateSession for RecordingSession {
        async fn enable_tenant_predicate(&mut self, church_id: ChurchId) -> Result<(), TenantGateError> {
            if self.refuse {
                return Err(TenantGateError::Session("connection lost".into()));
            }
            self.enabled.push(church_id);
            Ok(())
        }

        async fn enable_bypass(&mut self) -> Result<(), TenantGateError> {
            self.bypassed = true;
            Ok(())
        }
    }

    #[tokio::test]
    async fn scoped_caller_enables_predicate() {
        let mut session = RecordingSession::default();
        let ctx = TenantContext::for_church(ChurchId::new(12));
        let state = activate(&ctx, &mut session, RouteAccess::Protected).await.unwrap();
        assert_eq!(state, GateState::Scoped(ChurchId::new(12)));
        assert_eq!(session.enabled, vec![ChurchId::new(12)]);
    }

    #[tokio::test]
    async fn superadmin_is_never_scoped() {
        let mut session = RecordingSession::default();
        let ctx = TenantContext::for_caller(Some(ChurchId::new(12)), &Role::SUPERADMIN);
        let state = activate(&ctx, &mut session, RouteAccess::Protected).await.unwrap();
        assert_eq!(state, GateState::Bypassed);
        assert!(session.enabled.is_empty());
        assert!(session.bypassed);
    }

    #[tokio::test]
    async fn public_route_without_church_is_inert() {
        let mut session = RecordingSession::default();
        let state = activate(&TenantContext::public(), &mut session, RouteAccess::Public)
            .await
            .unwrap();
        assert_eq!(state, GateState::Inert);
        assert!(session.enabled.is_empty());
        assert!(!session.bypassed);
    }

    #[tokio::test]
    async fn protected_route_without_church_is_a_fault() {
        let mut session = RecordingSession::default();
        let err = activate(&TenantContext::public(), &mut session, RouteAccess::Protected)
            .await
            .unwrap_err();
        assert_eq!(err, TenantGateError::UnscopedRequest);
        assert!(AccessError::from(err).is_internal_fault());
    }

    #[tokio::test]
    async fn session_failure_propagates() {
        let mut session = RecordingSession { refuse: true, ..Default::default() };
        let ctx = TenantContext::for_church(ChurchId::new(3));
        assert!(matches!(
            activate(&ctx, &mut session, RouteAccess::Protected).await,
            Err(TenantGateError::Session(_))
        ));
    }
}
