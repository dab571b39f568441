use thiserror::Error;

use crate::{
    AccountLocked, AuthenticationFailed, InsufficientPermission, NoTenantContext, RateLimited, TenantViolation,
};

/// Every way the authorization core can refuse a request.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum AccessError {
    #[error("authentication failed: {0}")]
    Authentication(#[from] AuthenticationFailed),

    #[error(transparent)]
    InsufficientPermission(#[from] InsufficientPermission),

    #[error(transparent)]
    TenantViolation(#[from] TenantViolation),

    #[error(transparent)]
    AccountLocked(#[from] AccountLocked),

    #[error(transparent)]
    RateLimited(#[from] RateLimited),

    #[error(transparent)]
    NoTenantContext(#[from] NoTenantContext),

    /// Protected route reached the data layer with neither a church nor a bypass.
    #[error("protected request has no church scope")]
    UnscopedRequest,

    /// Tried to bind a second context inside an already-bound request.
    #[error("tenant context already bound for this request")]
    ContextAlreadyBound,

    #[error("internal error: {0}")]
    Internal(String),
}

impl AccessError {
    /// Wiring or infrastructure faults, as opposed to refusals of the caller.
    pub fn is_internal_fault(&self) -> bool {
        matches!(
            self,
            Self::NoTenantContext(_) | Self::UnscopedRequest | Self::ContextAlreadyBound | Self::Internal(_)
        )
    }
}
