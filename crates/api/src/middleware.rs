use std::sync::Arc;

use axum::{
    extract::State,
    http::{HeaderMap, header},
    middleware::Next,
    response::Response,
};
use chrono::{DateTime, Utc};
use tracing::Instrument;

use shepherd_auth::{
    AccessError, AuthenticationFailed, CallerIdentity, IdentityDirectory, SecurityAuditSink,
    TenantContext, TokenDecoder, cookie_header_names_token, extract_token, is_superadmin,
};
use shepherd_infra::{RouteAccess, TenantSession, tenant_filter};

use crate::app::errors;
use crate::context::{self, RequestScope};

#[derive(Clone)]
pub struct AuthState {
    pub tokens: Arc<dyn TokenDecoder>,
    pub directory: Arc<dyn IdentityDirectory>,
    pub audit: Arc<dyn SecurityAuditSink>,
}

/// Authenticate, bind the tenant scope, open the scoped session, then run the
/// rest of the stack inside that scope.
pub async fn auth_middleware(
    State(state): State<AuthState>,
    mut req: axum::http::Request<axum::body::Body>,
    next: Next,
) -> Response {
    let scope = match resolve_scope(&state, req.headers(), Utc::now()) {
        Ok(scope) => scope,
        Err(err) => return errors::access_error_to_response(err),
    };

    let mut session = TenantSession::new();
    if let Err(err) = tenant_filter::activate(&scope.tenant, &mut session, RouteAccess::Protected).await {
        return errors::access_error_to_response(err.into());
    }

    let span = tracing::info_span!(
        "request",
        request_id = %uuid::Uuid::now_v7(),
        church_id = ?scope.tenant.church_id,
        user_id = tracing::field::Empty,
        role = tracing::field::Empty,
    );
    if let Some(caller) = &scope.caller {
        span.record("user_id", tracing::field::display(caller.user_id));
        span.record("role", tracing::field::display(&caller.role));
        req.extensions_mut().insert(caller.clone());
    }
    req.extensions_mut().insert(scope.tenant);
    req.extensions_mut().insert(session);

    match context::scope(scope, next.run(req)).instrument(span).await {
        Ok(res) => res,
        Err(err) => errors::access_error_to_response(err),
    }
}

fn resolve_scope(state: &AuthState, headers: &HeaderMap, now: DateTime<Utc>) -> Result<RequestScope, AccessError> {
    let cookies = cookie_headers(headers)?;
    let authorization = headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok());

    let token = extract_token(cookies.iter().copied(), authorization)?;
    let claims = state.tokens.decode(token, now)?;

    let user = state.directory.lookup(claims.sub).ok_or_else(|| {
        tracing::warn!(target: "security", user_id = %claims.sub, "token for unknown user");
        AuthenticationFailed::UnknownIdentity
    })?;

    if claims.role != user.role {
        tracing::warn!(
            target: "security",
            user_id = %user.user_id,
            token_role = %claims.role,
            directory_role = %user.role,
            "token role differs from directory; using directory role"
        );
    }
    let role = user.role;

    if !is_superadmin(&role) {
        match claims.church_id {
            Some(church) if user.church_id == Some(church) => {}
            token_church => {
                tracing::warn!(
                    target: "security",
                    user_id = %user.user_id,
                    token_church_id = ?token_church,
                    account_church_id = ?user.church_id,
                    "token church does not match account church"
                );
                return Err(AuthenticationFailed::TenantMismatch.into());
            }
        }
    }

    let tenant = TenantContext::for_caller(claims.church_id, &role);
    let caller = CallerIdentity { user_id: user.user_id, role };
    Ok(RequestScope::authenticated(tenant, caller).with_audit(state.audit.clone()))
}

/// Text values of every `Cookie` header.
///
/// A header that is not valid UTF-8 is dropped unless it names the access
/// token cookie; in that case the request is malformed rather than falling
/// back to the `Authorization` header.
fn cookie_headers(headers: &HeaderMap) -> Result<Vec<&str>, AuthenticationFailed> {
    let mut cookies = Vec::new();
    for value in headers.get_all(header::COOKIE) {
        match value.to_str() {
            Ok(text) => cookies.push(text),
            Err(_) if cookie_header_names_token(value.as_bytes()) => {
                tracing::warn!(target: "security", "access token cookie is not valid UTF-8");
                return Err(AuthenticationFailed::Malformed);
            }
            Err(_) => {}
        }
    }
    Ok(cookies)
}

#[cfg(test)]
mod tests {
    use axum::http::HeaderValue;
    use chrono::Duration;

    use shepherd_auth::{Hs256TokenCodec, Role};
    use shepherd_core::{ChurchId, UserId};
    use shepherd_infra::{InMemoryDirectory, InMemorySecurityAudit};

    use super::*;

    fn state() -> (AuthState, String) {
        let directory = InMemoryDirectory::new();
        directory.add_user(UserId::new(7), Some(ChurchId::new(1)), Role::PASTOR, "pastor@grace.test", "pw");
        let codec = Hs256TokenCodec::new("test-secret");
        let (token, _) = codec
            .issue(UserId::new(7), Some(ChurchId::new(1)), Role::PASTOR, Utc::now(), Duration::minutes(15))
            .unwrap();
        let state = AuthState {
            tokens: Arc::new(codec),
            directory: Arc::new(directory),
            audit: Arc::new(InMemorySecurityAudit::new()),
        };
        (state, token)
    }

    #[test]
    fn bearer_alone_authenticates() {
        let (state, token) = state();
        let mut headers = HeaderMap::new();
        headers.insert(header::AUTHORIZATION, HeaderValue::from_str(&format!("Bearer {token}")).unwrap());
        assert!(resolve_scope(&state, &headers, Utc::now()).is_ok());
    }

    #[test]
    fn undecodable_token_cookie_does_not_fall_back_to_bearer() {
        let (state, token) = state();
        let mut headers = HeaderMap::new();
        headers.insert(header::AUTHORIZATION, HeaderValue::from_str(&format!("Bearer {token}")).unwrap());
        headers.insert(header::COOKIE, HeaderValue::from_bytes(b"access_token=\xff\xfeforged").unwrap());

        let err = resolve_scope(&state, &headers, Utc::now()).err();
        assert!(matches!(
            err,
            Some(AccessError::Authentication(AuthenticationFailed::Malformed))
        ));
    }

    #[test]
    fn undecodable_unrelated_cookie_is_ignored() {
        let (state, token) = state();
        let mut headers = HeaderMap::new();
        headers.insert(header::AUTHORIZATION, HeaderValue::from_str(&format!("Bearer {token}")).unwrap());
        headers.insert(header::COOKIE, HeaderValue::from_bytes(b"theme=\xff").unwrap());
        assert!(resolve_scope(&state, &headers, Utc::now()).is_ok());
    }
}
