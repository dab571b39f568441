use std::net::IpAddr;
use std::sync::Arc;

use axum::{
    extract::Extension,
    http::{HeaderMap, HeaderValue, StatusCode, header},
    response::IntoResponse,
    Json,
};
use chrono::{DateTime, Utc};

use shepherd_auth::{ACCESS_TOKEN_COOKIE, AccessError, DirectoryUser, IdentityDirectory};

use crate::app::{dto, errors, services::AppServices};
use crate::client_ip::ClientIp;

/// Credential login behind the address throttle and the lockout guard.
///
/// The identity key is the submitted email, so unknown accounts are throttled
/// the same way as real ones. Every attempt is logged with its address and
/// user agent.
pub async fn login(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(ClientIp(ip)): Extension<ClientIp>,
    headers: HeaderMap,
    Json(body): Json<dto::LoginRequest>,
) -> axum::response::Response {
    let now = Utc::now();
    let email = body.email.trim().to_string();
    let user_agent = headers
        .get(header::USER_AGENT)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default()
        .to_string();

    // Password hashing is CPU-bound; keep it off the async workers.
    let worker = services.clone();
    let user = match tokio::task::spawn_blocking(move || attempt_login(&worker, ip, &body, now)).await {
        Ok(Ok(user)) => user,
        Ok(Err(err)) => {
            tracing::warn!(
                target: "security",
                email = %email,
                ip = %ip,
                user_agent = %user_agent,
                error = %err,
                "login refused"
            );
            return errors::access_error_to_response(err);
        }
        Err(err) => {
            tracing::error!(error = %err, "login worker failed");
            return errors::json_error(StatusCode::INTERNAL_SERVER_ERROR, "internal_error", "internal error");
        }
    };

    let (token, claims) = match services
        .tokens
        .issue(user.user_id, user.church_id, user.role.clone(), now, services.token_ttl)
    {
        Ok(issued) => issued,
        Err(err) => return errors::access_error_to_response(err.into()),
    };

    tracing::info!(
        target: "security",
        user_id = %user.user_id,
        church_id = ?user.church_id,
        ip = %ip,
        user_agent = %user_agent,
        "login succeeded"
    );

    let cookie = format!(
        "{ACCESS_TOKEN_COOKIE}={token}; HttpOnly; Path=/; SameSite=Strict; Max-Age={}",
        services.token_ttl.num_seconds()
    );
    let mut res = (
        StatusCode::OK,
        Json(dto::LoginResponse {
            token,
            expires_at: claims.exp,
            user_id: user.user_id,
            church_id: user.church_id,
            role: user.role.as_str().to_string(),
        }),
    )
        .into_response();

    match HeaderValue::from_str(&cookie) {
        Ok(value) => {
            res.headers_mut().insert(header::SET_COOKIE, value);
        }
        Err(err) => tracing::error!(error = %err, "access token is not a valid cookie value"),
    }
    res
}

/// One login attempt: reserve a slot for the address, then run the lockout
/// guard around password verification. Refused credentials count against the
/// address; throttled or saturated attempts do not.
fn attempt_login(
    services: &AppServices,
    ip: IpAddr,
    body: &dto::LoginRequest,
    now: DateTime<Utc>,
) -> Result<DirectoryUser, AccessError> {
    let permit = services.address_throttle.admit(ip, now)?;

    let mut verified = None;
    let outcome = services.lockout.authenticate(&body.email, now, || {
        verified = services.directory.verify_credentials(&body.email, &body.password);
        verified.is_some()
    });

    match outcome {
        Ok(()) => {
            permit.succeeded();
            verified.ok_or_else(|| AccessError::Internal("login accepted without an account".into()))
        }
        Err(err @ (AccessError::Authentication(_) | AccessError::AccountLocked(_))) => {
            permit.failed(now);
            Err(err)
        }
        Err(err) => Err(err),
    }
}
