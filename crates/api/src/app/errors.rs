use axum::http::{HeaderValue, StatusCode, header};
use axum::response::IntoResponse;
use chrono::Utc;
use serde_json::json;

use shepherd_auth::AccessError;
use shepherd_core::DomainError;

pub fn json_error(
    status: StatusCode,
    code: &'static str,
    message: impl Into<String>,
) -> axum::response::Response {
    (
        status,
        axum::Json(json!({
            "error": code,
            "message": message.into(),
        })),
    )
        .into_response()
}

/// Map an authorization-core refusal to a response.
///
/// Tenant violations are reported as plain not-found so the other church's
/// records are never confirmed to exist; the detail goes to the security log.
pub fn access_error_to_response(err: AccessError) -> axum::response::Response {
    match err {
        AccessError::Authentication(reason) => (
            StatusCode::UNAUTHORIZED,
            axum::Json(json!({
                "error": "unauthenticated",
                "message": reason.to_string(),
                "reason": reason.reason(),
            })),
        )
            .into_response(),
        AccessError::InsufficientPermission(denied) => (
            StatusCode::FORBIDDEN,
            axum::Json(json!({
                "error": "insufficient_permission",
                "message": denied.message,
                "required": denied.required.iter().map(|p| p.as_str()).collect::<Vec<_>>(),
                "operation": denied.operation,
            })),
        )
            .into_response(),
        AccessError::TenantViolation(_) => json_error(StatusCode::NOT_FOUND, "not_found", "not found"),
        AccessError::AccountLocked(locked) => {
            let retry_after = locked.retry_after_secs(Utc::now());
            let mut res = (
                StatusCode::LOCKED,
                axum::Json(json!({
                    "error": "account_locked",
                    "message": "too many failed login attempts; try again later",
                    "locked_until": locked.locked_until.to_rfc3339(),
                    "retry_after_secs": retry_after,
                })),
            )
                .into_response();
            res.headers_mut()
                .insert(header::RETRY_AFTER, HeaderValue::from(retry_after));
            res
        }
        AccessError::RateLimited(limited) => {
            let mut res = (
                StatusCode::TOO_MANY_REQUESTS,
                axum::Json(json!({
                    "error": "rate_limited",
                    "message": limited.to_string(),
                    "retry_after_secs": limited.retry_after_secs,
                })),
            )
                .into_response();
            res.headers_mut()
                .insert(header::RETRY_AFTER, HeaderValue::from(limited.retry_after_secs));
            res
        }
        fault => {
            tracing::error!(error = %fault, "authorization wiring fault");
            json_error(StatusCode::INTERNAL_SERVER_ERROR, "internal_error", "internal error")
        }
    }
}

pub fn domain_error_to_response(err: DomainError) -> axum::response::Response {
    match err {
        DomainError::Validation(msg) => json_error(StatusCode::BAD_REQUEST, "validation_error", msg),
        DomainError::InvalidId(msg) => json_error(StatusCode::BAD_REQUEST, "invalid_id", msg),
        DomainError::NotFound => json_error(StatusCode::NOT_FOUND, "not_found", "not found"),
    }
}

#[cfg(test)]
mod tests {
    use shepherd_auth::RateLimited;

    use super::*;

    #[test]
    fn rate_limited_is_429_with_retry_after() {
        let res = access_error_to_response(RateLimited { retry_after_secs: 42 }.into());
        assert_eq!(res.status(), StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(res.headers().get(header::RETRY_AFTER).unwrap(), "42");
    }

    #[test]
    fn wiring_faults_are_opaque_500s() {
        let res = access_error_to_response(AccessError::UnscopedRequest);
        assert_eq!(res.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }
}
