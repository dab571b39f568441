use axum::{extract::Extension, http::StatusCode, response::IntoResponse, Json};

use shepherd_auth::{CallerIdentity, TenantContext};

pub async fn health() -> StatusCode {
    StatusCode::OK
}

pub async fn whoami(
    Extension(tenant): Extension<TenantContext>,
    Extension(caller): Extension<CallerIdentity>,
) -> impl IntoResponse {
    Json(serde_json::json!({
        "user_id": caller.user_id,
        "church_id": tenant.church_id,
        "is_superadmin": tenant.is_superadmin,
        "role": caller.role.as_str(),
    }))
}
