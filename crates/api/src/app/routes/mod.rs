use std::sync::Arc;

use axum::{Router, routing::get};

use shepherd_auth::RolePermissionMap;

pub mod auth;
pub mod members;
pub mod system;

/// Router for all authenticated (church-scoped) endpoints.
pub fn router(permissions: &Arc<RolePermissionMap>) -> Router {
    Router::new()
        .route("/whoami", get(system::whoami))
        .nest("/members", members::router(permissions))
}
