//! Route-level permission enforcement.
//!
//! Each protected route carries its [`PermissionRequirement`] as a route layer
//! built at registration time. The layer runs after the auth middleware has
//! bound the request scope and before the handler does anything.

use std::sync::Arc;

use axum::{
    extract::{Request, State},
    middleware::{Next, from_fn_with_state},
    response::Response,
    routing::MethodRouter,
};

use shepherd_auth::{PermissionRequirement, RolePermissionMap};

use crate::app::errors;
use crate::context;

#[derive(Clone)]
pub struct PermissionGuard {
    requirement: Arc<PermissionRequirement>,
    map: Arc<RolePermissionMap>,
}

impl PermissionGuard {
    pub fn new(requirement: PermissionRequirement, map: Arc<RolePermissionMap>) -> Self {
        Self {
            requirement: Arc::new(requirement),
            map,
        }
    }

    pub fn requirement(&self) -> &PermissionRequirement {
        &self.requirement
    }
}

pub async fn enforce_permission(
    State(guard): State<PermissionGuard>,
    req: Request,
    next: Next,
) -> Response {
    match context::check_permission(&guard.requirement, &guard.map) {
        Ok(()) => next.run(req).await,
        Err(err) => errors::access_error_to_response(err),
    }
}

/// Attach `requirement` to `route`.
pub fn require<S>(
    route: MethodRouter<S>,
    requirement: PermissionRequirement,
    map: &Arc<RolePermissionMap>,
) -> MethodRouter<S>
where
    S: Clone + Send + Sync + 'static,
{
    route.route_layer(from_fn_with_state(
        PermissionGuard::new(requirement, map.clone()),
        enforce_permission,
    ))
}
