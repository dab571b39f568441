//! HTTP API application wiring (Axum router + service wiring).
//!
//! - `services.rs`: stores, token codec, lockout guard, role grants
//! - `routes/`: HTTP routes + handlers (one file per area)
//! - `dto.rs`: request/response DTOs
//! - `errors.rs`: consistent error responses

use std::sync::Arc;

use axum::{
    Extension, Router,
    routing::{get, post},
};
use tower::ServiceBuilder;

use crate::{client_ip, middleware};

pub mod dto;
pub mod errors;
pub mod routes;
pub mod services;

pub use services::AppServices;

/// Build the full HTTP router (public entrypoint used by `main.rs`).
pub fn build_app(services: Arc<AppServices>) -> Router {
    let auth_state = services.auth_state();
    let trust_proxy_headers = services.trust_proxy_headers;

    // Protected routes: require auth + tenant context + scoped session.
    let protected = routes::router(&services.permissions)
        .layer(Extension(services.clone()))
        .layer(axum::middleware::from_fn_with_state(
            auth_state,
            middleware::auth_middleware,
        ));

    Router::new()
        .route("/health", get(routes::system::health))
        .route("/auth/login", post(routes::auth::login))
        .layer(Extension(services))
        .merge(protected)
        .layer(ServiceBuilder::new().layer(axum::middleware::from_fn_with_state(
            trust_proxy_headers,
            client_ip::client_ip_middleware,
        )))
}
