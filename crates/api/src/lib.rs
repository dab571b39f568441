//! HTTP API: client address and auth middleware, request-scoped tenant
//! context, route-level permission enforcement, and the demo member routes.

pub mod app;
pub mod authz;
pub mod client_ip;
pub mod config;
pub mod context;
pub mod middleware;
