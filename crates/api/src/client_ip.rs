//! Client address resolution.
//!
//! The socket peer is the default. Proxy headers (`X-Forwarded-For` first
//! entry, then `X-Real-IP`) are read only when the deployment says a proxy
//! in front rewrites them; otherwise any caller could pick its own address.

use std::net::{IpAddr, Ipv4Addr, SocketAddr};

use axum::{
    extract::{ConnectInfo, Request, State},
    http::HeaderMap,
    middleware::Next,
    response::Response,
};

const X_FORWARDED_FOR: &str = "x-forwarded-for";
const X_REAL_IP: &str = "x-real-ip";

/// Resolved caller address, inserted into request extensions.
///
/// Requests with no peer and no trusted header share
/// [`Ipv4Addr::UNSPECIFIED`], so they are throttled together.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClientIp(pub IpAddr);

pub fn resolve(headers: &HeaderMap, peer: Option<IpAddr>, trust_proxy_headers: bool) -> ClientIp {
    let forwarded = || {
        headers
            .get(X_FORWARDED_FOR)
            .and_then(|v| v.to_str().ok())
            .and_then(|s| s.split(',').next())
            .and_then(|s| s.trim().parse::<IpAddr>().ok())
            .or_else(|| {
                headers
                    .get(X_REAL_IP)
                    .and_then(|v| v.to_str().ok())
                    .and_then(|s| s.trim().parse::<IpAddr>().ok())
            })
    };

    let from_proxy = if trust_proxy_headers { forwarded() } else { None };
    ClientIp(
        from_proxy
            .or(peer)
            .unwrap_or(IpAddr::V4(Ipv4Addr::UNSPECIFIED)),
    )
}

/// Attach [`ClientIp`] to every request.
pub async fn client_ip_middleware(
    State(trust_proxy_headers): State<bool>,
    mut req: Request,
    next: Next,
) -> Response {
    let peer = req
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|info| info.0.ip());
    let ip = resolve(req.headers(), peer, trust_proxy_headers);
    req.extensions_mut().insert(ip);
    next.run(req).await
}
