use std::net::{IpAddr, SocketAddr};
use std::task::{Context, Poll};

use axum::extract::connect_info::ConnectInfo;
use axum::http::{Extensions, HeaderMap, Request, StatusCode};
use axum::response::{IntoResponse, Response};
use futures_util::future::{BoxFuture, FutureExt};
use tower::{Layer, Service};

use crate::config::AllowedIps;

/// Rejects payment gateway callbacks that do not come from the configured
/// gateway networks.
#[derive(Clone, Debug)]
pub struct IpFilterLayer {
    gateway: GatewayOrigin,
}

#[derive(Clone, Debug)]
struct GatewayOrigin {
    allow_list: AllowedIps,
    proxy_hops: usize,
}

impl GatewayOrigin {
    fn admits<B>(&self, req: &Request<B>) -> Result<(), Option<IpAddr>> {
        let caller = client_ip(req.headers(), req.extensions(), self.proxy_hops);
        if is_allowed(caller, &self.allow_list) {
            Ok(())
        } else {
            Err(caller)
        }
    }
}

impl IpFilterLayer {
    pub fn new(allow_list: AllowedIps, proxy_hops: usize) -> Self {
        Self {
            gateway: GatewayOrigin {
                allow_list,
                proxy_hops,
            },
        }
    }
}

impl<S> Layer<S> for IpFilterLayer {
    type Service = GatewayGuard<S>;

    fn layer(&self, inner: S) -> Self::Service {
        GatewayGuard {
            inner,
            gateway: self.gateway.clone(),
        }
    }
}

#[derive(Clone, Debug)]
pub struct GatewayGuard<S> {
    inner: S,
    gateway: GatewayOrigin,
}

impl<S, B> Service<Request<B>> for GatewayGuard<S>
where
    S: Service<Request<B>, Response = Response> + Clone + Send + 'static,
    S::Future: Send + 'static,
    B: Send + 'static,
{
    type Response = Response;
    type Error = S::Error;
    type Future = BoxFuture<'static, Result<Response, S::Error>>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, req: Request<B>) -> Self::Future {
        if let Err(caller) = self.gateway.admits(&req) {
            tracing::warn!(
                client_ip = ?caller,
                path = %req.uri().path(),
                "blocked gateway callback from address outside the allow-list"
            );
            let rejected = StatusCode::FORBIDDEN.into_response();
            return async move { Ok(rejected) }.boxed();
        }

        // Swap in the clone that was polled ready.
        let clone = self.inner.clone();
        let mut ready = std::mem::replace(&mut self.inner, clone);
        async move { ready.call(req).await }.boxed()
    }
}

fn is_allowed(caller: Option<IpAddr>, allow_list: &AllowedIps) -> bool {
    match (allow_list, caller) {
        (AllowedIps::Any, _) => true,
        (AllowedIps::Cidrs(networks), Some(ip)) => networks.iter().any(|net| net.contains(&ip)),
        (AllowedIps::Cidrs(_), None) => false,
    }
}

/// Client address: the entry written by the outermost trusted proxy, or the
/// socket peer when no proxy is trusted.
pub fn client_ip(headers: &HeaderMap, extensions: &Extensions, proxy_hops: usize) -> Option<IpAddr> {
    extract_from_x_forwarded_for(headers, proxy_hops).or_else(|| {
        extensions
            .get::<ConnectInfo<SocketAddr>>()
            .map(|ConnectInfo(peer)| peer.ip())
    })
}

/// Each trusted proxy appends the address it saw, so the entry `proxy_hops`
/// positions from the right is the last one nobody could forge.
fn extract_from_x_forwarded_for(headers: &HeaderMap, proxy_hops: usize) -> Option<IpAddr> {
    let hop = proxy_hops.checked_sub(1)?;
    let forwarded = headers.get("x-forwarded-for")?.to_str().ok()?;

    let entry = forwarded.rsplit(',').nth(hop)?.trim();
    entry
        .parse::<IpAddr>()
        .ok()
        .or_else(|| entry.parse::<SocketAddr>().ok().map(|addr| addr.ip()))
}
