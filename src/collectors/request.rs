use std::error::Error as StdError;
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;

use axum::{
    extract::{ConnectInfo, MatchedPath, Request, State},
    http::{header, HeaderMap},
    middleware::Next,
    response::Response,
};

use super::{elapsed_ms, RequestInfo};
use crate::monitor::Monitor;

/// What the host framework knows about a request before it runs.
#[derive(Debug, Clone)]
pub struct RequestContext {
    /// Route template, e.g. "/api/users/:id"
    pub endpoint: String,
    pub method: String,
    pub client_ip: Option<String>,
    pub user_agent: Option<String>,
    pub request_bytes: u64,
    started: Instant,
}

impl RequestContext {
    pub fn new(endpoint: impl Into<String>, method: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            method: method.into(),
            client_ip: None,
            user_agent: None,
            request_bytes: 0,
            started: Instant::now(),
        }
    }

    pub fn elapsed_ms(&self) -> f64 {
        elapsed_ms(self.started)
    }

    fn info(&self, status_code: u16, response_bytes: u64) -> RequestInfo {
        RequestInfo {
            endpoint: self.endpoint.clone(),
            method: self.method.clone(),
            status_code,
            client_ip: self.client_ip.clone(),
            user_agent: self.user_agent.clone(),
            request_bytes: self.request_bytes,
            response_bytes,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResponseOutcome {
    pub status_code: u16,
    pub response_bytes: u64,
}

/// Framework-neutral request lifecycle hooks. An adapter for a given web
/// framework calls these around each request.
pub trait RequestInterceptor: Send + Sync {
    fn on_start(&self, ctx: &mut RequestContext);
    fn on_end(&self, ctx: &RequestContext, outcome: &ResponseOutcome);
    fn on_error(&self, ctx: &RequestContext, err: &(dyn StdError + 'static));
}

impl RequestInterceptor for Monitor {
    fn on_start(&self, ctx: &mut RequestContext) {
        ctx.started = Instant::now();
    }

    fn on_end(&self, ctx: &RequestContext, outcome: &ResponseOutcome) {
        self.record_request(
            ctx.info(outcome.status_code, outcome.response_bytes),
            ctx.elapsed_ms(),
        );
    }

    // A handler that failed without producing a response counts as a 500.
    fn on_error(&self, ctx: &RequestContext, err: &(dyn StdError + 'static)) {
        tracing::debug!(endpoint = %ctx.endpoint, error = %err, "request failed");
        self.record_request(ctx.info(500, 0), ctx.elapsed_ms());
    }
}

/// Values that can describe a finished response.
pub trait AsOutcome {
    fn outcome(&self) -> ResponseOutcome;
}

impl AsOutcome for Response {
    fn outcome(&self) -> ResponseOutcome {
        ResponseOutcome {
            status_code: self.status().as_u16(),
            response_bytes: content_length(self.headers()),
        }
    }
}

impl AsOutcome for ResponseOutcome {
    fn outcome(&self) -> ResponseOutcome {
        *self
    }
}

/// Runs one request future between the interceptor's hooks and hands its
/// result back unchanged.
pub async fn observe<I, T, E, Fut>(interceptor: &I, mut ctx: RequestContext, fut: Fut) -> Result<T, E>
where
    I: RequestInterceptor + ?Sized,
    T: AsOutcome,
    E: StdError + 'static,
    Fut: Future<Output = Result<T, E>>,
{
    interceptor.on_start(&mut ctx);
    let result = fut.await;
    match &result {
        Ok(value) => interceptor.on_end(&ctx, &value.outcome()),
        Err(err) => interceptor.on_error(&ctx, err),
    }
    result
}

/// Axum adapter: records every routed request and adds two headers:
///
///   X-Response-Time-Us: total handler wall time in microseconds
///   Server-Timing: same value in the standard Server-Timing format
pub async fn track_requests(
    State(monitor): State<Arc<Monitor>>,
    req: Request,
    next: Next,
) -> Response {
    let endpoint = req
        .extensions()
        .get::<MatchedPath>()
        .map(|p| p.as_str().to_owned())
        .unwrap_or_else(|| "unmatched".to_owned());

    if monitor
        .config()
        .requests
        .exclude_paths
        .iter()
        .any(|p| *p == endpoint)
    {
        return next.run(req).await;
    }

    let mut ctx = RequestContext::new(endpoint, req.method().as_str());
    ctx.client_ip = client_ip(&req);
    ctx.user_agent = req
        .headers()
        .get(header::USER_AGENT)
        .and_then(|v| v.to_str().ok())
        .map(str::to_owned);
    ctx.request_bytes = content_length(req.headers());

    let start = Instant::now();
    let result = observe(monitor.as_ref(), ctx, async {
        Ok::<_, std::convert::Infallible>(next.run(req).await)
    })
    .await;
    let mut response = match result {
        Ok(response) => response,
        Err(never) => match never {},
    };
    let elapsed = start.elapsed();

    // ── Inject response headers ─────────────────────────────────
    if let Ok(val) = elapsed.as_micros().to_string().parse() {
        response.headers_mut().insert("X-Response-Time-Us", val);
    }
    let server_timing = format!("total;dur={:.3}", elapsed.as_secs_f64() * 1000.0);
    if let Ok(val) = server_timing.parse() {
        response.headers_mut().insert("Server-Timing", val);
    }

    response
}

fn content_length(headers: &HeaderMap) -> u64 {
    headers
        .get(header::CONTENT_LENGTH)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.parse().ok())
        .unwrap_or(0)
}

/// First X-Forwarded-For hop, else the socket peer when the server was
/// started with connect info.
fn client_ip(req: &Request) -> Option<String> {
    let forwarded = req
        .headers()
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
        .map(|v| v.trim().to_owned())
        .filter(|v| !v.is_empty());

    forwarded.or_else(|| {
        req.extensions()
            .get::<ConnectInfo<SocketAddr>>()
            .map(|ConnectInfo(addr)| addr.ip().to_string())
    })
}
