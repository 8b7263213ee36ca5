//! Request decorator enforcing the dual-tier rate limit policy.

use std::sync::Arc;
use std::task::{Context, Poll};

use axum::{
    body::{Body, Bytes},
    http::{header, HeaderValue, Request, StatusCode},
    response::{IntoResponse, Response},
};
use chrono::Utc;
use futures::future::BoxFuture;
use tower::{Layer, Service};
use tracing::debug;
use uuid::Uuid;

use crate::config::BypassConfig;
use crate::http::extract::{claimed_identity, client_origin};
use crate::ratelimit::{PolicyDecision, PolicyEngine, ScopePolicy};

/// Correlation id header present on every response this layer touches.
pub const REQUEST_ID_HEADER: &str = "x-request-id";

/// Largest body the identity peek will buffer. Longer bodies, and bodies
/// without a declared length, pass through unread and only the origin
/// tier applies.
const MAX_PEEK_BYTES: usize = 64 * 1024;

/// Tower layer that wraps a protected handler with rate limit
/// accounting, quota headers, and the structured 429 denial.
#[derive(Clone)]
pub struct RateLimitLayer {
    engine: Arc<PolicyEngine>,
    policy: Arc<ScopePolicy>,
    bypass: BypassConfig,
}

impl RateLimitLayer {
    /// Create a layer evaluating `policy` against the engine's store.
    pub fn new(engine: Arc<PolicyEngine>, policy: ScopePolicy, bypass: BypassConfig) -> Self {
        Self {
            engine,
            policy: Arc::new(policy),
            bypass,
        }
    }
}

impl<S> Layer<S> for RateLimitLayer {
    type Service = RateLimitService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        RateLimitService {
            inner,
            engine: self.engine.clone(),
            policy: self.policy.clone(),
            bypass: self.bypass.clone(),
        }
    }
}

/// The middleware service produced by [`RateLimitLayer`].
#[derive(Clone)]
pub struct RateLimitService<S> {
    inner: S,
    engine: Arc<PolicyEngine>,
    policy: Arc<ScopePolicy>,
    bypass: BypassConfig,
}

impl<S> Service<Request<Body>> for RateLimitService<S>
where
    S: Service<Request<Body>, Response = Response> + Clone + Send + 'static,
    S::Future: Send,
{
    type Response = Response;
    type Error = S::Error;
    type Future = BoxFuture<'static, Result<Self::Response, Self::Error>>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, request: Request<Body>) -> Self::Future {
        let engine = self.engine.clone();
        let policy = self.policy.clone();
        let bypass = self.bypass.clone();
        let mut inner = self.inner.clone();

        Box::pin(async move {
            let request_id = correlation_id(&request);

            if bypass.active() {
                debug!(
                    scope = %policy.scope,
                    request_id = %request_id,
                    "bypass active, skipping rate limit accounting"
                );
                let mut response = inner.call(request).await?;
                set_request_id_if_missing(&mut response, &request_id);
                return Ok(response);
            }

            let origin = client_origin(request.headers());
            let (request, identity) = peek_identity(request).await;

            let decision = engine.evaluate(&policy, &origin, identity.as_deref());

            if !decision.allowed {
                return Ok(denied_response(&policy.scope, &decision, &request_id));
            }

            let mut response = inner.call(request).await?;
            apply_quota_headers(&mut response, &decision);
            set_request_id_if_missing(&mut response, &request_id);
            Ok(response)
        })
    }
}

/// Reuse the caller's correlation id when present, otherwise mint one.
fn correlation_id(request: &Request<Body>) -> String {
    request
        .headers()
        .get(REQUEST_ID_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string)
        .filter(|v| !v.is_empty())
        .unwrap_or_else(|| Uuid::new_v4().to_string())
}

/// Buffer a small body, read the claimed identity from it, and hand back
/// an equivalent request so the inner handler still observes the full,
/// unread body. Requests without a Content-Length inside the peek cap
/// pass through untouched.
async fn peek_identity(request: Request<Body>) -> (Request<Body>, Option<String>) {
    let declared = request
        .headers()
        .get(header::CONTENT_LENGTH)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.parse::<usize>().ok());

    match declared {
        Some(length) if length > 0 && length <= MAX_PEEK_BYTES => {}
        _ => return (request, None),
    }

    let (parts, body) = request.into_parts();
    let bytes = axum::body::to_bytes(body, MAX_PEEK_BYTES)
        .await
        .unwrap_or_else(|_| Bytes::new());
    let identity = claimed_identity(&bytes);

    (Request::from_parts(parts, Body::from(bytes)), identity)
}

/// Structured 429 with retry hints. The wrapped handler is never
/// invoked, and intermediaries must not cache the verdict.
fn denied_response(scope: &str, decision: &PolicyDecision, request_id: &str) -> Response {
    let body = serde_json::json!({
        "ok": false,
        "error": "rate_limited",
        "scope": scope,
        "retryAfterMs": decision.retry_after_ms(),
        "ts": Utc::now().to_rfc3339(),
        "requestId": request_id,
    });

    let mut response = (StatusCode::TOO_MANY_REQUESTS, axum::Json(body)).into_response();

    let retry_after_secs = decision.retry_after_ms().div_ceil(1000);
    let headers = response.headers_mut();
    headers.insert(header::RETRY_AFTER, HeaderValue::from(retry_after_secs));
    headers.insert(header::CACHE_CONTROL, HeaderValue::from_static("no-store"));

    apply_quota_headers(&mut response, decision);
    set_request_id_if_missing(&mut response, request_id);
    response
}

/// Stamp the freshly computed quota headers, overwriting any the inner
/// handler set itself.
fn apply_quota_headers(response: &mut Response, decision: &PolicyDecision) {
    let headers = response.headers_mut();
    headers.insert("x-ratelimit-limit", HeaderValue::from(decision.limit));
    headers.insert("x-ratelimit-remaining", HeaderValue::from(decision.remaining));
    headers.insert(
        "x-ratelimit-reset",
        HeaderValue::from(decision.reset_at.timestamp().max(0) as u64),
    );
}

/// Attach the correlation id unless the handler already set one.
fn set_request_id_if_missing(response: &mut Response, request_id: &str) {
    if response.headers().contains_key(REQUEST_ID_HEADER) {
        return;
    }
    if let Ok(value) = HeaderValue::from_str(request_id) {
        response.headers_mut().insert(REQUEST_ID_HEADER, value);
    }
}
