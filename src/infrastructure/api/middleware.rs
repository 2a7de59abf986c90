//! Request gate middleware: API-key auth, domain whitelist, CORS, and the
//! per-IP rate limiter.

use axum::{
    extract::{ConnectInfo, Request, State},
    http::{header, HeaderValue, Method, StatusCode},
    middleware::Next,
    response::{IntoResponse, Json, Response},
};
use serde_json::json;
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use tracing::debug;

use super::AppState;

fn reject(status: StatusCode, message: &str) -> Response {
    (status, Json(json!({ "error": message }))).into_response()
}

/// `X-API-Key` equality check; disabled when no key is configured.
pub async fn api_key_auth(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Response {
    let expected = &state.config.api_key;
    if expected.is_empty() {
        return next.run(request).await;
    }

    match request
        .headers()
        .get("x-api-key")
        .and_then(|value| value.to_str().ok())
    {
        None | Some("") => reject(StatusCode::UNAUTHORIZED, "API key is required"),
        Some(provided) if provided != expected => {
            reject(StatusCode::UNAUTHORIZED, "Invalid API key")
        }
        Some(_) => next.run(request).await,
    }
}

fn request_origin(request: &Request) -> Option<String> {
    request
        .headers()
        .get(header::ORIGIN)
        .or_else(|| request.headers().get(header::REFERER))
        .and_then(|value| value.to_str().ok())
        .filter(|value| !value.is_empty())
        .map(str::to_string)
}

/// Prefix-match `Origin`/`Referer` against the allowed domains; disabled when
/// the list is empty.
pub async fn domain_whitelist(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Response {
    let allowed = &state.config.allowed_domains;
    if allowed.is_empty() {
        return next.run(request).await;
    }

    let Some(origin) = request_origin(&request) else {
        return reject(StatusCode::FORBIDDEN, "Origin or Referer header is required");
    };

    if !allowed.iter().any(|domain| origin.starts_with(domain)) {
        return reject(StatusCode::FORBIDDEN, "Domain not allowed");
    }

    next.run(request).await
}

/// CORS headers on every response; preflights are answered directly.
pub async fn cors(State(state): State<AppState>, request: Request, next: Next) -> Response {
    let origin = request
        .headers()
        .get(header::ORIGIN)
        .and_then(|value| value.to_str().ok())
        .map(str::to_string);

    let is_preflight = request.method() == Method::OPTIONS;
    let mut response = if is_preflight {
        StatusCode::NO_CONTENT.into_response()
    } else {
        next.run(request).await
    };

    let headers = response.headers_mut();
    if let Some(origin) = origin {
        let allowed = &state.config.allowed_domains;
        if !allowed.is_empty() && allowed.iter().any(|domain| origin.starts_with(domain)) {
            if let Ok(value) = HeaderValue::from_str(&origin) {
                headers.insert(header::ACCESS_CONTROL_ALLOW_ORIGIN, value);
            }
        }
    }
    headers.insert(
        header::ACCESS_CONTROL_ALLOW_METHODS,
        HeaderValue::from_static("GET, POST, PUT, DELETE, OPTIONS"),
    );
    headers.insert(
        header::ACCESS_CONTROL_ALLOW_HEADERS,
        HeaderValue::from_static("Content-Type, X-API-Key, Authorization"),
    );
    headers.insert(
        header::ACCESS_CONTROL_MAX_AGE,
        HeaderValue::from_static("86400"),
    );

    response
}

struct ClientWindow {
    count: u32,
    resets_at: Instant,
}

/// Fixed-window per-IP limiter. One synchronized map; a background sweeper
/// drops windows that expired more than five minutes ago.
pub struct RateLimiter {
    limit: u32,
    window: Duration,
    clients: Mutex<HashMap<String, ClientWindow>>,
}

impl RateLimiter {
    pub fn new(requests_per_minute: u32) -> Arc<Self> {
        Arc::new(Self {
            limit: requests_per_minute,
            window: Duration::from_secs(60),
            clients: Mutex::new(HashMap::new()),
        })
    }

    pub fn enabled(&self) -> bool {
        self.limit > 0
    }

    /// `Ok` admits the request; `Err` carries the seconds until the window
    /// resets.
    pub async fn try_acquire(&self, client_ip: &str) -> Result<(), u64> {
        let now = Instant::now();
        let mut clients = self.clients.lock().await;

        if let Some(window) = clients.get_mut(client_ip) {
            if now < window.resets_at {
                if window.count >= self.limit {
                    return Err(window.resets_at.duration_since(now).as_secs());
                }
                window.count += 1;
                return Ok(());
            }
        }

        clients.insert(
            client_ip.to_string(),
            ClientWindow {
                count: 1,
                resets_at: now + self.window,
            },
        );
        Ok(())
    }

    /// Periodically drop windows that expired more than five minutes ago.
    pub fn spawn_sweeper(self: &Arc<Self>) -> tokio::task::JoinHandle<()> {
        let limiter = self.clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(Duration::from_secs(300));
            ticker.tick().await;
            loop {
                ticker.tick().await;
                let now = Instant::now();
                let mut clients = limiter.clients.lock().await;
                let before = clients.len();
                clients.retain(|_, window| now < window.resets_at + Duration::from_secs(300));
                debug!(swept = before - clients.len(), "rate limiter sweep");
            }
        })
    }
}

fn client_ip(request: &Request) -> String {
    if let Some(forwarded) = request
        .headers()
        .get("x-forwarded-for")
        .and_then(|value| value.to_str().ok())
    {
        if let Some(first) = forwarded.split(',').next() {
            let first = first.trim();
            if !first.is_empty() {
                return first.to_string();
            }
        }
    }

    request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|info| info.0.ip().to_string())
        .unwrap_or_else(|| "unknown".to_string())
}

pub async fn rate_limit(State(state): State<AppState>, request: Request, next: Next) -> Response {
    if !state.rate_limiter.enabled() {
        return next.run(request).await;
    }

    match state.rate_limiter.try_acquire(&client_ip(&request)).await {
        Ok(()) => next.run(request).await,
        Err(retry_after) => (
            StatusCode::TOO_MANY_REQUESTS,
            Json(json!({ "error": "Rate limit exceeded", "retry_after": retry_after })),
        )
            .into_response(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn limiter_admits_up_to_the_limit_then_rejects() {
        let limiter = RateLimiter::new(3);
        for _ in 0..3 {
            assert!(limiter.try_acquire("1.2.3.4").await.is_ok());
        }
        let retry_after = limiter.try_acquire("1.2.3.4").await.unwrap_err();
        assert!(retry_after <= 60);

        // Another client has its own window.
        assert!(limiter.try_acquire("5.6.7.8").await.is_ok());
    }

    #[tokio::test]
    async fn zero_limit_means_disabled() {
        let limiter = RateLimiter::new(0);
        assert!(!limiter.enabled());
    }
}
