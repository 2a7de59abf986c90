//! HTTP surface: intake routes under `/api`, liveness probes at the root.

use axum::{
    middleware::from_fn_with_state,
    routing::{get, post},
    Router,
};
use std::sync::Arc;

use crate::config::Config;
use crate::infrastructure::{queue::JobQueue, store::JobStore};

mod error;
mod handlers;
mod middleware;


pub use middleware::RateLimiter;

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub store: Arc<dyn JobStore>,
    pub queue: Arc<dyn JobQueue>,
    pub rate_limiter: Arc<RateLimiter>,
}

/// Build the full router. `/api` routes sit behind API-key auth, the domain
/// whitelist, and the per-IP rate limit, in that order; CORS wraps
/// everything.
pub fn router(state: AppState) -> Router {
    let api = Router::new()
        .route("/compress", post(handlers::compress))
        .route("/status/:job_id", get(handlers::status))
        .route("/result/:job_id", get(handlers::result))
        .route("/queue/stats", get(handlers::queue_stats))
        .route("/queue/cancel/:job_id", post(handlers::cancel))
        // Layers run outermost-last: auth, then whitelist, then rate limit.
        .layer(from_fn_with_state(state.clone(), middleware::rate_limit))
        .layer(from_fn_with_state(state.clone(), middleware::domain_whitelist))
        .layer(from_fn_with_state(state.clone(), middleware::api_key_auth));

    Router::new()
        .nest("/api", api)
        .route("/health", get(handlers::health))
        .route("/ready", get(handlers::ready))
        .layer(from_fn_with_state(state.clone(), middleware::cors))
        .with_state(state)
}
