//! Media compression service entry point.
//!
//! Wires the store, queue, pipelines, and transport together, runs the
//! startup recovery pass, then serves the HTTP API alongside the scheduler
//! until SIGINT/SIGTERM.

use anyhow::Context;
use std::net::SocketAddr;
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::EnvFilter;

use media_compressor::config::Config;
use media_compressor::infrastructure::api::{self, AppState, RateLimiter};
use media_compressor::infrastructure::queue::{JobQueue, RedisQueue};
use media_compressor::infrastructure::store::{JobStore, SqlJobStore};
use media_compressor::pipelines::{
    FfmpegVideoPipeline, ImagePipeline, MagickImagePipeline, VideoPipeline,
};
use media_compressor::services::scheduler::Scheduler;
use media_compressor::transport::{BlobTransport, WordPressTransport};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = Config::from_env();
    init_tracing(&config.log_level);
    config.validate()?;

    tokio::fs::create_dir_all(&config.temp_dir)
        .await
        .with_context(|| format!("failed to create temp directory {}", config.temp_dir.display()))?;

    let store: Arc<dyn JobStore> = Arc::new(
        SqlJobStore::connect(&config.database_url)
            .await
            .context("failed to connect to database")?,
    );
    info!("connected to job store");

    let queue: Arc<dyn JobQueue> = Arc::new(
        RedisQueue::connect(&config.redis_url)
            .await
            .context("failed to connect to redis")?,
    );
    info!("connected to redis queue");

    let video: Arc<dyn VideoPipeline> = Arc::new(FfmpegVideoPipeline::new(&config.ffmpeg_path));
    let image: Arc<dyn ImagePipeline> = Arc::new(MagickImagePipeline::new(&config.imagemagick_path));
    let transport: Arc<dyn BlobTransport> = Arc::new(
        WordPressTransport::new(
            &config.wordpress_api_url,
            &config.wordpress_username,
            &config.wordpress_app_password,
        )
        .context("failed to build transport client")?,
    );

    let config = Arc::new(config);

    let scheduler = Scheduler::new(
        config.clone(),
        store.clone(),
        queue.clone(),
        video,
        image,
        transport,
    );

    let recovered = scheduler.recover().await.context("startup recovery failed")?;
    if recovered > 0 {
        info!(recovered, "re-enqueued jobs stranded in processing");
    }
    let scheduler_loop = scheduler.spawn();

    let rate_limiter = RateLimiter::new(config.rate_limit_per_minute);
    let sweeper = rate_limiter.spawn_sweeper();

    let app = api::router(AppState {
        config: config.clone(),
        store,
        queue,
        rate_limiter,
    });

    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;
    info!(%addr, "server listening");

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await
    .context("server error")?;

    info!("shutting down");
    scheduler.shutdown();
    let _ = scheduler_loop.await;
    sweeper.abort();

    Ok(())
}

fn init_tracing(log_level: &str) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(log_level));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

async fn shutdown_signal() {
    let ctrl_c = async {
        let _ = tokio::signal::ctrl_c().await;
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(_) => std::future::pending().await,
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
