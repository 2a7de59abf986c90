//! Intake handlers: submit, poll, fetch results, stats, cancel, probes.

use axum::{
    extract::{rejection::JsonRejection, Path, State},
    http::StatusCode,
    response::{IntoResponse, Json},
};
use serde_json::json;
use std::time::Duration;
use tracing::warn;
use uuid::Uuid;

use super::AppState;
use crate::domain::{
    CompressRequest, CompressResponse, CompressionType, JobStatus, QueueStats, ResultResponse,
    StatusResponse,
};
use crate::error::{Error, ServiceResult};
use crate::infrastructure::store::NewJob;

/// How long a computed status snapshot stays valid in the cache.
const STATUS_CACHE_TTL: Duration = Duration::from_secs(10);

fn validate(request: &CompressRequest) -> ServiceResult {
    match request.compression_type {
        CompressionType::Video if request.video_data.is_none() => Err(Error::validation(
            "video_data is required for video compression",
        )),
        CompressionType::Image if request.image_data.is_none() => Err(Error::validation(
            "image_data is required for image compression",
        )),
        CompressionType::Both
            if request.video_data.is_none() || request.image_data.is_none() =>
        {
            Err(Error::validation(
                "both video_data and image_data are required",
            ))
        }
        _ => Ok(()),
    }
}

pub async fn compress(
    State(state): State<AppState>,
    payload: Result<Json<CompressRequest>, JsonRejection>,
) -> Result<Json<CompressResponse>, Error> {
    let Json(request) =
        payload.map_err(|err| Error::validation(format!("Invalid request format: {err}")))?;
    validate(&request)?;

    let priority = match request.priority {
        0 => 5,
        p @ 1..=10 => p,
        _ => return Err(Error::validation("priority must be between 1 and 10")),
    };

    let job_id = request
        .job_id
        .clone()
        .filter(|id| !id.is_empty())
        .unwrap_or_else(|| Uuid::new_v4().to_string());

    let job = state
        .store
        .create(NewJob {
            job_id,
            post_id: request.post_id,
            user_id: request.user_id,
            compression_type: request.compression_type,
            video_spec: request.video_data,
            image_spec: request.image_data,
            priority,
            scheduled_time: request.scheduled_time,
            max_retries: state.config.max_retries,
        })
        .await?;

    state.queue.enqueue(&job.job_id, job.priority).await?;
    let queue_position = state.queue.pending_len().await?;

    Ok(Json(CompressResponse {
        status: "queued".to_string(),
        job_id: job.job_id,
        compression_type: job.compression_type,
        queue_position,
        estimated_time: queue_position * 60,
    }))
}

pub async fn status(
    State(state): State<AppState>,
    Path(job_id): Path<String>,
) -> Result<Json<StatusResponse>, Error> {
    match state.queue.cached_status(&job_id).await {
        Ok(Some(cached)) => return Ok(Json(cached)),
        Ok(None) => {}
        Err(err) => warn!(%job_id, %err, "status cache read failed"),
    }

    let job = state.store.get(&job_id).await?;
    let snapshot = StatusResponse::for_job(&job);

    if let Err(err) = state
        .queue
        .cache_status(&job_id, &snapshot, STATUS_CACHE_TTL)
        .await
    {
        warn!(%job_id, %err, "status cache write failed");
    }

    Ok(Json(snapshot))
}

pub async fn result(
    State(state): State<AppState>,
    Path(job_id): Path<String>,
) -> Result<Json<ResultResponse>, Error> {
    let job = state.store.get(&job_id).await?;
    Ok(Json(ResultResponse::for_job(&job)))
}

pub async fn queue_stats(
    State(state): State<AppState>,
) -> Result<Json<QueueStats>, Error> {
    let stats = state.store.stats().await?;
    let queue_depth = state.queue.pending_len().await?;

    Ok(Json(QueueStats {
        total_jobs: stats.total_jobs,
        pending_jobs: stats.pending_jobs,
        processing_jobs: stats.processing_jobs,
        completed_jobs: stats.completed_jobs,
        failed_jobs: stats.failed_jobs,
        avg_processing_time: stats.avg_processing_time,
        queue_depth,
        video_jobs: stats.video_jobs,
        image_jobs: stats.image_jobs,
        combined_jobs: stats.combined_jobs,
    }))
}

pub async fn cancel(
    State(state): State<AppState>,
    Path(job_id): Path<String>,
) -> Result<Json<serde_json::Value>, Error> {
    let job = state.store.get(&job_id).await?;

    match job.status {
        JobStatus::Processing => Err(Error::conflict(
            "Cannot cancel job that is currently processing",
        )),
        JobStatus::Completed | JobStatus::Failed => Err(Error::conflict("Job already finished")),
        // Re-cancelling a cancelled job is an idempotent re-write.
        _ => {
            state.queue.remove(&job_id).await?;
            state
                .store
                .set_status(&job_id, JobStatus::Cancelled, Some("Cancelled by user"))
                .await?;

            Ok(Json(json!({ "status": "cancelled", "job_id": job_id })))
        }
    }
}

pub async fn health() -> Json<serde_json::Value> {
    Json(json!({ "status": "healthy", "service": "media-compressor-api" }))
}

pub async fn ready(State(state): State<AppState>) -> impl IntoResponse {
    match state.queue.pending_len().await {
        Ok(queue_length) => (
            StatusCode::OK,
            Json(json!({ "status": "ready", "queue_length": queue_length })),
        ),
        Err(err) => {
            warn!(%err, "readiness check failed");
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(json!({ "status": "not ready", "error": "queue unavailable" })),
            )
        }
    }
}
