//! Request and response shapes of the HTTP surface.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::job::{
    CompressionType, ImageResult, ImageSpec, Job, JobStatus, VideoResult, VideoSpec,
};

/// Body of `POST /api/compress`.
#[derive(Debug, Clone, Deserialize)]
pub struct CompressRequest {
    #[serde(default)]
    pub job_id: Option<String>,
    pub post_id: i64,
    #[serde(default)]
    pub user_id: Option<i64>,
    pub compression_type: CompressionType,
    #[serde(default)]
    pub video_data: Option<VideoSpec>,
    #[serde(default)]
    pub image_data: Option<ImageSpec>,
    #[serde(default)]
    pub priority: i32,
    #[serde(default)]
    pub scheduled_time: Option<DateTime<Utc>>,
}

/// Reply to `POST /api/compress`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompressResponse {
    pub status: String,
    pub job_id: String,
    pub compression_type: CompressionType,
    pub queue_position: i64,
    pub estimated_time: i64,
}

/// Reply to `GET /api/status/:job_id`; also the cached snapshot shape.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatusResponse {
    pub job_id: String,
    pub compression_type: CompressionType,
    pub overall_status: JobStatus,
    pub overall_progress: i32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub video_status: Option<JobStatus>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub video_progress: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image_status: Option<JobStatus>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image_progress: Option<i32>,
    pub estimated_time: i64,
}

impl StatusResponse {
    /// Project a job row into the status snapshot served to pollers.
    pub fn for_job(job: &Job) -> Self {
        let video_progress = job.video_status.map(sub_progress);
        let image_progress = job.image_status.map(sub_progress);

        Self {
            job_id: job.job_id.clone(),
            compression_type: job.compression_type,
            overall_status: job.status,
            overall_progress: overall_progress(job, video_progress, image_progress),
            video_status: job.video_status,
            video_progress,
            image_status: job.image_status,
            image_progress,
            estimated_time: estimated_time(job),
        }
    }
}

fn sub_progress(status: JobStatus) -> i32 {
    match status {
        JobStatus::Completed => 100,
        JobStatus::Processing => 50,
        _ => 0,
    }
}

fn overall_progress(job: &Job, video: Option<i32>, image: Option<i32>) -> i32 {
    if job.status == JobStatus::Completed {
        return 100;
    }
    if job.status == JobStatus::Pending {
        return 0;
    }

    let parts: Vec<i32> = [video, image].into_iter().flatten().collect();
    if parts.is_empty() {
        return 50;
    }
    parts.iter().sum::<i32>() / parts.len() as i32
}

fn estimated_time(job: &Job) -> i64 {
    if matches!(job.status, JobStatus::Completed | JobStatus::Failed) {
        return 0;
    }

    let mut estimate = 0;
    if job.video_status.is_some_and(|s| s != JobStatus::Completed) {
        estimate += 300;
    }
    if job.image_status.is_some_and(|s| s != JobStatus::Completed) {
        estimate += 30;
    }
    estimate
}

/// Reply to `GET /api/result/:job_id`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResultResponse {
    pub job_id: String,
    pub compression_type: CompressionType,
    pub overall_status: JobStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub video_result: Option<VideoResult>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image_result: Option<ImageResult>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
}

impl ResultResponse {
    pub fn for_job(job: &Job) -> Self {
        Self {
            job_id: job.job_id.clone(),
            compression_type: job.compression_type,
            overall_status: job.status,
            video_result: job.video_result.clone(),
            image_result: job.image_result.clone(),
            error_message: job.error_message.clone(),
        }
    }
}

/// Reply to `GET /api/queue/stats`: store aggregates plus the live queue depth.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct QueueStats {
    pub total_jobs: i64,
    pub pending_jobs: i64,
    pub processing_jobs: i64,
    pub completed_jobs: i64,
    pub failed_jobs: i64,
    pub avg_processing_time: f64,
    pub queue_depth: i64,
    pub video_jobs: i64,
    pub image_jobs: i64,
    pub combined_jobs: i64,
}
