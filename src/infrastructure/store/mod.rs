//! Durable job store: source of truth for every job and its sub-results.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::domain::{
    CompressionType, ImageResult, ImageSpec, Job, JobStatus, VideoResult, VideoSpec,
};

pub mod entity;
mod sql;

#[cfg(test)]
mod sql_test;

pub use sql::SqlJobStore;

pub type StoreResult<T = ()> = Result<T, StoreError>;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("job not found: {0}")]
    NotFound(String),

    #[error("job already exists: {0}")]
    DuplicateId(String),

    #[error("database error: {0}")]
    Database(#[from] sea_orm::DbErr),

    /// A persisted row no longer parses into the domain model.
    #[error("corrupt job row {job_id}: {reason}")]
    Corrupt { job_id: String, reason: String },
}

/// Fields supplied by intake when a job is first persisted. Statuses and
/// timestamps are derived by the store.
#[derive(Debug, Clone)]
pub struct NewJob {
    pub job_id: String,
    pub post_id: i64,
    pub user_id: Option<i64>,
    pub compression_type: CompressionType,
    pub video_spec: Option<VideoSpec>,
    pub image_spec: Option<ImageSpec>,
    pub priority: i32,
    pub scheduled_time: Option<DateTime<Utc>>,
    pub max_retries: i32,
}

/// Aggregates over the jobs table, before the live queue depth is attached.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StoreStats {
    pub total_jobs: i64,
    pub pending_jobs: i64,
    pub processing_jobs: i64,
    pub completed_jobs: i64,
    pub failed_jobs: i64,
    pub avg_processing_time: f64,
    pub video_jobs: i64,
    pub image_jobs: i64,
    pub combined_jobs: i64,
}

/// Persistence operations the rest of the service is written against. Every
/// mutation bumps `updated_at`; single-row updates are atomic with respect to
/// concurrent readers.
#[async_trait]
pub trait JobStore: Send + Sync {
    /// Persist a new PENDING job. Sub-statuses are created PENDING for each
    /// present sub-spec. Fails with [`StoreError::DuplicateId`] when the id
    /// is already taken.
    async fn create(&self, new_job: NewJob) -> StoreResult<Job>;

    async fn get(&self, job_id: &str) -> StoreResult<Job>;

    async fn set_status(
        &self,
        job_id: &str,
        status: JobStatus,
        error_message: Option<&str>,
    ) -> StoreResult;

    async fn set_video_status(&self, job_id: &str, status: JobStatus) -> StoreResult;

    async fn set_image_status(&self, job_id: &str, status: JobStatus) -> StoreResult;

    async fn set_video_result(&self, job_id: &str, result: &VideoResult) -> StoreResult;

    async fn set_image_result(&self, job_id: &str, result: &ImageResult) -> StoreResult;

    /// Transition to PROCESSING and stamp `started_at`.
    async fn mark_started(&self, job_id: &str) -> StoreResult;

    /// Transition to COMPLETED and record the wall-clock processing time.
    async fn mark_completed(&self, job_id: &str, processing_time_secs: i64) -> StoreResult;

    /// Transition to FAILED with the final error message.
    async fn mark_failed(&self, job_id: &str, error_message: &str) -> StoreResult;

    /// Atomic `retry_count += 1` (a column expression, not read-modify-write).
    async fn increment_retry(&self, job_id: &str) -> StoreResult;

    async fn stats(&self) -> StoreResult<StoreStats>;

    /// PENDING jobs ordered by priority DESC, created_at ASC.
    async fn pending_jobs(&self, limit: u64) -> StoreResult<Vec<Job>>;

    /// All jobs currently in the given status; drives the startup recovery
    /// pass over stranded PROCESSING rows.
    async fn jobs_in_status(&self, status: JobStatus) -> StoreResult<Vec<Job>>;
}
