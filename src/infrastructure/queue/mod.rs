//! Priority queue of pending job ids plus the in-flight set and the short-TTL
//! status cache.
//!
//! Dequeue order is by ascending effective score: enqueue time in unix
//! seconds, minus `priority * 1000` for priorities above 5. Priorities of 5
//! and below are plain FIFO; higher priorities jump roughly `priority * 1000`
//! seconds ahead of the line.

use async_trait::async_trait;
use chrono::Utc;
use std::time::Duration;
use thiserror::Error;

use crate::domain::StatusResponse;

mod memory;
mod redis_queue;

pub use memory::MemoryQueue;
pub use redis_queue::RedisQueue;

/// Sorted set of pending job ids.
pub const QUEUE_KEY: &str = "compression:queue";
/// Set of job ids currently leased to a worker somewhere in the fleet.
pub const INFLIGHT_KEY: &str = "compression:processing:jobs";
/// Status cache keys are `job:status:{job_id}`.
pub const STATUS_CACHE_PREFIX: &str = "job:status:";

pub type QueueResult<T = ()> = Result<T, QueueError>;

#[derive(Debug, Error)]
pub enum QueueError {
    #[error("redis error: {0}")]
    Redis(#[from] redis::RedisError),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Score a job enqueued now would sort under.
pub fn effective_score(priority: i32) -> i64 {
    let mut score = Utc::now().timestamp();
    if priority > 5 {
        score -= i64::from(priority) * 1000;
    }
    score
}

/// Queue operations the scheduler and intake are written against.
#[async_trait]
pub trait JobQueue: Send + Sync {
    /// Add a job to the pending set, or refresh its score if already queued.
    async fn enqueue(&self, job_id: &str, priority: i32) -> QueueResult;

    /// Atomically pop the lowest-scored pending job and lease it into the
    /// in-flight set. `None` when the queue is empty. A job id can never be
    /// handed to two callers concurrently.
    async fn dequeue(&self) -> QueueResult<Option<String>>;

    /// Release the in-flight lease after the executor finishes (any outcome).
    async fn mark_complete(&self, job_id: &str) -> QueueResult;

    /// Drop a job from both the pending set and the in-flight set.
    async fn remove(&self, job_id: &str) -> QueueResult;

    async fn pending_len(&self) -> QueueResult<i64>;

    async fn inflight_count(&self) -> QueueResult<i64>;

    async fn cache_status(
        &self,
        job_id: &str,
        snapshot: &StatusResponse,
        ttl: Duration,
    ) -> QueueResult;

    /// Cached snapshot, or `None` on miss or after the TTL.
    async fn cached_status(&self, job_id: &str) -> QueueResult<Option<StatusResponse>>;
}

#[cfg(test)]
mod tests {
    use super::effective_score;

    #[test]
    fn priorities_above_five_jump_the_line() {
        let high = effective_score(10);
        let normal = effective_score(5);
        // A priority-10 job beats any FIFO enqueue in the next ~10000s.
        assert!(high <= normal - 9_999);
    }

    #[test]
    fn priorities_at_or_below_five_are_plain_fifo() {
        let a = effective_score(1);
        let b = effective_score(5);
        assert!((a - b).abs() <= 1);
    }
}
