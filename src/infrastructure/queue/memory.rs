//! In-process queue with the same semantics as the Redis implementation.
//!
//! Backs tests and single-node development runs. Not crash-tolerant: the
//! pending set lives and dies with the process.

use async_trait::async_trait;
use std::collections::{BTreeSet, HashMap, HashSet};
use std::time::{Duration, Instant};
use tokio::sync::Mutex;

use super::{effective_score, JobQueue, QueueResult};
use crate::domain::StatusResponse;

#[derive(Default)]
struct MemoryQueueState {
    /// (score, job_id): BTreeSet ordering matches the ZSET (score, then
    /// member lexicographically).
    pending: BTreeSet<(i64, String)>,
    /// job_id -> score, for score updates and removal.
    scores: HashMap<String, i64>,
    inflight: HashSet<String>,
    cache: HashMap<String, (Instant, StatusResponse)>,
}

#[derive(Default)]
pub struct MemoryQueue {
    state: Mutex<MemoryQueueState>,
}

impl MemoryQueue {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl JobQueue for MemoryQueue {
    async fn enqueue(&self, job_id: &str, priority: i32) -> QueueResult {
        let score = effective_score(priority);
        let mut state = self.state.lock().await;
        if let Some(old) = state.scores.insert(job_id.to_string(), score) {
            state.pending.remove(&(old, job_id.to_string()));
        }
        state.pending.insert((score, job_id.to_string()));
        Ok(())
    }

    async fn dequeue(&self) -> QueueResult<Option<String>> {
        // Single guard over pop + lease, mirroring the ZPOPMIN/SADD pair.
        let mut state = self.state.lock().await;
        let Some((score, job_id)) = state.pending.iter().next().cloned() else {
            return Ok(None);
        };
        state.pending.remove(&(score, job_id.clone()));
        state.scores.remove(&job_id);
        state.inflight.insert(job_id.clone());
        Ok(Some(job_id))
    }

    async fn mark_complete(&self, job_id: &str) -> QueueResult {
        self.state.lock().await.inflight.remove(job_id);
        Ok(())
    }

    async fn remove(&self, job_id: &str) -> QueueResult {
        let mut state = self.state.lock().await;
        if let Some(score) = state.scores.remove(job_id) {
            state.pending.remove(&(score, job_id.to_string()));
        }
        state.inflight.remove(job_id);
        Ok(())
    }

    async fn pending_len(&self) -> QueueResult<i64> {
        Ok(self.state.lock().await.pending.len() as i64)
    }

    async fn inflight_count(&self) -> QueueResult<i64> {
        Ok(self.state.lock().await.inflight.len() as i64)
    }

    async fn cache_status(
        &self,
        job_id: &str,
        snapshot: &StatusResponse,
        ttl: Duration,
    ) -> QueueResult {
        let expires_at = Instant::now() + ttl;
        self.state
            .lock()
            .await
            .cache
            .insert(job_id.to_string(), (expires_at, snapshot.clone()));
        Ok(())
    }

    async fn cached_status(&self, job_id: &str) -> QueueResult<Option<StatusResponse>> {
        let mut state = self.state.lock().await;
        if let Some((expires_at, snapshot)) = state.cache.get(job_id) {
            if *expires_at > Instant::now() {
                return Ok(Some(snapshot.clone()));
            }
        }
        state.cache.remove(job_id);
        Ok(None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{CompressionType, JobStatus};

    fn snapshot(job_id: &str) -> StatusResponse {
        StatusResponse {
            job_id: job_id.into(),
            compression_type: CompressionType::Image,
            overall_status: JobStatus::Pending,
            overall_progress: 0,
            video_status: None,
            video_progress: None,
            image_status: Some(JobStatus::Pending),
            image_progress: Some(0),
            estimated_time: 30,
        }
    }

    #[tokio::test]
    async fn higher_priority_dequeues_first() {
        let queue = MemoryQueue::new();
        queue.enqueue("low", 5).await.unwrap();
        queue.enqueue("high", 10).await.unwrap();

        assert_eq!(queue.dequeue().await.unwrap().as_deref(), Some("high"));
        assert_eq!(queue.dequeue().await.unwrap().as_deref(), Some("low"));
        assert_eq!(queue.dequeue().await.unwrap(), None);
    }

    #[tokio::test]
    async fn dequeue_moves_job_into_inflight() {
        let queue = MemoryQueue::new();
        queue.enqueue("a", 5).await.unwrap();

        assert_eq!(queue.pending_len().await.unwrap(), 1);
        assert_eq!(queue.inflight_count().await.unwrap(), 0);

        queue.dequeue().await.unwrap();
        assert_eq!(queue.pending_len().await.unwrap(), 0);
        assert_eq!(queue.inflight_count().await.unwrap(), 1);

        queue.mark_complete("a").await.unwrap();
        assert_eq!(queue.inflight_count().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn re_enqueue_updates_score_without_duplicating() {
        let queue = MemoryQueue::new();
        queue.enqueue("a", 5).await.unwrap();
        queue.enqueue("a", 10).await.unwrap();

        assert_eq!(queue.pending_len().await.unwrap(), 1);
        assert_eq!(queue.dequeue().await.unwrap().as_deref(), Some("a"));
        assert_eq!(queue.dequeue().await.unwrap(), None);
    }

    #[tokio::test]
    async fn remove_clears_pending_and_inflight() {
        let queue = MemoryQueue::new();
        queue.enqueue("a", 5).await.unwrap();
        queue.remove("a").await.unwrap();
        assert_eq!(queue.pending_len().await.unwrap(), 0);
        assert_eq!(queue.dequeue().await.unwrap(), None);

        queue.enqueue("b", 5).await.unwrap();
        queue.dequeue().await.unwrap();
        queue.remove("b").await.unwrap();
        assert_eq!(queue.inflight_count().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn racing_dequeues_hand_out_each_job_once() {
        use std::sync::Arc;

        let queue = Arc::new(MemoryQueue::new());
        queue.enqueue("contested", 5).await.unwrap();

        let mut handles = Vec::new();
        for _ in 0..32 {
            let queue = queue.clone();
            handles.push(tokio::spawn(async move { queue.dequeue().await.unwrap() }));
        }

        let mut winners = 0;
        for handle in handles {
            if handle.await.unwrap().is_some() {
                winners += 1;
            }
        }
        assert_eq!(winners, 1);
        assert_eq!(queue.inflight_count().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn cache_honours_ttl() {
        let queue = MemoryQueue::new();
        let value = snapshot("j1");

        queue
            .cache_status("j1", &value, Duration::from_secs(60))
            .await
            .unwrap();
        assert_eq!(queue.cached_status("j1").await.unwrap(), Some(value.clone()));

        queue
            .cache_status("j1", &value, Duration::from_millis(10))
            .await
            .unwrap();
        tokio::time::sleep(Duration::from_millis(30)).await;
        assert_eq!(queue.cached_status("j1").await.unwrap(), None);
    }

    #[tokio::test]
    async fn equal_priority_is_fifo_by_enqueue_time() {
        // Scores are unix seconds; equal-second enqueues tie-break on the
        // job id, so use ids whose lexical order matches enqueue order.
        let queue = MemoryQueue::new();
        queue.enqueue("a-first", 3).await.unwrap();
        queue.enqueue("b-second", 3).await.unwrap();

        assert_eq!(queue.dequeue().await.unwrap().as_deref(), Some("a-first"));
        assert_eq!(queue.dequeue().await.unwrap().as_deref(), Some("b-second"));
    }
}
