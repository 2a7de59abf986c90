//! Redis-backed queue: ZSET for the pending set, SET for the in-flight
//! lease, string keys with TTL for the status cache.

use async_trait::async_trait;
use redis::{aio::ConnectionManager, AsyncCommands};
use std::time::Duration;

use super::{
    effective_score, JobQueue, QueueResult, INFLIGHT_KEY, QUEUE_KEY, STATUS_CACHE_PREFIX,
};
use crate::domain::StatusResponse;

pub struct RedisQueue {
    conn: ConnectionManager,
}

impl RedisQueue {
    /// Connect and verify the server answers a PING.
    pub async fn connect(redis_url: &str) -> QueueResult<Self> {
        let client = redis::Client::open(redis_url)?;
        let mut conn = client.get_connection_manager().await?;
        let _: String = redis::cmd("PING").query_async(&mut conn).await?;
        Ok(Self { conn })
    }

    fn conn(&self) -> ConnectionManager {
        self.conn.clone()
    }
}

#[async_trait]
impl JobQueue for RedisQueue {
    async fn enqueue(&self, job_id: &str, priority: i32) -> QueueResult {
        let score = effective_score(priority) as f64;
        let _: () = self.conn().zadd(QUEUE_KEY, job_id, score).await?;
        Ok(())
    }

    async fn dequeue(&self) -> QueueResult<Option<String>> {
        let mut conn = self.conn();

        // ZPOPMIN is the atomicity point: exactly one caller receives a
        // given member.
        let popped: Vec<(String, f64)> = conn.zpopmin(QUEUE_KEY, 1).await?;
        let Some((job_id, _score)) = popped.into_iter().next() else {
            return Ok(None);
        };

        let _: () = conn.sadd(INFLIGHT_KEY, &job_id).await?;
        Ok(Some(job_id))
    }

    async fn mark_complete(&self, job_id: &str) -> QueueResult {
        let _: () = self.conn().srem(INFLIGHT_KEY, job_id).await?;
        Ok(())
    }

    async fn remove(&self, job_id: &str) -> QueueResult {
        let mut conn = self.conn();
        let _: () = conn.zrem(QUEUE_KEY, job_id).await?;
        let _: () = conn.srem(INFLIGHT_KEY, job_id).await?;
        Ok(())
    }

    async fn pending_len(&self) -> QueueResult<i64> {
        Ok(self.conn().zcard(QUEUE_KEY).await?)
    }

    async fn inflight_count(&self) -> QueueResult<i64> {
        Ok(self.conn().scard(INFLIGHT_KEY).await?)
    }

    async fn cache_status(
        &self,
        job_id: &str,
        snapshot: &StatusResponse,
        ttl: Duration,
    ) -> QueueResult {
        let payload = serde_json::to_string(snapshot)?;
        let key = format!("{STATUS_CACHE_PREFIX}{job_id}");
        let _: () = self.conn().set_ex(key, payload, ttl.as_secs()).await?;
        Ok(())
    }

    async fn cached_status(&self, job_id: &str) -> QueueResult<Option<StatusResponse>> {
        let key = format!("{STATUS_CACHE_PREFIX}{job_id}");
        let payload: Option<String> = self.conn().get(key).await?;
        match payload {
            Some(payload) => Ok(Some(serde_json::from_str(&payload)?)),
            None => Ok(None),
        }
    }
}
