//! Worker pool scheduler.
//!
//! A single control loop polls the queue every `queue_check_interval`, keeps
//! at most `max_concurrent_jobs` executors running, and hands each dequeued
//! job to its own task. Executors drive the job state machine, run the video
//! and image sub-pipelines (in parallel for BOTH jobs), decide retries, and
//! release the queue lease on every path.

use std::collections::HashSet;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::{watch, Mutex};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{error, info, warn};

use crate::config::Config;
use crate::domain::JobStatus;
use crate::infrastructure::queue::{JobQueue, QueueError};
use crate::infrastructure::store::{JobStore, StoreError};
use crate::pipelines::{ImagePipeline, PipelineError, VideoPipeline};
use crate::transport::{BlobTransport, TransportError};

mod executor;


pub type WorkerResult<T = ()> = Result<T, WorkerError>;

#[derive(Debug, Error)]
pub enum WorkerError {
    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Queue(#[from] QueueError),

    #[error(transparent)]
    Pipeline(#[from] PipelineError),

    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    #[error("job timed out after {0:?}")]
    DeadlineExceeded(std::time::Duration),
}

pub(crate) struct SchedulerInner {
    pub config: Arc<Config>,
    pub store: Arc<dyn JobStore>,
    pub queue: Arc<dyn JobQueue>,
    pub video: Arc<dyn VideoPipeline>,
    pub image: Arc<dyn ImagePipeline>,
    pub transport: Arc<dyn BlobTransport>,
    /// Job ids with a live executor in this process. Distinct from the
    /// cross-process in-flight set owned by the queue.
    pub active: Mutex<HashSet<String>>,
}

pub struct Scheduler {
    inner: Arc<SchedulerInner>,
    shutdown_tx: watch::Sender<bool>,
}

impl Scheduler {
    pub fn new(
        config: Arc<Config>,
        store: Arc<dyn JobStore>,
        queue: Arc<dyn JobQueue>,
        video: Arc<dyn VideoPipeline>,
        image: Arc<dyn ImagePipeline>,
        transport: Arc<dyn BlobTransport>,
    ) -> Self {
        let (shutdown_tx, _) = watch::channel(false);
        Self {
            inner: Arc::new(SchedulerInner {
                config,
                store,
                queue,
                video,
                image,
                transport,
                active: Mutex::new(HashSet::new()),
            }),
            shutdown_tx,
        }
    }

    /// Startup recovery: re-enqueue every job stranded in PROCESSING by an
    /// unclean shutdown and clear its stale in-flight lease. Must run before
    /// the control loop starts.
    pub async fn recover(&self) -> WorkerResult<usize> {
        let stranded = self.inner.store.jobs_in_status(JobStatus::Processing).await?;
        let count = stranded.len();

        for job in stranded {
            info!(job_id = %job.job_id, "re-enqueueing job stranded in processing");
            self.inner.queue.enqueue(&job.job_id, job.priority).await?;
            self.inner.queue.mark_complete(&job.job_id).await?;
        }

        Ok(count)
    }

    /// Spawn the control loop. It runs until [`Scheduler::shutdown`] is
    /// called; executors already running keep going.
    pub fn spawn(&self) -> JoinHandle<()> {
        let inner = self.inner.clone();
        let mut shutdown_rx = self.shutdown_tx.subscribe();

        tokio::spawn(async move {
            info!(
                interval = ?inner.config.queue_check_interval,
                max_concurrent = inner.config.max_concurrent_jobs,
                "scheduler started"
            );

            let mut ticker = tokio::time::interval(inner.config.queue_check_interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

            loop {
                tokio::select! {
                    _ = ticker.tick() => tick(&inner).await,
                    changed = shutdown_rx.changed() => {
                        if changed.is_err() || *shutdown_rx.borrow() {
                            break;
                        }
                    }
                }
            }

            info!("scheduler stopped");
        })
    }

    pub fn shutdown(&self) {
        let _ = self.shutdown_tx.send(true);
    }

    /// Number of executors currently running in this process.
    pub async fn active_count(&self) -> usize {
        self.inner.active.lock().await.len()
    }

    #[cfg(test)]
    pub(crate) async fn tick_once(&self) {
        tick(&self.inner).await;
    }
}

/// One pass of the control loop: fill free executor slots from the queue.
async fn tick(inner: &Arc<SchedulerInner>) {
    let active = inner.active.lock().await.len();
    if active >= inner.config.max_concurrent_jobs {
        return;
    }

    let slots = inner.config.max_concurrent_jobs - active;
    for _ in 0..slots {
        let job_id = match inner.queue.dequeue().await {
            Ok(Some(job_id)) => job_id,
            Ok(None) => break,
            Err(err) => {
                error!(%err, "failed to dequeue");
                break;
            }
        };

        let job = match inner.store.get(&job_id).await {
            Ok(job) => job,
            Err(err) => {
                // The lease would otherwise leak; drop the job.
                warn!(%job_id, %err, "dropping dequeued job that failed to load");
                if let Err(err) = inner.queue.mark_complete(&job_id).await {
                    warn!(%job_id, %err, "failed to release lease for dropped job");
                }
                continue;
            }
        };

        if job.status.is_terminal() {
            // Cancelled (or otherwise finished) between enqueue and dequeue.
            if let Err(err) = inner.queue.mark_complete(&job_id).await {
                warn!(%job_id, %err, "failed to release lease for finished job");
            }
            continue;
        }

        inner.active.lock().await.insert(job_id.clone());
        let inner = inner.clone();
        tokio::spawn(async move {
            executor::execute_job(inner, job).await;
        });
    }
}
