//! Per-job executor: state machine transitions, sub-pipelines, retry
//! decision, lease release.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;
use tracing::{error, info, warn};

use super::{SchedulerInner, WorkerError, WorkerResult};
use crate::domain::{
    CompressionType, ImageResult, ImageVariantInfo, Job, JobStatus, VideoResult,
};
use crate::pipelines::ImageProbe;

/// Drive one job to a terminal state (or a retry). Runs as its own task;
/// always deregisters from the active set and releases the queue lease.
pub(super) async fn execute_job(inner: Arc<SchedulerInner>, job: Job) {
    let job_id = job.job_id.clone();
    info!(%job_id, compression_type = %job.compression_type, "processing job");

    if let Err(err) = inner.store.mark_started(&job_id).await {
        warn!(%job_id, %err, "failed to mark job started");
    }

    let started = Instant::now();
    let timeout = inner.config.job_timeout;

    let (video_error, image_error) =
        match tokio::time::timeout(timeout, run_sub_pipelines(&inner, &job)).await {
            Ok(errors) => errors,
            Err(_) => {
                // Deadline expired; the dropped futures killed any children.
                let message = WorkerError::DeadlineExceeded(timeout).to_string();
                warn!(%job_id, %message, "job deadline expired");
                (
                    job.video_spec.as_ref().map(|_| message.clone()),
                    job.image_spec.as_ref().map(|_| message),
                )
            }
        };

    let processing_time = started.elapsed().as_secs() as i64;

    if video_error.is_some() || image_error.is_some() {
        let message = combined_error(&video_error, &image_error);

        if job.retry_count < job.max_retries {
            warn!(
                %job_id,
                attempt = job.retry_count + 1,
                max_retries = job.max_retries,
                %message,
                "job failed, scheduling retry"
            );

            if let Err(err) = inner.store.increment_retry(&job_id).await {
                error!(%job_id, %err, "failed to increment retry count");
            }

            let backoff = inner.config.backoff_for(job.retry_count);
            let queue = inner.queue.clone();
            let priority = job.priority;
            let retry_id = job_id.clone();
            tokio::spawn(async move {
                tokio::time::sleep(backoff).await;
                if let Err(err) = queue.enqueue(&retry_id, priority).await {
                    error!(job_id = %retry_id, %err, "failed to re-enqueue for retry");
                }
            });
        } else {
            error!(%job_id, %message, "job failed permanently");
            if let Err(err) = inner.store.mark_failed(&job_id, &message).await {
                error!(%job_id, %err, "failed to mark job failed");
            }
        }
    } else {
        if let Err(err) = inner.store.mark_completed(&job_id, processing_time).await {
            error!(%job_id, %err, "failed to mark job completed");
        }
        info!(%job_id, processing_time, "job completed");
    }

    inner.active.lock().await.remove(&job_id);
    if let Err(err) = inner.queue.mark_complete(&job_id).await {
        warn!(%job_id, %err, "failed to release queue lease");
    }
}

/// Run the sub-pipelines the job asks for; BOTH runs them concurrently and
/// collects both errors without short-circuiting.
async fn run_sub_pipelines(
    inner: &SchedulerInner,
    job: &Job,
) -> (Option<String>, Option<String>) {
    match job.compression_type {
        CompressionType::Video => (finish_video(inner, job, process_video(inner, job).await).await, None),
        CompressionType::Image => (None, finish_image(inner, job, process_image(inner, job).await).await),
        CompressionType::Both => {
            let (video, image) =
                futures::join!(process_video(inner, job), process_image(inner, job));
            (
                finish_video(inner, job, video).await,
                finish_image(inner, job, image).await,
            )
        }
    }
}

async fn finish_video(
    inner: &SchedulerInner,
    job: &Job,
    outcome: WorkerResult,
) -> Option<String> {
    let err = outcome.err()?;
    if let Err(status_err) = inner
        .store
        .set_video_status(&job.job_id, JobStatus::Failed)
        .await
    {
        warn!(job_id = %job.job_id, %status_err, "failed to record video failure");
    }
    Some(err.to_string())
}

async fn finish_image(
    inner: &SchedulerInner,
    job: &Job,
    outcome: WorkerResult,
) -> Option<String> {
    let err = outcome.err()?;
    if let Err(status_err) = inner
        .store
        .set_image_status(&job.job_id, JobStatus::Failed)
        .await
    {
        warn!(job_id = %job.job_id, %status_err, "failed to record image failure");
    }
    Some(err.to_string())
}

fn combined_error(video: &Option<String>, image: &Option<String>) -> String {
    let mut message = String::new();
    if let Some(video) = video {
        message.push_str(&format!("Video: {video}. "));
    }
    if let Some(image) = image {
        message.push_str(&format!("Image: {image}"));
    }
    message.trim_end().to_string()
}

/// Scoped per-sub-pipeline working directory under
/// `{temp_dir}/{job_id}/{video|image}`. Removed on every exit path,
/// including a dropped (timed-out) future.
struct Workspace {
    path: PathBuf,
}

impl Workspace {
    fn create(path: PathBuf) -> std::io::Result<Self> {
        std::fs::create_dir_all(&path)?;
        Ok(Self { path })
    }

    fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for Workspace {
    fn drop(&mut self) {
        if let Err(err) = std::fs::remove_dir_all(&self.path) {
            warn!(path = %self.path.display(), %err, "failed to remove job workspace");
        }
        // Clear the per-job parent once both sub-pipelines are done with it.
        if let Some(parent) = self.path.parent() {
            let _ = std::fs::remove_dir(parent);
        }
    }
}

/// File extension of the asset a URL points at, including the dot.
fn url_extension(url: &str) -> String {
    let path = url.split(['?', '#']).next().unwrap_or(url);
    Path::new(path)
        .extension()
        .map(|ext| format!(".{}", ext.to_string_lossy()))
        .unwrap_or_default()
}

async fn process_video(inner: &SchedulerInner, job: &Job) -> WorkerResult {
    let Some(spec) = &job.video_spec else {
        return Ok(());
    };

    inner
        .store
        .set_video_status(&job.job_id, JobStatus::Processing)
        .await?;

    let workspace =
        Workspace::create(inner.config.temp_dir.join(&job.job_id).join("video"))?;

    let input = workspace
        .path()
        .join(format!("input_video{}", url_extension(&spec.file_url)));
    info!(job_id = %job.job_id, url = %spec.file_url, "downloading video");
    inner.transport.download(&spec.file_url, &input).await?;

    let original_size = inner.video.probe(&input).await?;

    let transform_started = Instant::now();
    let mut result = VideoResult {
        status: "completed".to_string(),
        original_size,
        ..Default::default()
    };

    if spec.hls_enabled && !spec.hls_variants.is_empty() {
        info!(job_id = %job.job_id, variants = ?spec.hls_variants, "generating adaptive streaming");
        let hls = inner
            .video
            .generate_adaptive_streaming(&input, &spec.hls_variants, workspace.path())
            .await?;

        let playlist_url = inner.transport.upload(&hls.master_playlist).await?;
        result.hls_playlist_url = Some(playlist_url);
        result.hls_variants = Some(hls.variant_playlists);
    } else {
        info!(job_id = %job.job_id, quality = %spec.quality, "transcoding video");
        let output = inner
            .video
            .transcode(&input, spec.quality, workspace.path())
            .await?;

        let compressed_size = inner.video.probe(&output).await?;
        result.compressed_size = Some(compressed_size);
        result.compression_ratio = Some(if original_size > 0 {
            (original_size - compressed_size) as f64 / original_size as f64
        } else {
            0.0
        });

        result.compressed_url = Some(inner.transport.upload(&output).await?);
    }

    result.processing_time = transform_started.elapsed().as_secs() as i64;

    inner.store.set_video_result(&job.job_id, &result).await?;
    inner
        .store
        .set_video_status(&job.job_id, JobStatus::Completed)
        .await?;

    info!(job_id = %job.job_id, "video processing completed");
    Ok(())
}

async fn process_image(inner: &SchedulerInner, job: &Job) -> WorkerResult {
    let Some(spec) = &job.image_spec else {
        return Ok(());
    };

    inner
        .store
        .set_image_status(&job.job_id, JobStatus::Processing)
        .await?;

    let workspace =
        Workspace::create(inner.config.temp_dir.join(&job.job_id).join("image"))?;

    let input = workspace
        .path()
        .join(format!("input_image{}", url_extension(&spec.file_url)));
    info!(job_id = %job.job_id, url = %spec.file_url, "downloading image");
    inner.transport.download(&spec.file_url, &input).await?;

    let original = inner.image.probe(&input).await?;

    let variants = spec.effective_variants();
    info!(job_id = %job.job_id, ?variants, "rendering image variants");

    let transform_started = Instant::now();
    let rendered = inner
        .image
        .render_variants(&input, spec.quality, &variants, workspace.path())
        .await?;

    let mut result = ImageResult {
        status: "completed".to_string(),
        original_size: original.size,
        ..Default::default()
    };

    let mut total_compressed = 0;
    for (variant, path) in rendered {
        let probe = match inner.image.probe(&path).await {
            Ok(probe) => probe,
            Err(err) => {
                warn!(job_id = %job.job_id, %variant, %err, "failed to probe rendered variant");
                ImageProbe {
                    size: 0,
                    dimensions: String::new(),
                }
            }
        };

        // A failed variant upload drops that variant, not the job.
        match inner.transport.upload(&path).await {
            Ok(url) => {
                total_compressed += probe.size;
                result.variants.insert(
                    variant,
                    ImageVariantInfo {
                        url,
                        size: probe.size,
                        dimensions: probe.dimensions,
                    },
                );
            }
            Err(err) => {
                warn!(job_id = %job.job_id, %variant, %err, "failed to upload variant, skipping");
            }
        }
    }

    result.compressed_size = total_compressed;
    result.compression_ratio = if original.size > 0 {
        (original.size - total_compressed) as f64 / original.size as f64
    } else {
        0.0
    };
    result.processing_time = transform_started.elapsed().as_secs() as i64;

    inner.store.set_image_result(&job.job_id, &result).await?;
    inner
        .store
        .set_image_status(&job.job_id, JobStatus::Completed)
        .await?;

    info!(job_id = %job.job_id, "image processing completed");
    Ok(())
}
