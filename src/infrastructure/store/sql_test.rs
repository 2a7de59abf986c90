#[cfg(test)]
mod tests {
    use super::super::{JobStore, NewJob, SqlJobStore, StoreError};
    use crate::domain::{
        CompressionType, ImageQuality, ImageResult, ImageSpec, ImageVariantInfo, JobStatus,
        VideoQuality, VideoResult, VideoSpec,
    };
    use pretty_assertions::assert_eq;
    use std::collections::BTreeMap;
    use tempfile::TempDir;

    async fn test_store() -> (SqlJobStore, TempDir) {
        let dir = TempDir::new().unwrap();
        let url = format!("sqlite://{}?mode=rwc", dir.path().join("jobs.db").display());
        let store = SqlJobStore::connect(&url).await.unwrap();
        (store, dir)
    }

    fn video_spec() -> VideoSpec {
        VideoSpec {
            file_url: "http://assets.example/v.mp4".into(),
            quality: VideoQuality::High,
            hls_enabled: false,
            hls_variants: vec![],
        }
    }

    fn image_spec() -> ImageSpec {
        ImageSpec {
            file_url: "http://assets.example/i.png".into(),
            quality: ImageQuality::Medium,
            variants: vec!["thumbnail".into(), "medium".into()],
        }
    }

    fn new_job(job_id: &str, compression_type: CompressionType) -> NewJob {
        NewJob {
            job_id: job_id.into(),
            post_id: 42,
            user_id: Some(7),
            compression_type,
            video_spec: compression_type.wants_video().then(video_spec),
            image_spec: compression_type.wants_image().then(image_spec),
            priority: 5,
            scheduled_time: None,
            max_retries: 3,
        }
    }

    #[tokio::test]
    async fn create_and_get_round_trip() {
        let (store, _dir) = test_store().await;

        let created = store.create(new_job("j1", CompressionType::Both)).await.unwrap();
        assert_eq!(created.status, JobStatus::Pending);
        assert_eq!(created.video_status, Some(JobStatus::Pending));
        assert_eq!(created.image_status, Some(JobStatus::Pending));
        assert_eq!(created.retry_count, 0);

        let fetched = store.get("j1").await.unwrap();
        assert_eq!(fetched.post_id, 42);
        assert_eq!(fetched.user_id, Some(7));
        assert_eq!(fetched.video_spec, Some(video_spec()));
        assert_eq!(fetched.image_spec, Some(image_spec()));
        assert_eq!(fetched.created_at, fetched.updated_at);
    }

    #[tokio::test]
    async fn video_only_job_has_no_image_status() {
        let (store, _dir) = test_store().await;

        let job = store.create(new_job("j1", CompressionType::Video)).await.unwrap();
        assert_eq!(job.video_status, Some(JobStatus::Pending));
        assert_eq!(job.image_status, None);
        assert!(job.image_spec.is_none());
    }

    #[tokio::test]
    async fn duplicate_id_is_rejected() {
        let (store, _dir) = test_store().await;

        store.create(new_job("j1", CompressionType::Image)).await.unwrap();
        let err = store.create(new_job("j1", CompressionType::Image)).await.unwrap_err();
        assert!(matches!(err, StoreError::DuplicateId(id) if id == "j1"));
    }

    #[tokio::test]
    async fn get_unknown_job_is_not_found() {
        let (store, _dir) = test_store().await;
        assert!(matches!(
            store.get("missing").await.unwrap_err(),
            StoreError::NotFound(_)
        ));
    }

    #[tokio::test]
    async fn updates_to_unknown_jobs_are_not_found() {
        let (store, _dir) = test_store().await;
        assert!(matches!(
            store.mark_started("missing").await.unwrap_err(),
            StoreError::NotFound(_)
        ));
        assert!(matches!(
            store.increment_retry("missing").await.unwrap_err(),
            StoreError::NotFound(_)
        ));
    }

    #[tokio::test]
    async fn lifecycle_timestamps_follow_transitions() {
        let (store, _dir) = test_store().await;
        store.create(new_job("j1", CompressionType::Video)).await.unwrap();

        store.mark_started("j1").await.unwrap();
        let job = store.get("j1").await.unwrap();
        assert_eq!(job.status, JobStatus::Processing);
        assert!(job.started_at.is_some());
        assert!(job.completed_at.is_none());

        store.mark_completed("j1", 17).await.unwrap();
        let job = store.get("j1").await.unwrap();
        assert_eq!(job.status, JobStatus::Completed);
        assert!(job.completed_at.is_some());
        assert_eq!(job.processing_time, Some(17));
    }

    #[tokio::test]
    async fn mark_failed_records_the_error() {
        let (store, _dir) = test_store().await;
        store.create(new_job("j1", CompressionType::Video)).await.unwrap();

        store.mark_failed("j1", "Video: ffmpeg failed").await.unwrap();
        let job = store.get("j1").await.unwrap();
        assert_eq!(job.status, JobStatus::Failed);
        assert_eq!(job.error_message.as_deref(), Some("Video: ffmpeg failed"));
        assert!(job.completed_at.is_some());
    }

    #[tokio::test]
    async fn sub_results_round_trip_as_json() {
        let (store, _dir) = test_store().await;
        store.create(new_job("j1", CompressionType::Both)).await.unwrap();

        let video = VideoResult {
            status: "completed".into(),
            original_size: 1000,
            compressed_size: Some(400),
            compression_ratio: Some(0.6),
            processing_time: 12,
            compressed_url: Some("http://cdn.example/v.mp4".into()),
            ..Default::default()
        };
        store.set_video_result("j1", &video).await.unwrap();
        store.set_video_status("j1", JobStatus::Completed).await.unwrap();

        let mut variants = BTreeMap::new();
        variants.insert(
            "thumbnail".to_string(),
            ImageVariantInfo {
                url: "http://cdn.example/t.png".into(),
                size: 30,
                dimensions: "150x150".into(),
            },
        );
        let image = ImageResult {
            status: "completed".into(),
            original_size: 100,
            compressed_size: 30,
            compression_ratio: 0.7,
            processing_time: 2,
            variants,
        };
        store.set_image_result("j1", &image).await.unwrap();

        let job = store.get("j1").await.unwrap();
        assert_eq!(job.video_result, Some(video));
        assert_eq!(job.image_result, Some(image));
        assert_eq!(job.video_status, Some(JobStatus::Completed));
    }

    #[tokio::test]
    async fn retry_count_increments_atomically() {
        let (store, _dir) = test_store().await;
        store.create(new_job("j1", CompressionType::Video)).await.unwrap();

        store.increment_retry("j1").await.unwrap();
        store.increment_retry("j1").await.unwrap();

        let job = store.get("j1").await.unwrap();
        assert_eq!(job.retry_count, 2);
    }

    #[tokio::test]
    async fn pending_jobs_order_by_priority_then_age() {
        let (store, _dir) = test_store().await;

        let mut low = new_job("low", CompressionType::Image);
        low.priority = 3;
        let mut high = new_job("high", CompressionType::Image);
        high.priority = 9;
        let mut mid = new_job("mid", CompressionType::Image);
        mid.priority = 5;

        store.create(low).await.unwrap();
        store.create(high).await.unwrap();
        store.create(mid).await.unwrap();
        store.mark_started("mid").await.unwrap();

        let pending = store.pending_jobs(10).await.unwrap();
        let ids: Vec<&str> = pending.iter().map(|j| j.job_id.as_str()).collect();
        assert_eq!(ids, vec!["high", "low"]);
    }

    #[tokio::test]
    async fn stats_aggregate_by_status_and_type() {
        let (store, _dir) = test_store().await;

        store.create(new_job("v1", CompressionType::Video)).await.unwrap();
        store.create(new_job("i1", CompressionType::Image)).await.unwrap();
        store.create(new_job("b1", CompressionType::Both)).await.unwrap();

        store.mark_started("v1").await.unwrap();
        store.mark_completed("v1", 10).await.unwrap();
        store.mark_started("i1").await.unwrap();
        store.mark_failed("i1", "boom").await.unwrap();

        let stats = store.stats().await.unwrap();
        assert_eq!(stats.total_jobs, 3);
        assert_eq!(stats.pending_jobs, 1);
        assert_eq!(stats.completed_jobs, 1);
        assert_eq!(stats.failed_jobs, 1);
        assert_eq!(stats.video_jobs, 1);
        assert_eq!(stats.image_jobs, 1);
        assert_eq!(stats.combined_jobs, 1);
        assert!((stats.avg_processing_time - 10.0).abs() < f64::EPSILON);
    }

    #[tokio::test]
    async fn jobs_in_status_finds_stranded_processing_rows() {
        let (store, _dir) = test_store().await;

        store.create(new_job("a", CompressionType::Video)).await.unwrap();
        store.create(new_job("b", CompressionType::Video)).await.unwrap();
        store.mark_started("a").await.unwrap();

        let processing = store.jobs_in_status(JobStatus::Processing).await.unwrap();
        assert_eq!(processing.len(), 1);
        assert_eq!(processing[0].job_id, "a");
    }
}
