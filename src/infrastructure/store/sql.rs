//! SQL implementation of the job store on top of sea-orm.

use chrono::Utc;
use sea_orm::{
    sea_query::{Alias, Expr, Func},
    ActiveModelTrait,
    ActiveValue::Set,
    ColumnTrait, ConnectionTrait, Database, DatabaseConnection, DbErr, EntityTrait,
    PaginatorTrait, QueryFilter, QueryOrder, QuerySelect, Schema, SqlErr,
};
use std::str::FromStr;

use super::{entity, JobStore, NewJob, StoreError, StoreResult, StoreStats};
use crate::domain::{
    CompressionType, ImageResult, ImageSpec, Job, JobStatus, VideoResult, VideoSpec,
};
use async_trait::async_trait;

pub struct SqlJobStore {
    conn: DatabaseConnection,
}

impl SqlJobStore {
    /// Connect to `database_url` and create the jobs table if it does not
    /// exist yet.
    pub async fn connect(database_url: &str) -> StoreResult<Self> {
        let conn = Database::connect(database_url).await?;

        let schema = Schema::new(conn.get_database_backend());
        let mut create_jobs = schema.create_table_from_entity(entity::Entity);
        create_jobs.if_not_exists();
        conn.execute(conn.get_database_backend().build(&create_jobs))
            .await?;

        Ok(Self { conn })
    }

    pub fn conn(&self) -> &DatabaseConnection {
        &self.conn
    }

    async fn count_where(
        &self,
        filter: Option<sea_orm::sea_query::SimpleExpr>,
    ) -> StoreResult<i64> {
        let mut query = entity::Entity::find();
        if let Some(filter) = filter {
            query = query.filter(filter);
        }
        Ok(query.count(&self.conn).await? as i64)
    }
}

#[async_trait]
impl JobStore for SqlJobStore {
    async fn create(&self, new_job: NewJob) -> StoreResult<Job> {
        let now = Utc::now();
        let pending = Some(JobStatus::Pending.to_string());

        let row = entity::ActiveModel {
            job_id: Set(new_job.job_id.clone()),
            post_id: Set(new_job.post_id),
            user_id: Set(new_job.user_id),
            compression_type: Set(new_job.compression_type.to_string()),
            video_file_url: Set(new_job.video_spec.as_ref().map(|v| v.file_url.clone())),
            video_quality: Set(new_job
                .video_spec
                .as_ref()
                .map(|v| v.quality.to_string())),
            video_hls_enabled: Set(new_job.video_spec.as_ref().map(|v| v.hls_enabled)),
            video_hls_variants: Set(new_job
                .video_spec
                .as_ref()
                .filter(|v| !v.hls_variants.is_empty())
                .map(|v| serde_json::json!(v.hls_variants))),
            image_file_url: Set(new_job.image_spec.as_ref().map(|i| i.file_url.clone())),
            image_quality: Set(new_job
                .image_spec
                .as_ref()
                .map(|i| i.quality.to_string())),
            image_variants: Set(new_job
                .image_spec
                .as_ref()
                .filter(|i| !i.variants.is_empty())
                .map(|i| serde_json::json!(i.variants))),
            priority: Set(new_job.priority),
            status: Set(JobStatus::Pending.to_string()),
            video_status: Set(new_job.video_spec.as_ref().and(pending.clone())),
            image_status: Set(new_job.image_spec.as_ref().and(pending)),
            video_result: Set(None),
            image_result: Set(None),
            error_message: Set(None),
            created_at: Set(now),
            updated_at: Set(now),
            started_at: Set(None),
            completed_at: Set(None),
            scheduled_time: Set(new_job.scheduled_time),
            retry_count: Set(0),
            max_retries: Set(new_job.max_retries),
            processing_time: Set(None),
        };

        let inserted = row.insert(&self.conn).await.map_err(|err| {
            if matches!(err.sql_err(), Some(SqlErr::UniqueConstraintViolation(_))) {
                StoreError::DuplicateId(new_job.job_id.clone())
            } else {
                StoreError::Database(err)
            }
        })?;

        model_to_job(inserted)
    }

    async fn get(&self, job_id: &str) -> StoreResult<Job> {
        let model = entity::Entity::find_by_id(job_id)
            .one(&self.conn)
            .await?
            .ok_or_else(|| StoreError::NotFound(job_id.to_string()))?;

        model_to_job(model)
    }

    async fn set_status(
        &self,
        job_id: &str,
        status: JobStatus,
        error_message: Option<&str>,
    ) -> StoreResult {
        let mut row = entity::ActiveModel {
            job_id: Set(job_id.to_string()),
            status: Set(status.to_string()),
            updated_at: Set(Utc::now()),
            ..Default::default()
        };
        if let Some(message) = error_message {
            row.error_message = Set(Some(message.to_string()));
        }

        update_row(&self.conn, job_id, row).await
    }

    async fn set_video_status(&self, job_id: &str, status: JobStatus) -> StoreResult {
        let row = entity::ActiveModel {
            job_id: Set(job_id.to_string()),
            video_status: Set(Some(status.to_string())),
            updated_at: Set(Utc::now()),
            ..Default::default()
        };
        update_row(&self.conn, job_id, row).await
    }

    async fn set_image_status(&self, job_id: &str, status: JobStatus) -> StoreResult {
        let row = entity::ActiveModel {
            job_id: Set(job_id.to_string()),
            image_status: Set(Some(status.to_string())),
            updated_at: Set(Utc::now()),
            ..Default::default()
        };
        update_row(&self.conn, job_id, row).await
    }

    async fn set_video_result(&self, job_id: &str, result: &VideoResult) -> StoreResult {
        let row = entity::ActiveModel {
            job_id: Set(job_id.to_string()),
            video_result: Set(Some(serde_json::json!(result))),
            updated_at: Set(Utc::now()),
            ..Default::default()
        };
        update_row(&self.conn, job_id, row).await
    }

    async fn set_image_result(&self, job_id: &str, result: &ImageResult) -> StoreResult {
        let row = entity::ActiveModel {
            job_id: Set(job_id.to_string()),
            image_result: Set(Some(serde_json::json!(result))),
            updated_at: Set(Utc::now()),
            ..Default::default()
        };
        update_row(&self.conn, job_id, row).await
    }

    async fn mark_started(&self, job_id: &str) -> StoreResult {
        let now = Utc::now();
        let row = entity::ActiveModel {
            job_id: Set(job_id.to_string()),
            status: Set(JobStatus::Processing.to_string()),
            started_at: Set(Some(now)),
            updated_at: Set(now),
            ..Default::default()
        };
        update_row(&self.conn, job_id, row).await
    }

    async fn mark_completed(&self, job_id: &str, processing_time_secs: i64) -> StoreResult {
        let now = Utc::now();
        let row = entity::ActiveModel {
            job_id: Set(job_id.to_string()),
            status: Set(JobStatus::Completed.to_string()),
            completed_at: Set(Some(now)),
            processing_time: Set(Some(processing_time_secs)),
            updated_at: Set(now),
            ..Default::default()
        };
        update_row(&self.conn, job_id, row).await
    }

    async fn mark_failed(&self, job_id: &str, error_message: &str) -> StoreResult {
        let now = Utc::now();
        let row = entity::ActiveModel {
            job_id: Set(job_id.to_string()),
            status: Set(JobStatus::Failed.to_string()),
            error_message: Set(Some(error_message.to_string())),
            completed_at: Set(Some(now)),
            updated_at: Set(now),
            ..Default::default()
        };
        update_row(&self.conn, job_id, row).await
    }

    async fn increment_retry(&self, job_id: &str) -> StoreResult {
        let result = entity::Entity::update_many()
            .col_expr(
                entity::Column::RetryCount,
                Expr::col(entity::Column::RetryCount).add(1),
            )
            .col_expr(entity::Column::UpdatedAt, Expr::value(Utc::now()))
            .filter(entity::Column::JobId.eq(job_id))
            .exec(&self.conn)
            .await?;

        if result.rows_affected == 0 {
            return Err(StoreError::NotFound(job_id.to_string()));
        }
        Ok(())
    }

    async fn stats(&self) -> StoreResult<StoreStats> {
        let status_count = |status: JobStatus| {
            self.count_where(Some(entity::Column::Status.eq(status.to_string())))
        };
        let type_count = |ty: CompressionType| {
            self.count_where(Some(entity::Column::CompressionType.eq(ty.to_string())))
        };

        let avg_processing_time: Option<f64> = entity::Entity::find()
            .select_only()
            .column_as(
                Expr::expr(Func::avg(Expr::col(entity::Column::ProcessingTime)))
                    .cast_as(Alias::new("double precision")),
                "avg_processing_time",
            )
            .into_tuple::<Option<f64>>()
            .one(&self.conn)
            .await?
            .flatten();

        Ok(StoreStats {
            total_jobs: self.count_where(None).await?,
            pending_jobs: status_count(JobStatus::Pending).await?,
            processing_jobs: status_count(JobStatus::Processing).await?,
            completed_jobs: status_count(JobStatus::Completed).await?,
            failed_jobs: status_count(JobStatus::Failed).await?,
            avg_processing_time: avg_processing_time.unwrap_or(0.0),
            video_jobs: type_count(CompressionType::Video).await?,
            image_jobs: type_count(CompressionType::Image).await?,
            combined_jobs: type_count(CompressionType::Both).await?,
        })
    }

    async fn pending_jobs(&self, limit: u64) -> StoreResult<Vec<Job>> {
        let models = entity::Entity::find()
            .filter(entity::Column::Status.eq(JobStatus::Pending.to_string()))
            .order_by_desc(entity::Column::Priority)
            .order_by_asc(entity::Column::CreatedAt)
            .limit(limit)
            .all(&self.conn)
            .await?;

        models.into_iter().map(model_to_job).collect()
    }

    async fn jobs_in_status(&self, status: JobStatus) -> StoreResult<Vec<Job>> {
        let models = entity::Entity::find()
            .filter(entity::Column::Status.eq(status.to_string()))
            .all(&self.conn)
            .await?;

        models.into_iter().map(model_to_job).collect()
    }
}

async fn update_row(
    conn: &DatabaseConnection,
    job_id: &str,
    row: entity::ActiveModel,
) -> StoreResult {
    match row.update(conn).await {
        Ok(_) => Ok(()),
        Err(DbErr::RecordNotUpdated) => Err(StoreError::NotFound(job_id.to_string())),
        Err(err) => Err(StoreError::Database(err)),
    }
}

fn model_to_job(model: entity::Model) -> StoreResult<Job> {
    let corrupt = |reason: String| StoreError::Corrupt {
        job_id: model.job_id.clone(),
        reason,
    };

    let compression_type = CompressionType::from_str(&model.compression_type)
        .map_err(|e| corrupt(e))?;

    let video_spec = match &model.video_file_url {
        Some(file_url) => Some(VideoSpec {
            file_url: file_url.clone(),
            quality: model
                .video_quality
                .as_deref()
                .unwrap_or_default()
                .parse()
                .map_err(|e: String| corrupt(e))?,
            hls_enabled: model.video_hls_enabled.unwrap_or(false),
            hls_variants: model
                .video_hls_variants
                .clone()
                .map(serde_json::from_value)
                .transpose()
                .map_err(|e| corrupt(e.to_string()))?
                .unwrap_or_default(),
        }),
        None => None,
    };

    let image_spec = match &model.image_file_url {
        Some(file_url) => Some(ImageSpec {
            file_url: file_url.clone(),
            quality: model
                .image_quality
                .as_deref()
                .unwrap_or_default()
                .parse()
                .map_err(|e: String| corrupt(e))?,
            variants: model
                .image_variants
                .clone()
                .map(serde_json::from_value)
                .transpose()
                .map_err(|e| corrupt(e.to_string()))?
                .unwrap_or_default(),
        }),
        None => None,
    };

    let parse_status = |value: &Option<String>| -> StoreResult<Option<JobStatus>> {
        value
            .as_deref()
            .map(JobStatus::from_str)
            .transpose()
            .map_err(|e| corrupt(e))
    };

    let video_status = parse_status(&model.video_status)?;
    let image_status = parse_status(&model.image_status)?;

    let video_result: Option<VideoResult> = model
        .video_result
        .clone()
        .map(serde_json::from_value)
        .transpose()
        .map_err(|e| corrupt(e.to_string()))?;
    let image_result: Option<ImageResult> = model
        .image_result
        .clone()
        .map(serde_json::from_value)
        .transpose()
        .map_err(|e| corrupt(e.to_string()))?;

    let status = JobStatus::from_str(&model.status).map_err(|e| corrupt(e))?;

    Ok(Job {
        job_id: model.job_id,
        post_id: model.post_id,
        user_id: model.user_id,
        compression_type,
        video_spec,
        image_spec,
        priority: model.priority,
        status,
        video_status,
        image_status,
        video_result,
        image_result,
        error_message: model.error_message,
        created_at: model.created_at,
        updated_at: model.updated_at,
        started_at: model.started_at,
        completed_at: model.completed_at,
        scheduled_time: model.scheduled_time,
        retry_count: model.retry_count,
        max_retries: model.max_retries,
        processing_time: model.processing_time,
    })
}
