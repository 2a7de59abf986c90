//! sea-orm entity for the `jobs` table.
//!
//! Sub-specs are flattened into nullable columns; sub-results are JSON
//! documents. The table is created at startup if missing, against whichever
//! backend `DATABASE_URL` names.

use chrono::{DateTime, Utc};
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "jobs")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub job_id: String,
    pub post_id: i64,
    pub user_id: Option<i64>,
    pub compression_type: String,

    // Video sub-spec
    pub video_file_url: Option<String>,
    pub video_quality: Option<String>,
    pub video_hls_enabled: Option<bool>,
    pub video_hls_variants: Option<JsonValue>,

    // Image sub-spec
    pub image_file_url: Option<String>,
    pub image_quality: Option<String>,
    pub image_variants: Option<JsonValue>,

    pub priority: i32,
    pub status: String,
    pub video_status: Option<String>,
    pub image_status: Option<String>,

    // Sub-result documents
    pub video_result: Option<JsonValue>,
    pub image_result: Option<JsonValue>,

    pub error_message: Option<String>,

    // Timestamps
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub scheduled_time: Option<DateTime<Utc>>,

    pub retry_count: i32,
    pub max_retries: i32,
    pub processing_time: Option<i64>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
