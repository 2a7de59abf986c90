//! The durable job record and its sub-result documents.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

/// Image variants rendered when a request does not name any.
pub const DEFAULT_IMAGE_VARIANTS: [&str; 4] = ["thumbnail", "medium", "large", "original"];

/// What a job compresses: a video, an image, or both in parallel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CompressionType {
    Video,
    Image,
    Both,
}

impl CompressionType {
    pub fn wants_video(&self) -> bool {
        matches!(self, Self::Video | Self::Both)
    }

    pub fn wants_image(&self) -> bool {
        matches!(self, Self::Image | Self::Both)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Video => "video",
            Self::Image => "image",
            Self::Both => "both",
        }
    }
}

impl fmt::Display for CompressionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CompressionType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "video" => Ok(Self::Video),
            "image" => Ok(Self::Image),
            "both" => Ok(Self::Both),
            other => Err(format!("unknown compression type: {other}")),
        }
    }
}

/// Lifecycle state of a job, and of each sub-pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Pending,
    Scheduled,
    Processing,
    Completed,
    Failed,
    Cancelled,
}

impl JobStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Cancelled)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Scheduled => "scheduled",
            Self::Processing => "processing",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Cancelled => "cancelled",
        }
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for JobStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(Self::Pending),
            "scheduled" => Ok(Self::Scheduled),
            "processing" => Ok(Self::Processing),
            "completed" => Ok(Self::Completed),
            "failed" => Ok(Self::Failed),
            "cancelled" => Ok(Self::Cancelled),
            other => Err(format!("unknown job status: {other}")),
        }
    }
}

/// Target quality for the video sub-pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum VideoQuality {
    Low,
    Medium,
    High,
    Ultra,
    HlsAdaptive,
}

impl VideoQuality {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
            Self::Ultra => "ultra",
            Self::HlsAdaptive => "hls-adaptive",
        }
    }
}

impl fmt::Display for VideoQuality {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for VideoQuality {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "low" => Ok(Self::Low),
            "medium" => Ok(Self::Medium),
            "high" => Ok(Self::High),
            "ultra" => Ok(Self::Ultra),
            "hls-adaptive" => Ok(Self::HlsAdaptive),
            other => Err(format!("unknown video quality: {other}")),
        }
    }
}

/// Target quality for the image sub-pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ImageQuality {
    Low,
    Medium,
    High,
    Ultra,
}

impl ImageQuality {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
            Self::Ultra => "ultra",
        }
    }
}

impl fmt::Display for ImageQuality {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ImageQuality {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "low" => Ok(Self::Low),
            "medium" => Ok(Self::Medium),
            "high" => Ok(Self::High),
            "ultra" => Ok(Self::Ultra),
            other => Err(format!("unknown image quality: {other}")),
        }
    }
}

/// What to do with the video asset of a job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VideoSpec {
    pub file_url: String,
    pub quality: VideoQuality,
    #[serde(default)]
    pub hls_enabled: bool,
    #[serde(default)]
    pub hls_variants: Vec<String>,
}

/// What to do with the image asset of a job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageSpec {
    pub file_url: String,
    pub quality: ImageQuality,
    #[serde(default)]
    pub variants: Vec<String>,
}

impl ImageSpec {
    /// Variant list with the default set applied when none were requested.
    pub fn effective_variants(&self) -> Vec<String> {
        if self.variants.is_empty() {
            DEFAULT_IMAGE_VARIANTS.iter().map(|v| v.to_string()).collect()
        } else {
            self.variants.clone()
        }
    }
}

/// Outcome of the video sub-pipeline.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct VideoResult {
    pub status: String,
    pub original_size: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub compressed_size: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub compression_ratio: Option<f64>,
    pub processing_time: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub compressed_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hls_playlist_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hls_variants: Option<BTreeMap<String, String>>,
}

/// One rendered image variant.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImageVariantInfo {
    pub url: String,
    pub size: i64,
    /// "WxH", empty when the probe could not read dimensions.
    pub dimensions: String,
}

/// Outcome of the image sub-pipeline.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ImageResult {
    pub status: String,
    pub original_size: i64,
    pub compressed_size: i64,
    pub compression_ratio: f64,
    pub processing_time: i64,
    pub variants: BTreeMap<String, ImageVariantInfo>,
}

/// One client submission through its full lifecycle. Source of truth lives in
/// the job store; this is the in-memory projection every component works with.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Job {
    pub job_id: String,
    pub post_id: i64,
    pub user_id: Option<i64>,
    pub compression_type: CompressionType,
    pub video_spec: Option<VideoSpec>,
    pub image_spec: Option<ImageSpec>,
    pub priority: i32,
    pub status: JobStatus,
    pub video_status: Option<JobStatus>,
    pub image_status: Option<JobStatus>,
    pub video_result: Option<VideoResult>,
    pub image_result: Option<ImageResult>,
    pub error_message: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub scheduled_time: Option<DateTime<Utc>>,
    pub retry_count: i32,
    pub max_retries: i32,
    pub processing_time: Option<i64>,
}
