//! Media pipeline adapters.
//!
//! The worker treats these as black boxes: a local input path goes in, local
//! output paths and size metadata come out. Concrete implementations shell
//! out to ffmpeg and ImageMagick as child processes; `kill_on_drop` ties the
//! children to the job deadline.

use async_trait::async_trait;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::domain::{ImageQuality, VideoQuality};

pub mod image;
pub mod video;

pub use image::MagickImagePipeline;
pub use video::FfmpegVideoPipeline;

pub type PipelineResult<T> = Result<T, PipelineError>;

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    #[error("{tool} failed: {detail}")]
    ToolFailed { tool: &'static str, detail: String },

    #[error("unsupported quality: {0}")]
    UnsupportedQuality(String),

    #[error("unsupported variant: {0}")]
    UnsupportedVariant(String),
}

/// Adaptive-streaming output: the master playlist on disk plus the relative
/// playlist location for every rendered variant.
#[derive(Debug, Clone)]
pub struct HlsOutput {
    pub master_playlist: PathBuf,
    pub variant_playlists: BTreeMap<String, String>,
}

/// Size and dimensions of a probed image.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageProbe {
    pub size: i64,
    /// "WxH", empty when dimensions could not be read.
    pub dimensions: String,
}

#[async_trait]
pub trait VideoPipeline: Send + Sync {
    /// Size in bytes of a local video file.
    async fn probe(&self, input: &Path) -> PipelineResult<i64>;

    /// Transcode to a single MP4 rendition; returns the output path inside
    /// `workdir`.
    async fn transcode(
        &self,
        input: &Path,
        quality: VideoQuality,
        workdir: &Path,
    ) -> PipelineResult<PathBuf>;

    /// Render the requested HLS ladder rungs and write the master playlist.
    /// Unknown variant names are skipped.
    async fn generate_adaptive_streaming(
        &self,
        input: &Path,
        variants: &[String],
        workdir: &Path,
    ) -> PipelineResult<HlsOutput>;
}

#[async_trait]
pub trait ImagePipeline: Send + Sync {
    async fn probe(&self, input: &Path) -> PipelineResult<ImageProbe>;

    /// Render each requested variant; returns variant name -> output path.
    async fn render_variants(
        &self,
        input: &Path,
        quality: ImageQuality,
        variants: &[String],
        workdir: &Path,
    ) -> PipelineResult<BTreeMap<String, PathBuf>>;
}
