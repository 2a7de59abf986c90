//! ImageMagick-backed image pipeline.

use async_trait::async_trait;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tokio::process::Command;
use tracing::{debug, warn};

use super::{ImagePipeline, ImageProbe, PipelineError, PipelineResult};
use crate::domain::ImageQuality;

/// Base JPEG quality per level, before variant adjustments.
fn base_quality(quality: ImageQuality) -> u8 {
    match quality {
        ImageQuality::Low => 60,
        ImageQuality::Medium => 75,
        ImageQuality::High => 85,
        ImageQuality::Ultra => 95,
    }
}

/// Thumbnails are clamped down to 75, the original rendition is lifted to 95.
fn variant_quality(quality: ImageQuality, variant: &str) -> u8 {
    let q = base_quality(quality);
    match variant {
        "thumbnail" => q.min(75),
        "original" => q.max(95),
        _ => q,
    }
}

/// Resize arguments per variant; `original` keeps the source dimensions.
fn resize_args(variant: &str) -> PipelineResult<Vec<String>> {
    let args: &[&str] = match variant {
        "thumbnail" => &["-resize", "150x150^", "-gravity", "center", "-extent", "150x150"],
        "medium" => &["-resize", "400x300"],
        "large" => &["-resize", "800x600"],
        "original" => &[],
        other => return Err(PipelineError::UnsupportedVariant(other.to_string())),
    };
    Ok(args.iter().map(|a| a.to_string()).collect())
}

fn variant_args(
    input: &Path,
    output: &Path,
    quality: ImageQuality,
    variant: &str,
) -> PipelineResult<Vec<String>> {
    let mut args = vec![input.display().to_string()];
    args.extend(resize_args(variant)?);
    args.extend([
        "-quality".into(),
        variant_quality(quality, variant).to_string(),
        output.display().to_string(),
    ]);
    Ok(args)
}

pub struct MagickImagePipeline {
    convert_path: String,
}

impl MagickImagePipeline {
    pub fn new(convert_path: impl Into<String>) -> Self {
        Self {
            convert_path: convert_path.into(),
        }
    }
}

#[async_trait]
impl ImagePipeline for MagickImagePipeline {
    async fn probe(&self, input: &Path) -> PipelineResult<ImageProbe> {
        let size = tokio::fs::metadata(input).await?.len() as i64;

        // A failed identify degrades to size-only, it does not abort the job.
        let dimensions = match Command::new("identify")
            .args(["-format", "%wx%h"])
            .arg(input)
            .kill_on_drop(true)
            .output()
            .await
        {
            Ok(output) if output.status.success() => {
                String::from_utf8_lossy(&output.stdout).trim().to_string()
            }
            Ok(output) => {
                warn!(
                    input = %input.display(),
                    status = %output.status,
                    "identify failed, recording size only"
                );
                String::new()
            }
            Err(err) => {
                warn!(input = %input.display(), %err, "identify unavailable, recording size only");
                String::new()
            }
        };

        Ok(ImageProbe { size, dimensions })
    }

    async fn render_variants(
        &self,
        input: &Path,
        quality: ImageQuality,
        variants: &[String],
        workdir: &Path,
    ) -> PipelineResult<BTreeMap<String, PathBuf>> {
        let extension = input
            .extension()
            .map(|ext| ext.to_string_lossy().to_string())
            .unwrap_or_else(|| "jpg".to_string());

        let mut outputs = BTreeMap::new();
        for variant in variants {
            let output = workdir.join(format!("{variant}.{extension}"));
            let args = variant_args(input, &output, quality, variant)?;

            debug!(convert = %self.convert_path, ?args, "rendering image variant");
            let result = Command::new(&self.convert_path)
                .args(&args)
                .kill_on_drop(true)
                .output()
                .await?;

            if !result.status.success() {
                return Err(PipelineError::ToolFailed {
                    tool: "imagemagick",
                    detail: format!(
                        "{} variant {}: {}",
                        result.status,
                        variant,
                        String::from_utf8_lossy(&result.stderr).trim()
                    ),
                });
            }

            outputs.insert(variant.clone(), output);
        }

        Ok(outputs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn quality_table_matches_levels() {
        assert_eq!(base_quality(ImageQuality::Low), 60);
        assert_eq!(base_quality(ImageQuality::Medium), 75);
        assert_eq!(base_quality(ImageQuality::High), 85);
        assert_eq!(base_quality(ImageQuality::Ultra), 95);
    }

    #[test]
    fn thumbnail_quality_is_clamped_and_original_is_lifted() {
        assert_eq!(variant_quality(ImageQuality::Ultra, "thumbnail"), 75);
        assert_eq!(variant_quality(ImageQuality::Low, "thumbnail"), 60);
        assert_eq!(variant_quality(ImageQuality::Low, "original"), 95);
        assert_eq!(variant_quality(ImageQuality::Ultra, "original"), 95);
        assert_eq!(variant_quality(ImageQuality::High, "medium"), 85);
    }

    #[test]
    fn thumbnail_is_center_cropped() {
        let args = variant_args(
            Path::new("in.png"),
            Path::new("out.png"),
            ImageQuality::High,
            "thumbnail",
        )
        .unwrap();
        let joined = args.join(" ");
        assert!(joined.contains("-resize 150x150^"));
        assert!(joined.contains("-gravity center"));
        assert!(joined.contains("-extent 150x150"));
        assert!(joined.contains("-quality 75"));
    }

    #[test]
    fn original_variant_keeps_dimensions() {
        let args = variant_args(
            Path::new("in.jpg"),
            Path::new("out.jpg"),
            ImageQuality::Low,
            "original",
        )
        .unwrap();
        assert!(!args.join(" ").contains("-resize"));
        assert!(args.join(" ").contains("-quality 95"));
    }

    #[test]
    fn unknown_variant_is_rejected() {
        let result = variant_args(
            Path::new("in.jpg"),
            Path::new("out.jpg"),
            ImageQuality::Low,
            "massive",
        );
        assert!(matches!(result, Err(PipelineError::UnsupportedVariant(_))));
    }
}
