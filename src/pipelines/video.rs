//! ffmpeg-backed video pipeline.

use async_trait::async_trait;
use std::collections::BTreeMap;
use std::fmt::Write as _;
use std::path::{Path, PathBuf};
use tokio::process::Command;
use tracing::debug;

use super::{HlsOutput, PipelineError, PipelineResult, VideoPipeline};
use crate::domain::VideoQuality;

/// One rung of the fixed HLS ladder.
struct HlsRung {
    name: &'static str,
    width: u32,
    height: u32,
    bitrate: &'static str,
    bandwidth: u32,
}

static HLS_LADDER: [HlsRung; 3] = [
    HlsRung { name: "480p", width: 854, height: 480, bitrate: "1000k", bandwidth: 1_000_000 },
    HlsRung { name: "720p", width: 1280, height: 720, bitrate: "2500k", bandwidth: 2_500_000 },
    HlsRung { name: "1080p", width: 1920, height: 1080, bitrate: "5000k", bandwidth: 5_000_000 },
];

fn ladder_rung(name: &str) -> Option<&'static HlsRung> {
    HLS_LADDER.iter().find(|rung| rung.name == name)
}

/// ffmpeg arguments for a single-rendition transcode. `hls-adaptive` has no
/// single-file rendition and is rejected here.
fn transcode_args(
    input: &Path,
    output: &Path,
    quality: VideoQuality,
) -> PipelineResult<Vec<String>> {
    let mut args: Vec<String> = vec!["-i".into(), input.display().to_string()];

    let (scale, bitrate, preset) = match quality {
        VideoQuality::Low => (Some("scale=854:480"), "1000k", "fast"),
        VideoQuality::Medium => (Some("scale=1280:720"), "2500k", "medium"),
        VideoQuality::High => (Some("scale=1920:1080"), "5000k", "slow"),
        VideoQuality::Ultra => (None, "8000k", "slow"),
        VideoQuality::HlsAdaptive => {
            return Err(PipelineError::UnsupportedQuality(quality.to_string()))
        }
    };

    if let Some(scale) = scale {
        args.extend(["-vf".into(), scale.into()]);
    }
    args.extend([
        "-b:v".into(),
        bitrate.into(),
        "-c:v".into(),
        "libx264".into(),
        "-preset".into(),
        preset.into(),
        "-c:a".into(),
        "aac".into(),
        "-b:a".into(),
        "128k".into(),
        "-movflags".into(),
        "+faststart".into(),
        "-y".into(),
        output.display().to_string(),
    ]);

    Ok(args)
}

fn hls_variant_args(input: &Path, rung: &HlsRung, variant_dir: &Path) -> Vec<String> {
    vec![
        "-i".into(),
        input.display().to_string(),
        "-vf".into(),
        format!("scale={}:{}", rung.width, rung.height),
        "-b:v".into(),
        rung.bitrate.into(),
        "-c:v".into(),
        "libx264".into(),
        "-c:a".into(),
        "aac".into(),
        "-b:a".into(),
        "128k".into(),
        "-hls_time".into(),
        "10".into(),
        "-hls_list_size".into(),
        "0".into(),
        "-hls_segment_filename".into(),
        variant_dir.join("segment-%03d.ts").display().to_string(),
        "-f".into(),
        "hls".into(),
        variant_dir.join("playlist.m3u8").display().to_string(),
    ]
}

pub struct FfmpegVideoPipeline {
    ffmpeg_path: String,
}

impl FfmpegVideoPipeline {
    pub fn new(ffmpeg_path: impl Into<String>) -> Self {
        Self {
            ffmpeg_path: ffmpeg_path.into(),
        }
    }

    async fn run_ffmpeg(&self, args: &[String]) -> PipelineResult<()> {
        debug!(ffmpeg = %self.ffmpeg_path, ?args, "running ffmpeg");

        let output = Command::new(&self.ffmpeg_path)
            .args(args)
            .kill_on_drop(true)
            .output()
            .await?;

        if !output.status.success() {
            return Err(PipelineError::ToolFailed {
                tool: "ffmpeg",
                detail: format!(
                    "{}: {}",
                    output.status,
                    String::from_utf8_lossy(&output.stderr).trim()
                ),
            });
        }
        Ok(())
    }
}

#[async_trait]
impl VideoPipeline for FfmpegVideoPipeline {
    async fn probe(&self, input: &Path) -> PipelineResult<i64> {
        let metadata = tokio::fs::metadata(input).await?;
        Ok(metadata.len() as i64)
    }

    async fn transcode(
        &self,
        input: &Path,
        quality: VideoQuality,
        workdir: &Path,
    ) -> PipelineResult<PathBuf> {
        let output = workdir.join("compressed.mp4");
        let args = transcode_args(input, &output, quality)?;
        self.run_ffmpeg(&args).await?;
        Ok(output)
    }

    async fn generate_adaptive_streaming(
        &self,
        input: &Path,
        variants: &[String],
        workdir: &Path,
    ) -> PipelineResult<HlsOutput> {
        let hls_dir = workdir.join("hls");
        tokio::fs::create_dir_all(&hls_dir).await?;

        let mut master = String::from("#EXTM3U\n#EXT-X-VERSION:3\n");
        let mut variant_playlists = BTreeMap::new();

        for variant in variants {
            let Some(rung) = ladder_rung(variant) else {
                continue;
            };

            let variant_dir = hls_dir.join(rung.name);
            tokio::fs::create_dir_all(&variant_dir).await?;

            self.run_ffmpeg(&hls_variant_args(input, rung, &variant_dir))
                .await?;

            let _ = writeln!(
                master,
                "#EXT-X-STREAM-INF:BANDWIDTH={},RESOLUTION={}x{}",
                rung.bandwidth, rung.width, rung.height
            );
            let _ = writeln!(master, "{}/playlist.m3u8", rung.name);

            variant_playlists.insert(
                rung.name.to_string(),
                format!("{}/playlist.m3u8", rung.name),
            );
        }

        let master_playlist = hls_dir.join("master.m3u8");
        tokio::fs::write(&master_playlist, master).await?;

        Ok(HlsOutput {
            master_playlist,
            variant_playlists,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transcode_args_follow_the_quality_table() {
        let input = Path::new("/tmp/in.mp4");
        let output = Path::new("/tmp/out.mp4");

        let args = transcode_args(input, output, VideoQuality::Low).unwrap();
        let joined = args.join(" ");
        assert!(joined.contains("-vf scale=854:480"));
        assert!(joined.contains("-b:v 1000k"));
        assert!(joined.contains("-preset fast"));
        assert!(joined.contains("-movflags +faststart"));
        assert!(joined.contains("-c:a aac"));

        let args = transcode_args(input, output, VideoQuality::High).unwrap();
        let joined = args.join(" ");
        assert!(joined.contains("scale=1920:1080"));
        assert!(joined.contains("-b:v 5000k"));
        assert!(joined.contains("-preset slow"));
    }

    #[test]
    fn ultra_keeps_the_source_resolution() {
        let args =
            transcode_args(Path::new("in.mp4"), Path::new("out.mp4"), VideoQuality::Ultra)
                .unwrap();
        let joined = args.join(" ");
        assert!(!joined.contains("-vf"));
        assert!(joined.contains("-b:v 8000k"));
    }

    #[test]
    fn hls_adaptive_is_not_a_single_file_rendition() {
        let result = transcode_args(
            Path::new("in.mp4"),
            Path::new("out.mp4"),
            VideoQuality::HlsAdaptive,
        );
        assert!(matches!(result, Err(PipelineError::UnsupportedQuality(_))));
    }

    #[test]
    fn hls_args_carry_segmenting_flags() {
        let rung = ladder_rung("720p").unwrap();
        let args = hls_variant_args(Path::new("in.mp4"), rung, Path::new("/tmp/hls/720p"));
        let joined = args.join(" ");
        assert!(joined.contains("scale=1280:720"));
        assert!(joined.contains("-hls_time 10"));
        assert!(joined.contains("-hls_list_size 0"));
        assert!(joined.contains("segment-%03d.ts"));
        assert!(joined.ends_with("playlist.m3u8"));
    }

    #[test]
    fn unknown_ladder_names_are_skipped() {
        assert!(ladder_rung("4k").is_none());
        assert_eq!(ladder_rung("480p").unwrap().bandwidth, 1_000_000);
    }
}
