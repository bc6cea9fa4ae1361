// SPDX-License-Identifier: GPL-3.0-or-later

//! External media toolkit.
//!
//! Decoding and encoding are delegated to `ffmpeg`/`ffprobe`, spawned as child
//! processes. Audio is always written as MP3. The [`MediaToolkit`] trait is the
//! seam the extractor and fragmenter depend on.

use std::path::Path;
use std::process::Output;
use std::time::Duration;

use async_trait::async_trait;
use tokio::process::Command;
use tracing::{debug, instrument, trace};

use crate::{MediaError, Result};

#[async_trait]
pub trait MediaToolkit: Send + Sync + 'static {
    /// Duration of the media file at `path`.
    async fn probe_duration(&self, path: &Path) -> Result<Duration>;

    /// Write the full audio track of `video` to `output`.
    async fn extract_audio(&self, video: &Path, output: &Path) -> Result<()>;

    /// Write `length` of `audio`, starting at `start`, to `output`.
    async fn cut_segment(
        &self,
        audio: &Path,
        output: &Path,
        start: Duration,
        length: Duration,
    ) -> Result<()>;
}

#[derive(Debug, Clone)]
pub struct FfmpegToolkit {
    ffmpeg: String,
    ffprobe: String,
}

impl Default for FfmpegToolkit {
    fn default() -> Self {
        Self::new("ffmpeg", "ffprobe")
    }
}

impl FfmpegToolkit {
    pub fn new(ffmpeg: impl Into<String>, ffprobe: impl Into<String>) -> Self {
        Self {
            ffmpeg: ffmpeg.into(),
            ffprobe: ffprobe.into(),
        }
    }

    async fn run(&self, tool: &str, command: &mut Command) -> Result<Output> {
        trace!(target: "media", ?command, "spawning media tool");

        let output = command
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|source| MediaError::ToolUnavailable {
                tool: tool.to_string(),
                source,
            })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(MediaError::CommandFailed {
                tool: tool.to_string(),
                exit_code: output.status.code().unwrap_or(-1),
                message: stderr.trim().to_string(),
            });
        }

        Ok(output)
    }
}

#[async_trait]
impl MediaToolkit for FfmpegToolkit {
    #[instrument(skip(self), fields(file = %path.display()))]
    async fn probe_duration(&self, path: &Path) -> Result<Duration> {
        if !path.exists() {
            return Err(MediaError::FileNotFound(path.to_path_buf()));
        }

        let output = self
            .run(
                &self.ffprobe,
                Command::new(&self.ffprobe)
                    .args(["-v", "error"])
                    .args(["-show_entries", "format=duration"])
                    .args(["-of", "default=noprint_wrappers=1:nokey=1"])
                    .arg(path),
            )
            .await?;

        let stdout = String::from_utf8_lossy(&output.stdout);
        let duration = parse_probe_duration(&stdout)?;
        debug!(target: "media", duration_ms = duration.as_millis() as u64, "probed duration");
        Ok(duration)
    }

    #[instrument(skip(self), fields(video = %video.display()))]
    async fn extract_audio(&self, video: &Path, output: &Path) -> Result<()> {
        if !video.exists() {
            return Err(MediaError::FileNotFound(video.to_path_buf()));
        }

        self.run(
            &self.ffmpeg,
            Command::new(&self.ffmpeg)
                .args(["-v", "error", "-y", "-i"])
                .arg(video)
                .args(["-vn", "-acodec", "libmp3lame", "-q:a", "2"])
                .arg(output),
        )
        .await?;
        Ok(())
    }

    #[instrument(skip(self, audio, output), fields(start_ms = start.as_millis() as u64))]
    async fn cut_segment(
        &self,
        audio: &Path,
        output: &Path,
        start: Duration,
        length: Duration,
    ) -> Result<()> {
        self.run(
            &self.ffmpeg,
            Command::new(&self.ffmpeg)
                .args(["-v", "error", "-y"])
                .args(["-ss", &format_seconds(start)])
                .arg("-i")
                .arg(audio)
                .args(["-t", &format_seconds(length)])
                .args(["-vn", "-acodec", "libmp3lame"])
                .arg(output),
        )
        .await?;
        Ok(())
    }
}

/// Parse ffprobe's `format=duration` output (fractional seconds) to millisecond precision.
pub(crate) fn parse_probe_duration(raw: &str) -> Result<Duration> {
    let trimmed = raw.trim();
    let seconds: f64 = trimmed
        .parse()
        .map_err(|_| MediaError::InvalidDuration(format!("unparseable duration '{}'", trimmed)))?;

    if !seconds.is_finite() || seconds < 0.0 {
        return Err(MediaError::InvalidDuration(format!(
            "duration out of range: {}",
            trimmed
        )));
    }

    Ok(Duration::from_millis((seconds * 1000.0).round() as u64))
}

fn format_seconds(duration: Duration) -> String {
    format!("{}.{:03}", duration.as_secs(), duration.subsec_millis())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_fractional_duration() {
        let duration = parse_probe_duration("30.0245\n").unwrap();
        assert_eq!(duration, Duration::from_millis(30_025));
    }

    #[test]
    fn rejects_na_duration() {
        assert!(matches!(
            parse_probe_duration("N/A"),
            Err(MediaError::InvalidDuration(_))
        ));
    }

    #[test]
    fn rejects_negative_duration() {
        assert!(parse_probe_duration("-1.5").is_err());
    }

    #[test]
    fn formats_seconds_with_millis() {
        assert_eq!(format_seconds(Duration::from_millis(24_000)), "24.000");
        assert_eq!(format_seconds(Duration::from_millis(6_050)), "6.050");
    }

    #[tokio::test]
    async fn missing_binary_is_tool_unavailable() {
        let dir = tempfile::tempdir().unwrap();
        let video = dir.path().join("clip.mp4");
        std::fs::write(&video, b"not really a video").unwrap();

        let toolkit = FfmpegToolkit::new(
            "songscout-test-no-such-ffmpeg",
            "songscout-test-no-such-ffprobe",
        );
        let result = toolkit.probe_duration(&video).await;
        assert!(matches!(result, Err(MediaError::ToolUnavailable { .. })));
    }

    #[tokio::test]
    async fn missing_input_is_reported_before_spawning() {
        let toolkit = FfmpegToolkit::default();
        let result = toolkit
            .extract_audio(Path::new("/nonexistent/clip.mp4"), Path::new("/tmp/out.mp3"))
            .await;
        assert!(matches!(result, Err(MediaError::FileNotFound(_))));
    }
}
