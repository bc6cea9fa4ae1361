// SPDX-License-Identifier: GPL-3.0-or-later

use std::path::Path;
use std::sync::Arc;

use tracing::{info, instrument};

use crate::{CleanupLedger, MediaAsset, MediaToolkit, Result, ScopedFile};

const EXTRACTED_AUDIO_NAME: &str = "extracted.mp3";

/// Produces a single audio file holding a video's full audio track.
pub struct AudioExtractor {
    toolkit: Arc<dyn MediaToolkit>,
}

impl AudioExtractor {
    pub fn new(toolkit: Arc<dyn MediaToolkit>) -> Self {
        Self { toolkit }
    }

    /// Extract the audio track of `video` into `out_dir`.
    ///
    /// The input is never modified. On failure no output file is left behind.
    #[instrument(skip_all, fields(video = %video.display()))]
    pub async fn extract(
        &self,
        video: &Path,
        out_dir: &Path,
        ledger: &CleanupLedger,
    ) -> Result<MediaAsset> {
        let file = ScopedFile::new(out_dir.join(EXTRACTED_AUDIO_NAME), ledger.clone());

        self.toolkit.extract_audio(video, file.path()).await?;
        let duration = self.toolkit.probe_duration(file.path()).await?;

        info!(
            target: "media",
            duration_ms = duration.as_millis() as u64,
            "extracted audio track"
        );
        Ok(MediaAsset { file, duration })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Fragmenter, MediaError};
    use async_trait::async_trait;
    use std::time::Duration;

    /// Writes placeholder files instead of running ffmpeg.
    struct FakeToolkit {
        duration: Duration,
        fail_extract: bool,
        fail_cut_at: Option<Duration>,
    }

    #[async_trait]
    impl MediaToolkit for FakeToolkit {
        async fn probe_duration(&self, _path: &Path) -> Result<Duration> {
            Ok(self.duration)
        }

        async fn extract_audio(&self, _video: &Path, output: &Path) -> Result<()> {
            std::fs::write(output, b"partial")?;
            if self.fail_extract {
                return Err(MediaError::Decode("corrupt container".to_string()));
            }
            Ok(())
        }

        async fn cut_segment(
            &self,
            _audio: &Path,
            output: &Path,
            start: Duration,
            _length: Duration,
        ) -> Result<()> {
            if self.fail_cut_at == Some(start) {
                return Err(MediaError::Decode("truncated stream".to_string()));
            }
            std::fs::write(output, b"fragment")?;
            Ok(())
        }
    }

    fn toolkit(duration_secs: u64) -> FakeToolkit {
        FakeToolkit {
            duration: Duration::from_secs(duration_secs),
            fail_extract: false,
            fail_cut_at: None,
        }
    }

    fn entries(dir: &Path) -> usize {
        std::fs::read_dir(dir).unwrap().count()
    }

    #[tokio::test]
    async fn extract_returns_asset_with_duration() {
        let dir = tempfile::tempdir().unwrap();
        let extractor = AudioExtractor::new(Arc::new(toolkit(30)));

        let asset = extractor
            .extract(Path::new("clip.mp4"), dir.path(), &CleanupLedger::new())
            .await
            .unwrap();

        assert_eq!(asset.duration, Duration::from_secs(30));
        assert!(asset.path().exists());
        asset.release().unwrap();
        assert_eq!(entries(dir.path()), 0);
    }

    #[tokio::test]
    async fn failed_extraction_leaves_no_output() {
        let dir = tempfile::tempdir().unwrap();
        let mut fake = toolkit(30);
        fake.fail_extract = true;
        let extractor = AudioExtractor::new(Arc::new(fake));

        let result = extractor
            .extract(Path::new("clip.mp4"), dir.path(), &CleanupLedger::new())
            .await;

        assert!(matches!(result, Err(MediaError::Decode(_))));
        assert_eq!(entries(dir.path()), 0);
    }

    #[tokio::test]
    async fn split_writes_one_file_per_fragment() {
        let dir = tempfile::tempdir().unwrap();
        let toolkit: Arc<dyn MediaToolkit> = Arc::new(toolkit(30));
        let ledger = CleanupLedger::new();
        let audio = AudioExtractor::new(toolkit.clone())
            .extract(Path::new("clip.mp4"), dir.path(), &ledger)
            .await
            .unwrap();

        let fragmenter = Fragmenter::new(toolkit, Duration::from_secs(12)).unwrap();
        let fragments = fragmenter.split(&audio, dir.path(), &ledger).await.unwrap();

        assert_eq!(fragments.len(), 3);
        assert!(fragments.iter().all(|f| f.path().exists()));
        assert_eq!(fragments[2].start(), Duration::from_secs(24));
        assert_eq!(fragments[2].span.length, Duration::from_secs(6));

        drop(fragments);
        drop(audio);
        assert_eq!(entries(dir.path()), 0);
    }

    #[tokio::test]
    async fn failed_split_removes_written_fragments() {
        let dir = tempfile::tempdir().unwrap();
        let mut fake = toolkit(30);
        fake.fail_cut_at = Some(Duration::from_secs(24));
        let toolkit: Arc<dyn MediaToolkit> = Arc::new(fake);
        let ledger = CleanupLedger::new();
        let audio = AudioExtractor::new(toolkit.clone())
            .extract(Path::new("clip.mp4"), dir.path(), &ledger)
            .await
            .unwrap();

        let fragmenter = Fragmenter::new(toolkit, Duration::from_secs(12)).unwrap();
        let result = fragmenter.split(&audio, dir.path(), &ledger).await;

        assert!(result.is_err());
        // Only the extracted audio remains.
        assert_eq!(entries(dir.path()), 1);
    }

    #[test]
    fn zero_length_fragmenter_is_rejected() {
        let result = Fragmenter::new(Arc::new(toolkit(30)), Duration::ZERO);
        assert!(matches!(result, Err(MediaError::InvalidFragmentDuration)));
    }
}
