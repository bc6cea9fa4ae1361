// SPDX-License-Identifier: GPL-3.0-or-later

//! Splitting an audio asset into fixed-length fragments.
//!
//! Fragments are contiguous and non-overlapping. For a total duration `D` and
//! fragment length `F` there are `ceil(D / F)` fragments; fragment `k` starts
//! at `k * F`, and every fragment but the last is exactly `F` long. The last
//! one is `D mod F` long, or `F` when the division is exact.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info, instrument};

use crate::{CleanupLedger, MediaAsset, MediaError, MediaToolkit, Result, ScopedFile};

/// Position of one fragment inside the source audio.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FragmentSpan {
    pub index: usize,
    pub start: Duration,
    pub length: Duration,
}

impl FragmentSpan {
    pub fn end(&self) -> Duration {
        self.start + self.length
    }
}

/// An audio fragment written to temporary storage.
#[derive(Debug)]
pub struct Fragment {
    pub span: FragmentSpan,
    pub file: ScopedFile,
}

impl Fragment {
    pub fn index(&self) -> usize {
        self.span.index
    }

    pub fn start(&self) -> Duration {
        self.span.start
    }

    pub fn path(&self) -> &Path {
        self.file.path()
    }
}

/// Compute fragment boundaries at millisecond precision.
///
/// A zero-length source yields no fragments.
pub fn plan_fragments(total: Duration, fragment_length: Duration) -> Result<Vec<FragmentSpan>> {
    let step_ms = fragment_length.as_millis() as u64;
    if step_ms == 0 {
        return Err(MediaError::InvalidFragmentDuration);
    }

    let total_ms = total.as_millis() as u64;
    let count = total_ms.div_ceil(step_ms);

    let spans = (0..count)
        .map(|index| {
            let start_ms = index * step_ms;
            let length_ms = step_ms.min(total_ms - start_ms);
            FragmentSpan {
                index: index as usize,
                start: Duration::from_millis(start_ms),
                length: Duration::from_millis(length_ms),
            }
        })
        .collect();

    Ok(spans)
}

pub struct Fragmenter {
    toolkit: Arc<dyn MediaToolkit>,
    fragment_length: Duration,
}

impl Fragmenter {
    pub fn new(toolkit: Arc<dyn MediaToolkit>, fragment_length: Duration) -> Result<Self> {
        if fragment_length.as_millis() == 0 {
            return Err(MediaError::InvalidFragmentDuration);
        }
        Ok(Self {
            toolkit,
            fragment_length,
        })
    }

    pub fn fragment_length(&self) -> Duration {
        self.fragment_length
    }

    /// Split `audio` into fragments written under `out_dir`, in ascending index order.
    ///
    /// If any fragment fails to be written, the fragments written so far are
    /// removed before the error is returned.
    #[instrument(skip_all, fields(audio = %audio.path().display()))]
    pub async fn split(
        &self,
        audio: &MediaAsset,
        out_dir: &Path,
        ledger: &CleanupLedger,
    ) -> Result<Vec<Fragment>> {
        let spans = plan_fragments(audio.duration, self.fragment_length)?;
        debug!(
            target: "media",
            fragments = spans.len(),
            fragment_ms = self.fragment_length.as_millis() as u64,
            "planned fragments"
        );

        let mut fragments = Vec::with_capacity(spans.len());
        for span in spans {
            let file = ScopedFile::new(
                out_dir.join(format!("fragment_{:05}.mp3", span.index)),
                ledger.clone(),
            );
            self.toolkit
                .cut_segment(audio.path(), file.path(), span.start, span.length)
                .await?;
            fragments.push(Fragment { span, file });
        }

        info!(target: "media", fragments = fragments.len(), "audio split into fragments");
        Ok(fragments)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn secs(value: u64) -> Duration {
        Duration::from_secs(value)
    }

    #[test]
    fn thirty_seconds_in_twelve_second_fragments() {
        let spans = plan_fragments(secs(30), secs(12)).unwrap();
        let starts: Vec<_> = spans.iter().map(|s| s.start).collect();
        let lengths: Vec<_> = spans.iter().map(|s| s.length).collect();
        assert_eq!(starts, vec![secs(0), secs(12), secs(24)]);
        assert_eq!(lengths, vec![secs(12), secs(12), secs(6)]);
    }

    #[test]
    fn exact_multiple_has_full_last_fragment() {
        let spans = plan_fragments(secs(36), secs(12)).unwrap();
        assert_eq!(spans.len(), 3);
        assert_eq!(spans[2].length, secs(12));
        assert_eq!(spans[2].end(), secs(36));
    }

    #[test]
    fn short_audio_yields_single_fragment() {
        let spans = plan_fragments(Duration::from_millis(4_500), secs(12)).unwrap();
        assert_eq!(spans.len(), 1);
        assert_eq!(spans[0].start, Duration::ZERO);
        assert_eq!(spans[0].length, Duration::from_millis(4_500));
    }

    #[test]
    fn empty_audio_yields_no_fragments() {
        assert!(plan_fragments(Duration::ZERO, secs(12)).unwrap().is_empty());
    }

    #[test]
    fn zero_fragment_length_is_rejected() {
        assert!(matches!(
            plan_fragments(secs(30), Duration::ZERO),
            Err(MediaError::InvalidFragmentDuration)
        ));
    }

    #[test]
    fn fragments_are_contiguous_and_cover_the_source() {
        for total_ms in [1u64, 11_999, 12_000, 12_001, 59_999, 185_250, 3_600_000] {
            for step_ms in [1_000u64, 7_500, 12_000] {
                let total = Duration::from_millis(total_ms);
                let step = Duration::from_millis(step_ms);
                let spans = plan_fragments(total, step).unwrap();

                assert_eq!(spans.len() as u64, total_ms.div_ceil(step_ms));
                for (k, span) in spans.iter().enumerate() {
                    assert_eq!(span.index, k);
                    assert_eq!(span.start, step * k as u32);
                    if k + 1 < spans.len() {
                        assert_eq!(span.length, step);
                        assert_eq!(span.end(), spans[k + 1].start);
                    }
                }

                let last = spans.last().unwrap();
                let remainder = total_ms % step_ms;
                let expected_last = if remainder == 0 { step_ms } else { remainder };
                assert_eq!(last.length, Duration::from_millis(expected_last));

                let sum: Duration = spans.iter().map(|s| s.length).sum();
                assert_eq!(sum, total);
            }
        }
    }
}
