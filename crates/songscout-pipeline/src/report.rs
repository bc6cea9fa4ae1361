// SPDX-License-Identifier: GPL-3.0-or-later
use std::fmt;
use std::time::Duration;

use serde::Serialize;
use songscout_media::CleanupFailure;
use songscout_recognition::SongMatch;
use uuid::Uuid;

use crate::PipelineError;

/// Format an offset as `H:MM:SS`, e.g. `0:00:12` or `1:02:03`.
pub fn format_timestamp(offset: Duration) -> String {
    let total = offset.as_secs();
    format!("{}:{:02}:{:02}", total / 3600, (total / 60) % 60, total % 60)
}

/// A song recognized in one fragment.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct DetectedSong {
    pub fragment_index: usize,
    pub title: String,
    pub subtitle: String,
    pub url: Option<String>,
    /// Start of the fragment the song was heard in, formatted `H:MM:SS`.
    pub timestamp: String,
    pub offset_secs: u64,
    #[serde(skip)]
    pub offset: Duration,
}

impl DetectedSong {
    pub fn new(fragment_index: usize, offset: Duration, song: SongMatch) -> Self {
        Self {
            fragment_index,
            title: song.title,
            subtitle: song.subtitle,
            url: song.url,
            timestamp: format_timestamp(offset),
            offset_secs: offset.as_secs(),
            offset,
        }
    }
}

/// Songs detected in one run, in ascending timestamp order.
#[derive(Debug, Clone, Default, Serialize, PartialEq, Eq)]
#[serde(transparent)]
pub struct SongReport {
    songs: Vec<DetectedSong>,
}

impl SongReport {
    /// Build a report from matches collected in any order.
    pub fn new(mut songs: Vec<DetectedSong>) -> Self {
        songs.sort_by_key(|song| song.fragment_index);
        Self { songs }
    }

    pub fn songs(&self) -> &[DetectedSong] {
        &self.songs
    }

    pub fn len(&self) -> usize {
        self.songs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.songs.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &DetectedSong> {
        self.songs.iter()
    }
}

/// Run-level status shown next to the report.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunStatus {
    SuccessWithMatches(usize),
    SuccessNoMatches,
    Cancelled,
    Failed(&'static str),
}

impl RunStatus {
    pub fn from_report(report: &SongReport) -> Self {
        match report.len() {
            0 => RunStatus::SuccessNoMatches,
            n => RunStatus::SuccessWithMatches(n),
        }
    }

    pub fn failed(error: &PipelineError) -> Self {
        RunStatus::Failed(error.kind())
    }
}

impl fmt::Display for RunStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RunStatus::SuccessWithMatches(n) => write!(f, "success-with-{}-matches", n),
            RunStatus::SuccessNoMatches => f.write_str("success-no-matches"),
            RunStatus::Cancelled => f.write_str("cancelled"),
            RunStatus::Failed(kind) => write!(f, "failed:{}", kind),
        }
    }
}

impl Serialize for RunStatus {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

/// Result of a run that did not fail.
#[derive(Debug, Clone)]
pub struct RunOutcome {
    pub run_id: Uuid,
    pub status: RunStatus,
    pub report: SongReport,
    pub fragments_total: usize,
    /// Fragments whose recognition call failed and were treated as unmatched.
    pub fragments_failed: usize,
    pub cleanup_failures: Vec<CleanupFailure>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn song(index: usize, offset_secs: u64, title: &str) -> DetectedSong {
        DetectedSong::new(
            index,
            Duration::from_secs(offset_secs),
            SongMatch {
                title: title.to_string(),
                subtitle: "Artist".to_string(),
                url: None,
            },
        )
    }

    #[test]
    fn timestamps_match_hours_minutes_seconds() {
        assert_eq!(format_timestamp(Duration::ZERO), "0:00:00");
        assert_eq!(format_timestamp(Duration::from_secs(12)), "0:00:12");
        assert_eq!(format_timestamp(Duration::from_secs(3_723)), "1:02:03");
        assert_eq!(format_timestamp(Duration::from_millis(59_999)), "0:00:59");
        assert_eq!(format_timestamp(Duration::from_secs(90_000)), "25:00:00");
    }

    #[test]
    fn report_orders_by_fragment_index() {
        let report = SongReport::new(vec![
            song(4, 48, "Late"),
            song(0, 0, "First"),
            song(2, 24, "Middle"),
        ]);
        let titles: Vec<_> = report.iter().map(|s| s.title.as_str()).collect();
        assert_eq!(titles, vec!["First", "Middle", "Late"]);
    }

    #[test]
    fn status_strings() {
        let report = SongReport::new(vec![song(0, 0, "Song A")]);
        assert_eq!(
            RunStatus::from_report(&report).to_string(),
            "success-with-1-matches"
        );
        assert_eq!(
            RunStatus::from_report(&SongReport::default()).to_string(),
            "success-no-matches"
        );
        assert_eq!(
            RunStatus::Failed("MediaDecodeError").to_string(),
            "failed:MediaDecodeError"
        );
    }

    #[test]
    fn detected_song_serializes_timestamp() {
        let value = serde_json::to_value(song(1, 12, "Song B")).unwrap();
        assert_eq!(value["timestamp"], "0:00:12");
        assert_eq!(value["offset_secs"], 12);
        assert!(value.get("offset").is_none());
    }
}
