// SPDX-License-Identifier: GPL-3.0-or-later

use serde::{Deserialize, Serialize};

/// A song identified by the recognition service.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SongMatch {
    /// Track title.
    pub title: String,
    /// Secondary line shown under the title (the performing artist).
    pub subtitle: String,
    /// Canonical page for the track on the recognition service, if provided.
    pub url: Option<String>,
}

/// Top-level response body of an AudD-compatible recognition endpoint.
#[derive(Debug, Deserialize)]
pub(crate) struct AuddResponse {
    pub status: String,
    #[serde(default)]
    pub result: Option<AuddTrack>,
    #[serde(default)]
    pub error: Option<AuddErrorBody>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct AuddTrack {
    pub title: String,
    #[serde(default)]
    pub artist: String,
    #[serde(default)]
    pub song_link: Option<String>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct AuddErrorBody {
    pub error_code: i64,
    #[serde(default)]
    pub error_message: String,
}

impl From<AuddTrack> for SongMatch {
    fn from(track: AuddTrack) -> Self {
        Self {
            title: track.title,
            subtitle: track.artist,
            url: track.song_link.filter(|link| !link.is_empty()),
        }
    }
}
