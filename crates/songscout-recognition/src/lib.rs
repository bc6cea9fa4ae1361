// SPDX-License-Identifier: GPL-3.0-or-later

//! Song recognition client.
//!
//! This crate provides:
//! - The [`Recognizer`] seam used by the pipeline for one audio fragment at a time
//! - [`AuddClient`], an HTTP client for AudD-compatible recognition services
//! - Optional pacing of outbound requests

pub mod client;
pub mod error;
pub mod models;
pub mod pacer;

use std::path::Path;

use async_trait::async_trait;

pub use client::{AuddClient, AuddClientBuilder};
pub use error::{RecognitionError, Result};
pub use models::SongMatch;
pub use pacer::RequestPacer;

/// Identifies the song playing in a short audio sample.
#[async_trait]
pub trait Recognizer: Send + Sync + 'static {
    /// Recognize the audio file at `sample`.
    ///
    /// `Ok(None)` means the service answered but found no match; that is an
    /// expected outcome, not an error.
    async fn recognize(&self, sample: &Path) -> Result<Option<SongMatch>>;
}
