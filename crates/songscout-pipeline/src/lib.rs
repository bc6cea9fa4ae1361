// SPDX-License-Identifier: GPL-3.0-or-later

//! Video-to-song-list pipeline.
//!
//! A run moves a video through extraction, fragmentation and per-fragment
//! recognition, then aggregates the matches into a [`SongReport`] ordered by
//! timestamp. Every temporary file a run creates is removed on every exit
//! path. Progress is published to a [`ProgressReporter`]; the pipeline never
//! renders anything itself.

pub mod error;
pub mod events;
pub mod orchestrator;
pub mod report;
pub mod state;
pub mod upload;

pub use error::PipelineError;
pub use events::{
    ChannelReporter, InMemoryReporter, PipelineEvent, ProgressEvent, ProgressReporter,
    TracingReporter,
};
pub use orchestrator::{Pipeline, PipelineSettings, VideoInput};
pub use report::{format_timestamp, DetectedSong, RunOutcome, RunStatus, SongReport};
pub use state::{RunStage, RunState};
pub use upload::{validate_upload_name, validate_upload_size, UploadError};

pub use tokio_util::sync::CancellationToken;
