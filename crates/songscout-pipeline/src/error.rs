// SPDX-License-Identifier: GPL-3.0-or-later
use songscout_media::MediaError;
use songscout_recognition::RecognitionError;
use thiserror::Error;

use crate::{RunStage, UploadError};

/// Terminal error of a pipeline run.
///
/// Recognition failures only appear here when the run is configured to abort
/// on them; otherwise they are absorbed per fragment.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("{stage} failed: {source}")]
    Media {
        stage: RunStage,
        #[source]
        source: MediaError,
    },

    #[error("recognition of fragment {fragment} failed: {source}")]
    Recognition {
        fragment: usize,
        #[source]
        source: RecognitionError,
    },

    #[error("failed to prepare working directory: {0}")]
    Workspace(#[source] std::io::Error),

    #[error(transparent)]
    Upload(#[from] UploadError),

    #[error("invalid pipeline settings: {0}")]
    InvalidSettings(String),
}

impl PipelineError {
    /// Error kind name used in run status strings.
    pub fn kind(&self) -> &'static str {
        match self {
            PipelineError::Media { .. } => "MediaDecodeError",
            PipelineError::Recognition { .. } => "RecognitionServiceError",
            PipelineError::Workspace(_) => "WorkspaceError",
            PipelineError::Upload(_) => "UploadRejected",
            PipelineError::InvalidSettings(_) => "InvalidSettings",
        }
    }

    /// Stage the run was in when the error occurred, if any.
    pub fn stage(&self) -> Option<RunStage> {
        match self {
            PipelineError::Media { stage, .. } => Some(*stage),
            PipelineError::Recognition { .. } => Some(RunStage::Recognizing),
            _ => None,
        }
    }
}
