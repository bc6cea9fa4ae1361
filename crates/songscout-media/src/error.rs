// SPDX-License-Identifier: GPL-3.0-or-later

use std::path::PathBuf;

use thiserror::Error;

pub type Result<T> = std::result::Result<T, MediaError>;

#[derive(Debug, Error)]
pub enum MediaError {
    #[error("Failed to launch {tool}: {source}")]
    ToolUnavailable {
        tool: String,
        #[source]
        source: std::io::Error,
    },

    #[error("{tool} exited with code {exit_code}: {message}")]
    CommandFailed {
        tool: String,
        exit_code: i32,
        message: String,
    },

    #[error("Media file not found: {0}")]
    FileNotFound(PathBuf),

    #[error("Failed to decode media: {0}")]
    Decode(String),

    #[error("Invalid media duration: {0}")]
    InvalidDuration(String),

    #[error("Fragment duration must be greater than zero")]
    InvalidFragmentDuration,

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
