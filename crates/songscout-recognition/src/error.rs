// SPDX-License-Identifier: GPL-3.0-or-later

use std::time::Duration;

use thiserror::Error;

pub type Result<T> = std::result::Result<T, RecognitionError>;

#[derive(Debug, Error)]
pub enum RecognitionError {
    #[error("HTTP request failed: {0}")]
    RequestFailed(#[from] reqwest::Error),

    #[error("HTTP error: {status} - {message}")]
    HttpStatus { status: u16, message: String },

    #[error("Recognition service error {code}: {message}")]
    Service { code: i64, message: String },

    #[error("Invalid response from recognition service: {0}")]
    InvalidResponse(String),

    #[error("Recognition timed out after {0:?}")]
    Timeout(Duration),

    #[error("Failed to read audio sample: {0}")]
    SampleIo(#[from] std::io::Error),

    #[error("Invalid client configuration: {0}")]
    InvalidConfig(String),
}
