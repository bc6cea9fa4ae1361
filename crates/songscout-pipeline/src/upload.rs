// SPDX-License-Identifier: GPL-3.0-or-later
use std::path::Path;

use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum UploadError {
    #[error("File name has no extension: {0}")]
    MissingExtension(String),

    #[error("Unsupported video format '{extension}' (supported: {allowed})")]
    UnsupportedExtension { extension: String, allowed: String },

    #[error("Upload is empty")]
    Empty,

    #[error("Upload of {size} bytes exceeds the limit of {limit} bytes")]
    TooLarge { size: u64, limit: u64 },
}

/// Check an uploaded file name against the allowed video extensions.
///
/// Matching is case-insensitive. Returns the normalized (lowercase) extension.
pub fn validate_upload_name(name: &str, allowed: &[String]) -> Result<String, UploadError> {
    let extension = Path::new(name)
        .extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| ext.to_ascii_lowercase())
        .ok_or_else(|| UploadError::MissingExtension(name.to_string()))?;

    if allowed
        .iter()
        .any(|candidate| candidate.eq_ignore_ascii_case(&extension))
    {
        Ok(extension)
    } else {
        Err(UploadError::UnsupportedExtension {
            extension,
            allowed: allowed.join(", "),
        })
    }
}

pub fn validate_upload_size(size: u64, limit: u64) -> Result<(), UploadError> {
    if size == 0 {
        return Err(UploadError::Empty);
    }
    if size > limit {
        return Err(UploadError::TooLarge { size, limit });
    }
    Ok(())
}
