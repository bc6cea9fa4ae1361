// SPDX-License-Identifier: GPL-3.0-or-later
use std::path::PathBuf;
use std::sync::Arc;

use axum::{
    body::Bytes,
    extract::{rejection::BytesRejection, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use songscout_config::AppConfig;
use songscout_media::{CleanupLedger, ScopedFile};
use songscout_pipeline::{
    validate_upload_name, validate_upload_size, CancellationToken, DetectedSong, Pipeline,
    PipelineError, RunOutcome, UploadError, VideoInput,
};
use tracing::{error, info};
use utoipa::{IntoParams, ToSchema};
use uuid::Uuid;

use crate::AppState;

#[derive(Debug, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct ScanQuery {
    /// Original file name of the video; its extension selects the container format.
    pub filename: String,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct SongResponse {
    pub title: String,
    pub subtitle: String,
    pub url: Option<String>,
    /// Offset into the video, formatted `H:MM:SS`.
    pub timestamp: String,
    pub offset_secs: u64,
}

impl From<&DetectedSong> for SongResponse {
    fn from(song: &DetectedSong) -> Self {
        Self {
            title: song.title.clone(),
            subtitle: song.subtitle.clone(),
            url: song.url.clone(),
            timestamp: song.timestamp.clone(),
            offset_secs: song.offset_secs,
        }
    }
}

#[derive(Debug, Serialize, ToSchema)]
pub struct ScanResponse {
    pub run_id: String,
    pub status: String,
    pub fragments_total: usize,
    pub fragments_failed: usize,
    pub songs: Vec<SongResponse>,
}

impl From<RunOutcome> for ScanResponse {
    fn from(outcome: RunOutcome) -> Self {
        Self {
            run_id: outcome.run_id.to_string(),
            status: outcome.status.to_string(),
            fragments_total: outcome.fragments_total,
            fragments_failed: outcome.fragments_failed,
            songs: outcome.report.iter().map(SongResponse::from).collect(),
        }
    }
}

#[derive(Debug, Serialize, ToSchema)]
pub struct ErrorResponse {
    pub error: String,
    /// Error kind, e.g. `MediaDecodeError`.
    pub kind: String,
}

/// A rejected or failed scan rendered as a JSON error.
#[derive(Debug)]
pub struct ScanError {
    status: StatusCode,
    body: ErrorResponse,
}

impl From<PipelineError> for ScanError {
    fn from(err: PipelineError) -> Self {
        let status = match &err {
            PipelineError::Upload(UploadError::TooLarge { .. }) => StatusCode::PAYLOAD_TOO_LARGE,
            PipelineError::Upload(_) => StatusCode::BAD_REQUEST,
            PipelineError::Media { .. } => StatusCode::UNPROCESSABLE_ENTITY,
            PipelineError::Recognition { .. } => StatusCode::BAD_GATEWAY,
            PipelineError::Workspace(_) | PipelineError::InvalidSettings(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        };
        Self {
            status,
            body: ErrorResponse {
                error: err.to_string(),
                kind: err.kind().to_string(),
            },
        }
    }
}

impl ScanError {
    /// Map a body that could not be buffered. Oversized bodies are cut off by
    /// the body limit layer before the handler sees them.
    fn rejected_body(rejection: BytesRejection, limit: u64) -> Self {
        let status = rejection.status();
        let (error, kind) = if status == StatusCode::PAYLOAD_TOO_LARGE {
            (
                format!("Upload exceeds the limit of {} bytes", limit),
                "UploadRejected",
            )
        } else {
            (rejection.body_text(), "InvalidRequest")
        };
        Self {
            status,
            body: ErrorResponse {
                error,
                kind: kind.to_string(),
            },
        }
    }

    fn internal(error: String) -> Self {
        Self {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            body: ErrorResponse {
                error,
                kind: "InternalError".to_string(),
            },
        }
    }
}

impl From<UploadError> for ScanError {
    fn from(err: UploadError) -> Self {
        PipelineError::from(err).into()
    }
}

impl IntoResponse for ScanError {
    fn into_response(self) -> Response {
        (self.status, Json(self.body)).into_response()
    }
}

/// Detect the songs in an uploaded video.
#[utoipa::path(
    post,
    path = "/api/v1/scans",
    params(ScanQuery),
    request_body(content = Vec<u8>, description = "Raw video file", content_type = "application/octet-stream"),
    responses(
        (status = 200, description = "Scan completed", body = ScanResponse),
        (status = 400, description = "Unsupported format or empty upload", body = ErrorResponse),
        (status = 413, description = "Upload exceeds the size limit", body = ErrorResponse),
        (status = 422, description = "Audio could not be decoded", body = ErrorResponse),
        (status = 502, description = "Recognition service failed", body = ErrorResponse),
        (status = 500, description = "Internal error", body = ErrorResponse)
    ),
    tag = "scans"
)]
pub async fn create_scan(
    State(state): State<AppState>,
    Query(query): Query<ScanQuery>,
    body: Result<Bytes, BytesRejection>,
) -> Result<Json<ScanResponse>, ScanError> {
    let upload = &state.config.upload;
    let body =
        body.map_err(|rejection| ScanError::rejected_body(rejection, upload.max_size_bytes))?;
    let extension = validate_upload_name(&query.filename, &upload.allowed_extensions)?;
    validate_upload_size(body.len() as u64, upload.max_size_bytes)?;

    info!(
        target: "api",
        filename = %query.filename,
        bytes = body.len(),
        "scan requested"
    );

    // The upload is stored and scanned on its own task, so a dropped request
    // cannot strand a half-written file. Dropping the request cancels the run.
    let cancel = CancellationToken::new();
    let _cancel_on_drop = cancel.clone().drop_guard();
    let path = upload_path(&state.config, &extension);
    let scan = tokio::spawn(store_and_scan(state.pipeline.clone(), path, body, cancel));

    match scan.await {
        Ok(Ok(outcome)) => Ok(Json(outcome.into())),
        Ok(Err(err)) => Err(err.into()),
        Err(e) => {
            error!(target: "api", error = %e, "scan task failed");
            Err(ScanError::internal(e.to_string()))
        }
    }
}

/// Write the upload under a scoped guard and hand it to the pipeline.
async fn store_and_scan(
    pipeline: Arc<Pipeline>,
    path: PathBuf,
    body: Bytes,
    cancel: CancellationToken,
) -> Result<RunOutcome, PipelineError> {
    let upload = ScopedFile::new(path.clone(), CleanupLedger::new());

    if let Err(e) = tokio::fs::write(&path, &body).await {
        error!(target: "api", path = %path.display(), error = %e, "failed to store upload");
        // A failed removal is logged by the ledger.
        let _ = upload.release();
        return Err(PipelineError::Workspace(e));
    }

    // The run owns the upload from here on; the guard only covers a run that
    // never starts.
    let result = pipeline.run(VideoInput::Upload(path), &cancel).await;
    drop(upload);
    result
}

fn upload_path(config: &AppConfig, extension: &str) -> PathBuf {
    let dir = config
        .media
        .temp_dir
        .clone()
        .unwrap_or_else(std::env::temp_dir);
    dir.join(format!("songscout-upload-{}.{}", Uuid::new_v4(), extension))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pipeline_errors_map_to_status_codes() {
        let cases = [
            (
                PipelineError::Upload(UploadError::Empty),
                StatusCode::BAD_REQUEST,
            ),
            (
                PipelineError::Upload(UploadError::TooLarge { size: 10, limit: 5 }),
                StatusCode::PAYLOAD_TOO_LARGE,
            ),
            (
                PipelineError::Workspace(std::io::Error::other("disk full")),
                StatusCode::INTERNAL_SERVER_ERROR,
            ),
            (
                PipelineError::InvalidSettings("bad".to_string()),
                StatusCode::INTERNAL_SERVER_ERROR,
            ),
        ];

        for (err, expected) in cases {
            assert_eq!(ScanError::from(err).status, expected);
        }
    }

    #[test]
    fn error_body_carries_kind() {
        let err = ScanError::from(UploadError::UnsupportedExtension {
            extension: "txt".to_string(),
            allowed: "mp4".to_string(),
        });
        assert_eq!(err.status, StatusCode::BAD_REQUEST);
        assert_eq!(err.body.kind, "UploadRejected");
        assert!(err.body.error.contains("txt"));
    }

    #[test]
    fn upload_path_uses_configured_temp_dir() {
        let mut config = AppConfig::default();
        config.media.temp_dir = Some(PathBuf::from("/var/tmp/songscout"));
        let path = upload_path(&config, "mkv");
        assert!(path.starts_with("/var/tmp/songscout"));
        assert_eq!(path.extension().and_then(|e| e.to_str()), Some("mkv"));
        assert_ne!(path, upload_path(&config, "mkv"));
    }
}
