// SPDX-License-Identifier: GPL-3.0-or-later

//! Pipeline orchestration.
//!
//! A run owns everything it creates: a private working directory, the
//! extracted audio, every fragment and, for uploads, the uploaded video.
//! Each of these is held by a scoped guard, so early returns, cancellation and
//! dropped futures all release them. Recognition runs on a bounded pool of
//! tasks; each finished fragment is released immediately and its match, if
//! any, is pushed into a shared collector. The report is ordered by fragment
//! index, not completion order.

use std::future::Future;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use songscout_config::{AppConfig, RecognitionErrorPolicy};
use songscout_media::{
    AudioExtractor, CleanupFailure, CleanupLedger, FfmpegToolkit, Fragment, FragmentSpan,
    Fragmenter, MediaToolkit, ScopedFile,
};
use songscout_recognition::{AuddClient, RecognitionError, Recognizer, SongMatch};
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, info_span, warn, Instrument};
use uuid::Uuid;

use crate::{
    DetectedSong, PipelineError, PipelineEvent, ProgressEvent, ProgressReporter, RunOutcome,
    RunStage, RunState, RunStatus, SongReport, TracingReporter,
};

/// The video a run operates on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VideoInput {
    /// A file handed over to the run. It is deleted when the run ends.
    Upload(PathBuf),
    /// A file the caller keeps. It is only read.
    Local(PathBuf),
}

impl VideoInput {
    pub fn path(&self) -> &Path {
        match self {
            VideoInput::Upload(path) | VideoInput::Local(path) => path,
        }
    }
}

#[derive(Debug, Clone)]
pub struct PipelineSettings {
    pub fragment_length: Duration,
    pub max_concurrent_requests: usize,
    /// Upper bound on a single recognition call.
    pub recognition_timeout: Duration,
    pub error_policy: RecognitionErrorPolicy,
    /// Parent of per-run working directories. System temp dir when `None`.
    pub temp_root: Option<PathBuf>,
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self {
            fragment_length: Duration::from_secs(12),
            max_concurrent_requests: 4,
            recognition_timeout: Duration::from_secs(30),
            error_policy: RecognitionErrorPolicy::Skip,
            temp_root: None,
        }
    }
}

impl PipelineSettings {
    pub fn from_config(config: &AppConfig) -> Self {
        Self {
            fragment_length: Duration::from_secs(config.media.fragment_duration_secs),
            max_concurrent_requests: config.recognition.max_concurrent_requests,
            recognition_timeout: Duration::from_secs(config.recognition.timeout_secs),
            error_policy: config.recognition.error_policy,
            temp_root: config.media.temp_dir.clone(),
        }
    }
}

pub struct Pipeline {
    extractor: AudioExtractor,
    fragmenter: Fragmenter,
    recognizer: Arc<dyn Recognizer>,
    reporter: Arc<dyn ProgressReporter>,
    settings: PipelineSettings,
}

impl Pipeline {
    pub fn new(
        toolkit: Arc<dyn MediaToolkit>,
        recognizer: Arc<dyn Recognizer>,
        settings: PipelineSettings,
    ) -> Result<Self, PipelineError> {
        if settings.max_concurrent_requests == 0 {
            return Err(PipelineError::InvalidSettings(
                "max_concurrent_requests must be greater than zero".to_string(),
            ));
        }
        if settings.recognition_timeout.is_zero() {
            return Err(PipelineError::InvalidSettings(
                "recognition_timeout must be greater than zero".to_string(),
            ));
        }

        let fragmenter = Fragmenter::new(toolkit.clone(), settings.fragment_length)
            .map_err(|e| PipelineError::InvalidSettings(e.to_string()))?;

        Ok(Self {
            extractor: AudioExtractor::new(toolkit),
            fragmenter,
            recognizer,
            reporter: Arc::new(TracingReporter),
            settings,
        })
    }

    /// Build a pipeline backed by ffmpeg and the configured recognition service.
    pub fn from_config(config: &AppConfig) -> Result<Self, PipelineError> {
        let toolkit = FfmpegToolkit::new(&config.media.ffmpeg_path, &config.media.ffprobe_path);

        let mut builder = AuddClient::builder()
            .base_url(&config.recognition.base_url)
            .timeout(Duration::from_secs(config.recognition.timeout_secs))
            .min_interval(Duration::from_millis(
                config.recognition.min_request_interval_ms,
            ));
        if let Some(token) = &config.recognition.api_token {
            builder = builder.api_token(token);
        }
        let client = builder
            .build()
            .map_err(|e| PipelineError::InvalidSettings(e.to_string()))?;

        Self::new(
            Arc::new(toolkit),
            Arc::new(client),
            PipelineSettings::from_config(config),
        )
    }

    pub fn with_reporter(mut self, reporter: Arc<dyn ProgressReporter>) -> Self {
        self.reporter = reporter;
        self
    }

    pub fn settings(&self) -> &PipelineSettings {
        &self.settings
    }

    /// Run the whole pipeline on one video.
    ///
    /// Cancellation is a clean termination: the outcome has status
    /// [`RunStatus::Cancelled`] and holds the matches found before the signal.
    /// Every temporary asset the run created is removed before this returns,
    /// whatever the result.
    pub async fn run(
        &self,
        input: VideoInput,
        cancel: &CancellationToken,
    ) -> Result<RunOutcome, PipelineError> {
        let run_id = Uuid::new_v4();
        let span = info_span!(target: "pipeline", "run", %run_id);
        self.run_inner(run_id, input, cancel).instrument(span).await
    }

    async fn run_inner(
        &self,
        run_id: Uuid,
        input: VideoInput,
        cancel: &CancellationToken,
    ) -> Result<RunOutcome, PipelineError> {
        let ledger = CleanupLedger::new();
        let mut run = RunContext::new(run_id, self.reporter.clone());

        let (video_path, upload) = match input {
            VideoInput::Upload(path) => {
                let guard = ScopedFile::new(path.clone(), ledger.clone());
                (path, Some(guard))
            }
            VideoInput::Local(path) => (path, None),
        };
        info!(target: "pipeline", video = %video_path.display(), "run started");

        let result = match self.create_workspace() {
            Ok(workspace) => {
                let result = self
                    .execute(&mut run, &video_path, workspace.path(), &ledger, cancel)
                    .await;
                let workspace_path = workspace.path().to_path_buf();
                if let Err(e) = workspace.close() {
                    ledger.record(CleanupFailure {
                        path: workspace_path,
                        message: e.to_string(),
                    });
                }
                result
            }
            Err(e) => Err(PipelineError::Workspace(e)),
        };

        if let Some(upload) = upload {
            // Failures are already in the ledger.
            let _ = upload.release();
        }

        match result {
            Ok(execution) => {
                let status = if execution.cancelled {
                    run.enter(RunStage::Cancelled);
                    RunStatus::Cancelled
                } else {
                    run.enter(RunStage::Done);
                    RunStatus::from_report(&execution.report)
                };
                run.emit(PipelineEvent::RunFinished {
                    status: status.to_string(),
                });

                let cleanup_failures = ledger.drain();
                info!(
                    target: "pipeline",
                    %status,
                    fragments = execution.fragments_total,
                    failed_fragments = execution.fragments_failed,
                    cleanup_failures = cleanup_failures.len(),
                    "run completed"
                );

                Ok(RunOutcome {
                    run_id,
                    status,
                    report: execution.report,
                    fragments_total: execution.fragments_total,
                    fragments_failed: execution.fragments_failed,
                    cleanup_failures,
                })
            }
            Err(err) => {
                run.enter(RunStage::Failed);
                let status = RunStatus::failed(&err);
                run.emit(PipelineEvent::RunFinished {
                    status: status.to_string(),
                });
                error!(
                    target: "pipeline",
                    stage = err.stage().map(|s| s.as_str()).unwrap_or("setup"),
                    kind = err.kind(),
                    error = %err,
                    "run failed"
                );
                Err(err)
            }
        }
    }

    fn create_workspace(&self) -> std::io::Result<tempfile::TempDir> {
        let mut builder = tempfile::Builder::new();
        builder.prefix("songscout-");
        match &self.settings.temp_root {
            Some(root) => builder.tempdir_in(root),
            None => builder.tempdir(),
        }
    }

    async fn execute(
        &self,
        run: &mut RunContext,
        video: &Path,
        workspace: &Path,
        ledger: &CleanupLedger,
        cancel: &CancellationToken,
    ) -> Result<Execution, PipelineError> {
        if cancel.is_cancelled() {
            return Ok(Execution::cancelled(Vec::new(), 0, 0));
        }

        run.enter(RunStage::Extracting);
        let audio = match until_cancelled(cancel, self.extractor.extract(video, workspace, ledger))
            .await
        {
            Some(result) => result.map_err(|source| PipelineError::Media {
                stage: RunStage::Extracting,
                source,
            })?,
            None => return Ok(Execution::cancelled(Vec::new(), 0, 0)),
        };

        run.enter(RunStage::Fragmenting);
        let fragments =
            match until_cancelled(cancel, self.fragmenter.split(&audio, workspace, ledger)).await {
                Some(result) => result.map_err(|source| PipelineError::Media {
                    stage: RunStage::Fragmenting,
                    source,
                })?,
                None => return Ok(Execution::cancelled(Vec::new(), 0, 0)),
            };
        let fragments_total = fragments.len();

        run.enter(RunStage::Recognizing);
        let recognition = self.recognize_all(run, fragments, cancel).await;
        let _ = audio.release();

        if let Some((fragment, source)) = recognition.fatal {
            return Err(PipelineError::Recognition { fragment, source });
        }
        if recognition.cancelled {
            return Ok(Execution::cancelled(
                recognition.songs,
                fragments_total,
                recognition.failed,
            ));
        }

        run.enter(RunStage::Aggregating);
        let report = SongReport::new(recognition.songs);
        debug!(target: "pipeline", matches = report.len(), "aggregated report");

        Ok(Execution {
            report,
            fragments_total,
            fragments_failed: recognition.failed,
            cancelled: false,
        })
    }

    async fn recognize_all(
        &self,
        run: &RunContext,
        fragments: Vec<Fragment>,
        cancel: &CancellationToken,
    ) -> Recognition {
        let stop = cancel.child_token();
        let collector = Arc::new(Collector::new(
            run.run_id,
            fragments.len(),
            self.settings.error_policy,
            run.reporter.clone(),
            stop.clone(),
        ));
        let semaphore = Arc::new(Semaphore::new(self.settings.max_concurrent_requests));
        let limit = self.settings.recognition_timeout;
        let mut tasks = JoinSet::new();

        // Remaining fragments are dropped, and so deleted, when the loop exits early.
        for fragment in fragments {
            let permit = tokio::select! {
                biased;
                _ = stop.cancelled() => break,
                permit = semaphore.clone().acquire_owned() => match permit {
                    Ok(permit) => permit,
                    Err(_) => break,
                },
            };

            let recognizer = self.recognizer.clone();
            let collector = collector.clone();
            tasks.spawn(
                async move {
                    let _permit = permit;
                    let outcome = recognize_with_timeout(recognizer.as_ref(), &fragment, limit).await;
                    let span = fragment.span;
                    let _ = fragment.file.release();
                    collector.record(span, outcome);
                }
                .in_current_span(),
            );
        }

        // A user cancel abandons whatever is still in flight, even once every
        // fragment has been dispatched.
        let mut abandoned = false;
        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled(), if !abandoned => {
                    debug!(target: "pipeline", in_flight = tasks.len(), "abandoning in-flight recognition");
                    tasks.abort_all();
                    abandoned = true;
                }
                joined = tasks.join_next() => match joined {
                    Some(Err(e)) if e.is_panic() => {
                        error!(target: "pipeline", error = %e, "recognition task panicked");
                        collector.failed.fetch_add(1, Ordering::Relaxed);
                    }
                    Some(_) => {}
                    None => break,
                },
            }
        }

        Recognition {
            songs: collector.take_songs(),
            failed: collector.failed.load(Ordering::Relaxed),
            fatal: collector.take_fatal(),
            cancelled: cancel.is_cancelled(),
        }
    }
}

async fn recognize_with_timeout(
    recognizer: &dyn Recognizer,
    fragment: &Fragment,
    limit: Duration,
) -> Result<Option<SongMatch>, RecognitionError> {
    match tokio::time::timeout(limit, recognizer.recognize(fragment.path())).await {
        Ok(result) => result,
        Err(_) => Err(RecognitionError::Timeout(limit)),
    }
}

/// Resolve `future`, or `None` if `cancel` fires first. The future is dropped on cancellation.
async fn until_cancelled<F: Future>(cancel: &CancellationToken, future: F) -> Option<F::Output> {
    tokio::select! {
        biased;
        _ = cancel.cancelled() => None,
        output = future => Some(output),
    }
}

struct Execution {
    report: SongReport,
    fragments_total: usize,
    fragments_failed: usize,
    cancelled: bool,
}

impl Execution {
    fn cancelled(songs: Vec<DetectedSong>, fragments_total: usize, fragments_failed: usize) -> Self {
        Self {
            report: SongReport::new(songs),
            fragments_total,
            fragments_failed,
            cancelled: true,
        }
    }
}

struct Recognition {
    songs: Vec<DetectedSong>,
    failed: usize,
    fatal: Option<(usize, RecognitionError)>,
    cancelled: bool,
}

/// Per-run stage tracking and event emission.
struct RunContext {
    run_id: Uuid,
    state: RunState,
    reporter: Arc<dyn ProgressReporter>,
}

impl RunContext {
    fn new(run_id: Uuid, reporter: Arc<dyn ProgressReporter>) -> Self {
        Self {
            run_id,
            state: RunState::new(),
            reporter,
        }
    }

    fn enter(&mut self, stage: RunStage) {
        if let Err(e) = self.state.advance(stage) {
            error!(target: "pipeline", error = %e, "rejected stage transition");
            debug_assert!(false, "{}", e);
            return;
        }
        debug!(target: "pipeline", %stage, "entered stage");
        if !stage.is_terminal() {
            self.emit(PipelineEvent::StageStarted { stage });
        }
    }

    fn emit(&self, event: PipelineEvent) {
        self.reporter.report(ProgressEvent::new(self.run_id, event));
    }
}

/// Shared sink for recognition results. Appends are serialized by the mutex.
struct Collector {
    run_id: Uuid,
    total: usize,
    policy: RecognitionErrorPolicy,
    reporter: Arc<dyn ProgressReporter>,
    stop: CancellationToken,
    songs: Mutex<Vec<DetectedSong>>,
    completed: AtomicUsize,
    failed: AtomicUsize,
    fatal: Mutex<Option<(usize, RecognitionError)>>,
}

impl Collector {
    fn new(
        run_id: Uuid,
        total: usize,
        policy: RecognitionErrorPolicy,
        reporter: Arc<dyn ProgressReporter>,
        stop: CancellationToken,
    ) -> Self {
        Self {
            run_id,
            total,
            policy,
            reporter,
            stop,
            songs: Mutex::new(Vec::with_capacity(total)),
            completed: AtomicUsize::new(0),
            failed: AtomicUsize::new(0),
            fatal: Mutex::new(None),
        }
    }

    fn record(&self, span: FragmentSpan, outcome: Result<Option<SongMatch>, RecognitionError>) {
        match outcome {
            Ok(Some(song)) => {
                let song = DetectedSong::new(span.index, span.start, song);
                self.emit(PipelineEvent::MatchFound { song: song.clone() });
                self.songs
                    .lock()
                    .unwrap_or_else(|poisoned| poisoned.into_inner())
                    .push(song);
            }
            Ok(None) => {
                debug!(target: "pipeline", fragment = span.index, "no match");
            }
            Err(error) => {
                self.failed.fetch_add(1, Ordering::Relaxed);
                warn!(target: "pipeline", fragment = span.index, %error, "recognition failed");
                self.emit(PipelineEvent::FragmentFailed {
                    index: span.index,
                    error: error.to_string(),
                });

                if self.policy == RecognitionErrorPolicy::Abort {
                    let mut fatal = self
                        .fatal
                        .lock()
                        .unwrap_or_else(|poisoned| poisoned.into_inner());
                    if fatal.is_none() {
                        *fatal = Some((span.index, error));
                    }
                    self.stop.cancel();
                }
            }
        }

        let completed = self.completed.fetch_add(1, Ordering::Relaxed) + 1;
        self.emit(PipelineEvent::FragmentProcessed {
            index: span.index,
            completed,
            total: self.total,
        });
    }

    fn emit(&self, event: PipelineEvent) {
        self.reporter.report(ProgressEvent::new(self.run_id, event));
    }

    fn take_songs(&self) -> Vec<DetectedSong> {
        std::mem::take(
            &mut *self
                .songs
                .lock()
                .unwrap_or_else(|poisoned| poisoned.into_inner()),
        )
    }

    fn take_fatal(&self) -> Option<(usize, RecognitionError)> {
        self.fatal
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .take()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn until_cancelled_returns_output() {
        let cancel = CancellationToken::new();
        assert_eq!(until_cancelled(&cancel, async { 7 }).await, Some(7));
    }

    #[tokio::test]
    async fn until_cancelled_prefers_cancellation() {
        let cancel = CancellationToken::new();
        cancel.cancel();
        assert_eq!(until_cancelled(&cancel, async { 7 }).await, None);
    }

    #[test]
    fn settings_follow_config() {
        let mut config = AppConfig::default();
        config.media.fragment_duration_secs = 20;
        config.recognition.max_concurrent_requests = 2;
        config.recognition.error_policy = RecognitionErrorPolicy::Abort;

        let settings = PipelineSettings::from_config(&config);
        assert_eq!(settings.fragment_length, Duration::from_secs(20));
        assert_eq!(settings.max_concurrent_requests, 2);
        assert_eq!(settings.error_policy, RecognitionErrorPolicy::Abort);
    }

    #[test]
    fn pipeline_from_default_config_builds() {
        assert!(Pipeline::from_config(&AppConfig::default()).is_ok());
    }

    #[test]
    fn video_input_exposes_path() {
        let input = VideoInput::Upload(PathBuf::from("/tmp/upload.mp4"));
        assert_eq!(input.path(), Path::new("/tmp/upload.mp4"));
    }
}
