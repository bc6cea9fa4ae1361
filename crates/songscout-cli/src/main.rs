// SPDX-License-Identifier: GPL-3.0-or-later
use std::fmt::Write as _;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use axum::serve;
use clap::{Parser, Subcommand};
use serde::Serialize;
use songscout_api::{router, AppState};
use songscout_config::{load as load_config, AppConfig};
use songscout_pipeline::{
    validate_upload_name, CancellationToken, ChannelReporter, Pipeline, PipelineEvent,
    ProgressEvent, RunOutcome, RunStatus, SongReport, VideoInput,
};
use tokio::net::TcpListener;
use tokio::sync::mpsc::UnboundedReceiver;
use tracing::{info, warn};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};
use uuid::Uuid;

/// Find out which songs play in a video.
#[derive(Debug, Parser)]
#[command(name = "songscout", version)]
struct Cli {
    /// Path to a TOML configuration file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Detect the songs in a local video file
    Scan {
        /// Video file (mp4, mov, avi, mkv)
        video: PathBuf,

        /// Print the report as JSON
        #[arg(long)]
        json: bool,
    },
    /// Run the HTTP API
    Serve,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = load_config(cli.config.as_deref())?;
    init_tracing(&config.telemetry.log_level);

    match cli.command {
        Command::Scan { video, json } => scan(&config, video, json).await,
        Command::Serve => run_server(config).await,
    }
}

fn init_tracing(default_level: &str) {
    // Logs go to stderr so `scan --json` output stays parseable.
    let fmt_layer = fmt::layer()
        .with_target(true)
        .with_level(true)
        .with_writer(std::io::stderr);
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt_layer)
        .init();
}

async fn scan(config: &AppConfig, video: PathBuf, json: bool) -> Result<()> {
    if !video.is_file() {
        bail!("video file not found: {}", video.display());
    }
    let name = video
        .file_name()
        .and_then(|name| name.to_str())
        .unwrap_or_default();
    validate_upload_name(name, &config.upload.allowed_extensions)?;

    let (sender, receiver) = tokio::sync::mpsc::unbounded_channel();
    let pipeline = Pipeline::from_config(config)
        .context("failed to build pipeline")?
        .with_reporter(Arc::new(ChannelReporter::new(sender)));
    let printer = tokio::spawn(print_progress(receiver));

    let cancel = CancellationToken::new();
    let interrupt = tokio::spawn(cancel_on_ctrl_c(cancel.clone()));

    let result = pipeline.run(VideoInput::Local(video), &cancel).await;
    interrupt.abort();
    // Dropping the pipeline closes the progress channel.
    drop(pipeline);
    let _ = printer.await;

    let outcome = result?;
    for failure in &outcome.cleanup_failures {
        warn!(
            target: "cli",
            path = %failure.path.display(),
            error = %failure.message,
            "could not remove temporary file"
        );
    }

    if json {
        println!("{}", serde_json::to_string_pretty(&ScanSummary::from(&outcome))?);
    } else {
        print!("{}", render_table(&outcome));
    }
    Ok(())
}

async fn cancel_on_ctrl_c(cancel: CancellationToken) {
    if tokio::signal::ctrl_c().await.is_ok() {
        info!(target: "cli", "interrupt received, cancelling run");
        cancel.cancel();
    }
}

async fn print_progress(mut receiver: UnboundedReceiver<ProgressEvent>) {
    while let Some(event) = receiver.recv().await {
        if let Some(line) = describe(&event.event) {
            eprintln!("{}", line);
        }
    }
}

fn describe(event: &PipelineEvent) -> Option<String> {
    match event {
        PipelineEvent::StageStarted { stage } => Some(format!("==> {}", stage)),
        PipelineEvent::FragmentProcessed {
            completed, total, ..
        } => Some(format!("    [{}/{}] fragments processed", completed, total)),
        PipelineEvent::MatchFound { song } => Some(format!(
            "    {} found {} - {}",
            song.timestamp, song.subtitle, song.title
        )),
        PipelineEvent::FragmentFailed { index, error } => {
            Some(format!("    fragment {} failed: {}", index, error))
        }
        PipelineEvent::RunFinished { .. } => None,
    }
}

#[derive(Debug, Serialize)]
struct ScanSummary<'a> {
    run_id: Uuid,
    status: &'a RunStatus,
    fragments_total: usize,
    fragments_failed: usize,
    songs: &'a SongReport,
}

impl<'a> From<&'a RunOutcome> for ScanSummary<'a> {
    fn from(outcome: &'a RunOutcome) -> Self {
        Self {
            run_id: outcome.run_id,
            status: &outcome.status,
            fragments_total: outcome.fragments_total,
            fragments_failed: outcome.fragments_failed,
            songs: &outcome.report,
        }
    }
}

fn render_table(outcome: &RunOutcome) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "Status: {}", outcome.status);
    if outcome.fragments_failed > 0 {
        let _ = writeln!(
            out,
            "Unrecognized: {} of {} fragments failed",
            outcome.fragments_failed, outcome.fragments_total
        );
    }

    if outcome.report.is_empty() {
        let _ = writeln!(out, "No songs detected.");
        return out;
    }

    let title_width = outcome
        .report
        .iter()
        .map(|song| song.title.chars().count())
        .max()
        .unwrap_or(0)
        .max("TITLE".len());

    let _ = writeln!(out, "{:<9} {:<title_width$} ARTIST", "TIME", "TITLE");
    for song in outcome.report.iter() {
        let _ = writeln!(
            out,
            "{:<9} {:<title_width$} {}",
            song.timestamp, song.title, song.subtitle
        );
    }
    out
}

async fn run_server(config: AppConfig) -> Result<()> {
    let state = AppState::from_config(config.clone()).context("failed to build pipeline")?;
    state.on_start();

    let listener = TcpListener::bind(bind_addr(&config.http)?).await?;
    let addr = listener.local_addr()?;
    info!(target: "cli", "listening on {}", addr);

    serve(listener, router(state))
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

fn bind_addr(http: &songscout_config::HttpConfig) -> Result<SocketAddr> {
    let addr = format!("{}:{}", http.host, http.port);
    addr.parse()
        .with_context(|| format!("invalid listen address: {}", addr))
}

async fn shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};

        match (signal(SignalKind::interrupt()), signal(SignalKind::terminate())) {
            (Ok(mut interrupt), Ok(mut terminate)) => {
                tokio::select! {
                    _ = interrupt.recv() => {},
                    _ = terminate.recv() => {},
                }
            }
            _ => {
                warn!(target: "cli", "could not install signal handlers, falling back to ctrl-c");
                let _ = tokio::signal::ctrl_c().await;
            }
        }
    }

    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
    }

    info!(target: "cli", "shutdown signal received");
}
