// SPDX-License-Identifier: GPL-3.0-or-later
use std::path::{Path, PathBuf};

use anyhow::{bail, Result};
use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use tracing::info;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HttpConfig {
    pub host: String,
    pub port: u16,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 5150,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TelemetryConfig {
    pub log_level: String,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MediaConfig {
    pub ffmpeg_path: String,
    pub ffprobe_path: String,
    /// Length of each recognition fragment, in seconds.
    pub fragment_duration_secs: u64,
    /// Parent directory for per-run working directories. System temp dir when unset.
    pub temp_dir: Option<PathBuf>,
}

impl Default for MediaConfig {
    fn default() -> Self {
        Self {
            ffmpeg_path: "ffmpeg".to_string(),
            ffprobe_path: "ffprobe".to_string(),
            fragment_duration_secs: 12,
            temp_dir: None,
        }
    }
}

/// What the orchestrator does when a single fragment's recognition call fails.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum RecognitionErrorPolicy {
    /// Log the failure, treat the fragment as unmatched and keep going.
    #[default]
    Skip,
    /// Stop dispatching new fragments and fail the run.
    Abort,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecognitionConfig {
    pub base_url: String,
    pub api_token: Option<String>,
    pub timeout_secs: u64,
    pub max_concurrent_requests: usize,
    pub min_request_interval_ms: u64,
    pub error_policy: RecognitionErrorPolicy,
}

impl Default for RecognitionConfig {
    fn default() -> Self {
        Self {
            base_url: "https://api.audd.io".to_string(),
            api_token: None,
            timeout_secs: 30,
            max_concurrent_requests: 4,
            min_request_interval_ms: 0,
            error_policy: RecognitionErrorPolicy::Skip,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UploadConfig {
    pub max_size_bytes: u64,
    pub allowed_extensions: Vec<String>,
}

impl Default for UploadConfig {
    fn default() -> Self {
        Self {
            max_size_bytes: 2 * 1024 * 1024 * 1024,
            allowed_extensions: ["mp4", "mov", "avi", "mkv"]
                .iter()
                .map(|ext| ext.to_string())
                .collect(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct AppConfig {
    pub http: HttpConfig,
    pub telemetry: TelemetryConfig,
    pub media: MediaConfig,
    pub recognition: RecognitionConfig,
    pub upload: UploadConfig,
}

impl AppConfig {
    /// Reject values the pipeline cannot run with.
    pub fn validate(&self) -> Result<()> {
        if self.media.fragment_duration_secs == 0 {
            bail!("media.fragment_duration_secs must be greater than zero");
        }
        if self.recognition.max_concurrent_requests == 0 {
            bail!("recognition.max_concurrent_requests must be greater than zero");
        }
        if self.recognition.timeout_secs == 0 {
            bail!("recognition.timeout_secs must be greater than zero");
        }
        if self.upload.allowed_extensions.is_empty() {
            bail!("upload.allowed_extensions must not be empty");
        }
        if self.upload.max_size_bytes == 0 {
            bail!("upload.max_size_bytes must be greater than zero");
        }
        Ok(())
    }
}

fn figment(config_path: Option<&Path>) -> Figment {
    let mut figment = Figment::from(Serialized::defaults(AppConfig::default()));

    if let Some(path) = config_path {
        figment = figment.merge(Toml::file(path));
    }

    figment.merge(Env::prefixed("SONGSCOUT_").split("__"))
}

/// Load configuration from defaults, optional TOML file, and environment overrides (prefix: SONGSCOUT_).
pub fn load(config_path: Option<&Path>) -> Result<AppConfig> {
    let config: AppConfig = figment(config_path).extract()?;
    config.validate()?;
    info!(target: "config", "configuration loaded");
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use figment::Jail;

    #[test]
    fn defaults_are_valid() {
        let config = AppConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.media.fragment_duration_secs, 12);
        assert_eq!(config.recognition.error_policy, RecognitionErrorPolicy::Skip);
        assert_eq!(config.upload.allowed_extensions.len(), 4);
    }

    #[test]
    fn zero_fragment_duration_rejected() {
        let mut config = AppConfig::default();
        config.media.fragment_duration_secs = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn zero_concurrency_rejected() {
        let mut config = AppConfig::default();
        config.recognition.max_concurrent_requests = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn toml_and_env_layers_override_defaults() {
        Jail::expect_with(|jail| {
            jail.create_file(
                "songscout.toml",
                r#"
                [media]
                fragment_duration_secs = 20

                [recognition]
                error_policy = "abort"
                "#,
            )?;
            jail.set_env("SONGSCOUT_HTTP__PORT", "9000");
            jail.set_env("SONGSCOUT_RECOGNITION__API_TOKEN", "secret");

            let config = load(Some(Path::new("songscout.toml"))).expect("config loads");
            assert_eq!(config.media.fragment_duration_secs, 20);
            assert_eq!(config.recognition.error_policy, RecognitionErrorPolicy::Abort);
            assert_eq!(config.http.port, 9000);
            assert_eq!(config.recognition.api_token.as_deref(), Some("secret"));
            assert_eq!(config.http.host, "127.0.0.1");
            Ok(())
        });
    }

    #[test]
    fn invalid_layered_values_fail_load() {
        Jail::expect_with(|jail| {
            jail.set_env("SONGSCOUT_RECOGNITION__TIMEOUT_SECS", "0");
            assert!(load(None).is_err());
            Ok(())
        });
    }
}
