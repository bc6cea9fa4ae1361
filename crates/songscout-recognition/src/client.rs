// SPDX-License-Identifier: GPL-3.0-or-later

use crate::error::{RecognitionError, Result};
use crate::models::{AuddResponse, SongMatch};
use crate::pacer::RequestPacer;
use crate::Recognizer;
use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use reqwest::Client;
use std::path::Path;
use std::time::Duration;
use tracing::{debug, instrument, trace};
use url::Url;

const AUDD_API_BASE: &str = "https://api.audd.io";
const USER_AGENT: &str = concat!(
    "SongScout/",
    env!("CARGO_PKG_VERSION"),
    " ( https://github.com/songscout/songscout )"
);

/// HTTP client for AudD-compatible song recognition endpoints.
#[derive(Debug, Clone)]
pub struct AuddClient {
    client: Client,
    endpoint: String,
    api_token: Option<String>,
    pacer: RequestPacer,
}

impl AuddClient {
    /// Create a client against the public AudD endpoint.
    pub fn new(api_token: Option<String>) -> Result<Self> {
        let mut builder = Self::builder();
        if let Some(token) = api_token {
            builder = builder.api_token(token);
        }
        builder.build()
    }

    /// Create a client builder for custom configuration.
    pub fn builder() -> AuddClientBuilder {
        AuddClientBuilder::default()
    }

    async fn submit(&self, file_name: String, payload: Vec<u8>) -> Result<Option<SongMatch>> {
        let part = Part::bytes(payload)
            .file_name(file_name)
            .mime_str("audio/mpeg")?;

        let mut form = Form::new().text("return", "").part("file", part);
        if let Some(token) = &self.api_token {
            form = form.text("api_token", token.clone());
        }

        self.pacer.acquire().await;

        let response = self
            .client
            .post(&self.endpoint)
            .multipart(form)
            .send()
            .await?;

        let status = response.status();
        debug!(target: "recognition", "recognition response status: {}", status);

        if !status.is_success() {
            let message = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(RecognitionError::HttpStatus {
                status: status.as_u16(),
                message,
            });
        }

        let body = response.text().await?;
        trace!(target: "recognition", "recognition response: {}", body);

        parse_response(&body)
    }
}

/// Map a response body to a match, a no-match, or a service error.
fn parse_response(body: &str) -> Result<Option<SongMatch>> {
    let api_response: AuddResponse = serde_json::from_str(body)
        .map_err(|e| RecognitionError::InvalidResponse(e.to_string()))?;

    if !api_response.status.eq_ignore_ascii_case("success") {
        return Err(match api_response.error {
            Some(error) => RecognitionError::Service {
                code: error.error_code,
                message: error.error_message,
            },
            None => RecognitionError::InvalidResponse(format!(
                "unexpected status '{}'",
                api_response.status
            )),
        });
    }

    Ok(api_response.result.map(SongMatch::from))
}

#[async_trait]
impl Recognizer for AuddClient {
    #[instrument(skip(self), fields(sample = %sample.display()))]
    async fn recognize(&self, sample: &Path) -> Result<Option<SongMatch>> {
        let payload = tokio::fs::read(sample).await?;
        let file_name = sample
            .file_name()
            .and_then(|name| name.to_str())
            .unwrap_or("sample.mp3")
            .to_string();

        let song = self.submit(file_name, payload).await?;
        match &song {
            Some(song) => debug!(target: "recognition", title = %song.title, "match found"),
            None => debug!(target: "recognition", "no match"),
        }
        Ok(song)
    }
}

/// Builder for [`AuddClient`].
#[derive(Debug)]
pub struct AuddClientBuilder {
    base_url: String,
    api_token: Option<String>,
    timeout: Duration,
    min_interval: Duration,
}

impl Default for AuddClientBuilder {
    fn default() -> Self {
        Self {
            base_url: AUDD_API_BASE.to_string(),
            api_token: None,
            timeout: Duration::from_secs(30),
            min_interval: Duration::ZERO,
        }
    }
}

impl AuddClientBuilder {
    /// Set a custom base URL (useful for testing).
    pub fn base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into();
        self
    }

    pub fn api_token(mut self, token: impl Into<String>) -> Self {
        self.api_token = Some(token.into());
        self
    }

    /// Set request timeout.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Minimum interval between two outbound requests.
    pub fn min_interval(mut self, interval: Duration) -> Self {
        self.min_interval = interval;
        self
    }

    /// Build the client.
    ///
    /// # Errors
    /// Returns an error if:
    /// - The base URL is not a valid URL format
    /// - The timeout is zero
    /// - The HTTP client cannot be created
    pub fn build(self) -> Result<AuddClient> {
        let base = Url::parse(&self.base_url)
            .map_err(|e| RecognitionError::InvalidConfig(format!("Invalid base URL: {}", e)))?;

        if self.timeout.is_zero() {
            return Err(RecognitionError::InvalidConfig(
                "timeout must be greater than zero".to_string(),
            ));
        }

        let client = Client::builder()
            .timeout(self.timeout)
            .user_agent(USER_AGENT)
            .build()?;

        Ok(AuddClient {
            client,
            endpoint: format!("{}/", base.as_str().trim_end_matches('/')),
            api_token: self.api_token.filter(|token| !token.is_empty()),
            pacer: RequestPacer::new(self.min_interval),
        })
    }
}
