//! Signed SmugMug API client.
//!
//! Every request is a GET carrying a fresh OAuth header (signatures are
//! nonce-bound and single-use, so each retry re-signs). Failures are retried
//! up to a fixed attempt budget with a short pause between attempts; a 429
//! answer swaps the pause for a longer rate-limit cooldown. JSON decode
//! failures consume attempts from the same budget as transport failures.

pub mod error;
pub mod pages;
pub mod types;

use std::sync::Arc;
use std::time::Duration;

use reqwest::header::{ACCEPT, AUTHORIZATION, RETRY_AFTER};
use serde::de::DeserializeOwned;
use thiserror::Error;
use tracing::{debug, error, warn};

use crate::auth::Signer;

pub use error::ApiError;

const BASE_API_URL: &str = "https://api.smugmug.com";

/// Explicit retry state: attempt budget and the two pause lengths. Tests zero
/// the pauses to keep the retry machine deterministic and fast.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub retry_pause: Duration,
    pub rate_limit_pause: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            retry_pause: Duration::from_secs(2),
            rate_limit_pause: Duration::from_secs(10),
        }
    }
}

impl RetryPolicy {
    /// Zero-pause variant for tests.
    #[cfg(test)]
    pub fn immediate() -> Self {
        Self {
            max_attempts: 3,
            retry_pause: Duration::ZERO,
            rate_limit_pause: Duration::ZERO,
        }
    }
}

/// A single attempt's retryable failure.
#[derive(Debug, Error)]
enum AttemptError {
    #[error("request failed: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("HTTP status {status}")]
    Status {
        status: u16,
        retry_after: Option<String>,
    },
    #[error("decoding response: {0}")]
    Decode(#[from] serde_json::Error),
}

impl AttemptError {
    fn is_rate_limited(&self) -> bool {
        matches!(self, AttemptError::Status { status: 429, .. })
    }
}

pub struct ApiClient {
    http: reqwest::Client,
    signer: Arc<dyn Signer>,
    base_url: String,
    retry: RetryPolicy,
}

impl ApiClient {
    pub fn new(signer: Arc<dyn Signer>, retry: RetryPolicy) -> Self {
        Self {
            http: reqwest::Client::new(),
            signer,
            base_url: BASE_API_URL.to_string(),
            retry,
        }
    }

    /// Point the client at a different API host. Used by tests; the SmugMug
    /// host is the default.
    pub fn with_base_url(mut self, base_url: &str) -> Self {
        self.base_url = base_url.trim_end_matches('/').to_string();
        self
    }

    /// GET an API path (relative to the base URL) and decode the JSON
    /// envelope into `T`.
    pub async fn get<T: DeserializeOwned>(&self, path: &str) -> Result<T, ApiError> {
        if path.is_empty() {
            return Err(ApiError::EmptyUrl);
        }
        let url = format!("{}{}", self.base_url, path);
        let mut causes = Vec::new();

        for attempt in 1..=self.retry.max_attempts {
            let failure = match self.attempt(&url).await? {
                Ok(response) => match Self::read_json::<T>(response).await {
                    Ok(value) => return Ok(value),
                    Err(failure) => failure,
                },
                Err(failure) => failure,
            };
            self.note_failure(&url, attempt, failure, &mut causes).await;
        }

        self.exhausted(&url, causes)
    }

    /// GET an absolute URL (e.g. an archived-media URI) and hand back the raw
    /// response for streaming. Same signing and retry behavior as [`get`].
    ///
    /// [`get`]: ApiClient::get
    pub async fn get_raw(&self, url: &str) -> Result<reqwest::Response, ApiError> {
        if url.is_empty() {
            return Err(ApiError::EmptyUrl);
        }
        let mut causes = Vec::new();

        for attempt in 1..=self.retry.max_attempts {
            match self.attempt(url).await? {
                Ok(response) => return Ok(response),
                Err(failure) => self.note_failure(url, attempt, failure, &mut causes).await,
            }
        }

        self.exhausted(url, causes)
    }

    /// One signed dispatch. The outer `Result` is fatal (signing failure),
    /// the inner one is this attempt's outcome.
    async fn attempt(&self, url: &str) -> Result<Result<reqwest::Response, AttemptError>, ApiError> {
        // Signatures are nonce/timestamp-bound and cannot be reused, so each
        // attempt gets its own.
        let auth = self
            .signer
            .sign(url)
            .await
            .map_err(|source| ApiError::Sign {
                url: url.to_string(),
                source,
            })?;

        debug!("Calling {url}");
        let response = match self
            .http
            .get(url)
            .header(ACCEPT, "application/json")
            .header(AUTHORIZATION, auth)
            .send()
            .await
        {
            Ok(response) => response,
            Err(e) => return Ok(Err(AttemptError::Transport(e))),
        };

        let status = response.status().as_u16();
        if status >= 400 {
            let retry_after = response
                .headers()
                .get(RETRY_AFTER)
                .and_then(|v| v.to_str().ok())
                .map(String::from);
            return Ok(Err(AttemptError::Status {
                status,
                retry_after,
            }));
        }
        Ok(Ok(response))
    }

    async fn read_json<T: DeserializeOwned>(response: reqwest::Response) -> Result<T, AttemptError> {
        let body = response.text().await?;
        Ok(serde_json::from_str(&body)?)
    }

    /// Record an attempt's failure and pause before the next one (rate-limit
    /// cooldown for 429, the ordinary retry pause otherwise). No pause after
    /// the final attempt.
    async fn note_failure(
        &self,
        url: &str,
        attempt: u32,
        failure: AttemptError,
        causes: &mut Vec<String>,
    ) {
        warn!("#{attempt} GET {url}: {failure}");
        let rate_limited = failure.is_rate_limited();
        if let AttemptError::Status {
            retry_after: Some(retry_after),
            ..
        } = &failure
        {
            warn!("Retry-After header: {retry_after}");
        }
        causes.push(failure.to_string());

        if attempt >= self.retry.max_attempts {
            return;
        }
        if rate_limited {
            warn!(
                "Got 429 Too Many Requests, cooling down for {}s",
                self.retry.rate_limit_pause.as_secs()
            );
            tokio::time::sleep(self.retry.rate_limit_pause).await;
        } else {
            tokio::time::sleep(self.retry.retry_pause).await;
        }
    }

    fn exhausted<T>(&self, url: &str, causes: Vec<String>) -> Result<T, ApiError> {
        for cause in &causes {
            error!("GET {url}: {cause}");
        }
        Err(ApiError::Exhausted {
            url: url.to_string(),
            attempts: self.retry.max_attempts,
            causes,
        })
    }
}
