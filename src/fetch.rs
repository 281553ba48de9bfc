//! Upstream digest retrieval.
//!
//! [`DigestSource`] is the single-attempt seam; [`HttpSource`] implements it
//! over `reqwest`. [`fetch_digest`] wraps any source in the bounded retry
//! contract: non-success status, upstream error codes and transport failures
//! are retried, a payload we cannot decode is not.

use crate::error::FetchError;
use crate::models::{RawDigest, RawEnvelope};
use crate::retry::{RetryPolicy, retry};
use crate::utils::truncate_for_log;
use reqwest::Client;
use reqwest::header::{CACHE_CONTROL, HeaderMap, HeaderValue, REFERER, USER_AGENT};
use std::time::{Duration, Instant};
use tracing::{debug, info, instrument, warn};

/// Something that can produce one upstream digest per call.
pub trait DigestSource {
    async fn fetch(&self) -> Result<RawDigest, FetchError>;
}

/// Connection settings for the upstream API.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpstreamConfig {
    pub endpoint: String,
    pub user_agent: String,
    pub referer: String,
    pub timeout: Duration,
}

/// HTTP implementation of [`DigestSource`].
#[derive(Debug)]
pub struct HttpSource {
    client: Client,
    endpoint: String,
}

impl HttpSource {
    pub fn new(config: &UpstreamConfig) -> Result<Self, FetchError> {
        let mut headers = HeaderMap::new();
        headers.insert(CACHE_CONTROL, HeaderValue::from_static("no-cache"));
        if let Ok(referer) = HeaderValue::from_str(&config.referer) {
            headers.insert(REFERER, referer);
        } else {
            warn!(referer = %config.referer, "Referer is not a valid header value; omitting");
        }
        if let Ok(agent) = HeaderValue::from_str(&config.user_agent) {
            headers.insert(USER_AGENT, agent);
        }

        let client = Client::builder()
            .default_headers(headers)
            .timeout(config.timeout)
            .build()?;

        Ok(Self {
            client,
            endpoint: config.endpoint.clone(),
        })
    }
}

impl DigestSource for HttpSource {
    #[instrument(level = "info", skip_all, fields(endpoint = %self.endpoint))]
    async fn fetch(&self) -> Result<RawDigest, FetchError> {
        let t0 = Instant::now();
        let response = self.client.get(&self.endpoint).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Status {
                status: status.as_u16(),
            });
        }

        let body = response.bytes().await?;
        debug!(
            bytes = body.len(),
            elapsed_ms = t0.elapsed().as_millis(),
            "Fetched upstream body"
        );
        parse_envelope(&body)
    }
}

/// Decode an upstream body into its `data` object.
pub fn parse_envelope(body: &[u8]) -> Result<RawDigest, FetchError> {
    let envelope: RawEnvelope = serde_json::from_slice(body).inspect_err(|e| {
        warn!(
            error = %e,
            body_preview = %truncate_for_log(&String::from_utf8_lossy(body), 300),
            "Upstream returned non-JSON body"
        );
    })?;

    match envelope.code {
        Some(code) if code != 200 => {
            return Err(FetchError::Upstream {
                code,
                message: envelope.message.unwrap_or_default(),
            });
        }
        _ => {}
    }
    envelope.data.ok_or(FetchError::MissingData)
}

/// Fetch the digest, retrying transient failures under `policy`.
///
/// # Arguments
///
/// * `source` - Where a single attempt goes
/// * `policy` - Attempt bound and delay between attempts
///
/// # Returns
///
/// The raw digest, or the last error once attempts are exhausted. Decode
/// failures and a missing `data` object are returned immediately.
///
/// # Examples
///
/// ```ignore
/// let source = HttpSource::new(&config.upstream)?;
/// let raw = fetch_digest(&source, &RetryPolicy::fixed(3, Duration::from_secs(2))).await?;
/// ```
#[instrument(level = "info", skip_all)]
pub async fn fetch_digest<S: DigestSource>(
    source: &S,
    policy: &RetryPolicy,
) -> Result<RawDigest, FetchError> {
    let t0 = Instant::now();
    let raw = retry(policy, "fetch digest", FetchError::is_retryable, |attempt| {
        info!(attempt, max = policy.max_attempts, "Fetching upstream digest");
        source.fetch()
    })
    .await?;
    info!(
        elapsed_ms_total = t0.elapsed().as_millis(),
        date = raw.date.as_deref().unwrap_or("<missing>"),
        "Fetched upstream digest"
    );
    Ok(raw)
}
