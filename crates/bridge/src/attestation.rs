//! Client for the CCTP attestation service.
//!
//! The service is keyed by the keccak-256 digest of the burn message and
//! answers `GET {base}/attestations/{0x-digest}` with
//! `{ "status": "...", "attestation": "0x..." | null }`.

use std::fmt::Display;
use std::time::Duration;

use alloy::hex::FromHexError;
use alloy::primitives::{B256, Bytes};
use backon::{ExponentialBuilder, Retryable};
use relay_evm::PollingConfig;
use serde::{Deserialize, Serialize};
use tokio::time::{Instant, sleep};
use tracing::{debug, info, warn};
use url::Url;

const HTTP_TIMEOUT: Duration = Duration::from_secs(20);
const TRANSPORT_RETRIES: usize = 3;

/// Default attestation polling: every 5s for up to 5 minutes.
pub const DEFAULT_ATTESTATION_POLLING: PollingConfig =
    PollingConfig::new(Duration::from_secs(5), Duration::from_secs(300));

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AttestationStatus {
    Pending,
    Complete,
    Other(String),
}

impl AttestationStatus {
    fn parse(raw: &str) -> Self {
        match raw.trim().to_ascii_lowercase().as_str() {
            "complete" => Self::Complete,
            "pending" => Self::Pending,
            other => Self::Other(other.to_string()),
        }
    }
}

impl Display for AttestationStatus {
    fn fmt(&self, dest: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Pending => write!(dest, "pending"),
            Self::Complete => write!(dest, "complete"),
            Self::Other(status) => write!(dest, "{status}"),
        }
    }
}

/// A completed attestation, ready to accompany the message in `receiveMessage`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attestation {
    pub status: AttestationStatus,
    pub attestation: Bytes,
}

/// Result of a one-shot attestation status lookup.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AttestationLookup {
    pub request_id: String,
    pub status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub attestation: Option<String>,
}

#[derive(Debug, thiserror::Error)]
pub enum AttestationError {
    #[error("attestation for {digest} not complete after {attempts} attempts over {elapsed:?}")]
    Timeout {
        digest: B256,
        attempts: usize,
        elapsed: Duration,
    },
    #[error("attestation service request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("attestation payload is not valid hex: {source}")]
    InvalidPayload {
        #[source]
        source: FromHexError,
    },
}

#[derive(Debug, Deserialize)]
struct AttestationResponse {
    #[serde(default)]
    status: String,
    attestation: Option<String>,
}

/// Adds a `0x` prefix when missing.
pub fn with_hex_prefix(value: &str) -> String {
    let trimmed = value.trim();
    if trimmed.starts_with("0x") || trimmed.starts_with("0X") {
        trimmed.to_string()
    } else {
        format!("0x{trimmed}")
    }
}

#[derive(Debug, Clone)]
pub struct AttestationPoller {
    http_client: reqwest::Client,
    base_url: Url,
    config: PollingConfig,
}

impl AttestationPoller {
    pub fn new(base_url: Url, config: PollingConfig) -> Result<Self, AttestationError> {
        let http_client = reqwest::Client::builder().timeout(HTTP_TIMEOUT).build()?;

        Ok(Self {
            http_client,
            base_url,
            config,
        })
    }

    fn url_for(&self, request_id: &str) -> String {
        format!(
            "{}/attestations/{request_id}",
            self.base_url.as_str().trim_end_matches('/')
        )
    }

    /// One GET with transport-level retries. HTTP status codes are returned,
    /// not retried here.
    async fn fetch(&self, url: &str) -> Result<Option<AttestationResponse>, reqwest::Error> {
        let send = || async { self.http_client.get(url).send().await };

        let response = send
            .retry(ExponentialBuilder::default().with_max_times(TRANSPORT_RETRIES))
            .notify(|err, dur| warn!(%err, ?dur, url, "Attestation request failed, retrying"))
            .await?;

        if !response.status().is_success() {
            debug!(status = response.status().as_u16(), url, "Attestation not available");
            return Ok(None);
        }

        let body = response.text().await?;
        match serde_json::from_str(&body) {
            Ok(parsed) => Ok(Some(parsed)),
            Err(err) => {
                warn!(%err, url, "Unparseable attestation response");
                Ok(None)
            }
        }
    }

    /// Polls until the service reports `complete` with a non-empty payload.
    ///
    /// Non-200 answers, other statuses and empty payloads all count as
    /// pending. Transport failures are retried briefly and then returned.
    pub async fn await_attestation(&self, digest: B256) -> Result<Attestation, AttestationError> {
        let url = self.url_for(&digest.to_string());
        let start = Instant::now();
        let deadline = start + self.config.timeout;
        let mut attempts = 0;

        info!(%url, "Polling attestation service");

        loop {
            if Instant::now() >= deadline {
                return Err(AttestationError::Timeout {
                    digest,
                    attempts,
                    elapsed: start.elapsed(),
                });
            }

            attempts += 1;

            if let Some(response) = self.fetch(&url).await? {
                let status = AttestationStatus::parse(&response.status);
                let payload = response
                    .attestation
                    .as_deref()
                    .map(str::trim)
                    .filter(|payload| !payload.is_empty() && *payload != "0x");

                match payload {
                    Some(payload) if status == AttestationStatus::Complete => {
                        let attestation = alloy::hex::decode(with_hex_prefix(payload))
                            .map_err(|source| AttestationError::InvalidPayload { source })?;

                        info!(%digest, attempts, "Attestation complete");

                        return Ok(Attestation {
                            status,
                            attestation: attestation.into(),
                        });
                    }
                    _ => debug!(%digest, %status, attempts, "Attestation pending"),
                }
            }

            sleep(self.config.interval).await;
        }
    }

    /// Single lookup by request id, with or without `0x` prefix.
    pub async fn status(&self, request_id: &str) -> Result<AttestationLookup, AttestationError> {
        let request_id = with_hex_prefix(request_id);
        let url = self.url_for(&request_id);

        let Some(response) = self.fetch(&url).await? else {
            return Ok(AttestationLookup {
                request_id,
                status: "unknown".to_string(),
                attestation: None,
            });
        };

        let status = if response.status.trim().is_empty() {
            "unknown".to_string()
        } else {
            response.status.trim().to_ascii_lowercase()
        };

        Ok(AttestationLookup {
            request_id,
            status,
            attestation: response.attestation,
        })
    }
}
