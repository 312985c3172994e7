//! HTTP collection gateway backed by an inventory service.
//!
//! Records are fetched from `GET {endpoint}/api/v1/apps/{app_id}`, with the
//! identifier percent-encoded as a single path segment, and the health
//! probe calls `GET {endpoint}/health`. Transport errors, timeouts
//! and 5xx answers are retried with doubling backoff; 4xx answers are not.

use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;

use super::CollectionGateway;
use crate::config::CollectorConfig;
use crate::error::CollectionError;
use crate::types::{AppRecord, CollectionOutcome};

const MAX_BACKOFF: Duration = Duration::from_secs(10);

/// [`CollectionGateway`] that talks to a REST inventory service.
#[derive(Debug, Clone)]
pub struct HttpCollectionGateway {
    endpoint: String,
    http_client: reqwest::Client,
    retry_attempts: u32,
    retry_delay: Duration,
}

impl HttpCollectionGateway {
    /// Builds a gateway from configuration.
    ///
    /// # Errors
    ///
    /// [`CollectionError::MissingEndpoint`] if no endpoint is configured, or
    /// [`CollectionError::Client`] if the HTTP client cannot be built.
    pub fn new(config: &CollectorConfig) -> Result<Self, CollectionError> {
        let endpoint = config
            .endpoint
            .as_deref()
            .map(|e| e.trim().trim_end_matches('/'))
            .filter(|e| !e.is_empty())
            .ok_or(CollectionError::MissingEndpoint)?
            .to_string();

        let http_client = reqwest::Client::builder()
            .timeout(config.timeout())
            .user_agent(concat!("archi-pipeline/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| CollectionError::Client(e.to_string()))?;

        Ok(Self {
            endpoint,
            http_client,
            retry_attempts: config.retry_attempts.max(1),
            retry_delay: config.retry_delay(),
        })
    }

    /// The normalized base URL.
    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    async fn request_record(&self, app_id: &str) -> Result<AppRecord, CollectionError> {
        let url = record_url(&self.endpoint, app_id);
        tracing::debug!("Fetching application record from {}", url);

        let response = self
            .http_client
            .get(&url)
            .send()
            .await
            .map_err(|e| CollectionError::Request(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(CollectionError::Status(status.as_u16()));
        }

        let body = response
            .bytes()
            .await
            .map_err(|e| CollectionError::Request(e.to_string()))?;
        let mut record: AppRecord =
            serde_json::from_slice(&body).map_err(|e| CollectionError::Decode(e.to_string()))?;

        record.app_id = app_id.to_string();
        if record.collected_at.is_none() {
            record.collected_at = Some(Utc::now().to_rfc3339());
        }
        Ok(record)
    }

    async fn fetch_with_retry(&self, app_id: &str) -> Result<AppRecord, CollectionError> {
        let mut delay = self.retry_delay;
        let mut attempt = 1;
        loop {
            match self.request_record(app_id).await {
                Ok(record) => return Ok(record),
                Err(e) if attempt < self.retry_attempts && is_retryable(&e) => {
                    tracing::debug!(
                        app_id,
                        attempt,
                        error = %e,
                        "collection attempt failed, retrying in {:?}",
                        delay
                    );
                    tokio::time::sleep(delay).await;
                    delay = (delay * 2).min(MAX_BACKOFF);
                    attempt += 1;
                },
                Err(e) => return Err(e),
            }
        }
    }
}

fn record_url(endpoint: &str, app_id: &str) -> String {
    format!("{}/api/v1/apps/{}", endpoint, urlencoding::encode(app_id))
}

fn is_retryable(error: &CollectionError) -> bool {
    match error {
        CollectionError::Request(_) => true,
        CollectionError::Status(code) => *code >= 500,
        _ => false,
    }
}

#[async_trait]
impl CollectionGateway for HttpCollectionGateway {
    async fn fetch(&self, app_id: &str) -> CollectionOutcome {
        match self.fetch_with_retry(app_id).await {
            Ok(record) => CollectionOutcome::collected(record),
            Err(e) => CollectionOutcome::failed(app_id, e.to_string()),
        }
    }

    async fn health_check(&self) -> bool {
        let url = format!("{}/health", self.endpoint);
        match self.http_client.get(&url).send().await {
            Ok(response) => response.status().is_success(),
            Err(e) => {
                tracing::warn!(error = %e, "collection gateway health check failed");
                false
            },
        }
    }
}
