use crate::domain::{ArchivalGateway, ArchivalRequest, DomainError, DomainResult, JournalId};
use crate::health::DependencyCheck;
use anyhow::{bail, Context};
use async_trait::async_trait;
use serde::Deserialize;
use std::time::Duration;
use tracing::{debug, instrument, warn};

const JOURNALING_PATH: &str = "/v1/benefit-payment/journaling";
const HEALTH_PATH: &str = "/health";
const CORRELATION_ID_HEADER: &str = "X-Correlation-Id";
const IDEMPOTENCY_KEY_HEADER: &str = "Idempotency-Key";
// Keeps error messages readable when the gateway answers with an HTML page
const MAX_ERROR_BODY_CHARS: usize = 512;

#[derive(Debug, Clone)]
pub struct HttpArchivalGatewayConfig {
    pub base_url: String,
    pub timeout: Duration,
    /// Send the submission id as `Idempotency-Key` so the gateway can dedup refiling
    pub idempotency_enabled: bool,
}

#[derive(Debug, Deserialize)]
struct JournalResponse {
    #[serde(alias = "journal_id")]
    journal_post_id: String,
}

/// Archival gateway reached over HTTP.
///
/// The request timeout is the only bound on a filing call; a stage waiting on
/// the gateway is blocked for at most that long.
pub struct HttpArchivalGateway {
    client: reqwest::Client,
    endpoint: String,
    health_endpoint: String,
    idempotency_enabled: bool,
}

impl HttpArchivalGateway {
    pub fn new(config: HttpArchivalGatewayConfig) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()
            .context("failed to build archival gateway HTTP client")?;

        let base_url = config.base_url.trim_end_matches('/');
        Ok(Self {
            client,
            endpoint: format!("{base_url}{JOURNALING_PATH}"),
            health_endpoint: format!("{base_url}{HEALTH_PATH}"),
            idempotency_enabled: config.idempotency_enabled,
        })
    }
}

#[async_trait]
impl ArchivalGateway for HttpArchivalGateway {
    #[instrument(
        skip(self, request),
        fields(
            submission_id = %request.submission_id,
            bundles = request.document_ids.len(),
        )
    )]
    async fn file(&self, request: ArchivalRequest, correlation_id: &str) -> DomainResult<JournalId> {
        let mut builder = self
            .client
            .post(&self.endpoint)
            .header(CORRELATION_ID_HEADER, correlation_id);
        if self.idempotency_enabled {
            builder = builder.header(IDEMPOTENCY_KEY_HEADER, request.submission_id.as_str());
        }

        let response = builder
            .json(&request)
            .send()
            .await
            .map_err(|e| DomainError::ArchivalGatewayUnavailable(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let message: String = body.chars().take(MAX_ERROR_BODY_CHARS).collect();
            warn!(status = status.as_u16(), "archival gateway rejected filing");
            return Err(DomainError::ArchivalGatewayStatus {
                status: status.as_u16(),
                message,
            });
        }

        let body = response
            .bytes()
            .await
            .map_err(|e| DomainError::ArchivalGatewayUnavailable(e.to_string()))?;
        let parsed: JournalResponse = serde_json::from_slice(&body)
            .map_err(|e| DomainError::MalformedArchivalResponse(e.to_string()))?;

        if parsed.journal_post_id.trim().is_empty() {
            return Err(DomainError::MalformedArchivalResponse(
                "empty journal id".to_string(),
            ));
        }

        debug!(journal_id = %parsed.journal_post_id, "submission filed");
        Ok(JournalId(parsed.journal_post_id))
    }
}

#[async_trait]
impl DependencyCheck for HttpArchivalGateway {
    fn name(&self) -> &'static str {
        "archival-gateway"
    }

    async fn check(&self) -> anyhow::Result<()> {
        let response = self
            .client
            .get(&self.health_endpoint)
            .send()
            .await
            .context("archival gateway unreachable")?;

        let status = response.status();
        if status != reqwest::StatusCode::OK {
            bail!("archival gateway answered {}", status.as_u16());
        }
        Ok(())
    }
}
