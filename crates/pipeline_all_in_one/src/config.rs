use chrono::{DateTime, Utc};
use common::telemetry::{LogFormat, TelemetryConfig};
use common::{HttpArchivalGatewayConfig, PipelineTopics, ReplayFilter};
use crate::health_server::HealthServerConfig;
use config::{Config, ConfigError, Environment};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use submission_worker::{NotificationSettings, SubmissionWorkerConfig};

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct ServiceConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Log output format (json, pretty)
    #[serde(default = "default_log_format")]
    pub log_format: String,

    // NATS configuration
    /// NATS server URL
    #[serde(default = "default_nats_url")]
    pub nats_url: String,

    /// Startup timeout for connecting and creating streams in seconds
    #[serde(default = "default_startup_timeout_secs")]
    pub startup_timeout_secs: u64,

    // Topics
    #[serde(default = "default_raw_submissions_topic")]
    pub raw_submissions_topic: String,

    #[serde(default = "default_enriched_submissions_topic")]
    pub enriched_submissions_topic: String,

    #[serde(default = "default_cleanup_signal_topic")]
    pub cleanup_signal_topic: String,

    #[serde(default = "default_notification_events_topic")]
    pub notification_events_topic: String,

    // Stage runtime
    /// Prefix of the durable consumer names, one consumer per stage
    #[serde(default = "default_consumer_prefix")]
    pub consumer_prefix: String,

    /// Max wait of a single fetch in seconds
    #[serde(default = "default_fetch_max_wait_secs")]
    pub fetch_max_wait_secs: u64,

    /// Pause after a failed fetch in milliseconds
    #[serde(default = "default_fetch_retry_delay_ms")]
    pub fetch_retry_delay_ms: u64,

    /// Records received at or before this instant are never processed (RFC 3339)
    pub received_after: DateTime<Utc>,

    /// Grace window before a failed or stopped stage turns the service unhealthy
    #[serde(default = "default_unready_after_stream_stopped_in_secs")]
    pub unready_after_stream_stopped_in_secs: u64,

    /// Exit the whole service when a stage fails instead of reporting it on /health
    #[serde(default)]
    pub exit_on_stage_failure: bool,

    /// Attach a broker dedup id to every published record
    #[serde(default)]
    pub publish_dedup_enabled: bool,

    // Document store
    /// NATS Object Store bucket holding temporary documents
    #[serde(default = "default_document_store_bucket")]
    pub document_store_bucket: String,

    // Archival gateway
    #[serde(default = "default_archival_gateway_base_url")]
    pub archival_gateway_base_url: String,

    #[serde(default = "default_archival_gateway_timeout_secs")]
    pub archival_gateway_timeout_secs: u64,

    /// Send the submission id as idempotency key when filing
    #[serde(default)]
    pub archival_idempotency_enabled: bool,

    // Notification
    #[serde(default = "default_notification_text")]
    pub notification_text: String,

    #[serde(default = "default_notification_visible_days")]
    pub notification_visible_days: u32,

    #[serde(default = "default_notification_benefit_type")]
    pub notification_benefit_type: String,

    #[serde(default)]
    pub notification_link: Option<String>,

    // HTTP probes
    #[serde(default = "default_http_host")]
    pub http_host: String,

    #[serde(default = "default_http_port")]
    pub http_port: u16,

    /// Bound on each dependency check made by /health, in milliseconds
    #[serde(default = "default_health_dependency_timeout_ms")]
    pub health_dependency_timeout_ms: u64,

    // Shutdown
    /// How long stages may finish in-flight records after a shutdown signal
    #[serde(default = "default_drain_timeout_secs")]
    pub drain_timeout_secs: u64,

    #[serde(default = "default_closer_timeout_secs")]
    pub closer_timeout_secs: u64,

    // OpenTelemetry configuration
    /// OpenTelemetry OTLP endpoint (gRPC)
    #[serde(default = "default_otel_endpoint")]
    pub otel_endpoint: String,

    /// Enable OpenTelemetry export
    #[serde(default)]
    pub otel_enabled: bool,

    /// Service name for OpenTelemetry resource
    #[serde(default = "default_otel_service_name")]
    pub otel_service_name: String,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "json".to_string()
}

// NATS defaults
fn default_nats_url() -> String {
    "nats://localhost:4222".to_string()
}

fn default_startup_timeout_secs() -> u64 {
    30
}

// Topic defaults
fn default_raw_submissions_topic() -> String {
    common::RAW_SUBMISSIONS_TOPIC.to_string()
}

fn default_enriched_submissions_topic() -> String {
    common::ENRICHED_SUBMISSIONS_TOPIC.to_string()
}

fn default_cleanup_signal_topic() -> String {
    common::CLEANUP_SIGNAL_TOPIC.to_string()
}

fn default_notification_events_topic() -> String {
    common::NOTIFICATION_EVENTS_TOPIC.to_string()
}

// Stage runtime defaults
fn default_consumer_prefix() -> String {
    "benefit-pipeline".to_string()
}

fn default_fetch_max_wait_secs() -> u64 {
    5
}

fn default_fetch_retry_delay_ms() -> u64 {
    1000
}

fn default_unready_after_stream_stopped_in_secs() -> u64 {
    60
}

fn default_document_store_bucket() -> String {
    "benefit-documents".to_string()
}

// Archival gateway defaults
fn default_archival_gateway_base_url() -> String {
    "http://localhost:8080".to_string()
}

fn default_archival_gateway_timeout_secs() -> u64 {
    30
}

// Notification defaults
fn default_notification_text() -> String {
    submission_worker::DEFAULT_NOTIFICATION_TEXT.to_string()
}

fn default_notification_visible_days() -> u32 {
    submission_worker::DEFAULT_VISIBLE_DAYS
}

fn default_notification_benefit_type() -> String {
    submission_worker::DEFAULT_BENEFIT_TYPE.to_string()
}

// HTTP defaults
fn default_http_host() -> String {
    "0.0.0.0".to_string()
}

fn default_http_port() -> u16 {
    8081
}

fn default_health_dependency_timeout_ms() -> u64 {
    2000
}

// Shutdown defaults
fn default_drain_timeout_secs() -> u64 {
    30
}

fn default_closer_timeout_secs() -> u64 {
    10
}

// OpenTelemetry defaults
fn default_otel_endpoint() -> String {
    "http://localhost:4317".to_string()
}

fn default_otel_service_name() -> String {
    "benefit-submission-pipeline".to_string()
}

impl ServiceConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Config::builder()
            .add_source(Environment::with_prefix("BENEFIT"))
            .build()?
            .try_deserialize()
    }

    pub fn topics(&self) -> PipelineTopics {
        PipelineTopics::new(
            self.raw_submissions_topic.clone(),
            self.enriched_submissions_topic.clone(),
            self.cleanup_signal_topic.clone(),
            self.notification_events_topic.clone(),
        )
    }

    pub fn telemetry_config(&self) -> TelemetryConfig {
        TelemetryConfig {
            service_name: self.otel_service_name.clone(),
            otel_endpoint: self.otel_endpoint.clone(),
            otel_enabled: self.otel_enabled,
            log_level: self.log_level.clone(),
            log_format: LogFormat::parse(&self.log_format),
        }
    }

    pub fn health_server_config(&self) -> HealthServerConfig {
        HealthServerConfig {
            host: self.http_host.clone(),
            port: self.http_port,
            dependency_timeout: Duration::from_millis(self.health_dependency_timeout_ms),
        }
    }

    pub fn archival_gateway_config(&self) -> HttpArchivalGatewayConfig {
        HttpArchivalGatewayConfig {
            base_url: self.archival_gateway_base_url.clone(),
            timeout: Duration::from_secs(self.archival_gateway_timeout_secs),
            idempotency_enabled: self.archival_idempotency_enabled,
        }
    }

    pub fn worker_config(&self) -> SubmissionWorkerConfig {
        SubmissionWorkerConfig {
            topics: self.topics(),
            consumer_prefix: self.consumer_prefix.clone(),
            fetch_max_wait: Duration::from_secs(self.fetch_max_wait_secs),
            fetch_retry_delay: Duration::from_millis(self.fetch_retry_delay_ms),
            replay_filter: ReplayFilter::new(self.received_after),
            unready_after_stream_stopped_in: Duration::from_secs(
                self.unready_after_stream_stopped_in_secs,
            ),
            publish_dedup_enabled: self.publish_dedup_enabled,
            notification: NotificationSettings {
                text: self.notification_text.clone(),
                visible_days: self.notification_visible_days,
                benefit_type: self.notification_benefit_type.clone(),
                link: self.notification_link.clone(),
            },
        }
    }
}
