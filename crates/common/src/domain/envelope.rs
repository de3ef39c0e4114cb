use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// The only envelope schema version the stages process.
///
/// Records carrying any other version are dropped by the replay filter.
pub const SUPPORTED_SCHEMA_VERSION: i64 = 1;

/// Envelope metadata shared by every topic.
///
/// `correlation_id` is assigned at intake and copied verbatim by every stage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Metadata {
    #[serde(alias = "version")]
    pub schema_version: i64,
    pub correlation_id: String,
}

impl Metadata {
    pub fn new(schema_version: i64, correlation_id: impl Into<String>) -> Self {
        Self {
            schema_version,
            correlation_id: correlation_id.into(),
        }
    }

    pub fn current(correlation_id: impl Into<String>) -> Self {
        Self::new(SUPPORTED_SCHEMA_VERSION, correlation_id)
    }
}

/// A record as persisted on a topic: metadata plus a typed payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope<T> {
    pub metadata: Metadata,
    #[serde(alias = "data")]
    pub payload: T,
}

impl<T> Envelope<T> {
    pub fn new(metadata: Metadata, payload: T) -> Self {
        Self { metadata, payload }
    }
}

/// Payloads that know their partition key.
///
/// Every pipeline payload is keyed by the submission id, on every topic.
pub trait Keyed {
    fn submission_id(&self) -> &str;
}

/// Payloads that carry the business timestamp used by the replay cutoff.
pub trait ReceivedAt {
    fn received_at(&self) -> DateTime<Utc>;
}
