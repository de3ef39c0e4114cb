use crate::codec::{decode_envelope, decode_metadata, encode_envelope, CodecError};
use crate::domain::{
    CleanupSignal, DomainError, DomainResult, EnrichedSubmission, Envelope, Metadata,
    NotificationEvent, Submission,
};
use bytes::Bytes;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::marker::PhantomData;

pub const RAW_SUBMISSIONS_TOPIC: &str = "raw-submissions";
pub const ENRICHED_SUBMISSIONS_TOPIC: &str = "enriched-submissions";
pub const CLEANUP_SIGNAL_TOPIC: &str = "cleanup-signal";
pub const NOTIFICATION_EVENTS_TOPIC: &str = "notification-events";

/// A named topic carrying `Envelope<T>` records.
///
/// Backed by a JetStream stream of the same name; the record key is the last
/// subject token, so `<topic>.<submission id>`.
pub struct Topic<T> {
    name: String,
    _payload: PhantomData<fn() -> T>,
}

impl<T> Clone for Topic<T> {
    fn clone(&self) -> Self {
        Self::new(self.name.clone())
    }
}

impl<T> std::fmt::Debug for Topic<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("Topic").field(&self.name).finish()
    }
}

impl<T> Topic<T> {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            _payload: PhantomData,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Subject filter matching every key on this topic.
    pub fn filter_subject(&self) -> String {
        format!("{}.*", self.name)
    }

    /// Subject a record with the given key is published to.
    pub fn subject_for(&self, key: &str) -> DomainResult<String> {
        validate_key(key)?;
        Ok(format!("{}.{}", self.name, key))
    }

    /// Extracts the record key from a subject on this topic.
    pub fn key_from_subject<'a>(&self, subject: &'a str) -> Option<&'a str> {
        subject
            .strip_prefix(self.name.as_str())
            .and_then(|rest| rest.strip_prefix('.'))
            .filter(|key| !key.is_empty())
    }
}

impl<T: Serialize> Topic<T> {
    pub fn encode(&self, metadata: &Metadata, payload: &T) -> Result<Bytes, CodecError> {
        encode_envelope(&self.name, metadata, payload)
    }
}

impl<T: DeserializeOwned> Topic<T> {
    pub fn decode_metadata(&self, bytes: &[u8]) -> Result<Metadata, CodecError> {
        decode_metadata(&self.name, bytes)
    }

    pub fn decode(&self, bytes: &[u8]) -> Result<Envelope<T>, CodecError> {
        decode_envelope(&self.name, bytes)
    }
}

fn validate_key(key: &str) -> DomainResult<()> {
    let invalid = key.is_empty()
        || key
            .chars()
            .any(|c| c.is_whitespace() || c == '.' || c == '*' || c == '>');
    if invalid {
        return Err(DomainError::InvalidRecordKey(key.to_string()));
    }
    Ok(())
}

/// The four topics connecting intake, the three stages and the notifier.
#[derive(Debug, Clone)]
pub struct PipelineTopics {
    pub raw_submissions: Topic<Submission>,
    pub enriched_submissions: Topic<EnrichedSubmission>,
    pub cleanup_signal: Topic<CleanupSignal>,
    pub notification_events: Topic<NotificationEvent>,
}

impl Default for PipelineTopics {
    fn default() -> Self {
        Self::new(
            RAW_SUBMISSIONS_TOPIC,
            ENRICHED_SUBMISSIONS_TOPIC,
            CLEANUP_SIGNAL_TOPIC,
            NOTIFICATION_EVENTS_TOPIC,
        )
    }
}

impl PipelineTopics {
    pub fn new(
        raw_submissions: impl Into<String>,
        enriched_submissions: impl Into<String>,
        cleanup_signal: impl Into<String>,
        notification_events: impl Into<String>,
    ) -> Self {
        Self {
            raw_submissions: Topic::new(raw_submissions),
            enriched_submissions: Topic::new(enriched_submissions),
            cleanup_signal: Topic::new(cleanup_signal),
            notification_events: Topic::new(notification_events),
        }
    }

    pub fn names(&self) -> [&str; 4] {
        [
            self.raw_submissions.name(),
            self.enriched_submissions.name(),
            self.cleanup_signal.name(),
            self.notification_events.name(),
        ]
    }
}
