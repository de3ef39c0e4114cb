use common::{
    build_publisher, DomainError, DomainResult, JetStreamPublisher, Keyed, Metadata,
    NatsPublisher, PublishRequest, Topic, CORRELATION_ID_HEADER, MSG_ID_HEADER,
    SUBMISSION_ID_HEADER,
};
use serde::Serialize;
use std::sync::Arc;
use tower::ServiceExt;
use tracing::debug;

/// Publishes `Envelope<T>` records to one topic, keyed by submission id.
pub struct EnvelopeProducer<T> {
    publisher: NatsPublisher,
    topic: Topic<T>,
    dedup_enabled: bool,
}

impl<T: Serialize + Keyed> EnvelopeProducer<T> {
    pub fn new(jetstream: Arc<dyn JetStreamPublisher>, topic: Topic<T>) -> Self {
        debug!(topic = %topic.name(), "initialized envelope producer");
        let publisher = build_publisher(jetstream, format!("{}_producer", topic.name()));

        Self {
            publisher,
            topic,
            dedup_enabled: false,
        }
    }

    /// Attach a `Nats-Msg-Id` of `<topic>:<submission id>` so the broker drops
    /// republished duplicates inside its duplicate window.
    pub fn with_dedup(mut self, enabled: bool) -> Self {
        self.dedup_enabled = enabled;
        self
    }

    pub fn topic(&self) -> &Topic<T> {
        &self.topic
    }

    pub async fn publish(&self, metadata: &Metadata, record: &T) -> DomainResult<()> {
        let key = record.submission_id();
        let subject = self.topic.subject_for(key)?;
        let payload = self
            .topic
            .encode(metadata, record)
            .map_err(|e| DomainError::PublishError(e.to_string()))?;

        let mut request = PublishRequest::new(subject, payload)
            .with_header(CORRELATION_ID_HEADER, &metadata.correlation_id)
            .with_header(SUBMISSION_ID_HEADER, key);
        if self.dedup_enabled {
            request = request.with_header(MSG_ID_HEADER, &format!("{}:{key}", self.topic.name()));
        }

        self.publisher
            .clone()
            .oneshot(request)
            .await
            .map_err(|e| DomainError::PublishError(format!("{e:#}")))?;

        Ok(())
    }
}
