use crate::domain::StageHandler;
use crate::nats::EnvelopeProducer;
use anyhow::Context as _;
use common::{ConsumeRequest, ConsumeResponse, Keyed, Metadata, ReplayFilter, Topic};
use futures::future::BoxFuture;
use std::sync::Arc;
use std::task::{Context, Poll};
use tower::Service;
use tracing::{debug, warn};

/// Tower service running one stage for a single record.
///
/// 1. Decodes the envelope metadata (malformed → error)
/// 2. Drops unsupported schema versions
/// 3. Decodes the typed envelope (malformed → error)
/// 4. Drops records received on or before the cutoff
/// 5. Runs the stage handler and publishes its output under the same correlation id
///
/// Dropped records come back as `Skip`; every error leaves the record uncommitted.
pub struct StageConsumerService<H: StageHandler> {
    handler: Arc<H>,
    input: Topic<H::Input>,
    producer: Arc<EnvelopeProducer<H::Output>>,
    filter: ReplayFilter,
}

impl<H: StageHandler> Clone for StageConsumerService<H> {
    fn clone(&self) -> Self {
        Self {
            handler: Arc::clone(&self.handler),
            input: self.input.clone(),
            producer: Arc::clone(&self.producer),
            filter: self.filter,
        }
    }
}

impl<H: StageHandler> StageConsumerService<H> {
    pub fn new(
        handler: Arc<H>,
        input: Topic<H::Input>,
        producer: Arc<EnvelopeProducer<H::Output>>,
        filter: ReplayFilter,
    ) -> Self {
        Self {
            handler,
            input,
            producer,
            filter,
        }
    }

    async fn process(self, req: ConsumeRequest) -> anyhow::Result<ConsumeResponse> {
        let metadata = self.input.decode_metadata(&req.payload)?;
        if let Err(rejection) = self.filter.check_version(&metadata) {
            return Ok(ConsumeResponse::skip(rejection.to_string()));
        }

        let envelope = self.input.decode(&req.payload)?;
        if let Err(rejection) = self.filter.check_received(&envelope.payload) {
            return Ok(ConsumeResponse::skip(rejection.to_string()));
        }

        let key = envelope.payload.submission_id().to_string();
        if self.input.key_from_subject(&req.subject) != Some(key.as_str()) {
            warn!(
                subject = %req.subject,
                submission_id = %key,
                "record key does not match payload submission id"
            );
        }

        let correlation_id = metadata.correlation_id;
        let stage = self.handler.name();
        let output = self
            .handler
            .handle(envelope.payload, &correlation_id)
            .await
            .with_context(|| format!("{stage} failed for submission {key}"))?;

        self.producer
            .publish(&Metadata::current(correlation_id.as_str()), &output)
            .await
            .with_context(|| {
                format!(
                    "{stage} could not publish to {} for submission {key}",
                    self.producer.topic().name()
                )
            })?;

        debug!(stage, submission_id = %key, "record forwarded");
        Ok(ConsumeResponse::Ack)
    }
}

impl<H: StageHandler> Service<ConsumeRequest> for StageConsumerService<H> {
    type Response = ConsumeResponse;
    type Error = anyhow::Error;
    type Future = BoxFuture<'static, Result<ConsumeResponse, anyhow::Error>>;

    fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, req: ConsumeRequest) -> Self::Future {
        Box::pin(self.clone().process(req))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use bytes::Bytes;
    use chrono::{DateTime, TimeZone, Utc};
    use common::{
        Applicant, DomainError, DomainResult, EnrichedSubmission, MockJetStreamPublisher,
        Submission,
    };
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tower::ServiceExt;

    struct EnrichingHandler {
        calls: AtomicUsize,
        fail: bool,
    }

    impl EnrichingHandler {
        fn new(fail: bool) -> Arc<Self> {
            Arc::new(Self {
                calls: AtomicUsize::new(0),
                fail,
            })
        }
    }

    #[async_trait]
    impl StageHandler for EnrichingHandler {
        type Input = Submission;
        type Output = EnrichedSubmission;

        fn name(&self) -> &'static str {
            "test-stage"
        }

        async fn handle(&self, input: Submission, _correlation_id: &str) -> DomainResult<EnrichedSubmission> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                return Err(DomainError::DocumentStoreError("unavailable".to_string()));
            }
            Ok(EnrichedSubmission::new(input, vec![vec!["doc".to_string()]]))
        }
    }

    fn cutoff() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap()
    }

    fn raw_record(version: i64, received_at: &str) -> ConsumeRequest {
        let body = json!({
            "metadata": {"schemaVersion": version, "correlationId": "corr-1"},
            "payload": {
                "submissionId": "S1",
                "receivedAt": received_at,
                "language": "nb",
                "applicant": {
                    "nationalId": "01010112345",
                    "firstName": "Kari",
                    "lastName": "Nordmann",
                    "actorId": "actor-1"
                },
                "attachmentIds": [],
                "form": {}
            }
        });
        ConsumeRequest::new(
            "raw-submissions.S1",
            Bytes::from(serde_json::to_vec(&body).unwrap()),
            None,
        )
    }

    fn service(
        handler: Arc<EnrichingHandler>,
        publisher: MockJetStreamPublisher,
    ) -> StageConsumerService<EnrichingHandler> {
        let producer = EnvelopeProducer::new(Arc::new(publisher), Topic::new("enriched-submissions"));
        StageConsumerService::new(
            handler,
            Topic::new("raw-submissions"),
            Arc::new(producer),
            ReplayFilter::new(cutoff()),
        )
    }

    fn no_publish() -> MockJetStreamPublisher {
        let mut publisher = MockJetStreamPublisher::new();
        publisher.expect_publish_with_headers().never();
        publisher
    }

    #[tokio::test]
    async fn test_accepted_record_is_handled_and_forwarded() {
        // Arrange
        let mut publisher = MockJetStreamPublisher::new();
        publisher
            .expect_publish_with_headers()
            .withf(|subject, _, payload| {
                let value: serde_json::Value = serde_json::from_slice(payload).unwrap();
                subject == "enriched-submissions.S1"
                    && value["metadata"]["correlationId"] == "corr-1"
                    && value["metadata"]["schemaVersion"] == 1
                    && value["payload"]["documentBundles"] == json!([["doc"]])
            })
            .times(1)
            .returning(|_, _, _| Ok(()));
        let handler = EnrichingHandler::new(false);

        // Act
        let response = service(handler.clone(), publisher)
            .oneshot(raw_record(1, "2024-05-01T10:00:00Z"))
            .await;

        // Assert
        assert_eq!(response.unwrap(), ConsumeResponse::Ack);
        assert_eq!(handler.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_unsupported_version_is_skipped_before_payload_decoding() {
        // Arrange
        let handler = EnrichingHandler::new(false);
        let body = json!({
            "metadata": {"schemaVersion": 2, "correlationId": "corr-1"},
            "payload": {"completely": "different shape"}
        });
        let request = ConsumeRequest::new(
            "raw-submissions.S1",
            Bytes::from(serde_json::to_vec(&body).unwrap()),
            None,
        );

        // Act
        let response = service(handler.clone(), no_publish()).oneshot(request).await;

        // Assert
        assert!(matches!(response.unwrap(), ConsumeResponse::Skip(_)));
        assert_eq!(handler.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_negative_version_is_skipped() {
        // Arrange
        let handler = EnrichingHandler::new(false);

        // Act
        let response = service(handler.clone(), no_publish())
            .oneshot(raw_record(-1, "2024-05-01T10:00:00Z"))
            .await;

        // Assert
        assert!(matches!(response.unwrap(), ConsumeResponse::Skip(_)));
        assert_eq!(handler.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_version_wider_than_32_bits_is_skipped() {
        // Arrange
        let handler = EnrichingHandler::new(false);

        // Act
        let response = service(handler.clone(), no_publish())
            .oneshot(raw_record(4_294_967_296, "2024-05-01T10:00:00Z"))
            .await;

        // Assert
        assert!(matches!(response.unwrap(), ConsumeResponse::Skip(_)));
        assert_eq!(handler.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_record_before_cutoff_is_skipped() {
        // Arrange
        let handler = EnrichingHandler::new(false);

        // Act
        let response = service(handler.clone(), no_publish())
            .oneshot(raw_record(1, "2023-12-31T23:59:59Z"))
            .await;

        // Assert
        assert!(matches!(response.unwrap(), ConsumeResponse::Skip(_)));
        assert_eq!(handler.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_record_exactly_at_cutoff_is_skipped() {
        // Arrange
        let handler = EnrichingHandler::new(false);

        // Act
        let response = service(handler.clone(), no_publish())
            .oneshot(raw_record(1, "2024-01-01T00:00:00Z"))
            .await;

        // Assert
        assert!(matches!(response.unwrap(), ConsumeResponse::Skip(_)));
    }

    #[tokio::test]
    async fn test_malformed_metadata_is_an_error() {
        // Arrange
        let handler = EnrichingHandler::new(false);
        let request = ConsumeRequest::new("raw-submissions.S1", Bytes::from_static(b"not json"), None);

        // Act
        let response = service(handler.clone(), no_publish()).oneshot(request).await;

        // Assert
        assert!(response.is_err());
        assert_eq!(handler.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_malformed_payload_with_supported_version_is_an_error() {
        // Arrange
        let handler = EnrichingHandler::new(false);
        let body = json!({
            "metadata": {"schemaVersion": 1, "correlationId": "corr-1"},
            "payload": {"submissionId": "S1"}
        });
        let request = ConsumeRequest::new(
            "raw-submissions.S1",
            Bytes::from(serde_json::to_vec(&body).unwrap()),
            None,
        );

        // Act
        let response = service(handler.clone(), no_publish()).oneshot(request).await;

        // Assert
        assert!(response.is_err());
    }

    #[tokio::test]
    async fn test_handler_failure_is_an_error_and_publishes_nothing() {
        // Arrange
        let handler = EnrichingHandler::new(true);

        // Act
        let response = service(handler.clone(), no_publish())
            .oneshot(raw_record(1, "2024-05-01T10:00:00Z"))
            .await;

        // Assert
        let err = response.unwrap_err();
        assert!(format!("{err:#}").contains("unavailable"));
        assert_eq!(handler.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_publish_failure_is_an_error() {
        // Arrange
        let mut publisher = MockJetStreamPublisher::new();
        publisher
            .expect_publish_with_headers()
            .returning(|_, _, _| Err(anyhow::anyhow!("no responders")));

        // Act
        let response = service(EnrichingHandler::new(false), publisher)
            .oneshot(raw_record(1, "2024-05-01T10:00:00Z"))
            .await;

        // Assert
        assert!(response.is_err());
    }
}
