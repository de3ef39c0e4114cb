//! Runs the three stages end to end against an in-memory broker that mimics
//! durable JetStream pull consumers: one record in flight per consumer, and a
//! record only moves the consumer forward once acknowledged.

use anyhow::Result;
use async_nats::jetstream;
use async_nats::HeaderMap;
use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, TimeZone, Utc};
use common::{
    Applicant, ArchivalGateway, ArchivalRequest, CleanupSignal, Document, DocumentId,
    DocumentOwner, DocumentStore, DomainError, DomainResult, EnrichedSubmission,
    HealthRegistry, JetStreamConsumer, JetStreamPublisher, JournalId, Metadata,
    NotificationEvent, PipelineTopics, PullConsumer, ReplayFilter, StreamMessage, StreamState,
    Submission, Topic, CORRELATION_ID_HEADER,
};
use serde::de::DeserializeOwned;
use serde_json::json;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use submission_worker::{
    NotificationSettings, SubmissionWorker, SubmissionWorkerConfig, SubmissionWorkerDeps,
    TextSummaryRenderer,
};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

// ---------------------------------------------------------------------------
// In-memory broker

#[derive(Clone)]
struct StoredMessage {
    subject: String,
    headers: HeaderMap,
    payload: Bytes,
}

#[derive(Default)]
struct BrokerState {
    streams: HashMap<String, Vec<StoredMessage>>,
    committed: HashMap<String, usize>,
}

#[derive(Clone, Default)]
struct InMemoryBroker {
    state: Arc<Mutex<BrokerState>>,
}

impl InMemoryBroker {
    fn messages(&self, stream: &str) -> Vec<StoredMessage> {
        self.state
            .lock()
            .unwrap()
            .streams
            .get(stream)
            .cloned()
            .unwrap_or_default()
    }

    fn committed(&self, consumer: &str) -> usize {
        self.state
            .lock()
            .unwrap()
            .committed
            .get(consumer)
            .copied()
            .unwrap_or(0)
    }

    fn decoded<T: DeserializeOwned>(&self, topic: &Topic<T>) -> Vec<(Metadata, T)> {
        self.messages(topic.name())
            .into_iter()
            .map(|m| {
                let envelope = topic.decode(&m.payload).unwrap();
                (envelope.metadata, envelope.payload)
            })
            .collect()
    }

    async fn publish_envelope<T: serde::Serialize>(
        &self,
        topic: &Topic<T>,
        key: &str,
        metadata: &Metadata,
        record: &T,
    ) {
        let payload = topic.encode(metadata, record).unwrap();
        self.publish_with_headers(topic.subject_for(key).unwrap(), HeaderMap::new(), payload)
            .await
            .unwrap();
    }
}

#[async_trait]
impl JetStreamPublisher for InMemoryBroker {
    async fn get_stream(&self, stream_name: &str) -> Result<()> {
        if self.state.lock().unwrap().streams.contains_key(stream_name) {
            Ok(())
        } else {
            Err(anyhow::anyhow!("stream not found"))
        }
    }

    async fn create_stream(&self, config: jetstream::stream::Config) -> Result<()> {
        self.state
            .lock()
            .unwrap()
            .streams
            .entry(config.name)
            .or_default();
        Ok(())
    }

    async fn publish_with_headers(
        &self,
        subject: String,
        headers: HeaderMap,
        payload: Bytes,
    ) -> Result<()> {
        let stream = subject.split('.').next().unwrap_or_default().to_string();
        self.state
            .lock()
            .unwrap()
            .streams
            .entry(stream)
            .or_default()
            .push(StoredMessage {
                subject,
                headers,
                payload,
            });
        Ok(())
    }
}

#[async_trait]
impl JetStreamConsumer for InMemoryBroker {
    async fn create_consumer(
        &self,
        config: jetstream::consumer::pull::Config,
        stream_name: &str,
    ) -> Result<Box<dyn PullConsumer>> {
        Ok(Box::new(InMemoryPullConsumer {
            broker: self.clone(),
            stream: stream_name.to_string(),
            consumer: config.durable_name.unwrap_or_default(),
        }))
    }
}

struct InMemoryPullConsumer {
    broker: InMemoryBroker,
    stream: String,
    consumer: String,
}

#[async_trait]
impl PullConsumer for InMemoryPullConsumer {
    async fn fetch_messages(
        &self,
        _max_messages: usize,
        expires: Duration,
    ) -> Result<Vec<Box<dyn StreamMessage>>> {
        let next = {
            let state = self.broker.state.lock().unwrap();
            let offset = state.committed.get(&self.consumer).copied().unwrap_or(0);
            state
                .streams
                .get(&self.stream)
                .and_then(|messages| messages.get(offset))
                .cloned()
                .map(|message| (offset, message))
        };

        match next {
            Some((offset, message)) => Ok(vec![Box::new(InMemoryMessage {
                broker: self.broker.clone(),
                consumer: self.consumer.clone(),
                offset,
                message,
            })]),
            None => {
                tokio::time::sleep(expires.min(Duration::from_millis(5))).await;
                Ok(vec![])
            }
        }
    }
}

struct InMemoryMessage {
    broker: InMemoryBroker,
    consumer: String,
    offset: usize,
    message: StoredMessage,
}

#[async_trait]
impl StreamMessage for InMemoryMessage {
    fn subject(&self) -> &str {
        &self.message.subject
    }

    fn payload(&self) -> &[u8] {
        &self.message.payload
    }

    fn headers(&self) -> Option<&HeaderMap> {
        Some(&self.message.headers)
    }

    async fn ack(&self) -> Result<()> {
        let mut state = self.broker.state.lock().unwrap();
        let committed = state.committed.entry(self.consumer.clone()).or_default();
        if *committed == self.offset {
            *committed += 1;
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Collaborators

#[derive(Default)]
struct InMemoryDocumentStore {
    documents: Mutex<HashMap<DocumentId, String>>,
    next_id: AtomicUsize,
    fail_deletes: AtomicBool,
}

impl InMemoryDocumentStore {
    fn len(&self) -> usize {
        self.documents.lock().unwrap().len()
    }
}

#[async_trait]
impl DocumentStore for InMemoryDocumentStore {
    async fn store(&self, document: Document, _correlation_id: &str) -> DomainResult<DocumentId> {
        let id = format!("doc-{}", self.next_id.fetch_add(1, Ordering::SeqCst));
        self.documents
            .lock()
            .unwrap()
            .insert(id.clone(), document.owner.0);
        Ok(id)
    }

    async fn delete(
        &self,
        document_ids: Vec<DocumentId>,
        owner: &DocumentOwner,
        _correlation_id: &str,
    ) -> DomainResult<()> {
        if self.fail_deletes.load(Ordering::SeqCst) {
            return Err(DomainError::DocumentDeletionFailed {
                failed: document_ids.len(),
                total: document_ids.len(),
                reason: "store unavailable".to_string(),
            });
        }
        let mut documents = self.documents.lock().unwrap();
        for id in document_ids {
            if documents.get(&id).map(String::as_str) == Some(owner.as_str()) {
                documents.remove(&id);
            }
        }
        Ok(())
    }
}

#[derive(Default)]
struct FlakyArchivalGateway {
    failing: AtomicBool,
    calls: AtomicUsize,
    requests: Mutex<Vec<ArchivalRequest>>,
}

#[async_trait]
impl ArchivalGateway for FlakyArchivalGateway {
    async fn file(&self, request: ArchivalRequest, _correlation_id: &str) -> DomainResult<JournalId> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.failing.load(Ordering::SeqCst) {
            return Err(DomainError::ArchivalGatewayStatus {
                status: 503,
                message: "service unavailable".to_string(),
            });
        }
        let journal_id = JournalId(format!("J-{}", request.submission_id));
        self.requests.lock().unwrap().push(request);
        Ok(journal_id)
    }
}

// ---------------------------------------------------------------------------
// Harness

const GRACE: Duration = Duration::from_millis(100);

fn cutoff() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap()
}

fn submission(id: &str, received_at: DateTime<Utc>, attachments: &[&str]) -> Submission {
    Submission {
        submission_id: id.to_string(),
        received_at,
        language: "nb".to_string(),
        applicant: Applicant {
            national_id: "01010112345".to_string(),
            first_name: "Kari".to_string(),
            middle_name: None,
            last_name: "Nordmann".to_string(),
            actor_id: "actor-1".to_string(),
        },
        attachment_ids: attachments.iter().map(|a| a.to_string()).collect(),
        form: json!({"hours": 20}),
    }
}

fn received() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 5, 1, 10, 0, 0).unwrap()
}

struct Harness {
    broker: InMemoryBroker,
    store: Arc<InMemoryDocumentStore>,
    gateway: Arc<FlakyArchivalGateway>,
    topics: PipelineTopics,
}

impl Harness {
    fn new() -> Self {
        Self {
            broker: InMemoryBroker::default(),
            store: Arc::new(InMemoryDocumentStore::default()),
            gateway: Arc::new(FlakyArchivalGateway::default()),
            topics: PipelineTopics::default(),
        }
    }

    fn start(&self) -> RunningPipeline {
        let deps = SubmissionWorkerDeps {
            consumer: Arc::new(self.broker.clone()),
            publisher: Arc::new(self.broker.clone()),
            document_store: self.store.clone(),
            archival_gateway: self.gateway.clone(),
            renderer: Arc::new(TextSummaryRenderer::new()),
        };
        let config = SubmissionWorkerConfig {
            topics: self.topics.clone(),
            consumer_prefix: "test".to_string(),
            fetch_max_wait: Duration::from_millis(5),
            fetch_retry_delay: Duration::from_millis(5),
            replay_filter: ReplayFilter::new(cutoff()),
            unready_after_stream_stopped_in: GRACE,
            publish_dedup_enabled: false,
            notification: NotificationSettings::default(),
        };

        let worker = SubmissionWorker::new(deps, config);
        let health = worker.health();
        let token = CancellationToken::new();
        let tasks = worker
            .into_runner_processes()
            .into_iter()
            .map(|(name, process)| (name, tokio::spawn(process(token.clone()))))
            .collect();

        RunningPipeline {
            token,
            tasks,
            health,
        }
    }

    async fn submit(&self, submission: &Submission, version: i64) {
        let metadata = Metadata::new(version, format!("corr-{}", submission.submission_id));
        self.broker
            .publish_envelope(
                &self.topics.raw_submissions,
                &submission.submission_id,
                &metadata,
                submission,
            )
            .await;
    }

    fn enriched(&self) -> Vec<(Metadata, EnrichedSubmission)> {
        self.broker.decoded(&self.topics.enriched_submissions)
    }

    fn signals(&self) -> Vec<(Metadata, CleanupSignal)> {
        self.broker.decoded(&self.topics.cleanup_signal)
    }

    fn notifications(&self) -> Vec<(Metadata, NotificationEvent)> {
        self.broker.decoded(&self.topics.notification_events)
    }
}

struct RunningPipeline {
    token: CancellationToken,
    tasks: Vec<(String, JoinHandle<Result<()>>)>,
    health: HealthRegistry,
}

impl RunningPipeline {
    /// Stop every stage and report which ones ended with an error.
    async fn stop(self) -> Vec<String> {
        self.token.cancel();
        let mut failed = Vec::new();
        for (name, task) in self.tasks {
            if task.await.unwrap().is_err() {
                failed.push(name);
            }
        }
        failed
    }
}

async fn eventually(what: &str, mut condition: impl FnMut() -> bool) {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    while !condition() {
        assert!(
            tokio::time::Instant::now() < deadline,
            "timed out waiting for {what}"
        );
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
}

// ---------------------------------------------------------------------------
// Tests

#[tokio::test]
async fn test_happy_path_produces_one_record_per_stage() {
    let harness = Harness::new();
    let pipeline = harness.start();

    harness.submit(&submission("S1", received(), &[]), 1).await;
    eventually("notification", || harness.notifications().len() == 1).await;
    eventually("ready", || pipeline.health.is_ready()).await;

    let failed = pipeline.stop().await;
    assert!(failed.is_empty());

    let enriched = harness.enriched();
    let signals = harness.signals();
    let notifications = harness.notifications();
    assert_eq!(enriched.len(), 1);
    assert_eq!(signals.len(), 1);
    assert_eq!(notifications.len(), 1);

    assert_eq!(enriched[0].1.submission.submission_id, "S1");
    assert_eq!(signals[0].1.journaled_record.journal_id, "J-S1");
    assert_eq!(notifications[0].1.grouping_id, "S1");

    // Same correlation id on every hop, in metadata and headers
    for metadata in [&enriched[0].0, &signals[0].0, &notifications[0].0] {
        assert_eq!(metadata.correlation_id, "corr-S1");
    }
    for message in harness.broker.messages(harness.topics.notification_events.name()) {
        assert_eq!(message.subject, "notification-events.S1");
        assert_eq!(
            message.headers.get(CORRELATION_ID_HEADER).map(|v| v.as_str()),
            Some("corr-S1")
        );
    }

    // Generated documents are cleaned up after journaling
    assert_eq!(harness.store.len(), 0);
}

#[tokio::test]
async fn test_submission_before_cutoff_produces_nothing() {
    let harness = Harness::new();
    let pipeline = harness.start();

    let old = Utc.with_ymd_and_hms(2023, 6, 1, 0, 0, 0).unwrap();
    harness.submit(&submission("OLD", old, &["att-1"]), 1).await;
    eventually("filtered record committed", || {
        harness.broker.committed("test-preprocessing") == 1
    })
    .await;

    assert!(pipeline.stop().await.is_empty());
    assert!(harness.enriched().is_empty());
    assert!(harness.signals().is_empty());
    assert!(harness.notifications().is_empty());
    assert_eq!(harness.store.len(), 0);
}

#[tokio::test]
async fn test_unsupported_version_produces_nothing() {
    let harness = Harness::new();
    let pipeline = harness.start();

    harness.submit(&submission("V2", received(), &[]), 2).await;
    eventually("filtered record committed", || {
        harness.broker.committed("test-preprocessing") == 1
    })
    .await;

    // A later valid record still flows, the filtered one never does
    harness.submit(&submission("S1", received(), &[]), 1).await;
    eventually("notification", || harness.notifications().len() == 1).await;

    assert!(pipeline.stop().await.is_empty());
    assert_eq!(harness.enriched().len(), 1);
    assert_eq!(harness.enriched()[0].1.submission.submission_id, "S1");
    assert_eq!(harness.notifications()[0].1.grouping_id, "S1");
}

#[tokio::test]
async fn test_two_attachments_yield_three_bundles() {
    let harness = Harness::new();
    let pipeline = harness.start();

    harness
        .submit(&submission("S1", received(), &["att-1", "att-2"]), 1)
        .await;
    eventually("enriched submission", || harness.enriched().len() == 1).await;
    pipeline.stop().await;

    let bundles = &harness.enriched()[0].1.document_bundles;
    assert_eq!(bundles.len(), 3);
    assert_eq!(bundles[0].len(), 2);
    assert_eq!(bundles[1], vec!["att-1".to_string()]);
    assert_eq!(bundles[2], vec!["att-2".to_string()]);
}

#[tokio::test]
async fn test_gateway_outage_crashes_journaling_until_restart() {
    let harness = Harness::new();
    harness.gateway.failing.store(true, Ordering::SeqCst);
    let pipeline = harness.start();

    harness.submit(&submission("S1", received(), &[]), 1).await;

    // Journaling fails: not ready at once, unhealthy after the grace window
    eventually("journaling failure", || {
        pipeline
            .health
            .snapshot()
            .iter()
            .any(|s| s.name == "journaling" && s.state == StreamState::Error)
    })
    .await;
    assert!(!pipeline.health.is_ready());
    eventually("unhealthy after grace", || !pipeline.health.is_healthy()).await;
    assert!(harness.signals().is_empty());
    assert_eq!(harness.broker.committed("test-journaling"), 0);

    let failed = pipeline.stop().await;
    assert_eq!(failed, vec!["journaling".to_string()]);

    // Gateway recovers, the process restarts and replays the uncommitted record
    harness.gateway.failing.store(false, Ordering::SeqCst);
    let restarted = harness.start();
    eventually("notification after restart", || {
        harness.notifications().len() == 1
    })
    .await;
    assert!(restarted.stop().await.is_empty());

    assert_eq!(harness.enriched().len(), 1);
    assert_eq!(harness.signals().len(), 1);
    assert_eq!(harness.signals()[0].1.journaled_record.journal_id, "J-S1");
    assert!(harness.gateway.calls.load(Ordering::SeqCst) >= 2);
}

#[tokio::test]
async fn test_cleanup_failure_still_notifies() {
    let harness = Harness::new();
    harness.store.fail_deletes.store(true, Ordering::SeqCst);
    let pipeline = harness.start();

    harness.submit(&submission("S1", received(), &["att-1"]), 1).await;
    eventually("notification", || harness.notifications().len() == 1).await;

    assert!(pipeline.stop().await.is_empty());
    assert_eq!(harness.notifications()[0].1.grouping_id, "S1");
    // The generated documents are left behind
    assert_eq!(harness.store.len(), 2);
}

#[tokio::test]
async fn test_replayed_cleanup_signal_notifies_twice_with_same_grouping_id() {
    let harness = Harness::new();
    let pipeline = harness.start();

    harness.submit(&submission("S1", received(), &[]), 1).await;
    eventually("signal", || harness.signals().len() == 1).await;

    // Simulate redelivery of the same signal after a restart
    let (metadata, signal) = harness.signals().remove(0);
    harness
        .broker
        .publish_envelope(&harness.topics.cleanup_signal, "S1", &metadata, &signal)
        .await;
    eventually("two notifications", || harness.notifications().len() == 2).await;
    assert!(pipeline.stop().await.is_empty());

    let notifications = harness.notifications();
    assert_eq!(notifications[0].1.grouping_id, "S1");
    assert_eq!(notifications[1].1.grouping_id, "S1");
    assert_ne!(notifications[0].1.event_id, notifications[1].1.event_id);
}

#[tokio::test]
async fn test_order_is_preserved_per_submission_across_stages() {
    let harness = Harness::new();
    let pipeline = harness.start();

    for id in ["A", "B", "C"] {
        harness.submit(&submission(id, received(), &[]), 1).await;
    }
    eventually("three notifications", || harness.notifications().len() == 3).await;
    assert!(pipeline.stop().await.is_empty());

    let order: Vec<String> = harness
        .notifications()
        .into_iter()
        .map(|(_, event)| event.grouping_id)
        .collect();
    assert_eq!(order, vec!["A", "B", "C"]);
    let filed: Vec<String> = harness
        .gateway
        .requests
        .lock()
        .unwrap()
        .iter()
        .map(|r| r.submission_id.clone())
        .collect();
    assert_eq!(filed, vec!["A", "B", "C"]);
}
