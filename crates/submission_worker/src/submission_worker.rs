use crate::domain::{
    CleanupService, JournalingService, NotificationSettings, PreprocessingService, StageHandler,
    SummaryRenderer,
};
use crate::nats::{EnvelopeProducer, StageConsumerService};
use common::{
    ArchivalGateway, DocumentStore, HealthRegistry, JetStreamConsumer, JetStreamPublisher,
    ManagedStream, ManagedStreamConfig, PipelineTopics, ReplayFilter, StreamHealth, Topic,
};
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::info;

pub type StageFuture = Pin<Box<dyn Future<Output = anyhow::Result<()>> + Send>>;

/// A stage ready to hand to the process runner.
pub type StageProcess = Box<dyn FnOnce(CancellationToken) -> StageFuture + Send>;

#[derive(Debug, Clone)]
pub struct SubmissionWorkerConfig {
    pub topics: PipelineTopics,
    /// Durable consumers are named `<prefix>-<stage>`
    pub consumer_prefix: String,
    pub fetch_max_wait: Duration,
    pub fetch_retry_delay: Duration,
    pub replay_filter: ReplayFilter,
    pub unready_after_stream_stopped_in: Duration,
    pub publish_dedup_enabled: bool,
    pub notification: NotificationSettings,
}

/// Collaborators shared by all stages.
pub struct SubmissionWorkerDeps {
    pub consumer: Arc<dyn JetStreamConsumer>,
    pub publisher: Arc<dyn JetStreamPublisher>,
    pub document_store: Arc<dyn DocumentStore>,
    pub archival_gateway: Arc<dyn ArchivalGateway>,
    pub renderer: Arc<dyn SummaryRenderer>,
}

/// The three pipeline stages, each behind its own managed stream.
pub struct SubmissionWorker {
    stages: Vec<(String, StageProcess)>,
    health: HealthRegistry,
}

impl SubmissionWorker {
    pub fn new(deps: SubmissionWorkerDeps, config: SubmissionWorkerConfig) -> Self {
        info!(
            consumer_prefix = %config.consumer_prefix,
            received_after = %config.replay_filter.received_after(),
            "initializing submission worker"
        );

        let mut worker = Self {
            stages: Vec::new(),
            health: HealthRegistry::new(),
        };

        let topics = &config.topics;
        worker.add_stage(
            &deps,
            &config,
            PreprocessingService::new(deps.document_store.clone(), deps.renderer.clone()),
            topics.raw_submissions.clone(),
            topics.enriched_submissions.clone(),
        );
        worker.add_stage(
            &deps,
            &config,
            JournalingService::new(deps.archival_gateway.clone()),
            topics.enriched_submissions.clone(),
            topics.cleanup_signal.clone(),
        );
        worker.add_stage(
            &deps,
            &config,
            CleanupService::new(deps.document_store.clone(), config.notification.clone()),
            topics.cleanup_signal.clone(),
            topics.notification_events.clone(),
        );

        worker
    }

    fn add_stage<H: StageHandler>(
        &mut self,
        deps: &SubmissionWorkerDeps,
        config: &SubmissionWorkerConfig,
        handler: H,
        input: Topic<H::Input>,
        output: Topic<H::Output>,
    ) {
        let name = handler.name();
        let producer = EnvelopeProducer::new(deps.publisher.clone(), output)
            .with_dedup(config.publish_dedup_enabled);
        let stream_name = input.name().to_string();
        let service = StageConsumerService::new(
            Arc::new(handler),
            input,
            Arc::new(producer),
            config.replay_filter,
        );

        let health = Arc::new(StreamHealth::new(name, config.unready_after_stream_stopped_in));
        self.health.register(health.clone());

        let mut stream_config = ManagedStreamConfig::new(
            stream_name,
            format!("{}-{}", config.consumer_prefix, name),
        );
        stream_config.fetch_max_wait = config.fetch_max_wait;
        stream_config.fetch_retry_delay = config.fetch_retry_delay;

        let stream = ManagedStream::new(deps.consumer.clone(), stream_config, health, service);
        let process: StageProcess =
            Box::new(move |ctx| -> StageFuture { Box::pin(stream.run(ctx)) });
        self.stages.push((name.to_string(), process));
    }

    /// Health of every stage, for the HTTP probes.
    pub fn health(&self) -> HealthRegistry {
        self.health.clone()
    }

    pub fn into_runner_processes(self) -> Vec<(String, StageProcess)> {
        self.stages
    }
}
