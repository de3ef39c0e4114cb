use crate::health::StreamHealth;
use crate::nats::{
    ConsumeLoggingLayer, ConsumeLoggingService, ConsumeRequest, ConsumeResponse,
    ConsumeTracingLayer, ConsumeTracingService, JetStreamConsumer, StreamMessage,
};
use anyhow::{Context, Result};
use async_nats::jetstream::{self, consumer::AckPolicy, consumer::DeliverPolicy};
use bytes::Bytes;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tower::{Service, ServiceBuilder, ServiceExt};
use tracing::{debug, error, info, warn};

#[derive(Debug, Clone)]
pub struct ManagedStreamConfig {
    /// Stream (topic) to consume from
    pub stream_name: String,
    /// Durable consumer name, the offset is committed under it
    pub consumer_name: String,
    /// How long a single fetch waits for a record
    pub fetch_max_wait: Duration,
    /// Pause after a failed fetch before trying again
    pub fetch_retry_delay: Duration,
}

impl ManagedStreamConfig {
    pub fn new(stream_name: impl Into<String>, consumer_name: impl Into<String>) -> Self {
        Self {
            stream_name: stream_name.into(),
            consumer_name: consumer_name.into(),
            fetch_max_wait: Duration::from_secs(5),
            fetch_retry_delay: Duration::from_secs(1),
        }
    }

    fn consumer_config(&self) -> jetstream::consumer::pull::Config {
        jetstream::consumer::pull::Config {
            name: Some(self.consumer_name.clone()),
            durable_name: Some(self.consumer_name.clone()),
            filter_subject: format!("{}.*", self.stream_name),
            ack_policy: AckPolicy::Explicit,
            deliver_policy: DeliverPolicy::All,
            // One record in flight keeps per-key order
            max_ack_pending: 1,
            ..Default::default()
        }
    }
}

/// Long-running consumer driving one stage with crash-only semantics.
///
/// Records are fetched one at a time and pushed through the stage service.
/// Both `Ack` and `Skip` commit the record. A service error leaves the record
/// uncommitted, marks the stream as failed and ends `run` with that error, so
/// the record is redelivered to whoever resumes the durable consumer.
pub struct ManagedStream<S> {
    jetstream: Arc<dyn JetStreamConsumer>,
    config: ManagedStreamConfig,
    health: Arc<StreamHealth>,
    service: ConsumeTracingService<ConsumeLoggingService<S>>,
}

impl<S> ManagedStream<S>
where
    S: Service<ConsumeRequest, Response = ConsumeResponse, Error = anyhow::Error>
        + Clone
        + Send
        + 'static,
    S::Future: Send + 'static,
{
    pub fn new(
        jetstream: Arc<dyn JetStreamConsumer>,
        config: ManagedStreamConfig,
        health: Arc<StreamHealth>,
        service: S,
    ) -> Self {
        let service = ServiceBuilder::new()
            .layer(ConsumeTracingLayer::new(config.consumer_name.clone()))
            .layer(ConsumeLoggingLayer::new())
            .service(service);

        Self {
            jetstream,
            config,
            health,
            service,
        }
    }

    pub fn health(&self) -> Arc<StreamHealth> {
        Arc::clone(&self.health)
    }

    /// Consume until cancelled or until a record fails.
    pub async fn run(mut self, ctx: CancellationToken) -> Result<()> {
        self.health.mark_starting();

        let created = tokio::select! {
            biased;
            _ = ctx.cancelled() => {
                self.health.mark_stopped();
                return Ok(());
            }
            result = self.jetstream.create_consumer(self.config.consumer_config(), &self.config.stream_name) => result,
        };

        let consumer = match created {
            Ok(consumer) => consumer,
            Err(e) => {
                self.health.mark_failed();
                return Err(e).with_context(|| {
                    format!(
                        "failed to bind consumer {} on {}",
                        self.config.consumer_name, self.config.stream_name
                    )
                });
            }
        };

        self.health.mark_running();
        info!(
            stream = %self.config.stream_name,
            consumer = %self.config.consumer_name,
            "stream consumer running"
        );

        loop {
            let fetched = tokio::select! {
                biased;
                _ = ctx.cancelled() => break,
                result = consumer.fetch_messages(1, self.config.fetch_max_wait) => result,
            };

            let messages = match fetched {
                Ok(messages) => messages,
                Err(e) => {
                    warn!(
                        stream = %self.config.stream_name,
                        consumer = %self.config.consumer_name,
                        error = %e,
                        "fetch failed, retrying"
                    );
                    tokio::select! {
                        biased;
                        _ = ctx.cancelled() => break,
                        _ = tokio::time::sleep(self.config.fetch_retry_delay) => continue,
                    }
                }
            };

            // Processing is not interrupted by shutdown; the drain timeout bounds it
            for message in messages {
                if let Err(e) = self.process(message.as_ref()).await {
                    self.health.mark_failed();
                    error!(
                        stream = %self.config.stream_name,
                        consumer = %self.config.consumer_name,
                        subject = %message.subject(),
                        error = %e,
                        "record processing failed, stopping consumer without committing"
                    );
                    return Err(e);
                }
            }
        }

        self.health.mark_stopped();
        info!(
            stream = %self.config.stream_name,
            consumer = %self.config.consumer_name,
            "stream consumer stopped"
        );
        Ok(())
    }

    async fn process(&mut self, message: &dyn StreamMessage) -> Result<()> {
        let request = ConsumeRequest::new(
            message.subject(),
            Bytes::copy_from_slice(message.payload()),
            message.headers().cloned(),
        );

        let response = self.service.ready().await?.call(request).await?;
        debug!(subject = %message.subject(), outcome = response.outcome(), "committing record");

        if let Err(e) = message.ack().await {
            // The record is handled; a lost ack only means it is redelivered
            warn!(subject = %message.subject(), error = %e, "failed to commit record");
        }
        Ok(())
    }
}
