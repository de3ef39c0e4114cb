use crate::nats::object_store::NatsObjectBucket;
use crate::nats::traits::{
    JetStreamConsumer, JetStreamPublisher, ObjectBucket, PullConsumer, StreamMessage,
};
use anyhow::{anyhow, Context, Result};
use async_nats::jetstream::{self, object_store, stream::Config as StreamConfig};
use async_nats::HeaderMap;
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Connection to a NATS server with JetStream enabled.
///
/// Each pipeline topic is backed by one stream whose subjects are
/// `<topic>.<submissionId>`, so the record key travels in the last subject token.
pub struct NatsClient {
    client: async_nats::Client,
    jetstream: jetstream::Context,
}

impl NatsClient {
    pub async fn connect(url: &str, timeout: Duration) -> Result<Self> {
        info!(url = %url, timeout_ms = timeout.as_millis(), "connecting to NATS");

        let client = async_nats::ConnectOptions::new()
            .connection_timeout(timeout)
            .connect(url)
            .await
            .context("failed to connect to NATS")?;

        let jetstream = jetstream::new(client.clone());

        info!("connected to NATS");
        Ok(Self { client, jetstream })
    }

    /// Create the stream backing a topic unless it already exists.
    pub async fn ensure_stream(&self, topic: &str) -> Result<()> {
        if self.jetstream.get_stream(topic).await.is_ok() {
            debug!(stream = %topic, "stream already exists");
            return Ok(());
        }

        let stream_config = StreamConfig {
            name: topic.to_string(),
            subjects: vec![format!("{topic}.*")],
            description: Some(format!("benefit submission topic {topic}")),
            ..Default::default()
        };

        self.jetstream
            .create_stream(stream_config)
            .await
            .with_context(|| format!("failed to create stream {topic}"))?;
        info!(stream = %topic, "created stream");

        Ok(())
    }

    pub fn create_consumer_client(&self) -> Arc<dyn JetStreamConsumer> {
        Arc::new(NatsJetStreamConsumer::new(self.jetstream.clone()))
    }

    pub fn create_publisher_client(&self) -> Arc<dyn JetStreamPublisher> {
        Arc::new(NatsJetStreamPublisher::new(self.jetstream.clone()))
    }

    /// Open (creating on first use) the object store bucket holding documents.
    pub async fn object_bucket(&self, bucket: &str) -> Result<Arc<dyn ObjectBucket>> {
        let store = match self.jetstream.get_object_store(bucket).await {
            Ok(store) => store,
            Err(_) => {
                info!(bucket = %bucket, "creating object store bucket");
                self.jetstream
                    .create_object_store(object_store::Config {
                        bucket: bucket.to_string(),
                        description: Some("benefit submission documents".to_string()),
                        ..Default::default()
                    })
                    .await
                    .with_context(|| format!("failed to create object store {bucket}"))?
            }
        };

        Ok(Arc::new(NatsObjectBucket::new(store)))
    }

    pub async fn close(self) -> Result<()> {
        info!("closing NATS connection");
        self.client
            .drain()
            .await
            .context("failed to drain NATS connection")
    }
}

pub struct NatsJetStreamConsumer {
    context: jetstream::Context,
}

impl NatsJetStreamConsumer {
    pub fn new(context: jetstream::Context) -> Self {
        Self { context }
    }
}

#[async_trait]
impl JetStreamConsumer for NatsJetStreamConsumer {
    async fn create_consumer(
        &self,
        config: jetstream::consumer::pull::Config,
        stream_name: &str,
    ) -> Result<Box<dyn PullConsumer>> {
        let consumer = self
            .context
            .create_consumer_on_stream(config, stream_name)
            .await
            .with_context(|| format!("failed to create consumer on stream {stream_name}"))?;

        Ok(Box::new(NatsPullConsumer { consumer }))
    }
}

pub struct NatsPullConsumer {
    consumer: jetstream::consumer::PullConsumer,
}

#[async_trait]
impl PullConsumer for NatsPullConsumer {
    async fn fetch_messages(
        &self,
        max_messages: usize,
        expires: Duration,
    ) -> Result<Vec<Box<dyn StreamMessage>>> {
        use futures::StreamExt;

        let mut messages = self
            .consumer
            .fetch()
            .max_messages(max_messages)
            .expires(expires)
            .messages()
            .await
            .context("failed to fetch messages")?;

        let mut result: Vec<Box<dyn StreamMessage>> = Vec::new();
        while let Some(message) = messages.next().await {
            match message {
                Ok(message) => result.push(Box::new(NatsStreamMessage(message))),
                // Anything after a broken delivery is redelivered later
                Err(e) => {
                    warn!(error = %e, "error receiving message");
                    break;
                }
            }
        }
        Ok(result)
    }
}

struct NatsStreamMessage(jetstream::Message);

#[async_trait]
impl StreamMessage for NatsStreamMessage {
    fn subject(&self) -> &str {
        self.0.subject.as_str()
    }

    fn payload(&self) -> &[u8] {
        &self.0.payload
    }

    fn headers(&self) -> Option<&HeaderMap> {
        self.0.headers.as_ref()
    }

    async fn ack(&self) -> Result<()> {
        self.0
            .ack()
            .await
            .map_err(|e| anyhow!("failed to acknowledge message: {e}"))
    }
}

pub struct NatsJetStreamPublisher {
    context: jetstream::Context,
}

impl NatsJetStreamPublisher {
    pub fn new(context: jetstream::Context) -> Self {
        Self { context }
    }
}

#[async_trait]
impl JetStreamPublisher for NatsJetStreamPublisher {
    async fn get_stream(&self, stream_name: &str) -> Result<()> {
        self.context
            .get_stream(stream_name)
            .await
            .with_context(|| format!("failed to get stream {stream_name}"))?;
        Ok(())
    }

    async fn create_stream(&self, config: jetstream::stream::Config) -> Result<()> {
        self.context
            .create_stream(config)
            .await
            .context("failed to create stream")?;
        Ok(())
    }

    async fn publish_with_headers(
        &self,
        subject: String,
        headers: HeaderMap,
        payload: bytes::Bytes,
    ) -> Result<()> {
        let ack = self
            .context
            .publish_with_headers(subject, headers, payload)
            .await
            .context("failed to publish message to JetStream")?;

        ack.await
            .context("failed to receive JetStream acknowledgment")?;
        Ok(())
    }
}
