use anyhow::Result;
use async_nats::{jetstream, HeaderMap};
use async_trait::async_trait;
use std::collections::HashMap;

/// Trait for JetStream consumer operations
/// Abstracts the operations needed to create and use a NATS JetStream consumer
#[cfg_attr(any(test, feature = "testing"), mockall::automock)]
#[async_trait]
pub trait JetStreamConsumer: Send + Sync {
    /// Create (or bind to) a durable pull consumer on a stream
    async fn create_consumer(
        &self,
        config: jetstream::consumer::pull::Config,
        stream_name: &str,
    ) -> Result<Box<dyn PullConsumer>>;
}

/// Trait for pull consumer operations
#[cfg_attr(any(test, feature = "testing"), mockall::automock)]
#[async_trait]
pub trait PullConsumer: Send + Sync {
    /// Fetch up to `max_messages`, waiting at most `expires` for them to arrive
    async fn fetch_messages(
        &self,
        max_messages: usize,
        expires: std::time::Duration,
    ) -> Result<Vec<Box<dyn StreamMessage>>>;
}

/// A record delivered by a pull consumer.
///
/// Acknowledging commits the record; a record that is never acknowledged is
/// redelivered to the durable consumer.
#[async_trait]
pub trait StreamMessage: Send + Sync {
    fn subject(&self) -> &str;
    fn payload(&self) -> &[u8];
    fn headers(&self) -> Option<&HeaderMap>;
    async fn ack(&self) -> Result<()>;
}

/// Trait for JetStream publisher operations
/// Abstracts the operations needed to create streams and publish messages
#[cfg_attr(any(test, feature = "testing"), mockall::automock)]
#[async_trait]
pub trait JetStreamPublisher: Send + Sync {
    /// Get an existing stream by name
    async fn get_stream(&self, stream_name: &str) -> Result<()>;

    /// Create a new stream with the given configuration
    async fn create_stream(&self, config: jetstream::stream::Config) -> Result<()>;

    /// Publish a message with headers and await the JetStream acknowledgment
    async fn publish_with_headers(
        &self,
        subject: String,
        headers: HeaderMap,
        payload: bytes::Bytes,
    ) -> Result<()>;
}

/// Minimal key/value blob bucket used by the object-store document store.
#[cfg_attr(any(test, feature = "testing"), mockall::automock)]
#[async_trait]
pub trait ObjectBucket: Send + Sync {
    async fn put(
        &self,
        key: &str,
        content: bytes::Bytes,
        metadata: HashMap<String, String>,
    ) -> Result<()>;

    /// Metadata of an object, `None` if it does not exist
    async fn metadata(&self, key: &str) -> Result<Option<HashMap<String, String>>>;

    async fn delete(&self, key: &str) -> Result<()>;
}
