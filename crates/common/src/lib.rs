mod codec;
mod domain;
mod health;
mod http;
mod nats;
mod replay_filter;
pub mod telemetry;
mod topic;

pub use codec::*;
pub use domain::*;
pub use health::*;
pub use http::*;
pub use nats::*;
pub use replay_filter::*;
pub use topic::*;

// Re-export mocks when testing feature is enabled
#[cfg(any(test, feature = "testing"))]
pub use domain::MockArchivalGateway;
#[cfg(any(test, feature = "testing"))]
pub use domain::MockDocumentStore;
#[cfg(any(test, feature = "testing"))]
pub use health::MockDependencyCheck;
#[cfg(any(test, feature = "testing"))]
pub use nats::MockJetStreamConsumer;
#[cfg(any(test, feature = "testing"))]
pub use nats::MockJetStreamPublisher;
#[cfg(any(test, feature = "testing"))]
pub use nats::MockObjectBucket;
#[cfg(any(test, feature = "testing"))]
pub use nats::MockPullConsumer;
