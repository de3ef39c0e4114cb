use async_trait::async_trait;
use common::{DomainResult, Keyed, ReceivedAt};
use serde::de::DeserializeOwned;
use serde::Serialize;

/// One consume-transform-produce step of the pipeline.
///
/// A handler only sees records that passed the replay filter. Any error it
/// returns is a stage failure: the input stays uncommitted and the stage stops.
#[async_trait]
pub trait StageHandler: Send + Sync + 'static {
    type Input: DeserializeOwned + Keyed + ReceivedAt + Send + Sync + 'static;
    type Output: Serialize + Keyed + Send + Sync + 'static;

    /// Short stage name used in logs and consumer names
    fn name(&self) -> &'static str;

    async fn handle(&self, input: Self::Input, correlation_id: &str)
        -> DomainResult<Self::Output>;
}
