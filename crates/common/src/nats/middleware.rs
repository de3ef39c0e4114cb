mod consume_logging;
mod consume_tracing;
mod publish_logging;
mod publish_tracing;
mod publisher;
mod types;

pub use consume_logging::*;
pub use consume_tracing::*;
pub use publish_logging::*;
pub use publish_tracing::*;
pub use publisher::*;
pub use types::*;
