mod envelope_producer;
mod stage_consumer_service;

pub use envelope_producer::*;
pub use stage_consumer_service::*;
