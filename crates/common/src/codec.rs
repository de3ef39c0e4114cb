//! JSON codec for topic envelopes.
//!
//! Decoding is split so that the metadata can be inspected before the payload
//! is interpreted: a record from an unsupported schema generation must be
//! filterable even when its payload no longer matches the current types.

use crate::domain::{Envelope, Metadata};
use bytes::Bytes;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum CodecError {
    #[error("malformed envelope metadata on topic {topic}: {source}")]
    MalformedMetadata {
        topic: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("malformed envelope payload on topic {topic}: {source}")]
    MalformedPayload {
        topic: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("failed to serialize envelope for topic {topic}: {source}")]
    Serialization {
        topic: String,
        #[source]
        source: serde_json::Error,
    },
}

#[derive(Deserialize)]
struct MetadataOnly {
    metadata: Metadata,
}

#[derive(Serialize)]
struct EnvelopeRef<'a, T> {
    metadata: &'a Metadata,
    payload: &'a T,
}

pub fn encode_envelope<T: Serialize>(
    topic: &str,
    metadata: &Metadata,
    payload: &T,
) -> Result<Bytes, CodecError> {
    serde_json::to_vec(&EnvelopeRef { metadata, payload })
        .map(Bytes::from)
        .map_err(|source| CodecError::Serialization {
            topic: topic.to_string(),
            source,
        })
}

pub fn decode_metadata(topic: &str, bytes: &[u8]) -> Result<Metadata, CodecError> {
    serde_json::from_slice::<MetadataOnly>(bytes)
        .map(|m| m.metadata)
        .map_err(|source| CodecError::MalformedMetadata {
            topic: topic.to_string(),
            source,
        })
}

pub fn decode_envelope<T: DeserializeOwned>(
    topic: &str,
    bytes: &[u8],
) -> Result<Envelope<T>, CodecError> {
    serde_json::from_slice(bytes).map_err(|source| CodecError::MalformedPayload {
        topic: topic.to_string(),
        source,
    })
}
