use async_nats::HeaderMap;
use bytes::Bytes;

/// Correlation id of the submission, copied from the envelope metadata.
pub const CORRELATION_ID_HEADER: &str = "X-Correlation-Id";
/// Record key, duplicated from the subject for tooling that reads headers only.
pub const SUBMISSION_ID_HEADER: &str = "Submission-Id";
/// JetStream de-duplication key.
pub const MSG_ID_HEADER: &str = "Nats-Msg-Id";

/// A single record handed to a stage through Tower.
///
/// Owns its data so it can travel through middleware without lifetimes.
#[derive(Debug, Clone)]
pub struct ConsumeRequest {
    pub subject: String,
    pub payload: Bytes,
    pub headers: Option<HeaderMap>,
}

impl ConsumeRequest {
    pub fn new(subject: impl Into<String>, payload: impl Into<Bytes>, headers: Option<HeaderMap>) -> Self {
        Self {
            subject: subject.into(),
            payload: payload.into(),
            headers,
        }
    }

    /// Record key, the last token of the subject.
    pub fn key(&self) -> &str {
        self.subject
            .rsplit_once('.')
            .map(|(_, key)| key)
            .unwrap_or(&self.subject)
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .as_ref()
            .and_then(|headers| headers.get(name))
            .map(|value| value.as_str())
    }
}

/// Outcome of a successfully handled record. Both variants commit the offset.
///
/// Failures are reported through the service error instead and leave the
/// record uncommitted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConsumeResponse {
    /// Processed and forwarded
    Ack,
    /// Deliberately dropped by a filter
    Skip(String),
}

impl ConsumeResponse {
    pub fn skip(reason: impl Into<String>) -> Self {
        Self::Skip(reason.into())
    }

    pub fn outcome(&self) -> &'static str {
        match self {
            Self::Ack => "ack",
            Self::Skip(_) => "skip",
        }
    }
}

/// Request to publish a record to JetStream.
#[derive(Debug, Clone)]
pub struct PublishRequest {
    pub subject: String,
    pub payload: Bytes,
    /// Trace context is injected here by the tracing layer
    pub headers: HeaderMap,
}

impl PublishRequest {
    pub fn new(subject: impl Into<String>, payload: impl Into<Bytes>) -> Self {
        Self {
            subject: subject.into(),
            payload: payload.into(),
            headers: HeaderMap::new(),
        }
    }

    pub fn with_header(mut self, name: &'static str, value: &str) -> Self {
        self.headers.insert(name, value);
        self
    }
}

#[derive(Debug)]
pub struct PublishResponse {
    pub subject: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_is_last_subject_token() {
        let req = ConsumeRequest::new("raw-submissions.abc123", Bytes::new(), None);
        assert_eq!(req.key(), "abc123");
    }

    #[test]
    fn test_key_falls_back_to_whole_subject() {
        let req = ConsumeRequest::new("plain", Bytes::new(), None);
        assert_eq!(req.key(), "plain");
    }

    #[test]
    fn test_header_lookup() {
        let mut headers = HeaderMap::new();
        headers.insert(CORRELATION_ID_HEADER, "corr-1");
        let req = ConsumeRequest::new("t.k", Bytes::new(), Some(headers));

        assert_eq!(req.header(CORRELATION_ID_HEADER), Some("corr-1"));
        assert_eq!(req.header(SUBMISSION_ID_HEADER), None);
    }

    #[test]
    fn test_publish_request_headers() {
        let req = PublishRequest::new("t.k", Bytes::from_static(b"{}"))
            .with_header(SUBMISSION_ID_HEADER, "k");

        assert_eq!(
            req.headers.get(SUBMISSION_ID_HEADER).map(|v| v.as_str()),
            Some("k")
        );
    }

    #[test]
    fn test_consume_response_outcome() {
        assert_eq!(ConsumeResponse::Ack.outcome(), "ack");
        assert_eq!(ConsumeResponse::skip("old").outcome(), "skip");
    }
}
