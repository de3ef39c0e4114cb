use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};
use std::time::Instant;

use super::types::{PublishRequest, PublishResponse, CORRELATION_ID_HEADER};
use tower::{Layer, Service};
use tracing::{debug, error, Instrument, Span};

/// Tower layer logging every publish with its latency
#[derive(Clone, Default)]
pub struct PublishLoggingLayer;

impl PublishLoggingLayer {
    pub fn new() -> Self {
        Self
    }
}

impl<S> Layer<S> for PublishLoggingLayer {
    type Service = PublishLoggingService<S>;

    fn layer(&self, service: S) -> Self::Service {
        PublishLoggingService { inner: service }
    }
}

#[derive(Clone)]
pub struct PublishLoggingService<S> {
    inner: S,
}

impl<S> Service<PublishRequest> for PublishLoggingService<S>
where
    S: Service<PublishRequest, Response = PublishResponse> + Clone + Send + 'static,
    S::Error: std::fmt::Display + Send,
    S::Future: Send + 'static,
{
    type Response = S::Response;
    type Error = S::Error;
    type Future = Pin<Box<dyn Future<Output = Result<Self::Response, Self::Error>> + Send>>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, req: PublishRequest) -> Self::Future {
        let subject = req.subject.clone();
        let correlation_id = req
            .headers
            .get(CORRELATION_ID_HEADER)
            .map(|v| v.as_str().to_string())
            .unwrap_or_default();
        let payload_size = req.payload.len();
        let start = Instant::now();
        let mut inner = self.inner.clone();

        let span = Span::current();

        Box::pin(
            async move {
                let result = inner.call(req).await;
                let duration_ms = start.elapsed().as_millis();

                match &result {
                    Ok(_) => {
                        debug!(
                            subject = %subject,
                            correlation_id = %correlation_id,
                            payload_bytes = payload_size,
                            duration_ms = %duration_ms,
                            "published to {subject} in {duration_ms}ms"
                        );
                    }
                    Err(e) => {
                        error!(
                            subject = %subject,
                            correlation_id = %correlation_id,
                            payload_bytes = payload_size,
                            duration_ms = %duration_ms,
                            error = %e,
                            "failed to publish to {subject} in {duration_ms}ms: {e}"
                        );
                    }
                }

                result
            }
            .instrument(span),
        )
    }
}
