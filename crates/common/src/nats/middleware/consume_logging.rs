use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};
use std::time::Instant;

use super::types::{ConsumeRequest, ConsumeResponse, CORRELATION_ID_HEADER};
use tower::{Layer, Service};
use tracing::{debug, error, info, Instrument, Span};

/// Tower layer logging the outcome of every consumed record
#[derive(Clone, Default)]
pub struct ConsumeLoggingLayer;

impl ConsumeLoggingLayer {
    pub fn new() -> Self {
        Self
    }
}

impl<S> Layer<S> for ConsumeLoggingLayer {
    type Service = ConsumeLoggingService<S>;

    fn layer(&self, service: S) -> Self::Service {
        ConsumeLoggingService { inner: service }
    }
}

#[derive(Clone)]
pub struct ConsumeLoggingService<S> {
    inner: S,
}

impl<S> Service<ConsumeRequest> for ConsumeLoggingService<S>
where
    S: Service<ConsumeRequest, Response = ConsumeResponse> + Clone + Send + 'static,
    S::Error: std::fmt::Display + Send,
    S::Future: Send + 'static,
{
    type Response = S::Response;
    type Error = S::Error;
    type Future = Pin<Box<dyn Future<Output = Result<Self::Response, Self::Error>> + Send>>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, req: ConsumeRequest) -> Self::Future {
        let subject = req.subject.clone();
        let key = req.key().to_string();
        let correlation_id = req.header(CORRELATION_ID_HEADER).unwrap_or("").to_string();
        let payload_size = req.payload.len();
        let start = Instant::now();
        let mut inner = self.inner.clone();

        let span = Span::current();

        Box::pin(
            async move {
                let result = inner.call(req).await;
                let duration_ms = start.elapsed().as_millis();

                match &result {
                    Ok(ConsumeResponse::Ack) => {
                        info!(
                            subject = %subject,
                            submission_id = %key,
                            correlation_id = %correlation_id,
                            payload_bytes = payload_size,
                            duration_ms = %duration_ms,
                            "processed {subject} in {duration_ms}ms"
                        );
                    }
                    Ok(ConsumeResponse::Skip(reason)) => {
                        debug!(
                            subject = %subject,
                            submission_id = %key,
                            correlation_id = %correlation_id,
                            reason = %reason,
                            "skipped {subject}: {reason}"
                        );
                    }
                    Err(e) => {
                        error!(
                            subject = %subject,
                            submission_id = %key,
                            correlation_id = %correlation_id,
                            duration_ms = %duration_ms,
                            error = %e,
                            "failed to process {subject} in {duration_ms}ms: {e}"
                        );
                    }
                }

                result
            }
            .instrument(span),
        )
    }
}
