use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};

use super::types::{ConsumeRequest, ConsumeResponse, CORRELATION_ID_HEADER};
use crate::nats::trace_context::set_span_parent;
use tower::{Layer, Service};
use tracing::{field, info_span, Instrument, Span};

/// Tower layer opening one span per consumed record.
///
/// The span continues the trace found in the record headers, so every stage of
/// a submission ends up in the same trace.
#[derive(Clone)]
pub struct ConsumeTracingLayer {
    consumer_name: String,
}

impl ConsumeTracingLayer {
    pub fn new(consumer_name: impl Into<String>) -> Self {
        Self {
            consumer_name: consumer_name.into(),
        }
    }
}

impl<S> Layer<S> for ConsumeTracingLayer {
    type Service = ConsumeTracingService<S>;

    fn layer(&self, service: S) -> Self::Service {
        ConsumeTracingService {
            inner: service,
            consumer_name: self.consumer_name.clone(),
        }
    }
}

#[derive(Clone)]
pub struct ConsumeTracingService<S> {
    inner: S,
    consumer_name: String,
}

impl<S> Service<ConsumeRequest> for ConsumeTracingService<S>
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
        let span = info_span!(
            target: "nats",
            "nats_consume",
            otel.name = %format!("{} process", self.consumer_name),
            messaging.system = "nats",
            messaging.operation = "process",
            messaging.destination.name = %req.subject,
            messaging.consumer.name = %self.consumer_name,
            messaging.message.body.size = req.payload.len(),
            submission_id = %req.key(),
            correlation_id = req.header(CORRELATION_ID_HEADER).unwrap_or(""),
            outcome = field::Empty,
            otel.status_code = field::Empty,
        );
        set_span_parent(&span, req.headers.as_ref());

        let mut inner = self.inner.clone();

        Box::pin(
            async move {
                let result = inner.call(req).await;

                let span = Span::current();
                match &result {
                    Ok(response) => {
                        span.record("outcome", response.outcome());
                        span.record("otel.status_code", "OK");
                    }
                    Err(_) => {
                        span.record("otel.status_code", "ERROR");
                    }
                }

                result
            }
            .instrument(span),
        )
    }
}
