use crate::domain::{canonical_document_bytes, StageHandler, SummaryRenderer, SUMMARY_TITLE};
use async_trait::async_trait;
use bytes::Bytes;
use common::{Document, DocumentOwner, DocumentStore, DomainResult, EnrichedSubmission, Submission};
use std::sync::Arc;
use tracing::{debug, instrument};

pub const CANONICAL_JSON_TITLE: &str = "Application for benefit payment as JSON";
pub const CANONICAL_JSON_CONTENT_TYPE: &str = "application/json";

/// Raw submission → enriched submission.
///
/// Stores the rendered summary and the canonical JSON, then lays out the
/// document bundles: `[summary, canonical json]` first, then one bundle per
/// original attachment in intake order.
pub struct PreprocessingService {
    document_store: Arc<dyn DocumentStore>,
    renderer: Arc<dyn SummaryRenderer>,
}

impl PreprocessingService {
    pub fn new(document_store: Arc<dyn DocumentStore>, renderer: Arc<dyn SummaryRenderer>) -> Self {
        Self {
            document_store,
            renderer,
        }
    }

    #[instrument(skip(self, submission), fields(submission_id = %submission.submission_id))]
    pub async fn preprocess(
        &self,
        submission: Submission,
        correlation_id: &str,
    ) -> DomainResult<EnrichedSubmission> {
        let owner = DocumentOwner::new(submission.applicant.national_id.clone());

        let summary = self.renderer.render(&submission)?;
        let summary_id = self
            .document_store
            .store(
                Document {
                    owner: owner.clone(),
                    content: summary.content,
                    content_type: summary.content_type,
                    title: SUMMARY_TITLE.to_string(),
                },
                correlation_id,
            )
            .await?;

        let canonical_id = self
            .document_store
            .store(
                Document {
                    owner,
                    content: Bytes::from(canonical_document_bytes(&submission)?),
                    content_type: CANONICAL_JSON_CONTENT_TYPE.to_string(),
                    title: CANONICAL_JSON_TITLE.to_string(),
                },
                correlation_id,
            )
            .await?;

        let mut bundles = Vec::with_capacity(submission.attachment_ids.len() + 1);
        bundles.push(vec![summary_id, canonical_id]);
        bundles.extend(submission.attachment_ids.iter().map(|id| vec![id.clone()]));

        debug!(bundles = bundles.len(), "submission enriched");
        Ok(EnrichedSubmission::new(submission, bundles))
    }
}

#[async_trait]
impl StageHandler for PreprocessingService {
    type Input = Submission;
    type Output = EnrichedSubmission;

    fn name(&self) -> &'static str {
        "preprocessing"
    }

    async fn handle(&self, input: Submission, correlation_id: &str) -> DomainResult<EnrichedSubmission> {
        self.preprocess(input, correlation_id).await
    }
}
