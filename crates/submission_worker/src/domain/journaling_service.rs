use crate::domain::{canonical_document, StageHandler};
use async_trait::async_trait;
use common::{
    ApplicantName, ArchivalGateway, ArchivalRequest, CleanupSignal, DomainResult,
    EnrichedSubmission, JournaledRecord,
};
use std::sync::Arc;
use tracing::{info, instrument};

/// Enriched submission → journaled record, filed through the archival gateway.
///
/// The output carries the enriched submission along so cleanup knows which
/// documents to delete.
pub struct JournalingService {
    archival_gateway: Arc<dyn ArchivalGateway>,
}

impl JournalingService {
    pub fn new(archival_gateway: Arc<dyn ArchivalGateway>) -> Self {
        Self { archival_gateway }
    }

    #[instrument(skip(self, enriched), fields(submission_id = %enriched.submission.submission_id))]
    pub async fn journal(
        &self,
        enriched: EnrichedSubmission,
        correlation_id: &str,
    ) -> DomainResult<CleanupSignal> {
        let submission = &enriched.submission;
        let canonical = canonical_document(submission)?;

        let request = ArchivalRequest {
            submission_id: submission.submission_id.clone(),
            national_id: submission.applicant.national_id.clone(),
            received_at: submission.received_at,
            applicant_name: ApplicantName {
                first_name: submission.applicant.first_name.clone(),
                middle_name: submission.applicant.middle_name.clone(),
                last_name: submission.applicant.last_name.clone(),
            },
            document_ids: enriched.document_bundles.clone(),
            canonical_document: canonical.clone(),
        };

        let journal_id = self.archival_gateway.file(request, correlation_id).await?;
        info!(journal_id = %journal_id, "submission journaled");

        Ok(CleanupSignal {
            enriched_submission: enriched,
            journaled_record: JournaledRecord {
                journal_id: journal_id.0,
                canonical_document: canonical,
            },
        })
    }
}

#[async_trait]
impl StageHandler for JournalingService {
    type Input = EnrichedSubmission;
    type Output = CleanupSignal;

    fn name(&self) -> &'static str {
        "journaling"
    }

    async fn handle(&self, input: EnrichedSubmission, correlation_id: &str) -> DomainResult<CleanupSignal> {
        self.journal(input, correlation_id).await
    }
}
