use crate::domain::StageHandler;
use async_trait::async_trait;
use common::{CleanupSignal, DocumentOwner, DocumentStore, DomainResult, NotificationEvent};
use std::sync::Arc;
use tracing::{debug, instrument, warn};

pub const DEFAULT_NOTIFICATION_TEXT: &str =
    "Your application for benefit payment has been received.";
pub const DEFAULT_VISIBLE_DAYS: u32 = 7;
pub const DEFAULT_BENEFIT_TYPE: &str = "BENEFIT_PAYMENT";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NotificationSettings {
    pub text: String,
    pub visible_days: u32,
    pub benefit_type: String,
    pub link: Option<String>,
}

impl Default for NotificationSettings {
    fn default() -> Self {
        Self {
            text: DEFAULT_NOTIFICATION_TEXT.to_string(),
            visible_days: DEFAULT_VISIBLE_DAYS,
            benefit_type: DEFAULT_BENEFIT_TYPE.to_string(),
            link: None,
        }
    }
}

/// Cleanup signal → notification event.
///
/// Deletion of the temporary documents is best effort: a failure is logged and
/// the notification is still emitted. Every emission gets a fresh event id, so
/// a redelivered signal yields a second event with the same grouping id.
pub struct CleanupService {
    document_store: Arc<dyn DocumentStore>,
    settings: NotificationSettings,
}

impl CleanupService {
    pub fn new(document_store: Arc<dyn DocumentStore>, settings: NotificationSettings) -> Self {
        Self {
            document_store,
            settings,
        }
    }

    #[instrument(
        skip(self, signal),
        fields(
            submission_id = %signal.enriched_submission.submission.submission_id,
            journal_id = %signal.journaled_record.journal_id,
        )
    )]
    pub async fn cleanup(
        &self,
        signal: CleanupSignal,
        correlation_id: &str,
    ) -> DomainResult<NotificationEvent> {
        let enriched = signal.enriched_submission;
        let document_ids = enriched.document_ids();
        let submission = enriched.submission;

        if !document_ids.is_empty() {
            let owner = DocumentOwner::new(submission.applicant.national_id.clone());
            let count = document_ids.len();
            match self
                .document_store
                .delete(document_ids, &owner, correlation_id)
                .await
            {
                Ok(()) => debug!(count, "temporary documents deleted"),
                Err(e) => warn!(
                    count,
                    error = %e,
                    "document cleanup incomplete, notifying anyway"
                ),
            }
        }

        Ok(NotificationEvent {
            grouping_id: submission.submission_id,
            event_id: xid::new().to_string(),
            text: self.settings.text.clone(),
            link: self.settings.link.clone(),
            visible_days: self.settings.visible_days,
            applicant_national_id: submission.applicant.national_id,
            benefit_type: self.settings.benefit_type.clone(),
        })
    }
}

#[async_trait]
impl StageHandler for CleanupService {
    type Input = CleanupSignal;
    type Output = NotificationEvent;

    fn name(&self) -> &'static str {
        "cleanup-notify"
    }

    async fn handle(&self, input: CleanupSignal, correlation_id: &str) -> DomainResult<NotificationEvent> {
        self.cleanup(input, correlation_id).await
    }
}
