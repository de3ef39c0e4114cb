use crate::domain::envelope::{Keyed, ReceivedAt};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// The citizen submitting the application.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Applicant {
    pub national_id: String,
    pub first_name: String,
    #[serde(default)]
    pub middle_name: Option<String>,
    pub last_name: String,
    pub actor_id: String,
}

impl Applicant {
    pub fn full_name(&self) -> String {
        match &self.middle_name {
            Some(middle) if !middle.is_empty() => {
                format!("{} {} {}", self.first_name, middle, self.last_name)
            }
            _ => format!("{} {}", self.first_name, self.last_name),
        }
    }
}

// National ids must never end up in log lines through a stray `{:?}`.
impl std::fmt::Debug for Applicant {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Applicant")
            .field("actor_id", &self.actor_id)
            .finish_non_exhaustive()
    }
}

/// A benefit-payment application as received at intake.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Submission {
    pub submission_id: String,
    pub received_at: DateTime<Utc>,
    pub language: String,
    pub applicant: Applicant,
    #[serde(default)]
    pub attachment_ids: Vec<String>,
    /// Domain-specific form answers; the pipeline treats them as opaque.
    #[serde(default)]
    pub form: serde_json::Value,
}

/// A submission plus the document bundles generated by preprocessing.
///
/// Bundle 0 is `[summary, canonical json]`; every following bundle holds
/// exactly one original attachment, in intake order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EnrichedSubmission {
    #[serde(flatten)]
    pub submission: Submission,
    pub document_bundles: Vec<Vec<String>>,
}

impl EnrichedSubmission {
    pub fn new(submission: Submission, document_bundles: Vec<Vec<String>>) -> Self {
        Self {
            submission,
            document_bundles,
        }
    }

    /// All document ids across all bundles, bundle order preserved.
    pub fn document_ids(&self) -> Vec<String> {
        self.document_bundles.iter().flatten().cloned().collect()
    }
}

/// Outcome of filing a submission with the archival system.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JournaledRecord {
    pub journal_id: String,
    pub canonical_document: serde_json::Value,
}

/// Input of the cleanup stage: the journaled record together with the
/// enriched submission that names the documents to delete.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CleanupSignal {
    pub enriched_submission: EnrichedSubmission,
    pub journaled_record: JournaledRecord,
}

/// User-facing notification emitted once a submission is fully processed.
///
/// `event_id` is regenerated on every emission; `grouping_id` is the
/// submission id and stays stable across replays.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NotificationEvent {
    pub grouping_id: String,
    pub event_id: String,
    pub text: String,
    #[serde(default)]
    pub link: Option<String>,
    pub visible_days: u32,
    pub applicant_national_id: String,
    pub benefit_type: String,
}

impl Keyed for Submission {
    fn submission_id(&self) -> &str {
        &self.submission_id
    }
}

impl ReceivedAt for Submission {
    fn received_at(&self) -> DateTime<Utc> {
        self.received_at
    }
}

impl Keyed for EnrichedSubmission {
    fn submission_id(&self) -> &str {
        &self.submission.submission_id
    }
}

impl ReceivedAt for EnrichedSubmission {
    fn received_at(&self) -> DateTime<Utc> {
        self.submission.received_at
    }
}

impl Keyed for CleanupSignal {
    fn submission_id(&self) -> &str {
        self.enriched_submission.submission_id()
    }
}

impl ReceivedAt for CleanupSignal {
    fn received_at(&self) -> DateTime<Utc> {
        self.enriched_submission.received_at()
    }
}

impl Keyed for NotificationEvent {
    fn submission_id(&self) -> &str {
        &self.grouping_id
    }
}
