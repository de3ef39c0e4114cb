use crate::domain::result::DomainResult;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;

/// Name of the applicant as printed on the journal entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ApplicantName {
    pub first_name: String,
    pub middle_name: Option<String>,
    pub last_name: String,
}

/// Everything the archival system needs to file one submission.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ArchivalRequest {
    /// Used as dedup key when the gateway supports idempotent filing.
    #[serde(skip)]
    pub submission_id: String,
    pub national_id: String,
    pub received_at: DateTime<Utc>,
    pub applicant_name: ApplicantName,
    /// Document bundles, each filed together as one archival unit.
    pub document_ids: Vec<Vec<String>>,
    pub canonical_document: serde_json::Value,
}

/// Opaque id of the journal entry created by the archival system.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JournalId(pub String);

impl std::fmt::Display for JournalId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Files a canonical document set with the archival system.
#[cfg_attr(any(test, feature = "testing"), mockall::automock)]
#[async_trait]
pub trait ArchivalGateway: Send + Sync {
    /// Single synchronous filing call; timeouts are owned by the implementation.
    async fn file(&self, request: ArchivalRequest, correlation_id: &str) -> DomainResult<JournalId>;
}
