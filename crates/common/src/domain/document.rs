use crate::domain::result::DomainResult;
use async_trait::async_trait;
use bytes::Bytes;

/// Identifier issued by the document store for a stored blob.
pub type DocumentId = String;

/// The person a stored document belongs to (the applicant's national id).
#[derive(Clone, PartialEq, Eq)]
pub struct DocumentOwner(pub String);

impl DocumentOwner {
    pub fn new(national_id: impl Into<String>) -> Self {
        Self(national_id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Debug for DocumentOwner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("DocumentOwner(..)")
    }
}

/// An opaque blob to be stored temporarily until the submission is journaled.
#[derive(Debug, Clone, PartialEq)]
pub struct Document {
    pub owner: DocumentOwner,
    pub content: Bytes,
    pub content_type: String,
    pub title: String,
}

/// Temporary storage for generated documents and applicant attachments.
///
/// Implementations must be callable concurrently from every stage.
#[cfg_attr(any(test, feature = "testing"), mockall::automock)]
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Store a document and return the id it can later be referenced by.
    async fn store(&self, document: Document, correlation_id: &str) -> DomainResult<DocumentId>;

    /// Delete the given documents.
    ///
    /// Every id is attempted; the error reports the ids that could not be deleted.
    async fn delete(
        &self,
        document_ids: Vec<DocumentId>,
        owner: &DocumentOwner,
        correlation_id: &str,
    ) -> DomainResult<()>;
}
