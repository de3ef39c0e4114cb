use thiserror::Error;

pub type DomainResult<T> = Result<T, DomainError>;

#[derive(Error, Debug)]
pub enum DomainError {
    #[error("Document store error: {0}")]
    DocumentStoreError(String),

    #[error("Document {document_id} is not owned by the requesting applicant")]
    DocumentNotOwned { document_id: String },

    #[error("Failed to delete {failed} of {total} documents: {reason}")]
    DocumentDeletionFailed {
        failed: usize,
        total: usize,
        reason: String,
    },

    #[error("Archival gateway returned status {status}: {message}")]
    ArchivalGatewayStatus { status: u16, message: String },

    #[error("Archival gateway request failed: {0}")]
    ArchivalGatewayUnavailable(String),

    #[error("Malformed archival gateway response: {0}")]
    MalformedArchivalResponse(String),

    #[error("Summary rendering failed: {0}")]
    RenderingError(String),

    #[error("Canonical document could not be serialized: {0}")]
    CanonicalDocumentError(String),

    #[error("Invalid record key: {0}")]
    InvalidRecordKey(String),

    #[error("Publish error: {0}")]
    PublishError(String),

    #[error("Repository error: {0}")]
    RepositoryError(#[from] anyhow::Error),
}
