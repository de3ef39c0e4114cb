use crate::domain::{Document, DocumentId, DocumentOwner, DocumentStore, DomainError, DomainResult};
use crate::health::DependencyCheck;
use crate::nats::traits::ObjectBucket;
use anyhow::{Context, Result};
use async_nats::jetstream::object_store::{InfoErrorKind, ObjectMetadata, ObjectStore};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, instrument, warn};

const OWNER_KEY: &str = "owner";
const CONTENT_TYPE_KEY: &str = "content-type";
const TITLE_KEY: &str = "title";
const CORRELATION_ID_KEY: &str = "correlation-id";
// Never written; looking it up only proves the bucket answers
const HEALTH_CHECK_KEY: &str = "health-check";

/// [`ObjectBucket`] backed by a JetStream object store bucket.
pub struct NatsObjectBucket {
    store: ObjectStore,
}

impl NatsObjectBucket {
    pub fn new(store: ObjectStore) -> Self {
        Self { store }
    }
}

#[async_trait]
impl ObjectBucket for NatsObjectBucket {
    async fn put(
        &self,
        key: &str,
        content: bytes::Bytes,
        metadata: HashMap<String, String>,
    ) -> Result<()> {
        let object_metadata = ObjectMetadata {
            name: key.to_string(),
            metadata,
            ..Default::default()
        };
        let mut reader = &content[..];
        self.store
            .put(object_metadata, &mut reader)
            .await
            .with_context(|| format!("failed to upload object {key}"))?;
        Ok(())
    }

    async fn metadata(&self, key: &str) -> Result<Option<HashMap<String, String>>> {
        match self.store.info(key).await {
            Ok(info) if info.deleted => Ok(None),
            Ok(info) => Ok(Some(info.metadata)),
            Err(err) if err.kind() == InfoErrorKind::NotFound => Ok(None),
            Err(err) => Err(err).with_context(|| format!("failed to read object info {key}")),
        }
    }

    async fn delete(&self, key: &str) -> Result<()> {
        self.store
            .delete(key)
            .await
            .with_context(|| format!("failed to delete object {key}"))?;
        Ok(())
    }
}

/// Document store keeping each document as one object, tagged with its owner.
pub struct ObjectStoreDocumentStore {
    bucket: Arc<dyn ObjectBucket>,
}

impl ObjectStoreDocumentStore {
    pub fn new(bucket: Arc<dyn ObjectBucket>) -> Self {
        Self { bucket }
    }

    async fn delete_owned(&self, document_id: &str, owner: &DocumentOwner) -> DomainResult<()> {
        let Some(metadata) = self.bucket.metadata(document_id).await? else {
            // Already gone, e.g. a redelivered cleanup signal
            debug!(document_id = %document_id, "document already deleted");
            return Ok(());
        };

        if metadata.get(OWNER_KEY).map(String::as_str) != Some(owner.as_str()) {
            return Err(DomainError::DocumentNotOwned {
                document_id: document_id.to_string(),
            });
        }

        self.bucket.delete(document_id).await?;
        Ok(())
    }
}

#[async_trait]
impl DocumentStore for ObjectStoreDocumentStore {
    #[instrument(skip(self, document), fields(title = %document.title, size = document.content.len()))]
    async fn store(&self, document: Document, correlation_id: &str) -> DomainResult<DocumentId> {
        let document_id = xid::new().to_string();

        let metadata = HashMap::from([
            (OWNER_KEY.to_string(), document.owner.0),
            (CONTENT_TYPE_KEY.to_string(), document.content_type),
            (TITLE_KEY.to_string(), document.title),
            (CORRELATION_ID_KEY.to_string(), correlation_id.to_string()),
        ]);

        self.bucket
            .put(&document_id, document.content, metadata)
            .await
            .map_err(|e| DomainError::DocumentStoreError(format!("{e:#}")))?;

        debug!(document_id = %document_id, "stored document");
        Ok(document_id)
    }

    #[instrument(skip(self, document_ids, owner), fields(count = document_ids.len()))]
    async fn delete(
        &self,
        document_ids: Vec<DocumentId>,
        owner: &DocumentOwner,
        correlation_id: &str,
    ) -> DomainResult<()> {
        let total = document_ids.len();
        let mut failures = Vec::new();

        for document_id in &document_ids {
            if let Err(e) = self.delete_owned(document_id, owner).await {
                warn!(
                    document_id = %document_id,
                    correlation_id = %correlation_id,
                    error = %e,
                    "failed to delete document"
                );
                failures.push(format!("{document_id}: {e}"));
            }
        }

        if failures.is_empty() {
            return Ok(());
        }

        Err(DomainError::DocumentDeletionFailed {
            failed: failures.len(),
            total,
            reason: failures.join("; "),
        })
    }
}

#[async_trait]
impl DependencyCheck for ObjectStoreDocumentStore {
    fn name(&self) -> &'static str {
        "document-store"
    }

    async fn check(&self) -> Result<()> {
        self.bucket
            .metadata(HEALTH_CHECK_KEY)
            .await
            .context("document store bucket unavailable")?;
        Ok(())
    }
}
