//! Artifact store
//!
//! Persists execution outputs with their metadata and keeps the filename
//! index and the workflow index in lockstep: if any write of the group
//! fails, the earlier writes are rolled back so neither orphan metadata
//! nor orphan bodies survive.

use noesis_core::artifact::FileArtifact;
use noesis_core::error::{Result, WorkflowError};
use noesis_core::store::{keys, SharedStore, StateStore};
use uuid::Uuid;

/// Pair-write artifact persistence over the state store
#[derive(Clone)]
pub struct ArtifactStore {
    store: SharedStore,
}

impl ArtifactStore {
    pub fn new(store: SharedStore) -> Self {
        Self { store }
    }

    /// Store one artifact: body, metadata, filename index, workflow index.
    ///
    /// All four writes succeed or none survive.
    pub async fn store_artifact(
        &self,
        workflow_id: Uuid,
        filename: &str,
        content: &str,
    ) -> Result<FileArtifact> {
        let artifact = FileArtifact::new(filename, content, workflow_id);
        let id = artifact.id;

        let content_key = keys::file_content(id);
        let metadata_key = keys::file_metadata(id);
        let name_key = keys::file_by_name(filename);
        let workflow_key = keys::file_by_workflow(workflow_id);

        if let Err(e) = self.store.set(&content_key, content).await {
            return Err(self.rolled_back(&[], e).await);
        }
        if let Err(e) = self
            .store
            .set(&metadata_key, &serde_json::to_string(&artifact)?)
            .await
        {
            return Err(self.rolled_back(&[&content_key], e).await);
        }
        if let Err(e) = self.store.set(&name_key, &id.to_string()).await {
            return Err(self.rolled_back(&[&content_key, &metadata_key], e).await);
        }
        if let Err(e) = self.store.set_add(&workflow_key, &id.to_string()).await {
            return Err(self
                .rolled_back(&[&content_key, &metadata_key, &name_key], e)
                .await);
        }

        tracing::debug!(artifact_id = %id, filename, workflow_id = %workflow_id, "artifact stored");
        Ok(artifact)
    }

    /// Metadata for one artifact.
    pub async fn metadata(&self, id: Uuid) -> Result<Option<FileArtifact>> {
        match self.store.get(&keys::file_metadata(id)).await? {
            Some(json) => Ok(Some(serde_json::from_str(&json)?)),
            None => Ok(None),
        }
    }

    /// Raw content for one artifact.
    pub async fn content(&self, id: Uuid) -> Result<Option<String>> {
        self.store.get(&keys::file_content(id)).await
    }

    /// Resolve a filename to its artifact id.
    pub async fn id_by_name(&self, filename: &str) -> Result<Option<Uuid>> {
        Ok(self
            .store
            .get(&keys::file_by_name(filename))
            .await?
            .and_then(|s| s.parse().ok()))
    }

    /// All artifacts produced by one workflow.
    pub async fn list_by_workflow(&self, workflow_id: Uuid) -> Result<Vec<FileArtifact>> {
        let ids = self
            .store
            .set_members(&keys::file_by_workflow(workflow_id))
            .await?;
        let mut out = Vec::with_capacity(ids.len());
        for id in ids {
            let Ok(artifact_id) = id.parse::<Uuid>() else {
                continue;
            };
            if let Some(meta) = self.metadata(artifact_id).await? {
                out.push(meta);
            }
        }
        out.sort_by(|a, b| a.filename.cmp(&b.filename));
        Ok(out)
    }

    async fn rolled_back(
        &self,
        written: &[&str],
        cause: noesis_core::error::NoesisError,
    ) -> noesis_core::error::NoesisError {
        for key in written {
            if let Err(e) = self.store.delete(key).await {
                tracing::warn!(key, error = %e, "artifact rollback delete failed");
            }
        }
        WorkflowError::ArtifactRollback(cause.to_string()).into()
    }
}
