//! Transport-independent compose operations

use crate::models::ComposeJob;
use crate::storage::ComposeStore;
use async_trait::async_trait;
use composer_common::{ComposeMetadata, ComposeRequest, ComposeStatus, ValidationError, Version};
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info};
use uuid::Uuid;

/// Outcome of a compose operation that did not succeed
#[derive(Error, Debug)]
pub enum ContractError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error("Invalid compose id: {0}")]
    InvalidId(String),

    #[error("Unknown compose id: {0}")]
    NotFound(String),

    #[error("Metadata not available for compose {0}")]
    NotReady(String),

    #[error(transparent)]
    Storage(#[from] anyhow::Error),
}

/// The four operations of the compose API
#[async_trait]
pub trait ComposeApi: Send + Sync {
    /// Accept a compose request and return its identifier
    async fn submit(&self, request: ComposeRequest) -> Result<Uuid, ContractError>;

    async fn status(&self, id: &str) -> Result<ComposeStatus, ContractError>;

    /// Build artifacts of a compose past the build stage
    async fn metadata(&self, id: &str) -> Result<ComposeMetadata, ContractError>;

    fn version(&self) -> Version;
}

/// [`ComposeApi`] over a [`ComposeStore`]
pub struct ComposeService {
    store: Arc<dyn ComposeStore>,
    version: String,
}

impl ComposeService {
    pub fn new(store: Arc<dyn ComposeStore>, version: impl Into<String>) -> Self {
        Self {
            store,
            version: version.into(),
        }
    }

    async fn find(&self, id: &str) -> Result<ComposeJob, ContractError> {
        let uuid = Uuid::parse_str(id).map_err(|_| ContractError::InvalidId(id.to_string()))?;

        self.store
            .get(&uuid)
            .await?
            .ok_or_else(|| ContractError::NotFound(id.to_string()))
    }
}

#[async_trait]
impl ComposeApi for ComposeService {
    async fn submit(&self, request: ComposeRequest) -> Result<Uuid, ContractError> {
        request.validate()?;

        let job = ComposeJob::new(Uuid::new_v4(), request);
        self.store.insert(&job).await?;

        info!(
            "Accepted compose {} ({} image requests)",
            job.id,
            job.request.image_requests.len()
        );
        Ok(job.id)
    }

    async fn status(&self, id: &str) -> Result<ComposeStatus, ContractError> {
        let job = self.find(id).await?;
        debug!("Compose {} is {}", job.id, job.status());
        Ok(job.compose_status())
    }

    async fn metadata(&self, id: &str) -> Result<ComposeMetadata, ContractError> {
        let job = self.find(id).await?;

        match job.metadata {
            Some(metadata) if job.status().has_artifacts() => Ok(metadata),
            _ => Err(ContractError::NotReady(id.to_string())),
        }
    }

    fn version(&self) -> Version {
        Version {
            version: self.version.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryStore;
    use composer_common::ImageStatusValue;
    use serde_json::json;

    fn request() -> ComposeRequest {
        serde_json::from_value(json!({
            "distribution": "rhel-8",
            "image_requests": [{
                "architecture": "aarch64",
                "image_type": "guest-image",
                "repositories": [{"metalink": "https://mirrors/metalink", "rhsm": false}],
                "upload_request": {
                    "type": "gcp",
                    "options": {"bucket": "images"}
                }
            }]
        }))
        .unwrap()
    }

    fn service() -> (Arc<MemoryStore>, ComposeService) {
        let store = Arc::new(MemoryStore::new());
        let service = ComposeService::new(store.clone(), "1.2.3");
        (store, service)
    }

    #[tokio::test]
    async fn test_submit_then_status() {
        let (store, service) = service();

        let id = service.submit(request()).await.unwrap();
        let status = service.status(&id.to_string()).await.unwrap();

        assert_eq!(status.image_status.status, ImageStatusValue::Pending);
        assert!(status.image_status.upload_status.is_none());
        assert_eq!(store.queue_length().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_identical_submits_get_distinct_ids() {
        let (store, service) = service();

        let first = service.submit(request()).await.unwrap();
        let second = service.submit(request()).await.unwrap();

        assert_ne!(first, second);
        assert_eq!(store.queue_length().await.unwrap(), 2);
        assert!(store.get(&first).await.unwrap().is_some());
        assert!(store.get(&second).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_submit_rejects_invalid_request() {
        let (store, service) = service();
        let mut request = request();
        request.image_requests.clear();

        let err = service.submit(request).await.unwrap_err();
        assert!(matches!(
            err,
            ContractError::Validation(ValidationError::NoImageRequests)
        ));
        assert_eq!(store.queue_length().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_status_of_unknown_and_invalid_ids() {
        let (_, service) = service();

        let unknown = Uuid::new_v4().to_string();
        assert!(matches!(
            service.status(&unknown).await,
            Err(ContractError::NotFound(id)) if id == unknown
        ));
        assert!(matches!(
            service.status("not-a-uuid").await,
            Err(ContractError::InvalidId(_))
        ));
    }

    #[tokio::test]
    async fn test_metadata_only_after_build() {
        let (store, service) = service();
        let id = service.submit(request()).await.unwrap();

        assert!(matches!(
            service.metadata(&id.to_string()).await,
            Err(ContractError::NotReady(_))
        ));

        let job = store.get(&id).await.unwrap().unwrap();
        let building = job.advance(ImageStatusValue::Building).unwrap();
        store.update(&building).await.unwrap();

        let uploading = building
            .with_metadata(ComposeMetadata {
                ostree_commit: Some("abc".to_string()),
                packages: Some(vec![]),
            })
            .advance(ImageStatusValue::Uploading)
            .unwrap();
        store.update(&uploading).await.unwrap();

        let metadata = service.metadata(&id.to_string()).await.unwrap();
        assert_eq!(metadata.ostree_commit.as_deref(), Some("abc"));
    }

    #[test]
    fn test_version() {
        let (_, service) = service();
        assert_eq!(service.version().version, "1.2.3");
    }
}
