//! Stored compose job records

use chrono::{DateTime, Utc};
use composer_common::{
    ComposeMetadata, ComposeRequest, ComposeStatus, ImageStatus, ImageStatusValue, StatusError,
    UploadStatus, UploadStatusValue,
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A compose as tracked by the service
///
/// Records are values: every state change produces a new record which then
/// replaces the stored one.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComposeJob {
    /// Compose identifier handed to the client
    pub id: Uuid,

    /// The request as submitted
    pub request: ComposeRequest,

    /// Current status
    pub image_status: ImageStatus,

    /// Build artifacts, present once the build stage finished
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadata: Option<ComposeMetadata>,

    /// When the compose was submitted
    pub created_at: DateTime<Utc>,

    /// When a worker picked the compose up
    #[serde(skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,

    /// When the compose reached a terminal state
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,

    /// Failure reason, kept for operators only
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ComposeJob {
    /// Create a new pending compose
    pub fn new(id: Uuid, request: ComposeRequest) -> Self {
        Self {
            id,
            request,
            image_status: ImageStatus::pending(),
            metadata: None,
            created_at: Utc::now(),
            started_at: None,
            completed_at: None,
            error: None,
        }
    }

    pub fn status(&self) -> ImageStatusValue {
        self.image_status.status
    }

    /// Every image request carries an upload request
    pub fn upload_requested(&self) -> bool {
        !self.request.image_requests.is_empty()
    }

    /// Wire view of this compose
    pub fn compose_status(&self) -> ComposeStatus {
        ComposeStatus {
            image_status: self.image_status.clone(),
        }
    }

    /// Record in state `next`
    pub fn advance(&self, next: ImageStatusValue) -> Result<ComposeJob, StatusError> {
        let image_status = self.image_status.advance(next, self.upload_requested())?;
        let now = Utc::now();

        Ok(ComposeJob {
            image_status,
            started_at: match next {
                ImageStatusValue::Pending => self.started_at,
                _ => self.started_at.or(Some(now)),
            },
            completed_at: if next.is_terminal() {
                self.completed_at.or(Some(now))
            } else {
                None
            },
            ..self.clone()
        })
    }

    pub fn with_upload_status(&self, upload_status: UploadStatus) -> ComposeJob {
        ComposeJob {
            image_status: self.image_status.clone().with_upload_status(upload_status),
            ..self.clone()
        }
    }

    pub fn with_metadata(&self, metadata: ComposeMetadata) -> ComposeJob {
        ComposeJob {
            metadata: Some(metadata),
            ..self.clone()
        }
    }

    /// Record in state `failure`. An unfinished upload is reported as failed too.
    pub fn mark_failed(&self, error: String) -> Result<ComposeJob, StatusError> {
        let mut failed = self.advance(ImageStatusValue::Failure)?;

        if let Some(upload) = &failed.image_status.upload_status {
            if upload.status != UploadStatusValue::Success {
                let upload = UploadStatus {
                    status: UploadStatusValue::Failure,
                    options: None,
                    ..upload.clone()
                };
                failed = failed.with_upload_status(upload);
            }
        }

        failed.error = Some(error);
        Ok(failed)
    }
}
