//! Compose status lifecycle
//!
//! ```text
//! pending -> building -> [uploading -> [registering]] -> success | failure
//! ```
//!
//! `uploading` and `registering` only occur when an upload was requested.
//! `success` and `failure` are terminal. Any non-terminal state may fail.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::StatusError;
use crate::upload::UploadStatus;

/// Lifecycle state of a compose
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ImageStatusValue {
    /// Accepted, waiting for a worker
    Pending,
    /// Image is being built
    Building,
    /// Built image is being transferred to its upload target
    Uploading,
    /// Uploaded image is being registered as a VM image
    Registering,
    /// Finished successfully
    Success,
    /// Finished unsuccessfully
    Failure,
}

impl ImageStatusValue {
    pub const ALL: [ImageStatusValue; 6] = [
        ImageStatusValue::Pending,
        ImageStatusValue::Building,
        ImageStatusValue::Uploading,
        ImageStatusValue::Registering,
        ImageStatusValue::Success,
        ImageStatusValue::Failure,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ImageStatusValue::Pending => "pending",
            ImageStatusValue::Building => "building",
            ImageStatusValue::Uploading => "uploading",
            ImageStatusValue::Registering => "registering",
            ImageStatusValue::Success => "success",
            ImageStatusValue::Failure => "failure",
        }
    }

    /// Position along the lifecycle. Terminal states share the last rank.
    pub fn rank(&self) -> u8 {
        match self {
            ImageStatusValue::Pending => 0,
            ImageStatusValue::Building => 1,
            ImageStatusValue::Uploading => 2,
            ImageStatusValue::Registering => 3,
            ImageStatusValue::Success | ImageStatusValue::Failure => 4,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, ImageStatusValue::Success | ImageStatusValue::Failure)
    }

    /// Build artifacts exist once a compose has moved past `building`.
    pub fn has_artifacts(&self) -> bool {
        self.rank() > ImageStatusValue::Building.rank()
    }

    /// Whether the lifecycle permits moving from `self` to `next`.
    ///
    /// Re-reporting the current state is always permitted.
    pub fn can_advance_to(&self, next: ImageStatusValue, upload_requested: bool) -> bool {
        use ImageStatusValue::*;

        if *self == next {
            return true;
        }

        match (*self, next) {
            (Success | Failure, _) => false,
            (_, Failure) => true,
            (Pending, Building) => true,
            (Building, Uploading) => upload_requested,
            (Building, Success) => !upload_requested,
            (Uploading, Registering) => true,
            (Uploading, Success) => true,
            (Registering, Success) => true,
            _ => false,
        }
    }

    pub fn advance(
        self,
        next: ImageStatusValue,
        upload_requested: bool,
    ) -> Result<ImageStatusValue, StatusError> {
        if self.can_advance_to(next, upload_requested) {
            Ok(next)
        } else {
            Err(StatusError::IllegalTransition {
                from: self,
                to: next,
            })
        }
    }
}

impl fmt::Display for ImageStatusValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ImageStatusValue {
    type Err = StatusError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|v| v.as_str() == s)
            .ok_or_else(|| StatusError::UnknownStatus(s.to_string()))
    }
}

/// Current state of a compose's image, as carried on the wire
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImageStatus {
    pub status: ImageStatusValue,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub upload_status: Option<UploadStatus>,
}

impl ImageStatus {
    pub fn pending() -> Self {
        Self {
            status: ImageStatusValue::Pending,
            upload_status: None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    /// New record in state `next`, keeping the current upload status
    pub fn advance(
        &self,
        next: ImageStatusValue,
        upload_requested: bool,
    ) -> Result<ImageStatus, StatusError> {
        Ok(ImageStatus {
            status: self.status.advance(next, upload_requested)?,
            upload_status: self.upload_status.clone(),
        })
    }

    pub fn with_upload_status(self, upload_status: UploadStatus) -> ImageStatus {
        ImageStatus {
            upload_status: Some(upload_status),
            ..self
        }
    }
}

/// Response body of the status operation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComposeStatus {
    pub image_status: ImageStatus,
}
