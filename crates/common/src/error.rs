use thiserror::Error;

use crate::status::ImageStatusValue;
use crate::upload::UploadType;

/// Failures of the upload variant codec.
#[derive(Error, Debug)]
pub enum CodecError {
    /// Encoding was asked for a tag outside the known provider set.
    #[error("Unsupported upload type: {0}")]
    UnsupportedVariant(String),

    /// The payload handed to the encoder belongs to another provider.
    #[error("Upload payload for {found} does not match upload type {expected}")]
    VariantMismatch {
        expected: UploadType,
        found: UploadType,
    },

    /// Decoding met a tag this build does not know. May be a newer provider.
    #[error("Unknown upload type: {0}")]
    UnknownVariant(String),

    /// The tag is known but the payload does not have that provider's shape.
    #[error("Malformed {kind} for upload type {upload_type}: {source}")]
    MalformedVariant {
        upload_type: UploadType,
        kind: &'static str,
        source: serde_json::Error,
    },
}

impl CodecError {
    /// True when the data may simply be newer than this codec rather than corrupt.
    pub fn is_forward_compatible(&self) -> bool {
        matches!(self, CodecError::UnknownVariant(_))
    }
}

/// Failures of the compose status lifecycle.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StatusError {
    #[error("Unknown compose status: {0}")]
    UnknownStatus(String),

    #[error("Illegal compose status transition: {from} -> {to}")]
    IllegalTransition {
        from: ImageStatusValue,
        to: ImageStatusValue,
    },
}

/// First invariant violated by a compose request.
#[derive(Error, Debug)]
pub enum ValidationError {
    #[error("Distribution cannot be empty")]
    EmptyDistribution,

    #[error("At least one image request is required")]
    NoImageRequests,

    #[error("Architecture cannot be empty in image_requests[{image}]")]
    EmptyArchitecture { image: usize },

    #[error("Image type cannot be empty in image_requests[{image}]")]
    EmptyImageType { image: usize },

    #[error("At least one repository is required in image_requests[{image}]")]
    NoRepositories { image: usize },

    #[error(
        "One of baseurl, metalink or mirrorlist is required in image_requests[{image}].repositories[{repository}]"
    )]
    RepositoryWithoutSource { image: usize, repository: usize },

    #[error(
        "Only one of baseurl, metalink or mirrorlist may be set in image_requests[{image}].repositories[{repository}]"
    )]
    ConflictingRepositorySources { image: usize, repository: usize },

    #[error("Unknown upload type {upload_type} in image_requests[{image}]")]
    UnknownUploadType { image: usize, upload_type: String },

    #[error("Invalid upload request in image_requests[{image}]: {source}")]
    MalformedUploadRequest { image: usize, source: CodecError },

    #[error("User name cannot be empty in customizations.users[{user}]")]
    EmptyUserName { user: usize },
}
