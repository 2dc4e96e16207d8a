//! Compose request validation
//!
//! Checks run in a fixed order and stop at the first violation.

use crate::compose::{ComposeRequest, Customizations, ImageRequest, Repository};
use crate::error::{CodecError, ValidationError};
use crate::upload::UploadOptions;

impl ComposeRequest {
    /// Validate the request, returning the first invariant it violates
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.distribution.trim().is_empty() {
            return Err(ValidationError::EmptyDistribution);
        }

        if self.image_requests.is_empty() {
            return Err(ValidationError::NoImageRequests);
        }

        for (idx, image) in self.image_requests.iter().enumerate() {
            validate_image_request(idx, image)?;
        }

        if let Some(customizations) = &self.customizations {
            validate_customizations(customizations)?;
        }

        Ok(())
    }

    /// Decoded upload target of every image request, in order
    pub fn upload_targets(&self) -> Result<Vec<UploadOptions>, ValidationError> {
        self.image_requests
            .iter()
            .enumerate()
            .map(|(idx, image)| decode_upload(idx, image))
            .collect()
    }
}

fn validate_image_request(idx: usize, image: &ImageRequest) -> Result<(), ValidationError> {
    if image.architecture.trim().is_empty() {
        return Err(ValidationError::EmptyArchitecture { image: idx });
    }

    if image.image_type.trim().is_empty() {
        return Err(ValidationError::EmptyImageType { image: idx });
    }

    if image.repositories.is_empty() {
        return Err(ValidationError::NoRepositories { image: idx });
    }

    for (repo_idx, repo) in image.repositories.iter().enumerate() {
        validate_repository(idx, repo_idx, repo)?;
    }

    decode_upload(idx, image).map(|_| ())
}

/// A repository names exactly one URL source; an RHSM repository may name none.
fn validate_repository(
    image: usize,
    repository: usize,
    repo: &Repository,
) -> Result<(), ValidationError> {
    match repo.source_count() {
        0 if !repo.rhsm => Err(ValidationError::RepositoryWithoutSource { image, repository }),
        0 | 1 => Ok(()),
        _ => Err(ValidationError::ConflictingRepositorySources { image, repository }),
    }
}

fn decode_upload(idx: usize, image: &ImageRequest) -> Result<UploadOptions, ValidationError> {
    image.upload_request.decode().map_err(|err| match err {
        CodecError::UnknownVariant(upload_type) => ValidationError::UnknownUploadType {
            image: idx,
            upload_type,
        },
        source => ValidationError::MalformedUploadRequest { image: idx, source },
    })
}

fn validate_customizations(customizations: &Customizations) -> Result<(), ValidationError> {
    for (idx, user) in customizations.users.iter().flatten().enumerate() {
        if user.name.trim().is_empty() {
            return Err(ValidationError::EmptyUserName { user: idx });
        }
    }

    Ok(())
}
