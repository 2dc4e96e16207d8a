//! Image Composer common types
//!
//! Transport-independent core of the compose API: the wire records, the
//! codec for provider-specific upload payloads, the compose status lifecycle
//! and request validation.

pub mod compose;
pub mod error;
pub mod status;
pub mod upload;
mod validation;

pub use compose::{
    ComposeMetadata, ComposeRequest, ComposeResult, Customizations, ImageRequest, OsTree,
    PackageMetadata, Repository, Subscription, User, Version,
};
pub use error::{CodecError, StatusError, ValidationError};
pub use status::{ComposeStatus, ImageStatus, ImageStatusValue};
pub use upload::{
    decode, encode, UploadOptions, UploadRequest, UploadResult, UploadStatus, UploadStatusValue,
    UploadType, Variant,
};
