//! Upload targets and the codec for their provider-specific payloads
//!
//! Upload requests and upload statuses travel as open envelopes:
//! `{"type": ..., "options": ...}` and `{"type": ..., "status": ..., "options": ...}`.
//! The `type` tag is always the authority on how `options` is read; the codec
//! never guesses a provider from the payload's fields.
//!
//! Two closed variant sets exist, [`UploadOptions`] for requests and
//! [`UploadResult`] for successful uploads. Both go through [`encode`] and
//! [`decode`], which dispatch on the tag through a fixed decoder table.
//!
//! Round trips are lossy: unknown fields inside `options` are
//! ignored when decoding and are not emitted again when encoding.

use serde::{de::DeserializeOwned, Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::str::FromStr;

use crate::error::CodecError;

/// Known upload providers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum UploadType {
    /// AWS EC2 image (AMI)
    #[serde(rename = "aws")]
    Aws,
    /// Plain object in an AWS S3 bucket
    #[serde(rename = "aws.s3")]
    AwsS3,
    /// Azure managed image
    #[serde(rename = "azure")]
    Azure,
    /// Google Compute Engine image
    #[serde(rename = "gcp")]
    Gcp,
}

impl UploadType {
    pub const ALL: [UploadType; 4] = [
        UploadType::Aws,
        UploadType::AwsS3,
        UploadType::Azure,
        UploadType::Gcp,
    ];

    /// Wire tag of this provider
    pub fn as_str(&self) -> &'static str {
        match self {
            UploadType::Aws => "aws",
            UploadType::AwsS3 => "aws.s3",
            UploadType::Azure => "azure",
            UploadType::Gcp => "gcp",
        }
    }

    /// Look up a wire tag
    pub fn from_tag(tag: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|t| t.as_str() == tag)
    }

    /// Whether an upload to this provider is followed by a VM image registration step
    pub fn requires_registration(&self) -> bool {
        !matches!(self, UploadType::AwsS3)
    }
}

impl fmt::Display for UploadType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for UploadType {
    type Err = CodecError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_tag(s).ok_or_else(|| CodecError::UnknownVariant(s.to_string()))
    }
}

/// EC2 credentials and image options
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AwsEc2Options {
    pub access_key_id: String,
    pub secret_access_key: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub snapshot_name: Option<String>,

    /// AWS account ids the resulting AMI is shared with
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub share_with_accounts: Option<Vec<String>>,
}

/// S3 credentials and destination bucket
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AwsS3Options {
    pub access_key_id: String,
    pub secret_access_key: String,
    pub bucket: String,
}

/// Options for `aws`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AwsUploadOptions {
    pub region: String,
    pub ec2: AwsEc2Options,

    /// Staging bucket used before the snapshot import
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub s3: Option<AwsS3Options>,
}

/// Options for `aws.s3`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AwsS3UploadOptions {
    pub region: String,
    pub s3: AwsS3Options,
}

/// Options for `azure`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AzureUploadOptions {
    pub subscription_id: String,
    pub tenant_id: String,
    pub resource_group: String,
    pub location: String,

    /// Must be unique within the resource group. Generated when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_name: Option<String>,
}

/// Options for `gcp`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GcpUploadOptions {
    /// Existing STANDARD storage class bucket
    pub bucket: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_name: Option<String>,

    /// Import region; the multi-region closest to the bucket when absent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub region: Option<String>,

    /// Accounts in `user:`, `serviceAccount:`, `group:` or `domain:` form
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub share_with_accounts: Option<Vec<String>>,
}

/// Provider-specific upload request payload
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UploadOptions {
    Aws(AwsUploadOptions),
    AwsS3(AwsS3UploadOptions),
    Azure(AzureUploadOptions),
    Gcp(GcpUploadOptions),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AwsUploadResult {
    pub ami: String,
    pub region: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AwsS3UploadResult {
    pub url: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AzureUploadResult {
    pub image_name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GcpUploadResult {
    pub image_name: String,
    pub project_id: String,
}

/// Provider-specific result of a finished upload
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UploadResult {
    Aws(AwsUploadResult),
    AwsS3(AwsS3UploadResult),
    Azure(AzureUploadResult),
    Gcp(GcpUploadResult),
}

/// Reads one provider's payload into the variant set
pub type Decoder<V> = fn(Value) -> Result<V, serde_json::Error>;

/// A closed set of provider payloads selected by an [`UploadType`] tag
pub trait Variant: Sized + 'static {
    /// Name of the payload family, used in error messages
    const KIND: &'static str;

    /// Discriminator to decoder table, one entry per provider
    const DECODERS: &'static [(UploadType, Decoder<Self>)];

    /// Provider this value belongs to
    fn upload_type(&self) -> UploadType;

    /// The provider's own field set
    fn payload(&self) -> Result<Value, serde_json::Error>;
}

fn read_as<T: DeserializeOwned, V>(value: Value, wrap: fn(T) -> V) -> Result<V, serde_json::Error> {
    if !value.is_object() {
        return Err(serde::de::Error::custom("expected a JSON object"));
    }
    serde_json::from_value(value).map(wrap)
}

impl Variant for UploadOptions {
    const KIND: &'static str = "upload options";

    const DECODERS: &'static [(UploadType, Decoder<Self>)] = &[
        (UploadType::Aws, |v: Value| read_as(v, UploadOptions::Aws)),
        (UploadType::AwsS3, |v: Value| read_as(v, UploadOptions::AwsS3)),
        (UploadType::Azure, |v: Value| read_as(v, UploadOptions::Azure)),
        (UploadType::Gcp, |v: Value| read_as(v, UploadOptions::Gcp)),
    ];

    fn upload_type(&self) -> UploadType {
        match self {
            UploadOptions::Aws(_) => UploadType::Aws,
            UploadOptions::AwsS3(_) => UploadType::AwsS3,
            UploadOptions::Azure(_) => UploadType::Azure,
            UploadOptions::Gcp(_) => UploadType::Gcp,
        }
    }

    fn payload(&self) -> Result<Value, serde_json::Error> {
        match self {
            UploadOptions::Aws(o) => serde_json::to_value(o),
            UploadOptions::AwsS3(o) => serde_json::to_value(o),
            UploadOptions::Azure(o) => serde_json::to_value(o),
            UploadOptions::Gcp(o) => serde_json::to_value(o),
        }
    }
}

impl Variant for UploadResult {
    const KIND: &'static str = "upload result";

    const DECODERS: &'static [(UploadType, Decoder<Self>)] = &[
        (UploadType::Aws, |v: Value| read_as(v, UploadResult::Aws)),
        (UploadType::AwsS3, |v: Value| read_as(v, UploadResult::AwsS3)),
        (UploadType::Azure, |v: Value| read_as(v, UploadResult::Azure)),
        (UploadType::Gcp, |v: Value| read_as(v, UploadResult::Gcp)),
    ];

    fn upload_type(&self) -> UploadType {
        match self {
            UploadResult::Aws(_) => UploadType::Aws,
            UploadResult::AwsS3(_) => UploadType::AwsS3,
            UploadResult::Azure(_) => UploadType::Azure,
            UploadResult::Gcp(_) => UploadType::Gcp,
        }
    }

    fn payload(&self) -> Result<Value, serde_json::Error> {
        match self {
            UploadResult::Aws(r) => serde_json::to_value(r),
            UploadResult::AwsS3(r) => serde_json::to_value(r),
            UploadResult::Azure(r) => serde_json::to_value(r),
            UploadResult::Gcp(r) => serde_json::to_value(r),
        }
    }
}

/// Render `variant` as the `options` payload for `tag`
pub fn encode<V: Variant>(tag: &str, variant: &V) -> Result<Value, CodecError> {
    let expected =
        UploadType::from_tag(tag).ok_or_else(|| CodecError::UnsupportedVariant(tag.to_string()))?;

    let found = variant.upload_type();
    if found != expected {
        return Err(CodecError::VariantMismatch { expected, found });
    }

    variant
        .payload()
        .map_err(|source| CodecError::MalformedVariant {
            upload_type: expected,
            kind: V::KIND,
            source,
        })
}

/// Read the `options` payload for `tag`
pub fn decode<V: Variant>(tag: &str, value: Value) -> Result<V, CodecError> {
    let upload_type: UploadType = tag.parse()?;

    let decoder = V::DECODERS
        .iter()
        .find(|(t, _)| *t == upload_type)
        .map(|(_, decoder)| *decoder)
        .ok_or_else(|| CodecError::UnknownVariant(tag.to_string()))?;

    decoder(value).map_err(|source| CodecError::MalformedVariant {
        upload_type,
        kind: V::KIND,
        source,
    })
}

/// Where a built image goes, as carried on the wire
///
/// `type` stays an open string so that payloads naming a provider unknown to
/// this build still parse; [`UploadRequest::decode`] fails closed on them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UploadRequest {
    #[serde(rename = "type")]
    pub upload_type: String,

    pub options: Value,
}

impl UploadRequest {
    pub fn new(options: &UploadOptions) -> Result<Self, CodecError> {
        let upload_type = options.upload_type();
        Ok(Self {
            upload_type: upload_type.as_str().to_string(),
            options: encode(upload_type.as_str(), options)?,
        })
    }

    pub fn decode(&self) -> Result<UploadOptions, CodecError> {
        decode(&self.upload_type, self.options.clone())
    }
}

/// Progress of one upload
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UploadStatusValue {
    Success,
    Failure,
    Pending,
    Running,
}

/// Upload progress as carried on the wire
///
/// `options` holds the provider result and is only present on success.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UploadStatus {
    #[serde(rename = "type")]
    pub upload_type: String,

    pub status: UploadStatusValue,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub options: Option<Value>,
}

impl UploadStatus {
    fn without_result(upload_type: UploadType, status: UploadStatusValue) -> Self {
        Self {
            upload_type: upload_type.as_str().to_string(),
            status,
            options: None,
        }
    }

    pub fn pending(upload_type: UploadType) -> Self {
        Self::without_result(upload_type, UploadStatusValue::Pending)
    }

    pub fn running(upload_type: UploadType) -> Self {
        Self::without_result(upload_type, UploadStatusValue::Running)
    }

    pub fn failure(upload_type: UploadType) -> Self {
        Self::without_result(upload_type, UploadStatusValue::Failure)
    }

    /// Successful upload to `upload_type`. The result must come from the same provider.
    pub fn success(upload_type: UploadType, result: &UploadResult) -> Result<Self, CodecError> {
        Ok(Self {
            upload_type: upload_type.as_str().to_string(),
            status: UploadStatusValue::Success,
            options: Some(encode(upload_type.as_str(), result)?),
        })
    }

    /// Typed result, `None` while the upload has not produced one
    pub fn decode_result(&self) -> Result<Option<UploadResult>, CodecError> {
        match &self.options {
            Some(value) => decode(&self.upload_type, value.clone()).map(Some),
            None => Ok(None),
        }
    }
}
