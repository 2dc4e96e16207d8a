//! Compose request, result and metadata records

use serde::{Deserialize, Serialize};

use crate::upload::UploadRequest;

/// Request body of the submit operation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComposeRequest {
    /// Distribution to build (e.g. "fedora-35", "rhel-8")
    pub distribution: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub customizations: Option<Customizations>,

    pub image_requests: Vec<ImageRequest>,
}

/// Optional changes applied to every image of a compose
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Customizations {
    /// Extra packages to install
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub packages: Option<Vec<String>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub users: Option<Vec<User>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subscription: Option<Subscription>,
}

/// User account created in the image
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct User {
    pub name: String,

    /// Public SSH key
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub key: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub groups: Option<Vec<String>>,
}

/// Host subscription registration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Subscription {
    pub organization: i64,

    #[serde(rename = "activation-key")]
    pub activation_key: String,

    #[serde(rename = "server-url")]
    pub server_url: String,

    #[serde(rename = "base-url")]
    pub base_url: String,

    pub insights: bool,
}

/// One image of a compose
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImageRequest {
    pub architecture: String,

    /// Image type identifier (e.g. "ami", "vhd", "edge-commit")
    pub image_type: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ostree: Option<OsTree>,

    pub repositories: Vec<Repository>,

    pub upload_request: UploadRequest,
}

/// OSTree commit parameters
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct OsTree {
    #[serde(rename = "ref", default, skip_serializing_if = "Option::is_none")]
    pub reference: Option<String>,

    /// Parent commit repository
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
}

/// Package repository
///
/// `baseurl`, `metalink` and `mirrorlist` are alternatives.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Repository {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub baseurl: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metalink: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mirrorlist: Option<String>,

    /// Content is reached through the host's RHSM subscription
    pub rhsm: bool,
}

impl Repository {
    /// Number of populated URL sources
    pub fn source_count(&self) -> usize {
        [&self.baseurl, &self.metalink, &self.mirrorlist]
            .iter()
            .filter(|s| s.is_some())
            .count()
    }
}

/// Response body of the submit operation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ComposeResult {
    pub id: String,
}

/// What a compose actually built
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ComposeMetadata {
    /// ID (hash) of the built commit
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ostree_commit: Option<String>,

    /// Package list including NEVRA
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub packages: Option<Vec<PackageMetadata>>,
}

/// One installed package
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PackageMetadata {
    #[serde(rename = "type")]
    pub package_type: String,
    pub name: String,
    pub version: String,
    pub release: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub epoch: Option<String>,

    pub arch: String,
    pub sigmd5: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub signature: Option<String>,
}

/// Response body of the version operation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Version {
    pub version: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_example_request() {
        let request: ComposeRequest = serde_json::from_value(json!({
            "distribution": "fedora-35",
            "image_requests": [{
                "architecture": "x86_64",
                "image_type": "ami",
                "repositories": [{"baseurl": "https://example/repo", "rhsm": false}],
                "upload_request": {
                    "type": "aws",
                    "options": {
                        "region": "us-east-1",
                        "ec2": {"access_key_id": "AKIA...", "secret_access_key": "..."}
                    }
                }
            }]
        }))
        .unwrap();

        assert_eq!(request.distribution, "fedora-35");
        assert!(request.customizations.is_none());
        assert_eq!(request.image_requests.len(), 1);
        assert_eq!(request.image_requests[0].upload_request.upload_type, "aws");
        assert_eq!(request.image_requests[0].repositories[0].source_count(), 1);
    }

    #[test]
    fn test_subscription_hyphenated_fields() {
        let customizations: Customizations = serde_json::from_value(json!({
            "packages": ["postgres"],
            "subscription": {
                "organization": 2040324,
                "activation-key": "my-secret-key",
                "server-url": "subscription.rhsm.redhat.com",
                "base-url": "http://cdn.redhat.com/",
                "insights": true
            }
        }))
        .unwrap();

        let subscription = customizations.subscription.unwrap();
        assert_eq!(subscription.organization, 2040324);
        assert_eq!(subscription.activation_key, "my-secret-key");
        assert!(subscription.insights);
    }

    #[test]
    fn test_ostree_ref_field_name() {
        let ostree = OsTree {
            reference: Some("rhel/8/x86_64/edge".to_string()),
            url: None,
        };
        assert_eq!(
            serde_json::to_value(&ostree).unwrap(),
            json!({"ref": "rhel/8/x86_64/edge"})
        );
    }

    #[test]
    fn test_repository_requires_rhsm_flag() {
        assert!(serde_json::from_value::<Repository>(json!({"baseurl": "https://x"})).is_err());
    }

    #[test]
    fn test_metadata_omits_absent_fields() {
        assert_eq!(
            serde_json::to_value(ComposeMetadata::default()).unwrap(),
            json!({})
        );
    }

    #[test]
    fn test_package_metadata_wire_names() {
        let package = PackageMetadata {
            package_type: "rpm".to_string(),
            name: "bash".to_string(),
            version: "5.1.8".to_string(),
            release: "2.fc35".to_string(),
            epoch: None,
            arch: "x86_64".to_string(),
            sigmd5: "4f3b2c".to_string(),
            signature: None,
        };
        let json = serde_json::to_value(&package).unwrap();
        assert_eq!(json["type"], "rpm");
        assert!(json.get("epoch").is_none());
    }
}
