//! OpenAPI description served at `GET /openapi.json`

use serde_json::{json, Value};

fn error_response(description: &str) -> Value {
    json!({
        "description": description,
        "content": {
            "application/json": {"schema": {"$ref": "#/components/schemas/Error"}}
        }
    })
}

fn json_response(description: &str, schema: &str) -> Value {
    json!({
        "description": description,
        "content": {
            "application/json": {"schema": {"$ref": format!("#/components/schemas/{}", schema)}}
        }
    })
}

fn id_parameter() -> Value {
    json!({
        "in": "path",
        "name": "id",
        "required": true,
        "description": "ID of compose",
        "schema": {"type": "string", "format": "uuid", "example": "123e4567-e89b-12d3-a456-426655440000"}
    })
}

/// Build the document, reporting `version` as the service version
pub fn document(version: &str) -> Value {
    json!({
        "openapi": "3.0.1",
        "info": {
            "title": "OSBuild Composer cloud api",
            "description": "Service to build and install images.",
            "license": {"name": "Apache 2.0", "url": "https://www.apache.org/licenses/LICENSE-2.0.html"},
            "version": version
        },
        "servers": [{"url": "/"}],
        "paths": {
            "/version": {
                "get": {
                    "summary": "get the service version",
                    "operationId": "getVersion",
                    "responses": {"200": json_response("version", "Version")}
                }
            },
            "/openapi.json": {
                "get": {
                    "summary": "get the openapi json specification",
                    "operationId": "getOpenapiJson",
                    "responses": {
                        "200": {"description": "returns this document", "content": {"application/json": {}}}
                    }
                }
            },
            "/compose": {
                "post": {
                    "summary": "Create compose",
                    "description": "Create a new compose, potentially consisting of several images and upload each to their destinations.",
                    "operationId": "Compose",
                    "requestBody": {
                        "description": "details of image to be composed",
                        "required": true,
                        "content": {
                            "application/json": {"schema": {"$ref": "#/components/schemas/ComposeRequest"}}
                        }
                    },
                    "responses": {
                        "201": json_response("Compose has started", "ComposeResult"),
                        "400": error_response("Invalid compose request"),
                        "415": error_response("Request body is not JSON")
                    }
                }
            },
            "/compose/{id}": {
                "get": {
                    "summary": "The status of a compose",
                    "operationId": "ComposeStatus",
                    "parameters": [id_parameter()],
                    "responses": {
                        "200": json_response("compose status", "ComposeStatus"),
                        "400": error_response("Invalid compose id"),
                        "404": error_response("Unknown compose id")
                    }
                }
            },
            "/compose/{id}/metadata": {
                "get": {
                    "summary": "Get the metadata for a compose.",
                    "operationId": "ComposeMetadata",
                    "parameters": [id_parameter()],
                    "responses": {
                        "200": json_response("The metadata for the given compose.", "ComposeMetadata"),
                        "400": error_response("Invalid compose id"),
                        "404": error_response("Unknown compose id or metadata not available yet")
                    }
                }
            }
        },
        "components": {"schemas": schemas()}
    })
}

fn schemas() -> Value {
    json!({
        "Error": {
            "required": ["error"],
            "properties": {"error": {"type": "string"}}
        },
        "Version": {
            "required": ["version"],
            "properties": {"version": {"type": "string"}}
        },
        "ComposeRequest": {
            "type": "object",
            "required": ["distribution", "image_requests"],
            "properties": {
                "distribution": {"type": "string", "example": "rhel-8"},
                "customizations": {"$ref": "#/components/schemas/Customizations"},
                "image_requests": {
                    "type": "array",
                    "minItems": 1,
                    "items": {"$ref": "#/components/schemas/ImageRequest"}
                }
            }
        },
        "Customizations": {
            "type": "object",
            "properties": {
                "packages": {"type": "array", "items": {"type": "string"}, "example": ["postgres"]},
                "users": {"type": "array", "items": {"$ref": "#/components/schemas/User"}},
                "subscription": {"$ref": "#/components/schemas/Subscription"}
            }
        },
        "User": {
            "type": "object",
            "required": ["name"],
            "properties": {
                "name": {"type": "string", "example": "user1"},
                "key": {"type": "string", "example": "ssh-rsa AAAAB3NzaC1"},
                "groups": {"type": "array", "items": {"type": "string"}, "example": ["group1"]}
            }
        },
        "Subscription": {
            "type": "object",
            "required": ["organization", "activation-key", "server-url", "base-url", "insights"],
            "properties": {
                "organization": {"type": "integer", "example": 2040324},
                "activation-key": {"type": "string", "format": "password"},
                "server-url": {"type": "string", "example": "subscription.rhsm.redhat.com"},
                "base-url": {"type": "string", "format": "url", "example": "http://cdn.redhat.com/"},
                "insights": {"type": "boolean", "example": true}
            }
        },
        "ImageRequest": {
            "type": "object",
            "required": ["architecture", "image_type", "repositories", "upload_request"],
            "properties": {
                "architecture": {"type": "string", "example": "x86_64"},
                "image_type": {"type": "string", "example": "ami"},
                "ostree": {"$ref": "#/components/schemas/OSTree"},
                "repositories": {"type": "array", "items": {"$ref": "#/components/schemas/Repository"}},
                "upload_request": {"$ref": "#/components/schemas/UploadRequest"}
            }
        },
        "OSTree": {
            "type": "object",
            "properties": {
                "ref": {"type": "string", "example": "rhel/8/x86_64/edge"},
                "url": {"type": "string"}
            }
        },
        "Repository": {
            "type": "object",
            "required": ["rhsm"],
            "description": "Exactly one of baseurl, metalink or mirrorlist, which an RHSM repository may omit",
            "properties": {
                "baseurl": {"type": "string", "format": "url"},
                "metalink": {"type": "string", "format": "url"},
                "mirrorlist": {"type": "string", "format": "url"},
                "rhsm": {"type": "boolean"}
            }
        },
        "UploadRequest": {
            "type": "object",
            "required": ["type", "options"],
            "properties": {
                "type": {"$ref": "#/components/schemas/UploadTypes"},
                "options": {
                    "oneOf": [
                        {"$ref": "#/components/schemas/AWSUploadRequestOptions"},
                        {"$ref": "#/components/schemas/AWSS3UploadRequestOptions"},
                        {"$ref": "#/components/schemas/AzureUploadRequestOptions"},
                        {"$ref": "#/components/schemas/GCPUploadRequestOptions"}
                    ]
                }
            }
        },
        "UploadTypes": {
            "type": "string",
            "enum": ["aws", "aws.s3", "azure", "gcp"]
        },
        "AWSUploadRequestOptions": {
            "type": "object",
            "required": ["region", "ec2"],
            "properties": {
                "region": {"type": "string", "example": "eu-west-1"},
                "ec2": {"$ref": "#/components/schemas/AWSUploadRequestOptionsEc2"},
                "s3": {"$ref": "#/components/schemas/AWSUploadRequestOptionsS3"}
            }
        },
        "AWSUploadRequestOptionsEc2": {
            "type": "object",
            "required": ["access_key_id", "secret_access_key"],
            "properties": {
                "access_key_id": {"type": "string"},
                "secret_access_key": {"type": "string", "format": "password"},
                "snapshot_name": {"type": "string"},
                "share_with_accounts": {"type": "array", "items": {"type": "string"}}
            }
        },
        "AWSUploadRequestOptionsS3": {
            "type": "object",
            "required": ["access_key_id", "secret_access_key", "bucket"],
            "properties": {
                "access_key_id": {"type": "string"},
                "secret_access_key": {"type": "string", "format": "password"},
                "bucket": {"type": "string"}
            }
        },
        "AWSS3UploadRequestOptions": {
            "type": "object",
            "required": ["region", "s3"],
            "properties": {
                "region": {"type": "string", "example": "eu-west-1"},
                "s3": {"$ref": "#/components/schemas/AWSUploadRequestOptionsS3"}
            }
        },
        "AzureUploadRequestOptions": {
            "type": "object",
            "required": ["subscription_id", "tenant_id", "resource_group", "location"],
            "properties": {
                "subscription_id": {"type": "string"},
                "tenant_id": {"type": "string"},
                "resource_group": {"type": "string"},
                "location": {"type": "string", "example": "westeurope"},
                "image_name": {"type": "string"}
            }
        },
        "GCPUploadRequestOptions": {
            "type": "object",
            "required": ["bucket"],
            "properties": {
                "bucket": {"type": "string"},
                "image_name": {"type": "string"},
                "region": {"type": "string", "example": "eu"},
                "share_with_accounts": {"type": "array", "items": {"type": "string"}}
            }
        },
        "ComposeResult": {
            "type": "object",
            "required": ["id"],
            "properties": {"id": {"type": "string", "format": "uuid"}}
        },
        "ComposeStatus": {
            "type": "object",
            "required": ["image_status"],
            "properties": {"image_status": {"$ref": "#/components/schemas/ImageStatus"}}
        },
        "ImageStatus": {
            "type": "object",
            "required": ["status"],
            "properties": {
                "status": {
                    "type": "string",
                    "enum": ["success", "failure", "pending", "building", "uploading", "registering"]
                },
                "upload_status": {"$ref": "#/components/schemas/UploadStatus"}
            }
        },
        "UploadStatus": {
            "type": "object",
            "required": ["status", "type"],
            "properties": {
                "status": {"type": "string", "enum": ["success", "failure", "pending", "running"]},
                "type": {"$ref": "#/components/schemas/UploadTypes"},
                "options": {
                    "oneOf": [
                        {"$ref": "#/components/schemas/AWSUploadStatus"},
                        {"$ref": "#/components/schemas/AWSS3UploadStatus"},
                        {"$ref": "#/components/schemas/AzureUploadStatus"},
                        {"$ref": "#/components/schemas/GCPUploadStatus"}
                    ]
                }
            }
        },
        "AWSUploadStatus": {
            "type": "object",
            "required": ["ami", "region"],
            "properties": {
                "ami": {"type": "string", "example": "ami-0c830793775595d4b"},
                "region": {"type": "string", "example": "eu-west-1"}
            }
        },
        "AWSS3UploadStatus": {
            "type": "object",
            "required": ["url"],
            "properties": {"url": {"type": "string"}}
        },
        "AzureUploadStatus": {
            "type": "object",
            "required": ["image_name"],
            "properties": {"image_name": {"type": "string"}}
        },
        "GCPUploadStatus": {
            "type": "object",
            "required": ["image_name", "project_id"],
            "properties": {
                "image_name": {"type": "string"},
                "project_id": {"type": "string"}
            }
        },
        "ComposeMetadata": {
            "type": "object",
            "properties": {
                "ostree_commit": {"type": "string"},
                "packages": {"type": "array", "items": {"$ref": "#/components/schemas/PackageMetadata"}}
            }
        },
        "PackageMetadata": {
            "type": "object",
            "required": ["type", "name", "version", "release", "arch", "sigmd5"],
            "properties": {
                "type": {"type": "string"},
                "name": {"type": "string"},
                "version": {"type": "string"},
                "release": {"type": "string"},
                "epoch": {"type": "string"},
                "arch": {"type": "string"},
                "sigmd5": {"type": "string"},
                "signature": {"type": "string"}
            }
        }
    })
}
