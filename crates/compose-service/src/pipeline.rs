//! Boundary to the image build pipeline
//!
//! The service does not build or upload images itself. A [`Pipeline`] does,
//! one stage at a time, and the worker turns stage outcomes into compose
//! status transitions.

use anyhow::{Context, Result};
use async_trait::async_trait;
use composer_common::{
    decode, upload::AwsS3UploadResult, upload::AwsUploadResult, upload::AzureUploadResult,
    upload::GcpUploadResult, Customizations, ImageRequest, PackageMetadata, UploadOptions,
    UploadRequest, UploadResult, Variant,
};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::io::ErrorKind;
use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio::process::{ChildStdin, Command};
use tracing::{debug, info};
use uuid::Uuid;

/// One image of a compose, as handed to the pipeline
#[derive(Debug, Clone, Serialize)]
pub struct ImageBuild<'a> {
    pub compose_id: Uuid,
    pub distribution: &'a str,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub customizations: Option<&'a Customizations>,

    pub image: &'a ImageRequest,
}

/// Output of the build stage
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BuildArtifacts {
    /// Commit hash for OSTree image types
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ostree_commit: Option<String>,

    /// Installed packages
    #[serde(default)]
    pub packages: Vec<PackageMetadata>,

    /// Where the pipeline left the image file
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_path: Option<String>,
}

/// Image build pipeline
#[async_trait]
pub trait Pipeline: Send + Sync {
    /// Build one image
    async fn build(&self, image: &ImageBuild<'_>) -> Result<BuildArtifacts>;

    /// Transfer a built image to its upload target
    async fn upload(
        &self,
        image: &ImageBuild<'_>,
        artifacts: &BuildArtifacts,
        target: &UploadOptions,
    ) -> Result<UploadResult>;

    /// Register an uploaded image as a VM image. Only called for providers that need it.
    async fn register(
        &self,
        _image: &ImageBuild<'_>,
        _target: &UploadOptions,
        uploaded: UploadResult,
    ) -> Result<UploadResult> {
        Ok(uploaded)
    }
}

/// Stage at which a [`MockPipeline`] can be told to fail
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Build,
    Upload,
    Register,
}

/// Pipeline producing plausible artifacts without building anything
#[derive(Debug, Clone, Default)]
pub struct MockPipeline {
    delay: Duration,
    fail_at: Option<Stage>,
}

const MOCK_BASE_PACKAGES: &[&str] = &["bash", "kernel", "systemd", "dnf"];

impl MockPipeline {
    pub fn new(delay: Duration) -> Self {
        Self {
            delay,
            fail_at: None,
        }
    }

    /// Fail every compose at `stage`
    pub fn failing_at(mut self, stage: Stage) -> Self {
        self.fail_at = Some(stage);
        self
    }

    async fn enter(&self, stage: Stage, image: &ImageBuild<'_>) -> Result<()> {
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        if self.fail_at == Some(stage) {
            anyhow::bail!("Mock pipeline failure at {:?} for compose {}", stage, image.compose_id);
        }
        Ok(())
    }

    fn package(name: &str, image: &ImageBuild<'_>) -> PackageMetadata {
        PackageMetadata {
            package_type: "rpm".to_string(),
            name: name.to_string(),
            version: "1.0".to_string(),
            release: format!("1.{}", image.distribution.replace('-', "")),
            epoch: None,
            arch: image.image.architecture.clone(),
            sigmd5: hex::encode(Uuid::new_v4().as_bytes()),
            signature: None,
        }
    }

    fn generated_name() -> String {
        format!("composer-api-{}", Uuid::new_v4())
    }
}

#[async_trait]
impl Pipeline for MockPipeline {
    async fn build(&self, image: &ImageBuild<'_>) -> Result<BuildArtifacts> {
        self.enter(Stage::Build, image).await?;

        let requested = image
            .customizations
            .and_then(|c| c.packages.as_ref())
            .into_iter()
            .flatten()
            .map(String::as_str);

        let packages = MOCK_BASE_PACKAGES
            .iter()
            .copied()
            .chain(requested)
            .map(|name| Self::package(name, image))
            .collect();

        let ostree_commit = (image.image.ostree.is_some() || image.image.image_type.contains("edge"))
            .then(|| {
                let mut commit = Uuid::new_v4().as_bytes().to_vec();
                commit.extend_from_slice(Uuid::new_v4().as_bytes());
                hex::encode(commit)
            });

        debug!("Mock build finished for compose {}", image.compose_id);

        Ok(BuildArtifacts {
            ostree_commit,
            packages,
            image_path: Some(format!("/var/tmp/{}/{}.img", image.compose_id, image.image.image_type)),
        })
    }

    async fn upload(
        &self,
        image: &ImageBuild<'_>,
        _artifacts: &BuildArtifacts,
        target: &UploadOptions,
    ) -> Result<UploadResult> {
        self.enter(Stage::Upload, image).await?;

        Ok(match target {
            UploadOptions::Aws(aws) => UploadResult::Aws(AwsUploadResult {
                ami: format!("ami-{}", &hex::encode(Uuid::new_v4().as_bytes())[..17]),
                region: aws.region.clone(),
            }),
            UploadOptions::AwsS3(s3) => UploadResult::AwsS3(AwsS3UploadResult {
                url: format!(
                    "https://{}.s3.{}.amazonaws.com/{}-{}",
                    s3.s3.bucket, s3.region, image.compose_id, image.image.image_type
                ),
            }),
            UploadOptions::Azure(azure) => UploadResult::Azure(AzureUploadResult {
                image_name: azure.image_name.clone().unwrap_or_else(Self::generated_name),
            }),
            UploadOptions::Gcp(gcp) => UploadResult::Gcp(GcpUploadResult {
                image_name: gcp.image_name.clone().unwrap_or_else(Self::generated_name),
                project_id: "composer-mock-project".to_string(),
            }),
        })
    }

    async fn register(
        &self,
        image: &ImageBuild<'_>,
        _target: &UploadOptions,
        uploaded: UploadResult,
    ) -> Result<UploadResult> {
        self.enter(Stage::Register, image).await?;
        Ok(uploaded)
    }
}

/// Provider result printed by the builder command, `{"type": ..., "options": ...}`
#[derive(Debug, Deserialize)]
struct StageResult {
    #[serde(rename = "type")]
    upload_type: String,
    options: Value,
}

/// Pipeline delegating every stage to an external builder command
///
/// The command is invoked as `<program> <args...> <stage>` with `build`,
/// `upload` or `register` as the stage, receives a JSON document on stdin
/// and prints a JSON document on stdout. A non-zero exit fails the stage.
pub struct CommandPipeline {
    program: String,
    args: Vec<String>,
    work_dir: PathBuf,
}

impl CommandPipeline {
    pub fn new(program: String, args: Vec<String>, work_dir: PathBuf) -> Self {
        Self {
            program,
            args,
            work_dir,
        }
    }

    /// Build from a whitespace separated command line
    pub fn from_command_line(command: &str, work_dir: PathBuf) -> Result<Self> {
        let mut parts = command.split_whitespace().map(str::to_string);
        let program = parts.next().context("Builder command is empty")?;
        Ok(Self::new(program, parts.collect(), work_dir))
    }

    async fn run_stage(&self, stage: &str, compose_id: Uuid, input: &Value) -> Result<Vec<u8>> {
        // Each compose gets its own working directory
        let job_dir = self.work_dir.join(compose_id.to_string());
        tokio::fs::create_dir_all(&job_dir)
            .await
            .with_context(|| format!("Failed to create job directory {}", job_dir.display()))?;

        info!("Running {} stage for compose: {}", stage, compose_id);

        let mut child = Command::new(&self.program)
            .args(&self.args)
            .arg(stage)
            .current_dir(&job_dir)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .with_context(|| format!("Failed to execute builder {}", self.program))?;

        let payload = serde_json::to_vec(input).context("Failed to serialize stage input")?;
        let stdin = child.stdin.take().context("Builder stdin unavailable")?;

        // Feed stdin while stdout and stderr are drained
        let (written, output) = tokio::join!(write_input(stdin, payload), child.wait_with_output());
        let output = output.context("Failed to wait for builder")?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            anyhow::bail!("{} stage failed: {}", stage, stderr.trim());
        }

        written.context("Failed to write stage input")?;
        Ok(output.stdout)
    }

    async fn run_upload_stage(
        &self,
        stage: &str,
        compose_id: Uuid,
        target: &UploadOptions,
        input: Value,
    ) -> Result<UploadResult> {
        let stdout = self.run_stage(stage, compose_id, &input).await?;
        let result: StageResult = serde_json::from_slice(&stdout)
            .with_context(|| format!("Invalid {} stage output", stage))?;

        if result.upload_type != target.upload_type().as_str() {
            anyhow::bail!(
                "{} stage reported a {} result for a {} upload",
                stage,
                result.upload_type,
                target.upload_type()
            );
        }

        decode(&result.upload_type, result.options)
            .with_context(|| format!("Invalid {} stage result", stage))
    }
}

/// A builder may exit without reading its input
async fn write_input(mut stdin: ChildStdin, payload: Vec<u8>) -> std::io::Result<()> {
    match stdin.write_all(&payload).await {
        Err(e) if e.kind() == ErrorKind::BrokenPipe => Ok(()),
        result => result,
    }
}

#[derive(Serialize)]
struct UploadInput<'a> {
    image: &'a ImageBuild<'a>,
    artifacts: &'a BuildArtifacts,
    target: UploadRequest,
}

#[derive(Serialize)]
struct RegisterInput<'a> {
    image: &'a ImageBuild<'a>,
    target: UploadRequest,
    uploaded: Value,
}

#[async_trait]
impl Pipeline for CommandPipeline {
    async fn build(&self, image: &ImageBuild<'_>) -> Result<BuildArtifacts> {
        let input = serde_json::to_value(image).context("Failed to serialize build input")?;
        let stdout = self.run_stage("build", image.compose_id, &input).await?;
        serde_json::from_slice(&stdout).context("Invalid build stage output")
    }

    async fn upload(
        &self,
        image: &ImageBuild<'_>,
        artifacts: &BuildArtifacts,
        target: &UploadOptions,
    ) -> Result<UploadResult> {
        let input = serde_json::to_value(UploadInput {
            image,
            artifacts,
            target: UploadRequest::new(target)?,
        })
        .context("Failed to serialize upload input")?;

        self.run_upload_stage("upload", image.compose_id, target, input)
            .await
    }

    async fn register(
        &self,
        image: &ImageBuild<'_>,
        target: &UploadOptions,
        uploaded: UploadResult,
    ) -> Result<UploadResult> {
        let input = serde_json::to_value(RegisterInput {
            image,
            target: UploadRequest::new(target)?,
            uploaded: uploaded.payload()?,
        })
        .context("Failed to serialize register input")?;

        self.run_upload_stage("register", image.compose_id, target, input)
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use composer_common::{ComposeRequest, UploadType};
    use serde_json::json;

    fn request(upload: Value) -> ComposeRequest {
        serde_json::from_value(json!({
            "distribution": "rhel-8",
            "customizations": {"packages": ["postgres"]},
            "image_requests": [{
                "architecture": "x86_64",
                "image_type": "edge-commit",
                "repositories": [{"baseurl": "https://example/repo", "rhsm": false}],
                "upload_request": upload
            }]
        }))
        .unwrap()
    }

    fn s3_upload() -> Value {
        json!({
            "type": "aws.s3",
            "options": {
                "region": "eu-west-1",
                "s3": {"access_key_id": "AKIA", "secret_access_key": "secret", "bucket": "images"}
            }
        })
    }

    fn image_build<'a>(compose_id: Uuid, request: &'a ComposeRequest) -> ImageBuild<'a> {
        ImageBuild {
            compose_id,
            distribution: &request.distribution,
            customizations: request.customizations.as_ref(),
            image: &request.image_requests[0],
        }
    }

    #[tokio::test]
    async fn test_mock_build_includes_requested_packages() {
        let request = request(s3_upload());
        let build = image_build(Uuid::new_v4(), &request);

        let artifacts = MockPipeline::default().build(&build).await.unwrap();

        assert!(artifacts.packages.iter().any(|p| p.name == "postgres"));
        assert!(artifacts.packages.iter().all(|p| p.arch == "x86_64"));
        assert_eq!(artifacts.ostree_commit.map(|c| c.len()), Some(64));
    }

    #[tokio::test]
    async fn test_mock_upload_matches_target_provider() {
        let request = request(s3_upload());
        let build = image_build(Uuid::new_v4(), &request);
        let target = request.image_requests[0].upload_request.decode().unwrap();

        let pipeline = MockPipeline::default();
        let artifacts = pipeline.build(&build).await.unwrap();
        let result = pipeline.upload(&build, &artifacts, &target).await.unwrap();

        assert_eq!(result.upload_type(), UploadType::AwsS3);
        match result {
            UploadResult::AwsS3(s3) => assert!(s3.url.starts_with("https://images.s3.eu-west-1")),
            other => panic!("unexpected result: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_mock_failure_injection() {
        let request = request(s3_upload());
        let build = image_build(Uuid::new_v4(), &request);

        let result = MockPipeline::default()
            .failing_at(Stage::Build)
            .build(&build)
            .await;
        assert!(result.is_err());
    }

    fn script_pipeline(dir: &tempfile::TempDir, script: &str) -> CommandPipeline {
        let path = dir.path().join("builder.sh");
        std::fs::write(&path, script).unwrap();
        CommandPipeline::new(
            "sh".to_string(),
            vec![path.to_string_lossy().to_string()],
            dir.path().join("work"),
        )
    }

    #[tokio::test]
    async fn test_command_pipeline_stages() {
        let dir = tempfile::tempdir().unwrap();
        let pipeline = script_pipeline(
            &dir,
            r#"cat > /dev/null
case "$1" in
  build) echo '{"packages":[{"type":"rpm","name":"bash","version":"5.1","release":"1","arch":"x86_64","sigmd5":"abc"}]}' ;;
  upload) echo '{"type":"aws.s3","options":{"url":"https://images/compose.img","etag":"1"}}' ;;
  *) echo "unexpected stage $1" >&2; exit 3 ;;
esac
"#,
        );

        let request = request(s3_upload());
        let compose_id = Uuid::new_v4();
        let build = image_build(compose_id, &request);
        let target = request.image_requests[0].upload_request.decode().unwrap();

        let artifacts = pipeline.build(&build).await.unwrap();
        assert_eq!(artifacts.packages.len(), 1);
        assert_eq!(artifacts.packages[0].name, "bash");
        assert!(dir.path().join("work").join(compose_id.to_string()).is_dir());

        let result = pipeline.upload(&build, &artifacts, &target).await.unwrap();
        assert_eq!(
            result,
            UploadResult::AwsS3(AwsS3UploadResult {
                url: "https://images/compose.img".to_string()
            })
        );

        let err = pipeline.register(&build, &target, result).await.unwrap_err();
        assert!(err.to_string().contains("unexpected stage register"));
    }

    #[tokio::test]
    async fn test_command_pipeline_rejects_foreign_result() {
        let dir = tempfile::tempdir().unwrap();
        let pipeline = script_pipeline(
            &dir,
            r#"cat > /dev/null
echo '{"type":"gcp","options":{"image_name":"img","project_id":"p"}}'
"#,
        );

        let request = request(s3_upload());
        let build = image_build(Uuid::new_v4(), &request);
        let target = request.image_requests[0].upload_request.decode().unwrap();

        let err = pipeline
            .upload(&build, &BuildArtifacts::default(), &target)
            .await
            .unwrap_err();
        assert!(err.to_string().contains("gcp result for a aws.s3 upload"));
    }

    #[tokio::test]
    async fn test_command_pipeline_builder_ignoring_large_input() {
        let dir = tempfile::tempdir().unwrap();
        // Fills the stdout pipe and exits without reading stdin
        let pipeline = script_pipeline(
            &dir,
            r#"head -c 200000 /dev/zero | tr '\0' ' '
echo '{"packages":[]}'
"#,
        );

        let mut request = request(s3_upload());
        request.customizations = Some(Customizations {
            packages: Some((0..20_000).map(|i| format!("package-{}", i)).collect()),
            ..Default::default()
        });
        let build = image_build(Uuid::new_v4(), &request);

        let artifacts = tokio::time::timeout(Duration::from_secs(30), pipeline.build(&build))
            .await
            .expect("Builder stage hung")
            .unwrap();
        assert!(artifacts.packages.is_empty());
    }

    #[test]
    fn test_command_line_parsing() {
        let pipeline =
            CommandPipeline::from_command_line("/usr/bin/builder --verbose", PathBuf::from("/tmp"))
                .unwrap();
        assert_eq!(pipeline.program, "/usr/bin/builder");
        assert_eq!(pipeline.args, vec!["--verbose".to_string()]);

        assert!(CommandPipeline::from_command_line("   ", PathBuf::from("/tmp")).is_err());
    }
}
