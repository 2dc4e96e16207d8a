//! Compose worker - drives queued composes through the pipeline

use crate::models::ComposeJob;
use crate::pipeline::{BuildArtifacts, ImageBuild, Pipeline};
use crate::storage::ComposeStore;
use anyhow::{Context, Result};
use composer_common::{
    ComposeMetadata, ImageStatusValue, UploadOptions, UploadResult, UploadStatus, Variant,
};
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};

/// Compose worker
pub struct Worker {
    id: usize,
    store: Arc<dyn ComposeStore>,
    pipeline: Arc<dyn Pipeline>,
    poll_timeout: Duration,
}

impl Worker {
    /// Create a new worker
    pub fn new(id: usize, store: Arc<dyn ComposeStore>, pipeline: Arc<dyn Pipeline>) -> Self {
        Self {
            id,
            store,
            pipeline,
            poll_timeout: Duration::from_secs(5),
        }
    }

    /// How long a single queue poll blocks
    pub fn with_poll_timeout(mut self, poll_timeout: Duration) -> Self {
        self.poll_timeout = poll_timeout;
        self
    }

    /// Start the worker loop
    pub async fn run(&self) -> Result<()> {
        info!("Compose worker {} started, waiting for composes...", self.id);

        loop {
            match self.store.pop(self.poll_timeout).await {
                Ok(Some(job)) => {
                    info!("Worker {} processing compose: {}", self.id, job.id);
                    if let Err(e) = self.process(job).await {
                        error!("Failed to record compose outcome: {:#}", e);
                    }
                }
                Ok(None) => {}
                Err(e) => {
                    error!("Error popping compose from queue: {:#}", e);
                    tokio::time::sleep(Duration::from_secs(1)).await;
                }
            }
        }
    }

    /// Run one compose to a terminal state and store every step
    ///
    /// Errors returned here are storage errors. Pipeline failures end in a
    /// stored `failure` status instead.
    pub async fn process(&self, job: ComposeJob) -> Result<ComposeJob> {
        let building = job.advance(ImageStatusValue::Building)?;
        self.store.update(&building).await?;

        let mut current = building;
        match self.run_pipeline(&mut current).await {
            Ok(()) => {
                info!("Compose completed: {}", current.id);
                Ok(current)
            }
            Err(e) => {
                warn!("Compose failed: {} - {:#}", current.id, e);
                let failed = current.mark_failed(format!("{:#}", e))?;
                self.store.update(&failed).await?;
                Ok(failed)
            }
        }
    }

    /// Store `next`, then make it the current record. `job` always holds the
    /// last record that reached the store.
    async fn persist(&self, job: &mut ComposeJob, next: ComposeJob) -> Result<()> {
        self.store.update(&next).await?;
        *job = next;
        Ok(())
    }

    /// Stage results are written to `job` as they are stored
    async fn run_pipeline(&self, job: &mut ComposeJob) -> Result<()> {
        let targets = job.request.upload_targets()?;
        let primary = targets
            .first()
            .map(|target| target.upload_type())
            .context("Compose has no image requests")?;

        // Build every image before anything is uploaded
        let request = job.request.clone();
        let builds: Vec<ImageBuild<'_>> = request
            .image_requests
            .iter()
            .map(|image| ImageBuild {
                compose_id: job.id,
                distribution: &request.distribution,
                customizations: request.customizations.as_ref(),
                image,
            })
            .collect();

        let mut artifacts = Vec::with_capacity(builds.len());
        for build in &builds {
            artifacts.push(self.pipeline.build(build).await?);
        }

        let uploading = job
            .with_metadata(collect_metadata(&artifacts))
            .advance(ImageStatusValue::Uploading)?
            .with_upload_status(UploadStatus::running(primary));
        self.persist(job, uploading).await?;

        let mut uploaded = Vec::with_capacity(builds.len());
        for ((build, built), target) in builds.iter().zip(&artifacts).zip(&targets) {
            uploaded.push(self.pipeline.upload(build, built, target).await?);
        }

        if targets.iter().any(|t| t.upload_type().requires_registration()) {
            let registering = job.advance(ImageStatusValue::Registering)?;
            self.persist(job, registering).await?;

            uploaded = self.register_all(&builds, &targets, uploaded).await?;
        }

        let primary_result = uploaded
            .first()
            .context("Pipeline produced no upload result")?;

        let success = job
            .advance(ImageStatusValue::Success)?
            .with_upload_status(UploadStatus::success(primary, primary_result)?);
        self.persist(job, success).await
    }

    async fn register_all(
        &self,
        builds: &[ImageBuild<'_>],
        targets: &[UploadOptions],
        uploaded: Vec<UploadResult>,
    ) -> Result<Vec<UploadResult>> {
        let mut registered = Vec::with_capacity(uploaded.len());
        for ((build, target), result) in builds.iter().zip(targets).zip(uploaded) {
            if target.upload_type().requires_registration() {
                registered.push(self.pipeline.register(build, target, result).await?);
            } else {
                registered.push(result);
            }
        }
        Ok(registered)
    }
}

/// Packages of every image in request order; the first OSTree commit wins.
fn collect_metadata(artifacts: &[BuildArtifacts]) -> ComposeMetadata {
    ComposeMetadata {
        ostree_commit: artifacts.iter().find_map(|a| a.ostree_commit.clone()),
        packages: Some(
            artifacts
                .iter()
                .flat_map(|a| a.packages.iter().cloned())
                .collect(),
        ),
    }
}
