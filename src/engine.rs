// Container engine access (image listing)

use anyhow::{Context, Result};
use async_trait::async_trait;
use bollard::image::ListImagesOptions;
use bollard::Docker;
use std::path::PathBuf;
use tracing::debug;

use crate::image::ImageRecord;

/// Source of the local image list
#[async_trait]
pub trait ImageLister: Send + Sync {
    /// Return every local image in the order the engine reports them
    async fn list_images(&self) -> Result<Vec<ImageRecord>>;
}

/// Docker (or any Docker-API compatible engine) reached over its local socket
pub struct DockerEngine {
    docker: Docker,
}

impl DockerEngine {
    /// Connect using `DOCKER_HOST` or the platform default socket
    pub fn connect() -> Result<Self> {
        let docker = Docker::connect_with_local_defaults()
            .context("Failed to connect to the container engine")?;
        Ok(Self { docker })
    }
}

#[async_trait]
impl ImageLister for DockerEngine {
    async fn list_images(&self) -> Result<Vec<ImageRecord>> {
        let summaries = self
            .docker
            .list_images(Some(ListImagesOptions::<String> {
                all: false,
                ..Default::default()
            }))
            .await
            .context("Failed to list images from container engine")?;

        debug!("Container engine reported {} images", summaries.len());

        Ok(summaries
            .into_iter()
            .map(|summary| ImageRecord {
                id: summary.id,
                repo_tags: summary.repo_tags,
                repo_digests: summary.repo_digests,
            })
            .collect())
    }
}

/// Images read from the output of `docker image inspect`
///
/// Useful when the engine socket is not reachable from where the tool runs.
pub struct InspectFile {
    path: PathBuf,
}

impl InspectFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

#[async_trait]
impl ImageLister for InspectFile {
    async fn list_images(&self) -> Result<Vec<ImageRecord>> {
        let contents = tokio::fs::read_to_string(&self.path)
            .await
            .with_context(|| format!("Failed to read {}", self.path.display()))?;

        let records: Vec<ImageRecord> = serde_json::from_str(&contents)
            .with_context(|| format!("Failed to parse image list in {}", self.path.display()))?;

        debug!(
            "Read {} images from {}",
            records.len(),
            self.path.display()
        );

        Ok(records)
    }
}
