//! Container registry interface.
//!
//! The retention engine only needs two remote operations: a paginated
//! image listing and a batched delete. [`RegistryService`] is that narrow
//! seam. [`EcrRegistry`] implements it over the ECR API, which lists
//! untagged manifests too; [`DistributionRegistry`] implements it over the
//! OCI distribution API, which only sees tagged ones.

mod distribution;
mod ecr;
#[cfg(test)]
pub(crate) mod fake;

use std::sync::Arc;

use a3s_reaper_core::error::Result;
use a3s_reaper_core::{RegistryKind, RunConfig};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub use distribution::{DistributionRegistry, RegistryCredentials};
pub use ecr::EcrRegistry;

/// Default per-call limit on the number of digests in one delete request.
pub const DEFAULT_MAX_BATCH_SIZE: usize = 100;

/// Snapshot of one image in a repository.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageRecord {
    /// Content digest, unique within the repository
    pub digest: String,
    /// Tags pointing at this image, possibly empty
    pub tags: Vec<String>,
    /// When the image was pushed
    pub pushed_at: DateTime<Utc>,
    /// Image size in bytes
    pub size_bytes: u64,
}

impl ImageRecord {
    pub fn new(
        digest: impl Into<String>,
        tags: Vec<String>,
        pushed_at: DateTime<Utc>,
        size_bytes: u64,
    ) -> Self {
        Self {
            digest: digest.into(),
            tags,
            pushed_at,
            size_bytes,
        }
    }

    pub fn is_untagged(&self) -> bool {
        self.tags.is_empty()
    }
}

/// One page of a repository listing.
#[derive(Debug, Clone, Default)]
pub struct ImagePage {
    pub images: Vec<ImageRecord>,
    /// Cursor for the next page; `None` when the listing is exhausted
    pub next_cursor: Option<String>,
}

/// A digest the registry declined to remove.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RejectedImage {
    pub digest: String,
    pub reason: String,
}

/// Per-image result of a batched delete.
#[derive(Debug, Clone, Default)]
pub struct DeleteResponse {
    /// Digests confirmed removed
    pub removed: Vec<String>,
    /// Digests the registry declined to remove
    pub rejected: Vec<RejectedImage>,
}

/// Remote registry operations used by the retention engine.
#[async_trait]
pub trait RegistryService: Send + Sync {
    /// Fetch one page of images. `cursor` is `None` for the first page.
    ///
    /// Must fail with `RepositoryNotFound` when the repository does not
    /// exist and `RegistryUnavailable` for any other failure.
    async fn list_images(&self, repository: &str, cursor: Option<&str>) -> Result<ImagePage>;

    /// Delete a batch of images by digest.
    ///
    /// Individual refusals are reported in the response; an `Err` means the
    /// call as a whole could not be completed.
    async fn delete_images(&self, repository: &str, digests: &[String]) -> Result<DeleteResponse>;

    /// Maximum number of digests accepted by one `delete_images` call.
    fn max_batch_size(&self) -> usize {
        DEFAULT_MAX_BATCH_SIZE
    }
}

/// Registry client for a run, chosen by the configured registry kind.
pub async fn connect(config: &RunConfig) -> Arc<dyn RegistryService> {
    tracing::debug!(registry = %config.registry, kind = ?config.kind, "Connecting to registry");
    match config.kind {
        RegistryKind::Ecr => Arc::new(EcrRegistry::from_config(config).await),
        RegistryKind::Distribution => Arc::new(DistributionRegistry::from_config(config)),
    }
}
