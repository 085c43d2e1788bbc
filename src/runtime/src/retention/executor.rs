//! Batched (or simulated) deletion.

use std::collections::HashSet;

use a3s_reaper_core::error::ReaperError;

use crate::registry::{ImageRecord, RegistryService};

/// Tags removed and tags the registry refused to remove, in input order.
///
/// In dry-run mode `deleted_tags` holds the tags that would be deleted.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeletionResult {
    pub deleted_tags: Vec<String>,
    pub failed_tags: Vec<String>,
}

/// A delete call failed partway through the batches.
///
/// `partial` keeps what earlier batches settled; the failed batch and every
/// batch after it are in `partial.failed_tags`.
#[derive(Debug)]
pub struct Interrupted {
    pub partial: DeletionResult,
    pub error: ReaperError,
}

/// Delete `eligible` from `repository`, or simulate it when `dry_run` is set.
///
/// Digests are sent in chunks no larger than the registry's batch limit.
/// All tags of an image land in the same bucket.
pub async fn execute(
    registry: &dyn RegistryService,
    repository: &str,
    eligible: &[ImageRecord],
    dry_run: bool,
) -> Result<DeletionResult, Interrupted> {
    let mut result = DeletionResult::default();

    if eligible.is_empty() {
        return Ok(result);
    }

    if dry_run {
        for image in eligible {
            tracing::info!(
                repository,
                digest = %image.digest,
                tags = ?image.tags,
                "Would delete image"
            );
            result.deleted_tags.extend(image.tags.iter().cloned());
        }
        return Ok(result);
    }

    let batch_size = registry.max_batch_size().max(1);
    for (index, batch) in eligible.chunks(batch_size).enumerate() {
        let digests: Vec<String> = batch.iter().map(|i| i.digest.clone()).collect();

        tracing::info!(repository, images = digests.len(), "Deleting images");
        let response = match registry.delete_images(repository, &digests).await {
            Ok(response) => response,
            Err(error) => {
                let unsettled = &eligible[index * batch_size..];
                tracing::warn!(
                    repository,
                    error = %error,
                    unsettled = unsettled.len(),
                    "Delete call failed; remaining images counted as failed"
                );
                for image in unsettled {
                    result.failed_tags.extend(image.tags.iter().cloned());
                }
                return Err(Interrupted {
                    partial: result,
                    error,
                });
            }
        };

        let removed: HashSet<&str> = response.removed.iter().map(String::as_str).collect();
        let rejected: HashSet<&str> = response
            .rejected
            .iter()
            .map(|r| r.digest.as_str())
            .collect();

        for r in &response.rejected {
            tracing::warn!(
                repository,
                digest = %r.digest,
                reason = %r.reason,
                "Registry declined to delete image"
            );
        }

        for image in batch {
            if removed.contains(image.digest.as_str()) {
                result.deleted_tags.extend(image.tags.iter().cloned());
            } else {
                if !rejected.contains(image.digest.as_str()) {
                    tracing::warn!(
                        repository,
                        digest = %image.digest,
                        "Registry returned no result for image; counting it as failed"
                    );
                }
                result.failed_tags.extend(image.tags.iter().cloned());
            }
        }
    }

    tracing::info!(
        repository,
        deleted = result.deleted_tags.len(),
        failed = result.failed_tags.len(),
        "Deletion finished"
    );
    Ok(result)
}
