//! Amazon ECR adapter.
//!
//! `DescribeImages` lists every manifest of a repository, tagged or not,
//! and `BatchDeleteImage` removes up to 100 digests per call. Credentials
//! and region come from the default AWS provider chain.

use a3s_reaper_core::error::{ReaperError, Result};
use a3s_reaper_core::RunConfig;
use async_trait::async_trait;
use aws_sdk_ecr::error::DisplayErrorContext;
use aws_sdk_ecr::operation::batch_delete_image::BatchDeleteImageOutput;
use aws_sdk_ecr::types::{ImageDetail, ImageFailure, ImageIdentifier};
use aws_sdk_ecr::Client;
use chrono::{DateTime, Utc};

use super::{DeleteResponse, ImagePage, ImageRecord, RegistryService, RejectedImage};

/// Images requested per `DescribeImages` page.
const PAGE_SIZE: i32 = 100;

/// Digests accepted by one `BatchDeleteImage` call.
const BATCH_LIMIT: usize = 100;

/// Registry client for Amazon ECR.
pub struct EcrRegistry {
    client: Client,
    registry_id: String,
}

impl EcrRegistry {
    pub fn new(client: Client, registry_id: impl Into<String>) -> Self {
        Self {
            client,
            registry_id: registry_id.into(),
        }
    }

    /// Client for a run. The endpoint override, if any, replaces the
    /// service URL (e.g. a local ECR emulator).
    pub async fn from_config(config: &RunConfig) -> Self {
        let shared = aws_config::load_defaults(aws_config::BehaviorVersion::latest()).await;
        let mut builder = aws_sdk_ecr::config::Builder::from(&shared);
        if let Some(endpoint) = &config.endpoint {
            builder = builder.endpoint_url(endpoint);
        }
        Self::new(Client::from_conf(builder.build()), config.registry.clone())
    }

    pub fn registry_id(&self) -> &str {
        &self.registry_id
    }

    fn unavailable(&self, what: &str, err: impl std::fmt::Display) -> ReaperError {
        ReaperError::unavailable(self.registry_id.clone(), format!("Failed to {}: {}", what, err))
    }
}

#[async_trait]
impl RegistryService for EcrRegistry {
    async fn list_images(&self, repository: &str, cursor: Option<&str>) -> Result<ImagePage> {
        tracing::debug!(repository, cursor = ?cursor, "Describing images");

        let output = self
            .client
            .describe_images()
            .registry_id(&self.registry_id)
            .repository_name(repository)
            .max_results(PAGE_SIZE)
            .set_next_token(cursor.map(str::to_string))
            .send()
            .await;

        let output = match output {
            Ok(output) => output,
            Err(e)
                if e.as_service_error()
                    .is_some_and(|s| s.is_repository_not_found_exception()) =>
            {
                return Err(ReaperError::RepositoryNotFound {
                    repository: repository.to_string(),
                })
            }
            Err(e) => {
                return Err(self.unavailable(
                    &format!("describe images of {}", repository),
                    DisplayErrorContext(&e),
                ))
            }
        };

        let now = Utc::now();
        let images = output
            .image_details()
            .iter()
            .filter_map(|detail| image_record(detail, now))
            .collect();

        Ok(ImagePage {
            images,
            next_cursor: output.next_token().map(str::to_string),
        })
    }

    async fn delete_images(&self, repository: &str, digests: &[String]) -> Result<DeleteResponse> {
        let ids: Vec<ImageIdentifier> = digests
            .iter()
            .map(|digest| ImageIdentifier::builder().image_digest(digest).build())
            .collect();

        let output = self
            .client
            .batch_delete_image()
            .registry_id(&self.registry_id)
            .repository_name(repository)
            .set_image_ids(Some(ids))
            .send()
            .await
            .map_err(|e| {
                self.unavailable(
                    &format!("delete images from {}", repository),
                    DisplayErrorContext(&e),
                )
            })?;

        Ok(delete_response(&output))
    }

    fn max_batch_size(&self) -> usize {
        BATCH_LIMIT
    }
}

/// Convert one `DescribeImages` entry. Entries without a digest are dropped;
/// a missing push time counts as `now`, so the image is kept.
fn image_record(detail: &ImageDetail, now: DateTime<Utc>) -> Option<ImageRecord> {
    let digest = detail.image_digest()?;
    let pushed_at = detail
        .image_pushed_at()
        .and_then(|t| DateTime::<Utc>::from_timestamp(t.secs(), t.subsec_nanos()))
        .unwrap_or(now);
    let size = detail.image_size_in_bytes().unwrap_or(0).max(0) as u64;

    Some(ImageRecord::new(
        digest,
        detail.image_tags().to_vec(),
        pushed_at,
        size,
    ))
}

/// ECR reports one identifier per removed tag; collapse them to digests.
fn delete_response(output: &BatchDeleteImageOutput) -> DeleteResponse {
    let mut response = DeleteResponse::default();

    for id in output.image_ids() {
        if let Some(digest) = id.image_digest() {
            if !response.removed.iter().any(|d| d == digest) {
                response.removed.push(digest.to_string());
            }
        }
    }

    for failure in output.failures() {
        if let Some(digest) = failure.image_id().and_then(|id| id.image_digest()) {
            response.rejected.push(RejectedImage {
                digest: digest.to_string(),
                reason: failure_reason(failure),
            });
        }
    }

    response
}

fn failure_reason(failure: &ImageFailure) -> String {
    match (failure.failure_code(), failure.failure_reason()) {
        (Some(code), Some(reason)) => format!("{}: {}", code.as_str(), reason),
        (Some(code), None) => code.as_str().to_string(),
        (None, Some(reason)) => reason.to_string(),
        (None, None) => "unknown failure".to_string(),
    }
}
