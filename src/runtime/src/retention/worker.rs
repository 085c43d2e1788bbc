//! Per-repository processing with failure isolation.

use a3s_reaper_core::error::ReaperError;
use a3s_reaper_core::RunConfig;
use chrono::{DateTime, Utc};

use super::classifier::{classify, RetentionDecision};
use super::{executor, lister};
use crate::registry::RegistryService;

/// What a repository contributed to the run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RepositoryOutcome {
    NotFound,
    Processed {
        untagged_count: usize,
        deleted_tags: Vec<String>,
        failed_tags: Vec<String>,
    },
}

impl RepositoryOutcome {
    /// Nothing eligible found, nothing deleted.
    pub fn empty() -> Self {
        RepositoryOutcome::Processed {
            untagged_count: 0,
            deleted_tags: Vec::new(),
            failed_tags: Vec::new(),
        }
    }
}

/// Outcome of one worker plus the failure it swallowed, if any.
#[derive(Debug)]
pub struct WorkerReport {
    pub repository: String,
    pub outcome: RepositoryOutcome,
    pub failure: Option<ReaperError>,
}

impl WorkerReport {
    fn new(repository: &str, outcome: RepositoryOutcome, failure: Option<ReaperError>) -> Self {
        Self {
            repository: repository.to_string(),
            outcome,
            failure,
        }
    }
}

/// List, classify, and delete for one repository.
///
/// Never fails: a missing repository yields `NotFound`. A listing error
/// yields an empty outcome; a delete call error keeps whatever was settled
/// before it. Either error is handed back in `failure`.
pub async fn process(
    registry: &dyn RegistryService,
    repository: &str,
    config: &RunConfig,
    now: DateTime<Utc>,
) -> WorkerReport {
    let images = match lister::list_images(registry, repository).await {
        Ok(images) => images,
        Err(e) if e.is_not_found() => {
            tracing::warn!(repository, "Repository not found");
            return WorkerReport::new(repository, RepositoryOutcome::NotFound, None);
        }
        Err(e) => return WorkerReport::new(repository, RepositoryOutcome::empty(), Some(e)),
    };

    let total = images.len();
    let mut untagged_count = 0usize;
    let mut eligible = Vec::new();
    for image in images {
        match classify(image, config, now) {
            RetentionDecision::Untagged(_) => untagged_count += 1,
            RetentionDecision::Delete(image) => eligible.push(image),
            RetentionDecision::Keep { .. } => {}
        }
    }

    tracing::info!(
        repository,
        total,
        untagged = untagged_count,
        eligible = eligible.len(),
        "Classified images"
    );

    match executor::execute(registry, repository, &eligible, config.dry_run).await {
        Ok(result) => WorkerReport::new(
            repository,
            RepositoryOutcome::Processed {
                untagged_count,
                deleted_tags: result.deleted_tags,
                failed_tags: result.failed_tags,
            },
            None,
        ),
        Err(interrupted) => WorkerReport::new(
            repository,
            RepositoryOutcome::Processed {
                untagged_count,
                deleted_tags: interrupted.partial.deleted_tags,
                failed_tags: interrupted.partial.failed_tags,
            },
            Some(interrupted.error),
        ),
    }
}
