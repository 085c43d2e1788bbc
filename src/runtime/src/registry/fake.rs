//! In-memory registry used by engine tests.

use std::collections::{HashMap, HashSet};

use a3s_reaper_core::error::{ReaperError, Result};
use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use parking_lot::Mutex;

use super::{DeleteResponse, ImagePage, ImageRecord, RegistryService, RejectedImage};

/// Fixed "now" so age arithmetic in tests is stable.
pub(crate) fn fixed_now() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 1, 15, 12, 0, 0).unwrap()
}

/// An image pushed `age_days` before [`fixed_now`].
pub(crate) fn image(digest: &str, tags: &[&str], age_days: i64) -> ImageRecord {
    ImageRecord::new(
        digest,
        tags.iter().map(|t| t.to_string()).collect(),
        fixed_now() - chrono::Duration::days(age_days),
        1024,
    )
}

#[derive(Default)]
pub(crate) struct FakeRegistry {
    pages: HashMap<String, Vec<Vec<ImageRecord>>>,
    broken_listing: HashSet<String>,
    broken_delete: HashSet<String>,
    rejected: HashSet<String>,
    unanswered: HashSet<String>,
    panicking: HashSet<String>,
    failing_from_call: Option<usize>,
    cursors: HashMap<String, String>,
    batch_size: Option<usize>,
    pub(crate) list_calls: Mutex<Vec<(String, Option<String>)>>,
    pub(crate) delete_calls: Mutex<Vec<(String, Vec<String>)>>,
}

impl FakeRegistry {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn with_repository(self, name: &str, images: Vec<ImageRecord>) -> Self {
        self.with_pages(name, vec![images])
    }

    pub(crate) fn with_pages(mut self, name: &str, pages: Vec<Vec<ImageRecord>>) -> Self {
        self.pages.insert(name.to_string(), pages);
        self
    }

    pub(crate) fn with_broken_listing(mut self, name: &str) -> Self {
        self.broken_listing.insert(name.to_string());
        self
    }

    pub(crate) fn with_broken_delete(mut self, name: &str) -> Self {
        self.broken_delete.insert(name.to_string());
        self
    }

    pub(crate) fn with_rejected(mut self, digest: &str) -> Self {
        self.rejected.insert(digest.to_string());
        self
    }

    /// Leave `digest` out of every delete response.
    pub(crate) fn with_unanswered(mut self, digest: &str) -> Self {
        self.unanswered.insert(digest.to_string());
        self
    }

    /// Fail the `call`-th delete call (1-based) and every one after it.
    pub(crate) fn with_delete_failing_from_call(mut self, call: usize) -> Self {
        self.failing_from_call = Some(call);
        self
    }

    /// Panic while listing `name`.
    pub(crate) fn with_panicking_listing(mut self, name: &str) -> Self {
        self.panicking.insert(name.to_string());
        self
    }

    /// Make every page of `name` point back at the same cursor.
    pub(crate) fn with_looping_cursor(mut self, name: &str, cursor: &str) -> Self {
        self.cursors.insert(name.to_string(), cursor.to_string());
        self
    }

    pub(crate) fn with_batch_size(mut self, size: usize) -> Self {
        self.batch_size = Some(size);
        self
    }

    pub(crate) fn delete_calls(&self) -> Vec<(String, Vec<String>)> {
        self.delete_calls.lock().clone()
    }
}

#[async_trait]
impl RegistryService for FakeRegistry {
    async fn list_images(&self, repository: &str, cursor: Option<&str>) -> Result<ImagePage> {
        self.list_calls
            .lock()
            .push((repository.to_string(), cursor.map(str::to_string)));

        if self.panicking.contains(repository) {
            panic!("listing {repository} blew up");
        }
        if self.broken_listing.contains(repository) {
            return Err(ReaperError::unavailable("fake", "listing exploded"));
        }
        let pages = self
            .pages
            .get(repository)
            .ok_or_else(|| ReaperError::RepositoryNotFound {
                repository: repository.to_string(),
            })?;

        if let Some(looping) = self.cursors.get(repository) {
            return Ok(ImagePage {
                images: pages.first().cloned().unwrap_or_default(),
                next_cursor: Some(looping.clone()),
            });
        }

        let index = match cursor {
            None => 0,
            Some(c) => c
                .strip_prefix("page-")
                .and_then(|n| n.parse::<usize>().ok())
                .ok_or_else(|| ReaperError::unavailable("fake", format!("bad cursor {c}")))?,
        };
        let images = pages.get(index).cloned().unwrap_or_default();
        let next_cursor = (index + 1 < pages.len()).then(|| format!("page-{}", index + 1));
        Ok(ImagePage { images, next_cursor })
    }

    async fn delete_images(&self, repository: &str, digests: &[String]) -> Result<DeleteResponse> {
        let call = {
            let mut calls = self.delete_calls.lock();
            calls.push((repository.to_string(), digests.to_vec()));
            calls.len()
        };

        if self.failing_from_call.is_some_and(|from| call >= from) {
            return Err(ReaperError::unavailable("fake", format!("delete call {call} timed out")));
        }
        if self.broken_delete.contains(repository) {
            return Err(ReaperError::unavailable("fake", "delete exploded"));
        }

        let mut response = DeleteResponse::default();
        for digest in digests {
            if self.unanswered.contains(digest) {
                continue;
            }
            if self.rejected.contains(digest) {
                response.rejected.push(RejectedImage {
                    digest: digest.clone(),
                    reason: "ImageReferencedByManifestList".to_string(),
                });
            } else {
                response.removed.push(digest.clone());
            }
        }
        Ok(response)
    }

    fn max_batch_size(&self) -> usize {
        self.batch_size.unwrap_or(super::DEFAULT_MAX_BATCH_SIZE)
    }
}
