//! Full, paginated repository listing.

use std::collections::{HashMap, HashSet};

use a3s_reaper_core::error::{ReaperError, Result};

use crate::registry::{ImageRecord, RegistryService};

/// Fetch every image of `repository`, following the pagination cursor.
///
/// Pages are concatenated in the order received. A digest seen again on a
/// later page is folded into its first occurrence so digests stay unique.
pub async fn list_images(
    registry: &dyn RegistryService,
    repository: &str,
) -> Result<Vec<ImageRecord>> {
    let mut images: Vec<ImageRecord> = Vec::new();
    let mut positions: HashMap<String, usize> = HashMap::new();
    let mut seen_cursors: HashSet<String> = HashSet::new();
    let mut cursor: Option<String> = None;
    let mut pages = 0usize;

    loop {
        let page = registry.list_images(repository, cursor.as_deref()).await?;
        pages += 1;

        for image in page.images {
            match positions.get(&image.digest) {
                Some(&i) => {
                    let existing = &mut images[i];
                    for tag in image.tags {
                        if !existing.tags.contains(&tag) {
                            existing.tags.push(tag);
                        }
                    }
                }
                None => {
                    positions.insert(image.digest.clone(), images.len());
                    images.push(image);
                }
            }
        }

        match page.next_cursor {
            Some(next) => {
                if !seen_cursors.insert(next.clone()) {
                    return Err(ReaperError::unavailable(
                        repository,
                        format!("pagination cursor '{}' repeated", next),
                    ));
                }
                cursor = Some(next);
            }
            None => break,
        }
    }

    tracing::debug!(repository, pages, images = images.len(), "Listed repository");
    Ok(images)
}
