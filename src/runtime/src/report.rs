//! Plain-text run report.
//!
//! Repository names are wrapped in backticks so they render as code in chat
//! tools; use [`strip_markup`] before writing the report to logs.

use crate::retention::{RepositoryOutcome, RunAggregate};

/// Report text when the run found nothing to report.
pub const NOTHING_TO_DO: &str = "Reaper ran but no images needed cleaning up";

const HEADER: &str = "Reaper has cleaned up the registry!";
const RULE: &str = "===================================================";

/// Render the aggregate. Same aggregate, same text.
pub fn render(aggregate: &RunAggregate, dry_run: bool) -> String {
    let not_found: Vec<&str> = aggregate.not_found().collect();
    let mut untagged: Vec<(&str, usize)> = Vec::new();
    let mut deleted: Vec<(&str, &[String])> = Vec::new();
    let mut failed: Vec<(&str, &[String])> = Vec::new();

    for (repository, outcome) in aggregate.iter() {
        if let RepositoryOutcome::Processed {
            untagged_count,
            deleted_tags,
            failed_tags,
        } = outcome
        {
            if *untagged_count > 0 {
                untagged.push((repository, *untagged_count));
            }
            if !deleted_tags.is_empty() {
                deleted.push((repository, deleted_tags.as_slice()));
            }
            if !dry_run && !failed_tags.is_empty() {
                failed.push((repository, failed_tags.as_slice()));
            }
        }
    }

    if not_found.is_empty() && untagged.is_empty() && deleted.is_empty() && failed.is_empty() {
        return NOTHING_TO_DO.to_string();
    }

    let marker = if dry_run { " [DRY RUN]" } else { "" };
    let mut text = String::from(HEADER);

    if !not_found.is_empty() {
        section(
            &mut text,
            &format!("Repositories not found ({}){}", not_found.len(), marker),
            not_found.iter().map(|r| code(r)),
        );
    }

    if !untagged.is_empty() {
        section(
            &mut text,
            &format!(
                "Repositories with untagged images ({}){}",
                untagged.len(),
                marker
            ),
            untagged.iter().map(|(r, n)| {
                format!("{} - {} {}", code(r), n, plural(*n, "image", "images"))
            }),
        );
    }

    if !deleted.is_empty() {
        let title = if dry_run {
            format!(
                "Repositories with images that would be deleted ({}){}",
                deleted.len(),
                marker
            )
        } else {
            format!("Repositories with images deleted ({})", deleted.len())
        };
        section(&mut text, &title, deleted.iter().map(|(r, tags)| tag_line(r, tags)));
    }

    if !failed.is_empty() {
        section(
            &mut text,
            &format!(
                "Repositories with images that failed to delete ({})",
                failed.len()
            ),
            failed.iter().map(|(r, tags)| tag_line(r, tags)),
        );
    }

    text
}

/// Remove chat markup for plain log output.
pub fn strip_markup(text: &str) -> String {
    text.replace('`', "")
}

fn section(text: &mut String, title: &str, lines: impl Iterator<Item = String>) {
    text.push_str("\n\n\n");
    text.push_str(RULE);
    text.push('\n');
    text.push_str(title);
    text.push('\n');
    text.push_str(RULE);
    for line in lines {
        text.push('\n');
        text.push_str(&line);
    }
}

fn tag_line(repository: &str, tags: &[String]) -> String {
    format!(
        "{} ({} {}): {}",
        code(repository),
        tags.len(),
        plural(tags.len(), "tag", "tags"),
        tags.join(", ")
    )
}

fn code(s: &str) -> String {
    format!("`{}`", s)
}

fn plural<'a>(n: usize, one: &'a str, many: &'a str) -> &'a str {
    if n == 1 {
        one
    } else {
        many
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn processed(untagged: usize, deleted: &[&str], failed: &[&str]) -> RepositoryOutcome {
        RepositoryOutcome::Processed {
            untagged_count: untagged,
            deleted_tags: deleted.iter().map(|s| s.to_string()).collect(),
            failed_tags: failed.iter().map(|s| s.to_string()).collect(),
        }
    }

    fn aggregate(entries: &[(&str, RepositoryOutcome)]) -> RunAggregate {
        let mut aggregate =
            RunAggregate::new(entries.iter().map(|(r, _)| r.to_string()).collect());
        for (repository, outcome) in entries {
            aggregate.merge(repository, outcome.clone());
        }
        aggregate
    }

    #[test]
    fn test_nothing_to_do() {
        let agg = aggregate(&[("a", processed(0, &[], &[])), ("b", RepositoryOutcome::empty())]);
        assert_eq!(render(&agg, false), NOTHING_TO_DO);
        assert_eq!(render(&agg, true), NOTHING_TO_DO);
        assert_eq!(render(&RunAggregate::default(), false), NOTHING_TO_DO);
    }

    #[test]
    fn test_live_scenario() {
        let agg = aggregate(&[("A", processed(0, &["1.0.0-other", "dont-ignore-this"], &[]))]);
        let expected = format!(
            "{HEADER}\n\n\n{RULE}\nRepositories with images deleted (1)\n{RULE}\n\
             `A` (2 tags): 1.0.0-other, dont-ignore-this"
        );
        assert_eq!(render(&agg, false), expected);
    }

    #[test]
    fn test_dry_run_scenario() {
        let agg = aggregate(&[("A", processed(0, &["1.0.0-other", "dont-ignore-this"], &[]))]);
        let text = render(&agg, true);
        assert!(text.contains("Repositories with images that would be deleted (1) [DRY RUN]"));
        assert!(text.contains("`A` (2 tags): 1.0.0-other, dont-ignore-this"));
        assert!(!text.contains("Repositories with images deleted"));
    }

    #[test]
    fn test_not_found_section() {
        let agg = aggregate(&[("A", processed(0, &[], &[])), ("B", RepositoryOutcome::NotFound)]);
        let expected = format!(
            "{HEADER}\n\n\n{RULE}\nRepositories not found (1)\n{RULE}\n`B`"
        );
        assert_eq!(render(&agg, false), expected);
    }

    #[test]
    fn test_section_order_and_repository_order() {
        let agg = aggregate(&[
            ("z", processed(1, &["z1"], &["z2"])),
            ("gone", RepositoryOutcome::NotFound),
            ("a", processed(3, &["a1"], &["a2", "a3"])),
        ]);
        let text = render(&agg, false);

        let positions: Vec<usize> = [
            "Repositories not found (1)",
            "Repositories with untagged images (2)",
            "Repositories with images deleted (2)",
            "Repositories with images that failed to delete (2)",
        ]
        .iter()
        .map(|title| text.find(title).unwrap())
        .collect();
        assert!(positions.windows(2).all(|w| w[0] < w[1]));

        assert!(text.contains("`z` - 1 image\n`a` - 3 images"));
        assert!(text.contains("`z` (1 tag): z1\n`a` (1 tag): a1"));
        assert!(text.ends_with("`z` (1 tag): z2\n`a` (2 tags): a2, a3"));
    }

    #[test]
    fn test_failed_section_only_in_live_mode() {
        let agg = aggregate(&[("a", processed(0, &[], &["v1"]))]);
        assert!(render(&agg, false).contains("failed to delete"));
        assert_eq!(render(&agg, true), NOTHING_TO_DO);
    }

    #[test]
    fn test_dry_run_marks_every_section() {
        let agg = aggregate(&[("a", processed(2, &["v1"], &[])), ("b", RepositoryOutcome::NotFound)]);
        let text = render(&agg, true);
        assert!(text.contains("Repositories not found (1) [DRY RUN]"));
        assert!(text.contains("Repositories with untagged images (1) [DRY RUN]"));
    }

    #[test]
    fn test_render_is_deterministic() {
        let agg = aggregate(&[
            ("a", processed(2, &["v1", "v2"], &["v3"])),
            ("b", RepositoryOutcome::NotFound),
            ("c", processed(0, &["x"], &[])),
        ]);
        let first = render(&agg, false);
        for _ in 0..10 {
            assert_eq!(render(&agg.clone(), false), first);
        }
    }

    #[test]
    fn test_strip_markup() {
        assert_eq!(strip_markup("`a` (1 tag): v1"), "a (1 tag): v1");
    }
}
