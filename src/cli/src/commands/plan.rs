//! `a3s-reaper plan` command: preview retention decisions.

use std::path::PathBuf;

use a3s_reaper_core::ReaperConfig;
use a3s_reaper_runtime::retention::list_images;
use a3s_reaper_runtime::{classify, connect};
use chrono::Utc;
use clap::Args;

use crate::output;

#[derive(Args)]
pub struct PlanArgs {
    /// YAML config file; environment variables override its values
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Only show images that would be deleted
    #[arg(long)]
    pub eligible_only: bool,
}

pub async fn execute(args: PlanArgs) -> Result<(), Box<dyn std::error::Error>> {
    let config = ReaperConfig::load(args.config.as_deref())?.run;
    let registry = connect(&config).await;
    let now = Utc::now();

    let mut table =
        output::new_table(&["REPOSITORY", "DIGEST", "TAGS", "PUSHED", "SIZE", "DECISION"]);
    let mut eligible = 0usize;
    let mut reclaimable = 0u64;

    for repository in &config.repositories {
        let images = match list_images(registry.as_ref(), repository).await {
            Ok(images) => images,
            Err(e) => {
                let status = if e.is_not_found() {
                    "not found".to_string()
                } else {
                    format!("error: {e}")
                };
                table.add_row(vec![repository.as_str(), "-", "-", "-", "-", status.as_str()]);
                continue;
            }
        };

        for image in images {
            let decision = classify(image, &config, now);
            if decision.is_delete() {
                eligible += 1;
                reclaimable += decision.image().size_bytes;
            } else if args.eligible_only {
                continue;
            }

            let image = decision.image();
            table.add_row(vec![
                repository.clone(),
                output::short_digest(&image.digest),
                image.tags.join(", "),
                output::format_ago(&image.pushed_at, now),
                output::format_bytes(image.size_bytes),
                decision.to_string(),
            ]);
        }
    }

    println!("{table}");
    println!();
    println!(
        "{} image(s) eligible for deletion, {} reclaimable",
        eligible,
        output::format_bytes(reclaimable)
    );
    Ok(())
}
