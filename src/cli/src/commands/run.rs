//! `a3s-reaper run` command: one retention run.

use std::path::PathBuf;

use a3s_reaper_core::ReaperConfig;
use a3s_reaper_runtime::{connect, handle, strip_markup, NotificationSink, WebhookSink};
use clap::Args;

#[derive(Args)]
pub struct RunArgs {
    /// YAML config file; environment variables override its values
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Report what would be deleted without deleting anything
    #[arg(long)]
    pub dry_run: bool,

    /// Invocation payload (JSON), echoed back in the completion message
    #[arg(long)]
    pub event: Option<String>,
}

pub async fn execute(args: RunArgs) -> Result<(), Box<dyn std::error::Error>> {
    if let Some(path) = &args.config {
        tracing::debug!(path = %path.display(), "Loading config file");
    }
    let mut config = ReaperConfig::load(args.config.as_deref())?;
    if args.dry_run {
        config.run = config.run.with_dry_run(true);
    }

    let event = match args.event {
        Some(raw) => serde_json::from_str(&raw)?,
        None => serde_json::Value::Null,
    };

    let registry = connect(&config.run).await;
    let sink = WebhookSink::from_url(config.webhook_url.as_deref());

    let completion = handle(
        event,
        &config.run,
        registry,
        sink.as_ref().map(|s| s as &dyn NotificationSink),
    )
    .await?;

    println!("{}", strip_markup(&completion.report));
    println!();
    println!("{}", serde_json::to_string(&completion)?);
    Ok(())
}
