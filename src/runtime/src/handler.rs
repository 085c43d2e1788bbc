//! Run entry point invoked once per trigger.

use std::sync::Arc;

use a3s_reaper_core::error::Result;
use a3s_reaper_core::RunConfig;
use serde::{Deserialize, Serialize};
use tracing::Instrument;
use uuid::Uuid;

use crate::notify::NotificationSink;
use crate::registry::RegistryService;
use crate::report;
use crate::retention::RunCoordinator;

/// Message returned to the trigger on success.
pub const SUCCESS_MESSAGE: &str = "reaper executed successfully!";

/// Completion signal handed back to the trigger.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Completion {
    pub message: String,
    /// The invocation payload, echoed back unchanged
    pub event: serde_json::Value,
    /// Rendered report (with chat markup)
    #[serde(skip)]
    pub report: String,
}

/// Run every repository, render the report, and deliver it.
///
/// Per-repository failures are absorbed into the report. Only a failure to
/// deliver the report is returned as an error.
pub async fn handle(
    event: serde_json::Value,
    config: &RunConfig,
    registry: Arc<dyn RegistryService>,
    sink: Option<&dyn NotificationSink>,
) -> Result<Completion> {
    let run_id = Uuid::new_v4();
    let span = tracing::info_span!("run", run_id = %run_id, dry_run = config.dry_run);

    async move {
        tracing::info!(
            registry = %config.registry,
            repositories = config.repositories.len(),
            cutoff_days = config.cutoff.num_days(),
            "Starting retention run"
        );

        let aggregate = RunCoordinator::new(registry).run(config).await;
        let text = report::render(&aggregate, config.dry_run);
        tracing::info!("{}", report::strip_markup(&text));

        match sink {
            Some(sink) => {
                if let Err(e) = sink.send(&text).await {
                    tracing::error!(error = %e, "Failed to deliver report");
                    return Err(e);
                }
            }
            None => tracing::debug!("No notification sink configured"),
        }

        Ok(Completion {
            message: SUCCESS_MESSAGE.to_string(),
            event,
            report: text,
        })
    }
    .instrument(span)
    .await
}
