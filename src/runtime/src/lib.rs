//! A3S Reaper Runtime - registry retention engine.
//!
//! Lists every image of each configured repository, classifies it against
//! the retention policy, deletes (or simulates deleting) the stale ones,
//! and renders a single report for the run.

pub mod handler;
pub mod notify;
pub mod registry;
pub mod report;
pub mod retention;

// Re-export common types
pub use handler::{handle, Completion, SUCCESS_MESSAGE};
pub use notify::{NotificationSink, WebhookSink};
pub use registry::{
    connect, DeleteResponse, DistributionRegistry, EcrRegistry, ImagePage, ImageRecord,
    RegistryCredentials, RegistryService, RejectedImage,
};
pub use report::{render, strip_markup, NOTHING_TO_DO};
pub use retention::{
    classify, KeepReason, RepositoryOutcome, RetentionDecision, RunAggregate, RunCoordinator,
};

/// A3S Reaper Runtime version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
