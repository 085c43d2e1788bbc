//! Retention engine.
//!
//! ```text
//! RunCoordinator ──┬── worker(repo A): lister → classifier → executor
//!                  ├── worker(repo B): lister → classifier → executor
//!                  └── ...
//!                  ▼
//!             RunAggregate ──► report::render
//! ```
//!
//! Workers never share state; the coordinator is the only writer of the
//! aggregate.

pub mod classifier;
pub mod coordinator;
pub mod executor;
pub mod lister;
pub mod worker;

pub use classifier::{classify, KeepReason, RetentionDecision};
pub use coordinator::{RunAggregate, RunCoordinator};
pub use executor::{execute, DeletionResult, Interrupted};
pub use lister::list_images;
pub use worker::{process, RepositoryOutcome, WorkerReport};
