//! A3S Reaper Core - Foundational Types
//!
//! Error taxonomy and run configuration shared by the retention
//! runtime and the CLI.

pub mod config;
pub mod error;

// Re-export commonly used types
pub use config::{ConfigFile, ProtectedTags, ReaperConfig, RegistryKind, RunConfig};
pub use error::{ReaperError, Result};

/// A3S Reaper version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
