//! Run configuration.
//!
//! A run is configured once at startup from an optional YAML file with
//! environment variables layered on top. The resulting [`RunConfig`] is
//! read-only for the rest of the run and is passed by reference into
//! every component.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{ReaperError, Result};

/// Default minimum image age before it becomes eligible for deletion.
pub const DEFAULT_CUTOFF_DAYS: u32 = 30;

/// Default protected-tag substrings.
pub const DEFAULT_PROTECTED_TAGS: &[&str] = &["master", "main"];

/// Environment variable names read by [`ReaperConfig::resolve`].
pub mod env {
    pub const REPO_NAMES: &str = "REPO_NAMES";
    pub const REGISTRY_ID: &str = "REGISTRY_ID";
    pub const REGISTRY_ENDPOINT: &str = "REGISTRY_ENDPOINT";
    pub const DRY_RUN: &str = "DRY_RUN";
    pub const CUTOFF_DAYS: &str = "CUTOFF_DAYS";
    pub const PROTECTED_TAGS: &str = "PROTECTED_TAGS";
    pub const SLACK_WEBHOOK: &str = "SLACK_WEBHOOK";
    pub const REGISTRY_KIND: &str = "REGISTRY_KIND";
}

/// Which registry API a run talks to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RegistryKind {
    /// Amazon ECR, addressed by a 12-digit registry (account) id
    Ecr,
    /// Any registry speaking the OCI distribution API
    Distribution,
}

impl RegistryKind {
    /// ECR for a bare account id, the distribution API otherwise.
    pub fn detect(registry: &str) -> Self {
        if registry.len() == 12 && registry.bytes().all(|b| b.is_ascii_digit()) {
            RegistryKind::Ecr
        } else {
            RegistryKind::Distribution
        }
    }
}

impl std::str::FromStr for RegistryKind {
    type Err = ReaperError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "ecr" => Ok(RegistryKind::Ecr),
            "distribution" | "oci" => Ok(RegistryKind::Distribution),
            other => Err(ReaperError::ConfigError(format!(
                "unknown registry kind '{}' (expected ecr or distribution)",
                other
            ))),
        }
    }
}

/// Substring predicate marking tags that must never be deleted.
///
/// Matching is case-sensitive and may hit anywhere in the tag, so
/// `release-master-2` is protected by `master`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProtectedTags {
    substrings: Vec<String>,
}

impl ProtectedTags {
    /// Build a predicate from a list of substrings.
    ///
    /// An empty substring would match every tag and is rejected.
    pub fn new<I, S>(substrings: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let substrings: Vec<String> = substrings.into_iter().map(Into::into).collect();
        if substrings.iter().any(|s| s.is_empty()) {
            return Err(ReaperError::ConfigError(
                "protected tag substrings must not be empty".to_string(),
            ));
        }
        Ok(Self { substrings })
    }

    /// Whether a single tag is protected.
    pub fn matches(&self, tag: &str) -> bool {
        self.substrings.iter().any(|s| tag.contains(s.as_str()))
    }

    /// First tag in `tags` that is protected, if any.
    pub fn first_match<'a>(&self, tags: &'a [String]) -> Option<&'a str> {
        tags.iter().map(String::as_str).find(|t| self.matches(t))
    }

    /// The configured substrings.
    pub fn substrings(&self) -> &[String] {
        &self.substrings
    }
}

impl Default for ProtectedTags {
    fn default() -> Self {
        Self {
            substrings: DEFAULT_PROTECTED_TAGS.iter().map(|s| s.to_string()).collect(),
        }
    }
}

/// Immutable configuration of a single retention run.
#[derive(Debug, Clone)]
pub struct RunConfig {
    /// Repositories to process, de-duplicated, in configured order
    pub repositories: Vec<String>,
    /// Registry identifier (e.g. "ghcr.io", or an ECR account id)
    pub registry: String,
    /// Registry API used for listing and deletion
    pub kind: RegistryKind,
    /// Optional endpoint selector overriding the registry base URL
    pub endpoint: Option<String>,
    /// Minimum image age before deletion
    pub cutoff: chrono::Duration,
    /// Protected-tag predicate
    pub protected: ProtectedTags,
    /// Simulate deletions instead of performing them
    pub dry_run: bool,
}

impl RunConfig {
    /// Create a config with default cutoff, protected tags, and live mode.
    pub fn new<I, S>(repositories: I, registry: impl Into<String>) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut seen = std::collections::HashSet::new();
        let repositories: Vec<String> = repositories
            .into_iter()
            .map(|r| {
                let r: String = r.into();
                r.trim().to_string()
            })
            .filter(|r| !r.is_empty())
            .filter(|r| seen.insert(r.clone()))
            .collect();

        if repositories.is_empty() {
            return Err(ReaperError::ConfigError(
                "at least one repository must be configured".to_string(),
            ));
        }

        let registry: String = registry.into();
        let registry = registry.trim().to_string();
        if registry.is_empty() {
            return Err(ReaperError::ConfigError(
                "registry identifier must be configured".to_string(),
            ));
        }

        Ok(Self {
            repositories,
            kind: RegistryKind::detect(&registry),
            registry,
            endpoint: None,
            cutoff: chrono::Duration::days(DEFAULT_CUTOFF_DAYS as i64),
            protected: ProtectedTags::default(),
            dry_run: false,
        })
    }

    /// Override the cutoff age in whole days.
    pub fn with_cutoff_days(mut self, days: u32) -> Result<Self> {
        if days == 0 {
            return Err(ReaperError::ConfigError(
                "cutoff must be at least one day".to_string(),
            ));
        }
        self.cutoff = chrono::Duration::days(days as i64);
        Ok(self)
    }

    pub fn with_protected(mut self, protected: ProtectedTags) -> Self {
        self.protected = protected;
        self
    }

    pub fn with_kind(mut self, kind: RegistryKind) -> Self {
        self.kind = kind;
        self
    }

    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = Some(endpoint.into());
        self
    }

    pub fn with_dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }
}

/// On-disk configuration file (YAML). Every field is optional.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ConfigFile {
    pub repositories: Vec<String>,
    pub registry: Option<String>,
    pub registry_kind: Option<RegistryKind>,
    pub endpoint: Option<String>,
    pub dry_run: Option<bool>,
    pub cutoff_days: Option<u32>,
    pub protected_tags: Option<Vec<String>>,
    pub webhook_url: Option<String>,
}

impl ConfigFile {
    /// Read a YAML config file.
    pub fn from_path(path: &Path) -> Result<Self> {
        let data = std::fs::read_to_string(path).map_err(|e| {
            ReaperError::ConfigError(format!(
                "Failed to read config file {}: {}",
                path.display(),
                e
            ))
        })?;
        Ok(serde_yaml::from_str(&data)?)
    }
}

/// Everything a process needs to start a run.
#[derive(Debug, Clone)]
pub struct ReaperConfig {
    pub run: RunConfig,
    /// Notification webhook; `None` means the report is not delivered
    pub webhook_url: Option<String>,
}

impl ReaperConfig {
    /// Load from an optional config file and the process environment.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let file = match path {
            Some(path) => ConfigFile::from_path(path)?,
            None => ConfigFile::default(),
        };
        Self::resolve(file, |key| std::env::var(key).ok())
    }

    /// Merge a config file with environment values from `lookup`.
    ///
    /// Environment values win over file values. Blank values count as unset.
    pub fn resolve<F>(file: ConfigFile, lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let lookup = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let repositories = match lookup(env::REPO_NAMES) {
            Some(value) => split_list(&value),
            None => file.repositories,
        };
        if repositories.is_empty() {
            return Err(ReaperError::ConfigError(format!(
                "missing repository list (set {} or `repositories`)",
                env::REPO_NAMES
            )));
        }

        let registry = lookup(env::REGISTRY_ID)
            .or(file.registry)
            .ok_or_else(|| {
                ReaperError::ConfigError(format!(
                    "missing registry identifier (set {} or `registry`)",
                    env::REGISTRY_ID
                ))
            })?;

        let mut run = RunConfig::new(repositories, registry)?;

        let kind = match lookup(env::REGISTRY_KIND) {
            Some(value) => Some(value.parse::<RegistryKind>()?),
            None => file.registry_kind,
        };
        if let Some(kind) = kind {
            run = run.with_kind(kind);
        }

        if let Some(endpoint) = lookup(env::REGISTRY_ENDPOINT).or(file.endpoint) {
            run = run.with_endpoint(endpoint);
        }

        let cutoff_days = match lookup(env::CUTOFF_DAYS) {
            Some(value) => Some(value.trim().parse::<u32>().map_err(|e| {
                ReaperError::ConfigError(format!(
                    "invalid {} value '{}': {}",
                    env::CUTOFF_DAYS,
                    value,
                    e
                ))
            })?),
            None => file.cutoff_days,
        };
        if let Some(days) = cutoff_days {
            run = run.with_cutoff_days(days)?;
        }

        let protected = match lookup(env::PROTECTED_TAGS) {
            Some(value) => Some(split_list(&value)),
            None => file.protected_tags,
        };
        if let Some(protected) = protected {
            run = run.with_protected(ProtectedTags::new(protected)?);
        }

        // Only the literal "true" enables dry run from the environment.
        let dry_run = match lookup(env::DRY_RUN) {
            Some(value) => value == "true",
            None => file.dry_run.unwrap_or(false),
        };
        run = run.with_dry_run(dry_run);

        let webhook_url = lookup(env::SLACK_WEBHOOK).or(file.webhook_url);

        tracing::debug!(
            repositories = run.repositories.len(),
            registry = %run.registry,
            kind = ?run.kind,
            dry_run = run.dry_run,
            cutoff_days = run.cutoff.num_days(),
            "Resolved run configuration"
        );

        Ok(Self { run, webhook_url })
    }
}

/// Split a comma-separated list, trimming entries and dropping blanks.
fn split_list(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}
