//! Concurrent fan-out over repositories and the run-wide aggregate.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use a3s_reaper_core::RunConfig;
use chrono::{DateTime, Utc};
use tokio::task::JoinSet;
use tracing::Instrument;

use super::worker::{self, RepositoryOutcome};
use crate::registry::RegistryService;

/// Outcomes of every repository in a run, in configured order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunAggregate {
    order: Vec<String>,
    outcomes: HashMap<String, RepositoryOutcome>,
    not_found: HashSet<String>,
}

impl RunAggregate {
    /// Empty aggregate for the given repository order.
    pub fn new(repositories: Vec<String>) -> Self {
        Self {
            order: repositories,
            ..Default::default()
        }
    }

    /// Record the outcome of one repository. A later merge for the same
    /// repository replaces the earlier one.
    pub fn merge(&mut self, repository: &str, outcome: RepositoryOutcome) {
        if !self.order.iter().any(|r| r == repository) {
            self.order.push(repository.to_string());
        }
        if outcome == RepositoryOutcome::NotFound {
            self.not_found.insert(repository.to_string());
        } else {
            self.not_found.remove(repository);
        }
        self.outcomes.insert(repository.to_string(), outcome);
    }

    pub fn outcome(&self, repository: &str) -> Option<&RepositoryOutcome> {
        self.outcomes.get(repository)
    }

    /// Recorded outcomes in configured order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &RepositoryOutcome)> {
        self.order
            .iter()
            .filter_map(|r| self.outcomes.get(r).map(|o| (r.as_str(), o)))
    }

    /// Repositories that do not exist, in configured order.
    pub fn not_found(&self) -> impl Iterator<Item = &str> {
        self.order
            .iter()
            .filter(|r| self.not_found.contains(*r))
            .map(String::as_str)
    }

    /// Every configured repository has an outcome.
    pub fn is_complete(&self) -> bool {
        self.order.iter().all(|r| self.outcomes.contains_key(r))
    }

    pub fn len(&self) -> usize {
        self.outcomes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.outcomes.is_empty()
    }
}

/// Runs one worker task per repository and merges their outcomes.
pub struct RunCoordinator {
    registry: Arc<dyn RegistryService>,
}

impl RunCoordinator {
    pub fn new(registry: Arc<dyn RegistryService>) -> Self {
        Self { registry }
    }

    /// Process every configured repository; returns once all have finished.
    pub async fn run(&self, config: &RunConfig) -> RunAggregate {
        self.run_at(config, Utc::now()).await
    }

    /// Like [`run`](Self::run) with an explicit evaluation time.
    pub async fn run_at(&self, config: &RunConfig, now: DateTime<Utc>) -> RunAggregate {
        let shared = Arc::new(config.clone());
        let mut tasks = JoinSet::new();

        for repository in &config.repositories {
            let registry = Arc::clone(&self.registry);
            let config = Arc::clone(&shared);
            let repository = repository.clone();
            let span = tracing::info_span!("repository", repository = %repository);

            tasks.spawn(
                async move { worker::process(registry.as_ref(), &repository, &config, now).await }
                    .instrument(span),
            );
        }

        // join_next is the only writer of the aggregate.
        let mut aggregate = RunAggregate::new(config.repositories.clone());
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok(report) => {
                    if let Some(failure) = &report.failure {
                        tracing::error!(
                            repository = %report.repository,
                            error = %failure,
                            "Repository processing failed"
                        );
                    }
                    aggregate.merge(&report.repository, report.outcome);
                }
                Err(e) => tracing::error!(error = %e, "Repository worker aborted"),
            }
        }

        for repository in &config.repositories {
            if aggregate.outcome(repository).is_none() {
                aggregate.merge(repository, RepositoryOutcome::empty());
            }
        }

        aggregate
    }
}
