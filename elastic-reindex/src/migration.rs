//! Inventory both clusters, diff them and migrate whatever is missing

use chrono::{DateTime, Utc};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::instrument;

use crate::differ::{diff, restrict};
use crate::dispatcher::Dispatcher;
use crate::driver::{JobDriver, PollPolicy};
use crate::engine::JobEngine;
use crate::inventory::Inventory;
use crate::models::{MigrationOutcome, MigrationPlan};
use crate::sink::Sink;
use crate::{Conf, Error};

/// The knobs for a single migration run
#[derive(Debug, Clone, PartialEq)]
pub struct MigrationSettings {
    /// Only migrate these indexes if any are set
    pub indexes: Vec<String>,
    /// The max number of reindex tasks to run at once
    pub concurrent_tasks: usize,
    /// How to poll reindex tasks
    pub policy: PollPolicy,
    /// Also reindex indexes whose document counts differ
    pub remigrate_partial: bool,
}

impl Default for MigrationSettings {
    fn default() -> Self {
        MigrationSettings {
            indexes: Vec::default(),
            concurrent_tasks: 1,
            policy: PollPolicy::default(),
            remigrate_partial: false,
        }
    }
}

impl MigrationSettings {
    /// Pull the migration settings from our config
    ///
    /// # Arguments
    ///
    /// * `conf` - The reindex config
    pub fn from_conf(conf: &Conf) -> Self {
        MigrationSettings {
            indexes: conf.indexes.clone(),
            concurrent_tasks: conf.concurrent_tasks,
            policy: PollPolicy::from_conf(conf),
            remigrate_partial: conf.remigrate_partial,
        }
    }
}

/// The counts from one migration run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Tally {
    /// The number of source indexes considered
    pub source: usize,
    /// The number of indexes missing from the destination
    pub not_migrated: usize,
    /// The number of indexes with mismatched document counts
    pub partial: usize,
    /// The number of indexes that were already migrated
    pub complete: usize,
    /// The number of reindex tasks that completed
    pub succeeded: usize,
    /// The number of indexes that failed to migrate
    pub failed: usize,
}

impl std::fmt::Display for Tally {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "source: {}, not migrated: {}, partial: {}, complete: {}, succeeded: {}, failed: {}",
            self.source, self.not_migrated, self.partial, self.complete, self.succeeded, self.failed
        )
    }
}

/// What happened during one migration run
#[derive(Debug)]
pub struct RunReport {
    /// The plan this run worked from
    pub plan: MigrationPlan,
    /// The outcome of every index we tried to migrate
    pub outcomes: BTreeMap<String, MigrationOutcome>,
    /// When this run started
    pub started: DateTime<Utc>,
    /// When this run finished
    pub finished: DateTime<Utc>,
}

impl RunReport {
    /// Count up what happened in this run
    pub fn tally(&self) -> Tally {
        let succeeded = self
            .outcomes
            .values()
            .filter(|outcome| outcome.is_success())
            .count();
        Tally {
            source: self.plan.total(),
            not_migrated: self.plan.not_migrated.len(),
            partial: self.plan.partial.len(),
            complete: self.plan.complete.len(),
            succeeded,
            failed: self.outcomes.len() - succeeded,
        }
    }

    /// How long this run took
    pub fn duration(&self) -> chrono::Duration {
        self.finished - self.started
    }

    /// The indexes that failed to migrate and why
    pub fn failures(&self) -> impl Iterator<Item = (&String, &Error)> {
        self.outcomes.iter().filter_map(|(index, outcome)| match outcome {
            MigrationOutcome::Failed(error) => Some((index, error)),
            MigrationOutcome::Succeeded(_) => None,
        })
    }
}

/// Migrates indexes from a source cluster into a destination cluster
pub struct Migration<S: Inventory, D: Inventory, E: JobEngine> {
    /// The cluster to copy from
    source: S,
    /// The cluster to copy to
    dest: D,
    /// The engine that runs our reindex tasks
    engine: Arc<E>,
    /// The settings for this run
    settings: MigrationSettings,
    /// Where to report progress
    sink: Arc<dyn Sink>,
}

impl<S: Inventory, D: Inventory, E: JobEngine> Migration<S, D, E> {
    /// Create a new migration
    ///
    /// # Arguments
    ///
    /// * `source` - The cluster to copy from
    /// * `dest` - The cluster to copy to
    /// * `engine` - The engine that runs our reindex tasks
    /// * `settings` - The settings for this run
    /// * `sink` - Where to report progress
    pub fn new(
        source: S,
        dest: D,
        engine: Arc<E>,
        settings: MigrationSettings,
        sink: Arc<dyn Sink>,
    ) -> Self {
        Migration {
            source,
            dest,
            engine,
            settings,
            sink,
        }
    }

    /// Inventory both clusters and decide what needs to be migrated
    #[instrument(name = "Migration::plan", skip(self), err(Display))]
    pub async fn plan(&self) -> Result<MigrationPlan, Error> {
        let mut source = self.source.indexes().await?;
        // only look at the indexes we were asked for if any were given
        if !self.settings.indexes.is_empty() {
            source = restrict(source, &self.settings.indexes);
        }
        self.sink.info(&format!(
            "Source ES host {} has {} indexes",
            self.source.host(),
            source.len()
        ));
        let dest = self.dest.indexes().await?;
        self.sink.info(&format!(
            "Destination ES host {} has {} indexes",
            self.dest.host(),
            dest.len()
        ));
        let plan = diff(&source, &dest);
        self.sink.info(&format!(
            "Not migrated ES indexes: {}/{}",
            plan.not_migrated.len(),
            plan.total()
        ));
        self.sink.info(&format!(
            "Partial migrated ES indexes: {}/{}",
            plan.partial.len(),
            plan.total()
        ));
        Ok(plan)
    }

    /// Migrate every index that is missing from the destination
    ///
    /// Inventory failures abort the run while failures for single indexes
    /// are collected into the report.
    #[instrument(name = "Migration::run", skip(self), err(Display))]
    pub async fn run(&self) -> Result<RunReport, Error> {
        let started = Utc::now();
        let plan = self.plan().await?;
        // build the list of indexes to reindex
        let mut todo = plan.not_migrated.clone();
        if self.settings.remigrate_partial {
            todo.extend(plan.partial.iter().cloned());
        } else {
            for index in &plan.partial {
                self.sink.info(&format!(
                    "Index {index} is partially migrated and will be skipped"
                ));
            }
        }
        // migrate our indexes
        let driver = JobDriver::new(
            self.engine.clone(),
            self.settings.policy.clone(),
            self.sink.clone(),
        );
        let dispatcher = Dispatcher::new(driver, self.settings.concurrent_tasks, self.sink.clone());
        let outcomes = dispatcher.run(&todo).await?;
        let report = RunReport {
            plan,
            outcomes,
            started,
            finished: Utc::now(),
        };
        self.sink.info(&format!(
            "Migration finished in {}s: {}",
            report.duration().num_seconds(),
            report.tally()
        ));
        Ok(report)
    }
}
