//! Runs a job driver for many indexes on a bounded pool of workers

use futures::StreamExt;
use futures::stream::FuturesUnordered;
use kanal::{AsyncReceiver, AsyncSender};
use std::collections::{BTreeMap, HashSet};
use std::num::NonZeroUsize;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::instrument;

use crate::Error;
use crate::driver::JobDriver;
use crate::engine::JobEngine;
use crate::models::MigrationOutcome;
use crate::sink::Sink;

/// The most workers we will spawn per available core
const WORKERS_PER_CORE: usize = 5;

/// Get the number of workers to actually use for a requested concurrency
///
/// This is never less than 1 or more than 5 workers per available core.
///
/// # Arguments
///
/// * `requested` - The concurrency that was asked for
pub fn concurrency_bound(requested: usize) -> usize {
    let cores = std::thread::available_parallelism()
        .map(NonZeroUsize::get)
        .unwrap_or(1);
    requested.max(1).min(cores * WORKERS_PER_CORE)
}

/// The messages to send indexes to workers with
enum JobMsg {
    /// An index to migrate
    Index(String),
    /// There are no more indexes so this worker should shutdown
    Finished,
}

/// A worker that drives one index at a time
struct Worker<E: JobEngine> {
    /// The channel to get indexes on
    jobs_rx: AsyncReceiver<JobMsg>,
    /// The channel to rebroadcast the finish message on
    jobs_tx: AsyncSender<JobMsg>,
    /// The channel to send outcomes on
    results_tx: AsyncSender<(String, MigrationOutcome)>,
    /// The driver to migrate indexes with
    driver: JobDriver<E>,
}

impl<E: JobEngine> Worker<E> {
    /// Start migrating indexes until we are told to stop
    async fn start(self) -> Result<(), Error> {
        loop {
            match self.jobs_rx.recv().await {
                Ok(JobMsg::Index(index)) => {
                    // a failed index is just an outcome so keep going
                    let outcome = match self.driver.drive(&index).await {
                        Ok(id) => MigrationOutcome::Succeeded(id),
                        Err(error) => MigrationOutcome::Failed(error),
                    };
                    self.results_tx.send((index, outcome)).await?;
                }
                Ok(JobMsg::Finished) => {
                    // forward our finished message to another worker
                    self.jobs_tx.send(JobMsg::Finished).await?;
                    break;
                }
                Err(kanal::ReceiveError::Closed | kanal::ReceiveError::SendClosed) => break,
            }
        }
        Ok(())
    }
}

/// Migrates a batch of indexes with bounded concurrency
pub struct Dispatcher<E: JobEngine> {
    /// The driver each worker uses
    driver: JobDriver<E>,
    /// The max number of indexes to migrate at once
    concurrency: usize,
    /// Where to report outcomes
    sink: Arc<dyn Sink>,
}

impl<E: JobEngine> Dispatcher<E> {
    /// Create a new dispatcher
    ///
    /// # Arguments
    ///
    /// * `driver` - The driver to migrate each index with
    /// * `concurrency` - The requested max number of concurrent reindex tasks
    /// * `sink` - Where to report outcomes
    pub fn new(driver: JobDriver<E>, concurrency: usize, sink: Arc<dyn Sink>) -> Self {
        Dispatcher {
            driver,
            concurrency,
            sink,
        }
    }

    /// Spawn our workers
    ///
    /// # Arguments
    ///
    /// * `workers` - The number of workers to spawn
    /// * `jobs_tx` - The channel to send new jobs on
    /// * `jobs_rx` - The channel to recieve new jobs on
    /// * `results_tx` - The channel to send outcomes on
    fn spawn_workers(
        &self,
        workers: usize,
        jobs_tx: &AsyncSender<JobMsg>,
        jobs_rx: &AsyncReceiver<JobMsg>,
        results_tx: &AsyncSender<(String, MigrationOutcome)>,
    ) -> FuturesUnordered<JoinHandle<Result<(), Error>>> {
        let active = FuturesUnordered::new();
        for _ in 0..workers {
            let worker = Worker {
                jobs_rx: jobs_rx.clone(),
                jobs_tx: jobs_tx.clone(),
                results_tx: results_tx.clone(),
                driver: self.driver.clone(),
            };
            active.push(tokio::spawn(worker.start()));
        }
        active
    }

    /// Migrate every index and collect their outcomes
    ///
    /// One failed index never stops the others.
    ///
    /// # Arguments
    ///
    /// * `indexes` - The indexes to migrate
    #[instrument(name = "Dispatcher::run", skip_all, fields(indexes = indexes.len()), err(Debug))]
    pub async fn run(&self, indexes: &[String]) -> Result<BTreeMap<String, MigrationOutcome>, Error> {
        // each index only gets one task per run
        let mut seen = HashSet::with_capacity(indexes.len());
        let unique = indexes
            .iter()
            .filter(|index| seen.insert(index.as_str()))
            .collect::<Vec<&String>>();
        let mut outcomes = BTreeMap::new();
        if unique.is_empty() {
            return Ok(outcomes);
        }
        // never spawn more workers then we have indexes
        let workers = concurrency_bound(self.concurrency).min(unique.len());
        let (jobs_tx, jobs_rx) = kanal::unbounded_async();
        let (results_tx, results_rx) = kanal::unbounded_async();
        let mut active = self.spawn_workers(workers, &jobs_tx, &jobs_rx, &results_tx);
        // only our workers should hold senders so the results channel closes when they exit
        drop(results_tx);
        for index in &unique {
            jobs_tx.send(JobMsg::Index((*index).clone())).await?;
        }
        jobs_tx.send(JobMsg::Finished).await?;
        drop(jobs_tx);
        // collect outcomes as they come in
        while outcomes.len() < unique.len() {
            let Ok((index, outcome)) = results_rx.recv().await else {
                break;
            };
            match &outcome {
                MigrationOutcome::Succeeded(id) => self
                    .sink
                    .info(&format!("Task id: {id}. Reindex completed: {index}.")),
                MigrationOutcome::Failed(error) => self
                    .sink
                    .error(&format!("Index: {index} generated an exception: {error}")),
            }
            outcomes.insert(index, outcome);
            self.sink
                .info(&format!("Tasks left: {}", unique.len() - outcomes.len()));
        }
        // wait for all of our workers to exit
        while let Some(ret) = active.next().await {
            match ret {
                Ok(Ok(())) => (),
                Ok(Err(error)) => self.sink.error(&format!("Worker failed: {error}")),
                Err(error) => self.sink.error(&format!("Worker panicked: {error}")),
            }
        }
        // anything without an outcome was lost with its worker
        for index in unique {
            if !outcomes.contains_key(index) {
                outcomes.insert(
                    index.clone(),
                    MigrationOutcome::Failed(Error::new("worker exited before reporting")),
                );
            }
        }
        Ok(outcomes)
    }
}
