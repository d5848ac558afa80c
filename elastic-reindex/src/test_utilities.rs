//! In-memory clusters for testing migrations without Elasticsearch

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use crate::Error;
use crate::engine::JobEngine;
use crate::inventory::Inventory;
use crate::models::{IndexSummary, JobHandle, JobStatus, TaskResponse};
use crate::sink::Sink;

/// Lock a mutex even if another test thread panicked while holding it
fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// A cluster whose indexes live in memory
#[derive(Debug, Clone)]
pub struct FakeCluster {
    /// The host this cluster pretends to be
    host: String,
    /// The indexes in this cluster
    indexes: Arc<Mutex<Vec<IndexSummary>>>,
    /// Whether listing indexes should fail
    unreachable: bool,
}

impl FakeCluster {
    /// Create a new fake cluster
    ///
    /// # Arguments
    ///
    /// * `host` - The host this cluster pretends to be
    /// * `indexes` - The `(name, count)` pairs to start with
    pub fn new(host: &str, indexes: &[(&str, u64)]) -> Self {
        let indexes = indexes
            .iter()
            .map(|(name, count)| IndexSummary::new(*name, *count))
            .collect();
        FakeCluster {
            host: host.to_owned(),
            indexes: Arc::new(Mutex::new(indexes)),
            unreachable: false,
        }
    }

    /// Create a fake cluster that can never be reached
    ///
    /// # Arguments
    ///
    /// * `host` - The host this cluster pretends to be
    pub fn unreachable(host: &str) -> Self {
        FakeCluster {
            unreachable: true,
            ..FakeCluster::new(host, &[])
        }
    }

    /// Get the document count of an index if it exists
    ///
    /// # Arguments
    ///
    /// * `name` - The index to look up
    pub fn count(&self, name: &str) -> Option<u64> {
        lock(&self.indexes)
            .iter()
            .find(|index| index.name == name)
            .map(|index| index.document_count)
    }

    /// Create or overwrite an index
    ///
    /// # Arguments
    ///
    /// * `name` - The index to set
    /// * `document_count` - The number of documents it should hold
    pub fn set(&self, name: &str, document_count: u64) {
        let mut indexes = lock(&self.indexes);
        match indexes.iter_mut().find(|index| index.name == name) {
            Some(index) => index.document_count = document_count,
            None => indexes.push(IndexSummary::new(name, document_count)),
        }
    }
}

#[async_trait::async_trait]
impl Inventory for FakeCluster {
    fn host(&self) -> &str {
        &self.host
    }

    async fn indexes(&self) -> Result<Vec<IndexSummary>, Error> {
        if self.unreachable {
            return Err(Error::connectivity(&self.host, "connection refused"));
        }
        Ok(lock(&self.indexes).clone())
    }
}

/// How the fake engine should treat the task for one index
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Script {
    /// Complete on this poll (1 is the first poll)
    Complete { on_poll: usize },
    /// Refuse to create the task
    RejectCreate,
    /// Reject the task id on the first poll
    InvalidJob,
    /// Fail the first poll with this error type
    TaskError(String),
    /// Never complete
    Stall,
}

impl Default for Script {
    fn default() -> Self {
        Script::Complete { on_poll: 1 }
    }
}

/// A task the fake engine is tracking
#[derive(Debug, Clone)]
struct FakeTask {
    /// The index this task copies
    index: String,
    /// How many times this task has been polled
    polls: usize,
    /// Whether this task has stopped
    done: bool,
}

/// A reindex engine that copies counts between fake clusters
pub struct FakeEngine {
    /// The cluster to copy from
    source: FakeCluster,
    /// The cluster to copy into
    dest: FakeCluster,
    /// What to do for specific indexes
    scripts: HashMap<String, Script>,
    /// The tasks that were created
    tasks: Mutex<HashMap<String, FakeTask>>,
    /// The indexes we were asked to create tasks for in order
    created: Mutex<Vec<String>>,
    /// The number of status polls
    polls: AtomicUsize,
    /// The number of tasks currently running
    in_flight: AtomicUsize,
    /// The most tasks that were ever running at once
    max_in_flight: AtomicUsize,
}

impl FakeEngine {
    /// Create a new fake engine
    ///
    /// # Arguments
    ///
    /// * `source` - The cluster to copy from
    /// * `dest` - The cluster to copy into
    pub fn new(source: &FakeCluster, dest: &FakeCluster) -> Self {
        FakeEngine {
            source: source.clone(),
            dest: dest.clone(),
            scripts: HashMap::default(),
            tasks: Mutex::default(),
            created: Mutex::default(),
            polls: AtomicUsize::new(0),
            in_flight: AtomicUsize::new(0),
            max_in_flight: AtomicUsize::new(0),
        }
    }

    /// Script the task for an index
    ///
    /// # Arguments
    ///
    /// * `index` - The index to script
    /// * `script` - What its task should do
    #[must_use]
    pub fn script(mut self, index: &str, script: Script) -> Self {
        self.scripts.insert(index.to_owned(), script);
        self
    }

    /// The indexes create was called for in order
    pub fn created(&self) -> Vec<String> {
        lock(&self.created).clone()
    }

    /// The number of create calls
    pub fn creates(&self) -> usize {
        lock(&self.created).len()
    }

    /// The number of status polls
    pub fn polls(&self) -> usize {
        self.polls.load(Ordering::SeqCst)
    }

    /// The most tasks that were ever running at once
    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    /// Get the script for an index
    fn script_for(&self, index: &str) -> Script {
        self.scripts.get(index).cloned().unwrap_or_default()
    }

    /// Mark a task as stopped
    fn finish(&self, task: &mut FakeTask) {
        if !task.done {
            task.done = true;
            self.in_flight.fetch_sub(1, Ordering::SeqCst);
        }
    }
}

#[async_trait::async_trait]
impl JobEngine for FakeEngine {
    fn host(&self) -> &str {
        self.dest.host()
    }

    async fn create(&self, index: &str) -> Result<JobHandle, Error> {
        let position = {
            let mut created = lock(&self.created);
            created.push(index.to_owned());
            created.len()
        };
        if self.script_for(index) == Script::RejectCreate {
            return Err(Error::transport(
                self.host(),
                format!("no such index [{index}]"),
            ));
        }
        // track how many tasks are running at once
        let running = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(running, Ordering::SeqCst);
        let id = format!("fake-node:{position}");
        lock(&self.tasks).insert(
            id.clone(),
            FakeTask {
                index: index.to_owned(),
                polls: 0,
                done: false,
            },
        );
        Ok(JobHandle {
            id,
            target_index: index.to_owned(),
        })
    }

    async fn status(&self, job: &JobHandle) -> Result<TaskResponse, Error> {
        self.polls.fetch_add(1, Ordering::SeqCst);
        let mut tasks = lock(&self.tasks);
        let Some(task) = tasks.get_mut(&job.id) else {
            return Ok(TaskResponse::rejected(
                "resource_not_found_exception",
                Some(format!("task [{}] isn't running and hasn't stored its results", job.id)),
            ));
        };
        task.polls += 1;
        let total = self.source.count(&task.index).unwrap_or_default();
        match self.script_for(&task.index) {
            Script::Complete { on_poll } if task.polls >= on_poll => {
                // the copy is done so the destination now matches the source
                self.dest.set(&task.index, total);
                self.finish(task);
                Ok(TaskResponse::progress(true, total, total))
            }
            Script::Complete { on_poll } => {
                let created = total * task.polls as u64 / on_poll as u64;
                Ok(TaskResponse::progress(false, total, created))
            }
            Script::InvalidJob => {
                self.finish(task);
                Ok(TaskResponse::rejected(
                    "illegal_argument_exception",
                    Some(format!("malformed task id {}", job.id)),
                ))
            }
            Script::TaskError(kind) => {
                self.finish(task);
                Ok(TaskResponse::rejected(kind, None))
            }
            Script::Stall | Script::RejectCreate => Ok(TaskResponse::progress(false, total, 0)),
        }
    }
}

/// A sink that remembers everything it was told
#[derive(Debug, Default)]
pub struct RecordingSink {
    /// The info messages
    infos: Mutex<Vec<String>>,
    /// The error messages
    errors: Mutex<Vec<String>>,
    /// The progress updates
    progress: Mutex<Vec<JobStatus>>,
}

impl RecordingSink {
    /// The info messages we were sent
    pub fn infos(&self) -> Vec<String> {
        lock(&self.infos).clone()
    }

    /// The error messages we were sent
    pub fn errors(&self) -> Vec<String> {
        lock(&self.errors).clone()
    }

    /// The progress updates we were sent
    pub fn progress(&self) -> Vec<JobStatus> {
        lock(&self.progress).clone()
    }
}

impl Sink for RecordingSink {
    fn info(&self, msg: &str) {
        lock(&self.infos).push(msg.to_owned());
    }

    fn error(&self, msg: &str) {
        lock(&self.errors).push(msg.to_owned());
    }

    fn progress(&self, _job: &JobHandle, status: &JobStatus) {
        lock(&self.progress).push(*status);
    }
}
