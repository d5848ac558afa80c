//! Drives a single reindex task from creation to a terminal state

use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{Level, event, instrument};

use crate::Conf;
use crate::Error;
use crate::engine::JobEngine;
use crate::models::{JobHandle, JobStatus, TaskResponse};
use crate::sink::Sink;

/// The task api error types that mean a task id was rejected
const INVALID_JOB_ERRORS: [&str; 2] = ["illegal_argument_exception", "resource_not_found_exception"];

/// How a reindex task is polled
#[derive(Debug, Clone, PartialEq)]
pub struct PollPolicy {
    /// How long to wait after creating a task before the first poll
    pub grace: Duration,
    /// How long to wait between the first polls
    pub check_interval: Duration,
    /// The largest the interval between polls may grow to
    pub max_check_interval: Option<Duration>,
    /// How much to grow the interval after each incomplete poll
    pub backoff_multiplier: f64,
    /// How long to wait on a task before giving up on it
    pub max_wait: Option<Duration>,
}

impl Default for PollPolicy {
    fn default() -> Self {
        PollPolicy {
            grace: Duration::from_secs(2),
            check_interval: Duration::from_secs(10),
            max_check_interval: None,
            backoff_multiplier: 1.0,
            max_wait: None,
        }
    }
}

impl PollPolicy {
    /// Build a poll policy from our config
    ///
    /// # Arguments
    ///
    /// * `conf` - The reindex config
    pub fn from_conf(conf: &Conf) -> Self {
        PollPolicy {
            grace: Duration::from_secs(conf.grace_delay),
            check_interval: Duration::from_secs(conf.check_interval),
            max_check_interval: conf.max_check_interval.map(Duration::from_secs),
            backoff_multiplier: conf.backoff_multiplier,
            max_wait: conf.max_wait.map(Duration::from_secs),
        }
    }

    /// Get the interval to sleep for after the current one
    ///
    /// # Arguments
    ///
    /// * `current` - The interval that was just slept
    pub fn next_interval(&self, current: Duration) -> Duration {
        if self.backoff_multiplier <= 1.0 {
            return current;
        }
        let grown = Duration::try_from_secs_f64(current.as_secs_f64() * self.backoff_multiplier)
            .unwrap_or(Duration::MAX);
        match self.max_check_interval {
            Some(max) => grown.min(max),
            None => grown,
        }
    }
}

/// What a single successful poll told us
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Observation {
    /// The task is still copying documents
    Running(JobStatus),
    /// The task is done
    Completed(JobStatus),
}

/// Classify a task status response
///
/// # Arguments
///
/// * `job` - The task that was polled
/// * `host` - The host the task runs on
/// * `resp` - The response to classify
pub fn classify(job: &JobHandle, host: &str, resp: TaskResponse) -> Result<Observation, Error> {
    // check if this lookup was rejected
    if let Some(error) = resp.error {
        if INVALID_JOB_ERRORS.contains(&error.kind.as_str()) {
            return Err(Error::InvalidJob {
                job: job.id.clone(),
                host: host.to_owned(),
            });
        }
        let reason = error.reason.unwrap_or_default();
        return Err(Error::transport(
            host,
            format!("Task {} returned {}: {reason}", job.id, error.kind),
        ));
    }
    let completed = resp.completed.ok_or_else(|| {
        Error::transport(
            host,
            format!("Status for task {} is missing 'completed'", job.id),
        )
    })?;
    // tasks that have not started copying yet may not have counters
    let progress = resp.task.and_then(|info| info.status).unwrap_or_default();
    let status = JobStatus {
        completed,
        documents_total: progress.total,
        documents_created: progress.created,
    };
    if completed {
        Ok(Observation::Completed(status))
    } else {
        Ok(Observation::Running(status))
    }
}

/// Creates a reindex task for one index and polls it until it is done
pub struct JobDriver<E: JobEngine> {
    /// The engine to run tasks in
    engine: Arc<E>,
    /// How to poll our tasks
    policy: PollPolicy,
    /// Where to report progress
    sink: Arc<dyn Sink>,
}

impl<E: JobEngine> Clone for JobDriver<E> {
    fn clone(&self) -> Self {
        JobDriver {
            engine: self.engine.clone(),
            policy: self.policy.clone(),
            sink: self.sink.clone(),
        }
    }
}

impl<E: JobEngine> JobDriver<E> {
    /// Create a new job driver
    ///
    /// # Arguments
    ///
    /// * `engine` - The engine to run tasks in
    /// * `policy` - How to poll our tasks
    /// * `sink` - Where to report progress
    pub fn new(engine: Arc<E>, policy: PollPolicy, sink: Arc<dyn Sink>) -> Self {
        JobDriver {
            engine,
            policy,
            sink,
        }
    }

    /// Migrate one index and return the id of the task that did it
    ///
    /// The task is never cancelled, even if we stop waiting on it.
    ///
    /// # Arguments
    ///
    /// * `index` - The index to migrate
    #[instrument(name = "JobDriver::drive", skip(self), err(Display))]
    pub async fn drive(&self, index: &str) -> Result<String, Error> {
        let host = self.engine.host();
        // create our reindex task
        let job = self.engine.create(index).await?;
        // our deadline starts once the task exists
        let started = Instant::now();
        self.sink
            .info(&format!("Got task for migrate data: {} ({index})", job.id));
        // give the task a moment to register before we ask about it
        tokio::time::sleep(self.policy.grace).await;
        let mut interval = self.policy.check_interval;
        loop {
            let resp = self.engine.status(&job).await?;
            match classify(&job, host, resp)? {
                Observation::Completed(status) => {
                    self.sink.progress(&job, &status);
                    self.sink.info(&format!("Task finished: {}", job.id));
                    return Ok(job.id);
                }
                Observation::Running(status) => {
                    self.sink.progress(&job, &status);
                    let mut nap = interval;
                    if let Some(max_wait) = self.policy.max_wait {
                        let waited = started.elapsed();
                        if waited >= max_wait {
                            return Err(Error::DeadlineExceeded {
                                job: job.id,
                                host: host.to_owned(),
                                waited,
                            });
                        }
                        // poll one last time right at our deadline
                        nap = nap.min(max_wait - waited);
                    }
                    event!(Level::DEBUG, task = %job.id, secs = nap.as_secs_f64(), "Waiting for reindex task");
                    tokio::time::sleep(nap).await;
                    interval = self.policy.next_interval(interval);
                }
            }
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::test_utilities::RecordingSink;
    use std::collections::VecDeque;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// An engine that answers polls from a fixed list of responses
    struct SequenceEngine {
        responses: Mutex<VecDeque<TaskResponse>>,
        reject_create: bool,
        polls: AtomicUsize,
    }

    impl SequenceEngine {
        fn new(responses: Vec<TaskResponse>) -> Arc<Self> {
            Arc::new(SequenceEngine {
                responses: Mutex::new(responses.into()),
                reject_create: false,
                polls: AtomicUsize::new(0),
            })
        }

        fn rejecting() -> Arc<Self> {
            Arc::new(SequenceEngine {
                responses: Mutex::new(VecDeque::new()),
                reject_create: true,
                polls: AtomicUsize::new(0),
            })
        }

        fn polls(&self) -> usize {
            self.polls.load(Ordering::SeqCst)
        }
    }

    #[async_trait::async_trait]
    impl JobEngine for SequenceEngine {
        fn host(&self) -> &str {
            "http://dest:9200"
        }

        async fn create(&self, index: &str) -> Result<JobHandle, Error> {
            if self.reject_create {
                return Err(Error::transport(self.host(), "index_not_found_exception"));
            }
            Ok(JobHandle {
                id: format!("node:{index}"),
                target_index: index.to_owned(),
            })
        }

        async fn status(&self, _job: &JobHandle) -> Result<TaskResponse, Error> {
            self.polls.fetch_add(1, Ordering::SeqCst);
            let mut responses = self.responses.lock().unwrap();
            // keep repeating the last response once we run out
            if responses.len() > 1 {
                Ok(responses.pop_front().unwrap())
            } else {
                Ok(responses.front().cloned().unwrap_or_default())
            }
        }
    }

    fn driver(engine: &Arc<SequenceEngine>, policy: PollPolicy) -> (JobDriver<SequenceEngine>, Arc<RecordingSink>) {
        let sink = Arc::new(RecordingSink::default());
        let driver = JobDriver::new(engine.clone(), policy, sink.clone());
        (driver, sink)
    }

    #[tokio::test(start_paused = true)]
    async fn polls_until_complete() {
        let engine = SequenceEngine::new(vec![
            TaskResponse::progress(false, 100, 10),
            TaskResponse::progress(false, 100, 60),
            TaskResponse::progress(true, 100, 100),
        ]);
        let (driver, sink) = driver(&engine, PollPolicy::default());
        let start = Instant::now();
        let id = driver.drive("logs").await.unwrap();
        assert_eq!(id, "node:logs");
        assert_eq!(engine.polls(), 3);
        // grace plus two check intervals
        assert_eq!(start.elapsed(), Duration::from_secs(22));
        let progress = sink.progress();
        assert_eq!(progress.len(), 3);
        assert_eq!(progress[1].documents_created, 60);
        assert!(progress[2].completed);
    }

    #[tokio::test(start_paused = true)]
    async fn invalid_job_stops_polling() {
        let engine = SequenceEngine::new(vec![
            TaskResponse::rejected("illegal_argument_exception", Some("malformed task id".to_owned())),
            TaskResponse::progress(true, 1, 1),
        ]);
        let (driver, _) = driver(&engine, PollPolicy::default());
        let err = driver.drive("logs").await.unwrap_err();
        assert!(matches!(err, Error::InvalidJob { ref job, .. } if job == "node:logs"));
        assert_eq!(engine.polls(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn unknown_task_is_invalid() {
        let engine = SequenceEngine::new(vec![TaskResponse::rejected(
            "resource_not_found_exception",
            None,
        )]);
        let (driver, _) = driver(&engine, PollPolicy::default());
        let err = driver.drive("logs").await.unwrap_err();
        assert!(matches!(err, Error::InvalidJob { .. }));
    }

    #[tokio::test(start_paused = true)]
    async fn other_task_errors_are_transport() {
        let engine = SequenceEngine::new(vec![TaskResponse::rejected(
            "search_phase_execution_exception",
            Some("all shards failed".to_owned()),
        )]);
        let (driver, _) = driver(&engine, PollPolicy::default());
        let err = driver.drive("logs").await.unwrap_err();
        match err {
            Error::Transport { msg, .. } => {
                assert!(msg.contains("search_phase_execution_exception"));
                assert!(msg.contains("all shards failed"));
            }
            other => panic!("expected a transport error, got {other:?}"),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn failed_create_never_polls() {
        let engine = SequenceEngine::rejecting();
        let (driver, sink) = driver(&engine, PollPolicy::default());
        let start = Instant::now();
        let err = driver.drive("logs").await.unwrap_err();
        assert!(matches!(err, Error::Transport { .. }));
        assert_eq!(engine.polls(), 0);
        assert_eq!(start.elapsed(), Duration::ZERO);
        assert!(sink.infos().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn deadline_gives_up() {
        let engine = SequenceEngine::new(vec![TaskResponse::progress(false, 100, 1)]);
        let policy = PollPolicy {
            max_wait: Some(Duration::from_secs(15)),
            ..PollPolicy::default()
        };
        let (driver, _) = driver(&engine, policy);
        let start = Instant::now();
        let err = driver.drive("logs").await.unwrap_err();
        match err {
            Error::DeadlineExceeded { job, waited, .. } => {
                assert_eq!(job, "node:logs");
                assert_eq!(waited, Duration::from_secs(15));
            }
            other => panic!("expected a deadline error, got {other:?}"),
        }
        // polls at 2s, 12s and right at the deadline
        assert_eq!(engine.polls(), 3);
        assert_eq!(start.elapsed(), Duration::from_secs(15));
    }

    #[tokio::test(start_paused = true)]
    async fn backoff_grows_interval() {
        let engine = SequenceEngine::new(vec![
            TaskResponse::progress(false, 10, 1),
            TaskResponse::progress(false, 10, 2),
            TaskResponse::progress(false, 10, 3),
            TaskResponse::progress(true, 10, 10),
        ]);
        let policy = PollPolicy {
            backoff_multiplier: 2.0,
            max_check_interval: Some(Duration::from_secs(30)),
            ..PollPolicy::default()
        };
        let (driver, _) = driver(&engine, policy);
        let start = Instant::now();
        driver.drive("logs").await.unwrap();
        // 2 + 10 + 20 + 30
        assert_eq!(start.elapsed(), Duration::from_secs(62));
    }

    #[test]
    fn next_interval() {
        let fixed = PollPolicy::default();
        assert_eq!(fixed.next_interval(Duration::from_secs(10)), Duration::from_secs(10));
        let growing = PollPolicy {
            backoff_multiplier: 1.5,
            ..PollPolicy::default()
        };
        assert_eq!(growing.next_interval(Duration::from_secs(10)), Duration::from_secs(15));
        let capped = PollPolicy {
            backoff_multiplier: 3.0,
            max_check_interval: Some(Duration::from_secs(20)),
            ..PollPolicy::default()
        };
        assert_eq!(capped.next_interval(Duration::from_secs(10)), Duration::from_secs(20));
    }

    #[test]
    fn missing_completed_is_transport() {
        let job = JobHandle {
            id: "node:1".to_owned(),
            target_index: "logs".to_owned(),
        };
        let err = classify(&job, "http://dest:9200", TaskResponse::default()).unwrap_err();
        assert!(matches!(err, Error::Transport { .. }));
    }

    #[test]
    fn running_without_counters() {
        let job = JobHandle {
            id: "node:1".to_owned(),
            target_index: "logs".to_owned(),
        };
        let resp = TaskResponse {
            completed: Some(false),
            ..TaskResponse::default()
        };
        let observed = classify(&job, "http://dest:9200", resp).unwrap();
        assert_eq!(observed, Observation::Running(JobStatus::default()));
    }
}
