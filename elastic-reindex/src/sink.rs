//! Where migration progress and outcomes are reported

use tracing::{Level, event};

use crate::models::{JobHandle, JobStatus};

/// Receives the observations made while migrating
///
/// A sink is handed to the driver, dispatcher and migration when they are built.
pub trait Sink: Send + Sync + 'static {
    /// Report something that went as expected
    fn info(&self, msg: &str);

    /// Report something that went wrong
    fn error(&self, msg: &str);

    /// Report the progress of a reindex task after a poll
    ///
    /// # Arguments
    ///
    /// * `job` - The task that was polled
    /// * `status` - The progress it reported
    fn progress(&self, job: &JobHandle, status: &JobStatus) {
        self.info(&format!(
            "Task id: {}. Migrated documents: {}/{}",
            job.id, status.documents_created, status.documents_total
        ));
    }
}

/// A sink that emits tracing events
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingSink;

impl Sink for TracingSink {
    fn info(&self, msg: &str) {
        event!(Level::INFO, "{msg}");
    }

    fn error(&self, msg: &str) {
        event!(Level::ERROR, "{msg}");
    }

    fn progress(&self, job: &JobHandle, status: &JobStatus) {
        event!(
            Level::INFO,
            task = %job.id,
            index = %job.target_index,
            created = status.documents_created,
            total = status.documents_total,
            "Task id: {}. Migrated documents: {}/{}",
            job.id,
            status.documents_created,
            status.documents_total
        );
    }
}
