//! The remote job engine that copies documents for us

use crate::Error;
use crate::models::{JobHandle, TaskResponse};

/// Creates and reports on reindex tasks in the destination cluster
#[async_trait::async_trait]
pub trait JobEngine: Send + Sync + 'static {
    /// The host our tasks run on
    fn host(&self) -> &str;

    /// Create a reindex task that copies an index from the source cluster
    ///
    /// Any failure to create the task is a transport error.
    ///
    /// # Arguments
    ///
    /// * `index` - The index to copy
    async fn create(&self, index: &str) -> Result<JobHandle, Error>;

    /// Get the current state of a reindex task
    ///
    /// Rejections from the tasks api come back inside the response so the
    /// caller can classify them.
    ///
    /// # Arguments
    ///
    /// * `job` - The task to check on
    async fn status(&self, job: &JobHandle) -> Result<TaskResponse, Error>;
}
