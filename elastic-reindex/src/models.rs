//! The data passed between the inventory, differ, driver and dispatcher

use serde::{Deserialize, Serialize};
use std::str::FromStr;

use crate::Error;

/// An index and the number of documents in it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexSummary {
    /// The name of this index
    pub name: String,
    /// The number of documents in this index
    pub document_count: u64,
}

impl IndexSummary {
    /// Create a new index summary
    ///
    /// # Arguments
    ///
    /// * `name` - The name of this index
    /// * `document_count` - The number of documents in this index
    pub fn new<T: Into<String>>(name: T, document_count: u64) -> Self {
        IndexSummary {
            name: name.into(),
            document_count,
        }
    }
}

/// The indexes that still need work, split by how far along they are
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MigrationPlan {
    /// Indexes that do not exist at the destination yet
    pub not_migrated: Vec<String>,
    /// Indexes that exist at the destination with a different document count
    pub partial: Vec<String>,
    /// Indexes that exist at the destination with the same document count
    pub complete: Vec<String>,
}

impl MigrationPlan {
    /// The number of source indexes this plan covers
    pub fn total(&self) -> usize {
        self.not_migrated.len() + self.partial.len() + self.complete.len()
    }

    /// Whether every source index is already fully migrated
    pub fn is_settled(&self) -> bool {
        self.not_migrated.is_empty() && self.partial.is_empty()
    }
}

/// A reindex task created on the destination cluster
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobHandle {
    /// The task id returned by the destination cluster
    pub id: String,
    /// The index this task is copying
    pub target_index: String,
}

/// The progress of a reindex task at the time it was polled
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct JobStatus {
    /// Whether this task is finished
    pub completed: bool,
    /// The number of documents this task will copy
    pub documents_total: u64,
    /// The number of documents this task has created so far
    pub documents_created: u64,
}

/// The final result of migrating one index
#[derive(Debug)]
pub enum MigrationOutcome {
    /// The reindex task with this id completed
    Succeeded(String),
    /// This index could not be migrated
    Failed(Error),
}

impl MigrationOutcome {
    /// Whether this index was migrated
    pub fn is_success(&self) -> bool {
        matches!(self, MigrationOutcome::Succeeded(_))
    }
}

/// The credentials to use when talking to a cluster
#[derive(Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(try_from = "String")]
pub enum Auth {
    /// Do not authenticate
    #[default]
    NoAuth,
    /// Use basic auth
    Basic { username: String, password: String },
}

impl FromStr for Auth {
    type Err = Error;

    /// Parse an auth string in the form `username:password`
    ///
    /// An empty string means no auth.
    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        if raw.is_empty() {
            return Ok(Auth::NoAuth);
        }
        // only split on the first colon so passwords may contain colons
        match raw.split_once(':') {
            Some((username, password)) => Ok(Auth::Basic {
                username: username.to_owned(),
                password: password.to_owned(),
            }),
            None => Err(Error::AuthFormat(
                "Expected 'username:password'".to_owned(),
            )),
        }
    }
}

impl TryFrom<String> for Auth {
    type Error = Error;

    fn try_from(raw: String) -> Result<Self, Self::Error> {
        raw.parse()
    }
}

impl std::fmt::Debug for Auth {
    /// Never print passwords
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Auth::NoAuth => write!(f, "NoAuth"),
            Auth::Basic { username, .. } => f
                .debug_struct("Basic")
                .field("username", username)
                .field("password", &"<redacted>")
                .finish(),
        }
    }
}

/// How a reindex task should handle version conflicts
#[derive(Serialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Conflicts {
    /// Keep going past conflicting documents
    Proceed,
}

/// The remote cluster a reindex task pulls documents from
#[derive(Serialize, Debug, Clone, PartialEq, Eq)]
pub struct RemoteSource {
    /// The host as seen from the destination cluster
    pub host: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,
}

impl RemoteSource {
    /// Build the remote source descriptor for a host
    ///
    /// # Arguments
    ///
    /// * `host` - The host the destination cluster should pull from
    /// * `auth` - The credentials for that host
    pub fn new<T: Into<String>>(host: T, auth: &Auth) -> Self {
        let (username, password) = match auth {
            Auth::NoAuth => (None, None),
            Auth::Basic { username, password } => (Some(username.clone()), Some(password.clone())),
        };
        RemoteSource {
            host: host.into(),
            username,
            password,
        }
    }
}

/// The source half of a reindex request
#[derive(Serialize, Debug, Clone)]
pub struct ReindexSource<'a> {
    pub remote: &'a RemoteSource,
    pub index: &'a str,
}

/// The destination half of a reindex request
#[derive(Serialize, Debug, Clone)]
pub struct ReindexDest<'a> {
    pub index: &'a str,
}

/// The body of a `_reindex` request pulling an index from a remote cluster
#[derive(Serialize, Debug, Clone)]
pub struct ReindexRequest<'a> {
    pub source: ReindexSource<'a>,
    pub conflicts: Conflicts,
    pub dest: ReindexDest<'a>,
}

impl<'a> ReindexRequest<'a> {
    /// Copy an index with the same name from a remote cluster, overwriting conflicts
    ///
    /// # Arguments
    ///
    /// * `remote` - The cluster to pull from
    /// * `index` - The index to copy
    pub fn new(remote: &'a RemoteSource, index: &'a str) -> Self {
        ReindexRequest {
            source: ReindexSource { remote, index },
            conflicts: Conflicts::Proceed,
            dest: ReindexDest { index },
        }
    }
}

/// The response to creating a reindex task without waiting for it
#[derive(Deserialize, Debug, Clone)]
pub struct TaskCreated {
    /// The id of the new task
    pub task: String,
}

/// The counters of a running reindex task
#[derive(Deserialize, Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TaskProgress {
    #[serde(default)]
    pub total: u64,
    #[serde(default)]
    pub created: u64,
}

/// The task info inside a task status response
#[derive(Deserialize, Debug, Clone, Default)]
pub struct TaskInfo {
    #[serde(default)]
    pub status: Option<TaskProgress>,
}

/// An error returned by the tasks api
#[derive(Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct TaskError {
    /// The type of error
    #[serde(rename = "type")]
    pub kind: String,
    /// Why this error occured
    #[serde(default)]
    pub reason: Option<String>,
}

/// The response from `GET _tasks/<id>`
#[derive(Deserialize, Debug, Clone, Default)]
pub struct TaskResponse {
    #[serde(default)]
    pub completed: Option<bool>,
    #[serde(default)]
    pub task: Option<TaskInfo>,
    #[serde(default)]
    pub error: Option<TaskError>,
}

impl TaskResponse {
    /// Build a response for a task that is still running or has finished
    ///
    /// # Arguments
    ///
    /// * `completed` - Whether the task is finished
    /// * `total` - The number of documents to copy
    /// * `created` - The number of documents copied so far
    pub fn progress(completed: bool, total: u64, created: u64) -> Self {
        TaskResponse {
            completed: Some(completed),
            task: Some(TaskInfo {
                status: Some(TaskProgress { total, created }),
            }),
            error: None,
        }
    }

    /// Build a response for a rejected task lookup
    ///
    /// # Arguments
    ///
    /// * `kind` - The type of error
    /// * `reason` - Why the lookup was rejected
    pub fn rejected<T: Into<String>>(kind: T, reason: Option<String>) -> Self {
        TaskResponse {
            completed: None,
            task: None,
            error: Some(TaskError {
                kind: kind.into(),
                reason,
            }),
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use serde_json::json;

    #[test]
    fn basic_auth() {
        let auth: Auth = "elastic:changeme".parse().unwrap();
        assert_eq!(
            auth,
            Auth::Basic {
                username: "elastic".to_owned(),
                password: "changeme".to_owned()
            }
        );
    }

    #[test]
    fn password_with_colons() {
        let auth: Auth = "admin:pa:ss:word".parse().unwrap();
        assert_eq!(
            auth,
            Auth::Basic {
                username: "admin".to_owned(),
                password: "pa:ss:word".to_owned()
            }
        );
    }

    #[test]
    fn empty_auth_is_no_auth() {
        assert_eq!("".parse::<Auth>().unwrap(), Auth::NoAuth);
    }

    #[test]
    fn malformed_auth() {
        let err = "elastic".parse::<Auth>().unwrap_err();
        assert!(matches!(err, Error::AuthFormat(_)));
        assert!(err.is_fatal());
    }

    #[test]
    fn auth_debug_hides_password() {
        let auth: Auth = "elastic:hunter2".parse().unwrap();
        let printed = format!("{auth:?}");
        assert!(printed.contains("elastic"));
        assert!(!printed.contains("hunter2"));
    }

    #[test]
    fn reindex_body_without_auth() {
        let remote = RemoteSource::new("http://source:9200", &Auth::NoAuth);
        let body = serde_json::to_value(ReindexRequest::new(&remote, "logs-2024")).unwrap();
        assert_eq!(
            body,
            json!({
                "source": {"remote": {"host": "http://source:9200"}, "index": "logs-2024"},
                "conflicts": "proceed",
                "dest": {"index": "logs-2024"}
            })
        );
    }

    #[test]
    fn reindex_body_with_auth() {
        let auth: Auth = "elastic:changeme".parse().unwrap();
        let remote = RemoteSource::new("https://source:9200", &auth);
        let body = serde_json::to_value(ReindexRequest::new(&remote, "users")).unwrap();
        assert_eq!(body["source"]["remote"]["username"], "elastic");
        assert_eq!(body["source"]["remote"]["password"], "changeme");
        assert_eq!(body["dest"]["index"], "users");
    }

    #[test]
    fn task_response_running() {
        let raw = json!({
            "completed": false,
            "task": {
                "node": "oTUltX4IQMOUUVeiohTt8A",
                "id": 12345,
                "type": "transport",
                "action": "indices:data/write/reindex",
                "status": {
                    "total": 6154,
                    "updated": 0,
                    "created": 3500,
                    "deleted": 0,
                    "batches": 4,
                    "version_conflicts": 0,
                    "noops": 0
                }
            }
        });
        let resp: TaskResponse = serde_json::from_value(raw).unwrap();
        assert_eq!(resp.completed, Some(false));
        let status = resp.task.unwrap().status.unwrap();
        assert_eq!(status.total, 6154);
        assert_eq!(status.created, 3500);
    }

    #[test]
    fn task_response_error() {
        let raw = json!({
            "error": {
                "root_cause": [],
                "type": "illegal_argument_exception",
                "reason": "malformed task id bogus"
            },
            "status": 400
        });
        let resp: TaskResponse = serde_json::from_value(raw).unwrap();
        let error = resp.error.unwrap();
        assert_eq!(error.kind, "illegal_argument_exception");
        assert_eq!(error.reason.as_deref(), Some("malformed task id bogus"));
    }

    #[test]
    fn plan_settled() {
        let mut plan = MigrationPlan {
            complete: vec!["a".to_owned()],
            ..Default::default()
        };
        assert!(plan.is_settled());
        plan.partial.push("b".to_owned());
        assert!(!plan.is_settled());
        assert_eq!(plan.total(), 2);
    }
}
