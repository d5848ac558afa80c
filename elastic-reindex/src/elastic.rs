//! Talk to real Elasticsearch clusters

use elasticsearch::auth::Credentials;
use elasticsearch::cat::CatIndicesParts;
use elasticsearch::cert::CertificateValidation;
use elasticsearch::http::transport::{SingleNodeConnectionPool, TransportBuilder};
use elasticsearch::tasks::TasksGetParts;
use elasticsearch::Elasticsearch;
use std::time::Duration;
use tracing::{Level, event, instrument};
use url::Url;

use crate::engine::JobEngine;
use crate::inventory::{Inventory, parse_catalog};
use crate::models::{
    Auth, IndexSummary, JobHandle, ReindexRequest, RemoteSource, TaskCreated, TaskResponse,
};
use crate::{Conf, Error};

/// A client for a single Elasticsearch cluster
#[derive(Clone)]
pub struct ElasticCluster {
    /// The host this client talks to
    host: String,
    /// The elastic client to send requests with
    elastic: Elasticsearch,
}

impl ElasticCluster {
    /// Build a client for a cluster without talking to it yet
    ///
    /// # Arguments
    ///
    /// * `host` - The url of the cluster
    /// * `auth` - The credentials to use
    /// * `conf` - The reindex config
    pub fn build(host: &str, auth: &Auth, conf: &Conf) -> Result<Self, Error> {
        // try to cast our host to a url
        let url = Url::parse(host)?;
        // build our connection pool
        let pool = SingleNodeConnectionPool::new(url);
        // build our transport object for elastic
        let mut builder =
            TransportBuilder::new(pool).timeout(Duration::from_secs(conf.request_timeout));
        if let Auth::Basic { username, password } = auth {
            builder = builder.auth(Credentials::Basic(username.clone(), password.clone()));
        }
        if conf.insecure {
            builder = builder.cert_validation(CertificateValidation::None);
        }
        Ok(ElasticCluster {
            host: host.to_owned(),
            elastic: Elasticsearch::new(builder.build()?),
        })
    }

    /// Build a client for a cluster and make sure it is reachable
    ///
    /// # Arguments
    ///
    /// * `host` - The url of the cluster
    /// * `auth` - The credentials to use
    /// * `conf` - The reindex config
    #[instrument(name = "ElasticCluster::connect", skip(auth, conf), err(Debug))]
    pub async fn connect(host: &str, auth: &Auth, conf: &Conf) -> Result<Self, Error> {
        let cluster = Self::build(host, auth, conf)?;
        // make sure this cluster is actually up before we use it
        cluster.ping().await?;
        Ok(cluster)
    }

    /// Make sure this cluster responds to requests
    async fn ping(&self) -> Result<(), Error> {
        let resp = self
            .elastic
            .info()
            .send()
            .await
            .map_err(|err| Error::connectivity(&self.host, err.to_string()))?;
        if resp.status_code().is_success() {
            event!(Level::INFO, host = %self.host, "Connected to Elasticsearch");
            Ok(())
        } else {
            Err(Error::connectivity(
                &self.host,
                format!("ping returned {}", resp.status_code()),
            ))
        }
    }
}

#[async_trait::async_trait]
impl Inventory for ElasticCluster {
    fn host(&self) -> &str {
        &self.host
    }

    /// List all non system indexes and their document counts
    #[instrument(name = "Inventory<ElasticCluster>::indexes", skip(self), fields(host = %self.host), err(Debug))]
    async fn indexes(&self) -> Result<Vec<IndexSummary>, Error> {
        let resp = self
            .elastic
            .cat()
            .indices(CatIndicesParts::None)
            .h(&["index", "docs.count"])
            .s(&["index"])
            .send()
            .await
            .map_err(|err| Error::connectivity(&self.host, err.to_string()))?;
        let code = resp.status_code();
        let raw = resp
            .text()
            .await
            .map_err(|err| Error::connectivity(&self.host, err.to_string()))?;
        if !code.is_success() {
            return Err(Error::connectivity(
                &self.host,
                format!("listing indexes returned {code}: {raw}"),
            ));
        }
        parse_catalog(&raw)
    }
}

/// Runs reindex tasks on the destination cluster that pull from the source cluster
#[derive(Clone)]
pub struct ElasticEngine {
    /// The cluster our reindex tasks run in
    dest: ElasticCluster,
    /// The cluster our reindex tasks pull from
    remote: RemoteSource,
}

impl ElasticEngine {
    /// Create a new reindex engine
    ///
    /// # Arguments
    ///
    /// * `dest` - The cluster to run reindex tasks in
    /// * `remote` - The cluster to pull documents from
    pub fn new(dest: ElasticCluster, remote: RemoteSource) -> Self {
        ElasticEngine { dest, remote }
    }
}

#[async_trait::async_trait]
impl JobEngine for ElasticEngine {
    fn host(&self) -> &str {
        &self.dest.host
    }

    /// Create a reindex task that copies an index from the source cluster
    ///
    /// # Arguments
    ///
    /// * `index` - The index to copy
    #[instrument(name = "JobEngine<ElasticEngine>::create", skip(self), err(Debug))]
    async fn create(&self, index: &str) -> Result<JobHandle, Error> {
        // build a body that overwrites conflicts so partial copies can be rerun
        let body = ReindexRequest::new(&self.remote, index);
        let resp = self
            .dest
            .elastic
            .reindex()
            .pretty(true)
            .wait_for_completion(false)
            .body(body)
            .send()
            .await
            .map_err(|err| {
                Error::transport(
                    &self.dest.host,
                    format!("Failed to create reindex task for '{index}': {err}"),
                )
            })?;
        let code = resp.status_code();
        if !code.is_success() {
            // get the error message to return
            let msg = resp.text().await.unwrap_or_default();
            return Err(Error::transport(
                &self.dest.host,
                format!("Failed to create reindex task for '{index}': {msg} ({code})"),
            ));
        }
        let created = resp.json::<TaskCreated>().await.map_err(|err| {
            Error::transport(
                &self.dest.host,
                format!("Malformed reindex response for '{index}': {err}"),
            )
        })?;
        Ok(JobHandle {
            id: created.task,
            target_index: index.to_owned(),
        })
    }

    /// Get the current state of a reindex task
    ///
    /// # Arguments
    ///
    /// * `job` - The task to check on
    #[instrument(name = "JobEngine<ElasticEngine>::status", skip_all, fields(task = %job.id), err(Debug))]
    async fn status(&self, job: &JobHandle) -> Result<TaskResponse, Error> {
        let resp = self
            .dest
            .elastic
            .tasks()
            .get(TasksGetParts::TaskId(&job.id))
            .send()
            .await
            .map_err(|err| {
                Error::transport(
                    &self.dest.host,
                    format!("Failed to get status for task {}: {err}", job.id),
                )
            })?;
        // rejected lookups come back with an error body so read it regardless of status
        let code = resp.status_code();
        let raw = resp.text().await.map_err(|err| {
            Error::transport(
                &self.dest.host,
                format!("Failed to read status for task {}: {err}", job.id),
            )
        })?;
        serde_json::from_str::<TaskResponse>(&raw).map_err(|err| {
            Error::transport(
                &self.dest.host,
                format!("Malformed status for task {} ({code}): {err}", job.id),
            )
        })
    }
}
