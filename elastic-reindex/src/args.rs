//! The command line args for elastic-reindex

use clap::Parser;
use std::path::PathBuf;

use crate::conf::Conf;
use crate::models::Auth;

/// Parse a `username:password` flag
///
/// # Arguments
///
/// * `raw` - The raw flag value
fn parse_auth(raw: &str) -> Result<Auth, String> {
    raw.parse::<Auth>().map_err(|err| err.to_string())
}

/// Migrate indexes from one Elasticsearch cluster to another
///
/// Flags override values from the config file and `REINDEX__` env vars.
#[derive(Parser, Debug, Clone)]
#[clap(version)]
pub struct Args {
    /// The path to an optional YAML config
    #[clap(short, long, default_value = "reindex.yml")]
    pub config: PathBuf,
    /// Source server: Elasticsearch host where data will be transferred from
    #[clap(long, alias = "source_host")]
    pub source_host: Option<String>,
    /// Destination server: Elasticsearch host where data will be transferred
    #[clap(long, alias = "dest_host")]
    pub dest_host: Option<String>,
    /// Basic auth for the source host in the form `username:password`
    #[clap(long, alias = "source_http_auth", value_parser = parse_auth)]
    pub source_http_auth: Option<Auth>,
    /// Basic auth for the destination host in the form `username:password`
    #[clap(long, alias = "dest_http_auth", value_parser = parse_auth)]
    pub dest_http_auth: Option<Auth>,
    /// The source host as the destination cluster reaches it if different from --source-host
    #[clap(long, alias = "source_remote_host")]
    pub source_remote_host: Option<String>,
    /// Specific indexes to migrate instead of every source index
    #[clap(short, long, value_delimiter = ',')]
    pub indexes: Vec<String>,
    /// Interval for checking Elasticsearch reindex tasks (in seconds)
    #[clap(long, alias = "check_interval")]
    pub check_interval: Option<u64>,
    /// Number of max concurrent reindex tasks
    #[clap(long, alias = "concurrent_tasks")]
    pub concurrent_tasks: Option<usize>,
    /// Seconds to wait after creating a task before its first status check
    #[clap(long, alias = "grace_delay")]
    pub grace_delay: Option<u64>,
    /// Seconds to wait on any single request to a cluster
    #[clap(long, alias = "request_timeout")]
    pub request_timeout: Option<u64>,
    /// Give up on a reindex task after this many seconds
    #[clap(long, alias = "max_wait")]
    pub max_wait: Option<u64>,
    /// Grow the check interval by this factor after each incomplete check
    #[clap(long, alias = "backoff_multiplier")]
    pub backoff_multiplier: Option<f64>,
    /// The largest the check interval may grow to (in seconds)
    #[clap(long, alias = "max_check_interval")]
    pub max_check_interval: Option<u64>,
    /// Also reindex indexes that exist at the destination with a different document count
    #[clap(long, alias = "remigrate_partial")]
    pub remigrate_partial: bool,
    /// Skip TLS certificate validation
    #[clap(long)]
    pub insecure: bool,
}

impl Args {
    /// Overlay any flags that were set onto a loaded config
    ///
    /// # Arguments
    ///
    /// * `conf` - The config to update
    pub fn overlay(&self, conf: &mut Conf) {
        if let Some(host) = &self.source_host {
            conf.source_host.clone_from(host);
        }
        if let Some(host) = &self.dest_host {
            conf.dest_host.clone_from(host);
        }
        if let Some(auth) = &self.source_http_auth {
            conf.source_http_auth = auth.clone();
        }
        if let Some(auth) = &self.dest_http_auth {
            conf.dest_http_auth = auth.clone();
        }
        if self.source_remote_host.is_some() {
            conf.source_remote_host.clone_from(&self.source_remote_host);
        }
        if !self.indexes.is_empty() {
            conf.indexes.clone_from(&self.indexes);
        }
        if let Some(interval) = self.check_interval {
            conf.check_interval = interval;
        }
        if let Some(tasks) = self.concurrent_tasks {
            conf.concurrent_tasks = tasks;
        }
        if let Some(delay) = self.grace_delay {
            conf.grace_delay = delay;
        }
        if let Some(timeout) = self.request_timeout {
            conf.request_timeout = timeout;
        }
        if self.max_wait.is_some() {
            conf.max_wait = self.max_wait;
        }
        if let Some(multiplier) = self.backoff_multiplier {
            conf.backoff_multiplier = multiplier;
        }
        if self.max_check_interval.is_some() {
            conf.max_check_interval = self.max_check_interval;
        }
        // switches can only turn things on
        conf.remigrate_partial |= self.remigrate_partial;
        conf.insecure |= self.insecure;
    }
}
