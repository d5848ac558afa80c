//! The config for a reindex run
//!
//! Values are layered: defaults, then an optional YAML file, then `REINDEX__`
//! environment variables, then any flags passed on the command line.

use serde::Deserialize;
use std::path::Path;
use url::Url;

use crate::Error;
use crate::args::Args;
use crate::models::Auth;

/// Helps serde default the interval between task status checks to 10 seconds
fn default_check_interval() -> u64 {
    10
}

/// Helps serde default the number of concurrent reindex tasks to 1
fn default_concurrent_tasks() -> usize {
    1
}

/// Helps serde default the wait before a new task is first polled to 2 seconds
fn default_grace_delay() -> u64 {
    2
}

/// Helps serde default the timeout for cluster requests to 60 seconds
fn default_request_timeout() -> u64 {
    60
}

/// Helps serde default the poll interval multiplier to 1 (no backoff)
fn default_backoff_multiplier() -> f64 {
    1.0
}

/// The log level to set
#[derive(Deserialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogLevel {
    /// Do not log any info
    #[serde(alias = "off")]
    Off,
    /// Log at the error level
    #[serde(alias = "error")]
    Error,
    /// Log at the warning level
    #[serde(alias = "warn")]
    Warn,
    /// Log at the info level
    #[default]
    #[serde(alias = "info")]
    Info,
    /// Log at the debug level
    #[serde(alias = "debug")]
    Debug,
    /// Log at the tracing level
    #[serde(alias = "trace")]
    Trace,
}

impl LogLevel {
    /// Cast this log level to a tracing filter
    #[must_use]
    pub fn to_filter(&self) -> tracing_subscriber::filter::LevelFilter {
        match self {
            LogLevel::Off => tracing_subscriber::filter::LevelFilter::OFF,
            LogLevel::Error => tracing_subscriber::filter::LevelFilter::ERROR,
            LogLevel::Warn => tracing_subscriber::filter::LevelFilter::WARN,
            LogLevel::Info => tracing_subscriber::filter::LevelFilter::INFO,
            LogLevel::Debug => tracing_subscriber::filter::LevelFilter::DEBUG,
            LogLevel::Trace => tracing_subscriber::filter::LevelFilter::TRACE,
        }
    }
}

impl std::fmt::Display for LogLevel {
    /// Allow the log level to be displayed
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        match self {
            LogLevel::Off => write!(f, "Off"),
            LogLevel::Error => write!(f, "Error"),
            LogLevel::Warn => write!(f, "Warn"),
            LogLevel::Info => write!(f, "Info"),
            LogLevel::Debug => write!(f, "Debug"),
            LogLevel::Trace => write!(f, "Trace"),
        }
    }
}

/// The settings for sending logs to stdout
#[derive(Deserialize, Debug, Clone, PartialEq, Eq, Default)]
pub struct TracingLocal {
    /// The log level to use for stdout
    #[serde(default)]
    pub level: LogLevel,
}

/// The tracing settings to use
#[derive(Deserialize, Debug, Clone, PartialEq, Eq, Default)]
pub struct Tracing {
    /// The settings for sending logs to stdout
    #[serde(default)]
    pub local: TracingLocal,
}

/// The settings for one reindex run
#[derive(Deserialize, Debug, Clone)]
pub struct Conf {
    /// The cluster to copy indexes from
    #[serde(default)]
    pub source_host: String,
    /// The cluster to copy indexes to
    #[serde(default)]
    pub dest_host: String,
    /// The credentials for the source cluster
    #[serde(default)]
    pub source_http_auth: Auth,
    /// The credentials for the destination cluster
    #[serde(default)]
    pub dest_http_auth: Auth,
    /// The source host as the destination cluster sees it if it differs from `source_host`
    #[serde(default)]
    pub source_remote_host: Option<String>,
    /// Only migrate these indexes if any are set
    #[serde(default)]
    pub indexes: Vec<String>,
    /// The seconds to wait between reindex task status checks
    #[serde(default = "default_check_interval")]
    pub check_interval: u64,
    /// The max number of reindex tasks to run at once
    #[serde(default = "default_concurrent_tasks")]
    pub concurrent_tasks: usize,
    /// The seconds to wait after creating a task before polling it
    #[serde(default = "default_grace_delay")]
    pub grace_delay: u64,
    /// The seconds to wait for any single request to a cluster
    #[serde(default = "default_request_timeout")]
    pub request_timeout: u64,
    /// The max seconds to wait on a single reindex task
    #[serde(default)]
    pub max_wait: Option<u64>,
    /// How much to grow the check interval after each incomplete poll
    #[serde(default = "default_backoff_multiplier")]
    pub backoff_multiplier: f64,
    /// The largest the check interval may grow to in seconds
    #[serde(default)]
    pub max_check_interval: Option<u64>,
    /// Also reindex indexes whose document counts differ
    #[serde(default)]
    pub remigrate_partial: bool,
    /// Skip TLS certificate validation
    #[serde(default)]
    pub insecure: bool,
    /// The tracing settings
    #[serde(default)]
    pub tracing: Tracing,
}

impl Conf {
    /// Load a config from a YAML file with env vars layered on top
    ///
    /// A missing file is not an error.
    ///
    /// # Arguments
    ///
    /// * `path` - The path to the config file
    pub fn new<P: AsRef<Path>>(path: P) -> Result<Self, config::ConfigError> {
        config::Config::builder()
            // load from a file first if it exists
            .add_source(
                config::File::from(path.as_ref())
                    .format(config::FileFormat::Yaml)
                    .required(false),
            )
            // then overlay any environment args ontop
            .add_source(
                config::Environment::with_prefix("reindex")
                    .prefix_separator("__")
                    .separator("__")
                    .list_separator(",")
                    .with_list_parse_key("indexes")
                    .try_parsing(true),
            )
            .build()?
            .try_deserialize()
    }

    /// Build the config for a run from the command line args
    ///
    /// # Arguments
    ///
    /// * `args` - The command line args that were passed in
    pub fn from_args(args: &Args) -> Result<Self, Error> {
        let mut conf = Conf::new(&args.config)?;
        args.overlay(&mut conf);
        conf.validate()?;
        Ok(conf)
    }

    /// The source host to put in reindex requests
    pub fn remote_source_host(&self) -> &str {
        self.source_remote_host
            .as_deref()
            .unwrap_or(&self.source_host)
    }

    /// Make sure this config can be used for a run
    pub fn validate(&self) -> Result<(), Error> {
        for (name, host) in [
            ("source_host", &self.source_host),
            ("dest_host", &self.dest_host),
        ] {
            if host.is_empty() {
                return Err(Error::InvalidConf(format!("{name} must be set")));
            }
            Url::parse(host)
                .map_err(|err| Error::InvalidConf(format!("{name} '{host}' is not a url: {err}")))?;
        }
        if self.check_interval == 0 {
            return Err(Error::InvalidConf(
                "check_interval must be at least 1 second".to_owned(),
            ));
        }
        if self.concurrent_tasks == 0 {
            return Err(Error::InvalidConf(
                "concurrent_tasks must be at least 1".to_owned(),
            ));
        }
        if self.request_timeout == 0 {
            return Err(Error::InvalidConf(
                "request_timeout must be at least 1 second".to_owned(),
            ));
        }
        if !self.backoff_multiplier.is_finite() || self.backoff_multiplier < 1.0 {
            return Err(Error::InvalidConf(format!(
                "backoff_multiplier must be at least 1.0, got {}",
                self.backoff_multiplier
            )));
        }
        if let Some(max) = self.max_check_interval {
            if max < self.check_interval {
                return Err(Error::InvalidConf(format!(
                    "max_check_interval ({max}) is smaller than check_interval ({})",
                    self.check_interval
                )));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use clap::Parser;

    fn conf(args: &[&str]) -> Result<Conf, Error> {
        let args = Args::try_parse_from(
            std::iter::once("elastic-reindex")
                .chain(["--config", "does-not-exist.yml"])
                .chain(args.iter().copied()),
        )
        .expect("failed to parse args");
        Conf::from_args(&args)
    }

    #[test]
    fn defaults() {
        let conf = conf(&[
            "--source-host",
            "http://source:9200",
            "--dest-host",
            "http://dest:9200",
        ])
        .unwrap();
        assert_eq!(conf.check_interval, 10);
        assert_eq!(conf.concurrent_tasks, 1);
        assert_eq!(conf.grace_delay, 2);
        assert_eq!(conf.request_timeout, 60);
        assert_eq!(conf.max_wait, None);
        assert_eq!(conf.source_http_auth, Auth::NoAuth);
        assert!(conf.indexes.is_empty());
        assert!(!conf.remigrate_partial);
        assert_eq!(conf.tracing.local.level, LogLevel::Info);
        assert_eq!(conf.remote_source_host(), "http://source:9200");
    }

    #[test]
    fn underscore_flags_and_overrides() {
        let conf = conf(&[
            "--source_host",
            "http://source:9200",
            "--dest_host",
            "https://dest:9200",
            "--dest_http_auth",
            "elastic:changeme",
            "--check_interval",
            "3",
            "--concurrent_tasks",
            "8",
            "--source_remote_host",
            "http://es-source:9200",
            "-i",
            "logs,users",
            "-i",
            "orders",
        ])
        .unwrap();
        assert_eq!(conf.check_interval, 3);
        assert_eq!(conf.concurrent_tasks, 8);
        assert_eq!(conf.indexes, vec!["logs", "users", "orders"]);
        assert_eq!(conf.remote_source_host(), "http://es-source:9200");
        assert!(matches!(conf.dest_http_auth, Auth::Basic { .. }));
    }

    #[test]
    fn missing_hosts() {
        let err = conf(&["--dest-host", "http://dest:9200"]).unwrap_err();
        assert!(matches!(err, Error::InvalidConf(_)));
        assert!(err.is_fatal());
    }

    #[test]
    fn bad_urls() {
        let err = conf(&["--source-host", "source", "--dest-host", "http://dest:9200"])
            .unwrap_err();
        assert!(matches!(err, Error::InvalidConf(_)));
    }

    #[test]
    fn zero_concurrency() {
        let err = conf(&[
            "--source-host",
            "http://source:9200",
            "--dest-host",
            "http://dest:9200",
            "--concurrent-tasks",
            "0",
        ])
        .unwrap_err();
        assert!(matches!(err, Error::InvalidConf(_)));
    }

    #[test]
    fn shrinking_backoff() {
        let err = conf(&[
            "--source-host",
            "http://source:9200",
            "--dest-host",
            "http://dest:9200",
            "--backoff-multiplier",
            "0.5",
        ])
        .unwrap_err();
        assert!(matches!(err, Error::InvalidConf(_)));
    }

    #[test]
    fn malformed_auth_flag() {
        let parsed = Args::try_parse_from([
            "elastic-reindex",
            "--source-host",
            "http://source:9200",
            "--dest-host",
            "http://dest:9200",
            "--source-http-auth",
            "elastic",
        ]);
        assert!(parsed.is_err());
    }
}
