//! The errors that can occur while migrating indexes

use std::time::Duration;

/// An error from migrating indexes between clusters
#[derive(Debug)]
pub enum Error {
    /// A generic error with a message
    Generic(String),
    /// A cluster could not be reached while building our inventory
    Connectivity { host: String, msg: String },
    /// A reindex task could not be created or polled
    Transport { host: String, msg: String },
    /// The destination cluster rejected a reindex task id
    InvalidJob { job: String, host: String },
    /// A `user:pass` credential string was malformed
    AuthFormat(String),
    /// A reindex task did not complete before our polling deadline
    DeadlineExceeded {
        job: String,
        host: String,
        waited: Duration,
    },
    /// The loaded config is not usable
    InvalidConf(String),
    /// An error from loading a config
    Config(config::ConfigError),
    /// An error from building an elastic client
    BuildElastic(elasticsearch::http::transport::BuildError),
    /// An error from parsing a URL
    UrlParse(url::ParseError),
    /// An error from sending a kanal message
    KanalSend(kanal::SendError),
}

impl Error {
    /// Create a new generic error
    ///
    /// # Arguments
    ///
    /// * `msg` - The error message to set
    pub fn new<T: Into<String>>(msg: T) -> Self {
        Error::Generic(msg.into())
    }

    /// Build a transport error for a specific host
    ///
    /// # Arguments
    ///
    /// * `host` - The host the failed request was sent to
    /// * `msg` - What went wrong
    pub fn transport<H: Into<String>, M: Into<String>>(host: H, msg: M) -> Self {
        Error::Transport {
            host: host.into(),
            msg: msg.into(),
        }
    }

    /// Build a connectivity error for a specific host
    ///
    /// # Arguments
    ///
    /// * `host` - The host that could not be reached
    /// * `msg` - What went wrong
    pub fn connectivity<H: Into<String>, M: Into<String>>(host: H, msg: M) -> Self {
        Error::Connectivity {
            host: host.into(),
            msg: msg.into(),
        }
    }

    /// Whether this error aborts the whole run instead of a single index
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Error::Connectivity { .. }
                | Error::AuthFormat(_)
                | Error::InvalidConf(_)
                | Error::Config(_)
                | Error::BuildElastic(_)
                | Error::UrlParse(_)
        )
    }
}

impl std::fmt::Display for Error {
    /// display this error in a easy readble format
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Error::Generic(msg) => write!(f, "{msg}"),
            Error::Connectivity { host, msg } => {
                write!(f, "Can not connect to Elasticsearch server: {host}, error: {msg}")
            }
            Error::Transport { host, msg } => write!(f, "Transport Error ({host}): {msg}"),
            Error::InvalidJob { job, host } => write!(
                f,
                "Can not retrieve task status from Elasticsearch server: {host} and task id: {job}"
            ),
            Error::AuthFormat(msg) => write!(f, "Invalid HTTP auth format: {msg}"),
            Error::DeadlineExceeded { job, host, waited } => write!(
                f,
                "Task {job} on {host} did not complete within {}s",
                waited.as_secs()
            ),
            Error::InvalidConf(msg) => write!(f, "Invalid config: {msg}"),
            Error::Config(err) => write!(f, "Config Error: {err}"),
            Error::BuildElastic(err) => write!(f, "BuildElastic Error: {err}"),
            Error::UrlParse(err) => write!(f, "UrlParse Error: {err}"),
            Error::KanalSend(err) => write!(f, "KanalSend Error: {err}"),
        }
    }
}

// mark that this is an error struct
impl std::error::Error for Error {}

impl From<config::ConfigError> for Error {
    fn from(error: config::ConfigError) -> Self {
        Error::Config(error)
    }
}

impl From<elasticsearch::http::transport::BuildError> for Error {
    fn from(error: elasticsearch::http::transport::BuildError) -> Self {
        Error::BuildElastic(error)
    }
}

impl From<url::ParseError> for Error {
    fn from(error: url::ParseError) -> Self {
        Error::UrlParse(error)
    }
}

impl From<kanal::SendError> for Error {
    fn from(error: kanal::SendError) -> Self {
        Error::KanalSend(error)
    }
}


#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn index_errors_are_not_fatal() {
        let errors = [
            Error::transport("http://dest:9200", "refused"),
            Error::InvalidJob {
                job: "node:1".to_owned(),
                host: "http://dest:9200".to_owned(),
            },
            Error::DeadlineExceeded {
                job: "node:1".to_owned(),
                host: "http://dest:9200".to_owned(),
                waited: Duration::from_secs(60),
            },
            Error::new("worker exited before reporting"),
        ];
        assert!(errors.iter().all(|error| !error.is_fatal()));
    }

    #[test]
    fn setup_errors_are_fatal() {
        let parse = || -> Result<url::Url, Error> { Ok(url::Url::parse("not a url")?) };
        let errors = [
            Error::connectivity("http://source:9200", "refused"),
            Error::AuthFormat("Expected 'username:password'".to_owned()),
            Error::InvalidConf("source_host must be set".to_owned()),
            parse().unwrap_err(),
        ];
        assert!(errors.iter().all(Error::is_fatal));
    }

    #[test]
    fn display_names_the_task() {
        let error = Error::InvalidJob {
            job: "node:42".to_owned(),
            host: "http://dest:9200".to_owned(),
        };
        let msg = error.to_string();
        assert!(msg.contains("node:42"));
        assert!(msg.contains("http://dest:9200"));
    }
}
