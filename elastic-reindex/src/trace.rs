//! Sets up tracing for elastic-reindex on stdout

use tracing::{Level, event};
use tracing_subscriber::filter::{LevelFilter, Targets};
use tracing_subscriber::prelude::*;

use crate::Error;
use crate::conf::{Tracing, TracingLocal};

/// The http client crates that log far too much for our needs
const CHATTY_TARGETS: [&str; 3] = ["elasticsearch", "reqwest", "hyper"];

/// Build the filter for our local tracer
///
/// # Arguments
///
/// * `conf` - The local tracing settings
fn local_filter(conf: &TracingLocal) -> Targets {
    let level = conf.level.to_filter();
    // the http clients only get to tell us about errors
    let capped = std::cmp::min(level, LevelFilter::ERROR);
    CHATTY_TARGETS
        .iter()
        .fold(Targets::new().with_default(level), |targets, target| {
            targets.with_target(*target, capped)
        })
}

/// Setup our local tracer
///
/// # Arguments
///
/// * `name` - The name of the service to trace
/// * `trace_conf` - The tracing settings to use
pub fn setup(name: &str, trace_conf: &Tracing) -> Result<(), Error> {
    // build our local tracer/subscriber
    let local = tracing_subscriber::fmt::layer().with_filter(local_filter(&trace_conf.local));
    tracing_subscriber::registry()
        .with(local)
        .try_init()
        .map_err(|err| Error::new(format!("Failed to register stdout registry: {err}")))?;
    event!(
        Level::INFO,
        "Sending {} traces for {name} to stdout",
        trace_conf.local.level
    );
    Ok(())
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::conf::LogLevel;

    #[test]
    fn chatty_targets_are_capped() {
        let conf = TracingLocal {
            level: LogLevel::Debug,
        };
        let filter = local_filter(&conf);
        assert!(filter.would_enable("elastic_reindex::driver", &Level::DEBUG));
        assert!(!filter.would_enable("elasticsearch::http", &Level::INFO));
        assert!(filter.would_enable("hyper::client", &Level::ERROR));
    }

    #[test]
    fn off_stays_off() {
        let conf = TracingLocal {
            level: LogLevel::Off,
        };
        let filter = local_filter(&conf);
        assert!(!filter.would_enable("reqwest", &Level::ERROR));
        assert!(!filter.would_enable("elastic_reindex", &Level::ERROR));
    }
}
