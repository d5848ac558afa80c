//! Migrate indexes between Elasticsearch clusters with remote reindex tasks
//!
//! Both clusters are inventoried, diffed by document count and every missing
//! index is copied by a `_reindex` task running in the destination cluster.

pub mod args;
pub mod conf;
pub mod differ;
pub mod dispatcher;
pub mod driver;
pub mod elastic;
pub mod engine;
mod error;
pub mod inventory;
pub mod migration;
pub mod models;
pub mod sink;
pub mod trace;

pub use args::Args;
pub use conf::Conf;
pub use dispatcher::Dispatcher;
pub use driver::{JobDriver, PollPolicy};
pub use elastic::{ElasticCluster, ElasticEngine};
pub use engine::JobEngine;
pub use error::Error;
pub use inventory::Inventory;
pub use migration::{Migration, MigrationSettings, RunReport, Tally};
pub use sink::{Sink, TracingSink};

// expose test utilities if that feature is enabled
#[cfg(any(test, feature = "test-utilities"))]
pub mod test_utilities;
