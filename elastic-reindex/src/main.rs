//! A CLI tool for migrating indexes between Elasticsearch clusters

use clap::Parser;
use elastic_reindex::models::RemoteSource;
use elastic_reindex::{
    Args, Conf, ElasticCluster, ElasticEngine, Error, Migration, MigrationSettings, TracingSink,
    trace,
};
use std::sync::Arc;

/// Connect to both clusters and migrate whatever is missing
///
/// # Arguments
///
/// * `args` - The command line args that were passed in
async fn migrate(args: &Args) -> Result<(), Error> {
    // load our config
    let conf = Conf::from_args(args)?;
    // setup our tracer
    trace::setup("elastic-reindex", &conf.tracing)?;
    // connect to both clusters
    let source = ElasticCluster::connect(&conf.source_host, &conf.source_http_auth, &conf).await?;
    let dest = ElasticCluster::connect(&conf.dest_host, &conf.dest_http_auth, &conf).await?;
    // our reindex tasks run in the destination and pull from the source
    let remote = RemoteSource::new(conf.remote_source_host(), &conf.source_http_auth);
    let engine = Arc::new(ElasticEngine::new(dest.clone(), remote));
    let migration = Migration::new(
        source,
        dest,
        engine,
        MigrationSettings::from_conf(&conf),
        Arc::new(TracingSink),
    );
    migration.run().await?;
    Ok(())
}

#[tokio::main]
async fn main() {
    // get the command line args that were passed in
    let args = Args::parse();
    if let Err(err) = migrate(&args).await {
        // print the error
        eprintln!("{err}");
        std::process::exit(1);
    }
}
