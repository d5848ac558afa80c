//! List the indexes in a cluster

use tracing::{Level, event};

use crate::Error;
use crate::models::IndexSummary;

/// The prefix reserved for system indexes
pub const SYSTEM_INDEX_PREFIX: char = '.';

/// Lists the indexes and document counts in one cluster
#[async_trait::async_trait]
pub trait Inventory: Send + Sync {
    /// The host this inventory is pulled from
    fn host(&self) -> &str;

    /// List all non system indexes and their document counts
    async fn indexes(&self) -> Result<Vec<IndexSummary>, Error>;
}

/// Parse the body of a `_cat/indices?h=index,docs.count` request
///
/// Each line is a `name count` pair. System indexes are skipped, as are
/// closed or red indexes that have no document count to report.
///
/// # Arguments
///
/// * `raw` - The raw catalog body
pub fn parse_catalog(raw: &str) -> Result<Vec<IndexSummary>, Error> {
    let mut indexes = Vec::new();
    for line in raw.lines() {
        let tokens = line.split_whitespace().collect::<Vec<&str>>();
        match tokens.as_slice() {
            [] => (),
            [name, ..] if name.starts_with(SYSTEM_INDEX_PREFIX) => (),
            [name] => {
                event!(
                    Level::WARN,
                    index = *name,
                    "Skipping index without a document count"
                );
            }
            [name, count] => {
                let document_count = count.parse::<u64>().map_err(|err| {
                    Error::new(format!(
                        "Malformed document count '{count}' for index '{name}': {err}"
                    ))
                })?;
                indexes.push(IndexSummary::new(*name, document_count));
            }
            _ => {
                return Err(Error::new(format!(
                    "Malformed index catalog line: '{line}'"
                )));
            }
        }
    }
    Ok(indexes)
}
