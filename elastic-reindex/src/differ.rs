//! Decide which source indexes still need to be migrated

use std::collections::{HashMap, HashSet};

use crate::models::{IndexSummary, MigrationPlan};

/// Restrict a source inventory to an explicit allow-list
///
/// Names in the allow-list that the source does not have are dropped silently.
///
/// # Arguments
///
/// * `source` - The indexes in the source cluster
/// * `allowed` - The index names to keep
pub fn restrict(source: Vec<IndexSummary>, allowed: &[String]) -> Vec<IndexSummary> {
    let allowed = allowed.iter().map(String::as_str).collect::<HashSet<&str>>();
    source
        .into_iter()
        .filter(|index| allowed.contains(index.name.as_str()))
        .collect()
}

/// Compare the source and destination inventories
///
/// Destination only indexes are ignored and the plan keeps the order of `source`.
///
/// # Arguments
///
/// * `source` - The indexes in the source cluster
/// * `dest` - The indexes in the destination cluster
pub fn diff(source: &[IndexSummary], dest: &[IndexSummary]) -> MigrationPlan {
    // flatten both sides so lookups are cheap; later duplicates win
    let source_counts = flatten(source);
    let dest_counts = flatten(dest);
    let mut plan = MigrationPlan::default();
    // track what we have classified so duplicate source names only show up once
    let mut seen = HashSet::with_capacity(source_counts.len());
    for index in source {
        if !seen.insert(index.name.as_str()) {
            continue;
        }
        let count = source_counts[index.name.as_str()];
        match dest_counts.get(index.name.as_str()) {
            None => plan.not_migrated.push(index.name.clone()),
            Some(dest_count) if *dest_count != count => plan.partial.push(index.name.clone()),
            Some(_) => plan.complete.push(index.name.clone()),
        }
    }
    plan
}

/// Build a name to document count map
fn flatten(indexes: &[IndexSummary]) -> HashMap<&str, u64> {
    indexes
        .iter()
        .map(|index| (index.name.as_str(), index.document_count))
        .collect()
}
