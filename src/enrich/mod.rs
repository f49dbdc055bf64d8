//! Enrichment pipeline
//!
//! After validation the configuration is completed with data from external sources.
//! Stages run in a fixed order, each one collecting its lookups from the tree,
//! resolving them on the build's worker pool through the cache and writing the
//! results back. A failing stage does not stop the following ones: every failure
//! of the build is reported at once.

mod irrdb;
mod peeringdb;

pub use irrdb::{IrrOriginAsns, IrrPrefixes};
pub use peeringdb::PeeringDbLimits;

use crate::cache::ObjectCache;
use crate::errors::{BuildError, EnrichError};
use crate::policy::{ConfigTree, IpVersion};
use crate::resolvers::{IrrResolver, PeeringDbResolver};
use rayon::prelude::*;
use rayon::ThreadPool;
use std::fmt::Display;
use std::time::Instant;
use tracing::{error, info};

/// What a stage needs besides the tree
pub struct EnrichContext<'a> {
    pub cache: &'a ObjectCache,
    pub irr: &'a dyn IrrResolver,
    pub peeringdb: &'a dyn PeeringDbResolver,
    pub pool: &'a ThreadPool,
    /// Address family of the build; `None` means both
    pub ip_ver: Option<IpVersion>,
}

impl EnrichContext<'_> {
    pub fn ip_versions(&self) -> Vec<IpVersion> {
        match self.ip_ver {
            Some(v) => vec![v],
            None => vec![IpVersion::V4, IpVersion::V6],
        }
    }
}

/// One step of the pipeline
pub trait Enricher {
    fn name(&self) -> &'static str;

    fn enrich(&self, tree: &mut ConfigTree, ctx: &EnrichContext) -> Result<(), EnrichError>;
}

/// The stages, in execution order
pub fn stages() -> Vec<Box<dyn Enricher>> {
    vec![
        Box::new(IrrOriginAsns),
        Box::new(IrrPrefixes),
        Box::new(PeeringDbLimits),
    ]
}

/// Run every stage, failing with all the stage errors at the end
pub fn run_pipeline(tree: &mut ConfigTree, ctx: &EnrichContext) -> Result<(), BuildError> {
    let mut failures = vec![];
    for stage in stages() {
        let start = Instant::now();
        info!("{}: started", stage.name());
        match stage.enrich(tree, ctx) {
            Ok(()) => info!("{}: completed in {:.2?}", stage.name(), start.elapsed()),
            Err(e) => {
                error!("{}", e);
                failures.push(e);
            }
        }
    }
    if failures.is_empty() {
        Ok(())
    } else {
        Err(BuildError::Enrichment(failures))
    }
}

/// Resolve every item on the pool
///
/// Results keep the order of `items`; failures are rendered as `item: error`.
pub(crate) fn resolve_all<K, V, F>(
    pool: &ThreadPool,
    items: Vec<K>,
    resolve: F,
) -> (Vec<(K, V)>, Vec<String>)
where
    K: Display + Send,
    V: Send,
    F: Fn(&K) -> anyhow::Result<V> + Sync,
{
    let results: Vec<(K, anyhow::Result<V>)> = pool.install(|| {
        items
            .into_par_iter()
            .map(|item| {
                let res = resolve(&item);
                (item, res)
            })
            .collect()
    });

    let mut resolved = vec![];
    let mut failures = vec![];
    for (item, res) in results {
        match res {
            Ok(value) => resolved.push((item, value)),
            Err(e) => failures.push(format!("{}: {:#}", item, e)),
        }
    }
    (resolved, failures)
}

pub(crate) fn stage_result(stage: &'static str, failures: Vec<String>) -> Result<(), EnrichError> {
    if failures.is_empty() {
        Ok(())
    } else {
        Err(EnrichError { stage, failures })
    }
}
