//! Populate engine: reconcile play-log exports against the catalog and
//! materialize the plays.
//!
//! One run is a strict sequential pipeline: load records, bootstrap the
//! identity cache, resolve every referenced entity, then materialize play
//! rows. All mutable state (cache, pending maps) lives for exactly one run
//! and is passed explicitly, which is what keeps the engine testable against
//! a scripted catalog and an in-memory store.

mod identity_cache;
mod loader;
mod materializer;
mod resolver;

pub use identity_cache::{IdentityCache, TrackDetail};
pub use loader::{load_play_records, PlayRecord};
pub use materializer::{ratio_played, MaterializeOutcome, PlayEventMaterializer};
pub use resolver::{parse_release_date, EntityResolver, ResolveStats};

use crate::catalog_client::CatalogClient;
use crate::library_store::LibraryStore;
use anyhow::Result;
use std::path::Path;
use tracing::info;

#[derive(Clone, Copy, Debug, Default)]
pub struct PopulateSummary {
    pub records_loaded: usize,
    pub unique_tracks_referenced: usize,
    pub resolve: ResolveStats,
    pub plays: MaterializeOutcome,
}

/// Run one full populate pass over the exports in `input_dir`.
pub fn populate(
    store: &dyn LibraryStore,
    catalog: &dyn CatalogClient,
    input_dir: &Path,
) -> Result<PopulateSummary> {
    let (uris, records) = load_play_records(input_dir)?;

    let mut cache = IdentityCache::bootstrap(store)?;
    let mut resolver = EntityResolver::new(store, catalog, &mut cache);
    let resolve = resolver.resolve(&uris)?;

    let materializer = PlayEventMaterializer::new(store, &cache);
    let plays = materializer.materialize(&records)?;

    let summary = PopulateSummary {
        records_loaded: records.len(),
        unique_tracks_referenced: uris.len(),
        resolve,
        plays,
    };

    info!(
        "Populate run finished: {} records in, {} plays created, {} dropped",
        summary.records_loaded, summary.plays.created, summary.plays.dropped
    );

    Ok(summary)
}
