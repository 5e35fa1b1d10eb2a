//! Catalog client module: batched metadata lookups against the Spotify Web API.

mod models;
mod spotify;

pub use models::{
    AlbumPayload, AlbumRef, ArtistPayload, ArtistRef, FollowerCount, ImageRef, TrackPayload,
};
pub use spotify::SpotifyCatalogClient;

use anyhow::Result;
use thiserror::Error;

/// Hard per-call ceilings documented by the Web API batch endpoints.
pub const TRACKS_BATCH_LIMIT: usize = 50;
pub const ALBUMS_BATCH_LIMIT: usize = 20;
pub const ARTISTS_BATCH_LIMIT: usize = 50;

/// Errors surfaced by catalog lookups. A whole-call failure abandons the
/// current batch; individual unknown identifiers come back as `None` slots
/// in the payload list instead.
#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("catalog rate limit exceeded (retry after {retry_after_secs}s)")]
    RateLimited { retry_after_secs: u64 },

    #[error("catalog authorization failed: {0}")]
    Unauthorized(String),

    #[error("catalog request failed with status {status}: {message}")]
    Api { status: u16, message: String },

    #[error("catalog http error: {0}")]
    Http(#[from] reqwest::Error),
}

/// Batched lookup operations against the external catalog.
///
/// Payload lists are positionally paired with the queried identifiers; a
/// `None` slot means the catalog does not know that identifier.
/// Implementations reject batches over the per-kind ceiling.
pub trait CatalogClient: Send + Sync {
    fn fetch_tracks(&self, uris: &[String]) -> Result<Vec<Option<TrackPayload>>>;

    fn fetch_albums(&self, uris: &[String]) -> Result<Vec<Option<AlbumPayload>>>;

    fn fetch_artists(&self, uris: &[String]) -> Result<Vec<Option<ArtistPayload>>>;
}
