//! Row models for the library database.
//!
//! Entities are keyed by integer rowids internally and by their unique
//! external identifier (Spotify uri, or plain name for labels/genres) at the
//! API boundary. `New*` structs carry the values for an upsert; the fuller
//! structs are what reads return.

/// A track row.
#[derive(Clone, Debug)]
pub struct Track {
    pub rowid: i64,
    pub uri: String,
    pub name: String,
    pub album_rowid: Option<i64>,
    /// Catalog identifier of the album, kept even while `album_rowid` is
    /// NULL so a later run can retry the album lookup.
    pub album_uri: Option<String>,
    pub disc_number: i64,
    pub duration_ms: i64,
    pub explicit: bool,
    pub popularity: i64,
    pub preview_url: Option<String>,
    pub track_number: i64,
    pub features: AudioFeatures,
}

/// Optional per-track audio analysis scalars.
///
/// Populated by a separate enrichment pass, not by the populate run; the
/// columns exist so enrichment does not need a schema revision.
#[derive(Clone, Debug, Default)]
pub struct AudioFeatures {
    pub acousticness: Option<f64>,
    pub danceability: Option<f64>,
    pub energy: Option<f64>,
    pub instrumentalness: Option<f64>,
    pub liveness: Option<f64>,
    pub loudness: Option<f64>,
    pub speechiness: Option<f64>,
    pub tempo: Option<f64>,
    pub valence: Option<f64>,
    pub key: Option<i64>,
    pub mode: Option<i64>,
    pub time_signature: Option<i64>,
}

/// An album row.
#[derive(Clone, Debug)]
pub struct Album {
    pub rowid: i64,
    pub uri: String,
    pub name: String,
    pub album_type: String,
    pub total_tracks: i64,
    pub release_date: String,
    pub label_rowid: Option<i64>,
    pub popularity: i64,
    pub image_url: Option<String>,
}

/// An artist row with its genre names resolved through the junction table.
#[derive(Clone, Debug)]
pub struct Artist {
    pub rowid: i64,
    pub uri: String,
    pub name: String,
    pub followers: i64,
    pub popularity: i64,
    pub image_url: Option<String>,
    pub genres: Vec<String>,
}

/// Per-kind row counts, for the end-of-run summary.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct LibraryCounts {
    pub tracks: i64,
    pub albums: i64,
    pub artists: i64,
    pub labels: i64,
    pub genres: i64,
    pub aliases: i64,
    pub plays: i64,
}

/// Values for a track upsert.
#[derive(Clone, Debug)]
pub struct NewTrack {
    pub uri: String,
    pub name: String,
    pub album_rowid: Option<i64>,
    pub album_uri: Option<String>,
    pub disc_number: i64,
    pub duration_ms: i64,
    pub explicit: bool,
    pub popularity: i64,
    pub preview_url: Option<String>,
    pub track_number: i64,
}

/// Values for an album upsert. `release_date` is the already-derived
/// `YYYY-MM-DD` form (see the resolver's precision policy).
#[derive(Clone, Debug)]
pub struct NewAlbum {
    pub uri: String,
    pub name: String,
    pub album_type: String,
    pub total_tracks: i64,
    pub release_date: String,
    pub popularity: i64,
    pub image_url: Option<String>,
}

/// Values for an artist upsert.
#[derive(Clone, Debug)]
pub struct NewArtist {
    pub uri: String,
    pub name: String,
    pub followers: i64,
    pub popularity: i64,
    pub image_url: Option<String>,
}

/// Values for one play row. `played_at` is unix seconds; together with
/// `track_rowid` it forms the play's natural key, so re-ingesting an
/// overlapping export does not duplicate rows.
#[derive(Clone, Debug)]
pub struct NewPlay {
    pub track_rowid: i64,
    pub album_rowid: Option<i64>,
    pub played_at: i64,
    pub ms_played: i64,
    pub ratio_played: f64,
    pub reason_start: String,
    pub reason_end: String,
    pub shuffle: bool,
}

/// Outcome of one row in a bulk play insert.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct InsertedPlay {
    pub rowid: i64,
    /// False when the (track, timestamp) pair already existed.
    pub created: bool,
}

/// One entry of the bootstrap track index: everything the populate run needs
/// to know about an existing track without further row reads.
#[derive(Clone, Debug)]
pub struct TrackIndexEntry {
    pub rowid: i64,
    pub uri: String,
    pub album_rowid: Option<i64>,
    pub album_uri: Option<String>,
    pub duration_ms: i64,
}
