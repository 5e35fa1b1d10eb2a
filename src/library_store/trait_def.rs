//! LibraryStore trait definition.
//!
//! The populate engine only ever talks to persistence through this trait:
//! bootstrap bulk-reads, upsert-by-unique-key, association attach, and a
//! bulk play insert. `SqliteLibraryStore` is the real backend;
//! `MemoryLibraryStore` backs tests.

use anyhow::Result;
use std::collections::HashMap;

use super::models::{
    Album, Artist, InsertedPlay, LibraryCounts, NewAlbum, NewArtist, NewPlay, NewTrack, Track,
    TrackIndexEntry,
};

pub trait LibraryStore: Send + Sync {
    // =========================================================================
    // Bootstrap Bulk-Reads
    // =========================================================================

    /// All known tracks with the fields the populate run needs in memory.
    fn track_index(&self) -> Result<Vec<TrackIndexEntry>>;

    /// All album uris and their rowids.
    fn album_index(&self) -> Result<Vec<(String, i64)>>;

    /// All artist uris and their rowids.
    fn artist_index(&self) -> Result<Vec<(String, i64)>>;

    /// All genre names and their rowids.
    fn genre_index(&self) -> Result<Vec<(String, i64)>>;

    /// All label names and their rowids.
    fn label_index(&self) -> Result<Vec<(String, i64)>>;

    /// All superseded uris and the canonical track rowid each maps to.
    fn alias_index(&self) -> Result<Vec<(String, i64)>>;

    // =========================================================================
    // Batch Transaction Boundary
    // =========================================================================

    /// Open a write transaction spanning a resolution batch. The upsert and
    /// association methods do not open transactions of their own, so writes
    /// issued between `begin_batch` and `commit_batch` land atomically.
    fn begin_batch(&self) -> Result<()>;

    fn commit_batch(&self) -> Result<()>;

    fn rollback_batch(&self) -> Result<()>;

    // =========================================================================
    // Upsert-by-Unique-Key
    // =========================================================================
    //
    // Each upsert returns the rowid of the row that now holds the key: the
    // freshly inserted one, or the pre-existing one when another writer got
    // there between cache bootstrap and now.

    fn upsert_track(&self, track: &NewTrack) -> Result<i64>;

    fn upsert_album(&self, album: &NewAlbum) -> Result<i64>;

    fn upsert_artist(&self, artist: &NewArtist) -> Result<i64>;

    fn upsert_genre(&self, name: &str) -> Result<i64>;

    fn upsert_label(&self, name: &str) -> Result<i64>;

    /// Record that `observed_uri` is a superseded identifier for an existing
    /// track. No-op when the uri is already recorded.
    fn insert_alias(&self, observed_uri: &str, track_rowid: i64) -> Result<()>;

    // =========================================================================
    // Association Operations
    // =========================================================================

    fn set_track_album(&self, track_rowid: i64, album_rowid: i64) -> Result<()>;

    fn set_album_label(&self, album_rowid: i64, label_rowid: i64) -> Result<()>;

    fn attach_track_artist(&self, track_rowid: i64, artist_rowid: i64) -> Result<()>;

    fn attach_album_artist(&self, album_rowid: i64, artist_rowid: i64) -> Result<()>;

    fn attach_artist_genre(&self, artist_rowid: i64, genre_rowid: i64) -> Result<()>;

    // =========================================================================
    // Play Events
    // =========================================================================

    /// Insert play rows in bulk, one transaction for the lot. Rows whose
    /// `(track_rowid, played_at)` pair already exists are reported with
    /// `created: false` and left untouched.
    fn insert_plays(&self, plays: &[NewPlay]) -> Result<Vec<InsertedPlay>>;

    fn attach_play_artists(&self, play_rowid: i64, artist_rowids: &[i64]) -> Result<()>;

    /// Track rowid -> artist rowids, in attach order.
    fn track_artists_map(&self) -> Result<HashMap<i64, Vec<i64>>>;

    /// Album rowid -> artist rowids, in attach order.
    fn album_artists_map(&self) -> Result<HashMap<i64, Vec<i64>>>;

    // =========================================================================
    // Reads (summary logging and tests)
    // =========================================================================

    fn get_track(&self, uri: &str) -> Result<Option<Track>>;

    fn get_album(&self, uri: &str) -> Result<Option<Album>>;

    fn get_artist(&self, uri: &str) -> Result<Option<Artist>>;

    fn counts(&self) -> Result<LibraryCounts>;
}
