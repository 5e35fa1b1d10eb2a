//! In-memory identity index over the persisted library.
//!
//! Loaded once per run from the store's bulk-read indexes so resolution and
//! materialization never issue row-at-a-time lookups. The cache is the
//! authority on "is this identifier already known": a track uri resolves
//! either directly or through the alias table.

use crate::library_store::LibraryStore;
use anyhow::Result;
use std::collections::HashMap;

/// What the run needs to know about a track beyond its rowid.
#[derive(Clone, Copy, Debug)]
pub struct TrackDetail {
    pub album_rowid: Option<i64>,
    pub duration_ms: i64,
}

#[derive(Default)]
pub struct IdentityCache {
    tracks: HashMap<String, i64>,
    track_details: HashMap<i64, TrackDetail>,
    aliases: HashMap<String, i64>,
    albums: HashMap<String, i64>,
    artists: HashMap<String, i64>,
    genres: HashMap<String, i64>,
    labels: HashMap<String, i64>,
    /// (album uri, track rowid) pairs whose album lookup failed on an
    /// earlier run; the resolver re-queues these.
    unresolved_albums: Vec<(String, i64)>,
}

impl IdentityCache {
    /// Load every persisted entity index.
    pub fn bootstrap(store: &dyn LibraryStore) -> Result<Self> {
        let mut cache = IdentityCache::default();

        for entry in store.track_index()? {
            if entry.album_rowid.is_none() {
                if let Some(album_uri) = &entry.album_uri {
                    cache
                        .unresolved_albums
                        .push((album_uri.clone(), entry.rowid));
                }
            }
            cache.track_details.insert(
                entry.rowid,
                TrackDetail {
                    album_rowid: entry.album_rowid,
                    duration_ms: entry.duration_ms,
                },
            );
            cache.tracks.insert(entry.uri, entry.rowid);
        }

        cache.aliases = store.alias_index()?.into_iter().collect();
        cache.albums = store.album_index()?.into_iter().collect();
        cache.artists = store.artist_index()?.into_iter().collect();
        cache.genres = store.genre_index()?.into_iter().collect();
        cache.labels = store.label_index()?.into_iter().collect();

        Ok(cache)
    }

    // =========================================================================
    // Tracks & Aliases
    // =========================================================================

    /// Resolve a track identifier, falling through the alias table.
    pub fn resolve_track(&self, uri: &str) -> Option<i64> {
        self.tracks
            .get(uri)
            .or_else(|| self.aliases.get(uri))
            .copied()
    }

    pub fn track_detail(&self, rowid: i64) -> Option<TrackDetail> {
        self.track_details.get(&rowid).copied()
    }

    pub fn register_track(&mut self, uri: &str, rowid: i64, detail: TrackDetail) {
        self.tracks.insert(uri.to_string(), rowid);
        self.track_details.insert(rowid, detail);
    }

    pub fn register_alias(&mut self, observed_uri: &str, track_rowid: i64) {
        self.aliases.insert(observed_uri.to_string(), track_rowid);
    }

    pub fn set_track_album(&mut self, track_rowid: i64, album_rowid: i64) {
        if let Some(detail) = self.track_details.get_mut(&track_rowid) {
            detail.album_rowid = Some(album_rowid);
        }
    }

    /// Drain the albums left unresolved by earlier runs.
    pub fn take_unresolved_albums(&mut self) -> Vec<(String, i64)> {
        std::mem::take(&mut self.unresolved_albums)
    }

    // =========================================================================
    // Other Kinds
    // =========================================================================

    pub fn lookup_album(&self, uri: &str) -> Option<i64> {
        self.albums.get(uri).copied()
    }

    pub fn register_album(&mut self, uri: &str, rowid: i64) {
        self.albums.insert(uri.to_string(), rowid);
    }

    pub fn lookup_artist(&self, uri: &str) -> Option<i64> {
        self.artists.get(uri).copied()
    }

    pub fn register_artist(&mut self, uri: &str, rowid: i64) {
        self.artists.insert(uri.to_string(), rowid);
    }

    pub fn lookup_genre(&self, name: &str) -> Option<i64> {
        self.genres.get(name).copied()
    }

    pub fn register_genre(&mut self, name: &str, rowid: i64) {
        self.genres.insert(name.to_string(), rowid);
    }

    pub fn lookup_label(&self, name: &str) -> Option<i64> {
        self.labels.get(name).copied()
    }

    pub fn register_label(&mut self, name: &str, rowid: i64) {
        self.labels.insert(name.to_string(), rowid);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::library_store::{MemoryLibraryStore, NewTrack};

    fn new_track(uri: &str, album_uri: Option<&str>) -> NewTrack {
        NewTrack {
            uri: uri.to_string(),
            name: "T".to_string(),
            album_rowid: None,
            album_uri: album_uri.map(|s| s.to_string()),
            disc_number: 1,
            duration_ms: 180_000,
            explicit: false,
            popularity: 10,
            preview_url: None,
            track_number: 1,
        }
    }

    #[test]
    fn test_resolve_track_falls_through_alias() {
        let store = MemoryLibraryStore::new();
        let rowid = store.upsert_track(&new_track("spotify:track:new", None)).unwrap();
        store.insert_alias("spotify:track:old", rowid).unwrap();

        let cache = IdentityCache::bootstrap(&store).unwrap();
        assert_eq!(cache.resolve_track("spotify:track:new"), Some(rowid));
        assert_eq!(cache.resolve_track("spotify:track:old"), Some(rowid));
        assert_eq!(cache.resolve_track("spotify:track:other"), None);
    }

    #[test]
    fn test_bootstrap_collects_unresolved_albums() {
        let store = MemoryLibraryStore::new();
        let rowid = store
            .upsert_track(&new_track("spotify:track:a", Some("spotify:album:x")))
            .unwrap();
        store.upsert_track(&new_track("spotify:track:b", None)).unwrap();

        let mut cache = IdentityCache::bootstrap(&store).unwrap();
        assert_eq!(
            cache.take_unresolved_albums(),
            vec![("spotify:album:x".to_string(), rowid)]
        );
        assert!(cache.take_unresolved_albums().is_empty());
    }

    #[test]
    fn test_register_and_set_album_updates_detail() {
        let mut cache = IdentityCache::default();
        cache.register_track(
            "spotify:track:a",
            7,
            TrackDetail {
                album_rowid: None,
                duration_ms: 1000,
            },
        );
        cache.set_track_album(7, 3);
        assert_eq!(cache.track_detail(7).unwrap().album_rowid, Some(3));
    }
}
