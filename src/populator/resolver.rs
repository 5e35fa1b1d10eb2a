//! The staged entity-resolution algorithm.
//!
//! One resolve pass runs four strictly-ordered stages: tracks, then albums,
//! then artists, then labels/genres. Later stages consume the associations
//! queued by earlier ones, so a stage never revisits an identifier resolved
//! within the same pass. Catalog lookups are batched up to the per-kind
//! ceiling; the writes for each batch share one store transaction, so a
//! failed batch leaves nothing behind and the next run retries exactly the
//! still-unresolved identifiers.

use super::identity_cache::{IdentityCache, TrackDetail};
use crate::catalog_client::{
    AlbumPayload, ArtistPayload, CatalogClient, TrackPayload, ALBUMS_BATCH_LIMIT,
    ARTISTS_BATCH_LIMIT, TRACKS_BATCH_LIMIT,
};
use crate::library_store::{LibraryStore, NewAlbum, NewArtist, NewTrack};
use anyhow::Result;
use chrono::{NaiveDate, Utc};
use indicatif::ProgressBar;
use std::collections::{BTreeMap, BTreeSet};
use tracing::{debug, info};

/// Per-run resolution counters.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ResolveStats {
    pub tracks_created: usize,
    pub albums_created: usize,
    pub artists_created: usize,
    pub labels_created: usize,
    pub genres_created: usize,
    pub aliases_created: usize,
    pub not_found: usize,
}

/// Attachments waiting on an artist that has not been fetched yet.
#[derive(Default)]
struct PendingArtist {
    track_rowids: Vec<i64>,
    album_rowids: Vec<i64>,
}

/// Derive a concrete date from the catalog's `(release_date, precision)`
/// pair. The catalog intentionally reduces precision for some releases;
/// ingestion must not fail over a missing month or day.
pub fn parse_release_date(raw: &str, precision: &str) -> NaiveDate {
    let today = Utc::now().date_naive();
    match precision {
        "year" => match raw.parse::<i32>() {
            Ok(year) if year > 0 => NaiveDate::from_ymd_opt(year, 1, 1).unwrap_or(today),
            _ => today,
        },
        "month" => NaiveDate::parse_from_str(&format!("{}-01", raw), "%Y-%m-%d").unwrap_or(today),
        "day" => NaiveDate::parse_from_str(raw, "%Y-%m-%d").unwrap_or(today),
        _ => today,
    }
}

pub struct EntityResolver<'a> {
    store: &'a dyn LibraryStore,
    catalog: &'a dyn CatalogClient,
    cache: &'a mut IdentityCache,
    // Pending maps are BTreeMaps so batch composition is deterministic.
    pending_albums: BTreeMap<String, Vec<i64>>,
    pending_artists: BTreeMap<String, PendingArtist>,
    pending_genres: BTreeMap<String, Vec<i64>>,
    pending_labels: BTreeMap<String, Vec<i64>>,
    stats: ResolveStats,
}

impl<'a> EntityResolver<'a> {
    pub fn new(
        store: &'a dyn LibraryStore,
        catalog: &'a dyn CatalogClient,
        cache: &'a mut IdentityCache,
    ) -> Self {
        EntityResolver {
            store,
            catalog,
            cache,
            pending_albums: BTreeMap::new(),
            pending_artists: BTreeMap::new(),
            pending_genres: BTreeMap::new(),
            pending_labels: BTreeMap::new(),
            stats: ResolveStats::default(),
        }
    }

    /// Resolve every entity transitively reachable from `identifiers`.
    pub fn resolve(&mut self, identifiers: &BTreeSet<String>) -> Result<ResolveStats> {
        // Albums that failed to resolve on an earlier run get another chance.
        for (album_uri, track_rowid) in self.cache.take_unresolved_albums() {
            let queued = self.pending_albums.entry(album_uri).or_default();
            if !queued.contains(&track_rowid) {
                queued.push(track_rowid);
            }
        }

        self.resolve_tracks(identifiers)?;
        self.resolve_albums()?;
        self.resolve_artists()?;
        self.resolve_labels_and_genres()?;

        info!(
            "Resolution pass complete: {} tracks, {} albums, {} artists, {} labels, {} genres created; {} aliases recorded; {} identifiers unknown to the catalog",
            self.stats.tracks_created,
            self.stats.albums_created,
            self.stats.artists_created,
            self.stats.labels_created,
            self.stats.genres_created,
            self.stats.aliases_created,
            self.stats.not_found
        );

        Ok(self.stats)
    }

    // =========================================================================
    // Stage 1: Tracks
    // =========================================================================

    fn resolve_tracks(&mut self, identifiers: &BTreeSet<String>) -> Result<()> {
        let unseen: Vec<String> = identifiers
            .iter()
            .filter(|uri| self.cache.resolve_track(uri).is_none())
            .cloned()
            .collect();

        info!(
            "{} of {} referenced tracks are unseen",
            unseen.len(),
            identifiers.len()
        );

        let progress = ProgressBar::new(unseen.len() as u64);
        for chunk in unseen.chunks(TRACKS_BATCH_LIMIT) {
            let payloads = self.catalog.fetch_tracks(chunk)?;

            self.store.begin_batch()?;
            match self.ingest_track_batch(chunk, payloads) {
                Ok(()) => self.store.commit_batch()?,
                Err(e) => {
                    let _ = self.store.rollback_batch();
                    return Err(e);
                }
            }
            progress.inc(chunk.len() as u64);
        }
        progress.finish_and_clear();
        Ok(())
    }

    fn ingest_track_batch(
        &mut self,
        queried: &[String],
        payloads: Vec<Option<TrackPayload>>,
    ) -> Result<()> {
        for (queried_uri, payload) in queried.iter().zip(payloads) {
            match payload {
                Some(track) => self.ingest_track(queried_uri, track)?,
                None => {
                    debug!("Catalog has no track for {}", queried_uri);
                    self.stats.not_found += 1;
                }
            }
        }
        Ok(())
    }

    fn ingest_track(&mut self, queried_uri: &str, payload: TrackPayload) -> Result<()> {
        // The canonical identifier may already be known under a different
        // uri; record the alias instead of creating a duplicate.
        if let Some(existing) = self.cache.resolve_track(&payload.uri) {
            if payload.uri != queried_uri {
                self.store.insert_alias(queried_uri, existing)?;
                self.cache.register_alias(queried_uri, existing);
                self.stats.aliases_created += 1;
            }
            return Ok(());
        }

        let album_rowid = self.cache.lookup_album(&payload.album.uri);
        let rowid = self.store.upsert_track(&NewTrack {
            uri: payload.uri.clone(),
            name: payload.name.clone(),
            album_rowid,
            album_uri: Some(payload.album.uri.clone()),
            disc_number: payload.disc_number,
            duration_ms: payload.duration_ms,
            explicit: payload.explicit,
            popularity: payload.popularity,
            preview_url: payload.preview_url.clone(),
            track_number: payload.track_number,
        })?;
        self.cache.register_track(
            &payload.uri,
            rowid,
            TrackDetail {
                album_rowid,
                duration_ms: payload.duration_ms,
            },
        );
        self.stats.tracks_created += 1;

        // A queried identifier the catalog superseded still has to resolve
        // on the next lookup, so it gets an alias to the fresh track too.
        if payload.uri != queried_uri {
            self.store.insert_alias(queried_uri, rowid)?;
            self.cache.register_alias(queried_uri, rowid);
            self.stats.aliases_created += 1;
        }

        if album_rowid.is_none() {
            self.pending_albums
                .entry(payload.album.uri.clone())
                .or_default()
                .push(rowid);
        }

        for artist in &payload.artists {
            if let Some(artist_rowid) = self.cache.lookup_artist(&artist.uri) {
                self.store.attach_track_artist(rowid, artist_rowid)?;
            } else {
                let entry = self.pending_artists.entry(artist.uri.clone()).or_default();
                if !entry.track_rowids.contains(&rowid) {
                    entry.track_rowids.push(rowid);
                }
            }
        }
        Ok(())
    }

    // =========================================================================
    // Stage 2: Albums
    // =========================================================================

    fn resolve_albums(&mut self) -> Result<()> {
        let pending = std::mem::take(&mut self.pending_albums);
        if pending.is_empty() {
            return Ok(());
        }
        let uris: Vec<String> = pending.keys().cloned().collect();
        info!("Resolving {} pending albums", uris.len());

        let progress = ProgressBar::new(uris.len() as u64);
        for chunk in uris.chunks(ALBUMS_BATCH_LIMIT) {
            let payloads = self.catalog.fetch_albums(chunk)?;

            self.store.begin_batch()?;
            match self.ingest_album_batch(chunk, payloads, &pending) {
                Ok(()) => self.store.commit_batch()?,
                Err(e) => {
                    let _ = self.store.rollback_batch();
                    return Err(e);
                }
            }
            progress.inc(chunk.len() as u64);
        }
        progress.finish_and_clear();
        Ok(())
    }

    fn ingest_album_batch(
        &mut self,
        queried: &[String],
        payloads: Vec<Option<AlbumPayload>>,
        pending: &BTreeMap<String, Vec<i64>>,
    ) -> Result<()> {
        for (queried_uri, payload) in queried.iter().zip(payloads) {
            match payload {
                Some(album) => {
                    let waiting = pending.get(queried_uri).map(Vec::as_slice).unwrap_or(&[]);
                    self.ingest_album(album, waiting)?;
                }
                None => {
                    // Queued tracks keep their album uri, so the lookup is
                    // retried on the next run.
                    debug!("Catalog has no album for {}", queried_uri);
                    self.stats.not_found += 1;
                }
            }
        }
        Ok(())
    }

    fn ingest_album(&mut self, payload: AlbumPayload, waiting_tracks: &[i64]) -> Result<()> {
        let rowid = match self.cache.lookup_album(&payload.uri) {
            Some(rowid) => rowid,
            None => {
                let release_date =
                    parse_release_date(&payload.release_date, &payload.release_date_precision);
                let rowid = self.store.upsert_album(&NewAlbum {
                    uri: payload.uri.clone(),
                    name: payload.name.clone(),
                    album_type: payload.album_type.clone(),
                    total_tracks: payload.total_tracks,
                    release_date: release_date.format("%Y-%m-%d").to_string(),
                    popularity: payload.popularity,
                    image_url: payload.primary_image_url(),
                })?;
                self.cache.register_album(&payload.uri, rowid);
                self.stats.albums_created += 1;
                rowid
            }
        };

        for track_rowid in waiting_tracks {
            self.store.set_track_album(*track_rowid, rowid)?;
            self.cache.set_track_album(*track_rowid, rowid);
        }

        if let Some(label) = payload.label.as_deref().filter(|label| !label.is_empty()) {
            if let Some(label_rowid) = self.cache.lookup_label(label) {
                self.store.set_album_label(rowid, label_rowid)?;
            } else {
                let queued = self.pending_labels.entry(label.to_string()).or_default();
                if !queued.contains(&rowid) {
                    queued.push(rowid);
                }
            }
        }

        for artist in &payload.artists {
            if let Some(artist_rowid) = self.cache.lookup_artist(&artist.uri) {
                self.store.attach_album_artist(rowid, artist_rowid)?;
            } else {
                let entry = self.pending_artists.entry(artist.uri.clone()).or_default();
                if !entry.album_rowids.contains(&rowid) {
                    entry.album_rowids.push(rowid);
                }
            }
        }
        Ok(())
    }

    // =========================================================================
    // Stage 3: Artists
    // =========================================================================

    fn resolve_artists(&mut self) -> Result<()> {
        let pending = std::mem::take(&mut self.pending_artists);
        if pending.is_empty() {
            return Ok(());
        }
        let uris: Vec<String> = pending.keys().cloned().collect();
        info!("Resolving {} pending artists", uris.len());

        let progress = ProgressBar::new(uris.len() as u64);
        for chunk in uris.chunks(ARTISTS_BATCH_LIMIT) {
            let payloads = self.catalog.fetch_artists(chunk)?;

            self.store.begin_batch()?;
            match self.ingest_artist_batch(chunk, payloads, &pending) {
                Ok(()) => self.store.commit_batch()?,
                Err(e) => {
                    let _ = self.store.rollback_batch();
                    return Err(e);
                }
            }
            progress.inc(chunk.len() as u64);
        }
        progress.finish_and_clear();
        Ok(())
    }

    fn ingest_artist_batch(
        &mut self,
        queried: &[String],
        payloads: Vec<Option<ArtistPayload>>,
        pending: &BTreeMap<String, PendingArtist>,
    ) -> Result<()> {
        for (queried_uri, payload) in queried.iter().zip(payloads) {
            match payload {
                Some(artist) => {
                    let waiting = &pending[queried_uri];
                    self.ingest_artist(artist, waiting)?;
                }
                None => {
                    debug!("Catalog has no artist for {}", queried_uri);
                    self.stats.not_found += 1;
                }
            }
        }
        Ok(())
    }

    fn ingest_artist(&mut self, payload: ArtistPayload, waiting: &PendingArtist) -> Result<()> {
        let rowid = match self.cache.lookup_artist(&payload.uri) {
            Some(rowid) => rowid,
            None => {
                let rowid = self.store.upsert_artist(&NewArtist {
                    uri: payload.uri.clone(),
                    name: payload.name.clone(),
                    followers: payload.followers.total,
                    popularity: payload.popularity,
                    image_url: payload.primary_image_url(),
                })?;
                self.cache.register_artist(&payload.uri, rowid);
                self.stats.artists_created += 1;
                rowid
            }
        };

        for track_rowid in &waiting.track_rowids {
            self.store.attach_track_artist(*track_rowid, rowid)?;
        }
        for album_rowid in &waiting.album_rowids {
            self.store.attach_album_artist(*album_rowid, rowid)?;
        }

        for genre in &payload.genres {
            if let Some(genre_rowid) = self.cache.lookup_genre(genre) {
                self.store.attach_artist_genre(rowid, genre_rowid)?;
            } else {
                let queued = self.pending_genres.entry(genre.clone()).or_default();
                if !queued.contains(&rowid) {
                    queued.push(rowid);
                }
            }
        }
        Ok(())
    }

    // =========================================================================
    // Stage 4: Labels & Genres
    // =========================================================================

    fn resolve_labels_and_genres(&mut self) -> Result<()> {
        let labels = std::mem::take(&mut self.pending_labels);
        let genres = std::mem::take(&mut self.pending_genres);
        if labels.is_empty() && genres.is_empty() {
            return Ok(());
        }
        info!(
            "Resolving {} pending labels and {} pending genres",
            labels.len(),
            genres.len()
        );

        self.store.begin_batch()?;
        match self.ingest_labels_and_genres(labels, genres) {
            Ok(()) => self.store.commit_batch()?,
            Err(e) => {
                let _ = self.store.rollback_batch();
                return Err(e);
            }
        }
        Ok(())
    }

    fn ingest_labels_and_genres(
        &mut self,
        labels: BTreeMap<String, Vec<i64>>,
        genres: BTreeMap<String, Vec<i64>>,
    ) -> Result<()> {
        for (name, album_rowids) in labels {
            let rowid = match self.cache.lookup_label(&name) {
                Some(rowid) => rowid,
                None => {
                    let rowid = self.store.upsert_label(&name)?;
                    self.cache.register_label(&name, rowid);
                    self.stats.labels_created += 1;
                    rowid
                }
            };
            for album_rowid in album_rowids {
                self.store.set_album_label(album_rowid, rowid)?;
            }
        }

        for (name, artist_rowids) in genres {
            let rowid = match self.cache.lookup_genre(&name) {
                Some(rowid) => rowid,
                None => {
                    let rowid = self.store.upsert_genre(&name)?;
                    self.cache.register_genre(&name, rowid);
                    self.stats.genres_created += 1;
                    rowid
                }
            };
            for artist_rowid in artist_rowids {
                self.store.attach_artist_genre(artist_rowid, rowid)?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog_client::{AlbumRef, ArtistRef, FollowerCount, ImageRef};
    use crate::library_store::MemoryLibraryStore;
    use std::collections::HashMap;
    use std::sync::Mutex;

    /// Scripted catalog: payloads keyed by queried uri, calls recorded.
    #[derive(Default)]
    struct FakeCatalog {
        tracks: HashMap<String, TrackPayload>,
        albums: HashMap<String, AlbumPayload>,
        artists: HashMap<String, ArtistPayload>,
        calls: Mutex<Vec<(&'static str, usize)>>,
    }

    impl FakeCatalog {
        fn call_batches(&self, endpoint: &str) -> Vec<usize> {
            self.calls
                .lock()
                .unwrap()
                .iter()
                .filter(|(name, _)| *name == endpoint)
                .map(|(_, len)| *len)
                .collect()
        }

        fn total_calls(&self) -> usize {
            self.calls.lock().unwrap().len()
        }
    }

    impl CatalogClient for FakeCatalog {
        fn fetch_tracks(&self, uris: &[String]) -> Result<Vec<Option<TrackPayload>>> {
            assert!(uris.len() <= TRACKS_BATCH_LIMIT);
            self.calls.lock().unwrap().push(("tracks", uris.len()));
            Ok(uris.iter().map(|uri| self.tracks.get(uri).cloned()).collect())
        }

        fn fetch_albums(&self, uris: &[String]) -> Result<Vec<Option<AlbumPayload>>> {
            assert!(uris.len() <= ALBUMS_BATCH_LIMIT);
            self.calls.lock().unwrap().push(("albums", uris.len()));
            Ok(uris.iter().map(|uri| self.albums.get(uri).cloned()).collect())
        }

        fn fetch_artists(&self, uris: &[String]) -> Result<Vec<Option<ArtistPayload>>> {
            assert!(uris.len() <= ARTISTS_BATCH_LIMIT);
            self.calls.lock().unwrap().push(("artists", uris.len()));
            Ok(uris.iter().map(|uri| self.artists.get(uri).cloned()).collect())
        }
    }

    fn track_payload(uri: &str, album_uri: &str, artist_uris: &[&str]) -> TrackPayload {
        TrackPayload {
            uri: uri.to_string(),
            name: format!("track {}", uri),
            disc_number: 1,
            duration_ms: 200_000,
            explicit: false,
            popularity: 40,
            preview_url: None,
            track_number: 1,
            album: AlbumRef {
                uri: album_uri.to_string(),
            },
            artists: artist_uris
                .iter()
                .map(|uri| ArtistRef {
                    uri: uri.to_string(),
                })
                .collect(),
        }
    }

    fn album_payload(uri: &str, label: Option<&str>, artist_uris: &[&str]) -> AlbumPayload {
        AlbumPayload {
            uri: uri.to_string(),
            name: format!("album {}", uri),
            album_type: "album".to_string(),
            total_tracks: 12,
            release_date: "2019-06-21".to_string(),
            release_date_precision: "day".to_string(),
            label: label.map(|l| l.to_string()),
            popularity: 70,
            images: vec![ImageRef {
                url: "https://img.example/cover.jpg".to_string(),
            }],
            artists: artist_uris
                .iter()
                .map(|uri| ArtistRef {
                    uri: uri.to_string(),
                })
                .collect(),
        }
    }

    fn artist_payload(uri: &str, genres: &[&str]) -> ArtistPayload {
        ArtistPayload {
            uri: uri.to_string(),
            name: format!("artist {}", uri),
            genres: genres.iter().map(|g| g.to_string()).collect(),
            followers: FollowerCount { total: 1234 },
            popularity: 61,
            images: vec![],
        }
    }

    fn uris(values: &[&str]) -> BTreeSet<String> {
        values.iter().map(|v| v.to_string()).collect()
    }

    fn resolve(
        store: &MemoryLibraryStore,
        catalog: &FakeCatalog,
        identifiers: &BTreeSet<String>,
    ) -> ResolveStats {
        let mut cache = IdentityCache::bootstrap(store).unwrap();
        let mut resolver = EntityResolver::new(store, catalog, &mut cache);
        resolver.resolve(identifiers).unwrap()
    }

    #[test]
    fn test_full_pass_builds_the_reachable_graph() {
        let store = MemoryLibraryStore::new();
        let mut catalog = FakeCatalog::default();
        catalog.tracks.insert(
            "spotify:track:t1".to_string(),
            track_payload("spotify:track:t1", "spotify:album:a1", &["spotify:artist:x"]),
        );
        catalog.albums.insert(
            "spotify:album:a1".to_string(),
            album_payload("spotify:album:a1", Some("Fat Possum"), &["spotify:artist:x"]),
        );
        catalog.artists.insert(
            "spotify:artist:x".to_string(),
            artist_payload("spotify:artist:x", &["slowcore", "indie rock"]),
        );

        let stats = resolve(&store, &catalog, &uris(&["spotify:track:t1"]));

        assert_eq!(stats.tracks_created, 1);
        assert_eq!(stats.albums_created, 1);
        assert_eq!(stats.artists_created, 1);
        assert_eq!(stats.labels_created, 1);
        assert_eq!(stats.genres_created, 2);
        assert_eq!(stats.not_found, 0);

        let track = store.get_track("spotify:track:t1").unwrap().unwrap();
        let album = store.get_album("spotify:album:a1").unwrap().unwrap();
        let artist = store.get_artist("spotify:artist:x").unwrap().unwrap();
        assert_eq!(track.album_rowid, Some(album.rowid));
        assert_eq!(album.release_date, "2019-06-21");
        assert!(album.label_rowid.is_some());
        assert_eq!(artist.followers, 1234);
        assert_eq!(artist.genres, vec!["indie rock", "slowcore"]);

        assert_eq!(store.track_artists_map().unwrap()[&track.rowid], vec![artist.rowid]);
        assert_eq!(store.album_artists_map().unwrap()[&album.rowid], vec![artist.rowid]);
    }

    #[test]
    fn test_second_pass_is_idempotent_and_issues_no_calls() {
        let store = MemoryLibraryStore::new();
        let mut catalog = FakeCatalog::default();
        catalog.tracks.insert(
            "spotify:track:t1".to_string(),
            track_payload("spotify:track:t1", "spotify:album:a1", &["spotify:artist:x"]),
        );
        catalog.albums.insert(
            "spotify:album:a1".to_string(),
            album_payload("spotify:album:a1", None, &["spotify:artist:x"]),
        );
        catalog.artists.insert(
            "spotify:artist:x".to_string(),
            artist_payload("spotify:artist:x", &[]),
        );

        let identifiers = uris(&["spotify:track:t1"]);
        resolve(&store, &catalog, &identifiers);
        let calls_after_first = catalog.total_calls();
        let counts_after_first = store.counts().unwrap();

        let stats = resolve(&store, &catalog, &identifiers);

        assert_eq!(catalog.total_calls(), calls_after_first);
        assert_eq!(store.counts().unwrap(), counts_after_first);
        assert_eq!(stats, ResolveStats::default());
    }

    #[test]
    fn test_superseded_identifier_gets_alias_to_existing_track() {
        let store = MemoryLibraryStore::new();
        let mut catalog = FakeCatalog::default();
        // Both identifiers resolve to the same canonical payload.
        catalog.tracks.insert(
            "spotify:track:current".to_string(),
            track_payload("spotify:track:current", "spotify:album:a1", &[]),
        );
        catalog.tracks.insert(
            "spotify:track:old".to_string(),
            track_payload("spotify:track:current", "spotify:album:a1", &[]),
        );
        catalog.albums.insert(
            "spotify:album:a1".to_string(),
            album_payload("spotify:album:a1", None, &[]),
        );

        resolve(&store, &catalog, &uris(&["spotify:track:current"]));
        resolve(&store, &catalog, &uris(&["spotify:track:old"]));

        let counts = store.counts().unwrap();
        assert_eq!(counts.tracks, 1);
        assert_eq!(counts.aliases, 1);

        let cache = IdentityCache::bootstrap(&store).unwrap();
        assert_eq!(
            cache.resolve_track("spotify:track:old"),
            cache.resolve_track("spotify:track:current")
        );
        assert_eq!(
            store.alias_index().unwrap(),
            vec![(
                "spotify:track:old".to_string(),
                cache.resolve_track("spotify:track:current").unwrap()
            )]
        );
    }

    #[test]
    fn test_superseded_identifier_aliases_even_when_canonical_is_new() {
        let store = MemoryLibraryStore::new();
        let mut catalog = FakeCatalog::default();
        catalog.tracks.insert(
            "spotify:track:old".to_string(),
            track_payload("spotify:track:current", "spotify:album:a1", &[]),
        );
        catalog.albums.insert(
            "spotify:album:a1".to_string(),
            album_payload("spotify:album:a1", None, &[]),
        );

        let stats = resolve(&store, &catalog, &uris(&["spotify:track:old"]));

        assert_eq!(stats.tracks_created, 1);
        assert_eq!(stats.aliases_created, 1);

        let cache = IdentityCache::bootstrap(&store).unwrap();
        let direct = cache.resolve_track("spotify:track:current").unwrap();
        assert_eq!(cache.resolve_track("spotify:track:old"), Some(direct));
    }

    #[test]
    fn test_batches_respect_ceilings_and_include_remainder() {
        let store = MemoryLibraryStore::new();
        let mut catalog = FakeCatalog::default();

        // 120 tracks over 23 albums, one artist.
        let mut identifiers = BTreeSet::new();
        for i in 0..120 {
            let track_uri = format!("spotify:track:t{:03}", i);
            let album_uri = format!("spotify:album:a{:02}", i % 23);
            catalog.tracks.insert(
                track_uri.clone(),
                track_payload(&track_uri, &album_uri, &["spotify:artist:x"]),
            );
            identifiers.insert(track_uri);
        }
        for i in 0..23 {
            let album_uri = format!("spotify:album:a{:02}", i);
            catalog
                .albums
                .insert(album_uri.clone(), album_payload(&album_uri, None, &[]));
        }
        catalog.artists.insert(
            "spotify:artist:x".to_string(),
            artist_payload("spotify:artist:x", &[]),
        );

        resolve(&store, &catalog, &identifiers);

        assert_eq!(catalog.call_batches("tracks"), vec![50, 50, 20]);
        assert_eq!(catalog.call_batches("albums"), vec![20, 3]);
        assert_eq!(catalog.call_batches("artists"), vec![1]);
        assert_eq!(store.counts().unwrap().tracks, 120);
        assert_eq!(store.counts().unwrap().albums, 23);
    }

    #[test]
    fn test_not_found_track_is_skipped_and_not_cached() {
        let store = MemoryLibraryStore::new();
        let catalog = FakeCatalog::default();

        let stats = resolve(&store, &catalog, &uris(&["spotify:track:ghost"]));

        assert_eq!(stats.not_found, 1);
        assert_eq!(store.counts().unwrap().tracks, 0);

        // Still unseen on the next pass, so it is queried again.
        resolve(&store, &catalog, &uris(&["spotify:track:ghost"]));
        assert_eq!(catalog.call_batches("tracks"), vec![1, 1]);
    }

    #[test]
    fn test_unresolved_album_is_retried_on_the_next_run() {
        let store = MemoryLibraryStore::new();
        let mut catalog = FakeCatalog::default();
        catalog.tracks.insert(
            "spotify:track:t1".to_string(),
            track_payload("spotify:track:t1", "spotify:album:a1", &[]),
        );

        // First run: the album lookup comes back empty.
        resolve(&store, &catalog, &uris(&["spotify:track:t1"]));
        assert!(store
            .get_track("spotify:track:t1")
            .unwrap()
            .unwrap()
            .album_rowid
            .is_none());

        // Second run: the catalog knows the album now; no new identifiers.
        catalog.albums.insert(
            "spotify:album:a1".to_string(),
            album_payload("spotify:album:a1", None, &[]),
        );
        let stats = resolve(&store, &catalog, &BTreeSet::new());

        assert_eq!(stats.albums_created, 1);
        let track = store.get_track("spotify:track:t1").unwrap().unwrap();
        assert!(track.album_rowid.is_some());
    }

    #[test]
    fn test_artist_shared_by_track_and_album_is_fetched_once() {
        let store = MemoryLibraryStore::new();
        let mut catalog = FakeCatalog::default();
        catalog.tracks.insert(
            "spotify:track:t1".to_string(),
            track_payload("spotify:track:t1", "spotify:album:a1", &["spotify:artist:x"]),
        );
        catalog.albums.insert(
            "spotify:album:a1".to_string(),
            album_payload("spotify:album:a1", None, &["spotify:artist:x"]),
        );
        catalog.artists.insert(
            "spotify:artist:x".to_string(),
            artist_payload("spotify:artist:x", &[]),
        );

        let stats = resolve(&store, &catalog, &uris(&["spotify:track:t1"]));

        assert_eq!(stats.artists_created, 1);
        assert_eq!(catalog.call_batches("artists"), vec![1]);

        let track = store.get_track("spotify:track:t1").unwrap().unwrap();
        let album = store.get_album("spotify:album:a1").unwrap().unwrap();
        let artist = store.get_artist("spotify:artist:x").unwrap().unwrap();
        assert_eq!(store.track_artists_map().unwrap()[&track.rowid], vec![artist.rowid]);
        assert_eq!(store.album_artists_map().unwrap()[&album.rowid], vec![artist.rowid]);
    }

    #[test]
    fn test_shared_label_is_created_once_and_linked_to_every_album() {
        let store = MemoryLibraryStore::new();
        let mut catalog = FakeCatalog::default();
        catalog.tracks.insert(
            "spotify:track:t1".to_string(),
            track_payload("spotify:track:t1", "spotify:album:a1", &[]),
        );
        catalog.tracks.insert(
            "spotify:track:t2".to_string(),
            track_payload("spotify:track:t2", "spotify:album:a2", &[]),
        );
        catalog.albums.insert(
            "spotify:album:a1".to_string(),
            album_payload("spotify:album:a1", Some("4AD"), &[]),
        );
        catalog.albums.insert(
            "spotify:album:a2".to_string(),
            album_payload("spotify:album:a2", Some("4AD"), &[]),
        );

        let stats = resolve(
            &store,
            &catalog,
            &uris(&["spotify:track:t1", "spotify:track:t2"]),
        );

        assert_eq!(stats.labels_created, 1);
        let a1 = store.get_album("spotify:album:a1").unwrap().unwrap();
        let a2 = store.get_album("spotify:album:a2").unwrap().unwrap();
        assert_eq!(a1.label_rowid, a2.label_rowid);
        assert!(a1.label_rowid.is_some());
    }

    #[test]
    fn test_parse_release_date_policy() {
        assert_eq!(
            parse_release_date("2020", "year"),
            NaiveDate::from_ymd_opt(2020, 1, 1).unwrap()
        );
        assert_eq!(
            parse_release_date("2020-05", "month"),
            NaiveDate::from_ymd_opt(2020, 5, 1).unwrap()
        );
        assert_eq!(
            parse_release_date("2020-05-14", "day"),
            NaiveDate::from_ymd_opt(2020, 5, 14).unwrap()
        );

        let today = Utc::now().date_naive();
        assert_eq!(parse_release_date("0", "year"), today);
        assert_eq!(parse_release_date("-44", "year"), today);
        assert_eq!(parse_release_date("2020-05-14", "unknown"), today);
        assert_eq!(parse_release_date("2020-05-14", ""), today);
    }
}
