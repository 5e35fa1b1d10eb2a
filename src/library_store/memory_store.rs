//! In-memory LibraryStore.
//!
//! Backs populator tests so the resolution algorithm can run against plain
//! maps instead of SQLite. Batch semantics are real: `begin_batch` snapshots
//! the state and `rollback_batch` restores it.

use super::models::{
    Album, Artist, AudioFeatures, InsertedPlay, LibraryCounts, NewAlbum, NewArtist, NewPlay,
    NewTrack, Track, TrackIndexEntry,
};
use super::trait_def::LibraryStore;
use anyhow::Result;
use std::collections::HashMap;
use std::sync::Mutex;

#[derive(Clone, Default)]
struct MemoryState {
    tracks: Vec<Track>,
    albums: Vec<Album>,
    artists: Vec<Artist>,
    genres: Vec<String>,
    labels: Vec<String>,
    aliases: Vec<(String, i64)>,
    plays: Vec<NewPlay>,
    track_artists: Vec<(i64, i64)>,
    album_artists: Vec<(i64, i64)>,
    artist_genres: Vec<(i64, i64)>,
    play_artists: Vec<(i64, i64)>,
}

#[derive(Default)]
pub struct MemoryLibraryStore {
    state: Mutex<MemoryState>,
    snapshot: Mutex<Option<MemoryState>>,
}

impl MemoryLibraryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Artist rowids attached to the play at `play_rowid`, in attach order.
    pub fn play_artists(&self, play_rowid: i64) -> Vec<i64> {
        self.state
            .lock()
            .unwrap()
            .play_artists
            .iter()
            .filter(|(play, _)| *play == play_rowid)
            .map(|(_, artist)| *artist)
            .collect()
    }

    /// All persisted play rows, for assertions.
    pub fn plays(&self) -> Vec<NewPlay> {
        self.state.lock().unwrap().plays.clone()
    }
}

fn push_unique(pairs: &mut Vec<(i64, i64)>, pair: (i64, i64)) {
    if !pairs.contains(&pair) {
        pairs.push(pair);
    }
}

impl LibraryStore for MemoryLibraryStore {
    fn track_index(&self) -> Result<Vec<TrackIndexEntry>> {
        let state = self.state.lock().unwrap();
        Ok(state
            .tracks
            .iter()
            .map(|t| TrackIndexEntry {
                rowid: t.rowid,
                uri: t.uri.clone(),
                album_rowid: t.album_rowid,
                album_uri: t.album_uri.clone(),
                duration_ms: t.duration_ms,
            })
            .collect())
    }

    fn album_index(&self) -> Result<Vec<(String, i64)>> {
        let state = self.state.lock().unwrap();
        Ok(state.albums.iter().map(|a| (a.uri.clone(), a.rowid)).collect())
    }

    fn artist_index(&self) -> Result<Vec<(String, i64)>> {
        let state = self.state.lock().unwrap();
        Ok(state.artists.iter().map(|a| (a.uri.clone(), a.rowid)).collect())
    }

    fn genre_index(&self) -> Result<Vec<(String, i64)>> {
        let state = self.state.lock().unwrap();
        Ok(state
            .genres
            .iter()
            .enumerate()
            .map(|(i, name)| (name.clone(), i as i64 + 1))
            .collect())
    }

    fn label_index(&self) -> Result<Vec<(String, i64)>> {
        let state = self.state.lock().unwrap();
        Ok(state
            .labels
            .iter()
            .enumerate()
            .map(|(i, name)| (name.clone(), i as i64 + 1))
            .collect())
    }

    fn alias_index(&self) -> Result<Vec<(String, i64)>> {
        Ok(self.state.lock().unwrap().aliases.clone())
    }

    fn begin_batch(&self) -> Result<()> {
        let state = self.state.lock().unwrap();
        *self.snapshot.lock().unwrap() = Some(state.clone());
        Ok(())
    }

    fn commit_batch(&self) -> Result<()> {
        *self.snapshot.lock().unwrap() = None;
        Ok(())
    }

    fn rollback_batch(&self) -> Result<()> {
        if let Some(snapshot) = self.snapshot.lock().unwrap().take() {
            *self.state.lock().unwrap() = snapshot;
        }
        Ok(())
    }

    fn upsert_track(&self, track: &NewTrack) -> Result<i64> {
        let mut state = self.state.lock().unwrap();
        if let Some(existing) = state.tracks.iter().find(|t| t.uri == track.uri) {
            return Ok(existing.rowid);
        }
        let rowid = state.tracks.len() as i64 + 1;
        state.tracks.push(Track {
            rowid,
            uri: track.uri.clone(),
            name: track.name.clone(),
            album_rowid: track.album_rowid,
            album_uri: track.album_uri.clone(),
            disc_number: track.disc_number,
            duration_ms: track.duration_ms,
            explicit: track.explicit,
            popularity: track.popularity,
            preview_url: track.preview_url.clone(),
            track_number: track.track_number,
            features: AudioFeatures::default(),
        });
        Ok(rowid)
    }

    fn upsert_album(&self, album: &NewAlbum) -> Result<i64> {
        let mut state = self.state.lock().unwrap();
        if let Some(existing) = state.albums.iter().find(|a| a.uri == album.uri) {
            return Ok(existing.rowid);
        }
        let rowid = state.albums.len() as i64 + 1;
        state.albums.push(Album {
            rowid,
            uri: album.uri.clone(),
            name: album.name.clone(),
            album_type: album.album_type.clone(),
            total_tracks: album.total_tracks,
            release_date: album.release_date.clone(),
            label_rowid: None,
            popularity: album.popularity,
            image_url: album.image_url.clone(),
        });
        Ok(rowid)
    }

    fn upsert_artist(&self, artist: &NewArtist) -> Result<i64> {
        let mut state = self.state.lock().unwrap();
        if let Some(existing) = state.artists.iter().find(|a| a.uri == artist.uri) {
            return Ok(existing.rowid);
        }
        let rowid = state.artists.len() as i64 + 1;
        state.artists.push(Artist {
            rowid,
            uri: artist.uri.clone(),
            name: artist.name.clone(),
            followers: artist.followers,
            popularity: artist.popularity,
            image_url: artist.image_url.clone(),
            genres: Vec::new(),
        });
        Ok(rowid)
    }

    fn upsert_genre(&self, name: &str) -> Result<i64> {
        let mut state = self.state.lock().unwrap();
        if let Some(pos) = state.genres.iter().position(|g| g == name) {
            return Ok(pos as i64 + 1);
        }
        state.genres.push(name.to_string());
        Ok(state.genres.len() as i64)
    }

    fn upsert_label(&self, name: &str) -> Result<i64> {
        let mut state = self.state.lock().unwrap();
        if let Some(pos) = state.labels.iter().position(|l| l == name) {
            return Ok(pos as i64 + 1);
        }
        state.labels.push(name.to_string());
        Ok(state.labels.len() as i64)
    }

    fn insert_alias(&self, observed_uri: &str, track_rowid: i64) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        if !state.aliases.iter().any(|(uri, _)| uri == observed_uri) {
            state.aliases.push((observed_uri.to_string(), track_rowid));
        }
        Ok(())
    }

    fn set_track_album(&self, track_rowid: i64, album_rowid: i64) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        if let Some(track) = state.tracks.iter_mut().find(|t| t.rowid == track_rowid) {
            track.album_rowid = Some(album_rowid);
        }
        Ok(())
    }

    fn set_album_label(&self, album_rowid: i64, label_rowid: i64) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        if let Some(album) = state.albums.iter_mut().find(|a| a.rowid == album_rowid) {
            album.label_rowid = Some(label_rowid);
        }
        Ok(())
    }

    fn attach_track_artist(&self, track_rowid: i64, artist_rowid: i64) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        push_unique(&mut state.track_artists, (track_rowid, artist_rowid));
        Ok(())
    }

    fn attach_album_artist(&self, album_rowid: i64, artist_rowid: i64) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        push_unique(&mut state.album_artists, (album_rowid, artist_rowid));
        Ok(())
    }

    fn attach_artist_genre(&self, artist_rowid: i64, genre_rowid: i64) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        push_unique(&mut state.artist_genres, (artist_rowid, genre_rowid));
        Ok(())
    }

    fn insert_plays(&self, plays: &[NewPlay]) -> Result<Vec<InsertedPlay>> {
        let mut state = self.state.lock().unwrap();
        let mut inserted = Vec::with_capacity(plays.len());
        for play in plays {
            if let Some(pos) = state
                .plays
                .iter()
                .position(|p| p.track_rowid == play.track_rowid && p.played_at == play.played_at)
            {
                inserted.push(InsertedPlay {
                    rowid: pos as i64 + 1,
                    created: false,
                });
            } else {
                state.plays.push(play.clone());
                inserted.push(InsertedPlay {
                    rowid: state.plays.len() as i64,
                    created: true,
                });
            }
        }
        Ok(inserted)
    }

    fn attach_play_artists(&self, play_rowid: i64, artist_rowids: &[i64]) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        for artist_rowid in artist_rowids {
            push_unique(&mut state.play_artists, (play_rowid, *artist_rowid));
        }
        Ok(())
    }

    fn track_artists_map(&self) -> Result<HashMap<i64, Vec<i64>>> {
        let state = self.state.lock().unwrap();
        let mut map: HashMap<i64, Vec<i64>> = HashMap::new();
        for (track, artist) in &state.track_artists {
            map.entry(*track).or_default().push(*artist);
        }
        Ok(map)
    }

    fn album_artists_map(&self) -> Result<HashMap<i64, Vec<i64>>> {
        let state = self.state.lock().unwrap();
        let mut map: HashMap<i64, Vec<i64>> = HashMap::new();
        for (album, artist) in &state.album_artists {
            map.entry(*album).or_default().push(*artist);
        }
        Ok(map)
    }

    fn get_track(&self, uri: &str) -> Result<Option<Track>> {
        let state = self.state.lock().unwrap();
        Ok(state.tracks.iter().find(|t| t.uri == uri).cloned())
    }

    fn get_album(&self, uri: &str) -> Result<Option<Album>> {
        let state = self.state.lock().unwrap();
        Ok(state.albums.iter().find(|a| a.uri == uri).cloned())
    }

    fn get_artist(&self, uri: &str) -> Result<Option<Artist>> {
        let state = self.state.lock().unwrap();
        let artist = state.artists.iter().find(|a| a.uri == uri).cloned();
        Ok(artist.map(|mut artist| {
            let mut genres: Vec<String> = state
                .artist_genres
                .iter()
                .filter(|(a, _)| *a == artist.rowid)
                .filter_map(|(_, g)| state.genres.get(*g as usize - 1).cloned())
                .collect();
            genres.sort();
            artist.genres = genres;
            artist
        }))
    }

    fn counts(&self) -> Result<LibraryCounts> {
        let state = self.state.lock().unwrap();
        Ok(LibraryCounts {
            tracks: state.tracks.len() as i64,
            albums: state.albums.len() as i64,
            artists: state.artists.len() as i64,
            labels: state.labels.len() as i64,
            genres: state.genres.len() as i64,
            aliases: state.aliases.len() as i64,
            plays: state.plays.len() as i64,
        })
    }
}
