//! SQLite-backed library store.
//!
//! A single write connection behind a mutex is enough here: the populate
//! pipeline is strictly sequential, so there is no read concurrency to pool
//! for. Batch atomicity is the caller's business via `begin_batch` /
//! `commit_batch`; the write methods themselves are plain statements.

use super::models::{
    Album, Artist, AudioFeatures, InsertedPlay, LibraryCounts, NewAlbum, NewArtist, NewPlay,
    NewTrack, Track, TrackIndexEntry,
};
use super::schema::LIBRARY_VERSIONED_SCHEMAS;
use super::trait_def::LibraryStore;
use anyhow::{Context, Result};
use rusqlite::{params, Connection, OptionalExtension};
use std::collections::HashMap;
use std::path::Path;
use std::sync::{Arc, Mutex};
use tracing::info;

pub struct SqliteLibraryStore {
    conn: Arc<Mutex<Connection>>,
}

fn init_schema_if_needed(conn: &Connection) -> Result<()> {
    let latest = &LIBRARY_VERSIONED_SCHEMAS[LIBRARY_VERSIONED_SCHEMAS.len() - 1];

    let table_count: i64 = conn
        .query_row(
            "SELECT COUNT(*) FROM sqlite_master WHERE type='table' AND name NOT LIKE 'sqlite_%'",
            [],
            |r| r.get(0),
        )
        .unwrap_or(0);

    if table_count == 0 {
        info!("Creating library db schema at version {}", latest.version);
        latest.create(conn)?;
        return Ok(());
    }

    latest
        .validate(conn)
        .context("Existing library database does not match the expected schema")
}

impl SqliteLibraryStore {
    pub fn new<P: AsRef<Path>>(db_path: P) -> Result<Self> {
        let conn = Connection::open_with_flags(
            db_path.as_ref(),
            rusqlite::OpenFlags::SQLITE_OPEN_READ_WRITE
                | rusqlite::OpenFlags::SQLITE_OPEN_CREATE
                | rusqlite::OpenFlags::SQLITE_OPEN_URI
                | rusqlite::OpenFlags::SQLITE_OPEN_NO_MUTEX,
        )
        .context("Failed to open library database")?;

        init_schema_if_needed(&conn)?;

        conn.pragma_update(None, "journal_mode", "WAL")?;
        conn.pragma_update(None, "foreign_keys", "ON")?;

        let track_count: i64 = conn
            .query_row("SELECT COUNT(*) FROM tracks", [], |r| r.get(0))
            .unwrap_or(0);
        let play_count: i64 = conn
            .query_row("SELECT COUNT(*) FROM plays", [], |r| r.get(0))
            .unwrap_or(0);

        info!(
            "Opened library database: {} tracks, {} plays",
            track_count, play_count
        );

        Ok(SqliteLibraryStore {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    fn keyed_index(&self, sql: &str) -> Result<Vec<(String, i64)>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(sql)?;
        let rows = stmt
            .query_map([], |r| Ok((r.get(0)?, r.get(1)?)))?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    fn junction_map(&self, sql: &str) -> Result<HashMap<i64, Vec<i64>>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(sql)?;
        let mut map: HashMap<i64, Vec<i64>> = HashMap::new();
        let rows = stmt.query_map([], |r| Ok((r.get::<_, i64>(0)?, r.get::<_, i64>(1)?)))?;
        for row in rows {
            let (left, right) = row?;
            map.entry(left).or_default().push(right);
        }
        Ok(map)
    }

    /// Resolve the rowid holding a unique key, inserting first if absent.
    /// The insert uses OR IGNORE so a row created between cache bootstrap and
    /// now degrades to a lookup instead of a constraint failure.
    fn rowid_for_key(conn: &Connection, table: &str, key_column: &str, key: &str) -> Result<i64> {
        conn.query_row(
            &format!("SELECT rowid FROM {} WHERE {} = ?1", table, key_column),
            params![key],
            |r| r.get(0),
        )
        .with_context(|| format!("Row in {} with {} = '{}' not found", table, key_column, key))
    }
}

impl LibraryStore for SqliteLibraryStore {
    fn track_index(&self) -> Result<Vec<TrackIndexEntry>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt =
            conn.prepare("SELECT rowid, uri, album_rowid, album_uri, duration_ms FROM tracks")?;
        let rows = stmt
            .query_map([], |r| {
                Ok(TrackIndexEntry {
                    rowid: r.get(0)?,
                    uri: r.get(1)?,
                    album_rowid: r.get(2)?,
                    album_uri: r.get(3)?,
                    duration_ms: r.get(4)?,
                })
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    fn album_index(&self) -> Result<Vec<(String, i64)>> {
        self.keyed_index("SELECT uri, rowid FROM albums")
    }

    fn artist_index(&self) -> Result<Vec<(String, i64)>> {
        self.keyed_index("SELECT uri, rowid FROM artists")
    }

    fn genre_index(&self) -> Result<Vec<(String, i64)>> {
        self.keyed_index("SELECT name, rowid FROM genres")
    }

    fn label_index(&self) -> Result<Vec<(String, i64)>> {
        self.keyed_index("SELECT name, rowid FROM labels")
    }

    fn alias_index(&self) -> Result<Vec<(String, i64)>> {
        self.keyed_index("SELECT uri, track_rowid FROM track_uris")
    }

    fn begin_batch(&self) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute("BEGIN IMMEDIATE", [])?;
        Ok(())
    }

    fn commit_batch(&self) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute("COMMIT", [])?;
        Ok(())
    }

    fn rollback_batch(&self) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute("ROLLBACK", [])?;
        Ok(())
    }

    fn upsert_track(&self, track: &NewTrack) -> Result<i64> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT OR IGNORE INTO tracks
                 (uri, name, album_rowid, album_uri, disc_number, duration_ms, explicit,
                  popularity, preview_url, track_number)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
            params![
                &track.uri,
                &track.name,
                track.album_rowid,
                &track.album_uri,
                track.disc_number,
                track.duration_ms,
                track.explicit as i64,
                track.popularity,
                &track.preview_url,
                track.track_number,
            ],
        )?;
        Self::rowid_for_key(&conn, "tracks", "uri", &track.uri)
    }

    fn upsert_album(&self, album: &NewAlbum) -> Result<i64> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT OR IGNORE INTO albums
                 (uri, name, album_type, total_tracks, release_date, popularity, image_url)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                &album.uri,
                &album.name,
                &album.album_type,
                album.total_tracks,
                &album.release_date,
                album.popularity,
                &album.image_url,
            ],
        )?;
        Self::rowid_for_key(&conn, "albums", "uri", &album.uri)
    }

    fn upsert_artist(&self, artist: &NewArtist) -> Result<i64> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT OR IGNORE INTO artists (uri, name, followers, popularity, image_url)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                &artist.uri,
                &artist.name,
                artist.followers,
                artist.popularity,
                &artist.image_url,
            ],
        )?;
        Self::rowid_for_key(&conn, "artists", "uri", &artist.uri)
    }

    fn upsert_genre(&self, name: &str) -> Result<i64> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT OR IGNORE INTO genres (name) VALUES (?1)",
            params![name],
        )?;
        Self::rowid_for_key(&conn, "genres", "name", name)
    }

    fn upsert_label(&self, name: &str) -> Result<i64> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT OR IGNORE INTO labels (name) VALUES (?1)",
            params![name],
        )?;
        Self::rowid_for_key(&conn, "labels", "name", name)
    }

    fn insert_alias(&self, observed_uri: &str, track_rowid: i64) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT OR IGNORE INTO track_uris (uri, track_rowid) VALUES (?1, ?2)",
            params![observed_uri, track_rowid],
        )?;
        Ok(())
    }

    fn set_track_album(&self, track_rowid: i64, album_rowid: i64) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "UPDATE tracks SET album_rowid = ?2 WHERE rowid = ?1",
            params![track_rowid, album_rowid],
        )?;
        Ok(())
    }

    fn set_album_label(&self, album_rowid: i64, label_rowid: i64) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "UPDATE albums SET label_rowid = ?2 WHERE rowid = ?1",
            params![album_rowid, label_rowid],
        )?;
        Ok(())
    }

    fn attach_track_artist(&self, track_rowid: i64, artist_rowid: i64) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT OR IGNORE INTO track_artists (track_rowid, artist_rowid) VALUES (?1, ?2)",
            params![track_rowid, artist_rowid],
        )?;
        Ok(())
    }

    fn attach_album_artist(&self, album_rowid: i64, artist_rowid: i64) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT OR IGNORE INTO album_artists (album_rowid, artist_rowid) VALUES (?1, ?2)",
            params![album_rowid, artist_rowid],
        )?;
        Ok(())
    }

    fn attach_artist_genre(&self, artist_rowid: i64, genre_rowid: i64) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT OR IGNORE INTO artist_genres (artist_rowid, genre_rowid) VALUES (?1, ?2)",
            params![artist_rowid, genre_rowid],
        )?;
        Ok(())
    }

    fn insert_plays(&self, plays: &[NewPlay]) -> Result<Vec<InsertedPlay>> {
        let conn = self.conn.lock().unwrap();
        conn.execute("BEGIN IMMEDIATE", [])?;

        let result = (|| -> Result<Vec<InsertedPlay>> {
            let mut inserted = Vec::with_capacity(plays.len());
            let mut insert_stmt = conn.prepare_cached(
                "INSERT OR IGNORE INTO plays
                     (track_rowid, album_rowid, played_at, ms_played, ratio_played,
                      reason_start, reason_end, shuffle)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            )?;
            let mut lookup_stmt = conn.prepare_cached(
                "SELECT rowid FROM plays WHERE track_rowid = ?1 AND played_at = ?2",
            )?;

            for play in plays {
                let changed = insert_stmt.execute(params![
                    play.track_rowid,
                    play.album_rowid,
                    play.played_at,
                    play.ms_played,
                    play.ratio_played,
                    &play.reason_start,
                    &play.reason_end,
                    play.shuffle as i64,
                ])?;
                let rowid: i64 = lookup_stmt
                    .query_row(params![play.track_rowid, play.played_at], |r| r.get(0))?;
                inserted.push(InsertedPlay {
                    rowid,
                    created: changed > 0,
                });
            }
            Ok(inserted)
        })();

        match result {
            Ok(inserted) => {
                conn.execute("COMMIT", [])?;
                Ok(inserted)
            }
            Err(e) => {
                let _ = conn.execute("ROLLBACK", []);
                Err(e)
            }
        }
    }

    fn attach_play_artists(&self, play_rowid: i64, artist_rowids: &[i64]) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare_cached(
            "INSERT OR IGNORE INTO play_artists (play_rowid, artist_rowid) VALUES (?1, ?2)",
        )?;
        for artist_rowid in artist_rowids {
            stmt.execute(params![play_rowid, artist_rowid])?;
        }
        Ok(())
    }

    fn track_artists_map(&self) -> Result<HashMap<i64, Vec<i64>>> {
        self.junction_map("SELECT track_rowid, artist_rowid FROM track_artists ORDER BY rowid")
    }

    fn album_artists_map(&self) -> Result<HashMap<i64, Vec<i64>>> {
        self.junction_map("SELECT album_rowid, artist_rowid FROM album_artists ORDER BY rowid")
    }

    fn get_track(&self, uri: &str) -> Result<Option<Track>> {
        let conn = self.conn.lock().unwrap();
        let track = conn
            .query_row(
                "SELECT rowid, uri, name, album_rowid, album_uri, disc_number, duration_ms,
                        explicit, popularity, preview_url, track_number,
                        acousticness, danceability, energy, instrumentalness, liveness,
                        loudness, speechiness, tempo, valence, key, mode, time_signature
                 FROM tracks WHERE uri = ?1",
                params![uri],
                |r| {
                    Ok(Track {
                        rowid: r.get(0)?,
                        uri: r.get(1)?,
                        name: r.get(2)?,
                        album_rowid: r.get(3)?,
                        album_uri: r.get(4)?,
                        disc_number: r.get(5)?,
                        duration_ms: r.get(6)?,
                        explicit: r.get::<_, i64>(7)? != 0,
                        popularity: r.get(8)?,
                        preview_url: r.get(9)?,
                        track_number: r.get(10)?,
                        features: AudioFeatures {
                            acousticness: r.get(11)?,
                            danceability: r.get(12)?,
                            energy: r.get(13)?,
                            instrumentalness: r.get(14)?,
                            liveness: r.get(15)?,
                            loudness: r.get(16)?,
                            speechiness: r.get(17)?,
                            tempo: r.get(18)?,
                            valence: r.get(19)?,
                            key: r.get(20)?,
                            mode: r.get(21)?,
                            time_signature: r.get(22)?,
                        },
                    })
                },
            )
            .optional()?;
        Ok(track)
    }

    fn get_album(&self, uri: &str) -> Result<Option<Album>> {
        let conn = self.conn.lock().unwrap();
        let album = conn
            .query_row(
                "SELECT rowid, uri, name, album_type, total_tracks, release_date,
                        label_rowid, popularity, image_url
                 FROM albums WHERE uri = ?1",
                params![uri],
                |r| {
                    Ok(Album {
                        rowid: r.get(0)?,
                        uri: r.get(1)?,
                        name: r.get(2)?,
                        album_type: r.get(3)?,
                        total_tracks: r.get(4)?,
                        release_date: r.get(5)?,
                        label_rowid: r.get(6)?,
                        popularity: r.get(7)?,
                        image_url: r.get(8)?,
                    })
                },
            )
            .optional()?;
        Ok(album)
    }

    fn get_artist(&self, uri: &str) -> Result<Option<Artist>> {
        let conn = self.conn.lock().unwrap();
        let base = conn
            .query_row(
                "SELECT rowid, uri, name, followers, popularity, image_url
                 FROM artists WHERE uri = ?1",
                params![uri],
                |r| {
                    Ok((
                        r.get::<_, i64>(0)?,
                        r.get::<_, String>(1)?,
                        r.get::<_, String>(2)?,
                        r.get::<_, i64>(3)?,
                        r.get::<_, i64>(4)?,
                        r.get::<_, Option<String>>(5)?,
                    ))
                },
            )
            .optional()?;

        let Some((rowid, uri, name, followers, popularity, image_url)) = base else {
            return Ok(None);
        };

        let mut stmt = conn.prepare_cached(
            "SELECT g.name FROM genres g
             JOIN artist_genres ag ON ag.genre_rowid = g.rowid
             WHERE ag.artist_rowid = ?1
             ORDER BY g.name",
        )?;
        let genres = stmt
            .query_map(params![rowid], |r| r.get(0))?
            .collect::<std::result::Result<Vec<String>, _>>()?;

        Ok(Some(Artist {
            rowid,
            uri,
            name,
            followers,
            popularity,
            image_url,
            genres,
        }))
    }

    fn counts(&self) -> Result<LibraryCounts> {
        let conn = self.conn.lock().unwrap();
        let count = |table: &str| -> Result<i64> {
            Ok(conn.query_row(&format!("SELECT COUNT(*) FROM {}", table), [], |r| r.get(0))?)
        };
        Ok(LibraryCounts {
            tracks: count("tracks")?,
            albums: count("albums")?,
            artists: count("artists")?,
            labels: count("labels")?,
            genres: count("genres")?,
            aliases: count("track_uris")?,
            plays: count("plays")?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_store() -> (tempfile::TempDir, SqliteLibraryStore) {
        let dir = tempfile::TempDir::new().unwrap();
        let store = SqliteLibraryStore::new(dir.path().join("library.db")).unwrap();
        (dir, store)
    }

    fn sample_track(uri: &str) -> NewTrack {
        NewTrack {
            uri: uri.to_string(),
            name: "Sample".to_string(),
            album_rowid: None,
            album_uri: Some("spotify:album:bbb".to_string()),
            disc_number: 1,
            duration_ms: 215_000,
            explicit: false,
            popularity: 41,
            preview_url: None,
            track_number: 3,
        }
    }

    #[test]
    fn test_upsert_track_is_idempotent() {
        let (_dir, store) = temp_store();

        let first = store.upsert_track(&sample_track("spotify:track:aaa")).unwrap();
        let second = store.upsert_track(&sample_track("spotify:track:aaa")).unwrap();
        assert_eq!(first, second);
        assert_eq!(store.counts().unwrap().tracks, 1);
    }

    #[test]
    fn test_track_index_reflects_album_assignment() {
        let (_dir, store) = temp_store();

        let track_rowid = store.upsert_track(&sample_track("spotify:track:aaa")).unwrap();
        let album_rowid = store
            .upsert_album(&NewAlbum {
                uri: "spotify:album:bbb".to_string(),
                name: "Sample Album".to_string(),
                album_type: "album".to_string(),
                total_tracks: 10,
                release_date: "2020-05-14".to_string(),
                popularity: 60,
                image_url: None,
            })
            .unwrap();
        store.set_track_album(track_rowid, album_rowid).unwrap();

        let index = store.track_index().unwrap();
        assert_eq!(index.len(), 1);
        assert_eq!(index[0].album_rowid, Some(album_rowid));
        assert_eq!(index[0].duration_ms, 215_000);
    }

    #[test]
    fn test_alias_lookup_roundtrip() {
        let (_dir, store) = temp_store();

        let track_rowid = store.upsert_track(&sample_track("spotify:track:new")).unwrap();
        store.insert_alias("spotify:track:old", track_rowid).unwrap();
        store.insert_alias("spotify:track:old", track_rowid).unwrap();

        let aliases = store.alias_index().unwrap();
        assert_eq!(aliases, vec![("spotify:track:old".to_string(), track_rowid)]);
    }

    #[test]
    fn test_insert_plays_skips_existing_rows() {
        let (_dir, store) = temp_store();

        let track_rowid = store.upsert_track(&sample_track("spotify:track:aaa")).unwrap();
        let play = NewPlay {
            track_rowid,
            album_rowid: None,
            played_at: 1_600_000_000,
            ms_played: 100_000,
            ratio_played: 0.47,
            reason_start: "trackdone".to_string(),
            reason_end: "trackdone".to_string(),
            shuffle: false,
        };

        let first = store.insert_plays(&[play.clone()]).unwrap();
        assert!(first[0].created);

        let second = store.insert_plays(&[play]).unwrap();
        assert!(!second[0].created);
        assert_eq!(first[0].rowid, second[0].rowid);
        assert_eq!(store.counts().unwrap().plays, 1);
    }

    #[test]
    fn test_junction_attach_is_idempotent() {
        let (_dir, store) = temp_store();

        let track_rowid = store.upsert_track(&sample_track("spotify:track:aaa")).unwrap();
        let artist_rowid = store
            .upsert_artist(&NewArtist {
                uri: "spotify:artist:ccc".to_string(),
                name: "Somebody".to_string(),
                followers: 123,
                popularity: 55,
                image_url: None,
            })
            .unwrap();

        store.attach_track_artist(track_rowid, artist_rowid).unwrap();
        store.attach_track_artist(track_rowid, artist_rowid).unwrap();

        let map = store.track_artists_map().unwrap();
        assert_eq!(map[&track_rowid], vec![artist_rowid]);
    }

    #[test]
    fn test_get_artist_includes_genres() {
        let (_dir, store) = temp_store();

        let artist_rowid = store
            .upsert_artist(&NewArtist {
                uri: "spotify:artist:ccc".to_string(),
                name: "Somebody".to_string(),
                followers: 123,
                popularity: 55,
                image_url: Some("https://img.example/x.jpg".to_string()),
            })
            .unwrap();
        let genre_rowid = store.upsert_genre("shoegaze").unwrap();
        store.attach_artist_genre(artist_rowid, genre_rowid).unwrap();

        let artist = store.get_artist("spotify:artist:ccc").unwrap().unwrap();
        assert_eq!(artist.name, "Somebody");
        assert_eq!(artist.genres, vec!["shoegaze"]);
    }

    #[test]
    fn test_batch_rollback_discards_writes() {
        let (_dir, store) = temp_store();

        store.begin_batch().unwrap();
        store.upsert_track(&sample_track("spotify:track:aaa")).unwrap();
        store.rollback_batch().unwrap();

        assert_eq!(store.counts().unwrap().tracks, 0);
    }

    #[test]
    fn test_reopen_validates_schema() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("library.db");
        {
            let store = SqliteLibraryStore::new(&path).unwrap();
            store.upsert_genre("ambient").unwrap();
        }
        let store = SqliteLibraryStore::new(&path).unwrap();
        assert_eq!(store.counts().unwrap().genres, 1);
    }
}
