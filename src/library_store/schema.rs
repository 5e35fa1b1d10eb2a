//! SQLite schema for the streaming-history library.
//!
//! Integer rowids are the internal keys; every entity also carries its unique
//! external key (Spotify uri, or bare name for labels/genres). Junction
//! tables hold UNIQUE pairs so association writes can be retried freely.

use crate::sqlite_column;
use crate::sqlite_persistence::{
    Column, ForeignKey, SqlType, Table, VersionedSchema, DEFAULT_TIMESTAMP,
};

const TRACKS_FK: ForeignKey = ForeignKey {
    foreign_table: "tracks",
    foreign_column: "rowid",
};
const ALBUMS_FK: ForeignKey = ForeignKey {
    foreign_table: "albums",
    foreign_column: "rowid",
};
const ARTISTS_FK: ForeignKey = ForeignKey {
    foreign_table: "artists",
    foreign_column: "rowid",
};
const LABELS_FK: ForeignKey = ForeignKey {
    foreign_table: "labels",
    foreign_column: "rowid",
};
const GENRES_FK: ForeignKey = ForeignKey {
    foreign_table: "genres",
    foreign_column: "rowid",
};
const PLAYS_FK: ForeignKey = ForeignKey {
    foreign_table: "plays",
    foreign_column: "rowid",
};

/// Record labels, dedupe-or-create by name.
const LABELS_TABLE: Table = Table {
    name: "labels",
    columns: &[
        sqlite_column!("rowid", &SqlType::Integer, is_primary_key = true),
        sqlite_column!("name", &SqlType::Text, non_null = true),
        sqlite_column!(
            "created_at",
            &SqlType::Integer,
            non_null = true,
            default_value = Some(DEFAULT_TIMESTAMP)
        ),
    ],
    indices: &[("idx_labels_name", "name")],
    unique_constraints: &[&["name"]],
};

/// Genres, dedupe-or-create by name.
const GENRES_TABLE: Table = Table {
    name: "genres",
    columns: &[
        sqlite_column!("rowid", &SqlType::Integer, is_primary_key = true),
        sqlite_column!("name", &SqlType::Text, non_null = true),
        sqlite_column!(
            "created_at",
            &SqlType::Integer,
            non_null = true,
            default_value = Some(DEFAULT_TIMESTAMP)
        ),
    ],
    indices: &[("idx_genres_name", "name")],
    unique_constraints: &[&["name"]],
};

const ARTISTS_TABLE: Table = Table {
    name: "artists",
    columns: &[
        sqlite_column!("rowid", &SqlType::Integer, is_primary_key = true),
        sqlite_column!("uri", &SqlType::Text, non_null = true), // spotify:artist:<base62>
        sqlite_column!("name", &SqlType::Text, non_null = true),
        sqlite_column!("followers", &SqlType::Integer, non_null = true),
        sqlite_column!("popularity", &SqlType::Integer, non_null = true),
        sqlite_column!("image_url", &SqlType::Text),
        sqlite_column!(
            "created_at",
            &SqlType::Integer,
            non_null = true,
            default_value = Some(DEFAULT_TIMESTAMP)
        ),
    ],
    indices: &[("idx_artists_uri", "uri")],
    unique_constraints: &[&["uri"]],
};

const ALBUMS_TABLE: Table = Table {
    name: "albums",
    columns: &[
        sqlite_column!("rowid", &SqlType::Integer, is_primary_key = true),
        sqlite_column!("uri", &SqlType::Text, non_null = true), // spotify:album:<base62>
        sqlite_column!("name", &SqlType::Text, non_null = true),
        sqlite_column!("album_type", &SqlType::Text, non_null = true), // 'album', 'single', 'compilation'
        sqlite_column!("total_tracks", &SqlType::Integer, non_null = true),
        sqlite_column!("release_date", &SqlType::Text, non_null = true), // derived 'YYYY-MM-DD'
        sqlite_column!(
            "label_rowid",
            &SqlType::Integer,
            foreign_key = Some(&LABELS_FK)
        ),
        sqlite_column!("popularity", &SqlType::Integer, non_null = true),
        sqlite_column!("image_url", &SqlType::Text),
        sqlite_column!(
            "created_at",
            &SqlType::Integer,
            non_null = true,
            default_value = Some(DEFAULT_TIMESTAMP)
        ),
    ],
    indices: &[("idx_albums_uri", "uri")],
    unique_constraints: &[&["uri"]],
};

const TRACKS_TABLE: Table = Table {
    name: "tracks",
    columns: &[
        sqlite_column!("rowid", &SqlType::Integer, is_primary_key = true),
        sqlite_column!("uri", &SqlType::Text, non_null = true), // spotify:track:<base62>
        sqlite_column!("name", &SqlType::Text, non_null = true),
        // Nullable until the album resolves; re-queued on later runs while NULL.
        sqlite_column!(
            "album_rowid",
            &SqlType::Integer,
            foreign_key = Some(&ALBUMS_FK)
        ),
        // Album uri travels with the track so an album that failed to
        // resolve can be re-queued on a later run.
        sqlite_column!("album_uri", &SqlType::Text),
        sqlite_column!("disc_number", &SqlType::Integer, non_null = true),
        sqlite_column!("duration_ms", &SqlType::Integer, non_null = true),
        sqlite_column!("explicit", &SqlType::Integer, non_null = true),
        sqlite_column!("popularity", &SqlType::Integer, non_null = true),
        sqlite_column!("preview_url", &SqlType::Text),
        sqlite_column!("track_number", &SqlType::Integer, non_null = true),
        // Audio analysis scalars, filled by a separate enrichment pass.
        sqlite_column!("acousticness", &SqlType::Real),
        sqlite_column!("danceability", &SqlType::Real),
        sqlite_column!("energy", &SqlType::Real),
        sqlite_column!("instrumentalness", &SqlType::Real),
        sqlite_column!("liveness", &SqlType::Real),
        sqlite_column!("loudness", &SqlType::Real),
        sqlite_column!("speechiness", &SqlType::Real),
        sqlite_column!("tempo", &SqlType::Real),
        sqlite_column!("valence", &SqlType::Real),
        sqlite_column!("key", &SqlType::Integer),
        sqlite_column!("mode", &SqlType::Integer),
        sqlite_column!("time_signature", &SqlType::Integer),
        sqlite_column!(
            "created_at",
            &SqlType::Integer,
            non_null = true,
            default_value = Some(DEFAULT_TIMESTAMP)
        ),
    ],
    indices: &[
        ("idx_tracks_uri", "uri"),
        ("idx_tracks_album", "album_rowid"),
    ],
    unique_constraints: &[&["uri"]],
};

/// Superseded track identifiers. An observed uri appears at most once;
/// several observed uris may point at the same canonical track.
const TRACK_URIS_TABLE: Table = Table {
    name: "track_uris",
    columns: &[
        sqlite_column!("rowid", &SqlType::Integer, is_primary_key = true),
        sqlite_column!("uri", &SqlType::Text, non_null = true),
        sqlite_column!(
            "track_rowid",
            &SqlType::Integer,
            non_null = true,
            foreign_key = Some(&TRACKS_FK)
        ),
        sqlite_column!(
            "created_at",
            &SqlType::Integer,
            non_null = true,
            default_value = Some(DEFAULT_TIMESTAMP)
        ),
    ],
    indices: &[("idx_track_uris_uri", "uri")],
    unique_constraints: &[&["uri"]],
};

const TRACK_ARTISTS_TABLE: Table = Table {
    name: "track_artists",
    columns: &[
        sqlite_column!(
            "track_rowid",
            &SqlType::Integer,
            non_null = true,
            foreign_key = Some(&TRACKS_FK)
        ),
        sqlite_column!(
            "artist_rowid",
            &SqlType::Integer,
            non_null = true,
            foreign_key = Some(&ARTISTS_FK)
        ),
    ],
    indices: &[
        ("idx_track_artists_track", "track_rowid"),
        ("idx_track_artists_artist", "artist_rowid"),
    ],
    unique_constraints: &[&["track_rowid", "artist_rowid"]],
};

const ALBUM_ARTISTS_TABLE: Table = Table {
    name: "album_artists",
    columns: &[
        sqlite_column!(
            "album_rowid",
            &SqlType::Integer,
            non_null = true,
            foreign_key = Some(&ALBUMS_FK)
        ),
        sqlite_column!(
            "artist_rowid",
            &SqlType::Integer,
            non_null = true,
            foreign_key = Some(&ARTISTS_FK)
        ),
    ],
    indices: &[
        ("idx_album_artists_album", "album_rowid"),
        ("idx_album_artists_artist", "artist_rowid"),
    ],
    unique_constraints: &[&["album_rowid", "artist_rowid"]],
};

const ARTIST_GENRES_TABLE: Table = Table {
    name: "artist_genres",
    columns: &[
        sqlite_column!(
            "artist_rowid",
            &SqlType::Integer,
            non_null = true,
            foreign_key = Some(&ARTISTS_FK)
        ),
        sqlite_column!(
            "genre_rowid",
            &SqlType::Integer,
            non_null = true,
            foreign_key = Some(&GENRES_FK)
        ),
    ],
    indices: &[("idx_artist_genres_artist", "artist_rowid")],
    unique_constraints: &[&["artist_rowid", "genre_rowid"]],
};

/// Materialized play events. `(track_rowid, played_at)` is the natural key;
/// re-ingesting an overlapping export leaves existing rows untouched.
const PLAYS_TABLE: Table = Table {
    name: "plays",
    columns: &[
        sqlite_column!("rowid", &SqlType::Integer, is_primary_key = true),
        sqlite_column!(
            "track_rowid",
            &SqlType::Integer,
            non_null = true,
            foreign_key = Some(&TRACKS_FK)
        ),
        sqlite_column!(
            "album_rowid",
            &SqlType::Integer,
            foreign_key = Some(&ALBUMS_FK)
        ),
        sqlite_column!("played_at", &SqlType::Integer, non_null = true), // unix seconds
        sqlite_column!("ms_played", &SqlType::Integer, non_null = true),
        sqlite_column!("ratio_played", &SqlType::Real, non_null = true),
        sqlite_column!("reason_start", &SqlType::Text, non_null = true),
        sqlite_column!("reason_end", &SqlType::Text, non_null = true),
        sqlite_column!("shuffle", &SqlType::Integer, non_null = true),
        sqlite_column!(
            "created_at",
            &SqlType::Integer,
            non_null = true,
            default_value = Some(DEFAULT_TIMESTAMP)
        ),
    ],
    indices: &[
        ("idx_plays_track", "track_rowid"),
        ("idx_plays_played_at", "played_at"),
    ],
    unique_constraints: &[&["track_rowid", "played_at"]],
};

const PLAY_ARTISTS_TABLE: Table = Table {
    name: "play_artists",
    columns: &[
        sqlite_column!(
            "play_rowid",
            &SqlType::Integer,
            non_null = true,
            foreign_key = Some(&PLAYS_FK)
        ),
        sqlite_column!(
            "artist_rowid",
            &SqlType::Integer,
            non_null = true,
            foreign_key = Some(&ARTISTS_FK)
        ),
    ],
    indices: &[("idx_play_artists_play", "play_rowid")],
    unique_constraints: &[&["play_rowid", "artist_rowid"]],
};

pub const LIBRARY_VERSIONED_SCHEMAS: &[VersionedSchema] = &[VersionedSchema {
    version: 0,
    tables: &[
        LABELS_TABLE,
        GENRES_TABLE,
        ARTISTS_TABLE,
        ALBUMS_TABLE,
        TRACKS_TABLE,
        TRACK_URIS_TABLE,
        TRACK_ARTISTS_TABLE,
        ALBUM_ARTISTS_TABLE,
        ARTIST_GENRES_TABLE,
        PLAYS_TABLE,
        PLAY_ARTISTS_TABLE,
    ],
    migration: None,
}];
