//! Payload models for Web API responses.
//!
//! Only the fields the populate run consumes are deserialized; everything
//! else in the response body is ignored.

use serde::Deserialize;

/// Reference to an album from within a track payload.
#[derive(Clone, Debug, Deserialize)]
pub struct AlbumRef {
    pub uri: String,
}

/// Reference to an artist from within a track or album payload.
#[derive(Clone, Debug, Deserialize)]
pub struct ArtistRef {
    pub uri: String,
}

#[derive(Clone, Debug, Deserialize)]
pub struct ImageRef {
    pub url: String,
}

#[derive(Clone, Debug, Default, Deserialize)]
pub struct FollowerCount {
    #[serde(default)]
    pub total: i64,
}

/// A track as returned by `GET /tracks`.
///
/// `uri` is the canonical identifier, which may differ from the identifier
/// that was queried when the content has been re-linked.
#[derive(Clone, Debug, Deserialize)]
pub struct TrackPayload {
    pub uri: String,
    pub name: String,
    pub disc_number: i64,
    pub duration_ms: i64,
    pub explicit: bool,
    #[serde(default)]
    pub popularity: i64,
    #[serde(default)]
    pub preview_url: Option<String>,
    pub track_number: i64,
    pub album: AlbumRef,
    #[serde(default)]
    pub artists: Vec<ArtistRef>,
}

/// An album as returned by `GET /albums`.
///
/// `release_date` comes with reduced precision for some releases; the
/// resolver derives a full date from the `(release_date, precision)` pair.
#[derive(Clone, Debug, Deserialize)]
pub struct AlbumPayload {
    pub uri: String,
    pub name: String,
    pub album_type: String,
    #[serde(default)]
    pub total_tracks: i64,
    pub release_date: String,
    pub release_date_precision: String,
    #[serde(default)]
    pub label: Option<String>,
    #[serde(default)]
    pub popularity: i64,
    #[serde(default)]
    pub images: Vec<ImageRef>,
    #[serde(default)]
    pub artists: Vec<ArtistRef>,
}

/// An artist as returned by `GET /artists`.
#[derive(Clone, Debug, Deserialize)]
pub struct ArtistPayload {
    pub uri: String,
    pub name: String,
    #[serde(default)]
    pub genres: Vec<String>,
    #[serde(default)]
    pub followers: FollowerCount,
    #[serde(default)]
    pub popularity: i64,
    #[serde(default)]
    pub images: Vec<ImageRef>,
}

impl AlbumPayload {
    /// Largest cover image url, if any (the API orders images largest first).
    pub fn primary_image_url(&self) -> Option<String> {
        self.images.first().map(|image| image.url.clone())
    }
}

impl ArtistPayload {
    pub fn primary_image_url(&self) -> Option<String> {
        self.images.first().map(|image| image.url.clone())
    }
}
