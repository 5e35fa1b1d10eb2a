//! Web API client with client-credentials auth and batched lookups.
//!
//! Requests are paced to stay clear of burst limits; a whole-call failure is
//! reported as a `CatalogError` and the caller decides whether the run can
//! continue.

use super::models::{AlbumPayload, ArtistPayload, TrackPayload};
use super::{
    CatalogClient, CatalogError, ALBUMS_BATCH_LIMIT, ARTISTS_BATCH_LIMIT, TRACKS_BATCH_LIMIT,
};
use anyhow::{bail, Result};
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use reqwest::blocking::Client;
use serde::Deserialize;
use std::sync::Mutex;
use std::time::{Duration, Instant};

const API_BASE_URL: &str = "https://api.spotify.com/v1";
const TOKEN_URL: &str = "https://accounts.spotify.com/api/token";
const REQUEST_INTERVAL: Duration = Duration::from_millis(100);
// Refresh slightly before the advertised expiry to avoid a 401 on the wire.
const TOKEN_EXPIRY_MARGIN: Duration = Duration::from_secs(60);

pub struct SpotifyCatalogClient {
    client: Client,
    api_base_url: String,
    token_url: String,
    client_id: String,
    client_secret: String,
    market: Option<String>,
    token: Mutex<Option<CachedToken>>,
    last_request: Mutex<Instant>,
}

struct CachedToken {
    value: String,
    expires_at: Instant,
}

#[derive(Deserialize)]
struct TokenResponse {
    access_token: String,
    expires_in: u64,
}

#[derive(Deserialize)]
struct TracksEnvelope {
    tracks: Vec<Option<TrackPayload>>,
}

#[derive(Deserialize)]
struct AlbumsEnvelope {
    albums: Vec<Option<AlbumPayload>>,
}

#[derive(Deserialize)]
struct ArtistsEnvelope {
    artists: Vec<Option<ArtistPayload>>,
}

/// The batch endpoints take bare base62 ids, not full uris.
fn uri_to_id(uri: &str) -> &str {
    uri.rsplit(':').next().unwrap_or(uri)
}

impl SpotifyCatalogClient {
    pub fn new(client_id: &str, client_secret: &str, market: Option<String>) -> Result<Self> {
        let client = Client::builder()
            .user_agent(concat!("streamlog-server/", env!("CARGO_PKG_VERSION")))
            .timeout(Duration::from_secs(30))
            .build()?;

        Ok(Self {
            client,
            api_base_url: API_BASE_URL.to_string(),
            token_url: TOKEN_URL.to_string(),
            client_id: client_id.to_string(),
            client_secret: client_secret.to_string(),
            market,
            token: Mutex::new(None),
            last_request: Mutex::new(Instant::now() - REQUEST_INTERVAL),
        })
    }

    fn rate_limit(&self) {
        let mut last = self.last_request.lock().unwrap();
        let elapsed = last.elapsed();
        if elapsed < REQUEST_INTERVAL {
            std::thread::sleep(REQUEST_INTERVAL - elapsed);
        }
        *last = Instant::now();
    }

    /// Return a valid bearer token, exchanging client credentials when the
    /// cached one is missing or about to expire.
    fn access_token(&self) -> Result<String, CatalogError> {
        {
            let token = self.token.lock().unwrap();
            if let Some(cached) = token.as_ref() {
                if cached.expires_at > Instant::now() {
                    return Ok(cached.value.clone());
                }
            }
        }

        self.rate_limit();
        let basic = BASE64.encode(format!("{}:{}", self.client_id, self.client_secret));
        let response = self
            .client
            .post(&self.token_url)
            .header("Authorization", format!("Basic {}", basic))
            .form(&[("grant_type", "client_credentials")])
            .send()?;

        let status = response.status();
        if !status.is_success() {
            let message = response.text().unwrap_or_default();
            return Err(CatalogError::Unauthorized(format!(
                "token exchange failed with status {}: {}",
                status, message
            )));
        }

        let body: TokenResponse = response.json()?;
        let expires_at = Instant::now()
            + Duration::from_secs(body.expires_in).saturating_sub(TOKEN_EXPIRY_MARGIN);
        let value = body.access_token.clone();
        *self.token.lock().unwrap() = Some(CachedToken {
            value: body.access_token,
            expires_at,
        });
        Ok(value)
    }

    fn get_json<T: serde::de::DeserializeOwned>(&self, url: &str) -> Result<T, CatalogError> {
        let mut token = self.access_token()?;

        for attempt in 0..2 {
            self.rate_limit();
            let response = self
                .client
                .get(url)
                .header("Authorization", format!("Bearer {}", token))
                .send()?;

            let status = response.status();
            if status.as_u16() == 401 && attempt == 0 {
                // Token revoked before its advertised expiry; refresh once.
                *self.token.lock().unwrap() = None;
                token = self.access_token()?;
                continue;
            }
            if status.as_u16() == 429 {
                let retry_after_secs = response
                    .headers()
                    .get("Retry-After")
                    .and_then(|v| v.to_str().ok())
                    .and_then(|v| v.parse().ok())
                    .unwrap_or(1);
                return Err(CatalogError::RateLimited { retry_after_secs });
            }
            if !status.is_success() {
                return Err(CatalogError::Api {
                    status: status.as_u16(),
                    message: response.text().unwrap_or_default(),
                });
            }
            return Ok(response.json()?);
        }

        Err(CatalogError::Unauthorized(
            "authorization still rejected after token refresh".to_string(),
        ))
    }

    fn batch_url(&self, endpoint: &str, uris: &[String]) -> String {
        let ids = uris.iter().map(|uri| uri_to_id(uri)).collect::<Vec<_>>().join(",");
        let mut url = format!(
            "{}/{}?ids={}",
            self.api_base_url,
            endpoint,
            urlencoding::encode(&ids)
        );
        if let Some(market) = &self.market {
            url.push_str(&format!("&market={}", urlencoding::encode(market)));
        }
        url
    }
}

impl CatalogClient for SpotifyCatalogClient {
    fn fetch_tracks(&self, uris: &[String]) -> Result<Vec<Option<TrackPayload>>> {
        if uris.len() > TRACKS_BATCH_LIMIT {
            bail!(
                "tracks batch of {} exceeds the {}-id limit",
                uris.len(),
                TRACKS_BATCH_LIMIT
            );
        }
        let envelope: TracksEnvelope = self.get_json(&self.batch_url("tracks", uris))?;
        if envelope.tracks.len() != uris.len() {
            bail!(
                "catalog returned {} track slots for {} queried ids",
                envelope.tracks.len(),
                uris.len()
            );
        }
        Ok(envelope.tracks)
    }

    fn fetch_albums(&self, uris: &[String]) -> Result<Vec<Option<AlbumPayload>>> {
        if uris.len() > ALBUMS_BATCH_LIMIT {
            bail!(
                "albums batch of {} exceeds the {}-id limit",
                uris.len(),
                ALBUMS_BATCH_LIMIT
            );
        }
        let envelope: AlbumsEnvelope = self.get_json(&self.batch_url("albums", uris))?;
        if envelope.albums.len() != uris.len() {
            bail!(
                "catalog returned {} album slots for {} queried ids",
                envelope.albums.len(),
                uris.len()
            );
        }
        Ok(envelope.albums)
    }

    fn fetch_artists(&self, uris: &[String]) -> Result<Vec<Option<ArtistPayload>>> {
        if uris.len() > ARTISTS_BATCH_LIMIT {
            bail!(
                "artists batch of {} exceeds the {}-id limit",
                uris.len(),
                ARTISTS_BATCH_LIMIT
            );
        }
        let envelope: ArtistsEnvelope = self.get_json(&self.batch_url("artists", uris))?;
        if envelope.artists.len() != uris.len() {
            bail!(
                "catalog returned {} artist slots for {} queried ids",
                envelope.artists.len(),
                uris.len()
            );
        }
        Ok(envelope.artists)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_uri_to_id() {
        assert_eq!(uri_to_id("spotify:track:4uLU6hMCjMI75M1A2tKUQC"), "4uLU6hMCjMI75M1A2tKUQC");
        assert_eq!(uri_to_id("4uLU6hMCjMI75M1A2tKUQC"), "4uLU6hMCjMI75M1A2tKUQC");
    }

    #[test]
    fn test_oversized_batches_are_rejected_before_any_request() {
        let client = SpotifyCatalogClient::new("id", "secret", None).unwrap();

        let tracks: Vec<String> = (0..51).map(|i| format!("spotify:track:{}", i)).collect();
        assert!(client.fetch_tracks(&tracks).is_err());

        let albums: Vec<String> = (0..21).map(|i| format!("spotify:album:{}", i)).collect();
        assert!(client.fetch_albums(&albums).is_err());

        let artists: Vec<String> = (0..51).map(|i| format!("spotify:artist:{}", i)).collect();
        assert!(client.fetch_artists(&artists).is_err());
    }

    #[test]
    fn test_batch_url_includes_market_when_configured() {
        let client =
            SpotifyCatalogClient::new("id", "secret", Some("JP".to_string())).unwrap();
        let url = client.batch_url(
            "tracks",
            &["spotify:track:abc".to_string(), "spotify:track:def".to_string()],
        );
        assert_eq!(
            url,
            "https://api.spotify.com/v1/tracks?ids=abc%2Cdef&market=JP"
        );
    }

    #[test]
    fn test_track_envelope_null_slots_become_none() {
        let body = r#"{
            "tracks": [
                {
                    "uri": "spotify:track:abc",
                    "name": "Something",
                    "disc_number": 1,
                    "duration_ms": 200000,
                    "explicit": false,
                    "popularity": 51,
                    "preview_url": null,
                    "track_number": 2,
                    "album": {"uri": "spotify:album:xyz"},
                    "artists": [{"uri": "spotify:artist:a1"}]
                },
                null
            ]
        }"#;
        let envelope: TracksEnvelope = serde_json::from_str(body).unwrap();
        assert_eq!(envelope.tracks.len(), 2);
        assert!(envelope.tracks[0].is_some());
        assert!(envelope.tracks[1].is_none());

        let track = envelope.tracks[0].as_ref().unwrap();
        assert_eq!(track.album.uri, "spotify:album:xyz");
        assert_eq!(track.artists.len(), 1);
    }
}
