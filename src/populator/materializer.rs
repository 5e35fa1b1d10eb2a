//! Play-event materialization.
//!
//! Two passes over the raw records: the first builds and bulk-inserts play
//! rows, the second attaches the artist union once every play has a stable
//! rowid to associate against.

use super::identity_cache::IdentityCache;
use super::loader::PlayRecord;
use crate::library_store::{LibraryStore, NewPlay};
use anyhow::Result;
use std::collections::HashSet;
use tracing::{debug, info};

/// Share of the track actually played, clamped to `[0.0, 1.0]`. Exports can
/// report more playback time than the track length (seek/loop quirks), and a
/// zero duration must not divide.
pub fn ratio_played(ms_played: i64, duration_ms: i64) -> f64 {
    if duration_ms <= 0 {
        return 0.0;
    }
    (ms_played as f64 / duration_ms as f64).clamp(0.0, 1.0)
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct MaterializeOutcome {
    /// Play rows newly created this run.
    pub created: usize,
    /// Records whose play row already existed from an earlier run.
    pub duplicates: usize,
    /// Records with no identifier, or whose identifier resolved to no track.
    pub dropped: usize,
}

pub struct PlayEventMaterializer<'a> {
    store: &'a dyn LibraryStore,
    cache: &'a IdentityCache,
}

impl<'a> PlayEventMaterializer<'a> {
    pub fn new(store: &'a dyn LibraryStore, cache: &'a IdentityCache) -> Self {
        PlayEventMaterializer { store, cache }
    }

    pub fn materialize(&self, records: &[PlayRecord]) -> Result<MaterializeOutcome> {
        let mut outcome = MaterializeOutcome::default();
        let mut plays = Vec::new();

        for record in records {
            let Some(uri) = &record.spotify_track_uri else {
                outcome.dropped += 1;
                continue;
            };
            let Some(track_rowid) = self.cache.resolve_track(uri) else {
                debug!("Dropping play of {}: track not in the library", uri);
                outcome.dropped += 1;
                continue;
            };
            let Some(detail) = self.cache.track_detail(track_rowid) else {
                debug!("Dropping play of {}: track has no cached detail", uri);
                outcome.dropped += 1;
                continue;
            };

            plays.push(NewPlay {
                track_rowid,
                album_rowid: detail.album_rowid,
                played_at: record.ts.timestamp(),
                ms_played: record.ms_played,
                ratio_played: ratio_played(record.ms_played, detail.duration_ms),
                reason_start: record.reason_start.clone().unwrap_or_default(),
                reason_end: record.reason_end.clone().unwrap_or_default(),
                shuffle: record.shuffle.unwrap_or(false),
            });
        }

        let inserted = self.store.insert_plays(&plays)?;

        // Second pass: artist associations need the post-insert rowids.
        let track_artists = self.store.track_artists_map()?;
        let album_artists = self.store.album_artists_map()?;

        self.store.begin_batch()?;
        let result = (|| -> Result<()> {
            for (play, row) in plays.iter().zip(&inserted) {
                if !row.created {
                    outcome.duplicates += 1;
                    continue;
                }
                outcome.created += 1;

                let mut seen = HashSet::new();
                let mut union = Vec::new();
                for artist in track_artists
                    .get(&play.track_rowid)
                    .into_iter()
                    .flatten()
                {
                    if seen.insert(*artist) {
                        union.push(*artist);
                    }
                }
                if let Some(album_rowid) = play.album_rowid {
                    for artist in album_artists.get(&album_rowid).into_iter().flatten() {
                        if seen.insert(*artist) {
                            union.push(*artist);
                        }
                    }
                }
                self.store.attach_play_artists(row.rowid, &union)?;
            }
            Ok(())
        })();
        match result {
            Ok(()) => self.store.commit_batch()?,
            Err(e) => {
                let _ = self.store.rollback_batch();
                return Err(e);
            }
        }

        info!(
            "Materialized {} plays ({} already present, {} records dropped)",
            outcome.created, outcome.duplicates, outcome.dropped
        );

        Ok(outcome)
    }
}
