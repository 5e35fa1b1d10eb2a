//! Play-log loader.
//!
//! Reads every `*.json` file under the input directory as an array of play
//! records (the extended-streaming-history export format). A file that fails
//! to read or parse is skipped with a warning; one bad export must not sink
//! the whole run.

use anyhow::{bail, Result};
use chrono::{DateTime, Utc};
use serde::Deserialize;
use std::collections::BTreeSet;
use std::path::Path;
use tracing::{info, warn};
use walkdir::WalkDir;

/// One raw play record as found in the export. Never persisted as-is; the
/// materializer turns qualifying records into play rows.
#[derive(Clone, Debug, Deserialize)]
pub struct PlayRecord {
    pub ts: DateTime<Utc>,
    pub ms_played: i64,
    pub spotify_track_uri: Option<String>,
    #[serde(default)]
    pub reason_start: Option<String>,
    #[serde(default)]
    pub reason_end: Option<String>,
    #[serde(default)]
    pub shuffle: Option<bool>,
}

/// Load every play record under `dir` and collect the unique set of track
/// identifiers they reference.
pub fn load_play_records(dir: &Path) -> Result<(BTreeSet<String>, Vec<PlayRecord>)> {
    if !dir.is_dir() {
        bail!("Input path {:?} does not exist or is not a directory", dir);
    }

    let mut uris = BTreeSet::new();
    let mut records = Vec::new();
    let mut loaded_files = 0usize;
    let mut skipped_files = 0usize;

    for entry in WalkDir::new(dir)
        .sort_by_file_name()
        .into_iter()
        .filter_map(|e| e.ok())
    {
        if !entry.file_type().is_file() {
            continue;
        }
        if entry.path().extension().and_then(|e| e.to_str()) != Some("json") {
            continue;
        }

        let content = match std::fs::read_to_string(entry.path()) {
            Ok(content) => content,
            Err(e) => {
                warn!("Skipping unreadable file {:?}: {}", entry.path(), e);
                skipped_files += 1;
                continue;
            }
        };

        let parsed: Vec<PlayRecord> = match serde_json::from_str(&content) {
            Ok(parsed) => parsed,
            Err(e) => {
                warn!("Skipping {:?}: not a valid play log: {}", entry.path(), e);
                skipped_files += 1;
                continue;
            }
        };

        uris.extend(
            parsed
                .iter()
                .filter_map(|record| record.spotify_track_uri.clone()),
        );
        records.extend(parsed);
        loaded_files += 1;
    }

    info!(
        "Loaded {} play records referencing {} unique tracks from {} files ({} skipped)",
        records.len(),
        uris.len(),
        loaded_files,
        skipped_files
    );

    Ok((uris, records))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write_file(dir: &Path, name: &str, content: &str) {
        std::fs::write(dir.join(name), content).unwrap();
    }

    const VALID_LOG: &str = r#"[
        {
            "ts": "2021-03-01T21:15:00Z",
            "ms_played": 215000,
            "spotify_track_uri": "spotify:track:aaa",
            "reason_start": "clickrow",
            "reason_end": "trackdone",
            "shuffle": false
        },
        {
            "ts": "2021-03-01T21:19:00Z",
            "ms_played": 1000,
            "spotify_track_uri": null,
            "reason_start": "trackdone",
            "reason_end": "endplay",
            "shuffle": true
        },
        {
            "ts": "2021-03-02T08:00:00Z",
            "ms_played": 90000,
            "spotify_track_uri": "spotify:track:bbb",
            "reason_start": "trackdone",
            "reason_end": "trackdone",
            "shuffle": false
        }
    ]"#;

    #[test]
    fn test_collects_unique_non_null_uris() {
        let dir = tempfile::TempDir::new().unwrap();
        write_file(dir.path(), "endsong_0.json", VALID_LOG);
        write_file(dir.path(), "endsong_1.json", VALID_LOG);

        let (uris, records) = load_play_records(dir.path()).unwrap();
        assert_eq!(records.len(), 6);
        assert_eq!(
            uris.into_iter().collect::<Vec<_>>(),
            vec!["spotify:track:aaa", "spotify:track:bbb"]
        );
    }

    #[test]
    fn test_malformed_file_is_skipped_not_fatal() {
        let dir = tempfile::TempDir::new().unwrap();
        write_file(dir.path(), "endsong_0.json", VALID_LOG);
        write_file(dir.path(), "broken.json", "{ not json at all");
        write_file(dir.path(), "notes.txt", "ignore me");

        let (uris, records) = load_play_records(dir.path()).unwrap();
        assert_eq!(records.len(), 3);
        assert_eq!(uris.len(), 2);
    }

    #[test]
    fn test_missing_directory_is_an_error() {
        let dir = tempfile::TempDir::new().unwrap();
        let missing = dir.path().join("nope");
        assert!(load_play_records(&missing).is_err());
    }
}
