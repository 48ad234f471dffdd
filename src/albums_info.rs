//! JSON album-strategy manifest. Grounded in `jl1nie-gpth-rs`'s
//! `album_json` module: accumulate an in-memory map while placing files,
//! then serialize once at the end of stage 6.

use std::collections::HashMap;
use std::path::Path;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};

use anyhow::{Context, Result};
use serde::Serialize;

#[derive(Debug, Clone, Serialize)]
pub struct AlbumEntry {
    #[serde(rename = "originalFilename")]
    pub original_filename: String,
    #[serde(rename = "primaryRelativePathInOutput")]
    pub primary_relative_path_in_output: String,
    #[serde(rename = "albumRelativePathUnderAlbums")]
    pub album_relative_path_under_albums: String,
}

#[derive(Debug, Serialize)]
struct Metadata {
    generated: String,
    total_albums: usize,
    total_entities: usize,
    strategy: &'static str,
}

#[derive(Debug, Serialize)]
struct AlbumsInfoDoc {
    albums: HashMap<String, Vec<AlbumEntry>>,
    metadata: Metadata,
}

/// Accumulates album → entries across every entity's JSON-strategy
/// processing. Shared behind a `Mutex` since entities are placed under a
/// bounded-concurrency pool.
#[derive(Debug, Default)]
pub struct AlbumManifest {
    albums: Mutex<HashMap<String, Vec<AlbumEntry>>>,
    total_entities: AtomicUsize,
}

impl AlbumManifest {
    pub fn new() -> Self {
        AlbumManifest::default()
    }

    pub fn record(&self, album_name: &str, entry: AlbumEntry) {
        self.albums
            .lock()
            .unwrap()
            .entry(album_name.to_string())
            .or_default()
            .push(entry);
    }

    pub fn note_entity(&self) {
        self.total_entities.fetch_add(1, Ordering::Relaxed);
    }

    /// Writes `albums-info.json` at `output_root`, timestamped with
    /// `generated_at` (a plain string, since the core never calls
    /// `Utc::now()` directly — the caller stamps it).
    pub fn finalize(&self, output_root: &Path, generated_at: &str) -> Result<()> {
        let albums = self.albums.lock().unwrap().clone();
        let total_albums = albums.len();
        let doc = AlbumsInfoDoc {
            albums,
            metadata: Metadata {
                generated: generated_at.to_string(),
                total_albums,
                total_entities: self.total_entities.load(Ordering::Relaxed),
                strategy: "json",
            },
        };
        let json = serde_json::to_string_pretty(&doc).context("serializing albums-info.json")?;
        std::fs::write(output_root.join("albums-info.json"), json)
            .context("writing albums-info.json")?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_finalize_writes_expected_shape() {
        let dir = tempfile::tempdir().unwrap();
        let manifest = AlbumManifest::new();
        manifest.note_entity();
        manifest.record(
            "Vacation",
            AlbumEntry {
                original_filename: "a.jpg".to_string(),
                primary_relative_path_in_output: "ALL_PHOTOS/a.jpg".to_string(),
                album_relative_path_under_albums: "Vacation/a.jpg".to_string(),
            },
        );
        manifest.finalize(dir.path(), "2026-07-28T00:00:00Z").unwrap();

        let contents = std::fs::read_to_string(dir.path().join("albums-info.json")).unwrap();
        let parsed: serde_json::Value = serde_json::from_str(&contents).unwrap();
        assert_eq!(parsed["metadata"]["strategy"], "json");
        assert_eq!(parsed["metadata"]["total_albums"], 1);
        assert_eq!(parsed["albums"]["Vacation"][0]["originalFilename"], "a.jpg");
    }

    #[test]
    fn test_empty_manifest_still_writes() {
        let dir = tempfile::tempdir().unwrap();
        let manifest = AlbumManifest::new();
        manifest.finalize(dir.path(), "2026-07-28T00:00:00Z").unwrap();
        assert!(dir.path().join("albums-info.json").exists());
    }
}
