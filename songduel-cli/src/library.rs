/// Song library on disk: ingestion into the engine and the JSON-file store
/// the engine persists to.
///
/// The library is a JSON array of song records. `score` may be omitted (new
/// songs start unrated); the older `elo` field name is accepted too.
use std::collections::HashSet;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use songduel_core::constants::INITIAL_SCORE;
use songduel_core::{Item, Persistence, PersistenceError};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum LibraryError {
    #[error("Failed to read {path}: {source}")]
    Read { path: PathBuf, source: std::io::Error },
    #[error("Failed to write {path}: {source}")]
    Write { path: PathBuf, source: std::io::Error },
    #[error("Failed to parse {path}: {source}")]
    Parse { path: PathBuf, source: serde_json::Error },
    #[error("Failed to encode library: {0}")]
    Encode(#[from] serde_json::Error),
}

/// One song as stored in the library file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SongRecord {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub artists: String,
    #[serde(default)]
    pub album_name: String,
    /// Where the song was imported from ("spotify", "google", "text", ...).
    #[serde(default)]
    pub provider: String,
    #[serde(default = "default_score", alias = "elo")]
    pub score: i32,
}

fn default_score() -> i32 {
    INITIAL_SCORE
}

/// Display fields carried through the engine as item metadata.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SongInfo {
    pub name: String,
    pub artists: String,
    pub album_name: String,
}

impl SongInfo {
    /// "Artists - Name", or just the name when there are no artists.
    pub fn label(&self) -> String {
        if self.artists.is_empty() {
            self.name.clone()
        } else {
            format!("{} - {}", self.artists, self.name)
        }
    }
}

/// Convert library records into engine items.
pub fn to_items(records: &[SongRecord]) -> Vec<Item<SongInfo>> {
    records
        .iter()
        .map(|r| {
            Item::new(
                r.id.clone(),
                r.score,
                SongInfo {
                    name: r.name.clone(),
                    artists: r.artists.clone(),
                    album_name: r.album_name.clone(),
                },
            )
        })
        .collect()
}

/// Load a library file. A missing file is an empty library.
pub fn load_library(path: &Path) -> Result<Vec<SongRecord>, LibraryError> {
    match std::fs::read_to_string(path) {
        Ok(content) if content.trim().is_empty() => Ok(Vec::new()),
        Ok(content) => serde_json::from_str(&content)
            .map_err(|source| LibraryError::Parse { path: path.to_path_buf(), source }),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Vec::new()),
        Err(source) => Err(LibraryError::Read { path: path.to_path_buf(), source }),
    }
}

/// Write the whole library, replacing the file atomically.
pub fn save_library(path: &Path, records: &[SongRecord]) -> Result<(), LibraryError> {
    let json = serde_json::to_string_pretty(records)?;
    let tmp = tmp_path(path);
    std::fs::write(&tmp, json)
        .and_then(|_| std::fs::rename(&tmp, path))
        .map_err(|source| LibraryError::Write { path: path.to_path_buf(), source })
}

fn tmp_path(path: &Path) -> PathBuf {
    let mut name = path.file_name().map(|n| n.to_os_string()).unwrap_or_default();
    name.push(".tmp");
    path.with_file_name(name)
}

/// Parse songs to import from either a JSON array of records or plain text
/// with one "Artists - Name" (or just "Name") per line.
pub fn parse_import(content: &str, provider: &str) -> Result<Vec<SongRecord>, serde_json::Error> {
    let trimmed = content.trim();
    if trimmed.starts_with('[') {
        return serde_json::from_str(trimmed);
    }
    Ok(trimmed
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .map(|line| {
            let (artists, name) = match line.split_once(" - ") {
                Some((artists, name)) => (artists.trim().to_string(), name.trim().to_string()),
                None => (String::new(), line.to_string()),
            };
            SongRecord {
                id: slug(line),
                name,
                artists,
                album_name: String::new(),
                provider: provider.to_string(),
                score: INITIAL_SCORE,
            }
        })
        .collect())
}

/// Lowercase alphanumerics joined by single dashes.
fn slug(text: &str) -> String {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|w| !w.is_empty())
        .map(str::to_lowercase)
        .collect::<Vec<_>>()
        .join("-")
}

/// Add `incoming` songs to `library`, skipping ids it already has.
/// Returns how many were added.
pub fn merge_import(library: &mut Vec<SongRecord>, incoming: Vec<SongRecord>) -> usize {
    let mut seen: HashSet<String> = library.iter().map(|r| r.id.clone()).collect();
    let before = library.len();
    for record in incoming {
        if seen.insert(record.id.clone()) {
            library.push(record);
        }
    }
    library.len() - before
}

// ---------------------------------------------------------------------------
// Persistence adapter
// ---------------------------------------------------------------------------

/// Persists engine writes back into the library file.
///
/// Writes are serialized through an async mutex so concurrent background
/// tasks never interleave partial files.
pub struct JsonFileStore {
    path: PathBuf,
    records: tokio::sync::Mutex<Vec<SongRecord>>,
}

impl JsonFileStore {
    pub fn new(path: PathBuf, records: Vec<SongRecord>) -> Self {
        JsonFileStore { path, records: tokio::sync::Mutex::new(records) }
    }

    async fn flush(&self, records: &[SongRecord]) -> Result<(), PersistenceError> {
        let json = serde_json::to_string_pretty(records)
            .map_err(|e| PersistenceError::new(format!("Failed to encode library: {e}")))?;
        let tmp = tmp_path(&self.path);
        tokio::fs::write(&tmp, json)
            .await
            .map_err(|e| PersistenceError::new(format!("Failed to write {}: {e}", tmp.display())))?;
        tokio::fs::rename(&tmp, &self.path)
            .await
            .map_err(|e| PersistenceError::new(format!("Failed to replace {}: {e}", self.path.display())))
    }
}

#[async_trait]
impl Persistence for JsonFileStore {
    async fn update_score(&self, id: &str, score: i32) -> Result<(), PersistenceError> {
        let mut records = self.records.lock().await;
        let record = records
            .iter_mut()
            .find(|r| r.id == id)
            .ok_or_else(|| PersistenceError::new(format!("No song with id {id} in library")))?;
        record.score = score;
        self.flush(&records).await
    }

    async fn delete_item(&self, id: &str) -> Result<(), PersistenceError> {
        let mut records = self.records.lock().await;
        let before = records.len();
        records.retain(|r| r.id != id);
        if records.len() == before {
            // Already gone: deleting twice is fine.
            return Ok(());
        }
        self.flush(&records).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(id: &str, score: i32) -> SongRecord {
        SongRecord {
            id: id.to_string(),
            name: id.to_uppercase(),
            artists: "Band".to_string(),
            album_name: String::new(),
            provider: "test".to_string(),
            score,
        }
    }

    #[test]
    fn test_record_defaults_and_elo_alias() {
        let records: Vec<SongRecord> = serde_json::from_str(
            r#"[{"id": "a", "name": "A"}, {"id": "b", "name": "B", "elo": 1234}]"#,
        )
        .unwrap();
        assert_eq!(records[0].score, INITIAL_SCORE);
        assert_eq!(records[1].score, 1234);
    }

    #[test]
    fn test_parse_import_plain_text() {
        let songs = parse_import("Daft Punk - One More Time\n\n  Windowlicker  \n", "text").unwrap();
        assert_eq!(songs.len(), 2);
        assert_eq!(songs[0].id, "daft-punk-one-more-time");
        assert_eq!(songs[0].artists, "Daft Punk");
        assert_eq!(songs[0].name, "One More Time");
        assert_eq!(songs[1].artists, "");
        assert_eq!(songs[1].name, "Windowlicker");
        assert_eq!(songs[1].provider, "text");
    }

    #[test]
    fn test_merge_import_skips_known_ids() {
        let mut library = vec![record("a", 1200)];
        let added = merge_import(&mut library, vec![record("a", 1000), record("b", 1000)]);
        assert_eq!(added, 1);
        assert_eq!(library[0].score, 1200);
        assert_eq!(library[1].id, "b");
    }

    #[test]
    fn test_label() {
        let info = SongInfo { name: "Song".into(), artists: "".into(), album_name: "".into() };
        assert_eq!(info.label(), "Song");
        let info = SongInfo { artists: "Band".into(), ..info };
        assert_eq!(info.label(), "Band - Song");
    }

    #[tokio::test]
    async fn test_json_file_store_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("library.json");
        let records = vec![record("a", 1000), record("b", 1000)];
        save_library(&path, &records).unwrap();

        let store = JsonFileStore::new(path.clone(), records);
        store.update_score("a", 1016).await.unwrap();
        store.delete_item("b").await.unwrap();
        store.delete_item("b").await.unwrap();
        assert!(store.update_score("zzz", 1000).await.is_err());

        let on_disk = load_library(&path).unwrap();
        assert_eq!(on_disk, vec![record("a", 1016)]);
    }

    #[test]
    fn test_missing_library_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        assert!(load_library(&dir.path().join("nope.json")).unwrap().is_empty());
    }
}
