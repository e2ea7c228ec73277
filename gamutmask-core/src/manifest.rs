//! Durable record of every input processed from one watched directory.
//!
//! The manifest lives next to the inputs as a pretty-printed JSON sidecar so
//! it stays diffable. A missing or unreadable sidecar is never fatal: the store
//! starts from an empty manifest and the next pass rebuilds it.

use std::collections::HashSet;
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use tracing::{debug, warn};

use crate::error::{GamutError, Result};

/// One manifest entry per known input file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct FileRecord {
    /// Path relative to the watched root, `/`-separated. Unique key.
    pub input_name: String,
    /// Name of the derived artifact relative to the output root.
    pub output_name: String,
    /// Hex digest of the input bytes. Empty means "unknown".
    #[serde(default, alias = "MD5", skip_serializing_if = "String::is_empty")]
    pub content_hash: String,
    #[serde(default)]
    pub size: u64,
    #[serde(alias = "CreatedAt")]
    pub modified_at: DateTime<Utc>,
    pub processed_at: DateTime<Utc>,
    #[serde(default)]
    pub width: u32,
    #[serde(default)]
    pub height: u32,
}

/// Ordered collection of [`FileRecord`]s keyed by `input_name`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Manifest {
    #[serde(rename = "Items", default, deserialize_with = "null_as_empty")]
    items: Vec<FileRecord>,
}

fn null_as_empty<'de, D>(deserializer: D) -> std::result::Result<Vec<FileRecord>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<Vec<FileRecord>>::deserialize(deserializer)?.unwrap_or_default())
}

impl Manifest {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn records(&self) -> &[FileRecord] {
        &self.items
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn get(&self, input_name: &str) -> Option<&FileRecord> {
        self.items.iter().find(|record| record.input_name == input_name)
    }

    pub fn get_mut(&mut self, input_name: &str) -> Option<&mut FileRecord> {
        self.items
            .iter_mut()
            .find(|record| record.input_name == input_name)
    }

    /// Replace the record with the same `input_name` in place, or append it.
    pub fn upsert(&mut self, record: FileRecord) {
        match self.get_mut(&record.input_name) {
            Some(existing) => *existing = record,
            None => self.items.push(record),
        }
    }

    /// Drop every record whose input was not seen during the current pass.
    /// Returns the removed records in manifest order.
    pub fn retain_seen(&mut self, seen: &HashSet<String>) -> Vec<FileRecord> {
        let (kept, pruned): (Vec<_>, Vec<_>) = std::mem::take(&mut self.items)
            .into_iter()
            .partition(|record| seen.contains(&record.input_name));
        self.items = kept;
        pruned
    }

    pub fn contains_output(&self, output_name: &str) -> bool {
        self.items
            .iter()
            .any(|record| record.output_name == output_name)
    }

    /// Keep the first record for each `input_name`; later duplicates are
    /// discarded. Returns how many were dropped.
    fn dedupe(&mut self) -> usize {
        let before = self.items.len();
        let mut names = HashSet::with_capacity(before);
        self.items.retain(|record| names.insert(record.input_name.clone()));
        before - self.items.len()
    }
}

/// Loads and persists the manifest sidecar of one input directory.
#[derive(Debug, Clone)]
pub struct ManifestStore {
    path: PathBuf,
}

impl ManifestStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Store for the sidecar named `file_name` inside `dir`.
    pub fn in_dir(dir: &Path, file_name: &str) -> Self {
        Self::new(dir.join(file_name))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read the manifest, falling back to an empty one when the sidecar is
    /// absent, unreadable or malformed.
    pub fn load(&self) -> Manifest {
        let raw = match fs::read_to_string(&self.path) {
            Ok(raw) => raw,
            Err(err) if err.kind() == io::ErrorKind::NotFound => {
                debug!("no manifest at {}, starting empty", self.path.display());
                return Manifest::new();
            }
            Err(err) => {
                warn!(
                    "manifest {} unreadable, starting empty: {}",
                    self.path.display(),
                    err
                );
                return Manifest::new();
            }
        };

        match serde_json::from_str::<Manifest>(&raw) {
            Ok(mut manifest) => {
                let dropped = manifest.dedupe();
                if dropped > 0 {
                    warn!(
                        "manifest {} carried {} duplicate entries",
                        self.path.display(),
                        dropped
                    );
                }
                manifest
            }
            Err(err) => {
                warn!(
                    "manifest {} is corrupt, discarding it: {}",
                    self.path.display(),
                    err
                );
                Manifest::new()
            }
        }
    }

    /// Atomically replace the sidecar with `manifest`.
    ///
    /// The temporary file shares the sidecar's name as prefix so watchers that
    /// ignore the sidecar also ignore the intermediate write.
    pub fn persist(&self, manifest: &Manifest) -> Result<()> {
        let dir = match self.path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent,
            _ => Path::new("."),
        };
        let prefix = format!("{}.", self.file_name());

        let mut tmp = tempfile::Builder::new()
            .prefix(&prefix)
            .suffix(".tmp")
            .tempfile_in(dir)
            .map_err(|err| GamutError::io_at(dir, err))?;

        serde_json::to_writer_pretty(&mut tmp, manifest)?;
        tmp.write_all(b"\n")
            .and_then(|_| tmp.as_file().sync_all())
            .map_err(|err| GamutError::io_at(tmp.path(), err))?;

        tmp.persist(&self.path)
            .map_err(|err| GamutError::io_at(&self.path, err.error))?;
        Ok(())
    }

    /// Whether `path` is the sidecar itself or one of its temporary writes.
    pub fn is_sidecar(&self, path: &Path) -> bool {
        is_sidecar_name(path, &self.file_name())
    }

    fn file_name(&self) -> String {
        self.path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_default()
    }
}

/// Match `path` against a sidecar file name, including `<name>.*.tmp`
/// intermediates.
pub fn is_sidecar_name(path: &Path, sidecar: &str) -> bool {
    if sidecar.is_empty() {
        return false;
    }
    path.file_name()
        .and_then(|name| name.to_str())
        .is_some_and(|name| name == sidecar || name.starts_with(&format!("{sidecar}.")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use tempfile::tempdir;

    fn record(name: &str) -> FileRecord {
        let at = Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap();
        FileRecord {
            input_name: name.to_string(),
            output_name: format!("{name}.png"),
            content_hash: "abc".to_string(),
            size: 42,
            modified_at: at,
            processed_at: at,
            width: 250,
            height: 250,
        }
    }

    #[test]
    fn upsert_keeps_names_unique() {
        let mut manifest = Manifest::new();
        manifest.upsert(record("a.png"));
        manifest.upsert(record("b.png"));

        let mut changed = record("a.png");
        changed.size = 7;
        manifest.upsert(changed);

        assert_eq!(manifest.len(), 2);
        assert_eq!(manifest.records()[0].input_name, "a.png");
        assert_eq!(manifest.get("a.png").unwrap().size, 7);
    }

    #[test]
    fn retain_seen_prunes_unseen_records() {
        let mut manifest = Manifest::new();
        manifest.upsert(record("a.png"));
        manifest.upsert(record("b.png"));

        let seen: HashSet<String> = ["a.png".to_string()].into_iter().collect();
        let pruned = manifest.retain_seen(&seen);

        assert_eq!(pruned.len(), 1);
        assert_eq!(pruned[0].input_name, "b.png");
        assert!(manifest.contains_output("a.png.png"));
        assert!(!manifest.contains_output("b.png.png"));
    }

    #[test]
    fn persist_then_load_roundtrips() {
        let tmp = tempdir().unwrap();
        let store = ManifestStore::in_dir(tmp.path(), "_list.json");

        let mut manifest = Manifest::new();
        manifest.upsert(record("a.png"));
        store.persist(&manifest).unwrap();

        let raw = fs::read_to_string(store.path()).unwrap();
        assert!(raw.contains("\n  \"Items\": ["));
        assert!(raw.contains("\"InputName\": \"a.png\""));
        assert!(!raw.contains("Found"));
        assert_eq!(store.load(), manifest);

        // No temporaries left behind.
        let leftovers = fs::read_dir(tmp.path()).unwrap().count();
        assert_eq!(leftovers, 1);
    }

    #[test]
    fn empty_hash_is_omitted_and_tolerated() {
        let mut unknown = record("a.png");
        unknown.content_hash.clear();
        let mut manifest = Manifest::new();
        manifest.upsert(unknown);

        let raw = serde_json::to_string(&manifest).unwrap();
        assert!(!raw.contains("ContentHash"));
        let back: Manifest = serde_json::from_str(&raw).unwrap();
        assert_eq!(back.get("a.png").unwrap().content_hash, "");
    }

    #[test]
    fn corrupt_or_missing_sidecar_loads_empty() {
        let tmp = tempdir().unwrap();
        let store = ManifestStore::in_dir(tmp.path(), "_list.json");
        assert!(store.load().is_empty());

        fs::write(store.path(), "{ not json").unwrap();
        assert!(store.load().is_empty());

        fs::write(store.path(), r#"{"Items": null}"#).unwrap();
        assert!(store.load().is_empty());
    }

    #[test]
    fn accepts_legacy_field_names_and_drops_duplicates() {
        let tmp = tempdir().unwrap();
        let store = ManifestStore::in_dir(tmp.path(), "_list.json");
        let legacy = r#"{
  "Items": [
    {
      "InputName": "a.jpg",
      "OutputName": "a.jpg.png",
      "MD5": "d41d8cd98f00b204e9800998ecf8427e",
      "Size": 10,
      "CreatedAt": "2020-05-01T10:00:00.123456789+02:00",
      "ProcessedAt": "2020-05-01T10:00:01Z",
      "Width": 0,
      "Height": 0
    },
    {
      "InputName": "a.jpg",
      "OutputName": "a.jpg.png",
      "Size": 11,
      "CreatedAt": "2020-05-01T10:00:00Z",
      "ProcessedAt": "2020-05-01T10:00:01Z"
    }
  ]
}"#;
        fs::write(store.path(), legacy).unwrap();

        let manifest = store.load();
        assert_eq!(manifest.len(), 1);
        let entry = manifest.get("a.jpg").unwrap();
        assert_eq!(entry.content_hash, "d41d8cd98f00b204e9800998ecf8427e");
        assert_eq!(entry.size, 10);
    }

    #[test]
    fn sidecar_matching_covers_temporaries() {
        let store = ManifestStore::new("/in/_list.json");
        assert!(store.is_sidecar(Path::new("/in/_list.json")));
        assert!(store.is_sidecar(Path::new("/in/_list.json.a1B2c3.tmp")));
        assert!(!store.is_sidecar(Path::new("/in/a.png")));
        assert!(!store.is_sidecar(Path::new("/in/x_list.json")));
    }
}
