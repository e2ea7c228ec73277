//! Directory enumeration for reconciliation passes.

use std::fs;
use std::path::{Component, Path, PathBuf};
use std::time::SystemTime;

use chrono::{DateTime, Utc};
use tracing::{debug, warn};
use walkdir::WalkDir;

use crate::error::{GamutError, Result};
use crate::manifest::is_sidecar_name;
use crate::pipeline::InputFilter;

/// How far below the root a pass looks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScanMode {
    /// Direct children of the root only.
    Flat,
    /// The whole tree; names are qualified by their relative path.
    Recursive,
}

/// One eligible input file from a directory listing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InputEntry {
    /// Path relative to the root, `/`-separated.
    pub name: String,
    pub path: PathBuf,
    pub size: u64,
    pub modified_at: DateTime<Utc>,
}

/// List the files under `root` accepted by `filter`, sorted by name.
///
/// Directories and the manifest sidecar are never returned. Entries that
/// vanish while being listed are skipped; failing to read `root` itself is an
/// error.
pub fn list_inputs(
    root: &Path,
    mode: ScanMode,
    filter: &dyn InputFilter,
    sidecar: &str,
) -> Result<Vec<InputEntry>> {
    let mut entries = match mode {
        ScanMode::Flat => list_flat(root, filter, sidecar)?,
        ScanMode::Recursive => list_recursive(root, filter, sidecar)?,
    };
    entries.sort_by(|a, b| a.name.cmp(&b.name));
    Ok(entries)
}

fn list_flat(root: &Path, filter: &dyn InputFilter, sidecar: &str) -> Result<Vec<InputEntry>> {
    let reader = fs::read_dir(root).map_err(|err| GamutError::io_at(root, err))?;
    let mut entries = Vec::new();

    for entry in reader {
        let entry = match entry {
            Ok(entry) => entry,
            Err(err) => {
                debug!("skipping unreadable entry in {}: {}", root.display(), err);
                continue;
            }
        };
        let path = entry.path();
        let Some(file_name) = utf8_file_name(&path) else {
            continue;
        };
        if is_sidecar_name(&path, sidecar) || !filter.accepts(root, file_name) {
            continue;
        }
        if let Some(input) = describe(&path, file_name.to_string()) {
            entries.push(input);
        }
    }

    Ok(entries)
}

fn list_recursive(
    root: &Path,
    filter: &dyn InputFilter,
    sidecar: &str,
) -> Result<Vec<InputEntry>> {
    let mut entries = Vec::new();

    for entry in WalkDir::new(root).min_depth(1).follow_links(false) {
        let entry = match entry {
            Ok(entry) => entry,
            Err(err) if err.depth() == 0 => {
                let source = err
                    .into_io_error()
                    .unwrap_or_else(|| std::io::Error::other("directory walk failed"));
                return Err(GamutError::io_at(root, source));
            }
            Err(err) => {
                debug!("skipping entry under {}: {}", root.display(), err);
                continue;
            }
        };
        if entry.file_type().is_dir() {
            continue;
        }

        let path = entry.path();
        let Some(file_name) = utf8_file_name(path) else {
            continue;
        };
        let directory = path.parent().unwrap_or(root);
        if is_sidecar_name(path, sidecar) || !filter.accepts(directory, file_name) {
            continue;
        }
        let Some(name) = relative_name(root, path) else {
            continue;
        };
        if let Some(input) = describe(path, name) {
            entries.push(input);
        }
    }

    Ok(entries)
}

fn describe(path: &Path, name: String) -> Option<InputEntry> {
    let metadata = match fs::metadata(path) {
        Ok(metadata) => metadata,
        Err(err) => {
            debug!("{} vanished while listing: {}", path.display(), err);
            return None;
        }
    };
    if !metadata.is_file() {
        return None;
    }
    let modified = metadata.modified().unwrap_or(SystemTime::UNIX_EPOCH);

    Some(InputEntry {
        name,
        path: path.to_path_buf(),
        size: metadata.len(),
        modified_at: DateTime::<Utc>::from(modified),
    })
}

fn utf8_file_name(path: &Path) -> Option<&str> {
    let name = path.file_name()?;
    match name.to_str() {
        Some(name) => Some(name),
        None => {
            warn!("ignoring non UTF-8 file name {}", path.display());
            None
        }
    }
}

/// `/`-separated path of `path` below `root`.
pub fn relative_name(root: &Path, path: &Path) -> Option<String> {
    let rel = path.strip_prefix(root).ok()?;
    let mut parts = Vec::new();
    for component in rel.components() {
        match component {
            Component::Normal(segment) => parts.push(segment.to_str()?),
            Component::CurDir => {}
            _ => return None,
        }
    }
    if parts.is_empty() {
        return None;
    }
    Some(parts.join("/"))
}

/// Resolve a `/`-separated relative name below `root`.
pub fn join_relative(root: &Path, name: &str) -> PathBuf {
    name.split('/')
        .filter(|segment| !segment.is_empty())
        .fold(root.to_path_buf(), |acc, segment| acc.join(segment))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::ExtensionFilter;
    use tempfile::tempdir;

    fn names(entries: &[InputEntry]) -> Vec<&str> {
        entries.iter().map(|entry| entry.name.as_str()).collect()
    }

    #[test]
    fn flat_listing_filters_and_sorts() {
        let tmp = tempdir().unwrap();
        let root = tmp.path();
        fs::write(root.join("b.png"), b"bb").unwrap();
        fs::write(root.join("a.jpg"), b"a").unwrap();
        fs::write(root.join("notes.txt"), b"n").unwrap();
        fs::write(root.join("_list.json"), b"{}").unwrap();
        fs::create_dir(root.join("nested.png")).unwrap();
        fs::create_dir(root.join("sub")).unwrap();
        fs::write(root.join("sub").join("c.png"), b"c").unwrap();

        let entries =
            list_inputs(root, ScanMode::Flat, &ExtensionFilter::default(), "_list.json").unwrap();
        assert_eq!(names(&entries), vec!["a.jpg", "b.png"]);
        assert_eq!(entries[1].size, 2);
    }

    #[test]
    fn recursive_listing_qualifies_names() {
        let tmp = tempdir().unwrap();
        let root = tmp.path();
        fs::create_dir_all(root.join("sub").join("deeper")).unwrap();
        fs::write(root.join("a.png"), b"a").unwrap();
        fs::write(root.join("sub").join("b.png"), b"b").unwrap();
        fs::write(root.join("sub").join("deeper").join("c.jpeg"), b"c").unwrap();
        fs::write(root.join("sub").join("skip.txt"), b"s").unwrap();

        let entries = list_inputs(
            root,
            ScanMode::Recursive,
            &ExtensionFilter::default(),
            "_list.json",
        )
        .unwrap();
        assert_eq!(
            names(&entries),
            vec!["a.png", "sub/b.png", "sub/deeper/c.jpeg"]
        );
        assert_eq!(entries[2].path, root.join("sub").join("deeper").join("c.jpeg"));
    }

    #[test]
    fn missing_root_is_an_error() {
        let tmp = tempdir().unwrap();
        let gone = tmp.path().join("gone");
        let filter = ExtensionFilter::default();
        assert!(list_inputs(&gone, ScanMode::Flat, &filter, "_list.json").is_err());
        assert!(list_inputs(&gone, ScanMode::Recursive, &filter, "_list.json").is_err());
    }

    #[test]
    fn relative_names_roundtrip() {
        let root = Path::new("/data/in");
        let path = root.join("sub").join("a.png");
        let name = relative_name(root, &path).unwrap();
        assert_eq!(name, "sub/a.png");
        assert_eq!(join_relative(root, &name), path);
        assert_eq!(relative_name(root, root), None);
    }
}
