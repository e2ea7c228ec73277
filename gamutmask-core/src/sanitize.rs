//! Removes output artifacts that no live manifest entry refers to.
//!
//! Must only run after the manifest has been pruned for the current pass;
//! against a stale manifest it would delete valid outputs.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use tracing::{debug, info};
use walkdir::WalkDir;

use crate::error::{GamutError, Result};
use crate::manifest::Manifest;
use crate::pipeline::DeletePolicy;
use crate::scan::{ScanMode, relative_name};

/// Delete every file under `output_dir` whose relative name is not an output
/// of `manifest`, unless `policy` protects it. Directories are left alone.
///
/// Returns the deleted paths. A failed deletion aborts with an error.
pub fn sanitize_outputs(
    output_dir: &Path,
    mode: ScanMode,
    manifest: &Manifest,
    policy: &dyn DeletePolicy,
) -> Result<Vec<PathBuf>> {
    let candidates = match mode {
        ScanMode::Flat => flat_files(output_dir)?,
        ScanMode::Recursive => tree_files(output_dir)?,
    };

    let mut deleted = Vec::new();
    for (name, path) in candidates {
        if manifest.contains_output(&name) {
            continue;
        }
        let directory = path.parent().unwrap_or(output_dir);
        let Some(file_name) = path.file_name().and_then(|name| name.to_str()) else {
            continue;
        };
        if !policy.confirm(directory, file_name) {
            debug!("keeping protected output {}", path.display());
            continue;
        }

        info!("Deleting: {}", path.display());
        match fs::remove_file(&path) {
            Ok(()) => deleted.push(path),
            Err(err) if err.kind() == io::ErrorKind::NotFound => {
                debug!("{} already gone", path.display());
            }
            Err(err) => return Err(GamutError::io_at(&path, err)),
        }
    }

    Ok(deleted)
}

fn flat_files(output_dir: &Path) -> Result<Vec<(String, PathBuf)>> {
    let reader = fs::read_dir(output_dir).map_err(|err| GamutError::io_at(output_dir, err))?;
    let mut files = Vec::new();
    for entry in reader {
        let entry = entry.map_err(|err| GamutError::io_at(output_dir, err))?;
        let is_dir = entry.file_type().map(|kind| kind.is_dir()).unwrap_or(false);
        if is_dir {
            continue;
        }
        if let Some(name) = entry.file_name().to_str() {
            files.push((name.to_string(), entry.path()));
        }
    }
    files.sort();
    Ok(files)
}

fn tree_files(output_dir: &Path) -> Result<Vec<(String, PathBuf)>> {
    let mut files = Vec::new();
    for entry in WalkDir::new(output_dir).min_depth(1).sort_by_file_name() {
        let entry = match entry {
            Ok(entry) => entry,
            Err(err) => {
                let source = err
                    .into_io_error()
                    .unwrap_or_else(|| io::Error::other("directory walk failed"));
                return Err(GamutError::io_at(output_dir, source));
            }
        };
        if entry.file_type().is_dir() {
            continue;
        }
        if let Some(name) = relative_name(output_dir, entry.path()) {
            files.push((name, entry.path().to_path_buf()));
        }
    }
    Ok(files)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::manifest::FileRecord;
    use crate::pipeline::ProtectedNames;
    use chrono::Utc;
    use tempfile::tempdir;

    fn manifest_with(outputs: &[&str]) -> Manifest {
        let mut manifest = Manifest::new();
        for output in outputs {
            manifest.upsert(FileRecord {
                input_name: output.trim_end_matches(".png").to_string(),
                output_name: output.to_string(),
                content_hash: String::new(),
                size: 0,
                modified_at: Utc::now(),
                processed_at: Utc::now(),
                width: 0,
                height: 0,
            });
        }
        manifest
    }

    #[test]
    fn removes_orphans_and_spares_protected_files() {
        let tmp = tempdir().unwrap();
        let out = tmp.path();
        fs::write(out.join("a.png.png"), b"a").unwrap();
        fs::write(out.join("b.png.png"), b"b").unwrap();
        fs::write(out.join(".gitignore"), b"*").unwrap();
        fs::create_dir(out.join("keepdir")).unwrap();

        let manifest = manifest_with(&["a.png.png"]);
        let deleted =
            sanitize_outputs(out, ScanMode::Flat, &manifest, &ProtectedNames::default()).unwrap();

        assert_eq!(deleted, vec![out.join("b.png.png")]);
        assert!(out.join("a.png.png").exists());
        assert!(out.join(".gitignore").exists());
        assert!(out.join("keepdir").is_dir());
    }

    #[test]
    fn recursive_mode_matches_relative_names() {
        let tmp = tempdir().unwrap();
        let out = tmp.path();
        fs::create_dir_all(out.join("sub")).unwrap();
        fs::write(out.join("sub").join("a.png.png"), b"a").unwrap();
        fs::write(out.join("sub").join("stale.png.png"), b"s").unwrap();
        fs::write(out.join("a.png.png"), b"top").unwrap();

        let manifest = manifest_with(&["sub/a.png.png"]);
        let keep_nothing = |_: &Path, _: &str| true;
        let deleted = sanitize_outputs(out, ScanMode::Recursive, &manifest, &keep_nothing).unwrap();

        assert_eq!(
            deleted,
            vec![out.join("a.png.png"), out.join("sub").join("stale.png.png")]
        );
        assert!(out.join("sub").join("a.png.png").exists());
        assert!(out.join("sub").is_dir());
    }
}
