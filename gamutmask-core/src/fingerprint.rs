//! Content fingerprints used for change detection.
//!
//! The digest is not a security primitive; it only has to tell two versions of
//! the same input apart.

use std::fs::File;
use std::io::{self, Read};
use std::path::Path;

use sha2::{Digest, Sha256};
use tracing::debug;

/// Bytes read per iteration while hashing.
pub const CHUNK_SIZE: usize = 8 * 1024;

/// Hash the file at `path` and return the lowercase hex digest.
///
/// Returns an empty string when the file cannot be opened or read (for
/// example because it was removed after the directory listing). Callers treat
/// the empty value as "unknown" and reprocess the file.
pub fn fingerprint(path: &Path) -> String {
    match hash_file(path) {
        Ok(digest) => digest,
        Err(err) => {
            debug!("fingerprint unavailable for {}: {}", path.display(), err);
            String::new()
        }
    }
}

fn hash_file(path: &Path) -> io::Result<String> {
    let mut file = File::open(path)?;
    let mut hasher = Sha256::new();
    let mut buf = [0u8; CHUNK_SIZE];

    loop {
        let read = match file.read(&mut buf) {
            Ok(0) => break,
            Ok(n) => n,
            Err(err) if err.kind() == io::ErrorKind::Interrupted => continue,
            Err(err) => return Err(err),
        };
        hasher.update(&buf[..read]);
    }

    Ok(hex::encode(hasher.finalize()))
}
