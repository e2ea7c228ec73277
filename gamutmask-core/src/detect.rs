//! Per-file change detection.

use crate::fingerprint::fingerprint;
use crate::manifest::FileRecord;
use crate::scan::InputEntry;

/// Why an input does or does not need processing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    /// No manifest record for this name.
    New,
    /// Size or modification time differ from the record.
    StaleMetadata,
    /// Metadata matches but the content hash differs or is unknown.
    StaleContent,
    /// The record is current but its output artifact is gone.
    MissingOutput,
    Unchanged,
}

impl Verdict {
    pub fn needs_processing(self) -> bool {
        !matches!(self, Verdict::Unchanged)
    }
}

/// Verdict plus the hash computed while reaching it, so a pass never hashes
/// the same file twice.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Detection {
    pub verdict: Verdict,
    /// `None` for new files (hashed after the transform runs); possibly empty
    /// when the file vanished before it could be read.
    pub current_hash: Option<String>,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct ChangeDetector {
    trust_metadata: bool,
}

impl ChangeDetector {
    pub fn new(trust_metadata: bool) -> Self {
        Self { trust_metadata }
    }

    /// Classify `entry` against its manifest record.
    ///
    /// Unless metadata trust is enabled the current hash is computed on every
    /// name match, even when size and mtime already prove a change.
    /// `output_exists` is only consulted once everything else matches.
    pub fn detect(
        &self,
        entry: &InputEntry,
        record: Option<&FileRecord>,
        output_exists: impl FnOnce() -> bool,
    ) -> Detection {
        let Some(record) = record else {
            return Detection {
                verdict: Verdict::New,
                current_hash: None,
            };
        };

        let metadata_matches =
            record.size == entry.size && record.modified_at == entry.modified_at;

        if metadata_matches && self.trust_metadata && !record.content_hash.is_empty() {
            let verdict = if output_exists() {
                Verdict::Unchanged
            } else {
                Verdict::MissingOutput
            };
            return Detection {
                verdict,
                current_hash: Some(record.content_hash.clone()),
            };
        }

        let current = fingerprint(&entry.path);
        let verdict = if !metadata_matches {
            Verdict::StaleMetadata
        } else if current.is_empty()
            || record.content_hash.is_empty()
            || current != record.content_hash
        {
            Verdict::StaleContent
        } else if !output_exists() {
            Verdict::MissingOutput
        } else {
            Verdict::Unchanged
        };

        Detection {
            verdict,
            current_hash: Some(current),
        }
    }
}
