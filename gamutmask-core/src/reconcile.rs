//! A single incremental reconciliation pass.
//!
//! Load manifest → list inputs → detect changes → transform stale inputs →
//! prune unseen records → sanitize outputs → persist manifest.
//!
//! Passes are not crash-atomic: a crash before the manifest is persisted loses
//! the in-memory updates and the next pass redoes the work from the last
//! persisted state.

use std::collections::HashSet;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use tracing::{debug, info, warn};

use crate::config::ReconcileConfig;
use crate::detect::{ChangeDetector, Detection};
use crate::error::Result;
use crate::fingerprint::fingerprint;
use crate::manifest::{FileRecord, Manifest, ManifestStore};
use crate::pipeline::{
    DeletePolicy, ExtensionFilter, InputFilter, ProtectedNames, Transform, TransformOutcome,
    output_name_for,
};
use crate::sanitize::sanitize_outputs;
use crate::scan::{InputEntry, join_relative, list_inputs};

/// Counters describing one finished pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PassReport {
    /// Inputs transformed and recorded.
    pub processed: usize,
    pub unchanged: usize,
    /// Transform invocations that failed or produced no artifact.
    pub failed: usize,
    /// Inputs that disappeared before the transform could read them.
    pub vanished: usize,
    /// Records dropped because their input is gone.
    pub pruned: usize,
    /// Output files removed by the sanitizer.
    pub deleted_outputs: usize,
    pub elapsed: Duration,
}

impl PassReport {
    /// Number of transform invocations made during the pass.
    pub fn transformed(&self) -> usize {
        self.processed + self.failed + self.vanished
    }
}

/// Runs reconciliation passes for one input/output directory pair.
///
/// Both directories must exist; creating them is the caller's job.
pub struct Reconciler {
    input_dir: PathBuf,
    output_dir: PathBuf,
    config: ReconcileConfig,
    store: ManifestStore,
    detector: ChangeDetector,
    transform: Arc<dyn Transform>,
    filter: Arc<dyn InputFilter>,
    delete_policy: Arc<dyn DeletePolicy>,
}

impl fmt::Debug for Reconciler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Reconciler")
            .field("input_dir", &self.input_dir)
            .field("output_dir", &self.output_dir)
            .field("config", &self.config)
            .field("manifest", &self.store.path())
            .field("transform", &"dyn Transform")
            .finish()
    }
}

impl Reconciler {
    pub fn new(
        input_dir: impl Into<PathBuf>,
        output_dir: impl Into<PathBuf>,
        transform: Arc<dyn Transform>,
    ) -> Self {
        let input_dir = input_dir.into();
        let config = ReconcileConfig::default();
        let store = ManifestStore::in_dir(&input_dir, &config.manifest_name);
        Self {
            input_dir,
            output_dir: output_dir.into(),
            detector: ChangeDetector::new(config.trust_metadata),
            config,
            store,
            transform,
            filter: Arc::new(ExtensionFilter::default()),
            delete_policy: Arc::new(ProtectedNames::default()),
        }
    }

    pub fn with_config(mut self, config: ReconcileConfig) -> Self {
        self.store = ManifestStore::in_dir(&self.input_dir, &config.manifest_name);
        self.detector = ChangeDetector::new(config.trust_metadata);
        self.config = config;
        self
    }

    pub fn with_filter(mut self, filter: Arc<dyn InputFilter>) -> Self {
        self.filter = filter;
        self
    }

    pub fn with_delete_policy(mut self, policy: Arc<dyn DeletePolicy>) -> Self {
        self.delete_policy = policy;
        self
    }

    pub fn input_dir(&self) -> &Path {
        &self.input_dir
    }

    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    pub fn config(&self) -> &ReconcileConfig {
        &self.config
    }

    pub fn store(&self) -> &ManifestStore {
        &self.store
    }

    /// Run one pass. Callers serialize passes through
    /// [`PassGuard`](crate::guard::PassGuard).
    pub fn run_pass(&self) -> Result<PassReport> {
        let started = Instant::now();
        let mode = self.config.scan_mode();
        let mut manifest = self.store.load();
        let entries = list_inputs(
            &self.input_dir,
            mode,
            self.filter.as_ref(),
            &self.config.manifest_name,
        )?;

        let mut seen: HashSet<String> = HashSet::with_capacity(entries.len());
        let mut report = PassReport::default();

        for entry in &entries {
            let output_name = output_name_for(&entry.name);
            let output_path = join_relative(&self.output_dir, &output_name);

            let record = manifest.get(&entry.name);
            if record.is_some() {
                seen.insert(entry.name.clone());
            }
            let detection = self.detector.detect(entry, record, || output_path.is_file());

            if !detection.verdict.needs_processing() {
                report.unchanged += 1;
                continue;
            }
            debug!(input = %entry.name, verdict = ?detection.verdict, "input needs processing");

            self.process(
                entry,
                output_name,
                &output_path,
                detection,
                &mut manifest,
                &mut seen,
                &mut report,
            );
        }

        report.pruned = manifest.retain_seen(&seen).len();
        report.deleted_outputs = sanitize_outputs(
            &self.output_dir,
            mode,
            &manifest,
            self.delete_policy.as_ref(),
        )?
        .len();
        self.store.persist(&manifest)?;

        report.elapsed = started.elapsed();
        info!(
            processed = report.processed,
            unchanged = report.unchanged,
            failed = report.failed,
            pruned = report.pruned,
            deleted = report.deleted_outputs,
            "reconciled {} in {:.2}s",
            self.input_dir.display(),
            report.elapsed.as_secs_f64()
        );
        Ok(report)
    }

    #[allow(clippy::too_many_arguments)]
    fn process(
        &self,
        entry: &InputEntry,
        output_name: String,
        output_path: &Path,
        detection: Detection,
        manifest: &mut Manifest,
        seen: &mut HashSet<String>,
        report: &mut PassReport,
    ) {
        if let Some(parent) = output_path.parent()
            && let Err(err) = fs::create_dir_all(parent)
        {
            warn!("cannot create {}: {}", parent.display(), err);
            withhold(manifest, seen, &entry.name, output_path);
            report.failed += 1;
            return;
        }

        info!("Generating: {}", entry.path.display());
        match self.transform.transform(output_path, &entry.path) {
            Ok(TransformOutcome::Produced { width, height }) if output_path.is_file() => {
                let content_hash = match detection.current_hash {
                    Some(hash) if !hash.is_empty() => hash,
                    _ => fingerprint(&entry.path),
                };
                manifest.upsert(FileRecord {
                    input_name: entry.name.clone(),
                    output_name,
                    content_hash,
                    size: entry.size,
                    modified_at: entry.modified_at,
                    processed_at: Utc::now(),
                    width,
                    height,
                });
                seen.insert(entry.name.clone());
                report.processed += 1;
            }
            Ok(TransformOutcome::Produced { .. }) => {
                warn!(
                    "transform reported success but {} is missing",
                    output_path.display()
                );
                withhold(manifest, seen, &entry.name, output_path);
                report.failed += 1;
            }
            Ok(TransformOutcome::InputMissing) => {
                debug!("{} vanished before processing", entry.path.display());
                seen.remove(&entry.name);
                report.vanished += 1;
            }
            Err(err) => {
                warn!("failed to process {}: {}", entry.path.display(), err);
                withhold(manifest, seen, &entry.name, output_path);
                report.failed += 1;
            }
        }
    }
}

/// Keep an existing record whose previous output is still on disk, but forget
/// its hash so the next pass retries the input. Without an output the record
/// is unseen and gets pruned.
fn withhold(
    manifest: &mut Manifest,
    seen: &mut HashSet<String>,
    input_name: &str,
    output_path: &Path,
) {
    match manifest.get_mut(input_name) {
        Some(record) if output_path.is_file() => record.content_hash.clear(),
        Some(_) => {
            seen.remove(input_name);
        }
        None => {}
    }
}
