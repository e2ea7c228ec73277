//! # Gamutmask Core
//!
//! Incremental reconciliation engine behind the `gamutmask` tool. It keeps an
//! output directory in sync with an input directory by running a pluggable
//! [`Transform`] only on inputs that changed since the last pass.
//!
//! ## Overview
//!
//! - **Manifest**: a JSON sidecar (`_list.json`) inside the input directory
//!   recording what was processed ([`manifest`])
//! - **Change detection**: size, modification time and a content fingerprint
//!   decide whether an input is stale ([`detect`], [`fingerprint`])
//! - **Passes**: list → detect → transform → prune → sanitize → persist
//!   ([`reconcile`], [`sanitize`])
//! - **Exclusion**: at most one pass at a time per process ([`guard`])
//! - **Watching**: debounced filesystem events plus a fallback ticker drive
//!   passes ([`watch`])
//!
//! ## Example
//!
//! ```no_run
//! use std::path::Path;
//! use std::sync::Arc;
//!
//! use gamutmask_core::{Reconciler, Transform, TransformError, TransformOutcome};
//!
//! struct Duplicate;
//!
//! impl Transform for Duplicate {
//!     fn transform(
//!         &self,
//!         output: &Path,
//!         input: &Path,
//!     ) -> Result<TransformOutcome, TransformError> {
//!         std::fs::copy(input, output).map_err(|source| TransformError::Read {
//!             path: input.to_path_buf(),
//!             source,
//!         })?;
//!         Ok(TransformOutcome::Produced { width: 0, height: 0 })
//!     }
//! }
//!
//! let reconciler = Reconciler::new("./_input", "./_output", Arc::new(Duplicate));
//! let report = reconciler.run_pass()?;
//! println!("processed {}", report.processed);
//! # Ok::<(), gamutmask_core::GamutError>(())
//! ```

pub mod config;
pub mod detect;
pub mod error;
pub mod fingerprint;
pub mod guard;
pub mod manifest;
pub mod pipeline;
pub mod reconcile;
pub mod sanitize;
pub mod scan;
pub mod watch;

pub use config::{DEFAULT_MANIFEST_NAME, ReconcileConfig, WatchConfig};
pub use detect::{ChangeDetector, Detection, Verdict};
pub use error::{GamutError, Result, TransformError};
pub use fingerprint::fingerprint;
pub use guard::{GuardedReconciler, PassGuard, PassRunner};
pub use manifest::{FileRecord, Manifest, ManifestStore, is_sidecar_name};
pub use pipeline::{
    DeletePolicy, ExtensionFilter, InputFilter, ProtectedNames, Transform, TransformOutcome,
    output_name_for,
};
pub use reconcile::{PassReport, Reconciler};
pub use sanitize::sanitize_outputs;
pub use scan::{InputEntry, ScanMode, list_inputs};
pub use watch::{ControllerState, ControllerSummary, WatchController, WatchMessage};
