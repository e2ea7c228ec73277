//! Collaborator seams of the reconciliation engine.
//!
//! The engine never looks at pixels. It hands each stale input to a
//! [`Transform`], asks an [`InputFilter`] which files are eligible, and asks a
//! [`DeletePolicy`] before removing anything from the output directory.

use std::path::Path;

use crate::error::TransformError;

/// Result of a successful transform invocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransformOutcome {
    /// The artifact was written; dimensions are informational only.
    Produced { width: u32, height: u32 },
    /// The input disappeared before it could be read. Nothing was written.
    InputMissing,
}

/// Derives one output artifact from one input file.
///
/// Implementations capture their own settings (size, padding, ...). They must
/// tolerate an input path that no longer exists by returning
/// [`TransformOutcome::InputMissing`].
pub trait Transform: Send + Sync {
    fn transform(&self, output: &Path, input: &Path) -> Result<TransformOutcome, TransformError>;
}

/// Decides whether a directory entry takes part in the pipeline.
pub trait InputFilter: Send + Sync {
    fn accepts(&self, directory: &Path, file_name: &str) -> bool;
}

impl<F> InputFilter for F
where
    F: Fn(&Path, &str) -> bool + Send + Sync,
{
    fn accepts(&self, directory: &Path, file_name: &str) -> bool {
        self(directory, file_name)
    }
}

/// Consulted before every deletion in the output directory. Returning `false`
/// protects the file.
pub trait DeletePolicy: Send + Sync {
    fn confirm(&self, directory: &Path, file_name: &str) -> bool;
}

impl<F> DeletePolicy for F
where
    F: Fn(&Path, &str) -> bool + Send + Sync,
{
    fn confirm(&self, directory: &Path, file_name: &str) -> bool {
        self(directory, file_name)
    }
}

/// Case-insensitive extension whitelist.
#[derive(Debug, Clone)]
pub struct ExtensionFilter {
    extensions: Vec<String>,
}

impl ExtensionFilter {
    pub fn new<I, S>(extensions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            extensions: extensions
                .into_iter()
                .map(|ext| ext.as_ref().trim_start_matches('.').to_ascii_lowercase())
                .collect(),
        }
    }
}

impl Default for ExtensionFilter {
    /// Raster formats the gamut mask can decode.
    fn default() -> Self {
        Self::new(["jpg", "jpeg", "png"])
    }
}

impl InputFilter for ExtensionFilter {
    fn accepts(&self, _directory: &Path, file_name: &str) -> bool {
        Path::new(file_name)
            .extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| {
                let ext = ext.to_ascii_lowercase();
                self.extensions.iter().any(|allowed| *allowed == ext)
            })
    }
}

/// Protects a fixed set of file names from deletion.
#[derive(Debug, Clone)]
pub struct ProtectedNames {
    names: Vec<String>,
}

impl ProtectedNames {
    pub fn new<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            names: names.into_iter().map(Into::into).collect(),
        }
    }
}

impl Default for ProtectedNames {
    /// Keeps the version-control placeholder of an otherwise empty directory.
    fn default() -> Self {
        Self::new([".gitignore"])
    }
}

impl DeletePolicy for ProtectedNames {
    fn confirm(&self, _directory: &Path, file_name: &str) -> bool {
        !self.names.iter().any(|name| name == file_name)
    }
}

/// Output artifact name for an input: the input name with `.png` appended.
pub fn output_name_for(input_name: &str) -> String {
    format!("{input_name}.png")
}
