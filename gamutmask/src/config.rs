use std::fs;
use std::path::{Path, PathBuf};

use gamutmask_core::{ReconcileConfig, WatchConfig};
use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::cli::Cli;
use crate::mask::MaskSettings;

static DEFAULT_CONFIG_LOCATIONS: Lazy<Vec<PathBuf>> = Lazy::new(|| {
    vec![
        PathBuf::from("gamutmask.toml"),
        PathBuf::from("config/gamutmask.toml"),
    ]
});

pub const DEFAULT_INPUT_DIR: &str = "./_input";
pub const DEFAULT_OUTPUT_DIR: &str = "./_output";

/// Raw configuration as defined in a TOML file.
#[derive(Debug, Default, Clone, Deserialize, Serialize)]
#[serde(rename_all = "snake_case", deny_unknown_fields)]
pub struct FileConfig {
    #[serde(default)]
    pub paths: FilePathsConfig,
    #[serde(default)]
    pub watch: FileWatchConfig,
    #[serde(default)]
    pub reconcile: FileReconcileConfig,
    #[serde(default)]
    pub mask: FileMaskConfig,
}

#[derive(Debug, Default, Clone, Deserialize, Serialize)]
pub struct FilePathsConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub input: Option<PathBuf>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output: Option<PathBuf>,
}

#[derive(Debug, Default, Clone, Deserialize, Serialize)]
pub struct FileWatchConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub monitor: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub debounce_ms: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fallback_interval_ms: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub initial_delay_ms: Option<u64>,
}

#[derive(Debug, Default, Clone, Deserialize, Serialize)]
pub struct FileReconcileConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub recursive: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub trust_metadata: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub manifest_name: Option<String>,
}

#[derive(Debug, Default, Clone, Deserialize, Serialize)]
pub struct FileMaskConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub width: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub height: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub padding_x: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub padding_y: Option<u32>,
}

/// Effective settings after merging CLI flags, the config file and defaults.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppConfig {
    pub input_dir: PathBuf,
    pub output_dir: PathBuf,
    pub monitor: bool,
    pub watch: WatchConfig,
    pub reconcile: ReconcileConfig,
    pub mask: MaskSettings,
    /// File the settings were read from, if any.
    pub source: Option<PathBuf>,
}

#[derive(Debug, Error)]
pub enum ConfigLoadError {
    #[error("configuration file missing: {}", .path.display())]
    MissingConfig { path: PathBuf },
    #[error("failed to read configuration {}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse configuration {}", .path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
    #[error("invalid mask geometry: {0}")]
    InvalidMask(String),
    #[error("manifest name must be a plain file name, got '{0}'")]
    InvalidManifestName(String),
}

#[derive(Debug)]
pub struct ConfigLoader {
    config_path: Option<PathBuf>,
    search_defaults: bool,
}

impl Default for ConfigLoader {
    fn default() -> Self {
        Self::new()
    }
}

impl ConfigLoader {
    pub fn new() -> Self {
        Self {
            config_path: None,
            search_defaults: true,
        }
    }

    /// Read exactly this file; a missing file is an error.
    pub fn with_config_path<P: Into<PathBuf>>(mut self, path: P) -> Self {
        self.config_path = Some(path.into());
        self
    }

    /// Skip probing the default locations when no explicit path is set.
    pub fn without_default_locations(mut self) -> Self {
        self.search_defaults = false;
        self
    }

    pub fn load(&self, cli: &Cli) -> Result<AppConfig, ConfigLoadError> {
        let (file, source) = self.load_file_config()?;
        compose(cli, file, source)
    }

    fn load_file_config(&self) -> Result<(FileConfig, Option<PathBuf>), ConfigLoadError> {
        let path = match &self.config_path {
            Some(explicit) => {
                if !explicit.exists() {
                    return Err(ConfigLoadError::MissingConfig {
                        path: explicit.clone(),
                    });
                }
                explicit.clone()
            }
            None if self.search_defaults => match DEFAULT_CONFIG_LOCATIONS
                .iter()
                .find(|candidate| candidate.exists())
            {
                Some(found) => found.clone(),
                None => return Ok((FileConfig::default(), None)),
            },
            None => return Ok((FileConfig::default(), None)),
        };

        let file = read_file_config(&path)?;
        Ok((file, Some(path)))
    }
}

fn read_file_config(path: &Path) -> Result<FileConfig, ConfigLoadError> {
    let contents = fs::read_to_string(path).map_err(|err| ConfigLoadError::Io {
        path: path.to_path_buf(),
        source: err,
    })?;
    toml::from_str(&contents).map_err(|err| ConfigLoadError::Parse {
        path: path.to_path_buf(),
        source: err,
    })
}

fn compose(
    cli: &Cli,
    file: FileConfig,
    source: Option<PathBuf>,
) -> Result<AppConfig, ConfigLoadError> {
    let FileConfig {
        paths,
        watch: file_watch,
        reconcile: file_reconcile,
        mask: file_mask,
    } = file;

    let watch_defaults = WatchConfig::default();
    let watch = WatchConfig {
        debounce_ms: cli
            .debounce_ms
            .or(file_watch.debounce_ms)
            .unwrap_or(watch_defaults.debounce_ms),
        fallback_interval_ms: cli
            .fallback_interval_ms
            .or(file_watch.fallback_interval_ms)
            .unwrap_or(watch_defaults.fallback_interval_ms),
        initial_delay_ms: file_watch
            .initial_delay_ms
            .unwrap_or(watch_defaults.initial_delay_ms),
    };

    let reconcile_defaults = ReconcileConfig::default();
    let reconcile = ReconcileConfig {
        recursive: cli.recursive || file_reconcile.recursive.unwrap_or(false),
        trust_metadata: cli.trust_metadata || file_reconcile.trust_metadata.unwrap_or(false),
        manifest_name: file_reconcile
            .manifest_name
            .unwrap_or(reconcile_defaults.manifest_name),
    };
    validate_manifest_name(&reconcile.manifest_name)?;

    let mask_defaults = MaskSettings::default();
    let mask = MaskSettings {
        width: cli.width.or(file_mask.width).unwrap_or(mask_defaults.width),
        height: cli.height.or(file_mask.height).unwrap_or(mask_defaults.height),
        padding_x: cli
            .padding_x
            .or(file_mask.padding_x)
            .unwrap_or(mask_defaults.padding_x),
        padding_y: cli
            .padding_y
            .or(file_mask.padding_y)
            .unwrap_or(mask_defaults.padding_y),
    };
    mask.validate().map_err(ConfigLoadError::InvalidMask)?;

    let monitor = if cli.once {
        false
    } else {
        cli.monitor && file_watch.monitor.unwrap_or(true)
    };

    Ok(AppConfig {
        input_dir: cli
            .input
            .clone()
            .or(paths.input)
            .unwrap_or_else(|| PathBuf::from(DEFAULT_INPUT_DIR)),
        output_dir: cli
            .output
            .clone()
            .or(paths.output)
            .unwrap_or_else(|| PathBuf::from(DEFAULT_OUTPUT_DIR)),
        monitor,
        watch,
        reconcile,
        mask,
        source,
    })
}

fn validate_manifest_name(name: &str) -> Result<(), ConfigLoadError> {
    let plain = !name.is_empty()
        && !name.contains(['/', '\\'])
        && name != "."
        && name != "..";
    if plain {
        Ok(())
    } else {
        Err(ConfigLoadError::InvalidManifestName(name.to_string()))
    }
}
