use std::path::PathBuf;

use clap::{ArgAction, Parser};

/// CLI entry point
#[derive(Parser, Debug, Clone, Default)]
#[command(name = "gamutmask")]
#[command(
    about = "Generates gamut-mask wheels for every image in a folder and keeps them in sync"
)]
pub struct Cli {
    /// Folder with source images (overrides config)
    #[arg(long, env = "GAMUTMASK_INPUT")]
    pub input: Option<PathBuf>,

    /// Folder receiving the generated wheels (overrides config)
    #[arg(long, env = "GAMUTMASK_OUTPUT")]
    pub output: Option<PathBuf>,

    /// Run a single pass and exit
    #[arg(long)]
    pub once: bool,

    /// Keep watching the input folder after the first pass. `--once` wins.
    #[arg(long, action = ArgAction::Set, default_value_t = true, value_name = "BOOL")]
    pub monitor: bool,

    /// Include sub-folders; outputs mirror the input tree
    #[arg(long)]
    pub recursive: bool,

    /// Wheel width in pixels
    #[arg(long)]
    pub width: Option<u32>,

    /// Wheel height in pixels
    #[arg(long)]
    pub height: Option<u32>,

    /// Horizontal gap between the wheel and the image edge
    #[arg(long)]
    pub padding_x: Option<u32>,

    /// Vertical gap between the wheel and the image edge
    #[arg(long)]
    pub padding_y: Option<u32>,

    /// Path to a gamutmask.toml
    #[arg(long, env = "GAMUTMASK_CONFIG")]
    pub config: Option<PathBuf>,

    /// Quiet period after the last change before a pass starts
    #[arg(long)]
    pub debounce_ms: Option<u64>,

    /// Period of the safety-net pass
    #[arg(long)]
    pub fallback_interval_ms: Option<u64>,

    /// Skip re-hashing inputs whose size and modification time are unchanged
    #[arg(long)]
    pub trust_metadata: bool,
}

impl Cli {
    /// Whether the process should keep watching after the first pass.
    pub fn keep_watching(&self) -> bool {
        self.monitor && !self.once
    }
}
