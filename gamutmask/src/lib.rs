//! # Gamutmask
//!
//! Watches a folder of images and keeps a second folder filled with one
//! gamut-mask wheel per image. Reconciliation, change detection and the watch
//! loop live in `gamutmask-core`; this crate adds the wheel renderer, the
//! CLI and configuration loading.

pub mod app;
pub mod cli;
pub mod config;
pub mod mask;

pub use cli::Cli;
pub use config::{AppConfig, ConfigLoadError, ConfigLoader};
pub use mask::{GamutMaskTransform, MaskSettings, generate_gamut_mask};
