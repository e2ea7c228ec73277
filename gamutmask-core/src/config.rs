use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::scan::ScanMode;

/// File name of the manifest sidecar stored inside the input directory.
pub const DEFAULT_MANIFEST_NAME: &str = "_list.json";

/// Knobs for a single reconciliation pass.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReconcileConfig {
    /// Walk the whole input tree instead of only its direct children.
    pub recursive: bool,
    /// Skip re-hashing when size and modification time match the manifest.
    ///
    /// Off by default: a file rewritten with identical size and mtime is only
    /// caught by re-hashing.
    pub trust_metadata: bool,
    /// Manifest sidecar file name inside the input directory.
    pub manifest_name: String,
}

impl Default for ReconcileConfig {
    fn default() -> Self {
        Self {
            recursive: false,
            trust_metadata: false,
            manifest_name: DEFAULT_MANIFEST_NAME.to_string(),
        }
    }
}

impl ReconcileConfig {
    pub fn scan_mode(&self) -> ScanMode {
        if self.recursive {
            ScanMode::Recursive
        } else {
            ScanMode::Flat
        }
    }
}

/// Timers driving the watch controller.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct WatchConfig {
    /// Quiet period after the last filesystem event before a pass starts.
    pub debounce_ms: u64,
    /// Period of the safety-net pass that runs even without events.
    pub fallback_interval_ms: u64,
    /// Delay before the first pass after start-up.
    pub initial_delay_ms: u64,
}

impl Default for WatchConfig {
    fn default() -> Self {
        Self {
            debounce_ms: 2_000,
            fallback_interval_ms: 10_000,
            initial_delay_ms: 1_000,
        }
    }
}

impl WatchConfig {
    pub fn debounce(&self) -> Duration {
        Duration::from_millis(self.debounce_ms.max(1))
    }

    pub fn fallback_interval(&self) -> Duration {
        Duration::from_millis(self.fallback_interval_ms.max(1))
    }

    pub fn initial_delay(&self) -> Duration {
        Duration::from_millis(self.initial_delay_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_payload_keeps_defaults() {
        let cfg: WatchConfig = serde_json::from_str(r#"{"debounce_ms": 500}"#).unwrap();
        assert_eq!(cfg.debounce(), Duration::from_millis(500));
        assert_eq!(cfg.fallback_interval(), Duration::from_secs(10));

        let cfg: ReconcileConfig = serde_json::from_str(r#"{"recursive": true}"#).unwrap();
        assert_eq!(cfg.scan_mode(), ScanMode::Recursive);
        assert_eq!(cfg.manifest_name, DEFAULT_MANIFEST_NAME);
    }

    #[test]
    fn zero_durations_are_clamped() {
        let cfg = WatchConfig {
            debounce_ms: 0,
            fallback_interval_ms: 0,
            initial_delay_ms: 0,
        };
        assert_eq!(cfg.debounce(), Duration::from_millis(1));
        assert_eq!(cfg.fallback_interval(), Duration::from_millis(1));
        assert_eq!(cfg.initial_delay(), Duration::ZERO);
    }
}
