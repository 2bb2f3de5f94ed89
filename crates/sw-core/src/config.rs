//! Timing and presentation constants.
//!
//! Every value has a default matching the shipped extension; the structs
//! deserialize from camelCase JSON so a host can override any subset.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Interval between periodic full passes while a page is Active.
pub const DEFAULT_TICK_MS: u64 = 3_000;
/// Delay between a batch of added nodes and the pass it triggers.
pub const DEFAULT_SETTLE_MS: u64 = 100;
/// Popup status refresh cadence while visible.
pub const DEFAULT_REFRESH_MS: u64 = 1_200;

/// Page Suppressor timing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct SuppressorConfig {
    pub tick_ms: u64,
    pub settle_ms: u64,
}

impl SuppressorConfig {
    pub fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.tick_ms)
    }

    pub fn settle_delay(&self) -> Duration {
        Duration::from_millis(self.settle_ms)
    }
}

impl Default for SuppressorConfig {
    fn default() -> Self {
        Self {
            tick_ms: DEFAULT_TICK_MS,
            settle_ms: DEFAULT_SETTLE_MS,
        }
    }
}

/// Control Surface timing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct SurfaceConfig {
    pub refresh_ms: u64,
}

impl SurfaceConfig {
    pub fn refresh_interval(&self) -> Duration {
        Duration::from_millis(self.refresh_ms)
    }
}

impl Default for SurfaceConfig {
    fn default() -> Self {
        Self {
            refresh_ms: DEFAULT_REFRESH_MS,
        }
    }
}

/// Badge background colors.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct BadgeColors {
    /// Used while protection is enabled
    pub active: String,
    /// Used while protection is disabled; must differ from `active`
    pub inactive: String,
}

impl Default for BadgeColors {
    fn default() -> Self {
        Self {
            active: "#ff0000".to_string(),
            inactive: "#808080".to_string(),
        }
    }
}
