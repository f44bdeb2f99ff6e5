//! `[store]` section configuration.
//!
//! Contains persistence settings for widget state.

use super::defaults;
use crate::store::FlushTiming;
use educe::Educe;
use serde::{Deserialize, Serialize};
use std::{path::PathBuf, time::Duration};

/// `[store]` section in sheetblocks.toml - widget state persistence.
///
/// # Example
/// ```toml
/// [store]
/// path = "~/.local/share/sheetblocks/state.json"
/// debounce_ms = 200    # quiet period before a write
/// max_delay_ms = 1000  # upper bound while writes keep coming
/// ```
#[derive(Debug, Clone, Educe, Serialize, Deserialize)]
#[educe(Default)]
#[serde(deny_unknown_fields)]
pub struct StoreConfig {
    /// State file, relative to the project root. `~` is expanded.
    #[serde(default = "defaults::store::path")]
    #[educe(Default = defaults::store::path())]
    pub path: PathBuf,

    #[serde(default = "defaults::store::debounce_ms")]
    #[educe(Default = defaults::store::debounce_ms())]
    pub debounce_ms: u64,

    #[serde(default = "defaults::store::max_delay_ms")]
    #[educe(Default = defaults::store::max_delay_ms())]
    pub max_delay_ms: u64,
}

impl StoreConfig {
    pub fn timing(&self) -> FlushTiming {
        FlushTiming {
            debounce: Duration::from_millis(self.debounce_ms),
            max_delay: Duration::from_millis(self.max_delay_ms),
        }
    }
}
