use serde::{Deserialize, Serialize};

use crate::location::{Coordinate, PositionOptions, WATCH_OPTIONS};

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
/// What to do with a known-good fix when a later reading fails
pub enum FallbackPolicy {
    /// Replace the coordinate with the fallback coordinate
    #[default]
    Overwrite,
    /// Keep the last successful coordinate, only the error is updated
    KeepLastFix,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
/// Settings for a [crate::LocationProvider]
pub struct ProviderSettings {
    /// Options passed to the position watch
    pub options: PositionOptions,
    /// Coordinate substituted when no reading is available
    pub fallback: Coordinate,
    pub policy: FallbackPolicy,
}

impl Default for ProviderSettings {
    fn default() -> Self {
        Self {
            options: WATCH_OPTIONS,
            fallback: Coordinate::FALLBACK,
            policy: FallbackPolicy::Overwrite,
        }
    }
}
