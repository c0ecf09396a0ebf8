//! Effect codec configuration.

use std::fs;
use std::io;
use std::path::Path;

use serde::{Deserialize, Serialize};

/// Default number of condition records reserved when pre-sizing a block
/// for the native side to fill.
pub const DEFAULT_MAX_CONDITION_AXES: usize = 32;

/// Sizing knobs for blocks the native side fills.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EffectCodecConfig {
    /// Condition records reserved by `allocate_empty`.  Devices with more
    /// axes need a larger value, or `allocate_for_axes`.
    pub max_condition_axes:     usize,
    /// Samples reserved for a custom force payload by `allocate_empty`.
    pub custom_sample_capacity: usize,
}

impl Default for EffectCodecConfig {
    fn default() -> Self {
        Self {
            max_condition_axes:     DEFAULT_MAX_CONDITION_AXES,
            custom_sample_capacity: 0,
        }
    }
}

impl EffectCodecConfig {
    pub fn from_json(bytes: &[u8]) -> Result<Self, serde_json::Error> {
        serde_json::from_slice(bytes)
    }

    pub fn from_json_file<P: AsRef<Path>>(path: P) -> io::Result<Self> {
        let bytes = fs::read(path)?;
        Self::from_json(&bytes).map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))
    }
}
