//! Engine configuration.
//!
//! One `Config` travels with the context object; every component reads the
//! knobs it needs from it instead of from process-wide state.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// What to do with an `idx1` entry whose stream code names no declared stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IndexPolicy {
    /// Fail the open with `BadFormat`.
    #[default]
    Strict,
    /// Drop the entry and log a warning.
    Lenient,
}

/// Container implementations selectable by file extension.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContainerKind {
    Avi,
    Wav,
}

/// Engine configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Upper bound on the stream count declared in the main header.
    pub max_streams: u32,
    pub index_policy: IndexPolicy,
    /// Recompute sizes from the real file length when movie data is
    /// shorter than declared, instead of failing.
    pub recover_truncated: bool,
    /// Segment table growth step.
    pub segment_growth: usize,
    /// First payload byte marking a compressed frame as not-a-key-frame.
    pub not_key_frame_marker: u8,
    /// Bit depth of the default decode raster.
    pub default_output_bit_count: u16,
    /// Lower-case file extension to container implementation.
    pub extensions: BTreeMap<String, ContainerKind>,
}

impl Default for Config {
    fn default() -> Self {
        let mut extensions = BTreeMap::new();
        extensions.insert("avi".to_string(), ContainerKind::Avi);
        extensions.insert("wav".to_string(), ContainerKind::Wav);
        Config {
            max_streams: 8,
            index_policy: IndexPolicy::Strict,
            recover_truncated: true,
            segment_growth: 32,
            not_key_frame_marker: 0x01,
            default_output_bit_count: 24,
            extensions,
        }
    }
}

impl Config {
    /// Container implementation registered for a file extension.
    pub fn container_for_extension(&self, ext: &str) -> Option<ContainerKind> {
        self.extensions.get(&ext.to_ascii_lowercase()).copied()
    }
}
