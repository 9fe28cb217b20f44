//! Pipeline configuration types
//!
//! Everything a run needs (paths, arity, scaling, policies) travels in an
//! explicit [`PipelineConfig`]. There is no process-wide state.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;

/// Default number of channels in a source file
pub const DEFAULT_CHANNELS: usize = 64;

/// Default host frame rate (metadata only)
pub const DEFAULT_FRAME_RATE: f64 = 60.0;

/// Default multiplier from normalized intensity to host intensity units
pub const DEFAULT_SCALE_MULTIPLIER: f64 = 5000.0;

/// What the decoder does with a line containing a malformed token
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ErrorPolicy {
    /// Stop at the first malformed token and discard the partial table
    #[default]
    Abort,
    /// Log the line, drop it, and keep decoding
    SkipLine,
}

/// Configuration for decoding raw channel-intensity lines
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DecodeConfig {
    /// Number of tokens every data line must carry
    #[serde(default = "default_channels")]
    pub expected_arity: usize,

    /// Malformed token handling
    #[serde(default)]
    pub error_policy: ErrorPolicy,

    /// Optional explicit channel names (default: `light_<i>`)
    #[serde(default)]
    pub channel_names: Option<Vec<String>>,
}

fn default_channels() -> usize {
    DEFAULT_CHANNELS
}

fn default_frame_rate() -> f64 {
    DEFAULT_FRAME_RATE
}

fn default_multiplier() -> f64 {
    DEFAULT_SCALE_MULTIPLIER
}

impl Default for DecodeConfig {
    fn default() -> Self {
        Self {
            expected_arity: DEFAULT_CHANNELS,
            error_policy: ErrorPolicy::Abort,
            channel_names: None,
        }
    }
}

impl DecodeConfig {
    /// Create a decode configuration for the given channel count
    pub fn new(expected_arity: usize) -> Self {
        Self {
            expected_arity,
            ..Self::default()
        }
    }

    /// Builder method: set the malformed token policy
    pub fn with_error_policy(mut self, policy: ErrorPolicy) -> Self {
        self.error_policy = policy;
        self
    }

    /// Builder method: supply explicit channel names
    pub fn with_channel_names(mut self, names: Vec<String>) -> Self {
        self.channel_names = Some(names);
        self
    }
}

/// Scale multiplier applied to normalized values when building keyframes
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScaleConfig {
    /// Run-wide multiplier
    #[serde(default = "default_multiplier")]
    pub multiplier: f64,

    /// Per-channel overrides keyed by channel index
    #[serde(default)]
    pub overrides: BTreeMap<usize, f64>,
}

impl Default for ScaleConfig {
    fn default() -> Self {
        Self {
            multiplier: DEFAULT_SCALE_MULTIPLIER,
            overrides: BTreeMap::new(),
        }
    }
}

impl ScaleConfig {
    pub fn new(multiplier: f64) -> Self {
        Self {
            multiplier,
            overrides: BTreeMap::new(),
        }
    }

    /// Builder method: override the multiplier for one channel
    pub fn with_override(mut self, channel_index: usize, multiplier: f64) -> Self {
        self.overrides.insert(channel_index, multiplier);
        self
    }

    /// Multiplier in effect for a channel
    pub fn multiplier_for(&self, channel_index: usize) -> f64 {
        self.overrides
            .get(&channel_index)
            .copied()
            .unwrap_or(self.multiplier)
    }
}

/// Configuration for one end-to-end pipeline run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Raw channel-intensity source file
    pub source_path: PathBuf,

    /// Tabular cache file derived from the source
    pub cache_path: PathBuf,

    #[serde(default)]
    pub decode: DecodeConfig,

    #[serde(default)]
    pub scale: ScaleConfig,

    /// Host frame rate; carried through to sinks, never used for resampling
    #[serde(default = "default_frame_rate")]
    pub frame_rate: f64,

    /// Regenerate the cache even when it is fresh
    #[serde(default)]
    pub bypass_cache: bool,

    /// Build keyframe sequences for all channels in parallel
    #[serde(default)]
    pub parallel: bool,
}

impl PipelineConfig {
    /// Create a pipeline configuration with default settings
    pub fn new(source_path: impl Into<PathBuf>, cache_path: impl Into<PathBuf>) -> Self {
        Self {
            source_path: source_path.into(),
            cache_path: cache_path.into(),
            decode: DecodeConfig::default(),
            scale: ScaleConfig::default(),
            frame_rate: DEFAULT_FRAME_RATE,
            bypass_cache: false,
            parallel: false,
        }
    }

    /// Builder method: set the channel count
    pub fn with_channels(mut self, channels: usize) -> Self {
        self.decode.expected_arity = channels;
        self
    }

    /// Builder method: set the malformed token policy
    pub fn with_error_policy(mut self, policy: ErrorPolicy) -> Self {
        self.decode.error_policy = policy;
        self
    }

    /// Builder method: set the run-wide scale multiplier
    pub fn with_scale_multiplier(mut self, multiplier: f64) -> Self {
        self.scale.multiplier = multiplier;
        self
    }

    /// Builder method: set the frame rate metadata
    pub fn with_frame_rate(mut self, frame_rate: f64) -> Self {
        self.frame_rate = frame_rate;
        self
    }

    /// Builder method: force cache regeneration
    pub fn with_cache_bypass(mut self, bypass: bool) -> Self {
        self.bypass_cache = bypass;
        self
    }

    /// Builder method: enable parallel keyframe construction
    pub fn with_parallel(mut self, parallel: bool) -> Self {
        self.parallel = parallel;
        self
    }
}
