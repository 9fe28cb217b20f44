//! Core types for the DMX track pipeline
//!
//! This module defines the data that flows between pipeline stages: normalized
//! frames, the frame table, keyframes, and the error taxonomy. Raw intensity
//! values never leave the decoder; everything downstream sees values in [0, 1].

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;
use std::path::PathBuf;

/// Timestamp type used for file modification times
pub type Timestamp = DateTime<Utc>;

/// Result type for pipeline operations
pub type Result<T> = std::result::Result<T, PipelineError>;

/// Largest raw channel intensity (one DMX slot)
pub const RAW_MAX: u8 = 255;

/// Errors that abort a pipeline run
///
/// Recoverable conditions (sink failures, missing columns, unresolved channels)
/// are not errors at this level; they are accumulated into a `BuildReport`.
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error("Invalid token {token:?} on line {line_number}: expected an integer in 0..=255")]
    Decode { line_number: usize, token: String },

    #[error("Width mismatch on line {line_number}: expected {expected} channels, found {actual}")]
    WidthMismatch {
        line_number: usize,
        expected: usize,
        actual: usize,
    },

    #[error("Source file not found and no valid cache exists: {0:?}")]
    SourceNotFound(PathBuf),

    #[error("Cache file {path:?} is unreadable: {reason}")]
    CacheUnreadable { path: PathBuf, reason: String },

    #[error("Invalid frame table: {0}")]
    InvalidTable(String),

    #[error("No channels could be bound (0 of {channels} resolved)")]
    NoBindings { channels: usize },

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Failure reported by an external track sink for a single channel
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, thiserror::Error)]
#[error("{message}")]
pub struct HostSinkError {
    pub message: String,
}

impl HostSinkError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// One frame of channel intensities scaled into [0.0, 1.0]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NormalizedFrame {
    /// Zero-based position of this frame in its table
    pub index: usize,
    /// One value per channel, in channel order
    pub values: Vec<f64>,
}

impl NormalizedFrame {
    /// Normalize raw 0..=255 intensities
    pub fn from_raw(index: usize, raw: &[u8]) -> Self {
        Self {
            index,
            values: raw.iter().map(|&v| v as f64 / RAW_MAX as f64).collect(),
        }
    }

    /// Value of one channel, if the column is present in this frame
    pub fn value(&self, channel_index: usize) -> Option<f64> {
        self.values.get(channel_index).copied()
    }

    pub fn arity(&self) -> usize {
        self.values.len()
    }
}

/// Ordered collection of normalized frames with channel header metadata
///
/// Frames are appended through [`FrameTable::push_values`], which assigns the
/// next contiguous index and enforces the header arity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FrameTable {
    pub channel_names: Vec<String>,
    pub frames: Vec<NormalizedFrame>,
}

impl FrameTable {
    /// Create an empty table, rejecting duplicate channel names
    pub fn new(channel_names: Vec<String>) -> Result<Self> {
        let mut seen = HashSet::with_capacity(channel_names.len());
        for name in &channel_names {
            if !seen.insert(name.as_str()) {
                return Err(PipelineError::InvalidTable(format!(
                    "duplicate channel name '{}'",
                    name
                )));
            }
        }

        Ok(Self {
            channel_names,
            frames: Vec::new(),
        })
    }

    /// Create an empty table with synthesized `light_<i>` channel names
    pub fn with_default_names(arity: usize) -> Self {
        Self {
            channel_names: default_channel_names(arity),
            frames: Vec::new(),
        }
    }

    /// Number of channels declared by the header
    pub fn num_channels(&self) -> usize {
        self.channel_names.len()
    }

    pub fn num_frames(&self) -> usize {
        self.frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    /// Append a full-width frame and return its index
    pub fn push_values(&mut self, values: Vec<f64>) -> Result<usize> {
        if values.len() != self.num_channels() {
            return Err(PipelineError::InvalidTable(format!(
                "frame {} has {} values, header declares {} channels",
                self.frames.len(),
                values.len(),
                self.num_channels()
            )));
        }
        Ok(self.push_unchecked(values))
    }

    /// Append a frame without checking its width against the header
    ///
    /// Used when reading back tabular data where trailing columns may be lost.
    pub(crate) fn push_unchecked(&mut self, values: Vec<f64>) -> usize {
        let index = self.frames.len();
        self.frames.push(NormalizedFrame { index, values });
        index
    }

    /// Check the structural invariants of the table
    ///
    /// Indices must be contiguous from zero, no frame may be wider than the
    /// header, and every value must lie in [0.0, 1.0]. Returns the indices of
    /// frames narrower than the header.
    pub fn validate(&self) -> Result<Vec<usize>> {
        let mut partial = Vec::new();
        for (position, frame) in self.frames.iter().enumerate() {
            if frame.index != position {
                return Err(PipelineError::InvalidTable(format!(
                    "frame at position {} has index {}",
                    position, frame.index
                )));
            }
            if frame.arity() > self.num_channels() {
                return Err(PipelineError::InvalidTable(format!(
                    "frame {} has {} values, header declares {} channels",
                    frame.index,
                    frame.arity(),
                    self.num_channels()
                )));
            }
            if let Some(value) = frame.values.iter().find(|v| !is_normalized(**v)) {
                return Err(PipelineError::InvalidTable(format!(
                    "frame {} carries value {} outside [0, 1]",
                    frame.index, value
                )));
            }
            if frame.arity() < self.num_channels() {
                partial.push(frame.index);
            }
        }
        Ok(partial)
    }

    /// Summary statistics for one channel over all frames that carry it
    pub fn channel_stats(&self, channel_index: usize) -> Option<ChannelStats> {
        let mut stats: Option<ChannelStats> = None;
        for value in self.frames.iter().filter_map(|f| f.value(channel_index)) {
            let s = stats.get_or_insert(ChannelStats {
                min: value,
                max: value,
                mean: 0.0,
                samples: 0,
            });
            s.min = s.min.min(value);
            s.max = s.max.max(value);
            s.mean += value;
            s.samples += 1;
        }
        stats.map(|mut s| {
            s.mean /= s.samples as f64;
            s
        })
    }
}

/// True for finite values in [0.0, 1.0]
pub fn is_normalized(value: f64) -> bool {
    (0.0..=1.0).contains(&value)
}

/// Per-channel summary used by table inspection
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ChannelStats {
    pub min: f64,
    pub max: f64,
    pub mean: f64,
    pub samples: usize,
}

/// Synthesize `light_0 .. light_{arity-1}`
pub fn default_channel_names(arity: usize) -> Vec<String> {
    (0..arity).map(|i| format!("light_{}", i)).collect()
}

/// A single (frame, value) key submitted to an animation track
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Keyframe {
    pub frame_index: usize,
    pub value: f64,
}

impl fmt::Display for Keyframe {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{:.3}", self.frame_index, self.value)
    }
}
