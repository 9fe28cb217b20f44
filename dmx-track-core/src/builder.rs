//! Keyframe track construction
//!
//! For every bound channel the builder turns the channel's column into an
//! ordered keyframe sequence and hands it to a [`TrackSink`]. Frame index `n`
//! becomes keyframe `n`; there is no resampling. Sink failures and missing
//! columns are recorded per channel and never stop the build.

use crate::binder::{Binding, ChannelBindings};
use crate::types::{FrameTable, HostSinkError, Keyframe};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Receives finished keyframe tracks
///
/// Creating whatever the host needs for a track (binding, section, channel)
/// is the sink's job; the builder sees one call per channel that either
/// succeeds or fails.
pub trait TrackSink {
    type Handle;

    fn create_track(&mut self, handle: &Self::Handle, keyframes: &[Keyframe]) -> Result<(), HostSinkError>;
}

/// Shared flag for aborting a build between channels
#[derive(Debug, Clone, Default)]
pub struct CancellationToken {
    cancelled: Arc<AtomicBool>,
}

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }
}

/// A channel whose track the sink rejected
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChannelFailure {
    pub channel_index: usize,
    pub reason: String,
}

/// A frame that lacked a bound channel's column
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MissingValue {
    pub channel_index: usize,
    pub frame_index: usize,
}

/// Summary of one build
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BuildReport {
    /// Frames in the table
    pub frames_processed: usize,
    /// Channels whose track was accepted by the sink
    pub channels_succeeded: Vec<usize>,
    /// Channels whose track the sink rejected
    pub channels_failed: Vec<ChannelFailure>,
    /// Channels with no host handle
    pub channels_unresolved: Vec<usize>,
    /// Frames skipped for a channel because its column was absent
    pub missing_values: Vec<MissingValue>,
    /// Keyframes accepted by the sink across all channels
    pub keyframes_submitted: usize,
    /// First channel not submitted because the build was cancelled
    pub cancelled_at: Option<usize>,
}

impl BuildReport {
    /// True when every channel was bound and accepted and nothing was skipped
    pub fn is_clean(&self) -> bool {
        self.channels_failed.is_empty()
            && self.channels_unresolved.is_empty()
            && self.missing_values.is_empty()
            && self.cancelled_at.is_none()
    }

    pub fn was_cancelled(&self) -> bool {
        self.cancelled_at.is_some()
    }
}

/// Builds and submits keyframe tracks
#[derive(Debug, Clone, Default)]
pub struct TrackBuilder {
    parallel: bool,
    cancel: Option<CancellationToken>,
}

impl TrackBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder method: compute keyframe sequences for all channels in parallel
    ///
    /// Submission order is unchanged; only keyframe construction is spread
    /// across threads.
    pub fn with_parallel(mut self, parallel: bool) -> Self {
        self.parallel = parallel;
        self
    }

    /// Builder method: check `token` before each channel submission
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = Some(token);
        self
    }

    /// Build a track for every binding and submit it to `sink`
    pub fn build<H, S>(&self, table: &FrameTable, bindings: &ChannelBindings<H>, sink: &mut S) -> BuildReport
    where
        H: Sync,
        S: TrackSink<Handle = H>,
    {
        let mut report = BuildReport {
            frames_processed: table.num_frames(),
            channels_unresolved: bindings.unresolved.clone(),
            ..BuildReport::default()
        };

        log::info!(
            "Building {} tracks over {} frames",
            bindings.len(),
            table.num_frames()
        );

        if self.parallel {
            let bound: Vec<&Binding<H>> = bindings.iter().collect();
            let tracks: Vec<ChannelTrack> = bound
                .par_iter()
                .map(|binding| channel_track(table, *binding))
                .collect();
            for (binding, track) in bound.into_iter().zip(tracks) {
                if !self.submit(binding, track, sink, &mut report) {
                    break;
                }
            }
        } else {
            for binding in bindings.iter() {
                let track = channel_track(table, binding);
                if !self.submit(binding, track, sink, &mut report) {
                    break;
                }
            }
        }

        log::info!(
            "Build finished: {} succeeded, {} failed, {} unresolved, {} keyframes",
            report.channels_succeeded.len(),
            report.channels_failed.len(),
            report.channels_unresolved.len(),
            report.keyframes_submitted
        );

        report
    }

    fn is_cancelled(&self) -> bool {
        self.cancel.as_ref().is_some_and(CancellationToken::is_cancelled)
    }

    /// Submit one channel and record the outcome
    ///
    /// Returns `false` if the build was cancelled before submission.
    fn submit<H, S>(&self, binding: &Binding<H>, track: ChannelTrack, sink: &mut S, report: &mut BuildReport) -> bool
    where
        S: TrackSink<Handle = H>,
    {
        if self.is_cancelled() {
            log::warn!("Build cancelled before channel {}", binding.channel_index);
            report.cancelled_at = Some(binding.channel_index);
            return false;
        }

        for &frame_index in &track.missing_frames {
            log::warn!(
                "Channel {} has no value in frame {}, skipping key",
                binding.channel_index,
                frame_index
            );
            report.missing_values.push(MissingValue {
                channel_index: binding.channel_index,
                frame_index,
            });
        }

        match sink.create_track(&binding.handle, &track.keyframes) {
            Ok(()) => {
                log::debug!(
                    "Channel {}: submitted {} keyframes",
                    binding.channel_index,
                    track.keyframes.len()
                );
                report.channels_succeeded.push(binding.channel_index);
                report.keyframes_submitted += track.keyframes.len();
            }
            Err(e) => {
                log::warn!("Channel {}: sink rejected track: {}", binding.channel_index, e);
                report.channels_failed.push(ChannelFailure {
                    channel_index: binding.channel_index,
                    reason: e.message,
                });
            }
        }
        true
    }
}

/// Keyframes for one channel plus the frames that lacked its column
struct ChannelTrack {
    keyframes: Vec<Keyframe>,
    missing_frames: Vec<usize>,
}

fn channel_track<H>(table: &FrameTable, binding: &Binding<H>) -> ChannelTrack {
    let mut keyframes = Vec::with_capacity(table.num_frames());
    let mut missing_frames = Vec::new();

    for frame in &table.frames {
        match frame.value(binding.channel_index) {
            Some(value) => keyframes.push(Keyframe {
                frame_index: frame.index,
                value: value * binding.scale_multiplier,
            }),
            None => missing_frames.push(frame.index),
        }
    }

    ChannelTrack {
        keyframes,
        missing_frames,
    }
}
