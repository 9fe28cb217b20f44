//! DMX Track Core Library
//!
//! Converts per-frame DMX channel intensities into per-channel keyframe
//! tracks for an external animation host.
//!
//! # Architecture
//!
//! The pipeline runs in four synchronous stages:
//! - Decode raw `0..=255` intensity lines into a normalized [`FrameTable`]
//! - Persist/reuse the table as a CSV cache, keyed on modification time
//! - Bind channel indices to host handles through a [`ChannelResolver`]
//! - Build one ordered keyframe track per bound channel and hand it to a
//!   [`TrackSink`]
//!
//! The library does NOT:
//! - Inspect the host scene (resolvers are injected)
//! - Create host tracks, sections or channels (sinks are injected)
//! - Resample or interpolate (frame `n` becomes keyframe `n`)
//!
//! # Example Usage
//!
//! ```no_run
//! use dmx_track_core::{pipeline, HostSinkError, Keyframe, PipelineConfig, TrackSink};
//!
//! struct PrintSink;
//!
//! impl TrackSink for PrintSink {
//!     type Handle = String;
//!
//!     fn create_track(&mut self, handle: &String, keys: &[Keyframe]) -> Result<(), HostSinkError> {
//!         println!("{}: {} keys", handle, keys.len());
//!         Ok(())
//!     }
//! }
//!
//! let config = PipelineConfig::new("DMX64.chan", "DMX64.csv").with_scale_multiplier(5000.0);
//! let mut resolver = |i: usize| Some(format!("PointLight{}", i));
//! let outcome = pipeline::run(&config, &mut resolver, &mut PrintSink, None).unwrap();
//! println!("{} tracks built", outcome.report.channels_succeeded.len());
//! ```

// Public modules
pub mod binder;
pub mod builder;
pub mod cache;
pub mod config;
pub mod decoder;
pub mod pipeline;
pub mod tabular;
pub mod types;

// Re-export main types for convenience
pub use binder::{bind, Binding, ChannelBindings, ChannelResolver, NameMapResolver};
pub use builder::{BuildReport, CancellationToken, ChannelFailure, MissingValue, TrackBuilder, TrackSink};
pub use cache::{CacheCoordinator, CacheDescriptor, CacheStatus};
pub use config::{DecodeConfig, ErrorPolicy, PipelineConfig, ScaleConfig};
pub use decoder::{FrameDecoder, SkippedLine};
pub use pipeline::PipelineOutcome;
pub use types::{
    ChannelStats, FrameTable, HostSinkError, Keyframe, NormalizedFrame, PipelineError, Result, Timestamp,
};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
