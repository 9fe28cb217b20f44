//! End-to-end pipeline: decode → cache → bind → build
//!
//! One call runs all stages synchronously. Fatal conditions surface as
//! [`PipelineError`](crate::types::PipelineError); everything recoverable ends
//! up in the returned [`PipelineOutcome`].

use crate::binder::{bind, ChannelResolver};
use crate::builder::{BuildReport, CancellationToken, TrackBuilder, TrackSink};
use crate::cache::{CacheCoordinator, CacheDescriptor, CacheStatus};
use crate::config::{DecodeConfig, PipelineConfig};
use crate::decoder::{FrameDecoder, SkippedLine};
use crate::types::{FrameTable, Result};
use std::path::Path;

/// Everything a finished run reports
#[derive(Debug, Clone)]
pub struct PipelineOutcome {
    pub report: BuildReport,
    pub cache_status: CacheStatus,
    /// Header of the table the tracks were built from
    pub channel_names: Vec<String>,
    /// Source lines dropped by the skip-line policy (empty when the cache was reused)
    pub skipped_lines: Vec<SkippedLine>,
}

impl PipelineOutcome {
    /// True when nothing was skipped, unresolved, rejected or cancelled
    pub fn is_clean(&self) -> bool {
        self.report.is_clean() && self.skipped_lines.is_empty()
    }
}

/// Load the frame table for `config`, going through the cache
///
/// A reused cache whose header disagrees with `config.decode` is regenerated
/// from the source. Without a source it is kept and the mismatch is logged.
pub fn load_table(config: &PipelineConfig) -> Result<(FrameTable, CacheStatus, Vec<SkippedLine>)> {
    let descriptor = CacheDescriptor::probe(&config.source_path, &config.cache_path)?;
    let mut skipped_lines = Vec::new();
    let mut decode = |source: &Path| -> Result<FrameTable> {
        let (table, skipped) = FrameDecoder::decode_file(source, &config.decode)?;
        skipped_lines = skipped;
        Ok(table)
    };

    let (mut table, mut status) = CacheCoordinator::new()
        .with_bypass(config.bypass_cache)
        .ensure_table(&descriptor, &mut decode)?;

    if status == CacheStatus::Reused && !header_matches(&table, &config.decode) {
        if descriptor.source_exists() {
            log::warn!(
                "Cached table {:?} has {} channels, expected {}; regenerating",
                descriptor.cache_path,
                table.num_channels(),
                config.decode.expected_arity
            );
            (table, _) = CacheCoordinator::new()
                .with_bypass(true)
                .ensure_table(&descriptor, &mut decode)?;
            status = CacheStatus::Regenerated;
        } else {
            log::warn!(
                "Cached table {:?} has {} channels, expected {}; source is gone, using it as is",
                descriptor.cache_path,
                table.num_channels(),
                config.decode.expected_arity
            );
        }
    }

    for frame_index in table.validate()? {
        log::warn!("Frame {} is narrower than the table header", frame_index);
    }

    log::info!(
        "Frame table ready ({:?}): {} frames x {} channels",
        status,
        table.num_frames(),
        table.num_channels()
    );

    Ok((table, status, skipped_lines))
}

/// Whether a table's header is what decoding with `decode` would produce
fn header_matches(table: &FrameTable, decode: &DecodeConfig) -> bool {
    match &decode.channel_names {
        Some(names) => table.channel_names == *names,
        None => table.num_channels() == decode.expected_arity,
    }
}

/// Run the whole pipeline
///
/// The resolver and sink must agree on the handle type. `cancel`, if given,
/// is checked between channels during the build.
pub fn run<R, S>(
    config: &PipelineConfig,
    resolver: &mut R,
    sink: &mut S,
    cancel: Option<CancellationToken>,
) -> Result<PipelineOutcome>
where
    R: ChannelResolver,
    R::Handle: Sync,
    S: TrackSink<Handle = R::Handle>,
{
    log::info!(
        "Pipeline start: {:?} -> {:?} ({} channels, {} fps, x{})",
        config.source_path,
        config.cache_path,
        config.decode.expected_arity,
        config.frame_rate,
        config.scale.multiplier
    );

    let (table, cache_status, skipped_lines) = load_table(config)?;
    let bindings = bind(&table.channel_names, resolver, &config.scale)?;

    let mut builder = TrackBuilder::new().with_parallel(config.parallel);
    if let Some(token) = cancel {
        builder = builder.with_cancellation(token);
    }
    let report = builder.build(&table, &bindings, sink);

    Ok(PipelineOutcome {
        report,
        cache_status,
        channel_names: table.channel_names,
        skipped_lines,
    })
}
