//! Run summaries and exit codes
//!
//! Fatal errors never reach this module; everything here describes a run that
//! finished, fully or partially.

use anyhow::{Context, Result};
use dmx_track_core::pipeline::PipelineOutcome;
use dmx_track_core::{CacheStatus, FrameTable};
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

/// Every channel bound and accepted, nothing skipped
pub const EXIT_SUCCESS: i32 = 0;
/// Fatal error: nothing was built
pub const EXIT_FATAL: i32 = 1;
/// Run finished with unresolved, failed or skipped items
pub const EXIT_PARTIAL: i32 = 2;

/// Exit code for a finished run
pub fn exit_code(outcome: &PipelineOutcome) -> i32 {
    if outcome.is_clean() {
        EXIT_SUCCESS
    } else {
        EXIT_PARTIAL
    }
}

fn cache_label(status: CacheStatus) -> &'static str {
    match status {
        CacheStatus::Regenerated => "regenerated",
        CacheStatus::Reused => "reused",
        CacheStatus::Bypassed => "bypassed (regenerated)",
    }
}

/// Print the end-of-run summary
pub fn print_summary(outcome: &PipelineOutcome, frame_rate: f64) {
    let report = &outcome.report;
    let name = |index: usize| outcome.channel_names.get(index).map(String::as_str).unwrap_or("?");

    println!("═══════════════════════════════════════════════");
    println!("  DMX Track Build Summary");
    println!("═══════════════════════════════════════════════\n");

    println!("  Cache:       {}", cache_label(outcome.cache_status));
    println!(
        "  Frames:      {} ({:.2}s at {} fps)",
        report.frames_processed,
        report.frames_processed as f64 / frame_rate,
        frame_rate
    );
    println!("  Succeeded:   {}", report.channels_succeeded.len());
    println!("  Failed:      {}", report.channels_failed.len());
    println!("  Unresolved:  {}", report.channels_unresolved.len());
    println!("  Keyframes:   {}", report.keyframes_submitted);

    if !outcome.skipped_lines.is_empty() {
        println!("\n⚠️  Skipped source lines:");
        for skipped in &outcome.skipped_lines {
            println!("  line {}: invalid token {:?}", skipped.line_number, skipped.token);
        }
    }

    if !report.channels_unresolved.is_empty() {
        println!("\n⚠️  Unresolved channels:");
        for &index in &report.channels_unresolved {
            println!("  {} ({})", index, name(index));
        }
    }

    if !report.channels_failed.is_empty() {
        println!("\n✗ Failed channels:");
        for failure in &report.channels_failed {
            println!("  {} ({}): {}", failure.channel_index, name(failure.channel_index), failure.reason);
        }
    }

    if !report.missing_values.is_empty() {
        println!("\n⚠️  Missing values: {} keys skipped", report.missing_values.len());
        for missing in report.missing_values.iter().take(10) {
            println!("  channel {} frame {}", missing.channel_index, missing.frame_index);
        }
        if report.missing_values.len() > 10 {
            println!("  ... and {} more", report.missing_values.len() - 10);
        }
    }

    if let Some(channel) = report.cancelled_at {
        println!("\n⚠️  Build cancelled before channel {} ({})", channel, name(channel));
    }

    if outcome.is_clean() {
        println!("\n✓ All channels built");
    }
}

/// Write the build report as JSON
pub fn write_report_json(outcome: &PipelineOutcome, path: &Path) -> Result<()> {
    let file = File::create(path).with_context(|| format!("Failed to create report file: {:?}", path))?;
    let mut writer = BufWriter::new(file);
    serde_json::to_writer_pretty(&mut writer, &outcome.report)
        .with_context(|| format!("Failed to write report file: {:?}", path))?;
    writer.flush()?;
    log::debug!("Build report written to {:?}", path);
    Ok(())
}

/// Print per-channel statistics for a table
pub fn print_table_stats(table: &FrameTable, status: CacheStatus, frame_rate: f64) {
    println!("═══════════════════════════════════════════════");
    println!("  Frame Table");
    println!("═══════════════════════════════════════════════\n");

    println!("  Cache:     {}", cache_label(status));
    println!("  Channels:  {}", table.num_channels());
    println!(
        "  Frames:    {} ({:.2}s at {} fps)\n",
        table.num_frames(),
        table.num_frames() as f64 / frame_rate,
        frame_rate
    );

    println!("  {:<16} {:>8} {:>8} {:>8}", "channel", "min", "max", "mean");
    for (index, channel_name) in table.channel_names.iter().enumerate() {
        match table.channel_stats(index) {
            Some(s) => println!("  {:<16} {:>8.3} {:>8.3} {:>8.3}", channel_name, s.min, s.max, s.mean),
            None => println!("  {:<16} {:>8} {:>8} {:>8}", channel_name, "-", "-", "-"),
        }
    }
}
