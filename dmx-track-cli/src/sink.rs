//! JSON export sink
//!
//! Stands in for an animation host: each accepted track is collected and the
//! whole set is written as one JSON document that a host-side importer can
//! replay into its own sequence/track objects.

use anyhow::{Context, Result};
use dmx_track_core::{HostSinkError, Keyframe, TrackSink};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

/// One exported track
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExportedTrack {
    pub target: String,
    pub keyframes: Vec<Keyframe>,
}

/// The written document
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrackExport {
    pub frame_rate: f64,
    pub tracks: Vec<ExportedTrack>,
}

/// Collects tracks keyed by host target path
pub struct JsonExportSink {
    frame_rate: f64,
    seen: HashSet<String>,
    tracks: Vec<ExportedTrack>,
}

impl JsonExportSink {
    pub fn new(frame_rate: f64) -> Self {
        Self {
            frame_rate,
            seen: HashSet::new(),
            tracks: Vec::new(),
        }
    }

    pub fn into_export(self) -> TrackExport {
        TrackExport {
            frame_rate: self.frame_rate,
            tracks: self.tracks,
        }
    }

    /// Write all collected tracks to `path`
    pub fn write_to(self, path: &Path) -> Result<usize> {
        let export = self.into_export();
        let file = File::create(path).with_context(|| format!("Failed to create tracks file: {:?}", path))?;
        let mut writer = BufWriter::new(file);
        serde_json::to_writer_pretty(&mut writer, &export)
            .with_context(|| format!("Failed to write tracks file: {:?}", path))?;
        writer.flush()?;

        log::info!("Wrote {} tracks to {:?}", export.tracks.len(), path);
        Ok(export.tracks.len())
    }
}

impl TrackSink for JsonExportSink {
    type Handle = String;

    fn create_track(&mut self, handle: &String, keyframes: &[Keyframe]) -> std::result::Result<(), HostSinkError> {
        // Two channels driving one property would overwrite each other
        if !self.seen.insert(handle.clone()) {
            return Err(HostSinkError::new(format!("target '{}' already has a track", handle)));
        }

        self.tracks.push(ExportedTrack {
            target: handle.clone(),
            keyframes: keyframes.to_vec(),
        });
        Ok(())
    }
}
