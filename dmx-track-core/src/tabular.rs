//! Tabular (CSV) encoding of frame tables
//!
//! Layout:
//!
//! ```text
//! frame,light_0,light_1
//! 0,1,0
//! 1,0,0.5019607843137255
//! ```
//!
//! Values are written with the shortest representation that parses back to
//! the identical `f64`, so a table survives a write/read cycle exactly.

use crate::types::{is_normalized, FrameTable, PipelineError, Result};
use std::fs::{self, File};
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::Path;
use tempfile::NamedTempFile;

/// Name of the leading index column
pub const FRAME_COLUMN: &str = "frame";

/// Encode a table to any writer
pub fn write_table<W: Write>(table: &FrameTable, writer: W) -> Result<()> {
    let mut csv_writer = csv::WriterBuilder::new()
        .delimiter(b',')
        .flexible(true)
        .from_writer(writer);

    let header = std::iter::once(FRAME_COLUMN).chain(table.channel_names.iter().map(String::as_str));
    csv_writer.write_record(header)?;

    let mut row = Vec::with_capacity(table.num_channels() + 1);
    for frame in &table.frames {
        row.clear();
        row.push(frame.index.to_string());
        row.extend(frame.values.iter().map(|v| v.to_string()));
        csv_writer.write_record(&row)?;
    }

    csv_writer.flush()?;
    Ok(())
}

/// Decode a table from any reader
///
/// Rows shorter than the header are kept as partial frames and logged; rows
/// wider than the header are a [`PipelineError::WidthMismatch`]. Values must
/// be finite and within [0.0, 1.0].
pub fn read_table<R: Read>(reader: R) -> Result<FrameTable> {
    let mut csv_reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .trim(csv::Trim::All)
        .from_reader(reader);

    let headers = csv_reader
        .headers()
        .map_err(|e| PipelineError::InvalidTable(format!("unreadable header: {}", e)))?
        .clone();

    let mut columns = headers.iter();
    match columns.next() {
        Some(FRAME_COLUMN) => {}
        other => {
            return Err(PipelineError::InvalidTable(format!(
                "expected leading '{}' column, found {:?}",
                FRAME_COLUMN, other
            )))
        }
    }

    let mut table = FrameTable::new(columns.map(str::to_string).collect())?;
    let width = table.num_channels();

    for record in csv_reader.records() {
        let record = record.map_err(|e| PipelineError::InvalidTable(e.to_string()))?;
        let line_number = record.position().map(|p| p.line() as usize).unwrap_or(0);

        let mut cells = record.iter();
        let index_cell = cells.next().unwrap_or_default();
        let index: usize = index_cell.parse().map_err(|_| {
            PipelineError::InvalidTable(format!(
                "line {}: frame index {:?} is not a non-negative integer",
                line_number, index_cell
            ))
        })?;
        if index != table.num_frames() {
            return Err(PipelineError::InvalidTable(format!(
                "line {}: frame index {} breaks the sequence (expected {})",
                line_number,
                index,
                table.num_frames()
            )));
        }

        let values = cells
            .map(|cell| match cell.parse::<f64>() {
                Ok(value) if is_normalized(value) => Ok(value),
                Ok(value) => Err(PipelineError::InvalidTable(format!(
                    "line {}: value {} is outside [0, 1]",
                    line_number, value
                ))),
                Err(_) => Err(PipelineError::InvalidTable(format!(
                    "line {}: value {:?} is not a number",
                    line_number, cell
                ))),
            })
            .collect::<Result<Vec<f64>>>()?;

        if values.len() > width {
            return Err(PipelineError::WidthMismatch {
                line_number,
                expected: width,
                actual: values.len(),
            });
        }
        if values.len() < width {
            log::warn!(
                "Frame {} carries {} of {} columns; missing channels will be skipped",
                index,
                values.len(),
                width
            );
        }

        table.push_unchecked(values);
    }

    Ok(table)
}

/// Write a table to a file, creating parent directories as needed
///
/// The file at `path` is replaced only once the whole table is on disk.
pub fn write_table_file(table: &FrameTable, path: &Path) -> Result<()> {
    persist_atomically(path, |file| write_table(table, BufWriter::new(file)))?;

    log::debug!(
        "Wrote {} frames x {} channels to {:?}",
        table.num_frames(),
        table.num_channels(),
        path
    );
    Ok(())
}

/// Write through a temporary sibling of `path`, renamed over it on success
///
/// If `write_fn` fails, `path` is left as it was and the temporary file is
/// removed.
pub(crate) fn persist_atomically<F>(path: &Path, write_fn: F) -> Result<()>
where
    F: FnOnce(&mut File) -> Result<()>,
{
    let parent = match path.parent().filter(|p| !p.as_os_str().is_empty()) {
        Some(parent) => {
            fs::create_dir_all(parent)?;
            parent
        }
        None => Path::new("."),
    };

    let mut temp = NamedTempFile::new_in(parent)?;
    write_fn(temp.as_file_mut())?;
    temp.as_file().sync_all()?;
    temp.persist(path).map_err(|e| e.error)?;
    Ok(())
}

/// Read a table from a file
pub fn read_table_file(path: &Path) -> Result<FrameTable> {
    let reader = BufReader::new(File::open(path)?);
    read_table(reader)
}
