//! Raw channel-intensity decoder
//!
//! Parses the line-oriented source format into a [`FrameTable`]:
//!
//! ```text
//! # comment
//! 255 0 12 ...
//! 0 128 255 ...
//! ```
//!
//! Comment and blank lines are ignored. Every data line must carry exactly
//! `expected_arity` integers in `0..=255`.

use crate::config::{DecodeConfig, ErrorPolicy};
use crate::types::{default_channel_names, FrameTable, NormalizedFrame, PipelineError, Result};
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

/// A data line dropped under [`ErrorPolicy::SkipLine`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SkippedLine {
    /// 1-based line number in the source
    pub line_number: usize,
    /// The offending token
    pub token: String,
}

/// Decoder for raw channel-intensity lines
pub struct FrameDecoder;

impl FrameDecoder {
    /// Decode lines into a frame table
    ///
    /// Skipped lines (only possible under [`ErrorPolicy::SkipLine`]) are
    /// logged; use [`FrameDecoder::decode_with_diagnostics`] to collect them.
    pub fn decode<I, S>(lines: I, config: &DecodeConfig) -> Result<FrameTable>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self::decode_with_diagnostics(lines, config).map(|(table, _)| table)
    }

    /// Decode lines into a frame table and return the lines that were skipped
    pub fn decode_with_diagnostics<I, S>(
        lines: I,
        config: &DecodeConfig,
    ) -> Result<(FrameTable, Vec<SkippedLine>)>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut table = Self::empty_table(config)?;
        let mut skipped = Vec::new();

        for (offset, line) in lines.into_iter().enumerate() {
            let line_number = offset + 1;
            match Self::decode_line(line.as_ref(), line_number, config.expected_arity) {
                Ok(Some(raw)) => {
                    let frame = NormalizedFrame::from_raw(table.num_frames(), &raw);
                    log::trace!("Decoded frame {} from line {}", frame.index, line_number);
                    table.frames.push(frame);
                }
                Ok(None) => continue,
                Err(PipelineError::Decode { line_number, token })
                    if config.error_policy == ErrorPolicy::SkipLine =>
                {
                    log::warn!(
                        "Skipping line {}: invalid token {:?} (expected 0..=255)",
                        line_number,
                        token
                    );
                    skipped.push(SkippedLine { line_number, token });
                }
                Err(e) => return Err(e),
            }
        }

        log::debug!(
            "Decoded {} frames of {} channels ({} lines skipped)",
            table.num_frames(),
            table.num_channels(),
            skipped.len()
        );

        Ok((table, skipped))
    }

    /// Read and decode a source file
    pub fn decode_file(path: &Path, config: &DecodeConfig) -> Result<(FrameTable, Vec<SkippedLine>)> {
        log::info!("Decoding source file: {:?}", path);

        if !path.exists() {
            return Err(PipelineError::SourceNotFound(path.to_path_buf()));
        }

        let reader = BufReader::new(File::open(path)?);
        let lines = reader.lines().collect::<std::io::Result<Vec<_>>>()?;

        Self::decode_with_diagnostics(lines, config)
    }

    /// Build the header for a fresh table
    fn empty_table(config: &DecodeConfig) -> Result<FrameTable> {
        let names = match &config.channel_names {
            Some(names) => {
                if names.len() != config.expected_arity {
                    return Err(PipelineError::InvalidTable(format!(
                        "{} channel names supplied for {} channels",
                        names.len(),
                        config.expected_arity
                    )));
                }
                names.clone()
            }
            None => default_channel_names(config.expected_arity),
        };
        FrameTable::new(names)
    }

    /// Decode one source line
    ///
    /// Returns `Ok(None)` for comment and blank lines.
    fn decode_line(line: &str, line_number: usize, expected_arity: usize) -> Result<Option<Vec<u8>>> {
        let trimmed = line.trim();
        if trimmed.is_empty() || trimmed.starts_with('#') {
            return Ok(None);
        }

        let tokens: Vec<&str> = trimmed.split_whitespace().collect();

        // Token errors take precedence over width errors
        let raw = tokens
            .iter()
            .map(|token| Self::parse_token(token, line_number))
            .collect::<Result<Vec<u8>>>()?;

        if raw.len() != expected_arity {
            return Err(PipelineError::WidthMismatch {
                line_number,
                expected: expected_arity,
                actual: raw.len(),
            });
        }

        Ok(Some(raw))
    }

    fn parse_token(token: &str, line_number: usize) -> Result<u8> {
        token
            .parse::<i64>()
            .ok()
            .and_then(|v| u8::try_from(v).ok())
            .ok_or_else(|| PipelineError::Decode {
                line_number,
                token: token.to_string(),
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn approx(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-9
    }

    #[test]
    fn test_decode_skips_comments_and_blank_lines() {
        let lines = ["255 0", "0 128", "# comment", "", "128 255"];
        let table = FrameDecoder::decode(lines, &DecodeConfig::new(2)).unwrap();

        assert_eq!(table.channel_names, vec!["light_0", "light_1"]);
        assert_eq!(table.num_frames(), 3);

        let expected = [[1.0, 0.0], [0.0, 128.0 / 255.0], [128.0 / 255.0, 1.0]];
        for (i, frame) in table.frames.iter().enumerate() {
            assert_eq!(frame.index, i);
            assert!(approx(frame.values[0], expected[i][0]));
            assert!(approx(frame.values[1], expected[i][1]));
        }
        assert!((table.frames[1].values[1] - 0.502).abs() < 0.001);
    }

    #[test]
    fn test_indented_comment_and_whitespace_only_lines() {
        let lines = ["   # indented", " \t ", "  1   2  "];
        let table = FrameDecoder::decode(lines, &DecodeConfig::new(2)).unwrap();
        assert_eq!(table.num_frames(), 1);
        assert!(approx(table.frames[0].values[1], 2.0 / 255.0));
    }

    #[test]
    fn test_abort_on_malformed_token() {
        let lines = ["1 2", "3 x", "4 5"];
        let err = FrameDecoder::decode(lines, &DecodeConfig::new(2)).unwrap_err();
        match err {
            PipelineError::Decode { line_number, token } => {
                assert_eq!(line_number, 2);
                assert_eq!(token, "x");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_out_of_range_tokens_rejected() {
        for bad in ["256", "-1", "1.5", "0x10"] {
            let line = format!("0 {}", bad);
            let result = FrameDecoder::decode([line.as_str()], &DecodeConfig::new(2));
            assert!(
                matches!(result, Err(PipelineError::Decode { line_number: 1, .. })),
                "token {bad} should be rejected"
            );
        }
    }

    #[test]
    fn test_skip_line_policy_keeps_numbering_contiguous() {
        let config = DecodeConfig::new(2).with_error_policy(ErrorPolicy::SkipLine);
        let lines = ["1 2", "# c", "3 999", "4 5"];
        let (table, skipped) = FrameDecoder::decode_with_diagnostics(lines, &config).unwrap();

        assert_eq!(table.num_frames(), 2);
        assert_eq!(table.frames[1].index, 1);
        assert!(approx(table.frames[1].values[0], 4.0 / 255.0));
        assert_eq!(
            skipped,
            vec![SkippedLine {
                line_number: 3,
                token: "999".to_string()
            }]
        );
    }

    #[test]
    fn test_width_mismatch_aborts_under_both_policies() {
        for policy in [ErrorPolicy::Abort, ErrorPolicy::SkipLine] {
            let config = DecodeConfig::new(3).with_error_policy(policy);
            let err = FrameDecoder::decode(["1 2 3", "1 2"], &config).unwrap_err();
            assert!(matches!(
                err,
                PipelineError::WidthMismatch {
                    line_number: 2,
                    expected: 3,
                    actual: 2
                }
            ));
        }
    }

    #[test]
    fn test_explicit_channel_names() {
        let config = DecodeConfig::new(2).with_channel_names(vec!["key".into(), "fill".into()]);
        let table = FrameDecoder::decode(["0 255"], &config).unwrap();
        assert_eq!(table.channel_names, vec!["key", "fill"]);

        let bad = DecodeConfig::new(3).with_channel_names(vec!["key".into()]);
        assert!(matches!(
            FrameDecoder::decode(["0 0 0"], &bad),
            Err(PipelineError::InvalidTable(_))
        ));
    }

    #[test]
    fn test_values_normalized_into_unit_range() {
        let lines: Vec<String> = (0..=255u32)
            .map(|v| format!("{} {}", v, 255 - v))
            .collect();
        let table = FrameDecoder::decode(&lines, &DecodeConfig::new(2)).unwrap();

        assert_eq!(table.num_frames(), 256);
        for (i, frame) in table.frames.iter().enumerate() {
            assert_eq!(frame.index, i);
            assert!(frame.values.iter().all(|v| (0.0..=1.0).contains(v)));
        }
    }

    #[test]
    fn test_decode_file_not_found() {
        let result = FrameDecoder::decode_file(Path::new("nonexistent.chan"), &DecodeConfig::new(2));
        assert!(matches!(result, Err(PipelineError::SourceNotFound(_))));
    }
}
