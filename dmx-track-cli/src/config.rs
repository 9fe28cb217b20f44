//! Configuration loading and merging
//!
//! Settings come from an optional `config.toml` and are overridden by command
//! line flags. The result is a [`RunSettings`] holding the core
//! `PipelineConfig` plus CLI-only concerns (output paths, bindings).

use anyhow::{bail, Context, Result};
use dmx_track_core::binder::DEFAULT_LABEL_PATTERN;
use dmx_track_core::config::{DEFAULT_CHANNELS, DEFAULT_FRAME_RATE, DEFAULT_SCALE_MULTIPLIER};
use dmx_track_core::{ErrorPolicy, PipelineConfig};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::path::{Path, PathBuf};

use crate::Args;

/// Main application configuration (loaded from config.toml)
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct AppConfig {
    #[serde(default)]
    pub input: InputConfig,
    #[serde(default)]
    pub tracks: TracksConfig,
    #[serde(default)]
    pub bindings: BindingsConfig,
    #[serde(default)]
    pub output: OutputConfig,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct InputConfig {
    pub source: Option<PathBuf>,
    pub cache: Option<PathBuf>,
    pub channels: Option<usize>,
    pub on_error: Option<ErrorPolicy>,
    pub channel_names: Option<Vec<String>>,
    #[serde(default)]
    pub no_cache: bool,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct TracksConfig {
    pub frame_rate: Option<f64>,
    pub scale: Option<f64>,
    /// Per-channel multipliers keyed by channel index ("3" = 2500.0)
    #[serde(default)]
    pub scale_overrides: BTreeMap<String, f64>,
    #[serde(default)]
    pub parallel: bool,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct BindingsConfig {
    /// Label pattern; `{i}` is replaced by the channel index
    pub label_pattern: Option<String>,
    /// JSON file mapping labels to host targets
    pub file: Option<PathBuf>,
    /// Inline label → target entries
    #[serde(default)]
    pub targets: HashMap<String, String>,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct OutputConfig {
    /// Where to write exported tracks (default: `<source>.tracks.json`)
    pub tracks: Option<PathBuf>,
    /// Where to write the build report as JSON
    pub report: Option<PathBuf>,
}

/// Fully merged settings for one invocation
#[derive(Debug, Clone)]
pub struct RunSettings {
    pub pipeline: PipelineConfig,
    pub label_pattern: String,
    /// Label → target map; `None` binds every channel to its own label
    pub targets: Option<HashMap<String, String>>,
    pub tracks_output: PathBuf,
    pub report_output: Option<PathBuf>,
}

/// Load configuration from a TOML file
pub fn load_config(path: &Path) -> Result<AppConfig> {
    let content = fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {:?}", path))?;

    let config: AppConfig = toml::from_str(&content)
        .with_context(|| format!("Failed to parse config file: {:?}", path))?;

    Ok(config)
}

/// Load a JSON object mapping labels to host targets
pub fn load_bindings(path: &Path) -> Result<HashMap<String, String>> {
    let content = fs::read_to_string(path)
        .with_context(|| format!("Failed to read bindings file: {:?}", path))?;

    serde_json::from_str(&content)
        .with_context(|| format!("Failed to parse bindings file: {:?}", path))
}

/// Merge the config file (if any) with command line flags
pub fn resolve_settings(args: &Args, file: AppConfig) -> Result<RunSettings> {
    let Some(source) = args.source.clone().or(file.input.source) else {
        bail!("No source file given (use --source or [input].source in the config file)");
    };

    let cache = args
        .cache
        .clone()
        .or(file.input.cache)
        .unwrap_or_else(|| source.with_extension("csv"));

    let channels = args.channels.or(file.input.channels).unwrap_or(DEFAULT_CHANNELS);
    if channels == 0 {
        bail!("Channel count must be at least 1");
    }

    let error_policy = args
        .on_error
        .map(ErrorPolicy::from)
        .or(file.input.on_error)
        .unwrap_or_default();

    let frame_rate = args.fps.or(file.tracks.frame_rate).unwrap_or(DEFAULT_FRAME_RATE);
    if !(frame_rate.is_finite() && frame_rate > 0.0) {
        bail!("Frame rate must be a positive number, got {}", frame_rate);
    }
    let multiplier = args.scale.or(file.tracks.scale).unwrap_or(DEFAULT_SCALE_MULTIPLIER);

    let mut pipeline = PipelineConfig::new(&source, cache)
        .with_channels(channels)
        .with_error_policy(error_policy)
        .with_frame_rate(frame_rate)
        .with_scale_multiplier(multiplier)
        .with_cache_bypass(args.no_cache || file.input.no_cache)
        .with_parallel(args.parallel || file.tracks.parallel);

    pipeline.decode.channel_names = file.input.channel_names;

    for (key, value) in file.tracks.scale_overrides {
        let index: usize = key
            .parse()
            .with_context(|| format!("Scale override key {:?} is not a channel index", key))?;
        if index >= channels {
            bail!("Scale override for channel {} but only {} channels", index, channels);
        }
        pipeline.scale.overrides.insert(index, value);
    }

    let label_pattern = args
        .label_pattern
        .clone()
        .or(file.bindings.label_pattern)
        .unwrap_or_else(|| DEFAULT_LABEL_PATTERN.to_string());

    let mut targets = file.bindings.targets;
    if let Some(path) = args.bindings.as_ref().or(file.bindings.file.as_ref()) {
        targets.extend(load_bindings(path)?);
    }
    let targets = (!targets.is_empty()).then_some(targets);

    let tracks_output = args
        .output
        .clone()
        .or(file.output.tracks)
        .unwrap_or_else(|| source.with_extension("tracks.json"));

    Ok(RunSettings {
        pipeline,
        label_pattern,
        targets,
        tracks_output,
        report_output: args.report_json.clone().or(file.output.report),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    #[test]
    fn test_config_deserialization() {
        let toml_content = r#"
            [input]
            source = "DMX64.chan"
            channels = 64
            on_error = "skip-line"

            [tracks]
            frame_rate = 30.0
            scale = 5000.0
            scale_overrides = { "3" = 2500.0 }

            [bindings]
            label_pattern = "Spot{i}"
            targets = { Spot0 = "/Game/Lights/Spot0" }
        "#;

        let config: AppConfig = toml::from_str(toml_content).unwrap();
        assert_eq!(config.input.channels, Some(64));
        assert_eq!(config.input.on_error, Some(ErrorPolicy::SkipLine));
        assert_eq!(config.tracks.frame_rate, Some(30.0));
        assert_eq!(config.tracks.scale_overrides["3"], 2500.0);
        assert_eq!(config.bindings.targets.len(), 1);
    }

    #[test]
    fn test_defaults_from_source_only() {
        let args = Args::parse_from(["dmx-track", "--source", "shows/DMX64.chan"]);
        let settings = resolve_settings(&args, AppConfig::default()).unwrap();

        assert_eq!(settings.pipeline.cache_path, PathBuf::from("shows/DMX64.csv"));
        assert_eq!(settings.tracks_output, PathBuf::from("shows/DMX64.tracks.json"));
        assert_eq!(settings.pipeline.decode.expected_arity, 64);
        assert_eq!(settings.pipeline.scale.multiplier, 5000.0);
        assert_eq!(settings.label_pattern, "PointLight{i}");
        assert!(settings.targets.is_none());
    }

    #[test]
    fn test_flags_override_file() {
        let mut file = AppConfig::default();
        file.input.source = Some(PathBuf::from("a.chan"));
        file.input.channels = Some(8);
        file.tracks.scale = Some(10.0);
        file.tracks.scale_overrides.insert("1".into(), 3.0);

        let args = Args::parse_from(["dmx-track", "--channels", "2", "--scale", "1300", "--on-error", "skip-line"]);
        let settings = resolve_settings(&args, file).unwrap();

        assert_eq!(settings.pipeline.source_path, PathBuf::from("a.chan"));
        assert_eq!(settings.pipeline.decode.expected_arity, 2);
        assert_eq!(settings.pipeline.scale.multiplier, 1300.0);
        assert_eq!(settings.pipeline.scale.multiplier_for(1), 3.0);
        assert_eq!(settings.pipeline.decode.error_policy, ErrorPolicy::SkipLine);
    }

    #[test]
    fn test_missing_source_is_an_error() {
        let args = Args::parse_from(["dmx-track"]);
        assert!(resolve_settings(&args, AppConfig::default()).is_err());
    }

    #[test]
    fn test_non_positive_frame_rate_rejected() {
        for fps in ["--fps=0", "--fps=-24"] {
            let args = Args::parse_from(["dmx-track", "--source", "a.chan", fps]);
            assert!(resolve_settings(&args, AppConfig::default()).is_err());
        }

        let mut file = AppConfig::default();
        file.tracks.frame_rate = Some(0.0);
        let args = Args::parse_from(["dmx-track", "--source", "a.chan"]);
        assert!(resolve_settings(&args, file).is_err());
    }

    #[test]
    fn test_out_of_range_override_rejected() {
        let mut file = AppConfig::default();
        file.tracks.scale_overrides.insert("9".into(), 3.0);
        let args = Args::parse_from(["dmx-track", "--source", "a.chan", "--channels", "4"]);
        assert!(resolve_settings(&args, file).is_err());
    }
}
