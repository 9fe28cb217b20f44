// End-to-end runs of the pipeline against real files
use dmx_track_core::{
    pipeline, CacheStatus, CancellationToken, ErrorPolicy, HostSinkError, Keyframe, PipelineConfig,
    PipelineError, TrackSink,
};
use std::fs::{self, File};
use std::path::Path;
use std::time::{Duration, SystemTime};

/// Collects tracks in submission order
#[derive(Default)]
struct CollectingSink {
    tracks: Vec<(String, Vec<Keyframe>)>,
}

impl TrackSink for CollectingSink {
    type Handle = String;

    fn create_track(&mut self, handle: &String, keyframes: &[Keyframe]) -> Result<(), HostSinkError> {
        self.tracks.push((handle.clone(), keyframes.to_vec()));
        Ok(())
    }
}

fn set_mtime(path: &Path, time: SystemTime) {
    File::options()
        .write(true)
        .open(path)
        .unwrap()
        .set_modified(time)
        .unwrap();
}

fn write_source(dir: &Path, body: &str) -> std::path::PathBuf {
    let _ = env_logger::builder().is_test(true).try_init();
    let path = dir.join("show.chan");
    fs::write(&path, body).unwrap();
    path
}

#[test]
fn scenario_two_channel_source() {
    let dir = tempfile::tempdir().unwrap();
    let source = write_source(dir.path(), "255 0\n0 128\n# comment\n\n128 255\n");
    let config = PipelineConfig::new(&source, dir.path().join("cache/show.csv"))
        .with_channels(2)
        .with_scale_multiplier(1.0);

    let mut resolver = |i: usize| Some(format!("PointLight{}", i));
    let mut sink = CollectingSink::default();
    let outcome = pipeline::run(&config, &mut resolver, &mut sink, None).unwrap();

    assert_eq!(outcome.cache_status, CacheStatus::Regenerated);
    assert!(outcome.is_clean());
    assert_eq!(outcome.report.frames_processed, 3);
    assert!(config.cache_path.exists());

    let (handle, keys) = &sink.tracks[1];
    assert_eq!(handle, "PointLight1");
    let values: Vec<f64> = keys.iter().map(|k| k.value).collect();
    assert_eq!(values[0], 0.0);
    assert!((values[1] - 0.50196).abs() < 1e-4);
    assert_eq!(values[2], 1.0);
}

#[test]
fn scenario_partial_resolution() {
    let dir = tempfile::tempdir().unwrap();
    let source = write_source(dir.path(), "10 20\n30 40\n");
    let config = PipelineConfig::new(&source, dir.path().join("show.csv")).with_channels(2);

    let mut resolver = |i: usize| (i == 1).then(|| "PointLight1".to_string());
    let mut sink = CollectingSink::default();
    let outcome = pipeline::run(&config, &mut resolver, &mut sink, None).unwrap();

    assert_eq!(outcome.report.channels_succeeded, vec![1]);
    assert_eq!(outcome.report.channels_unresolved, vec![0]);
    assert!(outcome.report.channels_failed.is_empty());
    assert_eq!(sink.tracks.len(), 1);
    assert!(!outcome.is_clean());
}

#[test]
fn no_bindings_is_fatal() {
    let dir = tempfile::tempdir().unwrap();
    let source = write_source(dir.path(), "10 20\n");
    let config = PipelineConfig::new(&source, dir.path().join("show.csv")).with_channels(2);

    let mut resolver = |_: usize| None::<String>;
    let result = pipeline::run(&config, &mut resolver, &mut CollectingSink::default(), None);
    assert!(matches!(result, Err(PipelineError::NoBindings { channels: 2 })));
}

#[test]
fn missing_source_without_cache_is_fatal() {
    let dir = tempfile::tempdir().unwrap();
    let config = PipelineConfig::new(dir.path().join("absent.chan"), dir.path().join("absent.csv"));

    let mut resolver = |i: usize| Some(i.to_string());
    let result = pipeline::run(&config, &mut resolver, &mut CollectingSink::default(), None);
    assert!(matches!(result, Err(PipelineError::SourceNotFound(_))));
}

#[test]
fn cache_follows_modification_times() {
    let dir = tempfile::tempdir().unwrap();
    let source = write_source(dir.path(), "255\n");
    let cache = dir.path().join("show.csv");
    let config = PipelineConfig::new(&source, &cache).with_channels(1).with_scale_multiplier(1.0);
    let mut resolver = |_: usize| Some("light".to_string());

    // Absent cache: regenerate
    let first = pipeline::run(&config, &mut resolver, &mut CollectingSink::default(), None).unwrap();
    assert_eq!(first.cache_status, CacheStatus::Regenerated);

    // Cache newer than source: reuse, even after the source content changes
    let base = SystemTime::now() - Duration::from_secs(3600);
    fs::write(&source, "0\n").unwrap();
    set_mtime(&source, base);
    set_mtime(&cache, base + Duration::from_secs(60));
    let mut sink = CollectingSink::default();
    let reused = pipeline::run(&config, &mut resolver, &mut sink, None).unwrap();
    assert_eq!(reused.cache_status, CacheStatus::Reused);
    assert_eq!(sink.tracks[0].1[0].value, 1.0);

    // Source newer than cache: regenerate and pick up the new content
    set_mtime(&source, base + Duration::from_secs(120));
    let mut sink = CollectingSink::default();
    let regenerated = pipeline::run(&config, &mut resolver, &mut sink, None).unwrap();
    assert_eq!(regenerated.cache_status, CacheStatus::Regenerated);
    assert_eq!(sink.tracks[0].1[0].value, 0.0);
}

#[test]
fn cache_survives_source_removal() {
    let dir = tempfile::tempdir().unwrap();
    let source = write_source(dir.path(), "51 102\n");
    let config = PipelineConfig::new(&source, dir.path().join("show.csv"))
        .with_channels(2)
        .with_scale_multiplier(1.0);
    let mut resolver = |i: usize| Some(i.to_string());

    pipeline::run(&config, &mut resolver, &mut CollectingSink::default(), None).unwrap();
    fs::remove_file(&source).unwrap();

    let mut sink = CollectingSink::default();
    let outcome = pipeline::run(&config, &mut resolver, &mut sink, None).unwrap();
    assert_eq!(outcome.cache_status, CacheStatus::Reused);
    assert_eq!(sink.tracks[0].1[0].value, 0.2);
    assert_eq!(sink.tracks[1].1[0].value, 0.4);
}

#[test]
fn cache_with_other_width_is_regenerated() {
    let dir = tempfile::tempdir().unwrap();
    let source = write_source(dir.path(), "255 0\n");
    let cache = dir.path().join("show.csv");
    fs::write(&cache, "frame,light_0,light_1,light_2\n0,0.5,0.5,0.5\n").unwrap();
    let base = SystemTime::now() - Duration::from_secs(3600);
    set_mtime(&source, base);
    set_mtime(&cache, base + Duration::from_secs(60));

    let config = PipelineConfig::new(&source, &cache).with_channels(2).with_scale_multiplier(1.0);
    let mut resolver = |i: usize| Some(format!("PointLight{}", i));
    let mut sink = CollectingSink::default();
    let outcome = pipeline::run(&config, &mut resolver, &mut sink, None).unwrap();

    assert_eq!(outcome.cache_status, CacheStatus::Regenerated);
    assert_eq!(outcome.channel_names, vec!["light_0", "light_1"]);
    assert_eq!(sink.tracks.len(), 2);
    assert_eq!(sink.tracks[0].1[0].value, 1.0);
    assert!(fs::read_to_string(&cache).unwrap().starts_with("frame,light_0,light_1\n"));
}

#[test]
fn cache_with_other_width_is_kept_without_source() {
    let dir = tempfile::tempdir().unwrap();
    let source = dir.path().join("gone.chan");
    let cache = dir.path().join("show.csv");
    fs::write(&cache, "frame,light_0,light_1,light_2\n0,0.5,0.5,0.5\n").unwrap();

    let config = PipelineConfig::new(&source, &cache).with_channels(2);
    let mut resolver = |i: usize| Some(i.to_string());
    let outcome = pipeline::run(&config, &mut resolver, &mut CollectingSink::default(), None).unwrap();

    assert_eq!(outcome.cache_status, CacheStatus::Reused);
    assert_eq!(outcome.report.channels_succeeded, vec![0, 1, 2]);
}

#[test]
fn out_of_range_cache_value_is_fatal() {
    let dir = tempfile::tempdir().unwrap();
    let source = write_source(dir.path(), "0\n0\n");
    let cache = dir.path().join("show.csv");
    fs::write(&cache, "frame,light_0\n0,7.5\n1,0\n").unwrap();
    let base = SystemTime::now() - Duration::from_secs(3600);
    set_mtime(&source, base);
    set_mtime(&cache, base + Duration::from_secs(60));

    let config = PipelineConfig::new(&source, &cache).with_channels(1);
    let mut resolver = |_: usize| Some("light".to_string());
    let result = pipeline::run(&config, &mut resolver, &mut CollectingSink::default(), None);
    assert!(matches!(result, Err(PipelineError::CacheUnreadable { .. })));
}

#[test]
fn bypass_regenerates_fresh_cache() {
    let dir = tempfile::tempdir().unwrap();
    let source = write_source(dir.path(), "0\n");
    let config = PipelineConfig::new(&source, dir.path().join("show.csv")).with_channels(1);
    let mut resolver = |_: usize| Some("light".to_string());

    pipeline::run(&config, &mut resolver, &mut CollectingSink::default(), None).unwrap();
    let outcome = pipeline::run(
        &config.clone().with_cache_bypass(true),
        &mut resolver,
        &mut CollectingSink::default(),
        None,
    )
    .unwrap();
    assert_eq!(outcome.cache_status, CacheStatus::Bypassed);
}

#[test]
fn skip_line_policy_reports_dropped_lines() {
    let dir = tempfile::tempdir().unwrap();
    let source = write_source(dir.path(), "1 2\nbad 2\n3 4\n");
    let config = PipelineConfig::new(&source, dir.path().join("show.csv"))
        .with_channels(2)
        .with_error_policy(ErrorPolicy::SkipLine);
    let mut resolver = |i: usize| Some(i.to_string());

    let outcome = pipeline::run(&config, &mut resolver, &mut CollectingSink::default(), None).unwrap();
    assert_eq!(outcome.report.frames_processed, 2);
    assert_eq!(outcome.skipped_lines.len(), 1);
    assert_eq!(outcome.skipped_lines[0].line_number, 2);
    assert!(outcome.report.is_clean());
    assert!(!outcome.is_clean());

    let abort = config.clone().with_error_policy(ErrorPolicy::Abort).with_cache_bypass(true);
    let result = pipeline::run(&abort, &mut resolver, &mut CollectingSink::default(), None);
    assert!(matches!(result, Err(PipelineError::Decode { line_number: 2, .. })));
}

#[test]
fn cancelled_run_reports_abort_point() {
    let dir = tempfile::tempdir().unwrap();
    let source = write_source(dir.path(), "1 2 3\n");
    let config = PipelineConfig::new(&source, dir.path().join("show.csv"))
        .with_channels(3)
        .with_parallel(true);
    let mut resolver = |i: usize| Some(i.to_string());

    let token = CancellationToken::new();
    token.cancel();
    let mut sink = CollectingSink::default();
    let outcome = pipeline::run(&config, &mut resolver, &mut sink, Some(token)).unwrap();

    assert!(sink.tracks.is_empty());
    assert_eq!(outcome.report.cancelled_at, Some(0));
}

#[test]
fn report_serializes_to_json() {
    let dir = tempfile::tempdir().unwrap();
    let source = write_source(dir.path(), "255\n");
    let config = PipelineConfig::new(&source, dir.path().join("show.csv")).with_channels(1);
    let mut resolver = |_: usize| Some("light".to_string());

    let outcome = pipeline::run(&config, &mut resolver, &mut CollectingSink::default(), None).unwrap();
    let json = serde_json::to_value(&outcome.report).unwrap();
    assert_eq!(json["frames_processed"], 1);
    assert_eq!(json["channels_succeeded"][0], 0);
}
