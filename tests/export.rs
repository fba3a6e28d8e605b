//! End-to-end export tests against a synthesized clip.

mod common;

use std::sync::{Arc, Mutex};

use clipcast::{
    AnimatedImageOptions, CancellationToken, ClipError, CodecProfile, ExportConfig, ExportOptions,
    ExportRequest, ProgressCallback, ProgressInfo, SourceClip, TimeRange, VideoOptions,
    export_clip, spawn_export,
};

use common::{FIXTURE_SIZE, directory_entries, gif_frame_count, synthesize_clip};

fn gif_options() -> ExportOptions {
    ExportOptions::AnimatedImage(AnimatedImageOptions::new().fps(10).max_pixel_dimension(32))
}

fn video_options() -> ExportOptions {
    ExportOptions::Video(VideoOptions::new().codec_profile(CodecProfile::Compatible))
}

#[derive(Default)]
struct Recorder {
    updates: Mutex<Vec<ProgressInfo>>,
}

impl ProgressCallback for Recorder {
    fn on_progress(&self, info: &ProgressInfo) {
        self.updates.lock().unwrap().push(info.clone());
    }
}

#[test]
fn animated_export_writes_one_frame_per_grid_tick() {
    let workspace = tempfile::tempdir().unwrap();
    let Some(source) = synthesize_clip(workspace.path()) else {
        return;
    };
    let output_dir = workspace.path().join("exports");

    let request = ExportRequest::new(&source, TimeRange::new(0.5, 2.5), &output_dir, gif_options());
    let artifact = export_clip(&request, &ExportConfig::new()).expect("gif export");

    assert!(artifact.path.is_absolute());
    assert_eq!(artifact.path.extension().unwrap(), "gif");
    assert!(artifact.byte_size > 0);
    assert_eq!(artifact.byte_size, std::fs::metadata(&artifact.path).unwrap().len());
    assert_eq!(gif_frame_count(&artifact.path), 20);

    let name = artifact.path.file_name().unwrap().to_string_lossy().into_owned();
    assert!(name.starts_with("Clip "), "unexpected name {name}");
    assert!(name.contains(" at "), "unexpected name {name}");
    assert_eq!(directory_entries(&output_dir), vec![artifact.path]);
}

#[test]
fn gif_fits_the_bounding_box() {
    let workspace = tempfile::tempdir().unwrap();
    let Some(source) = synthesize_clip(workspace.path()) else {
        return;
    };

    let request = ExportRequest::new(&source, TimeRange::new(0.0, 1.0), workspace.path(), gif_options());
    let artifact = export_clip(&request, &ExportConfig::new()).expect("gif export");

    let file = std::fs::File::open(&artifact.path).unwrap();
    let decoder = gif::DecodeOptions::new().read_info(file).unwrap();
    // 64x48 scaled into 32x32 keeps the aspect ratio.
    assert_eq!((decoder.width(), decoder.height()), (32, 24));
}

#[test]
fn video_export_produces_playable_mp4() {
    let workspace = tempfile::tempdir().unwrap();
    let Some(source) = synthesize_clip(workspace.path()) else {
        return;
    };
    let output_dir = workspace.path().join("exports");

    let request = ExportRequest::new(&source, TimeRange::new(0.5, 2.5), &output_dir, video_options());
    let artifact = export_clip(&request, &ExportConfig::new()).expect("video export");
    assert_eq!(artifact.path.extension().unwrap(), "mp4");

    let exported = SourceClip::probe(&artifact.path).expect("probe export");
    assert_eq!(exported.natural_size, FIXTURE_SIZE);
    // Within one output frame of the selection.
    assert!(
        (exported.duration - 2.0).abs() <= 1.0 / 30.0 + 1e-3,
        "exported duration {}",
        exported.duration
    );
    assert!(!exported.has_audio);
    assert_eq!(directory_entries(&output_dir).len(), 1);
}

#[test]
fn empty_selection_is_rejected_before_any_output() {
    let workspace = tempfile::tempdir().unwrap();
    let Some(source) = synthesize_clip(workspace.path()) else {
        return;
    };
    let output_dir = workspace.path().join("never-created");

    for options in [gif_options(), video_options()] {
        let request = ExportRequest::new(&source, TimeRange::new(1.0, 1.0), &output_dir, options);
        let result = export_clip(&request, &ExportConfig::new());
        assert!(
            matches!(result, Err(ClipError::InvalidTimeRange { .. })),
            "got {result:?}"
        );
    }
    assert!(!output_dir.exists());
}

#[test]
fn selection_past_the_end_is_clamped() {
    let workspace = tempfile::tempdir().unwrap();
    let Some(source) = synthesize_clip(workspace.path()) else {
        return;
    };

    let request = ExportRequest::new(
        &source,
        TimeRange::new(2.0, 60.0),
        workspace.path().join("out"),
        gif_options(),
    );
    let artifact = export_clip(&request, &ExportConfig::new()).expect("clamped export");
    let frames = gif_frame_count(&artifact.path);
    assert!((9..=11).contains(&frames), "got {frames} frames");
}

#[test]
fn repeated_exports_never_overwrite() {
    let workspace = tempfile::tempdir().unwrap();
    let Some(source) = synthesize_clip(workspace.path()) else {
        return;
    };
    let output_dir = workspace.path().join("exports");
    let request = ExportRequest::new(&source, TimeRange::new(0.0, 0.5), &output_dir, gif_options());

    let first = export_clip(&request, &ExportConfig::new()).expect("first export");
    let second = export_clip(&request, &ExportConfig::new()).expect("second export");

    assert_ne!(first.path, second.path);
    assert!(first.path.exists());
    assert!(second.path.exists());
    assert_eq!(directory_entries(&output_dir).len(), 2);
}

#[test]
fn custom_file_stem_is_used() {
    let workspace = tempfile::tempdir().unwrap();
    let Some(source) = synthesize_clip(workspace.path()) else {
        return;
    };
    let request = ExportRequest::new(&source, TimeRange::new(0.0, 0.5), workspace.path().join("out"), gif_options());

    let artifact = export_clip(&request, &ExportConfig::new().with_file_stem("Demo")).unwrap();
    let name = artifact.path.file_name().unwrap().to_string_lossy().into_owned();
    assert!(name.starts_with("Demo "), "unexpected name {name}");
}

#[test]
fn cancelled_exports_leave_nothing_behind() {
    let workspace = tempfile::tempdir().unwrap();
    let Some(source) = synthesize_clip(workspace.path()) else {
        return;
    };
    let output_dir = workspace.path().join("exports");

    for options in [gif_options(), video_options()] {
        let token = CancellationToken::new();
        token.cancel();
        let config = ExportConfig::new().with_cancellation(token);
        let request = ExportRequest::new(&source, TimeRange::new(0.0, 2.0), &output_dir, options);

        let result = export_clip(&request, &config);
        assert!(matches!(result, Err(ClipError::Cancelled)), "got {result:?}");
        assert!(directory_entries(&output_dir).is_empty());
    }
}

#[test]
fn progress_reaches_the_written_frame_count() {
    let workspace = tempfile::tempdir().unwrap();
    let Some(source) = synthesize_clip(workspace.path()) else {
        return;
    };
    let recorder = Arc::new(Recorder::default());
    let config = ExportConfig::new()
        .with_progress(recorder.clone())
        .with_batch_size(5);
    let request = ExportRequest::new(&source, TimeRange::new(0.0, 2.0), workspace.path().join("out"), gif_options());

    export_clip(&request, &config).expect("gif export");

    let updates = recorder.updates.lock().unwrap();
    assert!(updates.len() >= 2);
    let last = updates.last().unwrap();
    assert_eq!(last.current, 20);
    assert_eq!(last.total, Some(20));
    assert!(updates.windows(2).all(|pair| pair[0].current <= pair[1].current));
}

#[test]
fn missing_source_is_a_source_error() {
    let workspace = tempfile::tempdir().unwrap();
    let output_dir = workspace.path().join("exports");
    let request = ExportRequest::new(
        workspace.path().join("nope.mov"),
        TimeRange::new(0.0, 1.0),
        &output_dir,
        gif_options(),
    );

    let result = export_clip(&request, &ExportConfig::new());
    assert!(matches!(result, Err(ClipError::SourceOpen { .. })), "got {result:?}");
    assert!(!output_dir.exists());
}

#[test]
fn invalid_options_are_rejected_first() {
    let workspace = tempfile::tempdir().unwrap();
    let request = ExportRequest::new(
        workspace.path().join("nope.mov"),
        TimeRange::new(0.0, 1.0),
        workspace.path(),
        ExportOptions::AnimatedImage(AnimatedImageOptions::new().fps(0)),
    );

    let result = export_clip(&request, &ExportConfig::new());
    assert!(matches!(result, Err(ClipError::InvalidOptions(_))), "got {result:?}");
}

#[test]
fn spawned_export_delivers_its_result() {
    let workspace = tempfile::tempdir().unwrap();
    let Some(source) = synthesize_clip(workspace.path()) else {
        return;
    };
    let request = ExportRequest::new(&source, TimeRange::new(0.0, 1.0), workspace.path().join("out"), gif_options());

    let handle = spawn_export(request, ExportConfig::new());
    let artifact = handle.wait().expect("background export");
    assert!(artifact.path.exists());
}

#[test]
fn spawned_export_can_be_cancelled() {
    let workspace = tempfile::tempdir().unwrap();
    let Some(source) = synthesize_clip(workspace.path()) else {
        return;
    };
    let output_dir = workspace.path().join("out");
    let token = CancellationToken::new();
    token.cancel();
    let request = ExportRequest::new(&source, TimeRange::new(0.0, 2.0), &output_dir, video_options());

    let handle = spawn_export(request, ExportConfig::new().with_cancellation(token));
    let result = handle.wait();
    assert!(matches!(result, Err(ClipError::Cancelled)), "got {result:?}");
    assert!(directory_entries(&output_dir).is_empty());
}

#[cfg(feature = "async")]
#[tokio::test]
async fn async_export_resolves() {
    let workspace = tempfile::tempdir().unwrap();
    let Some(source) = synthesize_clip(workspace.path()) else {
        return;
    };
    let request = ExportRequest::new(&source, TimeRange::new(0.0, 1.0), workspace.path().join("out"), gif_options());

    let artifact = clipcast::export_async(request, ExportConfig::new())
        .await
        .expect("async export");
    assert_eq!(artifact.path.extension().unwrap(), "gif");
}
