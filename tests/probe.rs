//! Probing and planning against a synthesized clip.

mod common;

use clipcast::{
    AnimatedImageOptions, ClipError, ExportOptions, ExportRequest, Orientation, SourceClip,
    TimeRange, TranscodeJob, VideoOptions,
};

use common::{FIXTURE_FPS, FIXTURE_SECONDS, FIXTURE_SIZE, synthesize_clip};

#[test]
fn probe_reads_video_metadata() {
    let workspace = tempfile::tempdir().unwrap();
    let Some(source) = synthesize_clip(workspace.path()) else {
        return;
    };

    let clip = SourceClip::probe(&source).expect("probe");
    assert_eq!(clip.natural_size, FIXTURE_SIZE);
    assert_eq!(clip.oriented_size(), FIXTURE_SIZE);
    assert_eq!(clip.orientation, Orientation::UP);
    assert!((clip.duration - FIXTURE_SECONDS as f64).abs() < 0.1, "duration {}", clip.duration);
    assert!((clip.nominal_frame_rate - FIXTURE_FPS as f64).abs() < 0.5);
    assert_eq!(clip.codec, "mpeg4");
    assert!(!clip.has_audio);
}

#[test]
fn probe_rejects_garbage() {
    let workspace = tempfile::tempdir().unwrap();
    let path = workspace.path().join("garbage.mp4");
    std::fs::write(&path, b"this is not a media file").unwrap();

    let result = SourceClip::probe(&path);
    assert!(
        matches!(
            result,
            Err(ClipError::SourceOpen { .. } | ClipError::MissingVideoTrack)
        ),
        "got {result:?}"
    );
}

#[test]
fn video_job_negotiates_the_measured_rate() {
    let workspace = tempfile::tempdir().unwrap();
    let Some(source) = synthesize_clip(workspace.path()) else {
        return;
    };

    let request = ExportRequest::new(
        &source,
        TimeRange::new(0.0, 2.0),
        workspace.path(),
        ExportOptions::Video(VideoOptions::new().target_fps(60)),
    );
    let job = TranscodeJob::prepare(&request).expect("prepare");
    // A 30 fps source caps a 60 fps request.
    assert_eq!(job.output_fps(), 30);
    assert_eq!(job.expected_frames(), 60);
    assert_eq!(job.plan().output_size, FIXTURE_SIZE);
}

#[test]
fn animated_job_keeps_the_requested_rate() {
    let workspace = tempfile::tempdir().unwrap();
    let Some(source) = synthesize_clip(workspace.path()) else {
        return;
    };

    let request = ExportRequest::new(
        &source,
        TimeRange::new(1.0, 2.5),
        workspace.path(),
        ExportOptions::AnimatedImage(AnimatedImageOptions::new().fps(12).max_pixel_dimension(16)),
    );
    let job = TranscodeJob::prepare(&request).expect("prepare");
    assert_eq!(job.output_fps(), 12);
    assert_eq!(job.expected_frames(), 18);
    assert_eq!(job.range(), TimeRange::new(1.0, 2.5));
    assert_eq!(job.plan().output_size.width, 16);
    assert_eq!(job.plan().output_size.height, 12);
}
