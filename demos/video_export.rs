//! Export a range as MP4 on a background thread with progress output.
//!
//! Usage: `cargo run --example video_export -- path/to/recording.mov <start> <end> [out_dir]`

use std::sync::Arc;

use clipcast::{
    CodecProfile, ExportConfig, ExportOptions, ExportRequest, ProgressCallback, ProgressInfo,
    TimeRange, VideoOptions, spawn_export,
};

struct PrintProgress;

impl ProgressCallback for PrintProgress {
    fn on_progress(&self, info: &ProgressInfo) {
        match info.percentage {
            Some(pct) => println!("  {pct:5.1}% ({} frames)", info.current),
            None => println!("  {} frames", info.current),
        }
    }
}

fn main() {
    let mut args = std::env::args().skip(1);
    let path = args.next().expect("Usage: video_export <recording> <start> <end> [out_dir]");
    let start: f64 = args.next().and_then(|value| value.parse().ok()).unwrap_or(0.0);
    let end: f64 = args.next().and_then(|value| value.parse().ok()).unwrap_or(f64::INFINITY);
    let out_dir = args.next().unwrap_or_else(|| "exports".to_string());

    let request = ExportRequest::new(
        path,
        TimeRange::new(start, end),
        out_dir,
        ExportOptions::Video(
            VideoOptions::new()
                .max_render_size(1280, 720)
                .codec_profile(CodecProfile::Fast),
        ),
    );
    let config = ExportConfig::new()
        .with_progress(Arc::new(PrintProgress))
        .with_batch_size(30);

    let handle = spawn_export(request, config);
    match handle.wait() {
        Ok(artifact) => println!("Video saved to {}", artifact.path.display()),
        Err(error) => {
            eprintln!("Export failed: {error}");
            std::process::exit(1);
        }
    }
}
