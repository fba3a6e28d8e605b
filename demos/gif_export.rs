//! Export the first few seconds of a recording as a looping GIF.
//!
//! Usage: `cargo run --example gif_export -- path/to/recording.mov [out_dir]`

use clipcast::{
    AnimatedImageOptions, ClipError, ExportConfig, ExportOptions, ExportRequest, SourceClip,
    TimeRange, export_clip,
};

fn main() -> Result<(), ClipError> {
    let path = std::env::args().nth(1).expect("Usage: gif_export <recording> [out_dir]");
    let out_dir = std::env::args().nth(2).unwrap_or_else(|| "exports".to_string());

    let clip = SourceClip::probe(&path)?;
    println!(
        "Input: {} ({}), {:.2}s at {:.2} fps",
        clip.natural_size, clip.codec, clip.duration, clip.nominal_frame_rate
    );

    // Ranges past the end are clamped to the clip.
    let request = ExportRequest::new(
        &path,
        TimeRange::new(0.0, 4.0),
        &out_dir,
        ExportOptions::AnimatedImage(AnimatedImageOptions::new().fps(12).max_pixel_dimension(320)),
    );
    let artifact = export_clip(&request, &ExportConfig::new())?;

    println!("GIF saved to {} ({} bytes)", artifact.path.display(), artifact.byte_size);
    Ok(())
}
