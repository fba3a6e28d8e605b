//! Shared fixtures for the integration tests.
//!
//! Clips are synthesized on the fly with FFmpeg's MPEG-4 encoder, which
//! every FFmpeg build ships, so no binary fixtures are checked in. Tests
//! skip when synthesis fails.

#![allow(dead_code)]

use std::path::{Path, PathBuf};

use clipcast::{
    CodecProfile, FrameSink, PixelSize,
    video::EncoderSink,
};
use ffmpeg_next::{format::Pixel, frame::Video as VideoFrame};

pub const FIXTURE_FPS: u32 = 30;
pub const FIXTURE_SECONDS: u32 = 3;
pub const FIXTURE_SIZE: PixelSize = PixelSize::new(64, 48);

/// Encode a short gradient clip into `directory`.
///
/// Returns `None` (and logs why) if this FFmpeg build cannot produce it.
pub fn synthesize_clip(directory: &Path) -> Option<PathBuf> {
    let path = directory.join("fixture.mp4");
    match write_clip(&path) {
        Ok(()) => Some(path),
        Err(error) => {
            eprintln!("Skipping: cannot synthesize fixture ({error})");
            None
        }
    }
}

fn write_clip(path: &Path) -> Result<(), clipcast::ClipError> {
    let mut sink = EncoderSink::create(
        path,
        FIXTURE_SIZE,
        FIXTURE_FPS,
        1_000_000,
        CodecProfile::Compatible,
    )?;

    for index in 0..(FIXTURE_FPS * FIXTURE_SECONDS) {
        sink.wait_until_ready()?;
        sink.append(gradient_frame(index), index as i64)?;
    }
    sink.finish()
}

/// A YUV frame whose brightness ramps with `index`.
fn gradient_frame(index: u32) -> VideoFrame {
    let mut frame = VideoFrame::new(Pixel::YUV420P, FIXTURE_SIZE.width, FIXTURE_SIZE.height);
    let luma = 16 + (index * 2 % 220) as u8;
    for plane in 0..3 {
        let value = if plane == 0 { luma } else { 128 };
        frame.data_mut(plane).fill(value);
    }
    frame
}

/// Files in `directory`, hidden staging files included.
pub fn directory_entries(directory: &Path) -> Vec<PathBuf> {
    match std::fs::read_dir(directory) {
        Ok(entries) => entries.filter_map(|entry| entry.ok().map(|entry| entry.path())).collect(),
        Err(_) => Vec::new(),
    }
}

/// Number of frames in a GIF file.
pub fn gif_frame_count(path: &Path) -> usize {
    let file = std::fs::File::open(path).expect("open gif");
    let mut options = gif::DecodeOptions::new();
    options.set_color_output(gif::ColorOutput::Indexed);
    let mut decoder = options.read_info(file).expect("read gif header");
    let mut frames = 0;
    while decoder.read_next_frame().expect("read gif frame").is_some() {
        frames += 1;
    }
    frames
}
