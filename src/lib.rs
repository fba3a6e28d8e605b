//! # clipcast
//!
//! Export trimmed screen-recording clips as optimized animated GIFs or
//! compact MP4 videos.
//!
//! `clipcast` takes a source recording, a time range, an output directory,
//! and format-specific options, and produces exactly one new file or a
//! typed [`ClipError`]. Decoding, filtering, and video encoding are powered
//! by FFmpeg via the [`ffmpeg-next`](https://crates.io/crates/ffmpeg-next)
//! crate; GIF encoding and palette quantization by
//! [`gif`](https://crates.io/crates/gif).
//!
//! ## Quick Start
//!
//! ### Export a GIF
//!
//! ```no_run
//! use clipcast::{
//!     AnimatedImageOptions, ExportConfig, ExportOptions, ExportRequest, TimeRange, export_clip,
//! };
//!
//! let request = ExportRequest::new(
//!     "recording.mov",
//!     TimeRange::new(1.2, 5.4),
//!     "exports",
//!     ExportOptions::AnimatedImage(AnimatedImageOptions::new().fps(15).max_pixel_dimension(480)),
//! );
//! let artifact = export_clip(&request, &ExportConfig::new()).unwrap();
//! println!("{}", artifact.path.display());
//! ```
//!
//! ### Export a Video in the Background
//!
//! ```no_run
//! use clipcast::{
//!     CodecProfile, ExportConfig, ExportOptions, ExportRequest, TimeRange, VideoOptions,
//!     spawn_export,
//! };
//!
//! let request = ExportRequest::new(
//!     "recording.mov",
//!     TimeRange::new(0.0, 12.0),
//!     "exports",
//!     ExportOptions::Video(
//!         VideoOptions::new()
//!             .max_render_size(1280, 720)
//!             .codec_profile(CodecProfile::Efficient),
//!     ),
//! );
//! let handle = spawn_export(request, ExportConfig::new());
//! // ... keep the UI responsive, maybe call handle.cancel() ...
//! let artifact = handle.wait().unwrap();
//! ```
//!
//! ## How an Export Runs
//!
//! 1. The options are validated and the source is probed
//!    ([`SourceClip::probe`]).
//! 2. The selection is clamped to the clip ([`TimeRange::clamped`]).
//! 3. A [`RenderPlan`] fits the oriented frame inside the requested box,
//!    never upscaling and keeping both edges even.
//! 4. GIFs sample the selection on a `1/fps` grid; videos measure the real
//!    source frame rate ([`frame_rate`]), cap the requested rate by it, and
//!    stream retimed frames into the encoder ([`transcode`]).
//! 5. Output goes to a hidden staging file that is renamed onto a fresh
//!    timestamped name only on success.
//!
//! ## Features
//!
//! - **Frame-rate negotiation** against unreliable declared rates
//! - **Orientation-aware geometry** with even output dimensions
//! - **Backpressured streaming** with bounded memory on both paths
//! - **Progress & cancellation** via [`ProgressCallback`] and
//!   [`CancellationToken`]
//! - **No partial output**: failed or cancelled jobs leave nothing behind
//!
//! ### Optional Features
//!
//! | Feature | Description |
//! |---------|-------------|
//! | `async` | [`export_async`] returning an awaitable `ExportFuture` via Tokio |
//! | `full` | Enables all of the above |
//!
//! ## Requirements
//!
//! FFmpeg development libraries must be installed on your system. H.264 and
//! HEVC output need an FFmpeg built with those encoders;
//! [`CodecProfile::Compatible`] works with any build.

pub mod animated_image;
pub mod bitrate;
mod conversion;
mod decode;
pub mod error;
pub mod export;
pub mod ffmpeg;
pub mod frame_rate;
pub mod geometry;
pub mod options;
pub mod output;
pub mod probe;
pub mod progress;
pub mod time_range;
pub mod transcode;
pub mod video;

pub use error::ClipError;
#[cfg(feature = "async")]
pub use export::{ExportFuture, export_async};
pub use export::{
    ExportHandle, ExportRequest, OutputArtifact, TranscodeJob, export_clip, spawn_export,
};
pub use ffmpeg::{FfmpegLogLevel, get_ffmpeg_log_level, set_ffmpeg_log_level};
pub use geometry::{AffineTransform, Orientation, PixelSize, Rect, RenderPlan};
pub use options::{AnimatedImageOptions, CodecProfile, ExportConfig, ExportOptions, VideoOptions};
pub use probe::SourceClip;
pub use progress::{CancellationToken, OperationType, ProgressCallback, ProgressInfo};
pub use time_range::TimeRange;
pub use transcode::{FrameSink, FrameSource, StreamTranscoder, TranscodeState};
