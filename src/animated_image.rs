//! Animated GIF export.
//!
//! Unlike the video path, the animated path samples the selection on a
//! fixed grid of `1/fps` steps. Each grid point gets exactly one frame, the
//! one on screen at that instant, oriented and scaled by the render plan and
//! quantized to a 256-colour palette. Frames are streamed into the encoder
//! as they are produced, so memory use does not grow with clip length.
//!
//! GIF delays are whole centiseconds. [`DelaySchedule`] rounds cumulative
//! presentation time instead of each delay, so a 15 fps clip alternates 7
//! and 6 centisecond delays and its total playback time stays on target.

use std::io::{BufWriter, Write};
use std::mem;

use ffmpeg_next::frame::Video as VideoFrame;
use gif::{Encoder, Frame, Repeat};
use image::RgbaImage;

use crate::decode::{ClipDecoder, RenderFilter};
use crate::error::ClipError;
use crate::geometry::{PixelSize, RenderPlan};
use crate::options::{AnimatedImageOptions, ExportConfig};
use crate::probe::SourceClip;
use crate::progress::{OperationType, ProgressTracker};
use crate::time_range::TimeRange;

/// Guards grid arithmetic against representation error (`4.2 × 15`).
const GRID_EPSILON: f64 = 1e-9;

/// NeuQuant sampling factor: 1 is slowest and best, 30 fastest.
const QUANTIZER_SPEED: i32 = 10;

/// Number of frames sampled from `duration` seconds at `fps`.
///
/// `max(1, ceil(duration × fps))`.
///
/// ```
/// use clipcast::animated_image::frame_count;
///
/// assert_eq!(frame_count(5.4 - 1.2, 15), 63);
/// assert_eq!(frame_count(0.01, 15), 1);
/// ```
pub fn frame_count(duration: f64, fps: u32) -> u64 {
    let exact = duration.max(0.0) * f64::from(fps);
    ((exact - GRID_EPSILON).ceil() as u64).max(1)
}

/// Source timestamps to sample: `start + i / fps`, dropping any past `end`.
pub fn sample_timestamps(range: TimeRange, fps: u32) -> Vec<f64> {
    let fps = fps.max(1);
    (0..frame_count(range.duration(), fps))
        .map(|i| range.start + i as f64 / f64::from(fps))
        .filter(|&t| t <= range.end + GRID_EPSILON)
        .collect()
}

/// Display time of one GIF frame.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FrameDelay {
    /// Delay written to the file, in hundredths of a second.
    pub centiseconds: u16,
    /// Intended delay before rounding, in seconds.
    pub seconds: f64,
}

/// Produces per-frame delays whose rounding error does not accumulate.
#[derive(Debug, Clone)]
pub struct DelaySchedule {
    seconds: f64,
    emitted: u64,
    elapsed_centiseconds: u64,
}

impl DelaySchedule {
    /// Schedule for a constant frame rate.
    pub fn new(fps: u32) -> Self {
        Self {
            seconds: 1.0 / f64::from(fps.max(1)),
            emitted: 0,
            elapsed_centiseconds: 0,
        }
    }
}

impl Iterator for DelaySchedule {
    type Item = FrameDelay;

    fn next(&mut self) -> Option<FrameDelay> {
        self.emitted += 1;
        let target = (self.emitted as f64 * self.seconds * 100.0).round() as u64;
        let centiseconds = target.saturating_sub(self.elapsed_centiseconds);
        self.elapsed_centiseconds = target;
        Some(FrameDelay {
            centiseconds: u16::try_from(centiseconds).unwrap_or(u16::MAX),
            seconds: self.seconds,
        })
    }
}

/// Streams RGBA frames into an animated GIF.
pub struct AnimatedImageWriter<W: Write> {
    encoder: Encoder<BufWriter<W>>,
    width: u16,
    height: u16,
    frames_written: u64,
}

impl<W: Write> AnimatedImageWriter<W> {
    /// Write the GIF header for `size` frames into `writer`.
    ///
    /// Looping GIFs get a NETSCAPE extension with an infinite count;
    /// play-once GIFs get none.
    ///
    /// # Errors
    ///
    /// [`ClipError::CannotCreateWriter`] if the size does not fit a GIF or
    /// the header cannot be written.
    pub fn new(writer: W, size: PixelSize, loop_forever: bool) -> Result<Self, ClipError> {
        let (width, height) = match (u16::try_from(size.width), u16::try_from(size.height)) {
            (Ok(width), Ok(height)) => (width, height),
            _ => {
                return Err(ClipError::CannotCreateWriter(format!(
                    "{size} exceeds the GIF size limit"
                )));
            }
        };

        let mut encoder = Encoder::new(BufWriter::new(writer), width, height, &[])
            .map_err(|error| ClipError::CannotCreateWriter(format!("cannot start GIF: {error}")))?;
        if loop_forever {
            encoder.set_repeat(Repeat::Infinite).map_err(|error| {
                ClipError::CannotCreateWriter(format!("cannot set GIF loop count: {error}"))
            })?;
        }

        Ok(Self {
            encoder,
            width,
            height,
            frames_written: 0,
        })
    }

    /// Quantize and append one frame.
    ///
    /// # Errors
    ///
    /// [`ClipError::ExportFailed`] on a size mismatch or write failure.
    pub fn write_frame(&mut self, image: RgbaImage, delay: FrameDelay) -> Result<(), ClipError> {
        if image.width() != u32::from(self.width) || image.height() != u32::from(self.height) {
            return Err(ClipError::ExportFailed(format!(
                "frame is {}x{}, expected {}x{}",
                image.width(),
                image.height(),
                self.width,
                self.height
            )));
        }
        let mut pixels = image.into_raw();
        let mut frame = Frame::from_rgba_speed(self.width, self.height, &mut pixels, QUANTIZER_SPEED);
        frame.delay = delay.centiseconds;
        log::trace!(
            "GIF frame {}: delay {}cs for {:.4}s",
            self.frames_written,
            delay.centiseconds,
            delay.seconds
        );
        self.encoder
            .write_frame(&frame)
            .map_err(|error| ClipError::ExportFailed(format!("cannot write GIF frame: {error}")))?;
        self.frames_written += 1;
        Ok(())
    }

    /// Frames appended so far.
    pub fn frames_written(&self) -> u64 {
        self.frames_written
    }

    /// Write the trailer, flush, and hand back the writer.
    ///
    /// # Errors
    ///
    /// [`ClipError::CannotFinalize`] if the trailer or flush fails.
    pub fn finish(self) -> Result<W, ClipError> {
        let buffered = self
            .encoder
            .into_inner()
            .map_err(|error| ClipError::CannotFinalize(format!("cannot write GIF trailer: {error}")))?;
        buffered
            .into_inner()
            .map_err(|error| ClipError::CannotFinalize(format!("cannot flush GIF: {}", error.error())))
    }
}

/// Extracts the frame on screen at arbitrary, mostly increasing, timestamps.
///
/// Decoding only moves forward; the decoder seeks when asked for a time
/// before the current frame or before anything has been decoded.
pub(crate) struct FrameExtractor {
    decoder: ClipDecoder,
    filter: RenderFilter,
    size: PixelSize,
    current: Option<f64>,
    current_frame: VideoFrame,
    lookahead: Option<f64>,
    lookahead_frame: VideoFrame,
    exhausted: bool,
}

impl FrameExtractor {
    pub(crate) fn open(clip: &SourceClip, plan: &RenderPlan) -> Result<Self, ClipError> {
        let decoder = ClipDecoder::open(clip)?;
        let filter = RenderFilter::new(plan, decoder.time_base(), "rgba");
        Ok(Self {
            decoder,
            filter,
            size: plan.output_size,
            current: None,
            current_frame: VideoFrame::empty(),
            lookahead: None,
            lookahead_frame: VideoFrame::empty(),
            exhausted: false,
        })
    }

    /// The last frame with a presentation time at or before `timestamp`,
    /// rendered to RGBA.
    ///
    /// A timestamp before the clip's first frame yields the first frame; one
    /// past the last frame yields the last.
    ///
    /// # Errors
    ///
    /// [`ClipError::FrameExtractionFailed`] if seeking, decoding, or
    /// rendering fails, or the clip has no decodable frame.
    pub(crate) fn frame_at(&mut self, timestamp: f64) -> Result<RgbaImage, ClipError> {
        let rewinding = self.current.is_some_and(|current| current > timestamp);
        let untouched = self.current.is_none() && self.lookahead.is_none() && !self.exhausted;
        if rewinding || untouched {
            self.decoder.seek(timestamp)?;
            self.current = None;
            self.lookahead = None;
            self.exhausted = false;
        }

        loop {
            if self.lookahead.is_none() && !self.exhausted {
                self.lookahead = self.decoder.next_into(&mut self.lookahead_frame)?;
                self.exhausted = self.lookahead.is_none();
            }
            match self.lookahead {
                Some(next) if next <= timestamp => {
                    mem::swap(&mut self.current_frame, &mut self.lookahead_frame);
                    self.current = self.lookahead.take();
                }
                _ => break,
            }
        }

        let (frame_time, frame) = match (self.current, self.lookahead) {
            (Some(time), _) => (time, &self.current_frame),
            (None, Some(time)) => {
                log::debug!("No frame at or before {timestamp:.3}s, using the one at {time:.3}s");
                (time, &self.lookahead_frame)
            }
            (None, None) => {
                return Err(ClipError::frame_extraction(timestamp, "no decodable frame"));
            }
        };

        let rendered = self.filter.apply(frame, frame_time)?;
        let buffer = crate::conversion::frame_to_buffer(&rendered, self.size.width, self.size.height, 4);
        RgbaImage::from_raw(self.size.width, self.size.height, buffer).ok_or_else(|| {
            ClipError::frame_extraction(timestamp, "rendered frame has an unexpected size")
        })
    }
}

/// Sample `range` of `clip` and stream the frames into a GIF on `writer`.
///
/// Returns the writer and the number of frames written.
pub(crate) fn write_animated_image<W: Write>(
    clip: &SourceClip,
    range: TimeRange,
    plan: &RenderPlan,
    options: &AnimatedImageOptions,
    writer: W,
    config: &ExportConfig,
) -> Result<(W, u64), ClipError> {
    let timestamps = sample_timestamps(range, options.fps);
    log::debug!(
        "Sampling {} frames at {} fps from [{:.3}s, {:.3}s]",
        timestamps.len(),
        options.fps,
        range.start,
        range.end
    );

    let mut extractor = FrameExtractor::open(clip, plan)?;
    let mut gif = AnimatedImageWriter::new(writer, plan.output_size, options.loop_forever)?;
    let mut tracker = ProgressTracker::new(
        config.progress.clone(),
        OperationType::AnimatedImageExport,
        Some(timestamps.len() as u64),
        config.batch_size,
    );

    for (&timestamp, delay) in timestamps.iter().zip(DelaySchedule::new(options.fps)) {
        if config.is_cancelled() {
            log::info!("Animated export cancelled after {} frames", gif.frames_written());
            return Err(ClipError::Cancelled);
        }
        let image = extractor.frame_at(timestamp)?;
        gif.write_frame(image, delay)?;
        tracker.advance(Some(timestamp - range.start));
    }

    let frames = gif.frames_written();
    let writer = gif.finish()?;
    tracker.finish();
    Ok((writer, frames))
}
