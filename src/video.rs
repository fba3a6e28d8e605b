//! FFmpeg ends of the video path.
//!
//! [`VideoFrameReader`] is the [`FrameSource`]: it decodes the selected
//! range, applies the render plan, and stamps frames relative to the range
//! start. [`EncoderSink`] is the [`FrameSink`]: it encodes frames with the
//! profile's codec into an MP4 container at a fixed `1/fps` time base.

use std::path::Path;

use ffmpeg_next::{
    Packet, Rational,
    codec::context::Context as CodecContext,
    encoder::Video as VideoEncoder,
    format::{Flags as FormatFlags, Pixel, context::Output},
    frame::Video as VideoFrame,
    picture::Type as PictureType,
};

use crate::decode::{ClipDecoder, RenderFilter};
use crate::error::ClipError;
use crate::geometry::{PixelSize, RenderPlan};
use crate::options::CodecProfile;
use crate::probe::SourceClip;
use crate::time_range::TimeRange;
use crate::transcode::{FrameSink, FrameSource, TimedFrame};

/// Pixel format fed to every encoder.
const ENCODER_PIXEL_FORMAT: &str = "yuv420p";

/// Keyframe interval, in seconds of output.
const KEYFRAME_INTERVAL_SECONDS: u32 = 2;

/// Reads rendered frames from `[start, end)` of a clip.
///
/// The frame on screen at `start` is emitted first, stamped at zero, even
/// when its own timestamp is earlier.
pub struct VideoFrameReader {
    decoder: ClipDecoder,
    filter: RenderFilter,
    range: TimeRange,
    /// Last decoded frame before `start`, waiting to be emitted at zero.
    held: Option<VideoFrame>,
    /// First in-range frame, decoded while looking for the held frame's end.
    pending: Option<(f64, VideoFrame)>,
    primed: bool,
    finished: bool,
}

impl VideoFrameReader {
    /// Open a reader over `range` of `clip` that renders through `plan`.
    ///
    /// # Errors
    ///
    /// [`ClipError::CannotCreateReader`] if the clip cannot be reopened,
    /// its decoder cannot be created, or the seek to `start` fails.
    pub fn open(clip: &SourceClip, range: TimeRange, plan: &RenderPlan) -> Result<Self, ClipError> {
        let mut decoder = ClipDecoder::open(clip)?;
        decoder.seek(range.start).map_err(|error| {
            ClipError::CannotCreateReader(format!("cannot seek to {:.3}s: {error}", range.start))
        })?;
        let filter = RenderFilter::new(plan, decoder.time_base(), ENCODER_PIXEL_FORMAT);
        log::debug!(
            "Opened frame reader over [{:.3}s, {:.3}s) of {}",
            range.start,
            range.end,
            clip.path.display()
        );
        Ok(Self {
            decoder,
            filter,
            range,
            held: None,
            pending: None,
            primed: false,
            finished: false,
        })
    }

    /// Decode until the first frame at or after `start`, remembering the
    /// last frame before it.
    fn prime(&mut self) -> Result<Option<(f64, VideoFrame)>, ClipError> {
        self.primed = true;
        loop {
            let mut frame = VideoFrame::empty();
            let Some(timestamp) = self.decoder.next_into(&mut frame)? else {
                // The range held only the pre-start frame, if any.
                return Ok(self.held.take().map(|frame| (self.range.start, frame)));
            };
            if timestamp < self.range.start {
                self.held = Some(frame);
                continue;
            }
            return Ok(match self.held.take() {
                Some(held) if timestamp > self.range.start => {
                    self.pending = Some((timestamp, frame));
                    Some((self.range.start, held))
                }
                _ => Some((timestamp, frame)),
            });
        }
    }

    fn next_decoded(&mut self) -> Result<Option<(f64, VideoFrame)>, ClipError> {
        if !self.primed {
            return self.prime();
        }
        if let Some(pending) = self.pending.take() {
            return Ok(Some(pending));
        }
        let mut frame = VideoFrame::empty();
        Ok(self
            .decoder
            .next_into(&mut frame)?
            .map(|timestamp| (timestamp, frame)))
    }
}

impl FrameSource for VideoFrameReader {
    type Frame = VideoFrame;

    fn next_frame(&mut self) -> Result<Option<TimedFrame<VideoFrame>>, ClipError> {
        if self.finished {
            return Ok(None);
        }
        let Some((timestamp, decoded)) = self.next_decoded()? else {
            self.finished = true;
            return Ok(None);
        };
        if timestamp >= self.range.end {
            self.finished = true;
            return Ok(None);
        }
        let frame = self.filter.apply(&decoded, timestamp)?;
        Ok(Some(TimedFrame {
            timestamp: timestamp - self.range.start,
            frame,
        }))
    }

    fn cancel(&mut self) {
        self.finished = true;
        self.held = None;
        self.pending = None;
    }
}

/// Encodes frames into an MP4 file.
pub struct EncoderSink {
    output: Output,
    encoder: VideoEncoder,
    stream_index: usize,
    encoder_time_base: Rational,
    stream_time_base: Rational,
    packet: Packet,
    input_closed: bool,
    finished: bool,
}

impl EncoderSink {
    /// Create the container at `path`, open the profile's encoder, and
    /// write the header.
    ///
    /// # Errors
    ///
    /// - [`ClipError::CannotCreateWriter`] if the container cannot be
    ///   created or the profile's encoder is not compiled into FFmpeg.
    /// - [`ClipError::CannotAddWriterInput`] if the stream cannot be added
    ///   or the encoder rejects the configuration.
    pub fn create(
        path: &Path,
        size: PixelSize,
        fps: u32,
        bitrate: u64,
        profile: CodecProfile,
    ) -> Result<Self, ClipError> {
        crate::ffmpeg::initialize()?;

        let codec_id = profile.codec_id();
        log::info!(
            "Opening {codec_id:?} encoder: {size} at {fps} fps, {:.2} Mbit/s",
            bitrate as f64 / 1_000_000.0
        );

        let mut output = ffmpeg_next::format::output_as(path, "mp4").map_err(|error| {
            ClipError::CannotCreateWriter(format!("cannot create {}: {error}", path.display()))
        })?;
        let needs_global_header = output.format().flags().contains(FormatFlags::GLOBAL_HEADER);

        let codec = ffmpeg_next::encoder::find(codec_id).ok_or_else(|| {
            ClipError::CannotCreateWriter(format!("no {codec_id:?} encoder available"))
        })?;

        let mut stream = output.add_stream(codec).map_err(|error| {
            ClipError::CannotAddWriterInput(format!("cannot add video stream: {error}"))
        })?;
        let stream_index = stream.index();

        let mut encoder = CodecContext::from_parameters(stream.parameters())
            .and_then(|context| context.encoder().video())
            .map_err(|error| {
                ClipError::CannotAddWriterInput(format!("cannot create encoder context: {error}"))
            })?;

        let encoder_time_base = Rational::new(1, fps as i32);
        encoder.set_width(size.width);
        encoder.set_height(size.height);
        encoder.set_format(Pixel::YUV420P);
        encoder.set_time_base(encoder_time_base);
        encoder.set_frame_rate(Some(Rational::new(fps as i32, 1)));
        encoder.set_bit_rate(bitrate as usize);
        encoder.set_gop(fps * KEYFRAME_INTERVAL_SECONDS);

        if needs_global_header {
            unsafe {
                (*encoder.as_mut_ptr()).flags |= ffmpeg_sys_next::AV_CODEC_FLAG_GLOBAL_HEADER as i32;
            }
        }

        let encoder = encoder.open_as(codec).map_err(|error| {
            ClipError::CannotAddWriterInput(format!("{codec_id:?} encoder rejected settings: {error}"))
        })?;
        stream.set_parameters(&encoder);
        stream.set_time_base(encoder_time_base);

        output.write_header().map_err(|error| {
            ClipError::CannotCreateWriter(format!("cannot write container header: {error}"))
        })?;

        // The muxer may pick its own stream time base while writing the header.
        let stream_time_base = output
            .stream(stream_index)
            .map(|stream| stream.time_base())
            .ok_or_else(|| ClipError::CannotAddWriterInput("video stream vanished".to_string()))?;

        Ok(Self {
            output,
            encoder,
            stream_index,
            encoder_time_base,
            stream_time_base,
            packet: Packet::empty(),
            input_closed: false,
            finished: false,
        })
    }

    /// Write every packet the encoder has ready.
    fn drain(&mut self) -> Result<(), ClipError> {
        while self.encoder.receive_packet(&mut self.packet).is_ok() {
            self.packet.set_stream(self.stream_index);
            stamp_frame_duration(&mut self.packet);
            self.packet
                .rescale_ts(self.encoder_time_base, self.stream_time_base);
            self.packet
                .write_interleaved(&mut self.output)
                .map_err(|error| ClipError::ExportFailed(format!("cannot write packet: {error}")))?;
        }
        Ok(())
    }
}

/// Give an encoded packet the duration of one output frame, which is one
/// tick of the encoder's `1/fps` time base, unless the encoder set one.
fn stamp_frame_duration(packet: &mut Packet) {
    if packet.duration() <= 0 {
        packet.set_duration(1);
    }
}

impl FrameSink for EncoderSink {
    type Frame = VideoFrame;

    fn wait_until_ready(&mut self) -> Result<(), ClipError> {
        if self.input_closed {
            return Err(ClipError::ExportFailed("encoder input already closed".to_string()));
        }
        self.drain()
    }

    fn append(&mut self, mut frame: VideoFrame, pts: i64) -> Result<(), ClipError> {
        frame.set_pts(Some(pts));
        // Let the encoder place keyframes on its own GOP.
        frame.set_kind(PictureType::None);
        self.encoder
            .send_frame(&frame)
            .map_err(|error| ClipError::ExportFailed(format!("encoder rejected frame {pts}: {error}")))
    }

    fn finish(&mut self) -> Result<(), ClipError> {
        self.input_closed = true;
        self.encoder
            .send_eof()
            .map_err(|error| ClipError::CannotFinalize(format!("cannot flush encoder: {error}")))?;
        self.drain()
            .map_err(|error| ClipError::CannotFinalize(error.to_string()))?;
        self.output
            .write_trailer()
            .map_err(|error| ClipError::CannotFinalize(format!("cannot write trailer: {error}")))?;
        self.finished = true;
        Ok(())
    }

    fn cancel(&mut self) {
        if !self.finished {
            log::debug!("Encoder sink cancelled before finalize");
        }
        self.input_closed = true;
    }
}
