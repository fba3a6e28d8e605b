//! Pull-based decoding and render-plan filtering.
//!
//! [`ClipDecoder`] reads packets from the clip's video stream and decodes
//! them one frame at a time, seeking when asked. [`RenderFilter`] applies a
//! [`RenderPlan`] to decoded frames with an FFmpeg filter graph
//! (orientation, scaling, pixel format). The graph is built from the first
//! frame it sees so the `buffer` source matches the decoder's real output.

use ffmpeg_next::{
    Error as FfmpegError, Packet, Rational, codec::context::Context as CodecContext,
    decoder::Video as VideoDecoder, filter::Graph as FilterGraph, format::context::Input,
    frame::Video as VideoFrame,
};
use ffmpeg_sys_next::AVPixelFormat;

use crate::error::ClipError;
use crate::geometry::RenderPlan;
use crate::probe::SourceClip;

/// Consecutive failed packet reads tolerated before decoding gives up.
const MAX_CONSECUTIVE_READ_ERRORS: u32 = 8;

/// Counts packet read failures since the last successful read.
#[derive(Debug, Default)]
struct ReadErrorBudget {
    consecutive: u32,
}

impl ReadErrorBudget {
    fn reset(&mut self) {
        self.consecutive = 0;
    }

    /// Record a failure; `true` once the budget is spent.
    fn exhausted_after_failure(&mut self) -> bool {
        self.consecutive += 1;
        self.consecutive >= MAX_CONSECUTIVE_READ_ERRORS
    }
}

/// Decodes the clip's video stream on demand.
pub(crate) struct ClipDecoder {
    input: Input,
    decoder: VideoDecoder,
    stream_index: usize,
    time_base: Rational,
    read_errors: ReadErrorBudget,
    last_timestamp: f64,
    eof_sent: bool,
    done: bool,
}

impl ClipDecoder {
    /// Open a fresh input context and decoder for `clip`.
    pub(crate) fn open(clip: &SourceClip) -> Result<Self, ClipError> {
        crate::ffmpeg::initialize()?;

        let input = ffmpeg_next::format::input(&clip.path).map_err(|error| {
            ClipError::CannotCreateReader(format!("cannot open {}: {error}", clip.path.display()))
        })?;

        let stream = input
            .stream(clip.video_stream_index)
            .ok_or(ClipError::MissingVideoTrack)?;
        let time_base = stream.time_base();
        let decoder = CodecContext::from_parameters(stream.parameters())
            .and_then(|context| context.decoder().video())
            .map_err(|error| {
                ClipError::CannotCreateReader(format!("cannot open {} decoder: {error}", clip.codec))
            })?;

        Ok(Self {
            input,
            decoder,
            stream_index: clip.video_stream_index,
            time_base,
            read_errors: ReadErrorBudget::default(),
            last_timestamp: 0.0,
            eof_sent: false,
            done: false,
        })
    }

    pub(crate) fn time_base(&self) -> Rational {
        self.time_base
    }

    /// Seek to the keyframe at or before `seconds` and reset the decoder.
    pub(crate) fn seek(&mut self, seconds: f64) -> Result<(), ClipError> {
        let target = crate::conversion::seconds_to_seek_timestamp(seconds);
        self.input
            .seek(target, ..target)
            .map_err(|error| ClipError::frame_extraction(seconds, format!("seek failed: {error}")))?;
        self.decoder.flush();
        self.read_errors.reset();
        self.last_timestamp = seconds;
        self.eof_sent = false;
        self.done = false;
        log::debug!("Seeked decoder to {seconds:.3}s");
        Ok(())
    }

    /// Decode the next frame into `frame` and return its presentation time
    /// in seconds, or `None` once the stream is exhausted.
    ///
    /// Frames without a timestamp get the best-effort timestamp FFmpeg
    /// guessed for them.
    pub(crate) fn next_into(&mut self, frame: &mut VideoFrame) -> Result<Option<f64>, ClipError> {
        if self.done {
            return Ok(None);
        }

        loop {
            if self.decoder.receive_frame(frame).is_ok() {
                let pts = frame.pts().or_else(|| frame.timestamp()).unwrap_or(0);
                let seconds = crate::conversion::pts_to_seconds(pts, self.time_base);
                self.last_timestamp = seconds;
                return Ok(Some(seconds));
            }

            if self.eof_sent {
                self.done = true;
                return Ok(None);
            }

            let mut packet = Packet::empty();
            match packet.read(&mut self.input) {
                Ok(()) => {
                    self.read_errors.reset();
                    if packet.stream() != self.stream_index {
                        continue;
                    }
                    if let Err(error) = self.decoder.send_packet(&packet) {
                        self.done = true;
                        let at = packet
                            .pts()
                            .map(|pts| crate::conversion::pts_to_seconds(pts, self.time_base))
                            .unwrap_or(0.0);
                        return Err(ClipError::frame_extraction(at, format!("decode failed: {error}")));
                    }
                }
                Err(FfmpegError::Eof) => {
                    self.eof_sent = true;
                    if let Err(error) = self.decoder.send_eof() {
                        self.done = true;
                        return Err(ClipError::frame_extraction(
                            self.last_timestamp,
                            format!("cannot flush decoder: {error}"),
                        ));
                    }
                }
                Err(error) => {
                    if self.read_errors.exhausted_after_failure() {
                        self.done = true;
                        return Err(ClipError::frame_extraction(
                            self.last_timestamp,
                            format!(
                                "{MAX_CONSECUTIVE_READ_ERRORS} consecutive packet reads failed: {error}"
                            ),
                        ));
                    }
                    log::warn!("Skipping unreadable packet: {error}");
                }
            }
        }
    }
}

/// Input properties the filter graph was configured for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct GraphInput {
    width: u32,
    height: u32,
    pixel_format: i32,
    color_space: i32,
    color_range: i32,
}

impl GraphInput {
    fn of(frame: &VideoFrame) -> Self {
        // The raw AVFrame fields are read directly: the safe enum accessors
        // do not round-trip every discriminant.
        let (color_space, color_range) = unsafe {
            let raw = frame.as_ptr();
            ((*raw).colorspace as i32, (*raw).color_range as i32)
        };
        Self {
            width: frame.width(),
            height: frame.height(),
            pixel_format: AVPixelFormat::from(frame.format()) as i32,
            color_space,
            color_range,
        }
    }
}

/// Applies a [`RenderPlan`] to decoded frames.
pub(crate) struct RenderFilter {
    spec: String,
    time_base: Rational,
    graph: Option<(GraphInput, FilterGraph)>,
}

impl RenderFilter {
    /// `pixel_format` is the FFmpeg name of the output format
    /// (`"rgba"` for images, `"yuv420p"` for encoders).
    pub(crate) fn new(plan: &RenderPlan, time_base: Rational, pixel_format: &str) -> Self {
        let spec = plan.filter_spec(pixel_format);
        log::debug!("Render filter chain: {spec}");
        Self {
            spec,
            time_base,
            graph: None,
        }
    }

    /// Run `input` through the graph and return the filtered frame.
    ///
    /// `timestamp` is only used to label errors.
    pub(crate) fn apply(&mut self, input: &VideoFrame, timestamp: f64) -> Result<VideoFrame, ClipError> {
        let graph = self.graph_for(input)?;

        graph
            .get("in")
            .ok_or_else(|| ClipError::frame_extraction(timestamp, "filter 'in' not found"))?
            .source()
            .add(input)
            .map_err(|error| ClipError::frame_extraction(timestamp, format!("cannot feed filter: {error}")))?;

        let mut output = VideoFrame::empty();
        graph
            .get("out")
            .ok_or_else(|| ClipError::frame_extraction(timestamp, "filter 'out' not found"))?
            .sink()
            .frame(&mut output)
            .map_err(|error| {
                ClipError::frame_extraction(timestamp, format!("filter produced no frame: {error}"))
            })?;
        Ok(output)
    }

    fn graph_for(&mut self, frame: &VideoFrame) -> Result<&mut FilterGraph, ClipError> {
        let wanted = GraphInput::of(frame);
        let stale = self.graph.as_ref().is_none_or(|(input, _)| *input != wanted);
        if stale {
            if self.graph.is_some() {
                log::debug!("Decoded frame properties changed, rebuilding render filter");
            }
            let graph = build_graph(&self.spec, self.time_base, wanted)?;
            self.graph = Some((wanted, graph));
        }
        match self.graph.as_mut() {
            Some((_, graph)) => Ok(graph),
            None => Err(ClipError::CannotCreateReader("render filter missing".to_string())),
        }
    }
}

fn build_graph(spec: &str, time_base: Rational, input: GraphInput) -> Result<FilterGraph, ClipError> {
    let graph_error = |what: &str, error: FfmpegError| {
        ClipError::CannotCreateReader(format!("render filter {what}: {error}"))
    };

    let mut graph = FilterGraph::new();
    let buffer_args = format!(
        "video_size={}x{}:pix_fmt={}:time_base={}/{}:pixel_aspect=1/1:colorspace={}:range={}",
        input.width,
        input.height,
        input.pixel_format,
        time_base.numerator(),
        time_base.denominator().max(1),
        input.color_space,
        input.color_range,
    );

    let buffer = ffmpeg_next::filter::find("buffer")
        .ok_or_else(|| ClipError::CannotCreateReader("FFmpeg 'buffer' filter not found".to_string()))?;
    let buffersink = ffmpeg_next::filter::find("buffersink").ok_or_else(|| {
        ClipError::CannotCreateReader("FFmpeg 'buffersink' filter not found".to_string())
    })?;

    graph
        .add(&buffer, "in", &buffer_args)
        .map_err(|error| graph_error("source", error))?;
    graph
        .add(&buffersink, "out", "")
        .map_err(|error| graph_error("sink", error))?;
    graph
        .output("in", 0)
        .map_err(|error| graph_error("output", error))?
        .input("out", 0)
        .map_err(|error| graph_error("input", error))?
        .parse(spec)
        .map_err(|error| graph_error("parse", error))?;
    graph
        .validate()
        .map_err(|error| graph_error("validation", error))?;

    Ok(graph)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn persistent_read_errors_exhaust_the_budget() {
        let mut budget = ReadErrorBudget::default();
        for _ in 1..MAX_CONSECUTIVE_READ_ERRORS {
            assert!(!budget.exhausted_after_failure());
        }
        assert!(budget.exhausted_after_failure());
    }

    #[test]
    fn a_good_read_restores_the_budget() {
        let mut budget = ReadErrorBudget::default();
        for _ in 1..MAX_CONSECUTIVE_READ_ERRORS {
            budget.exhausted_after_failure();
        }
        budget.reset();
        assert!(!budget.exhausted_after_failure());
    }
}
