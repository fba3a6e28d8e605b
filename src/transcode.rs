//! Streaming transcode driver for the video path.
//!
//! [`StreamTranscoder`] moves frames from a pull-based [`FrameSource`] into
//! a push-based [`FrameSink`], retiming them onto a uniform output grid on
//! the way. It is generic over both ends; the FFmpeg reader and encoder live
//! in [`crate::video`].
//!
//! The driver walks a fixed state machine:
//!
//! ```text
//! Idle ─▶ ReaderStarted ─▶ WriterStarted ─▶ Streaming ─▶ Finished
//!   │            │                │             │
//!   └────────────┴────────────────┴─────────────┴──▶ Failed
//! ```
//!
//! Before every pull it blocks until the sink can take more input, so at
//! most one decoded frame is in flight between the two ends.

use crate::error::ClipError;
use crate::options::ExportConfig;
use crate::progress::{OperationType, ProgressTracker};

/// A source frame with its presentation time, in seconds relative to the
/// start of the selected range.
#[derive(Debug, Clone, PartialEq)]
pub struct TimedFrame<F> {
    /// Seconds since the range start.
    pub timestamp: f64,
    /// The frame payload.
    pub frame: F,
}

/// Pull side of the pipeline.
pub trait FrameSource {
    /// Frame payload handed to the sink.
    type Frame;

    /// Produce the next frame, or `None` once the range is exhausted.
    ///
    /// Errors should be [`ClipError::FrameExtractionFailed`] when a frame
    /// could not be produced.
    fn next_frame(&mut self) -> Result<Option<TimedFrame<Self::Frame>>, ClipError>;

    /// Stop reading and release resources early.
    fn cancel(&mut self) {}
}

/// Push side of the pipeline.
pub trait FrameSink {
    /// Frame payload accepted by the sink.
    type Frame;

    /// Block until the sink can accept another frame.
    fn wait_until_ready(&mut self) -> Result<(), ClipError>;

    /// Append `frame` with the given presentation index, in units of one
    /// output frame duration.
    fn append(&mut self, frame: Self::Frame, pts: i64) -> Result<(), ClipError>;

    /// Close the input, flush, and finalize the output.
    fn finish(&mut self) -> Result<(), ClipError>;

    /// Abandon the output.
    fn cancel(&mut self) {}
}

/// Lifecycle of a [`StreamTranscoder`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TranscodeState {
    /// Nothing opened yet.
    Idle,
    /// The frame source is open.
    ReaderStarted,
    /// The sink is open and ready for its first frame.
    WriterStarted,
    /// Frames are flowing.
    Streaming,
    /// The sink finalized successfully.
    Finished,
    /// A stage failed or the job was cancelled.
    Failed,
}

/// Timestamp tolerance for gating, well below any real frame interval.
const GATE_TOLERANCE: f64 = 1e-6;

/// Gates source frames onto a uniform output grid.
///
/// A frame is dropped if it arrives before the previous kept frame's
/// timestamp plus one output frame duration. Kept frames get consecutive
/// presentation indices, so output timing is uniform regardless of source
/// jitter. Frames are never duplicated or interpolated.
///
/// # Example
///
/// ```
/// use clipcast::transcode::Retimer;
///
/// // 60 fps source, 30 fps output: every other frame survives.
/// let mut retimer = Retimer::new(30);
/// let kept: Vec<_> = (0..6)
///     .filter_map(|i| retimer.admit(i as f64 / 60.0))
///     .collect();
/// assert_eq!(kept, vec![0, 1, 2]);
/// ```
#[derive(Debug, Clone)]
pub struct Retimer {
    frame_duration: f64,
    frame_index: i64,
    next_allowed: f64,
}

impl Retimer {
    /// Create a retimer for an output rate of `fps` (minimum 1).
    pub fn new(fps: u32) -> Self {
        Self {
            frame_duration: 1.0 / f64::from(fps.max(1)),
            frame_index: 0,
            next_allowed: f64::NEG_INFINITY,
        }
    }

    /// Offer a source frame at `timestamp`; returns its output index if kept.
    pub fn admit(&mut self, timestamp: f64) -> Option<i64> {
        if timestamp < self.next_allowed - GATE_TOLERANCE {
            return None;
        }
        let pts = self.frame_index;
        self.next_allowed = timestamp + self.frame_duration;
        self.frame_index += 1;
        Some(pts)
    }

    /// Frames kept so far.
    pub fn frames_written(&self) -> u64 {
        self.frame_index as u64
    }

    /// Total presentation time of the kept frames.
    pub fn output_duration(&self) -> f64 {
        self.frame_index as f64 * self.frame_duration
    }
}

/// Result of a completed transcode.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TranscodeSummary {
    /// Frames pulled from the source.
    pub frames_read: u64,
    /// Frames appended to the sink.
    pub frames_written: u64,
    /// Total output presentation time, in seconds.
    pub output_duration: f64,
}

/// Drives a [`FrameSource`] into a [`FrameSink`] through a [`Retimer`].
pub struct StreamTranscoder<S, K> {
    state: TranscodeState,
    source: Option<S>,
    sink: Option<K>,
    retimer: Retimer,
}

impl<S, K> StreamTranscoder<S, K>
where
    S: FrameSource,
    K: FrameSink<Frame = S::Frame>,
{
    /// Create an idle transcoder producing `fps` frames per second.
    pub fn new(fps: u32) -> Self {
        Self {
            state: TranscodeState::Idle,
            source: None,
            sink: None,
            retimer: Retimer::new(fps),
        }
    }

    /// Current lifecycle state.
    pub fn state(&self) -> TranscodeState {
        self.state
    }

    /// Open the frame source.
    ///
    /// # Errors
    ///
    /// Whatever `open` returns (normally [`ClipError::CannotCreateReader`]),
    /// or [`ClipError::ExportFailed`] if called out of order.
    pub fn start_reader<F>(&mut self, open: F) -> Result<(), ClipError>
    where
        F: FnOnce() -> Result<S, ClipError>,
    {
        self.expect_state(TranscodeState::Idle)?;
        match open() {
            Ok(source) => {
                self.source = Some(source);
                self.state = TranscodeState::ReaderStarted;
                Ok(())
            }
            Err(error) => Err(self.fail(error)),
        }
    }

    /// Open the sink. The reader is cancelled if this fails.
    ///
    /// # Errors
    ///
    /// Whatever `open` returns (normally [`ClipError::CannotCreateWriter`] or
    /// [`ClipError::CannotAddWriterInput`]), or [`ClipError::ExportFailed`]
    /// if called out of order.
    pub fn start_writer<F>(&mut self, open: F) -> Result<(), ClipError>
    where
        F: FnOnce() -> Result<K, ClipError>,
    {
        self.expect_state(TranscodeState::ReaderStarted)?;
        match open() {
            Ok(sink) => {
                self.sink = Some(sink);
                self.state = TranscodeState::WriterStarted;
                Ok(())
            }
            Err(error) => Err(self.fail(error)),
        }
    }

    /// Stream every source frame into the sink and finalize it.
    ///
    /// `expected_frames` only feeds progress reporting.
    ///
    /// # Errors
    ///
    /// - [`ClipError::Cancelled`] if the config's token fires.
    /// - The source's error if a frame cannot be produced.
    /// - The sink's error if an append or finalize fails.
    ///
    /// Both ends are cancelled before any error is returned.
    pub fn run(
        &mut self,
        config: &ExportConfig,
        expected_frames: Option<u64>,
    ) -> Result<TranscodeSummary, ClipError> {
        self.expect_state(TranscodeState::WriterStarted)?;
        self.state = TranscodeState::Streaming;

        let mut tracker = ProgressTracker::new(
            config.progress.clone(),
            OperationType::VideoExport,
            expected_frames,
            config.batch_size,
        );
        let mut frames_read = 0u64;

        loop {
            if config.is_cancelled() {
                log::info!("Video export cancelled after {frames_read} source frames");
                return Err(self.fail(ClipError::Cancelled));
            }

            let step = match (self.source.as_mut(), self.sink.as_mut()) {
                (Some(source), Some(sink)) => Self::step(source, sink, &mut self.retimer),
                _ => Err(ClipError::ExportFailed("transcoder lost its reader or writer".to_string())),
            };

            match step {
                Ok(Step::Pulled { written }) => {
                    frames_read += 1;
                    if written {
                        let written_until = self.retimer.output_duration();
                        tracker.advance(Some(written_until));
                    }
                }
                Ok(Step::Exhausted) => break,
                Err(error) => return Err(self.fail(error)),
            }
        }

        if let Some(source) = self.source.as_mut() {
            source.cancel();
        }
        let finished = match self.sink.as_mut() {
            Some(sink) => sink.finish(),
            None => Err(ClipError::ExportFailed("transcoder lost its writer".to_string())),
        };
        if let Err(error) = finished {
            return Err(self.fail(error));
        }

        self.state = TranscodeState::Finished;
        tracker.finish();

        let summary = TranscodeSummary {
            frames_read,
            frames_written: self.retimer.frames_written(),
            output_duration: self.retimer.output_duration(),
        };
        log::debug!(
            "Transcode finished: {} of {} frames kept, {:.3}s of output",
            summary.frames_written,
            summary.frames_read,
            summary.output_duration
        );
        Ok(summary)
    }

    fn step(source: &mut S, sink: &mut K, retimer: &mut Retimer) -> Result<Step, ClipError> {
        sink.wait_until_ready()?;
        let Some(timed) = source.next_frame()? else {
            return Ok(Step::Exhausted);
        };
        match retimer.admit(timed.timestamp) {
            Some(pts) => {
                sink.append(timed.frame, pts)?;
                Ok(Step::Pulled { written: true })
            }
            None => Ok(Step::Pulled { written: false }),
        }
    }

    fn expect_state(&mut self, expected: TranscodeState) -> Result<(), ClipError> {
        if self.state == expected {
            return Ok(());
        }
        let error = ClipError::ExportFailed(format!(
            "transcoder is {:?}, expected {:?}",
            self.state, expected
        ));
        Err(self.fail(error))
    }

    fn fail(&mut self, error: ClipError) -> ClipError {
        self.state = TranscodeState::Failed;
        if let Some(source) = self.source.as_mut() {
            source.cancel();
        }
        if let Some(sink) = self.sink.as_mut() {
            sink.cancel();
        }
        log::debug!("Transcode failed: {error}");
        error
    }
}

enum Step {
    Pulled { written: bool },
    Exhausted,
}
