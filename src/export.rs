//! Export orchestration.
//!
//! [`export_clip`] runs one export to completion on the calling thread:
//! validate the request, probe the source, plan the job, stream it into a
//! staging file, and commit that file under a fresh name. [`spawn_export`]
//! does the same on a dedicated worker thread and hands back an
//! [`ExportHandle`]; with the `async` feature, [`export_async`] returns an
//! awaitable [`ExportFuture`].
//!
//! # Example
//!
//! ```no_run
//! use clipcast::{
//!     AnimatedImageOptions, ExportConfig, ExportOptions, ExportRequest, TimeRange, export_clip,
//! };
//!
//! let request = ExportRequest::new(
//!     "recording.mov",
//!     TimeRange::new(1.2, 5.4),
//!     "/tmp/clips",
//!     ExportOptions::AnimatedImage(AnimatedImageOptions::new().fps(15)),
//! );
//! let artifact = export_clip(&request, &ExportConfig::new())?;
//! println!("{} ({} bytes)", artifact.path.display(), artifact.byte_size);
//! # Ok::<(), clipcast::ClipError>(())
//! ```

use std::path::PathBuf;
use std::sync::mpsc::{Receiver, TryRecvError, sync_channel};
use std::thread::{Builder as ThreadBuilder, JoinHandle};

use crate::animated_image::{frame_count, write_animated_image};
use crate::bitrate::estimate_bitrate;
use crate::error::ClipError;
use crate::frame_rate::{estimate_frame_rate, negotiate_effective_fps};
use crate::geometry::RenderPlan;
use crate::options::{AnimatedImageOptions, CodecProfile, ExportConfig, ExportOptions};
use crate::output::{OutputNamer, StagedOutput, ensure_directory};
use crate::probe::SourceClip;
use crate::progress::CancellationToken;
use crate::time_range::TimeRange;
use crate::transcode::StreamTranscoder;
use crate::video::{EncoderSink, VideoFrameReader};

/// Everything needed to export one clip.
#[derive(Debug, Clone, PartialEq)]
pub struct ExportRequest {
    /// The source recording. Never modified or deleted.
    pub source: PathBuf,
    /// Selection within the source, in seconds. Clamped to the clip.
    pub range: TimeRange,
    /// Directory that receives the output. Created if missing.
    pub output_dir: PathBuf,
    /// Output kind and settings.
    pub options: ExportOptions,
}

impl ExportRequest {
    /// Bundle the inputs of an export.
    pub fn new(
        source: impl Into<PathBuf>,
        range: TimeRange,
        output_dir: impl Into<PathBuf>,
        options: ExportOptions,
    ) -> Self {
        Self {
            source: source.into(),
            range,
            output_dir: output_dir.into(),
            options,
        }
    }
}

/// A finished export.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputArtifact {
    /// Absolute path of the output file.
    pub path: PathBuf,
    /// Size of the output file in bytes.
    pub byte_size: u64,
}

/// Parameters derived for the chosen output kind.
#[derive(Debug, Clone, PartialEq)]
enum JobKind {
    AnimatedImage(AnimatedImageOptions),
    Video {
        fps: u32,
        bitrate: u64,
        profile: CodecProfile,
    },
}

/// A validated, fully planned export.
///
/// Preparing a job probes the source and computes every derived parameter
/// but opens no reader or writer. Running it consumes the job.
#[derive(Debug, Clone)]
pub struct TranscodeJob {
    clip: SourceClip,
    range: TimeRange,
    plan: RenderPlan,
    output_dir: PathBuf,
    kind: JobKind,
}

impl TranscodeJob {
    /// Validate `request` and plan the export.
    ///
    /// # Errors
    ///
    /// - [`ClipError::InvalidOptions`] for zero or undersized settings.
    /// - Any [`SourceClip::probe`] error.
    /// - [`ClipError::InvalidTimeRange`] if the clamped selection is empty.
    pub fn prepare(request: &ExportRequest) -> Result<Self, ClipError> {
        request.options.validate()?;
        let clip = SourceClip::probe(&request.source)?;
        let range = request.range.clamped(clip.duration)?;

        let (plan, kind) = match &request.options {
            ExportOptions::AnimatedImage(options) => {
                let edge = options.max_pixel_dimension;
                let plan = RenderPlan::compute(clip.natural_size, clip.orientation, (edge, edge));
                (plan, JobKind::AnimatedImage(options.clone()))
            }
            ExportOptions::Video(options) => {
                let plan = RenderPlan::compute(
                    clip.natural_size,
                    clip.orientation,
                    options.max_render_size,
                );
                let measured = estimate_frame_rate(&clip, range);
                if measured.is_none() {
                    log::warn!(
                        "Could not measure the source frame rate, falling back to the declared {:.3} fps",
                        clip.nominal_frame_rate
                    );
                }
                let fps = negotiate_effective_fps(options.target_fps, measured, clip.nominal_frame_rate);
                let bitrate = estimate_bitrate(plan.output_size, fps, options.codec_profile);
                log::debug!(
                    "Video parameters: requested {} fps, measured {:?}, effective {} fps, {} bit/s",
                    options.target_fps,
                    measured,
                    fps,
                    bitrate
                );
                let kind = JobKind::Video {
                    fps,
                    bitrate,
                    profile: options.codec_profile,
                };
                (plan, kind)
            }
        };

        Ok(Self {
            clip,
            range,
            plan,
            output_dir: request.output_dir.clone(),
            kind,
        })
    }

    /// The probed source.
    pub fn clip(&self) -> &SourceClip {
        &self.clip
    }

    /// The selection after clamping.
    pub fn range(&self) -> TimeRange {
        self.range
    }

    /// The render geometry shared by every frame.
    pub fn plan(&self) -> &RenderPlan {
        &self.plan
    }

    /// Output frame rate: the requested rate for GIFs, the negotiated one
    /// for video.
    pub fn output_fps(&self) -> u32 {
        match &self.kind {
            JobKind::AnimatedImage(options) => options.fps,
            JobKind::Video { fps, .. } => *fps,
        }
    }

    /// Frames the export is expected to write.
    pub fn expected_frames(&self) -> u64 {
        frame_count(self.range.duration(), self.output_fps())
    }

    fn extension(&self) -> &'static str {
        match self.kind {
            JobKind::AnimatedImage(_) => "gif",
            JobKind::Video { .. } => "mp4",
        }
    }

    /// Run the export and commit its output.
    ///
    /// # Errors
    ///
    /// Any stage error. Nothing is left in the output directory on failure.
    pub fn run(self, config: &ExportConfig) -> Result<OutputArtifact, ClipError> {
        ensure_directory(&self.output_dir)?;
        let output_dir = std::path::absolute(&self.output_dir)?;
        let namer = OutputNamer::new(config.file_stem.clone(), self.extension());
        let mut staged = StagedOutput::create(&output_dir, namer)?;

        log::info!(
            "Exporting [{:.3}s, {:.3}s] of {} as {} at {} fps, {}",
            self.range.start,
            self.range.end,
            self.clip.path.display(),
            self.extension(),
            self.output_fps(),
            self.plan.output_size
        );

        match &self.kind {
            JobKind::AnimatedImage(options) => {
                let (_, frames) = write_animated_image(
                    &self.clip,
                    self.range,
                    &self.plan,
                    options,
                    staged.as_file_mut(),
                    config,
                )?;
                log::debug!("Wrote {frames} GIF frames");
            }
            JobKind::Video {
                fps,
                bitrate,
                profile,
            } => {
                let mut transcoder = StreamTranscoder::new(*fps);
                transcoder.start_reader(|| VideoFrameReader::open(&self.clip, self.range, &self.plan))?;
                transcoder.start_writer(|| {
                    EncoderSink::create(staged.path(), self.plan.output_size, *fps, *bitrate, *profile)
                })?;
                let summary = transcoder.run(config, Some(self.expected_frames()))?;
                // Closes the encoder's handle on the staging file.
                drop(transcoder);
                if summary.frames_written == 0 {
                    return Err(ClipError::ExportFailed(
                        "the selection contains no decodable frames".to_string(),
                    ));
                }
            }
        }

        let path = staged.commit()?;
        let byte_size = std::fs::metadata(&path)?.len();
        log::info!("Export finished: {} ({byte_size} bytes)", path.display());
        Ok(OutputArtifact { path, byte_size })
    }
}

/// Export a clip on the calling thread.
///
/// Blocks until the output is committed. Use [`spawn_export`] to keep the
/// caller responsive.
///
/// # Errors
///
/// Any [`ClipError`]; see [`TranscodeJob::prepare`] and
/// [`TranscodeJob::run`]. Selection errors are reported before any reader
/// or writer exists.
pub fn export_clip(request: &ExportRequest, config: &ExportConfig) -> Result<OutputArtifact, ClipError> {
    TranscodeJob::prepare(request)?.run(config)
}

/// An export running on a worker thread.
///
/// The worker reports once. [`try_result`](Self::try_result) keeps the
/// delivered outcome, so later polls and [`wait`](Self::wait) see the same
/// result.
#[derive(Debug)]
pub struct ExportHandle {
    receiver: Receiver<Result<OutputArtifact, ClipError>>,
    outcome: Option<Result<OutputArtifact, ClipError>>,
    token: CancellationToken,
    thread: Option<JoinHandle<()>>,
}

impl ExportHandle {
    /// Ask the worker to stop. The export then fails with
    /// [`ClipError::Cancelled`] and leaves no output.
    pub fn cancel(&self) {
        self.token.cancel();
    }

    /// Block until the export finishes.
    ///
    /// # Errors
    ///
    /// The export's error, or [`ClipError::ExportFailed`] if the worker
    /// died without reporting.
    pub fn wait(mut self) -> Result<OutputArtifact, ClipError> {
        let result = match self.outcome.take() {
            Some(result) => result,
            None => self.receiver.recv().unwrap_or_else(|_| Err(worker_lost())),
        };
        if let Some(thread) = self.thread.take() {
            let _ = thread.join();
        }
        result
    }

    /// The outcome if the export has finished, without blocking.
    pub fn try_result(&mut self) -> Option<&Result<OutputArtifact, ClipError>> {
        if self.outcome.is_none() {
            self.outcome = match self.receiver.try_recv() {
                Ok(result) => Some(result),
                Err(TryRecvError::Empty) => None,
                Err(TryRecvError::Disconnected) => Some(Err(worker_lost())),
            };
        }
        self.outcome.as_ref()
    }
}

fn worker_lost() -> ClipError {
    ClipError::ExportFailed("export worker stopped without a result".to_string())
}

/// Start an export on a dedicated worker thread.
///
/// The config's cancellation token is shared with the returned handle; one
/// is created if the config has none.
pub fn spawn_export(request: ExportRequest, config: ExportConfig) -> ExportHandle {
    let token = config.cancellation.clone().unwrap_or_default();
    let config = config.with_cancellation(token.clone());
    let (sender, receiver) = sync_channel(1);
    let fallback = sender.clone();

    let spawned = ThreadBuilder::new()
        .name("clipcast-export".to_string())
        .spawn(move || {
            let result = export_clip(&request, &config);
            // The handle may already be gone; the output is committed either way.
            let _ = sender.send(result);
        });

    let thread = match spawned {
        Ok(thread) => Some(thread),
        Err(error) => {
            let _ = fallback.send(Err(ClipError::ExportFailed(format!(
                "cannot start export worker: {error}"
            ))));
            None
        }
    };

    ExportHandle {
        receiver,
        outcome: None,
        token,
        thread,
    }
}

#[cfg(feature = "async")]
pub use self::async_export::{ExportFuture, export_async};

#[cfg(feature = "async")]
mod async_export {
    use std::future::Future;
    use std::pin::Pin;
    use std::task::{Context, Poll};

    use tokio::task::JoinHandle;

    use super::{ExportRequest, OutputArtifact, export_clip};
    use crate::error::ClipError;
    use crate::options::ExportConfig;

    /// An export running on Tokio's blocking pool.
    ///
    /// # Example
    ///
    /// ```no_run
    /// use clipcast::{ExportConfig, ExportOptions, ExportRequest, TimeRange, VideoOptions};
    ///
    /// # async fn example() -> Result<(), clipcast::ClipError> {
    /// let request = ExportRequest::new(
    ///     "recording.mov",
    ///     TimeRange::new(0.0, 3.0),
    ///     "/tmp/clips",
    ///     ExportOptions::Video(VideoOptions::new()),
    /// );
    /// let artifact = clipcast::export_async(request, ExportConfig::new()).await?;
    /// # Ok(())
    /// # }
    /// ```
    pub struct ExportFuture {
        handle: JoinHandle<Result<OutputArtifact, ClipError>>,
    }

    impl Future for ExportFuture {
        type Output = Result<OutputArtifact, ClipError>;

        fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
            Pin::new(&mut self.handle).poll(cx).map(|result| {
                result.unwrap_or_else(|error| {
                    if error.is_cancelled() {
                        Err(ClipError::Cancelled)
                    } else {
                        Err(ClipError::ExportFailed(format!("export task failed: {error}")))
                    }
                })
            })
        }
    }

    /// Start an export on Tokio's blocking pool. Must be called from within
    /// a Tokio runtime.
    pub fn export_async(request: ExportRequest, config: ExportConfig) -> ExportFuture {
        let handle = tokio::task::spawn_blocking(move || export_clip(&request, &config));
        ExportFuture { handle }
    }
}
