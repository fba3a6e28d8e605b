//! Progress reporting and cancellation.
//!
//! An export calls its [`ProgressCallback`] every few written frames and
//! once more when the output is complete. A [`CancellationToken`] shared
//! with the caller is polled between frames.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use clipcast::{ExportConfig, ProgressCallback, ProgressInfo};
//!
//! struct PrintProgress;
//!
//! impl ProgressCallback for PrintProgress {
//!     fn on_progress(&self, info: &ProgressInfo) {
//!         if let Some(pct) = info.percentage {
//!             println!("[{:?}] {pct:.1}% complete", info.operation);
//!         }
//!     }
//! }
//!
//! let config = ExportConfig::new().with_progress(Arc::new(PrintProgress));
//! ```

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

/// The kind of export currently in progress.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[non_exhaustive]
pub enum OperationType {
    /// Sampling and encoding frames into an animated GIF.
    AnimatedImageExport,
    /// Streaming retimed frames into a video encoder.
    VideoExport,
}

/// A snapshot of export progress.
#[derive(Debug, Clone)]
pub struct ProgressInfo {
    /// What kind of export is running.
    pub operation: OperationType,
    /// Frames written so far.
    pub current: u64,
    /// Frames expected, when known ahead of time.
    pub total: Option<u64>,
    /// `current / total` as 0.0 to 100.0, when `total` is known.
    pub percentage: Option<f32>,
    /// Wall-clock time since the export started.
    pub elapsed: Duration,
    /// Projected time left at the current throughput.
    pub estimated_remaining: Option<Duration>,
    /// Output presentation time of the most recent frame, in seconds.
    pub output_timestamp: Option<f64>,
}

impl ProgressInfo {
    /// Whether every expected frame has been written.
    pub fn is_complete(&self) -> bool {
        self.total.is_some_and(|total| self.current >= total)
    }
}

/// Receives progress updates during an export.
///
/// Runs on the export worker thread. It observes the job but cannot stop
/// it; that is what [`CancellationToken`] is for.
pub trait ProgressCallback: Send + Sync {
    /// Called every `batch_size` frames and once at the end.
    fn on_progress(&self, info: &ProgressInfo);
}

/// Default callback.
pub(crate) struct NoOpProgress;

impl ProgressCallback for NoOpProgress {
    fn on_progress(&self, _info: &ProgressInfo) {}
}

/// Shared flag that stops an export at the next frame boundary.
///
/// # Example
///
/// ```
/// use clipcast::CancellationToken;
///
/// let token = CancellationToken::new();
/// let worker_side = token.clone();
/// token.cancel();
/// assert!(worker_side.is_cancelled());
/// ```
#[derive(Debug, Clone, Default)]
pub struct CancellationToken(Arc<AtomicBool>);

impl CancellationToken {
    /// A token nobody has cancelled yet.
    pub fn new() -> Self {
        Self::default()
    }

    /// Request cancellation. Idempotent.
    pub fn cancel(&self) {
        self.0.store(true, Ordering::Release);
    }

    /// Whether any clone has been cancelled.
    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }
}

/// Counts written frames and forwards batched snapshots to a callback.
pub(crate) struct ProgressTracker {
    callback: Arc<dyn ProgressCallback>,
    operation: OperationType,
    total: Option<u64>,
    batch_size: u64,
    started: Instant,
    current: u64,
    last_reported: u64,
}

impl ProgressTracker {
    pub(crate) fn new(
        callback: Arc<dyn ProgressCallback>,
        operation: OperationType,
        total: Option<u64>,
        batch_size: u64,
    ) -> Self {
        Self {
            callback,
            operation,
            total,
            batch_size: batch_size.max(1),
            started: Instant::now(),
            current: 0,
            last_reported: 0,
        }
    }

    /// Record one written frame at `output_timestamp`.
    pub(crate) fn advance(&mut self, output_timestamp: Option<f64>) {
        self.current += 1;
        if self.current - self.last_reported >= self.batch_size {
            self.report(output_timestamp);
        }
    }

    /// Final report, sent even if the last batch was partial.
    pub(crate) fn finish(&mut self) {
        self.report(None);
    }

    fn report(&mut self, output_timestamp: Option<f64>) {
        self.last_reported = self.current;
        let info = self.snapshot(output_timestamp);
        self.callback.on_progress(&info);
    }

    fn snapshot(&self, output_timestamp: Option<f64>) -> ProgressInfo {
        let elapsed = self.started.elapsed();
        let total = self.total.filter(|&total| total > 0);

        let percentage = total.map(|total| (self.current as f32 / total as f32 * 100.0).min(100.0));
        let estimated_remaining = total.filter(|_| self.current > 0).map(|total| {
            let left = total.saturating_sub(self.current);
            elapsed.mul_f64(left as f64 / self.current as f64)
        });

        ProgressInfo {
            operation: self.operation,
            current: self.current,
            total: self.total,
            percentage,
            elapsed,
            estimated_remaining,
            output_timestamp,
        }
    }
}
