//! Error types for the `clipcast` crate.
//!
//! This module defines [`ClipError`], the unified error type returned by
//! every fallible operation in the export pipeline. Each variant names the
//! pipeline stage that failed so callers can map it to a localized message
//! without inspecting upstream FFmpeg or codec errors.

use std::{io::Error as IoError, path::PathBuf};

use thiserror::Error;

/// The unified error type for all `clipcast` operations.
///
/// Every public method that can fail returns `Result<T, ClipError>`.
/// Variants carry enough context (paths, timestamps, upstream messages) to
/// diagnose the problem without additional logging at the call site.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ClipError {
    /// The source recording could not be opened as a media container.
    #[error("Failed to open source clip at {path}: {reason}")]
    SourceOpen {
        /// Path that was passed to [`SourceClip::probe`](crate::SourceClip::probe).
        path: PathBuf,
        /// Underlying reason the open failed.
        reason: String,
    },

    /// The selection is empty or lies outside the clip after clamping.
    #[error("Invalid time range: [{start:.3}s, {end:.3}s] within a {duration:.3}s clip")]
    InvalidTimeRange {
        /// Requested start, in seconds.
        start: f64,
        /// Requested end, in seconds.
        end: f64,
        /// Duration of the source clip, in seconds.
        duration: f64,
    },

    /// The source container has no video track.
    #[error("No video track found in source clip")]
    MissingVideoTrack,

    /// The source duration is missing, non-finite, or not positive.
    #[error("Cannot load a valid duration for the source clip")]
    CannotLoadDuration,

    /// Export options contain a zero or otherwise unusable value.
    #[error("Invalid export options: {0}")]
    InvalidOptions(String),

    /// The frame reader over the trimmed source could not be built or started.
    #[error("Cannot create frame reader: {0}")]
    CannotCreateReader(String),

    /// The output container or encoder could not be created.
    #[error("Cannot create output writer: {0}")]
    CannotCreateWriter(String),

    /// The encoder rejected the stream configuration.
    #[error("Cannot add writer input: {0}")]
    CannotAddWriterInput(String),

    /// A single frame could not be extracted or retimed.
    #[error("Frame extraction failed at {timestamp:.3}s: {reason}")]
    FrameExtractionFailed {
        /// Position in the source timeline, in seconds.
        timestamp: f64,
        /// Underlying reason.
        reason: String,
    },

    /// The streaming stage failed while moving frames from reader to sink.
    #[error("Export failed: {0}")]
    ExportFailed(String),

    /// The output container could not be finalized.
    #[error("Cannot finalize output: {0}")]
    CannotFinalize(String),

    /// The output directory does not exist and could not be created.
    #[error("Failed to create output directory {path}: {source}")]
    DirectoryCreationFailed {
        /// Directory that was requested.
        path: PathBuf,
        /// The underlying I/O failure.
        #[source]
        source: IoError,
    },

    /// The export was cancelled via a [`CancellationToken`](crate::CancellationToken).
    #[error("Export cancelled")]
    Cancelled,

    /// An I/O error occurred while staging or publishing the output file.
    #[error("I/O error: {0}")]
    Io(#[from] IoError),
}

impl ClipError {
    /// Build a [`ClipError::FrameExtractionFailed`] from any displayable cause.
    pub(crate) fn frame_extraction(timestamp: f64, reason: impl ToString) -> Self {
        ClipError::FrameExtractionFailed {
            timestamp,
            reason: reason.to_string(),
        }
    }

    /// Whether the error was caused by the caller's input rather than the
    /// source file or the platform codecs.
    pub fn is_caller_error(&self) -> bool {
        matches!(
            self,
            ClipError::InvalidTimeRange { .. }
                | ClipError::InvalidOptions(_)
                | ClipError::Cancelled
        )
    }
}
