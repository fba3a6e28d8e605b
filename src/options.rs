//! Export options and operational configuration.
//!
//! [`ExportOptions`] selects the output kind and carries its format-specific
//! settings. [`ExportConfig`] threads progress callbacks and cancellation
//! through an export without widening every function signature.
//!
//! # Example
//!
//! ```
//! use clipcast::{AnimatedImageOptions, CodecProfile, ExportOptions, VideoOptions};
//!
//! let gif = ExportOptions::AnimatedImage(
//!     AnimatedImageOptions::new().fps(15).max_pixel_dimension(480),
//! );
//! let video = ExportOptions::Video(
//!     VideoOptions::new()
//!         .max_render_size(1280, 720)
//!         .target_fps(30)
//!         .codec_profile(CodecProfile::Efficient),
//! );
//! assert_eq!(gif.extension(), "gif");
//! assert_eq!(video.extension(), "mp4");
//! ```

use std::fmt::{Debug, Formatter, Result as FmtResult};
use std::sync::Arc;

use ffmpeg_next::codec::Id;

use crate::error::ClipError;
use crate::progress::{CancellationToken, NoOpProgress, ProgressCallback};

/// Settings for the animated-image (GIF) path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AnimatedImageOptions {
    /// Requested frames per second. Also determines the per-frame delay.
    pub fps: u32,
    /// Longest allowed output edge in pixels; frames fit inside a square
    /// box of this size.
    pub max_pixel_dimension: u32,
    /// Loop forever (`true`) or play once (`false`).
    pub loop_forever: bool,
}

impl Default for AnimatedImageOptions {
    fn default() -> Self {
        Self {
            fps: 15,
            max_pixel_dimension: 640,
            loop_forever: true,
        }
    }
}

impl AnimatedImageOptions {
    /// Create options with default settings (15 fps, 640 px, loop forever).
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the requested frame rate.
    pub fn fps(mut self, fps: u32) -> Self {
        self.fps = fps;
        self
    }

    /// Set the longest allowed output edge.
    pub fn max_pixel_dimension(mut self, max_pixel_dimension: u32) -> Self {
        self.max_pixel_dimension = max_pixel_dimension;
        self
    }

    /// Loop forever or play once.
    pub fn loop_forever(mut self, loop_forever: bool) -> Self {
        self.loop_forever = loop_forever;
        self
    }
}

/// Encoder family for the video path.
///
/// More efficient codecs get a smaller per-pixel bit budget from the
/// [bitrate estimator](crate::bitrate).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CodecProfile {
    /// H.264 / AVC: fast to encode, universally playable.
    #[default]
    Fast,
    /// H.265 / HEVC: smaller files at the same quality.
    Efficient,
    /// MPEG-4 Part 2: built into every libavcodec, used when neither
    /// H.264 nor HEVC encoders are available.
    Compatible,
}

impl CodecProfile {
    pub(crate) fn codec_id(self) -> Id {
        match self {
            CodecProfile::Fast => Id::H264,
            CodecProfile::Efficient => Id::HEVC,
            CodecProfile::Compatible => Id::MPEG4,
        }
    }

    /// Parse a profile name (`fast`/`h264`, `efficient`/`hevc`,
    /// `compatible`/`mpeg4`). Case-insensitive.
    pub fn parse(value: &str) -> Option<Self> {
        match value.to_ascii_lowercase().as_str() {
            "fast" | "h264" | "avc" => Some(CodecProfile::Fast),
            "efficient" | "hevc" | "h265" => Some(CodecProfile::Efficient),
            "compatible" | "mpeg4" => Some(CodecProfile::Compatible),
            _ => None,
        }
    }
}

/// Settings for the continuous-video path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VideoOptions {
    /// Bounding box `(width, height)` the output must fit inside.
    pub max_render_size: (u32, u32),
    /// Requested output frame rate; capped by the measured source rate.
    pub target_fps: u32,
    /// Encoder family.
    pub codec_profile: CodecProfile,
}

impl Default for VideoOptions {
    fn default() -> Self {
        Self {
            max_render_size: (1920, 1080),
            target_fps: 30,
            codec_profile: CodecProfile::Fast,
        }
    }
}

impl VideoOptions {
    /// Create options with default settings (1920×1080, 30 fps, H.264).
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the bounding box for the output.
    pub fn max_render_size(mut self, width: u32, height: u32) -> Self {
        self.max_render_size = (width, height);
        self
    }

    /// Set the requested frame rate.
    pub fn target_fps(mut self, fps: u32) -> Self {
        self.target_fps = fps;
        self
    }

    /// Set the encoder family.
    pub fn codec_profile(mut self, profile: CodecProfile) -> Self {
        self.codec_profile = profile;
        self
    }
}

/// Output kind and its format-specific settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExportOptions {
    /// Indexed-colour animated GIF.
    AnimatedImage(AnimatedImageOptions),
    /// Compressed video in an MP4 container.
    Video(VideoOptions),
}

impl ExportOptions {
    /// File extension of the produced artifact.
    pub fn extension(&self) -> &'static str {
        match self {
            ExportOptions::AnimatedImage(_) => "gif",
            ExportOptions::Video(_) => "mp4",
        }
    }

    /// Check that every numeric field is positive.
    ///
    /// # Errors
    ///
    /// [`ClipError::InvalidOptions`] naming the first offending field.
    pub fn validate(&self) -> Result<(), ClipError> {
        match self {
            ExportOptions::AnimatedImage(options) => {
                if options.fps == 0 {
                    return Err(ClipError::InvalidOptions("fps must be at least 1".to_string()));
                }
                if options.max_pixel_dimension < 2 {
                    return Err(ClipError::InvalidOptions(
                        "max pixel dimension must be at least 2".to_string(),
                    ));
                }
            }
            ExportOptions::Video(options) => {
                if options.target_fps == 0 {
                    return Err(ClipError::InvalidOptions(
                        "target fps must be at least 1".to_string(),
                    ));
                }
                let (width, height) = options.max_render_size;
                if width < 2 || height < 2 {
                    return Err(ClipError::InvalidOptions(format!(
                        "max render size {width}x{height} must be at least 2x2"
                    )));
                }
            }
        }
        Ok(())
    }
}

/// Default number of frames between progress callbacks.
const DEFAULT_BATCH_SIZE: u64 = 10;

/// Operational settings for an export.
///
/// Carries an optional progress callback, a cancellation token, and the
/// stem used for generated output names.
#[derive(Clone)]
pub struct ExportConfig {
    pub(crate) progress: Arc<dyn ProgressCallback>,
    pub(crate) cancellation: Option<CancellationToken>,
    pub(crate) batch_size: u64,
    pub(crate) file_stem: String,
}

impl Debug for ExportConfig {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        f.debug_struct("ExportConfig")
            .field("cancellation", &self.cancellation)
            .field("batch_size", &self.batch_size)
            .field("file_stem", &self.file_stem)
            .finish_non_exhaustive()
    }
}

impl Default for ExportConfig {
    fn default() -> Self {
        Self {
            progress: Arc::new(NoOpProgress),
            cancellation: None,
            batch_size: DEFAULT_BATCH_SIZE,
            file_stem: "Clip".to_string(),
        }
    }
}

impl ExportConfig {
    /// Create a configuration with no progress reporting and no cancellation.
    pub fn new() -> Self {
        Self::default()
    }

    /// Attach a progress callback.
    pub fn with_progress(mut self, callback: Arc<dyn ProgressCallback>) -> Self {
        self.progress = callback;
        self
    }

    /// Attach a cancellation token.
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancellation = Some(token);
        self
    }

    /// Number of frames between progress callbacks (minimum 1).
    pub fn with_batch_size(mut self, batch_size: u64) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }

    /// Stem for generated output names (`"Clip"` → `Clip 2026-10-18 at 14.03.22.gif`).
    pub fn with_file_stem(mut self, stem: impl Into<String>) -> Self {
        self.file_stem = stem.into();
        self
    }

    pub(crate) fn is_cancelled(&self) -> bool {
        self.cancellation
            .as_ref()
            .is_some_and(CancellationToken::is_cancelled)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_fps_is_rejected() {
        let options = ExportOptions::AnimatedImage(AnimatedImageOptions::new().fps(0));
        assert!(matches!(options.validate(), Err(ClipError::InvalidOptions(_))));

        let options = ExportOptions::Video(VideoOptions::new().target_fps(0));
        assert!(matches!(options.validate(), Err(ClipError::InvalidOptions(_))));
    }

    #[test]
    fn degenerate_box_is_rejected() {
        let options = ExportOptions::Video(VideoOptions::new().max_render_size(1, 720));
        assert!(options.validate().is_err());
    }

    #[test]
    fn defaults_are_valid() {
        assert!(ExportOptions::AnimatedImage(AnimatedImageOptions::default()).validate().is_ok());
        assert!(ExportOptions::Video(VideoOptions::default()).validate().is_ok());
    }

    #[test]
    fn codec_profile_names() {
        assert_eq!(CodecProfile::parse("HEVC"), Some(CodecProfile::Efficient));
        assert_eq!(CodecProfile::parse("fast"), Some(CodecProfile::Fast));
        assert_eq!(CodecProfile::parse("mpeg4"), Some(CodecProfile::Compatible));
        assert_eq!(CodecProfile::parse("prores"), None);
    }

    #[test]
    fn batch_size_never_zero() {
        assert_eq!(ExportConfig::new().with_batch_size(0).batch_size, 1);
    }
}
