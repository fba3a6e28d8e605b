//! Target bitrate estimation for the video path.
//!
//! The encoder gets a constant per-pixel bit budget scaled by resolution and
//! frame rate, then clamped so tiny clips are not starved and huge ones do
//! not balloon.

use crate::geometry::PixelSize;
use crate::options::CodecProfile;

/// Floor of the estimated bitrate, in bits per second.
pub const MIN_BITRATE: u64 = 1_000_000;

/// Ceiling of the estimated bitrate, in bits per second.
pub const MAX_BITRATE: u64 = 60_000_000;

impl CodecProfile {
    /// Bits spent per pixel per frame.
    pub fn bits_per_pixel(self) -> f64 {
        match self {
            CodecProfile::Fast => 0.10,
            CodecProfile::Efficient => 0.06,
            CodecProfile::Compatible => 0.15,
        }
    }
}

/// Estimate the encoder's target bitrate in bits per second.
///
/// `pixels × fps × bits_per_pixel(profile)`, clamped to
/// [`MIN_BITRATE`]`..=`[`MAX_BITRATE`].
///
/// # Example
///
/// ```
/// use clipcast::{CodecProfile, PixelSize, bitrate::estimate_bitrate};
///
/// // 1920×1080 at 30 fps: 6.2 Mbit/s for H.264.
/// let bits = estimate_bitrate(PixelSize::new(1920, 1080), 30, CodecProfile::Fast);
/// assert_eq!(bits, 6_220_800);
/// ```
pub fn estimate_bitrate(size: PixelSize, fps: u32, profile: CodecProfile) -> u64 {
    let raw = size.pixel_count() as f64 * fps as f64 * profile.bits_per_pixel();
    (raw.round() as u64).clamp(MIN_BITRATE, MAX_BITRATE)
}
