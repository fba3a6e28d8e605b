//! Source clip probing.
//!
//! [`SourceClip::probe`] opens a recording once, validates that it can be
//! exported at all, and captures the metadata every later stage needs. The
//! input context is closed again before returning; readers used during the
//! export open their own.

use std::path::{Path, PathBuf};

use ffmpeg_next::{
    Rational, Stream, codec::context::Context as CodecContext, format::context::Input,
    media::Type,
};
use ffmpeg_sys_next::{AVPacketSideDataType, av_packet_side_data_get};

use crate::error::ClipError;
use crate::geometry::{Orientation, PixelSize};

/// Immutable description of a source recording.
///
/// # Example
///
/// ```no_run
/// use clipcast::SourceClip;
///
/// let clip = SourceClip::probe("recording.mov")?;
/// println!(
///     "{:.2}s, {} ({}), {:.2} fps declared",
///     clip.duration, clip.natural_size, clip.codec, clip.nominal_frame_rate
/// );
/// # Ok::<(), clipcast::ClipError>(())
/// ```
#[derive(Debug, Clone, PartialEq)]
#[must_use]
pub struct SourceClip {
    /// Path the clip was probed from.
    pub path: PathBuf,
    /// Total duration in seconds. Always finite and positive.
    pub duration: f64,
    /// Index of the selected video stream within the container.
    pub video_stream_index: usize,
    /// Coded frame size, before orientation is applied.
    pub natural_size: PixelSize,
    /// Display orientation recorded by the capturing device.
    pub orientation: Orientation,
    /// Declared average frame rate, or `0.0` when the container has none.
    pub nominal_frame_rate: f64,
    /// Decoder name of the video track (e.g. `"h264"`).
    pub codec: String,
    /// Whether the container also carries an audio stream. Audio is never
    /// exported.
    pub has_audio: bool,
}

impl SourceClip {
    /// Open `path` and read its video metadata.
    ///
    /// # Errors
    ///
    /// - [`ClipError::SourceOpen`] if the file cannot be opened as a container.
    /// - [`ClipError::MissingVideoTrack`] if it has no video stream.
    /// - [`ClipError::CannotLoadDuration`] if neither the container nor the
    ///   video stream reports a finite positive duration.
    /// - [`ClipError::SourceOpen`] if the video stream has no frame size.
    pub fn probe<P: AsRef<Path>>(path: P) -> Result<Self, ClipError> {
        let path = path.as_ref().to_path_buf();
        log::debug!("Probing source clip: {}", path.display());

        crate::ffmpeg::initialize().map_err(|error| ClipError::SourceOpen {
            path: path.clone(),
            reason: error.to_string(),
        })?;

        let input = ffmpeg_next::format::input(&path).map_err(|error| ClipError::SourceOpen {
            path: path.clone(),
            reason: error.to_string(),
        })?;

        let stream = input
            .streams()
            .best(Type::Video)
            .ok_or(ClipError::MissingVideoTrack)?;
        let video_stream_index = stream.index();

        let duration = container_duration(&input)
            .or_else(|| stream_duration(&stream))
            .ok_or(ClipError::CannotLoadDuration)?;

        let decoder = CodecContext::from_parameters(stream.parameters())
            .and_then(|context| context.decoder().video())
            .map_err(|error| ClipError::SourceOpen {
                path: path.clone(),
                reason: format!("unreadable video parameters on stream {video_stream_index}: {error}"),
            })?;
        let natural_size =
            frame_size(decoder.width(), decoder.height()).ok_or_else(|| ClipError::SourceOpen {
                path: path.clone(),
                reason: format!(
                    "video stream {video_stream_index} reports a {}x{} frame",
                    decoder.width(),
                    decoder.height()
                ),
            })?;
        let codec = decoder
            .codec()
            .map(|codec| codec.name().to_string())
            .unwrap_or_else(|| "unknown".to_string());

        let orientation = read_orientation(&stream);
        let nominal_frame_rate = nominal_frame_rate(&stream);
        let has_audio = input.streams().best(Type::Audio).is_some();

        let clip = SourceClip {
            path,
            duration,
            video_stream_index,
            natural_size,
            orientation,
            nominal_frame_rate,
            codec,
            has_audio,
        };
        log::info!(
            "Probed {}: {:.3}s, {} {}, {:.3} fps declared, orientation {:?}",
            clip.path.display(),
            clip.duration,
            clip.codec,
            clip.natural_size,
            clip.nominal_frame_rate,
            clip.orientation
        );
        Ok(clip)
    }

    /// Natural size after the orientation transform.
    pub fn oriented_size(&self) -> PixelSize {
        if self.orientation.swaps_dimensions() {
            PixelSize::new(self.natural_size.height, self.natural_size.width)
        } else {
            self.natural_size
        }
    }
}

fn frame_size(width: u32, height: u32) -> Option<PixelSize> {
    (width > 0 && height > 0).then(|| PixelSize::new(width, height))
}

fn valid_duration(seconds: f64) -> Option<f64> {
    (seconds.is_finite() && seconds > 0.0).then_some(seconds)
}

fn container_duration(input: &Input) -> Option<f64> {
    let microseconds = input.duration();
    if microseconds <= 0 {
        return None;
    }
    valid_duration(microseconds as f64 / f64::from(ffmpeg_sys_next::AV_TIME_BASE))
}

fn stream_duration(stream: &Stream) -> Option<f64> {
    let duration = stream.duration();
    if duration <= 0 {
        return None;
    }
    valid_duration(crate::conversion::pts_to_seconds(duration, stream.time_base()))
}

fn rational_to_f64(rate: Rational) -> Option<f64> {
    if rate.numerator() <= 0 || rate.denominator() <= 0 {
        return None;
    }
    Some(rate.numerator() as f64 / rate.denominator() as f64)
}

fn nominal_frame_rate(stream: &Stream) -> f64 {
    rational_to_f64(stream.avg_frame_rate())
        .or_else(|| rational_to_f64(stream.rate()))
        .unwrap_or(0.0)
}

fn read_orientation(stream: &Stream) -> Orientation {
    if let Some(matrix) = display_matrix(stream)
        && let Some(orientation) = Orientation::from_display_matrix(&matrix)
    {
        return orientation;
    }
    if let Some(degrees) = stream.metadata().get("rotate").and_then(parse_rotate_tag) {
        return Orientation::from_clockwise_degrees(degrees, false);
    }
    Orientation::UP
}

fn parse_rotate_tag(value: &str) -> Option<f64> {
    value.trim().parse::<f64>().ok().filter(|degrees| degrees.is_finite())
}

/// Read the 3×3 display matrix attached to the stream's codec parameters.
fn display_matrix(stream: &Stream) -> Option<[i32; 9]> {
    let parameters = stream.parameters();
    // SAFETY: `parameters` borrows the stream, which outlives this call. The
    // side data array and its entries are owned by the codec parameters.
    unsafe {
        let raw = parameters.as_ptr();
        let side_data = av_packet_side_data_get(
            (*raw).coded_side_data,
            (*raw).nb_coded_side_data,
            AVPacketSideDataType::AV_PKT_DATA_DISPLAYMATRIX,
        );
        if side_data.is_null() || (*side_data).size < size_of::<[i32; 9]>() {
            return None;
        }
        Some(std::ptr::read_unaligned((*side_data).data as *const [i32; 9]))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_file_is_source_open() {
        let result = SourceClip::probe("/definitely/not/here.mov");
        assert!(matches!(result, Err(ClipError::SourceOpen { .. })));
    }

    #[test]
    fn rotate_tag_parsing() {
        assert_eq!(parse_rotate_tag("90"), Some(90.0));
        assert_eq!(parse_rotate_tag(" -90 "), Some(-90.0));
        assert_eq!(parse_rotate_tag("sideways"), None);
        assert_eq!(parse_rotate_tag("inf"), None);
    }

    #[test]
    fn unusable_rates_are_skipped() {
        assert_eq!(rational_to_f64(Rational::new(0, 1)), None);
        assert_eq!(rational_to_f64(Rational::new(30, 0)), None);
        assert_eq!(rational_to_f64(Rational::new(30000, 1001)), Some(30000.0 / 1001.0));
    }

    #[test]
    fn durations_must_be_finite_and_positive() {
        assert_eq!(valid_duration(9.2), Some(9.2));
        assert_eq!(valid_duration(0.0), None);
        assert_eq!(valid_duration(f64::NAN), None);
        assert_eq!(valid_duration(f64::INFINITY), None);
    }

    #[test]
    fn empty_frame_sizes_are_rejected() {
        assert_eq!(frame_size(64, 48), Some(PixelSize::new(64, 48)));
        assert_eq!(frame_size(0, 48), None);
        assert_eq!(frame_size(64, 0), None);
        assert_eq!(frame_size(0, 0), None);
    }
}
