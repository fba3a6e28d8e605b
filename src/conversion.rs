//! Internal conversion helpers.
//!
//! Stream timestamps to seconds, seek targets, and
//! stride-aware copies out of FFmpeg frame planes.

use ffmpeg_next::{Rational, frame::Video as VideoFrame};

/// Rescale a PTS value from a stream time base to seconds.
pub(crate) fn pts_to_seconds(pts: i64, time_base: Rational) -> f64 {
    pts as f64 * time_base.numerator() as f64 / time_base.denominator().max(1) as f64
}

/// Convert seconds to a container-level seek target in `AV_TIME_BASE`
/// (microseconds), as expected by `Input::seek`.
pub(crate) fn seconds_to_seek_timestamp(seconds: f64) -> i64 {
    (seconds.max(0.0) * 1_000_000.0) as i64
}

/// Copy plane 0 of a packed-pixel frame into a tightly packed buffer.
///
/// FFmpeg rows often carry padding (`stride > width * bytes_per_pixel`);
/// the result has none and can go straight into an `image` buffer.
pub(crate) fn frame_to_buffer(
    video_frame: &VideoFrame,
    width: u32,
    height: u32,
    bytes_per_pixel: usize,
) -> Vec<u8> {
    let stride = video_frame.stride(0);
    let row_len = (width as usize) * bytes_per_pixel;
    let data = video_frame.data(0);

    if stride == row_len {
        data[..row_len * (height as usize)].to_vec()
    } else {
        let mut buffer = Vec::with_capacity(row_len * (height as usize));
        for row in 0..(height as usize) {
            let row_start = row * stride;
            buffer.extend_from_slice(&data[row_start..row_start + row_len]);
        }
        buffer
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pts_in_common_time_bases() {
        assert_eq!(pts_to_seconds(1500, Rational::new(1, 1000)), 1.5);
        assert_eq!(pts_to_seconds(108_000, Rational::new(1, 90_000)), 1.2);
        assert_eq!(pts_to_seconds(7680, Rational::new(1, 15_360)), 0.5);
        assert_eq!(pts_to_seconds(30, Rational::new(1, 0)), 30.0);
    }

    #[test]
    fn seek_timestamp_is_microseconds() {
        assert_eq!(seconds_to_seek_timestamp(1.25), 1_250_000);
        assert_eq!(seconds_to_seek_timestamp(-1.0), 0);
    }
}
