//! Empirical frame-rate estimation.
//!
//! Screen recorders routinely declare a nominal rate that has little to do
//! with the cadence they actually delivered. Before the video path picks an
//! output rate, it samples presentation timestamps from the selected range
//! and measures the real inter-frame interval.
//!
//! The measurement rejects stutters and duplicates, takes the median of the
//! remaining deltas, and snaps the result to a standard capture rate. If no
//! standard rate is close enough, the estimate is reported as unknown and
//! the caller falls back to the declared rate.

use ffmpeg_next::{Error as FfmpegError, Packet};

use crate::error::ClipError;
use crate::probe::SourceClip;
use crate::time_range::TimeRange;

/// Most timestamps read from the selected range.
pub const MAX_SAMPLED_TIMESTAMPS: usize = 90;

/// Fewest accepted deltas needed for a measurement.
pub const MIN_ACCEPTED_DELTAS: usize = 12;

/// Deltas at or below this many seconds are duplicates.
const MIN_DELTA: f64 = 0.001;

/// Deltas at or above this many seconds are stalls.
const MAX_DELTA: f64 = 0.1;

/// Standard capture rates a measurement may snap to.
const STANDARD_RATES: [f64; 5] = [60.0, 59.94, 30.0, 29.97, 24.0];

/// Largest distance, in fps, between a measurement and the rate it snaps to.
const SNAP_TOLERANCE: f64 = 2.0;

/// Extra packets read past the sample budget so B-frame reordering cannot
/// leave a gap at the end of the sorted window.
const REORDER_SLACK: usize = 16;

/// Estimate the frame rate from presentation timestamps (seconds, in
/// presentation order).
///
/// Returns `None` when fewer than [`MIN_ACCEPTED_DELTAS`] deltas fall inside
/// `(0.001, 0.1)` seconds, or when the median rate is more than 2 fps away
/// from every standard rate.
///
/// # Example
///
/// ```
/// use clipcast::frame_rate::estimate_from_timestamps;
///
/// let timestamps: Vec<f64> = (0..40).map(|i| i as f64 * 0.0167).collect();
/// assert_eq!(estimate_from_timestamps(&timestamps), Some(59.94));
/// ```
pub fn estimate_from_timestamps(timestamps: &[f64]) -> Option<f64> {
    let window = &timestamps[..timestamps.len().min(MAX_SAMPLED_TIMESTAMPS)];

    let mut deltas: Vec<f64> = window
        .windows(2)
        .map(|pair| pair[1] - pair[0])
        .filter(|&delta| delta > MIN_DELTA && delta < MAX_DELTA)
        .collect();

    if deltas.len() < MIN_ACCEPTED_DELTAS {
        log::debug!(
            "Frame rate unknown: {} of {} deltas accepted",
            deltas.len(),
            window.len().saturating_sub(1)
        );
        return None;
    }

    deltas.sort_by(f64::total_cmp);
    let median = median_of_sorted(&deltas);
    let measured = 1.0 / median;

    let snapped = snap_to_standard_rate(measured);
    log::debug!(
        "Measured median delta {:.5}s ({:.2} fps) from {} deltas, snapped to {:?}",
        median,
        measured,
        deltas.len(),
        snapped
    );
    snapped
}

fn median_of_sorted(values: &[f64]) -> f64 {
    let middle = values.len() / 2;
    if values.len() % 2 == 0 {
        (values[middle - 1] + values[middle]) / 2.0
    } else {
        values[middle]
    }
}

/// Snap `fps` to the nearest standard capture rate within tolerance.
pub fn snap_to_standard_rate(fps: f64) -> Option<f64> {
    STANDARD_RATES
        .iter()
        .copied()
        .min_by(|a, b| (a - fps).abs().total_cmp(&(b - fps).abs()))
        .filter(|rate| (rate - fps).abs() <= SNAP_TOLERANCE)
}

/// Pick the output rate for the video path.
///
/// `min(requested, floor(source_rate))`, where the source rate is the
/// measurement if there is one and the declared nominal rate otherwise.
/// When neither is usable the request stands. Never returns 0.
pub fn negotiate_effective_fps(requested: u32, measured: Option<f64>, nominal: f64) -> u32 {
    let source_rate = measured.or_else(|| (nominal.is_finite() && nominal > 0.0).then_some(nominal));
    match source_rate {
        Some(rate) => requested.min(rate.floor() as u32).max(1),
        None => requested.max(1),
    }
}

/// Read up to [`MAX_SAMPLED_TIMESTAMPS`] presentation timestamps (seconds)
/// of the clip's video track that fall inside `range`, in presentation
/// order.
///
/// Only packets are read; nothing is decoded.
///
/// # Errors
///
/// [`ClipError::CannotCreateReader`] if the container cannot be reopened
/// or a read fails.
pub fn read_presentation_timestamps(
    clip: &SourceClip,
    range: TimeRange,
) -> Result<Vec<f64>, ClipError> {
    let mut input = ffmpeg_next::format::input(&clip.path).map_err(|error| {
        ClipError::CannotCreateReader(format!("cannot reopen {}: {error}", clip.path.display()))
    })?;

    let stream_index = clip.video_stream_index;
    let time_base = input
        .stream(stream_index)
        .ok_or(ClipError::MissingVideoTrack)?
        .time_base();

    let seek_target = crate::conversion::seconds_to_seek_timestamp(range.start);
    if let Err(error) = input.seek(seek_target, ..seek_target) {
        // Decoding from the top still yields the right timestamps, only slower.
        log::warn!("Seek to {:.3}s failed ({error}), reading from start", range.start);
    }

    let budget = MAX_SAMPLED_TIMESTAMPS + REORDER_SLACK;
    let mut timestamps = Vec::with_capacity(budget);
    let mut packet = Packet::empty();
    loop {
        match packet.read(&mut input) {
            Ok(()) => {
                if packet.stream() != stream_index {
                    continue;
                }
                let Some(pts) = packet.pts() else {
                    continue;
                };
                let seconds = crate::conversion::pts_to_seconds(pts, time_base);
                if seconds > range.end {
                    // Keep reading a little: reordered packets may still
                    // belong to the range.
                    if timestamps.len() >= budget || seconds > range.end + MAX_DELTA * 4.0 {
                        break;
                    }
                    continue;
                }
                if seconds >= range.start {
                    timestamps.push(seconds);
                    if timestamps.len() >= budget {
                        break;
                    }
                }
            }
            Err(FfmpegError::Eof) => break,
            Err(error) => {
                return Err(ClipError::CannotCreateReader(format!(
                    "packet read failed while sampling timestamps: {error}"
                )));
            }
        }
    }

    timestamps.sort_by(f64::total_cmp);
    timestamps.truncate(MAX_SAMPLED_TIMESTAMPS);
    Ok(timestamps)
}

/// Measure the clip's frame rate over `range`.
///
/// A read failure is logged and treated as an unknown rate: the nominal
/// rate is still a usable fallback.
pub fn estimate_frame_rate(clip: &SourceClip, range: TimeRange) -> Option<f64> {
    match read_presentation_timestamps(clip, range) {
        Ok(timestamps) => estimate_from_timestamps(&timestamps),
        Err(error) => {
            log::warn!("Frame rate sampling failed: {error}");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cadence(count: usize, delta: f64) -> Vec<f64> {
        (0..count).map(|i| 1.0 + i as f64 * delta).collect()
    }

    #[test]
    fn steady_sixty_snaps_to_sixty() {
        assert_eq!(estimate_from_timestamps(&cadence(90, 1.0 / 60.0)), Some(60.0));
    }

    #[test]
    fn lying_metadata_scenario() {
        // Median 0.0167s → 59.88 fps → 59.94.
        let measured = estimate_from_timestamps(&cadence(40, 0.0167));
        assert_eq!(measured, Some(59.94));
        assert_eq!(negotiate_effective_fps(30, measured, 24.0), 30);
    }

    #[test]
    fn too_few_accepted_deltas_is_unknown() {
        // 12 timestamps give only 11 deltas.
        assert_eq!(estimate_from_timestamps(&cadence(12, 1.0 / 30.0)), None);
        assert!(estimate_from_timestamps(&cadence(13, 1.0 / 30.0)).is_some());
    }

    #[test]
    fn duplicates_and_stalls_are_rejected() {
        let mut timestamps = Vec::new();
        let mut t = 0.0;
        for i in 0..40 {
            timestamps.push(t);
            t += match i % 4 {
                0 => 0.0005,
                1 => 0.25,
                _ => 1.0 / 30.0,
            };
        }
        // 19 of the 39 deltas are 1/30s; the rest are duplicates or stalls.
        assert_eq!(estimate_from_timestamps(&timestamps), Some(30.0));

        let stalls = cadence(40, 0.2);
        assert_eq!(estimate_from_timestamps(&stalls), None);
    }

    #[test]
    fn median_ignores_outliers() {
        let mut timestamps = cadence(30, 1.0 / 24.0);
        // A burst of fast frames at the end.
        let last = *timestamps.last().unwrap();
        timestamps.extend((1..8).map(|i| last + i as f64 * 0.005));
        assert_eq!(estimate_from_timestamps(&timestamps), Some(24.0));
    }

    #[test]
    fn off_standard_rate_is_unknown() {
        // 45 fps is more than 2 fps from every standard rate.
        assert_eq!(estimate_from_timestamps(&cadence(60, 1.0 / 45.0)), None);
    }

    #[test]
    fn only_first_ninety_timestamps_count() {
        let mut timestamps = cadence(90, 1.0 / 30.0);
        let last = *timestamps.last().unwrap();
        timestamps.extend((1..200).map(|i| last + i as f64 / 60.0));
        assert_eq!(estimate_from_timestamps(&timestamps), Some(30.0));
    }

    #[test]
    fn snapping_picks_nearest_rate() {
        assert_eq!(snap_to_standard_rate(29.5), Some(29.97));
        assert_eq!(snap_to_standard_rate(25.9), Some(24.0));
        assert_eq!(snap_to_standard_rate(26.1), None);
        assert_eq!(snap_to_standard_rate(61.9), Some(60.0));
    }

    #[test]
    fn negotiation_never_exceeds_request_or_source() {
        for requested in 1..=120 {
            for measured in [None, Some(24.0), Some(29.97), Some(59.94), Some(60.0)] {
                for nominal in [0.0, f64::NAN, 15.0, 30.0, 240.0] {
                    let effective = negotiate_effective_fps(requested, measured, nominal);
                    assert!(effective >= 1);
                    assert!(effective <= requested);
                    if let Some(rate) = measured {
                        assert!(effective as f64 <= rate);
                    }
                }
            }
        }
    }

    #[test]
    fn nominal_fallback_and_missing_rates() {
        assert_eq!(negotiate_effective_fps(30, None, 15.0), 15);
        assert_eq!(negotiate_effective_fps(30, None, 0.0), 30);
        assert_eq!(negotiate_effective_fps(60, Some(59.94), 24.0), 59);
    }
}
