//! Trimmed selection within a source clip.

use crate::error::ClipError;

/// A `[start, end]` selection in seconds.
///
/// Values are stored as given by the trimming UI and clamped to the clip
/// duration with [`clamped`](TimeRange::clamped) before any reader is
/// built.
///
/// # Example
///
/// ```
/// use clipcast::TimeRange;
///
/// let range = TimeRange::new(1.2, 5.4).clamped(9.2).unwrap();
/// assert!((range.duration() - 4.2).abs() < 1e-9);
/// ```
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TimeRange {
    /// Start of the selection, in seconds.
    pub start: f64,
    /// End of the selection, in seconds.
    pub end: f64,
}

impl TimeRange {
    /// Create a range. No validation happens until [`clamped`](TimeRange::clamped).
    pub fn new(start: f64, end: f64) -> Self {
        Self { start, end }
    }

    /// Length of the selection in seconds.
    pub fn duration(&self) -> f64 {
        self.end - self.start
    }

    /// Clamp both ends to `[0, clip_duration]` and reject empty selections.
    ///
    /// A non-finite start clamps to `0`; a non-finite end clamps to the
    /// clip duration.
    ///
    /// # Errors
    ///
    /// [`ClipError::InvalidTimeRange`] when `end - start <= 0` after
    /// clamping, or when `clip_duration` itself is not a positive number.
    pub fn clamped(&self, clip_duration: f64) -> Result<TimeRange, ClipError> {
        let invalid = || ClipError::InvalidTimeRange {
            start: self.start,
            end: self.end,
            duration: clip_duration,
        };

        if !clip_duration.is_finite() || clip_duration <= 0.0 {
            return Err(invalid());
        }

        let start = if self.start.is_finite() {
            self.start.clamp(0.0, clip_duration)
        } else {
            0.0
        };
        let end = if self.end.is_finite() {
            self.end.clamp(0.0, clip_duration)
        } else {
            clip_duration
        };

        if end - start <= 0.0 {
            return Err(invalid());
        }

        Ok(TimeRange { start, end })
    }
}

#[cfg(test)]
mod tests {
    use super::TimeRange;
    use crate::error::ClipError;

    #[test]
    fn clamps_into_clip_bounds() {
        let range = TimeRange::new(-3.0, 12.0).clamped(9.2).unwrap();
        assert_eq!(range.start, 0.0);
        assert_eq!(range.end, 9.2);
    }

    #[test]
    fn equal_ends_are_rejected() {
        let result = TimeRange::new(2.0, 2.0).clamped(9.2);
        assert!(matches!(result, Err(ClipError::InvalidTimeRange { .. })));
    }

    #[test]
    fn selection_collapsing_after_clamp_is_rejected() {
        // Both ends land on the clip end.
        let result = TimeRange::new(10.0, 11.0).clamped(9.2);
        assert!(matches!(result, Err(ClipError::InvalidTimeRange { .. })));
    }

    #[test]
    fn reversed_range_is_rejected() {
        assert!(TimeRange::new(5.0, 1.0).clamped(9.2).is_err());
    }

    #[test]
    fn non_finite_ends_fall_back_to_clip_bounds() {
        let range = TimeRange::new(f64::NAN, f64::INFINITY).clamped(4.0).unwrap();
        assert_eq!(range, TimeRange::new(0.0, 4.0));
    }

    #[test]
    fn unknown_clip_duration_is_rejected() {
        assert!(TimeRange::new(0.0, 1.0).clamped(f64::NAN).is_err());
        assert!(TimeRange::new(0.0, 1.0).clamped(0.0).is_err());
    }
}
