//! Output geometry planning.
//!
//! A [`RenderPlan`] is computed once per export from the source's natural
//! size, its [`Orientation`], and the requested bounding box. It fixes the
//! even-sized output dimensions and the combined pixel transform
//! (orientation, origin shift, scale) that every frame of the job goes
//! through.
//!
//! # Example
//!
//! ```
//! use clipcast::{Orientation, PixelSize, RenderPlan};
//!
//! let plan = RenderPlan::compute(
//!     PixelSize::new(3000, 1000),
//!     Orientation::UP,
//!     (1280, 720),
//! );
//! assert_eq!(plan.output_size, PixelSize::new(1280, 426));
//! ```

use std::fmt;

/// Tolerance added before flooring so that `3000 * (1280 / 3000)` lands on
/// 1280 rather than 1279.999….
const FLOOR_EPSILON: f64 = 1e-6;

/// Smallest edge any encoder accepts.
const MIN_EDGE: u32 = 2;

/// Integer pixel dimensions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PixelSize {
    /// Width in pixels.
    pub width: u32,
    /// Height in pixels.
    pub height: u32,
}

impl PixelSize {
    /// Create a size.
    pub const fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    /// Total number of pixels.
    pub fn pixel_count(&self) -> u64 {
        self.width as u64 * self.height as u64
    }
}

impl fmt::Display for PixelSize {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

/// Axis-aligned rectangle in floating-point coordinates.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Rect {
    /// Left edge.
    pub x: f64,
    /// Top edge.
    pub y: f64,
    /// Width.
    pub width: f64,
    /// Height.
    pub height: f64,
}

impl Rect {
    /// Rectangle at the origin with the given size.
    pub fn from_size(size: PixelSize) -> Self {
        Self {
            x: 0.0,
            y: 0.0,
            width: size.width as f64,
            height: size.height as f64,
        }
    }
}

/// 2-D affine transform mapping `(x, y)` to
/// `(a·x + c·y + tx, b·x + d·y + ty)`, in y-down screen coordinates.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AffineTransform {
    pub a: f64,
    pub b: f64,
    pub c: f64,
    pub d: f64,
    pub tx: f64,
    pub ty: f64,
}

impl AffineTransform {
    pub const IDENTITY: AffineTransform = AffineTransform {
        a: 1.0,
        b: 0.0,
        c: 0.0,
        d: 1.0,
        tx: 0.0,
        ty: 0.0,
    };

    pub fn translation(tx: f64, ty: f64) -> Self {
        Self {
            tx,
            ty,
            ..Self::IDENTITY
        }
    }

    pub fn scale(sx: f64, sy: f64) -> Self {
        Self {
            a: sx,
            d: sy,
            ..Self::IDENTITY
        }
    }

    /// Exact clockwise rotation by `turns` quarter turns.
    pub fn quarter_turns(turns: u8) -> Self {
        let (a, b, c, d) = match turns % 4 {
            0 => (1.0, 0.0, 0.0, 1.0),
            1 => (0.0, 1.0, -1.0, 0.0),
            2 => (-1.0, 0.0, 0.0, -1.0),
            _ => (0.0, -1.0, 1.0, 0.0),
        };
        Self {
            a,
            b,
            c,
            d,
            tx: 0.0,
            ty: 0.0,
        }
    }

    /// `self` followed by `next`.
    pub fn then(&self, next: &AffineTransform) -> AffineTransform {
        AffineTransform {
            a: self.a * next.a + self.b * next.c,
            b: self.a * next.b + self.b * next.d,
            c: self.c * next.a + self.d * next.c,
            d: self.c * next.b + self.d * next.d,
            tx: self.tx * next.a + self.ty * next.c + next.tx,
            ty: self.tx * next.b + self.ty * next.d + next.ty,
        }
    }

    pub fn apply(&self, x: f64, y: f64) -> (f64, f64) {
        (
            self.a * x + self.c * y + self.tx,
            self.b * x + self.d * y + self.ty,
        )
    }

    /// Bounding box of `rect` after transformation.
    pub fn apply_to_rect(&self, rect: Rect) -> Rect {
        let corners = [
            self.apply(rect.x, rect.y),
            self.apply(rect.x + rect.width, rect.y),
            self.apply(rect.x, rect.y + rect.height),
            self.apply(rect.x + rect.width, rect.y + rect.height),
        ];
        let min_x = corners.iter().map(|p| p.0).fold(f64::INFINITY, f64::min);
        let max_x = corners.iter().map(|p| p.0).fold(f64::NEG_INFINITY, f64::max);
        let min_y = corners.iter().map(|p| p.1).fold(f64::INFINITY, f64::min);
        let max_y = corners.iter().map(|p| p.1).fold(f64::NEG_INFINITY, f64::max);
        Rect {
            x: min_x,
            y: min_y,
            width: max_x - min_x,
            height: max_y - min_y,
        }
    }
}

/// How a recording must be turned to appear upright.
///
/// Screen recordings and phone captures store pixels in sensor order and
/// declare the display orientation separately. `quarter_turns` counts
/// clockwise 90° steps; `mirrored` flips horizontally before rotating.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Orientation {
    /// Clockwise quarter turns, `0..4`.
    pub quarter_turns: u8,
    /// Horizontal flip applied before the rotation.
    pub mirrored: bool,
}

impl Orientation {
    /// Pixels are already upright.
    pub const UP: Orientation = Orientation {
        quarter_turns: 0,
        mirrored: false,
    };

    /// Create an orientation from a clockwise rotation in degrees, snapped
    /// to the nearest quarter turn.
    pub fn from_clockwise_degrees(degrees: f64, mirrored: bool) -> Self {
        let normalized = degrees.rem_euclid(360.0);
        let quarter_turns = ((normalized / 90.0).round() as u8) % 4;
        Self {
            quarter_turns,
            mirrored,
        }
    }

    /// Derive the orientation from an FFmpeg display matrix (nine `i32`
    /// values, 16.16 fixed point for the linear part).
    ///
    /// Returns `None` for a degenerate matrix.
    pub fn from_display_matrix(matrix: &[i32; 9]) -> Option<Self> {
        let m = |i: usize| matrix[i] as f64 / 65536.0;
        let scale_x = m(0).hypot(m(3));
        let scale_y = m(1).hypot(m(4));
        if scale_x == 0.0 || scale_y == 0.0 {
            return None;
        }
        let mirrored = m(0) * m(4) - m(1) * m(3) < 0.0;
        // A flip-then-rotate matrix negates the first column.
        let sign = if mirrored { -1.0 } else { 1.0 };
        let clockwise = (sign * m(1) / scale_y)
            .atan2(sign * m(0) / scale_x)
            .to_degrees();
        Some(Self::from_clockwise_degrees(clockwise, mirrored))
    }

    /// Whether width and height trade places.
    pub fn swaps_dimensions(&self) -> bool {
        self.quarter_turns % 2 == 1
    }

    /// The orientation as an affine transform around the origin.
    pub fn transform(&self) -> AffineTransform {
        let flip = if self.mirrored {
            AffineTransform::scale(-1.0, 1.0)
        } else {
            AffineTransform::IDENTITY
        };
        flip.then(&AffineTransform::quarter_turns(self.quarter_turns))
    }

    /// FFmpeg filters that bring decoded pixels upright, or an empty list.
    pub(crate) fn filters(&self) -> Vec<&'static str> {
        match (self.quarter_turns % 4, self.mirrored) {
            (0, false) => vec![],
            (0, true) => vec!["hflip"],
            (1, false) => vec!["transpose=clock"],
            (1, true) => vec!["hflip", "transpose=clock"],
            (2, false) => vec!["hflip", "vflip"],
            (2, true) => vec!["vflip"],
            (_, false) => vec!["transpose=cclock"],
            (_, true) => vec!["hflip", "transpose=cclock"],
        }
    }
}

/// Output geometry for one export, shared by every frame.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RenderPlan {
    /// Final output dimensions: even, at least 2×2.
    pub output_size: PixelSize,
    /// Source size after orientation, before scaling.
    pub oriented_size: PixelSize,
    /// Uniform scale factor, never above 1.
    pub scale: f64,
    /// Orientation that was applied.
    pub orientation: Orientation,
    /// Orientation, origin shift, then scale, in that order.
    pub pixel_transform: AffineTransform,
}

impl RenderPlan {
    /// Plan the output for a source of `natural_size` pixels with the given
    /// orientation, fitted inside `max_box` (`(width, height)`).
    ///
    /// Never upscales; each output edge is floored to an even number and
    /// clamped to at least 2.
    pub fn compute(natural_size: PixelSize, orientation: Orientation, max_box: (u32, u32)) -> Self {
        let orientation_transform = orientation.transform();
        let oriented = orientation_transform.apply_to_rect(Rect::from_size(natural_size));
        let oriented_width = oriented.width.round().max(1.0);
        let oriented_height = oriented.height.round().max(1.0);

        let scale = 1.0_f64
            .min(max_box.0 as f64 / oriented_width)
            .min(max_box.1 as f64 / oriented_height);

        let output_size = PixelSize::new(
            floor_even(oriented_width * scale),
            floor_even(oriented_height * scale),
        );

        let pixel_transform = orientation_transform
            .then(&AffineTransform::translation(-oriented.x, -oriented.y))
            .then(&AffineTransform::scale(scale, scale));

        let plan = Self {
            output_size,
            oriented_size: PixelSize::new(oriented_width as u32, oriented_height as u32),
            scale,
            orientation,
            pixel_transform,
        };
        log::debug!(
            "Render plan: natural={} oriented={} scale={:.4} output={}",
            natural_size,
            plan.oriented_size,
            scale,
            output_size,
        );
        plan
    }

    /// FFmpeg filter chain that applies this plan and converts to
    /// `pixel_format` (e.g. `"yuv420p"`, `"rgba"`).
    pub(crate) fn filter_spec(&self, pixel_format: &str) -> String {
        let mut filters: Vec<String> = self
            .orientation
            .filters()
            .into_iter()
            .map(str::to_string)
            .collect();
        filters.push(format!(
            "scale={}:{}:flags=bicubic",
            self.output_size.width, self.output_size.height
        ));
        filters.push("setsar=1".to_string());
        filters.push(format!("format=pix_fmts={pixel_format}"));
        filters.join(",")
    }
}

fn floor_even(value: f64) -> u32 {
    let even = ((value + FLOOR_EPSILON) / 2.0).floor() * 2.0;
    (even as u32).max(MIN_EDGE)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn assert_close(left: (f64, f64), right: (f64, f64)) {
        assert!(
            (left.0 - right.0).abs() < 1e-9 && (left.1 - right.1).abs() < 1e-9,
            "{left:?} != {right:?}"
        );
    }

    #[test]
    fn wide_source_fits_box_width() {
        let plan = RenderPlan::compute(PixelSize::new(3000, 1000), Orientation::UP, (1280, 720));
        assert!((plan.scale - 0.426_666).abs() < 1e-4);
        assert_eq!(plan.output_size, PixelSize::new(1280, 426));
    }

    #[test]
    fn never_upscales() {
        let plan = RenderPlan::compute(PixelSize::new(800, 600), Orientation::UP, (1920, 1080));
        assert_eq!(plan.scale, 1.0);
        assert_eq!(plan.output_size, PixelSize::new(800, 600));
    }

    #[test]
    fn odd_source_dimensions_floor_to_even() {
        let plan = RenderPlan::compute(PixelSize::new(1001, 777), Orientation::UP, (4000, 4000));
        assert_eq!(plan.output_size, PixelSize::new(1000, 776));
    }

    #[test]
    fn tiny_source_is_clamped_to_two() {
        let plan = RenderPlan::compute(PixelSize::new(3, 1), Orientation::UP, (100, 100));
        assert_eq!(plan.output_size, PixelSize::new(2, 2));
    }

    #[test]
    fn rotated_source_swaps_dimensions() {
        let orientation = Orientation::from_clockwise_degrees(90.0, false);
        let plan = RenderPlan::compute(PixelSize::new(1920, 1080), orientation, (1280, 1280));
        assert_eq!(plan.oriented_size, PixelSize::new(1080, 1920));
        // 1280 / 1920 = 0.6667 → 720 x 1280.
        assert_eq!(plan.output_size, PixelSize::new(720, 1280));
    }

    #[test]
    fn pixel_transform_maps_source_onto_output_origin() {
        let orientation = Orientation::from_clockwise_degrees(90.0, false);
        let plan = RenderPlan::compute(PixelSize::new(200, 100), orientation, (50, 50));
        // Oriented 100x200, scale 0.25 → 25x50 (floored-even 24x50).
        assert_eq!(plan.scale, 0.25);
        let top_left = plan.pixel_transform.apply(0.0, 0.0);
        let bottom_left = plan.pixel_transform.apply(0.0, 100.0);
        let top_right = plan.pixel_transform.apply(200.0, 0.0);
        // Clockwise turn: the source's bottom-left corner becomes the top-left.
        assert_close(bottom_left, (0.0, 0.0));
        assert_close(top_left, (25.0, 0.0));
        assert_close(top_right, (25.0, 50.0));
    }

    #[test]
    fn output_never_exceeds_box_or_source() {
        let sources = [(1920, 1080), (1080, 1920), (2560, 1600), (641, 479), (4, 4000)];
        let boxes = [(1280, 720), (640, 640), (320, 240), (1919, 1079)];
        for &(w, h) in &sources {
            for &bounds in &boxes {
                for turns in 0..4 {
                    let orientation = Orientation {
                        quarter_turns: turns,
                        mirrored: false,
                    };
                    let plan = RenderPlan::compute(PixelSize::new(w, h), orientation, bounds);
                    let out = plan.output_size;
                    assert_eq!(out.width % 2, 0);
                    assert_eq!(out.height % 2, 0);
                    assert!(out.width >= 2 && out.height >= 2);
                    if plan.oriented_size.width >= 2 && bounds.0 >= 2 {
                        assert!(out.width <= bounds.0.min(plan.oriented_size.width).max(2));
                    }
                    if plan.oriented_size.height >= 2 && bounds.1 >= 2 {
                        assert!(out.height <= bounds.1.min(plan.oriented_size.height).max(2));
                    }
                }
            }
        }
    }

    #[test]
    fn display_matrix_rotation() {
        // 90° clockwise display matrix as written by phone cameras.
        let matrix = [0, 65536, 0, -65536, 0, 0, 0, 0, 1 << 30];
        let orientation = Orientation::from_display_matrix(&matrix).unwrap();
        assert_eq!(orientation.quarter_turns, 1);
        assert!(!orientation.mirrored);

        let identity = [65536, 0, 0, 0, 65536, 0, 0, 0, 1 << 30];
        assert_eq!(Orientation::from_display_matrix(&identity), Some(Orientation::UP));

        let mirrored = [-65536, 0, 0, 0, 65536, 0, 0, 0, 1 << 30];
        let orientation = Orientation::from_display_matrix(&mirrored).unwrap();
        assert!(orientation.mirrored);
        assert_eq!(orientation.quarter_turns, 0);

        assert_eq!(Orientation::from_display_matrix(&[0; 9]), None);
    }

    #[test]
    fn negative_degrees_wrap() {
        let orientation = Orientation::from_clockwise_degrees(-90.0, false);
        assert_eq!(orientation.quarter_turns, 3);
    }

    #[test]
    fn filter_spec_orders_rotation_before_scale() {
        let plan = RenderPlan::compute(
            PixelSize::new(1920, 1080),
            Orientation::from_clockwise_degrees(270.0, false),
            (640, 640),
        );
        assert_eq!(
            plan.filter_spec("rgba"),
            "transpose=cclock,scale=360:640:flags=bicubic,setsar=1,format=pix_fmts=rgba"
        );
    }
}
