//! Normalized-coordinate geometry shared by the document and liveness engines.
//!
//! All boxes use image-relative coordinates where `(0, 0)` is the top-left
//! corner and `(1, 1)` the bottom-right one. Detectors occasionally report
//! values slightly outside that range; nothing here rejects them.

use serde::{Deserialize, Serialize};

/// Tolerance used when comparing a detected box against an expected layout.
pub const DEFAULT_VARIANCE_THRESHOLD: f32 = 0.05;

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BoundingBox {
    pub top: f32,
    pub left: f32,
    pub width: f32,
    pub height: f32,
}

impl BoundingBox {
    pub fn new(top: f32, left: f32, width: f32, height: f32) -> Self {
        Self {
            top,
            left,
            width,
            height,
        }
    }

    pub fn bottom(&self) -> f32 {
        self.top + self.height
    }

    pub fn right(&self) -> f32 {
        self.left + self.width
    }

    pub fn area(&self) -> f32 {
        self.width * self.height
    }

    pub fn centre(&self) -> Point {
        Point::new(self.left + self.width / 2.0, self.top + self.height / 2.0)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Point {
    pub x: f32,
    pub y: f32,
}

impl Point {
    pub fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }
}

/// Pixel rectangle inside a concrete image.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PixelRect {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

impl PixelRect {
    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }
}

/// Whether `detected` sits where `expected` says it should.
///
/// The origin must match within `threshold` on both axes and the detected box
/// may not be more than `threshold` larger than the expected one. Smaller
/// detections are accepted since text rarely fills its whole slot.
pub fn boxes_align(expected: &BoundingBox, detected: &BoundingBox, threshold: f32) -> bool {
    (expected.left - detected.left).abs() <= threshold
        && (expected.top - detected.top).abs() <= threshold
        && expected.width + threshold >= detected.width
        && expected.height + threshold >= detected.height
}

/// Stricter variant of [`boxes_align`] comparing all four edges.
pub fn edges_align(expected: &BoundingBox, detected: &BoundingBox, threshold: f32) -> bool {
    (expected.left - detected.left).abs() <= threshold
        && (expected.top - detected.top).abs() <= threshold
        && (expected.bottom() - detected.bottom()).abs() <= threshold
        && (expected.right() - detected.right()).abs() <= threshold
}

/// Slope of the segment `p1 -> p2`, in degrees within `[-90, 90]`.
pub fn angle_between_points(p1: Point, p2: Point) -> f32 {
    let dx = p2.x - p1.x;
    let dy = p2.y - p1.y;
    if dx == 0.0 {
        if dy == 0.0 {
            return 0.0;
        }
        return 90.0_f32.copysign(dy);
    }
    radians_to_degrees((dy / dx).atan())
}

pub fn radians_to_degrees(radians: f32) -> f32 {
    radians * 180.0 / std::f32::consts::PI
}

/// Converts a normalized box into a pixel rectangle clamped to the image.
pub fn crop_region(bbox: &BoundingBox, image_width: u32, image_height: u32) -> PixelRect {
    let (x, width) = clamp_span(bbox.left, bbox.width, image_width);
    let (y, height) = clamp_span(bbox.top, bbox.height, image_height);
    PixelRect {
        x,
        y,
        width,
        height,
    }
}

fn clamp_span(start: f32, extent: f32, limit: u32) -> (u32, u32) {
    let limit_f = limit as f32;
    let begin = (start * limit_f).round().clamp(0.0, limit_f);
    let end = ((start + extent) * limit_f).round().clamp(begin, limit_f);
    (begin as u32, (end - begin) as u32)
}

/// Whether `(x, y)` lies inside the square anchored at `(left, top)`.
/// Edges are inclusive.
pub fn point_in_square(x: f32, y: f32, left: f32, top: f32, size: f32) -> bool {
    x >= left && x <= left + size && y >= top && y <= top + size
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> BoundingBox {
        BoundingBox::new(0.31, 0.12, 0.4, 0.06)
    }

    #[test]
    fn boxes_align_is_reflexive() {
        let bbox = sample();
        assert!(boxes_align(&bbox, &bbox, 0.0));
        assert!(boxes_align(&bbox, &bbox, DEFAULT_VARIANCE_THRESHOLD));
    }

    #[test]
    fn boxes_align_rejects_single_dimension_drift() {
        let t = DEFAULT_VARIANCE_THRESHOLD;
        let delta = t + 0.01;
        let base = sample();
        let shifted = [
            BoundingBox { left: base.left + delta, ..base },
            BoundingBox { top: base.top + delta, ..base },
            BoundingBox { width: base.width + delta, ..base },
            BoundingBox { height: base.height + delta, ..base },
        ];
        for detected in shifted {
            assert!(!boxes_align(&base, &detected, t), "{detected:?}");
        }
    }

    #[test]
    fn boxes_align_accepts_narrower_detection() {
        let base = sample();
        let narrow = BoundingBox { width: 0.1, ..base };
        assert!(boxes_align(&base, &narrow, DEFAULT_VARIANCE_THRESHOLD));
    }

    #[test]
    fn edges_align_checks_far_edges() {
        let base = sample();
        let narrow = BoundingBox { width: 0.1, ..base };
        assert!(!edges_align(&base, &narrow, DEFAULT_VARIANCE_THRESHOLD));
        let nudged = BoundingBox { left: base.left + 0.02, ..base };
        assert!(edges_align(&base, &nudged, DEFAULT_VARIANCE_THRESHOLD));
    }

    #[test]
    fn angle_between_points_handles_slopes() {
        assert_eq!(angle_between_points(Point::new(0.0, 0.0), Point::new(1.0, 0.0)), 0.0);
        let up = angle_between_points(Point::new(0.0, 0.0), Point::new(1.0, 1.0));
        assert!((up - 45.0).abs() < 1e-4);
        let down = angle_between_points(Point::new(0.0, 0.0), Point::new(1.0, -1.0));
        assert!((down + 45.0).abs() < 1e-4);
        assert_eq!(angle_between_points(Point::new(0.5, 0.1), Point::new(0.5, 0.4)), 90.0);
        assert_eq!(angle_between_points(Point::new(0.5, 0.1), Point::new(0.5, 0.1)), 0.0);
    }

    #[test]
    fn crop_region_clamps_to_image() {
        let rect = crop_region(&BoundingBox::new(0.5, 0.8, 0.5, 0.7), 200, 100);
        assert_eq!(
            rect,
            PixelRect {
                x: 160,
                y: 50,
                width: 40,
                height: 50
            }
        );

        let negative = crop_region(&BoundingBox::new(-0.1, -0.2, 0.5, 0.5), 100, 100);
        assert_eq!(negative.x, 0);
        assert_eq!(negative.y, 0);
        assert_eq!(negative.width, 30);
        assert_eq!(negative.height, 40);
    }

    #[test]
    fn crop_region_never_exceeds_bounds() {
        let boxes = [
            BoundingBox::new(0.0, 0.0, 1.0, 1.0),
            BoundingBox::new(0.99, 0.99, 0.5, 0.5),
            BoundingBox::new(1.2, 1.3, 0.1, 0.1),
            BoundingBox::new(0.25, 0.4, 0.0, 0.0),
        ];
        for bbox in boxes {
            let rect = crop_region(&bbox, 640, 480);
            assert!(rect.x + rect.width <= 640, "{bbox:?}");
            assert!(rect.y + rect.height <= 480, "{bbox:?}");
        }
    }

    #[test]
    fn point_in_square_includes_edges() {
        assert!(point_in_square(0.45, 0.5, 0.45, 0.5, 0.05));
        assert!(point_in_square(0.47, 0.52, 0.45, 0.5, 0.05));
        assert!(!point_in_square(0.51, 0.52, 0.45, 0.5, 0.05));
    }
}
