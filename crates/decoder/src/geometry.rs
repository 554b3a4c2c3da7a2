//! Rectangle and oriented-box geometry used by the suppression passes.
//!
//! Overlap is measured as intersection over the *minimum* of the two areas
//! rather than over the union. A small box fully inside a much larger one
//! scores 1.0 instead of a near-zero union ratio, which keeps suppression
//! stable when the model emits boxes at very different scales. Both the
//! axis-aligned and the rotated path use the same convention.

use crate::BoundingBox;

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Point {
    pub x: f32,
    pub y: f32,
}

impl Point {
    pub fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }
}

/// An oriented bounding box: center, extents and rotation in radians.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct OrientedBox {
    pub cx: f32,
    pub cy: f32,
    pub w: f32,
    pub h: f32,
    pub angle: f32,
}

impl OrientedBox {
    pub fn new(cx: f32, cy: f32, w: f32, h: f32, angle: f32) -> Self {
        Self { cx, cy, w, h, angle }
    }

    /// Rotation preserves area, so this never consults the corner polygon.
    pub fn area(&self) -> f32 {
        self.w.max(0.0) * self.h.max(0.0)
    }

    /// The four corners of the unrotated box rotated by `angle` around the
    /// center, in consistent winding order.
    pub fn corners(&self) -> [Point; 4] {
        let (sin, cos) = self.angle.sin_cos();
        let hw = self.w * 0.5;
        let hh = self.h * 0.5;
        let rot = |dx: f32, dy: f32| Point {
            x: self.cx + dx * cos - dy * sin,
            y: self.cy + dx * sin + dy * cos,
        };
        [
            rot(-hw, -hh),
            rot(hw, -hh),
            rot(hw, hh),
            rot(-hw, hh),
        ]
    }

    /// Axis-aligned bounds of the rotated corners.
    pub fn aabb(&self) -> BoundingBox {
        let corners = self.corners();
        let mut bbox = BoundingBox {
            xmin: corners[0].x,
            ymin: corners[0].y,
            xmax: corners[0].x,
            ymax: corners[0].y,
        };
        for c in &corners[1..] {
            bbox.xmin = bbox.xmin.min(c.x);
            bbox.ymin = bbox.ymin.min(c.y);
            bbox.xmax = bbox.xmax.max(c.x);
            bbox.ymax = bbox.ymax.max(c.y);
        }
        bbox
    }
}

/// Box area with negative extents clamped to zero, so degenerate boxes can
/// neither suppress nor be suppressed.
pub fn area(b: &BoundingBox) -> f32 {
    (b.xmax - b.xmin).max(0.0) * (b.ymax - b.ymin).max(0.0)
}

pub fn intersection_area(a: &BoundingBox, b: &BoundingBox) -> f32 {
    let left = a.xmin.max(b.xmin);
    let top = a.ymin.max(b.ymin);
    let right = a.xmax.min(b.xmax);
    let bottom = a.ymax.min(b.ymax);

    (right - left).max(0.0) * (bottom - top).max(0.0)
}

/// Intersection over minimum area. Returns 0 when the smaller box has no
/// area.
pub fn iou(a: &BoundingBox, b: &BoundingBox) -> f32 {
    let min_area = area(a).min(area(b));
    if min_area <= 0.0 {
        return 0.0;
    }
    intersection_area(a, b) / min_area
}

/// Shoelace area, sign discarded.
pub fn polygon_area(polygon: &[Point]) -> f32 {
    (signed_area(polygon) * 0.5).abs()
}

fn signed_area(polygon: &[Point]) -> f32 {
    if polygon.len() < 3 {
        return 0.0;
    }
    let mut sum = 0.0;
    let mut prev = polygon[polygon.len() - 1];
    for &p in polygon {
        sum += prev.x * p.y - p.x * prev.y;
        prev = p;
    }
    sum
}

fn edge_side(a: Point, b: Point, p: Point) -> f32 {
    (b.x - a.x) * (p.y - a.y) - (b.y - a.y) * (p.x - a.x)
}

fn edge_intersect(p: Point, q: Point, a: Point, b: Point) -> Point {
    let dp = edge_side(a, b, p);
    let dq = edge_side(a, b, q);
    let t = dp / (dp - dq);
    Point {
        x: p.x + t * (q.x - p.x),
        y: p.y + t * (q.y - p.y),
    }
}

/// Sutherland-Hodgman: clips `subject` against each edge of the convex
/// polygon `clip` in turn. Degenerate results (fewer than 3 points) collapse
/// to an empty polygon with area 0. Either winding is accepted for both
/// inputs; `clip` must be convex.
pub fn clip_polygon(subject: &[Point], clip: &[Point]) -> Vec<Point> {
    if subject.len() < 3 || clip.len() < 3 {
        return Vec::new();
    }
    // orient the inside test to the clip polygon's winding
    let orientation = if signed_area(clip) >= 0.0 { 1.0 } else { -1.0 };

    let mut output = subject.to_vec();
    for i in 0..clip.len() {
        if output.is_empty() {
            break;
        }
        let a = clip[i];
        let b = clip[(i + 1) % clip.len()];
        let input = std::mem::take(&mut output);
        let mut prev = input[input.len() - 1];
        let mut prev_inside = edge_side(a, b, prev) * orientation >= 0.0;
        for &curr in &input {
            let curr_inside = edge_side(a, b, curr) * orientation >= 0.0;
            if curr_inside {
                if !prev_inside {
                    output.push(edge_intersect(prev, curr, a, b));
                }
                output.push(curr);
            } else if prev_inside {
                output.push(edge_intersect(prev, curr, a, b));
            }
            prev = curr;
            prev_inside = curr_inside;
        }
    }
    if output.len() < 3 {
        return Vec::new();
    }
    output
}

/// Rotated IoU over the minimum box area.
///
/// The axis-aligned bounds are compared first; disjoint bounds mean the
/// polygons cannot intersect and the clip is skipped entirely.
pub fn rotated_iou(a: &OrientedBox, b: &OrientedBox) -> f32 {
    if intersection_area(&a.aabb(), &b.aabb()) <= 0.0 {
        return 0.0;
    }
    let min_area = a.area().min(b.area());
    if min_area <= 0.0 {
        return 0.0;
    }
    let intersection = clip_polygon(&a.corners(), &b.corners());
    polygon_area(&intersection) / min_area
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::f32::consts::{FRAC_PI_3, FRAC_PI_4, PI};

    fn xywh(x: f32, y: f32, w: f32, h: f32) -> BoundingBox {
        BoundingBox {
            xmin: x,
            ymin: y,
            xmax: x + w,
            ymax: y + h,
        }
    }

    #[test]
    fn test_iou_over_minimum_area() {
        // 50x50 overlap, smaller box area 10000
        let a = xywh(100.0, 100.0, 100.0, 100.0);
        let b = xywh(150.0, 150.0, 100.0, 100.0);
        assert!((intersection_area(&a, &b) - 2500.0).abs() < 1e-3);
        assert!((iou(&a, &b) - 0.25).abs() < 1e-6);

        // full containment scores 1.0 under the minimum-area convention
        let outer = xywh(0.0, 0.0, 100.0, 100.0);
        let inner = xywh(40.0, 40.0, 10.0, 10.0);
        assert!((iou(&outer, &inner) - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_iou_disjoint_and_degenerate() {
        let a = xywh(0.0, 0.0, 50.0, 50.0);
        let b = xywh(100.0, 100.0, 50.0, 50.0);
        assert_eq!(iou(&a, &b), 0.0);

        let flipped = BoundingBox {
            xmin: 10.0,
            ymin: 10.0,
            xmax: 0.0,
            ymax: 0.0,
        };
        assert_eq!(area(&flipped), 0.0);
        assert_eq!(iou(&a, &flipped), 0.0);
    }

    #[test]
    fn test_polygon_area_shoelace() {
        let square = [
            Point::new(0.0, 0.0),
            Point::new(10.0, 0.0),
            Point::new(10.0, 10.0),
            Point::new(0.0, 10.0),
        ];
        assert!((polygon_area(&square) - 100.0).abs() < 1e-4);
        // reversed winding gives the same magnitude
        let reversed: Vec<_> = square.iter().rev().copied().collect();
        assert!((polygon_area(&reversed) - 100.0).abs() < 1e-4);
        assert_eq!(polygon_area(&square[..2]), 0.0);
    }

    #[test]
    fn test_clip_overlapping_squares() {
        let a = [
            Point::new(0.0, 0.0),
            Point::new(10.0, 0.0),
            Point::new(10.0, 10.0),
            Point::new(0.0, 10.0),
        ];
        let b = [
            Point::new(5.0, 5.0),
            Point::new(15.0, 5.0),
            Point::new(15.0, 15.0),
            Point::new(5.0, 15.0),
        ];
        let clipped = clip_polygon(&a, &b);
        assert_eq!(clipped.len(), 4);
        assert!((polygon_area(&clipped) - 25.0).abs() < 1e-3);
    }

    #[test]
    fn test_clip_disjoint_is_empty() {
        let a = [
            Point::new(0.0, 0.0),
            Point::new(1.0, 0.0),
            Point::new(1.0, 1.0),
            Point::new(0.0, 1.0),
        ];
        let b = [
            Point::new(5.0, 5.0),
            Point::new(6.0, 5.0),
            Point::new(6.0, 6.0),
            Point::new(5.0, 6.0),
        ];
        let clipped = clip_polygon(&a, &b);
        assert!(clipped.is_empty());
        assert_eq!(polygon_area(&clipped), 0.0);
    }

    #[test]
    fn test_oriented_area_invariant_under_rotation() {
        for angle in [0.0, 0.3, FRAC_PI_4, FRAC_PI_3, 1.9, PI, -2.4] {
            let obb = OrientedBox::new(37.0, -12.0, 3.0, 5.0, angle);
            assert!((obb.area() - 15.0).abs() < 1e-4);
            // the corner polygon agrees with w*h as well
            let corners = obb.corners();
            assert!((polygon_area(&corners) - 15.0).abs() < 1e-3);
        }
    }

    #[test]
    fn test_rotated_iou_identity() {
        let obb = OrientedBox::new(10.0, 20.0, 8.0, 3.0, 0.7);
        assert!((rotated_iou(&obb, &obb) - 1.0).abs() < 1e-3);
    }

    #[test]
    fn test_rotated_iou_disjoint_aabb_fast_reject() {
        let a = OrientedBox::new(0.0, 0.0, 4.0, 2.0, 0.5);
        let b = OrientedBox::new(100.0, 100.0, 4.0, 2.0, -1.1);
        assert_eq!(rotated_iou(&a, &b), 0.0);
    }

    #[test]
    fn test_rotated_iou_known_overlap() {
        // two unit-origin squares offset by half a side, no rotation:
        // identical to the axis-aligned case
        let a = OrientedBox::new(5.0, 5.0, 10.0, 10.0, 0.0);
        let b = OrientedBox::new(10.0, 10.0, 10.0, 10.0, 0.0);
        assert!((rotated_iou(&a, &b) - 0.25).abs() < 1e-3);

        // a quarter turn maps a square onto itself
        let c = OrientedBox::new(5.0, 5.0, 10.0, 10.0, std::f32::consts::FRAC_PI_2);
        assert!((rotated_iou(&a, &c) - 1.0).abs() < 1e-3);
    }

    #[test]
    fn test_aabb_bounds_rotated_corners() {
        let obb = OrientedBox::new(0.0, 0.0, 10.0, 2.0, FRAC_PI_4);
        let bbox = obb.aabb();
        let half = (10.0 + 2.0) * 0.5 * std::f32::consts::FRAC_1_SQRT_2;
        assert!((bbox.xmax - half).abs() < 1e-3);
        assert!((bbox.xmin + half).abs() < 1e-3);
        for c in obb.corners() {
            assert!(c.x >= bbox.xmin - 1e-4 && c.x <= bbox.xmax + 1e-4);
            assert!(c.y >= bbox.ymin - 1e-4 && c.y <= bbox.ymax + 1e-4);
        }
    }
}
