//! Sightline - output decoding and detection suppression
//!
//! Turns the raw tensors of single-pass perception models into final
//! detections: per-task candidate extraction, confidence filtering,
//! per-class non-maximum suppression (axis-aligned or rotated), and
//! prototype-based instance mask assembly. The engine is pure computation
//! over in-memory buffers; model execution, capture and rendering live with
//! the caller.

use ndarray::ArrayView1;

pub mod error;
pub mod geometry;
pub mod masks;
pub mod nms;
pub mod palette;
pub mod yolo;

mod decoder;
pub use decoder::*;

pub use error::{DecoderError, DecoderResult};
pub use geometry::{OrientedBox, Point};
pub use masks::MaskPlane;
pub use yolo::{Candidate, Extra, Keypoint};

/// Corner-form rectangle in model-input pixel space.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct BoundingBox {
    pub xmin: f32,
    pub ymin: f32,
    pub xmax: f32,
    pub ymax: f32,
}

impl BoundingBox {
    /// Center-form to corner-form, the conversion every anchor decode does.
    pub fn from_cxcywh(cx: f32, cy: f32, w: f32, h: f32) -> Self {
        Self {
            xmin: cx - w * 0.5,
            ymin: cy - h * 0.5,
            xmax: cx + w * 0.5,
            ymax: cy + h * 0.5,
        }
    }

    /// Transforms the box so that xmin <= xmax and ymin <= ymax.
    pub fn to_canonical(&self) -> Self {
        BoundingBox {
            xmin: self.xmin.min(self.xmax),
            ymin: self.ymin.min(self.ymax),
            xmax: self.xmin.max(self.xmax),
            ymax: self.ymin.max(self.ymax),
        }
    }

    pub fn width(&self) -> f32 {
        self.xmax - self.xmin
    }

    pub fn height(&self) -> f32 {
        self.ymax - self.ymin
    }
}

impl From<BoundingBox> for [f32; 4] {
    fn from(b: BoundingBox) -> Self {
        [b.xmin, b.ymin, b.xmax, b.ymax]
    }
}

impl From<[f32; 4]> for BoundingBox {
    fn from(arr: [f32; 4]) -> Self {
        BoundingBox {
            xmin: arr[0],
            ymin: arr[1],
            xmax: arr[2],
            ymax: arr[3],
        }
    }
}

/// A suppressed axis-aligned detection from the standalone decode entry
/// points.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct DetectBox {
    pub bbox: BoundingBox,
    /// model-specific score for this detection, higher implies more confidence
    pub score: f32,
    /// label index for this detection
    pub label: usize,
}

impl DetectBox {
    /// Check if one detect box is equal to another detect box, within the
    /// given delta
    pub fn equal_within_delta(&self, rhs: &DetectBox, delta: f32) -> bool {
        let eq_delta = |a: f32, b: f32| (a - b).abs() <= delta;
        self.label == rhs.label
            && eq_delta(self.score, rhs.score)
            && eq_delta(self.bbox.xmin, rhs.bbox.xmin)
            && eq_delta(self.bbox.ymin, rhs.bbox.ymin)
            && eq_delta(self.bbox.xmax, rhs.bbox.xmax)
            && eq_delta(self.bbox.ymax, rhs.bbox.ymax)
    }
}

/// A suppressed oriented detection from the standalone oriented decode.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct OrientedDetectBox {
    pub obb: OrientedBox,
    pub score: f32,
    pub label: usize,
}

/// One class probability from a classification head.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct ClassScore {
    pub label: usize,
    pub score: f32,
}

/// A finalized post-suppression result.
///
/// `index` is the detection's stable ordinal within its decode call, in
/// descending score order, so callers can correlate overlays with result
/// rows. No two detections of the same class overlap beyond the decoder's
/// threshold.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Detection {
    pub bbox: BoundingBox,
    pub score: f32,
    pub label: usize,
    pub index: usize,
    pub payload: Payload,
}

/// Task-dependent extra data attached to a detection.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum Payload {
    #[default]
    None,
    /// Segmentation: per-detection mask plane cropped to the box.
    Mask(MaskPlane),
    /// Pose: keypoint triples in model-input pixels.
    Keypoints(Vec<Keypoint>),
    /// Oriented detection: rotation in radians, wrapped into `(-pi, pi]`.
    Angle(f32),
}

pub(crate) fn arg_max(score: ArrayView1<f32>) -> (f32, usize) {
    score
        .iter()
        .enumerate()
        .fold((score[0], 0), |(max, arg_max), (ind, s)| {
            if max > *s { (max, arg_max) } else { (*s, ind) }
        })
}
