//! Per-task decoding of raw prediction tensors into scored candidates.
//!
//! Every anchor-based head shares the `[features, anchors]` layout with the
//! box in the first four feature rows; the remaining rows differ per task:
//!
//! | task    | feature rows                                             |
//! |---------|----------------------------------------------------------|
//! | detect  | `4..` class scores                                       |
//! | segment | `4..4+C` class scores, `4+C..` mask coefficients         |
//! | pose    | `4` objectness, `5..` keypoint `(x, y, conf)` triples    |
//! | obb     | `4` angle in radians, `5..` class scores                 |
//!
//! Classification heads are a plain probability vector and are decoded
//! separately. Anchors are independent, so extraction is a parallel
//! filter-map over anchor columns; candidate order follows anchor order and
//! suppression re-sorts by score afterwards.

use crate::{
    BoundingBox, ClassScore, DetectBox, OrientedDetectBox, arg_max,
    geometry::OrientedBox,
    masks::{self, MaskPlane},
    nms,
};
use ndarray::{
    ArrayView1, ArrayView2, ArrayView3, Zip,
    parallel::prelude::{IntoParallelIterator, ParallelIterator},
    s,
};
use ndarray_stats::QuantileExt;
use std::f32::consts::{PI, TAU};

/// A pre-suppression detection hypothesis.
#[derive(Debug, Clone, PartialEq)]
pub struct Candidate {
    pub bbox: BoundingBox,
    pub score: f32,
    pub label: usize,
    pub extra: Extra,
}

/// Task-specific payload carried through suppression.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum Extra {
    #[default]
    None,
    Coeffs(Vec<f32>),
    Keypoints(Vec<Keypoint>),
    Angle(f32),
}

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Keypoint {
    pub x: f32,
    pub y: f32,
    pub conf: f32,
}

impl Candidate {
    /// Oriented geometry for rotated suppression; None unless this is an
    /// oriented candidate.
    pub fn oriented(&self) -> Option<OrientedBox> {
        let Extra::Angle(angle) = self.extra else {
            return None;
        };
        Some(OrientedBox {
            cx: (self.bbox.xmin + self.bbox.xmax) * 0.5,
            cy: (self.bbox.ymin + self.bbox.ymax) * 0.5,
            w: self.bbox.xmax - self.bbox.xmin,
            h: self.bbox.ymax - self.bbox.ymin,
            angle,
        })
    }
}

/// Wraps a decoded angle into `(-pi, pi]`.
pub fn normalize_angle(angle: f32) -> f32 {
    let wrapped = angle.rem_euclid(TAU);
    if wrapped > PI { wrapped - TAU } else { wrapped }
}

/// Extract plain detection candidates from `[4 + C, anchors]`.
pub fn extract_detect(output: ArrayView2<f32>, score_threshold: f32) -> Vec<Candidate> {
    let boxes_tensor = output.slice(s![..4, ..]).reversed_axes();
    let scores_tensor = output.slice(s![4.., ..]).reversed_axes();
    Zip::from(boxes_tensor.rows())
        .and(scores_tensor.rows())
        .into_par_iter()
        .filter_map(|(bbox, scores)| {
            let (score, label) = arg_max(scores);
            if score <= score_threshold {
                return None;
            }
            Some(Candidate {
                bbox: BoundingBox::from_cxcywh(bbox[0], bbox[1], bbox[2], bbox[3]),
                score,
                label,
                extra: Extra::None,
            })
        })
        .collect()
}

/// Extract segmentation candidates from `[4 + C + K, anchors]`, keeping each
/// survivor's K mask coefficients.
pub fn extract_segment(
    output: ArrayView2<f32>,
    num_coeffs: usize,
    score_threshold: f32,
) -> Vec<Candidate> {
    let features = output.shape()[0];
    assert!(
        features > 4 + num_coeffs,
        "segmentation output needs class rows between boxes and coefficients"
    );
    let num_classes = features - 4 - num_coeffs;
    let boxes_tensor = output.slice(s![..4, ..]).reversed_axes();
    let scores_tensor = output.slice(s![4..4 + num_classes, ..]).reversed_axes();
    let coeffs_tensor = output.slice(s![4 + num_classes.., ..]).reversed_axes();
    Zip::from(boxes_tensor.rows())
        .and(scores_tensor.rows())
        .and(coeffs_tensor.rows())
        .into_par_iter()
        .filter_map(|(bbox, scores, coeffs)| {
            let (score, label) = arg_max(scores);
            if score <= score_threshold {
                return None;
            }
            Some(Candidate {
                bbox: BoundingBox::from_cxcywh(bbox[0], bbox[1], bbox[2], bbox[3]),
                score,
                label,
                extra: Extra::Coeffs(coeffs.to_vec()),
            })
        })
        .collect()
}

/// Extract pose candidates from `[5 + 3 * J, anchors]`. There is a single
/// implicit object class; the objectness row is the score.
pub fn extract_pose(output: ArrayView2<f32>, score_threshold: f32) -> Vec<Candidate> {
    let features = output.shape()[0];
    assert!(
        features > 5 && (features - 5) % 3 == 0,
        "pose output needs (x, y, conf) keypoint triples after the objectness row"
    );
    let num_keypoints = (features - 5) / 3;
    let boxes_tensor = output.slice(s![..4, ..]).reversed_axes();
    let obj_tensor = output.slice(s![4..5, ..]).reversed_axes();
    let kpts_tensor = output.slice(s![5.., ..]).reversed_axes();
    Zip::from(boxes_tensor.rows())
        .and(obj_tensor.rows())
        .and(kpts_tensor.rows())
        .into_par_iter()
        .filter_map(|(bbox, obj, kpts)| {
            let score = obj[0];
            if score <= score_threshold {
                return None;
            }
            let keypoints = (0..num_keypoints)
                .map(|k| Keypoint {
                    x: kpts[3 * k],
                    y: kpts[3 * k + 1],
                    conf: kpts[3 * k + 2],
                })
                .collect();
            Some(Candidate {
                bbox: BoundingBox::from_cxcywh(bbox[0], bbox[1], bbox[2], bbox[3]),
                score,
                label: 0,
                extra: Extra::Keypoints(keypoints),
            })
        })
        .collect()
}

/// Extract oriented-box candidates from `[5 + C, anchors]`. The decoded
/// angle is wrapped into `(-pi, pi]`.
pub fn extract_obb(output: ArrayView2<f32>, score_threshold: f32) -> Vec<Candidate> {
    let features = output.shape()[0];
    assert!(
        features > 5,
        "oriented output needs class rows after the angle row"
    );
    let boxes_tensor = output.slice(s![..4, ..]).reversed_axes();
    let angle_tensor = output.slice(s![4..5, ..]).reversed_axes();
    let scores_tensor = output.slice(s![5.., ..]).reversed_axes();
    Zip::from(boxes_tensor.rows())
        .and(angle_tensor.rows())
        .and(scores_tensor.rows())
        .into_par_iter()
        .filter_map(|(bbox, angle, scores)| {
            let (score, label) = arg_max(scores);
            if score <= score_threshold {
                return None;
            }
            Some(Candidate {
                bbox: BoundingBox::from_cxcywh(bbox[0], bbox[1], bbox[2], bbox[3]),
                score,
                label,
                extra: Extra::Angle(normalize_angle(angle[0])),
            })
        })
        .collect()
}

/// Decode and suppress a plain detection output. At most
/// `output_boxes.capacity()` results are kept, in descending score order.
pub fn decode_detect(
    output: ArrayView2<f32>,
    score_threshold: f32,
    iou_threshold: f32,
    output_boxes: &mut Vec<DetectBox>,
) {
    let candidates = extract_detect(output, score_threshold);
    let keep = nms_candidates(&candidates, iou_threshold);
    let len = output_boxes.capacity().min(keep.len());
    output_boxes.clear();
    for &i in keep.iter().take(len) {
        let c = &candidates[i];
        output_boxes.push(DetectBox {
            bbox: c.bbox,
            score: c.score,
            label: c.label,
        });
    }
}

/// Decode and suppress a segmentation output, assembling one mask per
/// survivor from the shared `(K, H, W)` prototype stack.
#[allow(clippy::too_many_arguments)]
pub fn decode_segment(
    output: ArrayView2<f32>,
    protos: ArrayView3<f32>,
    input_size: (usize, usize),
    score_threshold: f32,
    iou_threshold: f32,
    output_boxes: &mut Vec<DetectBox>,
    output_masks: &mut Vec<MaskPlane>,
) {
    let candidates = extract_segment(output, protos.dim().0, score_threshold);
    let keep = nms_candidates(&candidates, iou_threshold);
    let len = output_boxes.capacity().min(keep.len());

    let survivors: Vec<(BoundingBox, Vec<f32>)> = keep
        .iter()
        .take(len)
        .map(|&i| {
            let c = &candidates[i];
            let Extra::Coeffs(ref coeffs) = c.extra else {
                unreachable!("segment candidates always carry coefficients");
            };
            (c.bbox, coeffs.clone())
        })
        .collect();
    let masks = masks::assemble_masks(&survivors, protos, input_size);

    output_boxes.clear();
    output_masks.clear();
    for (&i, mask) in keep.iter().take(len).zip(masks) {
        let c = &candidates[i];
        output_boxes.push(DetectBox {
            bbox: c.bbox,
            score: c.score,
            label: c.label,
        });
        output_masks.push(mask);
    }
}

/// Decode and suppress a pose output; keypoints parallel the boxes.
pub fn decode_pose(
    output: ArrayView2<f32>,
    score_threshold: f32,
    iou_threshold: f32,
    output_boxes: &mut Vec<DetectBox>,
    output_keypoints: &mut Vec<Vec<Keypoint>>,
) {
    let candidates = extract_pose(output, score_threshold);
    let keep = nms_candidates(&candidates, iou_threshold);
    let len = output_boxes.capacity().min(keep.len());
    output_boxes.clear();
    output_keypoints.clear();
    for &i in keep.iter().take(len) {
        let c = &candidates[i];
        let Extra::Keypoints(ref keypoints) = c.extra else {
            unreachable!("pose candidates always carry keypoints");
        };
        output_boxes.push(DetectBox {
            bbox: c.bbox,
            score: c.score,
            label: c.label,
        });
        output_keypoints.push(keypoints.clone());
    }
}

/// Decode and suppress an oriented-box output via rotated overlap.
pub fn decode_obb(
    output: ArrayView2<f32>,
    score_threshold: f32,
    iou_threshold: f32,
    output_boxes: &mut Vec<OrientedDetectBox>,
) {
    let candidates = extract_obb(output, score_threshold);
    let oriented: Vec<OrientedBox> = candidates
        .iter()
        .map(|c| c.oriented().unwrap_or_default())
        .collect();
    let scores: Vec<f32> = candidates.iter().map(|c| c.score).collect();
    let labels: Vec<usize> = candidates.iter().map(|c| c.label).collect();
    let keep = nms::nms_rotated_per_class(&oriented, &scores, &labels, iou_threshold);
    let len = output_boxes.capacity().min(keep.len());
    output_boxes.clear();
    for &i in keep.iter().take(len) {
        output_boxes.push(OrientedDetectBox {
            obb: oriented[i],
            score: scores[i],
            label: labels[i],
        });
    }
}

/// Decode a classification vector: every class above the threshold, sorted
/// by descending probability (ties toward the lower class index), truncated
/// to `output_scores.capacity()`.
pub fn decode_classify(
    probs: ArrayView1<f32>,
    score_threshold: f32,
    output_scores: &mut Vec<ClassScore>,
) {
    let mut scored: Vec<ClassScore> = probs
        .iter()
        .enumerate()
        .filter(|&(_, &p)| p > score_threshold)
        .map(|(label, &p)| ClassScore { label, score: p })
        .collect();
    scored.sort_by(|a, b| b.score.total_cmp(&a.score).then(a.label.cmp(&b.label)));
    let len = output_scores.capacity().min(scored.len());
    output_scores.clear();
    for s in scored.into_iter().take(len) {
        output_scores.push(s);
    }
}

/// The single most probable class, if the vector is non-empty.
pub fn top_class(probs: ArrayView1<f32>) -> Option<ClassScore> {
    let label = probs.argmax().ok()?;
    Some(ClassScore {
        label,
        score: probs[label],
    })
}

/// Per-class axis-aligned suppression over a candidate list.
pub(crate) fn nms_candidates(candidates: &[Candidate], iou_threshold: f32) -> Vec<usize> {
    let boxes: Vec<BoundingBox> = candidates.iter().map(|c| c.bbox).collect();
    let scores: Vec<f32> = candidates.iter().map(|c| c.score).collect();
    let labels: Vec<usize> = candidates.iter().map(|c| c.label).collect();
    nms::nms_per_class(&boxes, &scores, &labels, iou_threshold)
}
