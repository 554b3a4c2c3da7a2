//! Greedy non-maximum suppression.
//!
//! One selection routine serves both suppression modes; the overlap measure
//! is a closure so the axis-aligned and rotated paths share the ordering and
//! tie-break rules exactly. Candidates are sorted by descending score with
//! ties resolved toward the lower original index, then each survivor
//! deactivates every later candidate it overlaps beyond the threshold.
//! Survivors are returned in selection order, i.e. descending score.

use crate::{
    BoundingBox,
    geometry::{self, OrientedBox},
};
use std::collections::BTreeMap;

/// Suppress axis-aligned boxes. Returns indices into the input slices.
pub fn nms(boxes: &[BoundingBox], scores: &[f32], iou_threshold: f32) -> Vec<usize> {
    assert_eq!(boxes.len(), scores.len());
    select(scores, |i, j| geometry::iou(&boxes[i], &boxes[j]), iou_threshold)
}

/// Suppress oriented boxes via polygon-clip overlap.
pub fn nms_rotated(boxes: &[OrientedBox], scores: &[f32], iou_threshold: f32) -> Vec<usize> {
    assert_eq!(boxes.len(), scores.len());
    select(
        scores,
        |i, j| geometry::rotated_iou(&boxes[i], &boxes[j]),
        iou_threshold,
    )
}

/// Per-class suppression: candidates of different classes never suppress
/// each other. The merged survivor list is re-sorted by descending score
/// (ties toward the lower index) so callers see one coherent ranking.
pub fn nms_per_class(
    boxes: &[BoundingBox],
    scores: &[f32],
    labels: &[usize],
    iou_threshold: f32,
) -> Vec<usize> {
    assert_eq!(boxes.len(), scores.len());
    assert_eq!(boxes.len(), labels.len());
    select_per_class(
        scores,
        labels,
        |i, j| geometry::iou(&boxes[i], &boxes[j]),
        iou_threshold,
    )
}

pub fn nms_rotated_per_class(
    boxes: &[OrientedBox],
    scores: &[f32],
    labels: &[usize],
    iou_threshold: f32,
) -> Vec<usize> {
    assert_eq!(boxes.len(), scores.len());
    assert_eq!(boxes.len(), labels.len());
    select_per_class(
        scores,
        labels,
        |i, j| geometry::rotated_iou(&boxes[i], &boxes[j]),
        iou_threshold,
    )
}

/// Greedy selection over all candidates with an arbitrary overlap measure.
pub fn select<F>(scores: &[f32], iou_fn: F, iou_threshold: f32) -> Vec<usize>
where
    F: Fn(usize, usize) -> f32,
{
    let mut order: Vec<usize> = (0..scores.len()).collect();
    // stable sort: equal scores keep ascending index order
    order.sort_by(|&a, &b| scores[b].total_cmp(&scores[a]));

    let mut active = vec![true; scores.len()];
    let mut selected = Vec::new();
    greedy(&order, &iou_fn, iou_threshold, &mut active, &mut selected);
    selected
}

/// Greedy selection run independently per label, merged by descending score.
pub fn select_per_class<F>(
    scores: &[f32],
    labels: &[usize],
    iou_fn: F,
    iou_threshold: f32,
) -> Vec<usize>
where
    F: Fn(usize, usize) -> f32,
{
    let mut groups: BTreeMap<usize, Vec<usize>> = BTreeMap::new();
    for (index, &label) in labels.iter().enumerate() {
        groups.entry(label).or_default().push(index);
    }

    let mut active = vec![true; scores.len()];
    let mut selected = Vec::new();
    for order in groups.values_mut() {
        order.sort_by(|&a, &b| scores[b].total_cmp(&scores[a]));
        greedy(order, &iou_fn, iou_threshold, &mut active, &mut selected);
    }

    selected.sort_by(|&a, &b| scores[b].total_cmp(&scores[a]).then(a.cmp(&b)));
    selected
}

fn greedy<F>(
    order: &[usize],
    iou_fn: &F,
    iou_threshold: f32,
    active: &mut [bool],
    selected: &mut Vec<usize>,
) where
    F: Fn(usize, usize) -> f32,
{
    for (pos, &i) in order.iter().enumerate() {
        if !active[i] {
            // suppressed by a higher-scored candidate earlier
            continue;
        }
        selected.push(i);
        for &j in &order[pos + 1..] {
            if active[j] && iou_fn(i, j) > iou_threshold {
                active[j] = false;
            }
        }
    }
}
