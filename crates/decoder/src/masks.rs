// SPDX-FileCopyrightText: Copyright 2026 Sightline AI
// SPDX-License-Identifier: Apache-2.0

//! Instance mask assembly from shared prototype planes.
//!
//! Segmentation models emit a small stack of prototype planes once per
//! inference plus a coefficient vector per detection. A detection's mask is
//! the sigmoid of the coefficients' linear combination of the prototypes,
//! cropped to the detection box scaled into the prototype grid (prototypes
//! are typically 1/4 of the model input resolution). The prototypes are only
//! ever read, so assembly runs in parallel across detections.

use crate::BoundingBox;
use ndarray::{Array2, ArrayView2, ArrayView3, s};
use rayon::prelude::*;

/// A per-detection mask plane cropped to the detection box.
///
/// `mask` holds sigmoid probabilities over prototype cells, row-major in y
/// then x. The extents are the crop rectangle mapped back into model-input
/// pixels, snapped outward to the prototype grid.
#[derive(Debug, Clone, PartialEq)]
pub struct MaskPlane {
    pub xmin: f32,
    pub ymin: f32,
    pub xmax: f32,
    pub ymax: f32,
    pub mask: Array2<f32>,
}

impl MaskPlane {
    pub fn empty() -> Self {
        Self {
            xmin: 0.0,
            ymin: 0.0,
            xmax: 0.0,
            ymax: 0.0,
            mask: Array2::zeros((0, 0)),
        }
    }

    /// Binarized view at the fixed 0.5 probability cutoff.
    pub fn to_binary(&self) -> Array2<u8> {
        self.mask.map(|p| u8::from(*p >= 0.5))
    }
}

#[inline(always)]
pub fn fast_sigmoid(f: f32) -> f32 {
    if f.abs() > 80.0 {
        f.signum() * 0.5 + 0.5
    } else {
        // exp_raw is only valid for -88 < x < 88
        1.0 / (1.0 + fast_math::exp_raw(-f))
    }
}

/// Assemble one detection's mask.
///
/// `protos` is the shared `(K, H, W)` prototype stack, `coeffs` the
/// detection's K coefficients, `bbox` its box in model-input pixels and
/// `input_size` the model input `(width, height)`.
pub fn assemble_mask(
    coeffs: &[f32],
    protos: ArrayView3<f32>,
    bbox: &BoundingBox,
    input_size: (usize, usize),
) -> MaskPlane {
    let (channels, height, width) = protos.dim();
    debug_assert_eq!(coeffs.len(), channels);

    let (input_w, input_h) = (input_size.0 as f32, input_size.1 as f32);
    let (width_f, height_f) = (width as f32, height as f32);

    // crop rectangle in prototype cells, expanded by half a cell per side
    let x0 = (bbox.xmin / input_w * width_f - 0.5).clamp(0.0, width_f) as usize;
    let y0 = (bbox.ymin / input_h * height_f - 0.5).clamp(0.0, height_f) as usize;
    let x1 = (bbox.xmax / input_w * width_f + 0.5).clamp(0.0, width_f).ceil() as usize;
    let y1 = (bbox.ymax / input_h * height_f + 0.5).clamp(0.0, height_f).ceil() as usize;

    if x1 <= x0 || y1 <= y0 {
        return MaskPlane::empty();
    }
    let (rows, cols) = (y1 - y0, x1 - x0);

    let cropped = protos.slice(s![.., y0..y1, x0..x1]);
    let flat = cropped.to_shape((channels, rows * cols)).unwrap();
    let coeff_row = ArrayView2::from_shape((1, channels), coeffs).unwrap();
    let plane = coeff_row
        .dot(&flat)
        .into_shape_with_order((rows, cols))
        .unwrap();

    MaskPlane {
        xmin: x0 as f32 / width_f * input_w,
        ymin: y0 as f32 / height_f * input_h,
        xmax: x1 as f32 / width_f * input_w,
        ymax: y1 as f32 / height_f * input_h,
        mask: plane.mapv(fast_sigmoid),
    }
}

/// Assemble masks for every surviving detection, in input order.
pub fn assemble_masks(
    detections: &[(BoundingBox, Vec<f32>)],
    protos: ArrayView3<f32>,
    input_size: (usize, usize),
) -> Vec<MaskPlane> {
    if detections.is_empty() {
        return Vec::new();
    }
    detections
        .par_iter()
        .map(|(bbox, coeffs)| assemble_mask(coeffs, protos, bbox, input_size))
        .collect()
}
