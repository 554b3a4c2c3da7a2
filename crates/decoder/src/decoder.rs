// SPDX-FileCopyrightText: Copyright 2026 Sightline AI
// SPDX-License-Identifier: Apache-2.0

//! The decode pipeline: validate shapes, extract candidates, filter by
//! confidence, suppress per class, truncate, and assemble masks.
//!
//! A [`Decoder`] is an immutable bundle of task and thresholds. Every call
//! to [`Decoder::decode`] is an independent, pure function over the tensors
//! it is handed; there is no cross-call state, so one decoder can serve any
//! number of threads concurrently.

use crate::{
    BoundingBox, ClassScore, DecoderError, DecoderResult, Detection, Payload,
    masks,
    yolo::{self, Candidate, Extra},
};
use log::debug;
use ndarray::{ArrayView2, ArrayView3};
use serde::{Deserialize, Serialize};
use sightline_tensor::TensorView;

/// The model head a decoder interprets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Task {
    Detect,
    Segment,
    Pose,
    Obb,
    Classify,
}

/// Serializable decode settings. Unset fields fall back to the usual
/// single-pass-model defaults, so a deployment can ship a two-line YAML file
/// next to the model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DecoderConfig {
    pub task: Task,
    #[serde(default = "defaults::score_threshold")]
    pub score_threshold: f32,
    #[serde(default = "defaults::iou_threshold")]
    pub iou_threshold: f32,
    #[serde(default = "defaults::max_detections")]
    pub max_detections: usize,
    /// Model input size in pixels, `[width, height]`. Only used to scale
    /// boxes into the prototype grid during mask assembly.
    #[serde(default = "defaults::input_size")]
    pub input_size: [usize; 2],
    /// Coefficient count assumed when a segmentation call carries no
    /// prototype tensor to read it from.
    #[serde(default = "defaults::mask_coefficients")]
    pub mask_coefficients: usize,
    /// When true a segmentation call without usable prototypes is an error;
    /// when false it degrades to boxes without masks.
    #[serde(default = "defaults::strict_masks")]
    pub strict_masks: bool,
}

mod defaults {
    pub fn score_threshold() -> f32 {
        0.25
    }
    pub fn iou_threshold() -> f32 {
        0.45
    }
    pub fn max_detections() -> usize {
        300
    }
    pub fn input_size() -> [usize; 2] {
        [640, 640]
    }
    pub fn mask_coefficients() -> usize {
        32
    }
    pub fn strict_masks() -> bool {
        true
    }
}

impl DecoderConfig {
    pub fn new(task: Task) -> Self {
        Self {
            task,
            score_threshold: defaults::score_threshold(),
            iou_threshold: defaults::iou_threshold(),
            max_detections: defaults::max_detections(),
            input_size: defaults::input_size(),
            mask_coefficients: defaults::mask_coefficients(),
            strict_masks: defaults::strict_masks(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
enum ConfigSource {
    Yaml(String),
    Json(String),
    Config(DecoderConfig),
}

/// Builds a [`Decoder`] from a config source plus optional overrides.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DecoderBuilder {
    config_src: Option<ConfigSource>,
    score_threshold: Option<f32>,
    iou_threshold: Option<f32>,
    max_detections: Option<usize>,
    input_size: Option<[usize; 2]>,
    mask_coefficients: Option<usize>,
    strict_masks: Option<bool>,
}

impl DecoderBuilder {
    /// Creates an empty builder. A task or configuration must be provided
    /// before building.
    ///
    /// # Examples
    /// ```rust
    /// # use sightline_decoder::{DecoderBuilder, DecoderResult, Task};
    /// # fn main() -> DecoderResult<()> {
    /// let decoder = DecoderBuilder::new()
    ///     .with_task(Task::Detect)
    ///     .with_score_threshold(0.4)
    ///     .build()?;
    /// assert_eq!(decoder.task(), Task::Detect);
    /// assert_eq!(decoder.score_threshold, 0.4);
    /// # Ok(())
    /// # }
    /// ```
    pub fn new() -> Self {
        Self::default()
    }

    /// Starts from the default configuration for `task`.
    pub fn with_task(mut self, task: Task) -> Self {
        self.config_src
            .replace(ConfigSource::Config(DecoderConfig::new(task)));
        self
    }

    /// Uses an already-deserialized configuration.
    pub fn with_config(mut self, config: DecoderConfig) -> Self {
        self.config_src.replace(ConfigSource::Config(config));
        self
    }

    /// Loads a YAML configuration string. Deserialization happens in
    /// `build()`.
    ///
    /// # Examples
    /// ```rust
    /// # use sightline_decoder::{DecoderBuilder, DecoderResult, Task};
    /// # fn main() -> DecoderResult<()> {
    /// let yaml = "task: segment\nscore_threshold: 0.3\n";
    /// let decoder = DecoderBuilder::new()
    ///     .with_config_yaml_str(yaml.to_string())
    ///     .build()?;
    /// assert_eq!(decoder.task(), Task::Segment);
    /// assert_eq!(decoder.score_threshold, 0.3);
    /// # Ok(())
    /// # }
    /// ```
    pub fn with_config_yaml_str(mut self, yaml_str: String) -> Self {
        self.config_src.replace(ConfigSource::Yaml(yaml_str));
        self
    }

    /// Loads a JSON configuration string. Deserialization happens in
    /// `build()`.
    pub fn with_config_json_str(mut self, json_str: String) -> Self {
        self.config_src.replace(ConfigSource::Json(json_str));
        self
    }

    pub fn with_score_threshold(mut self, score_threshold: f32) -> Self {
        self.score_threshold = Some(score_threshold);
        self
    }

    pub fn with_iou_threshold(mut self, iou_threshold: f32) -> Self {
        self.iou_threshold = Some(iou_threshold);
        self
    }

    pub fn with_max_detections(mut self, max_detections: usize) -> Self {
        self.max_detections = Some(max_detections);
        self
    }

    pub fn with_input_size(mut self, input_size: [usize; 2]) -> Self {
        self.input_size = Some(input_size);
        self
    }

    pub fn with_mask_coefficients(mut self, mask_coefficients: usize) -> Self {
        self.mask_coefficients = Some(mask_coefficients);
        self
    }

    pub fn with_strict_masks(mut self, strict_masks: bool) -> Self {
        self.strict_masks = Some(strict_masks);
        self
    }

    /// Resolves the config source, applies overrides and validates.
    pub fn build(self) -> DecoderResult<Decoder> {
        let mut config = match self.config_src {
            Some(ConfigSource::Yaml(s)) => serde_yaml::from_str(&s)?,
            Some(ConfigSource::Json(s)) => serde_json::from_str(&s)?,
            Some(ConfigSource::Config(c)) => c,
            None => return Err(DecoderError::NoConfig),
        };
        if let Some(v) = self.score_threshold {
            config.score_threshold = v;
        }
        if let Some(v) = self.iou_threshold {
            config.iou_threshold = v;
        }
        if let Some(v) = self.max_detections {
            config.max_detections = v;
        }
        if let Some(v) = self.input_size {
            config.input_size = v;
        }
        if let Some(v) = self.mask_coefficients {
            config.mask_coefficients = v;
        }
        if let Some(v) = self.strict_masks {
            config.strict_masks = v;
        }

        if !(0.0..=1.0).contains(&config.score_threshold) {
            return Err(DecoderError::InvalidConfig(format!(
                "score threshold {} outside [0, 1]",
                config.score_threshold
            )));
        }
        if !(0.0..=1.0).contains(&config.iou_threshold) {
            return Err(DecoderError::InvalidConfig(format!(
                "overlap threshold {} outside [0, 1]",
                config.iou_threshold
            )));
        }
        if config.input_size[0] == 0 || config.input_size[1] == 0 {
            return Err(DecoderError::InvalidConfig(format!(
                "input size {:?} has a zero dimension",
                config.input_size
            )));
        }
        if config.mask_coefficients == 0 {
            return Err(DecoderError::InvalidConfig(
                "mask coefficient count must be at least 1".to_string(),
            ));
        }

        Ok(Decoder {
            task: config.task,
            score_threshold: config.score_threshold,
            iou_threshold: config.iou_threshold,
            max_detections: config.max_detections,
            input_size: config.input_size,
            mask_coefficients: config.mask_coefficients,
            strict_masks: config.strict_masks,
        })
    }
}

/// An immutable decode pipeline for one task.
#[derive(Debug, Clone, PartialEq)]
pub struct Decoder {
    pub score_threshold: f32,
    pub iou_threshold: f32,
    pub max_detections: usize,
    pub input_size: [usize; 2],
    pub mask_coefficients: usize,
    pub strict_masks: bool,
    task: Task,
}

impl Decoder {
    pub fn task(&self) -> Task {
        self.task
    }

    /// Decodes one inference call's raw outputs into final detections.
    ///
    /// Anchor-based tasks expect `outputs[0]` shaped `[1, features,
    /// anchors]` (the leading batch axis may be omitted); segmentation
    /// additionally expects the prototype stack `[1, K, H, W]` as
    /// `outputs[1]`. Classification expects a probability vector. An empty
    /// `outputs` slice or an output with zero anchors yields an empty
    /// result, not an error.
    pub fn decode(&self, outputs: &[TensorView]) -> DecoderResult<Vec<Detection>> {
        if outputs.is_empty() {
            return Ok(Vec::new());
        }
        match self.task {
            Task::Detect => self.decode_detect(outputs),
            Task::Segment => self.decode_segment(outputs),
            Task::Pose => self.decode_pose(outputs),
            Task::Obb => self.decode_obb(outputs),
            Task::Classify => self.decode_classify(outputs),
        }
    }

    fn decode_detect(&self, outputs: &[TensorView]) -> DecoderResult<Vec<Detection>> {
        let view = features_view(&outputs[0])?;
        if view.shape()[0] < 5 {
            return Err(DecoderError::ShapeMismatch(format!(
                "detection output needs at least 5 feature rows, got {}",
                view.shape()[0]
            )));
        }
        let candidates = yolo::extract_detect(view, self.score_threshold);
        Ok(self.suppress_and_finalize(candidates, None))
    }

    fn decode_segment(&self, outputs: &[TensorView]) -> DecoderResult<Vec<Detection>> {
        let view = features_view(&outputs[0])?;
        let protos = self.prototype_view(outputs)?;
        let num_coeffs = protos.map_or(self.mask_coefficients, |p| p.dim().0);
        if view.shape()[0] <= 4 + num_coeffs {
            return Err(DecoderError::ShapeMismatch(format!(
                "segmentation output needs more than {} feature rows, got {}",
                4 + num_coeffs,
                view.shape()[0]
            )));
        }
        let candidates = yolo::extract_segment(view, num_coeffs, self.score_threshold);
        Ok(self.suppress_and_finalize(candidates, protos))
    }

    fn decode_pose(&self, outputs: &[TensorView]) -> DecoderResult<Vec<Detection>> {
        let view = features_view(&outputs[0])?;
        let features = view.shape()[0];
        if features <= 5 || (features - 5) % 3 != 0 {
            return Err(DecoderError::ShapeMismatch(format!(
                "pose output needs 5 + 3*keypoints feature rows, got {features}"
            )));
        }
        let candidates = yolo::extract_pose(view, self.score_threshold);
        Ok(self.suppress_and_finalize(candidates, None))
    }

    fn decode_obb(&self, outputs: &[TensorView]) -> DecoderResult<Vec<Detection>> {
        let view = features_view(&outputs[0])?;
        if view.shape()[0] < 6 {
            return Err(DecoderError::ShapeMismatch(format!(
                "oriented output needs at least 6 feature rows, got {}",
                view.shape()[0]
            )));
        }
        let candidates = yolo::extract_obb(view, self.score_threshold);
        debug!("{} oriented candidates above threshold", candidates.len());

        let oriented: Vec<_> = candidates
            .iter()
            .map(|c| c.oriented().unwrap_or_default())
            .collect();
        let scores: Vec<f32> = candidates.iter().map(|c| c.score).collect();
        let labels: Vec<usize> = candidates.iter().map(|c| c.label).collect();
        let keep =
            crate::nms::nms_rotated_per_class(&oriented, &scores, &labels, self.iou_threshold);
        debug!("rotated suppression kept {}/{}", keep.len(), candidates.len());

        Ok(keep
            .into_iter()
            .take(self.max_detections)
            .enumerate()
            .map(|(index, i)| {
                let c = &candidates[i];
                let Extra::Angle(angle) = c.extra else {
                    unreachable!("oriented candidates always carry an angle");
                };
                Detection {
                    bbox: c.bbox,
                    score: c.score,
                    label: c.label,
                    index,
                    payload: Payload::Angle(angle),
                }
            })
            .collect())
    }

    fn decode_classify(&self, outputs: &[TensorView]) -> DecoderResult<Vec<Detection>> {
        let squeezed = outputs[0].squeeze_leading();
        let probs = squeezed.view1()?;
        let mut scored: Vec<ClassScore> = Vec::with_capacity(self.max_detections);
        yolo::decode_classify(probs, self.score_threshold, &mut scored);
        Ok(scored
            .into_iter()
            .enumerate()
            .map(|(index, c)| Detection {
                bbox: BoundingBox::default(),
                score: c.score,
                label: c.label,
                index,
                payload: Payload::None,
            })
            .collect())
    }

    /// Shared tail for the axis-aligned tasks: per-class suppression,
    /// truncation to `max_detections` (after suppression, so truncation can
    /// never hide a box from the overlap resolution), mask assembly for
    /// segmentation survivors, and stable index assignment.
    fn suppress_and_finalize(
        &self,
        candidates: Vec<Candidate>,
        protos: Option<ArrayView3<f32>>,
    ) -> Vec<Detection> {
        debug!("{} candidates above threshold", candidates.len());
        let keep = yolo::nms_candidates(&candidates, self.iou_threshold);
        debug!("suppression kept {}/{}", keep.len(), candidates.len());
        let keep: Vec<usize> = keep.into_iter().take(self.max_detections).collect();

        let masks = protos.map(|protos| {
            let survivors: Vec<(BoundingBox, Vec<f32>)> = keep
                .iter()
                .map(|&i| {
                    let coeffs = match &candidates[i].extra {
                        Extra::Coeffs(coeffs) => coeffs.clone(),
                        _ => Vec::new(),
                    };
                    (candidates[i].bbox, coeffs)
                })
                .collect();
            masks::assemble_masks(
                &survivors,
                protos,
                (self.input_size[0], self.input_size[1]),
            )
        });

        keep.iter()
            .enumerate()
            .map(|(index, &i)| {
                let c = &candidates[i];
                let payload = match (&c.extra, &masks) {
                    (Extra::Coeffs(_), Some(masks)) => Payload::Mask(masks[index].clone()),
                    (Extra::Keypoints(keypoints), _) => Payload::Keypoints(keypoints.clone()),
                    _ => Payload::None,
                };
                Detection {
                    bbox: c.bbox,
                    score: c.score,
                    label: c.label,
                    index,
                    payload,
                }
            })
            .collect()
    }

    /// Resolves the prototype stack for a segmentation call, honoring the
    /// strictness policy when it is missing or ill-shaped.
    fn prototype_view<'a>(
        &self,
        outputs: &'a [TensorView<'a>],
    ) -> DecoderResult<Option<ArrayView3<'a, f32>>> {
        let Some(tensor) = outputs.get(1) else {
            return if self.strict_masks {
                Err(DecoderError::MissingPrototypes)
            } else {
                Ok(None)
            };
        };
        let squeezed = tensor.squeeze_leading();
        match squeezed.view3() {
            Ok(protos) => Ok(Some(protos)),
            Err(_) if !self.strict_masks => Ok(None),
            Err(_) => Err(DecoderError::ShapeMismatch(format!(
                "prototype tensor must be (K, H, W), got shape {:?}",
                tensor.shape()
            ))),
        }
    }
}

fn features_view<'a>(tensor: &TensorView<'a>) -> DecoderResult<ArrayView2<'a, f32>> {
    let squeezed = tensor.squeeze_leading();
    squeezed.view2().map_err(|_| {
        DecoderError::ShapeMismatch(format!(
            "expected a [1, features, anchors] output, got shape {:?}",
            tensor.shape()
        ))
    })
}
