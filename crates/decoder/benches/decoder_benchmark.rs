use divan::black_box_drop;
use ndarray::{Array1, Array2, Array3};
use sightline_decoder::{
    geometry::{OrientedBox, rotated_iou},
    masks::assemble_mask,
    nms::{nms, nms_rotated},
    yolo::{decode_detect, decode_segment, extract_detect},
    BoundingBox, DetectBox,
};

fn main() {
    divan::main();
}

/// Deterministic value noise, no RNG dependency needed.
fn wave(i: usize, scale: f32) -> f32 {
    ((i as f32 * 0.721).sin() * 0.5 + 0.5) * scale
}

/// A synthetic `[4 + classes, anchors]` detection output with a sprinkling
/// of confident anchors.
fn detect_output(classes: usize, anchors: usize) -> Array2<f32> {
    let mut out = Array2::zeros((4 + classes, anchors));
    for a in 0..anchors {
        out[[0, a]] = wave(a, 640.0);
        out[[1, a]] = wave(a + 17, 640.0);
        out[[2, a]] = 16.0 + wave(a + 29, 64.0);
        out[[3, a]] = 16.0 + wave(a + 31, 64.0);
        for c in 0..classes {
            out[[4 + c, a]] = wave(a * classes + c, 0.3);
        }
        // every 50th anchor is a confident detection
        if a % 50 == 0 {
            out[[4 + a % classes, a]] = 0.6 + wave(a, 0.39);
        }
    }
    out
}

fn boxes_and_scores(count: usize) -> (Vec<BoundingBox>, Vec<f32>) {
    let boxes = (0..count)
        .map(|i| {
            let x = wave(i, 600.0);
            let y = wave(i + 7, 600.0);
            BoundingBox {
                xmin: x,
                ymin: y,
                xmax: x + 40.0,
                ymax: y + 40.0,
            }
        })
        .collect();
    let scores = (0..count).map(|i| wave(i + 3, 1.0)).collect();
    (boxes, scores)
}

#[divan::bench]
fn bench_extract_detect(bencher: divan::Bencher) {
    let out = detect_output(80, 8400);
    bencher.bench_local(|| black_box_drop(extract_detect(out.view(), 0.25)));
}

#[divan::bench]
fn bench_decode_detect(bencher: divan::Bencher) {
    let out = detect_output(80, 8400);
    bencher.bench_local(|| {
        let mut output_boxes: Vec<DetectBox> = Vec::with_capacity(50);
        decode_detect(out.view(), 0.25, 0.45, &mut output_boxes);
        black_box_drop(output_boxes);
    });
}

#[divan::bench]
fn bench_nms_500(bencher: divan::Bencher) {
    let (boxes, scores) = boxes_and_scores(500);
    bencher.bench_local(|| black_box_drop(nms(&boxes, &scores, 0.45)));
}

#[divan::bench]
fn bench_rotated_iou(bencher: divan::Bencher) {
    let a = OrientedBox::new(320.0, 320.0, 80.0, 40.0, 0.4);
    let b = OrientedBox::new(330.0, 310.0, 70.0, 50.0, -0.9);
    bencher.bench_local(|| black_box_drop(rotated_iou(&a, &b)));
}

#[divan::bench]
fn bench_nms_rotated_200(bencher: divan::Bencher) {
    let boxes: Vec<OrientedBox> = (0..200)
        .map(|i| {
            OrientedBox::new(
                wave(i, 600.0),
                wave(i + 5, 600.0),
                30.0 + wave(i + 11, 50.0),
                20.0 + wave(i + 13, 30.0),
                wave(i + 23, 3.1) - 1.55,
            )
        })
        .collect();
    let scores: Vec<f32> = (0..200).map(|i| wave(i + 3, 1.0)).collect();
    bencher.bench_local(|| black_box_drop(nms_rotated(&boxes, &scores, 0.45)));
}

#[divan::bench]
fn bench_assemble_mask(bencher: divan::Bencher) {
    let protos = Array3::from_shape_fn((32, 160, 160), |(k, y, x)| wave(k * 9 + y * 3 + x, 2.0) - 1.0);
    let coeffs: Vec<f32> = (0..32).map(|i| wave(i, 2.0) - 1.0).collect();
    let bbox = BoundingBox {
        xmin: 120.0,
        ymin: 180.0,
        xmax: 360.0,
        ymax: 500.0,
    };
    bencher.bench_local(|| black_box_drop(assemble_mask(&coeffs, protos.view(), &bbox, (640, 640))));
}

#[divan::bench]
fn bench_decode_segment(bencher: divan::Bencher) {
    // 4 box + 80 classes + 32 coefficients
    let mut out = detect_output(112, 8400);
    // coefficient rows want signed values
    for a in 0..8400 {
        for k in 0..32 {
            out[[84 + k, a]] = wave(a + k, 2.0) - 1.0;
        }
    }
    let protos = Array3::from_shape_fn((32, 160, 160), |(k, y, x)| wave(k * 9 + y * 3 + x, 2.0) - 1.0);
    bencher.bench_local(|| {
        let mut output_boxes = Vec::with_capacity(50);
        let mut output_masks = Vec::with_capacity(50);
        decode_segment(
            out.view(),
            protos.view(),
            (640, 640),
            0.25,
            0.45,
            &mut output_boxes,
            &mut output_masks,
        );
        black_box_drop((output_boxes, output_masks));
    });
}

#[divan::bench]
fn bench_classify_argmax(bencher: divan::Bencher) {
    let probs: Array1<f32> = Array1::from_shape_fn(1000, |i| wave(i, 1.0));
    bencher.bench_local(|| black_box_drop(sightline_decoder::yolo::top_class(probs.view())));
}
