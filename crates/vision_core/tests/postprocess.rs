use data_contracts::{BoxXyxy, Prediction};
use vision_core::postprocess::{apply_nms, drop_low_confidence, nms_indices, PostFilter};

fn pred(rows: &[([f32; 4], f32, u32)]) -> Prediction {
    Prediction::new(
        rows.iter().map(|(b, _, _)| BoxXyxy::from_array(*b)).collect(),
        rows.iter().map(|(_, s, _)| *s).collect(),
        rows.iter().map(|(_, _, l)| *l).collect(),
    )
}

#[test]
fn empty_prediction_stays_empty() {
    let empty = Prediction::default();
    assert!(drop_low_confidence(&empty, 0.35).is_empty());
    assert!(apply_nms(&empty, 0.7).is_empty());
    assert!(PostFilter::default().apply(&empty).is_empty());
    assert!(nms_indices(&[], &[], 0.5).is_empty());
}

#[test]
fn confidence_filter_is_strict_and_idempotent() {
    let p = pred(&[
        ([0.0, 0.0, 10.0, 10.0], 0.35, 2),
        ([20.0, 0.0, 30.0, 10.0], 0.36, 3),
        ([40.0, 0.0, 50.0, 10.0], 0.9, 1),
        ([60.0, 0.0, 70.0, 10.0], 0.1, 2),
    ]);
    let once = drop_low_confidence(&p, 0.35);
    assert_eq!(once.scores, vec![0.36, 0.9]);
    assert_eq!(once.labels, vec![3, 1]);
    assert_eq!(drop_low_confidence(&once, 0.35), once);
}

#[test]
fn heavy_overlap_keeps_only_the_higher_score() {
    // IoU = 90 / 110 ~ 0.818
    let boxes = [BoxXyxy::new(0.0, 0.0, 10.0, 10.0), BoxXyxy::new(1.0, 0.0, 11.0, 10.0)];
    assert_eq!(nms_indices(&boxes, &[0.6, 0.9], 0.7), vec![1]);
}

#[test]
fn light_overlap_keeps_both_in_score_order() {
    // IoU = 50 / 150 ~ 0.333
    let boxes = [BoxXyxy::new(0.0, 0.0, 10.0, 10.0), BoxXyxy::new(5.0, 0.0, 15.0, 10.0)];
    assert_eq!(nms_indices(&boxes, &[0.6, 0.9], 0.7), vec![1, 0]);
}

#[test]
fn iou_equal_to_threshold_is_not_suppressed() {
    let boxes = [BoxXyxy::new(0.0, 0.0, 10.0, 10.0), BoxXyxy::new(5.0, 0.0, 15.0, 10.0)];
    let iou = boxes[0].iou(&boxes[1]);
    assert_eq!(nms_indices(&boxes, &[0.9, 0.8], iou), vec![0, 1]);
}

#[test]
fn ties_are_broken_by_input_order() {
    let boxes = [
        BoxXyxy::new(0.0, 0.0, 10.0, 10.0),
        BoxXyxy::new(0.0, 0.0, 10.0, 10.0),
        BoxXyxy::new(50.0, 50.0, 60.0, 60.0),
    ];
    assert_eq!(nms_indices(&boxes, &[0.5, 0.5, 0.5], 0.7), vec![0, 2]);
}

#[test]
fn post_filter_runs_confidence_then_nms() {
    let p = pred(&[
        ([0.0, 0.0, 10.0, 10.0], 0.8, 2),
        ([0.5, 0.0, 10.5, 10.0], 0.95, 3),
        ([30.0, 30.0, 40.0, 40.0], 0.2, 2),
        ([60.0, 60.0, 70.0, 70.0], 0.5, 1),
    ]);
    let out = PostFilter::default().apply(&p);
    assert_eq!(out.scores, vec![0.95, 0.5]);
    assert_eq!(out.labels, vec![3, 1]);
    assert_eq!(PostFilter::default().apply(&out), out);

    let aware = PostFilter::default().class_aware(true).apply(&p);
    assert_eq!(aware.scores, vec![0.95, 0.8, 0.5]);
}
