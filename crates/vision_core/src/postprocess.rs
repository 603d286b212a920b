//! Confidence filtering and greedy non-maximum suppression of detector output.

use data_contracts::{BoxXyxy, Prediction};
use log::debug;
use std::cmp::Ordering;
use std::collections::BTreeMap;

pub const DEFAULT_CONFIDENCE_THRESHOLD: f32 = 0.35;
pub const DEFAULT_IOU_THRESHOLD: f32 = 0.7;

/// NaN ranks below every real score.
fn rank_key(score: f32) -> f32 {
    if score.is_nan() {
        f32::NEG_INFINITY
    } else {
        score
    }
}

/// Indices of `scores` ordered by descending score; equal scores keep index order.
fn order_by_score(indices: &mut [usize], scores: &[f32]) {
    indices.sort_by(|&a, &b| {
        rank_key(scores[b])
            .partial_cmp(&rank_key(scores[a]))
            .unwrap_or(Ordering::Equal)
    });
}

/// Keep rows whose score is strictly above `threshold`, in their original order.
pub fn drop_low_confidence(prediction: &Prediction, threshold: f32) -> Prediction {
    let keep: Vec<usize> = prediction
        .scores
        .iter()
        .enumerate()
        .take(prediction.len().min(prediction.labels.len()))
        .filter(|(_, s)| **s > threshold)
        .map(|(i, _)| i)
        .collect();
    prediction.select(&keep)
}

/// Greedy NMS. Returns kept indices, best score first.
///
/// A box is discarded when its IoU with an already kept box is strictly
/// greater than `iou_threshold`.
pub fn nms_indices(boxes: &[BoxXyxy], scores: &[f32], iou_threshold: f32) -> Vec<usize> {
    let n = boxes.len().min(scores.len());
    let mut order: Vec<usize> = (0..n).collect();
    order_by_score(&mut order, scores);

    let mut keep = Vec::new();
    let mut suppressed = vec![false; n];
    for (pos, &i) in order.iter().enumerate() {
        if suppressed[i] {
            continue;
        }
        keep.push(i);
        for &j in &order[pos + 1..] {
            if !suppressed[j] && boxes[i].iou(&boxes[j]) > iou_threshold {
                suppressed[j] = true;
            }
        }
    }
    keep
}

/// NMS run separately for each label; kept indices merged best score first.
pub fn nms_indices_per_label(
    boxes: &[BoxXyxy],
    scores: &[f32],
    labels: &[u32],
    iou_threshold: f32,
) -> Vec<usize> {
    let n = boxes.len().min(scores.len()).min(labels.len());
    let mut groups: BTreeMap<u32, Vec<usize>> = BTreeMap::new();
    for i in 0..n {
        groups.entry(labels[i]).or_default().push(i);
    }
    let mut keep = Vec::new();
    for members in groups.values() {
        let group_boxes: Vec<BoxXyxy> = members.iter().map(|&i| boxes[i]).collect();
        let group_scores: Vec<f32> = members.iter().map(|&i| scores[i]).collect();
        keep.extend(
            nms_indices(&group_boxes, &group_scores, iou_threshold)
                .into_iter()
                .map(|k| members[k]),
        );
    }
    keep.sort_unstable();
    order_by_score(&mut keep, scores);
    keep
}

/// Class-agnostic NMS over a whole prediction. Rows come back best score first.
pub fn apply_nms(prediction: &Prediction, iou_threshold: f32) -> Prediction {
    let n = prediction.len().min(prediction.labels.len());
    let keep = nms_indices(&prediction.boxes[..n], &prediction.scores, iou_threshold);
    prediction.select(&keep)
}

/// Confidence filter followed by NMS.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PostFilter {
    pub confidence: f32,
    pub iou: f32,
    /// Suppress only among boxes sharing a label.
    pub class_aware: bool,
}

impl Default for PostFilter {
    fn default() -> Self {
        Self {
            confidence: DEFAULT_CONFIDENCE_THRESHOLD,
            iou: DEFAULT_IOU_THRESHOLD,
            class_aware: false,
        }
    }
}

impl PostFilter {
    pub fn new(confidence: f32, iou: f32) -> Self {
        Self {
            confidence,
            iou,
            class_aware: false,
        }
    }

    pub fn class_aware(mut self, enabled: bool) -> Self {
        self.class_aware = enabled;
        self
    }

    pub fn apply(&self, prediction: &Prediction) -> Prediction {
        let confident = drop_low_confidence(prediction, self.confidence);
        let filtered = if self.class_aware {
            let keep = nms_indices_per_label(
                &confident.boxes,
                &confident.scores,
                &confident.labels,
                self.iou,
            );
            confident.select(&keep)
        } else {
            apply_nms(&confident, self.iou)
        };
        debug!(
            "post-filter: {} raw -> {} confident -> {} kept",
            prediction.len(),
            confident.len(),
            filtered.len()
        );
        filtered
    }
}
