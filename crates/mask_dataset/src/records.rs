//! Per-image records, class-imbalance weights, and dataset summaries.

use data_contracts::{Detection, GroundTruth, MaskClass};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::types::{ClassCount, DatasetSummary, StratumKey};

/// Inverse-frequency weight per class: `1 - count(class) / total`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ClassWeights {
    pub total: usize,
    pub counts: BTreeMap<MaskClass, usize>,
}

impl ClassWeights {
    pub fn from_detections(detections: &[Detection]) -> Self {
        let mut counts = BTreeMap::new();
        for det in detections {
            *counts.entry(det.class).or_insert(0usize) += 1;
        }
        Self {
            total: detections.len(),
            counts,
        }
    }

    /// Weight of `class`; a class never seen gets the maximum weight of 1.
    pub fn weight(&self, class: MaskClass) -> f64 {
        if self.total == 0 {
            return 1.0;
        }
        let count = self.counts.get(&class).copied().unwrap_or(0);
        1.0 - count as f64 / self.total as f64
    }
}

/// All detections of one image plus its sampling weight.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImageRecord {
    pub image_id: String,
    pub width: u32,
    pub height: u32,
    pub detections: Vec<Detection>,
    /// Mean class weight of the detections.
    pub weight: f64,
    pub stratum: StratumKey,
}

impl ImageRecord {
    pub fn ground_truth(&self) -> GroundTruth {
        GroundTruth::from_detections(&self.detections)
    }
}

/// Group detections by image id (sorted by id) and attach weights.
///
/// Images without detections cannot be represented and simply do not appear.
pub fn group_records(detections: Vec<Detection>, weights: &ClassWeights) -> Vec<ImageRecord> {
    let mut by_image: BTreeMap<String, Vec<Detection>> = BTreeMap::new();
    for det in detections {
        by_image.entry(det.image_id.clone()).or_default().push(det);
    }
    by_image
        .into_iter()
        .filter_map(|(image_id, detections)| {
            let first = detections.first()?;
            let (width, height) = (first.image_width, first.image_height);
            let weight = detections
                .iter()
                .map(|d| weights.weight(d.class))
                .sum::<f64>()
                / detections.len() as f64;
            Some(ImageRecord {
                image_id,
                width,
                height,
                detections,
                weight,
                stratum: StratumKey::from_weight(weight),
            })
        })
        .collect()
}

/// Compute class weights over `detections` and group them into records.
pub fn build_records(detections: Vec<Detection>) -> (ClassWeights, Vec<ImageRecord>) {
    let weights = ClassWeights::from_detections(&detections);
    let records = group_records(detections, &weights);
    (weights, records)
}

impl DatasetSummary {
    pub fn from_records(records: &[ImageRecord]) -> Self {
        let mut counts: BTreeMap<MaskClass, usize> = BTreeMap::new();
        let mut objects = 0usize;
        for det in records.iter().flat_map(|r| r.detections.iter()) {
            *counts.entry(det.class).or_insert(0) += 1;
            objects += 1;
        }
        let per_class = counts
            .into_iter()
            .map(|(class, count)| {
                let proportion = if objects == 0 {
                    0.0
                } else {
                    count as f64 / objects as f64
                };
                (class, ClassCount { count, proportion })
            })
            .collect();
        DatasetSummary {
            images: records.len(),
            objects,
            per_class,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use data_contracts::BoxXyxy;

    fn det(image: &str, class: MaskClass) -> Detection {
        Detection {
            image_id: image.into(),
            image_width: 64,
            image_height: 64,
            bbox: BoxXyxy::new(1.0, 1.0, 20.0, 20.0),
            class,
        }
    }

    #[test]
    fn weights_are_inverse_frequency() {
        let dets = vec![
            det("a.png", MaskClass::WithMask),
            det("a.png", MaskClass::WithMask),
            det("b.png", MaskClass::WithMask),
            det("b.png", MaskClass::WithoutMask),
        ];
        let weights = ClassWeights::from_detections(&dets);
        assert!((weights.weight(MaskClass::WithMask) - 0.25).abs() < 1e-12);
        assert!((weights.weight(MaskClass::WithoutMask) - 0.75).abs() < 1e-12);
        assert!((weights.weight(MaskClass::MaskWornIncorrectly) - 1.0).abs() < 1e-12);
    }

    #[test]
    fn record_weight_is_mean_of_detection_weights() {
        let dets = vec![
            det("b.png", MaskClass::WithMask),
            det("a.png", MaskClass::WithMask),
            det("a.png", MaskClass::WithMask),
            det("b.png", MaskClass::WithoutMask),
        ];
        let (_, records) = build_records(dets);
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].image_id, "a.png");
        assert!((records[0].weight - 0.25).abs() < 1e-12);
        assert_eq!(records[0].stratum, StratumKey(2));
        assert!((records[1].weight - 0.5).abs() < 1e-12);
        assert_eq!(records[1].stratum, StratumKey(5));
        assert!(records.iter().all(|r| !r.detections.is_empty()));
    }

    #[test]
    fn summary_reports_class_proportions() {
        let (_, records) = build_records(vec![
            det("a.png", MaskClass::WithMask),
            det("a.png", MaskClass::WithoutMask),
            det("b.png", MaskClass::WithMask),
            det("c.png", MaskClass::WithMask),
        ]);
        let summary = DatasetSummary::from_records(&records);
        assert_eq!(summary.images, 3);
        assert_eq!(summary.objects, 4);
        assert_eq!(summary.class_count(MaskClass::WithMask), 3);
        let share = summary.per_class[&MaskClass::WithoutMask].proportion;
        assert!((share - 0.25).abs() < 1e-12);
    }
}
