use serde::{Deserialize, Serialize};

use crate::annotation::{BoxXyxy, Detection, ValidationError};

/// Raw or filtered detector output for one image, stored column-wise.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Prediction {
    pub boxes: Vec<BoxXyxy>,
    pub scores: Vec<f32>,
    pub labels: Vec<u32>,
}

impl Prediction {
    pub fn new(boxes: Vec<BoxXyxy>, scores: Vec<f32>, labels: Vec<u32>) -> Self {
        Self {
            boxes,
            scores,
            labels,
        }
    }

    pub fn len(&self) -> usize {
        self.boxes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.boxes.is_empty()
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.boxes.len() != self.scores.len() || self.boxes.len() != self.labels.len() {
            return Err(ValidationError::LengthMismatch {
                boxes: self.boxes.len(),
                scores: self.scores.len(),
                labels: self.labels.len(),
            });
        }
        Ok(())
    }

    /// Rows at `indices`, in the order given.
    pub fn select(&self, indices: &[usize]) -> Prediction {
        Prediction {
            boxes: indices.iter().map(|&i| self.boxes[i]).collect(),
            scores: indices.iter().map(|&i| self.scores[i]).collect(),
            labels: indices.iter().map(|&i| self.labels[i]).collect(),
        }
    }
}

/// Predictions tagged with the image they belong to (the on-disk exchange format).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImagePrediction {
    pub image_id: String,
    #[serde(flatten)]
    pub prediction: Prediction,
}

/// Ground-truth boxes and labels for one image.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GroundTruth {
    pub boxes: Vec<BoxXyxy>,
    pub labels: Vec<u32>,
}

impl GroundTruth {
    pub fn from_detections(detections: &[Detection]) -> Self {
        Self {
            boxes: detections.iter().map(|d| d.bbox).collect(),
            labels: detections.iter().map(|d| d.class.label()).collect(),
        }
    }

    pub fn len(&self) -> usize {
        self.boxes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.boxes.is_empty()
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.boxes.len() != self.labels.len() {
            return Err(ValidationError::GroundTruthLengthMismatch {
                boxes: self.boxes.len(),
                labels: self.labels.len(),
            });
        }
        Ok(())
    }
}
