//! Shared data contracts for face-mask annotations, predictions, and ground truth.

pub mod annotation;
pub mod prediction;

pub use annotation::{BoxXyxy, Detection, MaskClass, ValidationError};
pub use prediction::{GroundTruth, ImagePrediction, Prediction};
