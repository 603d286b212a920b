//! Dataset loading, splitting, and sampling utilities for face-mask detection.
//!
//! This crate provides utilities for:
//! - Parsing Pascal-VOC annotation directories into clipped detections
//! - Grouping detections into per-image records with class-imbalance weights
//! - Deterministic stratified train/validation/test splits
//! - Weighted random sampling of minibatches
//! - Split manifests and YOLO dataset export

pub mod annotations;
pub mod manifest;
pub mod records;
pub mod sampler;
pub mod splits;
pub mod types;
pub mod validation;
pub mod voc;
pub mod yolo;

pub use annotations::{
    clip_box, index_annotation_dir, load_annotation_dir, LoadedAnnotations, LoaderConfig,
    DEFAULT_MIN_AREA,
};
pub use manifest::{SplitEntry, SplitManifest};
pub use records::{build_records, group_records, ClassWeights, ImageRecord};
pub use sampler::WeightedSampler;
pub use splits::{split_stratified, stratified_partition, DatasetSplit, SplitConfig, SplitKind};
pub use types::*;
pub use validation::{validate_annotation_dir, validate_load_summary};
pub use voc::{parse_voc_file, parse_voc_str, VocAnnotation, VocObject};
pub use yolo::{export_split, write_data_yaml, YoloExportSummary};
