//! Core types, error definitions, and summaries for mask_dataset.

use data_contracts::MaskClass;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;
use thiserror::Error;

pub type DatasetResult<T> = Result<T, DatasetError>;

#[derive(Debug, Error)]
pub enum DatasetError {
    #[error("io error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("json parse error at {path}: {source}")]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("xml parse error at {path}: {msg}")]
    Xml { path: PathBuf, msg: String },
    #[error("annotation validation failed at {path}: {msg}")]
    Validation { path: PathBuf, msg: String },
    #[error("image file missing for {image_id}: {image}")]
    MissingImageFile { image_id: String, image: PathBuf },
    #[error("image {0} appears in more than one record")]
    DuplicateImage(String),
    #[error(
        "stratum {stratum} has {members} image(s); at least {required} are needed to populate train, validation, and test"
    )]
    StratumTooSmall {
        stratum: StratumKey,
        members: usize,
        required: usize,
    },
    #[error("invalid split configuration: {0}")]
    InvalidSplit(String),
    #[error("cannot build sampler: {0}")]
    Sampler(String),
    #[error("{0}")]
    Other(String),
}

/// Coarse weight bucket used for stratification: the image weight truncated to
/// one decimal digit, stored in tenths (`0.73 -> 7`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct StratumKey(pub u32);

impl StratumKey {
    pub fn from_weight(weight: f64) -> Self {
        if !weight.is_finite() || weight <= 0.0 {
            return StratumKey(0);
        }
        StratumKey((weight * 10.0).floor() as u32)
    }
}

impl std::fmt::Display for StratumKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}.{}", self.0 / 10, self.0 % 10)
    }
}

/// Counters gathered while reading an annotation directory.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoadSummary {
    pub files: usize,
    pub invalid_files: usize,
    pub objects: usize,
    pub kept: usize,
    pub clipped: usize,
    pub dropped_small: usize,
    pub dropped_degenerate: usize,
}

impl LoadSummary {
    pub fn dropped(&self) -> usize {
        self.dropped_small + self.dropped_degenerate
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct ClassCount {
    pub count: usize,
    /// Share of all detections in the summarized set.
    pub proportion: f64,
}

/// Image/object counts and class balance of a set of records.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DatasetSummary {
    pub images: usize,
    pub objects: usize,
    pub per_class: BTreeMap<MaskClass, ClassCount>,
}

impl DatasetSummary {
    pub fn class_count(&self, class: MaskClass) -> usize {
        self.per_class.get(&class).map(|c| c.count).unwrap_or(0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ValidationOutcome {
    Pass,
    Warn,
    Fail,
}

impl ValidationOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            ValidationOutcome::Pass => "pass",
            ValidationOutcome::Warn => "warn",
            ValidationOutcome::Fail => "fail",
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ValidationThresholds {
    pub max_invalid_files: Option<usize>,
    pub max_dropped: Option<usize>,
    pub max_clipped: Option<usize>,
    pub max_invalid_ratio: Option<f32>,
    pub max_dropped_ratio: Option<f32>,
    pub max_clipped_ratio: Option<f32>,
}

impl ValidationThresholds {
    pub fn from_env() -> Self {
        fn parse_usize(key: &str) -> Option<usize> {
            std::env::var(key).ok()?.parse().ok()
        }
        fn parse_ratio(key: &str) -> Option<f32> {
            std::env::var(key).ok()?.parse().ok()
        }
        ValidationThresholds {
            max_invalid_files: parse_usize("MASK_DATASET_MAX_INVALID"),
            max_dropped: parse_usize("MASK_DATASET_MAX_DROPPED"),
            max_clipped: parse_usize("MASK_DATASET_MAX_CLIPPED"),
            max_invalid_ratio: parse_ratio("MASK_DATASET_MAX_INVALID_RATIO"),
            max_dropped_ratio: parse_ratio("MASK_DATASET_MAX_DROPPED_RATIO"),
            max_clipped_ratio: parse_ratio("MASK_DATASET_MAX_CLIPPED_RATIO"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidationReport {
    pub outcome: ValidationOutcome,
    pub reasons: Vec<String>,
    pub summary: LoadSummary,
}
