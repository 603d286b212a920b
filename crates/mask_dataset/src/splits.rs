//! Deterministic stratified train/validation/test splitting of image records.

use log::info;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};

use crate::records::ImageRecord;
use crate::types::{DatasetError, DatasetResult, DatasetSummary, StratumKey};

/// Each stratum must contribute at least one image to every split.
pub const MIN_STRATUM_MEMBERS: usize = 3;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SplitConfig {
    /// Share of images assigned to training (first partition).
    pub train_fraction: f64,
    /// Share of the remaining images assigned to validation (second partition).
    pub validation_fraction_of_rest: f64,
    pub seed: u64,
}

impl Default for SplitConfig {
    fn default() -> Self {
        Self {
            train_fraction: 0.8,
            validation_fraction_of_rest: 0.5,
            seed: 42,
        }
    }
}

impl SplitConfig {
    pub fn validate(&self) -> DatasetResult<()> {
        for (name, value) in [
            ("train_fraction", self.train_fraction),
            ("validation_fraction_of_rest", self.validation_fraction_of_rest),
        ] {
            if !(value > 0.0 && value < 1.0) {
                return Err(DatasetError::InvalidSplit(format!(
                    "{name} must be inside (0, 1), got {value}"
                )));
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SplitKind {
    Train,
    Validation,
    Test,
}

impl SplitKind {
    pub const ALL: [SplitKind; 3] = [SplitKind::Train, SplitKind::Validation, SplitKind::Test];

    /// Directory name used by YOLO-style dataset trees.
    pub fn dir_name(self) -> &'static str {
        match self {
            SplitKind::Train => "train",
            SplitKind::Validation => "valid",
            SplitKind::Test => "test",
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DatasetSplit {
    pub train: Vec<ImageRecord>,
    pub validation: Vec<ImageRecord>,
    pub test: Vec<ImageRecord>,
}

impl DatasetSplit {
    pub fn get(&self, kind: SplitKind) -> &[ImageRecord] {
        match kind {
            SplitKind::Train => &self.train,
            SplitKind::Validation => &self.validation,
            SplitKind::Test => &self.test,
        }
    }

    pub fn image_ids(&self, kind: SplitKind) -> Vec<&str> {
        self.get(kind).iter().map(|r| r.image_id.as_str()).collect()
    }

    pub fn len(&self) -> usize {
        self.train.len() + self.validation.len() + self.test.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn summary(&self, kind: SplitKind) -> DatasetSummary {
        DatasetSummary::from_records(self.get(kind))
    }
}

/// Count the records in each stratum.
pub fn stratum_sizes(records: &[ImageRecord]) -> BTreeMap<StratumKey, usize> {
    let mut sizes = BTreeMap::new();
    for record in records {
        *sizes.entry(record.stratum).or_insert(0usize) += 1;
    }
    sizes
}

/// Number of members sent to the first side of a partition, or `None` if the
/// stratum cannot honor both minimums.
fn first_side_count(n: usize, fraction: f64, min_first: usize, min_second: usize) -> Option<usize> {
    if n < min_first + min_second {
        return None;
    }
    let wanted = (n as f64 * fraction).round() as usize;
    Some(wanted.clamp(min_first, n - min_second))
}

/// Split `records` in two, stratum by stratum. Within a stratum the members are
/// ordered by image id, shuffled with a seeded RNG, and the first
/// `round(n * first_fraction)` go to the first side.
pub fn stratified_partition(
    records: Vec<ImageRecord>,
    first_fraction: f64,
    seed: u64,
    min_first: usize,
    min_second: usize,
) -> DatasetResult<(Vec<ImageRecord>, Vec<ImageRecord>)> {
    let mut strata: BTreeMap<StratumKey, Vec<ImageRecord>> = BTreeMap::new();
    for record in records {
        strata.entry(record.stratum).or_default().push(record);
    }

    let mut rng = StdRng::seed_from_u64(seed);
    let mut first = Vec::new();
    let mut second = Vec::new();
    for (stratum, mut members) in strata {
        let n = members.len();
        let take = first_side_count(n, first_fraction, min_first, min_second).ok_or(
            DatasetError::StratumTooSmall {
                stratum,
                members: n,
                required: min_first + min_second,
            },
        )?;
        members.sort_by(|a, b| a.image_id.cmp(&b.image_id));
        members.shuffle(&mut rng);
        let rest = members.split_off(take);
        first.extend(members);
        second.extend(rest);
    }
    Ok((first, second))
}

/// Split records into train/validation/test with two stratified partitions:
/// train vs. rest, then validation vs. test.
pub fn split_stratified(records: Vec<ImageRecord>, cfg: &SplitConfig) -> DatasetResult<DatasetSplit> {
    cfg.validate()?;
    if records.is_empty() {
        return Err(DatasetError::InvalidSplit("no image records to split".into()));
    }
    let mut seen = HashSet::with_capacity(records.len());
    for record in &records {
        if !seen.insert(record.image_id.as_str()) {
            return Err(DatasetError::DuplicateImage(record.image_id.clone()));
        }
    }
    drop(seen);

    // Check up front so the error names the original stratum size.
    for (stratum, members) in stratum_sizes(&records) {
        if members < MIN_STRATUM_MEMBERS {
            return Err(DatasetError::StratumTooSmall {
                stratum,
                members,
                required: MIN_STRATUM_MEMBERS,
            });
        }
    }

    let (mut train, rest) = stratified_partition(records, cfg.train_fraction, cfg.seed, 1, 2)?;
    let (mut validation, mut test) =
        stratified_partition(rest, cfg.validation_fraction_of_rest, cfg.seed, 1, 1)?;

    for split in [&mut train, &mut validation, &mut test] {
        split.sort_by(|a, b| a.image_id.cmp(&b.image_id));
    }
    info!(
        "split {} images into train={} validation={} test={} (seed {})",
        train.len() + validation.len() + test.len(),
        train.len(),
        validation.len(),
        test.len(),
        cfg.seed
    );
    Ok(DatasetSplit {
        train,
        validation,
        test,
    })
}
