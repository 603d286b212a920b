//! COCO-style mean average precision for per-image box predictions.
//!
//! Predictions and ground truth are accumulated image by image with
//! [`MeanAveragePrecision::update`]; [`MeanAveragePrecision::compute`] then
//! evaluates every (class, area range, IoU threshold, max detections) cell:
//!
//! - detections are ranked by score (stable), truncated to the largest
//!   max-detections value, and greedily matched to the unmatched ground truth
//!   with the highest IoU at or above the threshold;
//! - ground truth outside the area range is ignored, as is any detection
//!   matched to it and any unmatched detection outside the range;
//! - precision is made monotone and sampled at the recall thresholds
//!   (101 points by default).
//!
//! Cells without ground truth hold `-1` and are left out of every mean, so a
//! metric with nothing to evaluate is reported as `-1`.

use data_contracts::{BoxXyxy, GroundTruth, MaskClass, Prediction, ValidationError};
use log::debug;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::BTreeSet;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum MapError {
    #[error("got {predictions} prediction entries but {targets} ground-truth entries")]
    LengthMismatch { predictions: usize, targets: usize },
    #[error("prediction for image {index} is malformed: {source}")]
    InvalidPrediction {
        index: usize,
        #[source]
        source: ValidationError,
    },
    #[error("ground truth for image {index} is malformed: {source}")]
    InvalidGroundTruth {
        index: usize,
        #[source]
        source: ValidationError,
    },
    #[error("invalid metric configuration: {0}")]
    InvalidConfig(String),
    #[error("io error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("json error at {path}: {source}")]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

/// Box-area bucket, in square pixels. Bounds are inclusive on both ends.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AreaRange {
    All,
    Small,
    Medium,
    Large,
}

impl AreaRange {
    pub const ALL: [AreaRange; 4] = [
        AreaRange::All,
        AreaRange::Small,
        AreaRange::Medium,
        AreaRange::Large,
    ];

    pub fn bounds(self) -> (f64, f64) {
        const SMALL: f64 = 32.0 * 32.0;
        const LARGE: f64 = 96.0 * 96.0;
        const MAX: f64 = 1e10;
        match self {
            AreaRange::All => (0.0, MAX),
            AreaRange::Small => (0.0, SMALL),
            AreaRange::Medium => (SMALL, LARGE),
            AreaRange::Large => (LARGE, MAX),
        }
    }

    pub fn contains(self, area: f64) -> bool {
        let (lo, hi) = self.bounds();
        area >= lo && area <= hi
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MapConfig {
    pub iou_thresholds: Vec<f64>,
    pub recall_thresholds: Vec<f64>,
    /// Ascending; the last value bounds detections per image.
    pub max_detections: Vec<usize>,
}

impl Default for MapConfig {
    fn default() -> Self {
        Self {
            iou_thresholds: (0..10).map(|i| f64::from(50 + 5 * i) / 100.0).collect(),
            recall_thresholds: (0..=100).map(|i| f64::from(i) / 100.0).collect(),
            max_detections: vec![1, 10, 100],
        }
    }
}

impl MapConfig {
    pub fn validate(&self) -> Result<(), MapError> {
        fn ascending_unit(name: &str, values: &[f64]) -> Result<(), MapError> {
            if values.is_empty() {
                return Err(MapError::InvalidConfig(format!("{name} is empty")));
            }
            if values.iter().any(|v| !(0.0..=1.0).contains(v)) {
                return Err(MapError::InvalidConfig(format!(
                    "{name} must lie in [0, 1]"
                )));
            }
            if values.windows(2).any(|w| w[0] >= w[1]) {
                return Err(MapError::InvalidConfig(format!(
                    "{name} must be strictly ascending"
                )));
            }
            Ok(())
        }
        ascending_unit("iou_thresholds", &self.iou_thresholds)?;
        ascending_unit("recall_thresholds", &self.recall_thresholds)?;
        if self.max_detections.is_empty()
            || self.max_detections[0] == 0
            || self.max_detections.windows(2).any(|w| w[0] >= w[1])
        {
            return Err(MapError::InvalidConfig(
                "max_detections must be positive and strictly ascending".into(),
            ));
        }
        Ok(())
    }

    fn iou_index(&self, iou: f64) -> Option<usize> {
        self.iou_thresholds
            .iter()
            .position(|t| (t - iou).abs() < 1e-9)
    }

    fn max_det_index(&self, max_det: usize) -> Option<usize> {
        self.max_detections.iter().position(|&m| m == max_det)
    }
}

/// Aggregated metrics. `-1` marks a value with no ground truth behind it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MapReport {
    pub map: f64,
    pub map_50: f64,
    pub map_75: f64,
    pub map_small: f64,
    pub map_medium: f64,
    pub map_large: f64,
    pub mar_1: f64,
    pub mar_10: f64,
    pub mar_100: f64,
    pub map_per_class: Vec<f64>,
    pub mar_100_per_class: Vec<f64>,
    /// Labels evaluated, ascending; indexes the per-class vectors.
    pub classes: Vec<u32>,
}

impl MapReport {
    pub fn class_map(&self, label: u32) -> Option<f64> {
        let i = self.classes.iter().position(|&c| c == label)?;
        self.map_per_class.get(i).copied()
    }

    pub fn save(&self, path: &Path) -> Result<(), MapError> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(|e| MapError::Io {
                path: parent.to_path_buf(),
                source: e,
            })?;
        }
        let data = serde_json::to_vec_pretty(self).map_err(|e| MapError::Json {
            path: path.to_path_buf(),
            source: e,
        })?;
        fs::write(path, data).map_err(|e| MapError::Io {
            path: path.to_path_buf(),
            source: e,
        })
    }

    pub fn load(path: &Path) -> Result<Self, MapError> {
        let raw = fs::read(path).map_err(|e| MapError::Io {
            path: path.to_path_buf(),
            source: e,
        })?;
        serde_json::from_slice(&raw).map_err(|e| MapError::Json {
            path: path.to_path_buf(),
            source: e,
        })
    }
}

impl fmt::Display for MapReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let rows = [
            ("map", self.map),
            ("map_50", self.map_50),
            ("map_75", self.map_75),
            ("map_small", self.map_small),
            ("map_medium", self.map_medium),
            ("map_large", self.map_large),
            ("mar_1", self.mar_1),
            ("mar_10", self.mar_10),
            ("mar_100", self.mar_100),
        ];
        for (name, value) in rows {
            writeln!(f, "{name:<12}{value:>8.4}")?;
        }
        for ((label, map), mar) in self
            .classes
            .iter()
            .zip(&self.map_per_class)
            .zip(&self.mar_100_per_class)
        {
            let name = MaskClass::from_label(*label)
                .map(|c| c.as_str().to_string())
                .unwrap_or_else(|| format!("label {label}"));
            writeln!(f, "{name:<24}map {map:>7.4}  mar_100 {mar:>7.4}")?;
        }
        Ok(())
    }
}

/// Per (image, class, area range) matching result.
struct ImageEval {
    /// Ranked detection scores, truncated to the largest max-detections value.
    scores: Vec<f64>,
    /// `[threshold][detection]`
    matched: Vec<Vec<bool>>,
    /// `[threshold][detection]`
    ignored: Vec<Vec<bool>>,
    /// Ground truth inside the area range.
    gt_count: usize,
}

fn rank_key(score: f32) -> f64 {
    if score.is_nan() {
        f64::NEG_INFINITY
    } else {
        f64::from(score)
    }
}

fn box_area(b: &BoxXyxy) -> f64 {
    f64::from(b.area())
}

/// Mean of entries other than `-1`; `-1` when there are none.
fn mean_valid(values: impl Iterator<Item = f64>) -> f64 {
    let (sum, n) = values
        .filter(|v| *v > -1.0)
        .fold((0.0, 0usize), |(s, n), v| (s + v, n + 1));
    if n == 0 {
        -1.0
    } else {
        sum / n as f64
    }
}

/// Dense `[T][R][K][A][M]` precision and `[T][K][A][M]` recall tables.
struct Tables {
    t: usize,
    r: usize,
    k: usize,
    a: usize,
    m: usize,
    precision: Vec<f64>,
    recall: Vec<f64>,
}

impl Tables {
    fn new(t: usize, r: usize, k: usize, a: usize, m: usize) -> Self {
        Self {
            t,
            r,
            k,
            a,
            m,
            precision: vec![-1.0; t * r * k * a * m],
            recall: vec![-1.0; t * k * a * m],
        }
    }

    fn p_idx(&self, t: usize, r: usize, k: usize, a: usize, m: usize) -> usize {
        (((t * self.r + r) * self.k + k) * self.a + a) * self.m + m
    }

    fn r_idx(&self, t: usize, k: usize, a: usize, m: usize) -> usize {
        ((t * self.k + k) * self.a + a) * self.m + m
    }

    fn precision_mean(&self, ts: &[usize], ks: &[usize], a: usize, m: usize) -> f64 {
        mean_valid(ts.iter().flat_map(|&t| {
            (0..self.r).flat_map(move |r| {
                ks.iter()
                    .map(move |&k| self.precision[self.p_idx(t, r, k, a, m)])
            })
        }))
    }

    fn recall_mean(&self, ks: &[usize], a: usize, m: usize) -> f64 {
        mean_valid(
            (0..self.t).flat_map(|t| ks.iter().map(move |&k| self.recall[self.r_idx(t, k, a, m)])),
        )
    }
}

pub struct MeanAveragePrecision {
    config: MapConfig,
    predictions: Vec<Prediction>,
    targets: Vec<GroundTruth>,
}

impl Default for MeanAveragePrecision {
    fn default() -> Self {
        Self {
            config: MapConfig::default(),
            predictions: Vec::new(),
            targets: Vec::new(),
        }
    }
}

impl MeanAveragePrecision {
    pub fn new(config: MapConfig) -> Result<Self, MapError> {
        config.validate()?;
        Ok(Self {
            config,
            predictions: Vec::new(),
            targets: Vec::new(),
        })
    }

    pub fn config(&self) -> &MapConfig {
        &self.config
    }

    /// Number of images accumulated so far.
    pub fn len(&self) -> usize {
        self.targets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.targets.is_empty()
    }

    pub fn reset(&mut self) {
        self.predictions.clear();
        self.targets.clear();
    }

    /// Append one (prediction, ground truth) pair per image.
    pub fn update(
        &mut self,
        predictions: &[Prediction],
        targets: &[GroundTruth],
    ) -> Result<(), MapError> {
        if predictions.len() != targets.len() {
            return Err(MapError::LengthMismatch {
                predictions: predictions.len(),
                targets: targets.len(),
            });
        }
        let base = self.len();
        for (i, (pred, gt)) in predictions.iter().zip(targets).enumerate() {
            pred.validate()
                .map_err(|source| MapError::InvalidPrediction {
                    index: base + i,
                    source,
                })?;
            gt.validate().map_err(|source| MapError::InvalidGroundTruth {
                index: base + i,
                source,
            })?;
        }
        self.predictions.extend_from_slice(predictions);
        self.targets.extend_from_slice(targets);
        Ok(())
    }

    /// Every label seen in predictions or ground truth, ascending.
    fn classes(&self) -> Vec<u32> {
        let mut set = BTreeSet::new();
        for gt in &self.targets {
            set.extend(gt.labels.iter().copied());
        }
        for pred in &self.predictions {
            set.extend(pred.labels.iter().copied());
        }
        set.into_iter().collect()
    }

    fn evaluate_image(
        &self,
        pred: &Prediction,
        gt: &GroundTruth,
        class: u32,
        area: AreaRange,
    ) -> Option<ImageEval> {
        // (box, ignored) with in-range ground truth first.
        let mut gts: Vec<(BoxXyxy, bool)> = gt
            .boxes
            .iter()
            .zip(&gt.labels)
            .filter(|(_, &label)| label == class)
            .map(|(b, _)| (*b, !area.contains(box_area(b))))
            .collect();
        let mut dts: Vec<(BoxXyxy, f64)> = pred
            .boxes
            .iter()
            .zip(&pred.scores)
            .zip(&pred.labels)
            .filter(|(_, &label)| label == class)
            .map(|((b, s), _)| (*b, rank_key(*s)))
            .collect();
        if gts.is_empty() && dts.is_empty() {
            return None;
        }
        gts.sort_by_key(|(_, ignored)| *ignored);
        dts.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(Ordering::Equal));
        let max_det = self.config.max_detections.last().copied().unwrap_or(usize::MAX);
        dts.truncate(max_det);

        let ious: Vec<Vec<f64>> = dts
            .iter()
            .map(|(d, _)| gts.iter().map(|(g, _)| f64::from(d.iou(g))).collect())
            .collect();

        let thresholds = &self.config.iou_thresholds;
        let mut matched = vec![vec![false; dts.len()]; thresholds.len()];
        let mut ignored = vec![vec![false; dts.len()]; thresholds.len()];
        for (ti, &threshold) in thresholds.iter().enumerate() {
            let mut gt_taken = vec![false; gts.len()];
            for (di, (dbox, _)) in dts.iter().enumerate() {
                let mut best = threshold.min(1.0 - 1e-10);
                let mut hit: Option<usize> = None;
                for (gi, (_, gt_ignored)) in gts.iter().enumerate() {
                    if gt_taken[gi] {
                        continue;
                    }
                    // Once matched to in-range ground truth, ignored ones cannot win.
                    if let Some(prev) = hit {
                        if !gts[prev].1 && *gt_ignored {
                            break;
                        }
                    }
                    if ious[di][gi] < best {
                        continue;
                    }
                    best = ious[di][gi];
                    hit = Some(gi);
                }
                match hit {
                    Some(gi) => {
                        gt_taken[gi] = true;
                        matched[ti][di] = true;
                        ignored[ti][di] = gts[gi].1;
                    }
                    None => ignored[ti][di] = !area.contains(box_area(dbox)),
                }
            }
        }

        Some(ImageEval {
            scores: dts.iter().map(|(_, s)| *s).collect(),
            matched,
            ignored,
            gt_count: gts.iter().filter(|(_, ignored)| !ignored).count(),
        })
    }

    fn accumulate(&self, tables: &mut Tables, k: usize, a: usize, evals: &[ImageEval]) {
        let gt_count: usize = evals.iter().map(|e| e.gt_count).sum();
        if gt_count == 0 {
            return;
        }
        let cfg = &self.config;
        for (mi, &max_det) in cfg.max_detections.iter().enumerate() {
            // (score, eval, detection) in image order, then ranked stably.
            let mut ranked: Vec<(f64, usize, usize)> = evals
                .iter()
                .enumerate()
                .flat_map(|(ei, e)| {
                    e.scores
                        .iter()
                        .take(max_det)
                        .enumerate()
                        .map(move |(di, s)| (*s, ei, di))
                })
                .collect();
            ranked.sort_by(|x, y| y.0.partial_cmp(&x.0).unwrap_or(Ordering::Equal));

            for ti in 0..cfg.iou_thresholds.len() {
                let mut tp = 0usize;
                let mut fp = 0usize;
                let mut recall = Vec::with_capacity(ranked.len());
                let mut precision = Vec::with_capacity(ranked.len());
                for &(_, ei, di) in &ranked {
                    let e = &evals[ei];
                    if !e.ignored[ti][di] {
                        if e.matched[ti][di] {
                            tp += 1;
                        } else {
                            fp += 1;
                        }
                    }
                    recall.push(tp as f64 / gt_count as f64);
                    // Leading ignored detections have no precision yet.
                    precision.push(if tp + fp == 0 {
                        0.0
                    } else {
                        tp as f64 / (tp + fp) as f64
                    });
                }
                let r_idx = tables.r_idx(ti, k, a, mi);
                tables.recall[r_idx] = recall.last().copied().unwrap_or(0.0);

                for i in (1..precision.len()).rev() {
                    if precision[i] > precision[i - 1] {
                        precision[i - 1] = precision[i];
                    }
                }
                for (ri, &r) in cfg.recall_thresholds.iter().enumerate() {
                    let pos = recall.partition_point(|&x| x < r);
                    let q = precision.get(pos).copied().unwrap_or(0.0);
                    let p_idx = tables.p_idx(ti, ri, k, a, mi);
                    tables.precision[p_idx] = q;
                }
            }
        }
    }

    pub fn compute(&self) -> MapReport {
        let cfg = &self.config;
        let classes = self.classes();
        let mut tables = Tables::new(
            cfg.iou_thresholds.len(),
            cfg.recall_thresholds.len(),
            classes.len(),
            AreaRange::ALL.len(),
            cfg.max_detections.len(),
        );

        for (k, &class) in classes.iter().enumerate() {
            for (a, &area) in AreaRange::ALL.iter().enumerate() {
                let evals: Vec<ImageEval> = self
                    .predictions
                    .iter()
                    .zip(&self.targets)
                    .filter_map(|(pred, gt)| self.evaluate_image(pred, gt, class, area))
                    .collect();
                self.accumulate(&mut tables, k, a, &evals);
            }
        }

        let all_t: Vec<usize> = (0..cfg.iou_thresholds.len()).collect();
        let all_k: Vec<usize> = (0..classes.len()).collect();
        let last_m = cfg.max_detections.len() - 1;
        let area_all = 0;
        let area_idx = |range: AreaRange| AreaRange::ALL.iter().position(|&r| r == range).unwrap_or(0);

        let map_at = |iou: f64| match cfg.iou_index(iou) {
            Some(t) => tables.precision_mean(&[t], &all_k, area_all, last_m),
            None => -1.0,
        };
        let mar_at = |max_det: usize| match cfg.max_det_index(max_det) {
            Some(m) => tables.recall_mean(&all_k, area_all, m),
            None => -1.0,
        };

        let report = MapReport {
            map: tables.precision_mean(&all_t, &all_k, area_all, last_m),
            map_50: map_at(0.5),
            map_75: map_at(0.75),
            map_small: tables.precision_mean(&all_t, &all_k, area_idx(AreaRange::Small), last_m),
            map_medium: tables.precision_mean(&all_t, &all_k, area_idx(AreaRange::Medium), last_m),
            map_large: tables.precision_mean(&all_t, &all_k, area_idx(AreaRange::Large), last_m),
            mar_1: mar_at(1),
            mar_10: mar_at(10),
            mar_100: mar_at(100),
            map_per_class: (0..classes.len())
                .map(|k| tables.precision_mean(&all_t, &[k], area_all, last_m))
                .collect(),
            mar_100_per_class: (0..classes.len())
                .map(|k| tables.recall_mean(&[k], area_all, last_m))
                .collect(),
            classes,
        };
        debug!(
            "mAP over {} images and {} classes: {:.4}",
            self.len(),
            report.classes.len(),
            report.map
        );
        report
    }
}
