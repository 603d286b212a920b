//! Glue shared by the tool binaries: load records, resolve a split, read predictions.

use anyhow::{bail, Context, Result};
use data_contracts::{GroundTruth, ImagePrediction, Prediction};
use evaluation::{MapReport, MeanAveragePrecision};
use log::{debug, info, warn};
use mask_dataset::{
    build_records, load_annotation_dir, ClassWeights, ImageRecord, LoadSummary, LoaderConfig,
    SplitKind, SplitManifest,
};
use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use vision_core::postprocess::PostFilter;

use crate::config::ToolConfig;

pub struct LoadedRecords {
    pub summary: LoadSummary,
    pub weights: ClassWeights,
    pub records: Vec<ImageRecord>,
}

pub fn load_records(cfg: &ToolConfig) -> Result<LoadedRecords> {
    let loaded = load_annotation_dir(&cfg.annotation_dir, &cfg.loader).with_context(|| {
        format!("loading annotations from {}", cfg.annotation_dir.display())
    })?;
    let (weights, records) = build_records(loaded.detections);
    Ok(LoadedRecords {
        summary: loaded.summary,
        weights,
        records,
    })
}

pub fn parse_split_kind(raw: &str) -> Result<SplitKind> {
    match raw {
        "train" => Ok(SplitKind::Train),
        "validation" | "valid" | "val" => Ok(SplitKind::Validation),
        "test" => Ok(SplitKind::Test),
        other => bail!("unknown split {other:?}; expected train, validation, or test"),
    }
}

/// Records named by one split of `manifest`, in manifest order. Every listed
/// id must have a record.
pub fn records_for_split(
    records: Vec<ImageRecord>,
    manifest: &SplitManifest,
    kind: SplitKind,
) -> Result<Vec<ImageRecord>> {
    let mut by_id: HashMap<String, ImageRecord> = records
        .into_iter()
        .map(|r| (r.image_id.clone(), r))
        .collect();
    let ids = &manifest.entry(kind).image_ids;
    let mut out = Vec::with_capacity(ids.len());
    let mut missing = Vec::new();
    for id in ids {
        match by_id.remove(id) {
            Some(record) => out.push(record),
            None => missing.push(id.as_str()),
        }
    }
    if !missing.is_empty() {
        bail!(
            "{} of {} {} ids in the manifest have no annotations under {} (first: {})",
            missing.len(),
            ids.len(),
            kind.dir_name(),
            manifest.annotation_root,
            missing[0]
        );
    }
    if out.is_empty() {
        bail!("{} split of the manifest is empty", kind.dir_name());
    }
    Ok(out)
}

/// Annotation directory and loader settings that reproduce the load behind
/// `manifest`. An explicit directory wins over the recorded one.
pub fn manifest_loader(
    cfg: &ToolConfig,
    manifest: &SplitManifest,
    annotation_dir: Option<&Path>,
) -> (PathBuf, LoaderConfig) {
    let recorded = PathBuf::from(&manifest.annotation_root);
    let dir = match annotation_dir {
        Some(dir) => {
            if dir != recorded.as_path() {
                warn!(
                    "annotation dir {} differs from the manifest's {}",
                    dir.display(),
                    recorded.display()
                );
            }
            dir.to_path_buf()
        }
        None => recorded,
    };
    if cfg.loader.min_area != manifest.min_area {
        debug!(
            "using manifest min_area {} instead of config {}",
            manifest.min_area, cfg.loader.min_area
        );
    }
    let loader = LoaderConfig {
        min_area: manifest.min_area,
        permissive: cfg.loader.permissive,
    };
    (dir, loader)
}

/// Reload the annotations a manifest was built from and keep one split.
pub fn load_split_records(
    cfg: &ToolConfig,
    manifest: &SplitManifest,
    kind: SplitKind,
    annotation_dir: Option<&Path>,
) -> Result<Vec<ImageRecord>> {
    let (dir, loader) = manifest_loader(cfg, manifest, annotation_dir);
    let loaded = load_annotation_dir(&dir, &loader)
        .with_context(|| format!("loading annotations from {}", dir.display()))?;
    let (_, records) = build_records(loaded.detections);
    records_for_split(records, manifest, kind)
}

/// Predictions keyed by image id. Duplicate ids are an error.
pub fn load_predictions(path: &Path) -> Result<BTreeMap<String, Prediction>> {
    let raw = std::fs::read(path).with_context(|| format!("reading {}", path.display()))?;
    let entries: Vec<ImagePrediction> = serde_json::from_slice(&raw)
        .with_context(|| format!("parsing predictions {}", path.display()))?;
    let mut out = BTreeMap::new();
    for entry in entries {
        entry
            .prediction
            .validate()
            .with_context(|| format!("prediction for {}", entry.image_id))?;
        if out.insert(entry.image_id.clone(), entry.prediction).is_some() {
            bail!("duplicate predictions for {}", entry.image_id);
        }
    }
    Ok(out)
}

/// Post-filter each image's predictions and score them against the records.
/// Images without predictions count as empty predictions.
pub fn evaluate_records(
    records: &[ImageRecord],
    predictions: &BTreeMap<String, Prediction>,
    filter: &PostFilter,
) -> Result<MapReport> {
    let mut preds = Vec::with_capacity(records.len());
    let mut targets: Vec<GroundTruth> = Vec::with_capacity(records.len());
    let mut missing = 0usize;
    for record in records {
        let pred = match predictions.get(&record.image_id) {
            Some(p) => filter.apply(p),
            None => {
                missing += 1;
                Prediction::default()
            }
        };
        preds.push(pred);
        targets.push(record.ground_truth());
    }
    if missing > 0 {
        warn!("{missing} of {} images have no predictions", records.len());
    }
    let mut metric = MeanAveragePrecision::default();
    metric.update(&preds, &targets)?;
    let report = metric.compute();
    info!("evaluated {} images: map {:.4}", records.len(), report.map);
    Ok(report)
}
