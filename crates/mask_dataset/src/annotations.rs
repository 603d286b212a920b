//! Loading VOC annotation directories into clipped, filtered detections.

use data_contracts::{BoxXyxy, Detection, MaskClass};
use log::{debug, info, warn};
use std::fs;
use std::path::{Path, PathBuf};

use crate::types::{DatasetError, DatasetResult, LoadSummary};
use crate::voc::{parse_voc_file, VocAnnotation};

/// Boxes must be strictly larger than this many square pixels to be kept.
pub const DEFAULT_MIN_AREA: f32 = 50.0;

#[derive(Debug, Clone)]
pub struct LoaderConfig {
    pub min_area: f32,
    /// Skip unparsable files instead of failing the whole load.
    pub permissive: bool,
}

impl Default for LoaderConfig {
    fn default() -> Self {
        Self {
            min_area: DEFAULT_MIN_AREA,
            permissive: false,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct LoadedAnnotations {
    pub detections: Vec<Detection>,
    pub summary: LoadSummary,
}

/// Pull a raw box back inside the image. Returns the clipped box and whether
/// any coordinate changed.
///
/// Far edges at or past the image border move to `dim - 1`; near edges at or
/// before zero move to `1`.
pub fn clip_box(raw: BoxXyxy, width: u32, height: u32) -> (BoxXyxy, bool) {
    let w = width as f32;
    let h = height as f32;
    let mut clipped = raw;
    if clipped.xmax >= w {
        clipped.xmax = w - 1.0;
    }
    if clipped.ymax >= h {
        clipped.ymax = h - 1.0;
    }
    if clipped.xmin <= 0.0 {
        clipped.xmin = 1.0;
    }
    if clipped.ymin <= 0.0 {
        clipped.ymin = 1.0;
    }
    (clipped, clipped != raw)
}

/// Convert one parsed document into detections, updating `summary` counters.
pub fn detections_from_voc(
    ann: &VocAnnotation,
    cfg: &LoaderConfig,
    source: &Path,
    summary: &mut LoadSummary,
) -> DatasetResult<Vec<Detection>> {
    if ann.width == 0 || ann.height == 0 {
        return Err(DatasetError::Validation {
            path: source.to_path_buf(),
            msg: format!("image size {}x{} is empty", ann.width, ann.height),
        });
    }
    let mut out = Vec::with_capacity(ann.objects.len());
    for (i, obj) in ann.objects.iter().enumerate() {
        summary.objects += 1;
        let class: MaskClass = obj.name.parse().map_err(|e| DatasetError::Validation {
            path: source.to_path_buf(),
            msg: format!("object[{i}]: {e}"),
        })?;
        let (bbox, was_clipped) = clip_box(obj.bbox, ann.width, ann.height);
        if was_clipped {
            summary.clipped += 1;
        }
        if !bbox.is_well_formed() {
            debug!(
                "{}: object[{i}] collapsed after clipping ({:?})",
                source.display(),
                bbox.to_array()
            );
            summary.dropped_degenerate += 1;
            continue;
        }
        if bbox.area() <= cfg.min_area {
            summary.dropped_small += 1;
            continue;
        }
        out.push(Detection {
            image_id: ann.filename.clone(),
            image_width: ann.width,
            image_height: ann.height,
            bbox,
            class,
        });
    }
    summary.kept += out.len();
    Ok(out)
}

/// List every `*.xml` file in `dir`, sorted by path.
pub fn index_annotation_dir(dir: &Path) -> DatasetResult<Vec<PathBuf>> {
    let entries = fs::read_dir(dir).map_err(|e| DatasetError::Io {
        path: dir.to_path_buf(),
        source: e,
    })?;
    let mut paths: Vec<PathBuf> = entries
        .filter_map(Result::ok)
        .map(|entry| entry.path())
        .filter(|p| p.is_file() && p.extension().and_then(|s| s.to_str()) == Some("xml"))
        .collect();
    paths.sort();
    Ok(paths)
}

pub fn load_annotation_file(
    path: &Path,
    cfg: &LoaderConfig,
    summary: &mut LoadSummary,
) -> DatasetResult<Vec<Detection>> {
    let ann = parse_voc_file(path)?;
    detections_from_voc(&ann, cfg, path, summary)
}

/// Load every annotation file under `dir`.
pub fn load_annotation_dir(dir: &Path, cfg: &LoaderConfig) -> DatasetResult<LoadedAnnotations> {
    let paths = index_annotation_dir(dir)?;
    let mut summary = LoadSummary::default();
    let mut detections = Vec::new();
    for path in paths {
        summary.files += 1;
        // Counters from a rejected file are discarded with it.
        let mut file_summary = LoadSummary::default();
        match load_annotation_file(&path, cfg, &mut file_summary) {
            Ok(mut dets) => {
                summary.objects += file_summary.objects;
                summary.kept += file_summary.kept;
                summary.clipped += file_summary.clipped;
                summary.dropped_small += file_summary.dropped_small;
                summary.dropped_degenerate += file_summary.dropped_degenerate;
                detections.append(&mut dets);
            }
            Err(e) if cfg.permissive => {
                warn!("skipping {}: {e}", path.display());
                summary.invalid_files += 1;
            }
            Err(e) => return Err(e),
        }
    }
    info!(
        "loaded {} detections from {} annotation files ({} clipped, {} dropped, {} invalid files)",
        summary.kept,
        summary.files,
        summary.clipped,
        summary.dropped(),
        summary.invalid_files
    );
    Ok(LoadedAnnotations {
        detections,
        summary,
    })
}
