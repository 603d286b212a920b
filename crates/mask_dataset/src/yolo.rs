//! Export of a split into a YOLO dataset tree.
//!
//! Layout: `<root>/{train,valid,test}/{images,labels}`, one label file per
//! image with `class x_center y_center width height` rows normalized to the
//! image size, plus a dataset YAML naming the three image directories.

use data_contracts::{Detection, MaskClass};
use log::info;
use serde::{Deserialize, Serialize};
use std::fmt::Write as _;
use std::fs;
use std::path::{Path, PathBuf};

use crate::records::ImageRecord;
use crate::splits::{DatasetSplit, SplitKind};
use crate::types::{DatasetError, DatasetResult};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct YoloExportSummary {
    pub images: usize,
    pub label_files: usize,
    pub label_rows: usize,
}

/// One label row for `det`.
pub fn yolo_line(det: &Detection) -> String {
    let [cx, cy, w, h] = det.normalized_cxcywh();
    format!("{} {cx:.6} {cy:.6} {w:.6} {h:.6}", det.class.yolo_id())
}

/// Label file name for an image: same stem, `.txt` extension.
pub fn label_file_name(image_id: &str) -> PathBuf {
    Path::new(image_id).with_extension("txt")
}

pub fn split_dirs(yolo_root: &Path, kind: SplitKind) -> (PathBuf, PathBuf) {
    let base = yolo_root.join(kind.dir_name());
    (base.join("images"), base.join("labels"))
}

fn create_dir(path: &Path) -> DatasetResult<()> {
    fs::create_dir_all(path).map_err(|e| DatasetError::Io {
        path: path.to_path_buf(),
        source: e,
    })
}

/// Copy the images of `records` and write their label files.
pub fn export_records(
    records: &[ImageRecord],
    image_dir: &Path,
    images_out: &Path,
    labels_out: &Path,
) -> DatasetResult<YoloExportSummary> {
    create_dir(images_out)?;
    create_dir(labels_out)?;
    let mut summary = YoloExportSummary::default();
    for record in records {
        let src = image_dir.join(&record.image_id);
        if !src.exists() {
            return Err(DatasetError::MissingImageFile {
                image_id: record.image_id.clone(),
                image: src,
            });
        }
        let dst = images_out.join(&record.image_id);
        fs::copy(&src, &dst).map_err(|e| DatasetError::Io {
            path: dst.clone(),
            source: e,
        })?;
        summary.images += 1;

        let mut body = String::new();
        for det in &record.detections {
            // Writing into a String cannot fail.
            let _ = writeln!(body, "{}", yolo_line(det));
            summary.label_rows += 1;
        }
        let label_path = labels_out.join(label_file_name(&record.image_id));
        fs::write(&label_path, body).map_err(|e| DatasetError::Io {
            path: label_path.clone(),
            source: e,
        })?;
        summary.label_files += 1;
    }
    Ok(summary)
}

/// Export all three splits under `yolo_root`.
pub fn export_split(
    split: &DatasetSplit,
    image_dir: &Path,
    yolo_root: &Path,
) -> DatasetResult<YoloExportSummary> {
    let mut total = YoloExportSummary::default();
    for kind in SplitKind::ALL {
        let (images_out, labels_out) = split_dirs(yolo_root, kind);
        let summary = export_records(split.get(kind), image_dir, &images_out, &labels_out)?;
        info!(
            "yolo export {}: {} images, {} label rows",
            kind.dir_name(),
            summary.images,
            summary.label_rows
        );
        total.images += summary.images;
        total.label_files += summary.label_files;
        total.label_rows += summary.label_rows;
    }
    Ok(total)
}

/// Dataset YAML contents for a tree rooted at `yolo_root`.
pub fn data_yaml(yolo_root: &Path) -> String {
    let mut out = String::new();
    for (key, kind) in [
        ("train", SplitKind::Train),
        ("val", SplitKind::Validation),
        ("test", SplitKind::Test),
    ] {
        let (images, _) = split_dirs(yolo_root, kind);
        let _ = writeln!(out, "{key}: {}", images.display());
    }
    out.push_str("\nnames:\n");
    for class in MaskClass::ALL {
        let _ = writeln!(out, "  {}: {}", class.yolo_id(), class.as_str());
    }
    out
}

pub fn write_data_yaml(yolo_root: &Path, yaml_path: &Path) -> DatasetResult<()> {
    if let Some(parent) = yaml_path.parent().filter(|p| !p.as_os_str().is_empty()) {
        create_dir(parent)?;
    }
    fs::write(yaml_path, data_yaml(yolo_root)).map_err(|e| DatasetError::Io {
        path: yaml_path.to_path_buf(),
        source: e,
    })
}
