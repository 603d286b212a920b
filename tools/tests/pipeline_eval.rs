use std::fs;
use std::path::Path;

use data_contracts::{BoxXyxy, ImagePrediction, Prediction};
use facemask_tools::pipeline::{
    evaluate_records, load_predictions, load_records, load_split_records, parse_split_kind,
    records_for_split,
};
use facemask_tools::ToolConfig;
use mask_dataset::{split_stratified, SplitKind, SplitManifest};
use vision_core::postprocess::PostFilter;

fn write_annotations(dir: &Path, prefix: &str, count: usize) -> anyhow::Result<()> {
    fs::create_dir_all(dir)?;
    for i in 0..count {
        let xml = format!(
            "<annotation><filename>{prefix}{i:02}.png</filename>\
             <size><width>200</width><height>200</height><depth>3</depth></size>\
             <object><name>with_mask</name><bndbox><xmin>10</xmin><ymin>10</ymin><xmax>60</xmax><ymax>60</ymax></bndbox></object>\
             <object><name>without_mask</name><bndbox><xmin>100</xmin><ymin>100</ymin><xmax>150</xmax><ymax>160</ymax></bndbox></object>\
             </annotation>"
        );
        fs::write(dir.join(format!("{prefix}{i:02}.xml")), xml)?;
    }
    Ok(())
}

#[test]
fn perfect_predictions_score_one_after_post_filter() -> anyhow::Result<()> {
    let tmp = tempfile::tempdir()?;
    let ann_dir = tmp.path().join("annotations");
    write_annotations(&ann_dir, "img", 10)?;
    let cfg = ToolConfig::from_toml_str(&format!(
        "annotation_dir = \"{}\"\noutput_root = \"{}\"\n",
        ann_dir.display(),
        tmp.path().join("out").display()
    ))
    .expect("config");

    let loaded = load_records(&cfg)?;
    assert_eq!(loaded.records.len(), 10);
    let split = split_stratified(loaded.records.clone(), &cfg.split)?;
    let manifest = SplitManifest::build(
        &split,
        cfg.split,
        &cfg.annotation_dir,
        cfg.loader.min_area,
        loaded.summary.clone(),
    );
    manifest.save(&cfg.manifest_path)?;
    let manifest = SplitManifest::load(&cfg.manifest_path)?;

    // Exact boxes with high scores, plus a low-confidence duplicate and a
    // near-duplicate that NMS should remove.
    let entries: Vec<ImagePrediction> = loaded
        .records
        .iter()
        .map(|r| {
            let gt = r.ground_truth();
            let mut boxes = gt.boxes.clone();
            let mut scores = vec![0.9; gt.len()];
            let mut labels = gt.labels.clone();
            boxes.push(BoxXyxy::new(11.0, 10.0, 61.0, 60.0));
            scores.push(0.8);
            labels.push(gt.labels[0]);
            boxes.push(BoxXyxy::new(150.0, 20.0, 190.0, 60.0));
            scores.push(0.2);
            labels.push(gt.labels[0]);
            ImagePrediction {
                image_id: r.image_id.clone(),
                prediction: Prediction::new(boxes, scores, labels),
            }
        })
        .collect();
    let pred_path = tmp.path().join("predictions.json");
    fs::write(&pred_path, serde_json::to_vec(&entries)?)?;
    let predictions = load_predictions(&pred_path)?;
    assert_eq!(predictions.len(), 10);

    let kind = parse_split_kind("test")?;
    let records = records_for_split(loaded.records, &manifest, kind)?;
    assert_eq!(records.len(), manifest.entry(SplitKind::Test).image_ids.len());
    let report = evaluate_records(&records, &predictions, &PostFilter::default())?;
    assert_eq!(report.map, 1.0);
    assert_eq!(report.classes, vec![2, 3]);

    // Without NMS the near-duplicate survives as a false positive, ranked
    // below the hit, so precision at full recall is unchanged.
    let loose = PostFilter::new(0.35, 1.0);
    let report = evaluate_records(&records, &predictions, &loose)?;
    assert_eq!(report.map, 1.0);
    Ok(())
}

#[test]
fn duplicate_prediction_entries_are_rejected() -> anyhow::Result<()> {
    let tmp = tempfile::tempdir()?;
    let entry = ImagePrediction {
        image_id: "a.png".into(),
        prediction: Prediction::default(),
    };
    let path = tmp.path().join("dup.json");
    fs::write(&path, serde_json::to_vec(&vec![entry.clone(), entry])?)?;
    assert!(load_predictions(&path).is_err());
    assert!(parse_split_kind("holdout").is_err());
    Ok(())
}

#[test]
fn split_records_come_from_the_manifest_annotations() -> anyhow::Result<()> {
    let tmp = tempfile::tempdir()?;
    let prepared = tmp.path().join("prepared");
    let other = tmp.path().join("other");
    write_annotations(&prepared, "img", 10)?;
    write_annotations(&other, "elsewhere", 10)?;

    let prep_cfg = ToolConfig::from_toml_str(&format!(
        "annotation_dir = \"{}\"\n",
        prepared.display()
    ))
    .expect("config");
    let loaded = load_records(&prep_cfg)?;
    let split = split_stratified(loaded.records, &prep_cfg.split)?;
    let manifest = SplitManifest::build(
        &split,
        prep_cfg.split,
        &prepared,
        prep_cfg.loader.min_area,
        loaded.summary,
    );

    // The config now points at a different directory and a min_area that
    // would drop every box; the manifest's settings still apply.
    let cfg = ToolConfig::from_toml_str(&format!(
        "annotation_dir = \"{}\"\n[loader]\nmin_area = 100000.0\n",
        other.display()
    ))
    .expect("config");
    let records = load_split_records(&cfg, &manifest, SplitKind::Test, None)?;
    let ids: Vec<&str> = records.iter().map(|r| r.image_id.as_str()).collect();
    let expected: Vec<&str> = manifest
        .entry(SplitKind::Test)
        .image_ids
        .iter()
        .map(String::as_str)
        .collect();
    assert_eq!(ids, expected);
    assert!(!records.is_empty());

    // Annotations that do not contain the manifest's ids are an error, not an
    // empty evaluation.
    let err = load_split_records(&cfg, &manifest, SplitKind::Test, Some(other.as_path()))
        .unwrap_err();
    assert!(format!("{err:#}").contains("have no annotations"));
    let stray = load_records(&cfg)?;
    assert!(stray.records.is_empty());
    assert!(records_for_split(stray.records, &manifest, SplitKind::Validation).is_err());
    Ok(())
}
