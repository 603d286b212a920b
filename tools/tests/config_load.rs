use std::fs;
use std::path::PathBuf;

use facemask_tools::ToolConfig;

#[test]
fn loads_minimal_config() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let path = dir.path().join("facemask-tools.toml");
    fs::write(&path, "annotation_dir = \"voc/annotations\"\n")?;
    let cfg = ToolConfig::from_path(&path).expect("load config");
    assert_eq!(cfg.annotation_dir, PathBuf::from("voc/annotations"));
    assert_eq!(cfg.image_dir, PathBuf::from("data/images"));
    assert_eq!(cfg.manifest_path, PathBuf::from("artifacts/split_manifest.json"));
    assert_eq!(cfg.thresholds.confidence, 0.35);
    assert_eq!(cfg.thresholds.iou, 0.7);
    assert_eq!(cfg.split.seed, 42);
    assert_eq!(cfg.batch_size, 5);
    assert_eq!(cfg.loader.min_area, 50.0);
    Ok(())
}

#[test]
fn sections_override_defaults() {
    let cfg = ToolConfig::from_toml_str(
        r#"
output_root = "out"
yolo_root = "yolo"

[thresholds]
confidence = 0.5
iou = 0.45
class_aware = true

[split]
train_fraction = 0.7
validation_fraction = 0.4
seed = 7

[loader]
min_area = 64.0
permissive = true

[sampler]
batch_size = 16
"#,
    )
    .expect("parse config");
    assert_eq!(cfg.report_path, PathBuf::from("out/map_report.json"));
    assert_eq!(cfg.overlays_dir, PathBuf::from("out/overlays"));
    assert_eq!(cfg.yolo_yaml, PathBuf::from("yolo/data.yaml"));
    assert_eq!(cfg.thresholds.confidence, 0.5);
    assert!(cfg.thresholds.class_aware);
    assert_eq!(cfg.split.train_fraction, 0.7);
    assert_eq!(cfg.split.validation_fraction_of_rest, 0.4);
    assert_eq!(cfg.split.seed, 7);
    assert!(cfg.loader.permissive);
    assert_eq!(cfg.batch_size, 16);
}

#[test]
fn home_and_env_paths_expand() {
    std::env::set_var("FACEMASK_TOOLS_TEST_DATA", "/mnt/masks");
    let cfg = ToolConfig::from_toml_str("image_dir = \"${FACEMASK_TOOLS_TEST_DATA}/images\"\n")
        .expect("parse config");
    assert_eq!(cfg.image_dir, PathBuf::from("/mnt/masks/images"));

    if let Ok(home) = std::env::var("HOME") {
        let cfg = ToolConfig::from_toml_str("output_root = \"~/runs\"\n").expect("parse config");
        assert_eq!(cfg.output_root, PathBuf::from(format!("{home}/runs")));
    }
}

#[test]
fn missing_or_broken_files_yield_none() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    assert!(ToolConfig::from_path(&dir.path().join("absent.toml")).is_none());
    let broken = dir.path().join("broken.toml");
    fs::write(&broken, "[thresholds\nconfidence = ")?;
    assert!(ToolConfig::from_path(&broken).is_none());
    Ok(())
}

#[test]
fn explicit_config_must_exist_and_parse() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let broken = dir.path().join("broken.toml");
    fs::write(&broken, "[thresholds\nconfidence = ")?;
    let err = ToolConfig::load_with(Some(broken.as_path())).unwrap_err();
    assert!(format!("{err:#}").contains("parsing tools config"));

    let absent = dir.path().join("absent.toml");
    let err = ToolConfig::load_with(Some(absent.as_path())).unwrap_err();
    assert!(format!("{err:#}").contains("reading tools config"));

    let good = dir.path().join("good.toml");
    fs::write(&good, "[sampler]\nbatch_size = 8\n")?;
    assert_eq!(ToolConfig::load_with(Some(good.as_path()))?.batch_size, 8);
    Ok(())
}
