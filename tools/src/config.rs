use std::path::{Path, PathBuf};

use anyhow::Context;
use cli_support::ThresholdOpts;
use log::warn;
use mask_dataset::{LoaderConfig, SplitConfig, DEFAULT_MIN_AREA};
use serde::Deserialize;
use vision_core::postprocess::{DEFAULT_CONFIDENCE_THRESHOLD, DEFAULT_IOU_THRESHOLD};

const DEFAULT_CONFIG_NAME: &str = "facemask-tools.toml";
const CONFIG_ENV: &str = "FACEMASK_TOOLS_CONFIG";
const DEFAULT_BATCH_SIZE: usize = 5;

#[derive(Debug, Clone)]
pub struct ToolConfig {
    pub image_dir: PathBuf,
    pub annotation_dir: PathBuf,
    pub yolo_root: PathBuf,
    pub yolo_yaml: PathBuf,
    pub output_root: PathBuf,
    pub manifest_path: PathBuf,
    pub report_path: PathBuf,
    pub overlays_dir: PathBuf,
    pub thresholds: ThresholdOpts,
    pub split: SplitConfig,
    pub loader: LoaderConfig,
    pub batch_size: usize,
}

impl Default for ToolConfig {
    fn default() -> Self {
        Self::from_file(ToolConfigFile::default())
    }
}

#[derive(Debug, Deserialize, Default)]
struct ToolConfigFile {
    image_dir: Option<String>,
    annotation_dir: Option<String>,
    yolo_root: Option<String>,
    yolo_yaml: Option<String>,
    output_root: Option<String>,
    manifest_path: Option<String>,
    report_path: Option<String>,
    overlays_dir: Option<String>,
    thresholds: Option<ThresholdSection>,
    split: Option<SplitSection>,
    loader: Option<LoaderSection>,
    sampler: Option<SamplerSection>,
}

#[derive(Debug, Deserialize, Default)]
struct ThresholdSection {
    confidence: Option<f32>,
    iou: Option<f32>,
    class_aware: Option<bool>,
}

#[derive(Debug, Deserialize, Default)]
struct SplitSection {
    train_fraction: Option<f64>,
    validation_fraction: Option<f64>,
    seed: Option<u64>,
}

#[derive(Debug, Deserialize, Default)]
struct LoaderSection {
    min_area: Option<f32>,
    permissive: Option<bool>,
}

#[derive(Debug, Deserialize, Default)]
struct SamplerSection {
    batch_size: Option<usize>,
}

impl ToolConfig {
    /// Load from `FACEMASK_TOOLS_CONFIG` if set, else `./facemask-tools.toml`,
    /// else defaults.
    pub fn load() -> Self {
        if let Ok(path) = std::env::var(CONFIG_ENV) {
            let cfg = Self::from_path(Path::new(&path)).unwrap_or_default();
            cfg.warn_if_invalid();
            return cfg;
        }
        let cfg = Self::from_path(Path::new(DEFAULT_CONFIG_NAME)).unwrap_or_default();
        cfg.warn_if_invalid();
        cfg
    }

    /// Like [`ToolConfig::load`], but an explicit path wins. A file named
    /// explicitly must exist and parse.
    pub fn load_with(explicit: Option<&Path>) -> anyhow::Result<Self> {
        let Some(path) = explicit else {
            return Ok(Self::load());
        };
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("reading tools config {}", path.display()))?;
        let file: ToolConfigFile = toml::from_str(&raw)
            .with_context(|| format!("parsing tools config {}", path.display()))?;
        let cfg = Self::from_file(file);
        cfg.warn_if_invalid();
        Ok(cfg)
    }

    pub fn from_path(path: &Path) -> Option<Self> {
        if !path.exists() {
            return None;
        }
        let raw = std::fs::read_to_string(path).ok()?;
        Self::from_toml_str(&raw)
    }

    pub fn from_toml_str(raw: &str) -> Option<Self> {
        match toml::from_str::<ToolConfigFile>(raw) {
            Ok(file) => Some(Self::from_file(file)),
            Err(e) => {
                warn!("tools config is not valid TOML: {e}");
                None
            }
        }
    }

    fn from_file(file: ToolConfigFile) -> Self {
        let output_root = file
            .output_root
            .map(|v| expand_path(&v))
            .unwrap_or_else(|| PathBuf::from("artifacts"));
        let yolo_root = file
            .yolo_root
            .map(|v| expand_path(&v))
            .unwrap_or_else(|| PathBuf::from("data/yolo"));

        let thresholds = file.thresholds.unwrap_or_default();
        let split = file.split.unwrap_or_default();
        let split_defaults = SplitConfig::default();
        let loader = file.loader.unwrap_or_default();

        ToolConfig {
            image_dir: file
                .image_dir
                .map(|v| expand_path(&v))
                .unwrap_or_else(|| PathBuf::from("data/images")),
            annotation_dir: file
                .annotation_dir
                .map(|v| expand_path(&v))
                .unwrap_or_else(|| PathBuf::from("data/annotations")),
            yolo_yaml: file
                .yolo_yaml
                .map(|v| expand_path(&v))
                .unwrap_or_else(|| yolo_root.join("data.yaml")),
            yolo_root,
            manifest_path: file
                .manifest_path
                .map(|v| expand_path(&v))
                .unwrap_or_else(|| output_root.join("split_manifest.json")),
            report_path: file
                .report_path
                .map(|v| expand_path(&v))
                .unwrap_or_else(|| output_root.join("map_report.json")),
            overlays_dir: file
                .overlays_dir
                .map(|v| expand_path(&v))
                .unwrap_or_else(|| output_root.join("overlays")),
            output_root,
            thresholds: ThresholdOpts {
                confidence: thresholds.confidence.unwrap_or(DEFAULT_CONFIDENCE_THRESHOLD),
                iou: thresholds.iou.unwrap_or(DEFAULT_IOU_THRESHOLD),
                class_aware: thresholds.class_aware.unwrap_or(false),
            },
            split: SplitConfig {
                train_fraction: split.train_fraction.unwrap_or(split_defaults.train_fraction),
                validation_fraction_of_rest: split
                    .validation_fraction
                    .unwrap_or(split_defaults.validation_fraction_of_rest),
                seed: split.seed.unwrap_or(split_defaults.seed),
            },
            loader: LoaderConfig {
                min_area: loader.min_area.unwrap_or(DEFAULT_MIN_AREA),
                permissive: loader.permissive.unwrap_or(false),
            },
            batch_size: file
                .sampler
                .and_then(|s| s.batch_size)
                .unwrap_or(DEFAULT_BATCH_SIZE),
        }
    }

    fn warn_if_invalid(&self) {
        if !(0.0..1.0).contains(&self.thresholds.confidence) {
            warn!(
                "tools config: thresholds.confidence = {} lies outside [0, 1)",
                self.thresholds.confidence
            );
        }
        if !(0.0..=1.0).contains(&self.thresholds.iou) {
            warn!(
                "tools config: thresholds.iou = {} lies outside [0, 1]",
                self.thresholds.iou
            );
        }
        if let Err(e) = self.split.validate() {
            warn!("tools config: {e}");
        }
        if self.batch_size == 0 {
            warn!("tools config: sampler.batch_size is 0; batches of 1 will be used");
        }
    }
}

fn expand_path(raw: &str) -> PathBuf {
    let mut out = raw.to_string();
    if let Some(stripped) = out.strip_prefix("~") {
        if let Ok(home) = std::env::var("HOME") {
            out = format!("{home}{stripped}");
        }
    }
    PathBuf::from(expand_env(&out))
}

/// Replace `${VAR}` with its value; unknown variables are left as written.
fn expand_env(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    let mut rest = input;
    while let Some(start) = rest.find("${") {
        out.push_str(&rest[..start]);
        let after = &rest[start + 2..];
        match after.find('}') {
            Some(end) => {
                let key = &after[..end];
                match std::env::var(key) {
                    Ok(val) => out.push_str(&val),
                    Err(_) => out.push_str(&rest[start..start + end + 3]),
                }
                rest = &after[end + 1..];
            }
            None => {
                out.push_str(&rest[start..]);
                rest = "";
            }
        }
    }
    out.push_str(rest);
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn env_placeholders_expand() {
        std::env::set_var("FACEMASK_TOOLS_TEST_ROOT", "/srv/masks");
        assert_eq!(
            expand_env("${FACEMASK_TOOLS_TEST_ROOT}/images"),
            "/srv/masks/images"
        );
        assert_eq!(
            expand_env("${FACEMASK_TOOLS_SURELY_UNSET}/x"),
            "${FACEMASK_TOOLS_SURELY_UNSET}/x"
        );
        assert_eq!(expand_env("plain/${open"), "plain/${open");
    }
}
