use anyhow::{bail, Context, Result};
use clap::Parser;
use cli_support::{ConfigArgs, SplitArgs, VerbosityArgs};
use facemask_tools::pipeline::load_records;
use facemask_tools::ToolConfig;
use log::{info, warn};
use mask_dataset::{
    export_split, split_stratified, validate_load_summary, write_data_yaml, DatasetSummary,
    SplitKind, SplitManifest, ValidationOutcome, ValidationThresholds,
};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(
    name = "prepare_dataset",
    about = "Load VOC annotations, split them into train/validation/test, and write a split manifest"
)]
struct Args {
    #[command(flatten)]
    config: ConfigArgs,
    #[command(flatten)]
    split: SplitArgs,
    #[command(flatten)]
    verbosity: VerbosityArgs,
    /// Annotation directory (defaults to the config's annotation_dir).
    #[arg(long)]
    annotation_dir: Option<PathBuf>,
    /// Image directory (defaults to the config's image_dir).
    #[arg(long)]
    image_dir: Option<PathBuf>,
    /// Manifest output path (defaults to <output_root>/split_manifest.json).
    #[arg(long)]
    manifest: Option<PathBuf>,
    /// Skip unparsable annotation files instead of failing.
    #[arg(long, default_value_t = false)]
    permissive: bool,
    /// Also export a YOLO dataset tree under the config's yolo_root.
    #[arg(long, default_value_t = false)]
    export_yolo: bool,
    /// Exit non-zero when load validation fails (thresholds from MASK_DATASET_MAX_* env vars).
    #[arg(long, default_value_t = false)]
    strict: bool,
}

fn print_summary(name: &str, summary: &DatasetSummary) {
    println!(
        "{name:<11} images {:>6}  objects {:>6}",
        summary.images, summary.objects
    );
    for (class, count) in &summary.per_class {
        println!(
            "    {:<24}{:>6}  ({:.1}%)",
            class.as_str(),
            count.count,
            count.proportion * 100.0
        );
    }
}

fn main() -> Result<()> {
    let args = Args::parse();
    args.verbosity.init_logging();
    let mut cfg = ToolConfig::load_with(args.config.config.as_deref())?;
    if let Some(dir) = args.annotation_dir.clone() {
        cfg.annotation_dir = dir;
    }
    if let Some(dir) = args.image_dir.clone() {
        cfg.image_dir = dir;
    }
    cfg.loader.permissive |= args.permissive;
    let split_cfg = args.split.resolve(cfg.split);
    let manifest_path = args.manifest.clone().unwrap_or_else(|| cfg.manifest_path.clone());

    let loaded = load_records(&cfg)?;
    let report = validate_load_summary(loaded.summary.clone(), &ValidationThresholds::from_env());
    println!(
        "annotations: {} files, {} objects, {} kept, {} clipped, {} dropped, {} invalid files [{}]",
        report.summary.files,
        report.summary.objects,
        report.summary.kept,
        report.summary.clipped,
        report.summary.dropped(),
        report.summary.invalid_files,
        report.outcome.as_str()
    );
    for reason in &report.reasons {
        info!("validation: {reason}");
    }
    if report.outcome == ValidationOutcome::Fail {
        if args.strict {
            bail!("annotation validation failed: {}", report.reasons.join("; "));
        }
        warn!("annotation validation failed; continuing (pass --strict to abort)");
    }
    if loaded.records.is_empty() {
        bail!("no usable annotations under {}", cfg.annotation_dir.display());
    }

    print_summary("all", &DatasetSummary::from_records(&loaded.records));
    let split = split_stratified(loaded.records, &split_cfg).context("splitting dataset")?;
    for kind in SplitKind::ALL {
        print_summary(kind.dir_name(), &split.summary(kind));
    }

    let manifest = SplitManifest::build(
        &split,
        split_cfg,
        &cfg.annotation_dir,
        cfg.loader.min_area,
        loaded.summary,
    );
    manifest
        .save(&manifest_path)
        .with_context(|| format!("writing {}", manifest_path.display()))?;
    println!(
        "split manifest (version {}) written to {}",
        &manifest.version[..12.min(manifest.version.len())],
        manifest_path.display()
    );

    if args.export_yolo {
        let exported = export_split(&split, &cfg.image_dir, &cfg.yolo_root)
            .context("exporting YOLO tree")?;
        write_data_yaml(&cfg.yolo_root, &cfg.yolo_yaml)?;
        println!(
            "YOLO export: {} images, {} label rows under {} (dataset yaml {})",
            exported.images,
            exported.label_rows,
            cfg.yolo_root.display(),
            cfg.yolo_yaml.display()
        );
    }
    Ok(())
}
