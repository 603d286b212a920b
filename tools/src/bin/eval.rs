use anyhow::{Context, Result};
use clap::Parser;
use cli_support::{ConfigArgs, ThresholdArgs, VerbosityArgs};
use facemask_tools::pipeline::{
    evaluate_records, load_predictions, load_split_records, parse_split_kind,
};
use facemask_tools::ToolConfig;
use mask_dataset::SplitManifest;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(
    name = "eval",
    about = "Post-filter detector predictions and score them (COCO mAP) against a dataset split"
)]
struct Args {
    #[command(flatten)]
    config: ConfigArgs,
    #[command(flatten)]
    thresholds: ThresholdArgs,
    #[command(flatten)]
    verbosity: VerbosityArgs,
    /// Predictions JSON: a list of {image_id, boxes, scores, labels}.
    #[arg(long)]
    predictions: PathBuf,
    /// Annotation directory (defaults to the one recorded in the manifest).
    #[arg(long)]
    annotation_dir: Option<PathBuf>,
    /// Split manifest (defaults to the config's manifest_path).
    #[arg(long)]
    manifest: Option<PathBuf>,
    /// Split to evaluate: train, validation, or test.
    #[arg(long, default_value = "test")]
    split: String,
    /// Write the report as JSON here (defaults to the config's report_path).
    #[arg(long)]
    out: Option<PathBuf>,
    /// Do not write the report file.
    #[arg(long, default_value_t = false)]
    no_save: bool,
}

fn main() -> Result<()> {
    let args = Args::parse();
    args.verbosity.init_logging();
    let cfg = ToolConfig::load_with(args.config.config.as_deref())?;
    let thresholds = args.thresholds.resolve(cfg.thresholds);
    let manifest_path = args.manifest.clone().unwrap_or_else(|| cfg.manifest_path.clone());
    let manifest = SplitManifest::load(&manifest_path)
        .with_context(|| format!("loading {}", manifest_path.display()))?;
    let kind = parse_split_kind(&args.split)?;

    let records = load_split_records(&cfg, &manifest, kind, args.annotation_dir.as_deref())?;
    let predictions = load_predictions(&args.predictions)?;
    let report = evaluate_records(&records, &predictions, &thresholds.post_filter())?;

    println!(
        "{} split: {} images (confidence > {}, NMS IoU > {}{})",
        kind.dir_name(),
        records.len(),
        thresholds.confidence,
        thresholds.iou,
        if thresholds.class_aware { ", per class" } else { "" }
    );
    print!("{report}");

    if !args.no_save {
        let out = args.out.clone().unwrap_or_else(|| cfg.report_path.clone());
        report
            .save(&out)
            .with_context(|| format!("writing {}", out.display()))?;
        println!("report written to {}", out.display());
    }
    Ok(())
}
