use anyhow::{bail, Context, Result};
use clap::Parser;
use cli_support::{ConfigArgs, ThresholdArgs, VerbosityArgs};
use data_contracts::{GroundTruth, Prediction};
use facemask_tools::pipeline::{load_predictions, load_records};
use facemask_tools::ToolConfig;
use log::warn;
use std::fs;
use std::path::PathBuf;
use vision_core::overlay::render_overlay;

#[derive(Parser, Debug)]
#[command(
    name = "overlay_labels",
    about = "Draw ground-truth and predicted boxes onto dataset images"
)]
struct Args {
    #[command(flatten)]
    config: ConfigArgs,
    #[command(flatten)]
    thresholds: ThresholdArgs,
    #[command(flatten)]
    verbosity: VerbosityArgs,
    /// Image ids (file names) to render; all annotated images when empty.
    #[arg(long = "image")]
    images: Vec<String>,
    /// Optional predictions JSON to draw next to the ground truth.
    #[arg(long)]
    predictions: Option<PathBuf>,
    /// Output directory (defaults to the config's overlays_dir).
    #[arg(long)]
    out_dir: Option<PathBuf>,
    /// Border thickness in pixels.
    #[arg(long, default_value_t = 2)]
    thickness: u32,
}

fn main() -> Result<()> {
    let args = Args::parse();
    args.verbosity.init_logging();
    let cfg = ToolConfig::load_with(args.config.config.as_deref())?;
    let filter = args.thresholds.resolve(cfg.thresholds).post_filter();
    let out_dir = args.out_dir.clone().unwrap_or_else(|| cfg.overlays_dir.clone());
    fs::create_dir_all(&out_dir).with_context(|| format!("creating {}", out_dir.display()))?;

    let loaded = load_records(&cfg)?;
    let predictions = match &args.predictions {
        Some(path) => load_predictions(path)?,
        None => Default::default(),
    };

    let selected: Vec<_> = if args.images.is_empty() {
        loaded.records.iter().collect()
    } else {
        let picked: Vec<_> = loaded
            .records
            .iter()
            .filter(|r| args.images.contains(&r.image_id))
            .collect();
        if picked.len() != args.images.len() {
            warn!(
                "{} requested image(s) have no annotations",
                args.images.len() - picked.len()
            );
        }
        picked
    };
    if selected.is_empty() {
        bail!("nothing to render");
    }

    let mut written = 0usize;
    for record in selected {
        let img_path = cfg.image_dir.join(&record.image_id);
        if !img_path.exists() {
            warn!("missing image for {}", record.image_id);
            continue;
        }
        let mut img = image::open(&img_path)
            .with_context(|| format!("opening {}", img_path.display()))?
            .into_rgba8();
        let gt: GroundTruth = record.ground_truth();
        let pred = predictions
            .get(&record.image_id)
            .map(|p| filter.apply(p))
            .unwrap_or_else(Prediction::default);
        render_overlay(&mut img, &pred, &gt, args.thickness);
        let out_path = out_dir.join(&record.image_id).with_extension("png");
        img.save(&out_path)
            .with_context(|| format!("writing {}", out_path.display()))?;
        written += 1;
    }

    println!("{written} overlays written to {}", out_dir.display());
    Ok(())
}
