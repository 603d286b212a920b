use anyhow::{Context, Result};
use clap::Parser;
use cli_support::{ConfigArgs, VerbosityArgs};
use data_contracts::MaskClass;
use facemask_tools::pipeline::{load_split_records, parse_split_kind};
use facemask_tools::ToolConfig;
use mask_dataset::{SplitManifest, WeightedSampler};
use std::collections::BTreeMap;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(
    name = "sample_batches",
    about = "Draw weighted minibatches from a split and report how often each class is seen"
)]
struct Args {
    #[command(flatten)]
    config: ConfigArgs,
    #[command(flatten)]
    verbosity: VerbosityArgs,
    /// Annotation directory (defaults to the one recorded in the manifest).
    #[arg(long)]
    annotation_dir: Option<PathBuf>,
    /// Split manifest (defaults to the config's manifest_path).
    #[arg(long)]
    manifest: Option<PathBuf>,
    /// Split to sample from: train, validation, or test.
    #[arg(long, default_value = "train")]
    split: String,
    /// Minibatch size (defaults to the config's sampler.batch_size).
    #[arg(long)]
    batch_size: Option<usize>,
    /// Number of epochs to draw.
    #[arg(long, default_value_t = 1)]
    epochs: usize,
    /// Sampler seed (defaults to the manifest's split seed).
    #[arg(long)]
    seed: Option<u64>,
    /// Print the image ids of every batch.
    #[arg(long, default_value_t = false)]
    show_batches: bool,
}

fn main() -> Result<()> {
    let args = Args::parse();
    args.verbosity.init_logging();
    let cfg = ToolConfig::load_with(args.config.config.as_deref())?;
    let manifest_path = args.manifest.clone().unwrap_or_else(|| cfg.manifest_path.clone());
    let manifest = SplitManifest::load(&manifest_path)
        .with_context(|| format!("loading {}", manifest_path.display()))?;
    let kind = parse_split_kind(&args.split)?;
    let batch_size = args.batch_size.unwrap_or(cfg.batch_size).max(1);
    let seed = args.seed.unwrap_or(manifest.config.seed);

    let records = load_split_records(&cfg, &manifest, kind, args.annotation_dir.as_deref())?;
    let mut sampler = WeightedSampler::new(&records, seed)?;

    let mut drawn: BTreeMap<MaskClass, usize> = BTreeMap::new();
    let mut natural: BTreeMap<MaskClass, usize> = BTreeMap::new();
    for det in records.iter().flat_map(|r| r.detections.iter()) {
        *natural.entry(det.class).or_insert(0) += 1;
    }
    for epoch in 0..args.epochs {
        for (b, batch) in sampler.batches(batch_size).enumerate() {
            if args.show_batches {
                let ids: Vec<&str> = batch.iter().map(|&i| records[i].image_id.as_str()).collect();
                println!("epoch {epoch} batch {b}: {}", ids.join(", "));
            }
            for &i in &batch {
                for det in &records[i].detections {
                    *drawn.entry(det.class).or_insert(0) += 1;
                }
            }
        }
    }

    let drawn_total: usize = drawn.values().sum();
    let natural_total: usize = natural.values().sum();
    println!(
        "{} images in {}, {} epoch(s) of batch size {}",
        records.len(),
        kind.dir_name(),
        args.epochs,
        batch_size
    );
    println!("{:<24}{:>10}{:>10}", "class", "natural", "sampled");
    for class in MaskClass::ALL {
        let share = |counts: &BTreeMap<MaskClass, usize>, total: usize| {
            if total == 0 {
                0.0
            } else {
                counts.get(&class).copied().unwrap_or(0) as f64 / total as f64 * 100.0
            }
        };
        println!(
            "{:<24}{:>9.1}%{:>9.1}%",
            class.as_str(),
            share(&natural, natural_total),
            share(&drawn, drawn_total)
        );
    }
    Ok(())
}
