use clap::Args;
use mask_dataset::SplitConfig;
use std::path::PathBuf;
use vision_core::postprocess::PostFilter;

/// Post-filter thresholds shared by evaluation and overlay tools.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ThresholdOpts {
    pub confidence: f32,
    pub iou: f32,
    pub class_aware: bool,
}

impl ThresholdOpts {
    pub fn new(confidence: f32, iou: f32) -> Self {
        Self {
            confidence,
            iou,
            class_aware: false,
        }
    }

    pub fn post_filter(&self) -> PostFilter {
        PostFilter::new(self.confidence, self.iou).class_aware(self.class_aware)
    }
}

/// Threshold flags. Unset flags fall back to the tool config.
#[derive(Debug, Clone, Default, Args)]
pub struct ThresholdArgs {
    /// Keep detections scoring strictly above this confidence.
    #[arg(long)]
    pub confidence: Option<f32>,
    /// Suppress boxes overlapping a better one by more than this IoU.
    #[arg(long)]
    pub iou: Option<f32>,
    /// Run NMS separately for each predicted class (`--class-aware=false` turns
    /// off a config that enables it).
    #[arg(
        long,
        num_args = 0..=1,
        require_equals = true,
        default_missing_value = "true"
    )]
    pub class_aware: Option<bool>,
}

impl ThresholdArgs {
    pub fn resolve(&self, defaults: ThresholdOpts) -> ThresholdOpts {
        ThresholdOpts {
            confidence: self.confidence.unwrap_or(defaults.confidence),
            iou: self.iou.unwrap_or(defaults.iou),
            class_aware: self.class_aware.unwrap_or(defaults.class_aware),
        }
    }
}

/// Split flags. Unset flags fall back to the tool config.
#[derive(Debug, Clone, Default, Args)]
pub struct SplitArgs {
    /// Share of images assigned to training.
    #[arg(long)]
    pub train_fraction: Option<f64>,
    /// Share of the non-training images assigned to validation.
    #[arg(long)]
    pub validation_fraction: Option<f64>,
    /// RNG seed for the split and the sampler.
    #[arg(long)]
    pub seed: Option<u64>,
}

impl SplitArgs {
    pub fn resolve(&self, defaults: SplitConfig) -> SplitConfig {
        SplitConfig {
            train_fraction: self.train_fraction.unwrap_or(defaults.train_fraction),
            validation_fraction_of_rest: self
                .validation_fraction
                .unwrap_or(defaults.validation_fraction_of_rest),
            seed: self.seed.unwrap_or(defaults.seed),
        }
    }
}

/// Logging verbosity flags.
#[derive(Debug, Clone, Default, Args)]
pub struct VerbosityArgs {
    /// More log output (-v debug, -vv trace).
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,
    /// Only warnings and errors.
    #[arg(short, long, default_value_t = false)]
    pub quiet: bool,
}

impl VerbosityArgs {
    pub fn init_logging(&self) {
        crate::logging::init_logging(self.verbose, self.quiet);
    }
}

/// Optional config file path, overriding `FACEMASK_TOOLS_CONFIG`.
#[derive(Debug, Clone, Default, Args)]
pub struct ConfigArgs {
    /// Path to facemask-tools.toml.
    #[arg(long)]
    pub config: Option<PathBuf>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unset_flags_keep_defaults() {
        let defaults = ThresholdOpts::new(0.35, 0.7);
        assert_eq!(ThresholdArgs::default().resolve(defaults), defaults);
        let split = SplitArgs::default().resolve(SplitConfig::default());
        assert_eq!(split, SplitConfig::default());
    }

    #[test]
    fn explicit_flags_override() {
        let args = ThresholdArgs {
            confidence: Some(0.5),
            iou: None,
            class_aware: Some(true),
        };
        let opts = args.resolve(ThresholdOpts::new(0.35, 0.7));
        assert_eq!(opts.confidence, 0.5);
        assert_eq!(opts.iou, 0.7);
        assert!(opts.post_filter().class_aware);

        let split = SplitArgs {
            seed: Some(7),
            ..Default::default()
        }
        .resolve(SplitConfig::default());
        assert_eq!(split.seed, 7);
        assert_eq!(split.train_fraction, 0.8);
    }

    #[derive(Debug, clap::Parser)]
    struct Cli {
        #[command(flatten)]
        thresholds: ThresholdArgs,
    }

    #[test]
    fn class_aware_flag_can_disable_config() {
        use clap::Parser;

        let config = ThresholdOpts {
            class_aware: true,
            ..ThresholdOpts::new(0.35, 0.7)
        };
        let off = Cli::try_parse_from(["eval", "--class-aware=false"]).unwrap();
        assert_eq!(off.thresholds.class_aware, Some(false));
        assert!(!off.thresholds.resolve(config).class_aware);

        let bare = Cli::try_parse_from(["eval", "--class-aware"]).unwrap();
        assert_eq!(bare.thresholds.class_aware, Some(true));
        assert!(bare.thresholds.resolve(ThresholdOpts::new(0.35, 0.7)).class_aware);

        let unset = Cli::try_parse_from(["eval"]).unwrap();
        assert!(unset.thresholds.resolve(config).class_aware);
    }
}
