//! Annotation load quality checks.

use crate::annotations::{load_annotation_dir, LoaderConfig};
use crate::types::{
    DatasetResult, LoadSummary, ValidationOutcome, ValidationReport, ValidationThresholds,
};
use log::warn;
use std::path::Path;

fn apply_thresholds(
    label: &str,
    count: usize,
    ratio: f32,
    max_count: Option<usize>,
    max_ratio: Option<f32>,
    outcome: &mut ValidationOutcome,
    reasons: &mut Vec<String>,
) {
    if let Some(max) = max_count {
        if count > max {
            *outcome = ValidationOutcome::Fail;
            reasons.push(format!("{label}: {count} exceeds max {max}"));
        }
    }
    if let Some(max_r) = max_ratio {
        if ratio > max_r {
            *outcome = ValidationOutcome::Fail;
            reasons.push(format!(
                "{label}: ratio {:.3} exceeds max {:.3}",
                ratio, max_r
            ));
        }
    }
    if count > 0 {
        if *outcome == ValidationOutcome::Pass {
            *outcome = ValidationOutcome::Warn;
        }
        reasons.push(format!("{label}: {count} observed"));
    }
}

/// Grade a load summary. Clipped and dropped boxes are ratios of all objects;
/// invalid files are a ratio of all files.
pub fn validate_load_summary(
    summary: LoadSummary,
    thresholds: &ValidationThresholds,
) -> ValidationReport {
    let objects = summary.objects.max(1) as f32;
    let files = summary.files.max(1) as f32;

    let mut outcome = ValidationOutcome::Pass;
    let mut reasons = Vec::new();

    apply_thresholds(
        "invalid annotation files",
        summary.invalid_files,
        summary.invalid_files as f32 / files,
        thresholds.max_invalid_files,
        thresholds.max_invalid_ratio,
        &mut outcome,
        &mut reasons,
    );
    apply_thresholds(
        "dropped boxes (small/degenerate)",
        summary.dropped(),
        summary.dropped() as f32 / objects,
        thresholds.max_dropped,
        thresholds.max_dropped_ratio,
        &mut outcome,
        &mut reasons,
    );
    apply_thresholds(
        "clipped boxes",
        summary.clipped,
        summary.clipped as f32 / objects,
        thresholds.max_clipped,
        thresholds.max_clipped_ratio,
        &mut outcome,
        &mut reasons,
    );

    if outcome == ValidationOutcome::Fail {
        warn!("annotation validation failed: {}", reasons.join("; "));
    }

    ValidationReport {
        outcome,
        reasons,
        summary,
    }
}

/// Load `dir` permissively and grade the result.
pub fn validate_annotation_dir(
    dir: &Path,
    min_area: f32,
    thresholds: &ValidationThresholds,
) -> DatasetResult<ValidationReport> {
    let cfg = LoaderConfig {
        min_area,
        permissive: true,
    };
    let loaded = load_annotation_dir(dir, &cfg)?;
    Ok(validate_load_summary(loaded.summary, thresholds))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clean_load_passes() {
        let summary = LoadSummary {
            files: 4,
            objects: 10,
            kept: 10,
            ..Default::default()
        };
        let report = validate_load_summary(summary, &ValidationThresholds::default());
        assert_eq!(report.outcome, ValidationOutcome::Pass);
        assert!(report.reasons.is_empty());
    }

    #[test]
    fn observed_drops_warn_and_thresholds_fail() {
        let summary = LoadSummary {
            files: 4,
            objects: 10,
            kept: 7,
            dropped_small: 3,
            ..Default::default()
        };
        let warn = validate_load_summary(summary.clone(), &ValidationThresholds::default());
        assert_eq!(warn.outcome, ValidationOutcome::Warn);

        let strict = ValidationThresholds {
            max_dropped_ratio: Some(0.2),
            ..Default::default()
        };
        let fail = validate_load_summary(summary, &strict);
        assert_eq!(fail.outcome, ValidationOutcome::Fail);
        assert!(fail.reasons.iter().any(|r| r.contains("exceeds max")));
    }
}
