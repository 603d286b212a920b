//! Split manifest: a reproducible, auditable record of one dataset split.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

use crate::splits::{DatasetSplit, SplitConfig, SplitKind};
use crate::types::{DatasetError, DatasetResult, DatasetSummary, LoadSummary};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum SplitManifestSchemaVersion {
    V1,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SplitEntry {
    pub image_ids: Vec<String>,
    pub summary: DatasetSummary,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SplitManifest {
    pub schema_version: SplitManifestSchemaVersion,
    /// Annotation directory the split was built from (UTF-8).
    pub annotation_root: String,
    pub config: SplitConfig,
    pub min_area: f32,
    /// Hex-encoded SHA256 of the config and the per-split image ids.
    pub version: String,
    pub code_version: String,
    pub created_at_ms: u64,
    pub load: LoadSummary,
    pub train: SplitEntry,
    pub validation: SplitEntry,
    pub test: SplitEntry,
}

impl SplitManifest {
    pub fn build(
        split: &DatasetSplit,
        config: SplitConfig,
        annotation_root: &Path,
        min_area: f32,
        load: LoadSummary,
    ) -> Self {
        let entry = |kind: SplitKind| SplitEntry {
            image_ids: split.image_ids(kind).into_iter().map(str::to_string).collect(),
            summary: split.summary(kind),
        };
        let train = entry(SplitKind::Train);
        let validation = entry(SplitKind::Validation);
        let test = entry(SplitKind::Test);
        let version = Self::compute_version(&config, min_area, &train, &validation, &test);
        let created_at_ms = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .map(|d| d.as_millis() as u64)
            .unwrap_or_default();
        Self {
            schema_version: SplitManifestSchemaVersion::V1,
            annotation_root: annotation_root.display().to_string(),
            config,
            min_area,
            version,
            code_version: env!("CARGO_PKG_VERSION").to_string(),
            created_at_ms,
            load,
            train,
            validation,
            test,
        }
    }

    /// Version key; stable across machines because it ignores paths and time.
    pub fn compute_version(
        config: &SplitConfig,
        min_area: f32,
        train: &SplitEntry,
        validation: &SplitEntry,
        test: &SplitEntry,
    ) -> String {
        #[derive(Serialize)]
        struct VersionTuple<'a> {
            config: &'a SplitConfig,
            min_area: f32,
            train: &'a [String],
            validation: &'a [String],
            test: &'a [String],
        }
        let tuple = VersionTuple {
            config,
            min_area,
            train: &train.image_ids,
            validation: &validation.image_ids,
            test: &test.image_ids,
        };
        let bytes = serde_json::to_vec(&tuple).unwrap_or_default();
        use sha2::Digest;
        let hash = sha2::Sha256::digest(bytes);
        format!("{:x}", hash)
    }

    pub fn entry(&self, kind: SplitKind) -> &SplitEntry {
        match kind {
            SplitKind::Train => &self.train,
            SplitKind::Validation => &self.validation,
            SplitKind::Test => &self.test,
        }
    }

    pub fn save(&self, path: &Path) -> DatasetResult<()> {
        let parent = path.parent().unwrap_or_else(|| Path::new("."));
        if !parent.as_os_str().is_empty() && !parent.exists() {
            fs::create_dir_all(parent).map_err(|e| DatasetError::Io {
                path: parent.to_path_buf(),
                source: e,
            })?;
        }
        let data = serde_json::to_vec_pretty(self).map_err(|e| DatasetError::Json {
            path: path.to_path_buf(),
            source: e,
        })?;
        fs::write(path, data).map_err(|e| DatasetError::Io {
            path: path.to_path_buf(),
            source: e,
        })
    }

    pub fn load(path: &Path) -> DatasetResult<Self> {
        let raw = fs::read(path).map_err(|e| DatasetError::Io {
            path: path.to_path_buf(),
            source: e,
        })?;
        serde_json::from_slice(&raw).map_err(|e| DatasetError::Json {
            path: path.to_path_buf(),
            source: e,
        })
    }
}
