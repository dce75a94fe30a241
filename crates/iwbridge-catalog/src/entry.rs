//! Catalog rows and query results

use std::collections::BTreeMap;
use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use iwbridge_core::{AssetId, AssetKind, ContentHash};

/// One converted source asset
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CatalogEntry {
    pub source_id: AssetId,
    pub kind: AssetKind,
    /// Primary artifact, relative to the output root
    pub artifact_path: PathBuf,
    /// Every file the conversion produced, primary first
    pub artifacts: Vec<PathBuf>,
    pub content_hash: ContentHash,
    pub converted_at: DateTime<Utc>,
    pub format_version: u32,
    /// Total size of all artifacts
    pub bytes: u64,
}

/// How `commit` treats an existing row with a different hash
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CommitMode {
    /// Refuse with a conflict
    #[default]
    Normal,
    /// Overwrite row and artifacts (an explicit re-run)
    Replace,
}

/// What a commit did
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum CommitOutcome {
    Inserted,
    Replaced,
    /// Same hash already recorded; nothing was written
    Unchanged,
}

/// Aggregate counts for `catalog stats`
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct CatalogStats {
    pub total: u64,
    pub total_bytes: u64,
    pub by_kind: BTreeMap<String, u64>,
    pub last_converted: Option<DateTime<Utc>>,
    pub schema_version: String,
}
