//! Per-asset reports and the batch summary

use std::path::{Path, PathBuf};

use serde::Serialize;

use iwbridge_core::{AssetId, AssetKind, Error, Result};
use iwbridge_export::{ConversionWarning, JsonExporter};

use crate::events::AssetState;

/// Outcome of one asset
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AssetReport {
    pub id: AssetId,
    /// File path, or `pack:entry` for archive members
    pub source: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub kind: Option<AssetKind>,
    #[serde(flatten)]
    pub state: AssetState,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub artifacts: Vec<PathBuf>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub warnings: Vec<ConversionWarning>,
    /// Catalog commit attempts, zero when the asset never reached the commit stage
    pub attempts: u32,
    pub elapsed_ms: u64,
}

impl AssetReport {
    pub fn new(id: AssetId, source: String) -> Self {
        Self {
            id,
            source,
            kind: None,
            state: AssetState::Queued,
            artifacts: Vec::new(),
            warnings: Vec::new(),
            attempts: 0,
            elapsed_ms: 0,
        }
    }

    /// Terminal `Failed` state for `error`, keeping its kind and offset
    pub fn failed_state(error: &Error) -> AssetState {
        AssetState::Failed {
            kind: error.kind(),
            message: error.to_string(),
            offset: error.offset(),
        }
    }
}

/// Result of [`convert_batch`](crate::convert_batch)
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct BatchResult {
    pub succeeded: usize,
    pub failed: usize,
    pub skipped: usize,
    pub cancelled: usize,
    /// Sorted by identifier
    pub reports: Vec<AssetReport>,
    pub elapsed_ms: u64,
}

impl BatchResult {
    pub fn from_reports(mut reports: Vec<AssetReport>, elapsed_ms: u64) -> Self {
        reports.sort_by(|a, b| a.id.cmp(&b.id).then_with(|| a.source.cmp(&b.source)));
        let mut result = Self {
            elapsed_ms,
            ..Default::default()
        };
        for report in &reports {
            match report.state {
                AssetState::Done => result.succeeded += 1,
                AssetState::Skipped { .. } => result.skipped += 1,
                AssetState::Cancelled => result.cancelled += 1,
                // A report that never reached a terminal state counts as failed
                _ => result.failed += 1,
            }
        }
        result.reports = reports;
        result
    }

    pub fn total(&self) -> usize {
        self.reports.len()
    }

    /// No asset failed
    pub fn is_success(&self) -> bool {
        self.failed == 0
    }

    pub fn report(&self, id: &AssetId) -> Option<&AssetReport> {
        self.reports.iter().find(|r| &r.id == id)
    }

    pub fn failures(&self) -> impl Iterator<Item = &AssetReport> {
        self.reports
            .iter()
            .filter(|r| matches!(r.state, AssetState::Failed { .. }))
    }

    /// Write the summary as JSON
    pub fn write_json(&self, path: &Path) -> Result<()> {
        JsonExporter::new().write_json(self, path).map_err(Error::from)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::SkipReason;
    use iwbridge_core::ErrorKind;

    fn report(id: &str, state: AssetState) -> AssetReport {
        AssetReport {
            state,
            ..AssetReport::new(AssetId::new(id), id.to_string())
        }
    }

    #[test]
    fn test_counts_and_order() {
        let result = BatchResult::from_reports(
            vec![
                report("c", AssetState::Done),
                report("a", AssetReport::failed_state(&Error::malformed(12, "bad tag"))),
                report(
                    "b",
                    AssetState::Skipped {
                        reason: SkipReason::Unchanged,
                    },
                ),
                report("d", AssetState::Cancelled),
            ],
            5,
        );
        assert_eq!(
            (result.succeeded, result.failed, result.skipped, result.cancelled),
            (1, 1, 1, 1)
        );
        let ids: Vec<_> = result.reports.iter().map(|r| r.id.as_str()).collect();
        assert_eq!(ids, ["a", "b", "c", "d"]);
        assert!(!result.is_success());

        let failure = result.failures().next().unwrap();
        assert!(matches!(
            failure.state,
            AssetState::Failed {
                kind: ErrorKind::MalformedContainer,
                offset: Some(12),
                ..
            }
        ));
    }

    #[test]
    fn test_report_json_is_flat() {
        let value = serde_json::to_value(report("a", AssetState::Done)).unwrap();
        assert_eq!(value["state"], "done");
        assert_eq!(value["id"], "a");
        assert!(value.get("artifacts").is_none());
    }
}
